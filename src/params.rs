//! Job parameters submitted to the start endpoints.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParamsError {
    #[error("select a data file to train on")]
    MissingDataFile,

    #[error("select at least one model to train")]
    NoModels,

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Sarima,
    Sarimax,
    Var,
    Lstm,
}

impl ModelKind {
    pub fn id(self) -> &'static str {
        match self {
            ModelKind::Sarima => "sarima",
            ModelKind::Sarimax => "sarimax",
            ModelKind::Var => "var",
            ModelKind::Lstm => "lstm",
        }
    }

    /// Rough training cost in minutes.
    fn minutes(self) -> u32 {
        match self {
            ModelKind::Sarima => 3,
            ModelKind::Sarimax => 5,
            ModelKind::Var => 4,
            ModelKind::Lstm => 10,
        }
    }
}

/// Form-encoded body of a start request. Keys may repeat (`models`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobForm(pub Vec<(String, String)>);

impl JobForm {
    fn push(&mut self, key: &str, value: impl ToString) {
        self.0.push((key.to_string(), value.to_string()));
    }

    pub fn values(&self, key: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values(key).into_iter().next()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SarimaOrder {
    pub p: u32,
    pub d: u32,
    pub q: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonalOrder {
    pub p: u32,
    pub d: u32,
    pub q: u32,
    pub s: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingParams {
    pub data_file: String,
    /// Held-out days at the end of the series.
    pub test_size: u32,
    pub models: Vec<ModelKind>,
    pub order: SarimaOrder,
    pub seasonal: SeasonalOrder,
    pub var_maxlags: u32,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            data_file: String::new(),
            test_size: 180,
            models: vec![ModelKind::Sarima, ModelKind::Var],
            order: SarimaOrder { p: 1, d: 1, q: 1 },
            seasonal: SeasonalOrder { p: 1, d: 1, q: 1, s: 30 },
            var_maxlags: 15,
        }
    }
}

impl TrainingParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.data_file.trim().is_empty() {
            return Err(ParamsError::MissingDataFile);
        }
        if self.models.is_empty() {
            return Err(ParamsError::NoModels);
        }
        if self.test_size == 0 {
            return Err(ParamsError::Zero { field: "test_size" });
        }
        Ok(())
    }

    /// Models in selection order, duplicates removed.
    pub fn selected_models(&self) -> Vec<ModelKind> {
        let mut out: Vec<ModelKind> = Vec::with_capacity(self.models.len());
        for m in &self.models {
            if !out.contains(m) {
                out.push(*m);
            }
        }
        out
    }

    pub fn to_form(&self) -> JobForm {
        let mut form = JobForm::default();
        form.push("data_file", &self.data_file);
        form.push("test_size", self.test_size);
        for m in self.selected_models() {
            form.push("models", m.id());
        }
        form.push("sarima_p", self.order.p);
        form.push("sarima_d", self.order.d);
        form.push("sarima_q", self.order.q);
        form.push("sarima_P", self.seasonal.p);
        form.push("sarima_D", self.seasonal.d);
        form.push("sarima_Q", self.seasonal.q);
        form.push("sarima_s", self.seasonal.s);
        form.push("var_maxlags", self.var_maxlags);
        form
    }

    /// Estimated wall time in minutes as `(low, high)`.
    pub fn estimated_minutes(&self) -> (u32, u32) {
        let total = 2 + self
            .selected_models()
            .iter()
            .map(|m| m.minutes())
            .sum::<u32>();
        (total, total + 5)
    }

    /// Lines shown before asking the user to confirm the run.
    pub fn summary(&self) -> Vec<String> {
        let models = self.selected_models();
        let mut lines = vec![
            format!("Data file: {}", self.data_file),
            format!(
                "Models: {}",
                models
                    .iter()
                    .map(|m| m.id().to_uppercase())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            format!("Test size: {} days", self.test_size),
        ];
        if models.contains(&ModelKind::Sarima) || models.contains(&ModelKind::Sarimax) {
            let o = self.order;
            let s = self.seasonal;
            lines.push(format!(
                "SARIMA: ({},{},{}) x ({},{},{},{})",
                o.p, o.d, o.q, s.p, s.d, s.q, s.s
            ));
        }
        if models.contains(&ModelKind::Var) {
            lines.push(format!("VAR lags: {}", self.var_maxlags));
        }
        let (lo, hi) = self.estimated_minutes();
        lines.push(format!("Estimated time: {lo}-{hi} min"));
        lines
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictionParams {
    pub horizon_days: u32,
}

impl Default for PredictionParams {
    fn default() -> Self {
        Self { horizon_days: 30 }
    }
}

impl PredictionParams {
    /// The backend refuses to look further ahead than a year.
    pub const MAX_HORIZON_DAYS: u32 = 365;

    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.horizon_days == 0 {
            return Err(ParamsError::Zero {
                field: "horizon_days",
            });
        }
        Ok(())
    }

    pub fn to_form(&self) -> JobForm {
        let mut form = JobForm::default();
        form.push(
            "horizon_days",
            self.horizon_days.min(Self::MAX_HORIZON_DAYS),
        );
        form
    }

    pub fn summary(&self) -> Vec<String> {
        vec![format!(
            "Horizon: {} days",
            self.horizon_days.min(Self::MAX_HORIZON_DAYS)
        )]
    }
}

/// Parses `a,b,c` into exactly `N` integers.
pub fn parse_tuple<const N: usize>(s: &str) -> Result<[u32; N], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {N} comma separated integers, got '{s}'"));
    }
    let mut out = [0u32; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse::<u32>()
            .map_err(|e| format!("invalid integer '{part}': {e}"))?;
    }
    Ok(out)
}
