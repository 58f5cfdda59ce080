use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The two long-running jobs the backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Training,
    Prediction,
}

impl JobKind {
    pub fn start_path(self) -> &'static str {
        match self {
            JobKind::Training => "/entrenamiento/proceso",
            JobKind::Prediction => "/prediccion/proceso",
        }
    }

    pub fn progress_path(self) -> &'static str {
        match self {
            JobKind::Training => "/api/progreso_entrenamiento",
            JobKind::Prediction => "/api/progreso_prediccion",
        }
    }

    /// Page opened once the job completes.
    pub fn results_path(self) -> &'static str {
        match self {
            JobKind::Training => "/entrenamiento",
            JobKind::Prediction => "/prediccion/resultados",
        }
    }

    /// Page opened when the user cancels.
    pub fn main_path(self) -> &'static str {
        match self {
            JobKind::Training => "/entrenamiento",
            JobKind::Prediction => "/prediccion",
        }
    }

    pub fn default_interval(self) -> Duration {
        match self {
            JobKind::Training => Duration::from_secs(2),
            JobKind::Prediction => Duration::from_secs(5),
        }
    }

    /// Labels for the step cards, indexed like `current_step`.
    pub fn step_labels(self) -> &'static [&'static str] {
        match self {
            JobKind::Training => &[
                "Start",
                "Load data",
                "Train/test split",
                "Build pipelines",
                "Train models",
            ],
            JobKind::Prediction => &[
                "Start",
                "Load models",
                "Load data",
                "Generate predictions",
                "Unify predictions",
                "Compute irrigation",
            ],
        }
    }

    pub fn step_label(self, index: u32) -> String {
        self.step_labels()
            .get(index as usize)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("Step {}", index + 1))
    }

    pub fn noun(self) -> &'static str {
        match self {
            JobKind::Training => "training",
            JobKind::Prediction => "prediction",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.noun())
    }
}
