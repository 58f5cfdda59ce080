//! Pure snapshot -> view model transform.
//!
//! Nothing here touches the terminal; [`crate::render`] applies the result.

use std::time::Duration;

use serde::Serialize;

use crate::job::JobKind;
use crate::snapshot::{ProgressSnapshot, StepMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Completed,
    Active,
    Pending,
}

impl StepState {
    pub fn for_index(index: u32, current_step: u32) -> Self {
        use std::cmp::Ordering::*;
        match index.cmp(&current_step) {
            Less => StepState::Completed,
            Equal => StepState::Active,
            Greater => StepState::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepView {
    pub index: u32,
    pub label: String,
    pub state: StepState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubstepView {
    pub current: u32,
    pub total: u32,
    /// 0.0..=100.0
    pub percent: f64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBadge {
    InProgress,
    Processing,
    Finishing,
    Completed,
}

impl StatusBadge {
    pub fn from_snapshot(snap: &ProgressSnapshot) -> Self {
        let pct = snap.percentage();
        if snap.is_complete {
            StatusBadge::Completed
        } else if pct >= 80 {
            StatusBadge::Finishing
        } else if pct >= 40 {
            StatusBadge::Processing
        } else {
            StatusBadge::InProgress
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusBadge::InProgress => "In progress",
            StatusBadge::Processing => "Processing",
            StatusBadge::Finishing => "Finishing",
            StatusBadge::Completed => "Completed",
        }
    }
}

/// Figures the prediction page extracts from the message log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PredictionCounters {
    pub models_loaded: u32,
    pub variables_predicted: u32,
    pub days_predicted: u32,
    pub irrigation_total_mm: f64,
}

impl PredictionCounters {
    pub fn from_messages(messages: &[StepMessage]) -> Self {
        let mut out = Self::default();
        for m in messages {
            let text = m.message.as_str();
            if text.contains("cargado exitosamente") || text.contains("cargado correctamente") {
                out.models_loaded += 1;
            }
            if let Some(n) = number_before(text, "variables predichas") {
                out.variables_predicted = n;
            }
            if let Some(n) = number_after(text, "Generando predicciones para") {
                if text.contains("días") {
                    out.days_predicted = n;
                }
            }
            if let Some(mm) = text
                .split_once("Riego total:")
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .and_then(|v| v.parse::<f64>().ok())
            {
                out.irrigation_total_mm = mm;
            }
        }
        out
    }
}

fn number_before(text: &str, marker: &str) -> Option<u32> {
    let (head, _) = text.split_once(marker)?;
    head.split_whitespace().next_back()?.parse().ok()
}

fn number_after(text: &str, marker: &str) -> Option<u32> {
    let (_, tail) = text.split_once(marker)?;
    tail.split_whitespace().next()?.parse().ok()
}

/// Upper bound on step rows drawn, whatever `total_steps` the server claims.
pub const MAX_STEP_ROWS: u32 = 32;

/// Everything a view needs to draw one poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub kind: JobKind,
    pub percentage: u32,
    pub percentage_text: String,
    pub status: StatusBadge,
    pub current_message: String,
    pub steps: Vec<StepView>,
    pub substep: Option<SubstepView>,
    pub elapsed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counters: Option<PredictionCounters>,
}

impl ViewModel {
    pub fn from_snapshot(kind: JobKind, snap: &ProgressSnapshot, elapsed: Duration) -> Self {
        let percentage = snap.percentage();
        let current = snap.step();

        let steps = (0..snap.total_steps.min(MAX_STEP_ROWS))
            .map(|index| StepView {
                index,
                label: kind.step_label(index),
                state: StepState::for_index(index, current),
            })
            .collect();

        let substep = snap.has_substeps().then(|| {
            let done = snap.current_substep.min(snap.total_substeps);
            SubstepView {
                current: snap.current_substep,
                total: snap.total_substeps,
                percent: f64::from(done) / f64::from(snap.total_substeps) * 100.0,
                text: format!("{}/{}", snap.current_substep, snap.total_substeps),
            }
        });

        let counters = (kind == JobKind::Prediction)
            .then(|| PredictionCounters::from_messages(&snap.step_messages));

        Self {
            kind,
            percentage,
            percentage_text: format!("{percentage}%"),
            status: StatusBadge::from_snapshot(snap),
            current_message: snap.current_message.trim().to_string(),
            steps,
            substep,
            elapsed: format_elapsed(elapsed),
            counters,
        }
    }

    pub fn active_step(&self) -> Option<&StepView> {
        self.steps.iter().find(|s| s.state == StepState::Active)
    }
}

/// Shown once the job finishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionSummary {
    pub kind: JobKind,
    pub elapsed: String,
    pub steps: String,
    pub messages: usize,
    /// Where the user is sent after the redirect delay.
    pub results_url: String,
    pub redirect_in_ms: u64,
}

/// `HH:MM:SS`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}
