use serde::{Deserialize, Deserializer, Serialize};

/// One polled progress payload.
///
/// Endpoints: `/api/progreso_entrenamiento`, `/api/progreso_prediccion`
///
/// The backend answers `{}` until a job registers progress, so every field is
/// optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Not always sent; see [`ProgressSnapshot::percentage`].
    #[serde(default, deserialize_with = "rounded_percent")]
    pub percentage: Option<u32>,

    // Substep-only updates send `current_step: null`.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub current_step: u32,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_steps: u32,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub current_substep: u32,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_substeps: u32,

    #[serde(default)]
    pub current_message: String,
    #[serde(default)]
    pub step_messages: Vec<StepMessage>,
    #[serde(default)]
    pub is_complete: bool,

    /// Never observed from the current backend; honoured when present.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMessage {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub message: String,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(0))
}

/// Any JSON number, rounded into 0..=100.
fn rounded_percent<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.map(|p| p.round().clamp(0.0, 100.0) as u32))
}

impl ProgressSnapshot {
    /// Overall completion in 0..=100.
    ///
    /// Falls back to `current_step / total_steps` when the server leaves
    /// `percentage` out.
    pub fn percentage(&self) -> u32 {
        if let Some(p) = self.percentage {
            return p.min(100);
        }
        if self.total_steps == 0 {
            return 0;
        }
        let ratio = f64::from(self.current_step) / f64::from(self.total_steps);
        ((ratio * 100.0).round() as u32).min(100)
    }

    /// `current_step` clamped into `[0, total_steps]`.
    pub fn step(&self) -> u32 {
        self.current_step.min(self.total_steps)
    }

    pub fn has_substeps(&self) -> bool {
        self.total_substeps > 0
    }

    /// Failure reported by the backend for a finished job.
    ///
    /// The backend has no error field; a failed job finishes with a `❌` line
    /// as its current message.
    pub fn failure(&self) -> Option<String> {
        if let Some(e) = self.error.as_deref().filter(|e| !e.trim().is_empty()) {
            return Some(e.to_string());
        }
        if self.is_complete && self.current_message.contains('❌') {
            return Some(self.current_message.trim().to_string());
        }
        None
    }
}
