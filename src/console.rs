use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::snapshot::StepMessage;

/// How repeated message text is treated when appending console lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DedupPolicy {
    /// Every new message becomes a line.
    #[default]
    None,
    /// Messages whose text was already shown are skipped.
    Exact,
}

/// Colour class of a console line, picked from the emoji markers the backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Info,
    Success,
    Warning,
    Error,
    Highlight,
    Metric,
}

impl Tone {
    pub fn of(message: &str) -> Self {
        let has = |marks: &[&str]| marks.iter().any(|m| message.contains(m));
        if has(&["❌"]) {
            Tone::Error
        } else if has(&["✅"]) {
            Tone::Success
        } else if has(&["⚠️"]) {
            Tone::Warning
        } else if has(&["🎯", "🔮"]) {
            Tone::Highlight
        } else if has(&["📊", "📈"]) {
            Tone::Metric
        } else {
            Tone::Info
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleLine {
    pub timestamp: String,
    pub message: String,
    pub tone: Tone,
}

impl From<&StepMessage> for ConsoleLine {
    fn from(m: &StepMessage) -> Self {
        Self {
            timestamp: m.timestamp.clone(),
            message: m.message.clone(),
            tone: Tone::of(&m.message),
        }
    }
}

/// Console state carried across polls: a cursor into `step_messages`
/// plus the lines already shown.
#[derive(Debug, Default)]
pub struct ConsoleLog {
    policy: DedupPolicy,
    cursor: usize,
    // Last message consumed; re-anchors the cursor when the server window slides.
    anchor: Option<StepMessage>,
    seen: HashSet<String>,
    lines: Vec<ConsoleLine>,
}

impl ConsoleLog {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn lines(&self) -> &[ConsoleLine] {
        &self.lines
    }

    /// Consumes the messages past the cursor and returns the lines to append.
    pub fn ingest(&mut self, messages: &[StepMessage]) -> Vec<ConsoleLine> {
        let from = self.resume_index(messages);
        let mut appended = Vec::new();
        for m in &messages[from..] {
            if self.policy == DedupPolicy::Exact && !self.seen.insert(m.message.clone()) {
                continue;
            }
            let line = ConsoleLine::from(m);
            self.lines.push(line.clone());
            appended.push(line);
        }
        self.cursor = messages.len();
        if let Some(last) = messages.last() {
            self.anchor = Some(last.clone());
        }
        appended
    }

    fn resume_index(&self, messages: &[StepMessage]) -> usize {
        let Some(anchor) = self.anchor.as_ref() else {
            return 0;
        };
        if self.cursor > 0 && messages.get(self.cursor - 1) == Some(anchor) {
            return self.cursor;
        }
        // The backend keeps only its newest messages; find where we left off.
        match messages.iter().rposition(|m| m == anchor) {
            Some(i) => i + 1,
            None => messages.len(),
        }
    }

    /// Forgets everything shown; the next poll re-renders its whole window.
    pub fn clear(&mut self) {
        self.cursor = 0;
        self.anchor = None;
        self.seen.clear();
        self.lines.clear();
    }
}
