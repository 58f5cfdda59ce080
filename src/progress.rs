use std::io::Write;

use serde::Serialize;

use crate::console::ConsoleLine;
use crate::job::JobKind;
use crate::view::{CompletionSummary, ViewModel};

/// Machine-facing event payloads for a followed job, one JSON object per line.
///
/// Event names: `job://progress`, `job://console`, `job://finished`,
/// `job://error`, `job://cancelled`
#[derive(Debug, Serialize)]
struct Envelope<'a, T: Serialize> {
    event: &'a str,
    payload: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskConsolePayload<'a> {
    pub kind: JobKind,
    pub lines: &'a [ConsoleLine],
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskErrorPayload<'a> {
    pub kind: JobKind,
    pub message: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskCancelledPayload<'a> {
    pub kind: JobKind,
    pub redirect_url: &'a str,
}

fn emit<W: Write, T: Serialize>(out: &mut W, event: &str, payload: T) {
    let line = match serde_json::to_string(&Envelope { event, payload }) {
        Ok(line) => line,
        Err(e) => {
            log::error!("failed to encode {event}: {e}");
            return;
        }
    };
    if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
        log::warn!("failed to write {event}: {e}");
    }
}

pub fn emit_progress<W: Write>(out: &mut W, payload: &ViewModel) {
    emit(out, "job://progress", payload);
}

pub fn emit_console<W: Write>(out: &mut W, payload: TaskConsolePayload<'_>) {
    emit(out, "job://console", payload);
}

pub fn emit_finished<W: Write>(out: &mut W, payload: &CompletionSummary) {
    emit(out, "job://finished", payload);
}

pub fn emit_error<W: Write>(out: &mut W, payload: TaskErrorPayload<'_>) {
    emit(out, "job://error", payload);
}

pub fn emit_cancelled<W: Write>(out: &mut W, payload: TaskCancelledPayload<'_>) {
    emit(out, "job://cancelled", payload);
}
