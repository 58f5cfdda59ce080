//! Applying view models to an output.

use std::io::Write;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::console::{ConsoleLine, Tone};
use crate::job::JobKind;
use crate::progress::{self, TaskCancelledPayload, TaskConsolePayload, TaskErrorPayload};
use crate::view::{CompletionSummary, StepState, ViewModel};

/// Side-effecting half of rendering. Implementations must tolerate the same
/// view model being applied more than once.
pub trait ProgressView {
    /// Percentage, status, steps, substep bar and elapsed time.
    fn render(&mut self, vm: &ViewModel);
    /// Lines appended to the console since the previous call.
    fn console(&mut self, lines: &[ConsoleLine]);
    /// Locally generated console line (not from the server).
    fn notice(&mut self, tone: Tone, message: &str);
    fn completed(&mut self, summary: &CompletionSummary);
    fn failed(&mut self, message: &str);
    fn cancelled(&mut self, redirect_url: &str);
}

fn tone_prefix(tone: Tone) -> &'static str {
    match tone {
        Tone::Error => "[ERROR]",
        Tone::Success => "[SUCCESS]",
        Tone::Warning => "[WARNING]",
        Tone::Info | Tone::Highlight | Tone::Metric => "[INFO]",
    }
}

fn step_marker(state: StepState) -> &'static str {
    match state {
        StepState::Completed => "✔",
        StepState::Active => "▶",
        StepState::Pending => "·",
    }
}

/// Progress bars on stderr, console lines printed above them.
pub struct TerminalView {
    multi: MultiProgress,
    overall: ProgressBar,
    steps: Vec<ProgressBar>,
    substep: Option<ProgressBar>,
}

impl TerminalView {
    pub fn new(kind: JobKind) -> Self {
        Self::with_target(kind, ProgressDrawTarget::stderr())
    }

    pub fn hidden(kind: JobKind) -> Self {
        Self::with_target(kind, ProgressDrawTarget::hidden())
    }

    fn with_target(kind: JobKind, target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new(100));
        if let Ok(style) =
            ProgressStyle::with_template("{prefix} [{bar:40.cyan/blue}] {msg}")
        {
            overall.set_style(style.progress_chars("#>-"));
        }
        overall.set_prefix("00:00:00");
        overall.set_message(format!("Connecting to the {kind} server..."));
        Self {
            multi,
            overall,
            steps: Vec::new(),
            substep: None,
        }
    }

    fn sync_step_rows(&mut self, count: usize) {
        if self.steps.len() == count {
            return;
        }
        for bar in self.steps.drain(..) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        for _ in 0..count {
            let bar = self.multi.add(ProgressBar::new(1));
            if let Ok(style) = ProgressStyle::with_template("  {msg}") {
                bar.set_style(style);
            }
            self.steps.push(bar);
        }
    }

    fn sync_substep(&mut self, vm: &ViewModel) {
        match (&vm.substep, self.substep.as_ref()) {
            (Some(sub), Some(bar)) => {
                bar.set_position(sub.percent.round() as u64);
                bar.set_message(sub.text.clone());
            }
            (Some(sub), None) => {
                let bar = self.multi.add(ProgressBar::new(100));
                if let Ok(style) = ProgressStyle::with_template("    [{bar:30.green}] {msg}") {
                    bar.set_style(style.progress_chars("=> "));
                }
                bar.set_position(sub.percent.round() as u64);
                bar.set_message(sub.text.clone());
                self.substep = Some(bar);
            }
            (None, Some(_)) => {
                if let Some(bar) = self.substep.take() {
                    bar.finish_and_clear();
                    self.multi.remove(&bar);
                }
            }
            (None, None) => {}
        }
    }

    fn println(&self, line: String) {
        if let Err(e) = self.multi.println(line) {
            log::warn!("failed to print console line: {e}");
        }
    }

    fn finish_rows(&mut self) {
        for bar in &self.steps {
            bar.finish();
        }
        if let Some(bar) = self.substep.take() {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
    }
}

impl ProgressView for TerminalView {
    fn render(&mut self, vm: &ViewModel) {
        self.overall.set_position(u64::from(vm.percentage));
        self.overall.set_prefix(vm.elapsed.clone());
        let mut msg = format!("{} · {}", vm.percentage_text, vm.status.label());
        if !vm.current_message.is_empty() {
            msg.push_str(" · ");
            msg.push_str(&vm.current_message);
        }
        self.overall.set_message(msg);

        self.sync_step_rows(vm.steps.len());
        for (bar, step) in self.steps.iter().zip(&vm.steps) {
            bar.set_message(format!("{} {}", step_marker(step.state), step.label));
        }
        self.sync_substep(vm);

        if let Some(c) = &vm.counters {
            self.overall.set_message(format!(
                "{} · models {} · variables {} · days {} · irrigation {:.1} mm",
                self.overall.message(),
                c.models_loaded,
                c.variables_predicted,
                c.days_predicted,
                c.irrigation_total_mm
            ));
        }
    }

    fn console(&mut self, lines: &[ConsoleLine]) {
        for line in lines {
            self.println(format!(
                "[{}] {} {}",
                line.timestamp,
                tone_prefix(line.tone),
                line.message.trim_end()
            ));
        }
    }

    fn notice(&mut self, tone: Tone, message: &str) {
        self.println(format!("{} {message}", tone_prefix(tone)));
    }

    fn completed(&mut self, summary: &CompletionSummary) {
        self.finish_rows();
        self.overall.finish_with_message(format!(
            "100% · Completed · {} steps in {}",
            summary.steps, summary.elapsed
        ));
        self.println(format!(
            "{} finished in {} ({} messages). Opening {} in {} s...",
            capitalize(summary.kind.noun()),
            summary.elapsed,
            summary.messages,
            summary.results_url,
            summary.redirect_in_ms / 1000
        ));
    }

    fn failed(&mut self, message: &str) {
        self.finish_rows();
        self.overall.abandon_with_message(format!("Failed · {message}"));
    }

    fn cancelled(&mut self, redirect_url: &str) {
        self.finish_rows();
        self.overall.abandon_with_message("Cancelled".to_string());
        self.println(format!("Cancelled. Returning to {redirect_url}"));
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One JSON event per line, for scripts and other frontends.
pub struct JsonView<W: Write> {
    kind: JobKind,
    out: W,
}

impl<W: Write> JsonView<W> {
    pub fn new(kind: JobKind, out: W) -> Self {
        Self { kind, out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ProgressView for JsonView<W> {
    fn render(&mut self, vm: &ViewModel) {
        progress::emit_progress(&mut self.out, vm);
    }

    fn console(&mut self, lines: &[ConsoleLine]) {
        if lines.is_empty() {
            return;
        }
        progress::emit_console(
            &mut self.out,
            TaskConsolePayload {
                kind: self.kind,
                lines,
            },
        );
    }

    fn notice(&mut self, tone: Tone, message: &str) {
        let line = ConsoleLine {
            timestamp: String::new(),
            message: message.to_string(),
            tone,
        };
        self.console(std::slice::from_ref(&line));
    }

    fn completed(&mut self, summary: &CompletionSummary) {
        progress::emit_finished(&mut self.out, summary);
    }

    fn failed(&mut self, message: &str) {
        progress::emit_error(
            &mut self.out,
            TaskErrorPayload {
                kind: self.kind,
                message,
            },
        );
    }

    fn cancelled(&mut self, redirect_url: &str) {
        progress::emit_cancelled(
            &mut self.out,
            TaskCancelledPayload {
                kind: self.kind,
                redirect_url,
            },
        );
    }
}

/// Either view, picked at runtime from `--json`.
pub enum AnyView {
    Terminal(TerminalView),
    Json(JsonView<std::io::Stdout>),
}

impl AnyView {
    pub fn new(kind: JobKind, json: bool) -> Self {
        if json {
            AnyView::Json(JsonView::new(kind, std::io::stdout()))
        } else {
            AnyView::Terminal(TerminalView::new(kind))
        }
    }

    fn inner(&mut self) -> &mut dyn ProgressView {
        match self {
            AnyView::Terminal(v) => v,
            AnyView::Json(v) => v,
        }
    }
}

impl ProgressView for AnyView {
    fn render(&mut self, vm: &ViewModel) {
        self.inner().render(vm);
    }
    fn console(&mut self, lines: &[ConsoleLine]) {
        self.inner().console(lines);
    }
    fn notice(&mut self, tone: Tone, message: &str) {
        self.inner().notice(tone, message);
    }
    fn completed(&mut self, summary: &CompletionSummary) {
        self.inner().completed(summary);
    }
    fn failed(&mut self, message: &str) {
        self.inner().failed(message);
    }
    fn cancelled(&mut self, redirect_url: &str) {
        self.inner().cancelled(redirect_url);
    }
}
