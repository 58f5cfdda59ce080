//! Start-then-poll lifecycle of one job.
//!
//! ```text
//! Idle -> Starting -> Polling -> Complete
//!                        |  ^ -> Cancelled
//!                        v  |  -> Failed
//!                  ErrorRetrying
//! ```
//!
//! `Polling` and `ErrorRetrying` own the poll interval; every terminal
//! transition drops it.

use std::pin::pin;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::api::{ApiError, JobBackend, StartResponse};
use crate::console::{ConsoleLog, DedupPolicy, Tone};
use crate::job::JobKind;
use crate::navigate::{Confirm, Navigator};
use crate::params::JobForm;
use crate::render::ProgressView;
use crate::snapshot::ProgressSnapshot;
use crate::view::{format_elapsed, CompletionSummary, ViewModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Polling,
    ErrorRetrying,
    Complete,
    Cancelled,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Cancelled | Phase::Failed)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(CompletionSummary),
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Poll now instead of waiting for the next tick.
    Refresh,
    ClearConsole,
    /// Asks for confirmation, then stops and leaves for the main page.
    Cancel,
}

/// Sends user requests to a running poller. Requests after the run ended are dropped.
#[derive(Debug, Clone)]
pub struct PollerHandle {
    tx: mpsc::UnboundedSender<Control>,
}

impl PollerHandle {
    fn send(&self, c: Control) {
        if self.tx.send(c).is_err() {
            log::debug!("poller already stopped; {c:?} ignored");
        }
    }

    pub fn refresh(&self) {
        self.send(Control::Refresh);
    }

    pub fn clear_console(&self) {
        self.send(Control::ClearConsole);
    }

    pub fn cancel(&self) {
        self.send(Control::Cancel);
    }
}

#[derive(Debug, Clone)]
pub struct PollerOptions {
    pub interval: Duration,
    pub redirect_delay: Duration,
    pub dedup: DedupPolicy,
}

impl PollerOptions {
    pub const REDIRECT_DELAY: Duration = Duration::from_secs(5);

    pub fn for_kind(kind: JobKind) -> Self {
        Self {
            interval: kind.default_interval(),
            redirect_delay: Self::REDIRECT_DELAY,
            dedup: DedupPolicy::None,
        }
    }
}

/// Where the poller sends the user.
#[derive(Debug, Clone)]
pub struct PollerUrls {
    pub base: String,
    pub results: String,
    pub main: String,
}

impl PollerUrls {
    pub fn for_kind(base: &str, kind: JobKind) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            results: kind.results_path().to_string(),
            main: kind.main_path().to_string(),
        }
    }

    fn absolute(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base, path.trim_start_matches('/'))
        }
    }
}

/// State kept between polls.
#[derive(Debug)]
pub struct PollerState {
    phase: Phase,
    console: ConsoleLog,
    started_at: Option<Instant>,
    timer_active: bool,
    completions: u32,
    polls: u64,
    failed_polls: u64,
    messages_seen: usize,
    last_step: Option<(u32, u32)>,
}

impl PollerState {
    fn new(dedup: DedupPolicy) -> Self {
        Self {
            phase: Phase::Idle,
            console: ConsoleLog::new(dedup),
            started_at: None,
            timer_active: false,
            completions: 0,
            polls: 0,
            failed_polls: 0,
            messages_seen: 0,
            last_step: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn timer_active(&self) -> bool {
        self.timer_active
    }

    pub fn completions(&self) -> u32 {
        self.completions
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn failed_polls(&self) -> u64 {
        self.failed_polls
    }

    pub fn console(&self) -> &ConsoleLog {
        &self.console
    }

    fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }
}

enum Terminal {
    Complete(CompletionSummary),
    Failed(String),
    Cancelled,
}

struct Session<V, N, C> {
    kind: JobKind,
    options: PollerOptions,
    urls: PollerUrls,
    state: PollerState,
    view: V,
    navigator: N,
    confirm: C,
}

impl<V: ProgressView, N: Navigator, C: Confirm> Session<V, N, C> {
    fn begin(&mut self, starting: bool) {
        self.state.started_at = Some(Instant::now());
        self.state.phase = if starting { Phase::Starting } else { Phase::Polling };
        self.view.notice(
            Tone::Info,
            &format!("Connecting to the {} server...", self.kind),
        );
    }

    fn timer_started(&mut self) {
        self.state.timer_active = true;
        if self.state.phase == Phase::Idle {
            self.state.phase = Phase::Polling;
        }
    }

    fn timer_stopped(&mut self) {
        self.state.timer_active = false;
    }

    fn on_start_result(&mut self, res: Result<StartResponse, ApiError>) -> Option<Terminal> {
        if self.state.phase.is_terminal() {
            return None;
        }
        match res {
            Ok(resp) => {
                log::info!("{} start request accepted", self.kind);
                if let Some(url) = resp.redirect_url.filter(|u| !u.is_empty()) {
                    self.urls.results = url;
                }
                if self.state.phase == Phase::Starting {
                    self.state.phase = Phase::Polling;
                }
                None
            }
            Err(e) => Some(self.fail(format!("failed to start {}: {e}", self.kind))),
        }
    }

    fn on_snapshot(&mut self, snap: ProgressSnapshot) -> Option<Terminal> {
        if self.state.phase.is_terminal() {
            log::debug!("late progress response ignored");
            return None;
        }
        self.state.phase = Phase::Polling;
        self.state.polls += 1;

        let step = (snap.step(), snap.total_steps);
        if self.state.last_step != Some(step) {
            log::info!("{} step {}/{}: {}", self.kind, step.0, step.1, snap.current_message.trim());
            self.state.last_step = Some(step);
        }

        let vm = ViewModel::from_snapshot(self.kind, &snap, self.state.elapsed());
        self.view.render(&vm);
        let lines = self.state.console.ingest(&snap.step_messages);
        self.view.console(&lines);
        self.state.messages_seen = self.state.messages_seen.max(snap.step_messages.len());

        if let Some(reason) = snap.failure() {
            return Some(self.fail(reason));
        }
        if snap.is_complete {
            return Some(Terminal::Complete(self.complete(&snap)));
        }
        None
    }

    fn on_poll_error(&mut self, err: &ApiError) {
        if self.state.phase.is_terminal() {
            return;
        }
        self.state.failed_polls += 1;
        self.state.phase = Phase::ErrorRetrying;
        log::warn!("progress poll failed, retrying next tick: {err}");
    }

    fn complete(&mut self, snap: &ProgressSnapshot) -> CompletionSummary {
        self.state.phase = Phase::Complete;
        self.state.completions += 1;

        let summary = CompletionSummary {
            kind: self.kind,
            elapsed: format_elapsed(self.state.elapsed()),
            steps: format!("{}/{}", snap.current_step, snap.total_steps),
            messages: self.state.messages_seen,
            results_url: self.urls.absolute(&self.urls.results),
            redirect_in_ms: self.options.redirect_delay.as_millis() as u64,
        };
        log::info!("{} completed in {}", self.kind, summary.elapsed);
        self.view.completed(&summary);
        self.view.notice(
            Tone::Success,
            &format!("🎉 {} completed successfully!", self.kind),
        );
        self.view
            .notice(Tone::Info, &format!("⏱️ Total time: {}", summary.elapsed));
        summary
    }

    fn fail(&mut self, reason: String) -> Terminal {
        self.state.phase = Phase::Failed;
        log::error!("{} failed: {reason}", self.kind);
        self.view.failed(&reason);
        Terminal::Failed(reason)
    }

    fn clear_console(&mut self) {
        self.state.console.clear();
        self.view.notice(Tone::Info, "Console cleared");
    }

    /// A second `Cancel` while the question is open counts as yes.
    async fn confirm_cancel(&mut self, control: &mut mpsc::UnboundedReceiver<Control>) -> bool {
        let prompt = format!(
            "Stop following the {}? Current progress will be lost.",
            self.kind
        );
        let yes = tokio::select! {
            yes = self.confirm.confirm(&prompt) => yes,
            _ = next_cancel(control) => {
                log::info!("cancel repeated while asking");
                true
            }
        };
        if !yes {
            log::info!("cancel declined");
        }
        yes
    }

    fn cancel(&mut self) {
        self.state.phase = Phase::Cancelled;
        let url = self.urls.absolute(&self.urls.main);
        log::info!("{} cancelled by user", self.kind);
        self.view
            .notice(Tone::Warning, "🛑 Cancel confirmed. Redirecting...");
        self.view.cancelled(&url);
        self.navigator.navigate(&url);
    }

    /// Waits out the redirect delay, then opens the results page. A `Cancel`
    /// during the wait skips the page.
    async fn redirect(
        &mut self,
        summary: &CompletionSummary,
        control: &mut mpsc::UnboundedReceiver<Control>,
    ) {
        tokio::select! {
            _ = time::sleep(self.options.redirect_delay) => {
                self.navigator.navigate(&summary.results_url);
            }
            _ = next_cancel(control) => {
                log::info!("redirect to {} skipped", summary.results_url);
                self.view.notice(
                    Tone::Warning,
                    &format!("Redirect skipped. Results: {}", summary.results_url),
                );
            }
        }
    }
}

/// Resolves on the next `Cancel`, dropping other requests. Never resolves once
/// every handle is gone.
async fn next_cancel(control: &mut mpsc::UnboundedReceiver<Control>) {
    while let Some(cmd) = control.recv().await {
        if cmd == Control::Cancel {
            return;
        }
        log::debug!("{cmd:?} ignored while waiting");
    }
    std::future::pending::<()>().await
}

/// Drives one job: optional start request, then periodic polls until a terminal state.
pub struct ProgressPoller<B, V, N, C> {
    backend: B,
    session: Session<V, N, C>,
    control: mpsc::UnboundedReceiver<Control>,
}

impl<B, V, N, C> ProgressPoller<B, V, N, C>
where
    B: JobBackend,
    V: ProgressView,
    N: Navigator,
    C: Confirm,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: JobKind,
        backend: B,
        view: V,
        navigator: N,
        confirm: C,
        options: PollerOptions,
        urls: PollerUrls,
    ) -> (Self, PollerHandle) {
        let (tx, control) = mpsc::unbounded_channel();
        let state = PollerState::new(options.dedup);
        let poller = Self {
            backend,
            session: Session {
                kind,
                options,
                urls,
                state,
                view,
                navigator,
                confirm,
            },
            control,
        };
        (poller, PollerHandle { tx })
    }

    pub fn state(&self) -> &PollerState {
        &self.session.state
    }

    pub fn view(&self) -> &V {
        &self.session.view
    }

    pub fn navigator(&self) -> &N {
        &self.session.navigator
    }

    /// Runs the lifecycle once. With `form` the job is started first; without
    /// it an already running job is followed.
    ///
    /// The backend answers the start request only after the job is done, so
    /// the request runs alongside the polls instead of before them.
    pub async fn run(&mut self, form: Option<&JobForm>) -> PollOutcome {
        if self.session.state.phase != Phase::Idle {
            return PollOutcome::Failed("poller already ran".to_string());
        }

        let backend = &self.backend;
        let session = &mut self.session;
        let control = &mut self.control;
        let kind = session.kind;

        session.begin(form.is_some());

        let mut start = pin!(async move {
            match form {
                Some(form) => Some(backend.start_job(kind, form).await),
                None => None,
            }
        });
        let mut start_pending = form.is_some();

        let mut ticker = time::interval(session.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        session.timer_started();

        let mut inflight = FuturesUnordered::new();
        let mut control_open = true;

        let terminal = loop {
            tokio::select! {
                res = &mut start, if start_pending => {
                    start_pending = false;
                    if let Some(t) = res.and_then(|r| session.on_start_result(r)) {
                        break t;
                    }
                }
                _ = ticker.tick() => {
                    inflight.push(backend.fetch_progress(kind));
                }
                Some(res) = inflight.next(), if !inflight.is_empty() => {
                    let next = match res {
                        Ok(snap) => session.on_snapshot(snap),
                        Err(e) => {
                            session.on_poll_error(&e);
                            None
                        }
                    };
                    if let Some(t) = next {
                        break t;
                    }
                }
                cmd = control.recv(), if control_open => match cmd {
                    Some(Control::Refresh) => inflight.push(backend.fetch_progress(kind)),
                    Some(Control::ClearConsole) => session.clear_console(),
                    Some(Control::Cancel) => {
                        if session.confirm_cancel(control).await {
                            break Terminal::Cancelled;
                        }
                    }
                    None => control_open = false,
                },
            }
        };

        drop(ticker);
        drop(inflight);
        session.timer_stopped();

        match terminal {
            Terminal::Complete(summary) => {
                session.redirect(&summary, control).await;
                PollOutcome::Completed(summary)
            }
            Terminal::Failed(reason) => PollOutcome::Failed(reason),
            Terminal::Cancelled => {
                session.cancel();
                PollOutcome::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use super::*;
    use crate::console::ConsoleLine;
    use crate::snapshot::StepMessage;

    #[derive(Default)]
    struct ScriptedBackend {
        snapshots: RefCell<VecDeque<Result<ProgressSnapshot, ApiError>>>,
        last: RefCell<ProgressSnapshot>,
        start: RefCell<Option<Result<StartResponse, ApiError>>>,
        start_delay: Duration,
        fetches: Cell<u32>,
        starts: Cell<u32>,
    }

    impl ScriptedBackend {
        fn new(snapshots: Vec<Result<ProgressSnapshot, ApiError>>) -> Self {
            Self {
                snapshots: RefCell::new(snapshots.into()),
                // The real backend only answers once the job is over.
                start_delay: Duration::from_secs(3600),
                ..Default::default()
            }
        }

        fn with_start(mut self, res: Result<StartResponse, ApiError>, delay: Duration) -> Self {
            self.start = RefCell::new(Some(res));
            self.start_delay = delay;
            self
        }
    }

    impl JobBackend for ScriptedBackend {
        async fn start_job(&self, _: JobKind, _: &JobForm) -> Result<StartResponse, ApiError> {
            self.starts.set(self.starts.get() + 1);
            time::sleep(self.start_delay).await;
            self.start.borrow_mut().take().unwrap_or(Ok(StartResponse {
                success: true,
                ..Default::default()
            }))
        }

        async fn fetch_progress(&self, _: JobKind) -> Result<ProgressSnapshot, ApiError> {
            self.fetches.set(self.fetches.get() + 1);
            match self.snapshots.borrow_mut().pop_front() {
                Some(Ok(snap)) => {
                    *self.last.borrow_mut() = snap.clone();
                    Ok(snap)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last.borrow().clone()),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Render(ViewModel),
        Console(Vec<ConsoleLine>),
        Notice(Tone, String),
        Completed(CompletionSummary, Instant),
        Failed(String),
        Cancelled(String),
    }

    #[derive(Default)]
    struct RecordingView {
        events: Vec<Event>,
    }

    impl RecordingView {
        fn renders(&self) -> Vec<&ViewModel> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Render(vm) => Some(vm),
                    _ => None,
                })
                .collect()
        }

        fn console_lines(&self) -> Vec<String> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Console(lines) => Some(lines.iter().map(|l| l.message.clone())),
                    _ => None,
                })
                .flatten()
                .collect()
        }

        fn count(&self, f: impl Fn(&Event) -> bool) -> usize {
            self.events.iter().filter(|e| f(e)).count()
        }
    }

    impl ProgressView for RecordingView {
        fn render(&mut self, vm: &ViewModel) {
            self.events.push(Event::Render(vm.clone()));
        }
        fn console(&mut self, lines: &[ConsoleLine]) {
            self.events.push(Event::Console(lines.to_vec()));
        }
        fn notice(&mut self, tone: Tone, message: &str) {
            self.events.push(Event::Notice(tone, message.to_string()));
        }
        fn completed(&mut self, summary: &CompletionSummary) {
            self.events
                .push(Event::Completed(summary.clone(), Instant::now()));
        }
        fn failed(&mut self, message: &str) {
            self.events.push(Event::Failed(message.to_string()));
        }
        fn cancelled(&mut self, redirect_url: &str) {
            self.events.push(Event::Cancelled(redirect_url.to_string()));
        }
    }

    #[derive(Default)]
    struct RecordingNavigator {
        visits: Vec<(String, Instant)>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&mut self, url: &str) {
            self.visits.push((url.to_string(), Instant::now()));
        }
    }

    struct ScriptedConfirm {
        answers: VecDeque<bool>,
        asked: u32,
        /// Once out of answers, never reply, like a prompt nobody looks at.
        hang: bool,
    }

    impl ScriptedConfirm {
        fn answering(answers: &[bool]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                asked: 0,
                hang: false,
            }
        }
    }

    impl Confirm for ScriptedConfirm {
        async fn confirm(&mut self, _: &str) -> bool {
            self.asked += 1;
            match self.answers.pop_front() {
                Some(answer) => answer,
                None if self.hang => std::future::pending().await,
                None => false,
            }
        }
    }

    type TestPoller = ProgressPoller<ScriptedBackend, RecordingView, RecordingNavigator, ScriptedConfirm>;

    fn poller(kind: JobKind, backend: ScriptedBackend, answers: &[bool]) -> (TestPoller, PollerHandle) {
        ProgressPoller::new(
            kind,
            backend,
            RecordingView::default(),
            RecordingNavigator::default(),
            ScriptedConfirm::answering(answers),
            PollerOptions::for_kind(kind),
            PollerUrls::for_kind("http://forecast.test/", kind),
        )
    }

    fn messages(texts: &[&str]) -> Vec<StepMessage> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| StepMessage {
                timestamp: format!("10:00:{i:02}"),
                message: t.to_string(),
            })
            .collect()
    }

    fn example() -> ProgressSnapshot {
        ProgressSnapshot {
            percentage: Some(40),
            current_step: 2,
            total_steps: 5,
            current_substep: 1,
            total_substeps: 2,
            current_message: "loading".into(),
            step_messages: messages(&["loading"]),
            is_complete: false,
            error: None,
        }
    }

    fn finished() -> ProgressSnapshot {
        ProgressSnapshot {
            percentage: Some(100),
            current_step: 5,
            total_steps: 5,
            current_message: "✅ done".into(),
            step_messages: messages(&["loading", "training", "✅ done"]),
            is_complete: true,
            ..Default::default()
        }
    }

    fn polling_session(kind: JobKind) -> TestPoller {
        let (mut p, _) = poller(kind, ScriptedBackend::default(), &[]);
        p.session.begin(false);
        p.session.timer_started();
        p
    }

    #[test]
    fn incomplete_snapshot_keeps_timer() {
        let mut p = polling_session(JobKind::Training);
        assert!(p.session.on_snapshot(example()).is_none());
        assert!(p.state().timer_active());
        assert_eq!(p.state().phase(), Phase::Polling);

        let vm = p.view().renders()[0].clone();
        assert_eq!(vm.percentage_text, "40%");
        assert_eq!(vm.substep.as_ref().map(|s| s.percent), Some(50.0));
        assert_eq!(p.view().console_lines(), vec!["loading"]);
    }

    #[test]
    fn completion_happens_once() {
        let mut p = polling_session(JobKind::Training);
        assert!(matches!(
            p.session.on_snapshot(finished()),
            Some(Terminal::Complete(_))
        ));
        assert!(p.session.on_snapshot(finished()).is_none());
        assert_eq!(p.state().completions(), 1);
        assert_eq!(p.state().phase(), Phase::Complete);
        assert_eq!(p.view().count(|e| matches!(e, Event::Completed(..))), 1);
    }

    #[test]
    fn only_new_messages_reach_the_console() {
        let mut p = polling_session(JobKind::Prediction);
        let mut snap = example();
        snap.step_messages = messages(&["a", "b"]);
        p.session.on_snapshot(snap.clone());
        snap.step_messages = messages(&["a", "b", "c", "d", "e"]);
        p.session.on_snapshot(snap);

        let batches: Vec<usize> = p
            .view()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Console(lines) => Some(lines.len()),
                _ => None,
            })
            .collect();
        assert_eq!(batches, vec![2, 3]);
    }

    #[test]
    fn poll_errors_retry_without_surfacing() {
        let mut p = polling_session(JobKind::Training);
        p.session
            .on_poll_error(&ApiError::Rejected("connection reset".into()));
        assert_eq!(p.state().phase(), Phase::ErrorRetrying);
        assert_eq!(p.state().failed_polls(), 1);
        assert_eq!(p.view().count(|e| matches!(e, Event::Failed(_))), 0);

        p.session.on_snapshot(example());
        assert_eq!(p.state().phase(), Phase::Polling);
    }

    #[test]
    fn completed_job_with_error_marker_fails() {
        let mut p = polling_session(JobKind::Prediction);
        let snap = ProgressSnapshot {
            current_step: 3,
            total_steps: 6,
            current_message: "❌ No se pudieron generar predicciones".into(),
            is_complete: true,
            ..Default::default()
        };
        assert!(matches!(
            p.session.on_snapshot(snap),
            Some(Terminal::Failed(_))
        ));
        assert_eq!(p.state().phase(), Phase::Failed);
        assert_eq!(p.state().completions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_completes_and_redirects_after_delay() {
        let backend = ScriptedBackend::new(vec![Ok(example()), Ok(finished())]);
        let (mut p, _handle) = poller(JobKind::Training, backend, &[]);

        let outcome = p.run(Some(&JobForm::default())).await;

        let PollOutcome::Completed(summary) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(summary.results_url, "http://forecast.test/entrenamiento");
        assert_eq!(summary.steps, "5/5");
        assert!(!p.state().timer_active());
        assert_eq!(p.state().completions(), 1);
        assert_eq!(p.backend.fetches.get(), 2);
        assert_eq!(p.backend.starts.get(), 1);

        let completed_at = p
            .view()
            .events
            .iter()
            .find_map(|e| match e {
                Event::Completed(_, at) => Some(*at),
                _ => None,
            })
            .unwrap();
        let visits = &p.navigator().visits;
        assert_eq!(visits.len(), 1);
        assert_eq!(visits[0].0, "http://forecast.test/entrenamiento");
        assert!(visits[0].1 - completed_at >= Duration::from_millis(5000));

        // Console shows each message once across both polls.
        assert_eq!(p.view().console_lines(), vec!["loading", "training", "✅ done"]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let backend = ScriptedBackend::new(vec![
            Err(ApiError::Rejected("offline".into())),
            Ok(example()),
            Err(ApiError::Rejected("offline".into())),
            Ok(finished()),
        ]);
        let (mut p, _handle) = poller(JobKind::Prediction, backend, &[]);

        let outcome = p.run(None).await;

        assert!(matches!(outcome, PollOutcome::Completed(_)));
        assert_eq!(p.state().failed_polls(), 2);
        assert_eq!(p.backend.fetches.get(), 4);
        assert_eq!(p.backend.starts.get(), 0);
        assert_eq!(p.view().count(|e| matches!(e, Event::Failed(_))), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_failure_ends_the_run() {
        let backend = ScriptedBackend::new(vec![Ok(example())]).with_start(
            Err(ApiError::Rejected("Selecciona al menos un tipo de modelo".into())),
            Duration::from_millis(300),
        );
        let (mut p, _handle) = poller(JobKind::Training, backend, &[]);

        let outcome = p.run(Some(&JobForm::default())).await;

        let PollOutcome::Failed(reason) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(reason.contains("Selecciona al menos"));
        assert_eq!(p.state().phase(), Phase::Failed);
        assert!(!p.state().timer_active());
        assert!(p.navigator().visits.is_empty());
        assert_eq!(p.view().count(|e| matches!(e, Event::Failed(_))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_redirect_url_overrides_results_page() {
        let backend = ScriptedBackend::new(vec![Ok(example()), Ok(example()), Ok(finished())])
            .with_start(
                Ok(StartResponse {
                    success: true,
                    error: None,
                    redirect_url: Some("/prediccion/resultados?id=7".into()),
                }),
                Duration::from_millis(100),
            );
        let (mut p, _handle) = poller(JobKind::Prediction, backend, &[]);

        let outcome = p.run(Some(&JobForm::default())).await;

        let PollOutcome::Completed(summary) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(summary.results_url, "http://forecast.test/prediccion/resultados?id=7");
    }

    #[tokio::test(start_paused = true)]
    async fn declined_cancel_keeps_polling() {
        let backend = ScriptedBackend::new(vec![Ok(example()), Ok(example()), Ok(finished())]);
        let (mut p, handle) = poller(JobKind::Training, backend, &[false]);
        handle.cancel();

        let outcome = p.run(None).await;

        assert!(matches!(outcome, PollOutcome::Completed(_)));
        assert_eq!(p.session.confirm.asked, 1);
        assert_eq!(p.view().count(|e| matches!(e, Event::Cancelled(_))), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_cancel_stops_and_goes_to_main_page() {
        let backend = ScriptedBackend::new(vec![Ok(example())]);
        let (mut p, handle) = poller(JobKind::Prediction, backend, &[true]);
        handle.cancel();

        let outcome = p.run(Some(&JobForm::default())).await;

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(p.state().phase(), Phase::Cancelled);
        assert!(!p.state().timer_active());
        let visits: Vec<&str> = p.navigator().visits.iter().map(|(u, _)| u.as_str()).collect();
        assert_eq!(visits, vec!["http://forecast.test/prediccion"]);
        assert_eq!(p.state().completions(), 0);

        // A second run is refused.
        assert!(matches!(p.run(None).await, PollOutcome::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn second_cancel_while_asking_stops() {
        let backend = ScriptedBackend::new(vec![Ok(example())]);
        let (mut p, handle) = poller(JobKind::Training, backend, &[]);
        p.session.confirm.hang = true;
        handle.cancel();
        handle.cancel();

        let outcome = p.run(None).await;

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(p.session.confirm.asked, 1);
        let visits: Vec<&str> = p.navigator().visits.iter().map(|(u, _)| u.as_str()).collect();
        assert_eq!(visits, vec!["http://forecast.test/entrenamiento"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_redirect_wait_skips_results_page() {
        let backend = ScriptedBackend::new(vec![Ok(example()), Ok(finished())]);
        let (mut p, handle) = poller(JobKind::Training, backend, &[]);
        p.session.options.redirect_delay = Duration::from_secs(3600);

        let started = Instant::now();
        let (outcome, ()) = tokio::join!(p.run(None), async {
            time::sleep(Duration::from_secs(30)).await;
            handle.cancel();
        });

        assert!(matches!(outcome, PollOutcome::Completed(_)));
        assert!(Instant::now() - started < Duration::from_secs(60));
        assert!(p.navigator().visits.is_empty());
        assert_eq!(
            p.view()
                .count(|e| matches!(e, Event::Notice(_, m) if m.starts_with("Redirect skipped"))),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_still_happens_without_handles() {
        let backend = ScriptedBackend::new(vec![Ok(finished())]);
        let (mut p, handle) = poller(JobKind::Prediction, backend, &[]);
        drop(handle);

        let outcome = p.run(None).await;

        assert!(matches!(outcome, PollOutcome::Completed(_)));
        assert_eq!(p.navigator().visits.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_polls_immediately() {
        let backend = ScriptedBackend::new(vec![Ok(example()), Ok(finished())]);
        let (mut p, handle) = poller(JobKind::Prediction, backend, &[]);
        handle.refresh();

        let started = Instant::now();
        let outcome = p.run(None).await;

        assert!(matches!(outcome, PollOutcome::Completed(_)));
        // Tick at t=0 plus the refresh: both polls land before the first 5 s interval.
        let completed_at = p
            .view()
            .events
            .iter()
            .find_map(|e| match e {
                Event::Completed(_, at) => Some(*at),
                _ => None,
            })
            .unwrap();
        assert!(completed_at - started < JobKind::Prediction.default_interval());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_console_rerenders_window() {
        let backend = ScriptedBackend::new(vec![Ok(example()), Ok(finished())]);
        let (mut p, handle) = poller(JobKind::Training, backend, &[]);
        handle.clear_console();

        let outcome = p.run(None).await;

        assert!(matches!(outcome, PollOutcome::Completed(_)));
        assert_eq!(
            p.view()
                .count(|e| matches!(e, Event::Notice(_, m) if m == "Console cleared")),
            1
        );
        // Whether the clear landed before or after the first poll, the log
        // ends up holding the final window once.
        let kept: Vec<&str> = p
            .state()
            .console()
            .lines()
            .iter()
            .map(|l| l.message.as_str())
            .collect();
        assert_eq!(kept, vec!["loading", "training", "✅ done"]);
    }
}
