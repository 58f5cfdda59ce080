//! Subcommand handlers.

use std::io::Write;

use serde::Serialize;

use crate::api::{BackendClient, DataFile};
use crate::cli::{Commands, PredictArgs, TrainArgs};
use crate::config::Settings;
use crate::job::JobKind;
use crate::navigate::{AnyConfirm, BrowserNavigator, Confirm, Navigator, PrintNavigator};
use crate::params::JobForm;
use crate::poller::{PollOutcome, PollerUrls, ProgressPoller};
use crate::render::AnyView;

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    /// Bad input, unreachable backend or a failed job.
    Error = 1,
    Cancelled = 2,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl From<&PollOutcome> for ExitCode {
    fn from(outcome: &PollOutcome) -> Self {
        match outcome {
            PollOutcome::Completed(_) => ExitCode::Success,
            PollOutcome::Failed(_) => ExitCode::Error,
            PollOutcome::Cancelled => ExitCode::Cancelled,
        }
    }
}

pub async fn run(command: Commands, settings: &Settings, assume_yes: bool) -> ExitCode {
    let result = match command {
        Commands::Train(args) => train(&args, settings, assume_yes).await,
        Commands::Predict(args) => predict(&args, settings, assume_yes).await,
        Commands::Watch(args) => match client(settings) {
            Ok(c) => Ok(follow(args.kind, c, None, settings, assume_yes).await),
            Err(e) => Err(e),
        },
        Commands::Files => files(settings).await,
        Commands::Models => models(settings).await,
        Commands::Trained => trained(settings).await,
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::Error
        }
    }
}

fn client(settings: &Settings) -> Result<BackendClient, String> {
    BackendClient::new(
        &settings.base_url,
        settings.session_cookie.as_deref(),
        settings.timeout,
    )
    .map_err(|e| e.to_string())
}

/// Shows the summary and asks before starting. `false` means the user backed out.
async fn confirm_start(kind: JobKind, summary: &[String], assume_yes: bool) -> bool {
    for line in summary {
        eprintln!("  {line}");
    }
    // Without a terminal to answer, nothing starts.
    AnyConfirm::new(assume_yes, false)
        .confirm(&format!("Start {kind}?"))
        .await
}

async fn train(args: &TrainArgs, settings: &Settings, assume_yes: bool) -> Result<ExitCode, String> {
    let params = args.to_params();
    params.validate().map_err(|e| e.to_string())?;
    let client = client(settings)?;

    if !confirm_start(JobKind::Training, &params.summary(), assume_yes).await {
        eprintln!("Not started.");
        return Ok(ExitCode::Cancelled);
    }
    Ok(follow(JobKind::Training, client, Some(params.to_form()), settings, assume_yes).await)
}

async fn predict(
    args: &PredictArgs,
    settings: &Settings,
    assume_yes: bool,
) -> Result<ExitCode, String> {
    let params = args.to_params();
    params.validate().map_err(|e| e.to_string())?;
    let client = client(settings)?;

    let trained = client.trained_models().await.map_err(|e| e.to_string())?;
    if trained.is_empty() {
        return Err("no trained models found; run `train` first".to_string());
    }
    log::info!("trained models: {}", trained.join(", "));

    if !confirm_start(JobKind::Prediction, &params.summary(), assume_yes).await {
        eprintln!("Not started.");
        return Ok(ExitCode::Cancelled);
    }
    Ok(follow(JobKind::Prediction, client, Some(params.to_form()), settings, assume_yes).await)
}

/// Runs the poller to a terminal state. Ctrl-C asks to cancel; a second Ctrl-C
/// while asking, or closed stdin, confirms it.
async fn follow(
    kind: JobKind,
    client: BackendClient,
    form: Option<JobForm>,
    settings: &Settings,
    assume_yes: bool,
) -> ExitCode {
    let navigator: Box<dyn Navigator> = if settings.open_browser {
        Box::new(BrowserNavigator)
    } else {
        Box::new(PrintNavigator)
    };
    let (mut poller, handle) = ProgressPoller::new(
        kind,
        client,
        AnyView::new(kind, settings.json),
        navigator,
        AnyConfirm::new(assume_yes, true),
        settings.poller_options(kind),
        PollerUrls::for_kind(&settings.base_url, kind),
    );

    let interrupts = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let outcome = poller.run(form.as_ref()).await;
    interrupts.abort();

    match &outcome {
        PollOutcome::Completed(summary) => log::info!("{kind} done: {}", summary.results_url),
        PollOutcome::Failed(reason) => eprintln!("error: {reason}"),
        PollOutcome::Cancelled => log::info!("{kind} cancelled"),
    }
    ExitCode::from(&outcome)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string(value).map_err(|e| e.to_string())?;
    writeln!(std::io::stdout(), "{text}").map_err(|e| e.to_string())
}

fn print_lines(lines: &[String]) -> Result<(), String> {
    let mut out = std::io::stdout().lock();
    for line in lines {
        writeln!(out, "{line}").map_err(|e| e.to_string())?;
    }
    Ok(())
}

pub fn format_data_file(f: &DataFile) -> String {
    let mut line = format!(
        "{}  {} rows  {} columns  {:.2} MB",
        f.name,
        f.rows,
        f.columns.len(),
        f.size_mb()
    );
    if let Some(modified) = &f.modified {
        line.push_str("  ");
        line.push_str(modified);
    }
    if f.is_recommended() {
        line.push_str("  (recommended)");
    }
    line
}

async fn files(settings: &Settings) -> Result<ExitCode, String> {
    let files = client(settings)?
        .list_data_files()
        .await
        .map_err(|e| e.to_string())?;
    if settings.json {
        print_json(&files)?;
    } else if files.is_empty() {
        eprintln!("No data files found.");
    } else {
        print_lines(&files.iter().map(format_data_file).collect::<Vec<_>>())?;
    }
    Ok(ExitCode::Success)
}

async fn models(settings: &Settings) -> Result<ExitCode, String> {
    let models = client(settings)?
        .available_models()
        .await
        .map_err(|e| e.to_string())?;
    if settings.json {
        print_json(&models)?;
    } else {
        print_lines(&models)?;
    }
    Ok(ExitCode::Success)
}

async fn trained(settings: &Settings) -> Result<ExitCode, String> {
    let trained = client(settings)?
        .trained_models()
        .await
        .map_err(|e| e.to_string())?;
    if settings.json {
        print_json(&trained)?;
    } else if trained.is_empty() {
        eprintln!("No trained models yet.");
    } else {
        print_lines(&trained)?;
    }
    Ok(ExitCode::Success)
}
