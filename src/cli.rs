//! Command line definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Overrides;
use crate::console::DedupPolicy;
use crate::job::JobKind;
use crate::params::{self, ModelKind, PredictionParams, SarimaOrder, SeasonalOrder, TrainingParams};

/// Start forecasting jobs on the backend and follow their progress
#[derive(Debug, Parser)]
#[command(name = "forecast-console")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Backend base URL (default http://127.0.0.1:5000)
    #[arg(long, global = true, value_name = "URL")]
    pub server: Option<String>,

    /// Cookie header of a logged-in session, e.g. `session=...`
    #[arg(long, global = true, value_name = "COOKIE")]
    pub cookie: Option<String>,

    /// Extra config file, applied over the user and project files
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit JSON-lines events on stdout instead of progress bars
    #[arg(long, global = true)]
    pub json: bool,

    /// Answer yes to every confirmation
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Print the next page instead of opening a browser
    #[arg(long, global = true)]
    pub no_open: bool,

    /// Console de-duplication of repeated messages
    #[arg(long, global = true, value_enum)]
    pub dedup: Option<DedupPolicy>,

    /// Poll interval in milliseconds (overrides the per-job default)
    #[arg(long, global = true, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: Option<u64>,

    /// Delay before opening the results page, in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub redirect_delay_ms: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            server: self.server.clone(),
            session_cookie: self.cookie.clone(),
            json: self.json,
            no_open: self.no_open,
            dedup: self.dedup,
            interval_ms: self.interval_ms,
            redirect_delay_ms: self.redirect_delay_ms,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Train models on a data file and follow the run
    Train(TrainArgs),
    /// Generate predictions with the trained models and follow the run
    Predict(PredictArgs),
    /// Follow a job that was started elsewhere
    Watch(WatchArgs),
    /// List the data files available for training
    Files,
    /// List the model types the backend can train
    Models,
    /// List the trained models available for prediction
    Trained,
}

#[derive(Debug, Args)]
pub struct TrainArgs {
    /// Data file name as listed by `files`
    #[arg(short, long)]
    pub file: String,

    /// Models to train (default sarima,var)
    #[arg(short, long, value_enum, value_delimiter = ',')]
    pub models: Vec<ModelKind>,

    /// Held-out days at the end of the series
    #[arg(long, default_value_t = 180)]
    pub test_size: u32,

    /// SARIMA order `p,d,q`
    #[arg(long, value_name = "P,D,Q", default_value = "1,1,1", value_parser = params::parse_tuple::<3>)]
    pub sarima: [u32; 3],

    /// SARIMA seasonal order `P,D,Q,s`
    #[arg(long, value_name = "P,D,Q,S", default_value = "1,1,1,30", value_parser = params::parse_tuple::<4>)]
    pub seasonal: [u32; 4],

    /// Maximum lags for VAR
    #[arg(long, default_value_t = 15)]
    pub var_maxlags: u32,
}

impl TrainArgs {
    pub fn to_params(&self) -> TrainingParams {
        let defaults = TrainingParams::default();
        let [p, d, q] = self.sarima;
        let [sp, sd, sq, s] = self.seasonal;
        TrainingParams {
            data_file: self.file.clone(),
            test_size: self.test_size,
            models: if self.models.is_empty() {
                defaults.models
            } else {
                self.models.clone()
            },
            order: SarimaOrder { p, d, q },
            seasonal: SeasonalOrder {
                p: sp,
                d: sd,
                q: sq,
                s,
            },
            var_maxlags: self.var_maxlags,
        }
    }
}

#[derive(Debug, Args)]
pub struct PredictArgs {
    /// Days to predict (at most 365)
    #[arg(long, default_value_t = 30)]
    pub horizon: u32,
}

impl PredictArgs {
    pub fn to_params(&self) -> PredictionParams {
        PredictionParams {
            horizon_days: self.horizon,
        }
    }
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Which job to follow
    #[arg(value_enum)]
    pub kind: JobKind,
}
