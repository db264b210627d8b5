//! Wiring shared by the subcommands.

use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use clap::Args;
use marksync_core::marks::{ExamContext, MarkService};
use marksync_core::network::{ConnectivityProbe, HttpProbe, NetworkMonitor};
use marksync_core::storage::{Config, LocalStore};
use marksync_core::sync::HttpMarksApi;

pub type CliResult<T = ()> = Result<T, Box<dyn Error>>;

/// Exam a mark belongs to.
#[derive(Args, Debug, Clone)]
pub struct ExamArgs {
    /// Exam id
    #[arg(long)]
    pub exam: String,
    /// Academic year id
    #[arg(long)]
    pub year: String,
    /// Term id
    #[arg(long)]
    pub term: String,
    /// Class id
    #[arg(long = "class")]
    pub class: String,
}

impl ExamArgs {
    pub fn context(&self) -> ExamContext {
        ExamContext {
            exam_id: self.exam.clone(),
            academic_year_id: self.year.clone(),
            term_id: self.term.clone(),
            class_id: self.class.clone(),
        }
    }
}

/// Whether to check reachability before running a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Probe,
    Offline,
}

pub struct App {
    pub config: Config,
    pub service: MarkService,
    pub probe: Arc<HttpProbe>,
}

impl App {
    pub async fn open(connectivity: Connectivity) -> CliResult<Self> {
        let config = Config::load()?;
        let store = LocalStore::open(&config.store_path()?)?;
        let api = HttpMarksApi::from_config(&config)?;
        let probe = Arc::new(HttpProbe::new(api.base_url().clone(), config.api.timeout())?);

        let online = match connectivity {
            Connectivity::Probe => probe.check().await,
            Connectivity::Offline => false,
        };
        tracing::debug!(online, "connectivity at startup");

        let service = MarkService::new(
            store,
            Arc::new(api),
            Arc::new(NetworkMonitor::new(online)),
            &config,
        );
        Ok(Self {
            config,
            service,
            probe,
        })
    }
}

/// Run `fut` to completion on a single-threaded runtime.
pub fn block_on<F: Future>(fut: F) -> CliResult<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(fut))
}

/// Print `value` as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
