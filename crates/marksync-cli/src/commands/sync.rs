//! Sync subcommand: push queued marks to the server.

use std::sync::Arc;

use clap::Subcommand;
use marksync_core::network::spawn_probe;
use marksync_core::sync::{SkipReason, SyncReport, SyncStatus};

use crate::common::{block_on, print_json, App, CliResult, Connectivity};

#[derive(Subcommand)]
pub enum SyncAction {
    /// Run one sync pass now
    Run {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show queue and connectivity status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Archive synced queue entries older than sync.retention_days
    Compact,
    /// Keep running: probe connectivity and sync whenever it comes back
    Watch,
}

pub fn run(action: SyncAction) -> CliResult {
    match action {
        SyncAction::Run { json } => block_on(run_once(json))?,
        SyncAction::Status { json } => block_on(status(json))?,
        SyncAction::Compact => block_on(compact())?,
        SyncAction::Watch => block_on(watch())?,
    }
}

async fn run_once(json: bool) -> CliResult {
    let app = App::open(Connectivity::Probe).await?;
    let recovered = app.service.engine().recover_orphans().await?;
    if recovered > 0 && !json {
        println!("re-queued {recovered} unsynced mark(s)");
    }
    let report = app.service.trigger_sync().await?;
    if json {
        return print_json(&report);
    }
    print_report(&report);
    if report.auth_required {
        return Err("server rejected the API token; set api.token or MARKSYNC_TOKEN".into());
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    match report.reason {
        Some(SkipReason::Offline) => println!("offline: nothing sent, marks stay queued"),
        Some(SkipReason::InProgress) => println!("a sync pass is already running"),
        None => println!(
            "synced {}, failed {}, still pending {}",
            report.synced, report.failed, report.pending
        ),
    }
}

async fn status(json: bool) -> CliResult {
    let app = App::open(Connectivity::Probe).await?;
    let status = app.service.get_sync_status().await?;
    if json {
        return print_json(&status);
    }
    print_status(&status);
    Ok(())
}

fn print_status(status: &SyncStatus) {
    println!("online:        {}", status.online);
    println!("marks:         {} ({} synced, {} unsynced)", status.total_marks, status.synced_count, status.unsynced_count);
    println!("queue pending: {}", status.pending_count);
    println!("queue errors:  {}", status.error_count);
    match status.last_sync_at {
        Some(at) => println!("last sync:     {}", at.to_rfc3339()),
        None => println!("last sync:     never (this session)"),
    }
}

async fn compact() -> CliResult {
    let app = App::open(Connectivity::Offline).await?;
    let moved = app.service.compact_queue().await?;
    println!("archived {moved} queue entr{}", if moved == 1 { "y" } else { "ies" });
    Ok(())
}

async fn watch() -> CliResult {
    let app = App::open(Connectivity::Probe).await?;
    let recovered = app.service.start().await?;
    tracing::info!(recovered, online = app.service.monitor().is_online(), "watching for connectivity");

    let probe = spawn_probe(
        Arc::clone(app.service.monitor()),
        app.probe.clone(),
        app.config.sync.probe_interval(),
    );
    probe.await?;
    Ok(())
}
