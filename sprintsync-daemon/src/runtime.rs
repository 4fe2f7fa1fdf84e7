use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use sprintsync_core::{Config, SyncMode};
use sprintsync_sync::pipeline;

use crate::{Clients, DaemonError};

/// What the scheduler logs after a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: SyncMode,
    pub unique_rows: usize,
    pub associations_upserted: usize,
    pub associations_removed: usize,
    pub duration_ms: u128,
}

/// Start the scheduler and block the current thread until it exits.
pub fn start_blocking(config: Config, json_logs: bool) -> Result<(), DaemonError> {
    init_tracing(json_logs);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(DaemonError::Runtime)?;
    let clients = Clients::from_config(&config)?;
    runtime.block_on(run(config, clients))
}

/// Run the scheduler until ctrl-c.
pub async fn run(config: Config, clients: Clients) -> Result<(), DaemonError> {
    let period = Duration::from_secs(config.sync_interval_minutes.max(1) * 60);
    let config = Arc::new(config);
    let clients = Arc::new(clients);
    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    tracing::info!(
        interval_minutes = config.sync_interval_minutes,
        tracker = clients.tracker.is_some(),
        "sync daemon started"
    );

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = schedule(period, shutdown_rx, move |mode| {
                let config = config.clone();
                let clients = clients.clone();
                async move { run_once(&config, &clients, mode).await }
            })
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, stopping after the current run");
                        let _ = shutdown.send(());
                        Ok(())
                    }
                    Err(err) => Err(DaemonError::Signal(err.to_string())),
                },
            }
        })
    };

    let (scheduler_result, signal_result) = tokio::join!(scheduler_handle, signal_handle);
    handle_join("scheduler", scheduler_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("sync daemon stopped");
    Ok(())
}

/// Drive `job` on a fixed period until shutdown.
///
/// The first tick fires immediately with [`SyncMode::Full`]; every later
/// tick runs [`SyncMode::Incremental`]. A failed job is logged and the loop
/// continues. Shutdown is only observed between jobs.
pub async fn schedule<F, Fut>(
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
    mut job: F,
) -> Result<(), DaemonError>
where
    F: FnMut(SyncMode) -> Fut,
    Fut: Future<Output = Result<RunSummary, DaemonError>>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut mode = SyncMode::Full;

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                match job(mode).await {
                    Ok(summary) => tracing::info!(
                        mode = %summary.mode,
                        unique_rows = summary.unique_rows,
                        associations_upserted = summary.associations_upserted,
                        associations_removed = summary.associations_removed,
                        duration_ms = summary.duration_ms as u64,
                        "scheduled sync finished"
                    ),
                    Err(err) => tracing::error!(%mode, error = %err, "scheduled sync failed"),
                }
                mode = SyncMode::Incremental;
            }
        }
    }
    Ok(())
}

async fn run_once(config: &Config, clients: &Clients, mode: SyncMode) -> Result<RunSummary, DaemonError> {
    let started = Instant::now();
    let report = pipeline::run(clients.context(config), mode).await?;
    Ok(RunSummary {
        mode,
        unique_rows: report.unique_rows,
        associations_upserted: report.issue_sprints.upserted,
        associations_removed: report.issue_sprints.marked_removed,
        duration_ms: started.elapsed().as_millis(),
    })
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join {
            task,
            reason: err.to_string(),
        }),
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
/// Output goes to stderr so stdout stays free for command results.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
