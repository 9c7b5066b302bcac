//! Headless job monitor: follows the job store and logs what a dashboard
//! would render.

use actors::{JobStore, SimulationConfig, StoreSnapshot, create_job_service};
use client::ServiceConfig;
use jobs_core::JobStatus;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::from_env()?;
    let service = create_job_service(&config, SimulationConfig::default()).await?;
    let store = JobStore::start(service).await?;

    let mut snapshots = store.watch();
    let mut last = Summary::of(&snapshots.borrow_and_update());
    last.log();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let summary = Summary::of(&snapshots.borrow_and_update());
                if summary != last {
                    summary.log();
                    last = summary;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    store.shutdown().await?;
    Ok(())
}

/// The parts of a snapshot worth a log line.
#[derive(Debug, PartialEq)]
struct Summary {
    counts: Vec<(JobStatus, usize)>,
    connection: String,
    notifications: Vec<String>,
}

impl Summary {
    fn of(snapshot: &StoreSnapshot) -> Self {
        let connection = match &snapshot.connection.last_error {
            Some(error) => format!("{:?} ({})", snapshot.connection.phase(), error),
            None => format!("{:?}", snapshot.connection.phase()),
        };
        Self {
            counts: JobStatus::ALL
                .iter()
                .map(|status| (*status, snapshot.counts.get(*status)))
                .collect(),
            connection,
            notifications: snapshot
                .notifications
                .iter()
                .map(|n| n.message.clone())
                .collect(),
        }
    }

    fn log(&self) {
        let counts = self
            .counts
            .iter()
            .map(|(status, count)| format!("{}={}", status.display().key, count))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(connection = %self.connection, "{}", counts);
        for message in &self.notifications {
            tracing::warn!("{}", message);
        }
    }
}
