//! Chooses the data source once, at startup.

use std::sync::Arc;

use client::{DataSource, RemoteJobService, ServiceConfig};
use jobs_core::{JobService, ServiceError};

use crate::simulated::SimulatedJobService;
use crate::simulation::SimulationConfig;

/// Build the data source `config` selects.
///
/// The returned handle is shared by whoever needs it; nothing is cached
/// process-wide.
pub async fn create_job_service(
    config: &ServiceConfig,
    simulation: SimulationConfig,
) -> Result<Arc<dyn JobService>, ServiceError> {
    match config.data_source {
        DataSource::Remote => {
            tracing::info!(
                api = %config.api_base_url,
                push = %config.push_url,
                "Using remote job service"
            );
            let service = RemoteJobService::start(config).await?;
            Ok(Arc::new(service))
        }
        DataSource::Simulated => {
            tracing::info!(jobs = simulation.initial_jobs, "Using simulated job service");
            let service = SimulatedJobService::start(simulation).await?;
            Ok(Arc::new(service))
        }
    }
}
