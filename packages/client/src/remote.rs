//! The real backend behind the `JobService` seam.

use std::sync::Arc;

use jobs_core::{
    ApiResponse, ConnectionState, CreateJobRequest, EventHandler, Job, JobId, JobService,
    JobStatus, ServiceError, ServiceFuture, Subscription,
};
use tokio::sync::watch;

use crate::config::ServiceConfig;
use crate::connection::{ConnectionError, ConnectionManager, PushTransport};
use crate::request::{HttpTransport, Method, RequestClient};
use crate::websocket::WebSocketTransport;

/// HTTP commands plus the push channel of one backend.
#[derive(Clone)]
pub struct RemoteJobService {
    requests: Arc<RequestClient>,
    connection: ConnectionManager,
}

impl RemoteJobService {
    /// Connect to the backend named in `config` over `reqwest` and WebSocket.
    ///
    /// The push channel is not opened until [`JobService::connect`].
    pub async fn start(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let requests = RequestClient::new(config.api_base_url.clone(), config.retry.clone());
        let push = Arc::new(WebSocketTransport::new(config.push_url.clone()));
        Self::with_parts(requests, push, config).await
    }

    /// Use custom transports, e.g. scripted ones.
    pub async fn with_transports(
        config: &ServiceConfig,
        http: Arc<dyn HttpTransport>,
        push: Arc<dyn PushTransport>,
    ) -> Result<Self, ServiceError> {
        let requests =
            RequestClient::with_transport(config.api_base_url.clone(), config.retry.clone(), http);
        Self::with_parts(requests, push, config).await
    }

    async fn with_parts(
        requests: RequestClient,
        push: Arc<dyn PushTransport>,
        config: &ServiceConfig,
    ) -> Result<Self, ServiceError> {
        let connection = ConnectionManager::start(push, config.retry.clone())
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;
        tracing::info!(base_url = %requests.base_url(), "Using remote job backend");
        Ok(Self {
            requests: Arc::new(requests),
            connection,
        })
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}

fn job_path(job_id: &JobId, action: &str) -> String {
    format!("/Jobs/{}/{}", job_id, action)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ServiceError> {
    serde_json::to_value(value).map_err(|e| ServiceError::Rejected(e.to_string()))
}

impl JobService for RemoteJobService {
    fn get_jobs(&self) -> ServiceFuture<Vec<Job>> {
        let requests = self.requests.clone();
        Box::pin(async move {
            requests
                .call_json::<Vec<Job>>(Method::Get, "/Jobs", None)
                .await
                .map_err(ServiceError::from)
        })
    }

    fn create_job(&self, request: CreateJobRequest) -> ServiceFuture<Job> {
        let requests = self.requests.clone();
        Box::pin(async move {
            let body = to_json(&request)?;
            requests
                .call_json::<Job>(Method::Post, "/Jobs", Some(body))
                .await
                .map_err(ServiceError::from)
        })
    }

    fn stop_job(&self, job_id: JobId) -> ServiceFuture<ApiResponse> {
        let requests = self.requests.clone();
        Box::pin(async move {
            let path = job_path(&job_id, "stop");
            requests
                .call_json::<ApiResponse>(Method::Post, &path, None)
                .await
                .map_err(ServiceError::from)
        })
    }

    fn restart_job(&self, job_id: JobId) -> ServiceFuture<ApiResponse> {
        let requests = self.requests.clone();
        Box::pin(async move {
            let path = job_path(&job_id, "restart");
            requests
                .call_json::<ApiResponse>(Method::Post, &path, None)
                .await
                .map_err(ServiceError::from)
        })
    }

    fn delete_job(&self, job_id: JobId) -> ServiceFuture<()> {
        let requests = self.requests.clone();
        Box::pin(async move {
            let path = format!("/Jobs/{}", job_id);
            requests
                .call_empty(Method::Delete, &path, None)
                .await
                .map_err(ServiceError::from)
        })
    }

    fn delete_jobs_by_status(&self, status: JobStatus) -> ServiceFuture<()> {
        let requests = self.requests.clone();
        Box::pin(async move {
            let path = format!("/Jobs/status/{}", u8::from(status));
            requests
                .call_empty(Method::Delete, &path, None)
                .await
                .map_err(ServiceError::from)
        })
    }

    fn subscribe(&self, handler: EventHandler) -> Subscription {
        self.connection.subscribe(handler)
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch()
    }

    fn connect(&self) -> ServiceFuture<()> {
        let connection = self.connection.clone();
        Box::pin(async move {
            connection
                .connect()
                .await
                .map_err(|e: ConnectionError| ServiceError::Unavailable(e.to_string()))
        })
    }

    fn shutdown(&self) -> ServiceFuture<()> {
        let connection = self.connection.clone();
        Box::pin(async move {
            connection.shutdown().await;
            Ok(())
        })
    }
}
