#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::StoreSnapshot;
use jobs_core::{
    ApiResponse, ConnectionState, CreateJobRequest, EventHandler, EventHub, Job, JobId,
    JobService, JobStatus, Priority, ProgressUpdate, ServiceError, ServiceFuture, Subscription,
};
use tokio::sync::{mpsc, watch};

pub fn job(id: &str, status: JobStatus, progress: u8) -> Job {
    let mut job = Job::new(format!("{id} job"), Priority::Regular)
        .with_id(id)
        .with_progress(status, progress);
    if status != JobStatus::Pending && status != JobStatus::InQueue {
        job.started_at = job.created_at;
    }
    if matches!(status, JobStatus::Completed | JobStatus::Failed) {
        job.completed_at = job.created_at;
    }
    job
}

/// In-memory data source whose answers are scripted by the test.
///
/// Calls succeed unless a failure or rejection was queued; stop and
/// restart succeed without touching `jobs`, so only the store's own
/// mirroring is observed.
pub struct FakeService {
    jobs: Mutex<Vec<Job>>,
    failures: Mutex<VecDeque<ServiceError>>,
    rejections: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<&'static str>>,
    during_load: Mutex<Vec<ProgressUpdate>>,
    hub: Arc<EventHub>,
    state_tx: watch::Sender<ConnectionState>,
}

impl FakeService {
    pub fn new(jobs: Vec<Job>) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        Arc::new(Self {
            jobs: Mutex::new(jobs),
            failures: Mutex::new(VecDeque::new()),
            rejections: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            during_load: Mutex::new(Vec::new()),
            hub: EventHub::new(),
            state_tx,
        })
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: ServiceError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Answer the next stop or restart with `isSuccess = false`.
    pub fn reject_next(&self, message: &str) {
        self.rejections
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn emit(&self, update: ProgressUpdate) {
        self.hub.publish(&update);
    }

    /// Publish `update` from inside the next `get_jobs`, after its snapshot
    /// was taken.
    pub fn emit_during_next_load(&self, update: ProgressUpdate) {
        self.during_load.lock().unwrap().push(update);
    }

    pub fn set_connection(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    fn record(&self, call: &'static str) -> Result<(), ServiceError> {
        self.calls.lock().unwrap().push(call);
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn command(&self, call: &'static str) -> Result<ApiResponse, ServiceError> {
        self.record(call)?;
        Ok(match self.rejections.lock().unwrap().pop_front() {
            Some(message) => ApiResponse::failure(message),
            None => ApiResponse::success(format!("{call} ok")),
        })
    }
}

impl JobService for FakeService {
    fn get_jobs(&self) -> ServiceFuture<Vec<Job>> {
        let result = self
            .record("get_jobs")
            .map(|()| self.jobs.lock().unwrap().clone());
        let late: Vec<ProgressUpdate> = self.during_load.lock().unwrap().drain(..).collect();
        for update in &late {
            self.hub.publish(update);
        }
        Box::pin(async move { result })
    }

    fn create_job(&self, request: CreateJobRequest) -> ServiceFuture<Job> {
        let result = self
            .record("create_job")
            .map(|()| Job::new(request.name, request.priority));
        Box::pin(async move { result })
    }

    fn stop_job(&self, _job_id: JobId) -> ServiceFuture<ApiResponse> {
        let result = self.command("stop_job");
        Box::pin(async move { result })
    }

    fn restart_job(&self, _job_id: JobId) -> ServiceFuture<ApiResponse> {
        let result = self.command("restart_job");
        Box::pin(async move { result })
    }

    fn delete_job(&self, _job_id: JobId) -> ServiceFuture<()> {
        let result = self.record("delete_job");
        Box::pin(async move { result })
    }

    fn delete_jobs_by_status(&self, _status: JobStatus) -> ServiceFuture<()> {
        let result = self.record("delete_jobs_by_status");
        Box::pin(async move { result })
    }

    fn subscribe(&self, handler: EventHandler) -> Subscription {
        self.hub.subscribe(handler)
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn connect(&self) -> ServiceFuture<()> {
        let result = self.record("connect");
        if result.is_ok() {
            self.state_tx.send_replace(ConnectionState::connected());
        }
        Box::pin(async move { result })
    }

    fn shutdown(&self) -> ServiceFuture<()> {
        self.calls.lock().unwrap().push("shutdown");
        self.hub.clear();
        self.state_tx.send_replace(ConnectionState::default());
        Box::pin(async move { Ok(()) })
    }
}

/// Wait until the store publishes a snapshot satisfying `predicate`.
pub async fn wait_for_snapshot(
    rx: &mut watch::Receiver<StoreSnapshot>,
    predicate: impl FnMut(&StoreSnapshot) -> bool,
) -> StoreSnapshot {
    tokio::time::timeout(Duration::from_secs(600), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for store snapshot")
        .expect("store snapshot sender dropped")
        .clone()
}

/// Collects every event a source publishes.
pub fn record_events(
    service: &dyn JobService,
) -> (Subscription, mpsc::UnboundedReceiver<ProgressUpdate>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = service.subscribe(Arc::new(move |update: &ProgressUpdate| {
        let _ = tx.send(update.clone());
    }));
    (subscription, rx)
}

/// Next event for `job_id`, skipping others.
pub async fn next_event_for(
    rx: &mut mpsc::UnboundedReceiver<ProgressUpdate>,
    job_id: &JobId,
) -> ProgressUpdate {
    let wait = async {
        loop {
            let update = rx.recv().await.expect("event source closed");
            if &update.job_id == job_id {
                return update;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(600), wait)
        .await
        .expect("timed out waiting for event")
}
