#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use client::{
    ConnectionError, EventStream, HttpTransport, Method, OpenFuture, PushTransport, RawResponse,
    TransportFuture,
};
use futures_util::stream;
use jobs_core::{ConnectionState, ProgressUpdate};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// A request seen by [`ScriptedHttp`].
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    pub at: Instant,
}

/// HTTP transport replaying canned responses in order.
#[derive(Default)]
pub struct ScriptedHttp {
    responses: Mutex<VecDeque<Result<RawResponse, String>>>,
    sent: Mutex<Vec<SentRequest>>,
}

impl ScriptedHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, status: u16, body: &str) {
        let mut response = RawResponse::new(status, body);
        if status >= 400 {
            response.reason = "Service Unavailable".to_string();
        }
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn fail(&self, error: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(error.to_string()));
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap().clone()
    }
}

impl HttpTransport for ScriptedHttp {
    fn send(&self, method: Method, url: String, body: Option<Value>) -> TransportFuture {
        self.sent.lock().unwrap().push(SentRequest {
            method,
            url,
            body,
            at: Instant::now(),
        });
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted response".to_string()));
        Box::pin(async move { next })
    }
}

type PushItem = Result<ProgressUpdate, ConnectionError>;

enum OpenScript {
    Refuse(String),
    Accept(mpsc::UnboundedReceiver<PushItem>),
}

/// Push transport whose open attempts follow a script.
///
/// Unscripted attempts are refused.
#[derive(Default)]
pub struct ScriptedPush {
    script: Mutex<VecDeque<OpenScript>>,
    opens: Mutex<Vec<Instant>>,
}

impl ScriptedPush {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Let the next attempt open; the returned sender feeds the channel and
    /// dropping it closes the channel.
    pub fn accept(&self) -> mpsc::UnboundedSender<PushItem> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script.lock().unwrap().push_back(OpenScript::Accept(rx));
        tx
    }

    pub fn refuse(&self, reason: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(OpenScript::Refuse(reason.to_string()));
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }
}

impl PushTransport for ScriptedPush {
    fn open(&self) -> OpenFuture {
        self.opens.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        Box::pin(async move {
            match next {
                Some(OpenScript::Accept(rx)) => {
                    let updates = stream::unfold(rx, |mut rx| async move {
                        rx.recv().await.map(|item| (item, rx))
                    });
                    Ok(Box::pin(updates) as EventStream)
                }
                Some(OpenScript::Refuse(reason)) => Err(ConnectionError::Open(reason)),
                None => Err(ConnectionError::Open("no scripted channel".to_string())),
            }
        })
    }
}

/// Wait until the watched connection state satisfies `predicate`.
pub async fn wait_for_state(
    rx: &mut watch::Receiver<ConnectionState>,
    predicate: impl FnMut(&ConnectionState) -> bool,
) -> ConnectionState {
    tokio::time::timeout(Duration::from_secs(600), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for connection state")
        .expect("connection state sender dropped")
        .clone()
}

/// Assert that two virtual instants are `expected_ms` apart, give or take
/// the timer wheel's millisecond rounding.
pub fn assert_gap(earlier: Instant, later: Instant, expected_ms: u64) {
    let gap = later.duration_since(earlier).as_millis() as u64;
    assert!(
        gap.abs_diff(expected_ms) <= 5,
        "expected a gap of {expected_ms}ms, got {gap}ms"
    );
}
