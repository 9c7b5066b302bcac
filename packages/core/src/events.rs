//! Progress events carried over the push channel.

use serde::{Deserialize, Serialize};

use crate::job::deserialize_progress;
use crate::{Job, JobId, JobStatus};

/// Terminates every record on the hub channel.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Sent by the client right after the socket opens.
pub const HANDSHAKE_FRAME: &str = "{\"protocol\":\"json\",\"version\":1}\u{1e}";

/// Keep-alive record; also the client's answer to a server ping.
pub const PING_FRAME: &str = "{\"type\":6}\u{1e}";

/// Hub method the server invokes with a progress update.
pub const UPDATE_PROGRESS_TARGET: &str = "UpdateJobProgress";

/// A `(job, status, progress)` triple pushed by a live or simulated source.
///
/// There is no ordering key beyond arrival order; consumers apply the last
/// one received for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(rename = "jobID")]
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(deserialize_with = "deserialize_progress")]
    pub progress: u8,
}

impl ProgressUpdate {
    pub fn new(job_id: impl Into<JobId>, status: JobStatus, progress: u8) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            progress: progress.min(100),
        }
    }

    /// Snapshot the status and progress of a job.
    pub fn of(job: &Job) -> Self {
        Self::new(job.id.clone(), job.status, job.progress)
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        format!("Job {} -> {} ({}%)", self.job_id, self.status, self.progress)
    }
}

/// One decoded record from the hub channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubMessage {
    Progress(ProgressUpdate),
    /// The server expects a ping back.
    Ping,
    /// The server is closing the connection.
    Close { error: Option<String> },
    /// Handshake acknowledgements, other invocations and message types.
    Ignored,
}

const INVOCATION: u8 = 1;
const PING: u8 = 6;
const CLOSE: u8 = 7;

#[derive(Deserialize)]
struct HubRecord {
    #[serde(rename = "type")]
    kind: Option<u8>,
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<serde_json::Value>,
    error: Option<String>,
}

/// Hub method names match case-insensitively.
fn is_progress_target(target: &str) -> bool {
    target.eq_ignore_ascii_case(UPDATE_PROGRESS_TARGET)
}

/// Decode a single hub record, without its separator.
pub fn decode_message(record: &str) -> Result<HubMessage, serde_json::Error> {
    let record: HubRecord = serde_json::from_str(record)?;
    let message = match record.kind {
        // Handshake response: `{}` on success, `{"error": ..}` otherwise.
        None => match record.error {
            Some(error) => HubMessage::Close { error: Some(error) },
            None => HubMessage::Ignored,
        },
        Some(INVOCATION) if record.target.as_deref().is_some_and(is_progress_target) => {
            let Some(argument) = record.arguments.into_iter().next() else {
                return Err(serde::de::Error::custom("invocation has no arguments"));
            };
            HubMessage::Progress(serde_json::from_value(argument)?)
        }
        Some(PING) => HubMessage::Ping,
        Some(CLOSE) => HubMessage::Close {
            error: record.error,
        },
        Some(_) => HubMessage::Ignored,
    };
    Ok(message)
}

/// Decode every record in a text frame. Frames may batch several records.
pub fn decode_frame(text: &str) -> Vec<Result<HubMessage, serde_json::Error>> {
    text.split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|record| !record.is_empty())
        .map(decode_message)
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    const CAPTURED: &str = "{\"type\":1,\"target\":\"UpdateJobProgress\",\"arguments\":[{\"jobID\":\"5f0e3a3e-8c4b-4f5e-9d7a-2b1c6a0e9f11\",\"status\":2,\"progress\":41}]}\u{1e}";

    #[test]
    fn decodes_progress_invocations() {
        let messages = decode_frame(CAPTURED);
        assert_eq!(messages.len(), 1);
        let message = messages.into_iter().next().unwrap().unwrap();
        assert_eq!(
            message,
            HubMessage::Progress(ProgressUpdate::new(
                "5f0e3a3e-8c4b-4f5e-9d7a-2b1c6a0e9f11",
                JobStatus::Running,
                41
            ))
        );
    }

    #[test]
    fn decodes_control_records() {
        assert_eq!(decode_message("{}").unwrap(), HubMessage::Ignored);
        assert_eq!(decode_message(r#"{"type":6}"#).unwrap(), HubMessage::Ping);
        assert_eq!(
            decode_message(r#"{"type":7,"error":"Server shutting down"}"#).unwrap(),
            HubMessage::Close {
                error: Some("Server shutting down".into())
            }
        );
        assert_eq!(
            decode_message(r#"{"type":7}"#).unwrap(),
            HubMessage::Close { error: None }
        );
        assert_eq!(
            decode_message(r#"{"error":"Requested protocol 'json' is not available"}"#).unwrap(),
            HubMessage::Close {
                error: Some("Requested protocol 'json' is not available".into())
            }
        );
    }

    #[test]
    fn ignores_other_invocations() {
        let text = r#"{"type":1,"target":"JobDeleted","arguments":["job-1"]}"#;
        assert_eq!(decode_message(text).unwrap(), HubMessage::Ignored);
        assert_eq!(
            decode_message(r#"{"type":3,"invocationId":"1"}"#).unwrap(),
            HubMessage::Ignored
        );
    }

    #[test]
    fn rejects_malformed_records() {
        assert!(decode_message("not json").is_err());
        let bad_status = r#"{"type":1,"target":"UpdateJobProgress","arguments":[{"jobID":"x","status":42,"progress":1}]}"#;
        assert!(decode_message(bad_status).is_err());
        let empty = r#"{"type":1,"target":"UpdateJobProgress","arguments":[]}"#;
        assert!(decode_message(empty).is_err());
    }

    #[test]
    fn control_frames_are_terminated_records() {
        assert_eq!(decode_frame(PING_FRAME).len(), 1);
        assert!(HANDSHAKE_FRAME.ends_with(RECORD_SEPARATOR));
        let handshake: serde_json::Value =
            serde_json::from_str(HANDSHAKE_FRAME.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(handshake["protocol"], "json");
        assert_eq!(handshake["version"], 1);
    }
}
