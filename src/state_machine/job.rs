use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::state::{StateMachine, Status};
use crate::error::Result;

/// The record of executing one pipeline step (one tool invocation).
///
/// Status, timestamps, output and error are private: the transition methods
/// below are the only writers, which keeps `started_at`/`completed_at`/`output`/
/// `error` consistent with `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub workflow_id: String,
    pub tool_name: String,
    pub input: Value,
    pub created_at: DateTime<Utc>,
    status: Status,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    output: Option<Value>,
    error: Option<String>,
}

impl Job {
    pub fn new(workflow_id: impl Into<String>, tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            tool_name: tool_name.into(),
            input,
            created_at: Utc::now(),
            status: Status::Pending,
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// PENDING → RUNNING. Records `started_at`.
    pub fn start(&mut self) -> Result<()> {
        self.status = StateMachine::transition(self.status, Status::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// RUNNING → COMPLETED. Records `completed_at` and the output.
    pub fn complete(&mut self, output: Value) -> Result<()> {
        self.status = StateMachine::transition(self.status, Status::Completed)?;
        self.completed_at = Some(Utc::now());
        self.output = Some(output);
        Ok(())
    }

    /// RUNNING → FAILED. Records `completed_at` and the error message.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.status = StateMachine::transition(self.status, Status::Failed)?;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
        Ok(())
    }

    /// Wall time between start and completion, if both happened.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}
