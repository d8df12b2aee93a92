use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::job::Job;
use super::state::{StateMachine, Status};
use crate::error::{MaestroError, Result};

/// A named project that owns workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// A single run of the pipeline for one project.
///
/// Workflow status is pushed by the executor, never derived from the jobs on
/// read. `complete` still refuses to run unless every job completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub project_id: String,
    pub project_name: String,
    pub created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    status: Status,
    jobs: Vec<Job>,
}

impl Workflow {
    pub fn new(project: &Project) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            project_name: project.name.clone(),
            created_at: now,
            updated_at: now,
            status: Status::Pending,
            jobs: Vec::new(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Jobs in creation order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, job_id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == job_id)
    }

    /// Mutable access to one job, for applying its own transitions.
    pub fn job_mut(&mut self, job_id: &str) -> Result<&mut Job> {
        let job = self
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| MaestroError::NotFound(format!("Job {job_id} not found")))?;
        self.updated_at = Utc::now();
        Ok(job)
    }

    /// Append a new PENDING job. Refused once the workflow is terminal.
    pub fn push_job(&mut self, tool_name: &str, input: Value) -> Result<&Job> {
        if self.status.is_terminal() {
            return Err(MaestroError::InvalidState(format!(
                "workflow {} is {} and accepts no new jobs",
                self.id, self.status
            )));
        }
        self.jobs.push(Job::new(self.id.clone(), tool_name, input));
        self.updated_at = Utc::now();
        // Just pushed, so the vector is non-empty.
        Ok(&self.jobs[self.jobs.len() - 1])
    }

    pub fn start(&mut self) -> Result<()> {
        self.set_status(Status::Running)
    }

    pub fn complete(&mut self) -> Result<()> {
        if let Some(job) = self.jobs.iter().find(|j| j.status() != Status::Completed) {
            return Err(MaestroError::InvalidState(format!(
                "workflow {} cannot complete: job {} is {}",
                self.id,
                job.id,
                job.status()
            )));
        }
        self.set_status(Status::Completed)
    }

    pub fn fail(&mut self) -> Result<()> {
        self.set_status(Status::Failed)
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.set_status(Status::Cancelled)
    }

    /// Apply an arbitrary target status through the legality table.
    pub fn set_status(&mut self, to: Status) -> Result<()> {
        self.status = StateMachine::transition(self.status, to)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Read view of a workflow as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSnapshot {
    pub id: String,
    pub project_name: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub jobs: Vec<JobSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: String,
    pub tool_name: String,
    pub status: Status,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub output: Option<Value>,
}

impl From<&Job> for JobSnapshot {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            tool_name: job.tool_name.clone(),
            status: job.status(),
            started_at: job.started_at(),
            completed_at: job.completed_at(),
            error: job.error().map(str::to_string),
            output: job.output().cloned(),
        }
    }
}

impl From<&Workflow> for WorkflowSnapshot {
    fn from(workflow: &Workflow) -> Self {
        Self {
            id: workflow.id.clone(),
            project_name: workflow.project_name.clone(),
            status: workflow.status(),
            created_at: workflow.created_at,
            updated_at: workflow.updated_at(),
            jobs: workflow.jobs().iter().map(JobSnapshot::from).collect(),
        }
    }
}

impl JobSnapshot {
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}
