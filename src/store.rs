//! Persistence boundary for workflow and job records.
//!
//! The executor only talks to [`WorkflowStore`]; the store is the
//! authoritative state and every read returns a fresh copy. [`MemoryStore`]
//! backs tests and the CLI session. A relational backend would implement the
//! same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{MaestroError, Result};
use crate::state_machine::{Job, Project, Status, Workflow};

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Return the project with this name, creating it on first use.
    async fn get_or_create_project(&self, name: &str) -> Result<Project>;

    /// Persist a new PENDING workflow for `project`.
    async fn create_workflow(&self, project: &Project) -> Result<Workflow>;

    async fn workflow(&self, workflow_id: &str) -> Result<Option<Workflow>>;

    /// All workflows, most recent first.
    async fn workflows(&self) -> Result<Vec<Workflow>>;

    /// Apply a workflow status transition.
    async fn set_workflow_status(&self, workflow_id: &str, status: Status) -> Result<Workflow>;

    /// Append a PENDING job to the workflow.
    async fn create_job(&self, workflow_id: &str, tool_name: &str, input: Value) -> Result<Job>;

    async fn start_job(&self, workflow_id: &str, job_id: &str) -> Result<Job>;

    async fn complete_job(&self, workflow_id: &str, job_id: &str, output: Value) -> Result<Job>;

    async fn fail_job(&self, workflow_id: &str, job_id: &str, error: &str) -> Result<Job>;
}

#[derive(Default)]
struct Tables {
    projects: HashMap<String, Project>,
    // Creation order; listing walks it backwards.
    workflows: Vec<Workflow>,
}

impl Tables {
    fn workflow_mut(&mut self, workflow_id: &str) -> Result<&mut Workflow> {
        self.workflows
            .iter_mut()
            .find(|w| w.id == workflow_id)
            .ok_or_else(|| MaestroError::NotFound(format!("Workflow {workflow_id} not found")))
    }
}

/// In-process store guarded by an async lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update_job<F>(&self, workflow_id: &str, job_id: &str, apply: F) -> Result<Job>
    where
        F: FnOnce(&mut Job) -> Result<()> + Send,
    {
        let mut tables = self.tables.write().await;
        let job = tables.workflow_mut(workflow_id)?.job_mut(job_id)?;
        apply(job)?;
        Ok(job.clone())
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn get_or_create_project(&self, name: &str) -> Result<Project> {
        let mut tables = self.tables.write().await;
        let project = tables
            .projects
            .entry(name.to_string())
            .or_insert_with(|| Project::new(name));
        Ok(project.clone())
    }

    async fn create_workflow(&self, project: &Project) -> Result<Workflow> {
        let mut tables = self.tables.write().await;
        let workflow = Workflow::new(project);
        tables.workflows.push(workflow.clone());
        Ok(workflow)
    }

    async fn workflow(&self, workflow_id: &str) -> Result<Option<Workflow>> {
        let tables = self.tables.read().await;
        Ok(tables.workflows.iter().find(|w| w.id == workflow_id).cloned())
    }

    async fn workflows(&self) -> Result<Vec<Workflow>> {
        let tables = self.tables.read().await;
        Ok(tables.workflows.iter().rev().cloned().collect())
    }

    async fn set_workflow_status(&self, workflow_id: &str, status: Status) -> Result<Workflow> {
        let mut tables = self.tables.write().await;
        let workflow = tables.workflow_mut(workflow_id)?;
        match status {
            Status::Completed => workflow.complete()?,
            other => workflow.set_status(other)?,
        }
        Ok(workflow.clone())
    }

    async fn create_job(&self, workflow_id: &str, tool_name: &str, input: Value) -> Result<Job> {
        let mut tables = self.tables.write().await;
        let job = tables.workflow_mut(workflow_id)?.push_job(tool_name, input)?;
        Ok(job.clone())
    }

    async fn start_job(&self, workflow_id: &str, job_id: &str) -> Result<Job> {
        self.update_job(workflow_id, job_id, Job::start).await
    }

    async fn complete_job(&self, workflow_id: &str, job_id: &str, output: Value) -> Result<Job> {
        self.update_job(workflow_id, job_id, move |job| job.complete(output))
            .await
    }

    async fn fail_job(&self, workflow_id: &str, job_id: &str, error: &str) -> Result<Job> {
        let error = error.to_string();
        self.update_job(workflow_id, job_id, move |job| job.fail(error))
            .await
    }
}
