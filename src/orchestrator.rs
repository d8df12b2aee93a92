use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;

use crate::error::{MaestroError, Result};
use crate::state_machine::{Status, WorkflowSnapshot};
use crate::store::WorkflowStore;
use crate::tools::{DESIGN_UI, DEVELOP_LOGIC, STAGE_AND_TEST, ToolRegistry};

/// One stage of a pipeline: a tool and its static input.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStep {
    pub tool_name: String,
    pub input: Map<String, Value>,
}

impl PipelineStep {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            input: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.input.insert(key.to_string(), value);
        self
    }
}

/// Design, code generation, then staging.
pub fn default_steps(project_name: &str) -> Vec<PipelineStep> {
    vec![
        PipelineStep::new(DESIGN_UI)
            .with("projectName", json!(project_name))
            .with("requirements", json!("Modern, responsive web application")),
        PipelineStep::new(DEVELOP_LOGIC)
            .with("projectName", json!(project_name))
            .with("designSpec", json!("Use design from previous step")),
        PipelineStep::new(STAGE_AND_TEST)
            .with("projectName", json!(project_name))
            .with("codebase", json!("Use code from previous step")),
    ]
}

type StepPlanner = dyn Fn(&str) -> Vec<PipelineStep> + Send + Sync;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowRequest {
    pub project_name: String,
}

impl CreateWorkflowRequest {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
        }
    }

    /// Validate a raw request body.
    pub fn from_value(body: &Value) -> Result<Self> {
        match body.get("projectName") {
            Some(Value::String(name)) => Ok(Self::new(name.clone())),
            Some(_) => Err(MaestroError::Validation(
                "projectName must be a string".into(),
            )),
            None => Err(MaestroError::Validation("projectName is required".into())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowResponse {
    pub workflow_id: String,
    pub project_id: String,
    pub project_name: String,
    pub status: Status,
    pub message: String,
}

/// Drives workflows through their pipeline, one background task per run.
///
/// Steps within a workflow run strictly in order and stop at the first
/// failure. Every exit path leaves the workflow COMPLETED or FAILED.
#[derive(Clone)]
pub struct PipelineExecutor {
    store: Arc<dyn WorkflowStore>,
    registry: Arc<ToolRegistry>,
    planner: Arc<StepPlanner>,
}

impl PipelineExecutor {
    pub fn new(store: Arc<dyn WorkflowStore>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            store,
            registry,
            planner: Arc::new(default_steps),
        }
    }

    /// Replace the step plan built for each project.
    pub fn with_steps<F>(mut self, planner: F) -> Self
    where
        F: Fn(&str) -> Vec<PipelineStep> + Send + Sync + 'static,
    {
        self.planner = Arc::new(planner);
        self
    }

    pub async fn create_workflow(
        &self,
        request: &CreateWorkflowRequest,
    ) -> Result<CreateWorkflowResponse> {
        let name = request.project_name.trim();
        if name.is_empty() {
            return Err(MaestroError::Validation("projectName is required".into()));
        }

        let project = self.store.get_or_create_project(name).await?;
        let workflow = self.store.create_workflow(&project).await?;
        tracing::info!(workflow = %workflow.id, project = %project.name, "workflow created");

        let status = workflow.status();
        Ok(CreateWorkflowResponse {
            workflow_id: workflow.id,
            project_id: project.id,
            project_name: project.name,
            status,
            message: "Workflow created successfully".into(),
        })
    }

    /// Launch the run in the background and return at once.
    ///
    /// The handle resolves to the final status; callers may drop it and poll
    /// [`get_workflow`](Self::get_workflow) instead.
    pub async fn start_workflow(&self, workflow_id: &str) -> Result<JoinHandle<Result<Status>>> {
        if self.store.workflow(workflow_id).await?.is_none() {
            return Err(workflow_not_found(workflow_id));
        }

        let executor = self.clone();
        let id = workflow_id.to_string();
        Ok(tokio::spawn(async move {
            let outcome = executor.run_workflow(&id).await;
            if let Err(err) = &outcome {
                tracing::warn!(workflow = %id, error = %err, "workflow run not started");
            }
            outcome
        }))
    }

    /// Create a workflow and start it.
    pub async fn submit(
        &self,
        request: &CreateWorkflowRequest,
    ) -> Result<(CreateWorkflowResponse, JoinHandle<Result<Status>>)> {
        let mut created = self.create_workflow(request).await?;
        let handle = self.start_workflow(&created.workflow_id).await?;
        created.message = "Workflow created and started successfully".into();
        Ok((created, handle))
    }

    /// Run the pipeline to a terminal status.
    ///
    /// Fails only if the workflow cannot be claimed (unknown, or no longer
    /// PENDING). Once claimed, errors and panics are recorded on the workflow
    /// and the terminal status is returned.
    pub async fn run_workflow(&self, workflow_id: &str) -> Result<Status> {
        let workflow = self
            .store
            .workflow(workflow_id)
            .await?
            .ok_or_else(|| workflow_not_found(workflow_id))?;
        self.store
            .set_workflow_status(workflow_id, Status::Running)
            .await?;
        tracing::info!(workflow = %workflow_id, project = %workflow.project_name, "workflow started");

        let failure = match AssertUnwindSafe(self.run_steps(workflow_id, &workflow.project_name))
            .catch_unwind()
            .await
        {
            Ok(Ok(status)) => return Ok(status),
            Ok(Err(err)) => err.reason(),
            Err(panic) => panic_message(panic),
        };

        tracing::error!(workflow = %workflow_id, error = %failure, "workflow run aborted");
        Ok(self.abort(workflow_id, &failure).await)
    }

    async fn run_steps(&self, workflow_id: &str, project_name: &str) -> Result<Status> {
        let steps = (self.planner)(project_name);
        let mut previous: Option<Value> = None;

        for (index, step) in steps.into_iter().enumerate() {
            let mut input = step.input;
            if let Some(output) = previous.take() {
                input.insert("previousStepOutput".into(), output);
            }
            let input = Value::Object(input);

            let job = self
                .store
                .create_job(workflow_id, &step.tool_name, input.clone())
                .await?;
            self.store.start_job(workflow_id, &job.id).await?;
            tracing::debug!(workflow = %workflow_id, step = index, tool = %step.tool_name, "step started");

            match self.invoke_step(&step.tool_name, &input).await {
                Ok(output) => {
                    self.store
                        .complete_job(workflow_id, &job.id, output.clone())
                        .await?;
                    tracing::debug!(workflow = %workflow_id, step = index, "step completed");
                    previous = Some(output);
                }
                Err(err) => {
                    let reason = err.reason();
                    tracing::warn!(
                        workflow = %workflow_id,
                        step = index,
                        tool = %step.tool_name,
                        error = %reason,
                        "step failed"
                    );
                    self.store.fail_job(workflow_id, &job.id, &reason).await?;
                    self.store
                        .set_workflow_status(workflow_id, Status::Failed)
                        .await?;
                    tracing::info!(workflow = %workflow_id, "workflow failed");
                    return Ok(Status::Failed);
                }
            }
        }

        self.store
            .set_workflow_status(workflow_id, Status::Completed)
            .await?;
        tracing::info!(workflow = %workflow_id, "workflow completed");
        Ok(Status::Completed)
    }

    async fn invoke_step(&self, tool_name: &str, input: &Value) -> Result<Value> {
        match AssertUnwindSafe(self.registry.execute(tool_name, input))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(MaestroError::ToolExecution {
                tool_name: tool_name.to_string(),
                cause: panic_message(panic),
            }),
        }
    }

    // Best effort: fail whatever is still running, then the workflow.
    async fn abort(&self, workflow_id: &str, reason: &str) -> Status {
        let workflow = match self.store.workflow(workflow_id).await {
            Ok(Some(workflow)) => workflow,
            Ok(None) => return Status::Failed,
            Err(err) => {
                tracing::error!(workflow = %workflow_id, error = %err, "cannot read workflow");
                return Status::Failed;
            }
        };

        for job in workflow.jobs().iter().filter(|j| !j.status().is_terminal()) {
            let failed = async {
                if job.status() == Status::Pending {
                    self.store.start_job(workflow_id, &job.id).await?;
                }
                self.store.fail_job(workflow_id, &job.id, reason).await
            }
            .await;
            if let Err(err) = failed {
                tracing::error!(workflow = %workflow_id, job = %job.id, error = %err, "cannot fail job");
            }
        }

        if workflow.status().is_terminal() {
            return workflow.status();
        }
        match self
            .store
            .set_workflow_status(workflow_id, Status::Failed)
            .await
        {
            Ok(workflow) => workflow.status(),
            Err(err) => {
                tracing::error!(workflow = %workflow_id, error = %err, "cannot fail workflow");
                Status::Failed
            }
        }
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> Result<WorkflowSnapshot> {
        self.store
            .workflow(workflow_id)
            .await?
            .map(|w| WorkflowSnapshot::from(&w))
            .ok_or_else(|| workflow_not_found(workflow_id))
    }

    /// Most recent first.
    pub async fn list_workflows(&self) -> Result<Vec<WorkflowSnapshot>> {
        let workflows = self.store.workflows().await?;
        Ok(workflows.iter().map(WorkflowSnapshot::from).collect())
    }
}

fn workflow_not_found(workflow_id: &str) -> MaestroError {
    MaestroError::NotFound(format!("Workflow {workflow_id} not found"))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "tool panicked".to_string(),
        },
    }
}
