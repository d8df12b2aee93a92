use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::selector::{
    DelegationCandidate, DelegationSelector, KeywordScorer, Recommendation, Scorer, Task,
    default_catalog,
};
use crate::config::MaestroConfig;
use crate::error::{MaestroError, Result};
use crate::state_machine::{StateMachine, Status};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub preferred_service: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationRequest {
    pub task: Task,
    #[serde(default)]
    pub preferences: Option<Preferences>,
}

impl DelegationRequest {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            preferences: None,
        }
    }

    pub fn with_preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = Some(preferences);
        self
    }
}

/// A tracked assignment of a task to a collaborator service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegation {
    pub id: String,
    pub task_id: String,
    pub service: DelegationCandidate,
    pub task: Task,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Preferences>,
    pub created_at: DateTime<Utc>,
    status: Status,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<Value>,
    error: Option<String>,
}

impl Delegation {
    fn new(service: DelegationCandidate, task: Task, preferences: Option<Preferences>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: Uuid::new_v4().to_string(),
            service,
            task,
            preferences,
            created_at: now,
            status: Status::Pending,
            updated_at: now,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn transition(&mut self, to: Status) -> Result<()> {
        self.status = StateMachine::transition(self.status, to)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.transition(Status::Running)
    }

    fn complete(&mut self, result: Value) -> Result<()> {
        self.transition(Status::Completed)?;
        self.completed_at = Some(self.updated_at);
        self.result = Some(result);
        Ok(())
    }

    fn fail(&mut self, error: String) -> Result<()> {
        self.transition(Status::Failed)?;
        self.completed_at = Some(self.updated_at);
        self.error = Some(error);
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        if self.status == Status::Completed {
            return Err(MaestroError::InvalidState(
                "Cannot cancel a completed delegation".into(),
            ));
        }
        self.transition(Status::Cancelled)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DelegationFilter {
    pub status: Option<Status>,
    pub service: Option<String>,
}

impl DelegationFilter {
    fn accepts(&self, delegation: &Delegation) -> bool {
        self.status.is_none_or(|s| delegation.status == s)
            && self
                .service
                .as_deref()
                .is_none_or(|id| delegation.service.id == id)
    }
}

struct Inner {
    catalog: Vec<DelegationCandidate>,
    selector: DelegationSelector<Box<dyn Scorer>>,
    handoff: Duration,
    // Creation order.
    delegations: RwLock<Vec<Delegation>>,
}

/// Tracks delegations of tasks to external collaborator services.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DelegationService {
    inner: Arc<Inner>,
}

impl DelegationService {
    pub fn new(catalog: Vec<DelegationCandidate>, handoff: Duration) -> Self {
        Self::with_scorer(catalog, handoff, KeywordScorer)
    }

    pub fn with_scorer(
        catalog: Vec<DelegationCandidate>,
        handoff: Duration,
        scorer: impl Scorer + 'static,
    ) -> Self {
        let scorer: Box<dyn Scorer> = Box::new(scorer);
        Self {
            inner: Arc::new(Inner {
                catalog,
                selector: DelegationSelector::with_scorer(scorer),
                handoff,
                delegations: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn from_config(config: &MaestroConfig) -> Self {
        Self::new(default_catalog(), config.delegation_handoff())
    }

    pub fn services(&self) -> &[DelegationCandidate] {
        &self.inner.catalog
    }

    /// Record a delegation and start its handoff in the background.
    pub async fn delegate(&self, request: DelegationRequest) -> Result<Delegation> {
        let delegation = self.assign(request).await?;
        drop(self.spawn_handoff(&delegation.id));
        Ok(delegation)
    }

    /// Validate the request, pick a service and record a PENDING delegation.
    pub async fn assign(&self, request: DelegationRequest) -> Result<Delegation> {
        validate_task(&request.task)?;

        let preferred = request
            .preferences
            .as_ref()
            .and_then(|p| p.preferred_service.as_deref());
        let service = match preferred {
            Some(id) => self
                .inner
                .catalog
                .iter()
                .find(|s| s.id == id)
                .ok_or_else(|| MaestroError::NotFound(format!("Service '{id}' not found")))?,
            None => {
                self.inner
                    .selector
                    .select_best(&request.task, &self.inner.catalog)
                    .ok_or_else(|| {
                        MaestroError::NotFound("No suitable service found for this task".into())
                    })?
                    .candidate
            }
        };

        let delegation = Delegation::new(service.clone(), request.task, request.preferences);
        tracing::info!(
            delegation = %delegation.id,
            service = %delegation.service.id,
            "task delegated"
        );
        self.inner.delegations.write().await.push(delegation.clone());
        Ok(delegation)
    }

    pub fn spawn_handoff(&self, delegation_id: &str) -> JoinHandle<()> {
        let service = self.clone();
        let id = delegation_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = service.process(&id).await {
                tracing::warn!(delegation = %id, error = %err, "delegation handoff stopped");
            }
        })
    }

    /// Drive a PENDING delegation through handoff to COMPLETED.
    ///
    /// A delegation cancelled while waiting stays CANCELLED.
    pub async fn process(&self, delegation_id: &str) -> Result<Delegation> {
        let instructions = self
            .update(delegation_id, |d| {
                d.start()?;
                Ok(handoff_instructions(&d.task, &d.service))
            })
            .await?;

        tokio::time::sleep(self.inner.handoff).await;

        self.update(delegation_id, |d| {
            if d.status != Status::Running {
                return Ok(());
            }
            let result = json!({
                "instructions": instructions,
                "serviceUrl": d.service.url,
                "message": format!("Task ready for implementation in {}", d.service.name),
            });
            d.complete(result)?;
            tracing::info!(delegation = %d.id, "delegation completed");
            Ok(())
        })
        .await?;

        self.status(delegation_id).await
    }

    /// Record a failure on a running delegation.
    pub async fn fail(&self, delegation_id: &str, error: &MaestroError) -> Result<Delegation> {
        let reason = error.reason();
        self.update(delegation_id, move |d| d.fail(reason)).await?;
        self.status(delegation_id).await
    }

    pub async fn status(&self, delegation_id: &str) -> Result<Delegation> {
        self.inner
            .delegations
            .read()
            .await
            .iter()
            .find(|d| d.id == delegation_id)
            .cloned()
            .ok_or_else(|| not_found(delegation_id))
    }

    /// Delegations matching `filter`, most recent first.
    pub async fn list(&self, filter: &DelegationFilter) -> Vec<Delegation> {
        self.inner
            .delegations
            .read()
            .await
            .iter()
            .rev()
            .filter(|d| filter.accepts(d))
            .cloned()
            .collect()
    }

    pub async fn cancel(&self, delegation_id: &str) -> Result<Delegation> {
        self.update(delegation_id, Delegation::cancel).await?;
        tracing::info!(delegation = %delegation_id, "delegation cancelled");
        self.status(delegation_id).await
    }

    pub async fn recommend(&self, task: &Task) -> Result<Recommendation> {
        validate_task(task)?;
        self.inner
            .selector
            .recommend(task, &self.inner.catalog)
            .ok_or_else(|| MaestroError::NotFound("No suitable service found".into()))
    }

    async fn update<T>(
        &self,
        delegation_id: &str,
        apply: impl FnOnce(&mut Delegation) -> Result<T>,
    ) -> Result<T> {
        let mut delegations = self.inner.delegations.write().await;
        let delegation = delegations
            .iter_mut()
            .find(|d| d.id == delegation_id)
            .ok_or_else(|| not_found(delegation_id))?;
        apply(delegation)
    }
}

fn not_found(delegation_id: &str) -> MaestroError {
    MaestroError::NotFound(format!("Delegation {delegation_id} not found"))
}

fn validate_task(task: &Task) -> Result<()> {
    if task.description.trim().is_empty() {
        return Err(MaestroError::Validation("task.description is required".into()));
    }
    if task.task_type.trim().is_empty() {
        return Err(MaestroError::Validation("task.type is required".into()));
    }
    Ok(())
}

/// Markdown brief handed to the collaborator service.
pub fn handoff_instructions(task: &Task, service: &DelegationCandidate) -> String {
    let mut out = format!("# Task Delegation to {}\n\n", service.name);
    out.push_str(&format!("## Task Description\n{}\n\n", task.description));
    if let Some(title) = &task.title {
        out.push_str(&format!("## Title\n{title}\n\n"));
    }
    out.push_str(&format!("## Type\n{}\n\n", task.task_type));

    if !task.requirements.is_empty() {
        out.push_str("## Requirements\n");
        for req in &task.requirements {
            out.push_str(&format!("- {req}\n"));
        }
        out.push('\n');
    }

    out.push_str("## Service Specialties\n");
    for specialty in &service.specialties {
        out.push_str(&format!("- {specialty}\n"));
    }
    out.push('\n');

    out.push_str("## Next Steps\n");
    out.push_str(&format!("1. Open {}\n", service.url));
    out.push_str("2. Create a new project with the above specifications\n");
    out.push_str("3. Implement the requirements\n");
    out.push_str("4. Test the implementation\n");
    out.push_str("5. Return the results or share the project link\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> DelegationService {
        DelegationService::new(default_catalog(), Duration::ZERO)
    }

    fn react_task() -> Task {
        Task::new("build a react dashboard", "frontend")
    }

    #[tokio::test]
    async fn assign_selects_best_service() {
        let svc = service();
        let d = svc.assign(DelegationRequest::new(react_task())).await.unwrap();
        assert_eq!(d.service.id, "lovable");
        assert_eq!(d.status(), Status::Pending);
        assert!(d.result().is_none());
    }

    #[tokio::test]
    async fn preferred_service_overrides_selection() {
        let svc = service();
        let request = DelegationRequest::new(react_task()).with_preferences(Preferences {
            preferred_service: Some("cursor".into()),
            priority: Some("high".into()),
            deadline: None,
        });
        let d = svc.assign(request).await.unwrap();
        assert_eq!(d.service.id, "cursor");
        assert_eq!(d.preferences.unwrap().priority.as_deref(), Some("high"));
    }

    #[tokio::test]
    async fn unknown_preferred_service_is_not_found() {
        let svc = service();
        let request = DelegationRequest::new(react_task()).with_preferences(Preferences {
            preferred_service: Some("nope".into()),
            ..Default::default()
        });
        let err = svc.assign(request).await.unwrap_err();
        assert!(matches!(err, MaestroError::NotFound(_)));
        assert!(svc.list(&DelegationFilter::default()).await.is_empty());
    }

    #[tokio::test]
    async fn empty_description_is_rejected_before_recording() {
        let svc = service();
        let err = svc
            .assign(DelegationRequest::new(Task::new("  ", "frontend")))
            .await
            .unwrap_err();
        assert!(matches!(err, MaestroError::Validation(_)));
        assert!(svc.list(&DelegationFilter::default()).await.is_empty());
    }

    #[tokio::test]
    async fn process_completes_with_instructions() {
        let svc = service();
        let d = svc.assign(DelegationRequest::new(react_task())).await.unwrap();
        let done = svc.process(&d.id).await.unwrap();

        assert_eq!(done.status(), Status::Completed);
        assert!(done.completed_at().is_some());
        let result = done.result().unwrap();
        assert_eq!(result["serviceUrl"], "https://lovable.dev");
        assert_eq!(result["message"], "Task ready for implementation in lovable.dev");
        assert!(
            result["instructions"]
                .as_str()
                .unwrap()
                .starts_with("# Task Delegation to lovable.dev")
        );
    }

    #[tokio::test]
    async fn delegate_runs_handoff_in_background() {
        let svc = service();
        let d = svc.delegate(DelegationRequest::new(react_task())).await.unwrap();
        assert_eq!(d.status(), Status::Pending);

        for _ in 0..100 {
            if svc.status(&d.id).await.unwrap().status() == Status::Completed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("delegation never completed");
    }

    #[tokio::test]
    async fn cancel_completed_is_invalid_state() {
        let svc = service();
        let d = svc.assign(DelegationRequest::new(react_task())).await.unwrap();
        svc.process(&d.id).await.unwrap();

        let err = svc.cancel(&d.id).await.unwrap_err();
        assert!(matches!(err, MaestroError::InvalidState(_)));
        assert_eq!(err.reason(), "Cannot cancel a completed delegation");
        assert_eq!(svc.status(&d.id).await.unwrap().status(), Status::Completed);
    }

    #[tokio::test]
    async fn cancel_pending_then_processing_is_refused() {
        let svc = service();
        let d = svc.assign(DelegationRequest::new(react_task())).await.unwrap();
        let cancelled = svc.cancel(&d.id).await.unwrap();
        assert_eq!(cancelled.status(), Status::Cancelled);

        assert!(svc.process(&d.id).await.is_err());
        assert!(svc.cancel(&d.id).await.is_err());
        assert_eq!(svc.status(&d.id).await.unwrap().status(), Status::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_handoff_wins() {
        let svc = DelegationService::new(default_catalog(), Duration::from_secs(60));
        let d = svc.assign(DelegationRequest::new(react_task())).await.unwrap();
        let handle = svc.spawn_handoff(&d.id);

        // Let the handoff reach its wait.
        while svc.status(&d.id).await.unwrap().status() == Status::Pending {
            tokio::task::yield_now().await;
        }
        svc.cancel(&d.id).await.unwrap();
        handle.await.unwrap();

        let d = svc.status(&d.id).await.unwrap();
        assert_eq!(d.status(), Status::Cancelled);
        assert!(d.result().is_none());
    }

    #[tokio::test]
    async fn fail_records_reason() {
        let svc = service();
        let d = svc.assign(DelegationRequest::new(react_task())).await.unwrap();
        svc.update(&d.id, Delegation::start).await.unwrap();
        let failed = svc
            .fail(&d.id, &MaestroError::timeout())
            .await
            .unwrap();
        assert_eq!(failed.status(), Status::Failed);
        assert_eq!(failed.error(), Some("timeout"));
        assert!(svc.cancel(&d.id).await.is_err());
    }

    #[tokio::test]
    async fn unknown_delegation_is_not_found() {
        let svc = service();
        assert!(matches!(
            svc.status("missing").await.unwrap_err(),
            MaestroError::NotFound(_)
        ));
        assert!(matches!(
            svc.cancel("missing").await.unwrap_err(),
            MaestroError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn list_filters_and_orders_newest_first() {
        let svc = service();
        let first = svc.assign(DelegationRequest::new(react_task())).await.unwrap();
        let second = svc
            .assign(DelegationRequest::new(Task::new("fix a bug-fixing regression", "code-review")))
            .await
            .unwrap();
        svc.cancel(&first.id).await.unwrap();

        let all = svc.list(&DelegationFilter::default()).await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);
        assert_eq!(all[1].id, first.id);

        let cancelled = svc
            .list(&DelegationFilter {
                status: Some(Status::Cancelled),
                service: None,
            })
            .await;
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, first.id);

        let cursor = svc
            .list(&DelegationFilter {
                status: None,
                service: Some("cursor".into()),
            })
            .await;
        assert_eq!(cursor.len(), 1);
        assert_eq!(cursor[0].id, second.id);
    }

    #[tokio::test]
    async fn recommend_uses_catalog() {
        let svc = service();
        let rec = svc.recommend(&react_task()).await.unwrap();
        assert_eq!(rec.recommended.id, "lovable");
        assert_eq!(rec.alternatives.len(), 2);

        let empty = DelegationService::new(Vec::new(), Duration::ZERO);
        assert!(matches!(
            empty.recommend(&react_task()).await.unwrap_err(),
            MaestroError::NotFound(_)
        ));
    }

    #[test]
    fn instructions_include_requirements_and_title() {
        let mut task = react_task();
        task.title = Some("Dashboard".into());
        task.requirements = vec!["dark mode".into(), "charts".into()];
        let catalog = default_catalog();
        let text = handoff_instructions(&task, &catalog[1]);

        assert!(text.contains("## Title\nDashboard\n"));
        assert!(text.contains("## Requirements\n- dark mode\n- charts\n"));
        assert!(text.contains("- tailwind\n"));
        assert!(text.contains("1. Open https://lovable.dev\n"));
    }

    #[test]
    fn request_deserializes_from_wire_shape() {
        let request: DelegationRequest = serde_json::from_value(json!({
            "task": {"description": "build a react dashboard", "type": "frontend"},
            "preferences": {"preferredService": "v0", "deadline": "2026-12-01"},
        }))
        .unwrap();
        let prefs = request.preferences.unwrap();
        assert_eq!(prefs.preferred_service.as_deref(), Some("v0"));
        assert_eq!(prefs.deadline.as_deref(), Some("2026-12-01"));
    }
}
