//! Aggregations over workflow and job records.
//!
//! Every figure is computed from one read of [`WorkflowStore::workflows`];
//! nothing is cached. Percentages and durations are rounded to two decimals.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state_machine::{Job, Status, Workflow};
use crate::store::WorkflowStore;

const STATUS_ORDER: [Status; 5] = [
    Status::Pending,
    Status::Running,
    Status::Completed,
    Status::Failed,
    Status::Cancelled,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUsage {
    pub tool_name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolFailureRate {
    pub tool_name: String,
    pub total_jobs: usize,
    pub failed_jobs: usize,
    pub success_jobs: usize,
    pub failure_rate: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusShare {
    pub status: Status,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDuration {
    pub average_duration_seconds: f64,
    pub total_workflows: usize,
    pub completed_workflows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Workflow,
    Job,
}

/// One line of the activity feed. `name` is the project for workflows and
/// the tool for jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub id: String,
    pub name: String,
    pub status: Status,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPerformance {
    pub tool_name: String,
    /// Finished jobs only (COMPLETED or FAILED).
    pub total_executions: usize,
    pub average_duration_seconds: f64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_workflows: usize,
    pub total_jobs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub overview: Overview,
    pub most_used_tools: Vec<ToolUsage>,
    pub failure_rates: Vec<ToolFailureRate>,
    pub workflow_statuses: Vec<StatusShare>,
    pub job_statuses: Vec<StatusShare>,
    pub workflow_duration: WorkflowDuration,
    pub recent_activity: Vec<Activity>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 * 100.0 / whole as f64)
    }
}

fn jobs(workflows: &[Workflow]) -> impl Iterator<Item = &Job> {
    workflows.iter().flat_map(|w| w.jobs())
}

/// Tools by invocation count, busiest first; ties by name.
pub fn most_used_tools(workflows: &[Workflow], limit: usize) -> Vec<ToolUsage> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for job in jobs(workflows) {
        *counts.entry(job.tool_name.as_str()).or_default() += 1;
    }
    let mut usage: Vec<ToolUsage> = counts
        .into_iter()
        .map(|(tool_name, count)| ToolUsage {
            tool_name: tool_name.to_string(),
            count,
        })
        .collect();
    usage.sort_by(|a, b| b.count.cmp(&a.count));
    usage.truncate(limit);
    usage
}

pub fn tool_failure_rate(workflows: &[Workflow], tool_name: &str) -> ToolFailureRate {
    let mut total = 0;
    let mut failed = 0;
    let mut succeeded = 0;
    for job in jobs(workflows).filter(|j| j.tool_name == tool_name) {
        total += 1;
        match job.status() {
            Status::Failed => failed += 1,
            Status::Completed => succeeded += 1,
            _ => {}
        }
    }
    ToolFailureRate {
        tool_name: tool_name.to_string(),
        total_jobs: total,
        failed_jobs: failed,
        success_jobs: succeeded,
        failure_rate: percent(failed, total),
        success_rate: percent(succeeded, total),
    }
}

/// Failure rates for every tool seen, most jobs first; ties by name.
pub fn failure_rates(workflows: &[Workflow]) -> Vec<ToolFailureRate> {
    let mut rates: Vec<ToolFailureRate> = most_used_tools(workflows, usize::MAX)
        .into_iter()
        .map(|usage| tool_failure_rate(workflows, &usage.tool_name))
        .collect();
    rates.sort_by(|a, b| b.total_jobs.cmp(&a.total_jobs));
    rates
}

fn distribution(statuses: impl Iterator<Item = Status>) -> Vec<StatusShare> {
    let mut counts = [0usize; STATUS_ORDER.len()];
    let mut total = 0;
    for status in statuses {
        if let Some(slot) = STATUS_ORDER.iter().position(|s| *s == status) {
            counts[slot] += 1;
            total += 1;
        }
    }
    STATUS_ORDER
        .iter()
        .zip(counts)
        .filter(|(_, count)| *count > 0)
        .map(|(status, count)| StatusShare {
            status: *status,
            count,
            percentage: percent(count, total),
        })
        .collect()
}

/// Non-zero statuses only, in lifecycle order. Empty when there are no workflows.
pub fn workflow_status_distribution(workflows: &[Workflow]) -> Vec<StatusShare> {
    distribution(workflows.iter().map(Workflow::status))
}

pub fn job_status_distribution(workflows: &[Workflow]) -> Vec<StatusShare> {
    distribution(jobs(workflows).map(Job::status))
}

/// Mean of `updated_at - created_at` over COMPLETED workflows.
pub fn average_workflow_duration(workflows: &[Workflow]) -> WorkflowDuration {
    let durations: Vec<i64> = workflows
        .iter()
        .filter(|w| w.status() == Status::Completed)
        .map(|w| (w.updated_at() - w.created_at).num_milliseconds())
        .collect();
    let average_ms = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<i64>() as f64 / durations.len() as f64
    };
    WorkflowDuration {
        average_duration_seconds: round2(average_ms / 1000.0),
        total_workflows: workflows.len(),
        completed_workflows: durations.len(),
    }
}

/// Workflows and jobs merged by creation time, newest first.
pub fn recent_activity(workflows: &[Workflow], limit: usize) -> Vec<Activity> {
    let mut activity: Vec<Activity> = workflows
        .iter()
        .map(|w| Activity {
            kind: ActivityKind::Workflow,
            id: w.id.clone(),
            name: w.project_name.clone(),
            status: w.status(),
            timestamp: w.created_at,
        })
        .chain(jobs(workflows).map(|j| Activity {
            kind: ActivityKind::Job,
            id: j.id.clone(),
            name: j.tool_name.clone(),
            status: j.status(),
            timestamp: j.created_at,
        }))
        .collect();
    activity.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    activity.truncate(limit);
    activity
}

pub fn tool_performance(workflows: &[Workflow], tool_name: &str) -> ToolPerformance {
    let finished: Vec<&Job> = jobs(workflows)
        .filter(|j| j.tool_name == tool_name)
        .filter(|j| matches!(j.status(), Status::Completed | Status::Failed))
        .collect();

    let durations: Vec<i64> = finished.iter().filter_map(|j| j.duration_ms()).collect();
    let average_ms = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<i64>() as f64 / durations.len() as f64
    };
    let succeeded = finished
        .iter()
        .filter(|j| j.status() == Status::Completed)
        .count();

    ToolPerformance {
        tool_name: tool_name.to_string(),
        total_executions: finished.len(),
        average_duration_seconds: round2(average_ms / 1000.0),
        success_rate: percent(succeeded, finished.len()),
        failure_rate: percent(finished.len() - succeeded, finished.len()),
        last_used: finished.iter().map(|j| j.created_at).max(),
    }
}

/// Store-backed entry point for the aggregations above.
#[derive(Clone)]
pub struct Analytics {
    store: Arc<dyn WorkflowStore>,
}

impl Analytics {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    pub async fn most_used_tools(&self, limit: usize) -> Result<Vec<ToolUsage>> {
        Ok(most_used_tools(&self.store.workflows().await?, limit))
    }

    pub async fn tool_failure_rate(&self, tool_name: &str) -> Result<ToolFailureRate> {
        Ok(tool_failure_rate(&self.store.workflows().await?, tool_name))
    }

    pub async fn tool_performance(&self, tool_name: &str) -> Result<ToolPerformance> {
        Ok(tool_performance(&self.store.workflows().await?, tool_name))
    }

    pub async fn recent_activity(&self, limit: usize) -> Result<Vec<Activity>> {
        Ok(recent_activity(&self.store.workflows().await?, limit))
    }

    /// Every aggregate from a single read of the store.
    pub async fn report(&self, limit: usize) -> Result<AnalyticsReport> {
        let workflows = self.store.workflows().await?;
        tracing::debug!(workflows = workflows.len(), "building analytics report");
        Ok(AnalyticsReport {
            overview: Overview {
                total_workflows: workflows.len(),
                total_jobs: jobs(&workflows).count(),
            },
            most_used_tools: most_used_tools(&workflows, limit),
            failure_rates: failure_rates(&workflows),
            workflow_statuses: workflow_status_distribution(&workflows),
            job_statuses: job_status_distribution(&workflows),
            workflow_duration: average_workflow_duration(&workflows),
            recent_activity: recent_activity(&workflows, limit),
        })
    }
}
