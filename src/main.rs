use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use maestro::analytics::Analytics;
use maestro::cli::{Cli, Command, TaskArgs, preferences};
use maestro::config::MaestroConfig;
use maestro::delegation::{DelegationRequest, DelegationService};
use maestro::orchestrator::{CreateWorkflowRequest, PipelineExecutor};
use maestro::state_machine::Status;
use maestro::store::MemoryStore;
use maestro::tools::{InvokeRequest, ToolRegistry};
use maestro::ui::{WorkflowProgress, print_json};

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => MaestroConfig::load_from(path),
        None => MaestroConfig::load(),
    }
    .context("failed to load configuration")?;

    let registry = Arc::new(ToolRegistry::with_defaults(&config));

    match cli.command {
        Command::Run { projects, report } => {
            let store = Arc::new(MemoryStore::new());
            let executor = PipelineExecutor::new(store.clone(), registry);
            let outcome = run_projects(&executor, &projects).await;
            if report {
                let analytics = Analytics::new(store).report(10).await?;
                print_json("Análise", &analytics);
            }
            outcome
        }
        Command::Status => {
            print_json("Configuração", &status_report(&config, &registry));
            Ok(())
        }
        Command::Tools => {
            print_json("Ferramentas", &registry.describe());
            Ok(())
        }
        Command::Invoke { tool, input } => {
            let input: Value = serde_json::from_str(&input).context("--input is not valid JSON")?;
            let response = registry
                .invoke_request(&InvokeRequest {
                    tool_name: Some(tool),
                    input: Some(input),
                })
                .await;
            print_json("Resultado", &response);
            if let Some(error) = response.error {
                bail!(error);
            }
            Ok(())
        }
        Command::Services => {
            let service = DelegationService::from_config(&config);
            print_json("Serviços", &service.services());
            Ok(())
        }
        Command::Recommend(task) => {
            let service = DelegationService::from_config(&config);
            let recommendation = service.recommend(&task.to_task()).await?;
            print_json("Recomendação", &recommendation);
            Ok(())
        }
        Command::Delegate {
            task,
            service,
            priority,
            deadline,
        } => {
            let delegations = DelegationService::from_config(&config);
            delegate(&delegations, &task, preferences(service, priority, deadline)).await
        }
    }
}

async fn run_projects(executor: &PipelineExecutor, projects: &[String]) -> Result<()> {
    let mut runs = Vec::with_capacity(projects.len());
    for project in projects {
        runs.push(
            executor
                .submit(&CreateWorkflowRequest::new(project.clone()))
                .await?,
        );
    }

    let mut failed = 0;
    for (created, handle) in runs {
        let progress = WorkflowProgress::start(&created.project_name);
        while !handle.is_finished() {
            progress.update(&executor.get_workflow(&created.workflow_id).await?);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let status = handle.await??;
        progress.finish(&executor.get_workflow(&created.workflow_id).await?);
        if status != Status::Completed {
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} of {} workflow(s) failed", projects.len());
    }
    Ok(())
}

async fn delegate(
    service: &DelegationService,
    task: &TaskArgs,
    preferences: Option<maestro::delegation::Preferences>,
) -> Result<()> {
    let request = DelegationRequest {
        task: task.to_task(),
        preferences,
    };
    let delegation = service.assign(request).await?;
    println!(
        "Delegating to {} ({})...",
        delegation.service.name, delegation.service.url
    );
    service.spawn_handoff(&delegation.id).await?;

    let delegation = service.status(&delegation.id).await?;
    if let Some(instructions) = delegation
        .result()
        .and_then(|r| r.get("instructions"))
        .and_then(Value::as_str)
    {
        println!("{instructions}");
    }
    print_json("Delegação", &delegation);
    if delegation.status() != Status::Completed {
        bail!("delegation ended as {}", delegation.status());
    }
    Ok(())
}

fn status_report(config: &MaestroConfig, registry: &ToolRegistry) -> Value {
    let synthetic = config.staging_api_key.trim().is_empty();
    json!({
        "stagingUrl": config.staging_url,
        "stagingApiKey": if synthetic { "not set" } else { "set" },
        "stagingMode": if synthetic { "synthetic" } else { "live" },
        "stagingTimeoutSecs": config.staging_timeout_secs,
        "delegationHandoffMs": config.delegation_handoff_ms,
        "tools": registry.list_names(),
    })
}
