//! Interface de terminal do maestro: spinners e saída colorida.
//!
//! Usa `indicatif` para o spinner de progresso e `console` para cores.
//! O [`WorkflowProgress`] acompanha um workflow enquanto o pipeline roda
//! e imprime o resumo final com a duração de cada job.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::state_machine::{JobSnapshot, Status, WorkflowSnapshot};

/// Indicador visual de progresso de um workflow no terminal.
pub struct WorkflowProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl WorkflowProgress {
    /// Inicia o spinner para o projeto informado.
    pub fn start(project_name: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("PENDING: {project_name}"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    /// Atualiza a mensagem do spinner a partir do estado lido do store.
    pub fn update(&self, snapshot: &WorkflowSnapshot) {
        let message = match snapshot.jobs.last() {
            Some(job) => format!(
                "{}: step {} {} ({})",
                snapshot.status,
                snapshot.jobs.len(),
                job.tool_name,
                job.status
            ),
            None => format!("{}: {}", snapshot.status, snapshot.project_name),
        };
        self.pb.set_message(message);
    }

    /// Finaliza o spinner e imprime o resumo do workflow.
    pub fn finish(&self, snapshot: &WorkflowSnapshot) {
        self.pb.finish_and_clear();
        let style = self.style_for(snapshot.status);
        println!(
            "{} {} [{}] {}",
            style.apply_to(badge(snapshot.status)),
            snapshot.project_name,
            style.apply_to(snapshot.status),
            self.dim.apply_to(&snapshot.id)
        );
        for job in &snapshot.jobs {
            let style = self.style_for(job.status);
            println!("    {} {}", style.apply_to(badge(job.status)), job_line(job));
        }
    }

    fn style_for(&self, status: Status) -> &Style {
        match status {
            Status::Completed => &self.green,
            Status::Failed | Status::Cancelled => &self.red,
            Status::Pending | Status::Running => &self.yellow,
        }
    }
}

/// Símbolo curto de cada status.
pub fn badge(status: Status) -> &'static str {
    match status {
        Status::Pending => "·",
        Status::Running => "…",
        Status::Completed => "✓",
        Status::Failed => "✗",
        Status::Cancelled => "⊘",
    }
}

/// Linha de resumo de um job, sem cores.
pub fn job_line(job: &JobSnapshot) -> String {
    let mut line = job.tool_name.clone();
    if let Some(ms) = job.duration_ms() {
        line.push_str(&format!(" ({ms}ms)"));
    }
    if let Some(error) = &job.error {
        line.push_str(&format!(": {error}"));
    }
    line
}

/// Imprime um título colorido seguido do valor em JSON formatado.
pub fn print_json<T: Serialize>(title: &str, value: &T) {
    let header = Style::new().cyan().bold();
    println!("{}", header.apply_to(format!("─── {title} ───")));
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}
