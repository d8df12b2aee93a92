//! Interface de linha de comando do maestro baseada em clap.
//!
//! Define a struct [`Cli`] com os subcomandos [`Command`] e as flags
//! globais (`--config`, `-v`).

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::delegation::{Preferences, Task};

/// maestro: orquestrador de pipelines de ferramentas e delegação de tarefas.
#[derive(Debug, Parser)]
#[command(name = "maestro", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: `maestro.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Aumenta o nível de log (-v info, -vv debug, -vvv trace).
    #[arg(long, short, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Cria e executa o pipeline padrão para um ou mais projetos.
    Run {
        /// Nomes dos projetos; cada um vira um workflow independente.
        #[arg(required = true)]
        projects: Vec<String>,

        /// Ao final, imprime as métricas de uso das ferramentas e workflows.
        #[arg(long)]
        report: bool,
    },

    /// Mostra a configuração efetiva e as ferramentas registradas.
    Status,

    /// Lista as ferramentas registradas, na ordem de registro.
    Tools,

    /// Invoca uma ferramenta diretamente.
    Invoke {
        /// Nome lógico da ferramenta (ex.: `design/ui-spec`).
        tool: String,

        /// Entrada em JSON; precisa ser um objeto.
        #[arg(long, default_value = "{}")]
        input: String,
    },

    /// Lista os serviços disponíveis para delegação.
    Services,

    /// Recomenda um serviço para a tarefa sem delegá-la.
    Recommend(TaskArgs),

    /// Delega a tarefa e aguarda a entrega das instruções.
    Delegate {
        #[command(flatten)]
        task: TaskArgs,

        /// Serviço preferido; ignora a seleção automática.
        #[arg(long)]
        service: Option<String>,

        /// Prioridade informativa (ex.: `high`).
        #[arg(long)]
        priority: Option<String>,

        /// Prazo informativo (ex.: `2026-12-01`).
        #[arg(long)]
        deadline: Option<String>,
    },
}

/// Descrição de uma tarefa na linha de comando.
#[derive(Debug, Clone, Args)]
pub struct TaskArgs {
    /// O que precisa ser feito.
    pub description: String,

    /// Tipo da tarefa (ex.: `frontend`, `refactoring`).
    #[arg(long = "type", short = 't')]
    pub task_type: String,

    /// Título opcional.
    #[arg(long)]
    pub title: Option<String>,

    /// Requisito adicional; pode ser repetido.
    #[arg(long = "requirement", short = 'r')]
    pub requirements: Vec<String>,
}

impl TaskArgs {
    pub fn to_task(&self) -> Task {
        let mut task = Task::new(self.description.clone(), self.task_type.clone());
        task.title = self.title.clone();
        task.requirements = self.requirements.clone();
        task
    }
}

/// Monta as preferências de delegação; `None` quando nenhuma flag foi usada.
pub fn preferences(
    service: Option<String>,
    priority: Option<String>,
    deadline: Option<String>,
) -> Option<Preferences> {
    if service.is_none() && priority.is_none() && deadline.is_none() {
        return None;
    }
    Some(Preferences {
        preferred_service: service,
        priority,
        deadline,
    })
}
