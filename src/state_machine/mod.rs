mod job;
mod state;
mod workflow;

pub use job::Job;
pub use state::{StateMachine, Status};
pub use workflow::{JobSnapshot, Project, Workflow, WorkflowSnapshot};
