pub mod analytics;
pub mod cli;
pub mod config;
pub mod delegation;
pub mod error;
pub mod orchestrator;
pub mod state_machine;
pub mod store;
pub mod tools;
pub mod ui;
