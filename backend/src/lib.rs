//! Workflow automation for the recruiting pipeline.
//!
//! Stage transitions call [`workflows::WorkflowEngine::handle_stage_transition`];
//! the hourly [`jobs::TimeInStageJob`] sweep covers time-based triggers.

pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod jobs;
pub mod services;
pub mod workflows;

pub use error::{ActionError, EmailError, RepositoryError};
