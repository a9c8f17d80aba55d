//! Research Core — task orchestration and resilience for research workers.

pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod retrieval;
pub mod scheduler;
pub mod tools;
pub mod worker;

pub use config::OrchestratorConfig;
pub use error::{Error, Result};
