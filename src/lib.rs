//! Stock screenshot analyzer.
//!
//! Each stock's screenshot goes through an [`orchestrator::Orchestrator`]
//! that routes every task to the first healthy LLM provider for the task's
//! [`capability::CapabilityClass`], sticks with whichever provider last
//! succeeded, and benches providers that hit quota or disappear for the
//! rest of the run.

pub mod analysis;
pub mod batch;
pub mod bootstrap;
pub mod capability;
pub mod config;
pub mod credentials;
pub mod error;
pub mod orchestrator;
pub mod providers;
