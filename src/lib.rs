//! Expense Chat Orchestrator
//!
//! The conversational side of an expense-tracking app:
//! - Assembles chat transcripts into completion requests
//! - Offers expense store operations to the model as tools
//! - Runs requested tools concurrently and feeds results back
//! - Degrades to fixed messages when the model or the store is unavailable
//!
//! TURN LOOP:
//! MESSAGE → COMPLETE → TOOLS? → COMPLETE → ANSWER

pub mod agent;
pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod models;
pub mod store;
pub mod tools;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use agent::{ChatService, TurnOutcome, TurnPhase};
pub use models::*;
