//! FinTrack Agent
//!
//! A conversational personal-finance service:
//! - Users chat over a WebSocket; replies stream back in fixed-size chunks
//! - A root agent routes each message to capability-scoped agents
//! - The account agent reads and updates the user's own profile
//! - The finance agent records, searches and updates transactions and
//!   reports the current balance
//! - Every tool call is bound to the authenticated user of the connection
//!
//! TURN LOOP:
//! MESSAGE → ROUTE → (DELEGATE → TOOL CALL → TOOL RESULT)* → STREAM REPLY

pub mod agent;
pub mod api;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod session;
pub mod store;
pub mod tools;

pub use error::{FintrackError, Result};

// Re-export common types
pub use classifier::{Intent, IntentClassifier};
pub use models::*;
