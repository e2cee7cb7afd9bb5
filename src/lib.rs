//! Social post curation pipeline
//!
//! Items crawled for a topic are scored by pluggable filters, classified by a
//! trainable feed-forward network and, when accepted, advanced one step at a
//! time through the topic's chain of actions. Progress lives in the item
//! record, so every pass can be interrupted and resumed.

pub mod actions;
pub mod api;
pub mod config;
pub mod error;
pub mod filters;
pub mod metrics;
pub mod ml;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod state;

pub use error::{AppError, Result};
