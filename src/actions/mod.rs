/// Action modules and the per-item action state machine
///
/// - `registry`: static name → factory table of built-in actions
/// - `context`: what an action instance is built from
/// - `manager`: advances accepted items through a topic's action chain
/// - `token`: signed accept/reject tokens for out-of-band decisions
pub mod builtin;
pub mod context;
pub mod manager;
pub mod registry;
pub mod token;

pub use context::{ActionContext, ActionEnv};
pub use manager::{ActionManager, Decision, PassReport};
pub use registry::{ActionDescriptor, ActionRegistry};
pub use token::{ActionToken, TokenSigner};

use crate::error::{AppError, Result};
use crate::models::Item;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

/// How the manager drives an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// `exec_action` per item, during the single-item phase
    Single,
    /// `exec_action_bulk` over every item waiting on the action, before the single-item phase
    Bulk,
}

/// A configured action instance.
///
/// `true` advances the item to the next action, `false` holds it, and an
/// error is recorded on the item and retried on the next pass.
#[async_trait]
pub trait ActionModule: Send + Sync {
    async fn exec_action(&mut self, _item: &Item) -> Result<bool> {
        Err(AppError::Action(
            "single-item execution is not supported by this action".to_string(),
        ))
    }

    /// Decide for a batch at once, keyed by item id. Items missing from the
    /// map are treated as errors.
    async fn exec_action_bulk(&mut self, _items: &[Item]) -> Result<HashMap<String, bool>> {
        Err(AppError::Action(
            "bulk execution is not supported by this action".to_string(),
        ))
    }
}
