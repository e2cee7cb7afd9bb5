use crate::actions::builtin::{approval, filter_threshold, notify, schedule, wait};
use crate::actions::{ActionContext, ActionKind, ActionModule};
use crate::error::{AppError, Result};
use crate::models::SettingDefinition;
use serde::Serialize;

pub type ActionFactory = fn(ActionContext) -> Result<Box<dyn ActionModule>>;

/// Static description of one action kind
#[derive(Clone, Copy)]
pub struct ActionDescriptor {
    pub name: &'static str,
    pub title: &'static str,
    pub kind: ActionKind,
    pub settings: fn() -> Vec<SettingDefinition>,
    pub factory: ActionFactory,
}

/// Serializable view of a descriptor for configuration UIs
#[derive(Debug, Clone, Serialize)]
pub struct ActionInfo {
    pub name: &'static str,
    pub title: &'static str,
    pub kind: ActionKind,
    pub settings: Vec<SettingDefinition>,
}

static ACTIONS: &[ActionDescriptor] = &[
    ActionDescriptor {
        name: wait::NAME,
        title: "Wait",
        kind: ActionKind::Single,
        settings: wait::settings,
        factory: wait::create,
    },
    ActionDescriptor {
        name: notify::NAME,
        title: "Notify webhook",
        kind: ActionKind::Single,
        settings: notify::settings,
        factory: notify::create,
    },
    ActionDescriptor {
        name: approval::NAME,
        title: "Manual approval",
        kind: ActionKind::Single,
        settings: approval::settings,
        factory: approval::create,
    },
    ActionDescriptor {
        name: schedule::NAME,
        title: "Schedule",
        kind: ActionKind::Bulk,
        settings: schedule::settings,
        factory: schedule::create,
    },
    ActionDescriptor {
        name: filter_threshold::NAME,
        title: "Feature threshold",
        kind: ActionKind::Single,
        settings: filter_threshold::settings,
        factory: filter_threshold::create,
    },
];

/// Name → factory table of the built-in actions
pub struct ActionRegistry;

impl ActionRegistry {
    pub fn descriptors() -> &'static [ActionDescriptor] {
        ACTIONS
    }

    pub fn get(name: &str) -> Option<&'static ActionDescriptor> {
        ACTIONS.iter().find(|d| d.name == name)
    }

    /// Descriptor lookup that fails as a configuration error
    pub fn require(name: &str) -> Result<&'static ActionDescriptor> {
        Self::get(name)
            .ok_or_else(|| AppError::Configuration(format!("Unknown action module '{}'", name)))
    }

    pub fn describe() -> Vec<ActionInfo> {
        ACTIONS
            .iter()
            .map(|d| ActionInfo {
                name: d.name,
                title: d.title,
                kind: d.kind,
                settings: (d.settings)(),
            })
            .collect()
    }
}
