// src/optimization/mod.rs
//
// The entity graph: one `OptimizationEntity` per tunable setting, each
// carrying its backing-store binding as a closed enum plus a uniform
// metadata block, so no caller ever needs to probe a concrete subtype.

pub mod definitions;
pub mod manager;
pub mod nvidia;
pub mod power_plan;
pub mod registry_settings;
pub mod visual_effects;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::{backup::SettingKey, value::OptimizationValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum EntityKind {
    WindowsRegistry,
    NvidiaSettings,
    VisualEffects,
    PowerPlan,
    SettingGroup,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
pub enum Category {
    Performance,
    Network,
    Input,
    Visual,
    Gpu,
    Power,
    System,
}

/// 0 = normal, 1 = preference, 2 = experimental, 3 = reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SettingLevel {
    Normal,
    Preference,
    Experimental,
    Reserved,
}

/// Uniform metadata every entity variant exposes.
#[derive(Clone, Debug)]
pub struct Metadata {
    pub category: Category,
    pub subcategory: String,
    pub level: SettingLevel,
    /// Security gate: only whitelisted settings may have their registry
    /// path created when it is missing.
    pub creation_allowed: bool,
    pub is_advanced: bool,
    /// Some registry writes only take effect after a shell broadcast.
    pub requires_system_refresh: bool,
}

impl Metadata {
    pub fn basic(category: Category, subcategory: &str) -> Self {
        Self {
            category,
            subcategory: subcategory.to_string(),
            level: SettingLevel::Normal,
            creation_allowed: false,
            is_advanced: false,
            requires_system_refresh: false,
        }
    }
}

/// Where an entity's value lives. Closed set: dispatch is a `match`, never
/// a downcast.
#[derive(Clone, Debug)]
pub enum Backend {
    Registry {
        key: String,
        value_name: String,
    },
    Nvidia {
        setting_id: u32,
    },
    VisualEffects,
    PowerPlan,
    /// A named group fanning out to member entity ids.
    Group {
        members: Vec<String>,
    },
}

impl Backend {
    pub fn kind(&self) -> EntityKind {
        match self {
            Backend::Registry { .. } => EntityKind::WindowsRegistry,
            Backend::Nvidia { .. } => EntityKind::NvidiaSettings,
            Backend::VisualEffects => EntityKind::VisualEffects,
            Backend::PowerPlan => EntityKind::PowerPlan,
            Backend::Group { .. } => EntityKind::SettingGroup,
        }
    }
}

/// One tunable setting, its live/original/session-start values, and its
/// backing-store binding.
#[derive(Clone, Debug)]
pub struct OptimizationEntity {
    /// Globally unique, stable across runs.
    pub id: String,
    /// Explicit backup-domain/key pair; the backup subsystem never infers
    /// a domain from the id's spelling.
    pub key: SettingKey,
    pub name: String,
    pub description: String,
    pub backend: Backend,
    pub metadata: Metadata,
    pub recommended_value: OptimizationValue,
    /// Live value last read from the backing store.
    pub current_value: Option<OptimizationValue>,
    /// First-ever value observed on this machine, from the main backup.
    pub original_value: Option<OptimizationValue>,
    /// Value observed when this process run began.
    pub session_start_value: Option<OptimizationValue>,
    /// User lock flag: the entity is never touched while set.
    pub dont_edit: bool,
    /// True when the backing registry path does not exist.
    pub is_missing: bool,
}

impl OptimizationEntity {
    pub fn new(
        id: impl Into<String>,
        key: SettingKey,
        name: impl Into<String>,
        description: impl Into<String>,
        backend: Backend,
        metadata: Metadata,
        recommended_value: OptimizationValue,
    ) -> Self {
        Self {
            id: id.into(),
            key,
            name: name.into(),
            description: description.into(),
            backend,
            metadata,
            recommended_value,
            current_value: None,
            original_value: None,
            session_start_value: None,
            dont_edit: false,
            is_missing: false,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.backend.kind()
    }

    /// The value a plain `revert` targets: the session-start snapshot.
    pub fn revert_target(&self, to_original: bool) -> Option<&OptimizationValue> {
        if to_original {
            self.original_value.as_ref()
        } else {
            self.session_start_value.as_ref()
        }
    }
}
