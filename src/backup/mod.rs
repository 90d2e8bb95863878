// src/backup/mod.rs

pub mod manager;
pub mod store;

pub use manager::BackupManager;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::{
    constants::{
        ARCHIVE_SUBDIR, BACKUP_DIR, FULL_REGISTRY_EXPORT_FILE, MAIN_SUBDIR, SESSION_SUBDIR,
        UNKNOWN_VALUES_FILE, USER_PREFERENCES_FILE,
    },
    system::PowerPlan,
    value::OptimizationValue,
};

/// The six setting domains the backup subsystem tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
pub enum BackupType {
    Registry,
    RustConfig,
    NvidiaSettings,
    VisualEffects,
    PowerPlan,
    FullRegistryExport,
}

impl BackupType {
    /// Backup file name inside `main/` or `session/`.
    pub fn file_name(self) -> &'static str {
        match self {
            BackupType::Registry => "registry.json",
            BackupType::RustConfig => "rust_config.json",
            BackupType::NvidiaSettings => "nvidia.json",
            BackupType::VisualEffects => "visual_effects.json",
            BackupType::PowerPlan => "power_plan.json",
            BackupType::FullRegistryExport => FULL_REGISTRY_EXPORT_FILE,
        }
    }

    /// Value written into the document's `backup_type` field.
    pub fn label(self) -> &'static str {
        match self {
            BackupType::Registry => "registry",
            BackupType::RustConfig => "rust_config",
            BackupType::NvidiaSettings => "nvidia",
            BackupType::VisualEffects => "visual_effects",
            BackupType::PowerPlan => "power_plan",
            BackupType::FullRegistryExport => "full_registry_export",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackupKind {
    /// Permanent, write-once-per-id record of first-observed values.
    Main,
    /// Per-run snapshot, refreshed every launch, stale after 8 hours.
    Session,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackupStatus {
    NoBackupExists,
    PartialBackup,
    OutdatedSessionBackup,
    CompleteBackup,
    BackupError,
}

/// Explicit domain/key pair carried alongside every entity id so the backup
/// subsystem never has to infer a domain from an id's spelling.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettingKey {
    pub domain: BackupType,
    pub local: String,
}

impl SettingKey {
    pub fn new(domain: BackupType, local: impl Into<String>) -> Self {
        Self {
            domain,
            local: local.into(),
        }
    }
}

/// On-disk layout of the backup directory tree.
#[derive(Clone, Debug)]
pub struct BackupPaths {
    root: PathBuf,
}

impl BackupPaths {
    /// `base` is normally the executable directory; the backup tree lives in
    /// `settings_backup/` below it.
    pub fn new(base: &Path) -> Self {
        Self {
            root: base.join(BACKUP_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, kind: BackupKind) -> PathBuf {
        match kind {
            BackupKind::Main => self.root.join(MAIN_SUBDIR),
            BackupKind::Session => self.root.join(SESSION_SUBDIR),
        }
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_SUBDIR)
    }

    pub fn file(&self, ty: BackupType, kind: BackupKind) -> PathBuf {
        // The full export is a single file at the tree root, not per-kind.
        if ty == BackupType::FullRegistryExport {
            return self.root.join(ty.file_name());
        }
        self.dir(kind).join(ty.file_name())
    }

    pub fn user_preferences(&self) -> PathBuf {
        self.root.join(USER_PREFERENCES_FILE)
    }

    pub fn unknown_values(&self) -> PathBuf {
        self.root.join(UNKNOWN_VALUES_FILE)
    }
}

/// One setting's value at snapshot time.
#[derive(Clone, Debug)]
pub struct SettingSnapshot {
    pub id: String,
    pub name: String,
    pub value: OptimizationValue,
    pub registry_key: Option<String>,
    pub registry_value_name: Option<String>,
}

/// Snapshot of the Rust game's config files used for its backup document.
#[derive(Clone, Debug, Default)]
pub struct RustConfigSnapshot {
    pub client: indexmap::IndexMap<String, String>,
    pub favorites: serde_json::Value,
    pub key_bindings: Vec<String>,
    pub default_key_bindings: Vec<String>,
}

/// What a domain looks like right now, as far as backups are concerned.
#[derive(Clone, Debug)]
pub enum DomainSnapshot {
    Settings(Vec<SettingSnapshot>),
    PowerPlan(PowerPlan),
    VisualEffects { profile: i32, profile_name: String },
    RustConfig(RustConfigSnapshot),
    /// Domain has nothing to back up on this machine (no GPU, no game).
    Unavailable,
}

/// Live view of the system the backup manager snapshots from. Implemented
/// by the optimization manager (and wrapped by the bootstrap root to add
/// the Rust config domain).
pub trait SnapshotSource {
    /// Ids the domain currently knows about; completeness of a backup is
    /// judged against this set.
    fn known_ids(&self, domain: BackupType) -> Vec<String>;

    fn snapshot(&self, domain: BackupType) -> anyhow::Result<DomainSnapshot>;
}

/// Per-domain outcome of `create_all_backups_if_needed`.
#[derive(Debug, Default)]
pub struct BackupSummary {
    pub created: Vec<BackupType>,
    pub skipped: Vec<BackupType>,
    pub failed: Vec<(BackupType, String)>,
}

impl BackupSummary {
    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}
