// src/bootstrap.rs
//
// Explicit dependency-injection root. Every service is constructed here in
// dependency order; nothing in the crate reaches for a global instance.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    backup::{
        BackupManager, BackupPaths, BackupSummary, BackupType, DomainSnapshot, SnapshotSource,
    },
    constants::{PROFILES_DIR, REGISTRY_AUDIT_LOG_FILE},
    optimization::{
        manager::OptimizationManager, nvidia::NvidiaSettings, power_plan::PowerPlans,
        registry_settings::RegistrySettings, visual_effects::VisualEffects,
    },
    registry::{audit::AuditLog, export::RegistryExportUtility, RegistryAccess},
    rust_config::RustConfigManager,
    system::{
        memory::{MemoryDriverStore, MemoryPowerPlans, MemoryRegistryStore, RecordingRefresh},
        process::ProcessToolRunner,
        DriverSettingsStore, PowerPlanControl, RegistryStore, SystemRefresh, ToolRunner,
    },
    value::OptimizationValue,
};

/// The concrete collaborator implementations a run is wired with.
pub struct SystemAdapters {
    pub registry: Arc<dyn RegistryStore>,
    pub drivers: Arc<dyn DriverSettingsStore>,
    pub power: Arc<dyn PowerPlanControl>,
    pub refresh: Arc<dyn SystemRefresh>,
    pub tools: Arc<dyn ToolRunner>,
}

impl SystemAdapters {
    /// Adapters talking to the live machine.
    #[cfg(windows)]
    pub fn live() -> Self {
        use crate::system::windows::{PowercfgControl, WindowsRefresh, WindowsRegistryStore};

        Self {
            registry: Arc::new(WindowsRegistryStore),
            // The NVAPI session is an external collaborator; until one is
            // wired in, driver settings behave as "no GPU detected".
            drivers: Arc::new(MemoryDriverStore::new(None)),
            power: Arc::new(PowercfgControl::new(Arc::new(ProcessToolRunner))),
            refresh: Arc::new(WindowsRefresh),
            tools: Arc::new(ProcessToolRunner),
        }
    }

    /// Fully in-process adapters: nothing on the machine is touched. Used
    /// for dry runs and tests.
    pub fn in_memory() -> Self {
        Self {
            registry: Arc::new(MemoryRegistryStore::new()),
            drivers: Arc::new(MemoryDriverStore::new(None)),
            power: Arc::new(MemoryPowerPlans::new(Vec::new(), "")),
            refresh: Arc::new(RecordingRefresh::new()),
            tools: Arc::new(ProcessToolRunner),
        }
    }
}

/// All long-lived services, wired and started.
pub struct Services {
    pub backup: BackupManager,
    pub manager: OptimizationManager,
    pub rust_config: Option<RustConfigManager>,
    base_dir: PathBuf,
}

impl Services {
    /// Ordered, fallible startup. The sequence is the dependency order:
    /// registry access and audit first, then the entity graph, then the
    /// game config, then backups of everything, then value seeding (which
    /// requires the backups to exist).
    pub fn start(base_dir: &Path, adapters: SystemAdapters) -> Result<Self> {
        let audit = AuditLog::new(base_dir.join(REGISTRY_AUDIT_LOG_FILE));
        let access = Arc::new(RegistryAccess::new(Arc::clone(&adapters.registry), audit));

        let registry = RegistrySettings::new(Arc::clone(&access), Arc::clone(&adapters.refresh));
        let nvidia = NvidiaSettings::detect(Arc::clone(&adapters.drivers))
            .context("Driver settings probe failed")?;
        let visual = VisualEffects::new(Arc::clone(&access), Arc::clone(&adapters.refresh));
        let power = PowerPlans::new(Arc::clone(&adapters.power));

        let mut manager = OptimizationManager::new(registry, nvidia, visual, power);
        manager.initialize().context("Entity initialization failed")?;

        let profiles_dir = base_dir.join(PROFILES_DIR);
        let rust_config = match RustConfigManager::locate(&access, &profiles_dir) {
            Ok(mut rc) => {
                rc.initialize().context("Rust config initialization failed")?;
                Some(rc)
            }
            Err(e) => {
                info!(reason = %e, "Rust game not found, skipping its config domain");
                None
            }
        };

        let exporter = RegistryExportUtility::new(Arc::clone(&adapters.tools));
        let mut backup = BackupManager::new(BackupPaths::new(base_dir), exporter);

        let summary = {
            let source = CombinedSource {
                manager: &manager,
                rust_config: rust_config.as_ref(),
            };
            backup.create_all_backups_if_needed(&source)
        };
        if !summary.all_ok() {
            for (ty, reason) in &summary.failed {
                warn!(?ty, reason, "startup backup failed");
            }
        }

        manager
            .seed_startup_values(&mut backup)
            .context("Value seeding failed")?;

        info!(base = %base_dir.display(), "services started");
        Ok(Self {
            backup,
            manager,
            rust_config,
            base_dir: base_dir.to_path_buf(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn apply_optimization(&mut self, id: &str, value: OptimizationValue) -> Result<()> {
        self.manager.apply_optimization(id, value, &mut self.backup)
    }

    pub fn revert_optimization(&mut self, id: &str, to_original: bool) -> Result<()> {
        self.manager.revert_optimization(id, to_original, &mut self.backup)
    }

    pub fn create_all_backups_if_needed(&mut self) -> BackupSummary {
        let Self {
            backup,
            manager,
            rust_config,
            ..
        } = self;
        let source = CombinedSource {
            manager,
            rust_config: rust_config.as_ref(),
        };
        backup.create_all_backups_if_needed(&source)
    }

    /// Restores client.cfg from its main backup document (or the raw
    /// sidecar when present). The only domain with a full restore path.
    pub fn restore_rust_config(&mut self) -> Result<()> {
        let Self {
            backup,
            manager,
            rust_config,
            ..
        } = self;
        let rc = rust_config
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Rust game config was not located"))?;
        let source = CombinedSource {
            manager,
            rust_config: Some(&*rc),
        };
        let doc = backup.load_restorable_document(
            BackupType::RustConfig,
            crate::backup::BackupKind::Main,
            &source,
        )?;
        match doc {
            crate::backup::store::DomainDocument::RustConfig { snapshot, .. } => {
                rc.restore_from_backup(Some(&snapshot))
            }
            _ => anyhow::bail!("Backup document has the wrong shape for RustConfig"),
        }
    }
}

/// Snapshot source spanning the entity graph and the game config.
struct CombinedSource<'a> {
    manager: &'a OptimizationManager,
    rust_config: Option<&'a RustConfigManager>,
}

impl SnapshotSource for CombinedSource<'_> {
    fn known_ids(&self, domain: BackupType) -> Vec<String> {
        match domain {
            BackupType::RustConfig => Vec::new(),
            _ => self.manager.known_ids(domain),
        }
    }

    fn snapshot(&self, domain: BackupType) -> Result<DomainSnapshot> {
        match (domain, self.rust_config) {
            (BackupType::RustConfig, Some(rc)) => Ok(DomainSnapshot::RustConfig(rc.snapshot()?)),
            (BackupType::RustConfig, None) => Ok(DomainSnapshot::Unavailable),
            _ => self.manager.snapshot(domain),
        }
    }
}
