// src/optimization/manager.rs
//
// Owns every entity for the process lifetime and is the only caller that
// applies or reverts by id. Construction wiring is explicit: the registry,
// NVIDIA, visual-effects and power-plan components are injected, and the
// startup sequence (build entities, back up, seed values) is an ordered
// set of fallible calls rather than a lazy singleton chain.

use std::collections::HashMap;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::{
    backup::{
        BackupKind, BackupManager, BackupType, DomainSnapshot, SettingSnapshot, SnapshotSource,
    },
    constants::NON_EXISTENT_SENTINEL,
    value::OptimizationValue,
};

use super::{
    nvidia::NvidiaSettings, power_plan::PowerPlans, registry_settings::RegistrySettings,
    visual_effects::VisualEffects, Backend, Category, EntityKind, Metadata, OptimizationEntity,
};

pub struct OptimizationManager {
    registry: RegistrySettings,
    nvidia: Option<NvidiaSettings>,
    visual: VisualEffects,
    power: PowerPlans,
    entities: IndexMap<String, OptimizationEntity>,
    by_category: HashMap<Category, Vec<String>>,
    by_kind: HashMap<EntityKind, Vec<String>>,
    initialized: bool,
    seeded: bool,
}

impl OptimizationManager {
    pub fn new(
        registry: RegistrySettings,
        nvidia: Option<NvidiaSettings>,
        visual: VisualEffects,
        power: PowerPlans,
    ) -> Self {
        Self {
            registry,
            nvidia,
            visual,
            power,
            entities: IndexMap::new(),
            by_category: HashMap::new(),
            by_kind: HashMap::new(),
            initialized: false,
            seeded: false,
        }
    }

    /// Builds the entity set. Strict order: hardcoded entities, then
    /// registry (which probes for missing paths first), then NVIDIA when a
    /// GPU is present, then the power plan, then the lookup tables.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            anyhow::bail!("Optimization manager is already initialized");
        }

        let mut entities = hardcoded_entities(&self.visual);

        self.registry
            .check_current_values()
            .context("Registry probe failed")?;
        entities.extend(self.registry.create_entities());

        if let Some(nvidia) = &self.nvidia {
            entities.extend(nvidia.create_entities());
        }

        entities.push(self.power.create_entity());

        for entity in entities {
            if self.entities.contains_key(&entity.id) {
                warn!(id = %entity.id, "duplicate entity id, keeping first");
                continue;
            }
            self.entities.insert(entity.id.clone(), entity);
        }

        self.validate_groups();
        self.rebuild_indexes();
        self.initialized = true;
        info!(entities = self.entities.len(), "optimization entities initialized");
        Ok(())
    }

    fn validate_groups(&mut self) {
        let known: Vec<String> = self.entities.keys().cloned().collect();
        for entity in self.entities.values_mut() {
            if let Backend::Group { members } = &mut entity.backend {
                members.retain(|m| {
                    let ok = known.contains(m);
                    if !ok {
                        warn!(group = %entity.id, member = %m, "group references unknown entity");
                    }
                    ok
                });
            }
        }
    }

    fn rebuild_indexes(&mut self) {
        self.by_category.clear();
        self.by_kind.clear();
        for (id, entity) in &self.entities {
            self.by_category
                .entry(entity.metadata.category)
                .or_default()
                .push(id.clone());
            self.by_kind
                .entry(entity.kind())
                .or_default()
                .push(id.clone());
        }
    }

    /// Seeds `session_start_value` from the live system and
    /// `original_value` from the main backups, and loads the user lock
    /// flags. The join point between the backup subsystem and the entity
    /// graph; runs exactly once per process, after main backups exist.
    pub fn seed_startup_values(&mut self, backup: &mut BackupManager) -> Result<()> {
        if !self.initialized {
            anyhow::bail!("Optimization manager is not initialized");
        }
        if self.seeded {
            anyhow::bail!("Startup values are already seeded");
        }

        let prefs = backup.load_user_preferences();
        let ids: Vec<String> = self.entities.keys().cloned().collect();
        for id in ids {
            let (live, read_ok) = match self.live_value(&id) {
                Ok(v) => (v, true),
                Err(e) => {
                    warn!(id = %id, error = %e, "live read failed during seeding");
                    (None, false)
                }
            };
            let (key, kind) = {
                let entity = &self.entities[&id];
                (entity.key.clone(), entity.kind())
            };

            let original = if kind == EntityKind::SettingGroup {
                None
            } else if live.is_none() {
                // Observed as missing: record the sentinel so a later
                // creation can be reverted by deletion. A failed read is
                // not evidence of absence, so the permanent record stays
                // untouched on error.
                if read_ok {
                    backup.record_non_existent_setting(&key, &self.entities[&id].name)?;
                }
                None
            } else {
                match backup.original_value(&key) {
                    Some(OptimizationValue::Text(s)) if s == NON_EXISTENT_SENTINEL => None,
                    other => other,
                }
            };

            let entity = &mut self.entities[&id];
            entity.session_start_value = live.clone();
            entity.current_value = live;
            entity.original_value = original;
            entity.dont_edit = prefs.get(&id).copied().unwrap_or(false);
        }
        self.seeded = true;
        info!("startup values seeded");
        Ok(())
    }

    pub fn entity(&self, id: &str) -> Option<&OptimizationEntity> {
        self.entities.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &OptimizationEntity> {
        self.entities.values()
    }

    pub fn ids_by_category(&self, category: Category) -> &[String] {
        self.by_category.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ids_by_kind(&self, kind: EntityKind) -> &[String] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reads an entity's value from its backing store.
    pub fn live_value(&self, id: &str) -> Result<Option<OptimizationValue>> {
        let entity = self
            .entities
            .get(id)
            .ok_or_else(|| anyhow::anyhow!("Unknown optimization '{}'", id))?;
        match &entity.backend {
            Backend::Registry { .. } => {
                let def = self
                    .registry
                    .definition(id)
                    .ok_or_else(|| anyhow::anyhow!("No registry definition for '{}'", id))?;
                self.registry.current_value(def)
            }
            Backend::Nvidia { .. } => {
                let nvidia = self
                    .nvidia
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("No GPU detected"))?;
                let def = nvidia
                    .definition(id)
                    .ok_or_else(|| anyhow::anyhow!("No driver definition for '{}'", id))?;
                nvidia.current_value(def)
            }
            Backend::VisualEffects => Ok(Some(OptimizationValue::Int(i64::from(
                self.visual.current_profile()?,
            )))),
            Backend::PowerPlan => Ok(Some(OptimizationValue::Text(
                self.power.active_plan()?.guid,
            ))),
            Backend::Group { .. } => Ok(None),
        }
    }

    /// Applies a value to one entity. A session backup for the entity's
    /// domain is (lazily) guaranteed before any store mutation. A failed
    /// apply leaves `current_value` stale and returns the error.
    pub fn apply_optimization(
        &mut self,
        id: &str,
        value: OptimizationValue,
        backup: &mut BackupManager,
    ) -> Result<()> {
        let (backend, is_missing, domain, locked) = {
            let entity = self
                .entities
                .get(id)
                .ok_or_else(|| anyhow::anyhow!("Unknown optimization '{}'", id))?;
            (
                entity.backend.clone(),
                entity.is_missing,
                entity.key.domain,
                entity.dont_edit,
            )
        };
        if locked {
            anyhow::bail!("Optimization '{}' is locked by the user", id);
        }

        if let Backend::Group { members } = backend {
            return self.apply_group(id, &members, backup);
        }

        // Pre-image before mutation. Idempotent when the session backup is
        // already current.
        backup.create_backup(domain, BackupKind::Session, &*self)?;

        self.write_backend(id, &backend, is_missing, &value)?;

        let entity = &mut self.entities[id];
        entity.current_value = Some(value);
        entity.is_missing = false;
        debug!(id, "optimization applied");
        Ok(())
    }

    /// Group success is AND, not best-effort: every member must apply its
    /// recommended value, and any failure fails the group (members already
    /// applied stay applied).
    fn apply_group(
        &mut self,
        group_id: &str,
        members: &[String],
        backup: &mut BackupManager,
    ) -> Result<()> {
        let mut failures = Vec::new();
        for member in members {
            let recommended = match self.entities.get(member) {
                Some(e) => e.recommended_value.clone(),
                None => continue,
            };
            if let Err(e) = self.apply_optimization(member, recommended, backup) {
                warn!(group = group_id, member = %member, error = %e, "group member failed");
                failures.push(member.clone());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Group '{}' failed for members: {}",
                group_id,
                failures.join(", ")
            )
        }
    }

    /// Reverts an entity to its session-start value, or with `to_original`
    /// to the first-observed value from the main backup. A setting recorded
    /// as never having existed is reverted by deleting the value.
    pub fn revert_optimization(
        &mut self,
        id: &str,
        to_original: bool,
        backup: &mut BackupManager,
    ) -> Result<()> {
        let (backend, domain, key, locked, target) = {
            let entity = self
                .entities
                .get(id)
                .ok_or_else(|| anyhow::anyhow!("Unknown optimization '{}'", id))?;
            (
                entity.backend.clone(),
                entity.key.domain,
                entity.key.clone(),
                entity.dont_edit,
                entity.revert_target(to_original).cloned(),
            )
        };
        if locked {
            anyhow::bail!("Optimization '{}' is locked by the user", id);
        }

        if let Backend::Group { members } = backend {
            let mut failures = Vec::new();
            for member in &members {
                if let Err(e) = self.revert_optimization(member, to_original, backup) {
                    warn!(group = id, member = %member, error = %e, "group member revert failed");
                    failures.push(member.clone());
                }
            }
            if failures.is_empty() {
                return Ok(());
            }
            anyhow::bail!("Group '{}' revert failed for: {}", id, failures.join(", "));
        }

        if to_original && backup.is_recorded_non_existent(&key) {
            if let Backend::Registry { .. } = backend {
                let def = self
                    .registry
                    .definition(id)
                    .ok_or_else(|| anyhow::anyhow!("No registry definition for '{}'", id))?
                    .clone();
                self.registry.delete_value(&def)?;
                let entity = &mut self.entities[id];
                entity.current_value = None;
                entity.is_missing = true;
                info!(id, "reverted by deleting value that originally did not exist");
                return Ok(());
            }
        }

        let target = target
            .ok_or_else(|| anyhow::anyhow!("No revert value recorded for '{}'", id))?;
        backup.create_backup(domain, BackupKind::Session, &*self)?;
        self.write_backend(id, &backend, false, &target)?;
        self.entities[id].current_value = Some(target);
        debug!(id, to_original, "optimization reverted");
        Ok(())
    }

    fn write_backend(
        &mut self,
        id: &str,
        backend: &Backend,
        is_missing: bool,
        value: &OptimizationValue,
    ) -> Result<()> {
        match backend {
            Backend::Registry { .. } => {
                if is_missing {
                    // Whitelist-gated creation path.
                    self.registry.create_missing_registry_path(id, value)
                } else {
                    let def = self
                        .registry
                        .definition(id)
                        .ok_or_else(|| anyhow::anyhow!("No registry definition for '{}'", id))?
                        .clone();
                    self.registry.apply_value(&def, value)
                }
            }
            Backend::Nvidia { .. } => {
                let nvidia = self
                    .nvidia
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("No GPU detected"))?;
                let def = nvidia
                    .definition(id)
                    .ok_or_else(|| anyhow::anyhow!("No driver definition for '{}'", id))?
                    .clone();
                nvidia.apply_value(&def, value)
            }
            Backend::VisualEffects => {
                let profile = value
                    .as_int()
                    .ok_or_else(|| anyhow::anyhow!("Visual effects profile must be an int"))?;
                self.visual.apply_profile(profile as i32)
            }
            Backend::PowerPlan => {
                let guid = value
                    .as_text()
                    .ok_or_else(|| anyhow::anyhow!("Power plan value must be a GUID"))?;
                self.power.apply_guid(guid)
            }
            Backend::Group { .. } => {
                anyhow::bail!("Group '{}' has no backend of its own", id)
            }
        }
    }

    /// Sets the user lock flag and persists the preference map.
    pub fn set_dont_edit(&mut self, id: &str, locked: bool, backup: &BackupManager) -> Result<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("Unknown optimization '{}'", id))?;
        entity.dont_edit = locked;

        let prefs: HashMap<String, bool> = self
            .entities
            .values()
            .filter(|e| e.dont_edit)
            .map(|e| (e.id.clone(), true))
            .collect();
        backup.save_user_preferences(&prefs)
    }
}

impl SnapshotSource for OptimizationManager {
    fn known_ids(&self, domain: BackupType) -> Vec<String> {
        self.entities
            .values()
            .filter(|e| e.kind() != EntityKind::SettingGroup && e.key.domain == domain)
            .map(|e| e.id.clone())
            .collect()
    }

    fn snapshot(&self, domain: BackupType) -> Result<DomainSnapshot> {
        match domain {
            BackupType::Registry | BackupType::NvidiaSettings => {
                let mut settings = Vec::new();
                for entity in self.entities.values() {
                    if entity.key.domain != domain || entity.kind() == EntityKind::SettingGroup {
                        continue;
                    }
                    // Missing values are recorded with the sentinel so the
                    // backup stays a superset of the known id set.
                    let value = self
                        .live_value(&entity.id)?
                        .unwrap_or(OptimizationValue::Text(NON_EXISTENT_SENTINEL.to_string()));
                    let (registry_key, registry_value_name) = match &entity.backend {
                        Backend::Registry { key, value_name } => {
                            (Some(key.clone()), Some(value_name.clone()))
                        }
                        _ => (None, None),
                    };
                    settings.push(SettingSnapshot {
                        id: entity.id.clone(),
                        name: entity.name.clone(),
                        value,
                        registry_key,
                        registry_value_name,
                    });
                }
                if settings.is_empty() {
                    Ok(DomainSnapshot::Unavailable)
                } else {
                    Ok(DomainSnapshot::Settings(settings))
                }
            }
            BackupType::VisualEffects => {
                let profile = self.visual.current_profile()?;
                Ok(DomainSnapshot::VisualEffects {
                    profile,
                    profile_name: self.visual.profile_name(profile).to_string(),
                })
            }
            BackupType::PowerPlan => Ok(DomainSnapshot::PowerPlan(self.power.active_plan()?)),
            // Owned by the Rust config manager / export utility.
            BackupType::RustConfig | BackupType::FullRegistryExport => {
                Ok(DomainSnapshot::Unavailable)
            }
        }
    }
}

/// Entities that exist independent of any probing: the visual-effects
/// profile and the curated one-click group.
fn hardcoded_entities(visual: &VisualEffects) -> Vec<OptimizationEntity> {
    use crate::backup::SettingKey;

    let group = OptimizationEntity::new(
        "gaming_essentials",
        SettingKey::new(BackupType::Registry, "gaming_essentials"),
        "Gaming Essentials",
        "Applies the recommended value of every core gaming tweak in one step.",
        Backend::Group {
            members: vec![
                "system_responsiveness".to_string(),
                "network_throttling_index".to_string(),
                "game_dvr_enabled".to_string(),
            ],
        },
        Metadata::basic(Category::Performance, "Groups"),
        OptimizationValue::Bool(true),
    );

    vec![visual.create_entity(), group]
}
