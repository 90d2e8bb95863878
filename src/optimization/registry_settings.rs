// src/optimization/registry_settings.rs
//
// Registry-backed settings: the static definition table bound to live
// registry access, missing-path detection, the whitelist-gated creation
// path, and the value write with its refresh-broadcast side effect.

use std::{collections::HashSet, sync::Arc};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::{
    backup::{BackupType, SettingKey},
    errors::RegistryError,
    registry::{audit::AuditOp, RegistryAccess},
    system::SystemRefresh,
    value::OptimizationValue,
};

use super::{
    definitions::{registry_setting_definitions, RegistrySettingDefinition, WRAPPER_HANDLED_IDS},
    Backend, Metadata, OptimizationEntity,
};

pub struct RegistrySettings {
    access: Arc<RegistryAccess>,
    refresh: Arc<dyn SystemRefresh>,
    definitions: Vec<RegistrySettingDefinition>,
    missing_setting_ids: HashSet<String>,
}

impl RegistrySettings {
    pub fn new(access: Arc<RegistryAccess>, refresh: Arc<dyn SystemRefresh>) -> Self {
        Self {
            access,
            refresh,
            definitions: registry_setting_definitions(),
            missing_setting_ids: HashSet::new(),
        }
    }

    pub fn definitions(&self) -> &[RegistrySettingDefinition] {
        &self.definitions
    }

    pub fn definition(&self, id: &str) -> Option<&RegistrySettingDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    pub fn missing_setting_ids(&self) -> &HashSet<String> {
        &self.missing_setting_ids
    }

    /// Probes every definition for key and value existence. Strictly
    /// read-only: nothing is created here, only recorded as missing.
    pub fn check_current_values(&mut self) -> Result<()> {
        self.missing_setting_ids.clear();
        for def in &self.definitions {
            let present = self.access.key_exists(def.key)?
                && self.access.get_value(def.key, def.value_name)?.is_some();
            if !present {
                debug!(id = def.id, key = def.key, value = def.value_name, "setting missing");
                self.missing_setting_ids.insert(def.id.to_string());
            }
        }
        info!(
            total = self.definitions.len(),
            missing = self.missing_setting_ids.len(),
            "registry settings probed"
        );
        Ok(())
    }

    /// Wraps each definition into an entity. Wrapper-handled mouse values
    /// are skipped so the acceleration wrapper stays their only surface.
    pub fn create_entities(&self) -> Vec<OptimizationEntity> {
        self.definitions
            .iter()
            .filter(|def| !WRAPPER_HANDLED_IDS.contains(&def.id))
            .map(|def| {
                let mut entity = OptimizationEntity::new(
                    def.id,
                    SettingKey::new(BackupType::Registry, def.id),
                    def.name,
                    def.description,
                    Backend::Registry {
                        key: def.key.to_string(),
                        value_name: def.value_name.to_string(),
                    },
                    Metadata {
                        category: def.category,
                        subcategory: def.subcategory.to_string(),
                        level: def.level,
                        creation_allowed: def.creation_allowed,
                        is_advanced: def.is_advanced,
                        requires_system_refresh: def.requires_system_refresh,
                    },
                    def.recommended.clone(),
                );
                entity.is_missing = self.missing_setting_ids.contains(def.id);
                entity
            })
            .collect()
    }

    /// Reads the live value for a definition; `None` means the value is
    /// absent in every probed hive.
    pub fn current_value(&self, def: &RegistrySettingDefinition) -> Result<Option<OptimizationValue>> {
        Ok(self
            .access
            .get_value(def.key, def.value_name)?
            .map(|raw| OptimizationValue::from_registry(&raw)))
    }

    /// Creates the key chain and writes the value for a missing setting.
    /// Refused outright unless the definition is whitelisted; the denial
    /// itself is audited.
    pub fn create_missing_registry_path(
        &mut self,
        id: &str,
        value: &OptimizationValue,
    ) -> Result<()> {
        let def = self
            .definition(id)
            .ok_or_else(|| RegistryError::InvalidKeyFormat(id.to_string()))?
            .clone();
        if !def.creation_allowed {
            warn!(id, key = def.key, "registry path creation denied by whitelist");
            self.access
                .record_denied(AuditOp::CreateKey, def.key, def.value_name);
            return Err(RegistryError::CreationNotAllowed(id.to_string()).into());
        }
        self.access.create_key_chain(def.key)?;
        self.access
            .set_value(def.key, def.value_name, &value.to_registry())?;
        self.missing_setting_ids.remove(id);
        info!(id, key = def.key, "missing registry path created");
        Ok(())
    }

    /// Writes a value. Variant-to-registry conversion handles the
    /// NetworkThrottlingIndex unlimited sentinel; settings flagged for
    /// refresh get a shell broadcast after a successful write.
    pub fn apply_value(
        &self,
        def: &RegistrySettingDefinition,
        value: &OptimizationValue,
    ) -> Result<()> {
        let path = self
            .access
            .resolve_path(def.key)?
            .ok_or_else(|| RegistryError::KeyOpenError(def.key.to_string()))?;
        self.access
            .set_value(&path, def.value_name, &value.to_registry())?;
        if def.requires_system_refresh {
            if let Err(e) = self.refresh.broadcast_settings_change() {
                warn!(id = def.id, error = %e, "settings-change broadcast failed");
            }
        }
        Ok(())
    }

    /// Deletes the backing value; used to revert a setting whose original
    /// state was "did not exist".
    pub fn delete_value(&self, def: &RegistrySettingDefinition) -> Result<()> {
        let path = self
            .access
            .resolve_path(def.key)?
            .ok_or_else(|| RegistryError::KeyOpenError(def.key.to_string()))?;
        self.access.delete_value(&path, def.value_name)
    }
}
