// src/optimization/nvidia.rs
//
// NVIDIA driver settings through the DRS session interface. Values travel
// as symbolic names (VSYNCMODE_FORCEOFF, ...) so backups stay readable;
// raw ids a definition does not document fall back to plain ints.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::{
    backup::{BackupType, SettingKey},
    system::DriverSettingsStore,
    value::OptimizationValue,
};

use super::{
    definitions::{nvidia_setting_definitions, NvidiaSettingDefinition},
    Backend, Metadata, OptimizationEntity, SettingLevel,
};

pub struct NvidiaSettings {
    store: Arc<dyn DriverSettingsStore>,
    definitions: Vec<NvidiaSettingDefinition>,
}

impl NvidiaSettings {
    /// Returns `None` when no GPU is detected; the caller then creates no
    /// NVIDIA entities at all.
    pub fn detect(store: Arc<dyn DriverSettingsStore>) -> Result<Option<Self>> {
        let gpu = match store.gpu_name() {
            Some(name) => name,
            None => {
                debug!("no NVIDIA GPU detected, skipping driver settings");
                return Ok(None);
            }
        };
        store.load()?;
        info!(gpu, "NVIDIA driver settings session loaded");
        Ok(Some(Self {
            store,
            definitions: nvidia_setting_definitions(),
        }))
    }

    pub fn definitions(&self) -> &[NvidiaSettingDefinition] {
        &self.definitions
    }

    pub fn definition(&self, id: &str) -> Option<&NvidiaSettingDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    pub fn create_entities(&self) -> Vec<OptimizationEntity> {
        self.definitions
            .iter()
            .map(|def| {
                OptimizationEntity::new(
                    def.id,
                    SettingKey::new(BackupType::NvidiaSettings, def.id),
                    def.name,
                    def.description,
                    Backend::Nvidia {
                        setting_id: def.setting_id,
                    },
                    Metadata {
                        category: def.category,
                        subcategory: def.subcategory.to_string(),
                        level: SettingLevel::Normal,
                        creation_allowed: false,
                        is_advanced: false,
                        requires_system_refresh: false,
                    },
                    OptimizationValue::Text(def.recommended.to_string()),
                )
            })
            .collect()
    }

    /// Reads the live driver value, mapped back to its symbolic name when
    /// the definition documents it.
    pub fn current_value(&self, def: &NvidiaSettingDefinition) -> Result<Option<OptimizationValue>> {
        Ok(self.store.get_setting(def.setting_id)?.map(|raw| {
            match def.symbol_for(raw) {
                Some(symbol) => OptimizationValue::Text(symbol.to_string()),
                None => OptimizationValue::Int(i64::from(raw)),
            }
        }))
    }

    /// Writes and persists one driver setting. Symbolic text resolves
    /// through the definition's value table; ints pass through raw.
    pub fn apply_value(&self, def: &NvidiaSettingDefinition, value: &OptimizationValue) -> Result<()> {
        let raw = match value {
            OptimizationValue::Text(symbol) => def.raw_for(symbol).ok_or_else(|| {
                anyhow::anyhow!("'{}' is not a documented value for {}", symbol, def.id)
            })?,
            OptimizationValue::Int(v) => u32::try_from(*v)
                .map_err(|_| anyhow::anyhow!("{} is out of range for a DRS value", v))?,
            other => anyhow::bail!("Unsupported value {:?} for driver setting {}", other, def.id),
        };
        self.store.set_setting(def.setting_id, raw)?;
        self.store.save()?;
        debug!(id = def.id, raw, "driver setting written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::memory::MemoryDriverStore;

    #[test]
    fn no_gpu_means_no_component() {
        let store = Arc::new(MemoryDriverStore::new(None));
        assert!(NvidiaSettings::detect(store).unwrap().is_none());
    }

    #[test]
    fn symbolic_round_trip_through_the_driver() {
        let store = Arc::new(MemoryDriverStore::new(Some("GeForce RTX 3080")));
        let nvidia = NvidiaSettings::detect(store.clone()).unwrap().unwrap();
        let vsync = nvidia.definition("nvidia_vsync").unwrap().clone();

        store.seed(vsync.setting_id, vsync.raw_for("VSYNCMODE_PASSIVE").unwrap());
        assert_eq!(
            nvidia.current_value(&vsync).unwrap(),
            Some(OptimizationValue::Text("VSYNCMODE_PASSIVE".to_string()))
        );

        nvidia
            .apply_value(
                &vsync,
                &OptimizationValue::Text("VSYNCMODE_FORCEOFF".to_string()),
            )
            .unwrap();
        assert_eq!(
            nvidia.current_value(&vsync).unwrap(),
            Some(OptimizationValue::Text("VSYNCMODE_FORCEOFF".to_string()))
        );
    }

    #[test]
    fn undocumented_raw_value_reads_as_int() {
        let store = Arc::new(MemoryDriverStore::new(Some("GeForce GTX 1060")));
        let nvidia = NvidiaSettings::detect(store.clone()).unwrap().unwrap();
        let vsync = nvidia.definition("nvidia_vsync").unwrap().clone();
        store.seed(vsync.setting_id, 0xDEAD);
        assert_eq!(
            nvidia.current_value(&vsync).unwrap(),
            Some(OptimizationValue::Int(0xDEAD))
        );
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let store = Arc::new(MemoryDriverStore::new(Some("GeForce RTX 3080")));
        let nvidia = NvidiaSettings::detect(store).unwrap().unwrap();
        let vsync = nvidia.definition("nvidia_vsync").unwrap().clone();
        assert!(nvidia
            .apply_value(&vsync, &OptimizationValue::Text("VSYNCMODE_TURBO".into()))
            .is_err());
    }
}
