// src/optimization/visual_effects.rs
//
// The visual-effects profile selector. One registry value drives it, but
// the shell only honors a change after a settings broadcast.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::{
    backup::{BackupType, SettingKey},
    registry::RegistryAccess,
    system::{RegistryValue, SystemRefresh},
    value::OptimizationValue,
};

use super::{
    definitions::{visual_effects_profile_name, VISUAL_EFFECTS_KEY, VISUAL_EFFECTS_VALUE},
    Backend, Category, Metadata, OptimizationEntity,
};

pub const VISUAL_EFFECTS_ID: &str = "visual_effects_profile";
const BEST_PERFORMANCE: i64 = 2;

pub struct VisualEffects {
    access: Arc<RegistryAccess>,
    refresh: Arc<dyn SystemRefresh>,
}

impl VisualEffects {
    pub fn new(access: Arc<RegistryAccess>, refresh: Arc<dyn SystemRefresh>) -> Self {
        Self { access, refresh }
    }

    pub fn create_entity(&self) -> OptimizationEntity {
        let mut metadata = Metadata::basic(Category::Visual, "Profile");
        metadata.requires_system_refresh = true;
        OptimizationEntity::new(
            VISUAL_EFFECTS_ID,
            SettingKey::new(BackupType::VisualEffects, VISUAL_EFFECTS_ID),
            "Visual Effects Profile",
            "Windows visual-effects preset. Best performance disables animations and shadows.",
            Backend::VisualEffects,
            metadata,
            OptimizationValue::Int(BEST_PERFORMANCE),
        )
    }

    /// Current profile index; missing value means "Let Windows choose".
    pub fn current_profile(&self) -> Result<i32> {
        Ok(
            match self.access.get_value(VISUAL_EFFECTS_KEY, VISUAL_EFFECTS_VALUE)? {
                Some(RegistryValue::Dword(v)) => v as i32,
                _ => 0,
            },
        )
    }

    pub fn profile_name(&self, profile: i32) -> &'static str {
        visual_effects_profile_name(profile)
    }

    pub fn apply_profile(&self, profile: i32) -> Result<()> {
        // The key is always present on a stock install but a fresh user
        // profile can lack it.
        if !self.access.key_exists(VISUAL_EFFECTS_KEY)? {
            self.access.create_key_chain(VISUAL_EFFECTS_KEY)?;
        }
        self.access.set_value(
            VISUAL_EFFECTS_KEY,
            VISUAL_EFFECTS_VALUE,
            &RegistryValue::Dword(profile as u32),
        )?;
        self.refresh.broadcast_settings_change()?;
        info!(profile, name = self.profile_name(profile), "visual effects profile applied");
        Ok(())
    }
}
