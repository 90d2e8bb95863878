// src/optimization/power_plan.rs

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::{
    backup::{BackupType, SettingKey},
    system::{PowerPlan, PowerPlanControl},
    value::OptimizationValue,
};

use super::{
    definitions::POWER_PLAN_HIGH_PERFORMANCE, Backend, Category, Metadata, OptimizationEntity,
};

pub const POWER_PLAN_ID: &str = "power_plan";

/// Power-plan activation, exposed as a single entity whose value is the
/// active scheme GUID.
pub struct PowerPlans {
    control: Arc<dyn PowerPlanControl>,
}

impl PowerPlans {
    pub fn new(control: Arc<dyn PowerPlanControl>) -> Self {
        Self { control }
    }

    pub fn create_entity(&self) -> OptimizationEntity {
        OptimizationEntity::new(
            POWER_PLAN_ID,
            SettingKey::new(BackupType::PowerPlan, POWER_PLAN_ID),
            "Power Plan",
            "Active Windows power scheme. High performance keeps cores from parking.",
            Backend::PowerPlan,
            Metadata::basic(Category::Power, "Scheme"),
            OptimizationValue::Text(POWER_PLAN_HIGH_PERFORMANCE.to_string()),
        )
    }

    pub fn active_plan(&self) -> Result<PowerPlan> {
        self.control.active_plan()
    }

    pub fn list_plans(&self) -> Result<Vec<PowerPlan>> {
        self.control.list_plans()
    }

    pub fn apply_guid(&self, guid: &str) -> Result<()> {
        self.control.set_active(guid)?;
        info!(guid, "power plan activated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        optimization::definitions::POWER_PLAN_BALANCED, system::memory::MemoryPowerPlans,
    };

    fn plans() -> PowerPlans {
        PowerPlans::new(Arc::new(MemoryPowerPlans::new(
            vec![
                PowerPlan {
                    guid: POWER_PLAN_BALANCED.into(),
                    name: "Balanced".into(),
                },
                PowerPlan {
                    guid: POWER_PLAN_HIGH_PERFORMANCE.into(),
                    name: "High performance".into(),
                },
            ],
            POWER_PLAN_BALANCED,
        )))
    }

    #[test]
    fn apply_switches_active_plan() {
        let plans = plans();
        assert_eq!(plans.active_plan().unwrap().name, "Balanced");
        plans.apply_guid(POWER_PLAN_HIGH_PERFORMANCE).unwrap();
        assert_eq!(plans.active_plan().unwrap().name, "High performance");
    }
}
