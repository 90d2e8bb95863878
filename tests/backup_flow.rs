// tests/backup_flow.rs
//
// End-to-end flows through the bootstrap root: fresh-machine startup,
// backup completeness, and apply/revert against the session snapshot.

use std::{fs, path::PathBuf, sync::Arc};

use checkmark::{
    bootstrap::{Services, SystemAdapters},
    optimization::definitions::{
        NVIDIA_VSYNC, POWER_PLAN_BALANCED, POWER_PLAN_HIGH_PERFORMANCE,
    },
    system::{
        memory::{
            MemoryDriverStore, MemoryPowerPlans, MemoryRegistryStore, RecordingRefresh,
            ScriptedToolRunner,
        },
        DriverSettingsStore, PowerPlan, RegistryStore, RegistryValue,
    },
    value::OptimizationValue,
};

struct Machine {
    base: PathBuf,
    store: Arc<MemoryRegistryStore>,
    drivers: Arc<MemoryDriverStore>,
    services: Services,
}

impl Drop for Machine {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.base);
    }
}

fn valid_export_body() -> String {
    let mut body = String::from("Windows Registry Editor Version 5.00\r\n\r\n");
    while body.len() < 1200 {
        body.push_str("[HKEY_CURRENT_USER\\Software\\Checkmark]\r\n\"V\"=dword:00000001\r\n");
    }
    body
}

/// A plausible stock gaming PC, entirely in memory.
fn machine(tag: &str) -> Machine {
    let base = std::env::temp_dir().join(format!("checkmark_e2e_{}_{}", tag, std::process::id()));
    let _ = fs::remove_dir_all(&base);
    fs::create_dir_all(&base).unwrap();

    let store = Arc::new(MemoryRegistryStore::new());
    store.seed(
        "HKEY_LOCAL_MACHINE\\SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\Multimedia\\SystemProfile",
        "SystemResponsiveness",
        RegistryValue::Dword(20),
    );
    store.seed(
        "HKEY_LOCAL_MACHINE\\SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\Multimedia\\SystemProfile",
        "NetworkThrottlingIndex",
        RegistryValue::Dword(10),
    );
    store.seed(
        "HKEY_CURRENT_USER\\System\\GameConfigStore",
        "GameDVR_Enabled",
        RegistryValue::Dword(1),
    );
    store.seed(
        "HKEY_CURRENT_USER\\Control Panel\\Mouse",
        "MouseSpeed",
        RegistryValue::String("1".to_string()),
    );
    store.seed(
        "HKEY_CURRENT_USER\\Software\\Microsoft\\Windows\\CurrentVersion\\Explorer\\VisualEffects",
        "VisualFXSetting",
        RegistryValue::Dword(0),
    );

    let drivers = Arc::new(MemoryDriverStore::new(Some("GeForce RTX 3080")));
    drivers.load().unwrap();
    drivers.seed(NVIDIA_VSYNC, 0x6086_0361); // VSYNCMODE_PASSIVE

    let adapters = SystemAdapters {
        registry: store.clone(),
        drivers: drivers.clone(),
        power: Arc::new(MemoryPowerPlans::new(
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
        )),
        refresh: Arc::new(RecordingRefresh::new()),
        tools: Arc::new(ScriptedToolRunner::new(&valid_export_body())),
    };

    let services = Services::start(&base, adapters).unwrap();
    Machine {
        base,
        store,
        drivers,
        services,
    }
}

#[test]
fn fresh_machine_startup_creates_every_backup() {
    let m = machine("fresh");
    let root = m.base.join("settings_backup");

    for file in ["registry.json", "nvidia.json", "visual_effects.json", "power_plan.json"] {
        assert!(root.join("main").join(file).exists(), "main/{} missing", file);
        assert!(
            root.join("session").join(file).exists(),
            "session/{} missing",
            file
        );
    }
    assert!(root.join("full_registry_export.reg").exists());

    // A second pass finds everything current: nothing new is created.
    let mut m = m;
    let summary = m.services.create_all_backups_if_needed();
    assert!(summary.all_ok(), "failures: {:?}", summary.failed);
    assert!(summary.created.is_empty(), "recreated: {:?}", summary.created);
}

#[test]
fn apply_then_revert_returns_to_session_start() {
    let mut m = machine("revert");

    m.services
        .apply_optimization(
            "nvidia_vsync",
            OptimizationValue::Text("VSYNCMODE_FORCEOFF".into()),
        )
        .unwrap();
    assert_eq!(m.drivers.get_setting(NVIDIA_VSYNC).unwrap(), Some(0x0841_6747));

    m.services.revert_optimization("nvidia_vsync", false).unwrap();
    // Back to the value observed at process start, not a factory default.
    assert_eq!(m.drivers.get_setting(NVIDIA_VSYNC).unwrap(), Some(0x6086_0361));
}

#[test]
fn main_backup_survives_applies_unchanged() {
    let mut m = machine("immutable");

    m.services
        .apply_optimization("system_responsiveness", OptimizationValue::Int(0))
        .unwrap();
    let summary = m.services.create_all_backups_if_needed();
    assert!(summary.all_ok());

    let key = m
        .services
        .manager
        .entity("system_responsiveness")
        .unwrap()
        .key
        .clone();
    assert_eq!(
        m.services.backup.original_value(&key),
        Some(OptimizationValue::Int(20)),
        "main backup must keep the first-observed value"
    );
}

#[test]
fn revert_to_original_restores_first_observed_state() {
    let mut m = machine("original");

    m.services
        .apply_optimization("system_responsiveness", OptimizationValue::Int(0))
        .unwrap();
    m.services
        .apply_optimization(
            "power_plan",
            OptimizationValue::Text(POWER_PLAN_HIGH_PERFORMANCE.into()),
        )
        .unwrap();

    m.services
        .revert_optimization("system_responsiveness", true)
        .unwrap();
    m.services.revert_optimization("power_plan", true).unwrap();

    assert_eq!(
        m.store
            .read_value(
                "HKEY_LOCAL_MACHINE\\SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\Multimedia\\SystemProfile",
                "SystemResponsiveness"
            )
            .unwrap(),
        Some(RegistryValue::Dword(20))
    );
    assert_eq!(
        m.services.manager.live_value("power_plan").unwrap(),
        Some(OptimizationValue::Text(POWER_PLAN_BALANCED.into()))
    );
}

#[test]
fn full_export_is_never_regenerated() {
    let mut m = machine("export_once");
    let export = m.base.join("settings_backup").join("full_registry_export.reg");
    let first = fs::metadata(&export).unwrap().modified().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(30));
    let summary = m.services.create_all_backups_if_needed();
    assert!(summary.all_ok());
    assert_eq!(fs::metadata(&export).unwrap().modified().unwrap(), first);
}
