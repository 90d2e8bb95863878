// src/system/memory.rs
//
// In-process implementations of the collaborator interfaces. Used for
// dry-run mode and for tests, where they double as a scriptable fake of
// the machine state.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use anyhow::Result;

use super::{
    DriverSettingsStore, PowerPlan, PowerPlanControl, RegistryStore, RegistryValue, SystemRefresh,
    ToolOutput, ToolRunner,
};

/// Registry keys and values held in ordered maps. Key existence is tracked
/// independently of values so "key exists but value absent" behaves like the
/// real registry.
#[derive(Default)]
pub struct MemoryRegistryStore {
    keys: Mutex<BTreeMap<String, BTreeMap<String, RegistryValue>>>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a key and value in one step, creating intermediate keys.
    pub fn seed(&self, path: &str, name: &str, value: RegistryValue) {
        let mut keys = self.keys.lock().unwrap();
        for prefix in key_chain(path) {
            keys.entry(prefix).or_default();
        }
        keys.entry(path.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Seeds an empty key without any values.
    pub fn seed_key(&self, path: &str) {
        let mut keys = self.keys.lock().unwrap();
        for prefix in key_chain(path) {
            keys.entry(prefix).or_default();
        }
    }
}

fn key_chain(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut acc = String::new();
    for component in path.split('\\') {
        if !acc.is_empty() {
            acc.push('\\');
        }
        acc.push_str(component);
        out.push(acc.clone());
    }
    out
}

impl RegistryStore for MemoryRegistryStore {
    fn read_value(&self, path: &str, name: &str) -> Result<Option<RegistryValue>> {
        let keys = self.keys.lock().unwrap();
        Ok(keys.get(path).and_then(|values| values.get(name)).cloned())
    }

    fn write_value(&self, path: &str, name: &str, value: &RegistryValue) -> Result<()> {
        let mut keys = self.keys.lock().unwrap();
        match keys.get_mut(path) {
            Some(values) => {
                values.insert(name.to_string(), value.clone());
                Ok(())
            }
            None => anyhow::bail!("Key '{}' does not exist", path),
        }
    }

    fn delete_value(&self, path: &str, name: &str) -> Result<()> {
        let mut keys = self.keys.lock().unwrap();
        if let Some(values) = keys.get_mut(path) {
            values.remove(name);
        }
        Ok(())
    }

    fn key_exists(&self, path: &str) -> Result<bool> {
        Ok(self.keys.lock().unwrap().contains_key(path))
    }

    fn create_key_chain(&self, path: &str) -> Result<()> {
        let mut keys = self.keys.lock().unwrap();
        for prefix in key_chain(path) {
            keys.entry(prefix).or_default();
        }
        Ok(())
    }
}

/// Driver-settings store backed by a plain map of DRS setting id -> value.
pub struct MemoryDriverStore {
    gpu: Option<String>,
    loaded: AtomicBool,
    settings: Mutex<HashMap<u32, u32>>,
}

impl MemoryDriverStore {
    pub fn new(gpu: Option<&str>) -> Self {
        Self {
            gpu: gpu.map(str::to_string),
            loaded: AtomicBool::new(false),
            settings: Mutex::new(HashMap::new()),
        }
    }

    pub fn seed(&self, setting_id: u32, value: u32) {
        self.settings.lock().unwrap().insert(setting_id, value);
    }
}

impl DriverSettingsStore for MemoryDriverStore {
    fn load(&self) -> Result<()> {
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn get_setting(&self, setting_id: u32) -> Result<Option<u32>> {
        if !self.loaded.load(Ordering::SeqCst) {
            anyhow::bail!("Driver settings session not loaded");
        }
        Ok(self.settings.lock().unwrap().get(&setting_id).copied())
    }

    fn set_setting(&self, setting_id: u32, value: u32) -> Result<()> {
        if !self.loaded.load(Ordering::SeqCst) {
            anyhow::bail!("Driver settings session not loaded");
        }
        self.settings.lock().unwrap().insert(setting_id, value);
        Ok(())
    }

    fn save(&self) -> Result<()> {
        Ok(())
    }

    fn gpu_name(&self) -> Option<String> {
        self.gpu.clone()
    }
}

/// Power plans as a fixed list with a switchable active entry.
pub struct MemoryPowerPlans {
    plans: Vec<PowerPlan>,
    active: Mutex<String>,
}

impl MemoryPowerPlans {
    pub fn new(plans: Vec<PowerPlan>, active_guid: &str) -> Self {
        Self {
            plans,
            active: Mutex::new(active_guid.to_string()),
        }
    }
}

impl PowerPlanControl for MemoryPowerPlans {
    fn active_plan(&self) -> Result<PowerPlan> {
        let guid = self.active.lock().unwrap().clone();
        self.plans
            .iter()
            .find(|p| p.guid == guid)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Active power plan '{}' not in plan list", guid))
    }

    fn list_plans(&self) -> Result<Vec<PowerPlan>> {
        Ok(self.plans.clone())
    }

    fn set_active(&self, guid: &str) -> Result<()> {
        if !self.plans.iter().any(|p| p.guid == guid) {
            anyhow::bail!("Unknown power plan '{}'", guid);
        }
        *self.active.lock().unwrap() = guid.to_string();
        Ok(())
    }
}

/// Counts settings-change broadcasts instead of touching the shell.
#[derive(Default)]
pub struct RecordingRefresh {
    broadcasts: AtomicUsize,
}

impl RecordingRefresh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }
}

impl SystemRefresh for RecordingRefresh {
    fn broadcast_settings_change(&self) -> Result<()> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Tool runner that never spawns a process. Invocations are recorded, and
/// `run_producing` writes canned content to the destination so export flows
/// can be exercised end to end.
pub struct ScriptedToolRunner {
    pub canned_output: String,
    invocations: Mutex<Vec<String>>,
}

impl ScriptedToolRunner {
    pub fn new(canned_output: &str) -> Self {
        Self {
            canned_output: canned_output.to_string(),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }
}

impl ToolRunner for ScriptedToolRunner {
    fn run(&self, program: &str, args: &[&str], _timeout: Duration) -> Result<ToolOutput> {
        self.invocations
            .lock()
            .unwrap()
            .push(format!("{} {}", program, args.join(" ")));
        Ok(ToolOutput {
            exit_code: Some(0),
            stdout: self.canned_output.clone(),
            stderr: String::new(),
        })
    }

    fn run_producing(
        &self,
        program: &str,
        args: &[&str],
        dest: &Path,
        timeout: Duration,
    ) -> Result<ToolOutput> {
        let output = self.run(program, args, timeout)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, self.canned_output.as_bytes())?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_requires_existing_key() {
        let store = MemoryRegistryStore::new();
        let err = store.write_value(
            "HKEY_CURRENT_USER\\Software\\Missing",
            "Value",
            &RegistryValue::Dword(1),
        );
        assert!(err.is_err());

        store
            .create_key_chain("HKEY_CURRENT_USER\\Software\\Missing")
            .unwrap();
        store
            .write_value(
                "HKEY_CURRENT_USER\\Software\\Missing",
                "Value",
                &RegistryValue::Dword(1),
            )
            .unwrap();
        assert_eq!(
            store
                .read_value("HKEY_CURRENT_USER\\Software\\Missing", "Value")
                .unwrap(),
            Some(RegistryValue::Dword(1))
        );
    }

    #[test]
    fn create_key_chain_creates_intermediates() {
        let store = MemoryRegistryStore::new();
        store
            .create_key_chain("HKEY_CURRENT_USER\\Software\\A\\B\\C")
            .unwrap();
        assert!(store.key_exists("HKEY_CURRENT_USER\\Software\\A").unwrap());
        assert!(store
            .key_exists("HKEY_CURRENT_USER\\Software\\A\\B")
            .unwrap());
    }

    #[test]
    fn driver_store_requires_load() {
        let drivers = MemoryDriverStore::new(Some("GeForce RTX 3080"));
        assert!(drivers.get_setting(1).is_err());
        drivers.load().unwrap();
        assert_eq!(drivers.get_setting(1).unwrap(), None);
        drivers.set_setting(1, 7).unwrap();
        assert_eq!(drivers.get_setting(1).unwrap(), Some(7));
    }

    #[test]
    fn power_plan_switching() {
        let plans = MemoryPowerPlans::new(
            vec![
                PowerPlan {
                    guid: "aaa".into(),
                    name: "Balanced".into(),
                },
                PowerPlan {
                    guid: "bbb".into(),
                    name: "High performance".into(),
                },
            ],
            "aaa",
        );
        assert_eq!(plans.active_plan().unwrap().name, "Balanced");
        plans.set_active("bbb").unwrap();
        assert_eq!(plans.active_plan().unwrap().name, "High performance");
        assert!(plans.set_active("zzz").is_err());
    }
}
