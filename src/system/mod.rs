// src/system/mod.rs
//
// Collaborator interfaces the core talks to: the Win32 registry, NVIDIA's
// driver-settings store, the power-plan API, the settings-change broadcast
// surface, and the external-tool launcher used for regedit/powershell.
// Real implementations live in `windows`; `memory` provides in-process
// implementations used for dry runs and tests.

pub mod memory;
pub mod process;
#[cfg(windows)]
pub mod windows;

use std::{fmt, path::Path, time::Duration};

use anyhow::Result;

/// Enumeration of supported registry key value types.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RegistryValue {
    Dword(u32),
    String(String),
    Binary(Vec<u8>),
}

impl fmt::Display for RegistryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryValue::Dword(v) => write!(f, "Dword({})", v),
            RegistryValue::String(v) => write!(f, "String({})", v),
            RegistryValue::Binary(v) => write!(f, "Binary({:?})", v),
        }
    }
}

/// Win32-style registry key/value store. Paths are full hive-prefixed paths
/// (e.g. `HKEY_CURRENT_USER\Software\...`); value reads distinguish "key or
/// value absent" (`None`) from "present but empty".
pub trait RegistryStore: Send + Sync {
    fn read_value(&self, path: &str, name: &str) -> Result<Option<RegistryValue>>;

    /// Writes a value into an existing key. Fails if the key itself is
    /// missing; key creation is a separate, audited, whitelist-gated step.
    fn write_value(&self, path: &str, name: &str, value: &RegistryValue) -> Result<()>;

    fn delete_value(&self, path: &str, name: &str) -> Result<()>;

    fn key_exists(&self, path: &str) -> Result<bool>;

    /// Creates the full key chain component by component so every
    /// intermediate creation can be audited individually.
    fn create_key_chain(&self, path: &str) -> Result<()>;
}

/// NVIDIA DRS session, treated as an opaque numeric key/value store.
pub trait DriverSettingsStore: Send + Sync {
    /// Loads the driver settings session. Must be called before get/set.
    fn load(&self) -> Result<()>;
    fn get_setting(&self, setting_id: u32) -> Result<Option<u32>>;
    fn set_setting(&self, setting_id: u32, value: u32) -> Result<()>;
    /// Persists pending changes to the driver profile.
    fn save(&self) -> Result<()>;
    /// Name of the detected GPU, if any.
    fn gpu_name(&self) -> Option<String>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PowerPlan {
    pub guid: String,
    pub name: String,
}

/// Power-plan enumeration/activation surface.
pub trait PowerPlanControl: Send + Sync {
    fn active_plan(&self) -> Result<PowerPlan>;
    fn list_plans(&self) -> Result<Vec<PowerPlan>>;
    fn set_active(&self, guid: &str) -> Result<()>;
}

/// Settings-change broadcast (wallpaper refresh path). Some registry writes
/// only take effect after the shell is told to re-read them.
pub trait SystemRefresh: Send + Sync {
    fn broadcast_settings_change(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Launcher for external native tools (regedit.exe, powershell.exe).
/// Implementations poll the child instead of blocking so a multi-minute
/// registry export keeps the host process responsive, and kill the child
/// once the timeout ceiling is hit.
pub trait ToolRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<ToolOutput>;

    /// Runs a tool whose observable outcome is a file appearing at `dest`
    /// (regedit's export path). Default implementation just delegates.
    fn run_producing(
        &self,
        program: &str,
        args: &[&str],
        _dest: &Path,
        timeout: Duration,
    ) -> Result<ToolOutput> {
        self.run(program, args, timeout)
    }
}
