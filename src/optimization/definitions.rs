// src/optimization/definitions.rs
//
// Static, compiled-in tables: registry-backed setting definitions, NVIDIA
// DRS setting ids with their symbolic values, and power-plan GUIDs.

use crate::value::OptimizationValue;

use super::{Category, SettingLevel};

/// Compiled-in description of one registry-backed setting.
#[derive(Clone, Debug)]
pub struct RegistrySettingDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Full hive-prefixed key path.
    pub key: &'static str,
    pub value_name: &'static str,
    pub recommended: OptimizationValue,
    pub category: Category,
    pub subcategory: &'static str,
    pub level: SettingLevel,
    pub is_advanced: bool,
    /// Security gate: only these settings may have their key chain created
    /// when missing.
    pub creation_allowed: bool,
    pub requires_system_refresh: bool,
}

/// Mouse settings represented through the acceleration wrapper entity
/// instead of one entity per raw registry value.
pub const WRAPPER_HANDLED_IDS: [&str; 3] = ["mouse_speed", "mouse_threshold1", "mouse_threshold2"];

const MULTIMEDIA_PROFILE: &str =
    "HKEY_LOCAL_MACHINE\\SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\Multimedia\\SystemProfile";
const GAMES_TASK: &str =
    "HKEY_LOCAL_MACHINE\\SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\Multimedia\\SystemProfile\\Tasks\\Games";
const MEMORY_MANAGEMENT: &str =
    "HKEY_LOCAL_MACHINE\\SYSTEM\\CurrentControlSet\\Control\\Session Manager\\Memory Management";
const PRIORITY_CONTROL: &str =
    "HKEY_LOCAL_MACHINE\\SYSTEM\\CurrentControlSet\\Control\\PriorityControl";
const MOUSE_KEY: &str = "HKEY_CURRENT_USER\\Control Panel\\Mouse";
const DESKTOP_KEY: &str = "HKEY_CURRENT_USER\\Control Panel\\Desktop";
const GAME_DVR_KEY: &str = "HKEY_CURRENT_USER\\System\\GameConfigStore";
const GAME_BAR_KEY: &str = "HKEY_CURRENT_USER\\SOFTWARE\\Microsoft\\GameBar";

pub fn registry_setting_definitions() -> Vec<RegistrySettingDefinition> {
    vec![
        RegistrySettingDefinition {
            id: "system_responsiveness",
            name: "System Responsiveness",
            description: "Share of CPU resources reserved for background multimedia tasks. \
                          0 prioritizes the foreground game.",
            key: MULTIMEDIA_PROFILE,
            value_name: "SystemResponsiveness",
            recommended: OptimizationValue::Int(0),
            category: Category::Performance,
            subcategory: "Multimedia",
            level: SettingLevel::Normal,
            is_advanced: false,
            creation_allowed: false,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "network_throttling_index",
            name: "Network Throttling",
            description: "Packet-rate throttle applied while multimedia plays. The unlimited \
                          sentinel disables throttling entirely.",
            key: MULTIMEDIA_PROFILE,
            value_name: "NetworkThrottlingIndex",
            recommended: OptimizationValue::Int(i64::from(i32::MAX)),
            category: Category::Network,
            subcategory: "Throttling",
            level: SettingLevel::Normal,
            is_advanced: false,
            creation_allowed: false,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "win32_priority_separation",
            name: "Foreground Priority Boost",
            description: "Quantum length and foreground/background priority split used by the \
                          scheduler.",
            key: PRIORITY_CONTROL,
            value_name: "Win32PrioritySeparation",
            recommended: OptimizationValue::Int(38),
            category: Category::Performance,
            subcategory: "Scheduler",
            level: SettingLevel::Experimental,
            is_advanced: true,
            creation_allowed: false,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "large_system_cache",
            name: "Large System Cache",
            description: "Favors the file-system cache over working sets when sizing memory.",
            key: MEMORY_MANAGEMENT,
            value_name: "LargeSystemCache",
            recommended: OptimizationValue::Int(0),
            category: Category::Performance,
            subcategory: "Memory",
            level: SettingLevel::Experimental,
            is_advanced: true,
            creation_allowed: false,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "disable_paging_executive",
            name: "Keep Kernel In Memory",
            description: "Prevents kernel-mode drivers and system code from being paged to disk.",
            key: MEMORY_MANAGEMENT,
            value_name: "DisablePagingExecutive",
            recommended: OptimizationValue::Int(1),
            category: Category::Performance,
            subcategory: "Memory",
            level: SettingLevel::Experimental,
            is_advanced: true,
            creation_allowed: false,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "games_gpu_priority",
            name: "Games GPU Priority",
            description: "GPU scheduling priority class for the Games multimedia task.",
            key: GAMES_TASK,
            value_name: "GPU Priority",
            recommended: OptimizationValue::Int(8),
            category: Category::Gpu,
            subcategory: "Scheduling",
            level: SettingLevel::Normal,
            is_advanced: false,
            creation_allowed: true,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "games_cpu_priority",
            name: "Games CPU Priority",
            description: "CPU priority class for the Games multimedia task.",
            key: GAMES_TASK,
            value_name: "Priority",
            recommended: OptimizationValue::Int(6),
            category: Category::Performance,
            subcategory: "Scheduling",
            level: SettingLevel::Normal,
            is_advanced: false,
            creation_allowed: true,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "games_scheduling_category",
            name: "Games Scheduling Category",
            description: "Multimedia class scheduler category for the Games task.",
            key: GAMES_TASK,
            value_name: "Scheduling Category",
            recommended: OptimizationValue::Text("High".to_string()),
            category: Category::Performance,
            subcategory: "Scheduling",
            level: SettingLevel::Normal,
            is_advanced: false,
            creation_allowed: true,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "game_dvr_enabled",
            name: "Game DVR",
            description: "Background game recording. Off removes its capture overhead.",
            key: GAME_DVR_KEY,
            value_name: "GameDVR_Enabled",
            recommended: OptimizationValue::Int(0),
            category: Category::System,
            subcategory: "Capture",
            level: SettingLevel::Normal,
            is_advanced: false,
            creation_allowed: false,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "game_dvr_fse_behavior",
            name: "Fullscreen Optimizations",
            description: "Fullscreen-exclusive behavior override recorded by the Game Bar.",
            key: GAME_DVR_KEY,
            value_name: "GameDVR_FSEBehavior",
            recommended: OptimizationValue::Int(2),
            category: Category::System,
            subcategory: "Capture",
            level: SettingLevel::Preference,
            is_advanced: true,
            creation_allowed: false,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "game_bar_auto_mode",
            name: "Game Bar Auto Mode",
            description: "Automatic Game Bar activation when a game is detected.",
            key: GAME_BAR_KEY,
            value_name: "AutoGameModeEnabled",
            recommended: OptimizationValue::Int(1),
            category: Category::System,
            subcategory: "Capture",
            level: SettingLevel::Preference,
            is_advanced: false,
            creation_allowed: true,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "menu_show_delay",
            name: "Menu Show Delay",
            description: "Milliseconds the shell waits before opening a hover menu.",
            key: DESKTOP_KEY,
            value_name: "MenuShowDelay",
            recommended: OptimizationValue::Text("0".to_string()),
            category: Category::Visual,
            subcategory: "Shell",
            level: SettingLevel::Preference,
            is_advanced: false,
            creation_allowed: false,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "wallpaper_quality",
            name: "Wallpaper JPEG Quality",
            description: "Compression quality the shell uses when re-encoding wallpaper. \
                          Takes effect only after a settings broadcast.",
            key: DESKTOP_KEY,
            value_name: "JPEGImportQuality",
            recommended: OptimizationValue::Int(100),
            category: Category::Visual,
            subcategory: "Shell",
            level: SettingLevel::Preference,
            is_advanced: false,
            creation_allowed: true,
            requires_system_refresh: true,
        },
        RegistrySettingDefinition {
            id: "mouse_acceleration",
            name: "Mouse Acceleration",
            description: "Pointer-precision curve. Off gives raw 1:1 input.",
            key: MOUSE_KEY,
            value_name: "MouseSpeed",
            recommended: OptimizationValue::Text("0".to_string()),
            category: Category::Input,
            subcategory: "Mouse",
            level: SettingLevel::Normal,
            is_advanced: false,
            creation_allowed: false,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "mouse_speed",
            name: "Mouse Speed",
            description: "Raw MouseSpeed value; surfaced through the acceleration wrapper.",
            key: MOUSE_KEY,
            value_name: "MouseSpeed",
            recommended: OptimizationValue::Text("0".to_string()),
            category: Category::Input,
            subcategory: "Mouse",
            level: SettingLevel::Reserved,
            is_advanced: true,
            creation_allowed: false,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "mouse_threshold1",
            name: "Mouse Threshold 1",
            description: "First acceleration threshold; surfaced through the wrapper.",
            key: MOUSE_KEY,
            value_name: "MouseThreshold1",
            recommended: OptimizationValue::Text("0".to_string()),
            category: Category::Input,
            subcategory: "Mouse",
            level: SettingLevel::Reserved,
            is_advanced: true,
            creation_allowed: false,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "mouse_threshold2",
            name: "Mouse Threshold 2",
            description: "Second acceleration threshold; surfaced through the wrapper.",
            key: MOUSE_KEY,
            value_name: "MouseThreshold2",
            recommended: OptimizationValue::Text("0".to_string()),
            category: Category::Input,
            subcategory: "Mouse",
            level: SettingLevel::Reserved,
            is_advanced: true,
            creation_allowed: false,
            requires_system_refresh: false,
        },
        RegistrySettingDefinition {
            id: "keyboard_delay",
            name: "Keyboard Repeat Delay",
            description: "Delay before a held key begins repeating.",
            key: "HKEY_CURRENT_USER\\Control Panel\\Keyboard",
            value_name: "KeyboardDelay",
            recommended: OptimizationValue::Text("0".to_string()),
            category: Category::Input,
            subcategory: "Keyboard",
            level: SettingLevel::Preference,
            is_advanced: false,
            creation_allowed: false,
            requires_system_refresh: false,
        },
    ]
}

/// One NVIDIA DRS setting: numeric id plus the symbolic values the driver
/// documents for it.
#[derive(Clone, Debug)]
pub struct NvidiaSettingDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub setting_id: u32,
    /// Symbolic name -> raw DRS value.
    pub values: &'static [(&'static str, u32)],
    pub recommended: &'static str,
    pub category: Category,
    pub subcategory: &'static str,
}

pub const NVIDIA_VSYNC: u32 = 0x00A8_79CF;
pub const NVIDIA_OGL_THREAD_CONTROL: u32 = 0x20C1_221E;
pub const NVIDIA_PRERENDER_LIMIT: u32 = 0x007B_A09E;
pub const NVIDIA_PREFERRED_PSTATE: u32 = 0x1057_EB71;

pub fn nvidia_setting_definitions() -> Vec<NvidiaSettingDefinition> {
    vec![
        NvidiaSettingDefinition {
            id: "nvidia_vsync",
            name: "Vertical Sync",
            description: "Driver-level vsync override. Forcing it off minimizes present latency.",
            setting_id: NVIDIA_VSYNC,
            values: &[
                ("VSYNCMODE_PASSIVE", 0x6086_0361),
                ("VSYNCMODE_FORCEOFF", 0x0841_6747),
                ("VSYNCMODE_FORCEON", 0x4741_0244),
            ],
            recommended: "VSYNCMODE_FORCEOFF",
            category: Category::Gpu,
            subcategory: "Latency",
        },
        NvidiaSettingDefinition {
            id: "nvidia_threaded_optimization",
            name: "Threaded Optimization",
            description: "OpenGL multithreaded command submission.",
            setting_id: NVIDIA_OGL_THREAD_CONTROL,
            values: &[
                ("OGL_THREAD_CONTROL_DEFAULT", 0x0000_0000),
                ("OGL_THREAD_CONTROL_ENABLE", 0x0000_0001),
                ("OGL_THREAD_CONTROL_DISABLE", 0x0000_0002),
            ],
            recommended: "OGL_THREAD_CONTROL_ENABLE",
            category: Category::Gpu,
            subcategory: "Pipeline",
        },
        NvidiaSettingDefinition {
            id: "nvidia_prerender_limit",
            name: "Max Pre-Rendered Frames",
            description: "CPU frames queued ahead of the GPU. 1 trades throughput for latency.",
            setting_id: NVIDIA_PRERENDER_LIMIT,
            values: &[
                ("PRERENDERLIMIT_APP_CONTROLLED", 0x0000_0000),
                ("PRERENDERLIMIT_1", 0x0000_0001),
                ("PRERENDERLIMIT_2", 0x0000_0002),
                ("PRERENDERLIMIT_3", 0x0000_0003),
            ],
            recommended: "PRERENDERLIMIT_1",
            category: Category::Gpu,
            subcategory: "Latency",
        },
        NvidiaSettingDefinition {
            id: "nvidia_power_mode",
            name: "Power Management Mode",
            description: "Preferred GPU performance state while a 3D app runs.",
            setting_id: NVIDIA_PREFERRED_PSTATE,
            values: &[
                ("PREFERRED_PSTATE_ADAPTIVE", 0x0000_0000),
                ("PREFERRED_PSTATE_PREFER_MAX", 0x0000_0001),
                ("PREFERRED_PSTATE_PREFER_MIN", 0x0000_0003),
            ],
            recommended: "PREFERRED_PSTATE_PREFER_MAX",
            category: Category::Gpu,
            subcategory: "Power",
        },
    ]
}

impl NvidiaSettingDefinition {
    pub fn symbol_for(&self, raw: u32) -> Option<&'static str> {
        self.values
            .iter()
            .find(|(_, v)| *v == raw)
            .map(|(name, _)| *name)
    }

    pub fn raw_for(&self, symbol: &str) -> Option<u32> {
        self.values
            .iter()
            .find(|(name, _)| *name == symbol)
            .map(|(_, v)| *v)
    }
}

pub const POWER_PLAN_BALANCED: &str = "381b4222-f694-41f0-9685-ff5bb260df2e";
pub const POWER_PLAN_HIGH_PERFORMANCE: &str = "8c5e7fda-e8bf-4a96-9a85-a6e23a8c635c";

/// HKCU key holding the visual-effects profile selector.
pub const VISUAL_EFFECTS_KEY: &str =
    "HKEY_CURRENT_USER\\Software\\Microsoft\\Windows\\CurrentVersion\\Explorer\\VisualEffects";
pub const VISUAL_EFFECTS_VALUE: &str = "VisualFXSetting";

pub fn visual_effects_profile_name(profile: i32) -> &'static str {
    match profile {
        0 => "Let Windows choose",
        1 => "Best appearance",
        2 => "Best performance",
        3 => "Custom",
        _ => "Unknown",
    }
}
