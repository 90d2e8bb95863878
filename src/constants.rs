// src/constants.rs

/// Root directory (relative to the executable) holding all backup state.
pub const BACKUP_DIR: &str = "settings_backup";
pub const MAIN_SUBDIR: &str = "main";
pub const SESSION_SUBDIR: &str = "session";
pub const ARCHIVE_SUBDIR: &str = "archive";

/// Directory holding the Rust game config profiles and versioned snapshots.
pub const PROFILES_DIR: &str = "profiles";
pub const RUST_BACKUPS_SUBDIR: &str = "rust_backups";

pub const FULL_REGISTRY_EXPORT_FILE: &str = "full_registry_export.reg";
pub const USER_PREFERENCES_FILE: &str = "user_preferences.json";
pub const UNKNOWN_VALUES_FILE: &str = "unknown_values.json";
pub const REGISTRY_AUDIT_LOG_FILE: &str = "registry_audit.log";

/// Schema version written into every backup document header.
pub const BACKUP_SCHEMA_VERSION: &str = "1.0";

/// A session backup older than this is considered stale and gets archived.
pub const SESSION_BACKUP_MAX_AGE_HOURS: i64 = 8;

/// A fresh versioned Rust-config snapshot is taken at most this often.
pub const VERSIONED_BACKUP_INTERVAL_DAYS: i64 = 30;

/// Literal header regedit writes at the top of every exported `.reg` file.
pub const REG_EXPORT_HEADER: &str = "Windows Registry Editor Version";
/// Anything smaller than this cannot be a real full-registry export.
pub const MIN_REG_EXPORT_SIZE: u64 = 1000;
/// How many `.reg` exports to retain when rotating old files.
pub const MAX_REG_BACKUP_FILES: usize = 5;

/// regedit/powershell subprocess polling cadence and hard ceiling.
pub const TOOL_POLL_INTERVAL_SECS: u64 = 5;
pub const TOOL_TIMEOUT_SECS: u64 = 300;

/// DWORD sentinel meaning "unlimited" for NetworkThrottlingIndex.
pub const NETWORK_THROTTLING_UNLIMITED: u32 = 0xFFFF_FFFF;

/// Recorded in a main backup for a setting whose registry value did not
/// exist when first observed; restore deletes the value instead of writing
/// a fabricated original.
pub const NON_EXISTENT_SENTINEL: &str = "NON_EXISTENT";
