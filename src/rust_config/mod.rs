// src/rust_config/mod.rs
//
// The Rust game's client.cfg treated as a structured settings store with
// the same backup discipline as the registry side, but file-based: a
// write-once `.original` sidecar instead of a main backup, line-preserving
// atomic rewrites instead of value writes, and 30-day versioned snapshots.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::{
    backup::RustConfigSnapshot,
    constants::{RUST_BACKUPS_SUBDIR, VERSIONED_BACKUP_INTERVAL_DAYS},
    errors::RustConfigError,
    registry::RegistryAccess,
    system::RegistryValue,
    value::{normalize, OptimizationValue},
};

const CLIENT_CFG: &str = "client.cfg";
const AUX_FILES: [&str; 3] = ["favorites.cfg", "keys.cfg", "keys_default.cfg"];
const GAME_EXECUTABLES: [&str; 2] = ["Rust.exe", "RustClient.exe"];

/// One settable key from client.cfg.
#[derive(Clone, Debug, PartialEq)]
pub struct RustSetting {
    pub key: String,
    pub current_value: String,
    pub optimal_value: Option<String>,
    pub is_bool: bool,
    pub possible_values: Vec<String>,
}

/// Performance-relevant client.cfg keys and their recommended values.
fn optimal_settings() -> IndexMap<&'static str, &'static str> {
    IndexMap::from([
        ("graphics.af", "4"),
        ("graphics.parallax", "0"),
        ("graphics.shaderlod", "100"),
        ("graphics.shadowquality", "0"),
        ("graphics.shadowlights", "1"),
        ("effects.motionblur", "False"),
        ("effects.antialiasing", "0"),
        ("grass.displacement", "False"),
        ("gc.buffer", "2048"),
        ("physics.steps", "60"),
    ])
}

pub struct RustConfigManager {
    config_path: PathBuf,
    profiles_dir: PathBuf,
    settings: Vec<RustSetting>,
}

impl RustConfigManager {
    /// Locates client.cfg by probing the Steam install path in the
    /// registry, the common install directories, and every drive's
    /// `SteamLibrary`, verifying the game executable exists alongside.
    pub fn locate(registry: &RegistryAccess, profiles_dir: &Path) -> Result<Self> {
        let mut roots: Vec<PathBuf> = Vec::new();

        for (key, name) in [
            ("HKEY_CURRENT_USER\\Software\\Valve\\Steam", "SteamPath"),
            (
                "HKEY_LOCAL_MACHINE\\SOFTWARE\\WOW6432Node\\Valve\\Steam",
                "InstallPath",
            ),
        ] {
            if let Ok(Some(RegistryValue::String(path))) = registry.get_value(key, name) {
                roots.push(PathBuf::from(path));
            }
        }
        roots.push(PathBuf::from("C:\\Program Files (x86)\\Steam"));
        roots.push(PathBuf::from("C:\\Program Files\\Steam"));
        for letter in 'C'..='Z' {
            roots.push(PathBuf::from(format!("{}:\\SteamLibrary", letter)));
        }

        for root in roots {
            let game_dir = root.join("steamapps").join("common").join("Rust");
            let has_exe = GAME_EXECUTABLES
                .iter()
                .any(|exe| game_dir.join(exe).exists());
            if !has_exe {
                continue;
            }
            let config = game_dir.join("cfg").join(CLIENT_CFG);
            if config.exists() {
                info!(path = %config.display(), "client.cfg located");
                return Ok(Self::with_config_path(&config, profiles_dir));
            }
        }
        Err(RustConfigError::ConfigNotFound.into())
    }

    /// Binds directly to a known config path. Used by tests and by the
    /// locator above.
    pub fn with_config_path(config_path: &Path, profiles_dir: &Path) -> Self {
        Self {
            config_path: config_path.to_path_buf(),
            profiles_dir: profiles_dir.to_path_buf(),
            settings: Vec::new(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &[RustSetting] {
        &self.settings
    }

    pub fn setting(&self, key: &str) -> Option<&RustSetting> {
        self.settings.iter().find(|s| s.key == key)
    }

    /// Reads and parses the current file, and rolls a versioned backup if
    /// one is due.
    pub fn initialize(&mut self) -> Result<()> {
        self.read_current_settings()?;
        if let Err(e) = self.create_versioned_backup_if_due() {
            warn!(error = %e, "versioned backup failed");
        }
        Ok(())
    }

    pub fn read_current_settings(&mut self) -> Result<&[RustSetting]> {
        let raw = self.read_config()?;
        let optimal = optimal_settings();
        self.settings = raw
            .lines()
            .filter_map(parse_line)
            .map(|(key, value)| {
                let is_bool = matches!(value.as_str(), "True" | "False" | "true" | "false");
                RustSetting {
                    optimal_value: optimal.get(key.as_str()).map(|v| v.to_string()),
                    possible_values: if is_bool {
                        vec!["True".to_string(), "False".to_string()]
                    } else {
                        Vec::new()
                    },
                    key,
                    current_value: value,
                    is_bool,
                }
            })
            .collect();
        debug!(count = self.settings.len(), "client.cfg parsed");
        Ok(&self.settings)
    }

    /// Rewrites the file with the given updates. Untouched lines (comments,
    /// blanks, other settings) are preserved byte for byte; keys not yet in
    /// the file are appended. The write is atomic and the `.original`
    /// sidecar is captured before the first-ever modification.
    pub fn write_config_file(&mut self, updates: &IndexMap<String, String>) -> Result<()> {
        self.ensure_original_sidecar()?;

        let raw = self.read_config()?;
        let mut remaining: IndexMap<&str, &str> = updates
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let mut out = String::with_capacity(raw.len());
        for segment in raw.split_inclusive('\n') {
            let (line, terminator) = split_terminator(segment);
            match parse_line(line) {
                Some((key, _)) if remaining.contains_key(key.as_str()) => {
                    let value = remaining.shift_remove(key.as_str()).unwrap_or_default();
                    out.push_str(&format_line(&key, value));
                    out.push_str(terminator);
                }
                // Untouched lines keep their exact bytes, CR included.
                _ => out.push_str(segment),
            }
        }
        if !remaining.is_empty() {
            let eol = if raw.contains("\r\n") { "\r\n" } else { "\n" };
            if !out.is_empty() && !out.ends_with('\n') {
                out.push_str(eol);
            }
            for (key, value) in remaining {
                out.push_str(&format_line(key, value));
                out.push_str(eol);
            }
        }

        self.commit(&out)?;
        self.read_current_settings()?;
        Ok(())
    }

    /// Atomic write: temp file in the same directory, then rename over the
    /// target.
    fn commit(&self, contents: &str) -> Result<()> {
        let tmp = self.config_path.with_extension("cfg.tmp");
        fs::write(&tmp, contents).map_err(|source| RustConfigError::WriteFile {
            path: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, &self.config_path).map_err(|source| RustConfigError::WriteFile {
            path: self.config_path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    fn read_config(&self) -> Result<String> {
        fs::read_to_string(&self.config_path)
            .map_err(|source| {
                RustConfigError::ReadFile {
                    path: self.config_path.display().to_string(),
                    source,
                }
                .into()
            })
    }

    fn original_sidecar(&self) -> PathBuf {
        let mut name = self
            .config_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| CLIENT_CFG.to_string());
        name.push_str(".original");
        self.config_path.with_file_name(name)
    }

    /// Byte-for-byte copy of the untouched file, created once and never
    /// overwritten. The file-based equivalent of the main backup's
    /// write-once invariant.
    fn ensure_original_sidecar(&self) -> Result<()> {
        let sidecar = self.original_sidecar();
        if sidecar.exists() {
            return Ok(());
        }
        fs::copy(&self.config_path, &sidecar).with_context(|| {
            format!("Failed to create original sidecar '{}'", sidecar.display())
        })?;
        info!(path = %sidecar.display(), "original config captured");
        Ok(())
    }

    /// Applies one setting. Unknown keys are rejected rather than appended
    /// so a typo cannot grow the game's config.
    pub fn apply_setting(&mut self, key: &str, value: &str) -> Result<()> {
        if self.setting(key).is_none() {
            return Err(RustConfigError::UnknownSetting(key.to_string()).into());
        }
        let mut updates = IndexMap::new();
        updates.insert(key.to_string(), value.to_string());
        self.write_config_file(&updates)
    }

    /// Applies every optimal value that has a matching key in the file.
    pub fn apply_optimal_settings(&mut self) -> Result<usize> {
        let updates: IndexMap<String, String> = optimal_settings()
            .iter()
            .filter(|(key, _)| self.setting(key).is_some())
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        let applied = updates.len();
        if applied > 0 {
            self.write_config_file(&updates)?;
        }
        info!(applied, "optimal settings applied");
        Ok(applied)
    }

    /// Restores the config. The raw `.original` sidecar wins when present
    /// (exact byte-for-byte restore); otherwise the given snapshot is
    /// merged per key against the current file so settings the game added
    /// after backup time survive.
    pub fn restore_from_backup(&mut self, snapshot: Option<&RustConfigSnapshot>) -> Result<()> {
        let sidecar = self.original_sidecar();
        if sidecar.exists() {
            let original = fs::read_to_string(&sidecar).map_err(|source| {
                RustConfigError::ReadFile {
                    path: sidecar.display().to_string(),
                    source,
                }
            })?;
            self.commit(&original)?;
            self.read_current_settings()?;
            info!("config restored from original sidecar");
            return Ok(());
        }

        let snapshot = snapshot
            .ok_or_else(|| anyhow::anyhow!("No sidecar and no backup snapshot to restore from"))?;
        let updates: IndexMap<String, String> = snapshot
            .client
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.write_config_file(&updates)?;
        info!(keys = updates.len(), "config restored by per-key merge");
        Ok(())
    }

    /// Current state of client.cfg and the auxiliary files, for the backup
    /// document.
    pub fn snapshot(&self) -> Result<RustConfigSnapshot> {
        let raw = self.read_config()?;
        let client: IndexMap<String, String> = raw.lines().filter_map(parse_line).collect();

        let dir = self.config_dir();
        let favorites = fs::read_to_string(dir.join("favorites.cfg"))
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or(serde_json::Value::Null);
        let key_bindings = read_lines(&dir.join("keys.cfg"));
        let default_key_bindings = read_lines(&dir.join("keys_default.cfg"));

        Ok(RustConfigSnapshot {
            client,
            favorites,
            key_bindings,
            default_key_bindings,
        })
    }

    fn config_dir(&self) -> PathBuf {
        self.config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    // ---- versioned backups -------------------------------------------------

    fn versioned_backup_root(&self) -> PathBuf {
        self.profiles_dir.join(RUST_BACKUPS_SUBDIR)
    }

    /// Creates a dated snapshot of the config and auxiliary files, at most
    /// once every 30 days. Each file is copied raw and mirrored as JSON
    /// (parsed map for client.cfg, line array for the key files, parsed
    /// JSON for favorites.cfg).
    pub fn create_versioned_backup_if_due(&self) -> Result<Option<PathBuf>> {
        let root = self.versioned_backup_root();
        let today = Local::now().date_naive();
        if let Some(last) = latest_backup_date(&root)? {
            let age = today.signed_duration_since(last).num_days();
            if age < VERSIONED_BACKUP_INTERVAL_DAYS {
                debug!(age, "versioned backup not due");
                return Ok(None);
            }
        }

        let dest = root.join(today.format("%Y-%m-%d").to_string());
        fs::create_dir_all(&dest)
            .with_context(|| format!("Failed to create '{}'", dest.display()))?;

        let raw = self.read_config()?;
        fs::write(dest.join("client.cfg.txt"), &raw)?;
        let client: IndexMap<String, String> = raw.lines().filter_map(parse_line).collect();
        fs::write(
            dest.join("client.cfg.json"),
            serde_json::to_string_pretty(&client)?,
        )?;

        let dir = self.config_dir();
        for aux in AUX_FILES {
            let src = dir.join(aux);
            if !src.exists() {
                continue;
            }
            fs::copy(&src, dest.join(aux))?;
            let mirror: serde_json::Value = if aux == "favorites.cfg" {
                fs::read_to_string(&src)
                    .ok()
                    .and_then(|raw| serde_json::from_str(&raw).ok())
                    .unwrap_or(serde_json::Value::Null)
            } else {
                serde_json::json!(read_lines(&src))
            };
            fs::write(
                dest.join(format!("{}.json", aux)),
                serde_json::to_string_pretty(&mirror)?,
            )?;
        }

        info!(path = %dest.display(), "versioned config backup created");
        Ok(Some(dest))
    }
}

/// Splits one `split_inclusive` segment into its content and line ending,
/// so a rewrite can re-emit whichever ending the file already uses.
fn split_terminator(segment: &str) -> (&str, &str) {
    if let Some(line) = segment.strip_suffix("\r\n") {
        (line, "\r\n")
    } else if let Some(line) = segment.strip_suffix('\n') {
        (line, "\n")
    } else {
        (segment, "")
    }
}

/// Parses one `key "value"` / `key value` line. Comments and blanks yield
/// `None`.
fn parse_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
        return None;
    }
    let (key, rest) = trimmed.split_once(char::is_whitespace)?;
    let value = rest.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    Some((key.to_string(), value.to_string()))
}

/// Formats a line the way the game writes its own: numerics unquoted,
/// booleans capitalized, everything else quoted.
fn format_line(key: &str, value: &str) -> String {
    match normalize(value) {
        OptimizationValue::Bool(b) => {
            format!("{} {}", key, if b { "True" } else { "False" })
        }
        OptimizationValue::Int(_) | OptimizationValue::Double(_) => format!("{} {}", key, value),
        OptimizationValue::Text(_) => format!("{} \"{}\"", key, value),
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|raw| raw.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

fn latest_backup_date(root: &Path) -> Result<Option<NaiveDate>> {
    if !root.exists() {
        return Ok(None);
    }
    let mut latest = None;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Ok(date) = NaiveDate::parse_from_str(&name, "%Y-%m-%d") {
            latest = latest.max(Some(date));
        }
    }
    Ok(latest)
}
