// src/registry/export.rs
//
// Whole-registry `.reg` export/import. regedit owns the .reg format, so
// rather than reimplement its writer we shell out to it through a generated
// PowerShell script and validate what it produced.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    constants::{MAX_REG_BACKUP_FILES, MIN_REG_EXPORT_SIZE, REG_EXPORT_HEADER, TOOL_TIMEOUT_SECS},
    system::ToolRunner,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryBackupStatus {
    Success,
    FileNotFound,
    InvalidFormat,
    AccessDenied,
    CorruptedBackup,
    InsufficientSpace,
    UnknownError,
}

/// Outcome of one export/import/validation operation.
#[derive(Debug)]
pub struct RegistryBackupResult {
    pub status: RegistryBackupStatus,
    pub message: String,
    pub path: Option<PathBuf>,
    pub size_bytes: u64,
}

impl RegistryBackupResult {
    pub fn ok(&self) -> bool {
        self.status == RegistryBackupStatus::Success
    }

    fn failure(status: RegistryBackupStatus, message: String, path: &Path) -> Self {
        Self {
            status,
            message,
            path: Some(path.to_path_buf()),
            size_bytes: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryBackupInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

pub struct RegistryExportUtility {
    runner: Arc<dyn ToolRunner>,
    max_backup_files: usize,
}

impl RegistryExportUtility {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            runner,
            max_backup_files: MAX_REG_BACKUP_FILES,
        }
    }

    /// Exports the entire registry to `dest`. Blocks (polling) for up to the
    /// tool timeout ceiling, then validates the produced file.
    pub fn export_full(&self, dest: &Path) -> RegistryBackupResult {
        if let Some(parent) = dest.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return RegistryBackupResult::failure(
                    RegistryBackupStatus::UnknownError,
                    format!("Failed to create export directory: {}", e),
                    dest,
                );
            }
        }

        info!(path = %dest.display(), "starting full registry export");
        let script = format!(
            "Start-Process -FilePath 'regedit.exe' -ArgumentList '/e', '\"{}\"' -Wait",
            dest.display()
        );
        match self.run_script(&script, dest) {
            Ok(()) => self.validate_export(dest),
            Err(e) => {
                warn!(error = %e, "registry export failed");
                RegistryBackupResult::failure(
                    RegistryBackupStatus::UnknownError,
                    format!("Export failed: {}", e),
                    dest,
                )
            }
        }
    }

    /// Exports a single hive (`HKCU`, `HKLM`, ...) to `dest`.
    pub fn export_hive(&self, hive: &str, dest: &Path) -> RegistryBackupResult {
        let script = format!(
            "Start-Process -FilePath 'regedit.exe' -ArgumentList '/e', '\"{}\"', '{}' -Wait",
            dest.display(),
            hive
        );
        match self.run_script(&script, dest) {
            Ok(()) => self.validate_export(dest),
            Err(e) => RegistryBackupResult::failure(
                RegistryBackupStatus::UnknownError,
                format!("Hive export failed: {}", e),
                dest,
            ),
        }
    }

    /// Silently imports a previously exported `.reg` file. The source is
    /// validated first so a truncated backup is never half-imported.
    pub fn import(&self, src: &Path) -> RegistryBackupResult {
        let validation = self.validate_export(src);
        if !validation.ok() {
            return validation;
        }
        let script = format!(
            "Start-Process -FilePath 'regedit.exe' -ArgumentList '/s', '\"{}\"' -Wait",
            src.display()
        );
        match self.run_script(&script, src) {
            Ok(()) => RegistryBackupResult {
                status: RegistryBackupStatus::Success,
                message: "Registry import completed".to_string(),
                path: Some(src.to_path_buf()),
                size_bytes: validation.size_bytes,
            },
            Err(e) => RegistryBackupResult::failure(
                RegistryBackupStatus::UnknownError,
                format!("Import failed: {}", e),
                src,
            ),
        }
    }

    fn run_script(&self, script: &str, produced: &Path) -> Result<()> {
        // regedit elevates itself oddly when launched directly from a
        // service context, so the invocation goes through a temporary
        // PowerShell script, matching how an operator would run it.
        let script_path = std::env::temp_dir().join(format!(
            "checkmark_regexport_{}_{}.ps1",
            std::process::id(),
            Utc::now().timestamp_millis()
        ));
        fs::write(&script_path, script)?;

        let result = self.runner.run_producing(
            "powershell",
            &[
                "-NoProfile",
                "-ExecutionPolicy",
                "Bypass",
                "-File",
                &script_path.to_string_lossy(),
            ],
            produced,
            Duration::from_secs(TOOL_TIMEOUT_SECS),
        );
        let _ = fs::remove_file(&script_path);
        let output = result?;
        if !output.success() {
            anyhow::bail!(
                "powershell exited with {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(())
    }

    /// Checks that `path` looks like a real regedit export: it exists, is at
    /// least the minimum plausible size, and starts with the literal
    /// registry-file header.
    pub fn validate_export(&self, path: &Path) -> RegistryBackupResult {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(_) => {
                return RegistryBackupResult::failure(
                    RegistryBackupStatus::FileNotFound,
                    format!("Export file '{}' does not exist", path.display()),
                    path,
                )
            }
        };
        let size = metadata.len();
        if size < MIN_REG_EXPORT_SIZE {
            return RegistryBackupResult::failure(
                RegistryBackupStatus::CorruptedBackup,
                format!(
                    "Export file is only {} bytes (minimum {})",
                    size, MIN_REG_EXPORT_SIZE
                ),
                path,
            );
        }

        let first_line = match fs::read_to_string(path) {
            Ok(contents) => contents.lines().next().unwrap_or("").to_string(),
            Err(e) => {
                return RegistryBackupResult::failure(
                    RegistryBackupStatus::AccessDenied,
                    format!("Cannot read export file: {}", e),
                    path,
                )
            }
        };
        if !first_line.contains(REG_EXPORT_HEADER) {
            return RegistryBackupResult::failure(
                RegistryBackupStatus::InvalidFormat,
                format!("First line '{}' is not a registry export header", first_line),
                path,
            );
        }

        RegistryBackupResult {
            status: RegistryBackupStatus::Success,
            message: "Export validated".to_string(),
            path: Some(path.to_path_buf()),
            size_bytes: size,
        }
    }

    /// Enumerates `.reg` files in `dir`, newest first.
    pub fn list_backups(&self, dir: &Path) -> Result<Vec<RegistryBackupInfo>> {
        let mut backups = Vec::new();
        if !dir.exists() {
            return Ok(backups);
        }
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("reg") {
                continue;
            }
            let metadata = entry.metadata()?;
            backups.push(RegistryBackupInfo {
                size_bytes: metadata.len(),
                modified: metadata.modified().map(DateTime::<Utc>::from)?,
                path,
            });
        }
        backups.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(backups)
    }

    /// Deletes all but the newest `max_backup_files` exports. Returns how
    /// many files were removed.
    pub fn cleanup_old_backups(&self, dir: &Path) -> Result<usize> {
        let backups = self.list_backups(dir)?;
        let mut removed = 0;
        for stale in backups.iter().skip(self.max_backup_files) {
            match fs::remove_file(&stale.path) {
                Ok(()) => {
                    debug!(path = %stale.path.display(), "removed rotated registry export");
                    removed += 1;
                }
                Err(e) => warn!(path = %stale.path.display(), error = %e, "failed to remove old export"),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::memory::ScriptedToolRunner;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "checkmark_export_{}_{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn valid_export_body() -> String {
        let mut body = String::from("Windows Registry Editor Version 5.00\r\n\r\n");
        for i in 0..40 {
            body.push_str(&format!(
                "[HKEY_CURRENT_USER\\Software\\Checkmark\\Key{}]\r\n\"Value\"=dword:0000000{}\r\n",
                i,
                i % 10
            ));
        }
        body
    }

    #[test]
    fn export_produces_and_validates_file() {
        let dir = scratch_dir("produce");
        let runner = Arc::new(ScriptedToolRunner::new(&valid_export_body()));
        let utility = RegistryExportUtility::new(runner.clone());

        let result = utility.export_full(&dir.join("full_registry_export.reg"));
        assert!(result.ok(), "unexpected: {:?}", result);
        assert!(result.size_bytes >= MIN_REG_EXPORT_SIZE);
        assert!(runner.invocations()[0].starts_with("powershell"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn validation_rejects_missing_small_and_headerless_files() {
        let dir = scratch_dir("validate");
        let utility = RegistryExportUtility::new(Arc::new(ScriptedToolRunner::new("")));

        let missing = utility.validate_export(&dir.join("nope.reg"));
        assert_eq!(missing.status, RegistryBackupStatus::FileNotFound);

        let small = dir.join("small.reg");
        fs::write(&small, "Windows Registry Editor Version 5.00\r\n").unwrap();
        assert_eq!(
            utility.validate_export(&small).status,
            RegistryBackupStatus::CorruptedBackup
        );

        let headerless = dir.join("headerless.reg");
        fs::write(&headerless, "x".repeat(2000)).unwrap();
        assert_eq!(
            utility.validate_export(&headerless).status,
            RegistryBackupStatus::InvalidFormat
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn cleanup_keeps_only_most_recent_exports() {
        let dir = scratch_dir("cleanup");
        let utility = RegistryExportUtility::new(Arc::new(ScriptedToolRunner::new("")));

        for i in 0..(MAX_REG_BACKUP_FILES + 3) {
            let path = dir.join(format!("backup_{}.reg", i));
            fs::write(&path, "data").unwrap();
            // Distinct mtimes so rotation order is deterministic.
            std::thread::sleep(std::time::Duration::from_millis(20));
        }

        let removed = utility.cleanup_old_backups(&dir).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(utility.list_backups(&dir).unwrap().len(), MAX_REG_BACKUP_FILES);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn import_refuses_invalid_backup() {
        let dir = scratch_dir("import");
        let utility = RegistryExportUtility::new(Arc::new(ScriptedToolRunner::new("")));
        let bad = dir.join("bad.reg");
        fs::write(&bad, "not a registry file").unwrap();
        let result = utility.import(&bad);
        assert_ne!(result.status, RegistryBackupStatus::Success);
        let _ = fs::remove_dir_all(&dir);
    }
}
