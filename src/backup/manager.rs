// src/backup/manager.rs
//
// Single source of truth for "has this class of setting ever been backed
// up, and is the backup trustworthy". Main backups are write-once per id;
// session backups are refreshed every run and archived once stale.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

use super::{
    store::{self, DocMeta, DomainDocument, SettingEntry},
    BackupKind, BackupPaths, BackupStatus, BackupSummary, BackupType, DomainSnapshot,
    SettingKey, SnapshotSource,
};
use crate::{
    constants::{NON_EXISTENT_SENTINEL, SESSION_BACKUP_MAX_AGE_HOURS},
    errors::BackupError,
    registry::export::RegistryExportUtility,
    value::{normalize, OptimizationValue},
};

pub struct BackupManager {
    paths: BackupPaths,
    exporter: RegistryExportUtility,
    /// Re-entrancy guard: creating a backup for a domain can trigger reads
    /// that would otherwise recurse into another create for the same domain.
    in_progress: HashSet<BackupType>,
}

impl BackupManager {
    pub fn new(paths: BackupPaths, exporter: RegistryExportUtility) -> Self {
        Self {
            paths,
            exporter,
            in_progress: HashSet::new(),
        }
    }

    pub fn paths(&self) -> &BackupPaths {
        &self.paths
    }

    // ---- status ------------------------------------------------------------

    pub fn check_backup_status(
        &self,
        ty: BackupType,
        kind: BackupKind,
        source: &dyn SnapshotSource,
    ) -> BackupStatus {
        if ty == BackupType::FullRegistryExport {
            return self.check_full_export_status();
        }

        let path = self.paths.file(ty, kind);
        if !path.exists() {
            return BackupStatus::NoBackupExists;
        }

        let doc = match store::load_document(ty, &path) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(?ty, ?kind, error = %e, "backup file unreadable");
                return BackupStatus::BackupError;
            }
        };

        // Staleness gates completeness for session backups: an 8-hour-old
        // snapshot of current values is not trustworthy for revert.
        if kind == BackupKind::Session {
            match session_age(&doc) {
                Some(age) if age > Duration::hours(SESSION_BACKUP_MAX_AGE_HOURS) => {
                    return BackupStatus::OutdatedSessionBackup;
                }
                Some(_) => {}
                None => return BackupStatus::BackupError,
            }
        }

        match &doc {
            DomainDocument::Settings { entries, .. } => {
                if entries.is_empty() {
                    return BackupStatus::PartialBackup;
                }
                let recorded: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
                let missing = source
                    .known_ids(ty)
                    .into_iter()
                    .any(|id| !recorded.contains(id.as_str()));
                if missing {
                    BackupStatus::PartialBackup
                } else {
                    BackupStatus::CompleteBackup
                }
            }
            DomainDocument::PowerPlan { guid, .. } => {
                if guid.is_empty() {
                    BackupStatus::PartialBackup
                } else {
                    BackupStatus::CompleteBackup
                }
            }
            DomainDocument::VisualEffects { .. } => BackupStatus::CompleteBackup,
            DomainDocument::RustConfig { snapshot, .. } => {
                if snapshot.client.is_empty() {
                    BackupStatus::PartialBackup
                } else {
                    BackupStatus::CompleteBackup
                }
            }
        }
    }

    fn check_full_export_status(&self) -> BackupStatus {
        let path = self.paths.file(BackupType::FullRegistryExport, BackupKind::Main);
        if !path.exists() {
            return BackupStatus::NoBackupExists;
        }
        let result = self.exporter.validate_export(&path);
        if result.ok() {
            BackupStatus::CompleteBackup
        } else {
            BackupStatus::PartialBackup
        }
    }

    // ---- creation ----------------------------------------------------------

    /// Creates (or refreshes, or additively merges) the backup for one
    /// domain. Idempotent; guarded against re-entrant self-invocation.
    pub fn create_backup(
        &mut self,
        ty: BackupType,
        kind: BackupKind,
        source: &dyn SnapshotSource,
    ) -> Result<()> {
        if !self.in_progress.insert(ty) {
            return Err(BackupError::InProgress(ty).into());
        }
        let result = self.create_backup_inner(ty, kind, source);
        self.in_progress.remove(&ty);
        result
    }

    fn create_backup_inner(
        &mut self,
        ty: BackupType,
        kind: BackupKind,
        source: &dyn SnapshotSource,
    ) -> Result<()> {
        let status = self.check_backup_status(ty, kind, source);

        if ty == BackupType::FullRegistryExport {
            // Created at most once, ever. A valid export is never
            // regenerated regardless of the main/session flag.
            if status == BackupStatus::CompleteBackup {
                debug!("full registry export already present, skipping");
                return Ok(());
            }
            let dest = self.paths.file(ty, kind);
            let result = self.exporter.export_full(&dest);
            if !result.ok() {
                anyhow::bail!("Full registry export failed: {}", result.message);
            }
            info!(path = %dest.display(), size = result.size_bytes, "full registry export created");
            return Ok(());
        }

        match (kind, status) {
            (BackupKind::Main, BackupStatus::CompleteBackup) => {
                // Force-create path: a complete main backup still gets a
                // merge pass so ids that appeared since the first run are
                // recorded. Existing entries are never touched.
                self.merge_new_ids(ty, source)
            }
            (BackupKind::Session, BackupStatus::CompleteBackup) => {
                debug!(?ty, "session backup current, skipping");
                Ok(())
            }
            (BackupKind::Session, BackupStatus::OutdatedSessionBackup) => {
                self.archive_file(&self.paths.file(ty, kind));
                self.write_fresh(ty, kind, source)
            }
            _ => self.write_fresh(ty, kind, source),
        }
    }

    fn write_fresh(
        &mut self,
        ty: BackupType,
        kind: BackupKind,
        source: &dyn SnapshotSource,
    ) -> Result<()> {
        let snapshot = source
            .snapshot(ty)
            .with_context(|| format!("Failed to snapshot {:?}", ty))?;
        let doc = match snapshot {
            DomainSnapshot::Settings(settings) => DomainDocument::Settings {
                meta: DocMeta::now(),
                entries: settings.into_iter().map(entry_from_snapshot).collect(),
            },
            DomainSnapshot::PowerPlan(plan) => DomainDocument::PowerPlan {
                meta: DocMeta::now(),
                guid: plan.guid,
                name: plan.name,
            },
            DomainSnapshot::VisualEffects {
                profile,
                profile_name,
            } => DomainDocument::VisualEffects {
                meta: DocMeta::now(),
                profile,
                profile_name,
            },
            DomainSnapshot::RustConfig(snapshot) => DomainDocument::RustConfig {
                meta: DocMeta::now(),
                snapshot,
            },
            DomainSnapshot::Unavailable => {
                debug!(?ty, "domain unavailable on this machine, nothing to back up");
                return Ok(());
            }
        };
        let path = self.paths.file(ty, kind);
        store::save_document(ty, &path, &doc)?;
        info!(?ty, ?kind, path = %path.display(), "backup written");
        Ok(())
    }

    /// Appends snapshot entries whose ids are not yet recorded. Never
    /// rewrites an existing entry: the main backup is the permanent record
    /// of first-observed values.
    fn merge_new_ids(&mut self, ty: BackupType, source: &dyn SnapshotSource) -> Result<()> {
        let path = self.paths.file(ty, BackupKind::Main);
        let mut doc = store::load_document(ty, &path)?;
        let entries = match doc.entries_mut() {
            Some(entries) => entries,
            // Only the settings-list domains have per-id records to merge.
            None => return Ok(()),
        };
        let recorded: HashSet<String> = entries.iter().map(|e| e.id.clone()).collect();

        let snapshot = source.snapshot(ty)?;
        let mut added = 0usize;
        if let DomainSnapshot::Settings(settings) = snapshot {
            for setting in settings {
                if !recorded.contains(&setting.id) {
                    entries.push(entry_from_snapshot(setting));
                    added += 1;
                }
            }
        }
        if added > 0 {
            doc.meta_mut().touch();
            store::save_document(ty, &path, &doc)?;
            info!(?ty, added, "new setting ids merged into main backup");
        }
        Ok(())
    }

    /// Moves a stale file into `archive/` with a timestamp suffix; if the
    /// rename fails the file is deleted so the fresh write can proceed.
    fn archive_file(&self, path: &Path) {
        if !path.exists() {
            return;
        }
        let archive_dir = self.paths.archive_dir();
        if let Err(e) = fs::create_dir_all(&archive_dir) {
            warn!(error = %e, "cannot create archive directory, deleting stale backup");
            let _ = fs::remove_file(path);
            return;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "backup".to_string());
        let archived = archive_dir.join(format!(
            "{}_{}",
            Utc::now().format("%Y%m%dT%H%M%S"),
            file_name
        ));
        match fs::rename(path, &archived) {
            Ok(()) => info!(from = %path.display(), to = %archived.display(), "stale session backup archived"),
            Err(e) => {
                warn!(error = %e, "archive rename failed, deleting stale backup");
                let _ = fs::remove_file(path);
            }
        }
    }

    /// Runs the full decision table across every domain and both kinds.
    pub fn create_all_backups_if_needed(&mut self, source: &dyn SnapshotSource) -> BackupSummary {
        let mut summary = BackupSummary::default();
        for ty in BackupType::iter() {
            let kinds: &[BackupKind] = if ty == BackupType::FullRegistryExport {
                &[BackupKind::Main]
            } else {
                &[BackupKind::Main, BackupKind::Session]
            };
            if ty != BackupType::FullRegistryExport {
                // Domains with nothing to back up on this machine are
                // reported as skipped, not endlessly "created".
                if let Ok(DomainSnapshot::Unavailable) = source.snapshot(ty) {
                    summary.skipped.push(ty);
                    continue;
                }
            }
            let mut refreshed = false;
            let mut failed = false;
            for &kind in kinds {
                let before = self.check_backup_status(ty, kind, source);
                match self.create_backup(ty, kind, source) {
                    Ok(()) => {
                        if before != BackupStatus::CompleteBackup {
                            refreshed = true;
                        }
                    }
                    Err(e) => {
                        warn!(?ty, ?kind, error = %e, "backup creation failed");
                        summary.failed.push((ty, e.to_string()));
                        failed = true;
                    }
                }
            }
            // One entry per domain, not per kind.
            if !failed {
                if refreshed {
                    summary.created.push(ty);
                } else {
                    summary.skipped.push(ty);
                }
            }
        }
        summary
    }

    // ---- restore -----------------------------------------------------------

    /// Restore is only supported for the Rust game config in this subsystem;
    /// everything else reverts per-setting through the optimization manager.
    pub fn load_restorable_document(
        &self,
        ty: BackupType,
        kind: BackupKind,
        source: &dyn SnapshotSource,
    ) -> Result<DomainDocument> {
        if ty != BackupType::RustConfig {
            return Err(BackupError::RestoreNotImplemented(ty).into());
        }
        if self.check_backup_status(ty, kind, source) != BackupStatus::CompleteBackup {
            return Err(BackupError::Incomplete(ty).into());
        }
        Ok(store::load_document(ty, &self.paths.file(ty, kind))?)
    }

    // ---- per-id lookups ----------------------------------------------------

    /// Returns the recorded first-observed value for a setting, from the
    /// main backup of its domain. String payloads are normalized back into
    /// bool/int/double where they parse as such.
    pub fn original_value(&self, key: &SettingKey) -> Option<OptimizationValue> {
        let path = self.paths.file(key.domain, BackupKind::Main);
        if !path.exists() {
            return None;
        }
        let doc = store::load_document(key.domain, &path).ok()?;
        match doc {
            DomainDocument::Settings { entries, .. } => entries
                .iter()
                .find(|e| e.id == key.local)
                .and_then(|e| OptimizationValue::from_json(&e.current_value)),
            DomainDocument::PowerPlan { guid, .. } => Some(OptimizationValue::Text(guid)),
            DomainDocument::VisualEffects { profile, .. } => {
                Some(OptimizationValue::Int(i64::from(profile)))
            }
            DomainDocument::RustConfig { snapshot, .. } => {
                snapshot.client.get(&key.local).map(|raw| normalize(raw))
            }
        }
    }

    /// Additively inserts a setting id that is missing from the main backup.
    /// An existing entry for the same id is never overwritten.
    pub fn add_missing_setting_to_main_backup(
        &mut self,
        key: &SettingKey,
        name: &str,
        value: &OptimizationValue,
    ) -> Result<()> {
        self.append_main_entry(key, name, value.to_json())
    }

    /// Records the NON_EXISTENT sentinel for a setting whose backing
    /// registry value did not exist when first observed, so a later restore
    /// deletes the value instead of inventing an original.
    pub fn record_non_existent_setting(&mut self, key: &SettingKey, name: &str) -> Result<()> {
        self.append_main_entry(
            key,
            name,
            serde_json::Value::String(NON_EXISTENT_SENTINEL.to_string()),
        )
    }

    /// True when the main backup records this setting as having not existed.
    pub fn is_recorded_non_existent(&self, key: &SettingKey) -> bool {
        let path = self.paths.file(key.domain, BackupKind::Main);
        if !path.exists() {
            return false;
        }
        match store::load_document(key.domain, &path) {
            Ok(DomainDocument::Settings { entries, .. }) => entries
                .iter()
                .find(|e| e.id == key.local)
                .map(|e| e.current_value == serde_json::json!(NON_EXISTENT_SENTINEL))
                .unwrap_or(false),
            _ => false,
        }
    }

    fn append_main_entry(
        &mut self,
        key: &SettingKey,
        name: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let path = self.paths.file(key.domain, BackupKind::Main);
        let mut doc = if path.exists() {
            store::load_document(key.domain, &path)?
        } else {
            DomainDocument::Settings {
                meta: DocMeta::now(),
                entries: Vec::new(),
            }
        };
        let entries = doc
            .entries_mut()
            .ok_or_else(|| anyhow::anyhow!("Domain {:?} has no per-id entries", key.domain))?;
        if entries.iter().any(|e| e.id == key.local) {
            debug!(id = %key.local, "main backup already records this id, leaving untouched");
            return Ok(());
        }
        entries.push(SettingEntry {
            id: key.local.clone(),
            name: name.to_string(),
            current_value: value,
            registry_key: None,
            registry_value_name: None,
        });
        doc.meta_mut().touch();
        store::save_document(key.domain, &path, &doc)?;
        Ok(())
    }

    // ---- sidecar files -----------------------------------------------------

    /// Records a value whose type did not match what the setting expects.
    /// Kept so nothing observed on the machine is ever silently discarded.
    pub fn record_unknown_value(&self, setting_id: &str, type_label: &str, value: &str) -> Result<()> {
        let path = self.paths.unknown_values();
        let mut doc: BTreeMap<String, Vec<serde_json::Value>> = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            BTreeMap::new()
        };
        doc.entry(setting_id.to_string())
            .or_default()
            .push(serde_json::json!({ "type": type_label, "value": value }));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
        Ok(())
    }

    pub fn load_user_preferences(&self) -> HashMap<String, bool> {
        let path = self.paths.user_preferences();
        if !path.exists() {
            return HashMap::new();
        }
        fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn save_user_preferences(&self, prefs: &HashMap<String, bool>) -> Result<()> {
        let path = self.paths.user_preferences();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(prefs)?)?;
        Ok(())
    }
}

fn entry_from_snapshot(setting: super::SettingSnapshot) -> SettingEntry {
    SettingEntry {
        id: setting.id,
        name: setting.name,
        current_value: setting.value.to_json(),
        registry_key: setting.registry_key,
        registry_value_name: setting.registry_value_name,
    }
}

fn session_age(doc: &DomainDocument) -> Option<Duration> {
    let ts = DateTime::parse_from_rfc3339(&doc.meta().timestamp).ok()?;
    Some(Utc::now().signed_duration_since(ts.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, path::PathBuf, sync::Arc};

    use super::*;
    use crate::{
        backup::SettingSnapshot,
        system::{memory::ScriptedToolRunner, PowerPlan},
    };

    /// Source with a mutable set of registry settings and a fixed power plan.
    struct StubSource {
        registry: RefCell<Vec<(String, OptimizationValue)>>,
    }

    impl StubSource {
        fn new(settings: &[(&str, i64)]) -> Self {
            Self {
                registry: RefCell::new(
                    settings
                        .iter()
                        .map(|(id, v)| (id.to_string(), OptimizationValue::Int(*v)))
                        .collect(),
                ),
            }
        }

        fn set(&self, id: &str, value: i64) {
            let mut settings = self.registry.borrow_mut();
            if let Some(slot) = settings.iter_mut().find(|(sid, _)| sid == id) {
                slot.1 = OptimizationValue::Int(value);
            } else {
                settings.push((id.to_string(), OptimizationValue::Int(value)));
            }
        }
    }

    impl SnapshotSource for StubSource {
        fn known_ids(&self, domain: BackupType) -> Vec<String> {
            match domain {
                BackupType::Registry => self
                    .registry
                    .borrow()
                    .iter()
                    .map(|(id, _)| id.clone())
                    .collect(),
                _ => Vec::new(),
            }
        }

        fn snapshot(&self, domain: BackupType) -> Result<DomainSnapshot> {
            Ok(match domain {
                BackupType::Registry => DomainSnapshot::Settings(
                    self.registry
                        .borrow()
                        .iter()
                        .map(|(id, value)| SettingSnapshot {
                            id: id.clone(),
                            name: id.clone(),
                            value: value.clone(),
                            registry_key: None,
                            registry_value_name: None,
                        })
                        .collect(),
                ),
                BackupType::PowerPlan => DomainSnapshot::PowerPlan(PowerPlan {
                    guid: "381b4222-f694-41f0-9685-ff5bb260df2e".into(),
                    name: "Balanced".into(),
                }),
                BackupType::VisualEffects => DomainSnapshot::VisualEffects {
                    profile: 3,
                    profile_name: "Custom".into(),
                },
                _ => DomainSnapshot::Unavailable,
            })
        }
    }

    fn manager(tag: &str) -> (PathBuf, BackupManager) {
        let base = std::env::temp_dir().join(format!(
            "checkmark_bkmgr_{}_{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        let exporter = RegistryExportUtility::new(Arc::new(ScriptedToolRunner::new(
            &valid_export_body(),
        )));
        (base.clone(), BackupManager::new(BackupPaths::new(&base), exporter))
    }

    fn valid_export_body() -> String {
        let mut body = String::from("Windows Registry Editor Version 5.00\r\n\r\n");
        while body.len() < 1200 {
            body.push_str("[HKEY_CURRENT_USER\\Software\\Checkmark]\r\n\"V\"=dword:00000001\r\n");
        }
        body
    }

    fn registry_key(id: &str) -> SettingKey {
        SettingKey::new(BackupType::Registry, id)
    }

    #[test]
    fn main_backup_never_overwrites_recorded_values() {
        let (base, mut mgr) = manager("idempotent");
        let source = StubSource::new(&[("system_responsiveness", 20)]);

        mgr.create_backup(BackupType::Registry, BackupKind::Main, &source)
            .unwrap();
        assert_eq!(
            mgr.original_value(&registry_key("system_responsiveness")),
            Some(OptimizationValue::Int(20))
        );

        // The live system changes; repeated main-backup calls keep the
        // first-observed value.
        source.set("system_responsiveness", 0);
        mgr.create_backup(BackupType::Registry, BackupKind::Main, &source)
            .unwrap();
        mgr.create_backup(BackupType::Registry, BackupKind::Main, &source)
            .unwrap();
        assert_eq!(
            mgr.original_value(&registry_key("system_responsiveness")),
            Some(OptimizationValue::Int(20))
        );

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn new_ids_are_merged_additively() {
        let (base, mut mgr) = manager("additive");
        let source = StubSource::new(&[("system_responsiveness", 20)]);
        mgr.create_backup(BackupType::Registry, BackupKind::Main, &source)
            .unwrap();

        source.set("network_throttling_index", 10);
        mgr.create_backup(BackupType::Registry, BackupKind::Main, &source)
            .unwrap();

        assert_eq!(
            mgr.original_value(&registry_key("network_throttling_index")),
            Some(OptimizationValue::Int(10))
        );
        // The pre-existing id kept its value.
        assert_eq!(
            mgr.original_value(&registry_key("system_responsiveness")),
            Some(OptimizationValue::Int(20))
        );

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn session_staleness_boundary() {
        let (base, mut mgr) = manager("stale");
        let source = StubSource::new(&[("system_responsiveness", 20)]);
        mgr.create_backup(BackupType::Registry, BackupKind::Session, &source)
            .unwrap();

        let path = mgr.paths.file(BackupType::Registry, BackupKind::Session);

        // 7h59m old: still complete.
        rewrite_timestamp(&path, Utc::now() - Duration::minutes(8 * 60 - 1));
        assert_eq!(
            mgr.check_backup_status(BackupType::Registry, BackupKind::Session, &source),
            BackupStatus::CompleteBackup
        );

        // 8h01s old: outdated.
        rewrite_timestamp(&path, Utc::now() - Duration::seconds(8 * 3600 + 1));
        assert_eq!(
            mgr.check_backup_status(BackupType::Registry, BackupKind::Session, &source),
            BackupStatus::OutdatedSessionBackup
        );

        // Recreating archives the stale file and writes fresh.
        mgr.create_backup(BackupType::Registry, BackupKind::Session, &source)
            .unwrap();
        assert_eq!(
            mgr.check_backup_status(BackupType::Registry, BackupKind::Session, &source),
            BackupStatus::CompleteBackup
        );
        let archived: Vec<_> = fs::read_dir(mgr.paths.archive_dir())
            .unwrap()
            .collect();
        assert_eq!(archived.len(), 1);

        let _ = fs::remove_dir_all(&base);
    }

    fn rewrite_timestamp(path: &Path, when: DateTime<Utc>) {
        let mut doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        doc["timestamp"] = serde_json::json!(when.to_rfc3339());
        fs::write(path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
    }

    #[test]
    fn partial_backup_when_known_id_is_missing() {
        let (base, mut mgr) = manager("partial");
        let source = StubSource::new(&[("a", 1)]);
        mgr.create_backup(BackupType::Registry, BackupKind::Main, &source)
            .unwrap();

        // A new definition appears; the existing file no longer covers it.
        source.set("b", 2);
        assert_eq!(
            mgr.check_backup_status(BackupType::Registry, BackupKind::Main, &source),
            BackupStatus::PartialBackup
        );

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn non_existent_sentinel_round_trip() {
        let (base, mut mgr) = manager("sentinel");
        let key = registry_key("game_dvr_enabled");
        mgr.record_non_existent_setting(&key, "GameDVR Enabled").unwrap();

        assert!(mgr.is_recorded_non_existent(&key));
        // The sentinel is not a usable original value for a write-back, but
        // the record itself is additive-once like any other.
        mgr.add_missing_setting_to_main_backup(&key, "GameDVR Enabled", &OptimizationValue::Int(1))
            .unwrap();
        assert!(mgr.is_recorded_non_existent(&key), "sentinel must not be overwritten");

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn full_export_is_created_at_most_once() {
        let (base, mut mgr) = manager("export");
        let source = StubSource::new(&[]);

        mgr.create_backup(BackupType::FullRegistryExport, BackupKind::Main, &source)
            .unwrap();
        let path = mgr.paths.file(BackupType::FullRegistryExport, BackupKind::Main);
        let first_mtime = fs::metadata(&path).unwrap().modified().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(30));
        mgr.create_backup(BackupType::FullRegistryExport, BackupKind::Session, &source)
            .unwrap();
        assert_eq!(
            fs::metadata(&path).unwrap().modified().unwrap(),
            first_mtime,
            "an existing valid export must never be regenerated"
        );

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn create_all_backups_on_fresh_machine() {
        let (base, mut mgr) = manager("fresh");
        let source = StubSource::new(&[("a", 1)]);

        let summary = mgr.create_all_backups_if_needed(&source);
        assert!(summary.all_ok(), "failures: {:?}", summary.failed);

        // Each domain is reported once even though two kinds were written.
        let mut seen = HashSet::new();
        assert!(
            summary.created.iter().all(|ty| seen.insert(*ty)),
            "domain double-counted: {:?}",
            summary.created
        );

        for ty in [BackupType::Registry, BackupType::PowerPlan, BackupType::VisualEffects] {
            for kind in [BackupKind::Main, BackupKind::Session] {
                assert!(
                    mgr.paths.file(ty, kind).exists(),
                    "{:?}/{:?} missing",
                    ty,
                    kind
                );
                assert_eq!(
                    mgr.check_backup_status(ty, kind, &source),
                    BackupStatus::CompleteBackup
                );
            }
        }

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn user_preferences_round_trip() {
        let (base, mgr) = manager("prefs");
        let mut prefs = HashMap::new();
        prefs.insert("system_responsiveness".to_string(), true);
        mgr.save_user_preferences(&prefs).unwrap();
        assert_eq!(mgr.load_user_preferences(), prefs);
        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn unknown_values_accumulate_per_id() {
        let (base, mgr) = manager("unknown");
        mgr.record_unknown_value("mouse_speed", "string", "fast").unwrap();
        mgr.record_unknown_value("mouse_speed", "string", "faster").unwrap();

        let raw = fs::read_to_string(mgr.paths.unknown_values()).unwrap();
        let doc: BTreeMap<String, Vec<serde_json::Value>> = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc.get("mouse_speed").unwrap().len(), 2);

        let _ = fs::remove_dir_all(&base);
    }
}
