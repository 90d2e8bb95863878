// src/backup/store.rs
//
// On-disk JSON schemas for the backup documents and their load/save
// helpers. Field names are part of the format and must stay stable across
// versions, so each domain gets its own concrete serde struct.

use std::{fs, path::Path};

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{BackupType, RustConfigSnapshot};
use crate::{constants::BACKUP_SCHEMA_VERSION, errors::BackupError};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettingEntry {
    pub id: String,
    pub name: String,
    pub current_value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_value_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct DocMeta {
    pub timestamp: String,
    pub last_updated: Option<String>,
    pub version: String,
}

impl DocMeta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            last_updated: None,
            version: BACKUP_SCHEMA_VERSION.to_string(),
        }
    }

    pub fn touch(&mut self) {
        self.last_updated = Some(Utc::now().to_rfc3339());
    }
}

/// A loaded backup document, unified across domains so the manager can
/// reason about status and merging without caring which file it came from.
#[derive(Clone, Debug)]
pub enum DomainDocument {
    Settings {
        meta: DocMeta,
        entries: Vec<SettingEntry>,
    },
    PowerPlan {
        meta: DocMeta,
        guid: String,
        name: String,
    },
    VisualEffects {
        meta: DocMeta,
        profile: i32,
        profile_name: String,
    },
    RustConfig {
        meta: DocMeta,
        snapshot: RustConfigSnapshot,
    },
}

impl DomainDocument {
    pub fn meta(&self) -> &DocMeta {
        match self {
            DomainDocument::Settings { meta, .. }
            | DomainDocument::PowerPlan { meta, .. }
            | DomainDocument::VisualEffects { meta, .. }
            | DomainDocument::RustConfig { meta, .. } => meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut DocMeta {
        match self {
            DomainDocument::Settings { meta, .. }
            | DomainDocument::PowerPlan { meta, .. }
            | DomainDocument::VisualEffects { meta, .. }
            | DomainDocument::RustConfig { meta, .. } => meta,
        }
    }

    pub fn entries(&self) -> Option<&Vec<SettingEntry>> {
        match self {
            DomainDocument::Settings { entries, .. } => Some(entries),
            _ => None,
        }
    }

    pub fn entries_mut(&mut self) -> Option<&mut Vec<SettingEntry>> {
        match self {
            DomainDocument::Settings { entries, .. } => Some(entries),
            _ => None,
        }
    }
}

// ---- concrete wire formats -------------------------------------------------

#[derive(Serialize, Deserialize)]
struct SettingsDoc {
    backup_type: String,
    timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_updated: Option<String>,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    registry_settings: Option<Vec<SettingEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nvidia_settings: Option<Vec<SettingEntry>>,
}

#[derive(Serialize, Deserialize)]
struct PowerPlanDoc {
    backup_type: String,
    timestamp: String,
    version: String,
    guid: String,
    name: String,
}

#[derive(Serialize, Deserialize)]
struct VisualEffectsDoc {
    backup_type: String,
    timestamp: String,
    version: String,
    profile: i32,
    profile_name: String,
}

#[derive(Serialize, Deserialize)]
struct RustConfigMeta {
    version: String,
    timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_updated: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct KeyBindings {
    bindings: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct RustConfigDoc {
    metadata: RustConfigMeta,
    timestamp: String,
    client_cfg: IndexMap<String, String>,
    favorites_cfg: serde_json::Value,
    keys_cfg: KeyBindings,
    keys_default_cfg: KeyBindings,
}

// ---- load/save -------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, BackupError> {
    fs::read_to_string(path).map_err(|source| BackupError::ReadFile {
        path: path.display().to_string(),
        source,
    })
}

fn parse<T: for<'de> Deserialize<'de>>(path: &Path, raw: &str) -> Result<T, BackupError> {
    serde_json::from_str(raw).map_err(|source| BackupError::Malformed {
        path: path.display().to_string(),
        source,
    })
}

fn write_file(path: &Path, json: String) -> Result<(), BackupError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| BackupError::DirectoryCreate {
            path: parent.display().to_string(),
            source,
        })?;
    }
    fs::write(path, json).map_err(|source| BackupError::WriteFile {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_document(ty: BackupType, path: &Path) -> Result<DomainDocument, BackupError> {
    let raw = read_file(path)?;
    match ty {
        BackupType::Registry | BackupType::NvidiaSettings => {
            let doc: SettingsDoc = parse(path, &raw)?;
            let entries = match ty {
                BackupType::Registry => doc.registry_settings,
                _ => doc.nvidia_settings,
            }
            .unwrap_or_default();
            Ok(DomainDocument::Settings {
                meta: DocMeta {
                    timestamp: doc.timestamp,
                    last_updated: doc.last_updated,
                    version: doc.version,
                },
                entries,
            })
        }
        BackupType::PowerPlan => {
            let doc: PowerPlanDoc = parse(path, &raw)?;
            Ok(DomainDocument::PowerPlan {
                meta: DocMeta {
                    timestamp: doc.timestamp,
                    last_updated: None,
                    version: doc.version,
                },
                guid: doc.guid,
                name: doc.name,
            })
        }
        BackupType::VisualEffects => {
            let doc: VisualEffectsDoc = parse(path, &raw)?;
            Ok(DomainDocument::VisualEffects {
                meta: DocMeta {
                    timestamp: doc.timestamp,
                    last_updated: None,
                    version: doc.version,
                },
                profile: doc.profile,
                profile_name: doc.profile_name,
            })
        }
        BackupType::RustConfig => {
            let doc: RustConfigDoc = parse(path, &raw)?;
            Ok(DomainDocument::RustConfig {
                meta: DocMeta {
                    timestamp: doc.timestamp,
                    last_updated: doc.metadata.last_updated,
                    version: doc.metadata.version,
                },
                snapshot: RustConfigSnapshot {
                    client: doc.client_cfg,
                    favorites: doc.favorites_cfg,
                    key_bindings: doc.keys_cfg.bindings,
                    default_key_bindings: doc.keys_default_cfg.bindings,
                },
            })
        }
        BackupType::FullRegistryExport => {
            // Not a JSON document; the manager validates the .reg directly.
            Err(BackupError::RestoreNotImplemented(ty))
        }
    }
}

pub fn save_document(ty: BackupType, path: &Path, doc: &DomainDocument) -> Result<(), BackupError> {
    let json = match (ty, doc) {
        (BackupType::Registry, DomainDocument::Settings { meta, entries }) => {
            serde_json::to_string_pretty(&SettingsDoc {
                backup_type: ty.label().to_string(),
                timestamp: meta.timestamp.clone(),
                last_updated: meta.last_updated.clone(),
                version: meta.version.clone(),
                registry_settings: Some(entries.clone()),
                nvidia_settings: None,
            })
        }
        (BackupType::NvidiaSettings, DomainDocument::Settings { meta, entries }) => {
            serde_json::to_string_pretty(&SettingsDoc {
                backup_type: ty.label().to_string(),
                timestamp: meta.timestamp.clone(),
                last_updated: meta.last_updated.clone(),
                version: meta.version.clone(),
                registry_settings: None,
                nvidia_settings: Some(entries.clone()),
            })
        }
        (BackupType::PowerPlan, DomainDocument::PowerPlan { meta, guid, name }) => {
            serde_json::to_string_pretty(&PowerPlanDoc {
                backup_type: ty.label().to_string(),
                timestamp: meta.timestamp.clone(),
                version: meta.version.clone(),
                guid: guid.clone(),
                name: name.clone(),
            })
        }
        (
            BackupType::VisualEffects,
            DomainDocument::VisualEffects {
                meta,
                profile,
                profile_name,
            },
        ) => serde_json::to_string_pretty(&VisualEffectsDoc {
            backup_type: ty.label().to_string(),
            timestamp: meta.timestamp.clone(),
            version: meta.version.clone(),
            profile: *profile,
            profile_name: profile_name.clone(),
        }),
        (BackupType::RustConfig, DomainDocument::RustConfig { meta, snapshot }) => {
            serde_json::to_string_pretty(&RustConfigDoc {
                metadata: RustConfigMeta {
                    version: meta.version.clone(),
                    timestamp: meta.timestamp.clone(),
                    last_updated: meta.last_updated.clone(),
                },
                timestamp: meta.timestamp.clone(),
                client_cfg: snapshot.client.clone(),
                favorites_cfg: snapshot.favorites.clone(),
                keys_cfg: KeyBindings {
                    bindings: snapshot.key_bindings.clone(),
                },
                keys_default_cfg: KeyBindings {
                    bindings: snapshot.default_key_bindings.clone(),
                },
            })
        }
        (ty, _) => return Err(BackupError::ShapeMismatch(ty)),
    }
    .map_err(|source| BackupError::Malformed {
        path: path.display().to_string(),
        source,
    })?;

    write_file(path, json)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn scratch(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("checkmark_store_{}_{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn registry_doc_round_trip_uses_registry_settings_field() {
        let dir = scratch("registry");
        let path = dir.join("registry.json");
        let doc = DomainDocument::Settings {
            meta: DocMeta::now(),
            entries: vec![SettingEntry {
                id: "system_responsiveness".into(),
                name: "System Responsiveness".into(),
                current_value: serde_json::json!(20),
                registry_key: Some(
                    "HKEY_LOCAL_MACHINE\\SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\Multimedia\\SystemProfile"
                        .into(),
                ),
                registry_value_name: Some("SystemResponsiveness".into()),
            }],
        };
        save_document(BackupType::Registry, &path, &doc).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"registry_settings\""));
        assert!(!raw.contains("\"nvidia_settings\""));

        let loaded = load_document(BackupType::Registry, &path).unwrap();
        assert_eq!(loaded.entries().unwrap().len(), 1);
        assert_eq!(loaded.entries().unwrap()[0].id, "system_responsiveness");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn power_plan_doc_round_trip() {
        let dir = scratch("power");
        let path = dir.join("power_plan.json");
        let doc = DomainDocument::PowerPlan {
            meta: DocMeta::now(),
            guid: "381b4222-f694-41f0-9685-ff5bb260df2e".into(),
            name: "Balanced".into(),
        };
        save_document(BackupType::PowerPlan, &path, &doc).unwrap();
        match load_document(BackupType::PowerPlan, &path).unwrap() {
            DomainDocument::PowerPlan { guid, name, .. } => {
                assert_eq!(guid, "381b4222-f694-41f0-9685-ff5bb260df2e");
                assert_eq!(name, "Balanced");
            }
            other => panic!("wrong document shape: {:?}", other),
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn rust_config_doc_round_trip() {
        let dir = scratch("rust");
        let path = dir.join("rust_config.json");
        let mut client = IndexMap::new();
        client.insert("graphics.af".to_string(), "4".to_string());
        let doc = DomainDocument::RustConfig {
            meta: DocMeta::now(),
            snapshot: RustConfigSnapshot {
                client,
                favorites: serde_json::json!({"servers": []}),
                key_bindings: vec!["bind w +forward".into()],
                default_key_bindings: vec![],
            },
        };
        save_document(BackupType::RustConfig, &path, &doc).unwrap();
        match load_document(BackupType::RustConfig, &path).unwrap() {
            DomainDocument::RustConfig { snapshot, .. } => {
                assert_eq!(snapshot.client.get("graphics.af").unwrap(), "4");
                assert_eq!(snapshot.key_bindings.len(), 1);
            }
            other => panic!("wrong document shape: {:?}", other),
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_json_is_a_typed_error() {
        let dir = scratch("malformed");
        let path = dir.join("registry.json");
        fs::write(&path, "{ not json").unwrap();
        match load_document(BackupType::Registry, &path) {
            Err(BackupError::Malformed { .. }) => {}
            other => panic!("expected Malformed, got {:?}", other.map(|_| ())),
        }
        let _ = fs::remove_dir_all(&dir);
    }
}
