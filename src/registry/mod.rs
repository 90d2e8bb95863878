// src/registry/mod.rs
//
// Read/write/parse helpers over the registry store, hive-path resolution,
// and the persistent audit trail of every mutation attempt.

pub mod audit;
pub mod export;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::system::{RegistryStore, RegistryValue};
use audit::{AuditLog, AuditOp};

const KNOWN_HIVES: [&str; 10] = [
    "HKEY_CURRENT_USER",
    "HKEY_LOCAL_MACHINE",
    "HKEY_CLASSES_ROOT",
    "HKEY_USERS",
    "HKEY_CURRENT_CONFIG",
    "HKCU",
    "HKLM",
    "HKCR",
    "HKU",
    "HKCC",
];

/// Hives probed, in order, when a path carries no explicit hive prefix.
const PROBE_ORDER: [&str; 3] = ["HKEY_CURRENT_USER", "HKEY_LOCAL_MACHINE", "HKEY_USERS"];

fn has_hive_prefix(path: &str) -> bool {
    let head = path.split('\\').next().unwrap_or("");
    KNOWN_HIVES
        .iter()
        .any(|h| h.eq_ignore_ascii_case(head))
}

/// Registry access service: typed reads/writes over the store plus the
/// audit trail. All mutations funnel through here so nothing escapes the
/// log.
pub struct RegistryAccess {
    store: Arc<dyn RegistryStore>,
    audit: AuditLog,
}

impl RegistryAccess {
    pub fn new(store: Arc<dyn RegistryStore>, audit: AuditLog) -> Self {
        Self { store, audit }
    }

    pub fn store(&self) -> Arc<dyn RegistryStore> {
        Arc::clone(&self.store)
    }

    /// Reads a value. When the path has no hive prefix, HKCU, HKLM and HKU
    /// are probed in order and the first hit wins; `None` means the value is
    /// genuinely absent everywhere (a present-but-empty string still reads
    /// as `Some`).
    pub fn get_value(&self, path: &str, name: &str) -> Result<Option<RegistryValue>> {
        if has_hive_prefix(path) {
            return self.store.read_value(path, name);
        }
        for hive in PROBE_ORDER {
            let full = format!("{}\\{}", hive, path);
            if let Some(value) = self.store.read_value(&full, name)? {
                trace!(path = %full, name, "hive probe hit");
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Resolves an unprefixed path to the first hive where the key exists.
    pub fn resolve_path(&self, path: &str) -> Result<Option<String>> {
        if has_hive_prefix(path) {
            return Ok(self.store.key_exists(path)?.then(|| path.to_string()));
        }
        for hive in PROBE_ORDER {
            let full = format!("{}\\{}", hive, path);
            if self.store.key_exists(&full)? {
                return Ok(Some(full));
            }
        }
        Ok(None)
    }

    pub fn key_exists(&self, path: &str) -> Result<bool> {
        if has_hive_prefix(path) {
            return self.store.key_exists(path);
        }
        Ok(self.resolve_path(path)?.is_some())
    }

    /// Writes into an existing key, auditing the attempt either way.
    pub fn set_value(&self, path: &str, name: &str, value: &RegistryValue) -> Result<()> {
        let result = self
            .store
            .write_value(path, name, value)
            .with_context(|| format!("Failed to set value '{}' in '{}'", name, path));
        self.audit.record(
            AuditOp::SetValue,
            path,
            name,
            if result.is_ok() { "OK" } else { "FAILED" },
        );
        if result.is_ok() {
            debug!(path, name, value = %value, "registry value set");
        }
        result
    }

    pub fn delete_value(&self, path: &str, name: &str) -> Result<()> {
        let result = self
            .store
            .delete_value(path, name)
            .with_context(|| format!("Failed to delete value '{}' in '{}'", name, path));
        self.audit.record(
            AuditOp::DeleteValue,
            path,
            name,
            if result.is_ok() { "OK" } else { "FAILED" },
        );
        result
    }

    /// Creates the full key chain, auditing the creation attempt. Callers
    /// are responsible for the creation-allowed gate; this method records
    /// whatever they decided.
    pub fn create_key_chain(&self, path: &str) -> Result<()> {
        let result = self
            .store
            .create_key_chain(path)
            .with_context(|| format!("Failed to create key chain '{}'", path));
        self.audit.record(
            AuditOp::CreateKey,
            path,
            "",
            if result.is_ok() { "OK" } else { "FAILED" },
        );
        result
    }

    /// Records a denied mutation in the audit trail without touching the
    /// registry. Deliberate denials are part of the history too.
    pub fn record_denied(&self, op: AuditOp, path: &str, name: &str) {
        self.audit.record(op, path, name, "DENIED");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::memory::MemoryRegistryStore;

    fn access() -> (Arc<MemoryRegistryStore>, RegistryAccess) {
        let store = Arc::new(MemoryRegistryStore::new());
        let audit = AuditLog::new(
            std::env::temp_dir().join(format!("checkmark_regaccess_{}.log", std::process::id())),
        );
        let access = RegistryAccess::new(store.clone() as Arc<dyn RegistryStore>, audit);
        (store, access)
    }

    #[test]
    fn probes_hives_in_order_for_unprefixed_paths() {
        let (store, access) = access();
        store.seed(
            "HKEY_LOCAL_MACHINE\\Software\\Test",
            "Value",
            RegistryValue::Dword(2),
        );
        store.seed(
            "HKEY_CURRENT_USER\\Software\\Test",
            "Value",
            RegistryValue::Dword(1),
        );

        // HKCU wins over HKLM.
        let hit = access.get_value("Software\\Test", "Value").unwrap();
        assert_eq!(hit, Some(RegistryValue::Dword(1)));
        assert_eq!(
            access.resolve_path("Software\\Test").unwrap().as_deref(),
            Some("HKEY_CURRENT_USER\\Software\\Test")
        );
    }

    #[test]
    fn absent_value_is_none_even_when_key_exists() {
        let (store, access) = access();
        store.seed_key("HKEY_CURRENT_USER\\Software\\Empty");
        assert_eq!(
            access
                .get_value("HKEY_CURRENT_USER\\Software\\Empty", "Nothing")
                .unwrap(),
            None
        );
        // Present-but-empty is distinguishable from absent.
        store.seed(
            "HKEY_CURRENT_USER\\Software\\Empty",
            "Blank",
            RegistryValue::String(String::new()),
        );
        assert_eq!(
            access
                .get_value("HKEY_CURRENT_USER\\Software\\Empty", "Blank")
                .unwrap(),
            Some(RegistryValue::String(String::new()))
        );
    }

    #[test]
    fn set_requires_existing_key() {
        let (store, access) = access();
        let path = "HKEY_CURRENT_USER\\Software\\Gate";
        assert!(access
            .set_value(path, "V", &RegistryValue::Dword(1))
            .is_err());
        access.create_key_chain(path).unwrap();
        access.set_value(path, "V", &RegistryValue::Dword(1)).unwrap();
        assert_eq!(
            store.read_value(path, "V").unwrap(),
            Some(RegistryValue::Dword(1))
        );
    }
}
