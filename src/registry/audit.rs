// src/registry/audit.rs

use std::{
    fmt,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use tracing::warn;

/// Registry mutation classes that get audited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditOp {
    CreateKey,
    SetValue,
    DeleteValue,
}

impl fmt::Display for AuditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOp::CreateKey => write!(f, "CREATE_KEY"),
            AuditOp::SetValue => write!(f, "SET_VALUE"),
            AuditOp::DeleteValue => write!(f, "DELETE_VALUE"),
        }
    }
}

/// Append-only log of every registry mutation attempt, kept alongside the
/// backups so a user can reconstruct what was touched and when. Logging
/// failures are reported but never fail the mutation itself.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, op: AuditOp, key_path: &str, value_name: &str, outcome: &str) {
        let line = format!(
            "{}\t{}\t{}\t{}\t{}\n",
            Utc::now().to_rfc3339(),
            op,
            key_path,
            value_name,
            outcome
        );
        if let Err(e) = self.append(&line) {
            warn!(path = %self.path.display(), error = %e, "failed to write audit log entry");
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "checkmark_audit_{}_{}.log",
            tag,
            std::process::id()
        ))
    }

    #[test]
    fn records_are_appended_with_timestamp_and_op() {
        let path = scratch_file("append");
        let _ = std::fs::remove_file(&path);
        let log = AuditLog::new(path.clone());

        log.record(
            AuditOp::SetValue,
            "HKEY_CURRENT_USER\\Software\\Test",
            "Value",
            "OK",
        );
        log.record(
            AuditOp::DeleteValue,
            "HKEY_CURRENT_USER\\Software\\Test",
            "Value",
            "DENIED",
        );

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("SET_VALUE"));
        assert!(lines[0].contains("OK"));
        assert!(lines[1].contains("DELETE_VALUE"));
        assert!(lines[1].contains("DENIED"));

        let _ = std::fs::remove_file(&path);
    }
}
