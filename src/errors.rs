// src/errors.rs

use thiserror::Error;

use crate::backup::BackupType;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid registry key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Unsupported registry hive: {0}")]
    UnsupportedHive(String),

    #[error("Failed to open registry key: {0}")]
    KeyOpenError(String),

    #[error("Failed to read registry value: {0}")]
    ReadValueError(String),

    #[error("Failed to set registry value: {0}")]
    SetValueError(String),

    #[error("Failed to create registry key: {0}")]
    CreateError(String),

    #[error("Failed to delete registry value: {0}")]
    DeleteValueError(String),

    #[error("Creation of missing registry path is not whitelisted for setting '{0}'")]
    CreationNotAllowed(String),
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Failed to create backup directory '{path}': {source}")]
    DirectoryCreate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read backup file '{path}': {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write backup file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup file '{path}' is not valid JSON: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Document shape does not match backup domain {0:?}")]
    ShapeMismatch(BackupType),

    #[error("Backup for {0:?} is already being created")]
    InProgress(BackupType),

    #[error("No complete backup exists for {0:?}")]
    Incomplete(BackupType),

    #[error("Restore is not implemented for {0:?}")]
    RestoreNotImplemented(BackupType),
}

#[derive(Error, Debug)]
pub enum RustConfigError {
    #[error("client.cfg could not be located on this machine")]
    ConfigNotFound,

    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown setting '{0}'")]
    UnknownSetting(String),
}
