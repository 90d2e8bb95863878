// src/system/windows.rs
//
// Real Windows implementations of the collaborator interfaces: winreg for
// the registry, powercfg (through the tool runner) for power plans, and a
// WM_SETTINGCHANGE broadcast for the refresh surface.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tracing::debug;
use widestring::U16CString;
use windows::Win32::{
    Foundation::{CloseHandle, HANDLE, LPARAM, WPARAM},
    Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY},
    System::Threading::{GetCurrentProcess, OpenProcessToken},
    UI::WindowsAndMessaging::{
        SendMessageTimeoutW, SystemParametersInfoW, HWND_BROADCAST, SMTO_ABORTIFHUNG,
        SPIF_SENDCHANGE, SPIF_UPDATEINIFILE, SPI_SETDESKWALLPAPER, WM_SETTINGCHANGE,
    },
};
use winreg::{
    enums::{
        RegType::{REG_BINARY, REG_DWORD, REG_SZ},
        HKEY_CLASSES_ROOT, HKEY_CURRENT_CONFIG, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS,
        KEY_READ, KEY_WRITE,
    },
    RegKey, RegValue,
};

use super::{
    PowerPlan, PowerPlanControl, RegistryStore, RegistryValue, SystemRefresh, ToolRunner,
};
use crate::errors::RegistryError;

/// Splits a full registry path into its hive and subkey path.
fn parse_path(path: &str) -> Result<(RegKey, String), RegistryError> {
    let mut components = path.splitn(2, '\\');
    let hive_name = components
        .next()
        .ok_or_else(|| RegistryError::InvalidKeyFormat(path.to_string()))?;
    let subkey = components
        .next()
        .ok_or_else(|| RegistryError::InvalidKeyFormat(path.to_string()))?;

    let hive = match hive_name.to_uppercase().as_str() {
        "HKEY_LOCAL_MACHINE" | "HKLM" => HKEY_LOCAL_MACHINE,
        "HKEY_CURRENT_USER" | "HKCU" => HKEY_CURRENT_USER,
        "HKEY_CLASSES_ROOT" | "HKCR" => HKEY_CLASSES_ROOT,
        "HKEY_USERS" | "HKU" => HKEY_USERS,
        "HKEY_CURRENT_CONFIG" | "HKCC" => HKEY_CURRENT_CONFIG,
        other => return Err(RegistryError::UnsupportedHive(other.to_string())),
    };
    Ok((RegKey::predef(hive), subkey.to_string()))
}

#[derive(Debug, Default)]
pub struct WindowsRegistryStore;

impl RegistryStore for WindowsRegistryStore {
    fn read_value(&self, path: &str, name: &str) -> Result<Option<RegistryValue>> {
        let (hive, subkey_path) = parse_path(path)?;
        let subkey = match hive.open_subkey_with_flags(&subkey_path, KEY_READ) {
            Ok(k) => k,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RegistryError::KeyOpenError(format!("{}: {}", subkey_path, e)).into())
            }
        };

        match subkey.get_raw_value(name) {
            Ok(raw) => match raw.vtype {
                REG_DWORD => {
                    if raw.bytes.len() < 4 {
                        anyhow::bail!("REG_DWORD data too small for value '{}'", name);
                    }
                    let dword = u32::from_le_bytes([
                        raw.bytes[0],
                        raw.bytes[1],
                        raw.bytes[2],
                        raw.bytes[3],
                    ]);
                    Ok(Some(RegistryValue::Dword(dword)))
                }
                REG_BINARY => Ok(Some(RegistryValue::Binary(raw.bytes.clone()))),
                REG_SZ => {
                    let wide: Vec<u16> = raw
                        .bytes
                        .chunks_exact(2)
                        .map(|c| u16::from_le_bytes([c[0], c[1]]))
                        .take_while(|&c| c != 0)
                        .collect();
                    Ok(Some(RegistryValue::String(String::from_utf16_lossy(
                        &wide,
                    ))))
                }
                other => anyhow::bail!("Unsupported registry value type: {:?}", other),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegistryError::ReadValueError(format!("{}: {}", name, e)).into()),
        }
    }

    fn write_value(&self, path: &str, name: &str, value: &RegistryValue) -> Result<()> {
        let (hive, subkey_path) = parse_path(path)?;
        let subkey = hive
            .open_subkey_with_flags(&subkey_path, KEY_WRITE)
            .map_err(|e| RegistryError::KeyOpenError(format!("{}: {}", subkey_path, e)))?;

        match value {
            RegistryValue::Dword(v) => subkey
                .set_value(name, v)
                .map_err(|e| RegistryError::SetValueError(format!("{}: {}", name, e)))?,
            RegistryValue::String(s) => subkey
                .set_raw_value(
                    name,
                    &RegValue {
                        bytes: s
                            .encode_utf16()
                            .chain(std::iter::once(0))
                            .flat_map(|c| c.to_le_bytes())
                            .collect(),
                        vtype: REG_SZ,
                    },
                )
                .map_err(|e| RegistryError::SetValueError(format!("{}: {}", name, e)))?,
            RegistryValue::Binary(data) => subkey
                .set_raw_value(
                    name,
                    &RegValue {
                        bytes: data.clone(),
                        vtype: REG_BINARY,
                    },
                )
                .map_err(|e| RegistryError::SetValueError(format!("{}: {}", name, e)))?,
        }
        Ok(())
    }

    fn delete_value(&self, path: &str, name: &str) -> Result<()> {
        let (hive, subkey_path) = parse_path(path)?;
        let subkey = match hive.open_subkey_with_flags(&subkey_path, KEY_WRITE) {
            Ok(k) => k,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(RegistryError::KeyOpenError(format!("{}: {}", subkey_path, e)).into())
            }
        };
        match subkey.delete_value(name) {
            Ok(_) => Ok(()),
            // Absent already counts as deleted.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegistryError::DeleteValueError(format!("{}: {}", name, e)).into()),
        }
    }

    fn key_exists(&self, path: &str) -> Result<bool> {
        let (hive, subkey_path) = parse_path(path)?;
        match hive.open_subkey_with_flags(&subkey_path, KEY_READ) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RegistryError::KeyOpenError(format!("{}: {}", subkey_path, e)).into()),
        }
    }

    fn create_key_chain(&self, path: &str) -> Result<()> {
        let (hive, subkey_path) = parse_path(path)?;
        // One component at a time so every intermediate creation shows up in
        // the audit trail with its own outcome.
        let mut current = hive;
        for component in subkey_path.split('\\') {
            let (next, _) = current
                .create_subkey(component)
                .map_err(|e| RegistryError::CreateError(format!("{}: {}", component, e)))?;
            debug!(component, "created or opened registry key component");
            current = next;
        }
        Ok(())
    }
}

/// Power-plan control implemented over `powercfg.exe`.
pub struct PowercfgControl {
    runner: Arc<dyn ToolRunner>,
}

impl PowercfgControl {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    /// Parses a `powercfg` scheme line:
    /// `Power Scheme GUID: 381b4222-...  (Balanced) *`
    fn parse_scheme_line(line: &str) -> Option<PowerPlan> {
        let rest = line.trim().strip_prefix("Power Scheme GUID:")?.trim();
        let (guid, tail) = rest.split_once(' ')?;
        let name = tail
            .trim()
            .trim_end_matches('*')
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .to_string();
        Some(PowerPlan {
            guid: guid.trim().to_string(),
            name,
        })
    }
}

impl PowerPlanControl for PowercfgControl {
    fn active_plan(&self) -> Result<PowerPlan> {
        let output = self
            .runner
            .run("powercfg", &["/GETACTIVESCHEME"], Duration::from_secs(30))
            .context("Failed to query active power scheme")?;
        output
            .stdout
            .lines()
            .find_map(Self::parse_scheme_line)
            .ok_or_else(|| anyhow::anyhow!("Could not parse active power scheme"))
    }

    fn list_plans(&self) -> Result<Vec<PowerPlan>> {
        let output = self
            .runner
            .run("powercfg", &["/L"], Duration::from_secs(30))
            .context("Failed to enumerate power schemes")?;
        Ok(output
            .stdout
            .lines()
            .filter_map(Self::parse_scheme_line)
            .collect())
    }

    fn set_active(&self, guid: &str) -> Result<()> {
        let output = self
            .runner
            .run("powercfg", &["/SETACTIVE", guid], Duration::from_secs(30))
            .with_context(|| format!("Failed to activate power scheme '{}'", guid))?;
        if !output.success() {
            anyhow::bail!(
                "powercfg /SETACTIVE {} exited with {:?}: {}",
                guid,
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(())
    }
}

/// Broadcasts a settings change so the shell re-reads wallpaper and related
/// per-user registry values. Several fallback calls because Explorer does
/// not reliably honor a single one.
#[derive(Debug, Default)]
pub struct WindowsRefresh;

impl SystemRefresh for WindowsRefresh {
    fn broadcast_settings_change(&self) -> Result<()> {
        unsafe {
            let _ = SystemParametersInfoW(
                SPI_SETDESKWALLPAPER,
                0,
                None,
                SPIF_UPDATEINIFILE | SPIF_SENDCHANGE,
            );
            let section = U16CString::from_str("Environment")?;
            SendMessageTimeoutW(
                HWND_BROADCAST,
                WM_SETTINGCHANGE,
                WPARAM(0),
                LPARAM(section.as_ptr() as isize),
                SMTO_ABORTIFHUNG,
                5000,
                None,
            );
        }
        Ok(())
    }
}

/// Checks if the current process is running with elevated privileges.
pub fn is_elevated() -> bool {
    let mut handle: HANDLE = HANDLE::default();
    if unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut handle).is_err() } {
        return false;
    }
    let mut elevation: TOKEN_ELEVATION = unsafe { std::mem::zeroed() };
    let size = std::mem::size_of::<TOKEN_ELEVATION>() as u32;
    let mut ret_size = size;
    let elevated = unsafe {
        GetTokenInformation(
            handle,
            TokenElevation,
            Some(&mut elevation as *mut _ as *mut _),
            size,
            &mut ret_size,
        )
        .is_ok()
    } && elevation.TokenIsElevated != 0;
    unsafe {
        let _ = CloseHandle(handle);
    }
    elevated
}
