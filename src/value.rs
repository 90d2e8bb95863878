// src/value.rs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{constants::NETWORK_THROTTLING_UNLIMITED, system::RegistryValue};

/// Tagged union used uniformly to represent any setting's value, regardless
/// of backing store. A given setting always round-trips through the same
/// variant across read and write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptimizationValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
}

impl OptimizationValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptimizationValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptimizationValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            OptimizationValue::Double(v) => Some(*v),
            OptimizationValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            OptimizationValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True when both values carry the same variant tag.
    pub fn same_variant(&self, other: &OptimizationValue) -> bool {
        matches!(
            (self, other),
            (OptimizationValue::Bool(_), OptimizationValue::Bool(_))
                | (OptimizationValue::Int(_), OptimizationValue::Int(_))
                | (OptimizationValue::Double(_), OptimizationValue::Double(_))
                | (OptimizationValue::Text(_), OptimizationValue::Text(_))
        )
    }

    /// Converts a raw registry value. The DWORD overflow sentinel
    /// `0xFFFFFFFF` maps to the maximum representable int so that
    /// "unlimited" survives the round trip. REG_SZ stays `Text` even when
    /// it holds a numeral, so writing it back keeps the registry type.
    pub fn from_registry(value: &RegistryValue) -> OptimizationValue {
        match value {
            RegistryValue::Dword(v) if *v == NETWORK_THROTTLING_UNLIMITED => {
                OptimizationValue::Int(i64::from(i32::MAX))
            }
            RegistryValue::Dword(v) => OptimizationValue::Int(i64::from(*v)),
            RegistryValue::String(s) => OptimizationValue::Text(s.clone()),
            RegistryValue::Binary(bytes) => OptimizationValue::Text(
                bytes
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(""),
            ),
        }
    }

    /// Converts back into a registry value, preserving the variant tag the
    /// setting was read with. Ints outside the DWORD range clamp to the
    /// unlimited sentinel.
    pub fn to_registry(&self) -> RegistryValue {
        match self {
            OptimizationValue::Bool(b) => RegistryValue::Dword(u32::from(*b)),
            OptimizationValue::Int(v) if *v >= i64::from(i32::MAX) => {
                RegistryValue::Dword(NETWORK_THROTTLING_UNLIMITED)
            }
            OptimizationValue::Int(v) if *v < 0 => RegistryValue::Dword(0),
            OptimizationValue::Int(v) => RegistryValue::Dword(*v as u32),
            OptimizationValue::Double(v) => RegistryValue::String(v.to_string()),
            OptimizationValue::Text(s) => RegistryValue::String(s.clone()),
        }
    }

    /// Parses a JSON value recorded in a backup file back into the union.
    /// Backups written by earlier versions stored everything as strings, so
    /// string payloads go through `normalize`.
    pub fn from_json(value: &serde_json::Value) -> Option<OptimizationValue> {
        match value {
            serde_json::Value::Bool(b) => Some(OptimizationValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(OptimizationValue::Int(i))
                } else {
                    n.as_f64().map(OptimizationValue::Double)
                }
            }
            serde_json::Value::String(s) => Some(normalize(s)),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Normalizes a string into the most specific variant it parses as:
/// "true"/"false" (any casing) become Bool, integer literals (optionally
/// quoted) become Int, float literals become Double, everything else stays
/// Text. Surrounding quotes on numerics are stripped first.
pub fn normalize(raw: &str) -> OptimizationValue {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);

    match unquoted.to_ascii_lowercase().as_str() {
        "true" => return OptimizationValue::Bool(true),
        "false" => return OptimizationValue::Bool(false),
        _ => {}
    }
    if let Ok(i) = unquoted.parse::<i64>() {
        return OptimizationValue::Int(i);
    }
    if let Ok(f) = unquoted.parse::<f64>() {
        return OptimizationValue::Double(f);
    }
    OptimizationValue::Text(trimmed.to_string())
}

impl fmt::Display for OptimizationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationValue::Bool(b) => write!(f, "{}", b),
            OptimizationValue::Int(v) => write!(f, "{}", v),
            OptimizationValue::Double(v) => write!(f, "{}", v),
            OptimizationValue::Text(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_booleans_any_casing() {
        assert_eq!(normalize("true"), OptimizationValue::Bool(true));
        assert_eq!(normalize("False"), OptimizationValue::Bool(false));
        assert_eq!(normalize("TRUE"), OptimizationValue::Bool(true));
    }

    #[test]
    fn normalize_quoted_numerics() {
        assert_eq!(normalize("\"4\""), OptimizationValue::Int(4));
        assert_eq!(normalize("\"2.5\""), OptimizationValue::Double(2.5));
        assert_eq!(normalize("10"), OptimizationValue::Int(10));
    }

    #[test]
    fn normalize_falls_back_to_text() {
        assert_eq!(
            normalize("VSYNCMODE_FORCEOFF"),
            OptimizationValue::Text("VSYNCMODE_FORCEOFF".to_string())
        );
    }

    #[test]
    fn dword_overflow_sentinel_maps_to_int_max() {
        let v = OptimizationValue::from_registry(&RegistryValue::Dword(0xFFFF_FFFF));
        assert_eq!(v, OptimizationValue::Int(i64::from(i32::MAX)));
        // And the round trip restores the sentinel.
        assert_eq!(v.to_registry(), RegistryValue::Dword(0xFFFF_FFFF));
    }

    #[test]
    fn reg_sz_numeral_round_trips_as_text() {
        let raw = RegistryValue::String("1".to_string());
        let v = OptimizationValue::from_registry(&raw);
        assert_eq!(v, OptimizationValue::Text("1".to_string()));
        // Writing back must keep REG_SZ, not convert to REG_DWORD.
        assert_eq!(v.to_registry(), raw);
    }

    #[test]
    fn dword_round_trip_keeps_int_tag() {
        let raw = RegistryValue::Dword(20);
        let v = OptimizationValue::from_registry(&raw);
        assert_eq!(v, OptimizationValue::Int(20));
        assert_eq!(v.to_registry(), raw);
    }

    #[test]
    fn same_variant_distinguishes_tags() {
        assert!(OptimizationValue::Int(1).same_variant(&OptimizationValue::Int(9)));
        assert!(!OptimizationValue::Int(1).same_variant(&OptimizationValue::Bool(true)));
    }

    #[test]
    fn json_round_trip() {
        let v = OptimizationValue::Int(42);
        let json = v.to_json();
        assert_eq!(OptimizationValue::from_json(&json), Some(v));

        // String-encoded numerics from old backups normalize back to Int.
        let legacy = serde_json::Value::String("42".to_string());
        assert_eq!(
            OptimizationValue::from_json(&legacy),
            Some(OptimizationValue::Int(42))
        );
    }
}
