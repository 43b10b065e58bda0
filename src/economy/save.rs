//! Save/load for the player economy.
//!
//! ## Record layout
//!
//! `{ balance, generators, lastClaimTime, totalEarned, productionRate }`,
//! camelCase, plus optional `walletAddress` and `version`. A record without
//! `version` is the first layout and counts as version 1.
//!
//! ## Loose loading
//!
//! Loading never fails. Each field is read on its own: a missing or
//! ill-typed field falls back to its default instead of rejecting the whole
//! record, and a payload that is not a JSON object at all degrades to a
//! fresh zero state. `productionRate` is always recomputed from
//! `generators`; the persisted value is only compared, never trusted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::catalog::Catalog;
use super::state::PlayerState;

/// Current record format version.
pub const SAVE_VERSION: u32 = 1;

/// Oldest version whose fields still mean what they mean today.
pub const MIN_COMPATIBLE_VERSION: u32 = 1;

/// Persisted form of a [`PlayerState`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SaveRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    pub balance: f64,
    pub generators: Vec<u32>,
    /// Epoch millis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_claim_time: Option<i64>,
    pub total_earned: f64,
    pub production_rate: f64,
}

/// How much of a loaded record survived as-is.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadQuality {
    /// Every field present and valid.
    Clean,
    /// Loaded, but the named fields were missing, invalid, or stale.
    Repaired(Vec<&'static str>),
    /// Unreadable or incompatible; replaced with a fresh zero state.
    Discarded,
}

/// Outcome of loading a save.
#[derive(Clone, Debug, PartialEq)]
pub struct Loaded {
    pub state: PlayerState,
    pub wallet_address: Option<String>,
    pub version: u32,
    pub quality: LoadQuality,
}

/// Snapshot the persistent fields of `state`.
pub fn extract_save(state: &PlayerState, wallet_address: Option<&str>) -> SaveRecord {
    SaveRecord {
        version: Some(SAVE_VERSION),
        wallet_address: wallet_address.map(str::to_string),
        balance: state.balance,
        generators: state.owned.clone(),
        last_claim_time: Some(state.last_claim_ms),
        total_earned: state.total_earned,
        production_rate: state.production_rate,
    }
}

/// Rebuild a [`PlayerState`] from a typed record, normalising what it must.
pub fn apply_save(record: &SaveRecord, catalog: &Catalog, now_ms: i64) -> Loaded {
    let mut repaired = Vec::new();
    let version = record.version.unwrap_or(1);

    if version < MIN_COMPATIBLE_VERSION {
        return Loaded {
            state: PlayerState::new(catalog, now_ms),
            wallet_address: record.wallet_address.clone(),
            version,
            quality: LoadQuality::Discarded,
        };
    }

    let mut state = PlayerState::new(catalog, now_ms);

    state.balance = non_negative(record.balance, "balance", &mut repaired);
    state.total_earned = non_negative(record.total_earned, "totalEarned", &mut repaired);

    if record.generators.len() != catalog.len() {
        repaired.push("generators");
    }
    for (slot, &count) in state.owned.iter_mut().zip(&record.generators) {
        *slot = count;
    }

    match record.last_claim_time {
        Some(ms) => state.last_claim_ms = ms,
        None => repaired.push("lastClaimTime"),
    }

    state.recompute_production_rate(catalog);
    if state.production_rate != record.production_rate {
        repaired.push("productionRate");
    }

    let quality = if repaired.is_empty() {
        LoadQuality::Clean
    } else {
        LoadQuality::Repaired(repaired)
    };

    Loaded {
        state,
        wallet_address: record.wallet_address.clone(),
        version,
        quality,
    }
}

/// Serialize `state` to its JSON record.
pub fn serialize(
    state: &PlayerState,
    wallet_address: Option<&str>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&extract_save(state, wallet_address))
}

/// Parse a JSON record loosely. See the module docs for the fallback rules.
pub fn deserialize(text: &str, catalog: &Catalog, now_ms: i64) -> Loaded {
    let object = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        _ => {
            return Loaded {
                state: PlayerState::new(catalog, now_ms),
                wallet_address: None,
                version: 0,
                quality: LoadQuality::Discarded,
            }
        }
    };

    let (record, mut invalid) = record_from_object(&object);
    let mut loaded = apply_save(&record, catalog, now_ms);

    if !invalid.is_empty() {
        loaded.quality = match loaded.quality {
            LoadQuality::Clean => LoadQuality::Repaired(invalid),
            LoadQuality::Repaired(mut fields) => {
                invalid.retain(|f| !fields.contains(f));
                fields.extend(invalid);
                LoadQuality::Repaired(fields)
            }
            LoadQuality::Discarded => LoadQuality::Discarded,
        };
    }
    loaded
}

/// Read each field independently. Returns the record and the fields that
/// were missing or had the wrong type.
fn record_from_object(object: &Map<String, Value>) -> (SaveRecord, Vec<&'static str>) {
    let mut invalid = Vec::new();

    let balance = read_f64(object, "balance", &mut invalid);
    let total_earned = read_f64(object, "totalEarned", &mut invalid);
    let production_rate = read_f64(object, "productionRate", &mut invalid);

    let generators = match object.get("generators").and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .map(|v| {
                as_count(v).unwrap_or_else(|| {
                    if !invalid.contains(&"generators") {
                        invalid.push("generators");
                    }
                    0
                })
            })
            .collect(),
        None => {
            invalid.push("generators");
            Vec::new()
        }
    };

    // lastClaimTime のデフォルトは apply_save 側 (None → ロード時刻)。
    let last_claim_time = object.get("lastClaimTime").and_then(as_millis);

    let version = object
        .get("version")
        .and_then(Value::as_u64)
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX));

    let wallet_address = object
        .get("walletAddress")
        .and_then(Value::as_str)
        .map(str::to_string);

    (
        SaveRecord {
            version,
            wallet_address,
            balance,
            generators,
            last_claim_time,
            total_earned,
            production_rate,
        },
        invalid,
    )
}

fn read_f64(object: &Map<String, Value>, key: &'static str, invalid: &mut Vec<&'static str>) -> f64 {
    match object.get(key).and_then(Value::as_f64) {
        Some(v) => v,
        None => {
            invalid.push(key);
            0.0
        }
    }
}

/// Non-negative integer count. Accepts `3` and `3.0`.
fn as_count(v: &Value) -> Option<u32> {
    if let Some(n) = v.as_u64() {
        return Some(u32::try_from(n).unwrap_or(u32::MAX));
    }
    let f = v.as_f64()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 {
        Some(f.min(u32::MAX as f64) as u32)
    } else {
        None
    }
}

fn as_millis(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    let f = v.as_f64()?;
    f.is_finite().then(|| f as i64)
}

fn non_negative(v: f64, field: &'static str, repaired: &mut Vec<&'static str>) -> f64 {
    if v.is_finite() && v >= 0.0 {
        v
    } else {
        repaired.push(field);
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::logic;

    fn played_state(catalog: &Catalog) -> PlayerState {
        let mut state = PlayerState::fresh(catalog, 1_700_000_000_000, 50.0);
        logic::purchase(&mut state, catalog, 0).unwrap();
        logic::purchase(&mut state, catalog, 0).unwrap();
        logic::claim(&mut state, 1_700_000_123_456, 0.01).unwrap();
        state
    }

    #[test]
    fn extract_and_apply_roundtrip() {
        let catalog = Catalog::reference();
        let played = played_state(&catalog);
        let json = serialize(&played, Some("Wallet1")).unwrap();

        let loaded = deserialize(&json, &catalog, 0);
        assert_eq!(loaded.quality, LoadQuality::Clean);
        assert_eq!(loaded.version, SAVE_VERSION);
        assert_eq!(loaded.wallet_address.as_deref(), Some("Wallet1"));
        assert_eq!(loaded.state, played);
    }

    #[test]
    fn record_uses_camel_case_layout() {
        let catalog = Catalog::reference();
        let state = played_state(&catalog);
        let value: Value = serde_json::from_str(&serialize(&state, None).unwrap()).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["balance", "generators", "lastClaimTime", "totalEarned", "productionRate"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert!(!obj.contains_key("walletAddress"));
        assert_eq!(obj["generators"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn unversioned_layout_loads() {
        let catalog = Catalog::reference();
        let json = r#"{
            "walletAddress": "AbC123",
            "balance": 140.5,
            "generators": [2, 1, 0, 0, 0],
            "lastClaimTime": 1700000000000,
            "totalEarned": 300.25,
            "productionRate": 17
        }"#;
        let loaded = deserialize(json, &catalog, 0);
        assert_eq!(loaded.quality, LoadQuality::Clean);
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.state.owned, vec![2, 1, 0, 0, 0]);
        assert!((loaded.state.production_rate - 17.0).abs() < 0.001);
        assert_eq!(loaded.state.last_claim_ms, 1_700_000_000_000);
    }

    #[test]
    fn missing_fields_default() {
        let catalog = Catalog::reference();
        let loaded = deserialize(r#"{ "balance": 75.0 }"#, &catalog, 9_000);
        assert!((loaded.state.balance - 75.0).abs() < 0.001);
        assert_eq!(loaded.state.owned, vec![0; 5]);
        assert_eq!(loaded.state.total_earned, 0.0);
        assert_eq!(loaded.state.production_rate, 0.0);
        // Missing clock anchors at load time, not the epoch.
        assert_eq!(loaded.state.last_claim_ms, 9_000);
        match loaded.quality {
            LoadQuality::Repaired(fields) => {
                assert!(fields.contains(&"generators"));
                assert!(fields.contains(&"lastClaimTime"));
                assert!(fields.contains(&"totalEarned"));
            }
            other => panic!("expected Repaired, got {other:?}"),
        }
    }

    #[test]
    fn stale_production_rate_is_recomputed() {
        let catalog = Catalog::reference();
        let json = r#"{
            "balance": 0,
            "generators": [1, 1, 0, 0, 0],
            "lastClaimTime": 0,
            "totalEarned": 0,
            "productionRate": 999999
        }"#;
        let loaded = deserialize(json, &catalog, 0);
        assert!((loaded.state.production_rate - 16.0).abs() < 0.001);
        assert_eq!(loaded.quality, LoadQuality::Repaired(vec!["productionRate"]));
    }

    #[test]
    fn invalid_field_types_default_individually() {
        let catalog = Catalog::reference();
        let json = r#"{
            "balance": "lots",
            "generators": [3, "x", 1.0, -2],
            "lastClaimTime": 5000,
            "totalEarned": 12.5,
            "productionRate": null
        }"#;
        let loaded = deserialize(json, &catalog, 0);
        assert_eq!(loaded.state.balance, 0.0);
        assert_eq!(loaded.state.owned, vec![3, 0, 1, 0, 0]);
        assert!((loaded.state.total_earned - 12.5).abs() < 0.001);
        assert_eq!(loaded.state.last_claim_ms, 5_000);
        assert!(loaded.state.production_rate_is_consistent(&catalog));
        assert!(matches!(loaded.quality, LoadQuality::Repaired(_)));
    }

    #[test]
    fn negative_balance_is_clamped() {
        let catalog = Catalog::reference();
        let record = SaveRecord {
            balance: -20.0,
            generators: vec![0; 5],
            last_claim_time: Some(0),
            ..SaveRecord::default()
        };
        let loaded = apply_save(&record, &catalog, 0);
        assert_eq!(loaded.state.balance, 0.0);
        assert_eq!(loaded.quality, LoadQuality::Repaired(vec!["balance"]));
    }

    #[test]
    fn long_generator_list_is_truncated() {
        let catalog = Catalog::reference();
        let json = r#"{ "generators": [1, 1, 1, 1, 1, 7, 7], "lastClaimTime": 0,
                        "balance": 0, "totalEarned": 0, "productionRate": 35596 }"#;
        let loaded = deserialize(json, &catalog, 0);
        assert_eq!(loaded.state.owned, vec![1, 1, 1, 1, 1]);
        assert_eq!(loaded.quality, LoadQuality::Repaired(vec!["generators"]));
    }

    #[test]
    fn garbage_is_discarded() {
        let catalog = Catalog::reference();
        for text in ["", "not json", "[1,2,3]", "42", "null"] {
            let loaded = deserialize(text, &catalog, 77);
            assert_eq!(loaded.quality, LoadQuality::Discarded, "input: {text:?}");
            assert_eq!(loaded.state, PlayerState::new(&catalog, 77));
        }
    }

    #[test]
    fn version_below_min_compatible_is_discarded() {
        let catalog = Catalog::reference();
        let json = r#"{ "version": 0, "balance": 1000 }"#;
        let loaded = deserialize(json, &catalog, 0);
        assert_eq!(loaded.quality, LoadQuality::Discarded);
        assert_eq!(loaded.state.balance, 0.0);
    }

    #[test]
    fn unknown_fields_in_json_are_ignored() {
        let catalog = Catalog::reference();
        let json = r#"{
            "version": 1,
            "balance": 100.0,
            "generators": [0, 0, 0, 0, 0],
            "lastClaimTime": 0,
            "totalEarned": 0,
            "productionRate": 0,
            "futureUnknownField": "should be ignored"
        }"#;
        let loaded = deserialize(json, &catalog, 0);
        assert_eq!(loaded.quality, LoadQuality::Clean);
        assert!((loaded.state.balance - 100.0).abs() < 0.001);
    }
}
