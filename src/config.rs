//! Runtime configuration.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use tracing::warn;

/// Tunables for a session. Every field has a default.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Balance granted on a first connection.
    pub starter_balance: f64,
    /// Smallest pending amount a claim will settle.
    pub min_claim: f64,
    /// Display refresh rate.
    pub ticks_per_sec: u32,
    /// Simulated confirmation latency for purchase/claim.
    pub confirm_delay_ms: i64,
    /// Where `FileStore` keeps saves. `None` = platform data dir.
    pub save_dir: Option<PathBuf>,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            starter_balance: 50.0,
            min_claim: crate::economy::MIN_CLAIM,
            ticks_per_sec: 10,
            confirm_delay_ms: 1_000,
            save_dir: None,
        }
    }
}

impl EconomyConfig {
    /// Defaults overridden by `IDLE_*` variables (a `.env` file is read first).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok());
        config
    }

    /// Apply overrides from a key lookup. Unparsable or out-of-range values
    /// are skipped.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_parsed(&lookup, "IDLE_STARTER_BALANCE", &mut self.starter_balance, |v: &f64| {
            v.is_finite() && *v >= 0.0
        });
        override_parsed(&lookup, "IDLE_MIN_CLAIM", &mut self.min_claim, |v: &f64| {
            v.is_finite() && *v > 0.0
        });
        override_parsed(&lookup, "IDLE_TICKS_PER_SEC", &mut self.ticks_per_sec, |v: &u32| *v > 0);
        override_parsed(&lookup, "IDLE_CONFIRM_DELAY_MS", &mut self.confirm_delay_ms, |v: &i64| {
            *v >= 0
        });
        if let Some(dir) = lookup("IDLE_SAVE_DIR").filter(|d| !d.is_empty()) {
            self.save_dir = Some(PathBuf::from(dir));
        }
    }

    /// Resolved save directory.
    pub fn save_dir(&self) -> PathBuf {
        self.save_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(env::temp_dir)
                .join("idle-economy")
        })
    }
}

fn override_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
    valid: impl Fn(&T) -> bool,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(v) if valid(&v) => *slot = v,
        Ok(_) => warn!(key, value = %raw, "ignoring out-of-range config override"),
        Err(_) => warn!(key, value = %raw, "ignoring unparsable config override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_game() {
        let c = EconomyConfig::default();
        assert!((c.starter_balance - 50.0).abs() < 0.001);
        assert!((c.min_claim - 0.01).abs() < 1e-12);
        assert_eq!(c.ticks_per_sec, 10);
        assert_eq!(c.confirm_delay_ms, 1_000);
    }

    #[test]
    fn overrides_applied() {
        let mut c = EconomyConfig::default();
        c.apply_overrides(lookup_from(&[
            ("IDLE_STARTER_BALANCE", "500"),
            ("IDLE_CONFIRM_DELAY_MS", " 0 "),
            ("IDLE_SAVE_DIR", "/tmp/idle"),
        ]));
        assert!((c.starter_balance - 500.0).abs() < 0.001);
        assert_eq!(c.confirm_delay_ms, 0);
        assert_eq!(c.save_dir(), PathBuf::from("/tmp/idle"));
    }

    #[test]
    fn bad_override_keeps_default() {
        let cases = [
            ("IDLE_TICKS_PER_SEC", "fast"),
            ("IDLE_TICKS_PER_SEC", "0"),
            ("IDLE_MIN_CLAIM", "NaN"),
            ("IDLE_MIN_CLAIM", "inf"),
            ("IDLE_MIN_CLAIM", "0"),
            ("IDLE_MIN_CLAIM", "-1"),
            ("IDLE_STARTER_BALANCE", "NaN"),
            ("IDLE_STARTER_BALANCE", "inf"),
            ("IDLE_STARTER_BALANCE", "-50"),
            ("IDLE_CONFIRM_DELAY_MS", "-1"),
        ];
        for (key, value) in cases {
            let mut c = EconomyConfig::default();
            c.apply_overrides(lookup_from(&[(key, value)]));
            assert_eq!(c, EconomyConfig::default(), "{}={} was applied", key, value);
        }
    }

    #[test]
    fn zero_starter_balance_is_allowed() {
        let mut c = EconomyConfig::default();
        c.apply_overrides(lookup_from(&[("IDLE_STARTER_BALANCE", "0")]));
        assert_eq!(c.starter_balance, 0.0);
    }

    #[test]
    fn deserializes_partial_json() {
        let c: EconomyConfig = serde_json::from_str(r#"{ "starter_balance": 5 }"#).unwrap();
        assert!((c.starter_balance - 5.0).abs() < 0.001);
        assert_eq!(c.ticks_per_sec, 10);
    }
}
