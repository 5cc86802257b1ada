use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

pub const APPROVAL_REQUIRED_KEY: &str = "UNDERWRITING_APPROVAL_REQUIRED";
pub const DEFAULT_TARGET_DSCR_KEY: &str = "UNDERWRITING_DEFAULT_TARGET_DSCR";
pub const MAX_BATCH_SIZE_KEY: &str = "UNDERWRITING_MAX_BATCH_SIZE";
pub const HISTORY_MONTHS_KEY: &str = "UNDERWRITING_HISTORY_MONTHS";

const FALLBACK_APPROVAL_REQUIRED: bool = true;
const FALLBACK_TARGET_DSCR: Decimal = dec!(1.25);
const FALLBACK_MAX_BATCH_SIZE: usize = 500;
const FALLBACK_HISTORY_MONTHS: u32 = 12;

/// Raw key/value lookup behind [`UnderwritingConfig`].
pub trait SettingsSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSettings;

impl SettingsSource for EnvSettings {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

/// Fixed settings, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct MapSettings(BTreeMap<String, String>);

impl MapSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }
}

impl SettingsSource for MapSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Underwriting knobs. Loaded on every call, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct UnderwritingConfig {
    /// When set, a computed rate that differs from the loan's current rate
    /// waits for reviewer sign-off instead of being applied.
    pub approval_required: bool,
    pub default_target_dscr: Decimal,
    pub max_batch_size: usize,
    pub history_months: u32,
}

impl Default for UnderwritingConfig {
    fn default() -> Self {
        Self {
            approval_required: FALLBACK_APPROVAL_REQUIRED,
            default_target_dscr: FALLBACK_TARGET_DSCR,
            max_batch_size: FALLBACK_MAX_BATCH_SIZE,
            history_months: FALLBACK_HISTORY_MONTHS,
        }
    }
}

impl UnderwritingConfig {
    /// Each value is parsed, checked for positivity and otherwise replaced by
    /// its fallback.
    pub fn load(source: &dyn SettingsSource) -> Self {
        Self {
            approval_required: read_flag(source, APPROVAL_REQUIRED_KEY, FALLBACK_APPROVAL_REQUIRED),
            default_target_dscr: read_positive(
                source,
                DEFAULT_TARGET_DSCR_KEY,
                FALLBACK_TARGET_DSCR,
                |v: &Decimal| *v > Decimal::ZERO,
            ),
            max_batch_size: read_positive(
                source,
                MAX_BATCH_SIZE_KEY,
                FALLBACK_MAX_BATCH_SIZE,
                |v: &usize| *v > 0,
            ),
            history_months: read_positive(
                source,
                HISTORY_MONTHS_KEY,
                FALLBACK_HISTORY_MONTHS,
                |v: &u32| *v > 0,
            ),
        }
    }
}

fn read_flag(source: &dyn SettingsSource, key: &str, fallback: bool) -> bool {
    let Some(raw) = source.get(key) else {
        return fallback;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => {
            warn!(key, value = %raw, "unrecognised flag, using fallback {fallback}");
            fallback
        }
    }
}

fn read_positive<T, F>(source: &dyn SettingsSource, key: &str, fallback: T, is_positive: F) -> T
where
    T: FromStr + std::fmt::Display + Copy,
    F: Fn(&T) -> bool,
{
    let Some(raw) = source.get(key) else {
        return fallback;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if is_positive(&value) => value,
        _ => {
            warn!(key, value = %raw, "invalid setting, using fallback {fallback}");
            fallback
        }
    }
}
