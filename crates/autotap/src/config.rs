//! Engine configuration
//!
//! Values come from, in increasing priority: built-in defaults, a JSON file,
//! `AUTOTAP_*` environment variables, and whatever the caller sets last.

use crate::gesture::{DEFAULT_GESTURE_TIMEOUT, DEFAULT_TAP_DURATION};
use crate::scheduler::{SchedulerTiming, DEFAULT_DEBOUNCE, DEFAULT_SCAN_INTERVAL};
use crate::walker::DEFAULT_MAX_DEPTH;
use crate::AutomationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoTapConfig {
    /// Delay between the end of one scan and the start of the next
    pub scan_interval_ms: u64,
    /// Quiet period after a UI-change notification before rescanning
    pub debounce_ms: u64,
    /// Delay before the first scan after start. Default: 0 (scan immediately)
    pub initial_delay_ms: u64,
    /// Time between touch-down and touch-up of a tap
    pub tap_duration_ms: u64,
    /// How long to wait for the host to report a gesture's outcome
    pub gesture_timeout_ms: u64,
    /// Maximum tree depth to search, also bounds ancestor walks
    pub max_depth: usize,
}

impl Default for AutoTapConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: DEFAULT_SCAN_INTERVAL.as_millis() as u64,
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            initial_delay_ms: 0,
            tap_duration_ms: DEFAULT_TAP_DURATION.as_millis() as u64,
            gesture_timeout_ms: DEFAULT_GESTURE_TIMEOUT.as_millis() as u64,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl AutoTapConfig {
    /// Parse a config file. The top level must be a JSON object.
    pub fn from_json(json: &str) -> Result<Self, AutomationError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| AutomationError::InvalidArgument(format!("Invalid config JSON: {e}")))?;
        if !value.is_object() {
            return Err(AutomationError::InvalidArgument(
                "Config JSON must be an object".to_string(),
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| AutomationError::InvalidArgument(format!("Invalid config JSON: {e}")))
    }

    /// Defaults overridden by `AUTOTAP_*` environment variables.
    pub fn from_env() -> Result<Self, AutomationError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `AUTOTAP_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), AutomationError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from any key lookup using the environment variable names.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), AutomationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_field(&lookup, "AUTOTAP_SCAN_INTERVAL_MS", &mut self.scan_interval_ms)?;
        override_field(&lookup, "AUTOTAP_DEBOUNCE_MS", &mut self.debounce_ms)?;
        override_field(&lookup, "AUTOTAP_INITIAL_DELAY_MS", &mut self.initial_delay_ms)?;
        override_field(&lookup, "AUTOTAP_TAP_DURATION_MS", &mut self.tap_duration_ms)?;
        override_field(&lookup, "AUTOTAP_GESTURE_TIMEOUT_MS", &mut self.gesture_timeout_ms)?;
        override_field(&lookup, "AUTOTAP_MAX_DEPTH", &mut self.max_depth)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AutomationError> {
        let positive = [
            ("scan_interval_ms", self.scan_interval_ms),
            ("debounce_ms", self.debounce_ms),
            ("tap_duration_ms", self.tap_duration_ms),
            ("gesture_timeout_ms", self.gesture_timeout_ms),
            ("max_depth", self.max_depth as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(AutomationError::InvalidArgument(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }

    pub fn timing(&self) -> SchedulerTiming {
        SchedulerTiming {
            interval: Duration::from_millis(self.scan_interval_ms),
            debounce: Duration::from_millis(self.debounce_ms),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
        }
    }

    pub fn tap_duration(&self) -> Duration {
        Duration::from_millis(self.tap_duration_ms)
    }

    pub fn gesture_timeout(&self) -> Duration {
        Duration::from_millis(self.gesture_timeout_ms)
    }
}

fn override_field<F, T>(lookup: &F, key: &str, field: &mut T) -> Result<(), AutomationError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *field = raw
            .trim()
            .parse()
            .map_err(|e| AutomationError::InvalidArgument(format!("{key}={raw:?}: {e}")))?;
    }
    Ok(())
}
