use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::infrastructure::error::CoreError;

const ENGINE_JSON: &str = "engine.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Zone assumed for owners without an explicit timezone.
    pub fallback_timezone: String,
    /// How far back a solidification sweep looks for due occurrences.
    pub solidify_lookback_days: i64,
    /// Horizon for template-level occurrence validation and virtual windows.
    pub max_expansion_window_days: i64,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_timezone: "UTC".to_string(),
            solidify_lookback_days: 35,
            max_expansion_window_days: 370,
            default_page_size: 50,
            max_page_size: 500,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.fallback_timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(format!(
                "engine.fallbackTimezone '{}' is not a known zone",
                self.fallback_timezone
            ));
        }
        if self.solidify_lookback_days <= 0 {
            return Err("engine.solidifyLookbackDays must be > 0".to_string());
        }
        if self.max_expansion_window_days <= 0 {
            return Err("engine.maxExpansionWindowDays must be > 0".to_string());
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err("engine page sizes must be > 0".to_string());
        }
        if self.default_page_size > self.max_page_size {
            return Err("engine.defaultPageSize must not exceed maxPageSize".to_string());
        }
        Ok(())
    }
}

/// Loads the engine config from `config_dir`, writing the defaults on first
/// run so the deployed file is editable in place.
pub fn load_engine_config(config_dir: &Path) -> Result<EngineConfig, CoreError> {
    let path = config_dir.join(ENGINE_JSON);
    if !path.exists() {
        fs::create_dir_all(config_dir)?;
        let defaults = EngineConfig::default();
        fs::write(&path, serde_json::to_string_pretty(&defaults)?)?;
        return Ok(defaults);
    }

    let raw = fs::read_to_string(&path)?;
    let config: EngineConfig = serde_json::from_str(&raw)?;
    config.validate().map_err(CoreError::Validation)?;
    Ok(config)
}
