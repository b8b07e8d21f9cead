use std::{env, fs, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::{parse_hour_stamp, LatLng, Operator, ThresholdRule, TimeWindow};

const CONFIG_PATH_VAR: &str = "MAPSHADE_CONFIG";
const API_URL_VAR: &str = "MAPSHADE_API_URL";
const METRIC_VAR: &str = "MAPSHADE_METRIC";
const TIMEOUT_VAR: &str = "MAPSHADE_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSettings {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub known_sources: Vec<String>,
    pub metric: String,
    pub timezone: String,
    pub api_base_url: String,
    pub fetch_timeout_secs: u64,
    pub fallback_color: String,
    pub default_rules: Vec<ThresholdRule>,
    pub new_rule_template: ThresholdRule,
    /// `[lat, lng]` the map returns to when there is nothing to fit.
    pub map_center: [f64; 2],
    pub timeline_base: String,
    pub timeline_max_hours: u32,
    pub default_window: WindowSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            known_sources: vec!["Crop Field".into(), "Waterbody".into()],
            metric: "temperature_2m".into(),
            timezone: "auto".into(),
            api_base_url: "https://api.open-meteo.com/v1/forecast".into(),
            fetch_timeout_secs: 10,
            fallback_color: "purple".into(),
            default_rules: vec![ThresholdRule::new("red", Operator::Lt, 10.0)],
            new_rule_template: ThresholdRule::new("blue", Operator::Ge, 10.0),
            map_center: [17.385044, 78.486671],
            timeline_base: "2025-08-05T00:00".into(),
            timeline_max_hours: 720,
            default_window: WindowSettings {
                start: "2025-08-05T00:00".into(),
                end: "2025-08-05T23:00".into(),
            },
        }
    }
}

impl AppConfig {
    /// Defaults, overlaid by the JSON file named in `MAPSHADE_CONFIG` (if any),
    /// overlaid by the individual env overrides.
    pub fn load() -> Result<Self> {
        let mut config = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// A missing file yields the defaults; a malformed one is an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var(API_URL_VAR) {
            self.api_base_url = url;
        }
        if let Ok(metric) = env::var(METRIC_VAR) {
            self.metric = metric;
        }
        if let Some(secs) = env::var(TIMEOUT_VAR).ok().and_then(|v| v.parse().ok()) {
            self.fetch_timeout_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.known_sources.is_empty() {
            bail!("knownSources must list at least one data source");
        }
        if self.metric.trim().is_empty() {
            bail!("metric must not be empty");
        }
        if self.fetch_timeout_secs == 0 {
            bail!("fetchTimeoutSecs must be greater than zero");
        }
        self.timeline_base()?;
        self.default_window()?;
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn map_center(&self) -> LatLng {
        LatLng::new(self.map_center[0], self.map_center[1])
    }

    pub fn timeline_base(&self) -> Result<NaiveDateTime> {
        parse_hour_stamp(&self.timeline_base).context("invalid timelineBase")
    }

    pub fn default_window(&self) -> Result<TimeWindow> {
        TimeWindow::parse(&self.default_window.start, &self.default_window.end)
            .context("invalid defaultWindow")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.default_window().unwrap().hour_count(), 24);
        assert_eq!(config.map_center(), LatLng::new(17.385044, 78.486671));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"knownSources": ["Orchard"], "defaultRules": [{"color": "green", "operator": ">", "value": 3}]}"#,
        )
        .unwrap();
        assert_eq!(config.known_sources, vec!["Orchard".to_string()]);
        assert_eq!(config.default_rules[0].operator, Operator::Gt);
        assert_eq!(config.metric, "temperature_2m");
        assert_eq!(config.fetch_timeout_secs, 10);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.known_sources.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.fetch_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.default_window = WindowSettings {
            start: "2025-08-05T10:00".into(),
            end: "2025-08-05T09:00".into(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::from_file(Path::new("/nonexistent/mapshade.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
