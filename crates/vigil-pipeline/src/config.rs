//! Application configuration.
//!
//! Four frozen documents: venues (with instruments), alert definitions
//! and thresholds, feature flags, and storage tuning. The file is read
//! once at startup; reloads are deliberate restarts. Environment
//! variables supply the store locations (`VIGIL_COLD_DIR`) and the log
//! level (`VIGIL_LOG`).

use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use vigil_core::{
    AlertDefinition, AlertPriority, AlertSeverity, Comparison, InstrumentId, MarketKey,
    MetricName, Threshold, ThresholdBook, VenueId,
};
use vigil_detector::DetectorConfig;
use vigil_metrics::{EngineConfig, PairKind, PairSpec, ZScoreConfig};
use vigil_venue::VenueConfig;

/// One alert definition as written in the config file. The metric is the
/// snake_case wire name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionDoc {
    pub alert_type: String,
    pub metric: String,
    pub priority: AlertPriority,
    pub severity: AlertSeverity,
    pub comparison: Comparison,
    #[serde(default)]
    pub requires_zscore: bool,
    #[serde(default)]
    pub persistence_secs: Option<u64>,
    #[serde(default = "default_throttle_secs")]
    pub throttle_secs: u64,
    #[serde(default)]
    pub escalate_after_secs: Option<u64>,
    #[serde(default)]
    pub escalate_to: Option<AlertPriority>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_throttle_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl DefinitionDoc {
    fn to_definition(&self) -> AppResult<AlertDefinition> {
        let metric: MetricName = self
            .metric
            .parse()
            .map_err(|_| AppError::Config(format!("{}: unknown metric {}", self.alert_type, self.metric)))?;
        Ok(AlertDefinition {
            alert_type: self.alert_type.clone(),
            metric,
            priority: self.priority,
            severity: self.severity,
            comparison: self.comparison,
            requires_zscore: self.requires_zscore,
            persistence_secs: self.persistence_secs,
            throttle_secs: self.throttle_secs,
            escalate_after_secs: self.escalate_after_secs,
            escalate_to: self.escalate_to,
            enabled: self.enabled,
        })
    }
}

/// One threshold row: exact instrument or `*` wildcard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdDoc {
    pub alert_type: String,
    #[serde(default = "default_wildcard")]
    pub instrument: String,
    pub value: Decimal,
    #[serde(default)]
    pub zscore: Option<Decimal>,
    #[serde(default)]
    pub priority_override: Option<AlertPriority>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_wildcard() -> String {
    "*".to_string()
}

/// Alert configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Empty means the built-in catalogue.
    #[serde(default)]
    pub definitions: Vec<DefinitionDoc>,
    #[serde(default)]
    pub thresholds: Vec<ThresholdDoc>,
    #[serde(default = "default_resolve_timeout_secs")]
    pub resolve_timeout_secs: u64,
    /// Notification channels per priority.
    #[serde(default)]
    pub channels: HashMap<AlertPriority, Vec<String>>,
}

fn default_resolve_timeout_secs() -> u64 {
    900
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            definitions: Vec::new(),
            thresholds: Vec::new(),
            resolve_timeout_secs: default_resolve_timeout_secs(),
            channels: HashMap::new(),
        }
    }
}

/// A basis or cross-venue divergence pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairDoc {
    pub kind: PairKind,
    pub left_venue: String,
    pub left_instrument: String,
    pub right_venue: String,
    pub right_instrument: String,
}

impl PairDoc {
    fn to_spec(&self) -> AppResult<PairSpec> {
        let parse_venue = |s: &str| -> AppResult<VenueId> {
            s.parse()
                .map_err(|_| AppError::Config(format!("unknown venue in pair: {s}")))
        };
        Ok(PairSpec {
            kind: self.kind,
            left: MarketKey::new(
                parse_venue(&self.left_venue)?,
                InstrumentId::new(self.left_instrument.clone()),
            ),
            right: MarketKey::new(
                parse_venue(&self.right_venue)?,
                InstrumentId::new(self.right_instrument.clone()),
            ),
        })
    }
}

/// Feature flags: z-score tuning, depth windows, pair wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub zscore: ZScoreConfig,
    #[serde(default = "default_depth_windows")]
    pub depth_windows_bps: Vec<u32>,
    #[serde(default = "default_imbalance_window")]
    pub imbalance_window_bps: u32,
    #[serde(default = "default_pair_staleness_ms")]
    pub pair_staleness_ms: u64,
    /// Wire names of metrics that get rolling z-scores.
    #[serde(default = "default_tracked_metrics")]
    pub tracked_metrics: Vec<String>,
    #[serde(default)]
    pub pairs: Vec<PairDoc>,
}

fn default_depth_windows() -> Vec<u32> {
    vec![5, 10, 25]
}

fn default_imbalance_window() -> u32 {
    10
}

fn default_pair_staleness_ms() -> u64 {
    5_000
}

fn default_tracked_metrics() -> Vec<String> {
    vec![
        "spread_bps".to_string(),
        "imbalance".to_string(),
        "basis_bps".to_string(),
        "mark_index_dev_bps".to_string(),
        "divergence_bps".to_string(),
    ]
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            zscore: ZScoreConfig::default(),
            depth_windows_bps: default_depth_windows(),
            imbalance_window_bps: default_imbalance_window(),
            pair_staleness_ms: default_pair_staleness_ms(),
            tracked_metrics: default_tracked_metrics(),
            pairs: Vec::new(),
        }
    }
}

/// Storage tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Overridden by `VIGIL_COLD_DIR`.
    #[serde(default = "default_cold_dir")]
    pub cold_dir: String,
    #[serde(default = "default_cold_batch_size")]
    pub cold_batch_size: usize,
    #[serde(default = "default_cold_flush_interval_ms")]
    pub cold_flush_interval_ms: u64,
    #[serde(default = "default_zscore_buffer_cap")]
    pub zscore_buffer_cap: usize,
    #[serde(default = "default_gap_list_cap")]
    pub gap_list_cap: usize,
}

fn default_cold_dir() -> String {
    "./data/cold".to_string()
}

fn default_cold_batch_size() -> usize {
    30
}

fn default_cold_flush_interval_ms() -> u64 {
    1_000
}

fn default_zscore_buffer_cap() -> usize {
    300
}

fn default_gap_list_cap() -> usize {
    100
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cold_dir: default_cold_dir(),
            cold_batch_size: default_cold_batch_size(),
            cold_flush_interval_ms: default_cold_flush_interval_ms(),
            zscore_buffer_cap: default_zscore_buffer_cap(),
            gap_list_cap: default_gap_list_cap(),
        }
    }
}

/// Bounded channel capacities. Overflow policy is fixed per channel at
/// construction: hot projections drop, everything else backpressures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelCaps {
    #[serde(default = "default_adapter_cap")]
    pub adapter_to_engine: usize,
    #[serde(default = "default_adapter_cap")]
    pub engine_to_detector: usize,
    #[serde(default = "default_storage_cap")]
    pub detector_to_storage: usize,
    #[serde(default = "default_storage_cap")]
    pub hot_projection: usize,
}

fn default_adapter_cap() -> usize {
    1024
}

fn default_storage_cap() -> usize {
    4096
}

impl Default for ChannelCaps {
    fn default() -> Self {
        Self {
            adapter_to_engine: default_adapter_cap(),
            engine_to_detector: default_adapter_cap(),
            detector_to_storage: default_storage_cap(),
            hot_projection: default_storage_cap(),
        }
    }
}

/// The frozen application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub channels: ChannelCaps,
    #[serde(default = "default_shutdown_deadline_secs")]
    pub shutdown_deadline_secs: u64,
}

fn default_shutdown_deadline_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            venues: Vec::new(),
            alerts: AlertsConfig::default(),
            features: FeatureFlags::default(),
            storage: StorageConfig::default(),
            channels: ChannelCaps::default(),
            shutdown_deadline_secs: default_shutdown_deadline_secs(),
        }
    }
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            return Err(AppError::Config(format!("config file not found: {path}")));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read config: {e}")))?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("failed to parse config: {e}")))?;

        if let Ok(dir) = std::env::var("VIGIL_COLD_DIR") {
            config.storage.cold_dir = dir;
        }
        Ok(config)
    }

    /// Build the detector configuration from the alert documents.
    pub fn detector_config(&self) -> AppResult<DetectorConfig> {
        let definitions = if self.alerts.definitions.is_empty() {
            vigil_detector::default_definitions()
        } else {
            self.alerts
                .definitions
                .iter()
                .map(|doc| doc.to_definition())
                .collect::<AppResult<Vec<_>>>()?
        };

        let known: HashSet<&str> = definitions.iter().map(|d| d.alert_type.as_str()).collect();
        for threshold in &self.alerts.thresholds {
            if !known.contains(threshold.alert_type.as_str()) {
                return Err(AppError::Config(format!(
                    "threshold references unknown alert type: {}",
                    threshold.alert_type
                )));
            }
        }

        let thresholds = ThresholdBook::new(
            self.alerts
                .thresholds
                .iter()
                .map(|doc| Threshold {
                    alert_type: doc.alert_type.clone(),
                    instrument: doc.instrument.clone(),
                    value: doc.value,
                    zscore: doc.zscore,
                    priority_override: doc.priority_override,
                    enabled: doc.enabled,
                })
                .collect(),
        );

        let mut config = DetectorConfig {
            definitions,
            thresholds,
            resolve_timeout_secs: self.alerts.resolve_timeout_secs,
            persistence_clear_gap_ms: self.features.zscore.reset_on_gap_ms,
            ..Default::default()
        };
        if !self.alerts.channels.is_empty() {
            config.channels = self.alerts.channels.clone();
        }
        config.validate()?;
        Ok(config)
    }

    /// Build the metrics engine configuration from the feature flags.
    pub fn engine_config(&self) -> AppResult<EngineConfig> {
        let tracked = self
            .features
            .tracked_metrics
            .iter()
            .map(|name| {
                name.parse::<MetricName>()
                    .map_err(|_| AppError::Config(format!("unknown tracked metric: {name}")))
            })
            .collect::<AppResult<HashSet<_>>>()?;

        let pairs = self
            .features
            .pairs
            .iter()
            .map(|doc| doc.to_spec())
            .collect::<AppResult<Vec<_>>>()?;

        let config = EngineConfig {
            depth_windows_bps: self.features.depth_windows_bps.clone(),
            imbalance_window_bps: self.features.imbalance_window_bps,
            pair_staleness_ms: self.features.pair_staleness_ms,
            tracked,
            zscore: self.features.zscore.clone(),
            pairs,
        };
        config.validate()?;
        Ok(config)
    }

    /// Throttle seconds per alert type, used as dedup-marker TTLs.
    pub fn dedup_ttls(&self) -> AppResult<HashMap<String, u64>> {
        Ok(self
            .detector_config()?
            .definitions
            .iter()
            .map(|d| (d.alert_type.clone(), d.throttle_secs))
            .collect())
    }

    /// Whole-document validation; called once before anything spawns.
    pub fn validate(&self) -> AppResult<()> {
        if self.venues.is_empty() {
            return Err(AppError::Config("no venues configured".to_string()));
        }
        for venue in &self.venues {
            if venue.instruments.is_empty() {
                return Err(AppError::Config(format!(
                    "venue {} has no instruments",
                    venue.venue
                )));
            }
        }
        self.detector_config()?;
        self.engine_config()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[venues]]
        venue = "binance"
        ws_url = "wss://stream.binance.com:9443"
        rest_url = "https://api.binance.com"

        [[venues.instruments]]
        id = "BTC-USDT"
        venue_symbol = "BTCUSDT"
        streams = ["depth20@100ms", "ticker"]

        [[alerts.thresholds]]
        alert_type = "spread_warning"
        value = "3"
        zscore = "2.0"
    "#;

    #[test]
    fn test_minimal_config_parses_and_validates() {
        let config: AppConfig = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.venues.len(), 1);
        assert_eq!(config.channels.adapter_to_engine, 1024);
        assert_eq!(config.channels.detector_to_storage, 4096);
        assert_eq!(config.storage.cold_batch_size, 30);
        assert_eq!(config.shutdown_deadline_secs, 30);

        // Empty definitions -> built-in catalogue.
        let detector = config.detector_config().unwrap();
        assert!(detector
            .definitions
            .iter()
            .any(|d| d.alert_type == "data_gap"));
    }

    #[test]
    fn test_unknown_threshold_type_rejected() {
        let mut config: AppConfig = toml::from_str(MINIMAL).unwrap();
        config.alerts.thresholds[0].alert_type = "nonsense".to_string();
        assert!(matches!(
            config.validate(),
            Err(AppError::Config(msg)) if msg.contains("nonsense")
        ));
    }

    #[test]
    fn test_unknown_tracked_metric_rejected() {
        let mut config: AppConfig = toml::from_str(MINIMAL).unwrap();
        config.features.tracked_metrics.push("vwap".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_no_venues_rejected() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_definition_doc_round_trip() {
        let config: AppConfig = toml::from_str(
            r#"
            [[venues]]
            venue = "okx"
            ws_url = "wss://ws.okx.com:8443/ws/v5/public"
            rest_url = "https://www.okx.com"

            [[venues.instruments]]
            id = "BTC-USDT-PERP"
            venue_symbol = "BTC-USDT-SWAP"
            streams = ["books5"]

            [[alerts.definitions]]
            alert_type = "wide_spread"
            metric = "spread_bps"
            priority = "P2"
            severity = "warning"
            comparison = "gt"
            requires_zscore = true
            escalate_after_secs = 300
            escalate_to = "P1"

            [[alerts.thresholds]]
            alert_type = "wide_spread"
            instrument = "BTC-USDT-PERP"
            value = "5"
            zscore = "2.5"
            priority_override = "P1"
            "#,
        )
        .unwrap();

        let detector = config.detector_config().unwrap();
        assert_eq!(detector.definitions.len(), 1);
        let def = &detector.definitions[0];
        assert_eq!(def.metric, MetricName::SpreadBps);
        assert_eq!(def.escalate_to, Some(AlertPriority::P1));

        let threshold = detector
            .thresholds
            .resolve("wide_spread", &InstrumentId::new("BTC-USDT-PERP"))
            .unwrap();
        assert_eq!(threshold.priority_override, Some(AlertPriority::P1));
    }

    #[test]
    fn test_pair_doc_builds_spec() {
        let config: AppConfig = toml::from_str(
            r#"
            [[venues]]
            venue = "binance"
            ws_url = "wss://stream.binance.com:9443"
            rest_url = "https://api.binance.com"

            [[venues.instruments]]
            id = "BTC-USDT"
            venue_symbol = "BTCUSDT"
            streams = ["depth20@100ms"]

            [[features.pairs]]
            kind = "basis"
            left_venue = "okx"
            left_instrument = "BTC-USDT-PERP"
            right_venue = "binance"
            right_instrument = "BTC-USDT"
            "#,
        )
        .unwrap();

        let engine = config.engine_config().unwrap();
        assert_eq!(engine.pairs.len(), 1);
        assert_eq!(engine.pairs[0].kind, PairKind::Basis);
        assert_eq!(engine.pairs[0].left.venue, VenueId::Okx);
    }
}
