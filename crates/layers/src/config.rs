use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::color::ColorModel;
use crate::error::SourceError;

/// Store tuning. Every field has a default, so `{}` is a valid config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Debounce interval of the ingestion and eviction timers.
    pub batch_delay_ms: u64,
    /// Max records finalized per timer firing; forced flushes ignore it.
    pub flush_budget: Option<u32>,
    /// Removals above this count rebuild the R-tree.
    pub bulk_remove_threshold: usize,
    pub replace_duplicates: bool,
    pub fade_enabled: bool,
    /// Capacity alerts are raised at most once per window.
    pub alert_window_ms: u64,
    /// Populate `LAT`/`LON` attributes for point records.
    pub derive_coordinate_fields: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            batch_delay_ms: 250,
            flush_budget: None,
            bulk_remove_threshold: 10_000,
            replace_duplicates: true,
            fade_enabled: false,
            alert_window_ms: 5_000,
            derive_coordinate_fields: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AltitudeMode {
    #[default]
    ClampToGround,
    RelativeToGround,
    Absolute,
}

/// Persisted per-layer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    pub shape_name: String,
    pub center_shape_name: Option<String>,
    pub time_enabled: bool,
    pub altitude_mode: AltitudeMode,
    /// Seconds between provider refreshes; 0 disables refresh.
    pub refresh_interval: u64,
    pub color_model: Option<ColorModel>,
    pub unique_id: Option<String>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            shape_name: "Default".to_string(),
            center_shape_name: None,
            time_enabled: true,
            altitude_mode: AltitudeMode::default(),
            refresh_interval: 0,
            color_model: None,
            unique_id: None,
        }
    }
}

impl LayerConfig {
    /// Writes every persisted key into `opt_to` (or a fresh map), leaving
    /// unrelated keys in place.
    pub fn persist(&self, opt_to: Option<Map<String, Value>>) -> Map<String, Value> {
        let mut out = opt_to.unwrap_or_default();
        if let Ok(Value::Object(fields)) = serde_json::to_value(self) {
            out.extend(fields);
        }
        out
    }

    /// Applies the persisted keys present in `config`. Missing keys keep
    /// their current value; a key with the wrong shape fails the restore
    /// and leaves `self` unchanged.
    pub fn restore(&mut self, config: &Value) -> Result<(), SourceError> {
        let Value::Object(map) = config else {
            return Err(SourceError::ConfigNotObject);
        };
        let mut next = self.clone();
        read_key(map, "shapeName", &mut next.shape_name)?;
        read_key(map, "centerShapeName", &mut next.center_shape_name)?;
        read_key(map, "timeEnabled", &mut next.time_enabled)?;
        read_key(map, "altitudeMode", &mut next.altitude_mode)?;
        read_key(map, "refreshInterval", &mut next.refresh_interval)?;
        read_key(map, "colorModel", &mut next.color_model)?;
        read_key(map, "uniqueId", &mut next.unique_id)?;
        *self = next;
        Ok(())
    }
}

fn read_key<T: serde::de::DeserializeOwned>(
    map: &Map<String, Value>,
    key: &'static str,
    slot: &mut T,
) -> Result<(), SourceError> {
    if let Some(v) = map.get(key) {
        *slot = serde_json::from_value(v.clone())
            .map_err(|source| SourceError::ConfigKey { key, source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{AltitudeMode, LayerConfig, SourceConfig};
    use crate::color::ColorModel;
    use crate::error::SourceError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn source_config_defaults_fill_missing_fields() {
        let c: SourceConfig = serde_json::from_str(r#"{"batch_delay_ms": 50}"#).expect("decode");
        assert_eq!(c.batch_delay_ms, 50);
        assert_eq!(c.bulk_remove_threshold, 10_000);
        assert!(c.replace_duplicates);
    }

    #[test]
    fn persist_writes_camel_case_keys_and_keeps_others() {
        let mut cfg = LayerConfig::default();
        cfg.unique_id = Some("MMSI".into());
        let mut base = serde_json::Map::new();
        base.insert("title".into(), json!("Ships"));

        let out = cfg.persist(Some(base));
        assert_eq!(out.get("title"), Some(&json!("Ships")));
        assert_eq!(out.get("shapeName"), Some(&json!("Default")));
        assert_eq!(out.get("timeEnabled"), Some(&json!(true)));
        assert_eq!(out.get("altitudeMode"), Some(&json!("clampToGround")));
        assert_eq!(out.get("uniqueId"), Some(&json!("MMSI")));
        assert!(out.contains_key("centerShapeName"));
        assert!(out.contains_key("refreshInterval"));
        assert!(out.contains_key("colorModel"));
    }

    #[test]
    fn restore_round_trips() {
        let mut cfg = LayerConfig::default();
        cfg.shape_name = "Ellipse".into();
        cfg.time_enabled = false;
        cfg.altitude_mode = AltitudeMode::Absolute;
        cfg.color_model = Some(ColorModel::bins("alt", 100.0));
        cfg.unique_id = Some("id".into());

        let persisted = serde_json::Value::Object(cfg.persist(None));
        let mut fresh = LayerConfig::default();
        fresh.restore(&persisted).expect("restore");
        assert_eq!(fresh, cfg);
    }

    #[test]
    fn restore_rejects_bad_shapes_atomically() {
        let mut cfg = LayerConfig::default();
        let err = cfg
            .restore(&json!({"shapeName": "Icon", "altitudeMode": "sideways"}))
            .expect_err("bad enum");
        assert!(matches!(err, SourceError::ConfigKey { key: "altitudeMode", .. }));
        assert_eq!(cfg, LayerConfig::default());
        assert!(matches!(
            cfg.restore(&json!([1, 2])),
            Err(SourceError::ConfigNotObject)
        ));
    }
}
