//! Data models for the weather proxy.
//!
//! Observations arrive as loosely shaped JSON documents from the generator.
//! Everything in here turns those documents into typed values before any
//! storage call is made: one [`MeasurementKind`] per partition, one
//! [`MetricValue`] whose type is checked against the kind, and a UTC
//! timestamp.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::ProxyError;

// ---

/// Timestamp layout used by the generator and the dashboard time range.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fields every observation document must carry, apart from `sensor_name`
/// which is derived when absent.
const REQUIRED_DOCUMENT_FIELDS: [&str; 8] = [
    "time_recorded",
    "latitude",
    "longitude",
    "city",
    "county",
    "state",
    "zip_code",
    "metric",
];

/// The twelve fixed measurement kinds. Each kind is its own storage partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    // ---
    TempC,
    TempF,
    WindMph,
    WindKph,
    WindDegree,
    WindDir,
    PressureMb,
    PressureIn,
    PrecipMm,
    PrecipIn,
    HumidityPerc,
    UvIndexScore,
}

impl MeasurementKind {
    // ---
    pub const ALL: [MeasurementKind; 12] = [
        MeasurementKind::TempC,
        MeasurementKind::TempF,
        MeasurementKind::WindMph,
        MeasurementKind::WindKph,
        MeasurementKind::WindDegree,
        MeasurementKind::WindDir,
        MeasurementKind::PressureMb,
        MeasurementKind::PressureIn,
        MeasurementKind::PrecipMm,
        MeasurementKind::PrecipIn,
        MeasurementKind::HumidityPerc,
        MeasurementKind::UvIndexScore,
    ];

    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            MeasurementKind::TempC => "temp_c",
            MeasurementKind::TempF => "temp_f",
            MeasurementKind::WindMph => "wind_mph",
            MeasurementKind::WindKph => "wind_kph",
            MeasurementKind::WindDegree => "wind_degree",
            MeasurementKind::WindDir => "wind_dir",
            MeasurementKind::PressureMb => "pressure_mb",
            MeasurementKind::PressureIn => "pressure_in",
            MeasurementKind::PrecipMm => "precip_mm",
            MeasurementKind::PrecipIn => "precip_in",
            MeasurementKind::HumidityPerc => "humidity_perc",
            MeasurementKind::UvIndexScore => "uv_index_score",
        }
    }

    /// Wind direction is a compass string; every other kind is numeric.
    pub fn is_textual(&self) -> bool {
        matches!(self, MeasurementKind::WindDir)
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementKind {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        MeasurementKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProxyError::InvalidFormat(format!("unknown measurement kind '{s}'")))
    }
}

/// Unit system selecting which kinds a dashboard query covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnitSystem {
    #[default]
    Metric,
    Customary,
}

impl UnitSystem {
    // ---
    /// Ordered kinds for this system. Unit-neutral kinds appear in both.
    pub fn kinds(&self) -> [MeasurementKind; 8] {
        // ---
        use MeasurementKind::*;
        match self {
            UnitSystem::Metric => [
                TempC,
                WindKph,
                WindDegree,
                WindDir,
                PressureMb,
                PrecipMm,
                HumidityPerc,
                UvIndexScore,
            ],
            UnitSystem::Customary => [
                TempF,
                WindMph,
                WindDegree,
                WindDir,
                PressureIn,
                PrecipIn,
                HumidityPerc,
                UvIndexScore,
            ],
        }
    }

    /// Lenient parse of the dashboard's radio value. Anything that is not
    /// recognisably customary falls back to metric.
    pub fn from_label(label: Option<&str>) -> Self {
        // ---
        match label.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
            Some("customary") | Some("imperial") => UnitSystem::Customary,
            _ => UnitSystem::Metric,
        }
    }
}

/// One metric value. Only `wind_dir` carries text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

/// Wire shape of an observation document before validation.
#[derive(Debug, Deserialize)]
struct ObservationDocument {
    // ---
    sensor_name: Option<String>,
    time_recorded: String,
    latitude: f64,
    longitude: f64,
    city: String,
    county: String,
    state: String,
    #[serde(deserialize_with = "string_or_number")]
    zip_code: String,
    metric: MetricValue,
}

/// A validated, immutable reading for one measurement kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    // ---
    pub sensor_name: String,
    pub time_recorded: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    pub county: String,
    pub state: String,
    pub zip_code: String,
    pub metric: MetricValue,
}

impl Observation {
    // ---
    /// Decode and validate a raw JSON document for `kind`.
    ///
    /// Missing keys are reported as [`ProxyError::MissingField`]; every other
    /// shape problem (wrong types, bad timestamp, metric type not matching
    /// the kind) is [`ProxyError::InvalidFormat`].
    pub fn from_document(kind: MeasurementKind, raw: &str) -> Result<Self, ProxyError> {
        // ---
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ProxyError::InvalidFormat(format!("document is not valid JSON: {e}")))?;

        let Value::Object(map) = value else {
            return Err(ProxyError::InvalidFormat(
                "document must be a JSON object".to_string(),
            ));
        };
        check_required(&map)?;

        let doc: ObservationDocument = serde_json::from_value(Value::Object(map))
            .map_err(|e| ProxyError::InvalidFormat(e.to_string()))?;

        match (&doc.metric, kind.is_textual()) {
            (MetricValue::Number(_), false) | (MetricValue::Text(_), true) => {}
            _ => {
                return Err(ProxyError::InvalidFormat(format!(
                    "metric type does not match measurement kind '{kind}'"
                )))
            }
        }

        let time_recorded = parse_timestamp(&doc.time_recorded)?;
        // The registry tracker buckets by the zip prefix, so a supplied name
        // must agree with the one its own zip and city produce.
        let sensor_name = sensor_name_for(&doc.zip_code, &doc.city);
        if let Some(supplied) = doc.sensor_name.as_deref().map(str::trim) {
            if !supplied.is_empty() && !supplied.eq_ignore_ascii_case(&sensor_name) {
                return Err(ProxyError::InvalidFormat(format!(
                    "sensor_name '{supplied}' does not match zip_code and city ('{sensor_name}')"
                )));
            }
        }

        Ok(Observation {
            sensor_name,
            time_recorded,
            latitude: doc.latitude,
            longitude: doc.longitude,
            city: doc.city,
            county: doc.county,
            state: doc.state,
            zip_code: doc.zip_code,
            metric: doc.metric,
        })
    }

    /// Registry record for the sensor that produced this observation.
    pub fn sensor(&self) -> Sensor {
        // ---
        Sensor {
            sensor_name: self.sensor_name.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            city: self.city.clone(),
            county: self.county.clone(),
            state: self.state.clone(),
            zip_code: self.zip_code.clone(),
        }
    }
}

/// Registry entry for one location-bound observation source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sensor {
    // ---
    pub sensor_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    pub county: String,
    pub state: String,
    pub zip_code: String,
}

/// Most recent value of one sensor for one kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestReading {
    pub sensor_name: String,
    pub latest_value: MetricValue,
}

/// One historical row, projected down to the charting fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalReading {
    // ---
    pub sensor_name: String,
    pub time_recorded: DateTime<Utc>,
    pub metric: MetricValue,
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    pub county: String,
    pub state: String,
    pub zip_code: String,
}

impl From<&Observation> for HistoricalReading {
    fn from(obs: &Observation) -> Self {
        HistoricalReading {
            sensor_name: obs.sensor_name.clone(),
            time_recorded: obs.time_recorded,
            metric: obs.metric.clone(),
            latitude: obs.latitude,
            longitude: obs.longitude,
            city: obs.city.clone(),
            county: obs.county.clone(),
            state: obs.state.clone(),
            zip_code: obs.zip_code.clone(),
        }
    }
}

// ---

/// Parse a UTC timestamp in RFC 3339 or `YYYY-MM-DD HH:MM:SS` form.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ProxyError> {
    // ---
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, LEGACY_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| ProxyError::InvalidFormat(format!("invalid timestamp '{raw}'")))
}

/// `{zip_code}_{city}` with the city lower-cased and spaces as underscores.
pub fn sensor_name_for(zip_code: &str, city: &str) -> String {
    // ---
    let city = city.trim().to_lowercase().replace(' ', "_");
    format!("{}_{}", zip_code.trim(), city)
}

fn check_required(map: &Map<String, Value>) -> Result<(), ProxyError> {
    // ---
    match REQUIRED_DOCUMENT_FIELDS
        .iter()
        .find(|field| map.get(**field).map_or(true, Value::is_null))
    {
        Some(field) => Err(ProxyError::MissingField(field.to_string())),
        None => Ok(()),
    }
}

/// Zip codes arrive as integers from the CSV replay and as strings elsewhere.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Optional variant of [`string_or_number`] for request envelopes, where
/// ports arrive either quoted or bare.
pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{TimeZone, Timelike};
    use serde_json::json;

    fn vienna_document(metric: Value) -> String {
        // ---
        json!({
            "sensor_name": "22181_vienna",
            "time_recorded": "2024-03-01 12:00:00",
            "latitude": 38.9,
            "longitude": -77.26,
            "city": "Vienna",
            "county": "Fairfax County",
            "state": "Virginia",
            "zip_code": 22181,
            "metric": metric,
        })
        .to_string()
    }

    #[test]
    fn test_decodes_legacy_timestamp_as_utc() {
        // ---
        let obs = Observation::from_document(MeasurementKind::TempC, &vienna_document(json!(14.5)))
            .unwrap();

        assert_eq!(obs.time_recorded, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        assert_eq!(obs.time_recorded.hour(), 12);
        assert_eq!(obs.zip_code, "22181");
        assert_eq!(obs.metric, MetricValue::Number(14.5));
    }

    #[test]
    fn test_accepts_rfc3339_timestamp() {
        // ---
        let ts = parse_timestamp("2024-03-01T07:00:00-05:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_missing_field_is_reported_by_name() {
        // ---
        let raw = json!({
            "time_recorded": "2024-03-01 12:00:00",
            "latitude": 38.9,
            "longitude": -77.26,
            "city": "Vienna",
            "state": "Virginia",
            "zip_code": "22181",
            "metric": 1.0,
        })
        .to_string();

        match Observation::from_document(MeasurementKind::TempC, &raw) {
            Err(ProxyError::MissingField(field)) => assert_eq!(field, "county"),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_timestamp_is_invalid_format() {
        // ---
        let raw = vienna_document(json!(14.5)).replace("2024-03-01 12:00:00", "yesterday");
        assert!(matches!(
            Observation::from_document(MeasurementKind::TempC, &raw),
            Err(ProxyError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_expression_text_is_never_evaluated() {
        // ---
        let raw = "{'sensor_name': __import__('os').getcwd()}";
        assert!(matches!(
            Observation::from_document(MeasurementKind::TempC, raw),
            Err(ProxyError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_metric_type_must_match_kind() {
        // ---
        let text = vienna_document(json!("NNW"));
        let number = vienna_document(json!(270.0));

        assert!(Observation::from_document(MeasurementKind::WindDir, &text).is_ok());
        assert!(matches!(
            Observation::from_document(MeasurementKind::WindDir, &number),
            Err(ProxyError::InvalidFormat(_))
        ));
        assert!(matches!(
            Observation::from_document(MeasurementKind::TempF, &text),
            Err(ProxyError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_sensor_name_is_derived_when_absent() {
        // ---
        let mut doc: Value = serde_json::from_str(&vienna_document(json!(1.0))).unwrap();
        doc.as_object_mut().unwrap().remove("sensor_name");
        doc["city"] = json!("Falls Church");
        doc["zip_code"] = json!("22046");

        let obs = Observation::from_document(MeasurementKind::TempC, &doc.to_string()).unwrap();
        assert_eq!(obs.sensor_name, "22046_falls_church");
    }

    #[test]
    fn test_supplied_sensor_name_must_match_zip_and_city() {
        // ---
        let wrong_zip = vienna_document(json!(1.0)).replace("\"22181_vienna\"", "\"99999_vienna\"");
        match Observation::from_document(MeasurementKind::TempC, &wrong_zip) {
            Err(ProxyError::InvalidFormat(msg)) => assert!(msg.contains("99999_vienna")),
            other => panic!("expected InvalidFormat, got {other:?}"),
        }

        let other_case = vienna_document(json!(1.0)).replace("\"22181_vienna\"", "\"22181_Vienna\"");
        let obs = Observation::from_document(MeasurementKind::TempC, &other_case).unwrap();
        assert_eq!(obs.sensor_name, "22181_vienna");
    }

    #[test]
    fn test_unit_systems_list_each_kind_once() {
        // ---
        for system in [UnitSystem::Metric, UnitSystem::Customary] {
            let kinds = system.kinds();
            let mut unique = kinds.to_vec();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), kinds.len());
        }
        assert_eq!(UnitSystem::Metric.kinds()[0], MeasurementKind::TempC);
        assert_eq!(UnitSystem::Customary.kinds()[0], MeasurementKind::TempF);
    }

    #[test]
    fn test_kind_names_round_trip() {
        // ---
        assert_eq!("uv_index_score".parse::<MeasurementKind>().unwrap(), MeasurementKind::UvIndexScore);
        assert!("temp_k".parse::<MeasurementKind>().is_err());
    }

    #[test]
    fn test_unit_system_label_fallback() {
        // ---
        assert_eq!(UnitSystem::from_label(Some("Customary")), UnitSystem::Customary);
        assert_eq!(UnitSystem::from_label(Some("Empty")), UnitSystem::Metric);
        assert_eq!(UnitSystem::from_label(None), UnitSystem::Metric);
    }
}
