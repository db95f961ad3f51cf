//! Data models for the relay: queue readings in, receiver payloads out.
//!
//! Two reading schemas are in circulation and they are not compatible with
//! each other, so a deployment pins one through [`SchemaVersion`]. Decoding is
//! strict: a message written in the other schema fails to decode instead of
//! being coerced.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---

/// Which reading schema a deployment consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// ISO-8601 text timestamp, no rain probability.
    V1,
    /// Unix epoch timestamp plus `rain_probability_percent`.
    V2,
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(SchemaVersion::V1),
            "v2" | "2" => Ok(SchemaVersion::V2),
            other => Err(format!("unknown schema version '{}', expected v1 or v2", other)),
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVersion::V1 => write!(f, "v1"),
            SchemaVersion::V2 => write!(f, "v2"),
        }
    }
}

// ---

/// Reading as pushed by the v1 collector.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadingV1 {
    // ---
    pub city: String,
    pub timestamp: String,
    pub temperature_celsius: f64,
    pub humidity_percent: i64,
    pub wind_speed_m_s: f64,
    pub condition_description: String,
}

/// Reading as pushed by the v2 collector.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadingV2 {
    // ---
    pub city: String,
    pub timestamp: i64,
    pub temperature_celsius: f64,
    pub humidity_percent: i64,
    pub wind_speed_m_s: f64,
    pub condition_description: String,
    pub rain_probability_percent: i64,
}

/// Inbound reading, tagged with the schema it was decoded under.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorReading {
    V1(ReadingV1),
    V2(ReadingV2),
}

/// Outbound v1 record in the receiver's naming.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadV1 {
    // ---
    pub city: String,
    pub timestamp: String,
    pub temperature_celsius: f64,
    pub humidity_percent: i64,
    #[serde(rename = "windSpeedMS")]
    pub wind_speed_m_s: f64,
    pub condition_description: String,
}

/// Outbound v2 record in the receiver's naming.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadV2 {
    // ---
    pub city: String,
    pub timestamp: i64,
    pub temperature_celsius: f64,
    pub humidity_percent: i64,
    #[serde(rename = "windSpeedMS")]
    pub wind_speed_m_s: f64,
    pub condition_description: String,
    pub rain_probability_percent: i64,
}

/// Payload POSTed to the receivers. Serializes as the bare record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReceiverPayload {
    V1(PayloadV1),
    V2(PayloadV2),
}

// ---

impl SensorReading {
    // ---
    /// Decode a raw queue message under the given schema version.
    ///
    /// Bytes that are not UTF-8 fail here like any other malformed JSON.
    pub fn decode(raw: impl AsRef<[u8]>, version: SchemaVersion) -> Result<Self, serde_json::Error> {
        // ---
        let raw = raw.as_ref();
        match version {
            SchemaVersion::V1 => serde_json::from_slice(raw).map(SensorReading::V1),
            SchemaVersion::V2 => serde_json::from_slice(raw).map(SensorReading::V2),
        }
    }

    pub fn city(&self) -> &str {
        match self {
            SensorReading::V1(r) => &r.city,
            SensorReading::V2(r) => &r.city,
        }
    }

    /// Observation time, when the timestamp can be interpreted.
    ///
    /// Only used for log context; the payload always carries the timestamp as received.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        // ---
        match self {
            SensorReading::V1(r) => DateTime::parse_from_rfc3339(&r.timestamp)
                .ok()
                .map(|ts| ts.with_timezone(&Utc)),
            SensorReading::V2(r) => DateTime::from_timestamp(r.timestamp, 0),
        }
    }

    /// Rename every field to the receiver's naming. Values are copied as-is.
    pub fn to_payload(&self) -> ReceiverPayload {
        // ---
        match self {
            SensorReading::V1(r) => ReceiverPayload::V1(PayloadV1 {
                city: r.city.clone(),
                timestamp: r.timestamp.clone(),
                temperature_celsius: r.temperature_celsius,
                humidity_percent: r.humidity_percent,
                wind_speed_m_s: r.wind_speed_m_s,
                condition_description: r.condition_description.clone(),
            }),
            SensorReading::V2(r) => ReceiverPayload::V2(PayloadV2 {
                city: r.city.clone(),
                timestamp: r.timestamp,
                temperature_celsius: r.temperature_celsius,
                humidity_percent: r.humidity_percent,
                wind_speed_m_s: r.wind_speed_m_s,
                condition_description: r.condition_description.clone(),
                rain_probability_percent: r.rain_probability_percent,
            }),
        }
    }
}
