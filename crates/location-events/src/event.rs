//! Typed Events and Raw Bridge Mapping

use crate::LocationSample;
use chrono::{TimeZone, Utc};
use geo_kernel::Coordinate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every event kind the native bridge can deliver.
///
/// Only `Location` events are enriched by the pipeline; all other kinds
/// pass through to subscribers unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocusEvent {
    Location(LocationSample),
    MotionChange {
        is_moving: bool,
        sample: Option<LocationSample>,
    },
    ActivityChange {
        activity: String,
        confidence: Option<u8>,
    },
    /// Native circular-geofence event, passed through as received
    Geofence {
        identifier: String,
        action: String,
        sample: Option<LocationSample>,
    },
    ProviderChange {
        enabled: bool,
        status: i64,
        gps: bool,
        network: bool,
    },
    ConnectivityChange {
        connected: bool,
    },
    Heartbeat {
        sample: Option<LocationSample>,
    },
    Http {
        status: u16,
        response: String,
    },
    EnabledChange(bool),
    PowerSaveChange(bool),
    Schedule {
        state: Value,
    },
    NotificationAction(String),
    /// Anything unparseable, carrying the raw payload
    Unknown {
        raw: Value,
    },
}

impl LocusEvent {
    /// Map a raw `{type, data}` bridge record into a typed event.
    ///
    /// Total: malformed or unrecognized payloads map to `Unknown` with the
    /// raw value attached, they never fail.
    pub fn from_raw(raw: &Value) -> Self {
        let Some(kind) = raw.get("type").and_then(Value::as_str) else {
            return Self::Unknown { raw: raw.clone() };
        };
        let data = raw.get("data").unwrap_or(&Value::Null);

        match kind {
            "location" => match parse_sample(data) {
                Some(sample) => Self::Location(sample),
                None => Self::Unknown { raw: raw.clone() },
            },
            "motionChange" => Self::MotionChange {
                is_moving: bool_field(data, "isMoving").unwrap_or(false),
                sample: data.get("location").and_then(parse_sample),
            },
            "activityChange" => match data.get("activity").and_then(Value::as_str) {
                Some(activity) => Self::ActivityChange {
                    activity: activity.to_string(),
                    confidence: data
                        .get("confidence")
                        .and_then(Value::as_u64)
                        .map(|c| c.min(100) as u8),
                },
                None => Self::Unknown { raw: raw.clone() },
            },
            "geofence" => {
                let identifier = data.get("identifier").and_then(Value::as_str);
                let action = data.get("action").and_then(Value::as_str);
                match (identifier, action) {
                    (Some(identifier), Some(action)) => Self::Geofence {
                        identifier: identifier.to_string(),
                        action: action.to_string(),
                        sample: data.get("location").and_then(parse_sample),
                    },
                    _ => Self::Unknown { raw: raw.clone() },
                }
            }
            "providerChange" => Self::ProviderChange {
                enabled: bool_field(data, "enabled").unwrap_or(false),
                status: data.get("status").and_then(Value::as_i64).unwrap_or(0),
                gps: bool_field(data, "gps").unwrap_or(false),
                network: bool_field(data, "network").unwrap_or(false),
            },
            "connectivityChange" => Self::ConnectivityChange {
                connected: bool_field(data, "connected").unwrap_or(false),
            },
            "heartbeat" => Self::Heartbeat {
                sample: data.get("location").and_then(parse_sample),
            },
            "http" => Self::Http {
                status: data
                    .get("status")
                    .and_then(Value::as_u64)
                    .map(|s| s.min(u16::MAX as u64) as u16)
                    .unwrap_or(0),
                response: data
                    .get("responseText")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            "enabledChange" => Self::EnabledChange(data.as_bool().unwrap_or(false)),
            "powerSaveChange" => Self::PowerSaveChange(data.as_bool().unwrap_or(false)),
            "schedule" => Self::Schedule { state: data.clone() },
            "notificationAction" => Self::NotificationAction(
                data.as_str().unwrap_or_default().to_string(),
            ),
            _ => Self::Unknown { raw: raw.clone() },
        }
    }
}

fn bool_field(data: &Value, key: &str) -> Option<bool> {
    data.get(key).and_then(Value::as_bool)
}

/// Parse a location payload into a sample; `None` when the coordinate is
/// missing or fails validation.
fn parse_sample(data: &Value) -> Option<LocationSample> {
    let coords = data.get("coords").unwrap_or(data);
    let latitude = coords.get("latitude").and_then(Value::as_f64)?;
    let longitude = coords.get("longitude").and_then(Value::as_f64)?;
    let accuracy = coords
        .get("accuracy")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    let mut coordinate = Coordinate::new(latitude, longitude, accuracy).ok()?;
    if let Some(speed) = coords.get("speed").and_then(Value::as_f64) {
        coordinate = coordinate.with_speed(speed);
    }
    if let Some(heading) = coords.get("heading").and_then(Value::as_f64) {
        coordinate = coordinate.with_heading(heading);
    }
    if let Some(altitude) = coords.get("altitude").and_then(Value::as_f64) {
        coordinate = coordinate.with_altitude(altitude);
    }

    let timestamp = data
        .get("timestamp")
        .and_then(Value::as_i64)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);

    let mut sample = LocationSample::new(coordinate, timestamp)
        .moving(bool_field(data, "isMoving").unwrap_or(false))
        .with_odometer(data.get("odometer").and_then(Value::as_f64).unwrap_or(0.0));
    if let Some(mock) = bool_field(data, "mock") {
        sample.mock = Some(mock);
    }
    Some(sample)
}
