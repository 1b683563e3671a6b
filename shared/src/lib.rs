use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub mod api;
pub mod ring_buffer;

pub use ring_buffer::RingBuffer;

/// Push channel event names.
pub mod events {
    /// Inbound: a new sensor reading for some machine.
    pub const NEW_DATA: &str = "newdata";
    /// Outbound: debounced setpoint update for the active machine.
    pub const NEW_CONFIG: &str = "new/config";
    /// Inbound: actuator status reported for a machine.
    pub const MACHINE_STATUS: &str = "new/config/machine";
}

/// One frame on the push channel:
///   { "event": "newdata", "data": "{\"machine\":\"m-1\",...}" }
///
/// `data` is JSON text, not a nested object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushFrame {
    pub event: String,
    pub data: String,
}

impl PushFrame {
    pub fn encode<T: Serialize>(event: &str, payload: &T) -> serde_json::Result<Self> {
        Ok(Self {
            event: event.to_string(),
            data: serde_json::to_string(payload)?,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.data)
    }
}

/// Sensor values as the backend names them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    pub temperature: f64,
    pub humidity: f64,
    #[serde(rename = "pH", default, skip_serializing_if = "Option::is_none")]
    pub ph: Option<f64>,
    #[serde(rename = "EC", default, skip_serializing_if = "Option::is_none")]
    pub ec: Option<f64>,
    #[serde(rename = "N", default, skip_serializing_if = "Option::is_none")]
    pub n: Option<f64>,
    #[serde(rename = "P", default, skip_serializing_if = "Option::is_none")]
    pub p: Option<f64>,
    #[serde(rename = "K", default, skip_serializing_if = "Option::is_none")]
    pub k: Option<f64>,
    #[serde(rename = "setedTemperature", default, skip_serializing_if = "Option::is_none")]
    pub target_temperature: Option<f64>,
    #[serde(rename = "setedHumidity", default, skip_serializing_if = "Option::is_none")]
    pub target_humidity: Option<f64>,
}

/// A reading keyed by machine. Payload of `newdata` and body of `GET /machine/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineReading {
    pub machine: String,
    pub data: SensorData,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One timestamped reading, as kept in the chart window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub timestamp_ms: i64,
    pub temperature: f64,
    pub humidity: f64,
    #[serde(rename = "pH", default, skip_serializing_if = "Option::is_none")]
    pub ph: Option<f64>,
    #[serde(rename = "EC", default, skip_serializing_if = "Option::is_none")]
    pub ec: Option<f64>,
    #[serde(rename = "N", default, skip_serializing_if = "Option::is_none")]
    pub n: Option<f64>,
    #[serde(rename = "P", default, skip_serializing_if = "Option::is_none")]
    pub p: Option<f64>,
    #[serde(rename = "K", default, skip_serializing_if = "Option::is_none")]
    pub k: Option<f64>,
}

impl TelemetrySample {
    /// Builds a sample from a reading. `received_ms` is used when the
    /// reading carries no `createdAt`.
    pub fn from_reading(reading: &MachineReading, received_ms: i64) -> Self {
        let d = &reading.data;
        Self {
            timestamp_ms: reading
                .created_at
                .map(|t| t.timestamp_millis())
                .unwrap_or(received_ms),
            temperature: d.temperature,
            humidity: d.humidity,
            ph: d.ph,
            ec: d.ec,
            n: d.n,
            p: d.p,
            k: d.k,
        }
    }

    /// `HH:MM` in local time, the label used on the chart axis.
    pub fn time_label(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp_ms)
            .map(|t| t.with_timezone(&chrono::Local).format("%H:%M").to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorState {
    pub motor: bool,
    pub pump: bool,
    pub sprinkler: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actuator {
    Motor,
    Pump,
    Sprinkler,
}

impl Actuator {
    pub const ALL: [Actuator; 3] = [Actuator::Motor, Actuator::Pump, Actuator::Sprinkler];

    pub fn as_str(self) -> &'static str {
        match self {
            Actuator::Motor => "motor",
            Actuator::Pump => "pump",
            Actuator::Sprinkler => "sprinkler",
        }
    }
}

impl ActuatorState {
    pub fn set(&mut self, actuator: Actuator, on: bool) {
        match actuator {
            Actuator::Motor => self.motor = on,
            Actuator::Pump => self.pump = on,
            Actuator::Sprinkler => self.sprinkler = on,
        }
    }

    pub fn get(&self, actuator: Actuator) -> bool {
        match actuator {
            Actuator::Motor => self.motor,
            Actuator::Pump => self.pump,
            Actuator::Sprinkler => self.sprinkler,
        }
    }
}

impl std::str::FromStr for Actuator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Actuator::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown actuator {s:?}"))
    }
}

/// Actuator status for a machine (`new/config/machine`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineStatus {
    pub machine: String,
    pub motor: bool,
    pub pump: bool,
    pub sprinkler: bool,
}

impl MachineStatus {
    pub fn actuators(&self) -> ActuatorState {
        ActuatorState {
            motor: self.motor,
            pump: self.pump,
            sprinkler: self.sprinkler,
        }
    }
}

/// Locally edited targets for the active machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetpointState {
    pub target_temperature: f64,
    pub target_humidity: f64,
    pub actuators: ActuatorState,
}

impl Default for SetpointState {
    fn default() -> Self {
        Self {
            target_temperature: DEFAULT_TARGET_TEMPERATURE,
            target_humidity: DEFAULT_TARGET_HUMIDITY,
            actuators: ActuatorState::default(),
        }
    }
}

pub const DEFAULT_TARGET_TEMPERATURE: f64 = 84.0;
pub const DEFAULT_TARGET_HUMIDITY: f64 = 37.0;

/// Outbound `new/config` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetpointConfig {
    #[serde(rename = "machineId")]
    pub machine_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub motor: bool,
    pub pump: bool,
    pub sprinkler: bool,
}

impl SetpointConfig {
    pub fn new(machine_id: &str, state: &SetpointState) -> Self {
        Self {
            machine_id: machine_id.to_string(),
            temperature: state.target_temperature,
            humidity: state.target_humidity,
            motor: state.actuators.motor,
            pump: state.actuators.pump,
            sprinkler: state.actuators.sprinkler,
        }
    }

    pub fn setpoints(&self) -> SetpointState {
        SetpointState {
            target_temperature: self.temperature,
            target_humidity: self.humidity,
            actuators: ActuatorState {
                motor: self.motor,
                pump: self.pump,
                sprinkler: self.sprinkler,
            },
        }
    }
}

/// Zero-padded display id, e.g. `format_alias("42", 6, "RD")` -> `RD-000042`.
pub fn format_alias(id: &str, pad: usize, alias: &str) -> String {
    format!("{alias}-{id:0>pad$}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_parses_backend_field_names() {
        let raw = r#"{
            "machine": "m-1",
            "data": { "K": 3, "P": 2, "N": 1, "EC": 400.5, "pH": 6.8,
                      "humidity": 41.0, "temperature": 22.5, "setedTemperature": 25 },
            "createdAt": "2026-01-02T03:04:05Z"
        }"#;
        let reading: MachineReading = serde_json::from_str(raw).unwrap();
        assert_eq!(reading.machine, "m-1");
        assert_eq!(reading.data.ph, Some(6.8));
        assert_eq!(reading.data.k, Some(3.0));
        assert_eq!(reading.data.target_temperature, Some(25.0));
        assert_eq!(reading.data.target_humidity, None);

        let sample = TelemetrySample::from_reading(&reading, 0);
        assert_eq!(sample.timestamp_ms, 1_767_323_045_000);
        assert_eq!(sample.temperature, 22.5);
        assert_eq!(sample.ec, Some(400.5));
    }

    #[test]
    fn sample_falls_back_to_receipt_time() {
        let reading = MachineReading {
            machine: "m-1".into(),
            data: SensorData {
                temperature: 20.0,
                humidity: 30.0,
                ph: None,
                ec: None,
                n: None,
                p: None,
                k: None,
                target_temperature: None,
                target_humidity: None,
            },
            created_at: None,
        };
        assert_eq!(TelemetrySample::from_reading(&reading, 1234).timestamp_ms, 1234);
    }

    #[test]
    fn push_frame_carries_json_text() {
        let cfg = SetpointConfig::new("m-7", &SetpointState::default());
        let frame = PushFrame::encode(events::NEW_CONFIG, &cfg).unwrap();
        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(wire["event"], "new/config");
        assert!(wire["data"].is_string());
        assert!(frame.data.contains("\"machineId\":\"m-7\""));
        assert_eq!(frame.decode::<SetpointConfig>().unwrap(), cfg);
    }

    #[test]
    fn alias_is_zero_padded() {
        assert_eq!(format_alias("42", 6, "RD"), "RD-000042");
        assert_eq!(format_alias("1234567", 3, "BK"), "BK-1234567");
    }

    #[test]
    fn actuator_names_parse() {
        let mut state = ActuatorState::default();
        state.set("pump".parse().unwrap(), true);
        assert!(state.pump);
        assert!(!state.get(Actuator::Motor));
        assert!("valve".parse::<Actuator>().is_err());
    }
}
