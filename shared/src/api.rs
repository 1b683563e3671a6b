//! REST request/response shapes.

use crate::TelemetrySample;
use chrono::{DateTime, Local, NaiveTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Every REST response is wrapped as `{ "success": bool, "body": ... }`.
/// On failure `body` is usually a message string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    pub success: bool,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl ApiEnvelope {
    pub fn ok<T: Serialize>(body: &T) -> Self {
        Self {
            success: true,
            body: serde_json::to_value(body).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn err<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            body: serde_json::Value::String(message.into()),
        }
    }

    /// The failure message carried in `body`, if it is a string.
    pub fn message(&self) -> Option<&str> {
        self.body.as_str()
    }

    pub fn into_body<T: DeserializeOwned>(self) -> serde_json::Result<T> {
        serde_json::from_value(self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "machineID")]
    pub machine_id: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// User record as returned by `/user/login`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteUser {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub fname: String,
    #[serde(default)]
    pub lname: String,
    #[serde(default)]
    pub hub: String,
    #[serde(default)]
    pub location_user: String,
    pub email: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginBody {
    pub user: RemoteUser,
}

/// Entry of `/machine/names/find`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineName {
    #[serde(rename = "_id", alias = "machineId")]
    pub machine_id: String,
    pub name: String,
}

/// One row of `/logs/machines/{id}/lastsix`.
///
/// The backend labels rows with a wall-clock `time` such as `"10:42 AM"`.
/// `timestamp_ms` and `createdAt` are used instead when a row carries them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
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

impl LogRow {
    /// The row as the backend writes it: display time plus `createdAt`.
    pub fn from_sample(sample: &TelemetrySample) -> Self {
        let created_at = DateTime::<Utc>::from_timestamp_millis(sample.timestamp_ms);
        Self {
            time: created_at.map(|t| t.with_timezone(&Local).format("%I:%M %p").to_string()),
            created_at,
            timestamp_ms: None,
            temperature: sample.temperature,
            humidity: sample.humidity,
            ph: sample.ph,
            ec: sample.ec,
            n: sample.n,
            p: sample.p,
            k: sample.k,
        }
    }

    /// `fallback_ms` stamps rows with no usable time at all.
    pub fn into_sample(self, fallback_ms: i64) -> TelemetrySample {
        let timestamp_ms = self
            .timestamp_ms
            .or_else(|| self.created_at.map(|t| t.timestamp_millis()))
            .or_else(|| self.time.as_deref().and_then(clock_time_today_ms))
            .unwrap_or(fallback_ms);
        TelemetrySample {
            timestamp_ms,
            temperature: self.temperature,
            humidity: self.humidity,
            ph: self.ph,
            ec: self.ec,
            n: self.n,
            p: self.p,
            k: self.k,
        }
    }
}

/// `"10:42 AM"`, `"22:42"` and friends, taken as today in local time.
fn clock_time_today_ms(label: &str) -> Option<i64> {
    // en-US time strings may use a narrow no-break space before AM/PM
    let label = label.trim().replace(['\u{202f}', '\u{a0}'], " ");
    let time = ["%I:%M %p", "%I:%M:%S %p", "%H:%M", "%H:%M:%S"]
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(&label, f).ok())?;
    Local::now()
        .date_naive()
        .and_time(time)
        .and_local_timezone(Local)
        .earliest()
        .map(|t| t.timestamp_millis())
}

/// Body of `/logs/machines/{id}/lastsix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsBody {
    pub logs: Vec<LogRow>,
}

impl LogsBody {
    pub fn into_samples(self, fallback_ms: i64) -> Vec<TelemetrySample> {
        self.logs.into_iter().map(|r| r.into_sample(fallback_ms)).collect()
    }
}

/// `POST /bikes/register`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BikeRegistration {
    pub plate_no: String,
    pub serial_no: String,
    /// 1 or 2
    pub generation: u8,
}

/// `POST /riders/register`. A missing email is sent as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiderRegistration {
    pub fname: String,
    pub lname: String,
    pub national_id: String,
    pub phone: String,
    pub location: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessLine {
    Transportation,
    Logistic,
    Food,
    Warehouse,
    RetailStore,
    Beverage,
    Electronics,
    Agriculture,
}

impl BusinessLine {
    pub const ALL: [BusinessLine; 8] = [
        BusinessLine::Transportation,
        BusinessLine::Logistic,
        BusinessLine::Food,
        BusinessLine::Warehouse,
        BusinessLine::RetailStore,
        BusinessLine::Beverage,
        BusinessLine::Electronics,
        BusinessLine::Agriculture,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BusinessLine::Transportation => "transportation",
            BusinessLine::Logistic => "logistic",
            BusinessLine::Food => "food",
            BusinessLine::Warehouse => "warehouse",
            BusinessLine::RetailStore => "retail_store",
            BusinessLine::Beverage => "beverage",
            BusinessLine::Electronics => "electronics",
            BusinessLine::Agriculture => "agriculture",
        }
    }
}

impl FromStr for BusinessLine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        BusinessLine::ALL
            .into_iter()
            .find(|l| l.as_str() == wanted)
            .ok_or_else(|| format!("unknown business line {s:?}"))
    }
}

/// `POST /customers/register`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRegistration {
    pub business_line: BusinessLine,
    pub business_name: String,
    pub longitude: f64,
    pub latitude: f64,
    /// Place name
    pub location: String,
    pub fname: String,
    pub lname: String,
    pub email: String,
    pub phone: String,
}

/// Entry of `/customers/businessnames`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Business {
    pub customer_id: String,
    pub business_name: String,
}

/// The signed-in user together with the machine chosen at login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    pub fname: String,
    pub lname: String,
    pub hub: String,
    pub location_user: String,
    pub email: String,
    pub role: String,
    #[serde(rename = "machineId")]
    pub machine_id: String,
    pub permissions: Vec<String>,
}

impl UserSession {
    pub fn from_login(user: RemoteUser, machine_id: &str) -> Self {
        Self {
            user_id: user.id,
            fname: user.fname,
            lname: user.lname,
            hub: user.hub,
            location_user: user.location_user,
            email: user.email,
            role: user.role,
            machine_id: machine_id.to_string(),
            permissions: user.permissions,
        }
    }

    pub fn has_role(&self, allowed: &[&str]) -> bool {
        allowed.iter().any(|r| *r == self.role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_envelope_exposes_message() {
        let env: ApiEnvelope =
            serde_json::from_str(r#"{ "success": false, "body": "bad password" }"#).unwrap();
        assert!(!env.success);
        assert_eq!(env.message(), Some("bad password"));
    }

    #[test]
    fn envelope_without_body_defaults_to_null() {
        let env: ApiEnvelope = serde_json::from_str(r#"{ "success": true }"#).unwrap();
        assert!(env.body.is_null());
    }

    #[test]
    fn session_from_login_keeps_machine_choice() {
        let raw = r#"{ "user": { "_id": "u1", "fname": "Ana", "email": "ana@farm.io",
                       "role": "admin", "permissions": ["read", "write"] } }"#;
        let body: LoginBody = serde_json::from_str(raw).unwrap();
        let session = UserSession::from_login(body.user, "m-3");
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.machine_id, "m-3");
        assert!(session.has_role(&["admin", "operator"]));
        assert!(!session.has_role(&["viewer"]));
        assert!(session.has_permission("write"));
        assert!(!session.has_permission("delete"));
    }

    #[test]
    fn login_request_uses_backend_key() {
        let req = LoginRequest {
            machine_id: "m-1".into(),
            email: "a@b.c".into(),
            password: "pw".into(),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["machineID"], "m-1");
    }

    #[test]
    fn machine_names_use_document_ids() {
        let raw = r#"[{ "_id": "65f0aa", "name": "Greenhouse A" }]"#;
        let names: Vec<MachineName> = serde_json::from_str(raw).unwrap();
        assert_eq!(names[0].machine_id, "65f0aa");
        assert_eq!(names[0].name, "Greenhouse A");
        assert_eq!(serde_json::to_value(&names[0]).unwrap()["_id"], "65f0aa");
    }

    #[test]
    fn log_rows_with_display_time_decode() {
        let raw = r#"{ "logs": [
            { "time": "10:42 AM", "humidity": 40.0, "temperature": 20.0 },
            { "time": "01:05\u202fPM", "humidity": 41.0, "temperature": 21.0 },
            { "humidity": 42.0, "temperature": 22.0 }
        ] }"#;
        let body: LogsBody = serde_json::from_str(raw).unwrap();
        let samples = body.into_samples(7);

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].time_label(), "10:42");
        assert_eq!(samples[0].temperature, 20.0);
        assert_eq!(samples[1].time_label(), "13:05");
        assert_eq!(samples[2].timestamp_ms, 7);
        assert_eq!(samples[2].ph, None);
    }

    #[test]
    fn log_row_prefers_exact_timestamps() {
        let raw = r#"{ "time": "10:42 AM", "createdAt": "2026-01-02T03:04:05Z",
                       "humidity": 40, "temperature": 20, "pH": 6.5 }"#;
        let row: LogRow = serde_json::from_str(raw).unwrap();
        let sample = row.into_sample(0);
        assert_eq!(sample.timestamp_ms, 1_767_323_045_000);
        assert_eq!(sample.ph, Some(6.5));

        let back = LogRow::from_sample(&sample);
        assert_eq!(back.created_at.map(|t| t.timestamp_millis()), Some(sample.timestamp_ms));
        assert!(back.time.is_some_and(|t| t.ends_with('M')));
    }

    #[test]
    fn registration_bodies_match_backend_keys() {
        let rider = RiderRegistration {
            fname: "Juma".into(),
            lname: "Mushi".into(),
            national_id: "19900101123450000123".into(),
            phone: "0712345678".into(),
            location: "Arusha".into(),
            email: None,
        };
        let v = serde_json::to_value(&rider).unwrap();
        assert!(v["email"].is_null());
        assert_eq!(v["national_id"], "19900101123450000123");

        let customer = CustomerRegistration {
            business_line: BusinessLine::RetailStore,
            business_name: "Mama Duka".into(),
            longitude: 36.69,
            latitude: -3.37,
            location: "Arusha".into(),
            fname: "Neema".into(),
            lname: "Lyimo".into(),
            email: "neema@duka.tz".into(),
            phone: "0754000000".into(),
        };
        let v = serde_json::to_value(&customer).unwrap();
        assert_eq!(v["business_line"], "retail_store");
        assert_eq!(v["latitude"], -3.37);
    }

    #[test]
    fn business_lines_parse() {
        assert_eq!("retail-store".parse(), Ok(BusinessLine::RetailStore));
        assert_eq!("Food".parse(), Ok(BusinessLine::Food));
        assert!("mining".parse::<BusinessLine>().is_err());
        for line in BusinessLine::ALL {
            assert_eq!(line.as_str().parse(), Ok(line));
        }
    }
}
