use crate::error::{DashboardError, Result};
use irrigation_shared::api::{
    ApiEnvelope, BikeRegistration, Business, CustomerRegistration, LoginBody, LoginRequest,
    LogsBody, MachineName, RegisterRequest, RiderRegistration, UserSession,
};
use irrigation_shared::{MachineReading, TelemetrySample};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Typed client for the irrigation REST backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
}

/// Raw export download.
#[derive(Debug, Clone)]
pub struct Export {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl Export {
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_deref() {
            Some(ct) if ct.starts_with("text/csv") => "csv",
            Some(ct) if ct.starts_with("application/json") => "json",
            _ => "pdf",
        }
    }
}

impl ApiClient {
    /// `base` is scheme + host[:port], see [`crate::config::DashboardConfig::base_http`].
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base)
        } else {
            format!("{}/{path}", self.base)
        }
    }

    async fn get_body<T: DeserializeOwned>(&self, path: &str, failure: &str) -> Result<T> {
        let envelope: ApiEnvelope = self
            .http
            .get(self.url(path))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        open_envelope(envelope, failure)
    }

    async fn post_body<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        failure: &str,
    ) -> Result<T> {
        let envelope: ApiEnvelope = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        open_envelope(envelope, failure)
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        machine_id: &str,
    ) -> Result<UserSession> {
        let req = LoginRequest {
            machine_id: machine_id.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let body: LoginBody = self
            .post_body(
                "/user/login",
                &req,
                "Login failed. Please check your credentials and try again.",
            )
            .await?;
        Ok(UserSession::from_login(body.user, machine_id))
    }

    /// Returns the backend's confirmation message.
    pub async fn register(&self, email: &str, username: &str, password: &str) -> Result<String> {
        let req = RegisterRequest {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        };
        self.post_message("/user/register", &req, "Registration failed", "User registered")
            .await
    }

    /// POSTs `body` and returns the confirmation text, or `done` when the
    /// backend sends none.
    async fn post_message<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        failure: &str,
        done: &str,
    ) -> Result<String> {
        let body: serde_json::Value = self.post_body(path, body, failure).await?;
        Ok(body.as_str().unwrap_or(done).to_string())
    }

    pub async fn register_bike(&self, bike: &BikeRegistration) -> Result<String> {
        self.post_message(
            "/bikes/register",
            bike,
            "Failed to add bike",
            "Bike added successfully",
        )
        .await
    }

    pub async fn register_rider(&self, rider: &RiderRegistration) -> Result<String> {
        self.post_message(
            "/riders/register",
            rider,
            "Failed to add rider",
            "Rider added successfully",
        )
        .await
    }

    pub async fn register_customer(&self, customer: &CustomerRegistration) -> Result<String> {
        self.post_message(
            "/customers/register",
            customer,
            "Failed to add customer",
            "Customer added successfully",
        )
        .await
    }

    pub async fn business_names(&self) -> Result<Vec<Business>> {
        self.get_body(
            "/customers/businessnames",
            "Failed to load businesses. Please try again.",
        )
        .await
    }

    pub async fn machine_names(&self) -> Result<Vec<MachineName>> {
        self.get_body(
            "/machine/names/find",
            "Failed to load machines. Please try again.",
        )
        .await
    }

    /// Current reading and targets for one machine.
    pub async fn machine_snapshot(&self, machine_id: &str) -> Result<MachineReading> {
        self.get_body(&format!("/machine/{machine_id}"), crate::notification::LOAD_FAILED)
            .await
    }

    /// The six most recent log entries, oldest first.
    pub async fn last_six(&self, machine_id: &str) -> Result<Vec<TelemetrySample>> {
        let body: LogsBody = self
            .get_body(
                &format!("/logs/machines/{machine_id}/lastsix"),
                crate::notification::LOAD_FAILED,
            )
            .await?;
        Ok(body.into_samples(chrono::Utc::now().timestamp_millis()))
    }

    pub async fn export_all(&self, machine_id: &str) -> Result<Export> {
        let response = self
            .http
            .get(self.url(&format!("/logs/machines/{machine_id}/export-all")))
            .send()
            .await?
            .error_for_status()?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        Ok(Export {
            bytes,
            content_type,
        })
    }
}

fn open_envelope<T: DeserializeOwned>(envelope: ApiEnvelope, failure: &str) -> Result<T> {
    if !envelope.success {
        let msg = envelope.message().unwrap_or(failure).to_string();
        return Err(DashboardError::Api(msg));
    }
    Ok(envelope.into_body()?)
}

/// Writes an export as `machineData-<HH-MM-SS>.<ext>` under `dir`.
pub fn save_export(dir: &Path, export: &Export) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let stamp = chrono::Local::now().format("%H-%M-%S");
    let path = dir.join(format!("machineData-{stamp}.{}", export.extension()));
    std::fs::write(&path, &export.bytes)?;
    Ok(path)
}
