//! Headless client for the irrigation dashboard: REST calls, the push
//! channel, the rolling telemetry window and debounced setpoint publishing.

pub mod api;
pub mod config;
pub mod console;
pub mod context;
pub mod dashboard;
pub mod debounce;
pub mod error;
pub mod notification;
pub mod push;
pub mod session;
pub mod telemetry_window;

pub use api::ApiClient;
pub use config::DashboardConfig;
pub use context::{DashboardContext, HubRegistry};
pub use dashboard::{Dashboard, DashboardView, MachineData};
pub use debounce::{PushSink, SetpointDebouncer, SetpointEdit, SetpointSink};
pub use error::{DashboardError, Result};
pub use notification::{Notification, Notifier};
pub use push::{PushChannel, Subscription};
pub use session::SessionStore;
pub use telemetry_window::TelemetryWindow;
