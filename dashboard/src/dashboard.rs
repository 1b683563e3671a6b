//! The mounted dashboard for one machine.
//!
//! `mount` subscribes to the push channel, seeds the view from the REST
//! snapshot and the last logged samples, then hands the live stream to a
//! background task. Only that task touches the telemetry window, so samples
//! are applied one at a time in arrival order. `unmount` (or drop) stops the
//! task, unsubscribes and cancels any pending setpoint publish.

use crate::api::ApiClient;
use crate::context::DashboardContext;
use crate::debounce::{SetpointDebouncer, SetpointEdit, SetpointEditor, SetpointSink};
use crate::error::Result;
use crate::notification::{Notifier, LOAD_FAILED};
use crate::push::{PushChannel, Subscription};
use crate::telemetry_window::TelemetryWindow;
use irrigation_shared::{
    events, Actuator, MachineReading, MachineStatus, SetpointState, TelemetrySample,
};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// The REST reads the dashboard seeds itself from.
pub trait MachineData {
    fn fetch_snapshot(
        &self,
        machine_id: &str,
    ) -> impl Future<Output = Result<MachineReading>> + Send;
    fn fetch_recent_logs(
        &self,
        machine_id: &str,
    ) -> impl Future<Output = Result<Vec<TelemetrySample>>> + Send;
}

impl MachineData for ApiClient {
    fn fetch_snapshot(
        &self,
        machine_id: &str,
    ) -> impl Future<Output = Result<MachineReading>> + Send {
        self.machine_snapshot(machine_id)
    }

    fn fetch_recent_logs(
        &self,
        machine_id: &str,
    ) -> impl Future<Output = Result<Vec<TelemetrySample>>> + Send {
        self.last_six(machine_id)
    }
}

/// What a renderer needs to draw the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub machine_id: String,
    /// Most recent reading for the machine, from the snapshot or the push channel.
    pub latest: Option<MachineReading>,
    /// Chart history, oldest first.
    pub window: Vec<TelemetrySample>,
    pub setpoints: SetpointState,
    /// Both seed requests succeeded.
    pub loaded: bool,
}

pub struct Dashboard {
    machine_id: String,
    view: watch::Receiver<DashboardView>,
    debouncer: SetpointDebouncer,
    task: Option<JoinHandle<()>>,
}

impl Dashboard {
    pub async fn mount<D, S>(
        ctx: &DashboardContext,
        source: &D,
        push: &PushChannel,
        notifier: &Notifier,
        sink: S,
        delay: Duration,
    ) -> Self
    where
        D: MachineData,
        S: SetpointSink,
    {
        let machine_id = ctx.machine_id().to_string();

        // Subscribe first so nothing pushed during the fetch is lost
        let readings = push.subscribe(events::NEW_DATA);
        let statuses = push.subscribe(events::MACHINE_STATUS);

        let debouncer = SetpointDebouncer::spawn(SetpointState::default(), delay, sink);
        let mut setpoints = SetpointState::default();
        let mut window = TelemetryWindow::new();

        let (snapshot, logs) = tokio::join!(
            source.fetch_snapshot(&machine_id),
            source.fetch_recent_logs(&machine_id)
        );
        let loaded = snapshot.is_ok() && logs.is_ok();

        let latest = match snapshot {
            Ok(reading) => {
                for edit in seed_targets(&reading) {
                    edit.apply(&mut setpoints);
                    debouncer.sync(edit);
                }
                Some(reading)
            }
            Err(e) => {
                log::warn!("snapshot for {machine_id} failed: {e}");
                None
            }
        };
        match logs {
            Ok(logs) => window.extend(logs),
            Err(e) => log::warn!("recent logs for {machine_id} failed: {e}"),
        }
        if !loaded {
            notifier.error(LOAD_FAILED);
        }

        let (view_tx, view) = watch::channel(DashboardView {
            machine_id: machine_id.clone(),
            latest,
            window: window.to_vec(),
            setpoints,
            loaded,
        });

        let task = tokio::spawn(run_live(
            machine_id.clone(),
            window,
            readings,
            statuses,
            debouncer.editor(),
            debouncer.watch(),
            view_tx,
        ));

        log::info!("dashboard mounted for {machine_id}");
        Self {
            machine_id,
            view,
            debouncer,
            task: Some(task),
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn view(&self) -> DashboardView {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<DashboardView> {
        self.view.clone()
    }

    pub fn setpoints(&self) -> SetpointState {
        self.debouncer.current()
    }

    pub fn edit(&self, edit: SetpointEdit) {
        self.debouncer.edit(edit);
    }

    pub fn set_target_temperature(&self, value: f64) {
        self.edit(SetpointEdit::TargetTemperature(value));
    }

    pub fn set_target_humidity(&self, value: f64) {
        self.edit(SetpointEdit::TargetHumidity(value));
    }

    pub fn set_actuator(&self, actuator: Actuator, on: bool) {
        self.edit(SetpointEdit::Actuator(actuator, on));
    }

    pub fn unmount(self) {
        drop(self);
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::info!("dashboard unmounted for {}", self.machine_id);
        }
    }
}

/// Targets the snapshot reports, as silent edits.
fn seed_targets(reading: &MachineReading) -> Vec<SetpointEdit> {
    let mut edits = Vec::new();
    if let Some(t) = reading.data.target_temperature {
        edits.push(SetpointEdit::TargetTemperature(t));
    }
    if let Some(h) = reading.data.target_humidity {
        edits.push(SetpointEdit::TargetHumidity(h));
    }
    edits
}

async fn run_live(
    machine_id: String,
    mut window: TelemetryWindow,
    mut readings: Subscription,
    mut statuses: Subscription,
    editor: SetpointEditor,
    mut setpoints: watch::Receiver<SetpointState>,
    view: watch::Sender<DashboardView>,
) {
    loop {
        tokio::select! {
            frame = readings.recv() => {
                let Some(frame) = frame else { break };
                let reading = match frame.decode::<MachineReading>() {
                    Ok(r) => r,
                    Err(e) => {
                        log::debug!("dropping malformed {} payload: {e}", events::NEW_DATA);
                        continue;
                    }
                };
                if reading.machine != machine_id {
                    continue;
                }

                let received_ms = chrono::Utc::now().timestamp_millis();
                window.push(TelemetrySample::from_reading(&reading, received_ms));
                view.send_modify(|v| {
                    v.latest = Some(reading);
                    v.window = window.to_vec();
                });
            }
            frame = statuses.recv() => {
                let Some(frame) = frame else { break };
                match frame.decode::<MachineStatus>() {
                    Ok(status) if status.machine == machine_id => {
                        editor.sync(SetpointEdit::Actuators(status.actuators()));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::debug!("dropping malformed {} payload: {e}", events::MACHINE_STATUS);
                    }
                }
            }
            changed = setpoints.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *setpoints.borrow_and_update();
                view.send_modify(|v| v.setpoints = current);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::{PushSink, DEFAULT_DELAY};
    use crate::error::DashboardError;
    use crate::notification::Severity;
    use crate::push::Loopback;
    use irrigation_shared::api::UserSession;
    use irrigation_shared::{PushFrame, SensorData, SetpointConfig};

    struct FakeSource {
        snapshot: Option<MachineReading>,
        logs: Option<Vec<TelemetrySample>>,
    }

    impl MachineData for FakeSource {
        fn fetch_snapshot(&self, _: &str) -> impl Future<Output = Result<MachineReading>> + Send {
            let r = self
                .snapshot
                .clone()
                .ok_or_else(|| DashboardError::Api("down".into()));
            async move { r }
        }

        fn fetch_recent_logs(
            &self,
            _: &str,
        ) -> impl Future<Output = Result<Vec<TelemetrySample>>> + Send {
            let r = self.logs.clone().ok_or_else(|| DashboardError::Api("down".into()));
            async move { r }
        }
    }

    fn ctx(machine: &str) -> DashboardContext {
        DashboardContext::require(Some(UserSession {
            user_id: "u1".into(),
            fname: "Ana".into(),
            lname: String::new(),
            hub: String::new(),
            location_user: String::new(),
            email: "ana@farm.io".into(),
            role: "admin".into(),
            machine_id: machine.into(),
            permissions: vec![],
        }))
        .unwrap()
    }

    fn reading(machine: &str, temperature: f64) -> MachineReading {
        MachineReading {
            machine: machine.into(),
            data: SensorData {
                temperature,
                humidity: 40.0,
                ph: Some(6.5),
                ec: Some(500.0),
                n: Some(10.0),
                p: Some(20.0),
                k: Some(30.0),
                target_temperature: Some(26.0),
                target_humidity: Some(45.0),
            },
            created_at: None,
        }
    }

    fn logged(ts: i64) -> TelemetrySample {
        TelemetrySample {
            timestamp_ms: ts,
            temperature: 20.0,
            humidity: 40.0,
            ph: None,
            ec: None,
            n: None,
            p: None,
            k: None,
        }
    }

    fn healthy() -> FakeSource {
        FakeSource {
            snapshot: Some(reading("m-1", 21.0)),
            logs: Some((1..=6).map(logged).collect()),
        }
    }

    async fn mount(source: FakeSource) -> (Dashboard, Loopback, PushChannel) {
        let (push, peer) = PushChannel::loopback();
        let notifier = Notifier::default();
        let dash = Dashboard::mount(
            &ctx("m-1"),
            &source,
            &push,
            &notifier,
            PushSink::new(push.emitter(), "m-1"),
            DEFAULT_DELAY,
        )
        .await;
        (dash, peer, push)
    }

    fn data_frame(r: &MachineReading) -> PushFrame {
        PushFrame::encode(events::NEW_DATA, r).unwrap()
    }

    #[tokio::test]
    async fn seeds_from_snapshot_and_logs() {
        let (dash, _peer, _push) = mount(healthy()).await;
        let view = dash.view();
        assert!(view.loaded);
        assert_eq!(view.window.len(), 6);
        assert_eq!(view.latest.as_ref().map(|r| r.data.temperature), Some(21.0));
        assert_eq!(view.setpoints.target_temperature, 26.0);
        assert_eq!(view.setpoints.target_humidity, 45.0);
    }

    #[tokio::test]
    async fn live_readings_roll_the_window() {
        let (dash, peer, _push) = mount(healthy()).await;
        let mut rx = dash.watch();

        peer.push(data_frame(&reading("m-2", 99.0)));
        peer.push(PushFrame {
            event: events::NEW_DATA.into(),
            data: "not json".into(),
        });
        peer.push(data_frame(&reading("m-1", 30.0)));
        peer.push(data_frame(&reading("m-1", 31.0)));

        let view = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|v| v.latest.as_ref().map(|r| r.data.temperature) == Some(31.0)),
        )
        .await
        .expect("view update")
        .expect("dashboard alive")
        .clone();

        assert_eq!(view.window.len(), 6);
        let temps: Vec<f64> = view.window.iter().map(|s| s.temperature).collect();
        assert_eq!(temps, vec![20.0, 20.0, 20.0, 20.0, 30.0, 31.0]);
        assert!(view.window.iter().all(|s| s.temperature != 99.0));
    }

    #[tokio::test]
    async fn failed_seed_notifies_and_keeps_listening() {
        let (push, peer) = PushChannel::loopback();
        let notifier = Notifier::default();
        let mut toasts = notifier.subscribe();
        let dash = Dashboard::mount(
            &ctx("m-1"),
            &FakeSource {
                snapshot: None,
                logs: None,
            },
            &push,
            &notifier,
            PushSink::new(push.emitter(), "m-1"),
            DEFAULT_DELAY,
        )
        .await;

        let toast = toasts.try_recv().unwrap();
        assert_eq!(toast.severity, Severity::Error);
        assert_eq!(toast.description, LOAD_FAILED);

        let view = dash.view();
        assert!(!view.loaded);
        assert!(view.window.is_empty());
        assert_eq!(view.setpoints, SetpointState::default());

        let mut rx = dash.watch();
        peer.push(data_frame(&reading("m-1", 18.0)));
        let view = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|v| !v.window.is_empty()),
        )
        .await
        .expect("view update")
        .expect("dashboard alive")
        .clone();
        assert_eq!(view.window.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_status_updates_actuators_without_publishing() {
        let (dash, mut peer, _push) = mount(healthy()).await;
        let mut rx = dash.watch();

        let status = MachineStatus {
            machine: "m-1".into(),
            motor: true,
            pump: true,
            sprinkler: false,
        };
        peer.push(PushFrame::encode(events::MACHINE_STATUS, &status).unwrap());
        let other = MachineStatus {
            machine: "m-2".into(),
            motor: false,
            pump: false,
            sprinkler: true,
        };
        peer.push(PushFrame::encode(events::MACHINE_STATUS, &other).unwrap());

        rx.wait_for(|v| v.setpoints.actuators.motor).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(peer.try_sent().is_none());
        let sp = dash.setpoints();
        assert!(sp.actuators.pump);
        assert!(!sp.actuators.sprinkler);
    }

    #[tokio::test(start_paused = true)]
    async fn local_edits_publish_once_after_delay() {
        let (dash, mut peer, _push) = mount(healthy()).await;

        dash.set_target_temperature(28.0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        dash.set_actuator(Actuator::Motor, true);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(peer.try_sent().is_none());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let cfg: SetpointConfig = peer.try_sent().unwrap().decode().unwrap();
        assert_eq!(cfg.machine_id, "m-1");
        assert_eq!(cfg.temperature, 28.0);
        // seeded from the snapshot
        assert_eq!(cfg.humidity, 45.0);
        assert!(cfg.motor);
        assert!(peer.try_sent().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_cancels_pending_publish() {
        let (dash, mut peer, _push) = mount(healthy()).await;
        dash.set_target_humidity(70.0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        dash.unmount();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(peer.try_sent().is_none());
    }
}
