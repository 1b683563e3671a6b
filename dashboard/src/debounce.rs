//! Debounced setpoint publisher.
//!
//! Every local edit restarts the delay; once the delay passes with no
//! further edit the current [`SetpointState`] is published exactly once.
//! Publishing is fire-and-forget: a failed publish is logged and dropped.
//! Shutting the debouncer down discards a pending publish.
//!
//! Remote values (`sync`) never schedule a publish, and while a publish is
//! pending they cannot overwrite a field the user has edited since the last
//! one.

use crate::error::Result;
use crate::push::PushEmitter;
use irrigation_shared::{events, Actuator, ActuatorState, SetpointConfig, SetpointState};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

pub const DEFAULT_DELAY: Duration = Duration::from_secs(4);

/// Where debounced setpoints go.
pub trait SetpointSink: Send + 'static {
    fn publish(&mut self, setpoints: &SetpointState) -> Result<()>;
}

/// Publishes as `new/config` on the push channel.
pub struct PushSink {
    emitter: PushEmitter,
    machine_id: String,
}

impl PushSink {
    pub fn new(emitter: PushEmitter, machine_id: impl Into<String>) -> Self {
        Self {
            emitter,
            machine_id: machine_id.into(),
        }
    }
}

impl SetpointSink for PushSink {
    fn publish(&mut self, setpoints: &SetpointState) -> Result<()> {
        let config = SetpointConfig::new(&self.machine_id, setpoints);
        self.emitter.emit(events::NEW_CONFIG, &config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetpointEdit {
    TargetTemperature(f64),
    TargetHumidity(f64),
    Targets { temperature: f64, humidity: f64 },
    Actuator(Actuator, bool),
    Actuators(ActuatorState),
}

impl SetpointEdit {
    pub fn apply(self, state: &mut SetpointState) {
        match self {
            SetpointEdit::TargetTemperature(v) => state.target_temperature = v,
            SetpointEdit::TargetHumidity(v) => state.target_humidity = v,
            SetpointEdit::Targets {
                temperature,
                humidity,
            } => {
                state.target_temperature = temperature;
                state.target_humidity = humidity;
            }
            SetpointEdit::Actuator(a, on) => state.actuators.set(a, on),
            SetpointEdit::Actuators(actuators) => state.actuators = actuators,
        }
    }
}

#[derive(Debug)]
enum Command {
    /// Local change: apply and (re)schedule a publish.
    Edit(SetpointEdit),
    /// Remote or initial value: apply without scheduling.
    Sync(SetpointEdit),
}

/// Cloneable handle for feeding edits into a running debouncer.
#[derive(Debug, Clone)]
pub struct SetpointEditor {
    tx: mpsc::UnboundedSender<Command>,
}

impl SetpointEditor {
    pub fn edit(&self, edit: SetpointEdit) {
        let _ = self.tx.send(Command::Edit(edit));
    }

    pub fn sync(&self, edit: SetpointEdit) {
        let _ = self.tx.send(Command::Sync(edit));
    }
}

pub struct SetpointDebouncer {
    editor: SetpointEditor,
    state: watch::Receiver<SetpointState>,
    task: Option<JoinHandle<()>>,
}

impl SetpointDebouncer {
    pub fn spawn<S: SetpointSink>(initial: SetpointState, delay: Duration, sink: S) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(initial);
        let task = tokio::spawn(run(initial, delay, rx, sink, state_tx));
        Self {
            editor: SetpointEditor { tx },
            state,
            task: Some(task),
        }
    }

    pub fn edit(&self, edit: SetpointEdit) {
        self.editor.edit(edit);
    }

    pub fn sync(&self, edit: SetpointEdit) {
        self.editor.sync(edit);
    }

    pub fn editor(&self) -> SetpointEditor {
        self.editor.clone()
    }

    /// Latest applied state (published or not).
    pub fn current(&self) -> SetpointState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<SetpointState> {
        self.state.clone()
    }

    /// Cancels any pending publish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SetpointDebouncer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run<S: SetpointSink>(
    mut state: SetpointState,
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<Command>,
    mut sink: S,
    state_tx: watch::Sender<SetpointState>,
) {
    let mut deadline: Option<Instant> = None;
    // Local edits not yet published, oldest first
    let mut unpublished: Vec<SetpointEdit> = Vec::new();

    loop {
        // Only polled when a publish is pending
        let wake = deadline.unwrap_or_else(Instant::now);

        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else {
                    // All editors gone; pending publish is dropped
                    break;
                };
                match cmd {
                    Command::Edit(edit) => {
                        edit.apply(&mut state);
                        unpublished.push(edit);
                        deadline = Some(Instant::now() + delay);
                    }
                    Command::Sync(edit) => {
                        edit.apply(&mut state);
                        for local in &unpublished {
                            local.apply(&mut state);
                        }
                    }
                }
                state_tx.send_replace(state);
            }
            _ = sleep_until(wake), if deadline.is_some() => {
                deadline = None;
                unpublished.clear();
                log::debug!(
                    "publishing setpoints: temp={:.2} hum={:.2}",
                    state.target_temperature,
                    state.target_humidity
                );
                if let Err(e) = sink.publish(&state) {
                    log::warn!("setpoint publish failed: {e}");
                }
            }
        }
    }
}
