//! Push channel client.
//!
//! A websocket carrying [`PushFrame`]s. A supervisor task keeps the socket
//! connected, fans inbound frames out to subscribers and drains the outbound
//! queue. Frames emitted while disconnected wait in the queue.

use crate::error::{DashboardError, Result};
use futures_util::{SinkExt, StreamExt};
use irrigation_shared::PushFrame;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

const RECONNECT_DELAY: Duration = Duration::from_millis(800);
const INBOUND_CAPACITY: usize = 512;

pub struct PushChannel {
    inbound: broadcast::Sender<PushFrame>,
    outbound: mpsc::UnboundedSender<String>,
    connected: watch::Receiver<bool>,
    supervisor: Option<JoinHandle<()>>,
}

/// Receives the frames of one event name. Dropping it unsubscribes.
pub struct Subscription {
    event: String,
    rx: broadcast::Receiver<PushFrame>,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Next frame for this event, in arrival order. `None` once the channel
    /// is gone.
    pub async fn recv(&mut self) -> Option<PushFrame> {
        loop {
            match self.rx.recv().await {
                Ok(frame) if frame.event == self.event => return Some(frame),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::debug!("[push] {} subscriber lagged, {n} frame(s) skipped", self.event);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Cloneable sending half of a [`PushChannel`].
#[derive(Debug, Clone)]
pub struct PushEmitter {
    outbound: mpsc::UnboundedSender<String>,
}

impl PushEmitter {
    pub fn emit<T: Serialize>(&self, event: &str, payload: &T) -> Result<()> {
        let frame = PushFrame::encode(event, payload)?;
        let text = serde_json::to_string(&frame)?;
        self.outbound
            .send(text)
            .map_err(|_| DashboardError::Push("push channel closed".to_string()))
    }
}

/// The far end of a [`PushChannel::loopback`]: injects inbound frames and
/// sees what the client sent.
pub struct Loopback {
    pub inbound: broadcast::Sender<PushFrame>,
    pub outbound: mpsc::UnboundedReceiver<String>,
}

impl Loopback {
    pub fn push(&self, frame: PushFrame) {
        let _ = self.inbound.send(frame);
    }

    /// Next frame the client emitted, if one is queued.
    pub fn try_sent(&mut self) -> Option<PushFrame> {
        let text = self.outbound.try_recv().ok()?;
        serde_json::from_str(&text).ok()
    }
}

impl PushChannel {
    /// Starts connecting to `url` (e.g. `ws://host:3710/ws`) in the
    /// background and keeps reconnecting until the channel is dropped.
    pub fn connect(url: impl Into<String>) -> Self {
        let url = url.into();
        let inbound = broadcast::channel(INBOUND_CAPACITY).0;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected) = watch::channel(false);

        let supervisor = tokio::spawn(supervise(url, inbound.clone(), outbound_rx, connected_tx));

        Self {
            inbound,
            outbound,
            connected,
            supervisor: Some(supervisor),
        }
    }

    /// A channel with no socket behind it.
    pub fn loopback() -> (Self, Loopback) {
        let inbound = broadcast::channel(INBOUND_CAPACITY).0;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (_, connected) = watch::channel(true);
        let channel = Self {
            inbound: inbound.clone(),
            outbound,
            connected,
            supervisor: None,
        };
        let peer = Loopback {
            inbound,
            outbound: outbound_rx,
        };
        (channel, peer)
    }

    pub fn subscribe(&self, event: &str) -> Subscription {
        Subscription {
            event: event.to_string(),
            rx: self.inbound.subscribe(),
        }
    }

    pub fn emitter(&self) -> PushEmitter {
        PushEmitter {
            outbound: self.outbound.clone(),
        }
    }

    pub fn emit<T: Serialize>(&self, event: &str, payload: &T) -> Result<()> {
        self.emitter().emit(event, payload)
    }

    /// Waits until the socket is up. False on timeout.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.connected.clone();
        tokio::time::timeout(timeout, rx.wait_for(|up| *up))
            .await
            .is_ok_and(|r| r.is_ok())
    }

    pub fn disconnect(self) {
        drop(self);
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        if let Some(task) = self.supervisor.take() {
            task.abort();
        }
    }
}

enum SessionEnd {
    /// Socket closed or failed; try again.
    Lost,
    /// Every sender is gone; stop for good.
    Shutdown,
}

async fn supervise(
    url: String,
    inbound: broadcast::Sender<PushFrame>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    connected: watch::Sender<bool>,
) {
    loop {
        let end = match connect_once(&url, &inbound, &mut outbound, &connected).await {
            Ok(end) => end,
            Err(e) => {
                log::warn!("[push] {url}: {e}");
                SessionEnd::Lost
            }
        };
        let _ = connected.send(false);

        if let SessionEnd::Shutdown = end {
            break;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
    log::info!("[push] supervisor for {url} stopped");
}

async fn connect_once(
    url: &str,
    inbound: &broadcast::Sender<PushFrame>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    connected: &watch::Sender<bool>,
) -> Result<SessionEnd> {
    log::info!("[push] connecting to {url}");
    let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut write, mut read) = ws_stream.split();
    let _ = connected.send(true);
    log::info!("[push] connected to {url}");

    loop {
        tokio::select! {
            item = read.next() => {
                let Some(item) = item else {
                    log::info!("[push] {url} closed by server");
                    return Ok(SessionEnd::Lost);
                };
                match item? {
                    Message::Text(text) => match serde_json::from_str::<PushFrame>(text.as_str()) {
                        Ok(frame) => {
                            let _ = inbound.send(frame);
                        }
                        Err(e) => log::debug!("[push] dropping malformed frame: {e}"),
                    },
                    Message::Close(_) => return Ok(SessionEnd::Lost),
                    _ => {}
                }
            }
            out = outbound.recv() => {
                let Some(text) = out else {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                };
                write.send(Message::Text(text.into())).await?;
            }
        }
    }
}
