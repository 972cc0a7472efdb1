//! A cooperative periodic task polling runtime state and diffing against
//! the previous snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::{interval, Duration};
use tracing::warn;

use crate::runtime::{ContainerStatus, RuntimeAdapter};
use crate::status::ContainerState;

/// One diff event emitted by a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    ContainerCreated(ContainerStatus),
    ContainerRemoved(String),
    StateChanged {
        name: String,
        old_state: ContainerState,
        new_state: ContainerState,
    },
    StatusUpdate(BTreeMap<String, ContainerStatus>),
    PollError(String),
}

struct ObserverState {
    snapshot: BTreeMap<String, ContainerStatus>,
    running: bool,
}

/// Periodic poller. `start()` is idempotent; `stop()` cancels the scheduled
/// tick; an immediate poll runs on `start()`.
pub struct Observer {
    adapter: Arc<RuntimeAdapter>,
    interval: Duration,
    events: mpsc::UnboundedSender<ObserverEvent>,
    state: Mutex<ObserverState>,
    stop_signal: Notify,
}

impl Observer {
    pub fn new(adapter: Arc<RuntimeAdapter>, interval: Duration) -> (Self, mpsc::UnboundedReceiver<ObserverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let observer = Self {
            adapter,
            interval,
            events: tx,
            state: Mutex::new(ObserverState {
                snapshot: BTreeMap::new(),
                running: false,
            }),
            stop_signal: Notify::new(),
        };
        (observer, rx)
    }

    /// Spawn the polling loop. A no-op if already running.
    pub async fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().await;
            if state.running {
                return;
            }
            state.running = true;
        }

        self.poll_once().await;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(this.interval);
            ticker.tick().await; // discard the immediate first tick
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        this.poll_once().await;
                    }
                    _ = this.stop_signal.notified() => {
                        break;
                    }
                }
            }
        });
    }

    /// Cancel the scheduled tick.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if state.running {
            state.running = false;
            self.stop_signal.notify_one();
        }
    }

    async fn poll_once(&self) {
        let containers = match self.adapter.get_all_container_statuses().await {
            Ok(containers) => containers,
            Err(e) => {
                warn!("observer poll failed: {}", e);
                let _ = self.events.send(ObserverEvent::PollError(e.to_string()));
                return;
            }
        };

        let mut state = self.state.lock().await;
        let previous = std::mem::take(&mut state.snapshot);

        for (name, status) in &containers {
            match previous.get(name) {
                None => {
                    let _ = self.events.send(ObserverEvent::ContainerCreated(status.clone()));
                }
                Some(old) if old.state != status.state => {
                    let _ = self.events.send(ObserverEvent::StateChanged {
                        name: name.clone(),
                        old_state: old.state,
                        new_state: status.state,
                    });
                }
                Some(_) => {}
            }
        }
        for name in previous.keys() {
            if !containers.contains_key(name) {
                let _ = self.events.send(ObserverEvent::ContainerRemoved(name.clone()));
            }
        }

        state.snapshot = containers.clone();
        let _ = self.events.send(ObserverEvent::StatusUpdate(containers));
    }
}
