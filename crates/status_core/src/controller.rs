//! The status widget's state machine: polling, action dispatch and render hand-off.

use std::{future::Future, sync::Arc, time::Duration};

use shared::error::ErrorKind;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    api::BridgeApi,
    error::Result,
    render::{Notifier, RenderTarget},
    state::{Controls, RenderState},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_SIMULATED_PHONE: &str = "919876543210";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Connect,
    Disconnect,
}

impl ActionKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "simulate_connect",
            Self::Disconnect => "simulate_disconnect",
        }
    }

    fn rejected_prefix(self) -> &'static str {
        match self {
            Self::Connect => "Failed to simulate connection",
            Self::Disconnect => "Failed to simulate disconnection",
        }
    }

    fn transport_message(self) -> &'static str {
        match self {
            Self::Connect => "Error simulating connection",
            Self::Disconnect => "Error simulating disconnection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    Rejected(String),
    Failed(String),
    Ignored,
}

struct ControllerState {
    render_state: RenderState,
    issued_seq: u64,
    connect_in_flight: bool,
    disconnect_in_flight: bool,
}

impl ControllerState {
    fn controls(&self) -> Controls {
        Controls {
            refresh: true,
            simulate_connect: !self.connect_in_flight,
            simulate_disconnect: !self.disconnect_in_flight,
        }
    }

    fn in_flight(&mut self, kind: ActionKind) -> &mut bool {
        match kind {
            ActionKind::Connect => &mut self.connect_in_flight,
            ActionKind::Disconnect => &mut self.disconnect_in_flight,
        }
    }
}

/// One widget instance: owns its render state, render target, notifier and
/// poll timer. Instances are independent of each other.
pub struct StatusController {
    api: Arc<dyn BridgeApi>,
    target: Arc<dyn RenderTarget>,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    inner: Mutex<ControllerState>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl StatusController {
    pub fn new(
        api: Arc<dyn BridgeApi>,
        target: Arc<dyn RenderTarget>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Self::new_with_poll_interval(api, target, notifier, DEFAULT_POLL_INTERVAL)
    }

    pub fn new_with_poll_interval(
        api: Arc<dyn BridgeApi>,
        target: Arc<dyn RenderTarget>,
        notifier: Arc<dyn Notifier>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            api,
            target,
            notifier,
            poll_interval,
            inner: Mutex::new(ControllerState {
                render_state: RenderState::Loading,
                issued_seq: 0,
                connect_in_flight: false,
                disconnect_in_flight: false,
            }),
            poll_task: Mutex::new(None),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub async fn render_state(&self) -> RenderState {
        self.inner.lock().await.render_state.clone()
    }

    pub async fn controls(&self) -> Controls {
        self.inner.lock().await.controls()
    }

    pub async fn start(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.refresh_status().await;
        });
        self.start_polling().await;
    }

    /// Starts the recurring refresh. Each tick spawns its own refresh, so a
    /// slow response never delays the next tick.
    pub async fn start_polling(self: &Arc<Self>) {
        let mut slot = self.poll_task.lock().await;
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("status polling already running");
            return;
        }

        let period = self.poll_interval;
        if period.is_zero() {
            warn!("poll interval is zero; status polling disabled");
            return;
        }

        let controller = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                tokio::spawn(async move {
                    controller.refresh_status().await;
                });
            }
        }));
        info!(interval_secs = period.as_secs_f64(), "status polling started");
    }

    pub async fn is_polling(&self) -> bool {
        self.poll_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Cancels the poll timer. Requests already in flight still complete.
    pub async fn shutdown(&self) {
        if let Some(task) = self.poll_task.lock().await.take() {
            task.abort();
            info!("status polling stopped");
        }
    }

    /// Moves to `Loading`, fetches status and applies the outcome unless a
    /// newer refresh was issued meanwhile. Returns the state shown afterwards.
    pub async fn refresh_status(&self) -> RenderState {
        let seq = {
            let mut guard = self.inner.lock().await;
            guard.issued_seq += 1;
            guard.render_state = RenderState::Loading;
            // Targets are called under the lock so frames arrive in state order.
            self.target.render(&guard.render_state, guard.controls());
            guard.issued_seq
        };
        debug!(seq, "refreshing bridge status");

        let outcome = self.api.fetch_status().await;
        if let Err(err) = &outcome {
            warn!(seq, kind = ?err.kind(), error = %err.describe(), "status fetch failed");
        }
        let next = RenderState::from_outcome(outcome);

        let mut guard = self.inner.lock().await;
        if seq != guard.issued_seq {
            debug!(
                seq,
                newest = guard.issued_seq,
                "discarding status response superseded by a newer request"
            );
            return guard.render_state.clone();
        }
        guard.render_state = next;
        self.target.render(&guard.render_state, guard.controls());
        info!(seq, state = guard.render_state.name(), "status applied");
        guard.render_state.clone()
    }

    pub async fn simulate_connect(&self, phone: &str) -> ActionOutcome {
        self.run_action(ActionKind::Connect, self.api.simulate_connect(phone))
            .await
    }

    pub async fn simulate_disconnect(&self) -> ActionOutcome {
        self.run_action(ActionKind::Disconnect, self.api.simulate_disconnect())
            .await
    }

    async fn run_action(
        &self,
        kind: ActionKind,
        request: impl Future<Output = Result<()>>,
    ) -> ActionOutcome {
        if !self.set_in_flight(kind, true).await {
            debug!(action = kind.name(), "action already in flight; ignoring");
            return ActionOutcome::Ignored;
        }
        let result = request.await;
        self.set_in_flight(kind, false).await;

        match result {
            Ok(()) => {
                info!(action = kind.name(), "action accepted; refreshing status");
                self.refresh_status().await;
                ActionOutcome::Completed
            }
            Err(err) if err.kind() == ErrorKind::LogicalFailure => {
                let message = format!("{}: {err}", kind.rejected_prefix());
                warn!(action = kind.name(), error = %err, "action rejected by bridge");
                self.notifier.alert(&message);
                ActionOutcome::Rejected(message)
            }
            Err(err) => {
                error!(action = kind.name(), error = %err.describe(), "action request failed");
                let message = kind.transport_message().to_string();
                self.notifier.alert(&message);
                ActionOutcome::Failed(message)
            }
        }
    }

    /// Returns false when `in_flight` is requested but the action is already running.
    async fn set_in_flight(&self, kind: ActionKind, in_flight: bool) -> bool {
        let mut guard = self.inner.lock().await;
        let flag = guard.in_flight(kind);
        if in_flight && *flag {
            return false;
        }
        *flag = in_flight;
        self.target.render(&guard.render_state, guard.controls());
        true
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
