use super::*;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex as StdMutex,
    },
};

use async_trait::async_trait;
use reqwest::StatusCode;
use shared::domain::ConnectionStatus;
use tokio::sync::Notify;

use crate::error::StatusError;

#[derive(Clone)]
enum FetchReply {
    Status(ConnectionStatus),
    Gated(Arc<Notify>, ConnectionStatus),
    ServerError,
    MissingConnected,
}

#[derive(Clone)]
enum ActionReply {
    Accept,
    Reject(&'static str),
    Unreachable,
}

struct FakeBridgeApi {
    fetch_replies: StdMutex<VecDeque<FetchReply>>,
    default_fetch: StdMutex<FetchReply>,
    action_reply: StdMutex<ActionReply>,
    action_gate: StdMutex<Option<Arc<Notify>>>,
    fetch_calls: AtomicUsize,
    connect_phones: StdMutex<Vec<String>>,
    disconnect_calls: AtomicUsize,
}

impl FakeBridgeApi {
    fn returning(status: ConnectionStatus) -> Arc<Self> {
        Arc::new(Self {
            fetch_replies: StdMutex::new(VecDeque::new()),
            default_fetch: StdMutex::new(FetchReply::Status(status)),
            action_reply: StdMutex::new(ActionReply::Accept),
            action_gate: StdMutex::new(None),
            fetch_calls: AtomicUsize::new(0),
            connect_phones: StdMutex::new(Vec::new()),
            disconnect_calls: AtomicUsize::new(0),
        })
    }

    fn push_fetch(&self, reply: FetchReply) {
        self.fetch_replies.lock().unwrap().push_back(reply);
    }

    fn set_default_fetch(&self, reply: FetchReply) {
        *self.default_fetch.lock().unwrap() = reply;
    }

    fn set_action_reply(&self, reply: ActionReply) {
        *self.action_reply.lock().unwrap() = reply;
    }

    fn gate_actions(&self, gate: Arc<Notify>) {
        *self.action_gate.lock().unwrap() = Some(gate);
    }

    fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    async fn wait_for_fetches(&self, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.fetch_calls() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("fetch calls did not arrive in time");
    }

    async fn action_reply(&self) -> crate::error::Result<()> {
        let gate = self.action_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let reply = self.action_reply.lock().unwrap().clone();
        match reply {
            ActionReply::Accept => Ok(()),
            ActionReply::Reject(message) => Err(StatusError::Rejected(message.to_string())),
            ActionReply::Unreachable => Err(StatusError::HttpStatus {
                status: StatusCode::BAD_GATEWAY,
                body: "upstream unavailable".into(),
            }),
        }
    }
}

#[async_trait]
impl BridgeApi for FakeBridgeApi {
    async fn fetch_status(&self) -> crate::error::Result<ConnectionStatus> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .fetch_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_fetch.lock().unwrap().clone());
        match reply {
            FetchReply::Status(status) => Ok(status),
            FetchReply::Gated(gate, status) => {
                gate.notified().await;
                Ok(status)
            }
            FetchReply::ServerError => Err(StatusError::HttpStatus {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "boom".into(),
            }),
            FetchReply::MissingConnected => Err(StatusError::MissingField("connected")),
        }
    }

    async fn simulate_connect(&self, phone: &str) -> crate::error::Result<()> {
        self.connect_phones.lock().unwrap().push(phone.to_string());
        self.action_reply().await
    }

    async fn simulate_disconnect(&self) -> crate::error::Result<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.action_reply().await
    }

    async fn send_message(&self, _phone: &str, _message: &str) -> crate::error::Result<String> {
        Ok("Message sent successfully".into())
    }
}

#[derive(Default)]
struct RecordingTarget {
    frames: StdMutex<Vec<(RenderState, Controls)>>,
}

impl RecordingTarget {
    fn states(&self) -> Vec<RenderState> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|(state, _)| state.clone())
            .collect()
    }

    fn last_controls(&self) -> Option<Controls> {
        self.frames.lock().unwrap().last().map(|(_, controls)| *controls)
    }
}

impl RenderTarget for RecordingTarget {
    fn render(&self, state: &RenderState, controls: Controls) {
        self.frames.lock().unwrap().push((state.clone(), controls));
    }
}

#[derive(Default)]
struct RecordingNotifier {
    alerts: StdMutex<Vec<String>>,
}

impl RecordingNotifier {
    fn alerts(&self) -> Vec<String> {
        self.alerts.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn alert(&self, message: &str) {
        self.alerts.lock().unwrap().push(message.to_string());
    }
}

struct Harness {
    api: Arc<FakeBridgeApi>,
    target: Arc<RecordingTarget>,
    notifier: Arc<RecordingNotifier>,
    controller: Arc<StatusController>,
}

fn harness(status: ConnectionStatus) -> Harness {
    harness_with_interval(status, DEFAULT_POLL_INTERVAL)
}

fn harness_with_interval(status: ConnectionStatus, interval: Duration) -> Harness {
    let api = FakeBridgeApi::returning(status);
    let target = Arc::new(RecordingTarget::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let controller = StatusController::new_with_poll_interval(
        api.clone(),
        target.clone(),
        notifier.clone(),
        interval,
    );
    Harness {
        api,
        target,
        notifier,
        controller,
    }
}

fn connected(phone: Option<&str>, time: Option<f64>) -> ConnectionStatus {
    ConnectionStatus {
        connected: true,
        phone_number: phone.map(str::to_string),
        connection_time: time,
        ..ConnectionStatus::default()
    }
}

fn disconnected(qr: Option<&str>) -> ConnectionStatus {
    ConnectionStatus {
        connected: false,
        qr_code_image: qr.map(str::to_string),
        ..ConnectionStatus::default()
    }
}

#[tokio::test]
async fn connected_status_renders_connected_details() {
    let h = harness(connected(Some("15551234567"), Some(1_700_000_000.0)));

    let state = h.controller.refresh_status().await;

    assert_eq!(
        state,
        RenderState::Connected {
            phone_number: Some("15551234567".into()),
            connection_time: Some(1_700_000_000.0),
            bridge_error: None,
        }
    );
    assert_eq!(
        h.target.states(),
        vec![RenderState::Loading, state.clone()],
        "refresh must show loading before the fetched state"
    );
}

#[tokio::test]
async fn connected_status_never_carries_qr_content() {
    let mut status = connected(None, None);
    status.qr_code_image = Some("iVBORw0KGgo=".into());
    status.qr_code = Some("https://web.whatsapp.com/v2/code/abc".into());
    let h = harness(status);

    let state = h.controller.refresh_status().await;

    assert!(matches!(state, RenderState::Connected { .. }));
    let view = crate::render::render_html(&state, Controls::default());
    assert!(!view.content.contains("<img"));
}

#[tokio::test]
async fn disconnected_status_passes_qr_image_through() {
    let h = harness(disconnected(Some("iVBORw0K")));

    let state = h.controller.refresh_status().await;

    assert_eq!(
        state,
        RenderState::Disconnected {
            qr_code_image: Some("iVBORw0K".into()),
            qr_code: None,
            bridge_error: None,
        }
    );
}

#[tokio::test]
async fn disconnected_status_with_empty_qr_has_no_image() {
    let h = harness(disconnected(Some("")));

    let state = h.controller.refresh_status().await;

    assert!(matches!(
        state,
        RenderState::Disconnected {
            qr_code_image: None,
            ..
        }
    ));
}

#[tokio::test]
async fn server_error_resolves_to_error_state() {
    let h = harness(connected(None, None));
    h.api.set_default_fetch(FetchReply::ServerError);

    let state = h.controller.refresh_status().await;

    match &state {
        RenderState::Error { message } => {
            assert!(message.contains("500"), "unexpected message: {message}");
        }
        other => panic!("expected error state, got {other:?}"),
    }
    assert!(!h.controller.render_state().await.is_loading());
}

#[tokio::test]
async fn missing_connected_field_is_reported_as_error() {
    let h = harness(connected(None, None));
    h.api.set_default_fetch(FetchReply::MissingConnected);

    let state = h.controller.refresh_status().await;

    assert_eq!(
        state,
        RenderState::Error {
            message: "response is missing the `connected` field".into()
        }
    );
}

#[tokio::test]
async fn repeated_refresh_with_same_response_is_idempotent() {
    let h = harness(disconnected(None));

    let first = h.controller.refresh_status().await;
    let second = h.controller.refresh_status().await;

    assert_eq!(first, second);
    assert_eq!(h.api.fetch_calls(), 2);
}

#[tokio::test]
async fn error_state_recovers_on_manual_retry() {
    let h = harness(connected(Some("15551234567"), None));
    h.api.push_fetch(FetchReply::ServerError);

    let failed = h.controller.refresh_status().await;
    assert!(matches!(failed, RenderState::Error { .. }));

    let retried = h.controller.refresh_status().await;
    assert!(matches!(retried, RenderState::Connected { .. }));
}

#[tokio::test]
async fn stale_response_is_discarded_when_newer_request_exists() {
    let h = harness(disconnected(None));
    let gate = Arc::new(Notify::new());
    h.api
        .push_fetch(FetchReply::Gated(gate.clone(), connected(Some("111"), None)));
    h.api.push_fetch(FetchReply::Status(disconnected(Some("iVBORw0K"))));

    let controller = h.controller.clone();
    let slow = tokio::spawn(async move { controller.refresh_status().await });
    h.api.wait_for_fetches(1).await;

    let fast = h.controller.refresh_status().await;
    gate.notify_one();
    let after_slow = slow.await.expect("slow refresh task");

    assert!(matches!(fast, RenderState::Disconnected { .. }));
    assert_eq!(after_slow, fast);
    assert_eq!(h.controller.render_state().await, fast);
    assert!(h
        .target
        .states()
        .iter()
        .all(|state| !matches!(state, RenderState::Connected { .. })));
}

#[tokio::test]
async fn successful_connect_triggers_refresh() {
    let h = harness(connected(Some("919876543210"), Some(1_700_000_000.0)));

    let outcome = h.controller.simulate_connect("919876543210").await;

    assert_eq!(outcome, ActionOutcome::Completed);
    assert_eq!(
        h.api.connect_phones.lock().unwrap().as_slice(),
        ["919876543210".to_string()]
    );
    assert_eq!(h.api.fetch_calls(), 1);
    assert!(matches!(
        h.controller.render_state().await,
        RenderState::Connected { .. }
    ));
    assert!(h.notifier.alerts().is_empty());
}

#[tokio::test]
async fn rejected_connect_alerts_and_leaves_state_untouched() {
    let h = harness(disconnected(None));
    let before = h.controller.refresh_status().await;
    h.api.set_action_reply(ActionReply::Reject("already paired"));

    let outcome = h.controller.simulate_connect("15551234567").await;

    assert_eq!(
        outcome,
        ActionOutcome::Rejected("Failed to simulate connection: already paired".into())
    );
    assert_eq!(
        h.notifier.alerts(),
        vec!["Failed to simulate connection: already paired".to_string()]
    );
    assert_eq!(h.api.fetch_calls(), 1, "no refresh after a rejected action");
    assert_eq!(h.controller.render_state().await, before);
}

#[tokio::test]
async fn unreachable_disconnect_shows_generic_alert() {
    let h = harness(connected(Some("15551234567"), None));
    let before = h.controller.refresh_status().await;
    h.api.set_action_reply(ActionReply::Unreachable);

    let outcome = h.controller.simulate_disconnect().await;

    assert_eq!(
        outcome,
        ActionOutcome::Failed("Error simulating disconnection".into())
    );
    assert_eq!(
        h.notifier.alerts(),
        vec!["Error simulating disconnection".to_string()]
    );
    assert_eq!(h.api.disconnect_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.controller.render_state().await, before);
}

#[tokio::test]
async fn repeated_action_while_in_flight_is_ignored() {
    let h = harness(disconnected(None));
    let gate = Arc::new(Notify::new());
    h.api.gate_actions(gate.clone());

    let controller = h.controller.clone();
    let first = tokio::spawn(async move { controller.simulate_disconnect().await });
    tokio::time::timeout(Duration::from_secs(2), async {
        while h.api.disconnect_calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first disconnect started");

    assert!(!h.controller.controls().await.simulate_disconnect);
    assert_eq!(
        h.target.last_controls().map(|c| c.simulate_disconnect),
        Some(false)
    );
    assert!(h.controller.controls().await.simulate_connect);

    let repeated = h.controller.simulate_disconnect().await;
    assert_eq!(repeated, ActionOutcome::Ignored);
    assert_eq!(h.api.disconnect_calls.load(Ordering::SeqCst), 1);

    gate.notify_one();
    assert_eq!(first.await.expect("task"), ActionOutcome::Completed);
    assert!(h.controller.controls().await.simulate_disconnect);
}

#[tokio::test]
async fn polling_refreshes_until_shutdown() {
    let h = harness_with_interval(disconnected(None), Duration::from_millis(20));

    h.controller.start().await;
    assert!(h.controller.is_polling().await);
    h.api.wait_for_fetches(4).await;

    h.controller.shutdown().await;
    assert!(!h.controller.is_polling().await);
    tokio::time::sleep(Duration::from_millis(60)).await;
    let settled = h.api.fetch_calls();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.api.fetch_calls(), settled);
}

#[tokio::test]
async fn starting_polling_twice_keeps_one_timer() {
    let h = harness_with_interval(disconnected(None), Duration::from_millis(40));

    h.controller.start_polling().await;
    h.controller.start_polling().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.controller.shutdown().await;

    let calls = h.api.fetch_calls();
    assert!(
        (1..=3).contains(&calls),
        "one 40ms timer over ~100ms should fire at most three times, got {calls}"
    );
}

#[tokio::test]
async fn start_refreshes_immediately_before_first_tick() {
    let h = harness_with_interval(disconnected(Some("iVBORw0KGgo=")), Duration::from_secs(30));

    h.controller.start().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.api.fetch_calls(), 1);
    assert_eq!(
        h.target.states(),
        vec![
            RenderState::Loading,
            RenderState::from_status(disconnected(Some("iVBORw0KGgo="))),
        ]
    );
    h.controller.shutdown().await;
}

#[tokio::test]
async fn unreachable_bridge_error_names_the_connection_cause() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let target = Arc::new(RecordingTarget::default());
    let controller = StatusController::new(
        Arc::new(crate::api::HttpBridgeApi::new(format!("http://{addr}"))),
        target.clone(),
        Arc::new(RecordingNotifier::default()),
    );

    let RenderState::Error { message } = controller.refresh_status().await else {
        panic!("expected error state");
    };
    assert!(message.starts_with("request failed: "), "{message}");
    assert!(
        message.to_lowercase().contains("refused"),
        "cause missing from {message}"
    );
    assert_eq!(target.states().last(), Some(&RenderState::Error { message }));
}
