use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use super::{MarkerEvent, MarkerEventKind, MarkerHandler, MarkerListener};
use crate::config::Settings;
use crate::hub::{HubConnection, HubConnectionState};
use crate::test_support::{accepted, invocation, spawn_hub};

struct Recorder {
    events: Mutex<Vec<MarkerEvent>>,
    notify: mpsc::UnboundedSender<()>,
}

impl Recorder {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<()>) {
        let (notify, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
                notify,
            }),
            rx,
        )
    }

    fn record(&self, event: MarkerEvent) {
        self.events.lock().unwrap().push(event);
        let _ = self.notify.send(());
    }
}

impl MarkerHandler for Recorder {
    fn update_marker(&self, id: i32) {
        self.record(MarkerEvent::Update(id));
    }

    fn remove_marker(&self, id: i32) {
        self.record(MarkerEvent::Delete(id));
    }

    fn request_marker(&self, id: i32) {
        self.record(MarkerEvent::Add(id));
    }
}

#[test]
fn test_event_kinds_map_to_targets() {
    assert_eq!(MarkerEventKind::Update.target(), "UpdateMarker");
    assert_eq!(MarkerEventKind::Delete.target(), "DeleteMarker");
    assert_eq!(MarkerEventKind::Add.target(), "AddMarker");

    for kind in MarkerEventKind::ALL {
        assert_eq!(MarkerEventKind::from_target(kind.target()), Some(kind));
        assert_eq!(kind.event(4).kind(), kind);
        assert_eq!(kind.event(4).id(), 4);
    }
    assert_eq!(MarkerEventKind::from_target("updatemarker"), None);
}

#[test]
fn test_forward_calls_matching_handler_method() {
    let (recorder, _rx) = Recorder::new();
    MarkerEvent::Update(1).forward(recorder.as_ref());
    MarkerEvent::Delete(2).forward(recorder.as_ref());
    MarkerEvent::Add(3).forward(recorder.as_ref());

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![
            MarkerEvent::Update(1),
            MarkerEvent::Delete(2),
            MarkerEvent::Add(3)
        ]
    );
}

#[test]
fn test_listener_registers_all_targets() {
    let (recorder, _rx) = Recorder::new();
    let connection = HubConnection::builder("http://127.0.0.1:1/update")
        .build()
        .unwrap();
    let listener = MarkerListener::with_connection(connection, recorder.clone());

    let handlers = listener.connection().handlers();
    for kind in MarkerEventKind::ALL {
        assert!(handlers.contains(kind.target()));
    }

    handlers.dispatch("DeleteMarker", &[json!(11)]).unwrap();
    assert_eq!(*recorder.events.lock().unwrap(), vec![MarkerEvent::Delete(11)]);
    assert_eq!(listener.state(), HubConnectionState::Disconnected);
}

#[test]
fn test_listener_from_settings_rejects_bad_url() {
    let (recorder, _rx) = Recorder::new();
    let mut settings = Settings::default().hub;
    settings.url = "not a url".to_string();
    assert!(MarkerListener::new(&settings, recorder).is_err());
}

#[tokio::test]
async fn test_server_events_reach_handler_in_order() {
    let frames = vec![
        invocation("UpdateMarker", json!([1])),
        format!(
            "{}{}",
            invocation("DeleteMarker", json!([2])),
            invocation("AddMarker", json!([3]))
        ),
    ];
    let hub = spawn_hub(accepted(), frames).await;

    let mut settings = Settings::default().hub;
    settings.url = hub.url.clone();
    settings.skip_negotiation = true;

    let (recorder, mut rx) = Recorder::new();
    let listener = MarkerListener::new(&settings, recorder.clone()).unwrap();
    listener.start().await.unwrap();

    for _ in 0..3 {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for marker event");
    }
    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![
            MarkerEvent::Update(1),
            MarkerEvent::Delete(2),
            MarkerEvent::Add(3)
        ]
    );

    listener.stop().await.unwrap();
    assert_eq!(listener.state(), HubConnectionState::Disconnected);
    hub.session.await.unwrap();
}
