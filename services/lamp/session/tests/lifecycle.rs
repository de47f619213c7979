use lamp_session::{
    ConnectionManager, DeviceRegistry, MockTransport, SessionConfig, SessionEvent, SessionHandle,
    TransportCall, WriteMode,
};
use lamp_wire::{decrypt, encrypt, Characteristic, Command, Rgb, FRAGMENT_LEN};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const ADDR: &str = "AA:BB:CC:DD:EE:FF";

fn setup() -> (
    Arc<MockTransport>,
    ConnectionManager<MockTransport>,
    SessionHandle,
) {
    let transport = Arc::new(MockTransport::new());
    let (manager, handle) =
        ConnectionManager::standalone(ADDR, Arc::clone(&transport), SessionConfig::default());
    (transport, manager, handle)
}

async fn next_event(handle: &mut SessionHandle) -> SessionEvent {
    timeout(Duration::from_secs(120), handle.events.recv())
        .await
        .expect("no event in time")
        .expect("event channel closed")
}

fn decoded_commands(transport: &MockTransport) -> Vec<Vec<u8>> {
    transport
        .writes_to(Characteristic::Command)
        .iter()
        .map(|frame| decrypt(frame).unwrap()[..16].to_vec())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn burst_of_commands_sends_only_the_last() {
    let (transport, manager, _handle) = setup();
    let first = Command::light(Rgb::new(255, 0, 0), 255);
    let second = Command::off();

    manager.send(first);
    manager.send(second);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(decoded_commands(&transport), vec![second.as_bytes().to_vec()]);
    let stats = manager.stats();
    assert_eq!(stats.commands_written, 1);
    assert_eq!(stats.commands_superseded, 1);
}

#[tokio::test(start_paused = true)]
async fn command_outliving_its_ttl_is_never_sent() {
    let (transport, manager, _handle) = setup();
    transport.set_connect_delay(Duration::from_secs(20));

    manager.send(Command::off());
    tokio::time::sleep(Duration::from_secs(25)).await;

    assert!(manager.is_connected());
    assert!(transport.writes_to(Characteristic::Command).is_empty());
    assert_eq!(manager.stats().commands_expired, 1);
}

#[tokio::test(start_paused = true)]
async fn commands_are_written_with_response() {
    let (transport, manager, _handle) = setup();
    manager.send(Command::channel(3, 200).unwrap());
    tokio::time::sleep(Duration::from_secs(1)).await;

    let write = transport
        .calls()
        .into_iter()
        .find(|call| {
            matches!(
                call,
                TransportCall::Write {
                    characteristic: Characteristic::Command,
                    ..
                }
            )
        })
        .unwrap();
    match write {
        TransportCall::Write { data, mode, .. } => {
            assert_eq!(mode, WriteMode::WithResponse);
            assert_eq!(data.len(), 3 + 16 + 1);
        }
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn lost_link_triggers_full_rehandshake() {
    let (transport, manager, mut handle) = setup();
    manager.start();
    assert!(matches!(next_event(&mut handle).await, SessionEvent::Connected { .. }));
    let mut connectivity = manager.connectivity();
    assert!(*connectivity.borrow_and_update());

    transport.clear_calls();
    transport.drop_link();

    match next_event(&mut handle).await {
        SessionEvent::Disconnected { address, reason } => {
            assert_eq!(address, ADDR);
            assert!(reason.contains("heartbeat"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!manager.is_connected());
    assert!(matches!(next_event(&mut handle).await, SessionEvent::Connected { .. }));

    let calls = transport.calls();
    let disconnect = calls
        .iter()
        .position(|c| *c == TransportCall::Disconnect)
        .unwrap();
    let reconnect = calls
        .iter()
        .position(|c| matches!(c, TransportCall::Connect(_)))
        .unwrap();
    assert!(disconnect < reconnect);
    assert_eq!(calls[reconnect + 1], TransportCall::Subscribe(Characteristic::Notify));
    assert_eq!(calls[reconnect + 2], TransportCall::Read(Characteristic::Diagnostic));
    assert!(matches!(
        calls[reconnect + 3],
        TransportCall::Write {
            characteristic: Characteristic::Init,
            mode: WriteMode::WithoutResponse,
            ..
        }
    ));

    let stats = manager.stats();
    assert_eq!(stats.sessions_established, 2);
    assert_eq!(stats.sessions_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_write_is_retried_on_next_session() {
    let (transport, manager, mut handle) = setup();
    transport.fail_next_command_writes(1);

    manager.send(Command::off());
    assert!(matches!(next_event(&mut handle).await, SessionEvent::Connected { .. }));
    assert!(matches!(next_event(&mut handle).await, SessionEvent::Disconnected { .. }));
    assert!(matches!(next_event(&mut handle).await, SessionEvent::Connected { .. }));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(decoded_commands(&transport), vec![Command::off().as_bytes().to_vec()]);
    assert_eq!(manager.stats().commands_written, 1);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_failure_reconnects_after_cooldown() {
    let (transport, manager, mut handle) = setup();
    manager.start();
    next_event(&mut handle).await;

    // Handshake read succeeds; the first loop heartbeat already ran.
    transport.fail_next_reads(1);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(matches!(next_event(&mut handle).await, SessionEvent::Disconnected { .. }));
    let lost_at = tokio::time::Instant::now();
    assert!(matches!(next_event(&mut handle).await, SessionEvent::Connected { .. }));
    assert!(lost_at.elapsed() >= Duration::from_secs(1));
    assert_eq!(transport.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn fragmented_notifications_become_messages() {
    let (transport, manager, mut handle) = setup();
    manager.start();
    next_event(&mut handle).await;

    let first = [0xA0; FRAGMENT_LEN];
    let tail = [0xB1, 0xB2, 0xB3];
    transport.push_notification(&encrypt(&first));
    transport.push_notification(&encrypt(&tail));
    // Boundary with nothing buffered delivers an empty message
    transport.push_notification(&encrypt(&tail));
    transport.push_notification(&encrypt(&first));
    transport.push_notification(&encrypt(&[]));

    let mut payloads = Vec::new();
    for _ in 0..3 {
        match next_event(&mut handle).await {
            SessionEvent::MessageReceived { payload, .. } => payloads.push(payload.to_vec()),
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(payloads, vec![first.to_vec(), Vec::new(), first.to_vec()]);
    assert_eq!(manager.stats().messages_delivered, 3);
}

#[tokio::test(start_paused = true)]
async fn fragments_from_a_lost_link_are_discarded() {
    let (transport, manager, mut handle) = setup();
    manager.start();
    next_event(&mut handle).await;

    let stale = [0x5A; FRAGMENT_LEN];
    let fresh = [0xC3; FRAGMENT_LEN];
    transport.push_notification(&encrypt(&stale));
    tokio::task::yield_now().await;

    transport.drop_link();
    assert!(matches!(next_event(&mut handle).await, SessionEvent::Disconnected { .. }));
    assert!(matches!(next_event(&mut handle).await, SessionEvent::Connected { .. }));

    transport.push_notification(&encrypt(&fresh));
    transport.push_notification(&encrypt(&[0x01]));

    match next_event(&mut handle).await {
        SessionEvent::MessageReceived { payload, .. } => {
            assert_eq!(payload.as_ref(), &fresh[..]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn registry_managers_share_one_event_stream() {
    let transport = Arc::new(MockTransport::new());
    let (registry, mut handle) = DeviceRegistry::new(transport, SessionConfig::default());

    registry.send("11:22:33:44:55:66", Command::off()).await;
    registry.get_or_create("aa:aa:aa:aa:aa:aa").await;

    let mut connected = Vec::new();
    for _ in 0..2 {
        if let SessionEvent::Connected { address } = next_event(&mut handle).await {
            connected.push(address);
        }
    }
    connected.sort();
    assert_eq!(connected, vec!["11:22:33:44:55:66", "AA:AA:AA:AA:AA:AA"]);

    registry.shutdown_all().await;
    assert!(registry.addresses().await.is_empty());
}
