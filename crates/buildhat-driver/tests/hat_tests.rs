//! Hat 驱动的端到端测试（mock 传输）

use buildhat_driver::{
    ConnectionState, DeviceKind, DispatcherConfig, DriverBuilder, DriverError, Hat, LineDirection,
    LineRecorder, LinkKind, Reply, RequestKey,
};
use buildhat_protocol::{ModeSelector, Port, SensorValue, VersionReply};
use buildhat_serial::{MockDevice, MockTransport};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);

fn setup() -> (Arc<Hat>, MockDevice) {
    let (transport, device) = MockTransport::pair();
    let hat = DriverBuilder::new()
        .dispatcher_config(DispatcherConfig::default())
        .build_with(transport)
        .unwrap();
    (Arc::new(hat), device)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

fn first_int(reply: Reply) -> i64 {
    match reply {
        Reply::SensorData(reading) => reading.int(0).unwrap(),
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[test]
fn test_read_mode_sends_select_and_returns_values() {
    let (hat, device) = setup();

    let reader = {
        let hat = hat.clone();
        thread::spawn(move || hat.read_mode(Port::A, ModeSelector::decoded(0), WAIT))
    };

    assert!(device.wait_for_written("port 0 ; select 0\r", WAIT));
    device.push_line("P0M0: 15 -10 5");

    let reading = reader.join().unwrap().unwrap();
    assert_eq!(
        reading.values(),
        &[
            SensorValue::Int(15),
            SensorValue::Int(-10),
            SensorValue::Int(5)
        ]
    );
}

#[test]
fn test_sensor_replies_resolve_in_issue_order() {
    let (hat, device) = setup();
    let key = RequestKey::SensorData(Port::B);

    let waiters: Vec<_> = (0..4).map(|_| hat.expect(key)).collect();
    assert_eq!(hat.pending(key), 4);

    let handles: Vec<_> = waiters
        .into_iter()
        .map(|waiter| {
            let hat = hat.clone();
            thread::spawn(move || first_int(hat.wait(waiter, WAIT).unwrap()))
        })
        .collect();

    for value in 1..=4 {
        device.push_line(&format!("P1C0: {value} 0 0"));
    }

    let values: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(values, vec![1, 2, 3, 4]);
}

#[test]
fn test_timed_out_waiter_is_not_resolved_later() {
    let (hat, device) = setup();
    let key = RequestKey::SensorData(Port::A);

    let stale = hat.expect(key);
    let err = hat.wait(stale, Duration::from_millis(20)).unwrap_err();
    assert!(matches!(err, DriverError::Timeout { key: k } if k == key));
    assert_eq!(hat.pending(key), 0);

    let next = hat.expect(key);
    device.push_line("P0M0: 7");
    assert_eq!(first_int(hat.wait(next, WAIT).unwrap()), 7);

    // 没有等待者时的数据行进入缓存，下一次读取直接返回
    device.push_line("P0M0: 8");
    assert!(wait_until(|| hat.metrics().replies_unsolicited >= 1));
    let reading = hat.read_sensor(Port::A, Duration::from_millis(10)).unwrap();
    assert_eq!(reading.int(0), Some(8));
}

#[test]
fn test_port_connect_and_disconnect() {
    let (hat, device) = setup();

    device.push_line("P0: connected to active ID 4B");
    assert!(wait_until(|| hat.port_state(Port::A).connected));
    let state = hat.port_state(Port::A);
    assert_eq!(state.device_type_id, 75);
    assert_eq!(state.link, Some(LinkKind::Active));
    assert_eq!(state.device_kind(), Some(DeviceKind::ActiveMotor(75)));

    device.push_line("P0: disconnected");
    assert!(wait_until(|| !hat.port_state(Port::A).connected));
    assert_eq!(hat.port_state(Port::A), ConnectionState::DISCONNECTED);
}

#[test]
fn test_query_voltage() {
    let (hat, device) = setup();
    let _responder = device.spawn_responder(|cmd| match cmd {
        "vin" => vec!["8.2 V".to_string()],
        _ => Vec::new(),
    });

    assert_eq!(hat.query_voltage().unwrap(), 8.2);
}

#[test]
fn test_query_version() {
    let (hat, device) = setup();
    let _responder = device.spawn_responder(|cmd| match cmd {
        "version" => vec!["Firmware version: 1737564117 2025-01-22T16:41:57+00:00".to_string()],
        _ => Vec::new(),
    });

    let reply = hat.query_version(WAIT).unwrap();
    assert_eq!(
        reply,
        VersionReply::Firmware {
            version: "1737564117 2025-01-22T16:41:57+00:00".to_string()
        }
    );
}

#[test]
fn test_unsolicited_lines_interleaved_with_reply() {
    let (hat, device) = setup();
    let _responder = device.spawn_responder(|cmd| match cmd {
        "vin" => vec![
            "P2C0: 0 10 10".to_string(),
            "P3: no device detected".to_string(),
            "7.5 V".to_string(),
        ],
        _ => Vec::new(),
    });

    assert_eq!(hat.query_voltage().unwrap(), 7.5);
    assert!(!hat.port_state(Port::D).connected);
}

#[test]
fn test_close_releases_pending_waiters() {
    let (hat, device) = setup();
    let waiter = hat.expect(RequestKey::RampDone(Port::C));

    hat.close();
    assert!(device.is_closed());
    assert!(matches!(hat.wait(waiter, WAIT), Err(DriverError::Closed)));
    assert!(matches!(hat.query_voltage(), Err(DriverError::Closed)));
}

#[test]
fn test_recorder_hook_sees_traffic() {
    let (hat, device) = setup();
    let (recorder, rx) = LineRecorder::new(64);
    hat.add_callback(Arc::new(recorder));

    hat.send(&buildhat_protocol::Command::List).unwrap();
    device.push_line("P1: connected to passive ID 1");

    let sent = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(sent.direction, LineDirection::Sent);
    assert_eq!(sent.text, "list");

    let received = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(received.direction, LineDirection::Received);
    assert_eq!(received.text, "P1: connected to passive ID 1");
}

#[test]
fn test_malformed_and_overlong_lines_are_counted() {
    let (transport, device) = MockTransport::pair();
    let hat = Hat::new(
        transport,
        DispatcherConfig {
            max_line_len: 16,
            ..DispatcherConfig::default()
        },
    )
    .unwrap();

    device.push_line("P0M0: 1 two 3");
    device.push_line(&"x".repeat(64));
    device.push_line("8.0 V");

    assert!(wait_until(|| {
        let m = hat.metrics();
        m.replies_unsolicited == 1 && m.lines_overlong == 1
    }));
    let snapshot = hat.metrics();
    assert_eq!(snapshot.lines_received, 2);
    assert_eq!(snapshot.lines_dropped, 2);
    assert_eq!(snapshot.replies_unsolicited, 1);
}

#[test]
fn test_concurrent_sends_never_interleave() {
    let (hat, device) = setup();

    let senders: Vec<_> = Port::ALL
        .into_iter()
        .map(|port| {
            let hat = hat.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    hat.send(&buildhat_protocol::Command::Port(port)).unwrap();
                }
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }

    let commands = device.written_commands();
    assert_eq!(commands.len(), 200);
    for port in Port::ALL {
        let expected = format!("port {}", port.index());
        assert_eq!(commands.iter().filter(|c| **c == expected).count(), 50);
    }
}
