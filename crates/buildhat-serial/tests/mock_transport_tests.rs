//! Mock 传输的行为测试

use buildhat_serial::{MockTransport, Transport, TransportError, TransportReader, TransportWriter};
use std::time::Duration;

fn read_until_timeout<R: TransportReader>(reader: &mut R) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 8];
    loop {
        match reader.read(&mut buf) {
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(TransportError::Timeout) => return out,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}

#[test]
fn test_pushed_lines_are_readable_in_small_chunks() {
    let (transport, device) = MockTransport::pair();
    let (mut reader, _writer) = transport.split().unwrap();

    device.push_line("P0: connected to active ID 4B");
    device.push_line("8.2 V");

    let data = read_until_timeout(&mut reader);
    assert_eq!(data, b"P0: connected to active ID 4B\r\n8.2 V\r\n");
}

#[test]
fn test_writes_are_recorded() {
    let (transport, device) = MockTransport::pair();
    let (_reader, mut writer) = transport.split().unwrap();

    writer.write_all(b"version\r").unwrap();
    writer.write_all(b"port 0 ; select 0\r").unwrap();

    assert_eq!(
        device.written_commands(),
        vec!["version".to_string(), "port 0 ; select 0".to_string()]
    );
    assert_eq!(
        device.next_write(Duration::from_millis(100)).as_deref(),
        Some(&b"version\r"[..])
    );
}

#[test]
fn test_close_wakes_reader_and_rejects_writes() {
    let (transport, device) = MockTransport::pair();
    let (mut reader, mut writer) = transport.split().unwrap();

    writer.close().unwrap();
    assert!(device.is_closed());

    let mut buf = [0u8; 4];
    assert!(matches!(reader.read(&mut buf), Err(TransportError::Closed)));
    assert!(matches!(
        writer.write_all(b"vin\r"),
        Err(TransportError::Closed)
    ));
}

#[test]
fn test_responder_replies_per_command() {
    let (transport, device) = MockTransport::pair();
    let (mut reader, mut writer) = transport.split().unwrap();

    let handle = device.spawn_responder(|cmd| match cmd {
        "vin" => vec!["7.9 V".to_string()],
        _ => Vec::new(),
    });

    writer.write_all(b"echo 0\rvin\r").unwrap();
    assert!(device.wait_for_written("vin", Duration::from_secs(1)));

    let mut collected = Vec::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    while !collected.ends_with(b"\r\n") && std::time::Instant::now() < deadline {
        collected.extend(read_until_timeout(&mut reader));
    }
    assert_eq!(collected, b"7.9 V\r\n");

    writer.close().unwrap();
    handle.join().unwrap();
}
