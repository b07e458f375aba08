//! SDK 门面与日志初始化测试

use buildhat_sdk::prelude::*;
use buildhat_sdk::serial::MockTransport;
use std::thread;
use std::time::Duration;

#[test]
fn test_prelude_opens_mock_board_with_logging() {
    buildhat_sdk::logging::init_logging("buildhat_driver=trace,info").unwrap();
    // 进程内第二次安装失败
    assert!(buildhat_sdk::logging::init_logging("info").is_err());

    let (transport, device) = MockTransport::pair();
    device.spawn_responder(|line| match line {
        "list" => (0..4).map(|p| format!("P{p}: no device detected")).collect(),
        "vin" => vec!["7.9 V".to_string()],
        _ => Vec::new(),
    });

    let hat: BuildHat = HatBuilder::new()
        .skip_firmware_check()
        .list_timeout(Duration::from_millis(500))
        .build_with(transport)
        .unwrap();

    assert_eq!(hat.voltage().unwrap(), 7.9);
    assert!(matches!(hat.motor(Port::A), Err(HatError::NoDevice(Port::A))));
    assert!(hat.port_states().iter().all(|s| !s.connected));

    let driver: &Driver = hat.hat();
    assert!(driver.is_running());
    hat.close();
    thread::sleep(Duration::from_millis(10));
    assert!(device.is_closed());
}
