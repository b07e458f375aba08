//! 固件检测与写入流程测试（模拟设备）

mod common;

use buildhat_client::{
    FirmwareBundle, FirmwareStage, FirmwareState, FirmwareTiming, FirmwareUpdater, HatBuilder,
    HatError,
};
use buildhat_driver::{DispatcherConfig, DriverError, Hat};
use buildhat_protocol::checksum;
use buildhat_serial::MockTransport;
use common::{RUNNING_VERSION, SimState, has_command, simulate};
use std::time::{Duration, Instant};

fn bundle(version: &str) -> FirmwareBundle {
    FirmwareBundle::new(vec![0x10, 0x20, 0x30, 0x40], vec![0x55; 8], version)
}

fn builder() -> HatBuilder {
    HatBuilder::new()
        .detect_timeout(Duration::from_millis(500))
        .list_timeout(Duration::from_millis(500))
        .firmware_timing(FirmwareTiming::IMMEDIATE)
}

#[test]
fn test_bootloader_is_flashed_in_order() {
    let (transport, device, state) = simulate(SimState {
        bootloader: true,
        ..SimState::default()
    });
    let firmware = bundle(RUNNING_VERSION);
    let sum = checksum(firmware.firmware());

    let hat = builder()
        .firmware_bundle(firmware)
        .build_with(transport)
        .unwrap();

    assert_eq!(
        hat.firmware_state(),
        &FirmwareState::UpToDate {
            version: RUNNING_VERSION.to_string()
        }
    );
    assert!(!state.lock().unwrap().bootloader);

    let mut expected = format!("version\rclear\rload 4 {sum}\r").into_bytes();
    expected.extend_from_slice(&[0x02, 0x10, 0x20, 0x30, 0x40, 0x03, b'\r']);
    expected.extend_from_slice(b"signature 8\r");
    expected.push(0x02);
    expected.extend_from_slice(&[0x55; 8]);
    expected.extend_from_slice(&[0x03, b'\r']);
    expected.extend_from_slice(b"reboot\rversion\r");

    let written = device.written();
    assert!(
        written.starts_with(&expected),
        "written: {:?}",
        String::from_utf8_lossy(&written)
    );
    assert!(has_command(&device, "list"));
}

#[test]
fn test_bootloader_without_bundle_fails() {
    let (transport, device, _) = simulate(SimState {
        bootloader: true,
        ..SimState::default()
    });
    let err = builder().build_with(transport).unwrap_err();
    assert!(matches!(err, HatError::BootloaderWithoutFirmware));
    assert!(!has_command(&device, "clear"));
}

#[test]
fn test_bundle_loaded_from_firmware_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("firmware.bin"), [0x10, 0x20, 0x30, 0x40]).unwrap();
    std::fs::write(dir.path().join("signature.bin"), [0x55; 8]).unwrap();
    std::fs::write(dir.path().join("version"), format!("{RUNNING_VERSION}\n")).unwrap();

    let (transport, device, _) = simulate(SimState {
        bootloader: true,
        ..SimState::default()
    });
    let hat = builder()
        .firmware_dir(dir.path())
        .build_with(transport)
        .unwrap();
    assert!(matches!(hat.firmware_state(), FirmwareState::UpToDate { .. }));
    assert!(has_command(&device, "signature 8"));
}

#[test]
fn test_version_mismatch_is_reported_not_flashed() {
    let (transport, device, _) = simulate(SimState::default());
    let hat = builder()
        .firmware_bundle(bundle("1674818421"))
        .build_with(transport)
        .unwrap();
    assert_eq!(
        hat.firmware_state(),
        &FirmwareState::Outdated {
            running: RUNNING_VERSION.to_string(),
            bundled: "1674818421".to_string(),
        }
    );
    assert!(!has_command(&device, "clear"));
}

#[test]
fn test_detection_timeout_fails_open() {
    let (transport, device, _) = simulate(SimState {
        answer_version: false,
        ..SimState::default()
    });
    let started = Instant::now();
    let hat = builder()
        .detect_timeout(Duration::from_millis(50))
        .firmware_bundle(bundle(RUNNING_VERSION))
        .build_with(transport)
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(hat.firmware_state(), &FirmwareState::Unknown);
    assert!(!has_command(&device, "clear"));
    assert!(hat.port_state(buildhat_protocol::Port::A).connected);
}

#[test]
fn test_transport_failure_is_stage_tagged() {
    let (transport, _device) = MockTransport::pair();
    let hat = Hat::new(transport, DispatcherConfig::default()).unwrap();
    hat.close();

    let updater = FirmwareUpdater::new(&hat, FirmwareTiming::IMMEDIATE, Duration::from_millis(10));
    let err = updater.update(&bundle(RUNNING_VERSION)).unwrap_err();
    match err {
        HatError::FirmwareUpdate { stage, source } => {
            assert_eq!(stage, FirmwareStage::Clear);
            assert!(matches!(source, DriverError::Closed));
        },
        other => panic!("unexpected: {other:?}"),
    }
}
