//! 固件检测与更新
//!
//! 打开串口后先查询 `version`：
//!
//! - 回复 bootloader 横幅 → 需要写入固件
//! - 回复 `Firmware version: …` → 与固件包的版本比较
//! - 超时 → 视为“不在 bootloader”（记 warn 日志后继续）
//!
//! 写入流程（每步之间固定等待，不重试、不回滚）：
//!
//! ```text
//! clear → load LEN CHECKSUM → STX+firmware+ETX → signature LEN → STX+signature+ETX → reboot
//! ```

use crate::config::FirmwareTiming;
use crate::error::HatError;
use buildhat_driver::{DriverError, Hat};
use buildhat_protocol::{Command, VersionReply, checksum, frame_payload};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// 固件包中的文件名
pub const FIRMWARE_FILE: &str = "firmware.bin";
pub const SIGNATURE_FILE: &str = "signature.bin";
pub const VERSION_FILE: &str = "version";

/// 固件包（固件镜像、签名、版本号）
#[derive(Clone, PartialEq, Eq)]
pub struct FirmwareBundle {
    firmware: Vec<u8>,
    signature: Vec<u8>,
    version: String,
}

impl FirmwareBundle {
    pub fn new(firmware: Vec<u8>, signature: Vec<u8>, version: impl AsRef<str>) -> Self {
        Self {
            firmware,
            signature,
            version: version.as_ref().trim().to_string(),
        }
    }

    /// 从目录加载（`firmware.bin`、`signature.bin`、`version`）
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, HatError> {
        let dir = dir.as_ref();
        let read = |name: &str| {
            let path = dir.join(name);
            fs::read(&path)
                .map_err(|e| HatError::FirmwareResource(format!("{}: {}", path.display(), e)))
        };
        let firmware = read(FIRMWARE_FILE)?;
        let signature = read(SIGNATURE_FILE)?;
        let version = String::from_utf8(read(VERSION_FILE)?).map_err(|_| {
            HatError::FirmwareResource(format!("{}: not valid UTF-8", dir.join(VERSION_FILE).display()))
        })?;

        if firmware.is_empty() {
            return Err(HatError::FirmwareResource(format!(
                "{}: empty firmware image",
                dir.join(FIRMWARE_FILE).display()
            )));
        }
        Ok(Self::new(firmware, signature, version))
    }

    pub fn firmware(&self) -> &[u8] {
        &self.firmware
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// 固件镜像的校验和
    pub fn checksum(&self) -> u32 {
        checksum(&self.firmware)
    }
}

impl fmt::Debug for FirmwareBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirmwareBundle")
            .field("firmware_len", &self.firmware.len())
            .field("signature_len", &self.signature.len())
            .field("version", &self.version)
            .finish()
    }
}

/// 固件检测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareState {
    /// 设备在 bootloader 中
    Bootloader,
    /// 运行中的固件（没有固件包可比较）
    Running { version: String },
    /// 运行中的固件与固件包版本一致
    UpToDate { version: String },
    /// 运行中的固件与固件包版本不同
    Outdated { running: String, bundled: String },
    /// 未检测或检测超时
    Unknown,
}

impl FirmwareState {
    pub fn is_bootloader(&self) -> bool {
        matches!(self, FirmwareState::Bootloader)
    }

    /// 运行中的固件版本
    pub fn running_version(&self) -> Option<&str> {
        match self {
            FirmwareState::Running { version } | FirmwareState::UpToDate { version } => {
                Some(version)
            },
            FirmwareState::Outdated { running, .. } => Some(running),
            FirmwareState::Bootloader | FirmwareState::Unknown => None,
        }
    }
}

/// 固件更新步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareStage {
    Clear,
    LoadFirmware,
    FirmwareTransfer,
    LoadSignature,
    SignatureTransfer,
    Reboot,
}

impl fmt::Display for FirmwareStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FirmwareStage::Clear => "clear",
            FirmwareStage::LoadFirmware => "load command",
            FirmwareStage::FirmwareTransfer => "firmware transfer",
            FirmwareStage::LoadSignature => "signature command",
            FirmwareStage::SignatureTransfer => "signature transfer",
            FirmwareStage::Reboot => "reboot",
        };
        f.write_str(name)
    }
}

/// 固件检测与更新状态机
pub struct FirmwareUpdater<'a> {
    hat: &'a Hat,
    timing: FirmwareTiming,
    detect_timeout: Duration,
}

impl<'a> FirmwareUpdater<'a> {
    pub fn new(hat: &'a Hat, timing: FirmwareTiming, detect_timeout: Duration) -> Self {
        Self {
            hat,
            timing,
            detect_timeout,
        }
    }

    /// 查询设备状态
    ///
    /// 超时视为“不在 bootloader”，返回 `FirmwareState::Unknown`。
    pub fn detect(&self, bundle: Option<&FirmwareBundle>) -> Result<FirmwareState, HatError> {
        let reply = match self.hat.query_version(self.detect_timeout) {
            Ok(reply) => reply,
            Err(e) if e.is_timeout() => {
                warn!(
                    "No version reply within {:?}, assuming firmware is running",
                    self.detect_timeout
                );
                return Ok(FirmwareState::Unknown);
            },
            Err(e) => return Err(e.into()),
        };

        let running = match &reply {
            VersionReply::Bootloader { banner } => {
                info!("Device is in bootloader: {}", banner);
                return Ok(FirmwareState::Bootloader);
            },
            VersionReply::Firmware { .. } => reply.firmware_version().unwrap_or_default().to_string(),
        };

        let state = match bundle {
            None => FirmwareState::Running { version: running },
            Some(bundle) if bundle.version() == running => {
                FirmwareState::UpToDate { version: running }
            },
            Some(bundle) => {
                warn!(
                    "Running firmware {} differs from bundled firmware {}",
                    running,
                    bundle.version()
                );
                FirmwareState::Outdated {
                    running,
                    bundled: bundle.version().to_string(),
                }
            },
        };
        info!("Firmware state: {:?}", state);
        Ok(state)
    }

    /// 把固件包写入 bootloader 并重启
    pub fn update(&self, bundle: &FirmwareBundle) -> Result<(), HatError> {
        info!(
            "Flashing firmware {} ({} bytes, checksum {:#010x})",
            bundle.version(),
            bundle.firmware().len(),
            bundle.checksum()
        );

        self.step(FirmwareStage::Clear, self.timing.command_settle(), || {
            self.hat.send(&Command::Clear)
        })?;
        self.step(FirmwareStage::LoadFirmware, self.timing.command_settle(), || {
            self.hat.send(&Command::Load {
                len: bundle.firmware().len(),
                checksum: bundle.checksum(),
            })
        })?;
        self.step(
            FirmwareStage::FirmwareTransfer,
            self.timing.transfer_settle(),
            || self.hat.send_raw(&frame_payload(bundle.firmware())),
        )?;
        self.step(FirmwareStage::LoadSignature, self.timing.command_settle(), || {
            self.hat.send(&Command::Signature {
                len: bundle.signature().len(),
            })
        })?;
        self.step(
            FirmwareStage::SignatureTransfer,
            self.timing.transfer_settle(),
            || self.hat.send_raw(&frame_payload(bundle.signature())),
        )?;
        self.step(FirmwareStage::Reboot, self.timing.reboot_settle(), || {
            self.hat.send(&Command::Reboot)
        })?;

        info!("Firmware update complete");
        Ok(())
    }

    /// 检测，必要时写入固件，返回最终状态
    pub fn ensure(&self, bundle: Option<&FirmwareBundle>) -> Result<FirmwareState, HatError> {
        let state = self.detect(bundle)?;
        if !state.is_bootloader() {
            return Ok(state);
        }

        let bundle = bundle.ok_or(HatError::BootloaderWithoutFirmware)?;
        self.update(bundle)?;

        let state = self.detect(Some(bundle))?;
        if state.is_bootloader() {
            return Err(HatError::FirmwareRejected);
        }
        Ok(state)
    }

    fn step(
        &self,
        stage: FirmwareStage,
        settle: Duration,
        action: impl FnOnce() -> Result<(), DriverError>,
    ) -> Result<(), HatError> {
        info!("Firmware update: {}", stage);
        action().map_err(|source| HatError::FirmwareUpdate { stage, source })?;
        if !settle.is_zero() {
            spin_sleep::sleep(settle);
        }
        Ok(())
    }
}
