//! # Build HAT Client
//!
//! 面向应用的接口：板级初始化、固件管理、电机控制与运动规划。
//!
//! ```no_run
//! use buildhat_client::{Direction, HatBuilder, RunOptions};
//! use buildhat_protocol::Port;
//!
//! let hat = HatBuilder::new().build().unwrap();
//! let motor = hat.motor(Port::A).unwrap();
//! motor.run_for_degrees(90.0, 30.0, &RunOptions::blocking()).unwrap();
//! motor
//!     .run_to_position(0.0, 30.0, Direction::Shortest, &RunOptions::blocking())
//!     .unwrap();
//! ```

pub mod builder;
pub mod cancel;
pub mod config;
mod error;
pub mod firmware;
pub mod motion;
pub mod motor;

pub use builder::{BuildHat, HatBuilder};
pub use cancel::CancelToken;
pub use config::{
    DriverSettings, FirmwareSettings, FirmwareTiming, HatConfig, MotorDefaults, SerialSettings,
};
pub use error::HatError;
pub use firmware::{FirmwareBundle, FirmwareStage, FirmwareState, FirmwareUpdater};
pub use motion::{Direction, MotionPlan};
pub use motor::{Motor, MotorReading, RunOptions};
