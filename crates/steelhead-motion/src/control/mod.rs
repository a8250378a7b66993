//! 控制器模块
//!
//! - `PidController` - 带启用 / 禁用与到位判定的 PID
//! - `ErrorSource` - 把原始传感器值换算成误差（航向、巡线）
//! - `SpeedRamp` / `DecelerationRamp` - 功率斜坡

pub mod pid;
pub mod ramp;
pub mod source;

pub use pid::{PidController, PidGains};
pub use ramp::{DecelerationRamp, RampPhase, RampProfile, SpeedRamp, WorkingSpeed};
pub use source::{ErrorSample, ErrorSource, HeadingError, LineError};
