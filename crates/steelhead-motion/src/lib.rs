//! # Steelhead Motion
//!
//! 两轮差速底盘的闭环运动原语：
//!
//! - **原地转向** [`primitives::rotate`]：PID 转到目标航向，带超时
//! - **直线行驶** [`primitives::drive_straight`]：航向保持 + 停止条件 + 可选末端减速
//! - **编码器定位** [`primitives::encoder_move`]：电机位置模式 + 加减速斜坡
//! - **巡线** [`primitives::line_follow`]：按反光强度在线边缘 PID 跟随
//!
//! 所有原语都是同步阻塞的：在调用线程上以固定周期轮询传感器，
//! 每个周期开头检查一次 [`CancelToken`](steelhead_hal::CancelToken)，
//! 任何退出路径都会把两侧电机功率置零。
//!
//! 日常使用通过 [`MotionEngine`] 门面：
//!
//! ```rust,ignore
//! use steelhead_motion::{MotionConfig, MotionEngine, RotateParams};
//!
//! let mut engine = MotionEngine::new(hardware, clock, cancel, MotionConfig::default())?;
//! engine.set_rotate_gains(0.02, 0.0, 0.001);
//! let outcome = engine.rotate(&RotateParams::new(90.0))?;
//! ```

pub mod config;
pub mod control;
pub mod drivetrain;
pub mod engine;
pub mod error;
pub mod primitives;
pub mod sampling;
pub mod stop;

pub use config::MotionConfig;
pub use control::{HeadingError, LineError, PidController, PidGains};
pub use drivetrain::{DriveOrientation, Drivetrain};
pub use engine::{CalibrationOutcome, MotionEngine};
pub use error::{ControlLoop, MotionError};
pub use primitives::{
    DriveStraightParams, EncoderMoveOutcome, EncoderMoveParams, LineFollowOutcome,
    LineFollowParams, LineSide, MotionOutcome, RotateOutcome, RotateParams,
};
pub use sampling::{CycleReadings, FaultPolicy, SensorNeeds};
pub use stop::{StopChain, StopCondition, StopKind};
