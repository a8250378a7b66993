//! # Steelhead Hardware Layer
//!
//! 差速底盘硬件抽象层：运动原语只通过这里的 trait 访问电机、陀螺仪、
//! 反光/颜色传感器和触碰开关。
//!
//! - [`DriveHardware`] - 传感器读取 + 执行器命令
//! - [`Clock`] - 单调时钟（PID `dt` 与超时）
//! - [`CancelToken`] - "是否继续运行" 信号（比赛结束 / Ctrl+C）
//!
//! 启用 `mock` feature 后提供 [`mock::MockDrivetrain`] 与 [`mock::MockClock`]，
//! 用于无硬件测试与仿真。

use thiserror::Error;

pub mod cancel;
pub mod clock;

#[cfg(feature = "mock")]
pub mod mock;

pub use cancel::CancelToken;
pub use clock::{Clock, MonotonicClock};

/// 硬件层统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HalError {
    /// 传感器读取失败（I2C 超时、数据无效等）
    #[error("Sensor read failed ({sensor}): {message}")]
    SensorRead { sensor: Sensor, message: String },

    /// 执行器写入失败
    #[error("Actuator write failed ({wheel:?}): {message}")]
    ActuatorWrite { wheel: Wheel, message: String },

    /// 设备未连接
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    /// 当前模式不支持该操作
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl HalError {
    pub fn sensor(sensor: Sensor, message: impl Into<String>) -> Self {
        Self::SensorRead {
            sensor,
            message: message.into(),
        }
    }

    pub fn actuator(wheel: Wheel, message: impl Into<String>) -> Self {
        Self::ActuatorWrite {
            wheel,
            message: message.into(),
        }
    }
}

/// 底盘一侧的驱动轮
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wheel {
    Left,
    Right,
}

impl Wheel {
    pub const BOTH: [Wheel; 2] = [Wheel::Left, Wheel::Right];
}

/// 每个控制周期可能读取的传感器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    Heading,
    Intensity,
    LeftEncoder,
    RightEncoder,
    Switch,
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Sensor::Heading => "heading",
            Sensor::Intensity => "intensity",
            Sensor::LeftEncoder => "left encoder",
            Sensor::RightEncoder => "right encoder",
            Sensor::Switch => "switch",
        };
        f.write_str(name)
    }
}

/// 电机运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// 开环功率
    WithoutEncoder,
    /// 开环功率，编码器计数
    UsingEncoder,
    /// 电机控制器自身的闭环位置模式
    ToPosition,
    /// 停止并清零编码器
    StopAndReset,
}

/// 电机正方向约定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelDirection {
    Forward,
    Reverse,
}

impl WheelDirection {
    /// 命令功率 / 编码器读数的符号
    pub fn sign(self) -> f64 {
        match self {
            WheelDirection::Forward => 1.0,
            WheelDirection::Reverse => -1.0,
        }
    }
}

/// 零功率时的电机行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroPowerBehavior {
    Brake,
    Float,
}

/// 差速底盘硬件接口
///
/// 所有方法都在单一控制线程上按周期调用，实现不需要内部加锁。
/// 编码器读数的符号跟随 [`set_direction`](Self::set_direction) 设定的方向。
pub trait DriveHardware {
    /// 陀螺仪积分航向（度，逆时针为正）
    fn heading(&mut self) -> Result<f64, HalError>;

    /// 反光 / 颜色强度（alpha 通道）
    fn intensity(&mut self) -> Result<u16, HalError>;

    /// 编码器计数
    fn encoder(&mut self, wheel: Wheel) -> Result<i32, HalError>;

    /// 触碰开关状态
    fn switch_pressed(&mut self) -> Result<bool, HalError>;

    /// 位置模式下电机是否仍在向目标运动
    fn is_busy(&mut self, wheel: Wheel) -> Result<bool, HalError>;

    /// 设置电机功率，范围 [-1.0, 1.0]
    fn set_power(&mut self, wheel: Wheel, power: f64) -> Result<(), HalError>;

    fn set_run_mode(&mut self, wheel: Wheel, mode: RunMode) -> Result<(), HalError>;

    fn set_target_position(&mut self, wheel: Wheel, ticks: i32) -> Result<(), HalError>;

    fn set_direction(&mut self, wheel: Wheel, direction: WheelDirection) -> Result<(), HalError>;

    fn set_zero_power_behavior(&mut self, behavior: ZeroPowerBehavior) -> Result<(), HalError>;

    /// 清零陀螺仪积分器
    fn reset_heading(&mut self) -> Result<(), HalError>;

    /// 启动陀螺仪校准（非阻塞，通过 `is_calibrating` 轮询）
    fn calibrate_heading(&mut self) -> Result<(), HalError> {
        Ok(())
    }

    fn is_calibrating(&mut self) -> Result<bool, HalError> {
        Ok(false)
    }
}

impl<T: DriveHardware + ?Sized> DriveHardware for Box<T> {
    fn heading(&mut self) -> Result<f64, HalError> {
        (**self).heading()
    }

    fn intensity(&mut self) -> Result<u16, HalError> {
        (**self).intensity()
    }

    fn encoder(&mut self, wheel: Wheel) -> Result<i32, HalError> {
        (**self).encoder(wheel)
    }

    fn switch_pressed(&mut self) -> Result<bool, HalError> {
        (**self).switch_pressed()
    }

    fn is_busy(&mut self, wheel: Wheel) -> Result<bool, HalError> {
        (**self).is_busy(wheel)
    }

    fn set_power(&mut self, wheel: Wheel, power: f64) -> Result<(), HalError> {
        (**self).set_power(wheel, power)
    }

    fn set_run_mode(&mut self, wheel: Wheel, mode: RunMode) -> Result<(), HalError> {
        (**self).set_run_mode(wheel, mode)
    }

    fn set_target_position(&mut self, wheel: Wheel, ticks: i32) -> Result<(), HalError> {
        (**self).set_target_position(wheel, ticks)
    }

    fn set_direction(&mut self, wheel: Wheel, direction: WheelDirection) -> Result<(), HalError> {
        (**self).set_direction(wheel, direction)
    }

    fn set_zero_power_behavior(&mut self, behavior: ZeroPowerBehavior) -> Result<(), HalError> {
        (**self).set_zero_power_behavior(behavior)
    }

    fn reset_heading(&mut self) -> Result<(), HalError> {
        (**self).reset_heading()
    }

    fn calibrate_heading(&mut self) -> Result<(), HalError> {
        (**self).calibrate_heading()
    }

    fn is_calibrating(&mut self) -> Result<bool, HalError> {
        (**self).is_calibrating()
    }
}
