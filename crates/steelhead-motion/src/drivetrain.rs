//! 差速底盘
//!
//! [`Drivetrain`] 独占硬件句柄并保存当前行驶方向 [`DriveOrientation`]。
//! 方向只能在两次原语调用之间通过 `set_forward` / `set_backward` 改变，
//! 原语执行期间只读。

use serde::{Deserialize, Serialize};
use steelhead_hal::{DriveHardware, HalError, RunMode, Wheel, WheelDirection, ZeroPowerBehavior};
use tracing::{debug, warn};

/// 行驶方向
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveOrientation {
    /// 车头在前
    #[default]
    Forward,
    /// 车尾在前（电机方向翻转，航向修正左右互换）
    Backward,
}

impl std::fmt::Display for DriveOrientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriveOrientation::Forward => f.write_str("forward"),
            DriveOrientation::Backward => f.write_str("backward"),
        }
    }
}

/// 电机安装方向
///
/// 正功率使车体前进时各轮应设置的方向。左右镜像安装的底盘通常为
/// `(Forward, Reverse)`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mounting {
    pub left: WheelDirection,
    pub right: WheelDirection,
}

impl Default for Mounting {
    fn default() -> Self {
        Self {
            left: WheelDirection::Forward,
            right: WheelDirection::Forward,
        }
    }
}

fn invert(direction: WheelDirection) -> WheelDirection {
    match direction {
        WheelDirection::Forward => WheelDirection::Reverse,
        WheelDirection::Reverse => WheelDirection::Forward,
    }
}

/// 差速底盘
pub struct Drivetrain<H> {
    hardware: H,
    mounting: Mounting,
    orientation: DriveOrientation,
}

impl<H: DriveHardware> Drivetrain<H> {
    /// 以默认安装方向初始化
    pub fn new(hardware: H) -> Result<Self, HalError> {
        Self::with_mounting(hardware, Mounting::default())
    }

    /// 初始化：车头向前、刹车模式、零功率、开环
    pub fn with_mounting(hardware: H, mounting: Mounting) -> Result<Self, HalError> {
        let mut drivetrain = Self {
            hardware,
            mounting,
            orientation: DriveOrientation::Forward,
        };
        drivetrain.apply_orientation()?;
        drivetrain.hardware.set_zero_power_behavior(ZeroPowerBehavior::Brake)?;
        drivetrain.set_run_mode(RunMode::WithoutEncoder)?;
        drivetrain.stop()?;
        Ok(drivetrain)
    }

    pub fn orientation(&self) -> DriveOrientation {
        self.orientation
    }

    pub fn mounting(&self) -> Mounting {
        self.mounting
    }

    /// 车头在前
    pub fn set_forward(&mut self) -> Result<(), HalError> {
        self.set_orientation(DriveOrientation::Forward)
    }

    /// 车尾在前
    pub fn set_backward(&mut self) -> Result<(), HalError> {
        self.set_orientation(DriveOrientation::Backward)
    }

    pub fn set_orientation(&mut self, orientation: DriveOrientation) -> Result<(), HalError> {
        debug!("Drive orientation: {} -> {}", self.orientation, orientation);
        self.orientation = orientation;
        self.apply_orientation()
    }

    fn apply_orientation(&mut self) -> Result<(), HalError> {
        let (left, right) = match self.orientation {
            DriveOrientation::Forward => (self.mounting.left, self.mounting.right),
            DriveOrientation::Backward => (invert(self.mounting.left), invert(self.mounting.right)),
        };
        self.hardware.set_direction(Wheel::Left, left)?;
        self.hardware.set_direction(Wheel::Right, right)
    }

    /// 把航向修正量分配到左右轮，结果钳位到 `[min, max]`
    ///
    /// 车头在前时 `(speed + output, speed - output)`，车尾在前时左右互换。
    pub fn split_correction(&self, speed: f64, output: f64, min: f64, max: f64) -> (f64, f64) {
        let (left, right) = match self.orientation {
            DriveOrientation::Forward => (speed + output, speed - output),
            DriveOrientation::Backward => (speed - output, speed + output),
        };
        (limit(left, min, max), limit(right, min, max))
    }

    pub fn set_powers(&mut self, left: f64, right: f64) -> Result<(), HalError> {
        self.hardware.set_power(Wheel::Left, left)?;
        self.hardware.set_power(Wheel::Right, right)
    }

    /// 两侧功率置零
    pub fn stop(&mut self) -> Result<(), HalError> {
        self.set_powers(0.0, 0.0)
    }

    /// 尽力置零：失败只记录日志（用于错误退出路径）
    pub fn stop_best_effort(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to zero drive power: {}", e);
        }
    }

    pub fn set_run_mode(&mut self, mode: RunMode) -> Result<(), HalError> {
        for wheel in Wheel::BOTH {
            self.hardware.set_run_mode(wheel, mode)?;
        }
        Ok(())
    }

    /// 停止并清零编码器
    pub fn reset_encoders(&mut self) -> Result<(), HalError> {
        self.set_run_mode(RunMode::StopAndReset)
    }

    pub fn set_target_position(&mut self, ticks: i32) -> Result<(), HalError> {
        for wheel in Wheel::BOTH {
            self.hardware.set_target_position(wheel, ticks)?;
        }
        Ok(())
    }

    /// 任意一侧电机仍在位置模式下运动
    pub fn is_busy(&mut self) -> Result<bool, HalError> {
        let left = self.hardware.is_busy(Wheel::Left)?;
        let right = self.hardware.is_busy(Wheel::Right)?;
        Ok(left || right)
    }

    pub fn set_zero_power_behavior(&mut self, behavior: ZeroPowerBehavior) -> Result<(), HalError> {
        self.hardware.set_zero_power_behavior(behavior)
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    pub fn into_inner(self) -> H {
        self.hardware
    }
}

/// 钳位到 `[min, max]`，`min > max` 时不会 panic
pub fn limit(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use steelhead_hal::mock::{MockClock, MockDrivetrain};

    fn drivetrain() -> (Drivetrain<MockDrivetrain>, MockDrivetrain) {
        let mock = MockDrivetrain::new(MockClock::new());
        (Drivetrain::new(mock.clone()).unwrap(), mock)
    }

    #[test]
    fn test_init_state() {
        let (drivetrain, mock) = drivetrain();
        assert_eq!(drivetrain.orientation(), DriveOrientation::Forward);
        assert_eq!(mock.zero_power_behavior(), ZeroPowerBehavior::Brake);
        assert_eq!(mock.run_mode(Wheel::Left), RunMode::WithoutEncoder);
        assert_eq!(mock.direction(Wheel::Right), WheelDirection::Forward);
        assert_eq!(mock.last_power(Wheel::Left), 0.0);
    }

    #[test]
    fn test_orientation_flips_directions() {
        let (mut drivetrain, mock) = drivetrain();
        drivetrain.set_backward().unwrap();
        assert_eq!(drivetrain.orientation(), DriveOrientation::Backward);
        assert_eq!(mock.direction(Wheel::Left), WheelDirection::Reverse);
        assert_eq!(mock.direction(Wheel::Right), WheelDirection::Reverse);

        drivetrain.set_forward().unwrap();
        assert_eq!(mock.direction(Wheel::Left), WheelDirection::Forward);
    }

    #[test]
    fn test_mirrored_mounting() {
        let mock = MockDrivetrain::new(MockClock::new());
        let mounting = Mounting {
            left: WheelDirection::Forward,
            right: WheelDirection::Reverse,
        };
        let mut drivetrain = Drivetrain::with_mounting(mock.clone(), mounting).unwrap();
        assert_eq!(mock.direction(Wheel::Right), WheelDirection::Reverse);

        drivetrain.set_backward().unwrap();
        assert_eq!(mock.direction(Wheel::Left), WheelDirection::Reverse);
        assert_eq!(mock.direction(Wheel::Right), WheelDirection::Forward);
    }

    #[test]
    fn test_split_correction_swaps_with_orientation() {
        let (mut drivetrain, _mock) = drivetrain();
        let (left, right) = drivetrain.split_correction(0.5, 0.1, -1.0, 1.0);
        assert!((left - 0.6).abs() < 1e-9 && (right - 0.4).abs() < 1e-9);

        drivetrain.set_backward().unwrap();
        let (left, right) = drivetrain.split_correction(0.5, 0.1, -1.0, 1.0);
        assert!((left - 0.4).abs() < 1e-9 && (right - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_split_correction_clamped() {
        let (drivetrain, _mock) = drivetrain();
        assert_eq!(drivetrain.split_correction(0.5, 2.0, -0.25, 0.7), (0.7, -0.25));
    }

    #[test]
    fn test_reset_encoders() {
        let (mut drivetrain, mock) = drivetrain();
        drivetrain.set_run_mode(RunMode::UsingEncoder).unwrap();
        drivetrain.set_powers(0.5, 0.5).unwrap();
        mock.pose();

        drivetrain.reset_encoders().unwrap();
        assert_eq!(mock.encoder_ticks(Wheel::Left), 0);
        assert_eq!(mock.run_mode(Wheel::Right), RunMode::StopAndReset);
    }

    #[test]
    fn test_limit() {
        assert_eq!(limit(0.9, -0.25, 0.25), 0.25);
        assert_eq!(limit(-0.9, -0.25, 0.25), -0.25);
        assert_eq!(limit(0.1, -0.25, 0.25), 0.1);
    }
}
