//! 运动引擎门面
//!
//! 持有底盘、时钟、取消令牌、配置和三组 PID 增益，
//! 对外提供四个运动原语以及方向切换、陀螺仪清零 / 校准。

use crate::config::MotionConfig;
use crate::control::PidGains;
use crate::drivetrain::{DriveOrientation, Drivetrain};
use crate::error::{ControlLoop, MotionError};
use crate::primitives::{
    self, DriveStraightParams, EncoderMoveOutcome, EncoderMoveParams, LineFollowOutcome,
    LineFollowParams, LoopContext, MotionOutcome, RotateOutcome, RotateParams,
};
use serde::{Deserialize, Serialize};
use steelhead_hal::{CancelToken, Clock, DriveHardware, ZeroPowerBehavior};
use tracing::{info, warn};

/// 陀螺仪校准结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationOutcome {
    Complete,
    TimedOut,
    Cancelled,
}

/// 运动引擎
pub struct MotionEngine<H, C> {
    drivetrain: Drivetrain<H>,
    clock: C,
    cancel: CancelToken,
    config: MotionConfig,
}

impl<H: DriveHardware, C: Clock> MotionEngine<H, C> {
    /// 初始化底盘并创建引擎
    ///
    /// 配置中已有的增益直接生效，其余回路需在运行前通过 setter 设置。
    pub fn new(
        hardware: H,
        clock: C,
        cancel: CancelToken,
        config: MotionConfig,
    ) -> Result<Self, MotionError> {
        config.validate()?;
        let drivetrain = Drivetrain::new(hardware)?;
        Ok(Self::with_drivetrain(drivetrain, clock, cancel, config))
    }

    /// 使用已初始化的底盘（自定义安装方向）
    pub fn with_drivetrain(
        drivetrain: Drivetrain<H>,
        clock: C,
        cancel: CancelToken,
        config: MotionConfig,
    ) -> Self {
        Self {
            drivetrain,
            clock,
            cancel,
            config,
        }
    }

    pub fn set_rotate_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.config.gains.rotate = Some(PidGains::new(kp, ki, kd));
    }

    pub fn set_drive_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.config.gains.drive = Some(PidGains::new(kp, ki, kd));
    }

    pub fn set_line_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.config.gains.line = Some(PidGains::new(kp, ki, kd));
    }

    fn gains(&self, control_loop: ControlLoop) -> Result<PidGains, MotionError> {
        let gains = match control_loop {
            ControlLoop::Rotate => self.config.gains.rotate,
            ControlLoop::Drive => self.config.gains.drive,
            ControlLoop::Line => self.config.gains.line,
        };
        gains.ok_or(MotionError::GainsNotConfigured(control_loop))
    }

    /// 原地转向
    pub fn rotate(&mut self, params: &RotateParams) -> Result<RotateOutcome, MotionError> {
        let gains = self.gains(ControlLoop::Rotate)?;
        let ctx = LoopContext::new(
            &self.clock,
            &self.cancel,
            &self.config.loop_timing,
            &self.config.sensors,
        );
        primitives::rotate(&mut self.drivetrain, &ctx, &self.config.rotate, gains, params)
    }

    /// 航向保持直线行驶
    pub fn drive_straight(
        &mut self,
        params: &DriveStraightParams,
    ) -> Result<MotionOutcome, MotionError> {
        let gains = self.gains(ControlLoop::Drive)?;
        let ctx = LoopContext::new(
            &self.clock,
            &self.cancel,
            &self.config.loop_timing,
            &self.config.sensors,
        );
        primitives::drive_straight(
            &mut self.drivetrain,
            &ctx,
            &self.config.drive_straight,
            gains,
            params,
        )
    }

    /// 编码器定位
    pub fn drive_to_position(
        &mut self,
        params: &EncoderMoveParams,
    ) -> Result<EncoderMoveOutcome, MotionError> {
        let ctx = LoopContext::new(
            &self.clock,
            &self.cancel,
            &self.config.loop_timing,
            &self.config.sensors,
        );
        primitives::encoder_move(&mut self.drivetrain, &ctx, &self.config.encoder_move, params)
    }

    /// 巡线
    pub fn line_follow(
        &mut self,
        params: &LineFollowParams,
    ) -> Result<LineFollowOutcome, MotionError> {
        let gains = self.gains(ControlLoop::Line)?;
        let ctx = LoopContext::new(
            &self.clock,
            &self.cancel,
            &self.config.loop_timing,
            &self.config.sensors,
        );
        primitives::line_follow(
            &mut self.drivetrain,
            &ctx,
            &self.config.line_follow,
            gains,
            params,
        )
    }

    pub fn set_forward(&mut self) -> Result<(), MotionError> {
        Ok(self.drivetrain.set_forward()?)
    }

    pub fn set_backward(&mut self) -> Result<(), MotionError> {
        Ok(self.drivetrain.set_backward()?)
    }

    pub fn set_orientation(&mut self, orientation: DriveOrientation) -> Result<(), MotionError> {
        Ok(self.drivetrain.set_orientation(orientation)?)
    }

    pub fn orientation(&self) -> DriveOrientation {
        self.drivetrain.orientation()
    }

    pub fn set_zero_power_behavior(&mut self, behavior: ZeroPowerBehavior) -> Result<(), MotionError> {
        Ok(self.drivetrain.set_zero_power_behavior(behavior)?)
    }

    /// 把当前航向设为 0
    pub fn reset_heading(&mut self) -> Result<(), MotionError> {
        info!("Resetting heading integrator");
        Ok(self.drivetrain.hardware_mut().reset_heading()?)
    }

    /// 启动陀螺仪校准并等待完成（可取消，有超时）
    pub fn calibrate_heading(&mut self) -> Result<CalibrationOutcome, MotionError> {
        info!("Calibrating heading sensor");
        let hardware = self.drivetrain.hardware_mut();
        hardware.calibrate_heading()?;

        let start = self.clock.now();
        let timeout = self.config.sensors.calibration_timeout();
        loop {
            if self.cancel.is_cancelled() {
                info!("Heading calibration cancelled");
                return Ok(CalibrationOutcome::Cancelled);
            }
            if !hardware.is_calibrating()? {
                info!(
                    "Heading calibration complete after {:?}",
                    self.clock.now().saturating_sub(start)
                );
                return Ok(CalibrationOutcome::Complete);
            }
            if self.clock.now().saturating_sub(start) >= timeout {
                warn!("Heading calibration did not finish within {:?}", timeout);
                return Ok(CalibrationOutcome::TimedOut);
            }
            self.clock.pause(self.config.loop_timing.period());
        }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn drivetrain(&self) -> &Drivetrain<H> {
        &self.drivetrain
    }

    pub fn drivetrain_mut(&mut self) -> &mut Drivetrain<H> {
        &mut self.drivetrain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steelhead_hal::mock::{MockClock, MockConfig, MockDrivetrain};
    use std::time::Duration;

    fn engine() -> (MotionEngine<MockDrivetrain, MockClock>, MockDrivetrain, MockClock) {
        let clock = MockClock::new();
        let mock = MockDrivetrain::new(clock.clone());
        let engine =
            MotionEngine::new(mock.clone(), clock.clone(), CancelToken::new(), MotionConfig::default())
                .unwrap();
        (engine, mock, clock)
    }

    #[test]
    fn test_missing_gains_rejected() {
        let (mut engine, _mock, _clock) = engine();
        let err = engine.rotate(&RotateParams::new(90.0)).unwrap_err();
        assert!(matches!(err, MotionError::GainsNotConfigured(ControlLoop::Rotate)));

        let err = engine
            .line_follow(&LineFollowParams::default())
            .unwrap_err();
        assert!(matches!(err, MotionError::GainsNotConfigured(ControlLoop::Line)));
    }

    #[test]
    fn test_gains_from_config() {
        let clock = MockClock::new();
        let mut config = MotionConfig::default();
        config.gains.rotate = Some(PidGains::new(0.02, 0.0, 0.0));
        let mut engine = MotionEngine::new(
            MockDrivetrain::new(clock.clone()),
            clock,
            CancelToken::new(),
            config,
        )
        .unwrap();

        assert_eq!(engine.rotate(&RotateParams::new(0.0)).unwrap(), RotateOutcome::OnTarget);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let clock = MockClock::new();
        let mut config = MotionConfig::default();
        config.loop_timing.period_ms = 0;
        let result = MotionEngine::new(
            MockDrivetrain::new(clock.clone()),
            clock,
            CancelToken::new(),
            config,
        );
        assert!(matches!(result, Err(MotionError::Config(_))));
    }

    #[test]
    fn test_reset_heading() {
        let (mut engine, mock, _clock) = engine();
        mock.set_pose(steelhead_hal::mock::MockPose {
            heading: 37.0,
            ..Default::default()
        });
        engine.reset_heading().unwrap();
        assert_eq!(engine.drivetrain_mut().hardware_mut().heading().unwrap(), 0.0);
    }

    #[test]
    fn test_calibrate_heading_waits_for_completion() {
        let (mut engine, _mock, clock) = engine();
        assert_eq!(engine.calibrate_heading().unwrap(), CalibrationOutcome::Complete);
        assert!(clock.now() >= MockConfig::default().calibration_time);
    }

    #[test]
    fn test_calibrate_heading_timeout() {
        let clock = MockClock::new();
        let mock = MockDrivetrain::with_config(
            clock.clone(),
            MockConfig {
                calibration_time: Duration::from_secs(10),
                ..Default::default()
            },
        );
        let mut engine =
            MotionEngine::new(mock, clock.clone(), CancelToken::new(), MotionConfig::default())
                .unwrap();

        assert_eq!(engine.calibrate_heading().unwrap(), CalibrationOutcome::TimedOut);
        assert!(clock.now() >= Duration::from_millis(3000));
        assert!(clock.now() < Duration::from_millis(3100));
    }

    #[test]
    fn test_calibrate_heading_cancelled() {
        let (mut engine, _mock, clock) = engine();
        engine.cancel_token().cancel();
        assert_eq!(engine.calibrate_heading().unwrap(), CalibrationOutcome::Cancelled);
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn test_orientation_passthrough() {
        let (mut engine, mock, _clock) = engine();
        engine.set_backward().unwrap();
        assert_eq!(engine.orientation(), DriveOrientation::Backward);
        assert_eq!(
            mock.direction(steelhead_hal::Wheel::Left),
            steelhead_hal::WheelDirection::Reverse
        );
        engine.set_orientation(DriveOrientation::Forward).unwrap();
        assert_eq!(engine.orientation(), DriveOrientation::Forward);
    }
}
