//! 直线行驶（航向保持）
//!
//! 每个周期按固定顺序：
//!
//! 1. 停止条件（命中即停，本周期不再写功率）
//! 2. PID 航向修正 + 写功率
//! 3. 超距中止
//! 4. 更新末端减速后的工作速度（下一周期生效）
//!
//! 减速降到 `min_end_power` 后关闭航向修正，两轮同速蠕行到停止条件。

use super::{LoopContext, ensure_finite, ensure_output_range, ensure_power, ensure_tolerance, finish};
use crate::config::DriveStraightSettings;
use crate::control::{DecelerationRamp, HeadingError, PidController, PidGains};
use crate::drivetrain::Drivetrain;
use crate::error::MotionError;
use crate::sampling::{SampleReader, SensorNeeds};
use crate::stop::{StopChain, StopKind};
use serde::{Deserialize, Serialize};
use steelhead_hal::{Clock, DriveHardware, RunMode};
use tracing::{debug, info, warn};

/// 直线行驶参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveStraightParams {
    /// 保持的航向（度）
    pub target_heading: f64,
    /// 基础速度
    pub drive_speed: f64,
    pub min_output: f64,
    pub max_output: f64,
    /// 航向容差（度）：误差在容差内时不做修正
    pub tolerance: f64,
    /// 末端减速系数（每 tick 降低的功率），`None` 关闭减速
    pub ramp_coefficient: Option<f64>,
    /// 减速目标距离（右轮编码器 ticks）
    pub target_distance: i32,
    /// 减速下限
    pub min_end_power: f64,
    /// 停止条件（按优先级）
    pub stop: StopChain,
    /// 超过该距离仍未停止则中止，`None` 表示不限制
    pub max_distance: Option<i32>,
    pub wrap_heading: bool,
}

impl Default for DriveStraightParams {
    fn default() -> Self {
        Self {
            target_heading: 0.0,
            drive_speed: 0.5,
            min_output: -1.0,
            max_output: 1.0,
            tolerance: 1.0,
            ramp_coefficient: None,
            target_distance: 0,
            min_end_power: 0.15,
            stop: StopChain::new(),
            max_distance: None,
            wrap_heading: false,
        }
    }
}

impl DriveStraightParams {
    pub fn new(target_heading: f64, drive_speed: f64, stop: impl Into<StopChain>) -> Self {
        Self {
            target_heading,
            drive_speed,
            stop: stop.into(),
            ..Self::default()
        }
    }

    /// 开启末端减速
    pub fn with_deceleration(mut self, coefficient: f64, target_distance: i32, min_end_power: f64) -> Self {
        self.ramp_coefficient = Some(coefficient);
        self.target_distance = target_distance;
        self.min_end_power = min_end_power;
        self
    }

    pub fn with_max_distance(mut self, max_distance: i32) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    pub fn validate(&self) -> Result<(), MotionError> {
        ensure_finite("target_heading", self.target_heading)?;
        ensure_power("drive_speed", self.drive_speed)?;
        ensure_output_range(self.min_output, self.max_output)?;
        ensure_tolerance(self.tolerance)?;
        if let Some(coefficient) = self.ramp_coefficient {
            ensure_finite("ramp_coefficient", coefficient)?;
            ensure_power("min_end_power", self.min_end_power)?;
        }
        if self.stop.is_empty() && self.max_distance.is_none() {
            return Err(MotionError::invalid_parameter(
                "stop",
                "at least one stop condition or a max_distance is required",
            ));
        }
        Ok(())
    }
}

/// 直线行驶结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionOutcome {
    /// 颜色 / 开关停止条件触发
    StoppedByCondition(StopKind),
    /// 编码器停止条件触发
    ReachedTarget,
    Cancelled,
    /// 超过最大距离仍未停止
    AbortedOverMax { distance: i32 },
}

impl MotionOutcome {
    /// 只有超距中止表示失败
    pub fn succeeded(&self) -> bool {
        !matches!(self, MotionOutcome::AbortedOverMax { .. })
    }
}

/// 航向保持直线行驶
pub fn drive_straight<H, C>(
    drivetrain: &mut Drivetrain<H>,
    ctx: &LoopContext<'_, C>,
    settings: &DriveStraightSettings,
    gains: PidGains,
    params: &DriveStraightParams,
) -> Result<MotionOutcome, MotionError>
where
    H: DriveHardware,
    C: Clock,
{
    params.validate()?;
    info!(
        "Drive straight: heading {:.1}°, speed {:.2}, {} ({} stop conditions, max distance {:?})",
        params.target_heading,
        params.drive_speed,
        drivetrain.orientation(),
        params.stop.conditions().len(),
        params.max_distance
    );

    let mut pid =
        PidController::new(params.target_heading, params.tolerance).with_pid_gains(gains);
    pid.enable();
    let result = run(drivetrain, ctx, settings, &mut pid, params);
    pid.disable();

    finish(drivetrain, result)
}

fn run<H, C>(
    drivetrain: &mut Drivetrain<H>,
    ctx: &LoopContext<'_, C>,
    settings: &DriveStraightSettings,
    pid: &mut PidController,
    params: &DriveStraightParams,
) -> Result<MotionOutcome, MotionError>
where
    H: DriveHardware,
    C: Clock,
{
    drivetrain.reset_encoders()?;
    drivetrain.set_run_mode(RunMode::UsingEncoder)?;

    let source = HeadingError {
        continuous: params.wrap_heading,
    };
    let needs = SensorNeeds::none()
        .with_heading()
        .with_encoders()
        .union(params.stop.needs());
    let mut reader = SampleReader::new(ctx.sensors.fault_policy(), needs);

    let deceleration = params.ramp_coefficient.map(|coefficient| DecelerationRamp {
        base_speed: params.drive_speed,
        coefficient,
        target_distance: params.target_distance,
        lookahead: settings.lookahead_ticks,
        min_end_power: params.min_end_power,
    });

    if super::wait_for_first_sample(drivetrain, ctx, &mut reader, settings.settle())?.is_none() {
        info!("Drive straight cancelled while settling");
        return Ok(MotionOutcome::Cancelled);
    }

    let mut timer = ctx.cycle_timer();
    let mut working_speed = params.drive_speed;
    let mut heading_hold = true;

    loop {
        let cycle_start = ctx.cycle_start();
        if ctx.cancel.is_cancelled() {
            info!("Drive straight cancelled");
            return Ok(MotionOutcome::Cancelled);
        }

        let readings = reader.read(drivetrain.hardware_mut())?;
        let distance = readings.distance();

        // 1. 停止条件
        if let Some(condition) = params.stop.first_triggered(&readings) {
            drivetrain.stop()?;
            let outcome = match condition.kind() {
                StopKind::Encoder => MotionOutcome::ReachedTarget,
                kind => MotionOutcome::StoppedByCondition(kind),
            };
            info!("Drive straight stopped by {} at {} ticks", condition.kind(), distance);
            return Ok(outcome);
        }

        // 2. 航向修正
        let dt = timer.tick(ctx.clock.now(), pid);
        if heading_hold {
            let sample = pid.sample(&source, readings.heading);
            let output = pid.compute(sample.error, dt);
            if sample.on_target {
                drivetrain.set_powers(working_speed, working_speed)?;
            } else {
                let (left, right) =
                    drivetrain.split_correction(working_speed, output, params.min_output, params.max_output);
                drivetrain.set_powers(left, right)?;
            }
        } else {
            drivetrain.set_powers(working_speed, working_speed)?;
        }

        // 3. 超距中止
        if let Some(max_distance) = params.max_distance
            && distance >= max_distance
        {
            drivetrain.stop()?;
            warn!(
                "Drive straight aborted: {} ticks exceeds max distance {}",
                distance, max_distance
            );
            return Ok(MotionOutcome::AbortedOverMax { distance });
        }

        // 4. 末端减速
        if let Some(step) = deceleration.as_ref().and_then(|d| d.apply(distance)) {
            working_speed = step.speed;
            if step.floored && heading_hold {
                heading_hold = false;
                pid.disable();
                debug!(
                    "Deceleration floor {:.2} reached at {} ticks, heading hold released",
                    step.speed, distance
                );
            }
        }

        ctx.pause_after(cycle_start);
    }
}
