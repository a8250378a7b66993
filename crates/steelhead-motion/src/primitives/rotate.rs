//! 原地转向
//!
//! ```text
//! Settling -> Rotating -> { OnTarget | TimedOut | Cancelled }
//! ```
//!
//! 左轮写 `+output`，右轮写 `-output`，与行驶方向无关：
//! 转向方向只由输出符号决定。

use super::{LoopContext, ensure_finite, ensure_output_range, ensure_tolerance, finish};
use crate::config::RotateSettings;
use crate::control::{HeadingError, PidController, PidGains};
use crate::drivetrain::{Drivetrain, limit};
use crate::error::MotionError;
use crate::sampling::{SampleReader, SensorNeeds};
use serde::{Deserialize, Serialize};
use steelhead_hal::{Clock, DriveHardware};
use tracing::{debug, info, warn};

/// 转向参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotateParams {
    /// 目标航向（度，相对当前零点，逆时针为正）
    pub target_heading: f64,
    /// 到位容差（度）
    pub tolerance: f64,
    pub min_output: f64,
    pub max_output: f64,
    /// 航向误差按圆周回绕（走最短路径）
    pub wrap_heading: bool,
}

impl Default for RotateParams {
    fn default() -> Self {
        Self {
            target_heading: 0.0,
            tolerance: 2.0,
            min_output: -0.25,
            max_output: 0.25,
            wrap_heading: false,
        }
    }
}

impl RotateParams {
    pub fn new(target_heading: f64) -> Self {
        Self {
            target_heading,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), MotionError> {
        ensure_finite("target_heading", self.target_heading)?;
        ensure_tolerance(self.tolerance)?;
        ensure_output_range(self.min_output, self.max_output)
    }
}

/// 转向结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotateOutcome {
    OnTarget,
    TimedOut,
    Cancelled,
}

/// 原地转向到目标航向
pub fn rotate<H, C>(
    drivetrain: &mut Drivetrain<H>,
    ctx: &LoopContext<'_, C>,
    settings: &RotateSettings,
    gains: PidGains,
    params: &RotateParams,
) -> Result<RotateOutcome, MotionError>
where
    H: DriveHardware,
    C: Clock,
{
    params.validate()?;
    info!(
        "Rotate to {:.1}° (tolerance {:.1}°, output [{}, {}])",
        params.target_heading, params.tolerance, params.min_output, params.max_output
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
    settings: &RotateSettings,
    pid: &mut PidController,
    params: &RotateParams,
) -> Result<RotateOutcome, MotionError>
where
    H: DriveHardware,
    C: Clock,
{
    let source = HeadingError {
        continuous: params.wrap_heading,
    };
    let mut reader = SampleReader::new(ctx.sensors.fault_policy(), SensorNeeds::none().with_heading());

    // Settling
    if super::wait_for_first_sample(drivetrain, ctx, &mut reader, settings.settle())?.is_none() {
        info!("Rotate cancelled while settling");
        return Ok(RotateOutcome::Cancelled);
    }

    let start = ctx.clock.now();
    let mut timer = ctx.cycle_timer();

    // Rotating
    loop {
        let cycle_start = ctx.cycle_start();
        if ctx.cancel.is_cancelled() {
            info!("Rotate cancelled");
            return Ok(RotateOutcome::Cancelled);
        }

        let readings = reader.read(drivetrain.hardware_mut())?;
        let dt = timer.tick(ctx.clock.now(), pid);
        let sample = pid.sample(&source, readings.heading);

        if sample.on_target {
            drivetrain.stop()?;
            info!(
                "Rotate on target: heading {:.1}° (error {:.2}°)",
                sample.raw, sample.error
            );
            return Ok(RotateOutcome::OnTarget);
        }

        let output = pid.compute(sample.error, dt);
        let left = limit(output, params.min_output, params.max_output);
        let right = limit(-output, params.min_output, params.max_output);
        drivetrain.set_powers(left, right)?;
        debug!(
            "Rotate: heading {:.2}° error {:.2}° output {:.3}",
            sample.raw, sample.error, output
        );

        let elapsed = ctx.clock.now().saturating_sub(start);
        if elapsed >= settings.timeout() {
            warn!(
                "Rotate timed out after {:?} at heading {:.1}° (target {:.1}°)",
                elapsed, sample.raw, params.target_heading
            );
            return Ok(RotateOutcome::TimedOut);
        }

        ctx.pause_after(cycle_start);
    }
}
