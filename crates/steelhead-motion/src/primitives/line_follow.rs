//! 巡线
//!
//! 设定值为强度带宽中点，即线与背景的边缘。跟随线的左侧边缘时，
//! 强度高于中点（偏向线内）左轮减速、右轮加速；右侧边缘相反。

use super::{LoopContext, ensure_output_range, ensure_power, ensure_tolerance, finish};
use crate::config::LineFollowSettings;
use crate::control::{LineError, PidController, PidGains};
use crate::drivetrain::{Drivetrain, limit};
use crate::error::MotionError;
use crate::sampling::{SampleReader, SensorNeeds};
use crate::stop::{StopChain, StopKind};
use serde::{Deserialize, Serialize};
use steelhead_hal::{Clock, DriveHardware};
use tracing::{debug, info};

/// 跟随线的哪一侧边缘
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSide {
    #[default]
    Left,
    Right,
}

/// 巡线参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFollowParams {
    /// 背景强度（带宽下限）
    pub low: u16,
    /// 线强度（带宽上限）
    pub high: u16,
    pub drive_speed: f64,
    pub min_output: f64,
    pub max_output: f64,
    pub tolerance: f64,
    pub stop: StopChain,
    pub side: LineSide,
}

impl Default for LineFollowParams {
    fn default() -> Self {
        Self {
            low: 5,
            high: 45,
            drive_speed: 0.2,
            min_output: -0.25,
            max_output: 0.25,
            tolerance: 0.0,
            stop: StopChain::new(),
            side: LineSide::Left,
        }
    }
}

impl LineFollowParams {
    pub fn new(low: u16, high: u16, side: LineSide, stop: impl Into<StopChain>) -> Self {
        Self {
            low,
            high,
            side,
            stop: stop.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), MotionError> {
        if self.low >= self.high {
            return Err(MotionError::invalid_parameter(
                "low",
                format!("must be < high ({} >= {})", self.low, self.high),
            ));
        }
        ensure_power("drive_speed", self.drive_speed)?;
        ensure_output_range(self.min_output, self.max_output)?;
        ensure_tolerance(self.tolerance)
    }
}

/// 巡线结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineFollowOutcome {
    Stopped(StopKind),
    Cancelled,
}

/// 沿线边缘 PID 跟随，直到停止条件触发
///
/// 停止条件为空时只能通过取消结束。
pub fn line_follow<H, C>(
    drivetrain: &mut Drivetrain<H>,
    ctx: &LoopContext<'_, C>,
    settings: &LineFollowSettings,
    gains: PidGains,
    params: &LineFollowParams,
) -> Result<LineFollowOutcome, MotionError>
where
    H: DriveHardware,
    C: Clock,
{
    params.validate()?;
    let source = LineError::new(f64::from(params.low), f64::from(params.high));
    info!(
        "Line follow {:?} edge: band [{}, {}], midpoint {:.1}, speed {:.2}",
        params.side,
        params.low,
        params.high,
        source.midpoint(),
        params.drive_speed
    );

    let mut pid = PidController::new(source.midpoint(), params.tolerance).with_pid_gains(gains);
    pid.enable();
    let result = run(drivetrain, ctx, settings, &mut pid, &source, params);
    pid.disable();

    finish(drivetrain, result)
}

fn run<H, C>(
    drivetrain: &mut Drivetrain<H>,
    ctx: &LoopContext<'_, C>,
    settings: &LineFollowSettings,
    pid: &mut PidController,
    source: &LineError,
    params: &LineFollowParams,
) -> Result<LineFollowOutcome, MotionError>
where
    H: DriveHardware,
    C: Clock,
{
    let needs = SensorNeeds::none().with_intensity().union(params.stop.needs());
    let mut reader = SampleReader::new(ctx.sensors.fault_policy(), needs);

    if super::wait_for_first_sample(drivetrain, ctx, &mut reader, settings.settle())?.is_none() {
        info!("Line follow cancelled while settling");
        return Ok(LineFollowOutcome::Cancelled);
    }

    let mut timer = ctx.cycle_timer();

    loop {
        let cycle_start = ctx.cycle_start();
        if ctx.cancel.is_cancelled() {
            info!("Line follow cancelled");
            return Ok(LineFollowOutcome::Cancelled);
        }

        let readings = reader.read(drivetrain.hardware_mut())?;

        if let Some(condition) = params.stop.first_triggered(&readings) {
            drivetrain.stop()?;
            info!("Line follow stopped by {}", condition.kind());
            return Ok(LineFollowOutcome::Stopped(condition.kind()));
        }

        let dt = timer.tick(ctx.clock.now(), pid);
        let sample = pid.sample(source, f64::from(readings.intensity));
        let output = pid.compute(sample.error, dt);

        let speed = params.drive_speed;
        let (left, right) = match params.side {
            LineSide::Left => (speed - output, speed + output),
            LineSide::Right => (speed + output, speed - output),
        };
        let left = limit(left, params.min_output, params.max_output);
        let right = limit(right, params.min_output, params.max_output);
        drivetrain.set_powers(left, right)?;
        debug!(
            "Line follow: intensity {} error {:.1} output {:.3}",
            readings.intensity, sample.error, output
        );

        ctx.pause_after(cycle_start);
    }
}
