//! 编码器定位
//!
//! 电机控制器自身的位置模式负责闭环，这里只根据已用时间和剩余距离
//! 调整功率上限（加速 -> 巡航 -> 减速），直到两侧电机都不再忙。

use super::{LoopContext, finish};
use crate::config::EncoderMoveSettings;
use crate::control::{RampProfile, SpeedRamp};
use crate::drivetrain::Drivetrain;
use crate::error::MotionError;
use crate::sampling::{SampleReader, SensorNeeds};
use serde::{Deserialize, Serialize};
use steelhead_hal::{Clock, DriveHardware, RunMode};
use tracing::info;

/// 编码器定位参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncoderMoveParams {
    /// 目标位置（ticks，两侧相同）
    pub target_ticks: i32,
    /// 巡航功率，(0, 1]
    pub power: f64,
}

impl EncoderMoveParams {
    pub fn new(target_ticks: i32, power: f64) -> Self {
        Self { target_ticks, power }
    }

    pub fn validate(&self) -> Result<(), MotionError> {
        if !(self.power > 0.0 && self.power <= 1.0) {
            return Err(MotionError::invalid_parameter(
                "power",
                format!("must be in (0, 1], got {}", self.power),
            ));
        }
        Ok(())
    }
}

/// 编码器定位结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderMoveOutcome {
    Arrived,
    Cancelled,
}

/// 以位置模式行驶到目标编码器计数
pub fn encoder_move<H, C>(
    drivetrain: &mut Drivetrain<H>,
    ctx: &LoopContext<'_, C>,
    settings: &EncoderMoveSettings,
    params: &EncoderMoveParams,
) -> Result<EncoderMoveOutcome, MotionError>
where
    H: DriveHardware,
    C: Clock,
{
    params.validate()?;
    info!(
        "Encoder move to {} ticks at power {:.2} ({})",
        params.target_ticks,
        params.power,
        drivetrain.orientation()
    );

    let result = run(drivetrain, ctx, settings, params);
    let result = finish(drivetrain, result);

    // 退出时关闭编码器模式
    match result {
        Ok(outcome) => {
            drivetrain.set_run_mode(RunMode::WithoutEncoder)?;
            Ok(outcome)
        },
        Err(err) => {
            if let Err(mode_err) = drivetrain.set_run_mode(RunMode::WithoutEncoder) {
                tracing::warn!("Failed to leave position mode: {}", mode_err);
            }
            Err(err)
        },
    }
}

fn run<H, C>(
    drivetrain: &mut Drivetrain<H>,
    ctx: &LoopContext<'_, C>,
    settings: &EncoderMoveSettings,
    params: &EncoderMoveParams,
) -> Result<EncoderMoveOutcome, MotionError>
where
    H: DriveHardware,
    C: Clock,
{
    drivetrain.reset_encoders()?;
    drivetrain.set_run_mode(RunMode::UsingEncoder)?;
    drivetrain.set_target_position(params.target_ticks)?;
    drivetrain.set_run_mode(RunMode::ToPosition)?;

    let mut ramp = SpeedRamp::new(RampProfile {
        target_power: params.power,
        ramp_in: settings.ramp_in(),
        ramp_out_ticks: settings.ramp_out_ticks,
        floor_power: settings.floor_power.min(params.power),
    });
    let mut reader = SampleReader::new(ctx.sensors.fault_policy(), SensorNeeds::none().with_encoders());

    let start = ctx.clock.now();
    let mut last_log = start;
    let mut first_cycle = true;

    loop {
        let cycle_start = ctx.cycle_start();
        if ctx.cancel.is_cancelled() {
            info!("Encoder move cancelled");
            return Ok(EncoderMoveOutcome::Cancelled);
        }

        // 第一个周期先写入起始功率，再判断是否到位
        if !first_cycle && !drivetrain.is_busy()? {
            let position = reader.read(drivetrain.hardware_mut())?;
            info!(
                "Encoder move arrived: left {} right {} (target {})",
                position.left_ticks, position.right_ticks, params.target_ticks
            );
            return Ok(EncoderMoveOutcome::Arrived);
        }
        first_cycle = false;

        let now = ctx.clock.now();
        let elapsed = now.saturating_sub(start);
        let readings = reader.read(drivetrain.hardware_mut())?;
        // 按落后的一侧计算剩余距离
        let remaining = [readings.left_ticks, readings.right_ticks]
            .into_iter()
            .map(|ticks| params.target_ticks.saturating_sub(ticks).saturating_abs())
            .max()
            .unwrap_or(0);

        let power = ramp.power(elapsed, remaining);
        drivetrain.set_powers(power, power)?;

        if now.saturating_sub(last_log) >= settings.log_interval() {
            last_log = now;
            info!(
                "Encoder move: left {} right {} remaining {} power {:.2} ({:?})",
                readings.left_ticks,
                readings.right_ticks,
                remaining,
                power,
                ramp.phase()
            );
        }

        ctx.pause_after(cycle_start);
    }
}
