//! 运动原语
//!
//! 每个原语都是一个阻塞函数，结构相同：
//!
//! 1. 校验参数，准备硬件模式
//! 2. 等待首个完整传感器样本（可被取消）
//! 3. 固定周期循环：检查取消 -> 采样 -> 停止条件 / 到位判定 -> PID -> 写功率 -> 让出
//! 4. 任何退出路径都把功率置零
//!
//! 每轮只睡本周期剩下的时间，工作本身的耗时计入周期。dt 超过上限时调用
//! [`PidController::on_time_jump`] 并钳位 dt；上限取
//! `period * dt_clamp_multiplier` 与实测周期均值乘同一倍数中的较大者，
//! 宿主整体偏慢时微分项不会每轮都被清掉。

pub mod drive_straight;
pub mod encoder_move;
pub mod line_follow;
pub mod rotate;

pub use drive_straight::{DriveStraightParams, MotionOutcome, drive_straight};
pub use encoder_move::{EncoderMoveOutcome, EncoderMoveParams, encoder_move};
pub use line_follow::{LineFollowOutcome, LineFollowParams, LineSide, line_follow};
pub use rotate::{RotateOutcome, RotateParams, rotate};

use crate::config::{LoopSettings, SensorSettings, scale_duration};
use crate::control::PidController;
use crate::drivetrain::Drivetrain;
use crate::error::MotionError;
use crate::sampling::{CycleReadings, SampleReader, SampleStatus};
use std::time::Duration;
use steelhead_hal::{CancelToken, Clock, DriveHardware};
use tracing::debug;

/// 原语运行所需的外部环境
pub struct LoopContext<'a, C: Clock> {
    pub clock: &'a C,
    pub cancel: &'a CancelToken,
    pub timing: &'a LoopSettings,
    pub sensors: &'a SensorSettings,
}

impl<'a, C: Clock> LoopContext<'a, C> {
    pub fn new(
        clock: &'a C,
        cancel: &'a CancelToken,
        timing: &'a LoopSettings,
        sensors: &'a SensorSettings,
    ) -> Self {
        Self {
            clock,
            cancel,
            timing,
            sensors,
        }
    }

    /// 本轮开始的时刻
    pub(crate) fn cycle_start(&self) -> Duration {
        self.clock.now()
    }

    /// 让出到本周期结束（已超时则不睡）
    pub(crate) fn pause_after(&self, cycle_start: Duration) {
        let spent = self.clock.now().saturating_sub(cycle_start);
        self.clock.pause(self.timing.period().saturating_sub(spent));
    }

    pub(crate) fn cycle_timer(&self) -> CycleTimer {
        CycleTimer::new(
            self.clock.now(),
            self.timing.period(),
            self.timing.dt_clamp_multiplier,
        )
    }
}

/// 周期 dt 测量与钳位
#[derive(Debug, Clone, Copy)]
pub(crate) struct CycleTimer {
    last: Duration,
    period: Duration,
    multiplier: f64,
    /// 实测 dt 的滑动平均
    typical: Duration,
}

impl CycleTimer {
    pub(crate) fn new(now: Duration, period: Duration, multiplier: f64) -> Self {
        Self {
            last: now,
            period,
            multiplier,
            typical: period,
        }
    }

    /// 当前的 dt 上限
    pub(crate) fn limit(&self) -> Duration {
        scale_duration(self.period.max(self.typical), self.multiplier)
    }

    /// 返回本周期 dt；超过上限时通知 PID 并钳位
    pub(crate) fn tick(&mut self, now: Duration, pid: &mut PidController) -> Duration {
        let real_dt = now.saturating_sub(self.last);
        self.last = now;

        let limit = self.limit();
        // 单次长停顿对均值的影响有界
        self.typical = self
            .typical
            .saturating_mul(3)
            .saturating_add(real_dt.min(limit.saturating_mul(2)))
            / 4;

        if real_dt > limit {
            pid.on_time_jump(real_dt);
            limit
        } else {
            real_dt
        }
    }
}

/// 等待首个完整样本，且至少经过 `settle`
///
/// 被取消时返回 `Ok(None)`；`first_sample_timeout` 内始终没有有效读数时上报故障。
pub(crate) fn wait_for_first_sample<H, C>(
    drivetrain: &mut Drivetrain<H>,
    ctx: &LoopContext<'_, C>,
    reader: &mut SampleReader,
    settle: Duration,
) -> Result<Option<CycleReadings>, MotionError>
where
    H: DriveHardware,
    C: Clock,
{
    let start = ctx.clock.now();
    let timeout = ctx.sensors.first_sample_timeout().max(settle);

    loop {
        let cycle_start = ctx.cycle_start();
        if ctx.cancel.is_cancelled() {
            return Ok(None);
        }

        let elapsed = ctx.clock.now().saturating_sub(start);
        match reader.poll(drivetrain.hardware_mut())? {
            SampleStatus::Ready(readings) if elapsed >= settle => {
                debug!("First valid sample after {:?}", elapsed);
                return Ok(Some(readings));
            },
            SampleStatus::Ready(_) => {},
            SampleStatus::Pending(sensor) => {
                if elapsed >= timeout {
                    return Err(MotionError::sensor_fault(
                        sensor,
                        format!("no valid sample within {:?}", timeout),
                    ));
                }
            },
        }

        ctx.pause_after(cycle_start);
    }
}

/// 所有退出路径：功率置零后返回结果
///
/// 正常返回时置零失败会作为错误上报；已经出错时只记录日志，保留原始错误。
pub(crate) fn finish<H, T>(
    drivetrain: &mut Drivetrain<H>,
    result: Result<T, MotionError>,
) -> Result<T, MotionError>
where
    H: DriveHardware,
{
    match result {
        Ok(value) => {
            drivetrain.stop()?;
            Ok(value)
        },
        Err(err) => {
            drivetrain.stop_best_effort();
            Err(err)
        },
    }
}

pub(crate) fn ensure_finite(param: &'static str, value: f64) -> Result<(), MotionError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(MotionError::invalid_parameter(
            param,
            format!("must be finite, got {}", value),
        ))
    }
}

pub(crate) fn ensure_power(param: &'static str, value: f64) -> Result<(), MotionError> {
    ensure_finite(param, value)?;
    if (-1.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MotionError::invalid_parameter(
            param,
            format!("must be in [-1, 1], got {}", value),
        ))
    }
}

pub(crate) fn ensure_output_range(min: f64, max: f64) -> Result<(), MotionError> {
    ensure_power("min_output", min)?;
    ensure_power("max_output", max)?;
    if min > max {
        return Err(MotionError::invalid_parameter(
            "min_output",
            format!("must be <= max_output ({} > {})", min, max),
        ));
    }
    Ok(())
}

pub(crate) fn ensure_tolerance(value: f64) -> Result<(), MotionError> {
    ensure_finite("tolerance", value)?;
    if value < 0.0 {
        return Err(MotionError::invalid_parameter(
            "tolerance",
            format!("must be >= 0, got {}", value),
        ));
    }
    Ok(())
}
