//! 功率斜坡
//!
//! - [`SpeedRamp`]：编码器定位的三段式（加速 / 巡航 / 减速）功率曲线
//! - [`DecelerationRamp`]：直线行驶接近目标距离时的线性减速
//!
//! 两者都只计算功率，不做任何 I/O。

use std::time::Duration;

/// 三段式斜坡参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampProfile {
    /// 巡航功率，(0, 1]
    pub target_power: f64,
    /// 加速段时长，0 表示直接以巡航功率启动
    pub ramp_in: Duration,
    /// 剩余距离小于该值后进入减速段
    pub ramp_out_ticks: i32,
    /// 减速段最小功率
    pub floor_power: f64,
}

/// 斜坡阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampPhase {
    RampIn,
    Cruise,
    RampOut,
}

/// 三段式功率斜坡
///
/// 阶段只前进不后退：加速段结束前不会进入减速段；
/// 进入减速段后输出单调不增，且不低于 `floor_power`。
#[derive(Debug, Clone)]
pub struct SpeedRamp {
    profile: RampProfile,
    phase: RampPhase,
    last_ramp_out: Option<f64>,
}

impl SpeedRamp {
    pub fn new(profile: RampProfile) -> Self {
        Self {
            profile,
            phase: RampPhase::RampIn,
            last_ramp_out: None,
        }
    }

    pub fn phase(&self) -> RampPhase {
        self.phase
    }

    /// 根据已用时间和剩余距离（绝对值）计算本周期功率
    pub fn power(&mut self, elapsed: Duration, remaining_ticks: i32) -> f64 {
        let target = self.profile.target_power;

        if self.phase == RampPhase::RampIn {
            if self.profile.ramp_in.is_zero() || elapsed >= self.profile.ramp_in {
                self.phase = RampPhase::Cruise;
            } else {
                let fraction = elapsed.as_secs_f64() / self.profile.ramp_in.as_secs_f64();
                return (target * fraction).clamp(0.0, target);
            }
        }

        if self.phase == RampPhase::Cruise {
            if remaining_ticks < self.profile.ramp_out_ticks {
                self.phase = RampPhase::RampOut;
            } else {
                return target;
            }
        }

        let scaled = if self.profile.ramp_out_ticks > 0 {
            target * f64::from(remaining_ticks.max(0)) / f64::from(self.profile.ramp_out_ticks)
        } else {
            0.0
        };
        let mut power = scaled.max(self.profile.floor_power).min(target);
        if let Some(last) = self.last_ramp_out {
            power = power.min(last);
        }
        self.last_ramp_out = Some(power);
        power
    }
}

/// 减速窗口内的工作速度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkingSpeed {
    pub speed: f64,
    /// 已降到最低功率：此后应停止航向修正，两轮同速蠕行
    pub floored: bool,
}

/// 直线行驶末端减速
///
/// 进入 `[target - lookahead, ∞)` 窗口后：
///
/// ```text
/// window_error = (target - distance) - lookahead    (<= 0)
/// speed        = base + window_error * coefficient
/// ```
///
/// 系数为正时速度随距离线性下降，下限为 `min_end_power`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecelerationRamp {
    pub base_speed: f64,
    pub coefficient: f64,
    pub target_distance: i32,
    pub lookahead: i32,
    pub min_end_power: f64,
}

impl DecelerationRamp {
    /// 窗口外返回 `None`
    pub fn apply(&self, distance: i32) -> Option<WorkingSpeed> {
        let remaining = i64::from(self.target_distance) - i64::from(distance);
        if remaining > i64::from(self.lookahead) {
            return None;
        }

        let window_error = (remaining - i64::from(self.lookahead)) as f64;
        let speed = self.base_speed + window_error * self.coefficient;
        if speed < self.min_end_power {
            Some(WorkingSpeed {
                speed: self.min_end_power,
                floored: true,
            })
        } else {
            Some(WorkingSpeed {
                speed,
                floored: false,
            })
        }
    }
}
