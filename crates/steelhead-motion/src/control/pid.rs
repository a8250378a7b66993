//! PID Controller - 比例-积分-微分控制器
//!
//! # 算法
//!
//! ```text
//! output = Kp * e + Ki * ∫e dt + Kd * de/dt
//! ```
//!
//! 其中 `e = 测量值 - 设定值`（由 [`ErrorSource`](super::ErrorSource) 换算）。
//! 输出为正表示需要向测量值减小的方向修正，各原语据此决定左右轮的加减。
//!
//! # 特性
//!
//! - **启用 / 禁用**: 只在启用期间累积积分；禁用时输出为 0
//! - **首样本保护**: 启用后的第一个样本与 `dt == 0` 时不计算微分项
//! - **时间跳变处理**: `on_time_jump` 只重置微分项，保留积分项
//! - **到位判定**: `|e| <= tolerance`

use super::source::{ErrorSample, ErrorSource};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// PID 增益
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }

    pub fn is_finite(&self) -> bool {
        self.kp.is_finite() && self.ki.is_finite() && self.kd.is_finite()
    }
}

/// PID 控制器
///
/// 每个原语调用创建一个新实例，调用结束即丢弃，不跨原语保留状态。
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,

    /// 设定值（与测量值同单位）
    setpoint: f64,

    /// 到位容差（误差绝对值）
    tolerance: f64,

    /// 积分项累积值
    integral: f64,

    /// 上一次的误差（用于计算微分），启用后第一个样本前为 `None`
    previous_error: Option<f64>,

    /// 最近一次计算使用的误差
    last_error: Option<f64>,

    enabled: bool,
}

impl PidController {
    /// 创建新的 PID 控制器（禁用状态）
    pub fn new(setpoint: f64, tolerance: f64) -> Self {
        PidController {
            gains: PidGains::default(),
            setpoint,
            tolerance,
            integral: 0.0,
            previous_error: None,
            last_error: None,
            enabled: false,
        }
    }

    /// 设置 PID 增益
    pub fn with_gains(mut self, kp: f64, ki: f64, kd: f64) -> Self {
        self.gains = PidGains::new(kp, ki, kd);
        self
    }

    pub fn with_pid_gains(mut self, gains: PidGains) -> Self {
        self.gains = gains;
        self
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// 获取当前积分项
    ///
    /// 用于调试和监控。
    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn last_error(&self) -> Option<f64> {
        self.last_error
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 启用控制器并清空积分与微分历史
    pub fn enable(&mut self) {
        self.reset();
        self.enabled = true;
    }

    /// 禁用控制器；之后 `compute` 输出为 0
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// 用误差源换算原始读数
    pub fn sample<S: ErrorSource + ?Sized>(&self, source: &S, raw: f64) -> ErrorSample {
        let error = source.error(raw, self.setpoint);
        ErrorSample {
            raw,
            error,
            on_target: within_tolerance(error, self.tolerance),
        }
    }

    /// 计算一次输出
    ///
    /// 禁用时返回 0 且不改变任何状态。
    pub fn compute(&mut self, error: f64, dt: Duration) -> f64 {
        if !self.enabled {
            return 0.0;
        }

        let dt_sec = dt.as_secs_f64();
        self.last_error = Some(error);

        // 1. 比例项（P）
        let p_term = self.gains.kp * error;

        // 2. 积分项（I），dt == 0 时不累积
        self.integral += error * dt_sec;
        let i_term = self.gains.ki * self.integral;

        // 3. 微分项（D），首样本或 dt == 0 时跳过
        let d_term = match self.previous_error {
            Some(previous) if dt_sec > 0.0 => self.gains.kd * (error - previous) / dt_sec,
            _ => 0.0,
        };

        self.previous_error = Some(error);

        p_term + i_term + d_term
    }

    /// 最近一次误差是否在容差内
    pub fn is_on_target(&self) -> bool {
        self.last_error
            .is_some_and(|error| within_tolerance(error, self.tolerance))
    }

    /// 检测到 dt 异常时调用：只重置微分项
    pub fn on_time_jump(&mut self, dt: Duration) {
        tracing::warn!(
            "PID controller detected time jump: {:?}, resetting derivative term only",
            dt
        );
        self.previous_error = None;
    }

    /// 完全重置控制器状态
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = None;
        self.last_error = None;
    }
}

/// `|error| <= tolerance`
pub fn within_tolerance(error: f64, tolerance: f64) -> bool {
    error.abs() <= tolerance
}
