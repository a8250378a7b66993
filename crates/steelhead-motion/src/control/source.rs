//! 误差源
//!
//! 把原始传感器读数换算成有界误差，供 [`PidController`](super::PidController) 使用。
//! 误差符号约定：`误差 = 测量值 - 设定值`。

/// 一次采样的换算结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorSample {
    /// 原始读数
    pub raw: f64,
    /// 换算后的误差
    pub error: f64,
    /// `|error| <= tolerance`
    pub on_target: bool,
}

/// 原始读数 -> 误差
pub trait ErrorSource {
    fn error(&self, raw: f64, setpoint: f64) -> f64;
}

/// 陀螺仪航向误差
///
/// `continuous` 为真时按圆周回绕（走最短路径），误差落在 `[-180, 180)`；
/// 否则直接钳位到 `[-180, 180]`（积分航向，保留误差符号）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadingError {
    pub continuous: bool,
}

impl HeadingError {
    pub fn continuous() -> Self {
        Self { continuous: true }
    }
}

impl ErrorSource for HeadingError {
    fn error(&self, raw: f64, setpoint: f64) -> f64 {
        let error = raw - setpoint;
        if self.continuous {
            let wrapped = (error + 180.0).rem_euclid(360.0) - 180.0;
            // rem_euclid 舍入后可能返回 360
            if wrapped >= 180.0 { wrapped - 360.0 } else { wrapped }
        } else {
            error.clamp(-180.0, 180.0)
        }
    }
}

/// 巡线强度误差
///
/// 读数先钳位到 `[low, high]`，再减去设定值（通常为带宽中点）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineError {
    low: f64,
    high: f64,
}

impl LineError {
    /// `low < high` 由调用方保证（见 `LineFollowParams::validate`）
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// 线边缘对应的设定值
    pub fn midpoint(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    pub fn band(&self) -> (f64, f64) {
        (self.low, self.high)
    }
}

impl ErrorSource for LineError {
    fn error(&self, raw: f64, setpoint: f64) -> f64 {
        raw.clamp(self.low, self.high) - setpoint
    }
}
