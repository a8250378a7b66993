//! 运动原语错误类型
//!
//! 原语的"正常结束"（到达目标、停止条件触发、超时、取消、超距中止）
//! 都通过各自的 outcome 枚举返回，这里只包含真正的失败：
//! 调用方配置错误、传感器故障、硬件写入失败。

use crate::config::ConfigError;
use steelhead_hal::{HalError, Sensor};
use thiserror::Error;

/// 需要独立 PID 增益的控制回路
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlLoop {
    /// 原地转向
    Rotate,
    /// 直线行驶的航向保持
    Drive,
    /// 巡线
    Line,
}

impl std::fmt::Display for ControlLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ControlLoop::Rotate => "rotate",
            ControlLoop::Drive => "drive",
            ControlLoop::Line => "line",
        };
        f.write_str(name)
    }
}

/// 运动错误
#[derive(Debug, Error)]
pub enum MotionError {
    // ==================== 调用方错误 ====================
    /// 未设置该回路的 PID 增益
    #[error("PID gains not configured for {0} loop")]
    GainsNotConfigured(ControlLoop),

    /// 参数无效
    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter {
        /// 参数名
        param: &'static str,
        /// 原因
        reason: String,
    },

    // ==================== 运行期故障 ====================
    /// 传感器持续无有效读数
    #[error("Sensor fault ({sensor}): {reason}")]
    SensorFault { sensor: Sensor, reason: String },

    /// 硬件层错误（执行器写入、模式切换）
    #[error("Hardware error: {0}")]
    Hardware(#[from] HalError),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl MotionError {
    pub fn invalid_parameter(param: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param,
            reason: reason.into(),
        }
    }

    pub fn sensor_fault(sensor: Sensor, reason: impl Into<String>) -> Self {
        Self::SensorFault {
            sensor,
            reason: reason.into(),
        }
    }

    /// 是否为调用方可修正的错误（参数、增益、配置）
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::GainsNotConfigured(_) | Self::InvalidParameter { .. } | Self::Config(_)
        )
    }

    /// 是否为运行期硬件 / 传感器故障
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::SensorFault { .. } | Self::Hardware(_))
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, MotionError>;
