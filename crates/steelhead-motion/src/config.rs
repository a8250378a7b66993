//! # 运动配置
//!
//! PID 增益、循环周期、各原语的时间常数与传感器故障策略。
//! 所有字段都有默认值，TOML 文件里只需写要覆盖的部分：
//!
//! ```toml
//! [gains.rotate]
//! kp = 0.02
//! ki = 0.0
//! kd = 0.001
//!
//! [loop]
//! period_ms = 5
//!
//! [sensors]
//! policy = "fail-fast"
//! ```
//!
//! 配置文件路径（CLI 默认）：
//! - Linux/macOS: `~/.config/steelhead/motion.toml`
//! - Windows: `%APPDATA%\steelhead\motion.toml`

use crate::control::PidGains;
use crate::sampling::FaultPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// 字段取值无效
    #[error("Invalid config value '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// 运动配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// 各回路的 PID 增益（未设置的回路在运行前必须通过 setter 配置）
    pub gains: GainTable,

    /// 控制循环定时
    #[serde(rename = "loop")]
    pub loop_timing: LoopSettings,

    pub rotate: RotateSettings,

    pub drive_straight: DriveStraightSettings,

    pub encoder_move: EncoderMoveSettings,

    pub line_follow: LineFollowSettings,

    pub sensors: SensorSettings,
}

impl MotionConfig {
    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MotionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// 文件存在时加载，否则返回默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 校验所有字段
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, gains) in [
            ("gains.rotate", self.gains.rotate),
            ("gains.drive", self.gains.drive),
            ("gains.line", self.gains.line),
        ] {
            if let Some(gains) = gains
                && !gains.is_finite()
            {
                return Err(ConfigError::invalid(field, "gains must be finite"));
            }
        }

        if self.loop_timing.period_ms == 0 {
            return Err(ConfigError::invalid("loop.period_ms", "must be > 0"));
        }
        if !(1.0..=MAX_DT_CLAMP_MULTIPLIER).contains(&self.loop_timing.dt_clamp_multiplier) {
            return Err(ConfigError::invalid(
                "loop.dt_clamp_multiplier",
                format!(
                    "must be in [1, {}], got {}",
                    MAX_DT_CLAMP_MULTIPLIER, self.loop_timing.dt_clamp_multiplier
                ),
            ));
        }

        if self.rotate.timeout_ms == 0 {
            return Err(ConfigError::invalid("rotate.timeout_ms", "must be > 0"));
        }

        if self.drive_straight.lookahead_ticks < 0 {
            return Err(ConfigError::invalid(
                "drive_straight.lookahead_ticks",
                format!("must be >= 0, got {}", self.drive_straight.lookahead_ticks),
            ));
        }

        let encoder = &self.encoder_move;
        if encoder.ramp_out_ticks < 0 {
            return Err(ConfigError::invalid(
                "encoder_move.ramp_out_ticks",
                format!("must be >= 0, got {}", encoder.ramp_out_ticks),
            ));
        }
        if !(0.0..=1.0).contains(&encoder.floor_power) {
            return Err(ConfigError::invalid(
                "encoder_move.floor_power",
                format!("must be in [0, 1], got {}", encoder.floor_power),
            ));
        }

        if self.sensors.policy == FaultPolicyKind::HoldLast && self.sensors.max_held_cycles == 0 {
            return Err(ConfigError::invalid(
                "sensors.max_held_cycles",
                "must be > 0 with the hold-last policy",
            ));
        }

        Ok(())
    }
}

/// 各回路的 PID 增益
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainTable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotate: Option<PidGains>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive: Option<PidGains>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<PidGains>,
}

/// 控制循环定时
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopSettings {
    /// 两次轮询之间的让出时长
    pub period_ms: u64,

    /// dt 钳位倍数
    ///
    /// 实测 dt 超过 `max(period, 实测周期均值) * dt_clamp_multiplier` 时
    /// 重置 PID 微分项并钳位 dt。取值范围 `[1, 100]`。
    pub dt_clamp_multiplier: f64,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            period_ms: 5,
            dt_clamp_multiplier: 2.0,
        }
    }
}

impl LoopSettings {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn max_dt(&self) -> Duration {
        scale_duration(self.period(), self.dt_clamp_multiplier)
    }
}

/// `dt_clamp_multiplier` 的上限
pub const MAX_DT_CLAMP_MULTIPLIER: f64 = 100.0;

/// `duration * factor`，溢出或非有限值时取 `Duration::MAX`
pub(crate) fn scale_duration(duration: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// 原地转向
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotateSettings {
    /// 超时（从稳定期结束开始计时）
    pub timeout_ms: u64,
    /// 启动前的稳定期
    pub settle_ms: u64,
}

impl Default for RotateSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 4000,
            settle_ms: 10,
        }
    }
}

impl RotateSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// 直线行驶
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveStraightSettings {
    /// 减速窗口长度：剩余距离小于该值后开始减速
    pub lookahead_ticks: i32,
    pub settle_ms: u64,
}

impl Default for DriveStraightSettings {
    fn default() -> Self {
        Self {
            lookahead_ticks: 500,
            settle_ms: 10,
        }
    }
}

impl DriveStraightSettings {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// 编码器定位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderMoveSettings {
    /// 加速段时长
    pub ramp_in_ms: u64,
    /// 剩余距离小于该值后进入减速段
    pub ramp_out_ticks: i32,
    /// 减速段最小功率
    pub floor_power: f64,
    /// 进度日志间隔
    pub log_interval_ms: u64,
}

impl Default for EncoderMoveSettings {
    fn default() -> Self {
        Self {
            ramp_in_ms: 30,
            ramp_out_ticks: 30,
            floor_power: 0.1,
            log_interval_ms: 500,
        }
    }
}

impl EncoderMoveSettings {
    pub fn ramp_in(&self) -> Duration {
        Duration::from_millis(self.ramp_in_ms)
    }

    pub fn log_interval(&self) -> Duration {
        Duration::from_millis(self.log_interval_ms)
    }
}

/// 巡线
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFollowSettings {
    /// 等待第一次有效强度读数的最短时长
    pub settle_ms: u64,
}

impl Default for LineFollowSettings {
    fn default() -> Self {
        Self { settle_ms: 100 }
    }
}

impl LineFollowSettings {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// 传感器故障策略名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultPolicyKind {
    /// 沿用上一次有效读数，连续失败超过上限后报故障
    HoldLast,
    /// 第一次失败即报故障
    FailFast,
}

/// 传感器与校准
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    pub policy: FaultPolicyKind,
    /// hold-last 策略下允许连续沿用的周期数
    pub max_held_cycles: u32,
    /// 原语启动时等待第一次有效读数的上限
    pub first_sample_timeout_ms: u64,
    /// 陀螺仪校准等待上限
    pub calibration_timeout_ms: u64,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            policy: FaultPolicyKind::HoldLast,
            max_held_cycles: 25,
            first_sample_timeout_ms: 500,
            calibration_timeout_ms: 3000,
        }
    }
}

impl SensorSettings {
    pub fn fault_policy(&self) -> FaultPolicy {
        match self.policy {
            FaultPolicyKind::HoldLast => FaultPolicy::HoldLast {
                max_held_cycles: self.max_held_cycles,
            },
            FaultPolicyKind::FailFast => FaultPolicy::FailFast,
        }
    }

    pub fn first_sample_timeout(&self) -> Duration {
        Duration::from_millis(self.first_sample_timeout_ms)
    }

    pub fn calibration_timeout(&self) -> Duration {
        Duration::from_millis(self.calibration_timeout_ms)
    }
}
