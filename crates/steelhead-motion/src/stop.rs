//! 停止条件
//!
//! 每个条件只依赖一种传感器，对同一周期的 [`CycleReadings`] 独立求值。
//! [`StopChain`] 按优先级保存多个条件，第一个命中的条件决定停止原因。

use crate::sampling::{CycleReadings, SensorNeeds};
use serde::{Deserialize, Serialize};

/// 停止条件
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopCondition {
    /// 反光强度严格大于阈值
    Color { threshold: u16 },
    /// 右轮编码器达到目标计数
    Encoder { ticks: i32 },
    /// 触碰开关按下
    Switch,
}

/// 停止原因（不带参数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    Color,
    Encoder,
    Switch,
}

impl std::fmt::Display for StopKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StopKind::Color => "color",
            StopKind::Encoder => "encoder",
            StopKind::Switch => "switch",
        };
        f.write_str(name)
    }
}

impl StopCondition {
    pub fn kind(&self) -> StopKind {
        match self {
            StopCondition::Color { .. } => StopKind::Color,
            StopCondition::Encoder { .. } => StopKind::Encoder,
            StopCondition::Switch => StopKind::Switch,
        }
    }

    /// 求值需要的传感器
    pub fn needs(&self) -> SensorNeeds {
        match self {
            StopCondition::Color { .. } => SensorNeeds::none().with_intensity(),
            StopCondition::Encoder { .. } => SensorNeeds::none().with_encoders(),
            StopCondition::Switch => SensorNeeds::none().with_switch(),
        }
    }

    pub fn should_stop(&self, readings: &CycleReadings) -> bool {
        match *self {
            StopCondition::Color { threshold } => readings.intensity > threshold,
            StopCondition::Encoder { ticks } => readings.right_ticks >= ticks,
            StopCondition::Switch => readings.switch_pressed,
        }
    }
}

/// 按优先级排列的停止条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StopChain {
    conditions: Vec<StopCondition>,
}

impl StopChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(condition: StopCondition) -> Self {
        Self {
            conditions: vec![condition],
        }
    }

    /// 追加一个优先级更低的条件
    pub fn then(mut self, condition: StopCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[StopCondition] {
        &self.conditions
    }

    pub fn needs(&self) -> SensorNeeds {
        self.conditions
            .iter()
            .fold(SensorNeeds::none(), |needs, c| needs.union(c.needs()))
    }

    /// 第一个命中的条件
    pub fn first_triggered(&self, readings: &CycleReadings) -> Option<&StopCondition> {
        self.conditions.iter().find(|c| c.should_stop(readings))
    }
}

impl From<StopCondition> for StopChain {
    fn from(condition: StopCondition) -> Self {
        Self::single(condition)
    }
}

impl FromIterator<StopCondition> for StopChain {
    fn from_iter<I: IntoIterator<Item = StopCondition>>(iter: I) -> Self {
        Self {
            conditions: iter.into_iter().collect(),
        }
    }
}
