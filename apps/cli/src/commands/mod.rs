//! 命令定义和实现

pub mod config;
pub mod motion;
pub mod run;

pub use config::ConfigCommand;
pub use motion::{DriveCommand, EncoderCommand, LineCommand, RotateCommand};
pub use run::RunCommand;

use crate::sim::Simulation;
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::fmt::Debug;
use steelhead_hal::Clock;
use steelhead_hal::mock::MockDrivetrain;
use steelhead_motion::{MotionConfig, MotionEngine, StopCondition};

/// 跑在仿真底盘上的运动引擎
pub type SimEngine = MotionEngine<MockDrivetrain, Box<dyn Clock>>;

/// 单次命令的运行环境
pub struct Runtime {
    pub config: MotionConfig,
    pub sim: Simulation,
    /// 以 JSON 输出结果
    pub json: bool,
}

impl Runtime {
    pub fn engine(&self) -> Result<SimEngine> {
        MotionEngine::new(
            self.sim.drivetrain.clone(),
            self.sim.loop_clock(),
            self.sim.cancel.clone(),
            self.config.clone(),
        )
        .context("初始化运动引擎失败")
    }

    /// 输出一个原语的结果和结束时的仿真状态
    pub fn report<T: Serialize + Debug>(&self, primitive: &str, outcome: &T) -> Result<()> {
        let state = self.sim.snapshot();

        if self.json {
            let report = Report {
                primitive,
                outcome,
                state,
            };
            println!("{}", serde_json::to_string(&report).context("序列化结果失败")?);
        } else {
            println!("🏁 {}: {:?}", primitive, outcome);
            println!(
                "   航向 {:.1}° | 编码器 L {} / R {} | 位移 {:.0} ticks | 用时 {:.2} s",
                state.heading,
                state.left_ticks,
                state.right_ticks,
                state.travel,
                state.elapsed_ms as f64 / 1000.0
            );
        }

        Ok(())
    }
}

#[derive(Serialize)]
struct Report<'a, T: Serialize> {
    primitive: &'a str,
    outcome: &'a T,
    state: crate::sim::SimSnapshot,
}

/// PID 增益覆盖（未给出的项按 0 处理）
#[derive(Args, Debug, Clone, Default)]
pub struct GainArgs {
    /// 比例增益（覆盖配置文件）
    #[arg(long, allow_negative_numbers = true)]
    pub kp: Option<f64>,

    /// 积分增益
    #[arg(long, allow_negative_numbers = true)]
    pub ki: Option<f64>,

    /// 微分增益
    #[arg(long, allow_negative_numbers = true)]
    pub kd: Option<f64>,
}

impl GainArgs {
    pub fn resolve(&self) -> Option<(f64, f64, f64)> {
        if self.kp.is_none() && self.ki.is_none() && self.kd.is_none() {
            return None;
        }
        Some((
            self.kp.unwrap_or(0.0),
            self.ki.unwrap_or(0.0),
            self.kd.unwrap_or(0.0),
        ))
    }
}

/// 解析停止条件：`color:<阈值>`、`encoder:<ticks>`、`switch`
pub fn parse_stop(s: &str) -> Result<StopCondition, String> {
    let (kind, value) = match s.split_once(':') {
        Some((kind, value)) => (kind, Some(value)),
        None => (s, None),
    };

    match (kind.trim().to_ascii_lowercase().as_str(), value) {
        ("color" | "colour", Some(v)) => v
            .trim()
            .parse()
            .map(|threshold| StopCondition::Color { threshold })
            .map_err(|e| format!("invalid color threshold '{}': {}", v, e)),
        ("encoder", Some(v)) => v
            .trim()
            .parse()
            .map(|ticks| StopCondition::Encoder { ticks })
            .map_err(|e| format!("invalid encoder ticks '{}': {}", v, e)),
        ("switch", None) => Ok(StopCondition::Switch),
        _ => Err(format!(
            "unknown stop condition '{}' (expected color:<n>, encoder:<n> or switch)",
            s
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stop() {
        assert_eq!(
            parse_stop("color:40").unwrap(),
            StopCondition::Color { threshold: 40 }
        );
        assert_eq!(
            parse_stop("encoder:-800").unwrap(),
            StopCondition::Encoder { ticks: -800 }
        );
        assert_eq!(parse_stop("switch").unwrap(), StopCondition::Switch);
        assert_eq!(
            parse_stop("Colour: 12").unwrap(),
            StopCondition::Color { threshold: 12 }
        );
    }

    #[test]
    fn test_parse_stop_rejects_garbage() {
        assert!(parse_stop("color").is_err());
        assert!(parse_stop("color:abc").is_err());
        assert!(parse_stop("switch:1").is_err());
        assert!(parse_stop("laser:3").is_err());
    }

    #[test]
    fn test_gain_args_resolve() {
        assert_eq!(GainArgs::default().resolve(), None);

        let gains = GainArgs {
            kp: Some(0.02),
            ..Default::default()
        };
        assert_eq!(gains.resolve(), Some((0.02, 0.0, 0.0)));
    }
}
