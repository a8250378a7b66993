//! 脚本系统
//!
//! JSON 脚本按顺序调用运动原语，相当于一段自动阶段程序：
//!
//! ```json
//! {
//!     "name": "park",
//!     "steps": [
//!         { "type": "gains", "drive": { "kp": 0.05, "ki": 0.0, "kd": 0.0 } },
//!         { "type": "drive", "drive_speed": 0.4, "stop": [{ "kind": "color", "threshold": 30 }], "max_distance": 3000 },
//!         { "type": "rotate", "target_heading": 90 },
//!         { "type": "wait", "duration_ms": 250 }
//!     ]
//! }
//! ```

use crate::commands::SimEngine;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use steelhead_hal::Clock;
use steelhead_motion::config::GainTable;
use steelhead_motion::{
    DriveOrientation, DriveStraightParams, EncoderMoveOutcome, EncoderMoveParams,
    LineFollowOutcome, LineFollowParams, MotionOutcome, RotateOutcome, RotateParams,
};
use tracing::{info, warn};

/// 脚本
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    /// 脚本名称
    pub name: String,

    /// 脚本描述
    #[serde(default)]
    pub description: String,

    /// 步骤序列
    pub steps: Vec<ScriptStep>,
}

/// 脚本步骤
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptStep {
    /// 设置 PID 增益（只覆盖给出的回路）
    Gains(GainTable),

    Rotate(RotateParams),

    Drive(DriveStraightParams),

    Encoder(EncoderMoveParams),

    Line(LineFollowParams),

    /// 切换行驶方向
    Orientation { orientation: DriveOrientation },

    /// 陀螺仪清零
    ResetHeading,

    /// 陀螺仪校准
    Calibrate,

    /// 等待
    Wait { duration_ms: u64 },
}

impl ScriptStep {
    pub fn name(&self) -> &'static str {
        match self {
            ScriptStep::Gains(_) => "gains",
            ScriptStep::Rotate(_) => "rotate",
            ScriptStep::Drive(_) => "drive",
            ScriptStep::Encoder(_) => "encoder",
            ScriptStep::Line(_) => "line",
            ScriptStep::Orientation { .. } => "orientation",
            ScriptStep::ResetHeading => "reset_heading",
            ScriptStep::Calibrate => "calibrate",
            ScriptStep::Wait { .. } => "wait",
        }
    }
}

/// 单步结果
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub step: &'static str,
    /// 原语结果（非原语步骤为 `null`）
    pub outcome: serde_json::Value,
}

/// 脚本执行结果
#[derive(Debug, Clone, Serialize)]
pub struct ScriptResult {
    pub script_name: String,
    pub total_steps: usize,
    pub completed: Vec<StepReport>,
    /// 被中止的步骤索引和原因
    pub aborted: Option<(usize, String)>,
    /// 执行过程中收到取消
    pub cancelled: bool,
}

impl ScriptResult {
    pub fn succeeded(&self) -> bool {
        self.aborted.is_none()
    }
}

/// 单步执行后的走向
enum Flow {
    Continue(serde_json::Value),
    Abort(serde_json::Value, String),
    Cancelled(serde_json::Value),
}

/// 脚本执行器
pub struct ScriptExecutor {
    /// 直线行驶超距中止后继续执行
    continue_on_abort: bool,
}

impl ScriptExecutor {
    pub fn new(continue_on_abort: bool) -> Self {
        Self { continue_on_abort }
    }

    /// 加载脚本文件
    pub fn load_script<P: AsRef<Path>>(path: P) -> Result<Script> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取脚本文件失败: {}", path.display()))?;
        let script: Script = serde_json::from_str(&content).context("解析脚本 JSON 失败")?;
        Ok(script)
    }

    /// 执行脚本
    ///
    /// 原语返回错误（增益未配置、传感器故障、硬件故障）时立即返回错误；
    /// 超距中止按 `continue_on_abort` 决定是否继续；取消后不再执行后续步骤。
    pub fn execute(&self, engine: &mut SimEngine, script: &Script) -> Result<ScriptResult> {
        info!("Running script '{}' ({} steps)", script.name, script.steps.len());

        let mut result = ScriptResult {
            script_name: script.name.clone(),
            total_steps: script.steps.len(),
            completed: Vec::new(),
            aborted: None,
            cancelled: false,
        };

        for (index, step) in script.steps.iter().enumerate() {
            info!("Step {}/{}: {}", index + 1, script.steps.len(), step.name());

            let flow = Self::execute_step(engine, step)
                .with_context(|| format!("步骤 {} ({}) 失败", index + 1, step.name()))?;

            let outcome = match flow {
                Flow::Continue(outcome) => outcome,
                Flow::Abort(outcome, reason) => {
                    warn!("Step {} aborted: {}", index + 1, reason);
                    result.completed.push(StepReport {
                        index,
                        step: step.name(),
                        outcome,
                    });
                    if self.continue_on_abort {
                        continue;
                    }
                    result.aborted = Some((index, reason));
                    break;
                },
                Flow::Cancelled(outcome) => {
                    info!("Script cancelled at step {}", index + 1);
                    result.completed.push(StepReport {
                        index,
                        step: step.name(),
                        outcome,
                    });
                    result.cancelled = true;
                    break;
                },
            };

            result.completed.push(StepReport {
                index,
                step: step.name(),
                outcome,
            });
        }

        Ok(result)
    }

    fn execute_step(engine: &mut SimEngine, step: &ScriptStep) -> Result<Flow> {
        let flow = match step {
            ScriptStep::Gains(table) => {
                if let Some(g) = table.rotate {
                    engine.set_rotate_gains(g.kp, g.ki, g.kd);
                }
                if let Some(g) = table.drive {
                    engine.set_drive_gains(g.kp, g.ki, g.kd);
                }
                if let Some(g) = table.line {
                    engine.set_line_gains(g.kp, g.ki, g.kd);
                }
                Flow::Continue(serde_json::Value::Null)
            },

            ScriptStep::Rotate(params) => {
                let outcome = engine.rotate(params)?;
                let value = serde_json::to_value(outcome)?;
                match outcome {
                    RotateOutcome::Cancelled => Flow::Cancelled(value),
                    RotateOutcome::OnTarget | RotateOutcome::TimedOut => Flow::Continue(value),
                }
            },

            ScriptStep::Drive(params) => {
                let outcome = engine.drive_straight(params)?;
                let value = serde_json::to_value(outcome)?;
                match outcome {
                    MotionOutcome::Cancelled => Flow::Cancelled(value),
                    MotionOutcome::AbortedOverMax { distance } => {
                        Flow::Abort(value, format!("drive exceeded max distance ({} ticks)", distance))
                    },
                    _ => Flow::Continue(value),
                }
            },

            ScriptStep::Encoder(params) => {
                let outcome = engine.drive_to_position(params)?;
                let value = serde_json::to_value(outcome)?;
                match outcome {
                    EncoderMoveOutcome::Cancelled => Flow::Cancelled(value),
                    EncoderMoveOutcome::Arrived => Flow::Continue(value),
                }
            },

            ScriptStep::Line(params) => {
                let outcome = engine.line_follow(params)?;
                let value = serde_json::to_value(outcome)?;
                match outcome {
                    LineFollowOutcome::Cancelled => Flow::Cancelled(value),
                    LineFollowOutcome::Stopped(_) => Flow::Continue(value),
                }
            },

            ScriptStep::Orientation { orientation } => {
                engine.set_orientation(*orientation)?;
                Flow::Continue(serde_json::Value::Null)
            },

            ScriptStep::ResetHeading => {
                engine.reset_heading()?;
                Flow::Continue(serde_json::Value::Null)
            },

            ScriptStep::Calibrate => {
                let outcome = engine.calibrate_heading()?;
                Flow::Continue(serde_json::to_value(outcome)?)
            },

            ScriptStep::Wait { duration_ms } => {
                if wait(engine, Duration::from_millis(*duration_ms)) {
                    Flow::Continue(serde_json::Value::Null)
                } else {
                    Flow::Cancelled(serde_json::Value::Null)
                }
            },
        };

        Ok(flow)
    }
}

/// 按循环周期分段等待，返回 false 表示等待期间被取消
fn wait(engine: &SimEngine, duration: Duration) -> bool {
    let clock = engine.clock();
    let period = engine.config().loop_timing.period();
    let start = clock.now();

    while clock.now().saturating_sub(start) < duration {
        if engine.cancel_token().is_cancelled() {
            return false;
        }
        let remaining = duration.saturating_sub(clock.now().saturating_sub(start));
        clock.pause(remaining.min(period));
    }
    !engine.cancel_token().is_cancelled()
}
