//! run 命令
//!
//! 执行脚本文件

use super::Runtime;
use crate::script::ScriptExecutor;
use anyhow::{Result, bail};
use clap::Args;
use std::path::PathBuf;

/// 脚本执行命令参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 脚本文件路径
    #[arg(short, long)]
    pub script: PathBuf,

    /// 直线行驶超距中止后继续执行后续步骤
    #[arg(long)]
    pub continue_on_abort: bool,
}

impl RunCommand {
    pub fn execute(&self, runtime: &Runtime) -> Result<()> {
        let script = ScriptExecutor::load_script(&self.script)?;

        if !runtime.json {
            println!("📜 脚本: {}", script.name);
            if !script.description.is_empty() {
                println!("    {}", script.description);
            }
            println!("    {} 个步骤", script.steps.len());
            println!();
        }

        let mut engine = runtime.engine()?;
        let executor = ScriptExecutor::new(self.continue_on_abort);
        let result = executor.execute(&mut engine, &script)?;

        if runtime.json {
            println!("{}", serde_json::to_string(&result)?);
        } else {
            for report in &result.completed {
                println!("  {:>2}. {:<14} {}", report.index + 1, report.step, report.outcome);
            }
            println!();
            println!("📊 执行结果:");
            println!("  总步骤数: {}", result.total_steps);
            println!("  已执行: {}", result.completed.len());
            if result.cancelled {
                println!("  ⚠️  已取消");
            }
        }

        if let Some((index, reason)) = &result.aborted {
            bail!("脚本在步骤 {} 中止: {}", index + 1, reason);
        }
        Ok(())
    }
}
