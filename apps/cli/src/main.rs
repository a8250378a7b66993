//! # Steelhead CLI
//!
//! 在仿真差速底盘上运行运动原语。
//!
//! ```bash
//! # 单个原语
//! steelhead-cli rotate --heading 90 --kp 0.02
//! steelhead-cli drive --speed 0.4 --stop color:30 --max-distance 3000 --tape-at 1500 --kp 0.05
//! steelhead-cli encoder --ticks 1200 --power 0.5
//! steelhead-cli line --side left --line-edge 0 --cancel-after-ms 3000 --kp 0.01
//!
//! # 脚本
//! steelhead-cli run --script auto.json
//!
//! # 配置
//! steelhead-cli config show
//! ```
//!
//! 默认使用模拟时间（瞬间完成），`--realtime` 按真实节奏运行；
//! Ctrl+C 触发取消，原语在一个周期内停下并把功率置零。

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use steelhead_hal::CancelToken;
use tracing_subscriber::EnvFilter;

mod commands;
mod script;
mod sim;

use commands::{
    ConfigCommand, DriveCommand, EncoderCommand, LineCommand, RotateCommand, RunCommand, Runtime,
};
use sim::{FieldArgs, Simulation};

/// Steelhead CLI - 差速底盘运动原语
#[derive(Parser, Debug)]
#[command(name = "steelhead-cli")]
#[command(about = "Run Steelhead motion primitives on a simulated drivetrain", long_about = None)]
#[command(version)]
struct Cli {
    /// 运动配置文件（默认 <config_dir>/steelhead/motion.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 以 JSON 输出结果
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    field: FieldArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 原地转向
    Rotate {
        #[command(flatten)]
        args: RotateCommand,
    },

    /// 航向保持直线行驶
    Drive {
        #[command(flatten)]
        args: DriveCommand,
    },

    /// 编码器定位
    Encoder {
        #[command(flatten)]
        args: EncoderCommand,
    },

    /// 巡线
    Line {
        #[command(flatten)]
        args: LineCommand,
    },

    /// 执行脚本
    Run {
        #[command(flatten)]
        args: RunCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志（输出到 stderr，stdout 只留结果）
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("steelhead=info"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Config(cmd) = &cli.command {
        return cmd.execute(cli.config.as_deref());
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("Ctrl+C received, cancelling");
        handler_token.cancel();
    })
    .context("注册 Ctrl+C 处理失败")?;

    let runtime = Runtime {
        config: commands::config::load_config(cli.config.as_deref())?,
        sim: Simulation::new(&cli.field, cancel),
        json: cli.json,
    };

    match &cli.command {
        Commands::Rotate { args } => args.execute(&runtime),
        Commands::Drive { args } => args.execute(&runtime),
        Commands::Encoder { args } => args.execute(&runtime),
        Commands::Line { args } => args.execute(&runtime),
        Commands::Run { args } => args.execute(&runtime),
        Commands::Config(_) => Ok(()),
    }
}
