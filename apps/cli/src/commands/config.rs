//! 配置管理命令
//!
//! 查看、检查、生成运动配置文件（TOML）

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use std::fs;
use std::path::{Path, PathBuf};
use steelhead_motion::MotionConfig;

/// 默认配置文件路径：`<config_dir>/steelhead/motion.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("steelhead").join("motion.toml"))
}

/// 加载运动配置
///
/// 显式给出的路径必须存在；默认路径不存在时使用内置默认值。
pub fn load_config(explicit: Option<&Path>) -> Result<MotionConfig> {
    match explicit {
        Some(path) => MotionConfig::load(path)
            .with_context(|| format!("加载配置文件失败: {}", path.display())),
        None => match default_config_path() {
            Some(path) => MotionConfig::load_or_default(&path)
                .with_context(|| format!("加载配置文件失败: {}", path.display())),
            None => Ok(MotionConfig::default()),
        },
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印生效的配置（TOML）
    Show,

    /// 检查配置文件
    Check,

    /// 写出默认配置文件
    Init {
        /// 覆盖已存在的文件
        #[arg(long)]
        force: bool,
    },

    /// 打印配置文件路径
    Path,
}

impl ConfigCommand {
    pub fn execute(&self, explicit: Option<&Path>) -> Result<()> {
        match self {
            ConfigCommand::Show => {
                let config = load_config(explicit)?;
                print!("{}", config.to_toml_string()?);
                Ok(())
            },

            ConfigCommand::Check => {
                let config = load_config(explicit)?;
                config.validate().context("配置无效")?;
                match resolve_path(explicit) {
                    Some(path) if path.exists() => println!("✅ 配置有效: {}", path.display()),
                    _ => println!("✅ 配置有效（内置默认值）"),
                }
                Ok(())
            },

            ConfigCommand::Init { force } => {
                let path = resolve_path(explicit).context("无法确定配置目录")?;
                if path.exists() && !force {
                    bail!("配置文件已存在: {}（使用 --force 覆盖）", path.display());
                }
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).context("创建配置目录失败")?;
                }
                fs::write(&path, MotionConfig::default().to_toml_string()?)
                    .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
                println!("✅ 已写入默认配置: {}", path.display());
                Ok(())
            },

            ConfigCommand::Path => {
                match resolve_path(explicit) {
                    Some(path) => println!("{}", path.display()),
                    None => println!("(未知)"),
                }
                Ok(())
            },
        }
    }
}

fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(default_config_path)
}
