//! 单个运动原语命令
//!
//! 每条命令构造一次引擎、执行一个原语并输出结果。

use super::{GainArgs, Runtime, parse_stop};
use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use steelhead_motion::{
    DriveStraightParams, EncoderMoveParams, LineFollowParams, LineSide, RotateParams,
    StopChain, StopCondition,
};

/// 原地转向
#[derive(Args, Debug)]
pub struct RotateCommand {
    /// 目标航向（度，逆时针为正）
    #[arg(long, allow_negative_numbers = true)]
    pub heading: f64,

    /// 到位容差（度）
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// 航向误差按圆周回绕（走最短路径）
    #[arg(long)]
    pub wrap: bool,

    #[command(flatten)]
    pub gains: GainArgs,
}

impl RotateCommand {
    fn params(&self) -> RotateParams {
        let mut params = RotateParams::new(self.heading);
        if let Some(tolerance) = self.tolerance {
            params.tolerance = tolerance;
        }
        params.wrap_heading = self.wrap;
        params
    }

    pub fn execute(&self, runtime: &Runtime) -> Result<()> {
        let mut engine = runtime.engine()?;
        if let Some((kp, ki, kd)) = self.gains.resolve() {
            engine.set_rotate_gains(kp, ki, kd);
        }

        let outcome = engine.rotate(&self.params())?;
        runtime.report("rotate", &outcome)
    }
}

/// 航向保持直线行驶
#[derive(Args, Debug)]
pub struct DriveCommand {
    /// 保持的航向（度）
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub heading: f64,

    /// 基础速度
    #[arg(long, default_value_t = 0.5)]
    pub speed: f64,

    /// 停止条件，可重复，按给出顺序决定优先级（color:<n> / encoder:<n> / switch）
    #[arg(long = "stop", value_parser = parse_stop)]
    pub stop: Vec<StopCondition>,

    /// 超过该距离（右轮 ticks）仍未停止则中止
    #[arg(long)]
    pub max_distance: Option<i32>,

    /// 末端减速系数（每 tick 降低的功率）
    #[arg(long, requires = "decel_target")]
    pub decel: Option<f64>,

    /// 减速目标距离（ticks）
    #[arg(long)]
    pub decel_target: Option<i32>,

    /// 减速下限
    #[arg(long, default_value_t = 0.15)]
    pub min_end_power: f64,

    /// 以车尾为前方行驶
    #[arg(long)]
    pub backward: bool,

    #[command(flatten)]
    pub gains: GainArgs,
}

impl DriveCommand {
    fn params(&self) -> DriveStraightParams {
        let stop: StopChain = self.stop.iter().copied().collect();
        let mut params = DriveStraightParams::new(self.heading, self.speed, stop);
        if let (Some(coefficient), Some(target)) = (self.decel, self.decel_target) {
            params = params.with_deceleration(coefficient, target, self.min_end_power);
        }
        if let Some(max_distance) = self.max_distance {
            params = params.with_max_distance(max_distance);
        }
        params
    }

    pub fn execute(&self, runtime: &Runtime) -> Result<()> {
        let mut engine = runtime.engine()?;
        if let Some((kp, ki, kd)) = self.gains.resolve() {
            engine.set_drive_gains(kp, ki, kd);
        }
        if self.backward {
            engine.set_backward()?;
        }

        let outcome = engine.drive_straight(&self.params())?;
        runtime.report("drive", &outcome)?;

        if !outcome.succeeded() {
            bail!("直线行驶中止: {:?}", outcome);
        }
        Ok(())
    }
}

/// 编码器定位
#[derive(Args, Debug)]
pub struct EncoderCommand {
    /// 目标位置（ticks）
    #[arg(long, allow_negative_numbers = true)]
    pub ticks: i32,

    /// 巡航功率
    #[arg(long, default_value_t = 0.5)]
    pub power: f64,
}

impl EncoderCommand {
    pub fn execute(&self, runtime: &Runtime) -> Result<()> {
        let mut engine = runtime.engine()?;
        let outcome = engine.drive_to_position(&EncoderMoveParams::new(self.ticks, self.power))?;
        runtime.report("encoder", &outcome)
    }
}

/// 巡线边缘
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum SideArg {
    #[default]
    Left,
    Right,
}

impl From<SideArg> for LineSide {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Left => LineSide::Left,
            SideArg::Right => LineSide::Right,
        }
    }
}

/// 巡线
#[derive(Args, Debug)]
pub struct LineCommand {
    /// 背景强度（带宽下限）
    #[arg(long, default_value_t = 5)]
    pub low: u16,

    /// 线强度（带宽上限）
    #[arg(long, default_value_t = 45)]
    pub high: u16,

    /// 跟随的边缘
    #[arg(long, value_enum, default_value_t = SideArg::Left)]
    pub side: SideArg,

    /// 基础速度
    #[arg(long)]
    pub speed: Option<f64>,

    /// 停止条件，可重复；不给出时只能通过取消结束
    #[arg(long = "stop", value_parser = parse_stop)]
    pub stop: Vec<StopCondition>,

    #[command(flatten)]
    pub gains: GainArgs,
}

impl LineCommand {
    fn params(&self) -> LineFollowParams {
        let stop: StopChain = self.stop.iter().copied().collect();
        let mut params = LineFollowParams::new(self.low, self.high, self.side.into(), stop);
        if let Some(speed) = self.speed {
            params.drive_speed = speed;
        }
        params
    }

    pub fn execute(&self, runtime: &Runtime) -> Result<()> {
        let mut engine = runtime.engine()?;
        if let Some((kp, ki, kd)) = self.gains.resolve() {
            engine.set_line_gains(kp, ki, kd);
        }

        let outcome = engine.line_follow(&self.params())?;
        runtime.report("line", &outcome)
    }
}
