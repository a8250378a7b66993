//! 仿真环境
//!
//! CLI 不连接真实底盘：所有原语都跑在 `MockDrivetrain` 上。
//! 场地由几个简单的几何特征组成：
//!
//! - 横向胶带：前向位移落在 `[tape_at, tape_at + TAPE_WIDTH]` 内时反光强度为胶带强度
//! - 纵向线：横向偏移小于 `line_edge` 的一侧是线，边缘有 `EDGE_WIDTH` 的过渡带
//! - 墙：前向位移达到 `wall_at` 后触碰开关按下

use clap::Args;
use std::time::Duration;
use steelhead_hal::mock::{MockClock, MockDrivetrain, MockPose};
use steelhead_hal::{CancelToken, Clock, MonotonicClock, Wheel};

/// 横向胶带宽度（ticks）
const TAPE_WIDTH: f64 = 100.0;
/// 纵向线边缘过渡带宽度（ticks）
const EDGE_WIDTH: f64 = 40.0;

/// 仿真场地参数
#[derive(Args, Debug, Clone)]
pub struct FieldArgs {
    /// 横向胶带距起点的前向距离（ticks）
    #[arg(long, global = true)]
    pub tape_at: Option<f64>,

    /// 纵向线边缘的横向偏移（ticks，左为正）
    #[arg(long, global = true)]
    pub line_edge: Option<f64>,

    /// 墙距起点的前向距离（ticks），到达后触碰开关按下
    #[arg(long, global = true)]
    pub wall_at: Option<f64>,

    /// 场地背景反光强度
    #[arg(long, global = true, default_value_t = 5)]
    pub floor_intensity: u16,

    /// 胶带 / 线的反光强度
    #[arg(long, global = true, default_value_t = 45)]
    pub tape_intensity: u16,

    /// 模拟时间到达该值（毫秒）时触发取消
    #[arg(long, global = true)]
    pub cancel_after_ms: Option<u64>,

    /// 以真实时间节奏运行（默认模拟时间，瞬间完成）
    #[arg(long, global = true)]
    pub realtime: bool,
}

impl FieldArgs {
    fn intensity(&self, pose: &MockPose) -> u16 {
        let floor = f64::from(self.floor_intensity);
        let tape = f64::from(self.tape_intensity);

        let mut coverage: f64 = 0.0;
        if let Some(at) = self.tape_at
            && pose.travel >= at
            && pose.travel <= at + TAPE_WIDTH
        {
            coverage = 1.0;
        }
        if let Some(edge) = self.line_edge {
            let t = (0.5 - (pose.lateral - edge) / EDGE_WIDTH).clamp(0.0, 1.0);
            coverage = coverage.max(t);
        }

        (floor + (tape - floor) * coverage).round() as u16
    }
}

/// 真实时间节奏的模拟时钟
///
/// `pause` 先真实睡眠，再把同样的时长推进到模拟时间轴上，
/// 这样 mock 底盘的运动学仍然由模拟时钟驱动。
pub struct PacedClock {
    simulated: MockClock,
    wall: MonotonicClock,
}

impl Clock for PacedClock {
    fn now(&self) -> Duration {
        self.simulated.now()
    }

    fn pause(&self, duration: Duration) {
        self.wall.pause(duration);
        self.simulated.advance(duration);
    }
}

/// 一次 CLI 调用的仿真会话
pub struct Simulation {
    pub drivetrain: MockDrivetrain,
    pub clock: MockClock,
    pub cancel: CancelToken,
    realtime: bool,
}

impl Simulation {
    pub fn new(field: &FieldArgs, cancel: CancelToken) -> Self {
        let clock = MockClock::new();

        let intensity_field = field.clone();
        let wall_at = field.wall_at;
        let drivetrain = MockDrivetrain::new(clock.clone())
            .with_intensity(move |pose| intensity_field.intensity(pose))
            .with_switch(move |pose| wall_at.is_some_and(|at| pose.travel >= at));

        if let Some(ms) = field.cancel_after_ms {
            clock.cancel_at(&cancel, Duration::from_millis(ms));
        }

        Self {
            drivetrain,
            clock,
            cancel,
            realtime: field.realtime,
        }
    }

    /// 原语使用的时钟
    pub fn loop_clock(&self) -> Box<dyn Clock> {
        if self.realtime {
            Box::new(PacedClock {
                simulated: self.clock.clone(),
                wall: MonotonicClock::new(),
            })
        } else {
            Box::new(self.clock.clone())
        }
    }

    /// 当前仿真状态快照
    pub fn snapshot(&self) -> SimSnapshot {
        let pose = self.drivetrain.pose();
        SimSnapshot {
            elapsed_ms: self.clock.now().as_millis() as u64,
            heading: pose.heading,
            travel: pose.travel,
            lateral: pose.lateral,
            left_ticks: self.drivetrain.encoder_ticks(Wheel::Left),
            right_ticks: self.drivetrain.encoder_ticks(Wheel::Right),
        }
    }
}

/// 仿真状态快照（用于输出报告）
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SimSnapshot {
    pub elapsed_ms: u64,
    pub heading: f64,
    pub travel: f64,
    pub lateral: f64,
    pub left_ticks: i32,
    pub right_ticks: i32,
}
