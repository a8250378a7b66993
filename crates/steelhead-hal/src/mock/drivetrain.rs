//! 模拟差速底盘
//!
//! 简化的运动学模型：
//!
//! ```text
//! 轮速(ticks/s)   = 物理功率 * ticks_per_second
//! 航向变化(度)    = (右轮位移 - 左轮位移) * degrees_per_tick
//! ```
//!
//! 物理功率 = 命令功率 * 方向符号（与 FTC 电机的 `setDirection` 一致，
//! 编码器读数同样乘以方向符号）。位置模式模拟电机控制器自身的闭环：
//! 以命令功率的绝对值向目标运动，进入 `busy_band` 后停止。

use super::MockClock;
use crate::{
    Clock, DriveHardware, HalError, RunMode, Sensor, Wheel, WheelDirection, ZeroPowerBehavior,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

type IntensityFn = Box<dyn Fn(&MockPose) -> u16 + Send>;
type SwitchFn = Box<dyn Fn(&MockPose) -> bool + Send>;
type HeadingScript = Box<dyn Fn(Duration) -> f64 + Send>;

/// 模拟参数
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// 满功率时每秒编码器计数
    pub ticks_per_second: f64,
    /// 左右轮位移差 1 tick 对应的航向变化（度）
    pub degrees_per_tick: f64,
    /// 位置模式的到位判定范围（ticks）
    pub busy_band: i32,
    /// 陀螺仪校准耗时
    pub calibration_time: Duration,
    /// 左轮实际速度相对命令的比例（模拟轮胎打滑、减速比不一致）
    pub left_speed_scale: f64,
    /// 右轮实际速度相对命令的比例
    pub right_speed_scale: f64,
}

impl MockConfig {
    fn speed_scale(&self, wheel: usize) -> f64 {
        if wheel == 0 {
            self.left_speed_scale
        } else {
            self.right_speed_scale
        }
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: 2000.0,
            degrees_per_tick: 0.05,
            busy_band: 5,
            calibration_time: Duration::from_millis(200),
            left_speed_scale: 1.0,
            right_speed_scale: 1.0,
        }
    }
}

/// 模拟车体位姿（起点坐标系）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MockPose {
    /// 车体前向累计位移（ticks，车头方向为正）
    pub travel: f64,
    /// 相对起始航线的横向偏移（ticks，左为正）
    pub lateral: f64,
    /// 真实航向（度，逆时针为正）
    pub heading: f64,
}

/// 一次功率写入记录
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerWrite {
    pub at: Duration,
    pub wheel: Wheel,
    pub power: f64,
}

#[derive(Debug, Clone, Copy)]
struct MotorState {
    power: f64,
    direction: WheelDirection,
    mode: RunMode,
    target: i32,
    /// 物理位移（ticks，车头方向为正）
    physical: f64,
    /// 最近一次清零时的物理位移
    zero: f64,
}

impl MotorState {
    fn new(direction: WheelDirection) -> Self {
        Self {
            power: 0.0,
            direction,
            mode: RunMode::WithoutEncoder,
            target: 0,
            physical: 0.0,
            zero: 0.0,
        }
    }

    fn reported(&self) -> f64 {
        (self.physical - self.zero) * self.direction.sign()
    }
}

/// 故障注入窗口：`from` 之后的 `remaining` 次读取失败
#[derive(Debug, Clone, Copy, Default)]
struct FaultWindow {
    from: Duration,
    remaining: u32,
}

impl FaultWindow {
    fn trip(&mut self, now: Duration) -> bool {
        if self.remaining > 0 && now >= self.from {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }
}

struct MockState {
    config: MockConfig,
    clock: MockClock,
    last_update: Duration,
    motors: [MotorState; 2],
    pose: MockPose,
    heading_zero: f64,
    heading_script: Option<HeadingScript>,
    intensity_fn: Option<IntensityFn>,
    switch_fn: Option<SwitchFn>,
    heading_faults: FaultWindow,
    intensity_faults: FaultWindow,
    power_faults: u32,
    zero_power: ZeroPowerBehavior,
    calibrating_until: Option<Duration>,
    power_log: Vec<PowerWrite>,
}

impl MockState {
    fn motor(&self, wheel: Wheel) -> &MotorState {
        &self.motors[index(wheel)]
    }

    fn motor_mut(&mut self, wheel: Wheel) -> &mut MotorState {
        &mut self.motors[index(wheel)]
    }

    /// 把运动学积分到当前模拟时间
    fn advance(&mut self) {
        let now = self.clock.now();
        let dt = now.saturating_sub(self.last_update).as_secs_f64();
        self.last_update = now;
        if dt <= 0.0 {
            return;
        }

        let band = self.config.busy_band as f64;
        let mut deltas = [0.0; 2];
        for (i, motor) in self.motors.iter_mut().enumerate() {
            let tps = self.config.ticks_per_second * self.config.speed_scale(i);
            let delta = match motor.mode {
                RunMode::WithoutEncoder | RunMode::UsingEncoder => {
                    motor.power * motor.direction.sign() * tps * dt
                },
                RunMode::ToPosition => {
                    let remaining = motor.target as f64 - motor.reported();
                    if remaining.abs() <= band {
                        0.0
                    } else {
                        // 在读数坐标系下向目标运动，不越过目标
                        let step = (motor.power.abs() * tps * dt).min(remaining.abs());
                        step * remaining.signum() * motor.direction.sign()
                    }
                },
                RunMode::StopAndReset => 0.0,
            };
            motor.physical += delta;
            deltas[i] = delta;
        }

        let [left, right] = deltas;
        let forward = (left + right) / 2.0;
        self.pose.heading += (right - left) * self.config.degrees_per_tick;
        self.pose.travel += forward;
        self.pose.lateral += forward * self.pose.heading.to_radians().sin();
    }

    fn log_power(&mut self, wheel: Wheel, power: f64) {
        let at = self.clock.now();
        self.power_log.push(PowerWrite { at, wheel, power });
    }
}

fn index(wheel: Wheel) -> usize {
    match wheel {
        Wheel::Left => 0,
        Wheel::Right => 1,
    }
}

/// 模拟差速底盘
///
/// 克隆共享内部状态：把一份交给运动层，另一份留在测试里检查功率与位姿。
#[derive(Clone)]
pub struct MockDrivetrain {
    state: Arc<Mutex<MockState>>,
}

impl MockDrivetrain {
    pub fn new(clock: MockClock) -> Self {
        Self::with_config(clock, MockConfig::default())
    }

    pub fn with_config(clock: MockClock, config: MockConfig) -> Self {
        let last_update = clock.now();
        Self {
            state: Arc::new(Mutex::new(MockState {
                config,
                clock,
                last_update,
                motors: [
                    MotorState::new(WheelDirection::Forward),
                    MotorState::new(WheelDirection::Forward),
                ],
                pose: MockPose::default(),
                heading_zero: 0.0,
                heading_script: None,
                intensity_fn: None,
                switch_fn: None,
                heading_faults: FaultWindow::default(),
                intensity_faults: FaultWindow::default(),
                power_faults: 0,
                zero_power: ZeroPowerBehavior::Float,
                calibrating_until: None,
                power_log: Vec::new(),
            })),
        }
    }

    /// 反光强度随位姿变化（如：越过白线时 alpha 升高）
    pub fn with_intensity<F>(self, f: F) -> Self
    where
        F: Fn(&MockPose) -> u16 + Send + 'static,
    {
        self.state.lock().intensity_fn = Some(Box::new(f));
        self
    }

    /// 触碰开关随位姿变化
    pub fn with_switch<F>(self, f: F) -> Self
    where
        F: Fn(&MockPose) -> bool + Send + 'static,
    {
        self.state.lock().switch_fn = Some(Box::new(f));
        self
    }

    /// 用脚本覆盖陀螺仪读数（输入为模拟时间）
    pub fn with_heading_script<F>(self, f: F) -> Self
    where
        F: Fn(Duration) -> f64 + Send + 'static,
    {
        self.state.lock().heading_script = Some(Box::new(f));
        self
    }

    /// 接下来 `count` 次陀螺仪读取失败
    pub fn fail_heading_reads(&self, count: u32) {
        self.fail_heading_reads_from(Duration::ZERO, count);
    }

    /// 接下来 `count` 次反光传感器读取失败
    pub fn fail_intensity_reads(&self, count: u32) {
        self.fail_intensity_reads_from(Duration::ZERO, count);
    }

    /// 模拟时间到达 `from` 之后的 `count` 次陀螺仪读取失败
    pub fn fail_heading_reads_from(&self, from: Duration, count: u32) {
        self.state.lock().heading_faults = FaultWindow {
            from,
            remaining: count,
        };
    }

    /// 模拟时间到达 `from` 之后的 `count` 次反光传感器读取失败
    pub fn fail_intensity_reads_from(&self, from: Duration, count: u32) {
        self.state.lock().intensity_faults = FaultWindow {
            from,
            remaining: count,
        };
    }

    /// 接下来 `count` 次功率写入失败
    pub fn fail_power_writes(&self, count: u32) {
        self.state.lock().power_faults = count;
    }

    /// 直接设置车体位姿（测试用）
    pub fn set_pose(&self, pose: MockPose) {
        let mut state = self.state.lock();
        state.advance();
        state.pose = pose;
    }

    pub fn pose(&self) -> MockPose {
        let mut state = self.state.lock();
        state.advance();
        state.pose
    }

    pub fn last_power(&self, wheel: Wheel) -> f64 {
        self.state.lock().motor(wheel).power
    }

    pub fn run_mode(&self, wheel: Wheel) -> RunMode {
        self.state.lock().motor(wheel).mode
    }

    pub fn direction(&self, wheel: Wheel) -> WheelDirection {
        self.state.lock().motor(wheel).direction
    }

    pub fn zero_power_behavior(&self) -> ZeroPowerBehavior {
        self.state.lock().zero_power
    }

    /// 当前编码器读数（不经过故障注入）
    pub fn encoder_ticks(&self, wheel: Wheel) -> i32 {
        let mut state = self.state.lock();
        state.advance();
        state.motor(wheel).reported().round() as i32
    }

    /// 所有功率写入记录
    pub fn power_log(&self) -> Vec<PowerWrite> {
        self.state.lock().power_log.clone()
    }

    /// 某一侧电机的功率写入记录
    pub fn power_history(&self, wheel: Wheel) -> Vec<PowerWrite> {
        self.state
            .lock()
            .power_log
            .iter()
            .filter(|w| w.wheel == wheel)
            .copied()
            .collect()
    }

    pub fn clear_power_log(&self) {
        self.state.lock().power_log.clear();
    }
}

impl DriveHardware for MockDrivetrain {
    fn heading(&mut self) -> Result<f64, HalError> {
        let mut state = self.state.lock();
        state.advance();
        let now = state.clock.now();
        if state.heading_faults.trip(now) {
            debug!("Mock heading read failed at {:?}", now);
            return Err(HalError::sensor(Sensor::Heading, "simulated read failure"));
        }
        let heading = match &state.heading_script {
            Some(script) => script(state.clock.now()),
            None => state.pose.heading - state.heading_zero,
        };
        Ok(heading)
    }

    fn intensity(&mut self) -> Result<u16, HalError> {
        let mut state = self.state.lock();
        state.advance();
        let now = state.clock.now();
        if state.intensity_faults.trip(now) {
            debug!("Mock intensity read failed at {:?}", now);
            return Err(HalError::sensor(Sensor::Intensity, "simulated read failure"));
        }
        let value = state.intensity_fn.as_ref().map(|f| f(&state.pose)).unwrap_or(0);
        Ok(value)
    }

    fn encoder(&mut self, wheel: Wheel) -> Result<i32, HalError> {
        let mut state = self.state.lock();
        state.advance();
        Ok(state.motor(wheel).reported().round() as i32)
    }

    fn switch_pressed(&mut self) -> Result<bool, HalError> {
        let mut state = self.state.lock();
        state.advance();
        Ok(state.switch_fn.as_ref().map(|f| f(&state.pose)).unwrap_or(false))
    }

    fn is_busy(&mut self, wheel: Wheel) -> Result<bool, HalError> {
        let mut state = self.state.lock();
        state.advance();
        let band = state.config.busy_band as f64;
        let motor = state.motor(wheel);
        let busy = motor.mode == RunMode::ToPosition
            && (motor.target as f64 - motor.reported()).abs() > band;
        Ok(busy)
    }

    fn set_power(&mut self, wheel: Wheel, power: f64) -> Result<(), HalError> {
        let mut state = self.state.lock();
        state.advance();
        if state.power_faults > 0 {
            state.power_faults -= 1;
            debug!("Mock power write to {:?} failed", wheel);
            return Err(HalError::actuator(wheel, "simulated write failure"));
        }
        let power = power.clamp(-1.0, 1.0);
        state.motor_mut(wheel).power = power;
        state.log_power(wheel, power);
        Ok(())
    }

    fn set_run_mode(&mut self, wheel: Wheel, mode: RunMode) -> Result<(), HalError> {
        let mut state = self.state.lock();
        state.advance();
        let motor = state.motor_mut(wheel);
        if mode == RunMode::StopAndReset {
            motor.power = 0.0;
            motor.zero = motor.physical;
            debug!("Mock {:?} encoder reset", wheel);
        }
        if motor.mode != mode {
            trace!("Mock {:?} run mode {:?} -> {:?}", wheel, motor.mode, mode);
        }
        motor.mode = mode;
        Ok(())
    }

    fn set_target_position(&mut self, wheel: Wheel, ticks: i32) -> Result<(), HalError> {
        let mut state = self.state.lock();
        state.advance();
        state.motor_mut(wheel).target = ticks;
        Ok(())
    }

    fn set_direction(&mut self, wheel: Wheel, direction: WheelDirection) -> Result<(), HalError> {
        let mut state = self.state.lock();
        state.advance();
        // 与真实电机一致：翻转方向后读数随之变号
        state.motor_mut(wheel).direction = direction;
        Ok(())
    }

    fn set_zero_power_behavior(&mut self, behavior: ZeroPowerBehavior) -> Result<(), HalError> {
        self.state.lock().zero_power = behavior;
        Ok(())
    }

    fn reset_heading(&mut self) -> Result<(), HalError> {
        let mut state = self.state.lock();
        state.advance();
        state.heading_zero = state.pose.heading;
        Ok(())
    }

    fn calibrate_heading(&mut self) -> Result<(), HalError> {
        let mut state = self.state.lock();
        let until = state.clock.now() + state.config.calibration_time;
        state.calibrating_until = Some(until);
        debug!("Mock gyro calibrating until {:?}", until);
        Ok(())
    }

    fn is_calibrating(&mut self) -> Result<bool, HalError> {
        let state = self.state.lock();
        Ok(state
            .calibrating_until
            .is_some_and(|until| state.clock.now() < until))
    }
}
