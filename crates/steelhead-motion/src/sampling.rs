//! 周期采样
//!
//! 每个控制周期按需读取一次传感器，生成 [`CycleReadings`] 快照；
//! 停止条件和 PID 都只看这份快照，同一周期内不会重复读取。
//!
//! 读取失败时按 [`FaultPolicy`] 处理：沿用上一次有效值，
//! 或者直接上报 [`MotionError::SensorFault`]。

use crate::error::MotionError;
use steelhead_hal::{DriveHardware, HalError, Sensor, Wheel};
use tracing::warn;

/// 传感器故障策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPolicy {
    /// 沿用上一次有效读数；连续失败超过 `max_held_cycles` 后上报故障
    HoldLast { max_held_cycles: u32 },
    /// 第一次失败即上报故障
    FailFast,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        FaultPolicy::HoldLast { max_held_cycles: 25 }
    }
}

/// 本周期需要读取的传感器
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorNeeds {
    pub heading: bool,
    pub intensity: bool,
    /// 左右编码器
    pub encoders: bool,
    pub switch: bool,
}

impl SensorNeeds {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_heading(mut self) -> Self {
        self.heading = true;
        self
    }

    pub fn with_intensity(mut self) -> Self {
        self.intensity = true;
        self
    }

    pub fn with_encoders(mut self) -> Self {
        self.encoders = true;
        self
    }

    pub fn with_switch(mut self) -> Self {
        self.switch = true;
        self
    }

    pub fn union(self, other: SensorNeeds) -> Self {
        Self {
            heading: self.heading || other.heading,
            intensity: self.intensity || other.intensity,
            encoders: self.encoders || other.encoders,
            switch: self.switch || other.switch,
        }
    }
}

/// 单个周期的传感器快照
///
/// 未在 [`SensorNeeds`] 中声明的字段保持默认值。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CycleReadings {
    pub heading: f64,
    pub intensity: u16,
    pub left_ticks: i32,
    pub right_ticks: i32,
    pub switch_pressed: bool,
}

impl CycleReadings {
    /// 已行驶距离：以右轮编码器为准
    pub fn distance(&self) -> i32 {
        self.right_ticks
    }
}

/// 采样状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleStatus {
    /// 所有需要的传感器都有可用值
    Ready(CycleReadings),
    /// 该传感器尚未产生过有效读数
    Pending(Sensor),
}

/// 单个传感器的沿用状态
#[derive(Debug, Clone, Copy, Default)]
struct Held<T> {
    value: Option<T>,
    failures: u32,
}

/// 带故障策略的周期采样器
#[derive(Debug, Clone)]
pub struct SampleReader {
    policy: FaultPolicy,
    needs: SensorNeeds,
    heading: Held<f64>,
    intensity: Held<u16>,
    left: Held<i32>,
    right: Held<i32>,
    switch: Held<bool>,
}

impl SampleReader {
    pub fn new(policy: FaultPolicy, needs: SensorNeeds) -> Self {
        Self {
            policy,
            needs,
            heading: Held::default(),
            intensity: Held::default(),
            left: Held::default(),
            right: Held::default(),
            switch: Held::default(),
        }
    }

    pub fn needs(&self) -> SensorNeeds {
        self.needs
    }

    /// 读取一次所有需要的传感器
    ///
    /// 某个传感器从未成功读取过时返回 `Pending`；此前有过有效值时按故障策略处理。
    pub fn poll<H: DriveHardware>(&mut self, hardware: &mut H) -> Result<SampleStatus, MotionError> {
        let policy = self.policy;
        let mut readings = CycleReadings::default();

        if self.needs.heading {
            match resolve(policy, Sensor::Heading, &mut self.heading, hardware.heading())? {
                Some(value) => readings.heading = value,
                None => return Ok(SampleStatus::Pending(Sensor::Heading)),
            }
        }

        if self.needs.intensity {
            match resolve(policy, Sensor::Intensity, &mut self.intensity, hardware.intensity())? {
                Some(value) => readings.intensity = value,
                None => return Ok(SampleStatus::Pending(Sensor::Intensity)),
            }
        }

        if self.needs.encoders {
            let left = hardware.encoder(Wheel::Left);
            match resolve(policy, Sensor::LeftEncoder, &mut self.left, left)? {
                Some(value) => readings.left_ticks = value,
                None => return Ok(SampleStatus::Pending(Sensor::LeftEncoder)),
            }

            let right = hardware.encoder(Wheel::Right);
            match resolve(policy, Sensor::RightEncoder, &mut self.right, right)? {
                Some(value) => readings.right_ticks = value,
                None => return Ok(SampleStatus::Pending(Sensor::RightEncoder)),
            }
        }

        if self.needs.switch {
            match resolve(policy, Sensor::Switch, &mut self.switch, hardware.switch_pressed())? {
                Some(value) => readings.switch_pressed = value,
                None => return Ok(SampleStatus::Pending(Sensor::Switch)),
            }
        }

        Ok(SampleStatus::Ready(readings))
    }

    /// 读取一次；仍无有效值的传感器视为故障
    ///
    /// 用于已经拿到过首个完整样本之后的主循环。
    pub fn read<H: DriveHardware>(&mut self, hardware: &mut H) -> Result<CycleReadings, MotionError> {
        match self.poll(hardware)? {
            SampleStatus::Ready(readings) => Ok(readings),
            SampleStatus::Pending(sensor) => Err(MotionError::sensor_fault(
                sensor,
                "no valid sample has been read",
            )),
        }
    }
}

/// 应用故障策略
///
/// 返回 `Ok(None)` 表示该传感器还没有任何有效值。
fn resolve<T: Copy>(
    policy: FaultPolicy,
    sensor: Sensor,
    held: &mut Held<T>,
    result: Result<T, HalError>,
) -> Result<Option<T>, MotionError> {
    match result {
        Ok(value) => {
            held.value = Some(value);
            held.failures = 0;
            Ok(Some(value))
        }
        Err(err) => {
            let Some(last) = held.value else {
                return Ok(None);
            };
            held.failures += 1;
            match policy {
                FaultPolicy::FailFast => Err(MotionError::sensor_fault(sensor, err.to_string())),
                FaultPolicy::HoldLast { max_held_cycles } => {
                    if held.failures > max_held_cycles {
                        Err(MotionError::sensor_fault(
                            sensor,
                            format!("{} consecutive failed reads, last: {}", held.failures, err),
                        ))
                    } else {
                        warn!(
                            "{} read failed ({}/{}), holding last value: {}",
                            sensor, held.failures, max_held_cycles, err
                        );
                        Ok(Some(last))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steelhead_hal::mock::{MockClock, MockDrivetrain, MockPose};

    fn mock() -> MockDrivetrain {
        MockDrivetrain::new(MockClock::new())
    }

    #[test]
    fn test_reads_only_needed_sensors() {
        let mut hw = mock().with_intensity(|_| 42).with_switch(|_| true);
        hw.set_pose(MockPose {
            heading: 12.0,
            ..Default::default()
        });

        let mut reader = SampleReader::new(FaultPolicy::default(), SensorNeeds::none().with_intensity());
        let readings = reader.read(&mut hw).unwrap();
        assert_eq!(readings.intensity, 42);
        // 未声明的传感器保持默认值
        assert_eq!(readings.heading, 0.0);
        assert!(!readings.switch_pressed);

        let mut reader = SampleReader::new(
            FaultPolicy::default(),
            SensorNeeds::none().with_heading().with_switch(),
        );
        let readings = reader.read(&mut hw).unwrap();
        assert_eq!(readings.heading, 12.0);
        assert!(readings.switch_pressed);
    }

    #[test]
    fn test_pending_until_first_valid_sample() {
        let mut hw = mock();
        hw.fail_heading_reads(2);
        let mut reader = SampleReader::new(FaultPolicy::FailFast, SensorNeeds::none().with_heading());

        assert_eq!(reader.poll(&mut hw).unwrap(), SampleStatus::Pending(Sensor::Heading));
        assert_eq!(reader.poll(&mut hw).unwrap(), SampleStatus::Pending(Sensor::Heading));
        assert!(matches!(reader.poll(&mut hw).unwrap(), SampleStatus::Ready(_)));
    }

    #[test]
    fn test_hold_last_then_fault() {
        let mut hw = mock();
        hw.set_pose(MockPose {
            heading: 30.0,
            ..Default::default()
        });
        let mut reader = SampleReader::new(
            FaultPolicy::HoldLast { max_held_cycles: 3 },
            SensorNeeds::none().with_heading(),
        );
        assert_eq!(reader.read(&mut hw).unwrap().heading, 30.0);

        hw.set_pose(MockPose {
            heading: 50.0,
            ..Default::default()
        });
        hw.fail_heading_reads(4);
        for _ in 0..3 {
            assert_eq!(reader.read(&mut hw).unwrap().heading, 30.0);
        }
        let err = reader.read(&mut hw).unwrap_err();
        assert!(matches!(
            err,
            MotionError::SensorFault {
                sensor: Sensor::Heading,
                ..
            }
        ));
    }

    #[test]
    fn test_hold_last_counter_resets_on_success() {
        let mut hw = mock();
        let mut reader = SampleReader::new(
            FaultPolicy::HoldLast { max_held_cycles: 2 },
            SensorNeeds::none().with_heading(),
        );
        reader.read(&mut hw).unwrap();

        for _ in 0..3 {
            hw.fail_heading_reads(2);
            reader.read(&mut hw).unwrap();
            reader.read(&mut hw).unwrap();
            // 成功读取，计数清零
            reader.read(&mut hw).unwrap();
        }
    }

    #[test]
    fn test_fail_fast() {
        let mut hw = mock().with_intensity(|_| 10);
        let mut reader = SampleReader::new(FaultPolicy::FailFast, SensorNeeds::none().with_intensity());
        reader.read(&mut hw).unwrap();

        hw.fail_intensity_reads(1);
        let err = reader.read(&mut hw).unwrap_err();
        assert!(err.is_fault());
        assert!(err.to_string().contains("intensity"));
    }

    #[test]
    fn test_distance_is_right_encoder() {
        let readings = CycleReadings {
            left_ticks: 100,
            right_ticks: 250,
            ..Default::default()
        };
        assert_eq!(readings.distance(), 250);
    }

    #[test]
    fn test_needs_union() {
        let a = SensorNeeds::none().with_heading();
        let b = SensorNeeds::none().with_switch();
        let both = a.union(b);
        assert!(both.heading && both.switch);
        assert!(!both.intensity && !both.encoders);
    }
}
