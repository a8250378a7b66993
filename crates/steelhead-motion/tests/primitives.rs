//! 运动原语集成测试（模拟底盘 + 模拟时钟）

use std::time::Duration;
use steelhead_hal::mock::{MockClock, MockConfig, MockDrivetrain, MockPose, PowerWrite};
use steelhead_hal::{CancelToken, Clock, RunMode, Sensor, Wheel};
use steelhead_motion::config::FaultPolicyKind;
use steelhead_motion::{
    DriveStraightParams, EncoderMoveOutcome, EncoderMoveParams, LineFollowOutcome,
    LineFollowParams, LineSide, MotionConfig, MotionEngine, MotionError, MotionOutcome,
    RotateOutcome, RotateParams, StopChain, StopCondition, StopKind,
};

struct Rig {
    engine: MotionEngine<MockDrivetrain, MockClock>,
    mock: MockDrivetrain,
    clock: MockClock,
    cancel: CancelToken,
}

fn rig_with(
    config: MotionConfig,
    setup: impl FnOnce(MockDrivetrain) -> MockDrivetrain,
) -> Rig {
    rig_on(MockConfig::default(), config, setup)
}

fn rig_on(
    mock_config: MockConfig,
    config: MotionConfig,
    setup: impl FnOnce(MockDrivetrain) -> MockDrivetrain,
) -> Rig {
    let clock = MockClock::new();
    let mock = setup(MockDrivetrain::with_config(clock.clone(), mock_config));
    let cancel = CancelToken::new();
    let mut engine =
        MotionEngine::new(mock.clone(), clock.clone(), cancel.clone(), config).unwrap();
    engine.set_rotate_gains(0.02, 0.0, 0.0);
    engine.set_drive_gains(0.05, 0.0, 0.0);
    engine.set_line_gains(0.01, 0.0, 0.0);
    // 丢弃初始化时的置零写入
    mock.clear_power_log();
    Rig {
        engine,
        mock,
        clock,
        cancel,
    }
}

fn rig() -> Rig {
    rig_with(MotionConfig::default(), |mock| mock)
}

fn powers(history: &[PowerWrite]) -> Vec<f64> {
    history.iter().map(|w| w.power).collect()
}

fn assert_stopped(mock: &MockDrivetrain) {
    assert_eq!(mock.last_power(Wheel::Left), 0.0);
    assert_eq!(mock.last_power(Wheel::Right), 0.0);
}

// ==================== 原地转向 ====================

#[test]
fn test_rotate_converges_with_decreasing_power() {
    let mut rig = rig();
    let outcome = rig.engine.rotate(&RotateParams::new(90.0)).unwrap();

    assert_eq!(outcome, RotateOutcome::OnTarget);
    assert!((rig.mock.pose().heading - 90.0).abs() <= 2.0);
    assert!(rig.clock.now() < Duration::from_millis(4000));
    assert_stopped(&rig.mock);

    // 左轮写 +output（逆时针转向时为负），幅值单调不增
    let left = powers(&rig.mock.power_history(Wheel::Left));
    assert!(left.len() > 10);
    assert!(left[0] < 0.0);
    for pair in left.windows(2) {
        assert!(pair[1].abs() <= pair[0].abs() + 1e-12, "{:?}", pair);
    }
    // 右轮方向相反
    let right = powers(&rig.mock.power_history(Wheel::Right));
    assert!(right[0] > 0.0);
}

#[test]
fn test_rotate_output_clamped() {
    let mut rig = rig();
    rig.engine.rotate(&RotateParams::new(-90.0)).unwrap();

    let log = rig.mock.power_log();
    assert!(log.iter().all(|w| w.power.abs() <= 0.25 + 1e-12));
    assert!((rig.mock.pose().heading + 90.0).abs() <= 2.0);
}

#[test]
fn test_rotate_times_out_not_before_limit() {
    let mut rig = rig_with(MotionConfig::default(), |mock| {
        mock.with_heading_script(|_| 0.0)
    });
    let outcome = rig.engine.rotate(&RotateParams::new(90.0)).unwrap();

    assert_eq!(outcome, RotateOutcome::TimedOut);
    // 稳定期 10ms + 超时 4000ms
    assert!(rig.clock.now() >= Duration::from_millis(4010));
    assert!(rig.clock.now() <= Duration::from_millis(4015));
    assert_stopped(&rig.mock);
}

#[test]
fn test_rotate_already_on_target() {
    let mut rig = rig();
    let outcome = rig.engine.rotate(&RotateParams::new(1.0)).unwrap();
    assert_eq!(outcome, RotateOutcome::OnTarget);
    assert!(powers(&rig.mock.power_log()).iter().all(|p| *p == 0.0));
}

#[test]
fn test_rotate_cancelled_within_one_cycle() {
    let mut rig = rig_with(MotionConfig::default(), |mock| {
        mock.with_heading_script(|_| 0.0)
    });
    rig.clock.cancel_at(&rig.cancel, Duration::from_millis(500));

    let outcome = rig.engine.rotate(&RotateParams::new(90.0)).unwrap();
    assert_eq!(outcome, RotateOutcome::Cancelled);
    assert!(rig.clock.now() <= Duration::from_millis(505));
    assert_stopped(&rig.mock);
}

#[test]
fn test_rotate_invalid_output_range() {
    let mut rig = rig();
    let params = RotateParams {
        min_output: 0.5,
        max_output: 0.25,
        ..RotateParams::new(90.0)
    };
    let err = rig.engine.rotate(&params).unwrap_err();
    assert!(matches!(err, MotionError::InvalidParameter { .. }));
    assert!(rig.mock.power_log().is_empty());
}

/// 每次让出都多睡 10ms 的时钟（负载很重的宿主）
struct SlowClock {
    inner: MockClock,
}

impl Clock for SlowClock {
    fn now(&self) -> Duration {
        self.inner.now()
    }

    fn pause(&self, duration: Duration) {
        self.inner.pause(duration + Duration::from_millis(10));
    }
}

#[test]
fn test_rotate_derivative_active_on_slow_host() {
    let clock = MockClock::new();
    let mock =
        MockDrivetrain::new(clock.clone()).with_heading_script(|t| t.as_secs_f64() * 20.0);
    let mut engine = MotionEngine::new(
        mock.clone(),
        SlowClock {
            inner: clock.clone(),
        },
        CancelToken::new(),
        MotionConfig::default(),
    )
    .unwrap();
    // 只有微分项：输出完全来自航向变化率
    engine.set_rotate_gains(0.0, 0.0, 0.01);
    mock.clear_power_log();

    let outcome = engine.rotate(&RotateParams::new(170.0)).unwrap();
    assert_eq!(outcome, RotateOutcome::TimedOut);

    let left = powers(&mock.power_history(Wheel::Left));
    let active = left.iter().filter(|p| p.abs() > 1e-6).count();
    assert!(active > left.len() / 2, "{} of {} writes", active, left.len());
    assert_stopped(&mock);
}

// ==================== 直线行驶 ====================

#[test]
fn test_drive_aborts_over_max_distance() {
    let mut rig = rig();
    let params = DriveStraightParams::new(0.0, 0.5, StopCondition::Color { threshold: 1000 })
        .with_max_distance(1000);

    let outcome = rig.engine.drive_straight(&params).unwrap();
    match outcome {
        MotionOutcome::AbortedOverMax { distance } => assert!(distance >= 1000),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(!outcome.succeeded());
    assert_stopped(&rig.mock);
    assert!(rig.mock.encoder_ticks(Wheel::Right) >= 1000);
}

#[test]
fn test_drive_encoder_stop_reaches_target() {
    let mut rig = rig();
    let params = DriveStraightParams::new(0.0, 0.5, StopCondition::Encoder { ticks: 800 });

    let outcome = rig.engine.drive_straight(&params).unwrap();
    assert_eq!(outcome, MotionOutcome::ReachedTarget);
    assert!(outcome.succeeded());
    assert_stopped(&rig.mock);

    let ticks = rig.mock.encoder_ticks(Wheel::Right);
    assert!((800..=810).contains(&ticks), "ticks = {}", ticks);
    assert_eq!(rig.mock.run_mode(Wheel::Right), RunMode::UsingEncoder);
}

#[test]
fn test_drive_stop_priority_order() {
    let mut rig = rig_with(MotionConfig::default(), |mock| {
        mock.with_switch(|pose| pose.travel >= 300.0)
    });
    let stop = StopChain::single(StopCondition::Switch).then(StopCondition::Encoder { ticks: 2000 });
    let params = DriveStraightParams::new(0.0, 0.5, stop);

    let outcome = rig.engine.drive_straight(&params).unwrap();
    assert_eq!(outcome, MotionOutcome::StoppedByCondition(StopKind::Switch));
    assert!(rig.mock.encoder_ticks(Wheel::Right) < 400);
}

#[test]
fn test_drive_holds_heading() {
    let mut rig = rig();
    rig.mock.set_pose(MockPose {
        heading: 10.0,
        ..Default::default()
    });
    let params = DriveStraightParams::new(0.0, 0.5, StopCondition::Encoder { ticks: 3000 });

    rig.engine.drive_straight(&params).unwrap();
    assert!(rig.mock.pose().heading.abs() <= 1.0 + 1e-9);
}

#[test]
fn test_drive_correction_flips_with_orientation() {
    let mut rig = rig_with(MotionConfig::default(), |mock| {
        mock.with_heading_script(|_| 5.0)
    });
    let params = DriveStraightParams::new(0.0, 0.5, StopCondition::Encoder { ticks: 50 });

    rig.engine.drive_straight(&params).unwrap();
    let forward_left = rig.mock.power_history(Wheel::Left)[0].power;
    let forward_right = rig.mock.power_history(Wheel::Right)[0].power;

    rig.engine.set_backward().unwrap();
    rig.mock.clear_power_log();
    let outcome = rig.engine.drive_straight(&params).unwrap();
    assert_eq!(outcome, MotionOutcome::ReachedTarget);
    let backward_left = rig.mock.power_history(Wheel::Left)[0].power;
    let backward_right = rig.mock.power_history(Wheel::Right)[0].power;

    // 误差 +5°，输出 0.25
    assert!((forward_left - 0.75).abs() < 1e-9);
    assert!((forward_right - 0.25).abs() < 1e-9);
    assert!((forward_left - 0.5) * (backward_left - 0.5) < 0.0);
    assert!((forward_right - 0.5) * (backward_right - 0.5) < 0.0);
    assert!((backward_left - forward_right).abs() < 1e-9);
}

#[test]
fn test_drive_deceleration_then_creep() {
    let mut rig = rig();
    let params = DriveStraightParams::new(0.0, 0.6, StopCondition::Encoder { ticks: 2000 })
        .with_deceleration(0.0005, 2000, 0.4);

    let outcome = rig.engine.drive_straight(&params).unwrap();
    assert_eq!(outcome, MotionOutcome::ReachedTarget);

    let left = powers(&rig.mock.power_history(Wheel::Left));
    let right = powers(&rig.mock.power_history(Wheel::Right));
    assert_eq!(left, right);
    assert!((left[0] - 0.6).abs() < 1e-12);
    for pair in left.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-12);
    }

    let active: Vec<f64> = left.iter().copied().filter(|p| *p > 0.0).collect();
    assert_eq!(*active.last().unwrap(), 0.4);
    assert!(active.iter().any(|p| *p < 0.6 && *p > 0.4));
}

#[test]
fn test_drive_requires_termination_condition() {
    let mut rig = rig();
    let params = DriveStraightParams::new(0.0, 0.5, StopChain::new());
    let err = rig.engine.drive_straight(&params).unwrap_err();
    assert!(matches!(err, MotionError::InvalidParameter { param: "stop", .. }));
}

#[test]
fn test_drive_cancelled() {
    let mut rig = rig();
    rig.clock.cancel_at(&rig.cancel, Duration::from_millis(100));
    let params = DriveStraightParams::new(0.0, 0.5, StopCondition::Switch);

    let outcome = rig.engine.drive_straight(&params).unwrap();
    assert_eq!(outcome, MotionOutcome::Cancelled);
    assert!(outcome.succeeded());
    assert_stopped(&rig.mock);
}

// ==================== 编码器定位 ====================

#[test]
fn test_encoder_move_ramp_profile() {
    let mut rig = rig();
    let outcome = rig
        .engine
        .drive_to_position(&EncoderMoveParams::new(500, 1.0))
        .unwrap();
    assert_eq!(outcome, EncoderMoveOutcome::Arrived);

    let history = rig.mock.power_history(Wheel::Left);
    let left = powers(&history);

    // 加速段：从 0 开始，30ms 时到达巡航功率
    assert_eq!(history[0].at, Duration::ZERO);
    assert_eq!(left[0], 0.0);
    assert_eq!(history[6].at, Duration::from_millis(30));
    assert!((left[6] - 1.0).abs() < 1e-9);
    for pair in left[..7].windows(2) {
        assert!(pair[1] >= pair[0]);
    }

    // 减速段：单调不增，不低于下限
    let ramp_out_start = left[7..].iter().position(|p| *p < 1.0).unwrap() + 7;
    let ramp_out: Vec<f64> = left[ramp_out_start..]
        .iter()
        .copied()
        .take_while(|p| *p > 0.0)
        .collect();
    assert!(!ramp_out.is_empty());
    for pair in ramp_out.windows(2) {
        assert!(pair[1] <= pair[0]);
    }
    assert!(ramp_out.iter().all(|p| *p >= 0.1));

    assert_stopped(&rig.mock);
    assert_eq!(rig.mock.run_mode(Wheel::Left), RunMode::WithoutEncoder);
    assert_eq!(rig.mock.run_mode(Wheel::Right), RunMode::WithoutEncoder);
    assert!((rig.mock.encoder_ticks(Wheel::Right) - 500).abs() <= 5);
}

#[test]
fn test_encoder_move_waits_for_slower_wheel() {
    let slow_left = MockConfig {
        left_speed_scale: 0.5,
        ..Default::default()
    };
    let mut rig = rig_on(slow_left, MotionConfig::default(), |mock| mock);
    let outcome = rig
        .engine
        .drive_to_position(&EncoderMoveParams::new(1000, 1.0))
        .unwrap();
    assert_eq!(outcome, EncoderMoveOutcome::Arrived);

    // 右轮约 520ms 到位，左轮要到 1s 之后
    assert!(rig.clock.now() >= Duration::from_millis(900));
    assert!((rig.mock.encoder_ticks(Wheel::Left) - 1000).abs() <= 5);
    assert!(
        rig.mock
            .power_history(Wheel::Left)
            .iter()
            .any(|w| w.at >= Duration::from_millis(800) && w.power > 0.0)
    );
    assert_stopped(&rig.mock);
}

#[test]
fn test_encoder_move_cancelled() {
    let mut rig = rig();
    rig.clock.cancel_at(&rig.cancel, Duration::from_millis(20));

    let outcome = rig
        .engine
        .drive_to_position(&EncoderMoveParams::new(5000, 0.8))
        .unwrap();
    assert_eq!(outcome, EncoderMoveOutcome::Cancelled);
    assert_stopped(&rig.mock);
    assert_eq!(rig.mock.run_mode(Wheel::Left), RunMode::WithoutEncoder);
}

#[test]
fn test_encoder_move_rejects_invalid_power() {
    let mut rig = rig();
    let err = rig
        .engine
        .drive_to_position(&EncoderMoveParams::new(500, 0.0))
        .unwrap_err();
    assert!(err.is_usage_error());
}

// ==================== 巡线 ====================

/// 运行巡线 200ms 后取消，返回第一次写入的左右功率
fn first_line_powers(rig: &mut Rig, side: LineSide) -> (f64, f64) {
    rig.mock.clear_power_log();
    let cancel_at = rig.clock.now() + Duration::from_millis(200);
    rig.clock.cancel_at(&rig.cancel, cancel_at);

    let params = LineFollowParams::new(5, 45, side, StopChain::new());
    let outcome = rig.engine.line_follow(&params).unwrap();
    assert_eq!(outcome, LineFollowOutcome::Cancelled);
    assert_stopped(&rig.mock);

    (
        rig.mock.power_history(Wheel::Left)[0].power,
        rig.mock.power_history(Wheel::Right)[0].power,
    )
}

#[test]
fn test_line_follow_midpoint_drives_straight() {
    let mut rig = rig_with(MotionConfig::default(), |mock| mock.with_intensity(|_| 25));
    let (left, right) = first_line_powers(&mut rig, LineSide::Left);
    assert_eq!(left, 0.2);
    assert_eq!(right, 0.2);
}

#[test]
fn test_line_follow_left_edge_sign() {
    let mut rig = rig_with(MotionConfig::default(), |mock| mock.with_intensity(|_| 35));
    let (left, right) = first_line_powers(&mut rig, LineSide::Left);
    assert!(left < right);
    assert!((left - 0.1).abs() < 1e-9);
    // 0.3 被钳位到 0.25
    assert!((right - 0.25).abs() < 1e-9);
}

#[test]
fn test_line_follow_right_edge_sign() {
    let mut rig = rig_with(MotionConfig::default(), |mock| mock.with_intensity(|_| 35));
    let (left, right) = first_line_powers(&mut rig, LineSide::Right);
    assert!(left > right);

    let mut rig = rig_with(MotionConfig::default(), |mock| mock.with_intensity(|_| 15));
    let (left, right) = first_line_powers(&mut rig, LineSide::Right);
    assert!(left < right);
}

#[test]
fn test_line_follow_settles_before_driving() {
    let mut rig = rig_with(MotionConfig::default(), |mock| mock.with_intensity(|_| 25));
    first_line_powers(&mut rig, LineSide::Left);
    let first = rig.mock.power_history(Wheel::Left)[0];
    assert!(first.at >= Duration::from_millis(100));
}

#[test]
fn test_line_follow_stops_on_switch() {
    let mut rig = rig_with(MotionConfig::default(), |mock| {
        mock.with_intensity(|_| 25).with_switch(|pose| pose.travel >= 100.0)
    });
    let params = LineFollowParams::new(5, 45, LineSide::Left, StopCondition::Switch);

    let outcome = rig.engine.line_follow(&params).unwrap();
    assert_eq!(outcome, LineFollowOutcome::Stopped(StopKind::Switch));
    assert_stopped(&rig.mock);
}

#[test]
fn test_line_follow_cancelled_while_settling() {
    let mut rig = rig_with(MotionConfig::default(), |mock| mock.with_intensity(|_| 25));
    rig.cancel.cancel();
    let params = LineFollowParams::new(5, 45, LineSide::Left, StopCondition::Switch);

    let outcome = rig.engine.line_follow(&params).unwrap();
    assert_eq!(outcome, LineFollowOutcome::Cancelled);
    assert!(powers(&rig.mock.power_log()).iter().all(|p| *p == 0.0));
    assert_eq!(rig.clock.now(), Duration::ZERO);
}

// ==================== 传感器故障 ====================

#[test]
fn test_short_glitch_is_held_over() {
    let mut rig = rig();
    rig.mock.fail_heading_reads_from(Duration::from_millis(100), 10);

    let outcome = rig.engine.rotate(&RotateParams::new(45.0)).unwrap();
    assert_eq!(outcome, RotateOutcome::OnTarget);
}

#[test]
fn test_persistent_fault_surfaces_as_error() {
    let mut rig = rig_with(MotionConfig::default(), |mock| {
        mock.with_heading_script(|_| 0.0)
    });
    rig.mock.fail_heading_reads_from(Duration::from_millis(100), u32::MAX);

    let err = rig.engine.rotate(&RotateParams::new(90.0)).unwrap_err();
    assert!(matches!(
        err,
        MotionError::SensorFault {
            sensor: Sensor::Heading,
            ..
        }
    ));
    // 25 个周期沿用后上报
    assert!(rig.clock.now() >= Duration::from_millis(225));
    assert!(rig.clock.now() <= Duration::from_millis(230));
    assert_stopped(&rig.mock);
}

#[test]
fn test_fail_fast_policy() {
    let mut config = MotionConfig::default();
    config.sensors.policy = FaultPolicyKind::FailFast;
    let mut rig = rig_with(config, |mock| mock.with_intensity(|_| 25));
    rig.mock.fail_intensity_reads_from(Duration::from_millis(150), 1);

    let params = LineFollowParams::new(5, 45, LineSide::Left, StopCondition::Switch);
    let err = rig.engine.line_follow(&params).unwrap_err();
    assert!(matches!(
        err,
        MotionError::SensorFault {
            sensor: Sensor::Intensity,
            ..
        }
    ));
    assert_eq!(rig.clock.now(), Duration::from_millis(150));
    assert_stopped(&rig.mock);
}

#[test]
fn test_no_first_sample_is_fault() {
    let mut rig = rig();
    rig.mock.fail_heading_reads(u32::MAX);

    let params = DriveStraightParams::new(0.0, 0.5, StopCondition::Switch);
    let err = rig.engine.drive_straight(&params).unwrap_err();
    assert!(err.is_fault());
    assert!(rig.clock.now() >= Duration::from_millis(500));
    assert_stopped(&rig.mock);
}

#[test]
fn test_actuator_failure_propagates_and_zeroes() {
    let mut rig = rig();
    rig.mock.fail_power_writes(1);

    let params = DriveStraightParams::new(0.0, 0.5, StopCondition::Encoder { ticks: 100 });
    let err = rig.engine.drive_straight(&params).unwrap_err();
    assert!(matches!(err, MotionError::Hardware(_)));
    assert_stopped(&rig.mock);
}
