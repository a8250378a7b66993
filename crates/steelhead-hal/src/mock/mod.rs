//! Mock 硬件
//!
//! 用于测试与仿真的模拟时钟和模拟差速底盘。时间只在 [`MockClock::pause`]
//! 中前进，因此运动原语在测试中是完全确定的。

mod drivetrain;

pub use drivetrain::{MockConfig, MockDrivetrain, MockPose, PowerWrite};

use crate::{CancelToken, Clock};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct ClockState {
    now: Duration,
    /// 到达指定时间后置位的取消令牌
    scheduled_cancels: Vec<(Duration, CancelToken)>,
}

/// 模拟时钟
///
/// 克隆共享同一时间轴；[`MockDrivetrain`] 持有一份克隆用来积分运动学。
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    state: Arc<Mutex<ClockState>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 手动推进时间
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.now += duration;
        let now = state.now;
        state.scheduled_cancels.retain(|(at, token)| {
            if now >= *at {
                token.cancel();
                false
            } else {
                true
            }
        });
    }

    /// 模拟时间到达 `at` 时置位 `token`（模拟比赛结束）
    pub fn cancel_at(&self, token: &CancelToken, at: Duration) {
        let mut state = self.state.lock();
        if state.now >= at {
            token.cancel();
        } else {
            state.scheduled_cancels.push((at, token.clone()));
        }
    }
}

impl Clock for MockClock {
    fn now(&self) -> Duration {
        self.state.lock().now
    }

    fn pause(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_shared_timeline() {
        let clock = MockClock::new();
        let other = clock.clone();
        clock.pause(Duration::from_millis(5));
        clock.advance(Duration::from_millis(10));
        assert_eq!(other.now(), Duration::from_millis(15));
    }

    #[test]
    fn test_cancel_at() {
        let clock = MockClock::new();
        let token = CancelToken::new();
        clock.cancel_at(&token, Duration::from_millis(20));

        clock.advance(Duration::from_millis(15));
        assert!(!token.is_cancelled());

        clock.advance(Duration::from_millis(5));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_at_past_time_fires_immediately() {
        let clock = MockClock::new();
        clock.advance(Duration::from_millis(100));
        let token = CancelToken::new();
        clock.cancel_at(&token, Duration::from_millis(50));
        assert!(token.is_cancelled());
    }
}
