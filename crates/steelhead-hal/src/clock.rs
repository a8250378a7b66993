//! 单调时钟
//!
//! 运动原语通过 [`Clock`] 获取时间并在两次轮询之间让出，
//! 这样测试可以用模拟时钟替换真实时间。

use spin_sleep::SpinSleeper;
use std::time::{Duration, Instant};

/// 单调时间源
pub trait Clock {
    /// 自任意起点以来经过的时间，单调不减
    fn now(&self) -> Duration;

    /// 两次轮询之间的短暂让出
    fn pause(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn pause(&self, duration: Duration) {
        (**self).pause(duration)
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn pause(&self, duration: Duration) {
        (**self).pause(duration)
    }
}

/// 基于 `Instant` 的真实时钟
///
/// `pause` 使用 `spin_sleep`，抖动比 `std::thread::sleep` 小。
pub struct MonotonicClock {
    origin: Instant,
    sleeper: SpinSleeper,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            sleeper: SpinSleeper::default(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            self.sleeper.sleep(duration);
        }
    }
}
