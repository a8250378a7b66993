//! 协作式取消令牌
//!
//! 比赛结束或用户按下 Ctrl+C 时由外部置位；每个运动原语在每次循环开头检查一次，
//! 一旦置位必须在一个周期内退出并把电机功率置零。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// "是否继续运行" 信号
///
/// 克隆共享同一个标志位，可以跨线程置位（如 `ctrlc` 信号处理器）。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            debug!("Cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// 与 `!is_cancelled()` 等价，对应 "opModeIsActive"
    pub fn should_continue(&self) -> bool {
        !self.is_cancelled()
    }
}
