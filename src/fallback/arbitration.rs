use tracing::debug;

use crate::geometry::{DeviceRect, PhysRect};

/// 笔接近时恢复触摸前的等待时间
pub const ARBITRATION_REARM: u64 = 90_000;

/// 触摸仲裁状态，矩形为设备坐标
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArbitrationState {
    #[default]
    NotActive,
    IgnoreRect(DeviceRect),
    IgnoreAll,
}

/// 由外部（一般是同一 seat 上的数位笔）发起的仲裁请求，矩形为毫米
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TouchArbitration {
    NotActive,
    IgnoreRect(PhysRect),
    IgnoreAll,
}

#[derive(Debug, Clone, Default)]
pub struct Arbitration {
    pub state: ArbitrationState,
    /// 为 true 时设备的所有输入都被丢弃
    in_arbitration: bool,
    deadline: Option<u64>,
}

impl Arbitration {
    pub fn in_arbitration(&self) -> bool {
        self.in_arbitration
    }

    pub fn block(&mut self) {
        self.deadline = None;
        self.in_arbitration = true;
    }

    pub fn ignore_rect(&self) -> Option<&DeviceRect> {
        match &self.state {
            ArbitrationState::IgnoreRect(rect) => Some(rect),
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    /// 重复设置会覆盖之前的时间
    pub fn arm(&mut self, deadline: u64) {
        self.deadline = Some(deadline);
    }

    pub fn cancel_timer(&mut self) {
        self.deadline = None;
    }

    pub fn dispatch_timer(&mut self, now: u64) {
        if self.deadline.is_none_or(|deadline| deadline > now) {
            return;
        }
        self.deadline = None;
        if self.in_arbitration {
            debug!("arbitration timeout, touch input enabled again");
            self.in_arbitration = false;
        }
    }
}
