//! 部分数位笔离开感应范围时不发送 `BTN_TOOL_PEN 0`
//!
//! 笔在范围内时每个 `SYN_REPORT` 都会重置一个 50ms 的计时器，超时后
//! 通过正常的处理流程合成一次离开事件

use tracing::debug;

use crate::event_model::codes::BTN_TOOL_PEN;
use crate::event_model::{EventType, RawEvent};

pub const FORCED_PROXOUT_TIMEOUT: u64 = 50_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProximityState {
    #[default]
    Idle,
    /// 笔在范围内，计时器在跑
    Armed,
    /// 正在注入合成的离开事件
    Forcing,
    /// 已经强制离开，等待真实事件
    Forced,
}

/// 事件经过怪癖过滤后的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProximityFilter {
    Process,
    Discard,
    /// 先补一个 `BTN_TOOL_PEN 1` 再处理
    ForceIn,
}

#[derive(Debug, Clone, Default)]
pub struct ProximityQuirk {
    enabled: bool,
    pub state: ProximityState,
    deadline: Option<u64>,
}

impl ProximityQuirk {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn filter(&mut self, event: &RawEvent) -> ProximityFilter {
        if !self.enabled || self.state == ProximityState::Forcing {
            return ProximityFilter::Process;
        }

        let is_pen = event.is(EventType::Key, BTN_TOOL_PEN);

        if self.state == ProximityState::Forced {
            if is_pen && event.value == 0 {
                debug!("discarding prox-out after forced prox-out");
                self.state = ProximityState::Idle;
                return ProximityFilter::Discard;
            }

            debug!("forcing prox-in after forced prox-out");
            self.arm(event.time);
            if is_pen {
                // 真实的进入事件，不需要再补
                return ProximityFilter::Process;
            }
            return ProximityFilter::ForceIn;
        }

        if is_pen {
            if event.value != 0 {
                self.arm(event.time);
            } else {
                self.state = ProximityState::Idle;
                self.deadline = None;
            }
        } else if event.kind == EventType::Sync && self.state == ProximityState::Armed {
            self.deadline = Some(event.time + FORCED_PROXOUT_TIMEOUT);
        }

        ProximityFilter::Process
    }

    fn arm(&mut self, time: u64) {
        self.state = ProximityState::Armed;
        self.deadline = Some(time + FORCED_PROXOUT_TIMEOUT);
    }

    /// 返回 true 表示需要合成离开事件，调用方随后必须调用 [`Self::finish_forcing`]
    pub fn dispatch_timer(&mut self, now: u64, any_button_down: bool) -> bool {
        if self.deadline.is_none_or(|deadline| deadline > now) {
            return false;
        }

        if self.state != ProximityState::Armed {
            self.deadline = None;
            return false;
        }

        if any_button_down {
            self.deadline = Some(now + FORCED_PROXOUT_TIMEOUT);
            return false;
        }

        debug!("pen still in proximity after timeout, forcing prox-out");
        self.deadline = None;
        self.state = ProximityState::Forcing;
        true
    }

    pub fn finish_forcing(&mut self) {
        self.state = ProximityState::Forced;
    }

    pub fn reset(&mut self) {
        self.state = ProximityState::Idle;
        self.deadline = None;
    }
}
