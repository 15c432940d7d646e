use tracing::{debug, error};

use crate::event_model::ScrollAxes;
use crate::geometry::NormalizedCoords;

/// 按下滚动键后多久开始把移动当作滚动
pub const BUTTON_SCROLL_TIMEOUT: u64 = 200_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ButtonScrollState {
    #[default]
    Idle,
    /// 按下但还没超时，期间的移动被吞掉
    ButtonDown,
    Ready,
    Scrolling,
}

/// 滚动键松开之后需要补发的事件
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ButtonScrollRelease {
    Nothing,
    /// 超时前松开，按一次普通点击处理
    Click { pressed_at: u64 },
    /// 结束滚动，需要给滚过的轴发一个 0 值
    Stop(ScrollAxes),
}

/// 相对移动在滚动键状态下的去向
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionRoute {
    Pointer,
    Discard,
    Scroll,
}

#[derive(Debug, Clone, Default)]
pub struct ButtonScroll {
    pub state: ButtonScrollState,
    deadline: Option<u64>,
    button_down_time: u64,
    active_axes: Option<ScrollAxes>,
}

impl ButtonScroll {
    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn press(&mut self, time: u64) {
        if self.state != ButtonScrollState::Idle {
            error!("bug: scroll button pressed twice");
            return;
        }
        self.state = ButtonScrollState::ButtonDown;
        self.button_down_time = time;
        self.deadline = Some(time + BUTTON_SCROLL_TIMEOUT);
        debug!("btnscroll: down");
    }

    pub fn release(&mut self) -> ButtonScrollRelease {
        self.deadline = None;
        let action = match self.state {
            ButtonScrollState::Idle => {
                error!("bug: scroll button released while idle");
                ButtonScrollRelease::Nothing
            }
            ButtonScrollState::ButtonDown => ButtonScrollRelease::Click {
                pressed_at: self.button_down_time,
            },
            ButtonScrollState::Ready => ButtonScrollRelease::Nothing,
            ButtonScrollState::Scrolling => {
                ButtonScrollRelease::Stop(self.active_axes.take().unwrap_or(ScrollAxes::empty()))
            }
        };
        self.state = ButtonScrollState::Idle;
        self.active_axes = None;
        debug!("btnscroll: up");
        action
    }

    pub fn route_motion(&mut self) -> MotionRoute {
        match self.state {
            ButtonScrollState::Idle => MotionRoute::Pointer,
            ButtonScrollState::ButtonDown => {
                debug!("btnscroll: discarding");
                MotionRoute::Discard
            }
            ButtonScrollState::Ready | ButtonScrollState::Scrolling => {
                self.state = ButtonScrollState::Scrolling;
                MotionRoute::Scroll
            }
        }
    }

    /// 记录实际滚动过的轴
    pub fn note_scroll(&mut self, axes: ScrollAxes) {
        *self.active_axes.get_or_insert(ScrollAxes::empty()) |= axes;
    }

    pub fn dispatch_timer(&mut self, now: u64) {
        if self.deadline.is_none_or(|deadline| deadline > now) {
            return;
        }
        self.deadline = None;
        if self.state == ButtonScrollState::ButtonDown {
            self.state = ButtonScrollState::Ready;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 连续滚动涉及的轴
pub fn scroll_axes(delta: &NormalizedCoords) -> ScrollAxes {
    let mut axes = ScrollAxes::empty();
    if delta.y != 0.0 {
        axes |= ScrollAxes::VERTICAL;
    }
    if delta.x != 0.0 {
        axes |= ScrollAxes::HORIZONTAL;
    }
    axes
}
