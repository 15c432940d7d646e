/// 内核事件编码常量
pub mod codes;

pub mod event;

pub use event::{
    AxisSource, ButtonState, EventType, KeyState, PostEvent, PostKind, RawEvent, ScrollAxes,
    Switch, SwitchState,
};
