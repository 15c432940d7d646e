use num_enum::FromPrimitive;

use crate::geometry::{DeviceCoords, DeviceFloatCoords, DiscreteCoords, NormalizedCoords};

/// 内核 `input_event` 的事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u16)]
pub enum EventType {
    Sync = 0x00,
    Key = 0x01,
    Relative = 0x02,
    Absolute = 0x03,
    Misc = 0x04,
    Switch = 0x05,
    #[default]
    Unknown = 0xffff,
}

/// 一条原始输入事件，时间戳单位为微秒
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: EventType,
    pub code: u16,
    pub value: i32,
    pub time: u64,
}

impl RawEvent {
    pub fn new(kind: EventType, code: u16, value: i32, time: u64) -> Self {
        Self {
            kind,
            code,
            value,
            time,
        }
    }

    /// 从内核的 `(type, code, value)` 三元组构造
    pub fn from_raw(kind: u16, code: u16, value: i32, time: u64) -> Self {
        Self::new(EventType::from_primitive(kind), code, value, time)
    }

    pub fn sync(time: u64) -> Self {
        Self::new(EventType::Sync, super::codes::SYN_REPORT, 0, time)
    }

    pub fn is(&self, kind: EventType, code: u16) -> bool {
        self.kind == kind && self.code == code
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Released,
    Pressed,
}

impl From<bool> for KeyState {
    fn from(pressed: bool) -> Self {
        if pressed {
            Self::Pressed
        } else {
            Self::Released
        }
    }
}

pub type ButtonState = KeyState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSource {
    Wheel,
    Continuous,
}

bitflags::bitflags! {
    /// 滚动事件涉及的轴
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScrollAxes: u8 {
        const VERTICAL = 1 << 0;
        const HORIZONTAL = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Switch {
    Lid,
    TabletMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Off,
    On,
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

/// 处理之后交给 seat 的事件
#[derive(Debug, Clone, PartialEq)]
pub enum PostKind {
    PointerMotion {
        accel: NormalizedCoords,
        raw: DeviceFloatCoords,
    },
    PointerMotionAbsolute {
        point: DeviceCoords,
    },
    PointerButton {
        button: u16,
        state: ButtonState,
    },
    PointerAxis {
        source: AxisSource,
        axes: ScrollAxes,
        discrete: DiscreteCoords,
        continuous: NormalizedCoords,
    },
    /// 单点触摸设备的 `slot` 为 -1
    TouchDown {
        slot: i32,
        seat_slot: i32,
        point: DeviceCoords,
    },
    TouchMotion {
        slot: i32,
        seat_slot: i32,
        point: DeviceCoords,
    },
    TouchUp {
        slot: i32,
        seat_slot: i32,
    },
    TouchCancel {
        slot: i32,
        seat_slot: i32,
    },
    TouchFrame,
    Key {
        key: u16,
        state: KeyState,
    },
    SwitchToggle {
        switch: Switch,
        state: SwitchState,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostEvent {
    pub time: u64,
    pub kind: PostKind,
}

impl PostEvent {
    pub fn new(time: u64, kind: PostKind) -> Self {
        Self { time, kind }
    }
}
