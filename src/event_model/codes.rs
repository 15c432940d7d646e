//! 内核 `input-event-codes.h` 中用到的事件编码
//!
//! 这里只收录 fallback 处理逻辑真正需要的那部分

pub const SYN_REPORT: u16 = 0x00;
pub const SYN_DROPPED: u16 = 0x03;

pub const KEY_ESC: u16 = 0x01;
pub const KEY_A: u16 = 0x1e;
pub const KEY_MICMUTE: u16 = 0xf8;
pub const KEY_OK: u16 = 0x160;
pub const KEY_LIGHTS_TOGGLE: u16 = 0x21e;
pub const KEY_ALS_TOGGLE: u16 = 0x230;
pub const KEY_MAX: u16 = 0x2ff;
pub const KEY_CNT: usize = KEY_MAX as usize + 1;

pub const BTN_MISC: u16 = 0x100;
pub const BTN_LEFT: u16 = 0x110;
pub const BTN_RIGHT: u16 = 0x111;
pub const BTN_MIDDLE: u16 = 0x112;
pub const BTN_JOYSTICK: u16 = 0x120;
pub const BTN_TOOL_PEN: u16 = 0x140;
pub const BTN_TOOL_RUBBER: u16 = 0x141;
pub const BTN_TOOL_BRUSH: u16 = 0x142;
pub const BTN_TOOL_PENCIL: u16 = 0x143;
pub const BTN_TOOL_AIRBRUSH: u16 = 0x144;
pub const BTN_TOOL_FINGER: u16 = 0x145;
pub const BTN_TOOL_MOUSE: u16 = 0x146;
pub const BTN_TOOL_LENS: u16 = 0x147;
pub const BTN_TOUCH: u16 = 0x14a;
pub const BTN_STYLUS: u16 = 0x14b;
pub const BTN_GEAR_UP: u16 = 0x151;
pub const BTN_DPAD_UP: u16 = 0x220;
pub const BTN_DPAD_RIGHT: u16 = 0x223;
pub const BTN_TRIGGER_HAPPY: u16 = 0x2c0;
pub const BTN_TRIGGER_HAPPY40: u16 = 0x2e7;

pub const REL_X: u16 = 0x00;
pub const REL_Y: u16 = 0x01;
pub const REL_HWHEEL: u16 = 0x06;
pub const REL_WHEEL: u16 = 0x08;

pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;
pub const ABS_MT_SLOT: u16 = 0x2f;
pub const ABS_MT_POSITION_X: u16 = 0x35;
pub const ABS_MT_POSITION_Y: u16 = 0x36;
pub const ABS_MT_TOOL_TYPE: u16 = 0x37;
pub const ABS_MT_TRACKING_ID: u16 = 0x39;

pub const MT_TOOL_FINGER: i32 = 0x00;
pub const MT_TOOL_PEN: i32 = 0x01;
pub const MT_TOOL_PALM: i32 = 0x02;

pub const SW_LID: u16 = 0x00;
pub const SW_TABLET_MODE: u16 = 0x01;

/// `BTN_TOOL_*` 只表示工具进出感应范围，不会作为按键上报
pub fn is_tool_code(code: u16) -> bool {
    (BTN_TOOL_PEN..=BTN_TOOL_LENS).contains(&code)
}
