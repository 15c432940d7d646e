//! 设备能力与配置
//!
//! `DeviceCaps` 由探测得到，核心逻辑只读不写；`DeviceConfig` 是用户可调的选项

use serde::{Deserialize, Serialize};

use crate::event_model::codes::{ABS_X, ABS_Y, KEY_CNT};
use crate::geometry::{Calibration, DeviceCoords, DeviceRect, PhysRect};

bitflags::bitflags! {
    /// 设备向 seat 提供的能力
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SeatCaps: u8 {
        const POINTER = 1 << 0;
        const KEYBOARD = 1 << 1;
        const TOUCH = 1 << 2;
        const SWITCH = 1 << 3;
    }
}

bitflags::bitflags! {
    /// 配对时用到的设备标签
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DeviceTags: u16 {
        const KEYBOARD = 1 << 0;
        const INTERNAL_KEYBOARD = 1 << 1;
        const EXTERNAL_KEYBOARD = 1 << 2;
        const TRACKPOINT = 1 << 3;
        const EXTERNAL_MOUSE = 1 << 4;
        const LID_SWITCH = 1 << 5;
        const TABLET_MODE_SWITCH = 1 << 6;
    }
}

bitflags::bitflags! {
    /// 硬件怪癖
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ModelQuirks: u8 {
        /// Lenovo ScrollPoint 的滚轮按连续滚动处理
        const LENOVO_SCROLLPOINT = 1 << 0;
        /// 笔离开时不发送 `BTN_TOOL_PEN 0`
        const PROXIMITY_OUT = 1 << 1;
        /// 平板模式下不挂起键盘
        const TABLET_MODE_NO_SUSPEND = 1 << 2;
    }
}

impl Default for ModelQuirks {
    fn default() -> Self {
        Self::empty()
    }
}

/// 绝对轴的范围信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsAxis {
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    /// 单位: units/mm
    pub resolution: i32,
}

impl AbsAxis {
    pub fn new(minimum: i32, maximum: i32) -> Self {
        Self {
            minimum,
            maximum,
            fuzz: 0,
            resolution: 1,
        }
    }

    pub fn contains(&self, value: i32) -> bool {
        (self.minimum..=self.maximum).contains(&value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCaps {
    pub name: String,
    pub seat_caps: SeatCaps,
    pub tags: DeviceTags,
    /// 多点触摸槽位数，0 表示不是多点设备
    pub mt_slots: usize,
    pub abs_x: Option<AbsAxis>,
    pub abs_y: Option<AbsAxis>,
    pub mt_x: Option<AbsAxis>,
    pub mt_y: Option<AbsAxis>,
    /// 是否上报 `ABS_MT_TOOL_TYPE`
    pub has_palm: bool,
    /// 设备支持的 `EV_KEY` 编码
    pub keys: Vec<u16>,
    pub dpi: u32,
    /// 滚轮每一格对应的角度
    pub wheel_click_angle: (f64, f64),
    #[serde(default)]
    pub quirks: ModelQuirks,
    /// 启动时开关的状态
    #[serde(default)]
    pub initial_lid_closed: bool,
    #[serde(default)]
    pub initial_tablet_mode: bool,
    /// 启动时每个多点槽位的位置
    #[serde(default)]
    pub initial_slot_positions: Vec<DeviceCoords>,
}

pub const DEFAULT_MOUSE_DPI: u32 = 1000;
pub const DEFAULT_WHEEL_CLICK_ANGLE: f64 = 15.0;

impl DeviceCaps {
    pub fn new(name: impl Into<String>, seat_caps: SeatCaps) -> Self {
        Self {
            name: name.into(),
            seat_caps,
            tags: DeviceTags::empty(),
            mt_slots: 0,
            abs_x: None,
            abs_y: None,
            mt_x: None,
            mt_y: None,
            has_palm: false,
            keys: Vec::new(),
            dpi: DEFAULT_MOUSE_DPI,
            wheel_click_angle: (DEFAULT_WHEEL_CLICK_ANGLE, DEFAULT_WHEEL_CLICK_ANGLE),
            quirks: ModelQuirks::empty(),
            initial_lid_closed: false,
            initial_tablet_mode: false,
            initial_slot_positions: Vec::new(),
        }
    }

    pub fn is_mt(&self) -> bool {
        self.mt_slots > 0
    }

    pub fn has(&self, caps: SeatCaps) -> bool {
        self.seat_caps.contains(caps)
    }

    pub fn has_key(&self, code: u16) -> bool {
        usize::from(code) < KEY_CNT && self.keys.contains(&code)
    }

    /// 根据轴编码取出范围信息
    pub fn abs_axis(&self, code: u16) -> Option<&AbsAxis> {
        use crate::event_model::codes::{ABS_MT_POSITION_X, ABS_MT_POSITION_Y};
        match code {
            ABS_X => self.abs_x.as_ref(),
            ABS_Y => self.abs_y.as_ref(),
            ABS_MT_POSITION_X => self.mt_x.as_ref(),
            ABS_MT_POSITION_Y => self.mt_y.as_ref(),
            _ => None,
        }
    }

    /// 把毫米矩形换算成设备坐标，优先使用多点轴
    pub fn phys_rect_to_units(&self, rect: &PhysRect) -> DeviceRect {
        let x = self.mt_x.or(self.abs_x).unwrap_or_default();
        let y = self.mt_y.or(self.abs_y).unwrap_or_default();
        let (rx, ry) = (f64::from(x.resolution.max(1)), f64::from(y.resolution.max(1)));
        DeviceRect {
            x: (rect.x * rx) as i32 + x.minimum,
            y: (rect.y * ry) as i32 + y.minimum,
            w: (rect.w * rx) as i32,
            h: (rect.h * ry) as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrollMethod {
    #[default]
    NoScroll,
    /// 按住指定按键时相对移动变成滚动
    OnButtonDown(u16),
}

/// 合盖开关是否可信
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LidReliability {
    #[default]
    Reliable,
    /// 有键盘输入时向设备回写 "已开盖"
    WriteOpen,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub left_handed: bool,
    /// 相对位移的顺时针旋转角度
    pub rotation: u32,
    pub scroll_method: ScrollMethod,
    pub lid_reliability: LidReliability,
    pub calibration: Option<Calibration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phys_rect_uses_resolution_and_minimum() {
        let mut caps = DeviceCaps::new("touchscreen", SeatCaps::TOUCH);
        caps.mt_x = Some(AbsAxis {
            minimum: 100,
            maximum: 4000,
            fuzz: 0,
            resolution: 10,
        });
        caps.mt_y = Some(AbsAxis {
            minimum: 0,
            maximum: 3000,
            fuzz: 0,
            resolution: 20,
        });
        let rect = caps.phys_rect_to_units(&PhysRect {
            x: 5.0,
            y: 2.0,
            w: 10.0,
            h: 10.0,
        });
        assert_eq!(
            rect,
            DeviceRect {
                x: 150,
                y: 40,
                w: 100,
                h: 200
            }
        );
    }

    #[test]
    fn caps_serialize_to_toml() {
        let mut caps = DeviceCaps::new("keyboard", SeatCaps::KEYBOARD);
        caps.tags = DeviceTags::KEYBOARD | DeviceTags::INTERNAL_KEYBOARD;
        let text = toml::to_string_pretty(&caps).unwrap();
        assert!(text.contains("name = \"keyboard\""));
    }
}
