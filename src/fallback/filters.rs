//! 指针加速和按钮去抖的接口
//!
//! 两者都不属于这里的核心逻辑，默认实现只做直通

use crate::caps::DEFAULT_MOUSE_DPI;
use crate::geometry::{DeviceFloatCoords, NormalizedCoords};

/// 指针加速
pub trait PointerAccel {
    fn filter(&mut self, raw: &DeviceFloatCoords, dpi: u32, time: u64) -> NormalizedCoords;
}

/// 不加速，只按 dpi 归一化后乘以固定系数
#[derive(Debug, Clone, Copy)]
pub struct FlatAccel {
    pub factor: f64,
}

impl Default for FlatAccel {
    fn default() -> Self {
        Self { factor: 1.0 }
    }
}

impl PointerAccel for FlatAccel {
    fn filter(&mut self, raw: &DeviceFloatCoords, dpi: u32, _time: u64) -> NormalizedCoords {
        let scale = f64::from(DEFAULT_MOUSE_DPI) / f64::from(dpi.max(1)) * self.factor;
        NormalizedCoords {
            x: raw.x * scale,
            y: raw.y * scale,
        }
    }
}

/// 按钮去抖，输入和输出都是 `(code, pressed)`
pub trait ButtonDebounce {
    fn handle_state(&mut self, time: u64, changed: Vec<(u16, bool)>) -> Vec<(u16, bool)>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoDebounce;

impl ButtonDebounce for NoDebounce {
    fn handle_state(&mut self, _time: u64, changed: Vec<(u16, bool)>) -> Vec<(u16, bool)> {
        changed
    }
}
