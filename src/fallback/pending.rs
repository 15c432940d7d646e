use crate::event_model::codes::{REL_HWHEEL, REL_WHEEL, REL_X, REL_Y};
use crate::geometry::DeviceCoords;

bitflags::bitflags! {
    /// 自上一次 `SYN_REPORT` 以来有哪些东西变了
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PendingEvents: u8 {
        const RELATIVE_MOTION = 1 << 0;
        const ABSOLUTE_MOTION = 1 << 1;
        const WHEEL = 1 << 2;
        const KEY = 1 << 3;
        const ABSOLUTE_MT = 1 << 4;
        const ABSOLUTE_TOUCH_DOWN = 1 << 5;
        const ABSOLUTE_TOUCH_UP = 1 << 6;
    }
}

/// 两次同步之间累积的相对位移和滚轮
#[derive(Debug, Clone)]
pub struct Accumulator {
    mask: PendingEvents,
    pub rel: DeviceCoords,
    pub wheel: DeviceCoords,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            mask: PendingEvents::empty(),
            rel: DeviceCoords::default(),
            wheel: DeviceCoords::default(),
        }
    }
}

impl Accumulator {
    pub fn mark(&mut self, flag: PendingEvents) {
        self.mask |= flag;
    }

    pub fn mask(&self) -> PendingEvents {
        self.mask
    }

    /// 非 `REL_X`/`REL_Y` 的编码返回 false
    pub fn accumulate_relative(&mut self, code: u16, delta: i32) -> bool {
        match code {
            REL_X => self.rel.x = self.rel.x.saturating_add(delta),
            REL_Y => self.rel.y = self.rel.y.saturating_add(delta),
            _ => return false,
        }
        self.mark(PendingEvents::RELATIVE_MOTION);
        true
    }

    pub fn accumulate_wheel(&mut self, code: u16, delta: i32) -> bool {
        match code {
            REL_WHEEL => self.wheel.y = self.wheel.y.saturating_add(delta),
            REL_HWHEEL => self.wheel.x = self.wheel.x.saturating_add(delta),
            _ => return false,
        }
        self.mark(PendingEvents::WHEEL);
        true
    }

    /// 每个同步边界调用一次
    pub fn take_and_clear(&mut self) -> PendingEvents {
        std::mem::replace(&mut self.mask, PendingEvents::empty())
    }

    pub fn take_rel(&mut self) -> DeviceCoords {
        std::mem::take(&mut self.rel)
    }

    pub fn take_wheel(&mut self) -> DeviceCoords {
        std::mem::take(&mut self.wheel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_and_clear_resets_mask_only() {
        let mut acc = Accumulator::default();
        assert!(acc.accumulate_relative(REL_X, 3));
        assert!(acc.accumulate_relative(REL_X, 2));
        assert!(acc.accumulate_wheel(REL_WHEEL, -1));
        assert!(!acc.accumulate_relative(REL_WHEEL, 1));

        let mask = acc.take_and_clear();
        assert_eq!(mask, PendingEvents::RELATIVE_MOTION | PendingEvents::WHEEL);
        assert!(acc.mask().is_empty());
        assert_eq!(acc.take_rel(), DeviceCoords::new(5, 0));
        assert_eq!(acc.take_wheel(), DeviceCoords::new(0, -1));
        assert_eq!(acc.rel, DeviceCoords::default());
    }

    #[test]
    fn huge_deltas_saturate() {
        let mut acc = Accumulator::default();
        assert!(acc.accumulate_relative(REL_X, i32::MAX));
        assert!(acc.accumulate_relative(REL_X, 1));
        assert!(acc.accumulate_relative(REL_Y, i32::MIN));
        assert!(acc.accumulate_relative(REL_Y, -1));
        assert!(acc.accumulate_wheel(REL_WHEEL, i32::MAX));
        assert!(acc.accumulate_wheel(REL_WHEEL, i32::MAX));
        assert_eq!(acc.take_rel(), DeviceCoords::new(i32::MAX, i32::MIN));
        assert_eq!(acc.take_wheel(), DeviceCoords::new(0, i32::MAX));
    }
}
