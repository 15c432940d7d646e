//! 触摸槽位
//!
//! 多点设备每个硬件槽位对应一个 [`MtSlot`]，单点设备用 [`SingleTouch`] 表示。
//! 槽位本身只在 flush 时才会向 seat 申请或归还 seat slot

use tracing::{debug, error, trace};

use super::Output;
use crate::event_model::PostKind;
use crate::event_model::codes::{ABS_MT_POSITION_X, ABS_MT_POSITION_Y, MT_TOOL_FINGER, MT_TOOL_PALM};
use crate::geometry::{DeviceCoords, DeviceRect, hysteresis};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PalmState {
    #[default]
    None,
    /// 刚被识别为手掌，需要在 flush 时取消
    New,
    IsPalm,
    /// 工具类型变回手指，但在抬起之前仍然按手掌处理
    WasPalm,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlotState {
    #[default]
    None,
    Begin,
    Update,
    End,
}

#[derive(Debug, Clone, Default)]
pub struct MtSlot {
    pub index: usize,
    /// -1 表示没有占用 seat slot
    pub seat_slot: i32,
    pub point: DeviceCoords,
    pub hysteresis_center: DeviceCoords,
    pub palm_state: PalmState,
    pub state: SlotState,
    pub dirty: bool,
    /// 最近一次上报的 `ABS_MT_TOOL_TYPE`
    pub tool_type: i32,
}

impl MtSlot {
    fn new(index: usize, point: DeviceCoords) -> Self {
        Self {
            index,
            seat_slot: -1,
            point,
            hysteresis_center: point,
            palm_state: PalmState::None,
            state: SlotState::None,
            dirty: false,
            tool_type: MT_TOOL_FINGER,
        }
    }

    fn touch_down(&mut self, time: u64, out: &mut Output) -> bool {
        if !out.touch {
            return false;
        }

        if self.seat_slot != -1 {
            error!("kernel bug: driver sent multiple touch down for the same slot");
            return false;
        }

        let Some(seat_slot) = out.seat_slots.acquire() else {
            debug!(slot = self.index, "no free seat slot, dropping touch");
            return false;
        };

        self.seat_slot = seat_slot;
        self.hysteresis_center = self.point;
        let point = out.transform(self.point);
        out.post(
            time,
            PostKind::TouchDown {
                slot: self.index as i32,
                seat_slot,
                point,
            },
        );
        true
    }

    fn touch_motion(&mut self, time: u64, margin: Option<DeviceCoords>, out: &mut Output) -> bool {
        if !out.touch || self.seat_slot == -1 {
            return false;
        }

        if let Some(margin) = margin {
            let point = hysteresis(&self.point, &self.hysteresis_center, &margin);
            self.point = point;
            if point == self.hysteresis_center {
                return false;
            }
            self.hysteresis_center = point;
        }

        let point = out.transform(self.point);
        out.post(
            time,
            PostKind::TouchMotion {
                slot: self.index as i32,
                seat_slot: self.seat_slot,
                point,
            },
        );
        true
    }

    fn release(&mut self, time: u64, out: &mut Output, cancel: bool) -> bool {
        if !out.touch {
            return false;
        }

        let seat_slot = std::mem::replace(&mut self.seat_slot, -1);
        if seat_slot == -1 {
            return false;
        }
        out.seat_slots.release(seat_slot);

        let slot = self.index as i32;
        let kind = if cancel {
            PostKind::TouchCancel { slot, seat_slot }
        } else {
            PostKind::TouchUp { slot, seat_slot }
        };
        out.post(time, kind);
        true
    }
}

/// 固定容量的多点触摸槽位表
#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: Vec<MtSlot>,
    current: usize,
    has_palm: bool,
    /// fuzz 的一半，fuzz 为 0 时不做滤波
    hysteresis_margin: Option<DeviceCoords>,
}

impl SlotTable {
    pub fn new(capacity: usize, initial_positions: &[DeviceCoords]) -> Self {
        let slots = (0..capacity)
            .map(|i| MtSlot::new(i, initial_positions.get(i).copied().unwrap_or_default()))
            .collect();
        Self {
            slots,
            current: 0,
            has_palm: false,
            hysteresis_margin: None,
        }
    }

    pub fn with_palm(mut self, has_palm: bool) -> Self {
        self.has_palm = has_palm;
        self
    }

    /// 按 x/y 轴的 fuzz 开启死区滤波
    pub fn with_fuzz(mut self, fuzz_x: i32, fuzz_y: i32) -> Self {
        self.hysteresis_margin = (fuzz_x > 0 || fuzz_y > 0)
            .then(|| DeviceCoords::new(fuzz_x.max(0) / 2, fuzz_y.max(0) / 2));
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[MtSlot] {
        &self.slots
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// 越界的槽位号会被钳到最后一个槽位
    pub fn select(&mut self, index: i32) -> usize {
        let max = self.slots.len().saturating_sub(1);
        self.current = match usize::try_from(index) {
            Ok(index) if index <= max => index,
            _ => {
                error!(
                    "bug: exceeded slot count ({index} of max {})",
                    self.slots.len()
                );
                max
            }
        };
        self.current
    }

    pub fn begin_contact(&mut self, index: usize) {
        let has_palm = self.has_palm;
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        slot.state = SlotState::Begin;
        slot.palm_state = if has_palm && slot.tool_type == MT_TOOL_PALM {
            PalmState::New
        } else {
            PalmState::None
        };
        slot.dirty = true;
    }

    pub fn end_contact(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.state = SlotState::End;
            slot.dirty = true;
        }
    }

    /// 返回更新的是不是 x/y 轴
    pub fn update_position(&mut self, index: usize, axis: u16, value: i32) -> bool {
        let Some(slot) = self.slots.get_mut(index) else {
            return false;
        };
        match axis {
            ABS_MT_POSITION_X => slot.point.x = value,
            ABS_MT_POSITION_Y => slot.point.y = value,
            _ => return false,
        }
        slot.dirty = true;
        true
    }

    pub fn update_tool_type(&mut self, index: usize, tool_type: i32) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        slot.tool_type = tool_type;
        match tool_type {
            MT_TOOL_PALM => {
                if slot.palm_state == PalmState::None {
                    slot.palm_state = PalmState::New;
                }
            }
            _ => {
                if slot.palm_state == PalmState::IsPalm {
                    slot.palm_state = PalmState::WasPalm;
                }
            }
        }
        slot.dirty = true;
    }

    /// 处理所有脏槽位，发出过任意触摸事件时返回 true
    ///
    /// `ignore_rect` 内新落下的触点直接按手掌处理
    pub fn flush_all(&mut self, time: u64, ignore_rect: Option<&DeviceRect>, out: &mut Output) -> bool {
        let margin = self.hysteresis_margin;
        let mut sent = false;

        for slot in self.slots.iter_mut().filter(|s| s.dirty) {
            slot.dirty = false;

            match slot.palm_state {
                PalmState::New => {
                    if slot.state != SlotState::Begin {
                        sent |= slot.release(time, out, true);
                    }
                    slot.palm_state = PalmState::IsPalm;
                }
                PalmState::None => match slot.state {
                    SlotState::Begin => {
                        if ignore_rect.is_some_and(|rect| rect.contains(&slot.point)) {
                            trace!(slot = slot.index, "touch inside arbitration rect");
                            slot.palm_state = PalmState::IsPalm;
                        } else {
                            sent |= slot.touch_down(time, out);
                        }
                    }
                    SlotState::Update => sent |= slot.touch_motion(time, margin, out),
                    SlotState::End => sent |= slot.release(time, out, false),
                    SlotState::None => {}
                },
                PalmState::IsPalm | PalmState::WasPalm => {}
            }

            slot.state = match slot.state {
                SlotState::Begin => SlotState::Update,
                SlotState::End => SlotState::None,
                state => state,
            };
        }

        sent
    }

    /// 取消 `rect` 内（为 None 时取消全部）的活动触点
    pub fn cancel_touches(&mut self, time: u64, rect: Option<&DeviceRect>, out: &mut Output) -> bool {
        let mut sent = false;
        for slot in self.slots.iter_mut().filter(|s| s.seat_slot != -1) {
            if rect.is_none_or(|rect| rect.contains(&slot.point)) {
                sent |= slot.release(time, out, true);
            }
        }
        sent
    }
}

/// 单点触摸设备的状态，对外的 slot 固定为 -1
#[derive(Debug, Clone)]
pub struct SingleTouch {
    pub point: DeviceCoords,
    pub seat_slot: i32,
}

impl Default for SingleTouch {
    fn default() -> Self {
        Self {
            point: DeviceCoords::default(),
            seat_slot: -1,
        }
    }
}

impl SingleTouch {
    pub fn is_down(&self) -> bool {
        self.seat_slot != -1
    }

    pub fn update_position(&mut self, axis: u16, value: i32) -> bool {
        use crate::event_model::codes::{ABS_X, ABS_Y};
        match axis {
            ABS_X => self.point.x = value,
            ABS_Y => self.point.y = value,
            _ => return false,
        }
        true
    }

    pub fn down(&mut self, time: u64, out: &mut Output) -> bool {
        if !out.touch {
            return false;
        }

        if self.seat_slot != -1 {
            error!("kernel bug: driver sent multiple touch down for the same slot");
            return false;
        }

        let Some(seat_slot) = out.seat_slots.acquire() else {
            debug!("no free seat slot, dropping touch");
            return false;
        };
        self.seat_slot = seat_slot;

        let point = out.transform(self.point);
        out.post(
            time,
            PostKind::TouchDown {
                slot: -1,
                seat_slot,
                point,
            },
        );
        true
    }

    pub fn motion(&mut self, time: u64, out: &mut Output) -> bool {
        if self.seat_slot == -1 {
            return false;
        }

        let point = out.transform(self.point);
        out.post(
            time,
            PostKind::TouchMotion {
                slot: -1,
                seat_slot: self.seat_slot,
                point,
            },
        );
        true
    }

    pub fn up(&mut self, time: u64, out: &mut Output) -> bool {
        self.release(time, out, false)
    }

    pub fn cancel(&mut self, time: u64, out: &mut Output) -> bool {
        self.release(time, out, true)
    }

    fn release(&mut self, time: u64, out: &mut Output, cancel: bool) -> bool {
        if !out.touch {
            return false;
        }

        let seat_slot = std::mem::replace(&mut self.seat_slot, -1);
        if seat_slot == -1 {
            return false;
        }
        out.seat_slots.release(seat_slot);

        let kind = if cancel {
            PostKind::TouchCancel { slot: -1, seat_slot }
        } else {
            PostKind::TouchUp { slot: -1, seat_slot }
        };
        out.post(time, kind);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_model::{PostEvent, PostKind};
    use crate::seat::SeatSlots;

    fn output<'a>(seat: &'a mut SeatSlots, sink: &'a mut Vec<PostEvent>) -> Output<'a> {
        Output {
            seat_slots: seat,
            sink,
            calibration: None,
            touch: true,
        }
    }

    fn touch(table: &mut SlotTable, index: usize, x: i32, y: i32) {
        table.begin_contact(index);
        table.update_position(index, ABS_MT_POSITION_X, x);
        table.update_position(index, ABS_MT_POSITION_Y, y);
    }

    #[test]
    fn flush_advances_lifecycle_and_clears_dirty() {
        let mut seat = SeatSlots::default();
        let mut sink = Vec::new();
        let mut table = SlotTable::new(2, &[]);

        touch(&mut table, 0, 10, 20);
        assert!(table.flush_all(0, None, &mut output(&mut seat, &mut sink)));
        assert_eq!(table.slots()[0].state, SlotState::Update);
        assert!(table.slots().iter().all(|s| !s.dirty));

        table.end_contact(0);
        assert!(table.flush_all(1, None, &mut output(&mut seat, &mut sink)));
        assert_eq!(table.slots()[0].state, SlotState::None);
        assert_eq!(table.slots()[0].seat_slot, -1);
        assert!(!seat.is_taken(0));
    }

    #[test]
    fn select_out_of_range_clamps_to_last_slot() {
        let mut table = SlotTable::new(4, &[]);
        assert_eq!(table.select(9), 3);
        assert_eq!(table.select(-2), 3);
        assert_eq!(table.select(1), 1);
    }

    #[test]
    fn hysteresis_suppresses_small_motion() {
        let mut seat = SeatSlots::default();
        let mut sink = Vec::new();
        let mut table = SlotTable::new(1, &[]).with_fuzz(4, 4);

        touch(&mut table, 0, 100, 100);
        table.flush_all(0, None, &mut output(&mut seat, &mut sink));
        sink.clear();

        table.update_position(0, ABS_MT_POSITION_X, 101);
        table.update_position(0, ABS_MT_POSITION_Y, 101);
        assert!(!table.flush_all(1, None, &mut output(&mut seat, &mut sink)));
        assert!(sink.is_empty());

        table.update_position(0, ABS_MT_POSITION_X, 110);
        table.update_position(0, ABS_MT_POSITION_Y, 100);
        assert!(table.flush_all(2, None, &mut output(&mut seat, &mut sink)));
        assert_eq!(
            sink[0].kind,
            PostKind::TouchMotion {
                slot: 0,
                seat_slot: 0,
                point: DeviceCoords::new(108, 100)
            }
        );
        assert_eq!(table.slots()[0].hysteresis_center, DeviceCoords::new(108, 100));
    }

    #[test]
    fn palm_on_live_touch_cancels_once() {
        let mut seat = SeatSlots::default();
        let mut sink = Vec::new();
        let mut table = SlotTable::new(1, &[]).with_palm(true);

        touch(&mut table, 0, 5, 5);
        table.flush_all(0, None, &mut output(&mut seat, &mut sink));
        sink.clear();

        table.update_tool_type(0, MT_TOOL_PALM);
        table.flush_all(1, None, &mut output(&mut seat, &mut sink));
        assert_eq!(
            sink,
            vec![PostEvent::new(1, PostKind::TouchCancel { slot: 0, seat_slot: 0 })]
        );
        assert_eq!(table.slots()[0].palm_state, PalmState::IsPalm);

        // 手掌状态下的移动和抬起都不再上报
        sink.clear();
        table.update_position(0, ABS_MT_POSITION_X, 50);
        table.update_tool_type(0, MT_TOOL_FINGER);
        table.flush_all(2, None, &mut output(&mut seat, &mut sink));
        table.end_contact(0);
        table.flush_all(3, None, &mut output(&mut seat, &mut sink));
        assert!(sink.is_empty());
        assert_eq!(table.slots()[0].state, SlotState::None);
    }

    #[test]
    fn touch_inside_ignore_rect_never_goes_down() {
        let mut seat = SeatSlots::default();
        let mut sink = Vec::new();
        let mut table = SlotTable::new(1, &[]);
        let rect = DeviceRect { x: 0, y: 0, w: 100, h: 100 };

        touch(&mut table, 0, 10, 10);
        assert!(!table.flush_all(0, Some(&rect), &mut output(&mut seat, &mut sink)));
        assert!(sink.is_empty());
        assert_eq!(table.slots()[0].palm_state, PalmState::IsPalm);
    }

    #[test]
    fn seat_slot_exhaustion_drops_touch() {
        let mut seat = SeatSlots::default();
        while seat.acquire().is_some() {}
        let mut sink = Vec::new();
        let mut table = SlotTable::new(1, &[]);

        touch(&mut table, 0, 1, 1);
        assert!(!table.flush_all(0, None, &mut output(&mut seat, &mut sink)));
        assert_eq!(table.slots()[0].seat_slot, -1);
        table.end_contact(0);
        assert!(!table.flush_all(1, None, &mut output(&mut seat, &mut sink)));
        assert!(sink.is_empty());
    }
}
