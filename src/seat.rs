//! Seat 范围内共享的状态
//!
//! 触摸槽位在整个 seat 内唯一，设备之间的联动（合盖开关监听键盘、
//! 平板模式开关挂起键盘）也在这里完成

use tracing::{debug, error, info, warn};

use crate::caps::{DeviceCaps, DeviceConfig};
use crate::event_dispatcher::EventSink;
use crate::event_model::{PostEvent, PostKind, RawEvent, Switch, SwitchState};
use crate::fallback::FallbackDispatch;
use crate::fallback::arbitration::TouchArbitration;

/// seat 内的设备编号，移除后不会复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub usize);

/// seat slot 位图，最多 32 个同时存在的触点
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeatSlots {
    map: u32,
}

impl SeatSlots {
    pub const CAPACITY: i32 = u32::BITS as i32;

    /// 取最低的空闲位
    pub fn acquire(&mut self) -> Option<i32> {
        let free = !self.map;
        if free == 0 {
            return None;
        }
        let slot = free.trailing_zeros();
        self.map |= 1 << slot;
        Some(slot as i32)
    }

    pub fn release(&mut self, slot: i32) {
        if !(0..Self::CAPACITY).contains(&slot) {
            error!("bug: releasing invalid seat slot {slot}");
            return;
        }
        self.map &= !(1u32 << slot);
    }

    pub fn is_taken(&self, slot: i32) -> bool {
        (0..Self::CAPACITY).contains(&slot) && self.map & (1u32 << slot) != 0
    }
}

struct SeatDevice {
    id: DeviceId,
    dispatch: FallbackDispatch,
}

#[derive(Default)]
pub struct Seat {
    slots: SeatSlots,
    devices: Vec<SeatDevice>,
    next_id: usize,
}

impl Seat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seat_slots(&self) -> &SeatSlots {
        &self.slots
    }

    pub fn device(&self, id: DeviceId) -> Option<&FallbackDispatch> {
        self.devices
            .iter()
            .find(|dev| dev.id == id)
            .map(|dev| &dev.dispatch)
    }

    pub fn device_ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.iter().map(|dev| dev.id)
    }

    fn index_of(&self, id: DeviceId) -> Option<usize> {
        self.devices.iter().position(|dev| dev.id == id)
    }

    /// 加入一个设备，并和已有设备互相配对
    pub fn add_device(
        &mut self,
        caps: DeviceCaps,
        config: DeviceConfig,
        now: u64,
        sink: &mut dyn EventSink,
    ) -> DeviceId {
        let id = DeviceId(self.next_id);
        self.next_id += 1;

        let mut dispatch = FallbackDispatch::new(caps, config);
        info!(device = %dispatch.caps().name, id = id.0, "device added");
        dispatch.sync_initial_state(now, &mut self.slots, sink);

        let mut suspend_new = false;
        for other in &mut self.devices {
            // 已有的键盘和新的平板模式开关
            if other.dispatch.device_added(id, dispatch.caps())
                && dispatch.switch_state(Switch::TabletMode) == SwitchState::On
            {
                other.dispatch.suspend(now, &mut self.slots, sink);
            }
            // 新的键盘和已有的平板模式开关
            if dispatch.device_added(other.id, other.dispatch.caps())
                && other.dispatch.switch_state(Switch::TabletMode) == SwitchState::On
            {
                suspend_new = true;
            }
        }
        if suspend_new {
            dispatch.suspend(now, &mut self.slots, sink);
        }

        self.devices.push(SeatDevice { id, dispatch });
        id
    }

    pub fn remove_device(&mut self, id: DeviceId, now: u64, sink: &mut dyn EventSink) {
        let Some(index) = self.index_of(id) else {
            warn!(id = id.0, "removing unknown device");
            return;
        };

        let mut removed = self.devices.remove(index);
        removed.dispatch.suspend(now, &mut self.slots, sink);
        info!(device = %removed.dispatch.caps().name, id = id.0, "device removed");

        for other in &mut self.devices {
            if other.dispatch.device_removed(id) && other.dispatch.is_suspended() {
                other.dispatch.resume();
            }
        }
    }

    pub fn process(&mut self, id: DeviceId, event: &RawEvent, sink: &mut dyn EventSink) {
        let Some(index) = self.index_of(id) else {
            warn!(id = id.0, "event for unknown device");
            return;
        };

        let mut posted = Vec::new();
        self.devices[index]
            .dispatch
            .process(event, &mut self.slots, &mut posted);
        self.route(index, posted, sink);
    }

    /// 把一个设备发出的事件交给 sink，顺便通知监听它的设备
    fn route(&mut self, index: usize, posted: Vec<PostEvent>, sink: &mut dyn EventSink) {
        let source = self.devices[index].id;

        // 合盖状态的切换要排在按键之前
        if let Some(first_key) = posted
            .iter()
            .find(|event| matches!(event.kind, PostKind::Key { .. }))
        {
            let time = first_key.time;
            for other in &mut self.devices {
                other
                    .dispatch
                    .lid_keyboard_activity(source, time, &mut self.slots, sink);
            }
        }

        for event in posted {
            let tablet_mode = match event.kind {
                PostKind::SwitchToggle {
                    switch: Switch::TabletMode,
                    state,
                } => Some((state, event.time)),
                _ => None,
            };
            sink.post(event);

            if let Some((state, time)) = tablet_mode {
                self.apply_tablet_mode(source, state, time, sink);
            }
        }
    }

    fn apply_tablet_mode(
        &mut self,
        switch: DeviceId,
        state: SwitchState,
        time: u64,
        sink: &mut dyn EventSink,
    ) {
        for keyboard in &mut self.devices {
            if keyboard.dispatch.tablet_mode_switch() != Some(switch) {
                continue;
            }
            match state {
                SwitchState::On => {
                    debug!(device = %keyboard.dispatch.caps().name, "tablet-mode: suspending keyboard");
                    keyboard.dispatch.suspend(time, &mut self.slots, sink);
                }
                SwitchState::Off => {
                    debug!(device = %keyboard.dispatch.caps().name, "tablet-mode: resuming keyboard");
                    keyboard.dispatch.resume();
                }
            }
        }
    }

    pub fn suspend(&mut self, id: DeviceId, now: u64, sink: &mut dyn EventSink) {
        if let Some(index) = self.index_of(id) {
            self.devices[index]
                .dispatch
                .suspend(now, &mut self.slots, sink);
        }
    }

    pub fn resume(&mut self, id: DeviceId) {
        if let Some(index) = self.index_of(id) {
            self.devices[index].dispatch.resume();
        }
    }

    pub fn toggle_touch(
        &mut self,
        id: DeviceId,
        which: TouchArbitration,
        now: u64,
        sink: &mut dyn EventSink,
    ) {
        if let Some(index) = self.index_of(id) {
            self.devices[index]
                .dispatch
                .toggle_touch(which, now, &mut self.slots, sink);
        }
    }

    /// 所有设备中最早的计时器
    pub fn next_deadline(&self) -> Option<u64> {
        self.devices
            .iter()
            .filter_map(|dev| dev.dispatch.next_deadline())
            .min()
    }

    pub fn dispatch_timers(&mut self, now: u64, sink: &mut dyn EventSink) {
        for index in 0..self.devices.len() {
            let mut posted = Vec::new();
            self.devices[index]
                .dispatch
                .dispatch_timers(now, &mut self.slots, &mut posted);
            self.route(index, posted, sink);
        }
    }

    /// 取出需要写回设备节点的事件
    pub fn take_writebacks(&mut self) -> Vec<(DeviceId, Vec<RawEvent>)> {
        self.devices
            .iter_mut()
            .filter_map(|dev| {
                let events = dev.dispatch.take_writeback();
                (!events.is_empty()).then_some((dev.id, events))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_takes_lowest_free_slot() {
        let mut slots = SeatSlots::default();
        assert_eq!(slots.acquire(), Some(0));
        assert_eq!(slots.acquire(), Some(1));
        assert_eq!(slots.acquire(), Some(2));
        slots.release(1);
        assert!(!slots.is_taken(1));
        assert_eq!(slots.acquire(), Some(1));
    }

    #[test]
    fn pool_exhausts_at_capacity() {
        let mut slots = SeatSlots::default();
        for expected in 0..SeatSlots::CAPACITY {
            assert_eq!(slots.acquire(), Some(expected));
        }
        assert_eq!(slots.acquire(), None);
        slots.release(31);
        assert_eq!(slots.acquire(), Some(31));
    }

    #[test]
    fn invalid_release_is_ignored() {
        let mut slots = SeatSlots::default();
        slots.acquire();
        slots.release(-1);
        slots.release(40);
        assert!(slots.is_taken(0));
    }
}
