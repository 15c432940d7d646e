//! # Fallback 设备处理
//!
//! 不是触摸板也不是数位笔的设备都走这里：鼠标、键盘、触摸屏、各种开关。
//!
//! 原始事件在两次 `SYN_REPORT` 之间只做分类和累积，同步时一次性 flush 成
//! 上层事件。唯一的例外是键盘按键，它在处理时立即发出。

pub mod arbitration;
pub mod filters;
pub mod keys;
pub mod lid;
pub mod pending;
pub mod proximity;
pub mod scroll;
pub mod slots;

use tracing::{debug, debug_span, error, trace};

use crate::caps::{
    DeviceCaps, DeviceConfig, DeviceTags, LidReliability, ModelQuirks, ScrollMethod, SeatCaps,
};
use crate::event_dispatcher::EventSink;
use crate::event_model::codes::{
    ABS_MT_POSITION_X, ABS_MT_POSITION_Y, ABS_MT_SLOT, ABS_MT_TOOL_TYPE, ABS_MT_TRACKING_ID,
    BTN_LEFT, BTN_RIGHT, BTN_TOOL_PEN, BTN_TOUCH, KEY_MAX, REL_X, REL_Y, SW_LID, SW_TABLET_MODE,
    SYN_DROPPED, SYN_REPORT,
};
use crate::event_model::{
    AxisSource, EventType, KeyState, PostEvent, PostKind, RawEvent, ScrollAxes, Switch,
    SwitchState,
};
use crate::geometry::{
    Calibration, DeviceCoords, DeviceFloatCoords, DeviceRect, DiscreteCoords, NormalizedCoords,
    Rotation,
};
use crate::ratelimit::RateLimit;
use crate::seat::{DeviceId, SeatSlots};
use crate::warn_ratelimit;

use arbitration::{ARBITRATION_REARM, Arbitration, ArbitrationState, TouchArbitration};
use filters::{ButtonDebounce, FlatAccel, NoDebounce, PointerAccel};
use keys::{KeyTracker, KeyType, key_type};
use lid::{Lid, TabletMode};
use pending::{Accumulator, PendingEvents};
use proximity::{ProximityFilter, ProximityQuirk};
use scroll::{ButtonScroll, ButtonScrollRelease, MotionRoute, scroll_axes};
use slots::{SingleTouch, SlotTable};

/// 一次处理过程中事件的去向，以及 seat 范围内共享的触摸槽位
pub struct Output<'a> {
    pub seat_slots: &'a mut SeatSlots,
    pub sink: &'a mut dyn EventSink,
    pub calibration: Option<Calibration>,
    /// 设备是否有触摸能力，没有时所有触摸事件都不发
    pub touch: bool,
}

impl Output<'_> {
    pub fn post(&mut self, time: u64, kind: PostKind) {
        self.sink.post(PostEvent::new(time, kind));
    }

    pub fn transform(&self, point: DeviceCoords) -> DeviceCoords {
        self.calibration.map_or(point, |calibration| calibration.apply(&point))
    }
}

#[derive(Debug, Clone)]
enum Touch {
    Single(SingleTouch),
    Multi(SlotTable),
}

pub struct FallbackDispatch {
    caps: DeviceCaps,
    config: DeviceConfig,
    rotation: Rotation,
    pending: Accumulator,
    touch: Touch,
    keys: KeyTracker,
    arbitration: Arbitration,
    lid: Lid,
    tablet_mode: TabletMode,
    scroll: ButtonScroll,
    proximity: ProximityQuirk,
    accel: Option<Box<dyn PointerAccel>>,
    debounce: Box<dyn ButtonDebounce>,
    suspended: bool,
    /// 需要写回设备节点的事件
    writeback: Vec<RawEvent>,
    nonpointer_rel_limit: RateLimit,
    abs_range_limit: RateLimit,
    syn_drop_limit: RateLimit,
    unknown_code_limit: RateLimit,
}

impl FallbackDispatch {
    pub fn new(caps: DeviceCaps, config: DeviceConfig) -> Self {
        let touch = if caps.is_mt() {
            let fuzz = |axis: Option<crate::caps::AbsAxis>| axis.map_or(0, |a| a.fuzz);
            Touch::Multi(
                SlotTable::new(caps.mt_slots, &caps.initial_slot_positions)
                    .with_palm(caps.has_palm)
                    .with_fuzz(fuzz(caps.mt_x), fuzz(caps.mt_y)),
            )
        } else {
            Touch::Single(SingleTouch::default())
        };

        let lid_closed = caps.tags.contains(DeviceTags::LID_SWITCH) && caps.initial_lid_closed;
        let tablet_mode = TabletMode {
            state: caps.tags.contains(DeviceTags::TABLET_MODE_SWITCH) && caps.initial_tablet_mode,
            other_device: None,
        };
        let accel: Option<Box<dyn PointerAccel>> = caps
            .has(SeatCaps::POINTER)
            .then(|| Box::new(FlatAccel::default()) as Box<dyn PointerAccel>);
        let proximity = ProximityQuirk::new(
            caps.quirks.contains(ModelQuirks::PROXIMITY_OUT) && caps.has_key(BTN_TOOL_PEN),
        );

        Self {
            rotation: Rotation::new(config.rotation),
            pending: Accumulator::default(),
            touch,
            keys: KeyTracker::default(),
            arbitration: Arbitration::default(),
            lid: Lid::new(lid_closed, config.lid_reliability),
            tablet_mode,
            scroll: ButtonScroll::default(),
            proximity,
            accel,
            debounce: Box::new(NoDebounce),
            suspended: false,
            writeback: Vec::new(),
            nonpointer_rel_limit: RateLimit::default(),
            abs_range_limit: RateLimit::default(),
            syn_drop_limit: RateLimit::default(),
            unknown_code_limit: RateLimit::default(),
            caps,
            config,
        }
    }

    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn arbitration_state(&self) -> ArbitrationState {
        self.arbitration.state
    }

    pub fn slot_table(&self) -> Option<&SlotTable> {
        match &self.touch {
            Touch::Multi(mt) => Some(mt),
            Touch::Single(_) => None,
        }
    }

    pub fn single_touch(&self) -> Option<&SingleTouch> {
        match &self.touch {
            Touch::Single(st) => Some(st),
            Touch::Multi(_) => None,
        }
    }

    pub fn key_down_count(&self, code: u16) -> u32 {
        self.keys.counts.count(code)
    }

    pub fn set_pointer_accel(&mut self, accel: Box<dyn PointerAccel>) {
        self.accel = Some(accel);
    }

    pub fn set_debounce(&mut self, debounce: Box<dyn ButtonDebounce>) {
        self.debounce = debounce;
    }

    fn output<'a>(&self, seat_slots: &'a mut SeatSlots, sink: &'a mut dyn EventSink) -> Output<'a> {
        Output {
            seat_slots,
            sink,
            calibration: self.config.calibration,
            touch: self.caps.has(SeatCaps::TOUCH),
        }
    }

    /// 处理一条原始事件
    pub fn process(&mut self, event: &RawEvent, seat_slots: &mut SeatSlots, sink: &mut dyn EventSink) {
        if self.arbitration.in_arbitration() || self.suspended {
            return;
        }

        let span = debug_span!("fallback", device = %self.caps.name);
        let _guard = span.enter();

        let mut out = self.output(seat_slots, sink);
        match self.proximity.filter(event) {
            ProximityFilter::Discard => return,
            ProximityFilter::ForceIn => {
                let prox_in = RawEvent::new(EventType::Key, BTN_TOOL_PEN, 1, event.time);
                self.process_event(&prox_in, &mut out);
            }
            ProximityFilter::Process => {}
        }
        self.process_event(event, &mut out);
    }

    fn process_event(&mut self, event: &RawEvent, out: &mut Output) {
        match event.kind {
            EventType::Key => self.process_key(event, out),
            EventType::Relative => self.process_relative(event),
            EventType::Absolute => self.process_absolute(event),
            EventType::Switch => self.process_switch(event, out),
            EventType::Sync => match event.code {
                SYN_REPORT => self.handle_state(event.time, out),
                SYN_DROPPED => {
                    warn_ratelimit!(
                        self.syn_drop_limit,
                        event.time,
                        "SYN_DROPPED received, events were lost"
                    )
                }
                _ => {}
            },
            EventType::Misc => {}
            EventType::Unknown => trace!(code = event.code, "unhandled event type"),
        }
    }

    fn process_key(&mut self, event: &RawEvent, out: &mut Output) {
        // 自动重复
        if event.value == 2 {
            return;
        }

        if event.code > KEY_MAX {
            warn_ratelimit!(
                self.unknown_code_limit,
                event.time,
                "key code {:#x} is out of range, dropped",
                event.code
            );
            return;
        }

        if event.code == BTN_TOUCH {
            if matches!(self.touch, Touch::Single(_)) {
                self.pending.mark(if event.value != 0 {
                    PendingEvents::ABSOLUTE_TOUCH_DOWN
                } else {
                    PendingEvents::ABSOLUTE_TOUCH_UP
                });
            }
            return;
        }

        let pressed = event.value != 0;
        let ty = key_type(event.code);
        if ty != KeyType::None {
            if pressed == self.keys.hw.is_down(event.code) {
                return;
            }
            self.pending.mark(PendingEvents::KEY);
        }
        self.keys.hw.set(event.code, pressed);

        if ty == KeyType::Key {
            self.keyboard_notify_key(event.time, event.code, pressed, out);
        }
    }

    fn keyboard_notify_key(&mut self, time: u64, key: u16, pressed: bool, out: &mut Output) {
        let count = self.keys.counts.note_key(key, pressed);
        if (pressed && count == 1) || (!pressed && count == 0) {
            out.post(
                time,
                PostKind::Key {
                    key,
                    state: pressed.into(),
                },
            );
        }
    }

    fn process_relative(&mut self, event: &RawEvent) {
        if matches!(event.code, REL_X | REL_Y) && !self.caps.has(SeatCaps::POINTER) {
            warn_ratelimit!(
                self.nonpointer_rel_limit,
                event.time,
                "REL_X/Y from a device that is not a pointer"
            );
            return;
        }

        if !self.pending.accumulate_relative(event.code, event.value) {
            self.pending.accumulate_wheel(event.code, event.value);
        }
    }

    fn process_absolute(&mut self, event: &RawEvent) {
        if let Some(axis) = self.caps.abs_axis(event.code) {
            if !axis.contains(event.value) {
                warn_ratelimit!(
                    self.abs_range_limit,
                    event.time,
                    "axis {:#x} value {} is outside expected range [{}, {}]",
                    event.code,
                    event.value,
                    axis.minimum,
                    axis.maximum
                );
            }
        }

        match &mut self.touch {
            Touch::Multi(mt) => {
                match event.code {
                    ABS_MT_SLOT => {
                        mt.select(event.value);
                        return;
                    }
                    ABS_MT_TRACKING_ID => {
                        let index = mt.current();
                        if event.value >= 0 {
                            mt.begin_contact(index);
                        } else {
                            mt.end_contact(index);
                        }
                    }
                    ABS_MT_POSITION_X | ABS_MT_POSITION_Y => {
                        let index = mt.current();
                        mt.update_position(index, event.code, event.value);
                    }
                    ABS_MT_TOOL_TYPE => {
                        let index = mt.current();
                        mt.update_tool_type(index, event.value);
                    }
                    _ => return,
                }
                self.pending.mark(PendingEvents::ABSOLUTE_MT);
            }
            Touch::Single(st) => {
                if st.update_position(event.code, event.value) {
                    self.pending.mark(PendingEvents::ABSOLUTE_MOTION);
                }
            }
        }
    }

    fn process_switch(&mut self, event: &RawEvent, out: &mut Output) {
        match event.code {
            SW_LID => {
                let is_closed = event.value != 0;
                self.lid.set_listening(is_closed);
                if self.lid.is_closed == is_closed {
                    return;
                }
                self.lid.is_closed = is_closed;
                self.lid_notify_toggle(event.time, out);
            }
            SW_TABLET_MODE => {
                let on = event.value != 0;
                if self.tablet_mode.state == on {
                    return;
                }
                self.tablet_mode.state = on;
                out.post(
                    event.time,
                    PostKind::SwitchToggle {
                        switch: Switch::TabletMode,
                        state: on.into(),
                    },
                );
            }
            _ => {}
        }
    }

    fn lid_notify_toggle(&mut self, time: u64, out: &mut Output) {
        if let Some(closed) = self.lid.take_toggle() {
            out.post(
                time,
                PostKind::SwitchToggle {
                    switch: Switch::Lid,
                    state: closed.into(),
                },
            );
        }
    }

    /// `SYN_REPORT` 时的 flush
    fn handle_state(&mut self, time: u64, out: &mut Output) {
        let mask = self.pending.mask();

        if mask.contains(PendingEvents::RELATIVE_MOTION) {
            self.flush_relative_motion(time, out);
        }

        let mut need_frame = false;
        match &mut self.touch {
            Touch::Single(st) => {
                if mask.contains(PendingEvents::ABSOLUTE_TOUCH_DOWN) {
                    need_frame |= st.down(time, out);
                } else if mask.contains(PendingEvents::ABSOLUTE_MOTION) {
                    if out.touch {
                        need_frame |= st.motion(time, out);
                    } else if self.caps.has(SeatCaps::POINTER) {
                        let point = out.transform(st.point);
                        out.post(time, PostKind::PointerMotionAbsolute { point });
                    }
                }
                if mask.contains(PendingEvents::ABSOLUTE_TOUCH_UP) {
                    need_frame |= st.up(time, out);
                }
            }
            Touch::Multi(mt) => {
                if mask.contains(PendingEvents::ABSOLUTE_MT) {
                    need_frame |= mt.flush_all(time, self.arbitration.ignore_rect(), out);
                }
            }
        }
        if need_frame {
            out.post(time, PostKind::TouchFrame);
        }

        self.flush_wheels(time, out);

        if mask.contains(PendingEvents::KEY) {
            let changed = self.keys.changed_buttons();
            if !changed.is_empty() {
                for (code, pressed) in self.debounce.handle_state(time, changed) {
                    self.pointer_notify_physical_button(time, code, pressed, out);
                }
            }
            self.keys.update_last_state();
        }

        self.pending.take_and_clear();
    }

    fn flush_relative_motion(&mut self, time: u64, out: &mut Output) {
        let rel = self.pending.take_rel();
        if !self.caps.has(SeatCaps::POINTER) {
            return;
        }

        let (x, y) = self.rotation.apply(rel.x, rel.y);
        let raw = DeviceFloatCoords {
            x: f64::from(x),
            y: f64::from(y),
        };
        let unaccel = normalize(&raw, self.caps.dpi);

        match self.scroll.route_motion() {
            MotionRoute::Discard => return,
            MotionRoute::Scroll => {
                let axes = scroll_axes(&unaccel);
                if !axes.is_empty() {
                    self.scroll.note_scroll(axes);
                    out.post(time, continuous_scroll(axes, unaccel));
                }
                return;
            }
            MotionRoute::Pointer => {}
        }

        let accel = match self.accel.as_mut() {
            Some(accel) => accel.filter(&raw, self.caps.dpi, time),
            None => {
                error!("bug: accel filter missing");
                unaccel
            }
        };

        if accel.is_zero() && unaccel.is_zero() {
            return;
        }
        out.post(time, PostKind::PointerMotion { accel, raw });
    }

    fn flush_wheels(&mut self, time: u64, out: &mut Output) {
        let wheel = self.pending.take_wheel();
        if !self.caps.has(SeatCaps::POINTER) || wheel == DeviceCoords::default() {
            return;
        }

        if self.caps.quirks.contains(ModelQuirks::LENOVO_SCROLLPOINT) {
            let raw = DeviceFloatCoords {
                x: f64::from(wheel.x),
                y: -f64::from(wheel.y),
            };
            let delta = normalize(&raw, self.caps.dpi);
            let axes = scroll_axes(&delta);
            if !axes.is_empty() {
                out.post(time, continuous_scroll(axes, delta));
            }
            return;
        }

        let (angle_x, angle_y) = self.caps.wheel_click_angle;
        if wheel.y != 0 {
            let clicks = -f64::from(wheel.y);
            out.post(
                time,
                PostKind::PointerAxis {
                    source: AxisSource::Wheel,
                    axes: ScrollAxes::VERTICAL,
                    discrete: DiscreteCoords { x: 0.0, y: clicks },
                    continuous: NormalizedCoords {
                        x: 0.0,
                        y: clicks * angle_y,
                    },
                },
            );
        }
        if wheel.x != 0 {
            let clicks = f64::from(wheel.x);
            out.post(
                time,
                PostKind::PointerAxis {
                    source: AxisSource::Wheel,
                    axes: ScrollAxes::HORIZONTAL,
                    discrete: DiscreteCoords { x: clicks, y: 0.0 },
                    continuous: NormalizedCoords {
                        x: clicks * angle_x,
                        y: 0.0,
                    },
                },
            );
        }
    }

    fn to_left_handed(&self, button: u16) -> u16 {
        if !self.config.left_handed {
            return button;
        }
        match button {
            BTN_LEFT => BTN_RIGHT,
            BTN_RIGHT => BTN_LEFT,
            other => other,
        }
    }

    /// 去抖之后的按钮，滚动键在这里被截走
    fn pointer_notify_physical_button(&mut self, time: u64, code: u16, pressed: bool, out: &mut Output) {
        let button = self.to_left_handed(code);

        if let ScrollMethod::OnButtonDown(scroll_button) = self.config.scroll_method {
            if button == scroll_button {
                self.button_scroll_button(time, button, pressed, out);
                return;
            }
        }

        self.pointer_notify_button(time, button, pressed, out);
    }

    fn button_scroll_button(&mut self, time: u64, button: u16, pressed: bool, out: &mut Output) {
        if pressed {
            self.scroll.press(time);
            return;
        }

        match self.scroll.release() {
            ButtonScrollRelease::Nothing => {}
            ButtonScrollRelease::Click { pressed_at } => {
                self.pointer_notify_button(pressed_at, button, true, out);
                self.pointer_notify_button(time, button, false, out);
            }
            ButtonScrollRelease::Stop(axes) => {
                if !axes.is_empty() {
                    out.post(time, continuous_scroll(axes, NormalizedCoords::default()));
                }
            }
        }
    }

    fn pointer_notify_button(&mut self, time: u64, button: u16, pressed: bool, out: &mut Output) {
        let count = self.keys.counts.note_key(button, pressed);
        if (pressed && count == 1) || (!pressed && count == 0) {
            out.post(
                time,
                PostKind::PointerButton {
                    button,
                    state: pressed.into(),
                },
            );
        }
    }

    fn release_pressed_keys(&mut self, time: u64, out: &mut Output) {
        self.keys.counts.release_all(|code, ty| match ty {
            KeyType::Key => out.post(
                time,
                PostKind::Key {
                    key: code,
                    state: KeyState::Released,
                },
            ),
            KeyType::Button => out.post(
                time,
                PostKind::PointerButton {
                    button: code,
                    state: KeyState::Released,
                },
            ),
            KeyType::None => {}
        });
    }

    /// 取消 `rect` 内（为 None 时取消全部）的触点，发出过事件时补一个 frame
    fn cancel_touches(&mut self, time: u64, rect: Option<&DeviceRect>, out: &mut Output) -> bool {
        let sent = match &mut self.touch {
            Touch::Single(st) => {
                if rect.is_none_or(|rect| rect.contains(&st.point)) {
                    st.cancel(time, out)
                } else {
                    false
                }
            }
            Touch::Multi(mt) => mt.cancel_touches(time, rect, out),
        };
        if sent {
            out.post(time, PostKind::TouchFrame);
        }
        sent
    }

    fn return_to_neutral_state(&mut self, time: u64, out: &mut Output) {
        self.cancel_touches(time, None, out);
        self.release_pressed_keys(time, out);
        self.keys.clear_hw();
    }

    /// 释放所有按下的东西并停止处理事件
    pub fn suspend(&mut self, time: u64, seat_slots: &mut SeatSlots, sink: &mut dyn EventSink) {
        let span = debug_span!("fallback", device = %self.caps.name);
        let _guard = span.enter();

        let mut out = self.output(seat_slots, sink);
        self.return_to_neutral_state(time, &mut out);
        self.scroll.reset();
        self.proximity.reset();
        self.pending = Accumulator::default();
        self.suspended = true;
        debug!("suspended");
    }

    pub fn resume(&mut self) {
        if self.suspended {
            debug!(device = %self.caps.name, "resumed");
        }
        self.suspended = false;
    }

    /// 设备加入时把开关的初始状态告诉客户端
    pub fn sync_initial_state(&mut self, time: u64, seat_slots: &mut SeatSlots, sink: &mut dyn EventSink) {
        let mut out = self.output(seat_slots, sink);

        if self.lid.is_closed && self.lid.reliability == LidReliability::Reliable {
            self.lid_notify_toggle(time, &mut out);
        }

        if self.tablet_mode.state {
            out.post(
                time,
                PostKind::SwitchToggle {
                    switch: Switch::TabletMode,
                    state: SwitchState::On,
                },
            );
        }
    }

    pub fn switch_state(&self, switch: Switch) -> SwitchState {
        match switch {
            Switch::Lid => self.lid.is_closed.into(),
            Switch::TabletMode => self.tablet_mode.state.into(),
        }
    }

    /// 外部发起的触摸仲裁
    pub fn toggle_touch(
        &mut self,
        which: TouchArbitration,
        time: u64,
        seat_slots: &mut SeatSlots,
        sink: &mut dyn EventSink,
    ) {
        let which = match which {
            TouchArbitration::NotActive => ArbitrationState::NotActive,
            TouchArbitration::IgnoreRect(rect) => {
                ArbitrationState::IgnoreRect(self.caps.phys_rect_to_units(&rect))
            }
            TouchArbitration::IgnoreAll => ArbitrationState::IgnoreAll,
        };
        if which == self.arbitration.state {
            return;
        }

        let span = debug_span!("fallback", device = %self.caps.name);
        let _guard = span.enter();

        let mut out = self.output(seat_slots, sink);
        match which {
            ArbitrationState::NotActive => {
                self.arbitration.arm(time + ARBITRATION_REARM);
            }
            ArbitrationState::IgnoreRect(rect) => {
                self.cancel_touches(time, Some(&rect), &mut out);
                if self.arbitration.in_arbitration() {
                    self.arbitration.arm(time + ARBITRATION_REARM);
                }
            }
            ArbitrationState::IgnoreAll => {
                self.arbitration.cancel_timer();
                self.return_to_neutral_state(time, &mut out);
                self.arbitration.block();
            }
        }
        debug!(state = ?which, "touch arbitration");
        self.arbitration.state = which;
    }

    /// 另一个设备加入 seat，返回 true 表示本设备（键盘）与它的平板模式开关配对了
    pub fn device_added(&mut self, other: DeviceId, other_caps: &DeviceCaps) -> bool {
        self.lid.pair_keyboard(&self.caps, other, other_caps);
        self.tablet_mode.pair(&self.caps, other, other_caps)
    }

    /// 返回 true 表示移除的是本设备配对的平板模式开关
    pub fn device_removed(&mut self, other: DeviceId) -> bool {
        self.lid.unpair(other);
        let was_paired = self.tablet_mode.other_device == Some(other);
        self.tablet_mode.unpair(other);
        was_paired
    }

    pub fn tablet_mode_switch(&self) -> Option<DeviceId> {
        self.tablet_mode.other_device
    }

    pub fn lid_listens_to(&self, keyboard: DeviceId) -> bool {
        self.lid.is_closed && self.lid.listens_to(keyboard)
    }

    /// 合盖状态下配对键盘有输入，说明盖子其实是开着的
    pub fn lid_keyboard_activity(
        &mut self,
        keyboard: DeviceId,
        time: u64,
        seat_slots: &mut SeatSlots,
        sink: &mut dyn EventSink,
    ) {
        if !self.lid_listens_to(keyboard) {
            return;
        }

        debug!(device = %self.caps.name, "lid: keyboard activity while closed, assuming open");
        if self.lid.reliability == LidReliability::WriteOpen {
            self.writeback.push(RawEvent::new(EventType::Switch, SW_LID, 0, time));
            self.writeback.push(RawEvent::sync(time));
        }

        self.lid.is_closed = false;
        self.lid.set_listening(false);
        let mut out = self.output(seat_slots, sink);
        self.lid_notify_toggle(time, &mut out);
    }

    pub fn take_writeback(&mut self) -> Vec<RawEvent> {
        std::mem::take(&mut self.writeback)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        [
            self.arbitration.deadline(),
            self.scroll.deadline(),
            self.proximity.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn dispatch_timers(&mut self, now: u64, seat_slots: &mut SeatSlots, sink: &mut dyn EventSink) {
        self.arbitration.dispatch_timer(now);
        self.scroll.dispatch_timer(now);

        let any_button_down = (0..=KEY_MAX)
            .any(|code| key_type(code) == KeyType::Button && self.keys.hw.is_down(code));
        if self.proximity.dispatch_timer(now, any_button_down) {
            self.force_proximity_out(now, seat_slots, sink);
        }
    }

    fn force_proximity_out(&mut self, now: u64, seat_slots: &mut SeatSlots, sink: &mut dyn EventSink) {
        let mut events = Vec::with_capacity(3);
        if self.single_touch().is_some_and(SingleTouch::is_down) {
            events.push(RawEvent::new(EventType::Key, BTN_TOUCH, 0, now));
        }
        events.push(RawEvent::new(EventType::Key, BTN_TOOL_PEN, 0, now));
        events.push(RawEvent::sync(now));

        for event in &events {
            self.process(event, seat_slots, sink);
        }
        self.proximity.finish_forcing();
    }
}

/// 按 dpi 归一化到 1000dpi
fn normalize(raw: &DeviceFloatCoords, dpi: u32) -> NormalizedCoords {
    FlatAccel::default().filter(raw, dpi, 0)
}

fn continuous_scroll(axes: ScrollAxes, delta: NormalizedCoords) -> PostKind {
    PostKind::PointerAxis {
        source: AxisSource::Continuous,
        axes,
        discrete: DiscreteCoords::default(),
        continuous: delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::AbsAxis;
    use crate::event_model::codes::{
        ABS_X, ABS_Y, BTN_MIDDLE, KEY_A, MT_TOOL_PALM, REL_HWHEEL, REL_WHEEL,
    };

    struct Harness {
        dispatch: FallbackDispatch,
        seat: SeatSlots,
        sink: Vec<PostEvent>,
    }

    impl Harness {
        fn new(caps: DeviceCaps, config: DeviceConfig) -> Self {
            Self {
                dispatch: FallbackDispatch::new(caps, config),
                seat: SeatSlots::default(),
                sink: Vec::new(),
            }
        }

        fn feed(&mut self, kind: EventType, code: u16, value: i32, time: u64) {
            let event = RawEvent::new(kind, code, value, time);
            self.dispatch.process(&event, &mut self.seat, &mut self.sink);
        }

        fn sync(&mut self, time: u64) {
            self.feed(EventType::Sync, SYN_REPORT, 0, time);
        }

        fn take(&mut self) -> Vec<PostKind> {
            self.sink.drain(..).map(|e| e.kind).collect()
        }
    }

    fn mouse() -> DeviceCaps {
        let mut caps = DeviceCaps::new("Logitech USB Optical Mouse", SeatCaps::POINTER);
        caps.keys = vec![BTN_LEFT, BTN_RIGHT, BTN_MIDDLE];
        caps
    }

    fn touchscreen() -> DeviceCaps {
        let mut caps = DeviceCaps::new("ELAN Touchscreen", SeatCaps::TOUCH);
        caps.mt_slots = 10;
        caps.has_palm = true;
        let mut axis = AbsAxis::new(0, 4095);
        axis.resolution = 10;
        caps.abs_x = Some(axis);
        caps.abs_y = Some(axis);
        caps.mt_x = Some(axis);
        caps.mt_y = Some(axis);
        caps
    }

    fn button(button: u16, state: KeyState) -> PostKind {
        PostKind::PointerButton { button, state }
    }

    #[test]
    fn relative_motion_is_accumulated_until_sync() {
        let mut h = Harness::new(mouse(), DeviceConfig::default());
        h.feed(EventType::Relative, REL_X, 3, 0);
        h.feed(EventType::Relative, REL_X, 2, 0);
        h.feed(EventType::Relative, REL_Y, -1, 0);
        assert!(h.take().is_empty());

        h.sync(0);
        assert_eq!(
            h.take(),
            vec![PostKind::PointerMotion {
                accel: NormalizedCoords { x: 5.0, y: -1.0 },
                raw: DeviceFloatCoords { x: 5.0, y: -1.0 },
            }]
        );
    }

    #[test]
    fn overflowing_relative_motion_saturates() {
        let mut h = Harness::new(mouse(), DeviceConfig::default());
        h.feed(EventType::Relative, REL_X, i32::MAX, 0);
        h.feed(EventType::Relative, REL_X, i32::MAX, 0);
        h.sync(0);
        let max = f64::from(i32::MAX);
        assert_eq!(
            h.take(),
            vec![PostKind::PointerMotion {
                accel: NormalizedCoords { x: max, y: 0.0 },
                raw: DeviceFloatCoords { x: max, y: 0.0 },
            }]
        );
    }

    #[test]
    fn rotation_applies_before_posting() {
        let config = DeviceConfig {
            rotation: 90,
            ..DeviceConfig::default()
        };
        let mut h = Harness::new(mouse(), config);
        h.feed(EventType::Relative, REL_X, 4, 0);
        h.sync(0);
        assert_eq!(
            h.take(),
            vec![PostKind::PointerMotion {
                accel: NormalizedCoords { x: 0.0, y: 4.0 },
                raw: DeviceFloatCoords { x: 0.0, y: 4.0 },
            }]
        );
    }

    #[test]
    fn wheel_sign_conventions() {
        let mut h = Harness::new(mouse(), DeviceConfig::default());
        h.feed(EventType::Relative, REL_WHEEL, 1, 0);
        h.feed(EventType::Relative, REL_HWHEEL, 2, 0);
        h.sync(0);
        assert_eq!(
            h.take(),
            vec![
                PostKind::PointerAxis {
                    source: AxisSource::Wheel,
                    axes: ScrollAxes::VERTICAL,
                    discrete: DiscreteCoords { x: 0.0, y: -1.0 },
                    continuous: NormalizedCoords { x: 0.0, y: -15.0 },
                },
                PostKind::PointerAxis {
                    source: AxisSource::Wheel,
                    axes: ScrollAxes::HORIZONTAL,
                    discrete: DiscreteCoords { x: 2.0, y: 0.0 },
                    continuous: NormalizedCoords { x: 30.0, y: 0.0 },
                },
            ]
        );
    }

    #[test]
    fn lenovo_scrollpoint_posts_continuous_scroll() {
        let mut caps = mouse();
        caps.quirks = ModelQuirks::LENOVO_SCROLLPOINT;
        let mut h = Harness::new(caps, DeviceConfig::default());
        h.feed(EventType::Relative, REL_WHEEL, 3, 0);
        h.sync(0);
        assert_eq!(
            h.take(),
            vec![continuous_scroll(
                ScrollAxes::VERTICAL,
                NormalizedCoords { x: 0.0, y: -3.0 }
            )]
        );
    }

    #[test]
    fn buttons_post_at_sync_and_left_handed_swaps() {
        let config = DeviceConfig {
            left_handed: true,
            ..DeviceConfig::default()
        };
        let mut h = Harness::new(mouse(), config);
        h.feed(EventType::Key, BTN_LEFT, 1, 10);
        assert!(h.take().is_empty());
        h.sync(10);
        assert_eq!(h.take(), vec![button(BTN_RIGHT, KeyState::Pressed)]);
        assert_eq!(h.dispatch.key_down_count(BTN_RIGHT), 1);

        h.feed(EventType::Key, BTN_LEFT, 0, 20);
        h.sync(20);
        assert_eq!(h.take(), vec![button(BTN_RIGHT, KeyState::Released)]);
    }

    #[test]
    fn keyboard_keys_post_immediately_and_ignore_repeat() {
        let mut h = Harness::new(
            DeviceCaps::new("AT Translated Set 2 keyboard", SeatCaps::KEYBOARD),
            DeviceConfig::default(),
        );
        h.feed(EventType::Key, KEY_A, 1, 0);
        assert_eq!(
            h.take(),
            vec![PostKind::Key {
                key: KEY_A,
                state: KeyState::Pressed
            }]
        );
        h.feed(EventType::Key, KEY_A, 2, 5);
        h.feed(EventType::Key, KEY_A, 1, 6);
        assert!(h.take().is_empty());
    }

    #[test]
    fn out_of_range_key_code_is_dropped_and_logged() {
        let mut h = Harness::new(
            DeviceCaps::new("AT Translated Set 2 keyboard", SeatCaps::KEYBOARD),
            DeviceConfig::default(),
        );
        for time in 0..10 {
            h.feed(EventType::Key, KEY_MAX + 1, 1, time);
        }
        assert!(h.take().is_empty());
        assert_eq!(h.dispatch.key_down_count(KEY_MAX + 1), 0);
        // 十条警告已经用完了这个窗口的配额
        assert_eq!(
            h.dispatch.unknown_code_limit.test(10),
            crate::ratelimit::RateLimitState::Exceeded
        );
    }

    #[test]
    fn quick_scroll_button_release_is_a_click() {
        let config = DeviceConfig {
            scroll_method: ScrollMethod::OnButtonDown(BTN_MIDDLE),
            ..DeviceConfig::default()
        };
        let mut h = Harness::new(mouse(), config);
        h.feed(EventType::Key, BTN_MIDDLE, 1, 0);
        h.sync(0);
        h.feed(EventType::Relative, REL_X, 5, 1000);
        h.sync(1000);
        assert!(h.take().is_empty());

        h.feed(EventType::Key, BTN_MIDDLE, 0, 50_000);
        h.sync(50_000);
        assert_eq!(
            h.sink,
            vec![
                PostEvent::new(0, button(BTN_MIDDLE, KeyState::Pressed)),
                PostEvent::new(50_000, button(BTN_MIDDLE, KeyState::Released)),
            ]
        );
    }

    #[test]
    fn held_scroll_button_turns_motion_into_scroll() {
        let config = DeviceConfig {
            scroll_method: ScrollMethod::OnButtonDown(BTN_MIDDLE),
            ..DeviceConfig::default()
        };
        let mut h = Harness::new(mouse(), config);
        h.feed(EventType::Key, BTN_MIDDLE, 1, 0);
        h.sync(0);
        assert_eq!(h.dispatch.next_deadline(), Some(scroll::BUTTON_SCROLL_TIMEOUT));
        h.dispatch
            .dispatch_timers(scroll::BUTTON_SCROLL_TIMEOUT, &mut h.seat, &mut h.sink);

        h.feed(EventType::Relative, REL_Y, 7, 300_000);
        h.sync(300_000);
        h.feed(EventType::Key, BTN_MIDDLE, 0, 400_000);
        h.sync(400_000);
        assert_eq!(
            h.take(),
            vec![
                continuous_scroll(ScrollAxes::VERTICAL, NormalizedCoords { x: 0.0, y: 7.0 }),
                continuous_scroll(ScrollAxes::VERTICAL, NormalizedCoords::default()),
            ]
        );
    }

    #[test]
    fn touch_without_position_starts_at_probed_slot_position() {
        let mut caps = touchscreen();
        caps.mt_slots = 2;
        caps.initial_slot_positions = vec![DeviceCoords::new(5, 6), DeviceCoords::new(300, 400)];
        let mut h = Harness::new(caps, DeviceConfig::default());
        h.feed(EventType::Absolute, ABS_MT_SLOT, 1, 0);
        h.feed(EventType::Absolute, ABS_MT_TRACKING_ID, 9, 0);
        h.sync(0);
        assert_eq!(
            h.take(),
            vec![
                PostKind::TouchDown {
                    slot: 1,
                    seat_slot: 0,
                    point: DeviceCoords::new(300, 400),
                },
                PostKind::TouchFrame
            ]
        );
    }

    #[test]
    fn single_touch_without_touch_cap_is_absolute_pointer() {
        let mut caps = DeviceCaps::new("QEMU USB Tablet", SeatCaps::POINTER);
        caps.abs_x = Some(AbsAxis::new(0, 32767));
        caps.abs_y = Some(AbsAxis::new(0, 32767));
        let mut h = Harness::new(caps, DeviceConfig::default());
        h.feed(EventType::Absolute, ABS_X, 100, 0);
        h.feed(EventType::Absolute, ABS_Y, 200, 0);
        h.sync(0);
        assert_eq!(
            h.take(),
            vec![PostKind::PointerMotionAbsolute {
                point: DeviceCoords::new(100, 200)
            }]
        );
    }

    #[test]
    fn single_touch_lifecycle() {
        let mut caps = DeviceCaps::new("Wacom touch", SeatCaps::TOUCH);
        caps.abs_x = Some(AbsAxis::new(0, 1000));
        caps.abs_y = Some(AbsAxis::new(0, 1000));
        let mut h = Harness::new(caps, DeviceConfig::default());

        h.feed(EventType::Key, BTN_TOUCH, 1, 0);
        h.feed(EventType::Absolute, ABS_X, 10, 0);
        h.feed(EventType::Absolute, ABS_Y, 20, 0);
        h.sync(0);
        h.feed(EventType::Key, BTN_TOUCH, 0, 10);
        h.sync(10);
        assert_eq!(
            h.take(),
            vec![
                PostKind::TouchDown {
                    slot: -1,
                    seat_slot: 0,
                    point: DeviceCoords::new(10, 20)
                },
                PostKind::TouchFrame,
                PostKind::TouchUp {
                    slot: -1,
                    seat_slot: 0
                },
                PostKind::TouchFrame,
            ]
        );
        assert!(!h.seat.is_taken(0));
    }

    #[test]
    fn palm_tool_type_before_tracking_id_never_goes_down() {
        let mut h = Harness::new(touchscreen(), DeviceConfig::default());
        h.feed(EventType::Absolute, ABS_MT_SLOT, 0, 0);
        h.feed(EventType::Absolute, ABS_MT_TOOL_TYPE, MT_TOOL_PALM, 0);
        h.feed(EventType::Absolute, ABS_MT_TRACKING_ID, 3, 0);
        h.feed(EventType::Absolute, ABS_MT_POSITION_X, 50, 0);
        h.feed(EventType::Absolute, ABS_MT_POSITION_Y, 50, 0);
        h.sync(0);
        assert!(h.take().is_empty());
    }

    #[test]
    fn suspend_releases_everything_and_drops_input() {
        let mut h = Harness::new(mouse(), DeviceConfig::default());
        h.feed(EventType::Key, BTN_LEFT, 1, 0);
        h.sync(0);
        h.take();

        h.dispatch.suspend(5, &mut h.seat, &mut h.sink);
        assert_eq!(h.take(), vec![button(BTN_LEFT, KeyState::Released)]);
        assert_eq!(h.dispatch.key_down_count(BTN_LEFT), 0);

        h.feed(EventType::Key, BTN_RIGHT, 1, 10);
        h.sync(10);
        assert!(h.take().is_empty());

        h.dispatch.resume();
        h.feed(EventType::Key, BTN_RIGHT, 1, 20);
        h.sync(20);
        assert_eq!(h.take(), vec![button(BTN_RIGHT, KeyState::Pressed)]);
    }

    #[test]
    fn tablet_mode_switch_posts_only_on_change() {
        let mut caps = DeviceCaps::new("Intel HID switches", SeatCaps::SWITCH);
        caps.tags = DeviceTags::TABLET_MODE_SWITCH;
        let mut h = Harness::new(caps, DeviceConfig::default());
        h.feed(EventType::Switch, SW_TABLET_MODE, 1, 0);
        h.sync(0);
        h.feed(EventType::Switch, SW_TABLET_MODE, 1, 5);
        h.sync(5);
        assert_eq!(
            h.take(),
            vec![PostKind::SwitchToggle {
                switch: Switch::TabletMode,
                state: SwitchState::On
            }]
        );
        assert_eq!(h.dispatch.switch_state(Switch::TabletMode), SwitchState::On);
    }

    #[test]
    fn initially_closed_lid_is_reported_once() {
        let mut caps = DeviceCaps::new("Lid Switch", SeatCaps::SWITCH);
        caps.tags = DeviceTags::LID_SWITCH;
        caps.initial_lid_closed = true;
        let mut h = Harness::new(caps, DeviceConfig::default());
        h.dispatch.sync_initial_state(0, &mut h.seat, &mut h.sink);
        h.feed(EventType::Switch, SW_LID, 1, 5);
        h.sync(5);
        assert_eq!(
            h.take(),
            vec![PostKind::SwitchToggle {
                switch: Switch::Lid,
                state: SwitchState::On
            }]
        );
    }
}
