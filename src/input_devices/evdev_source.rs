use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use evdev_rs::enums::{EV_SW, EventCode, InputProp, int_to_ev_abs, int_to_ev_key, int_to_ev_rel};
use evdev_rs::util::event_code_to_int;
use evdev_rs::{Device, DeviceWrapper, InputEvent, ReadFlag, ReadStatus};
use tracing::{debug, warn};

use crate::caps::{AbsAxis, DeviceCaps, DeviceTags, ModelQuirks, SeatCaps};
use crate::event_model::RawEvent;
use crate::event_model::codes::*;
use crate::geometry::DeviceCoords;
use crate::fallback::keys::{KeyType, key_type};

const BUS_USB: u16 = 0x03;
const BUS_BLUETOOTH: u16 = 0x05;
const BUS_I8042: u16 = 0x11;
const BUS_HOST: u16 = 0x19;

/// Lenovo ScrollPoint 鼠标
const LENOVO_SCROLLPOINT_ID: (u16, u16) = (0x17ef, 0x6049);

/// 一个 `/dev/input/event*` 设备节点
pub struct EvdevSource {
    path: PathBuf,
    device: Device,
    /// 收到 `SYN_DROPPED` 之后在读补发的同步事件
    syncing: bool,
}

impl EvdevSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
        let device = Device::new_from_file(file)
            .with_context(|| format!("{} is not an evdev device", path.display()))?;
        debug!(path = %path.display(), name = device.name().unwrap_or_default(), "opened");
        Ok(Self {
            path,
            device,
            syncing: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 每个槽位当前的位置，启动时已经按下的触点从这里开始
    fn slot_positions(&self, slots: usize) -> Vec<DeviceCoords> {
        let (Some(x), Some(y)) = (
            int_to_ev_abs(u32::from(ABS_MT_POSITION_X)),
            int_to_ev_abs(u32::from(ABS_MT_POSITION_Y)),
        ) else {
            return Vec::new();
        };
        let (x, y) = (EventCode::EV_ABS(x), EventCode::EV_ABS(y));
        (0..slots)
            .map(|slot| {
                let slot = u32::try_from(slot).unwrap_or(u32::MAX);
                DeviceCoords::new(
                    self.device.slot_value(slot, &x).unwrap_or(0),
                    self.device.slot_value(slot, &y).unwrap_or(0),
                )
            })
            .collect()
    }

    /// 从 evdev 的能力位推断设备信息
    pub fn probe(&self) -> DeviceCaps {
        let dev = &self.device;
        let has_key = |code: u16| {
            int_to_ev_key(u32::from(code)).is_some_and(|key| dev.has(EventCode::EV_KEY(key)))
        };
        let has_rel = |code: u16| {
            int_to_ev_rel(u32::from(code)).is_some_and(|rel| dev.has(EventCode::EV_REL(rel)))
        };
        let abs = |code: u16| {
            int_to_ev_abs(u32::from(code))
                .and_then(|axis| dev.abs_info(&EventCode::EV_ABS(axis)))
                .map(|info| AbsAxis {
                    minimum: info.minimum,
                    maximum: info.maximum,
                    fuzz: info.fuzz,
                    resolution: info.resolution,
                })
        };
        let has_sw = |sw: EV_SW| dev.has(EventCode::EV_SW(sw));
        let sw_value = |sw: EV_SW| dev.event_value(&EventCode::EV_SW(sw)).unwrap_or(0) != 0;

        let mut caps = DeviceCaps::new(dev.name().unwrap_or("unknown"), SeatCaps::empty());
        caps.keys = (0..=KEY_MAX).filter(|&code| has_key(code)).collect();
        caps.abs_x = abs(ABS_X);
        caps.abs_y = abs(ABS_Y);
        caps.mt_x = abs(ABS_MT_POSITION_X);
        caps.mt_y = abs(ABS_MT_POSITION_Y);
        if caps.mt_x.is_some() && caps.mt_y.is_some() {
            caps.mt_slots = dev
                .num_slots()
                .and_then(|slots| usize::try_from(slots).ok())
                .unwrap_or(1)
                .max(1);
            caps.initial_slot_positions = self.slot_positions(caps.mt_slots);
        }
        caps.has_palm = abs(ABS_MT_TOOL_TYPE).is_some_and(|axis| axis.contains(MT_TOOL_PALM));

        let direct = dev.has(InputProp::INPUT_PROP_DIRECT);
        let has_keyboard_keys = caps
            .keys
            .iter()
            .any(|&code| key_type(code) == KeyType::Key);
        let has_rel_pointer = has_rel(REL_X) && has_rel(REL_Y);
        let has_wheel = has_rel(REL_WHEEL) || has_rel(REL_HWHEEL);
        let has_touch = direct && (caps.is_mt() || has_key(BTN_TOUCH));

        if has_rel_pointer || has_wheel || (caps.abs_x.is_some() && !has_touch && has_key(BTN_LEFT)) {
            caps.seat_caps |= SeatCaps::POINTER;
        }
        if has_touch {
            caps.seat_caps |= SeatCaps::TOUCH;
        }
        if has_keyboard_keys {
            caps.seat_caps |= SeatCaps::KEYBOARD;
        }
        if has_sw(EV_SW::SW_LID) || has_sw(EV_SW::SW_TABLET_MODE) {
            caps.seat_caps |= SeatCaps::SWITCH;
        }

        let bus = dev.bustype();
        let external = matches!(bus, BUS_USB | BUS_BLUETOOTH);
        if has_keyboard_keys {
            caps.tags |= DeviceTags::KEYBOARD;
            if matches!(bus, BUS_I8042 | BUS_HOST) {
                caps.tags |= DeviceTags::INTERNAL_KEYBOARD;
            } else if external {
                caps.tags |= DeviceTags::EXTERNAL_KEYBOARD;
            }
        }
        if dev.has(InputProp::INPUT_PROP_POINTING_STICK) {
            caps.tags |= DeviceTags::TRACKPOINT;
        }
        if has_rel_pointer && external {
            caps.tags |= DeviceTags::EXTERNAL_MOUSE;
        }
        if has_sw(EV_SW::SW_LID) {
            caps.tags |= DeviceTags::LID_SWITCH;
            caps.initial_lid_closed = sw_value(EV_SW::SW_LID);
        }
        if has_sw(EV_SW::SW_TABLET_MODE) {
            caps.tags |= DeviceTags::TABLET_MODE_SWITCH;
            caps.initial_tablet_mode = sw_value(EV_SW::SW_TABLET_MODE);
        }

        if (dev.vendor_id(), dev.product_id()) == LENOVO_SCROLLPOINT_ID {
            caps.quirks |= ModelQuirks::LENOVO_SCROLLPOINT;
        }

        caps
    }

    /// 阻塞读取下一条事件，时间戳为 `epoch` 以来的微秒数
    pub fn next_event(&mut self, epoch: Instant) -> Result<RawEvent> {
        loop {
            let flags = if self.syncing {
                ReadFlag::SYNC
            } else {
                ReadFlag::NORMAL | ReadFlag::BLOCKING
            };

            match self.device.next_event(flags) {
                Ok((ReadStatus::Success, event)) => return Ok(to_raw(&event, epoch)),
                Ok((ReadStatus::Sync, event)) => {
                    if !self.syncing {
                        warn!(path = %self.path.display(), "SYN_DROPPED, resyncing device state");
                        self.syncing = true;
                    }
                    return Ok(to_raw(&event, epoch));
                }
                Err(err) if self.syncing && err.kind() == ErrorKind::WouldBlock => {
                    self.syncing = false;
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to read {}", self.path.display()));
                }
            }
        }
    }
}

fn to_raw(event: &InputEvent, epoch: Instant) -> RawEvent {
    let (kind, code) = event_code_to_int(&event.event_code);
    let time = u64::try_from(epoch.elapsed().as_micros()).unwrap_or(u64::MAX);
    RawEvent::from_raw(kind as u16, code as u16, event.value, time)
}

/// 把事件写回设备节点，格式为 64 位平台上的 `struct input_event`
pub fn write_events(path: &Path, events: &[RawEvent]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("failed to open {} for writing", path.display()))?;

    let mut buf = Vec::with_capacity(events.len() * 24);
    for event in events {
        let sec = (event.time / 1_000_000) as i64;
        let usec = (event.time % 1_000_000) as i64;
        buf.extend_from_slice(&sec.to_ne_bytes());
        buf.extend_from_slice(&usec.to_ne_bytes());
        buf.extend_from_slice(&(event.kind as u16).to_ne_bytes());
        buf.extend_from_slice(&event.code.to_ne_bytes());
        buf.extend_from_slice(&event.value.to_ne_bytes());
    }

    file.write_all(&buf)
        .with_context(|| format!("failed to write events to {}", path.display()))?;
    debug!(path = %path.display(), count = events.len(), "wrote events back");
    Ok(())
}
