//! 合盖开关与平板模式开关
//!
//! 两者都需要和内置键盘配对：合盖时监听键盘输入来判断开关是否误报，
//! 平板模式打开时挂起键盘

use tracing::{debug, error};

use crate::caps::{DeviceCaps, DeviceTags, LidReliability, ModelQuirks};
use crate::seat::DeviceId;

/// 一个合盖开关最多配对的内置键盘数
pub const MAX_PAIRED_KEYBOARDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairedKeyboard {
    pub device: DeviceId,
    /// 合盖期间监听键盘事件
    pub listening: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Lid {
    pub is_closed: bool,
    /// 上一次告诉客户端的状态
    pub is_closed_client_state: bool,
    pub reliability: LidReliability,
    pub paired: Vec<PairedKeyboard>,
}

impl Lid {
    pub fn new(is_closed: bool, reliability: LidReliability) -> Self {
        Self {
            is_closed,
            is_closed_client_state: false,
            reliability,
            paired: Vec::new(),
        }
    }

    /// 客户端状态与实际状态不一致时返回新状态并同步
    pub fn take_toggle(&mut self) -> Option<bool> {
        if self.is_closed == self.is_closed_client_state {
            return None;
        }
        self.is_closed_client_state = self.is_closed;
        Some(self.is_closed)
    }

    pub fn set_listening(&mut self, listening: bool) {
        for kbd in &mut self.paired {
            kbd.listening = listening;
        }
    }

    pub fn listens_to(&self, keyboard: DeviceId) -> bool {
        self.paired
            .iter()
            .any(|kbd| kbd.device == keyboard && kbd.listening)
    }

    /// `lid_caps` 是本设备，`keyboard_caps` 是新加入的设备
    pub fn pair_keyboard(&mut self, lid_caps: &DeviceCaps, keyboard: DeviceId, keyboard_caps: &DeviceCaps) -> bool {
        if !keyboard_caps.tags.contains(DeviceTags::KEYBOARD)
            || !lid_caps.tags.contains(DeviceTags::LID_SWITCH)
        {
            return false;
        }

        if !keyboard_caps.tags.contains(DeviceTags::INTERNAL_KEYBOARD) {
            return false;
        }

        if self.paired.iter().any(|kbd| kbd.device == keyboard) {
            return false;
        }

        if self.paired.len() >= MAX_PAIRED_KEYBOARDS {
            error!("bug: lid: too many internal keyboards");
            return false;
        }

        debug!(
            "lid: keyboard paired with {}<->{}",
            lid_caps.name, keyboard_caps.name
        );
        self.paired.push(PairedKeyboard {
            device: keyboard,
            listening: self.is_closed,
        });
        true
    }

    pub fn unpair(&mut self, device: DeviceId) {
        self.paired.retain(|kbd| kbd.device != device);
    }
}

#[derive(Debug, Clone, Default)]
pub struct TabletMode {
    /// 本设备作为平板模式开关时的状态
    pub state: bool,
    /// 本设备作为键盘时所配对的平板模式开关
    pub other_device: Option<DeviceId>,
}

impl TabletMode {
    /// `keyboard_caps` 是本设备，`switch_caps` 是另一个设备
    pub fn pair(&mut self, keyboard_caps: &DeviceCaps, switch: DeviceId, switch_caps: &DeviceCaps) -> bool {
        let tags = keyboard_caps.tags;
        if tags.contains(DeviceTags::EXTERNAL_KEYBOARD) {
            return false;
        }

        if tags.contains(DeviceTags::TRACKPOINT) {
            if tags.contains(DeviceTags::EXTERNAL_MOUSE) {
                return false;
            }
        } else if !tags.contains(DeviceTags::INTERNAL_KEYBOARD) {
            return false;
        }

        if keyboard_caps
            .quirks
            .contains(ModelQuirks::TABLET_MODE_NO_SUSPEND)
        {
            return false;
        }

        if !switch_caps.tags.contains(DeviceTags::TABLET_MODE_SWITCH) {
            return false;
        }

        if self.other_device.is_some() {
            return false;
        }

        debug!("tablet-mode: suspending keyboard with {}", switch_caps.name);
        self.other_device = Some(switch);
        true
    }

    pub fn unpair(&mut self, device: DeviceId) {
        if self.other_device == Some(device) {
            self.other_device = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::SeatCaps;

    fn lid_caps() -> DeviceCaps {
        let mut caps = DeviceCaps::new("Lid Switch", SeatCaps::SWITCH);
        caps.tags = DeviceTags::LID_SWITCH;
        caps
    }

    fn keyboard(tags: DeviceTags) -> DeviceCaps {
        let mut caps = DeviceCaps::new("AT Translated Set 2 keyboard", SeatCaps::KEYBOARD);
        caps.tags = DeviceTags::KEYBOARD | tags;
        caps
    }

    #[test]
    fn lid_pairs_only_internal_keyboards_up_to_the_cap() {
        let mut lid = Lid::new(false, LidReliability::Reliable);
        let caps = lid_caps();

        assert!(!lid.pair_keyboard(&caps, DeviceId(1), &keyboard(DeviceTags::EXTERNAL_KEYBOARD)));
        for id in 2..2 + MAX_PAIRED_KEYBOARDS {
            assert!(lid.pair_keyboard(&caps, DeviceId(id), &keyboard(DeviceTags::INTERNAL_KEYBOARD)));
        }
        assert!(!lid.pair_keyboard(&caps, DeviceId(99), &keyboard(DeviceTags::INTERNAL_KEYBOARD)));
        assert_eq!(lid.paired.len(), MAX_PAIRED_KEYBOARDS);

        lid.unpair(DeviceId(2));
        assert_eq!(lid.paired.len(), MAX_PAIRED_KEYBOARDS - 1);
    }

    #[test]
    fn closed_lid_listens_to_new_keyboard() {
        let mut lid = Lid::new(true, LidReliability::Reliable);
        lid.pair_keyboard(&lid_caps(), DeviceId(4), &keyboard(DeviceTags::INTERNAL_KEYBOARD));
        assert!(lid.listens_to(DeviceId(4)));
        lid.set_listening(false);
        assert!(!lid.listens_to(DeviceId(4)));
    }

    #[test]
    fn client_state_only_toggles_on_change() {
        let mut lid = Lid::new(false, LidReliability::Reliable);
        assert_eq!(lid.take_toggle(), None);
        lid.is_closed = true;
        assert_eq!(lid.take_toggle(), Some(true));
        assert_eq!(lid.take_toggle(), None);
    }

    #[test]
    fn tablet_mode_pairs_once_with_a_switch() {
        let mut mode = TabletMode::default();
        let mut switch = DeviceCaps::new("Intel HID switches", SeatCaps::SWITCH);
        switch.tags = DeviceTags::TABLET_MODE_SWITCH;
        let kbd = keyboard(DeviceTags::INTERNAL_KEYBOARD);

        assert!(mode.pair(&kbd, DeviceId(7), &switch));
        assert!(!mode.pair(&kbd, DeviceId(8), &switch));
        mode.unpair(DeviceId(7));
        assert_eq!(mode.other_device, None);

        let external = keyboard(DeviceTags::EXTERNAL_KEYBOARD);
        assert!(!mode.pair(&external, DeviceId(7), &switch));
    }
}
