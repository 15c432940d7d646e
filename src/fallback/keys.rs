use tracing::error;

use crate::event_model::codes::*;

/// 按键编码的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    None,
    Key,
    Button,
}

pub fn key_type(code: u16) -> KeyType {
    if code == BTN_TOUCH || is_tool_code(code) {
        return KeyType::None;
    }

    match code {
        KEY_ESC..=KEY_MICMUTE => KeyType::Key,
        BTN_MISC..=BTN_GEAR_UP => KeyType::Button,
        KEY_OK..=KEY_LIGHTS_TOGGLE => KeyType::Key,
        BTN_DPAD_UP..=BTN_DPAD_RIGHT => KeyType::Button,
        KEY_ALS_TOGGLE..BTN_TRIGGER_HAPPY => KeyType::Key,
        BTN_TRIGGER_HAPPY..=BTN_TRIGGER_HAPPY40 => KeyType::Button,
        _ => KeyType::None,
    }
}

/// 超过这个次数基本可以认定是计数出错了
const ABNORMAL_DOWN_COUNT: u8 = 32;

/// 每个按键被按下的次数
///
/// 同一个逻辑按键可能来自多个物理来源，只有 0→1 和 →0 这两个边沿才算数
#[derive(Debug, Clone)]
pub struct KeyDownCounts {
    counts: Vec<u8>,
}

impl Default for KeyDownCounts {
    fn default() -> Self {
        Self {
            counts: vec![0; KEY_CNT],
        }
    }
}

impl KeyDownCounts {
    /// 更新计数并返回更新后的值，越界的编码返回 0
    pub fn note_key(&mut self, code: u16, pressed: bool) -> u32 {
        let Some(count) = self.counts.get_mut(usize::from(code)) else {
            error!("bug: key code {code:#x} out of range");
            return 0;
        };

        if pressed {
            *count = count.saturating_add(1);
        } else if *count == 0 {
            error!("bug: releasing key {code:#x} that is not down");
        } else {
            *count -= 1;
        }

        if *count > ABNORMAL_DOWN_COUNT {
            error!("bug: key count for {code:#x} reached abnormal values");
        }

        u32::from(*count)
    }

    pub fn count(&self, code: u16) -> u32 {
        self.counts
            .get(usize::from(code))
            .copied()
            .map(u32::from)
            .unwrap_or(0)
    }

    pub fn is_down(&self, code: u16) -> bool {
        self.count(code) > 0
    }

    /// 对每个仍被按下的编码恰好释放一次
    pub fn release_all(&mut self, mut emit: impl FnMut(u16, KeyType)) {
        for code in 0..KEY_CNT as u16 {
            let count = self.count(code);
            if count == 0 {
                continue;
            }

            if count > 1 {
                error!("bug: key {code:#x} is down {count} times");
            }

            emit(code, key_type(code));

            if self.note_key(code, false) != 0 {
                error!("bug: releasing key {code:#x} failed");
                self.counts[usize::from(code)] = 0;
            }
        }
    }
}

const MASK_WORDS: usize = KEY_CNT.div_ceil(64);

/// 按键的硬件状态位图
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HwKeyMask([u64; MASK_WORDS]);

impl HwKeyMask {
    fn locate(code: u16) -> Option<(usize, u64)> {
        let code = usize::from(code);
        (code < KEY_CNT).then(|| (code / 64, 1u64 << (code % 64)))
    }

    pub fn is_down(&self, code: u16) -> bool {
        Self::locate(code).is_some_and(|(word, bit)| self.0[word] & bit != 0)
    }

    pub fn set(&mut self, code: u16, down: bool) {
        if let Some((word, bit)) = Self::locate(code) {
            if down {
                self.0[word] |= bit;
            } else {
                self.0[word] &= !bit;
            }
        }
    }

    pub fn clear(&mut self) {
        self.0 = [0; MASK_WORDS];
    }
}

/// 硬件状态、上一次 flush 时的状态和按下计数
#[derive(Debug, Clone, Default)]
pub struct KeyTracker {
    pub hw: HwKeyMask,
    pub last_hw: HwKeyMask,
    pub counts: KeyDownCounts,
}

impl KeyTracker {
    pub fn has_changed(&self, code: u16) -> bool {
        self.hw.is_down(code) != self.last_hw.is_down(code)
    }

    /// 自上次 flush 以来状态有变化的按钮（不含普通按键）
    pub fn changed_buttons(&self) -> Vec<(u16, bool)> {
        (0..KEY_CNT as u16)
            .filter(|&code| key_type(code) == KeyType::Button && self.has_changed(code))
            .map(|code| (code, self.hw.is_down(code)))
            .collect()
    }

    pub fn update_last_state(&mut self) {
        self.last_hw = self.hw;
    }

    pub fn clear_hw(&mut self) {
        self.hw.clear();
        self.last_hw.clear();
    }
}
