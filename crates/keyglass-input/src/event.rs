use std::time::Duration;

/// Linux event type numbers (`linux/input-event-codes.h`).
pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;

/// First button code; everything below is a keyboard key.
pub const BTN_MISC: u16 = 0x100;
/// Mouse buttons occupy `BTN_MOUSE..BTN_MOUSE_END` (`BTN_LEFT` through `BTN_TASK`).
pub const BTN_MOUSE: u16 = 0x110;
pub const BTN_MOUSE_END: u16 = 0x118;
/// Highest key code plus one.
pub const KEY_CNT: usize = 0x300;

/// Event class of a raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    Synchronize,
    Key,
    Relative,
    Absolute,
    Other(u16),
}

impl EventClass {
    pub fn from_raw(ty: u16) -> Self {
        match ty {
            EV_SYN => EventClass::Synchronize,
            EV_KEY => EventClass::Key,
            EV_REL => EventClass::Relative,
            EV_ABS => EventClass::Absolute,
            other => EventClass::Other(other),
        }
    }

    pub fn to_raw(self) -> u16 {
        match self {
            EventClass::Synchronize => EV_SYN,
            EventClass::Key => EV_KEY,
            EventClass::Relative => EV_REL,
            EventClass::Absolute => EV_ABS,
            EventClass::Other(other) => other,
        }
    }
}

/// One fixed-size record read from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    /// Kernel timestamp of the record.
    pub time: Duration,
    pub class: EventClass,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub fn new(class: EventClass, code: u16, value: i32) -> Self {
        Self {
            time: Duration::ZERO,
            class,
            code,
            value,
        }
    }

    pub fn key(code: u16, down: bool) -> Self {
        Self::new(EventClass::Key, code, i32::from(down))
    }

    pub fn abs(axis: u16, value: i32) -> Self {
        Self::new(EventClass::Absolute, axis, value)
    }

    pub fn rel(axis: u16, delta: i32) -> Self {
        Self::new(EventClass::Relative, axis, delta)
    }

    pub fn sync() -> Self {
        Self::new(EventClass::Synchronize, 0, 0)
    }
}

/// Whether `code` is one of the mouse buttons.
pub fn is_mouse_button(code: u16) -> bool {
    (BTN_MOUSE..BTN_MOUSE_END).contains(&code)
}

/// Whether `code` is a keyboard key rather than a button of a mouse, pad or touch surface.
pub fn is_keyboard_key(code: u16) -> bool {
    code < BTN_MISC
}

const BITMAP_WORDS: usize = KEY_CNT / 64;

/// Bitmap of currently active key codes, as reported by a device.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyBitmap {
    words: [u64; BITMAP_WORDS],
}

impl KeyBitmap {
    pub fn new() -> Self {
        Self {
            words: [0; BITMAP_WORDS],
        }
    }

    /// Build from the active codes; codes outside the key space are dropped.
    pub fn from_codes<I: IntoIterator<Item = u16>>(codes: I) -> Self {
        let mut bitmap = Self::new();
        for code in codes {
            bitmap.set(code);
        }
        bitmap
    }

    pub fn set(&mut self, code: u16) {
        let code = usize::from(code);
        if code < KEY_CNT {
            self.words[code / 64] |= 1u64 << (code % 64);
        }
    }

    pub fn clear(&mut self, code: u16) {
        let code = usize::from(code);
        if code < KEY_CNT {
            self.words[code / 64] &= !(1u64 << (code % 64));
        }
    }

    pub fn contains(&self, code: u16) -> bool {
        let code = usize::from(code);
        code < KEY_CNT && self.words[code / 64] & (1u64 << (code % 64)) != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        (0..KEY_CNT as u16).filter(move |&code| self.contains(code))
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }
}

impl Default for KeyBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
