use std::fmt;

use crate::audio::{Granularity, VolumeKey};

/// `NSEvent` subtype carrying auxiliary (media) key presses
pub const AUX_CONTROL_BUTTONS_SUBTYPE: i16 = 8;

/// Key-state byte of a key-down transition
const KEY_STATE_DOWN: i64 = 0x0A;

/// Hardware media keys, numbered by their `NX_KEYTYPE_*` codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKey {
    SoundUp,
    SoundDown,
    BrightnessUp,
    BrightnessDown,
    Mute,
}

impl MediaKey {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(MediaKey::SoundUp),
            1 => Some(MediaKey::SoundDown),
            2 => Some(MediaKey::BrightnessUp),
            3 => Some(MediaKey::BrightnessDown),
            7 => Some(MediaKey::Mute),
            _ => None,
        }
    }

    /// Volume keys are intercepted; brightness keys always go to the OS
    pub fn volume_key(self) -> Option<VolumeKey> {
        match self {
            MediaKey::SoundUp => Some(VolumeKey::SoundUp),
            MediaKey::SoundDown => Some(VolumeKey::SoundDown),
            MediaKey::Mute => Some(VolumeKey::Mute),
            MediaKey::BrightnessUp | MediaKey::BrightnessDown => None,
        }
    }

    pub fn is_intercepted(self) -> bool {
        self.volume_key().is_some()
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKey::SoundUp => write!(f, "sound up"),
            MediaKey::SoundDown => write!(f, "sound down"),
            MediaKey::BrightnessUp => write!(f, "brightness up"),
            MediaKey::BrightnessDown => write!(f, "brightness down"),
            MediaKey::Mute => write!(f, "mute"),
        }
    }
}

/// `CGEventFlags` bits relevant to volume stepping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModifierFlags(u64);

impl ModifierFlags {
    pub const SHIFT: u64 = 0x0002_0000;
    pub const CONTROL: u64 = 0x0004_0000;
    pub const OPTION: u64 = 0x0008_0000;
    pub const COMMAND: u64 = 0x0010_0000;

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, mask: u64) -> bool {
        self.0 & mask == mask
    }

    /// Shift+Option selects the 1/64 step, like the native volume keys
    pub fn granularity(self) -> Granularity {
        if self.contains(Self::SHIFT | Self::OPTION) {
            Granularity::Fine
        } else {
            Granularity::Coarse
        }
    }
}

/// A decoded media key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: MediaKey,
    pub is_down: bool,
    pub is_repeat: bool,
    pub modifiers: ModifierFlags,
}

/// Decode the packed `data1` payload of a system-defined event.
///
/// Layout: key code in bits 16..32, key state in bits 8..16, repeat flag in bit 0.
/// Returns `None` for other subtypes and unknown key codes.
pub fn decode_system_defined(subtype: i16, data1: i64, modifiers: ModifierFlags) -> Option<KeyPress> {
    if subtype != AUX_CONTROL_BUTTONS_SUBTYPE {
        return None;
    }

    let code = (data1 & 0xFFFF_0000) >> 16;
    let flags = data1 & 0x0000_FFFF;
    let key_state = (flags & 0xFF00) >> 8;

    let key = MediaKey::from_code(code)?;
    Some(KeyPress {
        key,
        is_down: key_state == KEY_STATE_DOWN,
        is_repeat: flags & 0x1 == 0x1,
        modifiers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(code: i64, state: i64) -> i64 {
        (code << 16) | (state << 8)
    }

    #[test]
    fn test_decode_volume_up_down_transition() {
        let press =
            decode_system_defined(8, payload(0, 0x0A), ModifierFlags::default()).unwrap();
        assert_eq!(press.key, MediaKey::SoundUp);
        assert!(press.is_down);
        assert!(!press.is_repeat);

        let release =
            decode_system_defined(8, payload(0, 0x0B), ModifierFlags::default()).unwrap();
        assert!(!release.is_down);
    }

    #[test]
    fn test_decode_rejects_other_subtypes_and_codes() {
        assert!(decode_system_defined(7, payload(0, 0x0A), ModifierFlags::default()).is_none());
        // NX_KEYTYPE_PLAY
        assert!(decode_system_defined(8, payload(16, 0x0A), ModifierFlags::default()).is_none());
    }

    #[test]
    fn test_decode_mute_and_repeat_bit() {
        let press =
            decode_system_defined(8, payload(7, 0x0A) | 1, ModifierFlags::default()).unwrap();
        assert_eq!(press.key, MediaKey::Mute);
        assert!(press.is_repeat);
    }

    #[test]
    fn test_only_volume_keys_are_intercepted() {
        assert!(MediaKey::SoundUp.is_intercepted());
        assert!(MediaKey::SoundDown.is_intercepted());
        assert!(MediaKey::Mute.is_intercepted());
        assert!(!MediaKey::BrightnessUp.is_intercepted());
        assert!(!MediaKey::BrightnessDown.is_intercepted());
    }

    #[test]
    fn test_fine_granularity_needs_shift_and_option() {
        let shift = ModifierFlags::from_bits(ModifierFlags::SHIFT);
        let both = ModifierFlags::from_bits(ModifierFlags::SHIFT | ModifierFlags::OPTION);
        let with_command = ModifierFlags::from_bits(
            ModifierFlags::SHIFT | ModifierFlags::OPTION | ModifierFlags::COMMAND,
        );

        assert_eq!(shift.granularity(), Granularity::Coarse);
        assert_eq!(both.granularity(), Granularity::Fine);
        assert_eq!(with_command.granularity(), Granularity::Fine);
    }
}
