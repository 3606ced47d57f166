use thiserror::Error;

pub const MAX_LIGHT: u8 = 15;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LightError {
    #[error("light channel index {0} out of range 0..=3")]
    InvalidChannel(u8),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LightChannel {
    Red = 0,
    Green = 1,
    Blue = 2,
    Sun = 3,
}

impl LightChannel {
    pub const ALL: [LightChannel; 4] = [
        LightChannel::Red,
        LightChannel::Green,
        LightChannel::Blue,
        LightChannel::Sun,
    ];
    pub const RGB: [LightChannel; 3] = [LightChannel::Red, LightChannel::Green, LightChannel::Blue];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: u8) -> Result<LightChannel, LightError> {
        LightChannel::ALL
            .get(i as usize)
            .copied()
            .ok_or(LightError::InvalidChannel(i))
    }

    #[inline]
    pub fn is_sunlight(self) -> bool {
        self == LightChannel::Sun
    }

    #[inline]
    fn shift(self) -> u16 {
        (self as u16) * 4
    }
}

/// Four 4-bit channels packed R | G << 4 | B << 8 | Sun << 12.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PackedLight(pub u16);

impl PackedLight {
    pub const DARK: PackedLight = PackedLight(0);

    #[inline]
    pub fn get(self, ch: LightChannel) -> u8 {
        ((self.0 >> ch.shift()) & 0xF) as u8
    }

    /// Panics when `value > 15`.
    #[inline]
    pub fn with(self, ch: LightChannel, value: u8) -> Self {
        assert!(value <= MAX_LIGHT, "light value {value} exceeds {MAX_LIGHT}");
        let s = ch.shift();
        PackedLight((self.0 & !(0xF << s)) | (u16::from(value) << s))
    }

    #[inline]
    pub fn rgb(self) -> [u8; 3] {
        [
            self.get(LightChannel::Red),
            self.get(LightChannel::Green),
            self.get(LightChannel::Blue),
        ]
    }

    #[inline]
    pub fn max_channel(self) -> u8 {
        LightChannel::ALL.iter().map(|&c| self.get(c)).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_are_independent_nibbles() {
        let p = PackedLight::DARK
            .with(LightChannel::Red, 1)
            .with(LightChannel::Green, 2)
            .with(LightChannel::Blue, 3)
            .with(LightChannel::Sun, 15);
        assert_eq!(p.0, 0xF321);
        assert_eq!(p.rgb(), [1, 2, 3]);
        assert_eq!(p.with(LightChannel::Green, 0).get(LightChannel::Blue), 3);
        assert_eq!(p.max_channel(), 15);
    }

    #[test]
    fn invalid_channel_index() {
        assert_eq!(LightChannel::from_index(3), Ok(LightChannel::Sun));
        assert_eq!(LightChannel::from_index(4), Err(LightError::InvalidChannel(4)));
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn value_above_fifteen_panics() {
        let _ = PackedLight::DARK.with(LightChannel::Red, 16);
    }
}
