//! Per-voxel auxiliary data packed into 16 bits.
//!
//! The layout is a fixed ordered list of `(field, bits)`; offsets are the
//! running sum of the widths before each field, evaluated at compile time.

use tessera_geom::Face;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuxField {
    pub name: &'static str,
    pub bits: u32,
}

/// Field selector; the discriminant indexes [`AUX_LAYOUT`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuxKey {
    /// Face the block was oriented toward, stored as `face index + 1` (0 = none).
    Facing = 0,
    /// Quarter turns around +Y applied to the block's opaque faces.
    Rotation = 1,
}

pub const AUX_LAYOUT: [AuxField; 2] = [
    AuxField {
        name: "facing",
        bits: 3,
    },
    AuxField {
        name: "rotation",
        bits: 2,
    },
];

const fn field_offset(i: usize) -> u32 {
    let mut off = 0;
    let mut k = 0;
    while k < i {
        off += AUX_LAYOUT[k].bits;
        k += 1;
    }
    off
}

const OFFSETS: [u32; AUX_LAYOUT.len()] = {
    let mut out = [0u32; AUX_LAYOUT.len()];
    let mut i = 0;
    while i < AUX_LAYOUT.len() {
        out[i] = field_offset(i);
        i += 1;
    }
    out
};

const _: () = assert!(field_offset(AUX_LAYOUT.len()) <= 16, "aux layout exceeds 16 bits");

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AuxData(pub u16);

impl AuxData {
    pub const EMPTY: AuxData = AuxData(0);

    #[inline]
    fn mask(key: AuxKey) -> u16 {
        ((1u32 << AUX_LAYOUT[key as usize].bits) - 1) as u16
    }

    #[inline]
    pub fn get(self, key: AuxKey) -> u16 {
        (self.0 >> OFFSETS[key as usize]) & Self::mask(key)
    }

    /// Panics if `value` does not fit the field width.
    #[inline]
    pub fn with(self, key: AuxKey, value: u16) -> Self {
        let mask = Self::mask(key);
        assert!(
            value <= mask,
            "aux field {} overflow: {value} > {mask}",
            AUX_LAYOUT[key as usize].name
        );
        let off = OFFSETS[key as usize];
        AuxData((self.0 & !(mask << off)) | (value << off))
    }

    pub fn facing(self) -> Option<Face> {
        match self.get(AuxKey::Facing) {
            0 => None,
            v => Some(
                Face::from_index(usize::from(v - 1))
                    .unwrap_or_else(|| panic!("corrupt facing in aux data: {v}")),
            ),
        }
    }

    pub fn with_facing(self, face: Option<Face>) -> Self {
        let v = face.map(|f| f.index() as u16 + 1).unwrap_or(0);
        self.with(AuxKey::Facing, v)
    }

    #[inline]
    pub fn rotation(self) -> u8 {
        self.get(AuxKey::Rotation) as u8
    }

    pub fn with_rotation(self, quarter_turns: u8) -> Self {
        self.with(AuxKey::Rotation, u16::from(quarter_turns % 4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_running_sums() {
        assert_eq!(OFFSETS, [0, 3]);
    }

    #[test]
    fn fields_do_not_clobber_each_other() {
        let a = AuxData::EMPTY
            .with_facing(Some(Face::NegX))
            .with_rotation(3);
        assert_eq!(a.facing(), Some(Face::NegX));
        assert_eq!(a.rotation(), 3);
        let b = a.with_facing(None);
        assert_eq!(b.facing(), None);
        assert_eq!(b.rotation(), 3);
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn overflow_is_rejected() {
        let _ = AuxData::EMPTY.with(AuxKey::Rotation, 4);
    }
}
