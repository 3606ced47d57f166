use serde::{Deserialize, Serialize};

// face indices: 0=+Y,1=-Y,2=+X,3=-X,4=+Z,5=-Z
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Face {
    #[serde(alias = "up", alias = "top")]
    PosY = 0,
    #[serde(alias = "down", alias = "bottom")]
    NegY = 1,
    #[serde(alias = "east")]
    PosX = 2,
    #[serde(alias = "west")]
    NegX = 3,
    #[serde(alias = "south")]
    PosZ = 4,
    #[serde(alias = "north")]
    NegZ = 5,
}

/// Horizontal faces in clockwise order seen from above, starting at north.
const HORIZONTAL_CW: [Face; 4] = [Face::NegZ, Face::PosX, Face::PosZ, Face::NegX];

impl Face {
    pub const ALL: [Face; 6] = [
        Face::PosY,
        Face::NegY,
        Face::PosX,
        Face::NegX,
        Face::PosZ,
        Face::NegZ,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn from_index(i: usize) -> Option<Face> {
        Face::ALL.get(i).copied()
    }

    #[inline]
    pub fn bit(self) -> u8 {
        1 << self.index()
    }

    #[inline]
    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            Face::PosY => (0, 1, 0),
            Face::NegY => (0, -1, 0),
            Face::PosX => (1, 0, 0),
            Face::NegX => (-1, 0, 0),
            Face::PosZ => (0, 0, 1),
            Face::NegZ => (0, 0, -1),
        }
    }

    #[inline]
    pub fn opposite(self) -> Face {
        match self {
            Face::PosY => Face::NegY,
            Face::NegY => Face::PosY,
            Face::PosX => Face::NegX,
            Face::NegX => Face::PosX,
            Face::PosZ => Face::NegZ,
            Face::NegZ => Face::PosZ,
        }
    }

    #[inline]
    pub fn is_horizontal(self) -> bool {
        !matches!(self, Face::PosY | Face::NegY)
    }

    /// Rotates around +Y by `quarter_turns` clockwise (seen from above).
    /// Vertical faces are unchanged.
    pub fn rotate_y(self, quarter_turns: u8) -> Face {
        match HORIZONTAL_CW.iter().position(|f| *f == self) {
            Some(i) => HORIZONTAL_CW[(i + quarter_turns as usize) % 4],
            None => self,
        }
    }

    /// Quarter turns that rotate north onto this face. Vertical faces map to 0.
    pub fn yaw_turns(self) -> u8 {
        HORIZONTAL_CW
            .iter()
            .position(|f| *f == self)
            .map(|i| i as u8)
            .unwrap_or(0)
    }

    pub fn from_name(name: &str) -> Option<Face> {
        Some(match name {
            "posy" | "up" | "top" => Face::PosY,
            "negy" | "down" | "bottom" => Face::NegY,
            "posx" | "east" => Face::PosX,
            "negx" | "west" => Face::NegX,
            "posz" | "south" => Face::PosZ,
            "negz" | "north" => Face::NegZ,
            _ => return None,
        })
    }
}
