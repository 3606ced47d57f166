//! Coordinate types shared by the engine crates (voxel, chunk, local, faces).
#![forbid(unsafe_code)]

use core::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

mod face;

pub use face::Face;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn dot(self, rhs: Vec3) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    #[inline]
    pub fn distance(self, other: Vec3) -> f32 {
        (self - other).length()
    }

    #[inline]
    pub fn scale(self, s: f32) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    #[inline]
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    #[inline]
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// A single voxel in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelPos {
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    #[inline]
    pub fn step(self, face: Face) -> Self {
        let (dx, dy, dz) = face.offset();
        self.offset(dx, dy, dz)
    }
}

impl From<(i32, i32, i32)> for VoxelPos {
    fn from(value: (i32, i32, i32)) -> Self {
        Self::new(value.0, value.1, value.2)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub cx: i32,
    pub cy: i32,
    pub cz: i32,
}

impl ChunkCoord {
    #[inline]
    pub const fn new(cx: i32, cy: i32, cz: i32) -> Self {
        Self { cx, cy, cz }
    }

    #[inline]
    pub fn with_y(self, cy: i32) -> Self {
        Self { cy, ..self }
    }

    #[inline]
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            cx: self.cx + dx,
            cy: self.cy + dy,
            cz: self.cz + dz,
        }
    }

    #[inline]
    pub fn neighbor(self, face: Face) -> Self {
        let (dx, dy, dz) = face.offset();
        self.offset(dx, dy, dz)
    }

    /// Column key used by the topmost-chunk tracking.
    #[inline]
    pub fn column(self) -> (i32, i32) {
        (self.cx, self.cz)
    }

    #[inline]
    pub fn distance_sq(self, other: ChunkCoord) -> i64 {
        let dx = i64::from(self.cx - other.cx);
        let dy = i64::from(self.cy - other.cy);
        let dz = i64::from(self.cz - other.cz);
        dx * dx + dy * dy + dz * dz
    }

    /// Chunk center in chunk units, e.g. (0,0,0) -> (0.5,0.5,0.5).
    #[inline]
    pub fn center(self) -> Vec3 {
        Vec3::new(
            self.cx as f32 + 0.5,
            self.cy as f32 + 0.5,
            self.cz as f32 + 0.5,
        )
    }
}

impl From<(i32, i32, i32)> for ChunkCoord {
    fn from(value: (i32, i32, i32)) -> Self {
        Self::new(value.0, value.1, value.2)
    }
}

impl From<ChunkCoord> for (i32, i32, i32) {
    fn from(value: ChunkCoord) -> Self {
        (value.cx, value.cy, value.cz)
    }
}

/// Coordinate inside a chunk, each component in `[0, size)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalPos {
    pub x: u8,
    pub y: u8,
    pub z: u8,
}

impl LocalPos {
    #[inline]
    pub const fn new(x: u8, y: u8, z: u8) -> Self {
        Self { x, y, z }
    }
}

/// Power-of-two chunk edge length with shift/mask conversions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkSize {
    shift: u32,
}

impl ChunkSize {
    pub const MAX_EDGE: usize = 128;

    /// Panics if `edge` is not a power of two in `2..=128`.
    pub fn new(edge: usize) -> Self {
        assert!(
            edge.is_power_of_two() && (2..=Self::MAX_EDGE).contains(&edge),
            "chunk edge must be a power of two in 2..={}, got {edge}",
            Self::MAX_EDGE
        );
        Self {
            shift: edge.trailing_zeros(),
        }
    }

    #[inline]
    pub const fn edge(self) -> usize {
        1 << self.shift
    }

    #[inline]
    pub const fn volume(self) -> usize {
        1 << (self.shift * 3)
    }

    #[inline]
    const fn mask(self) -> i32 {
        (1 << self.shift) - 1
    }

    #[inline]
    pub fn chunk_of(self, pos: VoxelPos) -> ChunkCoord {
        // Arithmetic shift floors for negatives.
        ChunkCoord::new(pos.x >> self.shift, pos.y >> self.shift, pos.z >> self.shift)
    }

    #[inline]
    pub fn local_of(self, pos: VoxelPos) -> LocalPos {
        let m = self.mask();
        LocalPos::new((pos.x & m) as u8, (pos.y & m) as u8, (pos.z & m) as u8)
    }

    #[inline]
    pub fn split(self, pos: VoxelPos) -> (ChunkCoord, LocalPos) {
        (self.chunk_of(pos), self.local_of(pos))
    }

    #[inline]
    pub fn origin(self, chunk: ChunkCoord) -> VoxelPos {
        VoxelPos::new(
            chunk.cx << self.shift,
            chunk.cy << self.shift,
            chunk.cz << self.shift,
        )
    }

    #[inline]
    pub fn to_global(self, chunk: ChunkCoord, local: LocalPos) -> VoxelPos {
        self.origin(chunk)
            .offset(i32::from(local.x), i32::from(local.y), i32::from(local.z))
    }

    /// Linear index, y-major then z then x (matches chunk storage).
    #[inline]
    pub fn index(self, local: LocalPos) -> usize {
        let s = self.shift;
        ((local.y as usize) << (2 * s)) | ((local.z as usize) << s) | local.x as usize
    }

    #[inline]
    pub fn local_from_index(self, idx: usize) -> LocalPos {
        let m = self.edge() - 1;
        let s = self.shift;
        LocalPos::new(
            (idx & m) as u8,
            ((idx >> (2 * s)) & m) as u8,
            ((idx >> s) & m) as u8,
        )
    }

    /// Steps `local` one voxel toward `face`. Returns the new local position and
    /// whether the step wrapped into the neighbouring chunk.
    #[inline]
    pub fn step_local(self, local: LocalPos, face: Face) -> (LocalPos, bool) {
        let (dx, dy, dz) = face.offset();
        let m = self.mask();
        let nx = i32::from(local.x) + dx;
        let ny = i32::from(local.y) + dy;
        let nz = i32::from(local.z) + dz;
        let crossed = (nx | ny | nz) < 0 || nx > m || ny > m || nz > m;
        (LocalPos::new((nx & m) as u8, (ny & m) as u8, (nz & m) as u8), crossed)
    }

    /// True when `local` touches the chunk face `face`.
    #[inline]
    pub fn on_boundary(self, local: LocalPos, face: Face) -> bool {
        let last = (self.edge() - 1) as u8;
        match face {
            Face::PosX => local.x == last,
            Face::NegX => local.x == 0,
            Face::PosY => local.y == last,
            Face::NegY => local.y == 0,
            Face::PosZ => local.z == last,
            Face::NegZ => local.z == 0,
        }
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn negative_coordinates_floor() {
        let size = ChunkSize::new(16);
        let (c, l) = size.split(VoxelPos::new(-1, -16, -17));
        assert_eq!(c, ChunkCoord::new(-1, -1, -2));
        assert_eq!(l, LocalPos::new(15, 0, 15));
        assert_eq!(size.to_global(c, l), VoxelPos::new(-1, -16, -17));
    }

    #[test]
    fn step_local_wraps_only_at_edges() {
        let size = ChunkSize::new(8);
        let (l, crossed) = size.step_local(LocalPos::new(3, 3, 3), Face::PosX);
        assert_eq!(l, LocalPos::new(4, 3, 3));
        assert!(!crossed);
        let (l, crossed) = size.step_local(LocalPos::new(7, 0, 0), Face::PosX);
        assert_eq!(l, LocalPos::new(0, 0, 0));
        assert!(crossed);
        let (l, crossed) = size.step_local(LocalPos::new(0, 0, 0), Face::NegY);
        assert_eq!(l, LocalPos::new(0, 7, 0));
        assert!(crossed);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_non_power_of_two() {
        let _ = ChunkSize::new(12);
    }

    /// Arbitrary floats include NaN and infinities; keep them finite and
    /// small enough that squaring cannot overflow.
    fn tame(v: Vec3) -> Vec3 {
        let t = |f: f32| if f.is_finite() { f.clamp(-1.0e6, 1.0e6) } else { 0.0 };
        Vec3::new(t(v.x), t(v.y), t(v.z))
    }

    proptest! {
        #[test]
        fn distance_is_symmetric_and_zero_to_self(a in any::<Vec3>(), b in any::<Vec3>()) {
            let (a, b) = (tame(a), tame(b));
            prop_assert_eq!(a.distance(b), b.distance(a));
            prop_assert_eq!(a.distance(a), 0.0);
            prop_assert!(a.distance(b) >= 0.0);
        }

        #[test]
        fn doubling_matches_adding_to_itself(v in any::<Vec3>()) {
            let v = tame(v);
            prop_assert_eq!(v.scale(2.0), v + v);
        }
    }
}
