//! Integer point type shared by Region, the volumes, and the sampler.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// A point in voxel space. Coordinates are always signed 32-bit, per the
/// volume's logical address space.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelPos {
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        VoxelPos { x, y, z }
    }
}

impl Add for VoxelPos {
    type Output = VoxelPos;
    #[inline]
    fn add(self, rhs: VoxelPos) -> VoxelPos {
        VoxelPos::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for VoxelPos {
    type Output = VoxelPos;
    #[inline]
    fn sub(self, rhs: VoxelPos) -> VoxelPos {
        VoxelPos::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl fmt::Display for VoxelPos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl From<(i32, i32, i32)> for VoxelPos {
    fn from(t: (i32, i32, i32)) -> Self {
        VoxelPos::new(t.0, t.1, t.2)
    }
}
