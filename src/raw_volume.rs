//! Flat in-memory volume over a finite region.

use crate::coord::VoxelPos;
use crate::error::VolumeError;
use crate::region::Region;
use crate::voxel::Voxel;

/// A dense array over a fixed region. `getVoxel`/`setVoxel` outside the
/// region fail with `OutOfBounds`; used for tests and small synthetic inputs.
#[derive(Clone, Debug)]
pub struct RawVolume<V> {
    region: Region,
    data: Vec<V>,
}

impl<V: Voxel + Default> RawVolume<V> {
    pub fn new(region: Region) -> Result<Self, VolumeError> {
        Self::filled(region, V::default())
    }
}

impl<V: Voxel> RawVolume<V> {
    pub fn filled(region: Region, value: V) -> Result<Self, VolumeError> {
        if !region.is_valid() {
            return Err(VolumeError::InvalidRegion {
                region,
                reason: "lower corner must not exceed upper corner on any axis".to_string(),
            });
        }
        let count = region.volume() as usize;
        Ok(RawVolume {
            region,
            data: vec![value; count],
        })
    }

    pub fn enclosing_region(&self) -> Region {
        self.region
    }

    #[inline]
    fn index_of(&self, x: i32, y: i32, z: i32) -> Option<usize> {
        let lower = self.region.lower();
        if !self.region.contains_point(VoxelPos::new(x, y, z), 0) {
            return None;
        }
        let width = self.region.width() as i64;
        let height = self.region.height() as i64;
        let local = (x - lower.x) as i64
            + (y - lower.y) as i64 * width
            + (z - lower.z) as i64 * width * height;
        Some(local as usize)
    }

    pub fn get_voxel(&self, x: i32, y: i32, z: i32) -> Result<V, VolumeError> {
        self.index_of(x, y, z)
            .map(|i| self.data[i])
            .ok_or_else(|| VolumeError::OutOfBounds {
                coord: VoxelPos::new(x, y, z),
                region: self.region,
            })
    }

    pub fn set_voxel(&mut self, x: i32, y: i32, z: i32, value: V) -> Result<(), VolumeError> {
        let region = self.region;
        match self.index_of(x, y, z) {
            Some(i) => {
                self.data[i] = value;
                Ok(())
            }
            None => Err(VolumeError::OutOfBounds {
                coord: VoxelPos::new(x, y, z),
                region,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_inside_region() {
        let mut v: RawVolume<u8> = RawVolume::new(Region::from_corners(0, 0, 0, 7, 7, 7)).unwrap();
        v.set_voxel(3, 4, 5, 42).unwrap();
        assert_eq!(v.get_voxel(3, 4, 5).unwrap(), 42);
    }

    #[test]
    fn out_of_bounds_access_fails() {
        let v: RawVolume<u8> = RawVolume::new(Region::from_corners(0, 0, 0, 7, 7, 7)).unwrap();
        assert!(matches!(v.get_voxel(8, 0, 0), Err(VolumeError::OutOfBounds { .. })));
        assert!(matches!(v.get_voxel(-1, 0, 0), Err(VolumeError::OutOfBounds { .. })));
    }

    #[test]
    fn round_trip_with_random_coordinates() {
        use rand::Rng;
        let region = Region::from_corners(-10, -10, -10, 10, 10, 10);
        let mut v: RawVolume<i32> = RawVolume::new(region).unwrap();
        let mut rng = rand::thread_rng();
        for _ in 0..2000 {
            let x = rng.gen_range(-10..=10);
            let y = rng.gen_range(-10..=10);
            let z = rng.gen_range(-10..=10);
            let value = rng.gen_range(-1000..1000);
            v.set_voxel(x, y, z, value).unwrap();
            assert_eq!(v.get_voxel(x, y, z).unwrap(), value);
        }
    }

    #[test]
    fn negative_region_addresses_correctly() {
        let region = Region::from_corners(-5, -5, -5, -1, -1, -1);
        let mut v: RawVolume<u8> = RawVolume::new(region).unwrap();
        v.set_voxel(-5, -5, -5, 1).unwrap();
        v.set_voxel(-1, -1, -1, 2).unwrap();
        assert_eq!(v.get_voxel(-5, -5, -5).unwrap(), 1);
        assert_eq!(v.get_voxel(-1, -1, -1).unwrap(), 2);
    }

    #[test]
    fn invalid_region_is_reported_not_panicked() {
        let inverted = Region::from_corners(5, 5, 5, 0, 0, 0);
        assert!(matches!(
            RawVolume::<u8>::new(inverted),
            Err(VolumeError::InvalidRegion { .. })
        ));
        assert!(matches!(
            RawVolume::filled(inverted, 9u8),
            Err(VolumeError::InvalidRegion { .. })
        ));
    }
}
