//! External collaborator responsible for materializing and persisting blocks.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;

use crate::error::{PagerOperation, VolumeError};
use crate::region::Region;
use crate::voxel::Voxel;

/// Contract the volume calls to materialize or persist fixed-size cubic
/// blocks of voxels. `buffer`'s length is always `block_side^3` for both
/// methods.
pub trait Pager<V: Voxel> {
    fn page_in(&mut self, region: Region, buffer: &mut [V]) -> Result<(), VolumeError>;
    fn page_out(&mut self, region: Region, buffer: &[V]) -> Result<(), VolumeError>;
}

/// A pager that never touches persistent storage: page-in leaves the buffer
/// at whatever `V::default()`-equivalent the volume pre-filled it with, and
/// page-out discards its input. This is how "empty" in-memory-only volumes
/// work.
#[derive(Default, Clone, Copy, Debug)]
pub struct NoOpPager;

impl<V: Voxel> Pager<V> for NoOpPager {
    fn page_in(&mut self, _region: Region, _buffer: &mut [V]) -> Result<(), VolumeError> {
        Ok(())
    }
    fn page_out(&mut self, _region: Region, _buffer: &[V]) -> Result<(), VolumeError> {
        Ok(())
    }
}

/// Reference pager: one file per block in a caller-supplied directory.
///
/// Files are fixed-size raw dumps of `block_side^3` voxels in the host's
/// native byte order, named from the block region's lower corner. There is
/// no format versioning; this is not meant to be a stable interchange format,
/// only a working persistence backend.
pub struct FilePager {
    directory: PathBuf,
}

impl FilePager {
    /// Fails if `directory` doesn't exist — creating directories implicitly is
    /// the caller's job, not the pager's.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, VolumeError> {
        let directory = directory.into();
        if !directory.is_dir() {
            return Err(VolumeError::PagerFailure {
                operation: PagerOperation::PageIn,
                region: Region::MAX,
                cause: Box::new(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("pager directory {} does not exist", directory.display()),
                )),
            });
        }
        Ok(FilePager { directory })
    }

    fn path_for(&self, region: Region) -> PathBuf {
        let lower = region.lower();
        let upper = region.upper();
        self.directory.join(format!(
            "blockdata_{}_{}_{}_{}_{}_{}.tmp",
            lower.x, lower.y, lower.z, upper.x, upper.y, upper.z
        ))
    }

    fn io_fail(operation: PagerOperation, region: Region, cause: io::Error) -> VolumeError {
        VolumeError::PagerFailure {
            operation,
            region,
            cause: Box::new(cause),
        }
    }
}

/// Reinterprets a `&[V]`/`&mut [V]` as raw bytes for the fixed-size dump. Safe
/// because `V: Voxel` bounds it to `Copy + 'static`-shaped plain data and we
/// never read past the slice's own length.
unsafe fn as_bytes<V>(slice: &[V]) -> &[u8] {
    std::slice::from_raw_parts(slice.as_ptr() as *const u8, std::mem::size_of_val(slice))
}
unsafe fn as_bytes_mut<V>(slice: &mut [V]) -> &mut [u8] {
    std::slice::from_raw_parts_mut(slice.as_mut_ptr() as *mut u8, std::mem::size_of_val(slice))
}

impl<V: Voxel> Pager<V> for FilePager {
    fn page_in(&mut self, region: Region, buffer: &mut [V]) -> Result<(), VolumeError> {
        let path = self.path_for(region);
        if !path.exists() {
            // Never paged in before; leave the caller's default-filled buffer alone.
            log::trace!("pager: no file for block at {path:?}, treating as empty");
            return Ok(());
        }
        let mut file = File::open(&path).map_err(|e| Self::io_fail(PagerOperation::PageIn, region, e))?;
        let bytes = unsafe { as_bytes_mut(buffer) };
        file.read_exact(bytes)
            .map_err(|e| Self::io_fail(PagerOperation::PageIn, region, e))?;
        Ok(())
    }

    fn page_out(&mut self, region: Region, buffer: &[V]) -> Result<(), VolumeError> {
        let path = self.path_for(region);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Self::io_fail(PagerOperation::PageOut, region, e))?;
        let bytes = unsafe { as_bytes(buffer) };
        file.write_all(bytes)
            .map_err(|e| Self::io_fail(PagerOperation::PageOut, region, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::VoxelPos;

    #[test]
    fn no_op_pager_leaves_buffer_untouched() {
        let mut pager = NoOpPager;
        let mut buf = [7u8; 8];
        pager.page_in(Region::from_corners(0, 0, 0, 1, 1, 1), &mut buf).unwrap();
        assert_eq!(buf, [7u8; 8]);
    }

    #[test]
    fn file_pager_round_trips_a_block() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = FilePager::new(dir.path()).unwrap();
        let region = Region::new(VoxelPos::new(0, 0, 0), VoxelPos::new(1, 1, 1));
        let written: Vec<u8> = (0..8).collect();
        pager.page_out(region, &written).unwrap();

        let mut read_back = vec![0u8; 8];
        pager.page_in(region, &mut read_back).unwrap();
        assert_eq!(read_back, written);
    }

    #[test]
    fn file_pager_missing_file_leaves_buffer_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = FilePager::new(dir.path()).unwrap();
        let region = Region::new(VoxelPos::new(5, 5, 5), VoxelPos::new(6, 6, 6));
        let mut buf = [9u8; 4];
        pager.page_in(region, &mut buf).unwrap();
        assert_eq!(buf, [9u8; 4]);
    }

    #[test]
    fn file_pager_rejects_missing_directory() {
        let err = FilePager::new("/nonexistent/path/does/not/exist");
        assert!(err.is_err());
    }
}
