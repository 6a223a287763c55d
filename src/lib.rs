//! A paged voxel volume store plus a Marching Cubes surface extractor.
//!
//! The moving pieces, bottom-up: [`region`] is the axis-aligned box value
//! type everything else is expressed in terms of; [`voxel`] adapts an
//! application's per-cell payload to the (density, material) view the
//! extractor needs; [`pager`] is the collaborator a [`paged_volume`] calls
//! out to for block persistence; [`raw_volume`] is the finite dense
//! alternative used for small or synthetic inputs; [`sampler`] gives both
//! volume kinds a shared neighbour-access cursor; [`mesh`] is the output
//! container; [`marching_cubes`] ties it all together.

pub mod coord;
pub mod error;
pub mod marching_cubes;
mod mc_tables;
pub mod mesh;
pub mod paged_volume;
pub mod pager;
pub mod raw_volume;
pub mod region;
pub mod sampler;
pub mod voxel;

pub use coord::VoxelPos;
pub use error::VolumeError;
pub use marching_cubes::{extract_marching_cubes, extract_marching_cubes_into};
pub use mesh::{MarchingCubesVertex, Mesh, MeshIndex};
pub use paged_volume::PagedVolume;
pub use pager::{FilePager, NoOpPager, Pager};
pub use raw_volume::RawVolume;
pub use region::Region;
pub use sampler::{Sampler, Volume, WrapMode};
pub use voxel::{IdentityController, MaterialDensityPair88, MaterialDensityPairController, Voxel, VoxelController};
