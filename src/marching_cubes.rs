//! Slice-by-slice Marching Cubes surface extraction.

use num::ToPrimitive;

use crate::error::VolumeError;
use crate::mc_tables::{EDGE_TABLE, TRI_TABLE};
use crate::mesh::{MarchingCubesVertex, Mesh, MeshIndex};
use crate::region::Region;
use crate::sampler::{Sampler, Volume, WrapMode};
use crate::voxel::{Voxel, VoxelController};

/// Corner offsets for v0..v7, in the bit-ordering convention `1<<i`: bit0↦v000,
/// bit1↦v100, bit2↦v110, bit3↦v010, bit4↦v001, bit5↦v101, bit6↦v111, bit7↦v011.
const CORNER_OFFSETS: [(i32, i32, i32); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (1, 1, 0),
    (0, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (1, 1, 1),
    (0, 1, 1),
];

/// Per-grid-point vertex slots for one Z level of the sweep. `edge_x`/`edge_y`
/// hold the vertex created for the +X/+Y edge owned by this grid point at
/// this Z level (edges 0 and 3 of whichever cell has this point as its own
/// corner v0); `edge_z` holds the vertical edge (edge 8) running from this
/// point up to the same point one Z level higher.
///
/// A cell never creates a vertex itself: every edge it touches was already
/// built, by exactly one grid point, when that point's plane was populated.
/// Plane `z` is always fully populated before any cell at Z level `z` is
/// visited, so ownership is enforced by construction instead of by a
/// first-visitor-wins race.
struct Plane<I> {
    width: usize,
    edge_x: Vec<Option<I>>,
    edge_y: Vec<Option<I>>,
    edge_z: Vec<Option<I>>,
}

impl<I: Copy> Plane<I> {
    #[inline]
    fn index(&self, gx: i32, gy: i32) -> usize {
        gy as usize * self.width + gx as usize
    }
}

/// Central-difference density gradient at `origin + offset`, negated so it
/// points away from the solid interior (the outward surface normal).
fn gradient<V, C, Vol>(
    sampler: &mut Sampler<'_, V, Vol>,
    controller: &C,
    offset: (i32, i32, i32),
) -> Result<[f32; 3], VolumeError>
where
    V: Voxel,
    C: VoxelController<V>,
    C::Density: ToPrimitive,
    Vol: Volume<V>,
{
    let (ox, oy, oz) = offset;
    let d = |dx: i32, dy: i32, dz: i32| -> Result<f64, VolumeError> {
        let voxel = sampler.peek(ox + dx, oy + dy, oz + dz)?;
        Ok(controller.density(voxel).to_f64().unwrap_or(0.0))
    };
    let gx = d(1, 0, 0)? - d(-1, 0, 0)?;
    let gy = d(0, 1, 0)? - d(0, -1, 0)?;
    let gz = d(0, 0, 1)? - d(0, 0, -1)?;
    let n = [-(gx as f32) * 0.5, -(gy as f32) * 0.5, -(gz as f32) * 0.5];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len > f32::EPSILON {
        Ok([n[0] / len, n[1] / len, n[2] / len])
    } else {
        Ok([0.0, 0.0, 0.0])
    }
}

/// Builds one vertex for the edge from `origin` to `origin + axis`, if the
/// density crosses `threshold` between those two endpoints. `sampler`'s
/// position is left at `origin` on return.
#[allow(clippy::too_many_arguments)]
fn edge_vertex<V, C, Vol, I>(
    sampler: &mut Sampler<'_, V, Vol>,
    controller: &C,
    mesh: &mut Mesh<MarchingCubesVertex<C::Material>, I>,
    origin: (i32, i32, i32),
    axis: (i32, i32, i32),
    threshold: C::Density,
) -> Result<Option<I>, VolumeError>
where
    V: Voxel,
    C: VoxelController<V>,
    C::Density: ToPrimitive,
    Vol: Volume<V>,
    I: MeshIndex,
{
    sampler.set_position(origin.0, origin.1, origin.2);
    let va = sampler.peek(0, 0, 0)?;
    let vb = sampler.peek(axis.0, axis.1, axis.2)?;
    let da = controller.density(va);
    let db = controller.density(vb);
    if (da < threshold) == (db < threshold) {
        return Ok(None);
    }

    let da64 = da.to_f64().unwrap_or(0.0);
    let db64 = db.to_f64().unwrap_or(0.0);
    let t = threshold.to_f64().unwrap_or(0.0);
    let u = if (db64 - da64).abs() < f64::EPSILON {
        0.5
    } else {
        ((t - da64) / (db64 - da64)).clamp(0.0, 1.0)
    } as f32;

    let pa = [origin.0 as f32, origin.1 as f32, origin.2 as f32];
    let pb = [
        (origin.0 + axis.0) as f32,
        (origin.1 + axis.1) as f32,
        (origin.2 + axis.2) as f32,
    ];
    let position = [
        pa[0] + (pb[0] - pa[0]) * u,
        pa[1] + (pb[1] - pa[1]) * u,
        pa[2] + (pb[2] - pa[2]) * u,
    ];

    let na = gradient(sampler, controller, (0, 0, 0))?;
    let nb = gradient(sampler, controller, axis)?;
    let normal = [
        na[0] + (nb[0] - na[0]) * u,
        na[1] + (nb[1] - na[1]) * u,
        na[2] + (nb[2] - na[2]) * u,
    ];

    let material = controller.blend_materials(controller.material(va), controller.material(vb), u);
    let idx = mesh.add_vertex(MarchingCubesVertex { position, normal, material })?;
    Ok(Some(idx))
}

/// Populates every owned edge (+X, +Y, +Z) for every grid point in a
/// `(num_cells_x+1) x (num_cells_y+1)` plane at Z level `z`. Run in full
/// before any cell at this Z level is triangulated, so lookups from a
/// neighbouring cell — even one that would otherwise be visited "later" in
/// the x/y sweep — always find an already-built vertex.
fn build_plane<V, C, Vol, I>(
    sampler: &mut Sampler<'_, V, Vol>,
    controller: &C,
    mesh: &mut Mesh<MarchingCubesVertex<C::Material>, I>,
    lower: (i32, i32, i32),
    z: i32,
    num_cells_x: i32,
    num_cells_y: i32,
    threshold: C::Density,
) -> Result<Plane<I>, VolumeError>
where
    V: Voxel,
    C: VoxelController<V>,
    C::Density: ToPrimitive,
    Vol: Volume<V>,
    I: MeshIndex,
{
    let width = (num_cells_x + 1) as usize;
    let height = (num_cells_y + 1) as usize;
    let mut edge_x = vec![None; width * height];
    let mut edge_y = vec![None; width * height];
    let mut edge_z = vec![None; width * height];

    for gy in 0..=num_cells_y {
        for gx in 0..=num_cells_x {
            let origin = (lower.0 + gx, lower.1 + gy, z);
            let i = gy as usize * width + gx as usize;
            if gx < num_cells_x {
                edge_x[i] = edge_vertex(sampler, controller, mesh, origin, (1, 0, 0), threshold)?;
            }
            if gy < num_cells_y {
                edge_y[i] = edge_vertex(sampler, controller, mesh, origin, (0, 1, 0), threshold)?;
            }
            edge_z[i] = edge_vertex(sampler, controller, mesh, origin, (0, 0, 1), threshold)?;
        }
    }

    Ok(Plane { width, edge_x, edge_y, edge_z })
}

/// Runs Marching Cubes over `region` of `volume`, returning a freshly
/// allocated mesh. See `extract_marching_cubes_into` for the fallible-mesh
/// variant reused across calls.
pub fn extract_marching_cubes<V, C, Vol, I>(
    volume: &mut Vol,
    region: Region,
    controller: &C,
) -> Result<Mesh<MarchingCubesVertex<C::Material>, I>, VolumeError>
where
    V: Voxel + Default,
    C: VoxelController<V>,
    C::Density: ToPrimitive,
    Vol: Volume<V>,
    I: MeshIndex,
{
    let mut mesh = Mesh::new();
    extract_marching_cubes_into(volume, region, controller, &mut mesh)?;
    Ok(mesh)
}

/// Runs Marching Cubes over `region` of `volume`, appending into `mesh`
/// (cleared first).
///
/// Vertices are created one Z-level plane at a time: edges 0, 3 and 8 of a
/// cell are *owned* by the cell's own corner (its v0), and every owned edge
/// in a plane is built before any cell in that plane is triangulated. A
/// cell's other nine edges are always owned by a cell already swept — the
/// one below it, to one side of it, or both — so triangulation only ever
/// looks a vertex up, never creates one. This is what makes repeated
/// extraction of the same inputs byte-identical, vertex index for vertex
/// index, not just triangle-for-triangle.
pub fn extract_marching_cubes_into<V, C, Vol, I>(
    volume: &mut Vol,
    region: Region,
    controller: &C,
    mesh: &mut Mesh<MarchingCubesVertex<C::Material>, I>,
) -> Result<(), VolumeError>
where
    V: Voxel + Default,
    C: VoxelController<V>,
    C::Density: ToPrimitive,
    Vol: Volume<V>,
    I: MeshIndex,
{
    if !region.is_valid() {
        return Err(VolumeError::ExtractorPrecondition {
            detail: "region is not valid".to_string(),
        });
    }
    mesh.clear();

    let lower = region.lower();
    let upper = region.upper();
    let num_cells_x = upper.x - lower.x;
    let num_cells_y = upper.y - lower.y;
    let num_cells_z = upper.z - lower.z;
    if num_cells_x <= 0 || num_cells_y <= 0 || num_cells_z <= 0 {
        return Ok(());
    }

    let threshold = controller.threshold();
    let origin = (lower.x, lower.y, lower.z);
    let mut sampler = Sampler::new(volume, WrapMode::Border(V::default()));

    // A failure partway through (mesh index overflow, a pager error surfacing
    // through a peek) must discard the partial mesh rather than leave it
    // half-built, so the fallible sweep runs in its own closure and `mesh` is
    // only cleared again, not touched, on the success path.
    let result: Result<(), VolumeError> = (|| {
        let mut bottom = build_plane(&mut sampler, controller, mesh, origin, lower.z, num_cells_x, num_cells_y, threshold)?;

        for z in 0..num_cells_z {
            let top = build_plane(
                &mut sampler,
                controller,
                mesh,
                origin,
                lower.z + z + 1,
                num_cells_x,
                num_cells_y,
                threshold,
            )?;

            for y in 0..num_cells_y {
                for x in 0..num_cells_x {
                    let cell_origin = (lower.x + x, lower.y + y, lower.z + z);
                    sampler.set_position(cell_origin.0, cell_origin.1, cell_origin.2);

                    let mut voxels = [V::default(); 8];
                    for (i, (ox, oy, oz)) in CORNER_OFFSETS.iter().enumerate() {
                        voxels[i] = sampler.peek(*ox, *oy, *oz)?;
                    }
                    let mut cube_index: usize = 0;
                    for (i, voxel) in voxels.iter().enumerate() {
                        if controller.density(*voxel) < threshold {
                            cube_index |= 1 << i;
                        }
                    }

                    let edge_bits = EDGE_TABLE[cube_index];
                    if edge_bits == 0 {
                        continue;
                    }

                    let bi = |gx: i32, gy: i32| bottom.index(gx, gy);
                    let ti = |gx: i32, gy: i32| top.index(gx, gy);
                    let resolved: [Option<I>; 12] = [
                        bottom.edge_x[bi(x, y)],
                        bottom.edge_y[bi(x + 1, y)],
                        bottom.edge_x[bi(x, y + 1)],
                        bottom.edge_y[bi(x, y)],
                        top.edge_x[ti(x, y)],
                        top.edge_y[ti(x + 1, y)],
                        top.edge_x[ti(x, y + 1)],
                        top.edge_y[ti(x, y)],
                        bottom.edge_z[bi(x, y)],
                        bottom.edge_z[bi(x + 1, y)],
                        bottom.edge_z[bi(x + 1, y + 1)],
                        bottom.edge_z[bi(x, y + 1)],
                    ];

                    let triangles = &TRI_TABLE[cube_index];
                    let mut t = 0;
                    while t + 2 < triangles.len() && triangles[t] >= 0 {
                        let i0 = resolved[triangles[t] as usize].expect("edge_table/tri_table disagree");
                        let i1 = resolved[triangles[t + 1] as usize].expect("edge_table/tri_table disagree");
                        let i2 = resolved[triangles[t + 2] as usize].expect("edge_table/tri_table disagree");
                        mesh.add_triangle(i0, i1, i2);
                        t += 3;
                    }
                }
            }

            bottom = top;
        }
        Ok(())
    })();

    if result.is_err() {
        mesh.clear();
    }
    result
}
