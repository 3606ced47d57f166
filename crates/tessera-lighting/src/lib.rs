//! Incremental flood-fill lighting over the voxel grid.
//!
//! Four channels propagate independently (red, green, blue, sun). Light
//! loses one level per step; sunlight moving straight down at full strength
//! does not attenuate. Opacity is decided by a [`FaceOpacity`] predicate so
//! the engine never hardcodes block types.
#![forbid(unsafe_code)]

use std::collections::VecDeque;

use hashbrown::HashSet;
use tessera_blocks::FaceOpacity;
use tessera_chunk::{LightChannel, MAX_LIGHT};
use tessera_geom::{ChunkCoord, ChunkSize, Face, LocalPos, VoxelPos};
use tessera_world::{ChunkRef, VoxelGrid};


/// Chunks whose light values changed during an operation, plus every loaded
/// chunk the flood stepped into across a boundary.
pub type AffectedChunks = HashSet<ChunkCoord>;

#[derive(Clone, Debug)]
struct LightNode {
    chunk: ChunkRef,
    local: LocalPos,
    global: VoxelPos,
}

/// Reusable flood-fill state. Queues keep their capacity between calls.
pub struct LightEngine<'g, O: FaceOpacity + ?Sized> {
    grid: &'g VoxelGrid,
    opacity: &'g O,
    add_queue: VecDeque<LightNode>,
    remove_queue: VecDeque<(LightNode, u8)>,
    written: usize,
}

impl<'g, O: FaceOpacity + ?Sized> LightEngine<'g, O> {
    pub fn new(grid: &'g VoxelGrid, opacity: &'g O) -> Self {
        Self {
            grid,
            opacity,
            add_queue: VecDeque::new(),
            remove_queue: VecDeque::new(),
            written: 0,
        }
    }

    pub fn grid(&self) -> &'g VoxelGrid {
        self.grid
    }

    fn node_at(&self, pos: VoxelPos) -> Option<LightNode> {
        let (coord, local) = self.grid.size().split(pos);
        self.grid.try_get_chunk(coord).map(|chunk| LightNode {
            chunk,
            local,
            global: pos,
        })
    }

    /// Sets `pos` to `intensity` on `channel` and floods outward.
    /// Does nothing when the owning chunk is not loaded.
    pub fn add_light(
        &mut self,
        pos: VoxelPos,
        channel: LightChannel,
        intensity: u8,
        affected: &mut AffectedChunks,
    ) {
        let Some(node) = self.node_at(pos) else {
            return;
        };
        self.written = 0;
        node.chunk.write().set_light(node.local, channel, intensity);
        affected.insert(node.chunk.coord());
        self.add_queue.push_back(node);
        self.expand(channel, affected);
        log::trace!(
            target: "lighting",
            "add {:?} {:?}={} wrote {} voxels",
            pos, channel, intensity, self.written
        );
    }

    /// Two-phase removal: strips light that depended on `pos`, then refills
    /// the gap from every independent source found on the frontier.
    pub fn remove_light(&mut self, pos: VoxelPos, channel: LightChannel, affected: &mut AffectedChunks) {
        let Some(node) = self.node_at(pos) else {
            return;
        };
        let level = {
            let mut c = node.chunk.write();
            let l = c.light(node.local, channel);
            c.set_light(node.local, channel, 0);
            l
        };
        if level == 0 {
            return;
        }
        self.written = 0;
        affected.insert(node.chunk.coord());
        self.remove_queue.push_back((node, level));
        self.strip(channel, affected);
        let stripped = self.written;
        let seeds = self.add_queue.len();
        self.expand(channel, affected);
        log::trace!(
            target: "lighting",
            "remove {:?} {:?} stripped {} voxels, relit {} from {} seeds",
            pos, channel, stripped, self.written - stripped, seeds
        );
    }

    /// Refills a voxel that just stopped being opaque from its lit neighbours,
    /// on every channel.
    pub fn update_on_removed_solid_voxel(&mut self, pos: VoxelPos, affected: &mut AffectedChunks) {
        let Some(center) = self.node_at(pos) else {
            return;
        };
        affected.insert(center.chunk.coord());
        for channel in LightChannel::ALL {
            if channel.is_sunlight() && self.open_to_sky(&center) {
                center.chunk.write().set_light(center.local, channel, MAX_LIGHT);
                self.add_queue.push_back(center.clone());
            }
            for face in Face::ALL {
                let Some((chunk, local)) = self.grid.step(&center.chunk, center.local, face) else {
                    continue;
                };
                affected.insert(chunk.coord());
                if chunk.read().light(local, channel) > 0 {
                    self.add_queue.push_back(LightNode {
                        chunk,
                        local,
                        global: pos.step(face),
                    });
                }
            }
            self.expand(channel, affected);
        }
    }

    /// Seeds full sunlight on the top layer of every listed chunk where the
    /// voxel is open from above, then floods.
    pub fn update_sunlight(&mut self, topmost: &[ChunkCoord], affected: &mut AffectedChunks) {
        let size = self.grid.size();
        let top = (size.edge() - 1) as u8;
        self.written = 0;
        for &coord in topmost {
            let Some(chunk) = self.grid.try_get_chunk(coord) else {
                continue;
            };
            {
                let mut c = chunk.write();
                for z in 0..size.edge() as u8 {
                    for x in 0..size.edge() as u8 {
                        let local = LocalPos::new(x, top, z);
                        let rotation = c.aux(local).rotation();
                        if self.opacity.is_face_opaque(c.voxel(local), Face::PosY, rotation) {
                            continue;
                        }
                        c.set_light(local, LightChannel::Sun, MAX_LIGHT);
                        self.add_queue.push_back(LightNode {
                            chunk: chunk.clone(),
                            local,
                            global: size.to_global(coord, local),
                        });
                    }
                }
            }
            affected.insert(coord);
            self.seed_column_below(coord);
        }
        let seeds = self.add_queue.len();
        self.expand(LightChannel::Sun, affected);
        log::trace!(
            target: "lighting",
            "sunlight over {} chunks: {} seeds, {} voxels written",
            topmost.len(), seeds, self.written
        );
    }

    /// Pulls coloured light into a freshly created (dark) chunk from the lit
    /// boundary voxels of its loaded face neighbours.
    pub fn propagate_surrounding_lights_on_new_chunk(
        &mut self,
        coord: ChunkCoord,
        affected: &mut AffectedChunks,
    ) {
        if !self.grid.chunk_exists(coord) {
            return;
        }
        let size = self.grid.size();
        for channel in LightChannel::RGB {
            for face in Face::ALL {
                let ncoord = coord.neighbor(face);
                let Some(neighbor) = self.grid.try_get_chunk(ncoord) else {
                    continue;
                };
                let c = neighbor.read();
                for local in boundary_layer(size, face.opposite()) {
                    if c.light(local, channel) > 0 {
                        self.add_queue.push_back(LightNode {
                            chunk: neighbor.clone(),
                            local,
                            global: size.to_global(ncoord, local),
                        });
                    }
                }
            }
            if !self.add_queue.is_empty() {
                log::trace!(
                    target: "lighting",
                    "new chunk {:?}: {} {:?} seeds",
                    coord, self.add_queue.len(), channel
                );
            }
            self.expand(channel, affected);
        }
    }

    /// Queues the sunlit bottom layer of every loaded chunk above another in
    /// the column under `top`. An already lit shaft never changes, so the
    /// flood from the top layer alone cannot reach a newly loaded chunk below.
    fn seed_column_below(&mut self, top: ChunkCoord) {
        let size = self.grid.size();
        let mut above = top;
        while let Some(chunk) = self.grid.try_get_chunk(above) {
            if !self.grid.chunk_exists(above.neighbor(Face::NegY)) {
                break;
            }
            let c = chunk.read();
            for local in boundary_layer(size, Face::NegY) {
                if c.light(local, LightChannel::Sun) > 0 {
                    self.add_queue.push_back(LightNode {
                        chunk: chunk.clone(),
                        local,
                        global: size.to_global(above, local),
                    });
                }
            }
            drop(c);
            above = above.neighbor(Face::NegY);
        }
    }

    /// Top layer of a chunk with nothing loaded above it, and open upward.
    fn open_to_sky(&self, node: &LightNode) -> bool {
        let size = self.grid.size();
        if !size.on_boundary(node.local, Face::PosY)
            || self.grid.chunk_exists(node.chunk.coord().neighbor(Face::PosY))
        {
            return false;
        }
        let c = node.chunk.read();
        !self
            .opacity
            .is_face_opaque(c.voxel(node.local), Face::PosY, c.aux(node.local).rotation())
    }

    fn expand(&mut self, channel: LightChannel, affected: &mut AffectedChunks) {
        let sun = channel.is_sunlight();
        while let Some(node) = self.add_queue.pop_front() {
            let level = node.chunk.read().light(node.local, channel);
            let spreads = level >= 2 || (sun && level == MAX_LIGHT);
            for face in Face::ALL {
                let Some((chunk, local)) = self.grid.step(&node.chunk, node.local, face) else {
                    continue;
                };
                // Chunks bordering a changed voxel are touched even when no
                // light enters them.
                if !chunk.same_chunk(&node.chunk) {
                    affected.insert(chunk.coord());
                }
                if !spreads {
                    continue;
                }
                let shaft = sun && face == Face::NegY && level == MAX_LIGHT;
                {
                    let mut c = chunk.write();
                    let rotation = c.aux(local).rotation();
                    if self.opacity.is_face_opaque(c.voxel(local), face.opposite(), rotation) {
                        continue;
                    }
                    let current = c.light(local, channel);
                    let value = if shaft {
                        if current >= MAX_LIGHT {
                            continue;
                        }
                        MAX_LIGHT
                    } else {
                        if current + 2 > level {
                            continue;
                        }
                        level - 1
                    };
                    c.set_light(local, channel, value);
                }
                self.written += 1;
                affected.insert(chunk.coord());
                self.add_queue.push_back(LightNode {
                    chunk,
                    local,
                    global: node.global.step(face),
                });
            }
        }
    }

    /// De-light phase. Lit neighbours dimmer than the removed node (and the
    /// sun shaft under a removed full-strength node) are zeroed and expanded;
    /// anything else lit becomes a re-light seed in `add_queue`.
    fn strip(&mut self, channel: LightChannel, affected: &mut AffectedChunks) {
        let sun = channel.is_sunlight();
        while let Some((node, level)) = self.remove_queue.pop_front() {
            for face in Face::ALL {
                let Some((chunk, local)) = self.grid.step(&node.chunk, node.local, face) else {
                    continue;
                };
                if !chunk.same_chunk(&node.chunk) {
                    affected.insert(chunk.coord());
                }
                let next = LightNode {
                    chunk,
                    local,
                    global: node.global.step(face),
                };
                let mut c = next.chunk.write();
                let current = c.light(local, channel);
                if current == 0 {
                    continue;
                }
                let rotation = c.aux(local).rotation();
                // Light never flows into a voxel through an opaque face, so a
                // lit voxel behind one is its own source.
                let open = !self.opacity.is_face_opaque(c.voxel(local), face.opposite(), rotation);
                let shaft = sun && face == Face::NegY && level == MAX_LIGHT;
                if open && (current < level || shaft) {
                    c.set_light(local, channel, 0);
                    drop(c);
                    self.written += 1;
                    affected.insert(next.chunk.coord());
                    self.remove_queue.push_back((next, current));
                } else {
                    drop(c);
                    self.add_queue.push_back(next);
                }
            }
        }
    }
}

/// Every local position on the chunk face `face`.
pub fn boundary_layer(size: ChunkSize, face: Face) -> impl Iterator<Item = LocalPos> {
    let edge = size.edge() as u8;
    let last = edge - 1;
    (0..edge).flat_map(move |a| {
        (0..edge).map(move |b| match face {
            Face::PosX => LocalPos::new(last, a, b),
            Face::NegX => LocalPos::new(0, a, b),
            Face::PosY => LocalPos::new(a, last, b),
            Face::NegY => LocalPos::new(a, 0, b),
            Face::PosZ => LocalPos::new(a, b, last),
            Face::NegZ => LocalPos::new(a, b, 0),
        })
    })
}
