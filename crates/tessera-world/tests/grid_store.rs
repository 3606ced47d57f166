use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;
use tessera_blocks::{AIR, BlockRegistry};
use tessera_geom::{ChunkCoord, ChunkSize, VoxelPos};
use tessera_world::VoxelGrid;

fn grid(edge: usize) -> VoxelGrid {
    VoxelGrid::new(ChunkSize::new(edge), Arc::new(BlockRegistry::builtin()))
}

#[test]
fn concurrent_creation_creates_each_chunk_once() {
    let g = grid(8);
    let created = AtomicUsize::new(0);
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for cx in 0..4 {
                    for cz in 0..4 {
                        let (_, fresh) = g.ensure_chunk(ChunkCoord::new(cx, 0, cz));
                        if fresh {
                            created.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });
    assert_eq!(created.load(Ordering::Relaxed), 16);
    assert_eq!(g.chunk_count(), 16);
    assert_eq!(g.topmost_chunks_per_column().len(), 16);
}

#[test]
fn removed_chunk_reads_as_air() {
    let g = grid(16);
    let p = VoxelPos::new(3, 3, 3);
    assert!(g.set_voxel(p, 1, None, None, false));
    assert!(g.remove_chunk(ChunkCoord::new(0, 0, 0)));
    assert!(!g.remove_chunk(ChunkCoord::new(0, 0, 0)));
    assert_eq!(g.get_voxel(p), AIR);
}

fn plain_block() -> impl Strategy<Value = u16> {
    // stone, dirt, grass, glass, leaves
    prop::sample::select(vec![1u16, 2, 3, 5, 6])
}

proptest! {
    #[test]
    fn last_write_wins_across_chunks(
        writes in prop::collection::vec(((-20i32..20, -20i32..20, -20i32..20), plain_block()), 1..40)
    ) {
        let g = grid(8);
        let mut expected = HashMap::new();
        for ((x, y, z), id) in &writes {
            let p = VoxelPos::new(*x, *y, *z);
            prop_assert!(g.set_voxel(p, *id, None, None, false));
            expected.insert(p, *id);
        }
        for (p, id) in &expected {
            prop_assert_eq!(g.get_voxel(*p), *id);
        }
        let chunks: std::collections::HashSet<_> =
            expected.keys().map(|p| g.size().chunk_of(*p)).collect();
        prop_assert_eq!(g.chunk_count(), chunks.len());
    }
}
