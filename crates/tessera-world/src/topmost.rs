use hashbrown::HashMap;
use tessera_geom::ChunkCoord;

/// Highest loaded chunk per (cx, cz) column, plus the columns whose sunlight
/// has not been seeded since they last changed.
#[derive(Debug, Default)]
pub(crate) struct TopmostColumns {
    tops: HashMap<(i32, i32), i32>,
    pending: HashMap<(i32, i32), ChunkCoord>,
}

impl TopmostColumns {
    pub(crate) fn note_created(&mut self, coord: ChunkCoord) {
        let top = self.tops.entry(coord.column()).or_insert(coord.cy);
        if coord.cy > *top {
            *top = coord.cy;
        }
        // A chunk appearing under the current top still needs the shaft
        // re-flooded from above, so the column top is queued either way.
        self.pending.insert(coord.column(), coord.with_y(*top));
    }

    pub(crate) fn note_removed(&mut self, coord: ChunkCoord, remaining_top: Option<i32>) {
        let column = coord.column();
        match remaining_top {
            Some(cy) => {
                self.tops.insert(column, cy);
                if let Some(p) = self.pending.get_mut(&column) {
                    *p = coord.with_y(cy);
                }
            }
            None => {
                self.tops.remove(&column);
                self.pending.remove(&column);
            }
        }
    }

    pub(crate) fn tops(&self) -> Vec<ChunkCoord> {
        let mut out: Vec<ChunkCoord> = self
            .tops
            .iter()
            .map(|(&(cx, cz), &cy)| ChunkCoord::new(cx, cy, cz))
            .collect();
        out.sort();
        out
    }

    pub(crate) fn pending(&self) -> Vec<ChunkCoord> {
        let mut out: Vec<ChunkCoord> = self.pending.values().copied().collect();
        out.sort();
        out
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub(crate) fn drain(&mut self) -> Vec<ChunkCoord> {
        let mut out: Vec<ChunkCoord> = self.pending.drain().map(|(_, c)| c).collect();
        out.sort();
        out
    }
}
