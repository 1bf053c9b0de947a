use log::debug;

use crate::errors::{BoxError, MediaDemuxResult};
use crate::mp4::data::BoxData;
use crate::mp4::fourcc;
use crate::mp4::tree::{BoxArena, NodeId};

/// Flat per-track time to byte-offset table used by seeking over fragmented
/// streams. Entries are offset-ascending; immutable once built.
#[derive(Debug, Clone)]
pub struct FragmentIndex {
    track_count: usize,
    /// Row-major `entry_count x track_count` start-time matrix.
    times: Vec<u64>,
    offsets: Vec<u64>,
    last_time: u64,
}

impl FragmentIndex {
    /// Allocate an empty index with bounds-checked dimensions.
    pub fn new(track_count: usize, entry_count: usize) -> MediaDemuxResult<Self> {
        let cells = entry_count
            .checked_mul(track_count)
            .ok_or_else(|| BoxError::malformed_size("fragment index dimensions overflow"))?;
        Ok(Self {
            track_count,
            times: vec![0; cells],
            offsets: vec![0; entry_count],
            last_time: 0,
        })
    }

    /// Build the index from a parsed random-access container. `track_ids`
    /// fixes the column order; tracks without a matching per-track table
    /// keep zero times. Rows are the distinct fragment offsets seen across
    /// all per-track tables, ascending; a track's time is carried forward
    /// over rows where it has no entry of its own.
    pub fn from_mfra(
        arena: &BoxArena,
        mfra: NodeId,
        track_ids: &[u32],
    ) -> MediaDemuxResult<Self> {
        let tables: Vec<&BoxData> = arena
            .children(mfra)
            .filter(|&id| arena.node(id).box_type == fourcc::TFRA)
            .map(|id| &arena.node(id).data)
            .collect();

        let mut offsets: Vec<u64> = Vec::new();
        for data in &tables {
            if let BoxData::Tfra(t) = data {
                offsets.extend(t.entries.iter().map(|e| e.moof_offset));
            }
        }
        offsets.sort_unstable();
        offsets.dedup();

        let mut index = Self::new(track_ids.len(), offsets.len())?;
        index.offsets = offsets;

        let mut last_time = 0u64;
        for data in &tables {
            let tfra = match data {
                BoxData::Tfra(t) => t,
                _ => continue,
            };
            let column = match track_ids.iter().position(|&id| id == tfra.track_id) {
                Some(c) => c,
                None => {
                    debug!(
                        "random access table for unknown track {} ignored",
                        tfra.track_id
                    );
                    continue;
                }
            };
            let mut time = 0u64;
            let mut next = tfra.entries.iter().peekable();
            for (row, &offset) in index.offsets.iter().enumerate() {
                while let Some(e) = next.peek() {
                    if e.moof_offset > offset {
                        break;
                    }
                    time = e.time;
                    next.next();
                }
                index.times[row * index.track_count + column] = time;
            }
            if let Some(e) = tfra.entries.last() {
                last_time = last_time.max(e.time);
            }
        }
        index.last_time = last_time;
        Ok(index)
    }

    pub fn entry_count(&self) -> usize {
        self.offsets.len()
    }

    fn time_at(&self, row: usize, track: usize) -> u64 {
        self.times[row * self.track_count + track]
    }

    /// Find the last entry whose time for `track` does not exceed `time`.
    /// Returns that entry's byte offset and its (clamped) time.
    pub fn lookup(&self, time: u64, track: usize) -> Option<(u64, u64)> {
        if self.offsets.is_empty() || track >= self.track_count {
            return None;
        }
        let mut row = 0usize;
        for candidate in 1..self.offsets.len() {
            if self.time_at(candidate, track) > time {
                break;
            }
            row = candidate;
        }
        Some((self.offsets[row], self.time_at(row, track)))
    }

    /// Time of the first entry at or past `byte_offset` for `track`, 0 when
    /// no entry reaches that far.
    pub fn start_time(&self, track: usize, byte_offset: u64) -> u64 {
        if track >= self.track_count {
            return 0;
        }
        self.offsets
            .iter()
            .position(|&o| o >= byte_offset)
            .map(|row| self.time_at(row, track))
            .unwrap_or(0)
    }

    /// Upper time bound over all indexed fragments.
    pub fn track_duration(&self) -> u64 {
        self.last_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_track_index() -> FragmentIndex {
        // entries: (offset=0, t=[0,0]) (offset=100, t=[5,5]) (offset=200, t=[10,10])
        let mut index = FragmentIndex::new(2, 3).unwrap();
        index.offsets = vec![0, 100, 200];
        index.times = vec![0, 0, 5, 5, 10, 10];
        index.last_time = 10;
        index
    }

    #[test]
    fn test_lookup_between_entries() {
        let index = two_track_index();
        assert_eq!(index.lookup(7, 0), Some((100, 5)));
    }

    #[test]
    fn test_lookup_at_zero() {
        let index = two_track_index();
        assert_eq!(index.lookup(0, 1), Some((0, 0)));
    }

    #[test]
    fn test_lookup_past_end_returns_final_entry() {
        let index = two_track_index();
        assert_eq!(index.lookup(99, 0), Some((200, 10)));
    }

    #[test]
    fn test_lookup_out_of_range_track() {
        let index = two_track_index();
        assert_eq!(index.lookup(5, 2), None);
        assert_eq!(FragmentIndex::new(2, 0).unwrap().lookup(0, 0), None);
    }

    #[test]
    fn test_start_time() {
        let index = two_track_index();
        assert_eq!(index.start_time(0, 0), 0);
        assert_eq!(index.start_time(0, 100), 5);
        assert_eq!(index.start_time(1, 150), 10);
        assert_eq!(index.start_time(0, 201), 0);
    }

    #[test]
    fn test_track_duration() {
        assert_eq!(two_track_index().track_duration(), 10);
    }

    #[test]
    fn test_from_mfra_carries_time_forward() {
        use crate::mp4::data::{TfraData, TfraEntry};
        use crate::mp4::fourcc::{MFRA, TFRA};
        use crate::mp4::tree::BoxNode;

        let mut arena = BoxArena::new(0, 1000);
        let mfra = arena.alloc(BoxNode {
            box_type: MFRA,
            uuid: None,
            size: 1000,
            header_size: 8,
            pos: 0,
            index: 0,
            incomplete: false,
            data: BoxData::Empty,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
        });
        arena.append_child(arena.root(), mfra);

        let entry = |time, moof_offset| TfraEntry {
            time,
            moof_offset,
            traf_number: 1,
            trun_number: 1,
            sample_number: 1,
        };
        let mut add_tfra = |arena: &mut BoxArena, track_id, entries| {
            let id = arena.alloc(BoxNode {
                box_type: TFRA,
                uuid: None,
                size: 32,
                header_size: 8,
                pos: 8,
                index: 0,
                incomplete: false,
                data: BoxData::Tfra(TfraData { track_id, entries }),
                parent: None,
                first_child: None,
                last_child: None,
                next_sibling: None,
            });
            arena.append_child(mfra, id);
        };
        add_tfra(&mut arena, 1, vec![entry(0, 0), entry(10, 200)]);
        // track 2 has no entry at offset 200, its time carries forward
        add_tfra(&mut arena, 2, vec![entry(4, 100)]);

        let index = FragmentIndex::from_mfra(&arena, mfra, &[1, 2]).unwrap();
        assert_eq!(index.entry_count(), 3);
        assert_eq!(index.lookup(10, 0), Some((200, 10)));
        assert_eq!(index.lookup(10, 1), Some((200, 4)));
        assert_eq!(index.start_time(1, 100), 4);
        assert_eq!(index.track_duration(), 10);
    }
}
