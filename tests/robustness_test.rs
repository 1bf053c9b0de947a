use mediademux::asf::{demux_all, DemuxOptions, Frame, PacketSink, TrackInfo, TrackSet};
use mediademux::mp4::read_root;
use mediademux::streams::{ByteCursor, MemoryCursor};
use proptest::prelude::*;

struct NullSink;

impl PacketSink for NullSink {
    fn send(&mut self, _stream_number: u8, _frame: Frame) {}
}

fn assert_contained(arena: &mediademux::BoxArena, id: mediademux::NodeId) {
    let node = arena.node(id);
    for child in arena.children(id) {
        let c = arena.node(child);
        assert!(c.pos >= node.pos);
        if node.size != 0 && c.size != 0 {
            assert!(c.pos + c.size <= node.pos + node.size);
        }
        assert_contained(arena, child);
    }
}

proptest! {
    #[test]
    fn box_parsing_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut cursor = MemoryCursor::new(&data);
        if let Ok(arena) = read_root(&mut cursor, Some(data.len() as u64)) {
            assert_contained(&arena, arena.root());
            prop_assert!(cursor.tell() <= data.len() as u64);
        }
    }

    #[test]
    fn box_parsing_is_idempotent(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let first = {
            let mut cursor = MemoryCursor::new(&data);
            read_root(&mut cursor, Some(data.len() as u64)).map(|a| a.dump(a.root()))
        };
        let second = {
            let mut cursor = MemoryCursor::new(&data);
            read_root(&mut cursor, Some(data.len() as u64)).map(|a| a.dump(a.root()))
        };
        match (first, second) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(_), Err(_)) => {}
            _ => prop_assert!(false, "parse outcome changed between runs"),
        }
    }

    #[test]
    fn packet_demux_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut cursor = MemoryCursor::new(&data);
        let mut tracks = TrackSet::new();
        tracks.insert(1, TrackInfo::default());
        let mut sink = NullSink;
        let opts = DemuxOptions {
            min_packet_size: 32,
            max_packet_size: 64,
            preroll: 100,
            preroll_start: 0,
        };
        let _ = demux_all(&mut cursor, &mut tracks, &mut sink, &opts);
    }
}
