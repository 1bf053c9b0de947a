use log::{debug, warn};

use crate::bits::reader::read_u32;
use crate::errors::MediaDemuxResult;
use crate::mp4::data::BoxData;
use crate::mp4::fourcc::{self, FourCC};
use crate::mp4::header::{peek_box_header, BoxHeader};
use crate::mp4::leaves;
use crate::mp4::tree::{BoxArena, BoxNode, NodeId};
use crate::streams::ByteCursor;

/// How a child-enumeration pass ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuildStatus {
    /// Parent bounds exhausted, or natural end of an unsized stream.
    Complete,
    /// An excluded type was found; the cursor is still positioned before it.
    RestrictionHit(FourCC),
    /// A stop-list type was parsed; the box is included in the tree.
    StoppedAt(NodeId),
    /// The source ended before a declared structure could be completed.
    Truncated,
}

/// Read the children of `parent` from the cursor until its declared extent
/// is exhausted, a stop/exclude type is met, or the source runs out.
///
/// `stop_types` terminate enumeration after the matching box is parsed and
/// appended; `exclude_types` terminate before the matching box is consumed.
/// With `indexed`, every child header is preceded by a 4-byte index value
/// recorded on the node.
pub fn build_children(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    parent: NodeId,
    stop_types: &[FourCC],
    exclude_types: &[FourCC],
    indexed: bool,
) -> MediaDemuxResult<BuildStatus> {
    let parent_end = arena.node(parent).end();
    let mut last_pos = u64::MAX;
    let mut stuck = 0u32;

    loop {
        let here = cursor.tell();
        // break infinite loops when recovery cannot advance the cursor
        if here == last_pos {
            stuck += 1;
            if stuck >= 2 {
                warn!("builder stuck at position {}, giving up on parent", here);
                return Ok(BuildStatus::Truncated);
            }
        } else {
            stuck = 0;
        }
        last_pos = here;

        let lead = if indexed { 4u64 } else { 0 };
        if let Some(end) = parent_end {
            if here + lead + 8 > end {
                return Ok(BuildStatus::Complete);
            }
        }

        let mut index = 0u32;
        if indexed {
            let peeked = cursor.peek(4)?;
            if peeked.len() < 4 {
                return Ok(truncated_or_complete(parent_end));
            }
            let mut pos = 0usize;
            index = read_u32(peeked, &mut pos).unwrap_or(0);
            cursor.read(4, None)?;
        }

        let header = match peek_box_header(cursor)? {
            Some(h) => h,
            None => return Ok(truncated_or_complete(parent_end)),
        };

        if header.size != 0 && header.size < header.header_size {
            warn!(
                "discarding malformed box '{}' at {}: declared size {} smaller than header",
                header.box_type, header.pos, header.size
            );
            cursor.read(8, None)?;
            continue;
        }

        if exclude_types.contains(&header.box_type) {
            return Ok(BuildStatus::RestrictionHit(header.box_type));
        }

        if let (Some(end), Some(box_end)) = (parent_end, header.end()) {
            if box_end > end {
                warn!(
                    "box '{}' at {} overruns its parent (ends {} > {})",
                    header.box_type, header.pos, box_end, end
                );
                return Ok(BuildStatus::Complete);
            }
        }

        match read_box_at(cursor, arena, parent, &header, index, parent_end)? {
            Some(id) => {
                if stop_types.contains(&arena.node(id).box_type) {
                    return Ok(BuildStatus::StoppedAt(id));
                }
                if arena.node(id).size == 0 {
                    // an unbounded box swallowed the rest of the stream
                    return Ok(BuildStatus::Complete);
                }
            }
            None => {
                // node discarded; the cursor was forced to the declared end
                // when reachable, otherwise the stuck counter ends the loop
                continue;
            }
        }
    }
}

/// Read exactly one child of `parent`, but only if its type matches `only`.
/// Returns `RestrictionHit` without consuming anything on a mismatch.
pub fn build_child_of_type(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    parent: NodeId,
    only: FourCC,
) -> MediaDemuxResult<BuildStatus> {
    let parent_end = arena.node(parent).end();
    let header = match peek_box_header(cursor)? {
        Some(h) => h,
        None => return Ok(truncated_or_complete(parent_end)),
    };
    if header.box_type != only {
        return Ok(BuildStatus::RestrictionHit(header.box_type));
    }
    if header.size != 0 && header.size < header.header_size {
        return Ok(BuildStatus::Truncated);
    }
    match read_box_at(cursor, arena, parent, &header, 0, parent_end)? {
        Some(id) => Ok(BuildStatus::StoppedAt(id)),
        None => Ok(BuildStatus::Truncated),
    }
}

/// Accept a peeked header: allocate the node, attach it under `parent`, run
/// its decoder, and force the cursor to the declared end regardless of
/// decoder success. The node is attached before decoding so that decoders
/// can navigate the ancestor chain; it is detached again when decoding
/// fails. Returns `None` when the node had to be discarded.
pub(crate) fn read_box_at(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    parent: NodeId,
    header: &BoxHeader,
    index: u32,
    parent_end: Option<u64>,
) -> MediaDemuxResult<Option<NodeId>> {
    // resolve the to-end sentinel against a sized parent
    let size = if header.size == 0 {
        parent_end.map(|end| end - header.pos).unwrap_or(0)
    } else {
        header.size
    };

    let id = arena.alloc(BoxNode {
        box_type: header.box_type,
        uuid: header.uuid,
        size,
        header_size: header.header_size,
        pos: header.pos,
        index,
        incomplete: false,
        data: BoxData::Empty,
        parent: None,
        first_child: None,
        last_child: None,
        next_sibling: None,
    });
    arena.append_child(parent, id);

    let decoded = leaves::decode_box(cursor, arena, id);

    // force the cursor to the declared end whether or not decoding worked
    let end_reached = if size != 0 {
        cursor.seek(header.pos + size).is_ok()
    } else {
        // unbounded box: consume whatever remains
        while cursor.read(64 * 1024, None)? > 0 {}
        true
    };

    if !end_reached {
        debug!(
            "discarding box '{}' at {}: declared end {} unreachable",
            header.box_type,
            header.pos,
            header.pos + size
        );
        arena.remove_child(parent, id);
        return Ok(None);
    }

    if let Err(e) = decoded {
        warn!(
            "failed to decode box '{}' at {}: {}",
            header.box_type, header.pos, e
        );
        arena.remove_child(parent, id);
        return Ok(None);
    }

    Ok(Some(id))
}

fn truncated_or_complete(parent_end: Option<u64>) -> BuildStatus {
    // an unsized parent ends wherever the stream does
    if parent_end.is_some() {
        BuildStatus::Truncated
    } else {
        BuildStatus::Complete
    }
}

/// Parse an entire stream into a box tree, rooted at a virtual container.
///
/// `total_size` is the stream length when known; `None` marks an unsized
/// root (live or fragmented stream) for which size-based termination checks
/// are skipped. The primary structural box is read first under a stop list
/// so that truncated tails past it do not discard the whole tree.
pub fn read_root(
    cursor: &mut dyn ByteCursor,
    total_size: Option<u64>,
) -> MediaDemuxResult<BoxArena> {
    let start = cursor.tell();
    let mut arena = BoxArena::new(start, total_size.unwrap_or(0));
    let root = arena.root();

    // fast path: a stream leading with the file-type box followed directly
    // by the primary structural box
    if let Some(h) = peek_box_header(cursor)? {
        if h.box_type == fourcc::FTYP {
            build_child_of_type(cursor, &mut arena, root, fourcc::FTYP)?;
            if let Some(h2) = peek_box_header(cursor)? {
                if h2.box_type == fourcc::MOOV {
                    build_child_of_type(cursor, &mut arena, root, fourcc::MOOV)?;
                }
            }
        }
    }

    // primary box still missing: narrowed stop list until it shows up
    if arena.get(root, "moov").is_none() {
        match build_children(
            cursor,
            &mut arena,
            root,
            &[fourcc::MOOV, fourcc::MOOF],
            &[],
            false,
        )? {
            BuildStatus::StoppedAt(_) => {}
            status => {
                debug!("primary box not found while reading root: {:?}", status);
                return Ok(arena);
            }
        }
    }

    // fall back to reading everything that remains
    build_children(cursor, &mut arena, root, &[], &[], false)?;
    Ok(arena)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::MemoryCursor;

    fn make_box(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&((payload.len() as u32 + 8).to_be_bytes()));
        b.extend_from_slice(box_type);
        b.extend_from_slice(payload);
        b
    }

    fn assert_contained(arena: &BoxArena, id: NodeId) {
        let node = arena.node(id);
        for child in arena.children(id) {
            let c = arena.node(child);
            assert!(c.pos >= node.pos);
            if node.size != 0 {
                assert!(
                    c.pos + c.size <= node.pos + node.size,
                    "child '{}' escapes parent '{}'",
                    c.box_type,
                    node.box_type
                );
            }
            assert_contained(arena, child);
        }
    }

    #[test]
    fn test_containment_invariant_holds_for_nested_tree() {
        let stbl = make_box(b"stbl", &[]);
        let minf = make_box(b"minf", &stbl);
        let mdia = make_box(b"mdia", &minf);
        let trak = make_box(b"trak", &mdia);
        let moov = make_box(b"moov", &trak);
        let mut data = moov;
        data.extend_from_slice(&make_box(b"free", &[0; 16]));

        let mut cursor = MemoryCursor::new(&data);
        let arena = read_root(&mut cursor, Some(data.len() as u64)).unwrap();
        assert_contained(&arena, arena.root());
        assert!(arena.get(arena.root(), "/moov/trak/mdia/minf/stbl").is_some());
        // the cursor ends at the stream end after building the root
        assert_eq!(cursor.tell(), data.len() as u64);
    }

    #[test]
    fn test_truncated_box_is_discarded_without_overread() {
        // declares 16 bytes, only 10 available
        let data = [0x00, 0x00, 0x00, 0x10, b'f', b'r', b'e', b'e', 0xaa, 0xbb];
        let mut cursor = MemoryCursor::new(&data);
        let arena = read_root(&mut cursor, Some(data.len() as u64)).unwrap();
        assert!(arena.get(arena.root(), "free").is_none());
        assert!(cursor.tell() <= data.len() as u64);
    }

    #[test]
    fn test_overrunning_child_is_rejected() {
        // moov declares 16 bytes but its child claims 64
        let mut data = make_box(b"moov", &[0x00, 0x00, 0x00, 0x40, b'f', b'r', b'e', b'e']);
        data.extend_from_slice(&[0u8; 16]);
        let mut cursor = MemoryCursor::new(&data);
        let arena = read_root(&mut cursor, Some(data.len() as u64)).unwrap();
        let moov = arena.get(arena.root(), "moov").unwrap();
        assert_eq!(arena.children(moov).count(), 0);
    }

    #[test]
    fn test_stop_list_leaves_cursor_after_match() {
        let mut data = make_box(b"free", &[]);
        let moov = make_box(b"moov", &[]);
        data.extend_from_slice(&moov);
        data.extend_from_slice(&make_box(b"skip", &[]));

        let mut cursor = MemoryCursor::new(&data);
        let mut arena = BoxArena::new(0, data.len() as u64);
        let root = arena.root();
        let status =
            build_children(&mut cursor, &mut arena, root, &[fourcc::MOOV], &[], false).unwrap();
        match status {
            BuildStatus::StoppedAt(id) => assert_eq!(arena.node(id).box_type, fourcc::MOOV),
            other => panic!("expected StoppedAt, got {:?}", other),
        }
        assert_eq!(cursor.tell(), 16);
        assert!(arena.get(root, "skip").is_none());
    }

    #[test]
    fn test_exclude_list_does_not_consume() {
        let mut data = make_box(b"free", &[]);
        data.extend_from_slice(&make_box(b"mdat", &[0; 8]));

        let mut cursor = MemoryCursor::new(&data);
        let mut arena = BoxArena::new(0, data.len() as u64);
        let root = arena.root();
        let status =
            build_children(&mut cursor, &mut arena, root, &[], &[fourcc::MDAT], false).unwrap();
        assert_eq!(status, BuildStatus::RestrictionHit(fourcc::MDAT));
        // cursor still points at the excluded box
        assert_eq!(cursor.tell(), 8);
    }

    #[test]
    fn test_malformed_size_skips_and_continues() {
        // declared size 4 is smaller than a header; the 8-byte skip lands on
        // the following well-formed box
        let mut data = vec![0x00, 0x00, 0x00, 0x04, b'b', b'a', b'd', b'!'];
        data.extend_from_slice(&make_box(b"free", &[]));
        let mut cursor = MemoryCursor::new(&data);
        let arena = read_root(&mut cursor, Some(data.len() as u64)).unwrap();
        assert!(arena.get(arena.root(), "free").is_some());
    }

    #[test]
    fn test_indexed_children() {
        let mut data = 7u32.to_be_bytes().to_vec();
        data.extend_from_slice(&make_box(b"free", &[]));
        let mut cursor = MemoryCursor::new(&data);
        let mut arena = BoxArena::new(0, data.len() as u64);
        let root = arena.root();
        build_children(&mut cursor, &mut arena, root, &[], &[], true).unwrap();
        let free = arena.get(root, "free").unwrap();
        assert_eq!(arena.node(free).index, 7);
        assert_eq!(arena.node(free).pos, 4);
    }

    #[test]
    fn test_unsized_root_reads_to_stream_end() {
        let mut data = make_box(b"moov", &[]);
        data.extend_from_slice(&make_box(b"free", &[1, 2, 3]));
        let mut cursor = MemoryCursor::new(&data);
        let arena = read_root(&mut cursor, None).unwrap();
        assert!(arena.get(arena.root(), "moov").is_some());
        assert!(arena.get(arena.root(), "free").is_some());
    }
}
