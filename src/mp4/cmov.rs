use std::io::Read;

use flate2::read::ZlibDecoder;
use log::{debug, warn};

use crate::errors::{BoxError, MediaDemuxResult};
use crate::mp4::builder;
use crate::mp4::data::BoxData;
use crate::mp4::fourcc;
use crate::mp4::tree::{BoxArena, NodeId};
use crate::streams::{ByteCursor, MemoryCursor};

/// Decode a compressed movie box: read the `dcom`/`cmvd` pair, inflate the
/// payload, re-parse the inflated bytes as a box stream, and splice the
/// result under the `cmov` node in place of the raw pair. Positions of the
/// spliced nodes are rewritten to file coordinates so the containment
/// invariant keeps holding for the whole tree.
pub fn decode_cmov(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let node = arena.node(id);
    cursor.seek(node.pos + node.header_size)?;
    builder::build_children(cursor, arena, id, &[], &[], false)?;

    let dcom = arena.nth_child_of_type(id, fourcc::DCOM, 0);
    let algorithm = dcom.and_then(|d| match &arena.node(d).data {
        BoxData::Dcom(dcom) => Some(dcom.algorithm),
        _ => None,
    });
    match algorithm {
        Some(a) if a == fourcc::ZLIB => {}
        Some(a) => {
            warn!("compressed movie uses unsupported algorithm '{}'", a);
            arena.node_mut(id).incomplete = true;
            return Ok(());
        }
        None => {
            return Err(BoxError::new("compressed movie is missing its dcom box").into());
        }
    }

    let cmvd = arena
        .nth_child_of_type(id, fourcc::CMVD, 0)
        .ok_or_else(|| BoxError::new("compressed movie is missing its cmvd box"))?;
    let (uncompressed_size, compressed) = match &arena.node(cmvd).data {
        BoxData::Cmvd(c) => (c.uncompressed_size as u64, c.data.clone()),
        _ => return Err(BoxError::new("cmvd carries no payload").into()),
    };
    // file position of the first compressed byte, used for the position
    // rewrite after the splice
    let payload_pos = arena.node(cmvd).pos + arena.node(cmvd).header_size + 4;

    let mut inflated = Vec::with_capacity(uncompressed_size.min(64 * 1024 * 1024) as usize);
    let mut decoder = ZlibDecoder::new(&compressed[..]).take(uncompressed_size);
    decoder
        .read_to_end(&mut inflated)
        .map_err(|e| BoxError::new(format!("inflating compressed movie failed: {}", e)))?;
    debug!(
        "inflated compressed movie: {} -> {} bytes",
        compressed.len(),
        inflated.len()
    );

    // replace the raw pair with the re-parsed content
    arena.clear_children(id);

    // re-parse in memory coordinates by borrowing the cmov node as a
    // virtual parent spanning the inflated buffer
    let saved = {
        let n = arena.node_mut(id);
        let saved = (n.pos, n.size, n.header_size);
        n.pos = 0;
        n.size = inflated.len() as u64;
        n.header_size = 0;
        saved
    };
    let mut mem = MemoryCursor::new(&inflated);
    let result = builder::build_children(&mut mem, arena, id, &[], &[], false);
    {
        let n = arena.node_mut(id);
        n.pos = saved.0;
        n.size = saved.1;
        n.header_size = saved.2;
    }
    result?;

    // shift spliced positions from buffer offsets to file coordinates
    let mut stack: Vec<NodeId> = arena.children(id).collect();
    while let Some(n) = stack.pop() {
        arena.node_mut(n).pos += payload_pos;
        stack.extend(arena.children(n));
    }
    Ok(())
}
