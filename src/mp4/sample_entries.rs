use crate::bits::reader::{read_u16, read_u32};
use crate::errors::{BoxError, MediaDemuxResult};
use crate::mp4::data::{
    BoxData, SampleHintData, SampleSounData, SampleTextData, SampleVideData,
};
use crate::mp4::fourcc::{self, FourCC};
use crate::mp4::tree::{BoxArena, NodeId};
use crate::streams::ByteCursor;

/// Find the media handler type governing a sample entry by walking up to the
/// enclosing `mdia` and reading its `hdlr` child.
pub fn enclosing_handler(arena: &BoxArena, id: NodeId) -> Option<FourCC> {
    let mut current = arena.node(id).parent?;
    loop {
        if arena.node(current).box_type == fourcc::MDIA {
            break;
        }
        current = arena.node(current).parent?;
    }
    let hdlr = arena.nth_child_of_type(current, fourcc::HDLR, 0)?;
    match &arena.node(hdlr).data {
        BoxData::Hdlr(h) => Some(h.handler_type),
        _ => None,
    }
}

/// Decode an unrecognized sample entry according to the governing handler.
/// Entries whose handler is unknown are kept as incomplete placeholders.
pub fn decode_by_handler(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
    handler: FourCC,
) -> MediaDemuxResult<()> {
    match handler {
        fourcc::SOUN => decode_sample_soun(cursor, arena, id),
        fourcc::VIDE => decode_sample_vide(cursor, arena, id),
        fourcc::TEXT | fourcc::SBTL | fourcc::SUBT => decode_sample_text(cursor, arena, id),
        fourcc::HINT => decode_sample_hint(cursor, arena, id),
        _ => {
            arena.node_mut(id).incomplete = true;
            Ok(())
        }
    }
}

// every sample entry starts with 6 reserved bytes and a data reference index
fn read_entry_prefix(
    cursor: &mut dyn ByteCursor,
    arena: &BoxArena,
    id: NodeId,
) -> MediaDemuxResult<(Vec<u8>, usize, u16)> {
    let node = arena.node(id);
    cursor.seek(node.pos + node.header_size)?;
    let want = node
        .size
        .saturating_sub(node.header_size)
        .min(super::leaves::BODY_LIMIT) as usize;
    let mut body = Vec::new();
    cursor.read(want, Some(&mut body))?;
    let mut pos = 6usize;
    let data_reference_index = read_u16(&body, &mut pos)
        .ok_or_else(|| BoxError::truncated("sample entry missing data reference index"))?;
    Ok((body, pos, data_reference_index))
}

pub fn decode_sample_soun(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let (body, mut pos, data_reference_index) = read_entry_prefix(cursor, arena, id)?;
    let missing = || BoxError::truncated("audio sample entry too small");
    let qt_version = read_u16(&body, &mut pos).ok_or_else(missing)?;
    pos += 6; // revision level + vendor
    let channel_count = read_u16(&body, &mut pos).ok_or_else(missing)?;
    let sample_size = read_u16(&body, &mut pos).ok_or_else(missing)?;
    pos += 4; // compression id + packet size
    // 16.16 fixed point, integer part only
    let sample_rate = read_u32(&body, &mut pos).ok_or_else(missing)? >> 16;
    arena.node_mut(id).data = BoxData::SampleSoun(SampleSounData {
        data_reference_index,
        qt_version,
        channel_count,
        sample_size,
        sample_rate,
    });
    Ok(())
}

pub fn decode_sample_vide(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let (body, mut pos, data_reference_index) = read_entry_prefix(cursor, arena, id)?;
    let missing = || BoxError::truncated("video sample entry too small");
    pos += 16; // predefined + reserved
    let width = read_u16(&body, &mut pos).ok_or_else(missing)?;
    let height = read_u16(&body, &mut pos).ok_or_else(missing)?;
    let horiz_resolution = read_u32(&body, &mut pos).ok_or_else(missing)?;
    let vert_resolution = read_u32(&body, &mut pos).ok_or_else(missing)?;
    pos += 4; // reserved
    let frame_count = read_u16(&body, &mut pos).ok_or_else(missing)?;
    // pascal string padded to 32 bytes
    let compressor_name = if pos + 32 <= body.len() {
        let len = (body[pos] as usize).min(31);
        String::from_utf8_lossy(&body[pos + 1..pos + 1 + len]).into_owned()
    } else {
        String::new()
    };
    pos += 32;
    let depth = read_u16(&body, &mut pos).unwrap_or(0);
    arena.node_mut(id).data = BoxData::SampleVide(SampleVideData {
        data_reference_index,
        width,
        height,
        horiz_resolution,
        vert_resolution,
        frame_count,
        compressor_name,
        depth,
    });
    Ok(())
}

pub fn decode_sample_text(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let (_body, _pos, data_reference_index) = read_entry_prefix(cursor, arena, id)?;
    arena.node_mut(id).data = BoxData::SampleText(SampleTextData {
        data_reference_index,
    });
    Ok(())
}

pub fn decode_sample_hint(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let (body, pos, data_reference_index) = read_entry_prefix(cursor, arena, id)?;
    let data = body[pos.min(body.len())..].to_vec();
    arena.node_mut(id).data = BoxData::SampleHint(SampleHintData {
        data_reference_index,
        data,
    });
    Ok(())
}
