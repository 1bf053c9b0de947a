use log::{debug, warn};

use crate::bits::reader::{read_u16, read_u24, read_u32, read_u64, read_u8};
use crate::errors::{BoxError, MediaDemuxResult};
use crate::mp4::builder::{self, read_box_at};
use crate::mp4::cmov;
use crate::mp4::data::*;
use crate::mp4::fourcc::{self, FourCC, ANY};
use crate::mp4::header::peek_box_header;
use crate::mp4::sample_entries;
use crate::mp4::tree::{BoxArena, NodeId};
use crate::streams::ByteCursor;

/// Upper bound on a single leaf body read; hostile sizes beyond this fail
/// the box rather than the process.
pub(crate) const BODY_LIMIT: u64 = 64 * 1024 * 1024;

type Decoder = fn(&mut dyn ByteCursor, &mut BoxArena, NodeId) -> MediaDemuxResult<()>;

struct TableEntry {
    box_type: FourCC,
    /// Required parent type; `None` matches any parent.
    parent: Option<FourCC>,
    decoder: Decoder,
}

const fn entry(box_type: FourCC, parent: Option<FourCC>, decoder: Decoder) -> TableEntry {
    TableEntry {
        box_type,
        parent,
        decoder,
    }
}

/// Static type -> decoder -> parent-constraint dispatch; first match wins,
/// the final wildcard entry provides the default decoder.
static DECODERS: &[TableEntry] = &[
    // containers
    entry(fourcc::MOOV, None, decode_container),
    entry(fourcc::TRAK, None, decode_container),
    entry(fourcc::MDIA, None, decode_container),
    entry(fourcc::MINF, None, decode_container),
    entry(fourcc::STBL, None, decode_container),
    entry(fourcc::DINF, None, decode_container),
    entry(fourcc::EDTS, None, decode_container),
    entry(fourcc::UDTA, None, decode_container),
    entry(fourcc::TREF, None, decode_container),
    entry(fourcc::MVEX, None, decode_container),
    entry(fourcc::MOOF, None, decode_container),
    entry(fourcc::TRAF, None, decode_container),
    entry(fourcc::MFRA, None, decode_container),
    entry(fourcc::HNTI, None, decode_container),
    // specific leaves
    entry(fourcc::FTYP, None, decode_ftyp),
    entry(fourcc::CMOV, Some(fourcc::MOOV), cmov::decode_cmov),
    entry(fourcc::MVHD, None, decode_mvhd),
    entry(fourcc::TKHD, Some(fourcc::TRAK), decode_tkhd),
    entry(fourcc::MDHD, Some(fourcc::MDIA), decode_mdhd),
    entry(fourcc::HDLR, None, decode_hdlr),
    entry(fourcc::VMHD, None, decode_vmhd),
    entry(fourcc::SMHD, None, decode_smhd),
    entry(fourcc::NMHD, None, decode_skip),
    entry(fourcc::URL, None, decode_url),
    entry(fourcc::URN, None, decode_urn),
    entry(fourcc::DREF, None, decode_dref),
    entry(fourcc::STTS, None, decode_stts),
    entry(fourcc::CTTS, None, decode_ctts),
    entry(fourcc::STSD, None, decode_stsd),
    entry(fourcc::STSZ, None, decode_stsz),
    entry(fourcc::STSC, None, decode_stsc),
    entry(fourcc::STCO, None, decode_stco_co64),
    entry(fourcc::CO64, None, decode_stco_co64),
    entry(fourcc::STSS, None, decode_stss),
    entry(fourcc::ELST, None, decode_elst),
    entry(fourcc::CPRT, None, decode_cprt),
    entry(fourcc::KEYS, None, decode_keys),
    entry(fourcc::MFHD, Some(fourcc::MOOF), decode_mfhd),
    entry(fourcc::TFRA, Some(fourcc::MFRA), decode_tfra),
    entry(fourcc::MFRO, Some(fourcc::MFRA), decode_mfro),
    entry(fourcc::DCOM, Some(fourcc::CMOV), decode_dcom),
    entry(fourcc::CMVD, Some(fourcc::CMOV), decode_cmvd),
    // nothing to decode in these
    entry(fourcc::MDAT, None, decode_skip),
    entry(fourcc::FREE, None, decode_skip),
    entry(fourcc::SKIP, None, decode_skip),
    entry(fourcc::WIDE, None, decode_skip),
    // common sample entries; the wildcard handles the long tail by handler
    entry(FourCC(*b"mp4a"), Some(fourcc::STSD), sample_entries::decode_sample_soun),
    entry(FourCC(*b"mp4v"), Some(fourcc::STSD), sample_entries::decode_sample_vide),
    entry(FourCC(*b"avc1"), Some(fourcc::STSD), sample_entries::decode_sample_vide),
    entry(FourCC(*b"hvc1"), Some(fourcc::STSD), sample_entries::decode_sample_vide),
    entry(FourCC(*b"tx3g"), Some(fourcc::STSD), sample_entries::decode_sample_text),
    // last entry
    entry(ANY, None, decode_default),
];

/// Dispatch the box at `id` to its decoder. The cursor is positioned at the
/// box's first header byte.
pub fn decode_box(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let box_type = arena.node(id).box_type;
    let parent_type = arena.node(id).parent.map(|p| arena.node(p).box_type);

    for e in DECODERS {
        if e.box_type != box_type && e.box_type != ANY {
            continue;
        }
        if let Some(required) = e.parent {
            if parent_type != Some(required) {
                continue;
            }
        }
        return (e.decoder)(cursor, arena, id);
    }
    unreachable!("decoder table ends with a wildcard entry");
}

/// Seek past the header and read the payload, bounded by the declared size
/// and what the source can actually supply.
fn read_body(
    cursor: &mut dyn ByteCursor,
    arena: &BoxArena,
    id: NodeId,
) -> MediaDemuxResult<Vec<u8>> {
    let node = arena.node(id);
    cursor.seek(node.pos + node.header_size)?;
    let want = node
        .size
        .saturating_sub(node.header_size)
        .min(BODY_LIMIT) as usize;
    let mut body = Vec::new();
    cursor.read(want, Some(&mut body))?;
    Ok(body)
}

/// Decode the 1-byte version + 3-byte flags prefix of a full box.
fn read_fullbox(body: &[u8], pos: &mut usize) -> MediaDemuxResult<(u8, u32)> {
    let version = read_u8(body, pos)
        .ok_or_else(|| BoxError::truncated("full box shorter than its version field"))?;
    let flags = read_u24(body, pos)
        .ok_or_else(|| BoxError::truncated("full box shorter than its flags field"))?;
    Ok((version, flags))
}

/// Validate a declared element count against the bytes actually remaining.
fn check_count(count: u32, element_size: usize, body: &[u8], pos: usize) -> MediaDemuxResult<()> {
    let remaining = body.len().saturating_sub(pos);
    if (count as u64) * (element_size as u64) > remaining as u64 {
        return Err(BoxError::malformed_size(format!(
            "{} entries of {} bytes exceed the {} remaining payload bytes",
            count, element_size, remaining
        ))
        .into());
    }
    Ok(())
}

fn decode_container(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let node = arena.node(id);
    if node.size != 0 && node.size < node.header_size + 8 {
        // container too small to hold even one child header
        return Ok(());
    }
    cursor.seek(node.pos + node.header_size)?;
    builder::build_children(cursor, arena, id, &[], &[], false)?;
    Ok(())
}

fn decode_skip(
    _cursor: &mut dyn ByteCursor,
    _arena: &mut BoxArena,
    _id: NodeId,
) -> MediaDemuxResult<()> {
    Ok(())
}

/// Unknown types under a sample-description container are dispatched by the
/// enclosing media handler; everything else is kept as a recognized-but-
/// opaque placeholder so an unknown box never aborts the containing tree.
fn decode_default(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let parent_type = arena.node(id).parent.map(|p| arena.node(p).box_type);
    if parent_type == Some(fourcc::STSD) {
        if let Some(handler) = sample_entries::enclosing_handler(arena, id) {
            return sample_entries::decode_by_handler(cursor, arena, id, handler);
        }
    }
    debug!(
        "unknown box type '{}' at {} kept as incomplete",
        arena.node(id).box_type,
        arena.node(id).pos
    );
    arena.node_mut(id).incomplete = true;
    Ok(())
}

fn decode_ftyp(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    let major_brand = read_u32(&body, &mut pos)
        .map(|v| FourCC(v.to_be_bytes()))
        .ok_or_else(|| BoxError::truncated("ftyp missing major brand"))?;
    let minor_version = read_u32(&body, &mut pos)
        .ok_or_else(|| BoxError::truncated("ftyp missing minor version"))?;
    let mut compatible_brands = Vec::new();
    while let Some(v) = read_u32(&body, &mut pos) {
        compatible_brands.push(FourCC(v.to_be_bytes()));
    }
    arena.node_mut(id).data = BoxData::Ftyp(FtypData {
        major_brand,
        minor_version,
        compatible_brands,
    });
    Ok(())
}

fn decode_mvhd(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    let (version, _flags) = read_fullbox(&body, &mut pos)?;
    let (creation_time, modification_time, timescale, duration) =
        read_versioned_times(&body, &mut pos, version)?;
    let rate =
        read_u32(&body, &mut pos).ok_or_else(|| BoxError::truncated("mvhd missing rate"))?;
    let volume =
        read_u16(&body, &mut pos).ok_or_else(|| BoxError::truncated("mvhd missing volume"))?;
    pos += 10; // reserved
    let matrix = read_matrix(&body, &mut pos)?;
    pos += 24; // predefined
    let next_track_id = read_u32(&body, &mut pos)
        .ok_or_else(|| BoxError::truncated("mvhd missing next track id"))?;
    arena.node_mut(id).data = BoxData::Mvhd(MvhdData {
        version,
        creation_time,
        modification_time,
        timescale,
        duration,
        rate,
        volume,
        matrix,
        next_track_id,
    });
    Ok(())
}

// version 0 carries 32-bit times, version 1 64-bit
fn read_versioned_times(
    body: &[u8],
    pos: &mut usize,
    version: u8,
) -> MediaDemuxResult<(u64, u64, u32, u64)> {
    let missing = || BoxError::truncated("header box shorter than its time fields");
    if version == 1 {
        let creation = read_u64(body, pos).ok_or_else(missing)?;
        let modification = read_u64(body, pos).ok_or_else(missing)?;
        let timescale = read_u32(body, pos).ok_or_else(missing)?;
        let duration = read_u64(body, pos).ok_or_else(missing)?;
        Ok((creation, modification, timescale, duration))
    } else {
        let creation = read_u32(body, pos).ok_or_else(missing)? as u64;
        let modification = read_u32(body, pos).ok_or_else(missing)? as u64;
        let timescale = read_u32(body, pos).ok_or_else(missing)?;
        let duration = read_u32(body, pos).ok_or_else(missing)? as u64;
        Ok((creation, modification, timescale, duration))
    }
}

fn read_matrix(body: &[u8], pos: &mut usize) -> MediaDemuxResult<[i32; 9]> {
    let mut matrix = [0i32; 9];
    for m in matrix.iter_mut() {
        *m = read_u32(body, pos)
            .ok_or_else(|| BoxError::truncated("header box missing matrix entries"))?
            as i32;
    }
    Ok(matrix)
}

fn decode_tkhd(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    let (version, flags) = read_fullbox(&body, &mut pos)?;
    let missing = || BoxError::truncated("tkhd too small");
    let (creation_time, modification_time, track_id, duration) = if version == 1 {
        let c = read_u64(&body, &mut pos).ok_or_else(missing)?;
        let m = read_u64(&body, &mut pos).ok_or_else(missing)?;
        let t = read_u32(&body, &mut pos).ok_or_else(missing)?;
        pos += 4; // reserved
        let d = read_u64(&body, &mut pos).ok_or_else(missing)?;
        (c, m, t, d)
    } else {
        let c = read_u32(&body, &mut pos).ok_or_else(missing)? as u64;
        let m = read_u32(&body, &mut pos).ok_or_else(missing)? as u64;
        let t = read_u32(&body, &mut pos).ok_or_else(missing)?;
        pos += 4; // reserved
        let d = read_u32(&body, &mut pos).ok_or_else(missing)? as u64;
        (c, m, t, d)
    };
    pos += 8; // reserved
    let layer = read_u16(&body, &mut pos).ok_or_else(missing)? as i16;
    let alternate_group = read_u16(&body, &mut pos).ok_or_else(missing)? as i16;
    let volume = read_u16(&body, &mut pos).ok_or_else(missing)?;
    pos += 2; // reserved
    let matrix = read_matrix(&body, &mut pos)?;
    let width = read_u32(&body, &mut pos).ok_or_else(missing)?;
    let height = read_u32(&body, &mut pos).ok_or_else(missing)?;
    arena.node_mut(id).data = BoxData::Tkhd(TkhdData {
        version,
        flags,
        creation_time,
        modification_time,
        track_id,
        duration,
        layer,
        alternate_group,
        volume,
        matrix,
        width,
        height,
    });
    Ok(())
}

fn decode_mdhd(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    let (version, _flags) = read_fullbox(&body, &mut pos)?;
    let (creation_time, modification_time, timescale, duration) =
        read_versioned_times(&body, &mut pos, version)?;
    let packed = read_u16(&body, &mut pos)
        .ok_or_else(|| BoxError::truncated("mdhd missing language field"))?;
    // three 5-bit values, each offset by 0x60
    let language = [
        (((packed >> 10) & 0x1f) as u8) + 0x60,
        (((packed >> 5) & 0x1f) as u8) + 0x60,
        ((packed & 0x1f) as u8) + 0x60,
    ];
    arena.node_mut(id).data = BoxData::Mdhd(MdhdData {
        version,
        creation_time,
        modification_time,
        timescale,
        duration,
        language,
    });
    Ok(())
}

fn decode_hdlr(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    read_fullbox(&body, &mut pos)?;
    pos += 4; // predefined / component type
    let handler_type = read_u32(&body, &mut pos)
        .map(|v| FourCC(v.to_be_bytes()))
        .ok_or_else(|| BoxError::truncated("hdlr missing handler type"))?;
    pos += 12; // reserved
    let name = String::from_utf8_lossy(&body[pos.min(body.len())..])
        .trim_end_matches('\0')
        .to_string();
    arena.node_mut(id).data = BoxData::Hdlr(HdlrData { handler_type, name });
    Ok(())
}

fn decode_vmhd(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    read_fullbox(&body, &mut pos)?;
    let missing = || BoxError::truncated("vmhd too small");
    let graphics_mode = read_u16(&body, &mut pos).ok_or_else(missing)?;
    let mut opcolor = [0u16; 3];
    for c in opcolor.iter_mut() {
        *c = read_u16(&body, &mut pos).ok_or_else(missing)?;
    }
    arena.node_mut(id).data = BoxData::Vmhd(VmhdData {
        graphics_mode,
        opcolor,
    });
    Ok(())
}

fn decode_smhd(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    read_fullbox(&body, &mut pos)?;
    let balance = read_u16(&body, &mut pos)
        .ok_or_else(|| BoxError::truncated("smhd missing balance"))? as i16;
    arena.node_mut(id).data = BoxData::Smhd(SmhdData { balance });
    Ok(())
}

fn decode_url(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    let (_version, flags) = read_fullbox(&body, &mut pos)?;
    // flag 0x1: media data is self-contained, no location string follows
    let location = if flags & 0x1 != 0 {
        None
    } else {
        Some(read_cstring(&body, &mut pos))
    };
    arena.node_mut(id).data = BoxData::Url(UrlData { location });
    Ok(())
}

fn decode_urn(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    read_fullbox(&body, &mut pos)?;
    let name = read_cstring(&body, &mut pos);
    let location = read_cstring(&body, &mut pos);
    arena.node_mut(id).data = BoxData::Urn(UrnData { name, location });
    Ok(())
}

fn read_cstring(body: &[u8], pos: &mut usize) -> String {
    let start = (*pos).min(body.len());
    let end = body[start..]
        .iter()
        .position(|&b| b == 0)
        .map(|i| start + i)
        .unwrap_or(body.len());
    *pos = (end + 1).min(body.len());
    String::from_utf8_lossy(&body[start..end]).into_owned()
}

fn decode_dref(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let node = arena.node(id);
    cursor.seek(node.pos + node.header_size)?;
    let mut prefix = Vec::new();
    if cursor.read(8, Some(&mut prefix))? < 8 {
        return Err(BoxError::truncated("dref missing entry count").into());
    }
    let mut pos = 4usize; // skip version/flags
    let entry_count = read_u32(&prefix, &mut pos).unwrap_or(0);
    builder::build_children(cursor, arena, id, &[], &[], false)?;
    arena.node_mut(id).data = BoxData::Dref(DrefData { entry_count });
    Ok(())
}

fn decode_stts(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    read_fullbox(&body, &mut pos)?;
    let entry_count =
        read_u32(&body, &mut pos).ok_or_else(|| BoxError::truncated("stts missing count"))?;
    check_count(entry_count, 8, &body, pos)?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let sample_count = read_u32(&body, &mut pos).unwrap_or(0);
        let sample_delta = read_u32(&body, &mut pos).unwrap_or(0);
        entries.push(SttsEntry {
            sample_count,
            sample_delta,
        });
    }
    arena.node_mut(id).data = BoxData::Stts(entries);
    Ok(())
}

fn decode_ctts(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    read_fullbox(&body, &mut pos)?;
    let entry_count =
        read_u32(&body, &mut pos).ok_or_else(|| BoxError::truncated("ctts missing count"))?;
    check_count(entry_count, 8, &body, pos)?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let sample_count = read_u32(&body, &mut pos).unwrap_or(0);
        let sample_offset = read_u32(&body, &mut pos).unwrap_or(0) as i32;
        entries.push(CttsEntry {
            sample_count,
            sample_offset,
        });
    }
    arena.node_mut(id).data = BoxData::Ctts(entries);
    Ok(())
}

/// Limited container: a declared child count followed by nested boxes read
/// through the header reader directly, under a per-child byte budget. The
/// recorded count is truncated to what was actually parsed.
fn decode_stsd(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let node = arena.node(id);
    let node_end = node.end();
    cursor.seek(node.pos + node.header_size)?;
    let mut prefix = Vec::new();
    if cursor.read(8, Some(&mut prefix))? < 8 {
        return Err(BoxError::truncated("stsd missing entry count").into());
    }
    let mut pos = 4usize; // skip version/flags
    let declared = read_u32(&prefix, &mut pos).unwrap_or(0);

    let mut parsed = 0u32;
    for _ in 0..declared {
        let budget = match node_end {
            Some(end) => end.saturating_sub(cursor.tell()),
            None => u64::MAX,
        };
        if budget < 8 {
            break;
        }
        let header = match peek_box_header(cursor)? {
            Some(h) => h,
            None => break,
        };
        if header.size != 0 && (header.size < header.header_size || header.size > budget) {
            warn!(
                "sample entry '{}' at {} does not fit its container, stopping",
                header.box_type, header.pos
            );
            break;
        }
        match read_box_at(cursor, arena, id, &header, 0, node_end)? {
            Some(_) => parsed += 1,
            None => break,
        }
    }
    if parsed < declared {
        debug!(
            "sample description declared {} entries, parsed {}",
            declared, parsed
        );
    }
    arena.node_mut(id).data = BoxData::Stsd(StsdData {
        entry_count: parsed,
    });
    Ok(())
}

fn decode_stsz(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    read_fullbox(&body, &mut pos)?;
    let missing = || BoxError::truncated("stsz too small");
    let sample_size = read_u32(&body, &mut pos).ok_or_else(missing)?;
    let sample_count = read_u32(&body, &mut pos).ok_or_else(missing)?;
    let mut sizes = Vec::new();
    if sample_size == 0 {
        check_count(sample_count, 4, &body, pos)?;
        sizes.reserve(sample_count as usize);
        for _ in 0..sample_count {
            sizes.push(read_u32(&body, &mut pos).unwrap_or(0));
        }
    }
    arena.node_mut(id).data = BoxData::Stsz(StszData { sample_size, sizes });
    Ok(())
}

fn decode_stsc(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    read_fullbox(&body, &mut pos)?;
    let entry_count =
        read_u32(&body, &mut pos).ok_or_else(|| BoxError::truncated("stsc missing count"))?;
    check_count(entry_count, 12, &body, pos)?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        entries.push(StscEntry {
            first_chunk: read_u32(&body, &mut pos).unwrap_or(0),
            samples_per_chunk: read_u32(&body, &mut pos).unwrap_or(0),
            sample_description_index: read_u32(&body, &mut pos).unwrap_or(0),
        });
    }
    arena.node_mut(id).data = BoxData::Stsc(entries);
    Ok(())
}

fn decode_stco_co64(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let wide = arena.node(id).box_type == fourcc::CO64;
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    read_fullbox(&body, &mut pos)?;
    let entry_count = read_u32(&body, &mut pos)
        .ok_or_else(|| BoxError::truncated("chunk offset box missing count"))?;
    check_count(entry_count, if wide { 8 } else { 4 }, &body, pos)?;
    let mut offsets = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let offset = if wide {
            read_u64(&body, &mut pos).unwrap_or(0)
        } else {
            read_u32(&body, &mut pos).unwrap_or(0) as u64
        };
        offsets.push(offset);
    }
    arena.node_mut(id).data = BoxData::Stco(StcoData { offsets });
    Ok(())
}

fn decode_stss(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    read_fullbox(&body, &mut pos)?;
    let entry_count =
        read_u32(&body, &mut pos).ok_or_else(|| BoxError::truncated("stss missing count"))?;
    check_count(entry_count, 4, &body, pos)?;
    let mut samples = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        samples.push(read_u32(&body, &mut pos).unwrap_or(0));
    }
    arena.node_mut(id).data = BoxData::Stss(samples);
    Ok(())
}

fn decode_elst(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    let (version, _flags) = read_fullbox(&body, &mut pos)?;
    let entry_count =
        read_u32(&body, &mut pos).ok_or_else(|| BoxError::truncated("elst missing count"))?;
    check_count(entry_count, if version == 1 { 20 } else { 12 }, &body, pos)?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let (segment_duration, media_time) = if version == 1 {
            (
                read_u64(&body, &mut pos).unwrap_or(0),
                read_u64(&body, &mut pos).unwrap_or(0) as i64,
            )
        } else {
            (
                read_u32(&body, &mut pos).unwrap_or(0) as u64,
                read_u32(&body, &mut pos).unwrap_or(0) as i32 as i64,
            )
        };
        let media_rate_integer = read_u16(&body, &mut pos).unwrap_or(0);
        let media_rate_fraction = read_u16(&body, &mut pos).unwrap_or(0);
        entries.push(ElstEntry {
            segment_duration,
            media_time,
            media_rate_integer,
            media_rate_fraction,
        });
    }
    arena.node_mut(id).data = BoxData::Elst(entries);
    Ok(())
}

fn decode_cprt(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    read_fullbox(&body, &mut pos)?;
    let packed = read_u16(&body, &mut pos)
        .ok_or_else(|| BoxError::truncated("cprt missing language"))?;
    let language = [
        (((packed >> 10) & 0x1f) as u8) + 0x60,
        (((packed >> 5) & 0x1f) as u8) + 0x60,
        ((packed & 0x1f) as u8) + 0x60,
    ];
    let notice = read_cstring(&body, &mut pos);
    arena.node_mut(id).data = BoxData::Cprt(CprtData { language, notice });
    Ok(())
}

/// Keyed string-to-value record table with a reserved-must-be-zero guard
/// before the count; each entry's length and namespace tag are validated
/// against the remaining bytes before the value is copied.
fn decode_keys(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    let (version, flags) = read_fullbox(&body, &mut pos)?;
    if version != 0 || flags != 0 {
        return Err(BoxError::new(format!(
            "keys reserved fields must be zero (version {}, flags {:#x})",
            version, flags
        ))
        .into());
    }
    let entry_count =
        read_u32(&body, &mut pos).ok_or_else(|| BoxError::truncated("keys missing count"))?;
    let mut entries = Vec::new();
    for _ in 0..entry_count {
        let size = match read_u32(&body, &mut pos) {
            Some(s) => s as usize,
            None => break,
        };
        if size < 8 || pos + size - 4 > body.len() {
            warn!("keys entry size {} inconsistent with remaining bytes", size);
            break;
        }
        let namespace = read_u32(&body, &mut pos)
            .map(|v| FourCC(v.to_be_bytes()))
            .unwrap_or(ANY);
        if namespace != fourcc::MDTA {
            // unknown namespace, skip the value bytes
            pos += size - 8;
            continue;
        }
        let name = String::from_utf8_lossy(&body[pos..pos + size - 8]).into_owned();
        pos += size - 8;
        entries.push(KeyEntry { namespace, name });
    }
    arena.node_mut(id).data = BoxData::Keys(KeysData { entries });
    Ok(())
}

fn decode_mfhd(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    read_fullbox(&body, &mut pos)?;
    let sequence_number = read_u32(&body, &mut pos)
        .ok_or_else(|| BoxError::truncated("mfhd missing sequence number"))?;
    arena.node_mut(id).data = BoxData::Mfhd(MfhdData { sequence_number });
    Ok(())
}

fn decode_tfra(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    let (version, _flags) = read_fullbox(&body, &mut pos)?;
    let missing = || BoxError::truncated("tfra too small");
    let track_id = read_u32(&body, &mut pos).ok_or_else(missing)?;
    let lengths = read_u32(&body, &mut pos).ok_or_else(missing)?;
    let len_traf = ((lengths >> 4) & 0x3) as usize + 1;
    let len_trun = ((lengths >> 2) & 0x3) as usize + 1;
    let len_sample = (lengths & 0x3) as usize + 1;
    let entry_count = read_u32(&body, &mut pos).ok_or_else(missing)?;
    let row = if version == 1 { 16 } else { 8 } + len_traf + len_trun + len_sample;
    check_count(entry_count, row, &body, pos)?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let (time, moof_offset) = if version == 1 {
            (
                read_u64(&body, &mut pos).unwrap_or(0),
                read_u64(&body, &mut pos).unwrap_or(0),
            )
        } else {
            (
                read_u32(&body, &mut pos).unwrap_or(0) as u64,
                read_u32(&body, &mut pos).unwrap_or(0) as u64,
            )
        };
        entries.push(TfraEntry {
            time,
            moof_offset,
            traf_number: read_sized(&body, &mut pos, len_traf),
            trun_number: read_sized(&body, &mut pos, len_trun),
            sample_number: read_sized(&body, &mut pos, len_sample),
        });
    }
    arena.node_mut(id).data = BoxData::Tfra(TfraData { track_id, entries });
    Ok(())
}

// 1..4-byte big endian field, used by the random access table
fn read_sized(body: &[u8], pos: &mut usize, len: usize) -> u32 {
    let mut v = 0u32;
    for _ in 0..len {
        v = (v << 8) | read_u8(body, pos).unwrap_or(0) as u32;
    }
    v
}

fn decode_mfro(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    read_fullbox(&body, &mut pos)?;
    let parent_size = read_u32(&body, &mut pos)
        .ok_or_else(|| BoxError::truncated("mfro missing size field"))?;
    arena.node_mut(id).data = BoxData::Mfro(MfroData { parent_size });
    Ok(())
}

fn decode_dcom(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    let algorithm = read_u32(&body, &mut pos)
        .map(|v| FourCC(v.to_be_bytes()))
        .ok_or_else(|| BoxError::truncated("dcom missing algorithm tag"))?;
    arena.node_mut(id).data = BoxData::Dcom(DcomData { algorithm });
    Ok(())
}

fn decode_cmvd(
    cursor: &mut dyn ByteCursor,
    arena: &mut BoxArena,
    id: NodeId,
) -> MediaDemuxResult<()> {
    let body = read_body(cursor, arena, id)?;
    let mut pos = 0usize;
    let uncompressed_size = read_u32(&body, &mut pos)
        .ok_or_else(|| BoxError::truncated("cmvd missing uncompressed size"))?;
    let data = body[pos..].to_vec();
    arena.node_mut(id).data = BoxData::Cmvd(CmvdData {
        uncompressed_size,
        compressed_size: data.len() as u32,
        data,
    });
    Ok(())
}
