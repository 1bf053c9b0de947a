use log::warn;

use crate::bits::reader::{read_u32_le, read_var_le};
use crate::errors::{MediaDemuxResult, PacketError};
use crate::streams::ByteCursor;

/// Decoded fixed part of one packet. Transient: consumed entirely before the
/// next packet header is read, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketHeader {
    /// Total packet length, clamped up to the minimum packet size when a
    /// short final packet declares less.
    pub length: u32,
    pub padding: u32,
    pub sequence: u32,
    /// Millisecond-scale send time, before preroll correction.
    pub send_time: u32,
    pub multiple_payloads: bool,
    pub payload_count: u8,
    /// Width code for per-payload length fields; only meaningful when
    /// `multiple_payloads` is set, the single-payload length derives from
    /// the remaining packet bytes.
    pub payload_length_code: u8,
    /// Property byte holding the width codes for the per-payload media
    /// object number, offset, and replicated-data length fields.
    pub property: u8,
    /// Parse position just past the fixed header fields.
    pub header_size: usize,
}

/// Outcome of reading one packet header.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketRead {
    Header(PacketHeader),
    /// Fewer than `min_size` bytes were available.
    EndOfStream,
    /// An unsupported header shape was skipped; try the next packet.
    Recovered,
}

/// Parse one packet's fixed header from a peek of `min_size` bytes.
///
/// The cursor is not advanced on success; it is advanced past exactly
/// `min_size` bytes when an unsupported header shape triggers recovery on a
/// variable-size grid. On a fixed grid (`min_size == max_size`) there is no
/// way to resynchronize, so unsupported shapes are fatal for the stream;
/// `min_size` must then be the true on-disk packet size.
pub fn read_packet_header(
    cursor: &mut dyn ByteCursor,
    min_size: u32,
    max_size: u32,
) -> MediaDemuxResult<PacketRead> {
    let peeked = cursor.peek(min_size as usize)?;
    if peeked.len() < min_size as usize {
        return Ok(PacketRead::EndOfStream);
    }
    let buf = peeked.to_vec();

    let mut pos = 0usize;
    if buf[0] & 0x80 != 0 {
        // the single supported error-correction shape: length-type 0, no
        // opaque data, correction length 2
        if buf[0] != 0x82 {
            warn!(
                "unsupported error correction header {:#04x}",
                buf[0]
            );
            return recover(cursor, min_size, max_size);
        }
        pos = 3;
    }

    let flags = buf[pos];
    let property = buf[pos + 1];
    pos += 2;

    let parsed = (|| {
        let length = read_var_le(flags >> 5, &buf, &mut pos, min_size)?;
        let sequence = read_var_le(flags >> 1, &buf, &mut pos, 0)?;
        let padding = read_var_le(flags >> 3, &buf, &mut pos, 0)?;
        let send_time = read_u32_le(&buf, &mut pos)?;
        pos += 2; // nominal duration, not decoded
        Some((length, sequence, padding, send_time))
    })();
    let (length, sequence, mut padding, send_time) = match parsed {
        Some(v) => v,
        None => {
            warn!("packet header fields run past the minimum packet size");
            return recover(cursor, min_size, max_size);
        }
    };

    if padding > length {
        warn!(
            "packet padding {} exceeds declared length {}",
            padding, length
        );
        return recover(cursor, min_size, max_size);
    }
    // short final packet: fold the shortfall into padding
    let length = if length < min_size {
        padding += min_size - length;
        min_size
    } else {
        length
    };

    let multiple_payloads = flags & 0x01 != 0;
    let (payload_count, payload_length_code) = if multiple_payloads {
        if pos >= buf.len() {
            warn!("multiple-payload packet missing its payload count byte");
            return recover(cursor, min_size, max_size);
        }
        let b = buf[pos];
        pos += 1;
        if b & 0x3f == 0 {
            warn!("multiple-payload packet declares zero payloads");
            return recover(cursor, min_size, max_size);
        }
        (b & 0x3f, (b >> 6) & 0x03)
    } else {
        (1, 0)
    };

    Ok(PacketRead::Header(PacketHeader {
        length,
        padding,
        sequence,
        send_time,
        multiple_payloads,
        payload_count,
        payload_length_code,
        property,
        header_size: pos,
    }))
}

fn recover(
    cursor: &mut dyn ByteCursor,
    min_size: u32,
    max_size: u32,
) -> MediaDemuxResult<PacketRead> {
    if min_size == max_size {
        return Err(PacketError::fatal(
            "unsupported packet on a fixed-size grid, cannot resynchronize",
        )
        .into());
    }
    cursor.read(min_size as usize, None)?;
    Ok(PacketRead::Recovered)
}
