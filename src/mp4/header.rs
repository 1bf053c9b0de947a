use crate::bits::reader::{read_u32, read_u64};
use crate::errors::MediaDemuxResult;
use crate::mp4::fourcc::{self, FourCC};
use crate::streams::ByteCursor;

/// Box header information decoded from a peeked prefix. The cursor is never
/// advanced by header reading.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxHeader {
    pub box_type: FourCC,
    pub uuid: Option<[u8; 16]>,
    /// Declared size including the header; 0 means the box extends to the
    /// end of the enclosing stream.
    pub size: u64,
    pub header_size: u64,
    pub pos: u64,
}

impl BoxHeader {
    /// End position of the declared extent; `None` for the to-end sentinel.
    pub fn end(&self) -> Option<u64> {
        if self.size == 0 {
            None
        } else {
            Some(self.pos + self.size)
        }
    }
}

/// Peek the header of the box at the cursor's current position.
///
/// Returns `Ok(None)` ("no box") when fewer than 8 bytes are available,
/// when a 64-bit or extended-type header cannot be fully peeked, or when the
/// declared size would overflow past `u64::MAX` relative to the start
/// position.
pub fn peek_box_header(cursor: &mut dyn ByteCursor) -> MediaDemuxResult<Option<BoxHeader>> {
    let start = cursor.tell();
    // 8 byte prefix, up to 8 more for a 64-bit size, up to 16 for a uuid
    let peek = cursor.peek(32)?;
    if peek.len() < 8 {
        return Ok(None);
    }

    let mut pos = 0usize;
    let short_size = read_u32(peek, &mut pos).map(u64::from);
    let box_type = match read_u32(peek, &mut pos) {
        Some(v) => FourCC(v.to_be_bytes()),
        None => return Ok(None),
    };
    let short_size = match short_size {
        Some(s) => s,
        None => return Ok(None),
    };

    let mut header_size = 8u64;
    let size = if short_size == 1 {
        header_size += 8;
        match read_u64(peek, &mut pos) {
            Some(s) => s,
            None => return Ok(None),
        }
    } else {
        // size 0 is the explicit "extends to end of stream" sentinel
        short_size
    };

    let uuid = if box_type == fourcc::UUID {
        if peek.len() < pos + 16 {
            return Ok(None);
        }
        let mut id = [0u8; 16];
        id.copy_from_slice(&peek[pos..pos + 16]);
        header_size += 16;
        Some(id)
    } else {
        None
    };

    if size != 0 && start.checked_add(size).is_none() {
        return Ok(None);
    }

    Ok(Some(BoxHeader {
        box_type,
        uuid,
        size,
        header_size,
        pos: start,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::fourcc::{FTYP, MOOV};
    use crate::streams::MemoryCursor;

    #[test]
    fn test_short_size_header() {
        let data = [0x00, 0x00, 0x00, 0x10, b'm', b'o', b'o', b'v', 0, 0, 0, 0, 0, 0, 0, 0];
        let mut cursor = MemoryCursor::new(&data);
        let header = peek_box_header(&mut cursor).unwrap().unwrap();
        assert_eq!(header.box_type, MOOV);
        assert_eq!(header.size, 16);
        assert_eq!(header.header_size, 8);
        assert_eq!(header.pos, 0);
        // peek only, no cursor movement
        assert_eq!(cursor.tell(), 0);
    }

    #[test]
    fn test_extended_size_header() {
        let mut data = vec![0x00, 0x00, 0x00, 0x01, b'm', b'd', b'a', b't'];
        data.extend_from_slice(&0x0000_0001_0000_0000u64.to_be_bytes());
        data.extend_from_slice(&[0u8; 16]);
        let mut cursor = MemoryCursor::new(&data);
        let header = peek_box_header(&mut cursor).unwrap().unwrap();
        assert_eq!(header.size, 0x0000_0001_0000_0000);
        assert_eq!(header.header_size, 16);
    }

    #[test]
    fn test_uuid_extended_type() {
        let mut data = vec![0x00, 0x00, 0x00, 0x28, b'u', b'u', b'i', b'd'];
        data.extend_from_slice(&[0xab; 16]);
        data.extend_from_slice(&[0u8; 16]);
        let mut cursor = MemoryCursor::new(&data);
        let header = peek_box_header(&mut cursor).unwrap().unwrap();
        assert_eq!(header.uuid, Some([0xab; 16]));
        assert_eq!(header.header_size, 24);
    }

    #[test]
    fn test_zero_size_is_to_end_sentinel() {
        let data = [0x00, 0x00, 0x00, 0x00, b'm', b'd', b'a', b't'];
        let mut cursor = MemoryCursor::new(&data);
        let header = peek_box_header(&mut cursor).unwrap().unwrap();
        assert_eq!(header.size, 0);
        assert_eq!(header.end(), None);
    }

    #[test]
    fn test_no_box_on_short_peek() {
        let data = [0x00, 0x00, 0x00, 0x10, b'f', b't', b'y'];
        let mut cursor = MemoryCursor::new(&data);
        assert!(peek_box_header(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_no_box_on_size_overflow() {
        // a 64-bit size of u64::MAX overflows relative to a nonzero start
        let mut data = vec![0u8];
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, b'f', b't', b'y', b'p']);
        data.extend_from_slice(&u64::MAX.to_be_bytes());
        data.extend_from_slice(&[0u8; 16]);
        let mut cursor = MemoryCursor::new(&data);
        cursor.seek(1).unwrap();
        assert!(peek_box_header(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_max_size_at_position_zero_is_accepted() {
        let mut data = vec![0x00, 0x00, 0x00, 0x01, b'f', b't', b'y', b'p'];
        data.extend_from_slice(&u64::MAX.to_be_bytes());
        data.extend_from_slice(&[0u8; 16]);
        let mut cursor = MemoryCursor::new(&data);
        let header = peek_box_header(&mut cursor).unwrap().unwrap();
        assert_eq!(header.box_type, FTYP);
        assert_eq!(header.size, u64::MAX);
    }
}
