/*
# Bits Reader Module

 Provides utilities for reading binary data from byte slices with position
 tracking. Both container formats are parsed from peeked buffers, so every
 reader here works on a slice and advances a caller-held position instead of
 consuming an io source.

 Key components:
 - Big-endian slice readers: `read_u8()`, `read_u16()`, `read_u24()`,
   `read_u32()`, `read_u64()` (box-tree format)
 - Little-endian slice readers: `read_u16_le()`, `read_u32_le()`,
   `read_u64_le()` (packet format)
 - `read_var_le()`: 0/1/2/4-byte field selected by a 2-bit width code
*/

/// Read one byte from a slice advancing the position.
pub fn read_u8(data: &[u8], pos: &mut usize) -> Option<u8> {
    if *pos >= data.len() {
        return None;
    }
    let v = data[*pos];
    *pos += 1;
    Some(v)
}

/// Read a 16-bit big endian value from a byte slice advancing the position.
pub fn read_u16(data: &[u8], pos: &mut usize) -> Option<u16> {
    if *pos + 2 > data.len() {
        return None;
    }
    let v = u16::from_be_bytes([data[*pos], data[*pos + 1]]);
    *pos += 2;
    Some(v)
}

/// Read a 24-bit big endian value from a byte slice advancing the position.
pub fn read_u24(data: &[u8], pos: &mut usize) -> Option<u32> {
    if *pos + 3 > data.len() {
        return None;
    }
    let v = ((data[*pos] as u32) << 16) | ((data[*pos + 1] as u32) << 8) | data[*pos + 2] as u32;
    *pos += 3;
    Some(v)
}

/// Read a 32-bit big endian value from a byte slice advancing the position.
pub fn read_u32(data: &[u8], pos: &mut usize) -> Option<u32> {
    if *pos + 4 > data.len() {
        return None;
    }
    let v = u32::from_be_bytes([data[*pos], data[*pos + 1], data[*pos + 2], data[*pos + 3]]);
    *pos += 4;
    Some(v)
}

/// Read a 64-bit big endian value from a byte slice advancing the position.
pub fn read_u64(data: &[u8], pos: &mut usize) -> Option<u64> {
    if *pos + 8 > data.len() {
        return None;
    }
    let v = u64::from_be_bytes([
        data[*pos],
        data[*pos + 1],
        data[*pos + 2],
        data[*pos + 3],
        data[*pos + 4],
        data[*pos + 5],
        data[*pos + 6],
        data[*pos + 7],
    ]);
    *pos += 8;
    Some(v)
}

/// Read a 16-bit little endian value from a byte slice advancing the position.
pub fn read_u16_le(data: &[u8], pos: &mut usize) -> Option<u16> {
    if *pos + 2 > data.len() {
        return None;
    }
    let v = u16::from_le_bytes([data[*pos], data[*pos + 1]]);
    *pos += 2;
    Some(v)
}

/// Read a 32-bit little endian value from a byte slice advancing the position.
pub fn read_u32_le(data: &[u8], pos: &mut usize) -> Option<u32> {
    if *pos + 4 > data.len() {
        return None;
    }
    let v = u32::from_le_bytes([data[*pos], data[*pos + 1], data[*pos + 2], data[*pos + 3]]);
    *pos += 4;
    Some(v)
}

/// Read a 64-bit little endian value from a byte slice advancing the position.
pub fn read_u64_le(data: &[u8], pos: &mut usize) -> Option<u64> {
    if *pos + 8 > data.len() {
        return None;
    }
    let v = u64::from_le_bytes([
        data[*pos],
        data[*pos + 1],
        data[*pos + 2],
        data[*pos + 3],
        data[*pos + 4],
        data[*pos + 5],
        data[*pos + 6],
        data[*pos + 7],
    ]);
    *pos += 8;
    Some(v)
}

/// Read a variable-width little endian field selected by the low 2 bits of
/// `width_code`: 0 consumes nothing and yields `default`, 1 one byte, 2 a
/// 16-bit value, 3 a 32-bit value. Returns `None` when the selected width
/// does not fit in `data`.
pub fn read_var_le(width_code: u8, data: &[u8], pos: &mut usize, default: u32) -> Option<u32> {
    match width_code & 0x03 {
        1 => read_u8(data, pos).map(u32::from),
        2 => read_u16_le(data, pos).map(u32::from),
        3 => read_u32_le(data, pos),
        _ => Some(default),
    }
}
