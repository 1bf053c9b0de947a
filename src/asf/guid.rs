use std::fmt;

/// 128-bit extension identifier, stored in the on-wire little-endian GUID
/// byte order.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Guid(pub [u8; 16]);

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[3], b[2], b[1], b[0], b[5], b[4], b[7], b[6], b[8], b[9], b[10], b[11], b[12],
            b[13], b[14], b[15]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

// Payload extension identifiers
pub const EXTENSION_OUTPUT_CLEAN_POINT: Guid = Guid([
    0x6f, 0x3c, 0x2a, 0xf7, 0xb4, 0x6e, 0xbc, 0x4e, 0xb1, 0x92, 0x09, 0xad, 0x97, 0x59, 0xe8,
    0x28,
]);
pub const EXTENSION_VIDEO_FRAME: Guid = Guid([
    0xae, 0x32, 0x64, 0xdd, 0x29, 0xe2, 0x69, 0x45, 0xaa, 0x2b, 0xd2, 0xd9, 0x58, 0x6f, 0x42,
    0x41,
]);
pub const EXTENSION_PIXEL_ASPECT_RATIO: Guid = Guid([
    0x54, 0xe5, 0x1e, 0x1b, 0xea, 0xf9, 0xc8, 0x4b, 0x82, 0x1a, 0x37, 0x6b, 0x74, 0xe4, 0xc4,
    0xb8,
]);
pub const EXTENSION_TIMING_REPLICATION: Guid = Guid([
    0x2a, 0xc0, 0x3c, 0xfd, 0xdb, 0x06, 0xfa, 0x4c, 0x80, 0x1c, 0x72, 0x12, 0xd3, 0x87, 0x45,
    0xe4,
]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_canonical_form() {
        assert_eq!(
            EXTENSION_OUTPUT_CLEAN_POINT.to_string(),
            "f72a3c6f-6eb4-4ebc-b192-09ad9759e828"
        );
    }
}
