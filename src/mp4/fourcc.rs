use std::fmt;

/// A 4-byte type code naming a box or stream type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(bytes: [u8; 4]) -> Self {
        FourCC(bytes)
    }

    /// Parse a type code from a display string; only exact 4-byte names match.
    pub fn from_str(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() != 4 {
            return None;
        }
        Some(FourCC([b[0], b[1], b[2], b[3]]))
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({})", self)
    }
}

/// Wildcard entry in the decoder table; matches any type code.
pub const ANY: FourCC = FourCC([0, 0, 0, 0]);

/// Synthetic type of the virtual root container.
pub const ROOT: FourCC = FourCC(*b"root");

// Containers
pub const MOOV: FourCC = FourCC(*b"moov");
pub const TRAK: FourCC = FourCC(*b"trak");
pub const MDIA: FourCC = FourCC(*b"mdia");
pub const MINF: FourCC = FourCC(*b"minf");
pub const STBL: FourCC = FourCC(*b"stbl");
pub const DINF: FourCC = FourCC(*b"dinf");
pub const EDTS: FourCC = FourCC(*b"edts");
pub const UDTA: FourCC = FourCC(*b"udta");
pub const TREF: FourCC = FourCC(*b"tref");
pub const MVEX: FourCC = FourCC(*b"mvex");
pub const MOOF: FourCC = FourCC(*b"moof");
pub const TRAF: FourCC = FourCC(*b"traf");
pub const MFRA: FourCC = FourCC(*b"mfra");
pub const HNTI: FourCC = FourCC(*b"hnti");
pub const NMHD: FourCC = FourCC(*b"nmhd");

// Leaves
pub const FTYP: FourCC = FourCC(*b"ftyp");
pub const MVHD: FourCC = FourCC(*b"mvhd");
pub const TKHD: FourCC = FourCC(*b"tkhd");
pub const MDHD: FourCC = FourCC(*b"mdhd");
pub const HDLR: FourCC = FourCC(*b"hdlr");
pub const VMHD: FourCC = FourCC(*b"vmhd");
pub const SMHD: FourCC = FourCC(*b"smhd");
pub const URL: FourCC = FourCC(*b"url ");
pub const URN: FourCC = FourCC(*b"urn ");
pub const DREF: FourCC = FourCC(*b"dref");
pub const STTS: FourCC = FourCC(*b"stts");
pub const CTTS: FourCC = FourCC(*b"ctts");
pub const STSD: FourCC = FourCC(*b"stsd");
pub const STSZ: FourCC = FourCC(*b"stsz");
pub const STSC: FourCC = FourCC(*b"stsc");
pub const STCO: FourCC = FourCC(*b"stco");
pub const CO64: FourCC = FourCC(*b"co64");
pub const STSS: FourCC = FourCC(*b"stss");
pub const ELST: FourCC = FourCC(*b"elst");
pub const CPRT: FourCC = FourCC(*b"cprt");
pub const KEYS: FourCC = FourCC(*b"keys");
pub const MFHD: FourCC = FourCC(*b"mfhd");
pub const TFRA: FourCC = FourCC(*b"tfra");
pub const MFRO: FourCC = FourCC(*b"mfro");

// Compressed movie header
pub const CMOV: FourCC = FourCC(*b"cmov");
pub const DCOM: FourCC = FourCC(*b"dcom");
pub const CMVD: FourCC = FourCC(*b"cmvd");
pub const ZLIB: FourCC = FourCC(*b"zlib");

// Boxes recognized but skipped
pub const MDAT: FourCC = FourCC(*b"mdat");
pub const FREE: FourCC = FourCC(*b"free");
pub const SKIP: FourCC = FourCC(*b"skip");
pub const WIDE: FourCC = FourCC(*b"wide");

/// Escape type code introducing a 16-byte extended type.
pub const UUID: FourCC = FourCC(*b"uuid");

// Media handler types
pub const VIDE: FourCC = FourCC(*b"vide");
pub const SOUN: FourCC = FourCC(*b"soun");
pub const HINT: FourCC = FourCC(*b"hint");
pub const TEXT: FourCC = FourCC(*b"text");
pub const SBTL: FourCC = FourCC(*b"sbtl");
pub const SUBT: FourCC = FourCC(*b"subt");

// Namespace tag for keyed record entries
pub const MDTA: FourCC = FourCC(*b"mdta");
