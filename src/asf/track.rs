use serde::Serialize;

use crate::asf::guid::Guid;

/// Stream numbers are 7 bits on the wire.
pub const MAX_STREAM_NUMBER: usize = 127;

/// Descriptor size marking a variable-length extension instance; the actual
/// size is carried as a 2-byte prefix in the replicated data.
pub const VARIABLE_EXTENSION_SIZE: u16 = 0xffff;

/// One entry of a track's extension-system list, fixed at track setup time.
/// Extensions appear in the stream in exactly this declared order.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionDescriptor {
    pub id: Guid,
    /// Fixed instance size, or [`VARIABLE_EXTENSION_SIZE`].
    pub size: u16,
}

/// A reconstructed media object handed to the sink. `data` holds the
/// concatenated payload fragments in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub data: Vec<u8>,
    /// Millisecond presentation time of the first fragment.
    pub presentation_time: u64,
    /// Millisecond decode time of the first fragment.
    pub decode_time: u64,
    pub keyframe: bool,
}

/// Serializable per-frame metadata, for callers that log or export what was
/// demultiplexed.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub stream_number: u8,
    pub presentation_time: u64,
    pub size: usize,
    pub keyframe: bool,
}

impl Frame {
    pub fn summary(&self, stream_number: u8) -> FrameSummary {
        FrameSummary {
            stream_number,
            presentation_time: self.presentation_time,
            size: self.data.len(),
            keyframe: self.keyframe,
        }
    }
}

/// Per-track demultiplexer state. Owned by the caller and looked up by
/// stream number for every payload.
#[derive(Debug, Default)]
pub struct TrackInfo {
    /// Declared per-track time offset, subtracted from every sub-payload
    /// timestamp.
    pub time_offset: u64,
    /// Extension-system descriptors in declared order.
    pub extensions: Vec<ExtensionDescriptor>,
    /// Fragments of the media object currently being reassembled.
    pub pending: Option<Frame>,
}

impl TrackInfo {
    /// Hand the pending frame out, leaving the slot empty.
    pub fn take_pending(&mut self) -> Option<Frame> {
        self.pending.take()
    }
}

/// Caller-owned table of selected tracks, indexed by 7-bit stream number.
#[derive(Debug, Default)]
pub struct TrackSet {
    tracks: Vec<(u8, TrackInfo)>,
}

impl TrackSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a track; replaces any earlier entry for the same stream.
    pub fn insert(&mut self, stream_number: u8, track: TrackInfo) {
        let stream_number = stream_number & MAX_STREAM_NUMBER as u8;
        self.tracks.retain(|(n, _)| *n != stream_number);
        self.tracks.push((stream_number, track));
    }

    pub fn get_mut(&mut self, stream_number: u8) -> Option<&mut TrackInfo> {
        self.tracks
            .iter_mut()
            .find(|(n, _)| *n == stream_number)
            .map(|(_, t)| t)
    }

    pub fn get(&self, stream_number: u8) -> Option<&TrackInfo> {
        self.tracks
            .iter()
            .find(|(n, _)| *n == stream_number)
            .map(|(_, t)| t)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u8, &mut TrackInfo)> {
        self.tracks.iter_mut().map(|(n, t)| (*n, t))
    }
}
