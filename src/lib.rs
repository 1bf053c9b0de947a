pub mod bits;
pub use bits::reader::read_var_le;

pub mod streams;
pub use streams::{ByteCursor, ForwardCursor, MemoryCursor, MAX_FORWARD_SKIP};

pub mod mp4;
pub use mp4::{read_root, BoxArena, BoxData, BoxSummary, FourCC, FragmentIndex, NodeId};

pub mod asf;
pub use asf::{demux_all, demux_packet, DemuxOptions, Frame, PacketSink, TrackInfo, TrackSet};

pub mod errors;
pub use errors::{BoxError, MediaDemuxError, MediaDemuxResult, PacketError, StreamError};
