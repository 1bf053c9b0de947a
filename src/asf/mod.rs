pub mod guid;
pub use guid::Guid;
pub mod track;
pub use track::{ExtensionDescriptor, Frame, FrameSummary, TrackInfo, TrackSet};
pub mod packet;
pub use packet::{read_packet_header, PacketHeader, PacketRead};
pub mod payload;
pub use payload::{demux_all, demux_packet, DemuxOptions, DemuxStatus, PacketSink};
pub mod extensions;
pub use extensions::parse_extensions;
