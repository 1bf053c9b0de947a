use std::error::Error;
use std::fmt;
use std::io;

/// Enumeration of all possible errors that can occur in the demuxer core
#[derive(Debug)]
pub enum MediaDemuxError {
    Stream(StreamError),
    Box(BoxError),
    Packet(PacketError),
    Other(io::Error),
}

/// Byte cursor / stream navigation errors
#[derive(Debug)]
pub struct StreamError {
    pub message: String,
}

impl StreamError {
    /// Create a new error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Box-tree parsing errors
#[derive(Debug)]
pub enum BoxError {
    /// Not enough bytes available for a declared structure
    Truncated { message: String },
    /// A declared length or count is inconsistent with its container
    MalformedSize { message: String },
    /// Generic box error with a descriptive message
    Error { message: String },
}

impl BoxError {
    pub fn truncated(message: impl Into<String>) -> Self {
        BoxError::Truncated {
            message: message.into(),
        }
    }

    pub fn malformed_size(message: impl Into<String>) -> Self {
        BoxError::MalformedSize {
            message: message.into(),
        }
    }

    pub fn new(message: impl Into<String>) -> Self {
        BoxError::Error {
            message: message.into(),
        }
    }
}

/// Packet demultiplexer errors
#[derive(Debug)]
pub enum PacketError {
    /// The current packet is unusable but the stream can continue
    Packet { message: String },
    /// The whole packet stream cannot be resynchronized
    Fatal { message: String },
}

impl PacketError {
    pub fn packet(message: impl Into<String>) -> Self {
        PacketError::Packet {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        PacketError::Fatal {
            message: message.into(),
        }
    }
}

impl fmt::Display for MediaDemuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaDemuxError::Other(err) => write!(f, "I/O error: {}", err),
            MediaDemuxError::Stream(err) => write!(f, "Stream error: {}", err),
            MediaDemuxError::Box(err) => write!(f, "Box error: {}", err),
            MediaDemuxError::Packet(err) => write!(f, "Packet error: {}", err),
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for BoxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoxError::Truncated { message } => write!(f, "truncated: {}", message),
            BoxError::MalformedSize { message } => write!(f, "malformed size: {}", message),
            BoxError::Error { message } => write!(f, "{}", message),
        }
    }
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::Packet { message } => write!(f, "{}", message),
            PacketError::Fatal { message } => write!(f, "fatal: {}", message),
        }
    }
}

impl Error for MediaDemuxError {}
impl Error for StreamError {}
impl Error for BoxError {}
impl Error for PacketError {}

// Conversion implementations
impl From<io::Error> for MediaDemuxError {
    fn from(err: io::Error) -> Self {
        MediaDemuxError::Other(err)
    }
}

impl From<StreamError> for MediaDemuxError {
    fn from(err: StreamError) -> Self {
        MediaDemuxError::Stream(err)
    }
}

impl From<BoxError> for MediaDemuxError {
    fn from(err: BoxError) -> Self {
        MediaDemuxError::Box(err)
    }
}

impl From<PacketError> for MediaDemuxError {
    fn from(err: PacketError) -> Self {
        MediaDemuxError::Packet(err)
    }
}

// Conversion to io::Error for callers that only speak io
impl From<MediaDemuxError> for io::Error {
    fn from(err: MediaDemuxError) -> Self {
        io::Error::other(err)
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        io::Error::other(err)
    }
}

impl From<BoxError> for io::Error {
    fn from(err: BoxError) -> Self {
        io::Error::other(err)
    }
}

impl From<PacketError> for io::Error {
    fn from(err: PacketError) -> Self {
        io::Error::other(err)
    }
}

// Type alias for Result with MediaDemuxError
pub type MediaDemuxResult<T> = Result<T, MediaDemuxError>;
