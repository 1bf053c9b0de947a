pub mod byte_cursor;
pub use byte_cursor::{ByteCursor, ForwardCursor, MemoryCursor, MAX_FORWARD_SKIP};
