use std::io::Read;

use crate::errors::{MediaDemuxResult, StreamError};

/// Ceiling for forward-seek emulation on non-seekable sources.
pub const MAX_FORWARD_SKIP: u64 = 64 * 1024 * 1024;

/// A forward-peekable byte source for both container parsers.
///
/// `peek` returns a borrowed view that is only valid until the next call on
/// the same cursor; callers must copy out anything they need to retain.
/// `peek` and `read` may return fewer bytes than requested near the end of
/// the source; that is not an error.
pub trait ByteCursor {
    /// Peek up to `n` bytes without consuming them.
    fn peek(&mut self, n: usize) -> MediaDemuxResult<&[u8]>;

    /// Consume up to `n` bytes, appending them to `dst` when one is given
    /// and discarding them otherwise. Returns the number of bytes consumed.
    fn read(&mut self, n: usize, dst: Option<&mut Vec<u8>>) -> MediaDemuxResult<usize>;

    /// Current position from the start of the source.
    fn tell(&self) -> u64;

    /// Move to an absolute position. On non-seekable sources this is a
    /// best-effort forward-only emulation via bounded discard-reads; moving
    /// backward or skipping past the forward-skip ceiling fails.
    fn seek(&mut self, pos: u64) -> MediaDemuxResult<()>;
}

/// Slice-backed cursor, freely seekable. Used for in-memory re-parses (the
/// decompressed header splice) and by tests.
pub struct MemoryCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MemoryCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Total length of the backing slice.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ByteCursor for MemoryCursor<'_> {
    fn peek(&mut self, n: usize) -> MediaDemuxResult<&[u8]> {
        let end = (self.pos + n).min(self.data.len());
        Ok(&self.data[self.pos..end])
    }

    fn read(&mut self, n: usize, dst: Option<&mut Vec<u8>>) -> MediaDemuxResult<usize> {
        let end = (self.pos + n).min(self.data.len());
        let chunk = &self.data[self.pos..end];
        if let Some(dst) = dst {
            dst.extend_from_slice(chunk);
        }
        let consumed = chunk.len();
        self.pos = end;
        Ok(consumed)
    }

    fn tell(&self) -> u64 {
        self.pos as u64
    }

    fn seek(&mut self, pos: u64) -> MediaDemuxResult<()> {
        if pos > self.data.len() as u64 {
            return Err(StreamError::new(format!(
                "seek to {} past end of {}-byte buffer",
                pos,
                self.data.len()
            ))
            .into());
        }
        self.pos = pos as usize;
        Ok(())
    }
}

/// Cursor over any `io::Read`, forward-only. Peeks are served from an
/// internal lookahead buffer; seeks only ever move forward and are emulated
/// by discard-reads up to [`MAX_FORWARD_SKIP`].
pub struct ForwardCursor<R: Read> {
    inner: R,
    lookahead: Vec<u8>,
    pos: u64,
}

impl<R: Read> ForwardCursor<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            lookahead: Vec::new(),
            pos: 0,
        }
    }

    /// Grow the lookahead buffer to `n` bytes, stopping early at EOF.
    fn fill(&mut self, n: usize) -> MediaDemuxResult<()> {
        while self.lookahead.len() < n {
            let mut chunk = [0u8; 4096];
            let want = (n - self.lookahead.len()).min(chunk.len());
            let got = self
                .inner
                .read(&mut chunk[..want])
                .map_err(|e| StreamError::new(format!("read failed: {}", e)))?;
            if got == 0 {
                break;
            }
            self.lookahead.extend_from_slice(&chunk[..got]);
        }
        Ok(())
    }
}

impl<R: Read> ByteCursor for ForwardCursor<R> {
    fn peek(&mut self, n: usize) -> MediaDemuxResult<&[u8]> {
        self.fill(n)?;
        let end = n.min(self.lookahead.len());
        Ok(&self.lookahead[..end])
    }

    fn read(&mut self, n: usize, dst: Option<&mut Vec<u8>>) -> MediaDemuxResult<usize> {
        self.fill(n)?;
        let end = n.min(self.lookahead.len());
        if let Some(dst) = dst {
            dst.extend_from_slice(&self.lookahead[..end]);
        }
        self.lookahead.drain(..end);
        self.pos += end as u64;
        Ok(end)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: u64) -> MediaDemuxResult<()> {
        if pos < self.pos {
            return Err(StreamError::new(format!(
                "cannot seek backward from {} to {} on a forward-only source",
                self.pos, pos
            ))
            .into());
        }
        let mut remaining = pos - self.pos;
        if remaining > MAX_FORWARD_SKIP {
            return Err(StreamError::new(format!(
                "forward skip of {} bytes exceeds the {} byte ceiling",
                remaining, MAX_FORWARD_SKIP
            ))
            .into());
        }
        while remaining > 0 {
            let step = remaining.min(64 * 1024) as usize;
            let got = self.read(step, None)?;
            if got == 0 {
                return Err(StreamError::new(format!(
                    "EOF while skipping forward to {}",
                    pos
                ))
                .into());
            }
            remaining -= got as u64;
        }
        Ok(())
    }
}
