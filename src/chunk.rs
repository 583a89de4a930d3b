//! Fixed-size chunking of byte streams
//!
//! The archive's content log is written in blocks of a fixed size. Remote
//! reads arrive in whatever sizes the transport produces, so they are
//! re-cut here: every emitted block is exactly `block_size` bytes except the
//! last one, which carries the remainder when the source ends.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{ready, Stream, StreamExt};

/// Block size used when none (or zero) is configured
pub const DEFAULT_BLOCK_SIZE: usize = 65536;

/// Accumulates bytes and cuts them into fixed-size blocks
#[derive(Debug)]
pub struct FixedChunker {
    block_size: usize,
    buffered: BytesMut,
}

impl FixedChunker {
    /// Create a chunker; a block size of 0 selects [`DEFAULT_BLOCK_SIZE`]
    pub fn new(block_size: usize) -> Self {
        let block_size = if block_size == 0 {
            DEFAULT_BLOCK_SIZE
        } else {
            block_size
        };
        Self {
            block_size,
            buffered: BytesMut::new(),
        }
    }

    /// Configured block size
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Bytes held back waiting for a full block
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    /// Feed bytes, returning every block completed by them
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buffered.extend_from_slice(data);

        let mut blocks = Vec::with_capacity(self.buffered.len() / self.block_size);
        while self.buffered.len() >= self.block_size {
            blocks.push(self.buffered.split_to(self.block_size).freeze());
        }
        blocks
    }

    /// End of input: emit the remainder, if any
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.buffered.is_empty() {
            None
        } else {
            Some(self.buffered.split().freeze())
        }
    }
}

/// Stream adapter that re-cuts an inner byte stream into fixed-size blocks.
///
/// Inner errors are forwarded as-is and terminate the stream; blocks already
/// completed before the error are yielded first.
pub struct FixedChunkStream<S> {
    inner: S,
    chunker: FixedChunker,
    ready: VecDeque<Bytes>,
    done: bool,
}

impl<S> FixedChunkStream<S> {
    pub fn new(inner: S, block_size: usize) -> Self {
        Self {
            inner,
            chunker: FixedChunker::new(block_size),
            ready: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, E> Stream for FixedChunkStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(block) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(block)));
            }
            if this.done {
                return Poll::Ready(None);
            }
            match ready!(this.inner.poll_next_unpin(cx)) {
                Some(Ok(buf)) => this.ready.extend(this.chunker.push(&buf)),
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.done = true;
                    if let Some(last) = this.chunker.finish() {
                        this.ready.push_back(last);
                    }
                }
            }
        }
    }
}
