//! Fixed-size, order-preserving partitioning of materialized data.
//!
//! The parallel engine splits a stage's input into [`Chunk`]s of at most
//! `size` elements. Chunks are contiguous, indexed from zero, and their
//! concatenation in index order is exactly the input.

use crate::error::{Result, StreamError};

/// A contiguous slice of a stage's input, tagged with its position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk<T> {
    pub index: usize,
    pub items: Vec<T>,
}

impl<T> Chunk<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Chunker {
    size: usize,
}

impl Chunker {
    /// # Errors
    ///
    /// A zero `size` is rejected as an invalid `chunk_size`.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(StreamError::invalid_config("chunk_size", "must be at least 1"));
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// How many chunks `len` elements split into.
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.size)
    }

    /// Split `data` into contiguous chunks; the last one may be shorter.
    /// Empty input yields no chunks.
    pub fn split<T>(&self, data: Vec<T>) -> Vec<Chunk<T>> {
        let mut chunks = Vec::with_capacity(self.chunk_count(data.len()));
        let mut rest = data.into_iter().peekable();
        let mut index = 0;
        while rest.peek().is_some() {
            let items: Vec<T> = rest.by_ref().take(self.size).collect();
            chunks.push(Chunk { index, items });
            index += 1;
        }
        chunks
    }
}
