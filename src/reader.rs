//! Boundary-safe decomposition of the input into chunks.
//!
//! Both sources uphold the same contract: every chunk starts right after a
//! `\n` (or at offset 0) and ends on a `\n` (or at end of input), so no record
//! is ever split between two chunks.

use std::fs::File;
use std::io::{self, Read};
use std::ops::{Deref, Range};
use std::sync::Arc;

use memchr::{memchr, memrchr};
use memmap2::Mmap;

use crate::error::{PipelineError, Result};

/// A boundary-aligned slice of the input, tagged with where it came from.
pub struct Chunk {
    pub index: u64,
    pub offset: u64,
    data: ChunkData,
}

enum ChunkData {
    Owned(Vec<u8>),
    Mapped { map: Arc<Mmap>, range: Range<usize> },
}

impl Chunk {
    pub fn owned(index: u64, offset: u64, bytes: Vec<u8>) -> Self {
        Self {
            index,
            offset,
            data: ChunkData::Owned(bytes),
        }
    }

    fn mapped(index: u64, map: Arc<Mmap>, range: Range<usize>) -> Self {
        Self {
            index,
            offset: range.start as u64,
            data: ChunkData::Mapped { map, range },
        }
    }
}

impl Deref for Chunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.data {
            ChunkData::Owned(bytes) => bytes,
            ChunkData::Mapped { map, range } => &map[range.clone()],
        }
    }
}

/// Streams a reader in fixed-size blocks, carrying the trailing partial record
/// of each block over into the next chunk.
pub struct BlockReader<R> {
    inner: R,
    block_size: usize,
    carry: Vec<u8>,
    /// Absolute offset of the first carry-over byte.
    offset: u64,
    index: u64,
    done: bool,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R, block_size: usize) -> Self {
        Self {
            inner,
            block_size,
            carry: Vec::new(),
            offset: 0,
            index: 0,
            done: false,
        }
    }

    /// Fill `buf` as far as the reader allows. Returns bytes read; anything
    /// short of a full fill means end of input. `base` is the absolute offset
    /// of `buf[0]`.
    fn fill(&mut self, buf: &mut [u8], base: u64) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(PipelineError::Io {
                        offset: base + filled as u64,
                        source,
                    })
                }
            }
        }
        Ok(filled)
    }

    fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        let carried = self.carry.len();
        let mut buf = std::mem::take(&mut self.carry);
        buf.resize(carried + self.block_size, 0);
        let start = self.offset;
        let read = self.fill(&mut buf[carried..], start + carried as u64)?;
        buf.truncate(carried + read);
        if buf.is_empty() {
            self.done = true;
            return Ok(None);
        }

        // the carry-over never holds a `\n`, so the first record of the chunk
        // starts at `start` and is the only one that can exceed a block
        let first_record = memchr(b'\n', &buf[carried..])
            .map_or(buf.len(), |i| carried + i + 1);
        if first_record > self.block_size {
            return Err(PipelineError::ChunkBoundary {
                offset: start,
                block_size: self.block_size,
            });
        }

        if read < self.block_size {
            // end of input: flush everything, terminated or not
            self.done = true;
            return Ok(Some(self.emit(start, buf)));
        }

        match memrchr(b'\n', &buf[carried..]) {
            Some(last_newline) => {
                self.carry = buf.split_off(carried + last_newline + 1);
                Ok(Some(self.emit(start, buf)))
            }
            None => {
                // a whole block holding one unterminated record: fine only if
                // the input ends right here, which the next read decides
                self.carry = buf;
                self.next_chunk()
            }
        }
    }

    fn emit(&mut self, start: u64, bytes: Vec<u8>) -> Chunk {
        self.offset = start + bytes.len() as u64;
        let chunk = Chunk::owned(self.index, start, bytes);
        self.index += 1;
        chunk
    }
}

impl<R: Read> Iterator for BlockReader<R> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_chunk() {
            Ok(chunk) => chunk.map(Ok),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Splits a read-only memory map into block-sized, boundary-aligned windows.
///
/// Applies the same limit as [`BlockReader`]: a record, terminator included,
/// must fit in one block.
pub struct MappedChunks {
    map: Option<Arc<Mmap>>,
    len: usize,
    pos: usize,
    block_size: usize,
    index: u64,
    done: bool,
}

impl MappedChunks {
    pub fn open(file: &File, block_size: usize) -> io::Result<Self> {
        let len = file.metadata()?.len() as usize;
        // mapping a zero-length file is rejected on some platforms
        let map = if len == 0 {
            None
        } else {
            // SAFETY: the input is opened read-only and is not mutated during the run.
            Some(Arc::new(unsafe { Mmap::map(file)? }))
        };
        Ok(Self {
            map,
            len,
            pos: 0,
            block_size,
            index: 0,
            done: false,
        })
    }
}

impl Iterator for MappedChunks {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.len {
            return None;
        }
        let map = self.map.as_ref()?;
        let start = self.pos;
        let window_end = start.saturating_add(self.block_size);
        let end = if window_end >= self.len {
            self.len
        } else {
            match memrchr(b'\n', &map[start..window_end]) {
                Some(i) => start + i + 1,
                None => {
                    self.done = true;
                    return Some(Err(PipelineError::ChunkBoundary {
                        offset: start as u64,
                        block_size: self.block_size,
                    }));
                }
            }
        };
        self.pos = end;
        let chunk = Chunk::mapped(self.index, Arc::clone(map), start..end);
        self.index += 1;
        Some(Ok(chunk))
    }
}
