//! Memory-backed inputs: mapped files and in-memory buffers.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use super::ByteInput;

/// Input over a shared, immutable byte buffer.
///
/// Sub-ranges share the same backing buffer through an `Arc`, so opening a
/// blob never copies or re-maps anything.
pub struct SliceIn<B> {
    data: Arc<B>,
    /// Absolute start of this window in `data`
    start: usize,
    /// Absolute end (exclusive) of this window in `data`
    end: usize,
    /// Absolute cursor
    pos: usize,
}

/// Memory-mapped file input.
pub type MmapIn = SliceIn<Mmap>;

/// In-memory buffer input.
pub type MemIn = SliceIn<Vec<u8>>;

impl<B> SliceIn<B>
where
    B: AsRef<[u8]> + Send + Sync + 'static,
{
    /// Create an input over the whole buffer.
    pub fn new(data: Arc<B>) -> Self {
        let end = (*data).as_ref().len();
        Self {
            data,
            start: 0,
            end,
            pos: 0,
        }
    }

    /// Number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    fn bytes(&self) -> &[u8] {
        (*self.data).as_ref()
    }
}

impl SliceIn<Mmap> {
    /// Map a file read-only.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        // The mapping is read-only and private; cache files are replaced by
        // rename, never truncated in place.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self::new(Arc::new(map)))
    }
}

impl From<Vec<u8>> for SliceIn<Vec<u8>> {
    fn from(data: Vec<u8>) -> Self {
        Self::new(Arc::new(data))
    }
}

impl From<Arc<Vec<u8>>> for SliceIn<Vec<u8>> {
    fn from(data: Arc<Vec<u8>>) -> Self {
        Self::new(data)
    }
}

impl<B> ByteInput for SliceIn<B>
where
    B: AsRef<[u8]> + Send + Sync + 'static,
{
    fn get_byte(&mut self) -> Option<u8> {
        if self.pos < self.end {
            let byte = self.bytes()[self.pos];
            self.pos += 1;
            Some(byte)
        } else {
            None
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.bytes()[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    fn skip(&mut self, size: usize) -> bool {
        if size <= self.remaining() {
            self.pos += size;
            true
        } else {
            false
        }
    }

    fn get_pos(&self) -> usize {
        self.pos - self.start
    }

    fn mmap_view(&self) -> Option<&[u8]> {
        Some(&self.bytes()[self.pos..self.end])
    }

    fn open_subrange(&self, offset: usize, len: usize) -> Option<Box<dyn ByteInput>> {
        let sub_end = offset.checked_add(len)?;
        if sub_end > self.end - self.start {
            return None;
        }
        Some(Box::new(SliceIn {
            data: Arc::clone(&self.data),
            start: self.start + offset,
            end: self.start + sub_end,
            pos: self.start + offset,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_tracks_cursor() {
        let mut input = MemIn::from(vec![1, 2, 3, 4]);
        assert_eq!(input.remaining(), 4);
        input.get_byte();
        assert_eq!(input.remaining(), 3);
        assert!(input.skip(3));
        assert_eq!(input.remaining(), 0);
        assert_eq!(input.mmap_view(), Some(&[][..]));
    }

    #[test]
    fn test_subrange_shares_buffer() {
        let data = Arc::new(vec![10u8, 20, 30, 40, 50]);
        let input = MemIn::from(Arc::clone(&data));
        let sub = input.open_subrange(1, 3).unwrap();

        assert_eq!(sub.mmap_view(), Some(&[20u8, 30, 40][..]));
        assert_eq!(Arc::strong_count(&data), 3);
    }

    #[test]
    fn test_subrange_overflow_is_rejected() {
        let input = MemIn::from(vec![0u8; 4]);
        assert!(input.open_subrange(usize::MAX, 2).is_none());
        assert!(input.open_subrange(4, 0).is_some());
        assert!(input.open_subrange(5, 0).is_none());
    }
}
