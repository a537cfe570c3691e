//! Byte input sources for the container reader.
//!
//! All variants implement [`ByteInput`]: sequential reads with cheap skips,
//! an optional zero-copy view of the remaining bytes, and the ability to hand
//! out a bounded input over a sub-range (used for lazy blob access).
//!
//! | variant | backing | `mmap_view` | sub-range |
//! |---------|---------|-------------|-----------|
//! | [`MmapIn`] | memory-mapped file | yes | shares the mapping |
//! | [`MemIn`] | shared in-memory buffer | yes | shares the buffer |
//! | [`FileIn`] | buffered file | no | reopens as [`SubFileIn`] |
//! | [`SubFileIn`] | window of a buffered file | no | nested window |

mod file;
mod mmap;

use std::io::ErrorKind;
use std::path::Path;

pub use file::{FileIn, SubFileIn};
pub use mmap::{MemIn, MmapIn, SliceIn};

use crate::{Error, Result};

/// Environment variable that disables memory mapping in [`open`].
pub const NO_MMAP_ENV: &str = "MORPHSTORE_NOMMAP";

/// Uniform sequential/random-access byte input.
///
/// None of these operations fail loudly: short reads and `None` results are
/// the only signals, and the container reader turns them into a read error.
pub trait ByteInput: Send {
    /// Read one byte, `None` at end of input.
    fn get_byte(&mut self) -> Option<u8>;

    /// Read up to `buf.len()` bytes, returning how many were read.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Advance by `size` bytes. Returns `false` (without moving) if fewer
    /// than `size` bytes remain.
    fn skip(&mut self, size: usize) -> bool;

    /// Current offset relative to the start of this input.
    fn get_pos(&self) -> usize;

    /// Zero-copy view of the remaining bytes, if the input is memory backed.
    fn mmap_view(&self) -> Option<&[u8]>;

    /// Open an independent input over `len` bytes starting at `offset`
    /// (relative to the start of this input).
    fn open_subrange(&self, offset: usize, len: usize) -> Option<Box<dyn ByteInput>>;
}

/// Open a file for reading, preferring a memory mapping.
///
/// Falls back to buffered reads when mapping fails or when
/// [`NO_MMAP_ENV`] is set.
pub fn open(path: impl AsRef<Path>) -> Result<Box<dyn ByteInput>> {
    let allow_mmap = std::env::var_os(NO_MMAP_ENV).is_none();
    open_with_mmap(path, allow_mmap)
}

/// Open a file for reading, using a memory mapping only if `allow_mmap` is set.
pub fn open_with_mmap(path: impl AsRef<Path>, allow_mmap: bool) -> Result<Box<dyn ByteInput>> {
    let path = path.as_ref();

    if allow_mmap {
        match MmapIn::open(path) {
            Ok(input) => return Ok(Box::new(input)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::FileNotFound(path.to_path_buf()))
            }
            Err(e) => log::debug!("mmap unavailable for {:?}, using buffered reads: {}", path, e),
        }
    }

    match FileIn::open(path) {
        Ok(input) => Ok(Box::new(input)),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::FileNotFound(path.to_path_buf())),
        Err(e) => Err(e.into()),
    }
}
