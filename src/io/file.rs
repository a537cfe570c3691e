//! Buffered file inputs.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::ByteInput;

/// A bounded window over a file read through a `BufReader`.
struct FileWindow {
    path: PathBuf,
    reader: BufReader<File>,
    /// Absolute file offset of the window start
    base: u64,
    /// Window length
    len: usize,
    /// Cursor relative to `base`
    pos: usize,
}

impl FileWindow {
    fn open(path: &Path, base: u64, len: Option<usize>) -> std::io::Result<Self> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let available = file_len.saturating_sub(base) as usize;
        let len = match len {
            Some(len) if len > available => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "sub-range exceeds file length",
                ))
            }
            Some(len) => len,
            None => available,
        };
        if base > 0 {
            file.seek(SeekFrom::Start(base))?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            base,
            len,
            pos: 0,
        })
    }

    fn remaining(&self) -> usize {
        self.len - self.pos
    }

    fn get_byte(&mut self) -> Option<u8> {
        if self.remaining() == 0 {
            return None;
        }
        let mut byte = [0u8; 1];
        match self.reader.read_exact(&mut byte) {
            Ok(()) => {
                self.pos += 1;
                Some(byte[0])
            }
            Err(_) => None,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let want = buf.len().min(self.remaining());
        let mut done = 0;
        while done < want {
            match self.reader.read(&mut buf[done..want]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        self.pos += done;
        done
    }

    fn skip(&mut self, size: usize) -> bool {
        if size > self.remaining() {
            return false;
        }
        match self.reader.seek_relative(size as i64) {
            Ok(()) => {
                self.pos += size;
                true
            }
            Err(_) => false,
        }
    }

    fn open_subrange(&self, offset: usize, len: usize) -> Option<Box<dyn ByteInput>> {
        let end = offset.checked_add(len)?;
        if end > self.len {
            return None;
        }
        let sub = SubFileIn::open(&self.path, self.base + offset as u64, len).ok()?;
        Some(Box::new(sub))
    }
}

/// Buffered input over a whole file, used when memory mapping is unavailable.
pub struct FileIn {
    window: FileWindow,
}

impl FileIn {
    /// Open a file for buffered reading.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            window: FileWindow::open(path, 0, None)?,
        })
    }
}

/// Buffered input over `len` bytes of a file starting at an absolute offset.
///
/// Reads never cross the end of the window even if the file continues.
pub struct SubFileIn {
    window: FileWindow,
}

impl SubFileIn {
    /// Open a window of `len` bytes starting at `offset`.
    pub fn open(path: &Path, offset: u64, len: usize) -> std::io::Result<Self> {
        Ok(Self {
            window: FileWindow::open(path, offset, Some(len))?,
        })
    }
}

impl ByteInput for FileIn {
    fn get_byte(&mut self) -> Option<u8> {
        self.window.get_byte()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.window.read(buf)
    }

    fn skip(&mut self, size: usize) -> bool {
        self.window.skip(size)
    }

    fn get_pos(&self) -> usize {
        self.window.pos
    }

    fn mmap_view(&self) -> Option<&[u8]> {
        None
    }

    fn open_subrange(&self, offset: usize, len: usize) -> Option<Box<dyn ByteInput>> {
        self.window.open_subrange(offset, len)
    }
}

impl ByteInput for SubFileIn {
    fn get_byte(&mut self) -> Option<u8> {
        self.window.get_byte()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.window.read(buf)
    }

    fn skip(&mut self, size: usize) -> bool {
        self.window.skip(size)
    }

    fn get_pos(&self) -> usize {
        self.window.pos
    }

    fn mmap_view(&self) -> Option<&[u8]> {
        None
    }

    fn open_subrange(&self, offset: usize, len: usize) -> Option<Box<dyn ByteInput>> {
        self.window.open_subrange(offset, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sub_file_rejects_range_past_end() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123").unwrap();
        file.flush().unwrap();

        assert!(SubFileIn::open(file.path(), 2, 2).is_ok());
        assert!(SubFileIn::open(file.path(), 2, 3).is_err());
    }

    #[test]
    fn test_sub_file_stops_at_window_end() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.flush().unwrap();

        let mut input = SubFileIn::open(file.path(), 3, 4).unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(input.read(&mut buf), 4);
        assert_eq!(&buf[..4], b"3456");
        assert_eq!(input.get_byte(), None);
        assert!(!input.skip(1));
    }
}
