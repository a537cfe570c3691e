//! Container stream writer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ahash::AHashSet;

use super::format::*;
use crate::{Error, Result};

/// Writer for container streams.
///
/// Every value is encoded little-endian regardless of host byte order.
/// Section nesting is not checked. Blobs are deduplicated by content digest
/// for the lifetime of the writer: a payload that was already written is
/// stored again only as a reference.
///
/// The terminating `'Z'` is appended by [`finish`](Self::finish), or by
/// `Drop` if the writer goes out of scope early.
pub struct ContainerWriter<W: Write> {
    /// `None` once finished
    sink: Option<W>,
    /// Digests of blobs already stored raw in this stream
    blob_digests: AHashSet<String>,
}

impl ContainerWriter<BufWriter<File>> {
    /// Create a container file, replacing any existing file.
    pub fn create(path: impl AsRef<Path>, file_type: &str, version: i32) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), file_type, version)
    }
}

impl<W: Write> ContainerWriter<W> {
    /// Wrap a sink and write the stream header.
    pub fn new(sink: W, file_type: &str, version: i32) -> Result<Self> {
        let mut writer = Self {
            sink: Some(sink),
            blob_digests: AHashSet::new(),
        };
        writer.put(&[Tag::Type.as_u8()])?;
        writer.write_raw_string(file_type)?;
        writer.put(&[Tag::Version.as_u8()])?;
        writer.write_raw_int(version)?;
        Ok(writer)
    }

    /// Open a section.
    pub fn begin_section(&mut self, name: &str) -> Result<()> {
        self.put(&[Tag::BeginSection.as_u8()])?;
        self.write_raw_string(name)
    }

    /// Close the innermost section.
    pub fn end_section(&mut self) -> Result<()> {
        self.put(&[Tag::EndSection.as_u8()])
    }

    pub fn write_bool(&mut self, name: &str, value: bool) -> Result<()> {
        self.put(&[Tag::Bool.as_u8()])?;
        self.write_raw_string(name)?;
        self.put(&[u8::from(value)])
    }

    pub fn write_int(&mut self, name: &str, value: i32) -> Result<()> {
        self.put(&[Tag::Int.as_u8()])?;
        self.write_raw_string(name)?;
        self.write_raw_int(value)
    }

    pub fn write_float(&mut self, name: &str, value: f32) -> Result<()> {
        self.put(&[Tag::Float.as_u8()])?;
        self.write_raw_string(name)?;
        self.put(&value.to_le_bytes())
    }

    pub fn write_string(&mut self, name: &str, value: &str) -> Result<()> {
        self.put(&[Tag::String.as_u8()])?;
        self.write_raw_string(name)?;
        self.write_raw_string(value)
    }

    pub fn write_float_block(&mut self, name: &str, values: &[f32]) -> Result<()> {
        self.put(&[Tag::FloatBlock.as_u8()])?;
        self.write_raw_string(name)?;
        self.write_raw_int(checked_len(name, values.len())?)?;

        let mut buffer = Vec::with_capacity(values.len() * 4);
        for value in values {
            buffer.extend_from_slice(&value.to_le_bytes());
        }
        self.put(&buffer)
    }

    pub fn write_uint16_block(&mut self, name: &str, values: &[u16]) -> Result<()> {
        self.put(&[Tag::Uint16Block.as_u8()])?;
        self.write_raw_string(name)?;
        self.write_raw_int(checked_len(name, values.len())?)?;

        let mut buffer = Vec::with_capacity(values.len() * 2);
        for value in values {
            buffer.extend_from_slice(&value.to_le_bytes());
        }
        self.put(&buffer)
    }

    /// Write a blob, or only a reference if identical bytes were already
    /// written by this writer.
    pub fn write_blob(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let digest = content_digest(data);

        self.put(&[Tag::Blob.as_u8()])?;
        self.write_raw_string(name)?;

        if self.blob_digests.contains(&digest) {
            self.write_raw_int(BLOB_REF_LENGTH)?;
            self.write_raw_string(&digest)
        } else {
            self.write_raw_int(checked_len(name, data.len())?)?;
            self.write_raw_string(&digest)?;
            self.put(data)?;
            self.blob_digests.insert(digest);
            Ok(())
        }
    }

    /// Append the end marker, flush, and return the sink.
    pub fn finish(mut self) -> Result<W> {
        match self.sink.take() {
            Some(mut sink) => {
                sink.write_all(&[Tag::EndOfFile.as_u8()])?;
                sink.flush()?;
                Ok(sink)
            }
            None => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "container writer already finished",
            ))),
        }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.write_all(bytes)?;
        }
        Ok(())
    }

    fn write_raw_string(&mut self, s: &str) -> Result<()> {
        if s.as_bytes().contains(&0) {
            return Err(Error::NulInString(s.to_string()));
        }
        self.put(s.as_bytes())?;
        self.put(&[0])
    }

    fn write_raw_int(&mut self, value: i32) -> Result<()> {
        self.put(&value.to_le_bytes())
    }
}

impl<W: Write> Drop for ContainerWriter<W> {
    fn drop(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            let result = sink
                .write_all(&[Tag::EndOfFile.as_u8()])
                .and_then(|()| sink.flush());
            if let Err(e) = result {
                log::warn!("Failed to terminate container stream: {}", e);
            }
        }
    }
}

fn checked_len(name: &str, len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| Error::BlockTooLarge {
        name: name.to_string(),
        len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let writer = ContainerWriter::new(Vec::new(), "T1", 7).unwrap();
        let data = writer.finish().unwrap();

        let mut expected = b"TT1\0V".to_vec();
        expected.extend_from_slice(&7i32.to_le_bytes());
        expected.push(b'Z');
        assert_eq!(data, expected);
    }

    #[test]
    fn test_little_endian_int() {
        let mut writer = ContainerWriter::new(Vec::new(), "T", 1).unwrap();
        writer.write_int("x", 0x0102_0304).unwrap();
        let data = writer.finish().unwrap();

        let body = &data[b"TT\0V".len() + 4..];
        assert_eq!(body, b"ix\0\x04\x03\x02\x01Z");
    }

    #[test]
    fn test_drop_appends_end_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("early.sm");
        {
            let mut writer = ContainerWriter::create(&path, "T1", 1).unwrap();
            writer.begin_section("h").unwrap();
            // dropped without finish()
        }
        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.last(), Some(&b'Z'));
        assert_eq!(data.iter().filter(|&&b| b == b'Z').count(), 1);
    }

    #[test]
    fn test_duplicate_blob_written_as_reference() {
        let mut writer = ContainerWriter::new(Vec::new(), "T1", 1).unwrap();
        writer.write_blob("a", &[9, 9, 9, 9]).unwrap();
        writer.write_blob("b", &[9, 9, 9, 9]).unwrap();
        let data = writer.finish().unwrap();

        let raw = data.windows(4).filter(|w| w == &[9, 9, 9, 9]).count();
        assert_eq!(raw, 1);
        let refs = data
            .windows(4)
            .filter(|w| *w == BLOB_REF_LENGTH.to_le_bytes())
            .count();
        assert_eq!(refs, 1);
    }

    #[test]
    fn test_nul_in_name_rejected() {
        let mut writer = ContainerWriter::new(Vec::new(), "T1", 1).unwrap();
        assert!(writer.write_int("bad\0name", 1).is_err());
    }
}
