//! Container format constants and structures.

use sha2::{Digest, Sha256};

/// File type reported when the header does not have the expected shape.
pub const UNKNOWN_FILE_TYPE: &str = "unknown";

/// Blob length marking a reference to a blob stored earlier in the stream.
pub const BLOB_REF_LENGTH: i32 = -1;

/// Event discriminant byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    /// Header: file type (NUL-terminated)
    Type = b'T',
    /// Header: format version (int32 LE)
    Version = b'V',
    /// End of stream, must be the last byte
    EndOfFile = b'Z',
    /// Section start (NUL-terminated name)
    BeginSection = b'B',
    /// Section end
    EndSection = b'E',
    /// Named int32
    Int = b'i',
    /// Named float32
    Float = b'f',
    /// Named bool (one byte, 0 or 1)
    Bool = b'b',
    /// Named NUL-terminated string
    String = b's',
    /// Named float32 array
    FloatBlock = b'F',
    /// Named uint16 array
    Uint16Block = b'6',
    /// Named blob or blob reference
    Blob = b'O',
}

impl Tag {
    /// Convert from a raw byte.
    ///
    /// Returns `None` for bytes that are not a known tag.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            b'T' => Some(Tag::Type),
            b'V' => Some(Tag::Version),
            b'Z' => Some(Tag::EndOfFile),
            b'B' => Some(Tag::BeginSection),
            b'E' => Some(Tag::EndSection),
            b'i' => Some(Tag::Int),
            b'f' => Some(Tag::Float),
            b'b' => Some(Tag::Bool),
            b's' => Some(Tag::String),
            b'F' => Some(Tag::FloatBlock),
            b'6' => Some(Tag::Uint16Block),
            b'O' => Some(Tag::Blob),
            _ => None,
        }
    }

    /// Convert to the raw byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Parsed container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Free-form file type, e.g. `"SpectMorph::Audio"`
    pub file_type: String,
    /// Format version of that file type
    pub version: i32,
}

impl FileHeader {
    /// Header reported for streams that do not start with a valid header.
    pub fn unknown() -> Self {
        Self {
            file_type: UNKNOWN_FILE_TYPE.to_string(),
            version: 0,
        }
    }

    /// Check file type and version against what a loader supports.
    pub fn validate(&self, expected_type: &str, max_version: i32) -> crate::Result<()> {
        if self.file_type != expected_type {
            return Err(crate::Error::InvalidFileType {
                expected: expected_type.to_string(),
                actual: self.file_type.clone(),
            });
        }
        if self.version < 1 || self.version > max_version {
            return Err(crate::Error::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::unknown()
    }
}

/// SHA-256 content digest as lowercase hex.
pub fn content_digest(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        for byte in 0u8..=255 {
            if let Some(tag) = Tag::from_u8(byte) {
                assert_eq!(tag.as_u8(), byte);
            }
        }
        assert_eq!(Tag::from_u8(b'6'), Some(Tag::Uint16Block));
        assert_eq!(Tag::from_u8(b'x'), None);
        assert_eq!(Tag::from_u8(0), None);
    }

    #[test]
    fn test_content_digest() {
        // Known SHA-256 test vector
        assert_eq!(
            content_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(content_digest(b"hello"), content_digest(b"world"));
        assert_eq!(content_digest(&[]).len(), 64);
    }

    #[test]
    fn test_header_validation() {
        let header = FileHeader {
            file_type: "T1".to_string(),
            version: 7,
        };
        assert!(header.validate("T1", 7).is_ok());
        assert!(matches!(
            header.validate("T2", 7),
            Err(crate::Error::InvalidFileType { .. })
        ));
        assert!(matches!(
            header.validate("T1", 6),
            Err(crate::Error::UnsupportedVersion(7))
        ));
        assert!(FileHeader::unknown().validate("T1", 7).is_err());
    }
}
