//! Container pull parser.

use std::path::Path;

use ahash::{AHashMap, AHashSet};

use super::event::Event;
use super::format::*;
use crate::io::{self, ByteInput, MemIn};
use crate::Result;

/// Upper bound for a single buffer growth step when reading block payloads,
/// so a corrupt length field cannot trigger a huge allocation up front.
const READ_CHUNK: usize = 64 * 1024;

/// Location of raw blob bytes inside the input.
#[derive(Debug, Clone, Copy)]
struct BlobSpan {
    offset: usize,
    len: usize,
}

/// Outcome of decoding one tagged record.
enum Step {
    Event(Event),
    /// A block named in the skip set was consumed; nothing to report
    Skipped,
}

/// Pull parser over a container stream.
///
/// The reader never fails: any malformed or short read turns the current
/// event into [`Event::ReadError`], which then sticks. Sections are reported
/// as plain begin/end events; checking that they nest is up to the caller.
///
/// # Example
///
/// ```ignore
/// use morphstore::container::{ContainerReader, Event};
///
/// let mut reader = ContainerReader::open("piano.sm")?;
/// assert_eq!(reader.file_type(), "SpectMorph::Audio");
///
/// loop {
///     match reader.next_event() {
///         Event::Float { name, value } => println!("{} = {}", name, value),
///         Event::EndOfFile => break,
///         Event::ReadError => return Err(parse_error()),
///         _ => {}
///     }
/// }
/// ```
pub struct ContainerReader {
    input: Box<dyn ByteInput>,
    header: FileHeader,
    current: Event,
    started: bool,
    skip_events: AHashSet<String>,
    /// Raw blobs seen so far, by digest
    blob_index: AHashMap<String, BlobSpan>,
    /// Blob addressed by the current event
    current_blob: Option<BlobSpan>,
}

impl ContainerReader {
    /// Create a reader and parse the stream header.
    pub fn new(input: Box<dyn ByteInput>) -> Self {
        let mut reader = Self {
            input,
            header: FileHeader::unknown(),
            current: Event::EndOfFile,
            started: false,
            skip_events: AHashSet::new(),
            blob_index: AHashMap::new(),
            current_blob: None,
        };
        if let Some(header) = reader.read_header() {
            reader.header = header;
        }
        reader
    }

    /// Open a container file (memory-mapped when possible).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(io::open(path)?))
    }

    /// Read a container held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::new(Box::new(MemIn::from(data)))
    }

    /// File type from the header, `"unknown"` if the header was malformed.
    pub fn file_type(&self) -> &str {
        &self.header.file_type
    }

    /// Format version from the header, `0` if the header was malformed.
    pub fn file_version(&self) -> i32 {
        self.header.version
    }

    /// The parsed header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Skip float/uint16 blocks with this name without decoding them.
    ///
    /// Skipped blocks produce no event at all.
    pub fn add_skip_event(&mut self, name: impl Into<String>) {
        self.skip_events.insert(name.into());
    }

    /// The current event, reading the first one if necessary.
    pub fn event(&mut self) -> &Event {
        if !self.started {
            self.next_event();
        }
        &self.current
    }

    /// Advance to the next event.
    ///
    /// Once `EndOfFile` or `ReadError` has been reported, it is reported
    /// again on every further call.
    pub fn next_event(&mut self) -> &Event {
        if !(self.started && self.current.is_terminal()) {
            self.started = true;
            self.current = self.read_event();
        }
        &self.current
    }

    /// Open a bounded input over the bytes of the current `Blob` or `BlobRef`.
    pub fn open_blob(&self) -> Option<Box<dyn ByteInput>> {
        let span = self.current_blob?;
        self.input.open_subrange(span.offset, span.len)
    }

    /// Read the bytes of the current `Blob` or `BlobRef`.
    pub fn read_blob(&self) -> Option<Vec<u8>> {
        let span = self.current_blob?;
        let mut blob = self.input.open_subrange(span.offset, span.len)?;
        let mut data = vec![0u8; span.len];
        (blob.read(&mut data) == span.len).then_some(data)
    }

    fn read_event(&mut self) -> Event {
        self.current_blob = None;
        loop {
            match self.read_record() {
                Some(Step::Event(event)) => return event,
                Some(Step::Skipped) => continue,
                None => return Event::ReadError,
            }
        }
    }

    fn read_header(&mut self) -> Option<FileHeader> {
        if self.input.get_byte()? != Tag::Type.as_u8() {
            return None;
        }
        let file_type = self.read_raw_string()?;
        if self.input.get_byte()? != Tag::Version.as_u8() {
            return None;
        }
        let version = self.read_raw_int()?;
        Some(FileHeader { file_type, version })
    }

    fn read_record(&mut self) -> Option<Step> {
        let tag = Tag::from_u8(self.input.get_byte()?)?;

        let event = match tag {
            Tag::EndOfFile => {
                // 'Z' must be the physical end of the stream
                if self.input.get_byte().is_some() {
                    return None;
                }
                Event::EndOfFile
            }
            Tag::BeginSection => Event::BeginSection(self.read_raw_string()?),
            Tag::EndSection => Event::EndSection,
            Tag::Int => {
                let name = self.read_raw_string()?;
                let value = self.read_raw_int()?;
                Event::Int { name, value }
            }
            Tag::Float => {
                let name = self.read_raw_string()?;
                let value = f32::from_le_bytes(self.read_raw_array()?);
                Event::Float { name, value }
            }
            Tag::Bool => {
                let name = self.read_raw_string()?;
                let value = match self.input.get_byte()? {
                    0 => false,
                    1 => true,
                    _ => return None,
                };
                Event::Bool { name, value }
            }
            Tag::String => {
                let name = self.read_raw_string()?;
                let value = self.read_raw_string()?;
                Event::String { name, value }
            }
            Tag::FloatBlock => {
                let name = self.read_raw_string()?;
                if self.skip_events.contains(&name) {
                    self.skip_raw_block(4)?;
                    return Some(Step::Skipped);
                }
                let raw = self.read_raw_block(4)?;
                let values = raw
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                Event::FloatBlock { name, values }
            }
            Tag::Uint16Block => {
                let name = self.read_raw_string()?;
                if self.skip_events.contains(&name) {
                    self.skip_raw_block(2)?;
                    return Some(Step::Skipped);
                }
                let raw = self.read_raw_block(2)?;
                let values = raw
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                Event::Uint16Block { name, values }
            }
            Tag::Blob => {
                let name = self.read_raw_string()?;
                let len = self.read_raw_int()?;
                let digest = self.read_raw_string()?;
                if len == BLOB_REF_LENGTH {
                    let span = *self.blob_index.get(&digest)?;
                    self.current_blob = Some(span);
                    Event::BlobRef { name, digest }
                } else {
                    let len = usize::try_from(len).ok()?;
                    let span = BlobSpan {
                        offset: self.input.get_pos(),
                        len,
                    };
                    if !self.input.skip(len) {
                        return None;
                    }
                    self.blob_index.insert(digest.clone(), span);
                    self.current_blob = Some(span);
                    Event::Blob { name, len, digest }
                }
            }
            // header tags are only valid at the very start
            Tag::Type | Tag::Version => return None,
        };
        Some(Step::Event(event))
    }

    fn read_raw_string(&mut self) -> Option<String> {
        // fast path: scan for the terminator directly in mapped memory
        let scanned = self.input.mmap_view().map(|view| {
            view.iter()
                .position(|&b| b == 0)
                .map(|nul| view[..nul].to_vec())
        });

        let bytes = match scanned {
            Some(Some(bytes)) => {
                if !self.input.skip(bytes.len() + 1) {
                    return None;
                }
                bytes
            }
            Some(None) => return None,
            None => {
                let mut bytes = Vec::new();
                loop {
                    match self.input.get_byte()? {
                        0 => break,
                        b => bytes.push(b),
                    }
                }
                bytes
            }
        };
        String::from_utf8(bytes).ok()
    }

    fn read_raw_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let mut buf = [0u8; N];
        (self.input.read(&mut buf) == N).then_some(buf)
    }

    fn read_raw_int(&mut self) -> Option<i32> {
        self.read_raw_array().map(i32::from_le_bytes)
    }

    /// Read an int32 element count and return the payload size in bytes.
    fn read_block_size(&mut self, elem_size: usize) -> Option<usize> {
        let count = usize::try_from(self.read_raw_int()?).ok()?;
        count.checked_mul(elem_size)
    }

    fn read_raw_block(&mut self, elem_size: usize) -> Option<Vec<u8>> {
        let size = self.read_block_size(elem_size)?;
        if let Some(view) = self.input.mmap_view() {
            if view.len() < size {
                return None;
            }
        }

        let mut data = Vec::with_capacity(size.min(READ_CHUNK));
        while data.len() < size {
            let start = data.len();
            let chunk = (size - start).min(READ_CHUNK);
            data.resize(start + chunk, 0);
            if self.input.read(&mut data[start..]) != chunk {
                return None;
            }
        }
        Some(data)
    }

    fn skip_raw_block(&mut self, elem_size: usize) -> Option<()> {
        let size = self.read_block_size(elem_size)?;
        self.input.skip(size).then_some(())
    }
}
