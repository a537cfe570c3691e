//! Stream events produced by the container reader.

/// One event of a container stream.
///
/// The reader keeps exactly one current event, replaced on every call to
/// [`ContainerReader::next_event`](super::ContainerReader::next_event).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Start of a section
    BeginSection(String),
    /// End of the innermost open section
    EndSection,
    /// Named bool
    Bool { name: String, value: bool },
    /// Named int32
    Int { name: String, value: i32 },
    /// Named float32
    Float { name: String, value: f32 },
    /// Named string
    String { name: String, value: String },
    /// Named float32 array
    FloatBlock { name: String, values: Vec<f32> },
    /// Named uint16 array
    Uint16Block { name: String, values: Vec<u16> },
    /// Raw blob; the bytes stay in the input until opened
    Blob {
        name: String,
        len: usize,
        digest: String,
    },
    /// Reference to a blob stored earlier in the same stream
    BlobRef { name: String, digest: String },
    /// Clean end of stream
    EndOfFile,
    /// Malformed or truncated stream; terminal
    ReadError,
}

impl Event {
    /// Name of the event, for events that carry one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Event::BeginSection(name)
            | Event::Bool { name, .. }
            | Event::Int { name, .. }
            | Event::Float { name, .. }
            | Event::String { name, .. }
            | Event::FloatBlock { name, .. }
            | Event::Uint16Block { name, .. }
            | Event::Blob { name, .. }
            | Event::BlobRef { name, .. } => Some(name),
            Event::EndSection | Event::EndOfFile | Event::ReadError => None,
        }
    }

    /// Whether no further events can follow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::EndOfFile | Event::ReadError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name() {
        assert_eq!(Event::BeginSection("frame".into()).name(), Some("frame"));
        assert_eq!(
            Event::Int {
                name: "zeropad".into(),
                value: 4
            }
            .name(),
            Some("zeropad")
        );
        assert_eq!(Event::EndSection.name(), None);
    }

    #[test]
    fn test_terminal_events() {
        assert!(Event::EndOfFile.is_terminal());
        assert!(Event::ReadError.is_terminal());
        assert!(!Event::EndSection.is_terminal());
    }
}
