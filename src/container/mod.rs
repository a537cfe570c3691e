//! Self-describing binary container format.
//!
//! A container is a header followed by a flat stream of tagged events.
//! Sections group events and may nest; blobs are deduplicated by content
//! digest within one stream.
//!
//! # Stream Structure
//!
//! ```text
//! 'T' <type>\0 'V' <version:i32le>      header
//! 'B' <name>\0                          begin section
//! 'E'                                   end section
//! 'b' <name>\0 <0|1>                    bool
//! 'i' <name>\0 <i32le>                  int
//! 'f' <name>\0 <f32le>                  float
//! 's' <name>\0 <value>\0                string
//! 'F' <name>\0 <count:i32le> <f32le>*   float block
//! '6' <name>\0 <count:i32le> <u16le>*   uint16 block
//! 'O' <name>\0 <len:i32le> <digest>\0 <bytes>   blob (len = -1: reference)
//! 'Z'                                   end of stream, last byte
//! ```

mod event;
mod format;
mod reader;
mod writer;


pub use event::Event;
pub use format::*;
pub use reader::ContainerReader;
pub use writer::ContainerWriter;
