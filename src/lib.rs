//! MorphStore - container files and an encoding cache for spectral instruments.
//!
//! This crate provides the storage layer of a spectral-modeling synthesizer:
//! a tagged binary container format for analysis results, and a cache that
//! avoids re-running expensive note encodings.
//!
//! # Features
//!
//! - **Byte inputs**: memory-mapped, in-memory and buffered-file sources behind one trait
//! - **Container codec**: pull reader producing typed events, writer with blob deduplication
//! - **Audio model**: spectral note data stored as a container
//! - **Encoding cache**: memory + disk tiers, digest-validated, size bounded
//! - **Thread-safe**: the cache can be shared across threads
//!
//! # Quick Start
//!
//! ```ignore
//! use morphstore::container::{ContainerReader, ContainerWriter, Event};
//!
//! let mut writer = ContainerWriter::new(Vec::new(), "Example", 1)?;
//! writer.write_int("x", 5)?;
//! let data = writer.finish()?;
//!
//! let mut reader = ContainerReader::from_bytes(data);
//! while let Event::Int { name, value } = reader.next_event() {
//!     println!("{} = {}", name, value);
//! }
//! ```
//!
//! # Encoding Cache
//!
//! ```ignore
//! use morphstore::cache::{CacheConfig, EncodeRequest, GroupId, InstEncCache};
//!
//! let cache = InstEncCache::new(CacheConfig::new("/tmp/morph-cache"), Box::new(my_encoder));
//! let request = EncodeRequest::new(&samples, content_hash, 60)
//!     .with_group(GroupId::from_name("Trumpet"))
//!     .with_clip(0, samples.len());
//! let audio = cache.encode(&request)?;
//! ```

mod error;
mod global;

pub mod audio;
pub mod cache;
pub mod container;
pub mod io;

pub use audio::{Audio, AudioBlock, AudioLoadOptions};
pub use cache::{CacheConfig, CacheStats, EncodeRequest, Encoder, EncoderConfig, GroupId, InstEncCache};
pub use container::{ContainerReader, ContainerWriter, Event};
pub use error::{Error, Result};
pub use global::{init_inst_enc_cache, inst_enc_cache, is_initialized};
