//! Instrument encoding cache.
//!
//! [`InstEncCache`] sits in front of an [`Encoder`] and keeps encoded notes
//! in two tiers:
//!
//! - memory: a map from [`CacheKey`] to the serialized [`Audio`](crate::audio::Audio),
//!   ranked for eviction by a read-stamp counter
//! - disk: one file per key under [`CacheConfig::cache_dir`], ranked by
//!   modification time
//!
//! An entry is valid only while its version digest matches the digest of the
//! current request. Entry lifecycle:
//!
//! ```text
//! absent --encode--> memory + disk --memory eviction--> disk only
//!    ^                    ^                                 |
//!    |                    +-------- next lookup ------------+
//!    +------------------------- disk eviction --------------+
//! ```

mod config;
pub mod disk;
mod encoder;
mod inst_enc_cache;
mod key;

pub use config::{CacheConfig, DEFAULT_DISK_BUDGET, DEFAULT_EVICTION_INTERVAL, DEFAULT_MEMORY_BUDGET};
pub use encoder::{CancelFn, EncodeRequest, Encoder, EncoderConfig};
pub use inst_enc_cache::{CacheStats, InstEncCache};
pub use key::{samples_content_hash, version_digest, CacheKey, GroupId, VersionInputs};
