//! Encoder collaborator and encode requests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::key::GroupId;
use crate::audio::Audio;
use crate::error::Result;

/// Cooperative cancellation check, polled by the encoder.
pub type CancelFn<'a> = &'a (dyn Fn() -> bool + Sync);

/// Turns raw samples of one note into an [`Audio`] model.
///
/// Implementations should poll `cancel` and return
/// [`Error::Cancelled`](crate::Error::Cancelled) once it reports `true`.
pub trait Encoder: Send + Sync {
    fn encode(
        &self,
        samples: &[f32],
        note: u8,
        config: &EncoderConfig,
        cancel: CancelFn<'_>,
    ) -> Result<Audio>;
}

/// Encoder parameters as sorted key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncoderConfig {
    entries: BTreeMap<String, String>,
}

impl EncoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EncoderConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn never_cancel() -> bool {
    false
}

/// One call to [`InstEncCache::encode`](super::InstEncCache::encode).
#[derive(Clone)]
pub struct EncodeRequest<'a> {
    pub(crate) group: Option<GroupId>,
    pub(crate) samples: &'a [f32],
    pub(crate) content_hash: String,
    pub(crate) note: u8,
    clip: Option<(usize, usize)>,
    pub(crate) config: EncoderConfig,
    pub(crate) cancel: CancelFn<'a>,
}

impl<'a> EncodeRequest<'a> {
    /// Request encoding all of `samples` for `note`.
    ///
    /// `content_hash` identifies the source data, see
    /// [`samples_content_hash`](super::samples_content_hash).
    pub fn new(samples: &'a [f32], content_hash: impl Into<String>, note: u8) -> Self {
        Self {
            group: None,
            samples,
            content_hash: content_hash.into(),
            note,
            clip: None,
            config: EncoderConfig::default(),
            cancel: &never_cancel,
        }
    }

    /// Share cache entries with other requests of the same group.
    ///
    /// Without a group the request gets a random one of its own.
    pub fn with_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    /// Encode only samples `start..end`.
    pub fn with_clip(mut self, start: usize, end: usize) -> Self {
        self.clip = Some((start, end));
        self
    }

    pub fn with_config(mut self, config: EncoderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFn<'a>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Clip bounds clamped to the sample buffer, with `start <= end`.
    pub fn clip_bounds(&self) -> (usize, usize) {
        let len = self.samples.len();
        let (start, end) = self.clip.unwrap_or((0, len));
        let end = end.min(len);
        (start.min(end), end)
    }

    /// The samples handed to the encoder.
    pub fn clipped_samples(&self) -> &'a [f32] {
        let (start, end) = self.clip_bounds();
        &self.samples[start..end]
    }
}

impl std::fmt::Debug for EncodeRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeRequest")
            .field("group", &self.group)
            .field("samples", &self.samples.len())
            .field("content_hash", &self.content_hash)
            .field("note", &self.note)
            .field("clip", &self.clip_bounds())
            .field("config", &self.config)
            .finish()
    }
}
