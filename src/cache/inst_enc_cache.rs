//! Two-tier (memory + disk) cache of encoded instrument notes.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

use super::config::CacheConfig;
use super::disk;
use super::encoder::{EncodeRequest, Encoder};
use super::key::{version_digest, CacheKey, GroupId, VersionInputs};
use crate::audio::Audio;
use crate::error::Result;
use crate::io::MemIn;

/// Counters and sizes reported by [`InstEncCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently held in memory
    pub memory_entries: usize,
    /// Payload bytes currently held in memory
    pub memory_bytes: usize,
    /// Requests answered from memory or disk
    pub hits: u64,
    /// Requests that had to run the encoder
    pub misses: u64,
    /// Successful encoder runs
    pub encodes: u64,
}

struct MemoryEntry {
    version: String,
    data: Arc<Vec<u8>>,
    read_stamp: u64,
}

#[derive(Default)]
struct CacheState {
    entries: AHashMap<CacheKey, MemoryEntry>,
    read_stamp: u64,
    stores: u64,
    hits: u64,
    misses: u64,
    encodes: u64,
    /// Most recently stored disk file, never evicted
    last_stored: Option<PathBuf>,
}

impl CacheState {
    fn next_stamp(&mut self) -> u64 {
        self.read_stamp += 1;
        self.read_stamp
    }

    /// Payload of `key` if it is cached at `version`, consulting the disk
    /// tier when memory holds nothing or a different version.
    ///
    /// Without `key` the disk payload is returned but not kept in memory.
    fn lookup(
        &mut self,
        config: &CacheConfig,
        key: Option<&CacheKey>,
        version: &str,
    ) -> Option<Arc<Vec<u8>>> {
        let key = match key {
            Some(key) => key,
            None => return disk::load(&config.cache_dir, version).map(Arc::new),
        };

        let in_memory = self.entries.get(key).is_some_and(|e| e.version == version);
        if !in_memory {
            let data = disk::load(&config.cache_dir, version)?;
            log::debug!("cache {}: loaded from disk", key);
            self.insert(key.clone(), version.to_string(), Arc::new(data), config.memory_budget);
        }

        let read_stamp = self.next_stamp();
        let entry = self.entries.get_mut(key)?;
        entry.read_stamp = read_stamp;
        Some(entry.data.clone())
    }

    /// Add a memory entry as the most recent one, evicting older entries
    /// if the memory tier goes over `budget`.
    fn insert(&mut self, key: CacheKey, version: String, data: Arc<Vec<u8>>, budget: usize) {
        let read_stamp = self.next_stamp();
        self.entries.insert(
            key,
            MemoryEntry {
                version,
                data,
                read_stamp,
            },
        );
        if self.memory_bytes() > budget {
            self.evict_memory(budget);
        }
    }

    fn memory_bytes(&self) -> usize {
        self.entries.values().map(|e| e.data.len()).sum()
    }

    /// Drop the least recently read entries until the rest fits in `budget`.
    ///
    /// The most recently read entry is always kept.
    fn evict_memory(&mut self, budget: usize) -> usize {
        let mut ranked: Vec<(u64, usize, CacheKey)> = self
            .entries
            .iter()
            .map(|(k, e)| (e.read_stamp, e.data.len(), k.clone()))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        let mut total = 0usize;
        let mut over_budget = false;
        let mut removed = 0;
        for (i, (_, size, key)) in ranked.into_iter().enumerate() {
            total = total.saturating_add(size);
            if i > 0 && total > budget {
                over_budget = true;
            }
            if over_budget {
                self.entries.remove(&key);
                removed += 1;
            }
        }
        removed
    }
}

/// Cache in front of an expensive [`Encoder`].
///
/// Results are keyed by group and note and validated by a digest over every
/// encode input, so a changed input never returns a stale result. One lock
/// guards lookups, stores and evictions; the encoder itself runs unlocked, so
/// concurrent misses for the same key may encode twice (last store wins).
pub struct InstEncCache {
    config: CacheConfig,
    encoder: Box<dyn Encoder>,
    state: Mutex<CacheState>,
}

impl InstEncCache {
    pub fn new(config: CacheConfig, encoder: Box<dyn Encoder>) -> Self {
        Self {
            config,
            encoder,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the encoded note for `request`, from cache if possible.
    ///
    /// Encoder failures (including cancellation) are returned and nothing is
    /// cached. Failing to persist a fresh result is logged, not returned.
    pub fn encode(&self, request: &EncodeRequest<'_>) -> Result<Audio> {
        // a random group lives for this call only, so it never enters memory
        let anonymous = request.group.is_none();
        let group = request.group.clone().unwrap_or_else(GroupId::random);
        let key = CacheKey::new(&group, request.note);
        let (clip_start, clip_end) = request.clip_bounds();
        let version = version_digest(&VersionInputs {
            content_hash: &request.content_hash,
            app_version: &self.config.app_version,
            note: request.note,
            clip_start,
            clip_end,
            config: &request.config,
        });

        let memory_key = (!anonymous).then_some(&key);
        let cached = self.state.lock().lookup(&self.config, memory_key, &version);
        if let Some(data) = cached {
            match Audio::load(Box::new(MemIn::from(data))) {
                Ok(audio) => {
                    log::debug!("cache {}: hit", key);
                    self.state.lock().hits += 1;
                    return Ok(audio);
                }
                Err(e) => {
                    log::warn!("cache {}: undecodable entry, re-encoding: {}", key, e);
                    self.state.lock().entries.remove(&key);
                }
            }
        }

        log::debug!("cache {}: miss", key);
        self.state.lock().misses += 1;

        let audio = self.encoder.encode(
            request.clipped_samples(),
            request.note,
            &request.config,
            request.cancel,
        )?;
        let data = audio.to_bytes()?;

        let mut state = self.state.lock();
        state.encodes += 1;
        match disk::store(&self.config.cache_dir, &key, &version, &data) {
            Ok(path) => state.last_stored = Some(path),
            Err(e) => log::warn!("cache {}: failed to store on disk: {}", key, e),
        }
        if !anonymous {
            state.insert(key, version, Arc::new(data), self.config.memory_budget);
        }
        state.stores += 1;
        if state.stores % self.config.effective_interval() == 0 {
            self.evict_locked(&mut state);
        }

        Ok(audio)
    }

    /// Drop the memory tier. Disk files stay and are reloaded on demand.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Run both eviction passes now.
    pub fn evict_now(&self) {
        let mut state = self.state.lock();
        self.evict_locked(&mut state);
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            memory_entries: state.entries.len(),
            memory_bytes: state.memory_bytes(),
            hits: state.hits,
            misses: state.misses,
            encodes: state.encodes,
        }
    }

    fn evict_locked(&self, state: &mut CacheState) {
        let disk_removed = disk::evict(
            &self.config.cache_dir,
            self.config.disk_budget,
            state.last_stored.as_deref(),
        );
        let memory_removed = state.evict_memory(self.config.memory_budget);
        if disk_removed > 0 || memory_removed > 0 {
            log::debug!(
                "eviction removed {} disk files, {} memory entries",
                disk_removed,
                memory_removed
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EncoderConfig;
    use crate::error::Error;
    use crate::io::ByteInput;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubEncoder {
        calls: Arc<AtomicUsize>,
    }

    impl Encoder for StubEncoder {
        fn encode(
            &self,
            samples: &[f32],
            note: u8,
            _config: &EncoderConfig,
            cancel: &(dyn Fn() -> bool + Sync),
        ) -> Result<Audio> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if cancel() {
                return Err(Error::Cancelled);
            }
            Ok(Audio {
                mix_freq: 48000.0,
                fundamental_freq: 440.0 * 2f32.powf((note as f32 - 69.0) / 12.0),
                original_samples: samples.to_vec(),
                ..Default::default()
            })
        }
    }

    fn cache(config: CacheConfig) -> (InstEncCache, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let encoder = StubEncoder {
            calls: calls.clone(),
        };
        (InstEncCache::new(config, Box::new(encoder)), calls)
    }

    #[test]
    fn test_hit_after_miss() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, calls) = cache(CacheConfig::new(dir.path()));
        let samples = vec![0.25f32; 64];
        let req = EncodeRequest::new(&samples, "h1", 60).with_group(GroupId::from_name("piano"));

        let a = cache.encode(&req).unwrap();
        let b = cache.encode(&req).unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.encodes), (1, 1, 1));
        assert_eq!(stats.memory_entries, 1);
        assert_eq!(stats.memory_bytes, a.to_bytes().unwrap().len());
    }

    #[test]
    fn test_clip_reaches_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache(CacheConfig::new(dir.path()));
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let req = EncodeRequest::new(&samples, "h1", 60).with_clip(2, 4);

        let audio = cache.encode(&req).unwrap();
        assert_eq!(audio.original_samples, vec![2.0, 3.0]);
    }

    #[test]
    fn test_cancelled_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, calls) = cache(CacheConfig::new(dir.path()));
        let samples = vec![0.0f32; 8];
        let group = GroupId::from_name("x");
        let cancel = || true;
        let req = EncodeRequest::new(&samples, "h1", 60)
            .with_group(group.clone())
            .with_cancel(&cancel);

        assert!(matches!(cache.encode(&req), Err(Error::Cancelled)));
        assert_eq!(cache.stats().memory_entries, 0);
        assert!(disk::list_entries(dir.path()).is_empty());

        let req = EncodeRequest::new(&samples, "h1", 60).with_group(group);
        cache.encode(&req).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_undecodable_memory_entry_is_reencoded() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, calls) = cache(CacheConfig::new(dir.path()));
        let samples = vec![0.0f32; 8];
        let req = EncodeRequest::new(&samples, "h1", 60).with_group(GroupId::from_name("x"));
        cache.encode(&req).unwrap();

        for entry in cache.state.lock().entries.values_mut() {
            entry.data = Arc::new(b"junk".to_vec());
        }
        cache.encode(&req).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_memory_eviction_ranks_by_read_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache(CacheConfig::new(dir.path()).with_eviction_interval(1000));
        let samples = vec![0.0f32; 16];
        let group = GroupId::from_name("x");
        for note in 60..63u8 {
            let req = EncodeRequest::new(&samples, "h1", note).with_group(group.clone());
            cache.encode(&req).unwrap();
        }
        // reading note 60 makes it the most recent
        let req = EncodeRequest::new(&samples, "h1", 60).with_group(group.clone());
        cache.encode(&req).unwrap();

        let entry_size = cache.stats().memory_bytes / 3;
        let mut state = cache.state.lock();
        assert_eq!(state.evict_memory(entry_size), 2);
        assert!(state.entries.contains_key(&CacheKey::new(&group, 60)));
    }

    #[test]
    fn test_memory_input_shares_payload() {
        let data = Arc::new(vec![1u8, 2, 3]);
        let input = MemIn::from(data.clone());
        assert_eq!(input.mmap_view(), Some(&[1u8, 2, 3][..]));
        assert_eq!(Arc::strong_count(&data), 2);
    }
}
