//! Process-wide cache instance.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::cache::{CacheConfig, Encoder, InstEncCache};
use crate::error::Result;

/// Global cache slot
static GLOBAL_CACHE: Lazy<RwLock<Option<Arc<InstEncCache>>>> = Lazy::new(|| RwLock::new(None));

/// Install the global cache, replacing any previous instance.
///
/// Holders of the previous instance keep using it until they drop it.
pub fn init_inst_enc_cache(config: CacheConfig, encoder: Box<dyn Encoder>) -> Result<Arc<InstEncCache>> {
    config.validate()?;
    let cache = Arc::new(InstEncCache::new(config, encoder));

    let mut guard = GLOBAL_CACHE.write();
    *guard = Some(cache.clone());

    log::debug!("Initialized global cache in {:?}", cache.config().cache_dir);

    Ok(cache)
}

/// The global cache, if [`init_inst_enc_cache`] was called.
pub fn inst_enc_cache() -> Option<Arc<InstEncCache>> {
    GLOBAL_CACHE.read().clone()
}

/// Check if the global cache is initialized.
pub fn is_initialized() -> bool {
    GLOBAL_CACHE.read().is_some()
}
