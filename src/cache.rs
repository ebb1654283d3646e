//! Engine Cache
//!
//! One [`SniffEngine`] per thread, opened lazily on first use and kept for
//! the lifetime of the thread. Engines are never shared between threads, so
//! a classification never waits on another thread's classification.
//!
//! Each thread's engine lives in its own slot behind a mutex. The calling
//! thread holds its slot for the duration of an operation; the only other
//! party that ever locks it is [`EngineCache::reconfigure`], which therefore
//! waits for in-flight operations to finish before releasing their engines.
//! Every engine remembers the configuration generation it was built for, and
//! a slot whose engine is older than the current generation is rebuilt on
//! next use.

use crate::ContentType;
use crate::engine::{DEFAULT_MODE, SniffEngine};
use crate::error::Result;
use crate::source::Source;
use parking_lot::{Mutex, RwLock};
use sniff_config::Config;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};
use std::thread::{self, ThreadId};
use tracing::instrument;

static GLOBAL: LazyLock<EngineCache> = LazyLock::new(|| {
    let config = Config::load().unwrap_or_else(|err| {
        tracing::warn!(error = ?err, "Could not load configuration; using defaults");
        Config::default()
    });
    EngineCache::from_config(&config)
});

thread_local! {
    static EXIT_HOOK: RefCell<ExitHook> = RefCell::new(ExitHook { thread: thread::current().id(), caches: Vec::new() });
}

/// An engine and the configuration generation it was opened for.
#[derive(Debug)]
struct Built {
    generation: u64,
    engine: SniffEngine,
}

type Slot = Arc<Mutex<Option<Built>>>;

#[derive(Clone, Debug)]
struct Settings {
    database: PathBuf,
    prefix_size: usize,
    generation: u64,
}

#[derive(Debug)]
struct Shared {
    settings: RwLock<Settings>,
    slots: Mutex<HashMap<ThreadId, Slot>>,
}

/// Per-thread engines over one configured signature database.
///
/// Cloning is cheap and shares the engines.
#[derive(Clone, Debug)]
pub struct EngineCache {
    shared: Arc<Shared>,
}
impl EngineCache {
    /// A cache over the database at `database`, inspecting
    /// [`DEFAULT_PREFIX_SIZE`](sniff_config::DEFAULT_PREFIX_SIZE) bytes of
    /// content. The path is only checked when the first engine is opened.
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self::with_settings(database.into(), sniff_config::DEFAULT_PREFIX_SIZE)
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_settings(config.resolve_database(), config.prefix_size)
    }

    fn with_settings(database: PathBuf, prefix_size: usize) -> Self {
        tracing::debug!(database = %database.display(), prefix_size, "Engine cache created");
        let settings = Settings { database, prefix_size, generation: 0 };
        Self { shared: Arc::new(Shared { settings: RwLock::new(settings), slots: Mutex::new(HashMap::new()) }) }
    }

    /// The process-wide cache, configured from [`Config::load`] on first use.
    pub fn global() -> &'static EngineCache {
        &GLOBAL
    }

    /// Run `f` with the calling thread's engine, opening it first if this
    /// thread has none or the database was reconfigured since.
    ///
    /// Opening errors are returned as-is; the next call tries again. `f` must
    /// not call back into the same cache.
    pub fn with_engine<T>(&self, f: impl FnOnce(&mut SniffEngine) -> Result<T>) -> Result<T> {
        let slot = self.slot();
        let mut slot = slot.lock();
        let settings = self.shared.settings.read().clone();
        let built = match slot.take() {
            Some(built) if built.generation == settings.generation => built,
            stale => {
                drop(stale);
                let engine = SniffEngine::open(DEFAULT_MODE, &settings.database)?;
                tracing::debug!(generation = settings.generation, database = %settings.database.display(), "Engine built");
                Built { generation: settings.generation, engine }
            },
        };
        f(&mut slot.insert(built).engine)
    }

    /// The calling thread's slot, registered on first use.
    fn slot(&self) -> Slot {
        let thread = thread::current().id();
        let mut slots = self.shared.slots.lock();
        if let Some(slot) = slots.get(&thread) {
            return Arc::clone(slot);
        }
        let slot = Slot::default();
        slots.insert(thread, Arc::clone(&slot));
        drop(slots);
        let registered = EXIT_HOOK.try_with(|hook| hook.borrow_mut().register(&self.shared));
        if registered.is_err() {
            tracing::trace!(?thread, "Thread is exiting; engine will be released with the cache");
        }
        slot
    }

    /// Switch to the database at `database`.
    ///
    /// Every existing engine is released: idle ones immediately, busy ones
    /// once their current operation returns. Each thread opens a new engine
    /// against `database` on its next call.
    #[instrument(skip_all, fields(database = %database.as_ref().display(), generation, released))]
    pub fn reconfigure(&self, database: impl AsRef<Path>) {
        let generation = {
            let mut settings = self.shared.settings.write();
            settings.database = database.as_ref().to_path_buf();
            settings.generation += 1;
            settings.generation
        };
        let slots: Vec<Slot> = self.shared.slots.lock().values().cloned().collect();
        let mut released = 0;
        for slot in slots {
            let stale = {
                let mut slot = slot.lock();
                match slot.as_ref() {
                    Some(built) if built.generation < generation => slot.take(),
                    _ => None,
                }
            };
            if stale.is_some() {
                released += 1;
            }
        }
        tracing::Span::current().record("generation", generation).record("released", released);
        tracing::debug!("Signature database reconfigured");
    }

    pub fn database_path(&self) -> PathBuf {
        self.shared.settings.read().database.clone()
    }

    /// Bytes of content inspected when a [`Source`] has no explicit limit.
    pub fn prefix_size(&self) -> usize {
        self.shared.settings.read().prefix_size
    }

    /// Number of open engines, counting those currently in use.
    pub fn len(&self) -> usize {
        let slots = self.shared.slots.lock();
        slots.values().filter(|slot| slot.try_lock().is_none_or(|built| built.is_some())).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn guess_media_type<'a>(&self, source: impl Into<Source<'a>>) -> Result<String> {
        let prefix = source.into().prefix(self.prefix_size())?;
        self.with_engine(|engine| engine.classify_mime(&prefix))
    }

    pub fn guess_extension<'a>(&self, source: impl Into<Source<'a>>) -> Result<String> {
        let prefix = source.into().prefix(self.prefix_size())?;
        self.with_engine(|engine| engine.classify_extension(&prefix))
    }

    /// Media type and extension from a single read of the source.
    pub fn guess_content_type<'a>(&self, source: impl Into<Source<'a>>) -> Result<ContentType> {
        let prefix = source.into().prefix(self.prefix_size())?;
        self.with_engine(|engine| engine.classify_content_type(&prefix))
    }
}

impl Default for EngineCache {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Releases the exiting thread's engines from every cache it used.
struct ExitHook {
    thread: ThreadId,
    caches: Vec<Weak<Shared>>,
}
impl ExitHook {
    fn register(&mut self, shared: &Arc<Shared>) {
        self.caches.retain(|cache| cache.strong_count() > 0);
        self.caches.push(Arc::downgrade(shared));
    }
}

impl Drop for ExitHook {
    fn drop(&mut self) {
        for shared in self.caches.drain(..).filter_map(|cache| cache.upgrade()) {
            let slot = shared.slots.lock().remove(&self.thread);
            if slot.is_some() {
                tracing::trace!(thread = ?self.thread, "Released engine of exiting thread");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rstest::{fixture, rstest};
    use sniff_magic::BUNDLED_DATABASE;
    use std::fs;

    const JPEG: &[u8] = b"\xff\xd8\xff\xe0\x00\x10JFIF\x00\x01\x01\x00\x00\x01\x00\x01\x00\x00";

    #[fixture]
    fn cache() -> EngineCache {
        EngineCache::new(BUNDLED_DATABASE)
    }

    #[rstest]
    fn engine_is_built_lazily_and_reused(cache: EngineCache) {
        assert!(cache.is_empty());
        let first = cache.with_engine(|engine| Ok(engine as *const SniffEngine as usize)).unwrap();
        assert_eq!(cache.len(), 1);
        let second = cache.with_engine(|engine| Ok(engine as *const SniffEngine as usize)).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[rstest]
    fn one_engine_per_thread(cache: EngineCache) {
        assert_eq!(cache.guess_media_type(JPEG).unwrap(), "image/jpeg");
        let other = cache.clone();
        thread::spawn(move || {
            assert_eq!(other.guess_media_type(JPEG).unwrap(), "image/jpeg");
            assert_eq!(other.len(), 2);
        })
        .join()
        .unwrap();
        // The spawned thread's engine went away with it.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_database_is_reported_on_use() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("magic.db");
        let cache = EngineCache::new(&missing);
        let err = cache.guess_media_type(JPEG).unwrap_err();
        assert_eq!(*err, ErrorKind::DatabaseNotFound(missing));
        assert!(cache.is_empty());
    }

    #[rstest]
    fn reconfigure_rebuilds_against_new_database(cache: EngineCache) {
        assert_eq!(cache.guess_media_type(JPEG).unwrap(), "image/jpeg");

        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("custom.db");
        fs::write(&custom, "0 string \\xff\\xd8 custom\n!:mime application/x-custom\n").unwrap();
        cache.reconfigure(&custom);
        assert!(cache.is_empty());
        assert_eq!(cache.database_path(), custom);
        assert_eq!(cache.guess_media_type(JPEG).unwrap(), "application/x-custom");
        assert_eq!(cache.with_engine(|engine| Ok(engine.database().to_path_buf())).unwrap(), custom);

        cache.reconfigure(dir.path().join("gone.db"));
        assert!(matches!(*cache.guess_media_type(JPEG).unwrap_err(), ErrorKind::DatabaseNotFound(_)));
    }

    #[rstest]
    fn reconfigure_releases_engines_of_other_threads(cache: EngineCache) {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let other = cache.clone();
        let worker = thread::spawn(move || {
            other.guess_media_type(JPEG).unwrap();
            ready_tx.send(()).unwrap();
            done_rx.recv().unwrap();
            other.with_engine(|engine| Ok(engine.database().to_path_buf())).unwrap()
        });
        ready_rx.recv().unwrap();
        assert_eq!(cache.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("custom.db");
        fs::copy(BUNDLED_DATABASE, &custom).unwrap();
        cache.reconfigure(&custom);
        assert_eq!(cache.len(), 0);

        done_tx.send(()).unwrap();
        assert_eq!(worker.join().unwrap(), custom);
    }

    #[rstest]
    fn engine_mode_survives_between_calls(cache: EngineCache) {
        assert_eq!(cache.guess_extension(JPEG).unwrap(), "jpeg");
        assert_eq!(cache.with_engine(|engine| Ok(engine.mode())).unwrap(), DEFAULT_MODE);
        assert_eq!(cache.guess_content_type(JPEG).unwrap(), ContentType::new("image/jpeg", "jpeg"));
    }

    #[rstest]
    fn prefix_size_from_config() {
        let config = Config { database: Some(PathBuf::from(BUNDLED_DATABASE)), prefix_size: 2 };
        let cache = EngineCache::from_config(&config);
        assert_eq!(cache.prefix_size(), 2);
        assert_eq!(cache.database_path(), PathBuf::from(BUNDLED_DATABASE));
        // Two bytes are not enough to see the JPEG signature.
        assert_eq!(cache.guess_media_type(JPEG).unwrap(), "application/octet-stream");
        assert_eq!(cache.guess_media_type(Source::bytes(JPEG).limit(3)).unwrap(), "image/jpeg");
    }
}
