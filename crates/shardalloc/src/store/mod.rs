//! Durable seed-to-placement storage.
//!
//! The [`SeedStore`] owns a single JSON file mapping every registered seed to
//! its encoded placement, in registration order:
//!
//! ```json
//! {"node-a":"-6 0 4","node-b":"-3 0 4"}
//! ```
//!
//! The file is the only source of truth. It is re-read on every call, so an
//! operator replacing or repairing it takes effect on the next request without
//! a restart.
//!
//! ## Crash safety
//!
//! Every mutation rewrites the full map to `<file>.tmp` and renames it over
//! the canonical path. A crash mid-write leaves either the old or the new
//! file, never a truncated one. With `fsync` enabled (the default) the temp
//! file and its parent directory are flushed as well.
//!
//! ## Concurrency
//!
//! Growing the map is a read-size, compute, write sequence. Two first-time
//! seeds racing through it would both see the same size and receive the same
//! partition index, so [`SeedStore::record_if_absent`] runs it under a
//! process-wide writer lock. Lookups of seeds that are already registered only
//! read the file and never take the lock. The lock does not extend across
//! processes: exactly one store may own a given file.
//!
//! ## Corruption
//!
//! A file that exists but cannot be decoded is reported as
//! [`StoreState::Corrupt`] and surfaces as [`Error::CorruptStore`]. It is
//! never treated as an empty store.


use crate::{
    assignment::{Assignment, Placement},
    config::AddressSpaceConfig,
    engine,
    error::{Error, Result},
};
use core::fmt;
use parking_lot::Mutex;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, MapAccess, Visitor},
    ser::SerializeMap,
};
use std::{
    collections::HashMap,
    ffi::OsString,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Default seed file name, relative to the working directory.
pub const DEFAULT_SEEDS_FILE: &str = "seeds.db";

/// Ordered mapping from seed to placement.
///
/// Insertion order is significant: the position of a seed in the map is the
/// input to its partition index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedMap {
    entries: Vec<(String, Placement)>,
    positions: HashMap<String, usize>,
}

impl SeedMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
        }
    }

    /// Number of registered seeds.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, seed: &str) -> bool {
        self.positions.contains_key(seed)
    }

    /// Returns the stored assignment for `seed`, if registered.
    pub fn get(&self, seed: &str) -> Option<Assignment> {
        let &position = self.positions.get(seed)?;
        let (seed, placement) = &self.entries[position];
        Some(Assignment::new(seed.as_str(), *placement))
    }

    /// Registration order of `seed` (0-based).
    pub fn position(&self, seed: &str) -> Option<u64> {
        self.positions.get(seed).map(|&p| p as u64)
    }

    /// Iterates over seeds in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Placement)> + '_ {
        self.entries.iter().map(|(seed, p)| (seed.as_str(), *p))
    }

    /// Appends a seed. Returns `false` without modifying the map if the seed
    /// is already present.
    fn insert(&mut self, seed: String, placement: Placement) -> bool {
        if self.positions.contains_key(&seed) {
            return false;
        }
        self.positions.insert(seed.clone(), self.entries.len());
        self.entries.push((seed, placement));
        true
    }
}

impl Serialize for SeedMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (seed, placement) in &self.entries {
            map.serialize_entry(seed, &placement.to_string())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SeedMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        deserializer.deserialize_map(SeedMapVisitor)
    }
}

struct SeedMapVisitor;

impl<'de> Visitor<'de> for SeedMapVisitor {
    type Value = SeedMap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of seed to \"<anchor> <brute_force_range> <extended_chunk_size>\"")
    }

    fn visit_map<A>(self, mut access: A) -> core::result::Result<SeedMap, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut map = SeedMap::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((seed, encoded)) = access.next_entry::<String, String>()? {
            let placement = encoded
                .parse::<Placement>()
                .map_err(|e| <A::Error as de::Error>::custom(format_args!("seed {seed:?}: {e}")))?;
            if map.contains(&seed) {
                return Err(<A::Error as de::Error>::custom(format_args!(
                    "duplicate seed {seed:?}"
                )));
            }
            map.insert(seed, placement);
        }
        Ok(map)
    }
}

/// What was found at the seed file path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreState {
    /// No file exists yet; nothing has been allocated.
    Absent,
    /// A file exists but could not be decoded.
    Corrupt { reason: String },
    /// The decoded map.
    Ready(SeedMap),
}

/// File-backed store of seed assignments.
///
/// See the [module docs](self) for the persistence and locking model.
pub struct SeedStore {
    path: PathBuf,
    tmp_path: PathBuf,
    config: AddressSpaceConfig,
    fsync: bool,
    writer: Mutex<()>,
}

impl fmt::Debug for SeedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedStore")
            .field("path", &self.path)
            .field("fsync", &self.fsync)
            .finish_non_exhaustive()
    }
}

impl SeedStore {
    /// Creates a store for `path` without touching the filesystem.
    ///
    /// Prefer [`Self::open`] at startup, which also refuses a corrupt file.
    pub fn new(path: impl Into<PathBuf>, config: AddressSpaceConfig) -> Self {
        let path = path.into();
        let mut tmp_path = OsString::from(path.as_os_str());
        tmp_path.push(".tmp");
        Self {
            path,
            tmp_path: PathBuf::from(tmp_path),
            config,
            fsync: true,
            writer: Mutex::new(()),
        }
    }

    /// Creates a store and verifies that any existing file decodes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptStore`] if the file exists but is unparsable,
    /// or [`Error::Io`] if it cannot be read.
    pub fn open(path: impl Into<PathBuf>, config: AddressSpaceConfig) -> Result<Self> {
        let store = Self::new(path, config);
        store.load()?;
        Ok(store)
    }

    /// Enables or disables flushing to disk on every persist.
    pub fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn config(&self) -> &AddressSpaceConfig {
        &self.config
    }

    /// Reads the file and classifies it as absent, corrupt, or ready.
    ///
    /// # Errors
    ///
    /// Only for I/O failures other than the file not existing.
    pub fn state(&self) -> Result<StoreState> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StoreState::Absent),
            Err(e) => return Err(Error::io("reading", &self.path, e)),
        };
        Ok(match serde_json::from_slice::<SeedMap>(&bytes) {
            Ok(map) => StoreState::Ready(map),
            Err(e) => StoreState::Corrupt {
                reason: e.to_string(),
            },
        })
    }

    /// Loads the current map. A missing file is an empty map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptStore`] for an unparsable file.
    pub fn load(&self) -> Result<SeedMap> {
        match self.state()? {
            StoreState::Absent => Ok(SeedMap::new()),
            StoreState::Ready(map) => Ok(map),
            StoreState::Corrupt { reason } => {
                #[cfg(feature = "tracing")]
                tracing::error!(
                    path = %self.path.display(),
                    reason = reason.as_str(),
                    "seed store is corrupt"
                );
                Err(Error::CorruptStore {
                    path: self.path.clone(),
                    reason,
                })
            }
        }
    }

    /// Looks up an existing assignment without taking the writer lock.
    pub fn get(&self, seed: &str) -> Result<Option<Assignment>> {
        Ok(self.load()?.get(seed))
    }

    /// Number of registered seeds.
    pub fn len(&self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.load()?.is_empty())
    }

    /// Returns the assignment for `seed`, creating and persisting it first if
    /// the seed has never been seen.
    ///
    /// A known seed is answered from a plain read. A new seed is assigned
    /// partition index `len % shard_count`, appended, and persisted before
    /// this returns; no assignment is ever returned that is not on disk.
    ///
    /// # Errors
    ///
    /// - [`Error::CorruptStore`] if the file cannot be decoded.
    /// - [`Error::Io`] or [`Error::Encode`] if persisting fails. The new seed
    ///   is then not registered and the call may be retried.
    /// - [`Error::Io`] if syncing the parent directory fails after the
    ///   rename. The assignment is already committed in that case, and a
    ///   retry returns it unchanged.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self)))]
    pub fn record_if_absent(&self, seed: &str) -> Result<Assignment> {
        if let Some(existing) = self.get(seed)? {
            return Ok(existing);
        }

        let _guard = self.writer.lock();

        // Re-read under the lock: another writer may have registered this
        // seed, or others, since the unlocked read.
        let mut map = self.load()?;
        if let Some(existing) = map.get(seed) {
            return Ok(existing);
        }

        let position = map.len() as u64;
        let assignment = engine::assign(seed, position, &self.config);
        map.insert(seed.to_owned(), assignment.placement());
        self.persist(&map)?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            position,
            index = engine::partition_index(position, &self.config),
            anchor = assignment.anchor(),
            "registered new seed"
        );

        Ok(assignment)
    }

    /// Writes the full map to the temp file and renames it into place.
    ///
    /// Must only be called while holding the writer lock.
    fn persist(&self, map: &SeedMap) -> Result<()> {
        let bytes = serde_json::to_vec(map).map_err(Error::Encode)?;

        if let Err(e) = self.write_temp(&bytes) {
            let _ = fs::remove_file(&self.tmp_path);
            return Err(e);
        }

        if let Err(e) = fs::rename(&self.tmp_path, &self.path) {
            let _ = fs::remove_file(&self.tmp_path);
            return Err(Error::io("renaming temp file over", &self.path, e));
        }

        if self.fsync {
            self.sync_parent_dir()?;
        }
        Ok(())
    }

    fn write_temp(&self, bytes: &[u8]) -> Result<()> {
        let mut file =
            File::create(&self.tmp_path).map_err(|e| Error::io("creating", &self.tmp_path, e))?;
        file.write_all(bytes)
            .map_err(|e| Error::io("writing", &self.tmp_path, e))?;
        if self.fsync {
            file.sync_all()
                .map_err(|e| Error::io("syncing", &self.tmp_path, e))?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn sync_parent_dir(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        File::open(dir)
            .and_then(|d| d.sync_all())
            .map_err(|e| Error::io("syncing directory", dir, e))
    }

    // Directory handles cannot be opened for syncing on this platform; the
    // rename itself is still atomic.
    #[cfg(not(unix))]
    fn sync_parent_dir(&self) -> Result<()> {
        Ok(())
    }
}
