//! Address-space partitioning constants.
//!
//! An [`AddressSpaceConfig`] is built once at startup from two tunables, the
//! shard count and the shard overlap, and is immutable afterwards. Every other
//! constant the allocator needs (chunk sizes, overlap width, brute-force range)
//! is derived here so that all components agree on the same numbers.
//!
//! Derivations go through `f64` and truncate toward zero. Anchors already
//! persisted in a seed store were computed with exactly this arithmetic.

use core::fmt;

/// Size of the circular address space: `2^44` positions centered at zero.
pub const ADDRESS_SPACE: i64 = 1 << 44;

/// Default number of logical partitions.
pub const DEFAULT_SHARD_COUNT: i64 = 100;

/// Default fraction of a chunk shared with its neighbor.
pub const DEFAULT_SHARD_OVERLAP: f64 = 0.1;

/// Largest address space whose arithmetic stays exact in an `f64` mantissa.
const MAX_EXACT_ADDRESS_SPACE: i64 = 1 << 53;

/// Reasons an [`AddressSpaceConfig`] can be rejected.
///
/// All of these are fatal: a service must refuse to start rather than run with
/// a configuration that would hand out overlapping or out-of-range anchors.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The shard count was zero or negative.
    #[error("shard count must be greater than 0 (got {0})")]
    InvalidShardCount(i64),

    /// The overlap was outside `[0, 1)` or not a finite number.
    #[error("shard overlap must be in [0, 1) (got {0})")]
    InvalidShardOverlap(f64),

    /// The address space was not a positive, even size small enough for exact
    /// float arithmetic.
    #[error("address space must be a positive even number no larger than 2^53 (got {0})")]
    InvalidAddressSpace(i64),

    /// There are more shards than positions, so every chunk would be empty.
    #[error("{shard_count} shards leave no room in an address space of {address_space}")]
    EmptyChunk {
        shard_count: i64,
        address_space: i64,
    },
}

/// Validated partitioning constants for one service instance.
///
/// # Example
/// ```
/// use shardalloc::AddressSpaceConfig;
///
/// let config = AddressSpaceConfig::load(100, 0.1).unwrap();
/// assert_eq!(config.shard_count(), 100);
/// assert_eq!(
///     config.extended_chunk_size(),
///     config.target_chunk_size() + config.overlap_shards()
/// );
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AddressSpaceConfig {
    address_space: i64,
    shard_count: u64,
    shard_overlap: f64,
    target_chunk_size: i64,
    overlap_shards: i64,
    extended_chunk_size: i64,
    brute_force_range: i64,
}

impl AddressSpaceConfig {
    /// Builds the configuration over the full `2^44` address space.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `shard_count <= 0` or `shard_overlap` is
    /// not in `[0, 1)`.
    pub fn load(shard_count: i64, shard_overlap: f64) -> Result<Self, ConfigError> {
        Self::with_address_space(ADDRESS_SPACE, shard_count, shard_overlap)
    }

    /// Builds the configuration over an address space of arbitrary size.
    ///
    /// Production code always uses [`Self::load`]; a custom size is mostly
    /// useful for small, hand-checkable layouts.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`], plus [`ConfigError::InvalidAddressSpace`] and
    /// [`ConfigError::EmptyChunk`].
    pub fn with_address_space(
        address_space: i64,
        shard_count: i64,
        shard_overlap: f64,
    ) -> Result<Self, ConfigError> {
        if address_space <= 0 || address_space % 2 != 0 || address_space > MAX_EXACT_ADDRESS_SPACE
        {
            return Err(ConfigError::InvalidAddressSpace(address_space));
        }
        if shard_count <= 0 {
            return Err(ConfigError::InvalidShardCount(shard_count));
        }
        if !shard_overlap.is_finite() || !(0.0..1.0).contains(&shard_overlap) {
            return Err(ConfigError::InvalidShardOverlap(shard_overlap));
        }

        let target_chunk_size =
            (address_space as f64 / (shard_count as f64 + shard_overlap)).trunc() as i64;
        if target_chunk_size == 0 {
            return Err(ConfigError::EmptyChunk {
                shard_count,
                address_space,
            });
        }

        let overlap_shards = (target_chunk_size as f64 * shard_overlap).trunc() as i64;
        let brute_force_range = (target_chunk_size as f64 * (shard_overlap / 2.0)).trunc() as i64;

        Ok(Self {
            address_space,
            shard_count: shard_count as u64,
            shard_overlap,
            target_chunk_size,
            overlap_shards,
            extended_chunk_size: target_chunk_size + overlap_shards,
            brute_force_range,
        })
    }

    /// Total number of positions in the circular address space (`MAX`).
    pub const fn address_space(&self) -> i64 {
        self.address_space
    }

    /// Number of logical partitions.
    pub const fn shard_count(&self) -> u64 {
        self.shard_count
    }

    pub const fn shard_overlap(&self) -> f64 {
        self.shard_overlap
    }

    /// Width of one chunk without overlap.
    pub const fn target_chunk_size(&self) -> i64 {
        self.target_chunk_size
    }

    /// Extra positions shared with the neighboring chunk.
    pub const fn overlap_shards(&self) -> i64 {
        self.overlap_shards
    }

    /// Width of one chunk including its overlap.
    pub const fn extended_chunk_size(&self) -> i64 {
        self.extended_chunk_size
    }

    /// Half-width a node searches around its anchor when deriving a key.
    pub const fn brute_force_range(&self) -> i64 {
        self.brute_force_range
    }

    /// Lowest valid anchor, `-MAX/2`.
    pub const fn min_anchor(&self) -> i64 {
        -(self.address_space / 2)
    }

    /// One past the highest valid anchor, `MAX/2`.
    pub const fn max_anchor(&self) -> i64 {
        self.address_space / 2
    }
}

impl Default for AddressSpaceConfig {
    fn default() -> Self {
        // Both defaults are inside the validated ranges, so this cannot fail.
        match Self::load(DEFAULT_SHARD_COUNT, DEFAULT_SHARD_OVERLAP) {
            Ok(config) => config,
            Err(_) => unreachable!("default address space config is valid"),
        }
    }
}

impl fmt::Display for AddressSpaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "shard count:         {}", self.shard_count)?;
        writeln!(f, "shard overlap:       {}", self.shard_overlap)?;
        writeln!(f, "overlap shards:      {}", self.overlap_shards)?;
        writeln!(f, "address space:       {}", self.address_space)?;
        writeln!(f, "target chunk size:   {}", self.target_chunk_size)?;
        writeln!(f, "extended chunk size: {}", self.extended_chunk_size)?;
        write!(f, "brute force range:   {}", self.brute_force_range)
    }
}
