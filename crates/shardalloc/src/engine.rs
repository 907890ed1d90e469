//! Pure anchor arithmetic.
//!
//! Maps a partition index to the center of its chunk:
//!
//! ```text
//! offset = overlap_shards / 2
//! anchor = trunc(offset + target_chunk_size * (index + 0.5) - MAX / 2)
//! ```
//!
//! Doubling every term turns this into a single integer division,
//! `(overlap_shards + target_chunk_size * (2 * index + 1) - MAX) / 2`, and
//! Rust's `/` on `i64` truncates toward zero, so the result matches the float
//! formula bit for bit without leaving integer arithmetic.

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    assignment::{Assignment, Placement},
    config::AddressSpaceConfig,
};

/// Partition index for the `position`-th distinct seed (0-based).
///
/// Indices wrap round-robin once more seeds than shards have registered.
pub const fn partition_index(position: u64, config: &AddressSpaceConfig) -> u64 {
    position % config.shard_count()
}

/// Computes the anchor for a partition index.
///
/// `index` is reduced modulo the shard count first, so the function is total.
/// The result always lies in `[-MAX/2, MAX/2)`.
///
/// # Example
/// ```
/// use shardalloc::{AddressSpaceConfig, compute_anchor};
///
/// let config = AddressSpaceConfig::with_address_space(16, 4, 0.5).unwrap();
/// assert_eq!(compute_anchor(0, &config), -6);
/// assert_eq!(compute_anchor(1, &config), -3);
/// ```
pub const fn compute_anchor(index: u64, config: &AddressSpaceConfig) -> i64 {
    let index = (index % config.shard_count()) as i64;
    let doubled = config.overlap_shards() + config.target_chunk_size() * (2 * index + 1)
        - config.address_space();
    doubled / 2
}

/// Placement for a partition index: its anchor plus the config-wide ranges.
pub const fn placement_for(index: u64, config: &AddressSpaceConfig) -> Placement {
    Placement::new(
        compute_anchor(index, config),
        config.brute_force_range(),
        config.extended_chunk_size(),
    )
}

/// Builds the assignment for the `position`-th distinct seed.
#[cfg_attr(feature = "tracing", instrument(level = "trace", skip(seed, config)))]
pub fn assign(seed: &str, position: u64, config: &AddressSpaceConfig) -> Assignment {
    Assignment::new(seed, placement_for(partition_index(position, config), config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> AddressSpaceConfig {
        AddressSpaceConfig::with_address_space(16, 4, 0.5).unwrap()
    }

    #[test]
    fn small_layout_anchors() {
        let config = small();
        let anchors: Vec<i64> = (0..4).map(|i| compute_anchor(i, &config)).collect();
        // 0.5 + 3 * (i + 0.5) - 8 => -6.0, -3.0, 0.0, 3.0
        assert_eq!(anchors, [-6, -3, 0, 3]);
    }

    #[test]
    fn placement_renders_response_body() {
        let config = small();
        assert_eq!(placement_for(0, &config).to_string(), "-6 0 4");
        assert_eq!(placement_for(1, &config).to_string(), "-3 0 4");
    }

    #[test]
    fn truncates_toward_zero_not_floor() {
        // MAX=16, 3 shards, no overlap: target=5.
        // anchors = trunc(5 * (i + 0.5) - 8) => trunc(-5.5), trunc(-0.5), trunc(4.5)
        let config = AddressSpaceConfig::with_address_space(16, 3, 0.0).unwrap();
        assert_eq!(config.target_chunk_size(), 5);
        assert_eq!(compute_anchor(0, &config), -5);
        assert_eq!(compute_anchor(1, &config), 0);
        assert_eq!(compute_anchor(2, &config), 4);
    }

    #[test]
    fn matches_float_formula_on_default_layout() {
        let config = AddressSpaceConfig::default();
        let offset = config.overlap_shards() as f64 / 2.0;
        let half = config.address_space() as f64 / 2.0;
        for index in 0..config.shard_count() {
            let expected = (offset + config.target_chunk_size() as f64 * (index as f64 + 0.5)
                - half)
                .trunc() as i64;
            assert_eq!(compute_anchor(index, &config), expected, "index {index}");
        }
        assert_eq!(compute_anchor(0, &config), -8_699_432_659_327);
        assert_eq!(compute_anchor(99, &config), 8_699_432_659_243);
    }

    #[test]
    fn anchors_stay_in_range() {
        for (count, overlap) in [(1, 0.0), (1, 0.99), (7, 0.3), (100, 0.1), (1000, 0.999)] {
            let config = AddressSpaceConfig::load(count, overlap).unwrap();
            for index in 0..config.shard_count() {
                let anchor = compute_anchor(index, &config);
                assert!(anchor >= config.min_anchor(), "{count}/{overlap}/{index}");
                assert!(anchor < config.max_anchor(), "{count}/{overlap}/{index}");
            }
        }
    }

    #[test]
    fn consecutive_indices_differ_by_one_chunk() {
        let config = AddressSpaceConfig::default();
        let target = config.target_chunk_size();
        let mut short_steps = 0;
        for index in 1..config.shard_count() {
            let step = compute_anchor(index, &config) - compute_anchor(index - 1, &config);
            // Truncation toward zero shortens the one step that crosses zero.
            assert!(step == target || step == target - 1, "index {index}");
            if step != target {
                short_steps += 1;
            }
        }
        assert!(short_steps <= 1);

        let config = small();
        assert_eq!(compute_anchor(1, &config) - compute_anchor(0, &config), 3);
    }

    #[test]
    fn index_is_reduced_modulo_shard_count() {
        let config = small();
        assert_eq!(compute_anchor(4, &config), compute_anchor(0, &config));
        assert_eq!(compute_anchor(9, &config), compute_anchor(1, &config));
        assert_eq!(partition_index(5, &config), 1);
    }

    #[test]
    fn assign_uses_wrapped_index() {
        let config = small();
        let fifth = assign("e", 4, &config);
        assert_eq!(fifth.seed(), "e");
        assert_eq!(fifth.anchor(), -6);
    }
}
