//! HTTP surface of the allocator.
//!
//! Exposes a single `GET /shard?seed=<seed>` route that returns the seed's
//! assignment as `"<anchor> <brute_force_range> <extended_chunk_size>\n"`.
//! Every other path answers `404`.
//!
//! ## Structure
//!
//! - [`handler`] - router construction and the `/shard` handler.

pub mod handler;

#[cfg(test)]
mod tests;
