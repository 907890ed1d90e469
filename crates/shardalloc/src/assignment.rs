//! Assignments and their text encoding.
//!
//! A [`Placement`] is the triple `(anchor, brute_force_range,
//! extended_chunk_size)` a node receives. It has a single text form,
//! `"<anchor> <brute_force_range> <extended_chunk_size>"`, which is both the
//! HTTP response body and the value stored per seed in the seed file. Keeping
//! one encoding lets operators read and migrate the file with plain tools.

use core::{fmt, num::ParseIntError, str::FromStr};

/// Position and search ranges handed to a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Placement {
    anchor: i64,
    brute_force_range: i64,
    extended_chunk_size: i64,
}

impl Placement {
    pub const fn new(anchor: i64, brute_force_range: i64, extended_chunk_size: i64) -> Self {
        Self {
            anchor,
            brute_force_range,
            extended_chunk_size,
        }
    }

    /// Center point of the node's chunk. May be negative.
    pub const fn anchor(&self) -> i64 {
        self.anchor
    }

    pub const fn brute_force_range(&self) -> i64 {
        self.brute_force_range
    }

    pub const fn extended_chunk_size(&self) -> i64 {
        self.extended_chunk_size
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.anchor, self.brute_force_range, self.extended_chunk_size
        )
    }
}

/// Failure to decode a stored placement string.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseAssignmentError {
    #[error("expected 3 space-separated integers, found {0} fields")]
    FieldCount(usize),

    #[error("field `{field}` is not an integer: {source}")]
    InvalidNumber {
        field: &'static str,
        source: ParseIntError,
    },
}

impl FromStr for Placement {
    type Err = ParseAssignmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const FIELDS: [&str; 3] = ["anchor", "brute_force_range", "extended_chunk_size"];

        let parts: Vec<&str> = s.split_ascii_whitespace().collect();
        if parts.len() != FIELDS.len() {
            return Err(ParseAssignmentError::FieldCount(parts.len()));
        }

        let mut values = [0i64; 3];
        for ((value, part), field) in values.iter_mut().zip(&parts).zip(FIELDS) {
            *value = part
                .parse()
                .map_err(|source| ParseAssignmentError::InvalidNumber { field, source })?;
        }

        Ok(Self::new(values[0], values[1], values[2]))
    }
}

/// A seed together with the placement it was given.
///
/// Created once, on the first request for the seed, and never changed after
/// it has been persisted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Assignment {
    seed: String,
    placement: Placement,
}

impl Assignment {
    pub fn new(seed: impl Into<String>, placement: Placement) -> Self {
        Self {
            seed: seed.into(),
            placement,
        }
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub const fn placement(&self) -> Placement {
        self.placement
    }

    pub const fn anchor(&self) -> i64 {
        self.placement.anchor
    }

    pub const fn brute_force_range(&self) -> i64 {
        self.placement.brute_force_range
    }

    pub const fn extended_chunk_size(&self) -> i64 {
        self.placement.extended_chunk_size
    }
}

/// Renders only the placement; the seed is never echoed back.
impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.placement, f)
    }
}
