use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};

use crate::array::ArrayLayout;
use crate::error::{ExecutionError, ExecutionResult};

const CHECKSUM_HEX_LEN: usize = 32;

/// A content digest identifying an array independently of its location.
///
/// The digest covers the raw bytes together with the logical layout, so the same
/// bytes viewed with a different shape, element type or order are different content.
/// Hash collision is possible in theory, but two payloads with the same checksum are
/// treated as identical.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Checksum(String);

impl Checksum {
    pub fn compute(layout: &ArrayLayout, bytes: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(layout.dtype.name().as_bytes());
        hasher.update([layout.order.as_char() as u8]);
        hasher.update((layout.shape.len() as u64).to_le_bytes());
        for dim in &layout.shape {
            hasher.update((*dim as u64).to_le_bytes());
        }
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Computes the digest of raw bytes alone, used to compare file contents.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Md5::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..7]
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Checksum {
    type Err = ExecutionError;

    /// Parses a checksum, accepting only lowercase hexadecimal digests
    /// so that a checksum is always safe to use as a file name.
    fn from_str(s: &str) -> ExecutionResult<Self> {
        if s.len() == CHECKSUM_HEX_LEN
            && s
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            Ok(Self(s.to_string()))
        } else {
            Err(ExecutionError::invalid(format!("invalid checksum: {s}")))
        }
    }
}
