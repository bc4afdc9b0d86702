//! Fixed-capacity labels.

use arrayvec::ArrayString;
use serde::{Deserialize, Deserializer};

/// Copy `s` into a label, cutting it at the last character that fits.
pub(crate) fn label<const N: usize>(s: &str) -> ArrayString<N> {
    let mut out = ArrayString::new();
    for c in s.chars() {
        if out.try_push(c).is_err() {
            break;
        }
    }
    out
}

/// Serde adapter: accept a string of any length, keeping what fits.
pub(crate) fn truncated<'de, D, const N: usize>(deserializer: D) -> Result<ArrayString<N>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(label(&s))
}
