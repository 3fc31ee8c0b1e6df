//! Canonical JSON encoding for signed payloads.
//!
//! Signatures are computed over a deterministic byte form of the inner
//! message, so both ends of a connection must reproduce the exact same
//! bytes from the same logical payload. The canonical form is:
//!
//! - object keys sorted bytewise (UTF-8 lexicographic), recursively;
//! - no insignificant whitespace;
//! - string and number literals as emitted by `serde_json`.
//!
//! The encoder is written out by hand rather than trusting the map
//! ordering of any particular `serde_json` configuration: a dependency
//! elsewhere in a build can switch `serde_json` to insertion-ordered
//! maps, which would silently break signatures across nodes.

use lnmesh_types::{LnMeshError, Result};
use serde_json::Value;

/// Serializes a JSON value to its canonical byte form.
///
/// # Errors
///
/// Returns [`LnMeshError::Protocol`] if a leaf value cannot be
/// serialized (non-finite floats are the only practical case).
pub fn to_canonical_json(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Object(map) => {
            // Collect and sort keys bytewise. serde_json's map may or
            // may not already be sorted depending on build features.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_leaf(&Value::String((*key).clone()), out)?;
                out.push(b':');
                // Key came from the map, so the entry exists.
                if let Some(child) = map.get(*key) {
                    write_canonical(child, out)?;
                }
            }
            out.push(b'}');
            Ok(())
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
            Ok(())
        }
        leaf => write_leaf(leaf, out),
    }
}

/// Writes a scalar (null, bool, number, string) using `serde_json`'s
/// literal syntax, which both sides share.
fn write_leaf(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    let bytes = serde_json::to_vec(value).map_err(|e| LnMeshError::Protocol {
        reason: format!("canonical JSON serialization failed: {e}"),
    })?;
    out.extend_from_slice(&bytes);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
