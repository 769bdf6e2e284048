//! Content-addressable identity.
//!
//! Anchor ids (logic, component) hash their source path; state ids are
//! sequential per scope. Derived ids hash the parent id plus the dependency
//! ids, so re-deriving the same signal twice collapses to one identity.

use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

/// Truncation width of derived ids, in hex chars. 64 bits — wide enough that
/// a collision is a bug to surface, not an expected merge.
pub const ID_HEX_LEN: usize = 16;

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Anchor id derived from content, e.g. `content_id("logic", path)` →
/// `logic_1f2e3d…`. This matches the bundler transform contract, which emits
/// `"logic_" + truncated sha256 of the resolved module path`.
pub fn content_id(prefix: &str, content: &str) -> String {
    format!("{prefix}_{}", &sha256_hex(content)[..ID_HEX_LEN])
}

/// Derived id: `truncate(hash(parent ++ deps))`. Stable across processes for
/// the same inputs.
pub fn derived_id(parent: &str, deps: &[&str]) -> String {
    let joined = format!("{parent}|{}", deps.join(","));
    sha256_hex(&joined)[..ID_HEX_LEN].to_string()
}

/// Sequential anchor ids for state signals, scoped to a definition site.
pub struct IdScope {
    prefix: String,
    next: AtomicU64,
}

impl IdScope {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), next: AtomicU64::new(0) }
    }

    pub fn next_state_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}_state_{n}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_ids_are_deterministic() {
        let a = derived_id("logic_abc", &["state_0", "state_1"]);
        let b = derived_id("logic_abc", &["state_0", "state_1"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), ID_HEX_LEN);
    }

    #[test]
    fn derived_ids_separate_on_any_input() {
        let base = derived_id("logic_abc", &["state_0"]);
        assert_ne!(base, derived_id("logic_abd", &["state_0"]));
        assert_ne!(base, derived_id("logic_abc", &["state_1"]));
        assert_ne!(base, derived_id("logic_abc", &[]));
    }

    #[test]
    fn scope_ids_are_sequential() {
        let scope = IdScope::new("counter");
        assert_eq!(scope.next_state_id(), "counter_state_0");
        assert_eq!(scope.next_state_id(), "counter_state_1");
    }
}
