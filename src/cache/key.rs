//! Key Manager (A) — deterministic cache key construction (`spec.md` §4.1).

use sha2::{Digest, Sha256};

/// Build a deterministic key `namespace:id[:k=v…]`, with `params` sorted by
/// key so identical inputs always produce the identical output regardless of
/// call-site ordering.
#[must_use]
pub fn key(namespace: &str, id: &str, params: &[(&str, &str)]) -> String {
    let mut out = format!("{namespace}:{id}");
    for (k, v) in sorted_params(params) {
        out.push(':');
        out.push_str(k);
        out.push('=');
        out.push_str(v);
    }
    out
}

/// Same contract as [`key`], but folds `params` into a short SHA-256 digest
/// instead of inlining them. Used when `params` cardinality is unbounded
/// (`spec.md` §4.1).
#[must_use]
pub fn key_with_hash(namespace: &str, id: &str, params: &[(&str, &str)]) -> String {
    let mut hasher = Sha256::new();
    for (k, v) in sorted_params(params) {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"&");
    }
    let digest = hasher.finalize();
    format!("{namespace}:{id}:h={digest:x}")
}

fn sorted_params<'a>(params: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
    let mut sorted = params.to_vec();
    sorted.sort_by_key(|(k, _)| *k);
    sorted
}
