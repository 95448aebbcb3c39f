//! Deduplicator — exact and partial-similarity duplicate removal over
//! market-data records (`spec.md` §4.9).

use std::collections::HashMap;

use sha2::{Digest, Sha256};

/// Strategy for choosing which record to keep within a duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalStrategy {
    /// Keep the first record encountered, in input order.
    KeepFirst,
    /// Keep the last record encountered, in input order.
    KeepLast,
    /// Keep the record with the highest quality score.
    KeepHighestQuality,
}

/// A record handed to the deduplicator: its primary key, the field values
/// used for partial-similarity comparison, and (optionally) a quality
/// score from the validator.
#[derive(Debug, Clone)]
pub struct DedupRecord {
    /// Stable identity used for exact-match dedup, e.g. `(code, date)`.
    pub primary_key: String,
    /// Field name/value pairs compared for partial similarity.
    pub fields: Vec<(String, String)>,
    /// Quality score from the validator, used by `KeepHighestQuality`.
    pub quality_score: f64,
}

impl DedupRecord {
    fn field_hash(&self, fields: &[String]) -> String {
        let mut hasher = Sha256::new();
        for name in fields {
            let value = self
                .fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
                .unwrap_or("");
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"&");
        }
        format!("{:x}", hasher.finalize())
    }

    fn similarity(&self, other: &Self) -> f64 {
        if self.fields.is_empty() {
            return 0.0;
        }
        let matching = self
            .fields
            .iter()
            .filter(|(k, v)| other.fields.iter().any(|(ok, ov)| ok == k && ov == v))
            .count();
        matching as f64 / self.fields.len() as f64
    }
}

/// How a duplicate group's members were judged equivalent (`spec.md` §3
/// "Duplicate group").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Grouped by an exact primary-key or field-hash match.
    Exact,
    /// Grouped by pairwise field similarity at or above a threshold.
    Partial,
}

/// Outcome of a dedup pass: the surviving records, how many were removed,
/// and whether the pass grouped duplicates by exact or partial match.
#[derive(Debug, Clone)]
pub struct DedupResult {
    /// Records kept after removing duplicates, in their original relative
    /// order.
    pub kept: Vec<DedupRecord>,
    /// Count of records removed as duplicates.
    pub removed: usize,
    /// Whether this pass matched duplicates exactly or by similarity.
    pub match_type: MatchType,
}

/// Removes duplicate records either by an exact key/hash match or by
/// pairwise field similarity (`spec.md` §4.9).
pub struct Deduplicator {
    strategy: RemovalStrategy,
}

impl Deduplicator {
    /// Build a deduplicator applying `strategy` to break ties within a
    /// duplicate group.
    #[must_use]
    pub fn new(strategy: RemovalStrategy) -> Self {
        Self { strategy }
    }

    /// Exact dedup on equal primary key.
    #[must_use]
    pub fn dedup_exact_by_key(&self, records: Vec<DedupRecord>) -> DedupResult {
        self.dedup_grouped(records, |r| r.primary_key.clone())
    }

    /// Exact dedup on an equal hash over `fields` (e.g. when the primary
    /// key alone is not unique enough, or is absent).
    #[must_use]
    pub fn dedup_exact_by_fields(&self, records: Vec<DedupRecord>, fields: &[String]) -> DedupResult {
        self.dedup_grouped(records, |r| r.field_hash(fields))
    }

    fn dedup_grouped(
        &self,
        records: Vec<DedupRecord>,
        key_fn: impl Fn(&DedupRecord) -> String,
    ) -> DedupResult {
        let mut groups: HashMap<String, Vec<DedupRecord>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for record in records {
            let key = key_fn(&record);
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(record);
        }

        let mut removed = 0;
        let mut kept = Vec::new();
        for key in order {
            let mut group = groups.remove(&key).unwrap_or_default();
            removed += group.len().saturating_sub(1);
            kept.push(self.pick(&mut group));
        }
        DedupResult {
            kept,
            removed,
            match_type: MatchType::Exact,
        }
    }

    /// Partial dedup: pairwise similarity over `fields` at or above
    /// `threshold`, bucketed by primary key first to avoid the quadratic
    /// blowup across the whole input (`spec.md` §4.9).
    #[must_use]
    pub fn dedup_partial(
        &self,
        records: Vec<DedupRecord>,
        threshold: f64,
    ) -> DedupResult {
        let mut buckets: HashMap<String, Vec<DedupRecord>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for record in records {
            let key = record.primary_key.clone();
            if !buckets.contains_key(&key) {
                order.push(key.clone());
            }
            buckets.entry(key).or_default().push(record);
        }

        let mut removed = 0;
        let mut kept = Vec::new();
        for key in order {
            let bucket = buckets.remove(&key).unwrap_or_default();
            let groups = cluster_by_similarity(bucket, threshold);
            for mut group in groups {
                removed += group.len().saturating_sub(1);
                kept.push(self.pick(&mut group));
            }
        }
        DedupResult {
            kept,
            removed,
            match_type: MatchType::Partial,
        }
    }

    fn pick(&self, group: &mut Vec<DedupRecord>) -> DedupRecord {
        match self.strategy {
            RemovalStrategy::KeepFirst => group.remove(0),
            RemovalStrategy::KeepLast => group.pop().expect("group is non-empty"),
            RemovalStrategy::KeepHighestQuality => {
                let best = group
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| {
                        a.quality_score
                            .partial_cmp(&b.quality_score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .map(|(idx, _)| idx)
                    .unwrap_or(0);
                group.remove(best)
            }
        }
    }
}

/// Greedily partitions `records` into similarity groups ≥ `threshold`,
/// O(n²) within the bucket but bounded by bucket size since callers
/// bucket by primary key first.
fn cluster_by_similarity(records: Vec<DedupRecord>, threshold: f64) -> Vec<Vec<DedupRecord>> {
    let mut groups: Vec<Vec<DedupRecord>> = Vec::new();
    'outer: for record in records {
        for group in &mut groups {
            if group[0].similarity(&record) >= threshold {
                group.push(record);
                continue 'outer;
            }
        }
        groups.push(vec![record]);
    }
    groups
}
