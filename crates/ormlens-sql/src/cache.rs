//! Memoizing cache for structural analysis.
//!
//! One memo table per operation, keyed by a 128-bit content digest of the
//! raw SQL text, so identical text from different log records shares one
//! result. Negative results (`None`, `Unknown`) are cached like any other.
//!
//! The cache never evicts on its own. Long-lived processes call
//! [`AnalysisCache::reset`] between unrelated runs.

use crate::extractor::SqlExtractor;
use crate::facts::{JoinRef, ParsedQueryFacts, TableRef, WhereCondition};
use crate::normalize::normalize;
use crate::patterns::{self, LoadPattern, RelationRef};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// blake3 digest of SQL text, truncated to 128 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SqlHash(u128);

impl SqlHash {
    pub fn of(sql: &str) -> Self {
        let digest = blake3::hash(sql.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest.as_bytes()[..16]);
        SqlHash(u128::from_le_bytes(bytes))
    }

    pub fn as_u128(self) -> u128 {
        self.0
    }
}

/// Counters for one memo table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStats {
    pub name: &'static str,
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Cache statistics across all memo tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entries: usize,
    pub tables: Vec<TableStats>,
}

impl CacheStats {
    pub fn table(&self, name: &str) -> Option<&TableStats> {
        self.tables.iter().find(|t| t.name == name)
    }
}

struct Memo<T> {
    name: &'static str,
    entries: Mutex<HashMap<SqlHash, Arc<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> Memo<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SqlHash, Arc<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get_or_compute(&self, key: SqlHash, compute: impl FnOnce() -> T) -> Arc<T> {
        if let Some(found) = self.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(found);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // Compute outside the lock; derived tables call back into `facts`.
        let value = Arc::new(compute());
        Arc::clone(self.lock().entry(key).or_insert(value))
    }

    fn clear(&self) {
        self.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    fn stats(&self) -> TableStats {
        TableStats {
            name: self.name,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.lock().len(),
        }
    }
}

/// Per-session cache over [`SqlExtractor`], the normalizer and the pattern detectors.
///
/// All methods take `&self`.
pub struct AnalysisCache {
    extractor: SqlExtractor,
    facts: Memo<ParsedQueryFacts>,
    patterns: Memo<Option<String>>,
    joins: Memo<Vec<JoinRef>>,
    main_table: Memo<Option<TableRef>>,
    where_conditions: Memo<Vec<WhereCondition>>,
    lazy_load: Memo<Option<String>>,
    n_plus_one_where: Memo<Option<RelationRef>>,
    n_plus_one_join: Memo<Option<RelationRef>>,
    partial_collection: Memo<Option<RelationRef>>,
    classification: Memo<LoadPattern>,
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::with_extractor(SqlExtractor::new())
    }

    pub fn with_extractor(extractor: SqlExtractor) -> Self {
        Self {
            extractor,
            facts: Memo::new("facts"),
            patterns: Memo::new("normalized_pattern"),
            joins: Memo::new("joins"),
            main_table: Memo::new("main_table"),
            where_conditions: Memo::new("where_conditions"),
            lazy_load: Memo::new("lazy_load"),
            n_plus_one_where: Memo::new("n_plus_one_where"),
            n_plus_one_join: Memo::new("n_plus_one_join"),
            partial_collection: Memo::new("partial_collection"),
            classification: Memo::new("classification"),
        }
    }

    pub fn extractor(&self) -> &SqlExtractor {
        &self.extractor
    }

    pub fn facts(&self, sql: &str) -> Arc<ParsedQueryFacts> {
        self.facts
            .get_or_compute(SqlHash::of(sql), || self.extractor.facts(sql))
    }

    pub fn normalized_pattern(&self, sql: &str) -> Option<String> {
        self.patterns
            .get_or_compute(SqlHash::of(sql), || normalize(sql))
            .as_ref()
            .clone()
    }

    pub fn joins(&self, sql: &str) -> Vec<JoinRef> {
        self.joins
            .get_or_compute(SqlHash::of(sql), || self.facts(sql).joins.clone())
            .as_ref()
            .clone()
    }

    pub fn main_table(&self, sql: &str) -> Option<TableRef> {
        self.main_table
            .get_or_compute(SqlHash::of(sql), || self.facts(sql).main_table.clone())
            .as_ref()
            .clone()
    }

    pub fn where_conditions(&self, sql: &str) -> Vec<WhereCondition> {
        self.where_conditions
            .get_or_compute(SqlHash::of(sql), || {
                self.facts(sql).where_conditions.clone()
            })
            .as_ref()
            .clone()
    }

    pub fn lazy_load_by_id(&self, sql: &str) -> Option<String> {
        self.lazy_load
            .get_or_compute(SqlHash::of(sql), || {
                patterns::lazy_load_by_id(&self.facts(sql))
            })
            .as_ref()
            .clone()
    }

    pub fn n_plus_one_where(&self, sql: &str) -> Option<RelationRef> {
        self.n_plus_one_where
            .get_or_compute(SqlHash::of(sql), || {
                patterns::n_plus_one_where(&self.facts(sql))
            })
            .as_ref()
            .clone()
    }

    pub fn n_plus_one_join(&self, sql: &str) -> Option<RelationRef> {
        self.n_plus_one_join
            .get_or_compute(SqlHash::of(sql), || {
                patterns::n_plus_one_join(&self.facts(sql))
            })
            .as_ref()
            .clone()
    }

    /// N+1 relation identity (WHERE pattern first, then JOIN pattern).
    pub fn relation(&self, sql: &str) -> Option<RelationRef> {
        self.n_plus_one_where(sql)
            .or_else(|| self.n_plus_one_join(sql))
    }

    pub fn partial_collection_load(&self, sql: &str) -> Option<RelationRef> {
        self.partial_collection
            .get_or_compute(SqlHash::of(sql), || {
                patterns::partial_collection_load(&self.facts(sql))
            })
            .as_ref()
            .clone()
    }

    pub fn classify_load(&self, sql: &str) -> LoadPattern {
        *self
            .classification
            .get_or_compute(SqlHash::of(sql), || {
                patterns::classify_load(&self.facts(sql))
            })
    }

    /// Compute facts and pattern once per distinct SQL text.
    ///
    /// Returns the number of distinct texts.
    pub fn warm_up<'a, I>(&self, sqls: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen: HashSet<SqlHash> = HashSet::new();
        for sql in sqls {
            let key = SqlHash::of(sql);
            if !seen.insert(key) {
                continue;
            }
            self.facts.get_or_compute(key, || self.extractor.facts(sql));
            self.patterns.get_or_compute(key, || normalize(sql));
        }
        tracing::debug!(target: "ormlens.cache", unique = seen.len(), "cache warmed");
        seen.len()
    }

    /// Drop every entry and zero the counters.
    pub fn reset(&self) {
        self.facts.clear();
        self.patterns.clear();
        self.joins.clear();
        self.main_table.clear();
        self.where_conditions.clear();
        self.lazy_load.clear();
        self.n_plus_one_where.clear();
        self.n_plus_one_join.clear();
        self.partial_collection.clear();
        self.classification.clear();
        tracing::debug!(target: "ormlens.cache", "cache reset");
    }

    pub fn stats(&self) -> CacheStats {
        let tables = vec![
            self.facts.stats(),
            self.patterns.stats(),
            self.joins.stats(),
            self.main_table.stats(),
            self.where_conditions.stats(),
            self.lazy_load.stats(),
            self.n_plus_one_where.stats(),
            self.n_plus_one_join.stats(),
            self.partial_collection.stats(),
            self.classification.stats(),
        ];
        let hits: u64 = tables.iter().map(|t| t.hits).sum();
        let misses: u64 = tables.iter().map(|t| t.misses).sum();
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            entries: tables.iter().map(|t| t.entries).sum(),
            tables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_calls_hit_the_cache() {
        let cache = AnalysisCache::new();
        let sql = "SELECT * FROM orders o JOIN users u ON u.id = o.user_id WHERE o.id = ?";

        let first = cache.joins(sql);
        let before = cache.stats();
        for _ in 0..9 {
            assert_eq!(cache.joins(sql), first);
        }
        let after = cache.stats();

        assert_eq!(after.hits - before.hits, 9);
        assert_eq!(after.misses, before.misses);
        assert_eq!(after.table("joins").map(|t| t.hits), Some(9));
    }

    #[test]
    fn test_negative_results_are_cached() {
        let cache = AnalysisCache::new();
        let sql = "SELECT * FROM users WHERE name = ?";
        assert_eq!(cache.n_plus_one_where(sql), None);
        assert_eq!(cache.n_plus_one_where(sql), None);
        let stats = cache.stats();
        let table = stats.table("n_plus_one_where").expect("table");
        assert_eq!((table.hits, table.misses, table.entries), (1, 1, 1));
    }

    #[test]
    fn test_warm_up_dedups_and_reset_clears() {
        let cache = AnalysisCache::new();
        let sqls = [
            "SELECT * FROM a WHERE id = 1",
            "SELECT * FROM a WHERE id = 1",
            "SELECT * FROM b WHERE id = 1",
        ];
        assert_eq!(cache.warm_up(sqls), 2);
        let stats = cache.stats();
        assert_eq!(stats.table("facts").map(|t| t.misses), Some(2));
        assert_eq!(stats.table("facts").map(|t| t.hits), Some(0));

        cache.facts(sqls[0]);
        assert_eq!(cache.stats().table("facts").map(|t| t.hits), Some(1));

        cache.reset();
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (0, 0, 0));
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn test_hash_is_content_based() {
        assert_eq!(SqlHash::of("SELECT 1"), SqlHash::of("SELECT 1"));
        assert_ne!(SqlHash::of("SELECT 1"), SqlHash::of("SELECT 2"));
    }
}
