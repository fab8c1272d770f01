//! Prepared statement caching with LRU eviction.
//!
//! ## Lifecycle
//!
//! 1. The first `prepare_cached` of a SQL text sends COM_STMT_PREPARE and
//!    caches the statement under that text
//! 2. Later calls with the same text reuse the cached statement
//! 3. When the cache is full, the least recently used statement is evicted
//!    and closed with COM_STMT_CLOSE
//! 4. COM_RESET_CONNECTION drops every server-side statement, so the cache
//!    is cleared without sending anything

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::statement::Statement;

/// Default maximum number of prepared statements to cache per connection.
pub const DEFAULT_MAX_STATEMENTS: usize = 256;

/// LRU cache of prepared statements keyed by SQL text.
pub struct StatementCache {
    cache: Option<LruCache<String, Statement>>,
    hits: u64,
    misses: u64,
}

impl StatementCache {
    /// Create a cache holding up to `max_size` statements. Zero disables
    /// caching.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(max_size).map(LruCache::new),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a statement, updating the LRU order.
    pub fn get(&mut self, sql: &str) -> Option<Statement> {
        let found = self
            .cache
            .as_mut()
            .and_then(|cache| cache.get(sql))
            .filter(|stmt| !stmt.is_closed())
            .cloned();
        if found.is_some() {
            self.hits += 1;
            tracing::trace!(sql = sql, "statement cache hit");
        } else {
            self.misses += 1;
            tracing::trace!(sql = sql, "statement cache miss");
        }
        found
    }

    /// Cache a statement. Returns the statement evicted to make room, which
    /// the caller should close.
    pub fn insert(&mut self, stmt: Statement) -> Option<Statement> {
        let cache = self.cache.as_mut()?;
        tracing::debug!(sql = stmt.sql(), statement_id = stmt.id(), "caching prepared statement");
        match cache.push(stmt.sql().to_owned(), stmt) {
            // `push` also returns the old entry when the key was present.
            Some((_, evicted)) => Some(evicted),
            None => None,
        }
    }

    /// Remove a statement.
    pub fn remove(&mut self, sql: &str) -> Option<Statement> {
        self.cache.as_mut().and_then(|cache| cache.pop(sql))
    }

    /// Remove every statement.
    pub fn clear(&mut self) -> Vec<Statement> {
        let mut statements = Vec::new();
        if let Some(cache) = self.cache.as_mut() {
            while let Some((_, stmt)) = cache.pop_lru() {
                statements.push(stmt);
            }
        }
        tracing::debug!(count = statements.len(), "cleared statement cache");
        statements
    }

    /// Number of cached statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, LruCache::len)
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum cache size. Zero when caching is disabled.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.cap().get())
    }

    /// Number of cache hits.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of cache misses.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Cache hit ratio (0.0 to 1.0).
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl Default for StatementCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STATEMENTS)
    }
}

impl std::fmt::Debug for StatementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementCache")
            .field("len", &self.len())
            .field("max_size", &self.max_size())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}
