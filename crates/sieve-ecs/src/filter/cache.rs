//! Append-only cache of compiled filters.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use super::{
    compiled::{CompiledFilter, DEFAULT_MAX_VARIABLES, MAX_VARIABLES, compile_filter},
    expr::FilterExpr,
};
use crate::error::EcsResult;

/// Compiled filters keyed by the structure of their source expression.
///
/// Entries are never evicted. Structurally equal expressions share one
/// `Arc<CompiledFilter>`, so the cache can be handed to several worlds
/// and queries by reference.
pub struct FilterCache {
    max_variables: usize,
    entries: RwLock<HashMap<FilterExpr, Arc<CompiledFilter>>>,
}

impl Default for FilterCache {
    fn default() -> Self {
        Self::with_max_variables(DEFAULT_MAX_VARIABLES)
    }
}

impl FilterCache {
    /// Create an empty cache with the default variable limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache. `max_variables` is clamped to
    /// [`MAX_VARIABLES`].
    #[must_use]
    pub fn with_max_variables(max_variables: usize) -> Self {
        Self {
            max_variables: max_variables.min(MAX_VARIABLES),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Variable limit applied to every compilation.
    #[must_use]
    pub fn max_variables(&self) -> usize {
        self.max_variables
    }

    /// Return the cached compilation of `expr`, compiling it on a miss.
    ///
    /// Failed compilations are not cached.
    pub fn get_or_compile(&self, expr: &FilterExpr) -> EcsResult<Arc<CompiledFilter>> {
        if let Some(hit) = self.entries.read().get(expr) {
            tracing::trace!(filter = %expr, "filter cache hit");
            return Ok(Arc::clone(hit));
        }

        let compiled = Arc::new(compile_filter(expr, self.max_variables)?);
        tracing::debug!(
            filter = %expr,
            compiled = %compiled,
            variables = compiled.variables().len(),
            products = compiled.products().len(),
            "compiled filter"
        );

        // Another thread may have won the race; keep the first entry so
        // every caller sees the same Arc.
        let mut entries = self.entries.write();
        let entry = entries.entry(expr.clone()).or_insert(compiled);
        Ok(Arc::clone(entry))
    }

    /// Look up without compiling.
    #[must_use]
    pub fn get(&self, expr: &FilterExpr) -> Option<Arc<CompiledFilter>> {
        self.entries.read().get(expr).cloned()
    }

    /// Number of cached filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing has been compiled yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl std::fmt::Debug for FilterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterCache")
            .field("max_variables", &self.max_variables)
            .field("entries", &self.len())
            .finish()
    }
}
