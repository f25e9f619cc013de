//! Compiled filters: minimized sum-of-products over component tags.

use std::fmt;

use smallvec::SmallVec;

use super::{expr::FilterExpr, qmc};
use crate::{
    component::ComponentId,
    error::{EcsError, EcsResult},
    membership::ComponentSet,
};

/// Variable limit used when nothing else is configured.
pub const DEFAULT_MAX_VARIABLES: usize = 10;

/// Hard ceiling for the variable limit.
///
/// Enumeration is `2^n`, but merging is worse: an `n`-way disjunction
/// produces close to `3^n` implicants before the primes settle. At 12 that
/// is about half a million, a fraction of a second; every two more
/// variables cost twenty times as much.
pub const MAX_VARIABLES: usize = 12;

// ============================================================================
// Product
// ============================================================================

/// One conjunction of a compiled filter.
///
/// `selector` holds every tag the product mentions, `required` the subset
/// that must be present. Tags in `selector` but not in `required` must be
/// absent; tags outside `selector` are don't-cares.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Product {
    selector: ComponentSet,
    required: ComponentSet,
}

impl Product {
    /// Tags this product constrains.
    #[must_use]
    pub fn selector(&self) -> &ComponentSet {
        &self.selector
    }

    /// Tags that must be present.
    #[must_use]
    pub fn required(&self) -> &ComponentSet {
        &self.required
    }

    /// Tags that must be present, ascending.
    pub fn present(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.required.iter()
    }

    /// Tags that must be absent, ascending.
    pub fn absent(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.selector
            .iter()
            .filter(|&id| !self.required.contains(id))
    }

    /// Test a membership bitset: `bits & selector == required`.
    #[inline]
    #[must_use]
    pub fn matches(&self, bits: &ComponentSet) -> bool {
        bits.matches_masked(&self.selector, &self.required)
    }

    /// Number of literals.
    #[must_use]
    pub fn literal_count(&self) -> usize {
        self.selector.len()
    }

    /// The empty product, which every bitset satisfies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selector.is_empty()
    }

    fn write<F>(&self, f: &mut fmt::Formatter<'_>, name: &F) -> fmt::Result
    where
        F: Fn(ComponentId) -> String,
    {
        if self.is_empty() {
            return f.write_str("true");
        }
        for (i, id) in self.selector.iter().enumerate() {
            if i > 0 {
                f.write_str(" & ")?;
            }
            if !self.required.contains(id) {
                f.write_str("!")?;
            }
            f.write_str(&name(id))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Product(")?;
        self.write(f, &|id: ComponentId| id.to_string())?;
        f.write_str(")")
    }
}

// ============================================================================
// CompiledFilter
// ============================================================================

/// Minimized, immutable form of a [`FilterExpr`].
///
/// Logically equivalent to its source expression for every assignment of
/// component presence. No products means always false; a single empty
/// product means always true.
#[derive(Clone, PartialEq, Eq)]
pub struct CompiledFilter {
    products: Vec<Product>,
    variables: SmallVec<[ComponentId; 8]>,
}

impl CompiledFilter {
    /// The always-true filter.
    #[must_use]
    pub fn always() -> Self {
        Self {
            products: vec![Product {
                selector: ComponentSet::new(),
                required: ComponentSet::new(),
            }],
            variables: SmallVec::new(),
        }
    }

    /// Test a membership bitset against the filter.
    #[inline]
    #[must_use]
    pub fn matches(&self, bits: &ComponentSet) -> bool {
        self.products.iter().any(|product| product.matches(bits))
    }

    /// The products, in deterministic order.
    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Distinct tags referenced by the source expression, ascending.
    ///
    /// Can be a superset of the tags the products mention, since
    /// minimization may drop irrelevant variables.
    #[must_use]
    pub fn variables(&self) -> &[ComponentId] {
        &self.variables
    }

    /// Matches every bitset.
    #[must_use]
    pub fn is_always_true(&self) -> bool {
        matches!(self.products.as_slice(), [only] if only.is_empty())
    }

    /// Matches no bitset.
    #[must_use]
    pub fn is_always_false(&self) -> bool {
        self.products.is_empty()
    }

    /// Render with a custom name for each component.
    pub fn display_with<'a, F>(&'a self, name: F) -> impl fmt::Display + 'a
    where
        F: Fn(ComponentId) -> String + 'a,
    {
        Named { filter: self, name }
    }

    fn write<F>(&self, f: &mut fmt::Formatter<'_>, name: &F) -> fmt::Result
    where
        F: Fn(ComponentId) -> String,
    {
        if self.products.is_empty() {
            return f.write_str("false");
        }
        let grouped = self.products.len() > 1;
        for (i, product) in self.products.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            if grouped && product.literal_count() > 1 {
                f.write_str("(")?;
                product.write(f, name)?;
                f.write_str(")")?;
            } else {
                product.write(f, name)?;
            }
        }
        Ok(())
    }
}

struct Named<'a, F> {
    filter: &'a CompiledFilter,
    name: F,
}

impl<F> fmt::Display for Named<'_, F>
where
    F: Fn(ComponentId) -> String,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.filter.write(f, &self.name)
    }
}

impl fmt::Display for CompiledFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, &|id: ComponentId| id.to_string())
    }
}

impl fmt::Debug for CompiledFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFilter")
            .field("products", &self.products)
            .field("variables", &self.variables)
            .finish()
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// Compile `expr` into a minimized sum of products.
///
/// Referenced tags are renumbered `0..n` for this compilation only, so
/// the cost depends on the filter's own arity, not on how many
/// components are registered. `limit` is clamped to [`MAX_VARIABLES`].
///
/// Pure and deterministic: the same tree always yields the same products
/// in the same order.
///
/// # Errors
///
/// [`EcsError::FilterTooComplex`] if `expr` references more than `limit`
/// distinct components. Nothing is enumerated in that case.
pub fn compile_filter(expr: &FilterExpr, limit: usize) -> EcsResult<CompiledFilter> {
    let limit = limit.min(MAX_VARIABLES);
    let variables = expr.variables();
    if variables.len() > limit {
        return Err(EcsError::FilterTooComplex {
            variables: variables.len(),
            limit,
        });
    }

    let n = variables.len() as u32;
    let minterms: Vec<u32> = (0..1u32 << n)
        .filter(|&assignment| {
            expr.eval_with(&|id| {
                variables
                    .binary_search(&id)
                    .is_ok_and(|var| (assignment >> var) & 1 == 1)
            })
        })
        .collect();

    let products = qmc::minimize(n, &minterms)
        .into_iter()
        .map(|implicant| {
            let mut selector = ComponentSet::new();
            let mut required = ComponentSet::new();
            for (var, positive) in implicant.literals() {
                let id = variables[var as usize];
                selector.insert(id);
                if positive {
                    required.insert(id);
                }
            }
            Product { selector, required }
        })
        .collect();

    Ok(CompiledFilter {
        products,
        variables,
    })
}
