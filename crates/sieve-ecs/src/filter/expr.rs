//! Filter expression trees.
//!
//! A [`FilterExpr`] is an immutable boolean expression over component
//! presence. Operands live behind `Arc`, so combining expressions shares
//! subtrees instead of copying them. The builders normalise as they go:
//! nested `&`/`|` are flattened, constants are folded, duplicate operands
//! and double negations are dropped. None of that changes the truth table.

use std::{fmt, ops, sync::Arc};

use smallvec::SmallVec;

use crate::{component::ComponentId, membership::ComponentSet};

/// Boolean expression over component presence.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum FilterExpr {
    /// Constant truth value.
    Const(bool),
    /// Entity has this component.
    Has(ComponentId),
    /// Negation.
    Not(Arc<FilterExpr>),
    /// Conjunction of all operands.
    All(Arc<[FilterExpr]>),
    /// Disjunction of all operands.
    Any(Arc<[FilterExpr]>),
}

/// Literal for a single component.
#[must_use]
pub fn has(id: ComponentId) -> FilterExpr {
    FilterExpr::Has(id)
}

/// Negate an expression.
#[must_use]
pub fn not_of(expr: impl Into<FilterExpr>) -> FilterExpr {
    match expr.into() {
        FilterExpr::Const(value) => FilterExpr::Const(!value),
        FilterExpr::Not(inner) => Arc::unwrap_or_clone(inner),
        other => FilterExpr::Not(Arc::new(other)),
    }
}

/// Conjunction of `operands`. An empty conjunction is `true`.
#[must_use]
pub fn and_of<I>(operands: I) -> FilterExpr
where
    I: IntoIterator,
    I::Item: Into<FilterExpr>,
{
    combine(operands, true)
}

/// Disjunction of `operands`. An empty disjunction is `false`.
#[must_use]
pub fn or_of<I>(operands: I) -> FilterExpr
where
    I: IntoIterator,
    I::Item: Into<FilterExpr>,
{
    combine(operands, false)
}

/// Shared body of [`and_of`] (`identity == true`) and [`or_of`].
fn combine<I>(operands: I, identity: bool) -> FilterExpr
where
    I: IntoIterator,
    I::Item: Into<FilterExpr>,
{
    let absorbing = !identity;
    let mut flat: SmallVec<[FilterExpr; 4]> = SmallVec::new();

    for operand in operands {
        let operand = operand.into();
        let nested = match (&operand, identity) {
            (FilterExpr::Const(value), _) if *value == identity => continue,
            (FilterExpr::Const(_), _) => return FilterExpr::Const(absorbing),
            (FilterExpr::All(terms), true) | (FilterExpr::Any(terms), false) => Some(terms.clone()),
            _ => None,
        };

        match nested {
            Some(terms) => {
                for term in terms.iter() {
                    if !push(&mut flat, term.clone()) {
                        return FilterExpr::Const(absorbing);
                    }
                }
            }
            None => {
                if !push(&mut flat, operand) {
                    return FilterExpr::Const(absorbing);
                }
            }
        }
    }

    match flat.len() {
        0 => FilterExpr::Const(identity),
        1 => flat.swap_remove(0),
        _ => {
            let terms: Arc<[FilterExpr]> = flat.into_iter().collect();
            if identity {
                FilterExpr::All(terms)
            } else {
                FilterExpr::Any(terms)
            }
        }
    }
}

/// Append `term` unless already present. Returns `false` when its
/// complement is already present, i.e. the whole combination is constant.
fn push(flat: &mut SmallVec<[FilterExpr; 4]>, term: FilterExpr) -> bool {
    if flat.contains(&not_of(term.clone())) {
        return false;
    }
    if !flat.contains(&term) {
        flat.push(term);
    }
    true
}

impl FilterExpr {
    /// Always true.
    pub const TRUE: Self = Self::Const(true);
    /// Always false.
    pub const FALSE: Self = Self::Const(false);

    /// Evaluate against a membership bitset by walking the tree.
    #[must_use]
    pub fn eval(&self, set: &ComponentSet) -> bool {
        self.eval_with(&|id| set.contains(id))
    }

    /// Evaluate with an arbitrary presence oracle.
    pub fn eval_with<F>(&self, present: &F) -> bool
    where
        F: Fn(ComponentId) -> bool,
    {
        match self {
            Self::Const(value) => *value,
            Self::Has(id) => present(*id),
            Self::Not(inner) => !inner.eval_with(present),
            Self::All(terms) => terms.iter().all(|t| t.eval_with(present)),
            Self::Any(terms) => terms.iter().any(|t| t.eval_with(present)),
        }
    }

    /// Distinct components referenced, ascending.
    #[must_use]
    pub fn variables(&self) -> SmallVec<[ComponentId; 8]> {
        let mut vars = SmallVec::new();
        self.collect_variables(&mut vars);
        vars.sort_unstable();
        vars.dedup();
        vars
    }

    fn collect_variables(&self, out: &mut SmallVec<[ComponentId; 8]>) {
        match self {
            Self::Const(_) => {}
            Self::Has(id) => out.push(*id),
            Self::Not(inner) => inner.collect_variables(out),
            Self::All(terms) | Self::Any(terms) => {
                for term in terms.iter() {
                    term.collect_variables(out);
                }
            }
        }
    }

    /// Render with a custom name for each component.
    pub fn display_with<'a, F>(&'a self, name: F) -> impl fmt::Display + 'a
    where
        F: Fn(ComponentId) -> String + 'a,
    {
        Named { expr: self, name }
    }

    fn write<F>(&self, f: &mut fmt::Formatter<'_>, name: &F) -> fmt::Result
    where
        F: Fn(ComponentId) -> String,
    {
        match self {
            Self::Const(value) => write!(f, "{value}"),
            Self::Has(id) => f.write_str(&name(*id)),
            Self::Not(inner) => {
                f.write_str("!")?;
                inner.write_grouped(f, name, matches!(**inner, Self::All(_) | Self::Any(_)))
            }
            Self::All(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" & ")?;
                    }
                    term.write_grouped(f, name, matches!(term, Self::Any(_)))?;
                }
                Ok(())
            }
            Self::Any(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    term.write_grouped(f, name, matches!(term, Self::Any(_)))?;
                }
                Ok(())
            }
        }
    }

    fn write_grouped<F>(&self, f: &mut fmt::Formatter<'_>, name: &F, grouped: bool) -> fmt::Result
    where
        F: Fn(ComponentId) -> String,
    {
        if grouped {
            f.write_str("(")?;
            self.write(f, name)?;
            f.write_str(")")
        } else {
            self.write(f, name)
        }
    }
}

struct Named<'a, F> {
    expr: &'a FilterExpr,
    name: F,
}

impl<F> fmt::Display for Named<'_, F>
where
    F: Fn(ComponentId) -> String,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.expr.write(f, &self.name)
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, &|id: ComponentId| id.to_string())
    }
}

impl fmt::Debug for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilterExpr[{self}]")
    }
}

impl From<ComponentId> for FilterExpr {
    fn from(id: ComponentId) -> Self {
        Self::Has(id)
    }
}

impl From<&FilterExpr> for FilterExpr {
    fn from(expr: &FilterExpr) -> Self {
        expr.clone()
    }
}

impl From<bool> for FilterExpr {
    fn from(value: bool) -> Self {
        Self::Const(value)
    }
}

impl<R: Into<FilterExpr>> ops::BitAnd<R> for FilterExpr {
    type Output = FilterExpr;

    fn bitand(self, rhs: R) -> FilterExpr {
        and_of([self, rhs.into()])
    }
}

impl<R: Into<FilterExpr>> ops::BitOr<R> for FilterExpr {
    type Output = FilterExpr;

    fn bitor(self, rhs: R) -> FilterExpr {
        or_of([self, rhs.into()])
    }
}

impl ops::Not for FilterExpr {
    type Output = FilterExpr;

    fn not(self) -> FilterExpr {
        not_of(self)
    }
}

impl<R: Into<FilterExpr>> ops::BitAnd<R> for ComponentId {
    type Output = FilterExpr;

    fn bitand(self, rhs: R) -> FilterExpr {
        and_of([FilterExpr::Has(self), rhs.into()])
    }
}

impl<R: Into<FilterExpr>> ops::BitOr<R> for ComponentId {
    type Output = FilterExpr;

    fn bitor(self, rhs: R) -> FilterExpr {
        or_of([FilterExpr::Has(self), rhs.into()])
    }
}

impl ops::Not for ComponentId {
    type Output = FilterExpr;

    fn not(self) -> FilterExpr {
        not_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ComponentId = ComponentId::from_raw(0);
    const B: ComponentId = ComponentId::from_raw(1);
    const C: ComponentId = ComponentId::from_raw(2);
    const D: ComponentId = ComponentId::from_raw(3);

    fn all(terms: &[FilterExpr]) -> FilterExpr {
        FilterExpr::All(terms.iter().cloned().collect())
    }

    fn any(terms: &[FilterExpr]) -> FilterExpr {
        FilterExpr::Any(terms.iter().cloned().collect())
    }

    #[test]
    fn test_and_flattens() {
        let left = (A & B) & C;
        let right = A & (B & C);
        let both = (A & B) & (C & D);

        assert_eq!(left, all(&[has(A), has(B), has(C)]));
        assert_eq!(right, all(&[has(A), has(B), has(C)]));
        assert_eq!(both, all(&[has(A), has(B), has(C), has(D)]));
    }

    #[test]
    fn test_or_flattens() {
        assert_eq!((A | B) | C, any(&[has(A), has(B), has(C)]));
        assert_eq!(A | (B | C), any(&[has(A), has(B), has(C)]));
    }

    #[test]
    fn test_mixed_nesting_is_kept() {
        assert_eq!(A & (B | C), all(&[has(A), any(&[has(B), has(C)])]));
        assert_eq!((A | B) & C, all(&[any(&[has(A), has(B)]), has(C)]));
    }

    #[test]
    fn test_not_builds_and_cancels() {
        assert_eq!(!A, FilterExpr::Not(Arc::new(has(A))));
        assert_eq!(!!A, has(A));
        assert_eq!(!FilterExpr::TRUE, FilterExpr::FALSE);
    }

    #[test]
    fn test_constant_folding() {
        assert_eq!(has(A) & true, has(A));
        assert_eq!(has(A) & false, FilterExpr::FALSE);
        assert_eq!(has(A) | true, FilterExpr::TRUE);
        assert_eq!(has(A) | false, has(A));
        assert_eq!(and_of(Vec::<FilterExpr>::new()), FilterExpr::TRUE);
        assert_eq!(or_of(Vec::<FilterExpr>::new()), FilterExpr::FALSE);
    }

    #[test]
    fn test_complements_collapse() {
        assert_eq!(A & !A, FilterExpr::FALSE);
        assert_eq!(A | !A, FilterExpr::TRUE);
        assert_eq!((A & B) | !(A & B), FilterExpr::TRUE);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        assert_eq!(A & A, has(A));
        assert_eq!((A | B) | A, any(&[has(A), has(B)]));
    }

    #[test]
    fn test_operands_are_shared() {
        let shared = A | B;
        let left = shared.clone() & C;
        let right = shared.clone() & D;

        let (FilterExpr::All(l), FilterExpr::All(r)) = (&left, &right) else {
            panic!("expected conjunctions");
        };
        let (FilterExpr::Any(x), FilterExpr::Any(y)) = (&l[0], &r[0]) else {
            panic!("expected shared disjunction");
        };
        assert!(Arc::ptr_eq(x, y));
    }

    #[test]
    fn test_eval() {
        let expr = (A & B) | C;
        let set = |ids: &[ComponentId]| ComponentSet::from_ids(ids.iter().copied());

        assert!(!expr.eval(&set(&[])));
        assert!(!expr.eval(&set(&[A])));
        assert!(expr.eval(&set(&[A, B])));
        assert!(expr.eval(&set(&[C])));
        assert!(expr.eval(&set(&[B, C, D])));
        assert!(!expr.eval(&set(&[B, D])));
    }

    #[test]
    fn test_variables_sorted_unique() {
        let expr = (C & !A) | (A & D) | C;
        assert_eq!(expr.variables().as_slice(), &[A, C, D]);
        assert!(FilterExpr::TRUE.variables().is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!((A & !B).to_string(), "#0 & !#1");
        assert_eq!(((A | B) & C).to_string(), "(#0 | #1) & #2");
        assert_eq!((!(A & B)).to_string(), "!(#0 & #1)");
        assert_eq!(FilterExpr::FALSE.to_string(), "false");

        let named = (A & !B).display_with(|id| format!("C{}", id.as_raw())).to_string();
        assert_eq!(named, "C0 & !C1");
    }
}
