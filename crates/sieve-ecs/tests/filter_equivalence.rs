//! Compiled filters against the tree evaluator, over every assignment.

use std::sync::Arc;

use sieve_ecs::{
    ComponentId, ComponentSet, CompiledFilter, FilterCache, FilterExpr, and_of, compile_filter,
    filter::MAX_VARIABLES, has, not_of, or_of,
};

// ============================================================================
// Helpers
// ============================================================================

/// xorshift64*, fixed seed so failures reproduce.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

/// Spread variables over several bitset words.
fn var(v: u32) -> ComponentId {
    ComponentId::from_raw(v * 23)
}

fn random_tree(rng: &mut Rng, vars: u32, depth: u32) -> FilterExpr {
    let leaf = depth == 0 || rng.below(4) == 0;
    if leaf {
        return match rng.below(16) {
            0 => FilterExpr::TRUE,
            1 => FilterExpr::FALSE,
            _ => has(var(rng.below(u64::from(vars)) as u32)),
        };
    }

    let arity = 2 + rng.below(2);
    let operands: Vec<FilterExpr> = (0..arity)
        .map(|_| random_tree(rng, vars, depth - 1))
        .collect();
    match rng.below(3) {
        0 => and_of(operands),
        1 => or_of(operands),
        _ => not_of(random_tree(rng, vars, depth - 1)),
    }
}

fn assignment(vars: u32, bits: u32) -> ComponentSet {
    (0..vars).filter(|v| (bits >> v) & 1 == 1).map(var).collect()
}

fn assert_equivalent(expr: &FilterExpr, compiled: &CompiledFilter, vars: u32) {
    for bits in 0..1u32 << vars {
        let set = assignment(vars, bits);
        assert_eq!(
            expr.eval(&set),
            compiled.matches(&set),
            "{expr} vs {compiled} at {set:?}"
        );
    }
}

// ============================================================================
// Equivalence
// ============================================================================

#[test]
fn test_random_trees_up_to_six_variables() {
    let mut rng = Rng(0x9E37_79B9_7F4A_7C15);

    for vars in 1..=6 {
        for _ in 0..150 {
            let expr = random_tree(&mut rng, vars, 4);
            let compiled = compile_filter(&expr, MAX_VARIABLES).unwrap();
            assert_equivalent(&expr, &compiled, vars);
        }
    }
}

#[test]
fn test_products_are_prime() {
    let mut rng = Rng(42);

    for _ in 0..200 {
        let vars = 4;
        let expr = random_tree(&mut rng, vars, 4);
        let compiled = compile_filter(&expr, MAX_VARIABLES).unwrap();

        for product in compiled.products() {
            for dropped in product.selector().iter() {
                // Dropping one literal must admit some assignment the
                // expression rejects.
                let widened = (0..1u32 << vars).map(|bits| assignment(vars, bits)).any(|set| {
                    let agrees = product
                        .selector()
                        .iter()
                        .filter(|&id| id != dropped)
                        .all(|id| set.contains(id) == product.required().contains(id));
                    agrees && !expr.eval(&set)
                });
                assert!(widened, "{product:?} in {compiled} is not prime");
            }
        }
    }
}

#[test]
fn test_negation_of_random_trees() {
    let mut rng = Rng(7);

    for _ in 0..200 {
        let expr = random_tree(&mut rng, 5, 3);
        let positive = compile_filter(&expr, MAX_VARIABLES).unwrap();
        let negative = compile_filter(&not_of(expr.clone()), MAX_VARIABLES).unwrap();

        for bits in 0..32 {
            let set = assignment(5, bits);
            assert_ne!(positive.matches(&set), negative.matches(&set));
        }
    }
}

// ============================================================================
// Algebra
// ============================================================================

#[test]
fn test_de_morgan() {
    let (a, b) = (var(0), var(1));

    let left = compile_filter(&!(a | b), MAX_VARIABLES).unwrap();
    let right = compile_filter(&(!a & !b), MAX_VARIABLES).unwrap();
    assert_eq!(left, right);
    assert_equivalent(&!(a | b), &right, 2);

    let left = compile_filter(&!(a & b), MAX_VARIABLES).unwrap();
    let right = compile_filter(&(!a | !b), MAX_VARIABLES).unwrap();
    assert_eq!(left, right);
}

#[test]
fn test_and_round_trip() {
    let (a, b) = (var(0), var(1));
    let compiled = compile_filter(&(a & b), MAX_VARIABLES).unwrap();

    assert!(compiled.matches(&ComponentSet::from_ids([a, b])));
    assert!(!compiled.matches(&ComponentSet::from_ids([a])));
}

#[test]
fn test_constant_boundaries() {
    let yes = compile_filter(&FilterExpr::TRUE, MAX_VARIABLES).unwrap();
    assert_eq!(yes.products().len(), 1);
    assert!(yes.products()[0].is_empty());

    let no = compile_filter(&FilterExpr::FALSE, MAX_VARIABLES).unwrap();
    assert!(no.products().is_empty());

    // x & !x folds at construction, x | !x too
    assert_eq!(var(3) & !var(3), FilterExpr::FALSE);
    assert_eq!(var(3) | !var(3), FilterExpr::TRUE);
}

// ============================================================================
// Determinism and caching
// ============================================================================

#[test]
fn test_compilation_is_deterministic() {
    let mut rng = Rng(1234);

    for _ in 0..100 {
        let expr = random_tree(&mut rng, 6, 4);
        let first = compile_filter(&expr, MAX_VARIABLES).unwrap();
        let second = compile_filter(&expr, MAX_VARIABLES).unwrap();
        assert_eq!(first.products(), second.products());
    }
}

#[test]
fn test_cache_returns_same_compiled_filter() {
    let cache = FilterCache::new();
    let mut rng = Rng(99);

    for _ in 0..50 {
        let expr = random_tree(&mut rng, 4, 3);
        let first = cache.get_or_compile(&expr).unwrap();
        let second = cache.get_or_compile(&expr.clone()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
