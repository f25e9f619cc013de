//! Two-level logic minimization (Quine–McCluskey).
//!
//! Works on local variable indices `0..n`, `n <= 32`. Bit `v` of a
//! minterm is the value of variable `v`. The caller maps variables to
//! component tags and back.

use std::cmp::Ordering;

use hashbrown::{HashMap, HashSet};
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

/// A product term: the variables in `care` are fixed to their bit in
/// `value`, every other variable is a don't-care.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Implicant {
    /// Fixed variable values. Always a subset of `care`.
    pub value: u32,
    /// Mask of fixed variables.
    pub care: u32,
}

impl Implicant {
    /// The implicant that fixes every one of `n` variables to `minterm`.
    #[must_use]
    pub const fn minterm(minterm: u32, n: u32) -> Self {
        let care = full_mask(n);
        Self {
            value: minterm & care,
            care,
        }
    }

    /// True if `minterm` satisfies this product.
    #[inline]
    #[must_use]
    pub const fn covers(self, minterm: u32) -> bool {
        minterm & self.care == self.value
    }

    /// Number of don't-care positions among `n` variables.
    #[must_use]
    pub const fn dont_cares(self, n: u32) -> u32 {
        n - self.care.count_ones()
    }

    /// Fixed literals as `(variable, polarity)`, variable ascending.
    #[must_use]
    pub fn literals(self) -> SmallVec<[(u32, bool); 8]> {
        let mut rest = self.care;
        let mut out = SmallVec::new();
        while rest != 0 {
            let var = rest.trailing_zeros();
            out.push((var, self.value & (1 << var) != 0));
            rest &= rest - 1;
        }
        out
    }

    /// Merge two implicants that differ in exactly one fixed variable.
    fn merge(self, other: Self) -> Option<Self> {
        if self.care != other.care {
            return None;
        }
        let diff = self.value ^ other.value;
        (diff.count_ones() == 1).then(|| Self {
            value: self.value & !diff,
            care: self.care & !diff,
        })
    }

    /// Deterministic preference order: fewer don't-cares first, then the
    /// lexicographically smaller literal list (negative before positive).
    fn preference(self, other: Self, n: u32) -> Ordering {
        self.dont_cares(n)
            .cmp(&other.dont_cares(n))
            .then_with(|| self.literals().cmp(&other.literals()))
    }
}

const fn full_mask(n: u32) -> u32 {
    if n >= 32 { u32::MAX } else { (1u32 << n) - 1 }
}

/// All prime implicants of the function whose on-set is `minterms`.
///
/// Terms are grouped by their care mask and by the number of set value
/// bits; only neighbouring groups can merge.
#[must_use]
pub fn prime_implicants(n: u32, minterms: &[u32]) -> Vec<Implicant> {
    let mut current: Vec<Implicant> = minterms.iter().map(|&m| Implicant::minterm(m, n)).collect();
    current.sort_unstable_by_key(|imp| (imp.care, imp.value));
    current.dedup();

    let mut primes = Vec::new();

    while !current.is_empty() {
        let mut groups: HashMap<(u32, u32), Vec<usize>, FxBuildHasher> = HashMap::default();
        for (idx, imp) in current.iter().enumerate() {
            groups
                .entry((imp.care, imp.value.count_ones()))
                .or_default()
                .push(idx);
        }

        let mut merged = vec![false; current.len()];
        let mut next: HashSet<Implicant, FxBuildHasher> = HashSet::default();

        for (&(care, ones), lower) in &groups {
            let Some(upper) = groups.get(&(care, ones + 1)) else {
                continue;
            };
            for &i in lower {
                for &j in upper {
                    if let Some(combined) = current[i].merge(current[j]) {
                        merged[i] = true;
                        merged[j] = true;
                        next.insert(combined);
                    }
                }
            }
        }

        primes.extend(
            current
                .iter()
                .zip(&merged)
                .filter(|&(_, &was_merged)| !was_merged)
                .map(|(imp, _)| *imp),
        );

        current = next.into_iter().collect();
        current.sort_unstable_by_key(|imp| (imp.care, imp.value));
    }

    primes.sort_unstable_by(|a, b| a.preference(*b, n));
    primes.dedup();
    primes
}

/// Search nodes the exact cover pass may visit before it settles for the
/// best cover found so far.
const SEARCH_BUDGET: usize = 4096;

/// Pick a minimum-cost set of `primes` covering every minterm.
///
/// Essential prime implicants are always taken. The rest is first covered
/// greedily (most newly covered minterms wins, ties go to the preferred
/// prime), then a branch-and-bound search over the primes covering each
/// open minterm looks for a cheaper cover. Cost is the number of
/// products, then the total number of literals; on equal cost the first
/// cover found wins, so the result is deterministic.
///
/// The search stops after a fixed number of nodes. Within that budget the
/// cover is minimal; past it, it is the best found and never worse than
/// the greedy one. The result is sorted by preference.
#[must_use]
pub fn select_cover(n: u32, minterms: &[u32], primes: &[Implicant]) -> Vec<Implicant> {
    let mut search = CoverSearch::new(n, minterms, primes);
    search.take_essentials();
    search.best = search.greedy();
    search.best_cost = search.cost(&search.best);
    search.run();

    let mut cover: Vec<Implicant> = search.best.iter().map(|&idx| primes[idx]).collect();
    cover.sort_unstable_by(|a, b| a.preference(*b, n));
    cover
}

struct CoverSearch {
    /// Minterm positions each prime covers.
    covers: Vec<Vec<usize>>,
    /// Primes covering each minterm, in preference order.
    covering: Vec<SmallVec<[usize; 4]>>,
    /// Position of each prime in preference order.
    rank: Vec<usize>,
    literals: Vec<u32>,
    /// How many chosen primes cover each minterm.
    hits: Vec<u32>,
    chosen: Vec<usize>,
    best: Vec<usize>,
    best_cost: (usize, u32),
    budget: usize,
}

impl CoverSearch {
    fn new(n: u32, minterms: &[u32], primes: &[Implicant]) -> Self {
        let mut order: Vec<usize> = (0..primes.len()).collect();
        order.sort_by(|&a, &b| primes[a].preference(primes[b], n));

        let mut rank = vec![0; primes.len()];
        let mut covers = vec![Vec::new(); primes.len()];
        let mut covering = vec![SmallVec::new(); minterms.len()];
        for (position, &idx) in order.iter().enumerate() {
            rank[idx] = position;
            for (pos, &minterm) in minterms.iter().enumerate() {
                if primes[idx].covers(minterm) {
                    covers[idx].push(pos);
                    covering[pos].push(idx);
                }
            }
        }

        Self {
            covers,
            covering,
            rank,
            literals: primes.iter().map(|p| p.care.count_ones()).collect(),
            hits: vec![0; minterms.len()],
            chosen: Vec::new(),
            best: Vec::new(),
            best_cost: (usize::MAX, u32::MAX),
            budget: SEARCH_BUDGET,
        }
    }

    fn take(&mut self, prime: usize) {
        self.chosen.push(prime);
        for &pos in &self.covers[prime] {
            self.hits[pos] += 1;
        }
    }

    fn untake(&mut self, prime: usize) {
        self.chosen.pop();
        for &pos in &self.covers[prime] {
            self.hits[pos] -= 1;
        }
    }

    fn cost(&self, set: &[usize]) -> (usize, u32) {
        (set.len(), set.iter().map(|&idx| self.literals[idx]).sum())
    }

    /// Take every prime that is the only one covering some minterm.
    fn take_essentials(&mut self) {
        for pos in 0..self.covering.len() {
            if let &[only] = self.covering[pos].as_slice()
                && !self.chosen.contains(&only)
            {
                self.take(only);
            }
        }
    }

    /// Complete the current selection greedily, leaving it untouched.
    fn greedy(&self) -> Vec<usize> {
        let mut cover = self.chosen.clone();
        let mut open: Vec<bool> = self.hits.iter().map(|&h| h == 0).collect();
        let mut gain: Vec<usize> = self
            .covers
            .iter()
            .map(|minterms| minterms.iter().filter(|&&pos| open[pos]).count())
            .collect();

        loop {
            let pick = (0..gain.len()).filter(|&prime| gain[prime] > 0).max_by(|&a, &b| {
                gain[a]
                    .cmp(&gain[b])
                    .then_with(|| self.rank[b].cmp(&self.rank[a]))
            });
            let Some(prime) = pick else {
                return cover;
            };

            cover.push(prime);
            for &pos in &self.covers[prime] {
                if open[pos] {
                    open[pos] = false;
                    for &other in &self.covering[pos] {
                        gain[other] -= 1;
                    }
                }
            }
        }
    }

    fn run(&mut self) {
        if self.budget == 0 {
            return;
        }
        self.budget -= 1;

        let Some(open) = self.hits.iter().position(|&h| h == 0) else {
            let cost = self.cost(&self.chosen);
            if cost < self.best_cost {
                self.best.clone_from(&self.chosen);
                self.best_cost = cost;
            }
            return;
        };
        // covering `open` needs one more product
        if self.chosen.len() + 1 > self.best_cost.0 {
            return;
        }

        let options = self.covering[open].clone();
        for prime in options {
            self.take(prime);
            self.run();
            self.untake(prime);
        }
    }
}

/// Minimize the function over `n` variables whose on-set is `minterms`.
#[must_use]
pub fn minimize(n: u32, minterms: &[u32]) -> Vec<Implicant> {
    let primes = prime_implicants(n, minterms);
    select_cover(n, minterms, &primes)
}
