//! Membership bitsets.
//!
//! A [`ComponentSet`] records which component tags an entity holds:
//! bit `i` is set iff the entity has the component with tag `i`. The
//! set grows in 64-bit words, the first 128 tags live inline.

use std::fmt;

use smallvec::SmallVec;

use crate::component::ComponentId;

const WORD_BITS: usize = 64;

/// Variable-width bitset over component tags.
#[derive(Clone, Default)]
pub struct ComponentSet {
    words: SmallVec<[u64; 2]>,
}

impl ComponentSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from tags.
    #[must_use]
    pub fn from_ids(ids: impl IntoIterator<Item = ComponentId>) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.insert(id);
        }
        set
    }

    #[inline]
    const fn split(id: ComponentId) -> (usize, u64) {
        let index = id.index();
        (index / WORD_BITS, 1u64 << (index % WORD_BITS))
    }

    /// Set the bit for `id`. Returns `true` if it was clear.
    pub fn insert(&mut self, id: ComponentId) -> bool {
        let (word, bit) = Self::split(id);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let was_clear = self.words[word] & bit == 0;
        self.words[word] |= bit;
        was_clear
    }

    /// Clear the bit for `id`. Returns `true` if it was set.
    pub fn remove(&mut self, id: ComponentId) -> bool {
        let (word, bit) = Self::split(id);
        match self.words.get_mut(word) {
            Some(w) if *w & bit != 0 => {
                *w &= !bit;
                true
            }
            _ => false,
        }
    }

    /// Check the bit for `id`.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ComponentId) -> bool {
        let (word, bit) = Self::split(id);
        self.words.get(word).is_some_and(|w| w & bit != 0)
    }

    /// Clear every bit.
    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Number of set bits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True when no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Check that every bit of `other` is set here.
    #[must_use]
    pub fn is_superset(&self, other: &Self) -> bool {
        other.words.iter().enumerate().all(|(i, &w)| {
            let mine = self.words.get(i).copied().unwrap_or(0);
            mine & w == w
        })
    }

    /// `self & selector == value`, word by word.
    ///
    /// This is the product test of a compiled filter: `selector` holds
    /// every tag the product mentions, `value` the ones that must be set.
    /// `value` must be a subset of `selector`.
    #[inline]
    #[must_use]
    pub fn matches_masked(&self, selector: &Self, value: &Self) -> bool {
        selector.words.iter().enumerate().all(|(i, &sel)| {
            let mine = self.words.get(i).copied().unwrap_or(0);
            let want = value.words.get(i).copied().unwrap_or(0);
            mine & sel == want
        })
    }

    /// Iterate over set tags in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(ComponentId::from_raw((i * WORD_BITS + bit) as u32))
            })
        })
    }

    fn trimmed(&self) -> &[u64] {
        let end = self
            .words
            .iter()
            .rposition(|&w| w != 0)
            .map_or(0, |last| last + 1);
        &self.words[..end]
    }
}

impl PartialEq for ComponentSet {
    fn eq(&self, other: &Self) -> bool {
        self.trimmed() == other.trimmed()
    }
}

impl Eq for ComponentSet {}

impl std::hash::Hash for ComponentSet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.trimmed().hash(state);
    }
}

impl FromIterator<ComponentId> for ComponentSet {
    fn from_iter<I: IntoIterator<Item = ComponentId>>(iter: I) -> Self {
        Self::from_ids(iter)
    }
}

impl fmt::Debug for ComponentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(ComponentId::as_raw)).finish()
    }
}
