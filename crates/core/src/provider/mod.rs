//! Weighted random selection with per-collection anti-repeat memory.
//!
//! A [`WeightedProvider`] lives for exactly one show generation. For every
//! collection id it remembers the last chosen item when that item may not
//! chain, and keeps that item out of the next draw from the same collection.
//! Nested collections carry their own ids and therefore their own memory.

use std::collections::HashMap;

use rand::Rng;

use crate::{Result, ShowGenError};

/// One selectable entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderItem<T> {
    pub id: String,
    pub name: String,
    pub weight: f64,
    pub active: bool,
    /// Whether the item may be picked twice in a row from its collection.
    pub can_chain: bool,
    pub value: ProviderValue<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderValue<T> {
    Leaf(T),
    Nested(Collection<T>),
}

impl<T> ProviderItem<T> {
    /// Active, chainable leaf named after its id.
    pub fn leaf(id: impl Into<String>, weight: f64, value: T) -> Self {
        Self::with_value(id.into(), weight, ProviderValue::Leaf(value))
    }

    /// Item that descends into `collection` when chosen.
    pub fn nested(id: impl Into<String>, weight: f64, collection: Collection<T>) -> Self {
        Self::with_value(id.into(), weight, ProviderValue::Nested(collection))
    }

    fn with_value(id: String, weight: f64, value: ProviderValue<T>) -> Self {
        Self {
            name: id.clone(),
            id,
            weight,
            active: true,
            can_chain: true,
            value,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn non_chaining(mut self) -> Self {
        self.can_chain = false;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    fn selectable(&self) -> bool {
        self.active && self.weight > 0.0
    }
}

/// A weighted pool identified by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T> {
    pub id: String,
    pub items: Vec<ProviderItem<T>>,
}

impl<T> Collection<T> {
    pub fn new(id: impl Into<String>, items: Vec<ProviderItem<T>>) -> Self {
        Self {
            id: id.into(),
            items,
        }
    }
}

/// Selection state scoped to one generation call.
#[derive(Debug, Default, Clone)]
pub struct WeightedProvider {
    excluded: HashMap<String, String>,
}

impl WeightedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the item that the next draw from `collection_id` will skip.
    pub fn excluded(&self, collection_id: &str) -> Option<&str> {
        self.excluded.get(collection_id).map(String::as_str)
    }

    /// Draws a leaf value, descending through nested collections.
    pub fn select<'c, T, R: Rng + ?Sized>(
        &mut self,
        collection: &'c Collection<T>,
        rng: &mut R,
    ) -> Result<&'c T> {
        let mut current = collection;
        loop {
            let item = self.select_item(&current.items, &current.id, rng)?;
            match &item.value {
                ProviderValue::Leaf(value) => return Ok(value),
                ProviderValue::Nested(inner) => current = inner,
            }
        }
    }

    /// Draws one item from `items` under the memory of `collection_id`.
    ///
    /// Inactive and zero-weight items never win. The excluded item is removed
    /// from both the weight total and the walk; if nothing else is selectable
    /// the exclusion is waived for this draw.
    pub fn select_item<'c, T, R: Rng + ?Sized>(
        &mut self,
        items: &'c [ProviderItem<T>],
        collection_id: &str,
        rng: &mut R,
    ) -> Result<&'c ProviderItem<T>> {
        let selectable: Vec<&ProviderItem<T>> =
            items.iter().filter(|item| item.selectable()).collect();
        if selectable.is_empty() {
            return Err(ShowGenError::no_candidates(collection_id));
        }

        let excluded = self.excluded(collection_id);
        let mut pool: Vec<&ProviderItem<T>> = selectable
            .iter()
            .copied()
            .filter(|item| Some(item.id.as_str()) != excluded)
            .collect();
        if pool.is_empty() {
            tracing::warn!(
                collection = collection_id,
                excluded,
                "anti-repeat exclusion would empty the collection; waiving it"
            );
            pool = selectable;
        }

        let weights: Vec<f64> = pool.iter().map(|item| item.weight).collect();
        let index = weighted_index(&weights, rng)
            .ok_or_else(|| ShowGenError::no_candidates(collection_id))?;
        let chosen = pool[index];

        if chosen.can_chain {
            self.excluded.remove(collection_id);
        } else {
            self.excluded
                .insert(collection_id.to_string(), chosen.id.clone());
        }
        Ok(chosen)
    }
}

/// Cumulative-weight draw over `weights`.
///
/// Returns `None` when the total weight is not positive, or when rounding
/// lets the walk fall through without landing on an index.
pub(crate) fn weighted_index<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
    if !(total > 0.0) || !total.is_finite() {
        return None;
    }
    let mut remaining = rng.random_range(0.0..total);
    for (index, weight) in weights.iter().enumerate() {
        remaining -= weight.max(0.0);
        if remaining < 0.0 {
            return Some(index);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::seeded;

    fn colours() -> Collection<&'static str> {
        Collection::new(
            "colours",
            vec![
                ProviderItem::leaf("red", 1.0, "red"),
                ProviderItem::leaf("green", 2.0, "green"),
                ProviderItem::leaf("blue", 7.0, "blue"),
            ],
        )
    }

    #[test]
    fn frequencies_follow_weights() {
        let collection = colours();
        let mut provider = WeightedProvider::new();
        let mut rng = seeded(2024);
        let trials = 20_000;
        let mut counts = HashMap::new();
        for _ in 0..trials {
            let value = provider.select(&collection, &mut rng).unwrap();
            *counts.entry(*value).or_insert(0usize) += 1;
        }
        for (name, expected) in [("red", 0.1), ("green", 0.2), ("blue", 0.7)] {
            let observed = counts[name] as f64 / trials as f64;
            assert!(
                (observed - expected).abs() < 0.02,
                "{name}: observed {observed}, expected {expected}"
            );
        }
    }

    #[test]
    fn non_chaining_item_is_never_picked_twice_in_a_row() {
        let collection = Collection::new(
            "pool",
            vec![
                ProviderItem::leaf("solo", 50.0, "solo").non_chaining(),
                ProviderItem::leaf("a", 1.0, "a"),
                ProviderItem::leaf("b", 1.0, "b"),
            ],
        );
        let mut provider = WeightedProvider::new();
        let mut rng = seeded(9);
        let mut previous = "";
        let mut solo_seen = 0;
        for _ in 0..5_000 {
            let value = *provider.select(&collection, &mut rng).unwrap();
            if value == "solo" {
                assert_ne!(previous, "solo");
                solo_seen += 1;
            }
            previous = value;
        }
        assert!(solo_seen > 1_000);
    }

    #[test]
    fn exclusion_is_recorded_and_cleared() {
        let collection = Collection::new(
            "pair",
            vec![
                ProviderItem::leaf("once", 1.0, 1).non_chaining(),
                ProviderItem::leaf("again", 1.0, 2),
            ],
        );
        let mut provider = WeightedProvider::new();
        let mut rng = seeded(1);
        for _ in 0..100 {
            let value = *provider.select(&collection, &mut rng).unwrap();
            match value {
                1 => assert_eq!(provider.excluded("pair"), Some("once")),
                _ => assert_eq!(provider.excluded("pair"), None),
            }
        }
    }

    #[test]
    fn nested_collections_keep_independent_memory() {
        let inner = Collection::new(
            "inner",
            vec![
                ProviderItem::leaf("x", 1.0, "x").non_chaining(),
                ProviderItem::leaf("y", 1.0, "y").non_chaining(),
            ],
        );
        let outer = Collection::new(
            "outer",
            vec![ProviderItem::nested("group", 1.0, inner).non_chaining()],
        );
        let mut provider = WeightedProvider::new();
        let mut rng = seeded(4);

        let mut previous = "";
        for _ in 0..200 {
            let value = *provider.select(&outer, &mut rng).unwrap();
            assert_ne!(value, previous, "inner memory must alternate x and y");
            previous = value;
            // The lone outer item is always waived back in.
            assert_eq!(provider.excluded("outer"), Some("group"));
        }
    }

    #[test]
    fn inactive_items_are_never_selected() {
        let collection = Collection::new(
            "mixed",
            vec![
                ProviderItem::leaf("off", 100.0, "off").inactive(),
                ProviderItem::leaf("on", 1.0, "on"),
            ],
        );
        let mut provider = WeightedProvider::new();
        let mut rng = seeded(3);
        for _ in 0..1_000 {
            assert_eq!(*provider.select(&collection, &mut rng).unwrap(), "on");
        }
    }

    #[test]
    fn empty_or_weightless_pools_fail() {
        let mut provider = WeightedProvider::new();
        let mut rng = seeded(0);

        let empty: Collection<u8> = Collection::new("empty", Vec::new());
        let err = provider.select(&empty, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            ShowGenError::NoCandidates { ref collection } if collection == "empty"
        ));

        let weightless = Collection::new("zero", vec![ProviderItem::leaf("a", 0.0, 1u8)]);
        assert!(matches!(
            provider.select(&weightless, &mut rng),
            Err(ShowGenError::NoCandidates { .. })
        ));
    }

    #[test]
    fn weighted_index_handles_degenerate_input() {
        let mut rng = seeded(0);
        assert_eq!(weighted_index(&[], &mut rng), None);
        assert_eq!(weighted_index(&[0.0, 0.0], &mut rng), None);
        assert_eq!(weighted_index(&[0.0, 3.0], &mut rng), Some(1));
    }
}
