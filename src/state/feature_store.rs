use std::collections::BTreeMap;

use crate::geofile::feature::Feature;

/// Version of the feature store. Bumped on every replacement so index based events can be matched
/// against the store they were computed for.
pub type Generation = u64;

/// The current search results plus the user's selection over them.
///
/// Features are addressed by their position. Selection indices are only meaningful for the
/// generation they were made against, which is why every replacement clears the selection.
#[derive(Debug, Default)]
pub struct FeatureStore {
    features: Vec<Feature>,
    selection: BTreeMap<usize, bool>,
    generation: Generation,
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all features and clear the selection. An empty list means "no results".
    pub fn replace_features(&mut self, features: Vec<Feature>) {
        self.features = features;
        self.selection.clear();
        self.generation += 1;
        log::debug!(
            "Feature store generation {} holds {} features",
            self.generation,
            self.features.len()
        );
    }

    /// Flip the selection of `index`. Out of range indices are ignored, a map click can race with
    /// a store replacement.
    pub fn toggle(&mut self, index: usize) {
        if index >= self.features.len() {
            log::debug!(
                "Ignoring toggle of index {}, store holds {} features",
                index,
                self.features.len()
            );
            return;
        }
        let selected = self.selection.entry(index).or_insert(false);
        *selected = !*selected;
    }

    /// Like [`FeatureStore::toggle`], but only if the store is still at `generation`.
    pub fn toggle_in(&mut self, generation: Generation, index: usize) {
        if generation != self.generation {
            log::debug!(
                "Ignoring toggle of index {} from generation {}, store is at {}",
                index,
                generation,
                self.generation
            );
            return;
        }
        self.toggle(index);
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selection.get(&index).copied().unwrap_or(false)
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.selection
            .iter()
            .filter(|(_, selected)| **selected)
            .map(|(index, _)| *index)
            .collect()
    }

    /// The selected features in store order, or every feature when nothing is selected.
    pub fn chosen_features(&self) -> Vec<Feature> {
        let selected = self.selected_indices();
        if selected.is_empty() {
            return self.features.clone();
        }
        selected
            .into_iter()
            .map(|index| self.features[index].clone())
            .collect()
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use crate::geofile::feature::{AttributeValue, Feature, FeatureMap};

    use super::FeatureStore;

    fn parcel(lot: &str) -> Feature {
        Feature::new(
            geo::Geometry::Point(geo::Point::new(153.0, -27.5)),
            FeatureMap::from([("lot".to_string(), AttributeValue::from(lot))]),
        )
    }

    #[fixture]
    fn store() -> FeatureStore {
        let mut store = FeatureStore::new();
        store.replace_features(vec![parcel("1"), parcel("2"), parcel("3")]);
        store
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![parcel("9")])]
    #[case(vec![parcel("7"), parcel("8"), parcel("9"), parcel("10")])]
    fn test_replace_clears_selection(mut store: FeatureStore, #[case] features: Vec<Feature>) {
        store.toggle(0);
        store.toggle(2);
        let generation = store.generation();

        store.replace_features(features.clone());

        assert!(store.selected_indices().is_empty());
        assert_eq!(store.features(), features.as_slice());
        assert_eq!(store.generation(), generation + 1);
    }

    #[rstest]
    fn test_nothing_selected_chooses_everything(mut store: FeatureStore) {
        assert_eq!(store.chosen_features(), store.features().to_vec());

        // Selected then deselected leaves only false entries behind.
        store.toggle(1);
        store.toggle(1);
        assert_eq!(store.chosen_features().len(), 3);
    }

    #[rstest]
    fn test_selection_chooses_subset_in_store_order(mut store: FeatureStore) {
        store.toggle(2);
        store.toggle(0);
        assert_eq!(store.chosen_features(), vec![parcel("1"), parcel("3")]);
        assert_eq!(store.selected_indices(), vec![0, 2]);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(2)]
    fn test_double_toggle_restores_selection(mut store: FeatureStore, #[case] index: usize) {
        store.toggle(1);
        let before = store.is_selected(index);
        store.toggle(index);
        assert_ne!(store.is_selected(index), before);
        store.toggle(index);
        assert_eq!(store.is_selected(index), before);
    }

    #[rstest]
    #[case(3)]
    #[case(usize::MAX)]
    fn test_out_of_range_toggle_is_ignored(mut store: FeatureStore, #[case] index: usize) {
        store.toggle(index);
        assert!(store.selected_indices().is_empty());
        assert_eq!(store.len(), 3);
    }

    #[rstest]
    fn test_stale_generation_toggle_is_ignored(mut store: FeatureStore) {
        let stale = store.generation();
        store.replace_features(vec![parcel("4"), parcel("5")]);

        store.toggle_in(stale, 0);
        assert!(store.selected_indices().is_empty());

        store.toggle_in(store.generation(), 0);
        assert_eq!(store.chosen_features(), vec![parcel("4")]);
    }

    #[rstest]
    fn test_toggle_on_empty_store_is_ignored() {
        let mut store = FeatureStore::new();
        store.toggle(0);
        assert!(store.is_empty());
        assert!(store.chosen_features().is_empty());
    }
}
