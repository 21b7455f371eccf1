//! Which images the analysis screen shows for the current mode and selection.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::model::{AnalysisData, Batch, ImageHandle, ViewMode};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleImage {
    pub index: usize,
    pub image: ImageHandle,
}

/// Picks the candidate indices in priority order: selected species, then
/// every anomaly in alerts mode, then the whole batch. The result keeps the
/// first occurrence of each index.
#[must_use]
pub fn select_indices(
    mode: ViewMode,
    selected_species: Option<&str>,
    data: &AnalysisData,
    batch_len: usize,
) -> Vec<i64> {
    let candidates: Vec<i64> = if let Some(name) = selected_species {
        data.species(name)
            .map(|species| species.image_indices.clone())
            .unwrap_or_default()
    } else {
        match mode {
            ViewMode::Alerts => data
                .anomalies
                .iter()
                .flat_map(|anomaly| anomaly.image_indices.iter().copied())
                .collect(),
            ViewMode::Dashboard | ViewMode::Settings => {
                (0..batch_len).filter_map(|i| i64::try_from(i).ok()).collect()
            }
        }
    };
    dedup_stable(candidates)
}

fn dedup_stable(indices: Vec<i64>) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(indices.len());
    indices.into_iter().filter(|i| seen.insert(*i)).collect()
}

/// Joins indices against the batch. Indices with no image are dropped.
#[must_use]
pub fn resolve(batch: &Batch, indices: &[i64]) -> Vec<VisibleImage> {
    indices
        .iter()
        .filter_map(|&index| {
            let image = batch.get(index)?;
            Some(VisibleImage {
                index: usize::try_from(index).ok()?,
                image: image.clone(),
            })
        })
        .collect()
}

#[must_use]
pub fn visible_images(
    mode: ViewMode,
    selected_species: Option<&str>,
    data: &AnalysisData,
    batch: &Batch,
) -> Vec<VisibleImage> {
    resolve(
        batch,
        &select_indices(mode, selected_species, data, batch.len()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnomalyData, Severity, SpeciesData};
    use proptest::prelude::*;

    fn batch(n: usize) -> Batch {
        Batch::new(
            (0..n)
                .map(|i| ImageHandle {
                    id: format!("img-{i}"),
                    name: format!("IMG_{i:04}.JPG"),
                    mime_type: "image/jpeg".into(),
                    size_bytes: 2048,
                    preview_url: None,
                })
                .collect(),
        )
        .unwrap()
    }

    fn anomaly(indices: Vec<i64>) -> AnomalyData {
        AnomalyData {
            description: "Räude".into(),
            image_indices: indices,
            severity: Severity::High,
        }
    }

    fn species(name: &str, indices: Vec<i64>) -> SpeciesData {
        SpeciesData {
            species_name: name.into(),
            count: 1,
            behavior: String::new(),
            image_indices: indices,
        }
    }

    fn report() -> AnalysisData {
        AnalysisData {
            summary: String::new(),
            total_animals: 3,
            species_analysis: vec![
                species("Wildschwein", vec![4, 1, 4, 0]),
                species("Reh", vec![2]),
            ],
            anomalies: vec![anomaly(vec![1, 2]), anomaly(vec![2, 3])],
            non_wildlife_indices: vec![],
        }
    }

    #[test]
    fn dashboard_without_selection_shows_everything() {
        let indices = select_indices(ViewMode::Dashboard, None, &report(), 5);
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn settings_without_selection_shows_everything() {
        let indices = select_indices(ViewMode::Settings, None, &report(), 3);
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn alerts_are_flattened_in_order_without_duplicates() {
        let indices = select_indices(ViewMode::Alerts, None, &report(), 5);
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn selection_wins_over_mode() {
        let indices = select_indices(ViewMode::Alerts, Some("Wildschwein"), &report(), 5);
        assert_eq!(indices, vec![4, 1, 0]);
    }

    #[test]
    fn unknown_species_shows_nothing() {
        let indices = select_indices(ViewMode::Dashboard, Some("Luchs"), &report(), 5);
        assert!(indices.is_empty());
    }

    #[test]
    fn out_of_range_indices_are_dropped_on_resolve() {
        let mut data = report();
        data.anomalies = vec![anomaly(vec![7, 1, -2, 2])];
        let visible = visible_images(ViewMode::Alerts, None, &data, &batch(3));
        let indices: Vec<usize> = visible.iter().map(|v| v.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(visible[0].image.id, "img-1");
    }

    proptest! {
        #[test]
        fn selected_species_yields_its_indices_deduplicated(
            indices in proptest::collection::vec(0i64..20, 0..40),
        ) {
            let mut data = report();
            data.species_analysis = vec![species("Fuchs", indices.clone())];
            let selected = select_indices(ViewMode::Dashboard, Some("Fuchs"), &data, 20);

            let mut expected = Vec::new();
            for i in indices {
                if !expected.contains(&i) {
                    expected.push(i);
                }
            }
            prop_assert_eq!(selected, expected);
        }

        #[test]
        fn resolved_images_always_exist_in_batch(
            indices in proptest::collection::vec(-5i64..15, 0..40),
            n in 1usize..10,
        ) {
            let batch = batch(n);
            for visible in resolve(&batch, &indices) {
                prop_assert!(visible.index < n);
                prop_assert_eq!(&batch.images()[visible.index], &visible.image);
            }
        }
    }
}
