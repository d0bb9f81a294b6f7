use burn::data::dataset::vision::{MnistDataset, MnistItem};
use burn::data::dataset::Dataset;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{FeatureTable, LabeledTable, Splits};
use crate::error::Result;

pub const IMAGE_SIDE: usize = 28;
pub const IMAGE_PIXELS: usize = IMAGE_SIDE * IMAGE_SIDE;
/// Leading training images held out as the validation split.
pub const VALIDATION_SIZE: usize = 5_000;

/// Downloads (on first use) and splits MNIST into train / validation / test.
pub fn load() -> Splits<Vec<MnistItem>> {
    let mut train: Vec<MnistItem> = MnistDataset::train().iter().collect();
    let test: Vec<MnistItem> = MnistDataset::test().iter().collect();

    let validation_len = VALIDATION_SIZE.min(train.len());
    let rest = train.split_off(validation_len);
    tracing::debug!(
        train = rest.len(),
        validation = train.len(),
        test = test.len(),
        "Loaded MNIST"
    );

    Splits {
        train: rest,
        validation: train,
        test,
    }
}

/// Pixel intensities scaled to `[0, 1]`.
pub fn pixels(item: &MnistItem) -> Vec<f32> {
    item.image
        .iter()
        .flat_map(|row| row.iter().map(|p| p / 255.0))
        .collect()
}

/// Keeps only two digits, labelled `-1` (`negative`) and `+1` (`positive`).
pub fn binary_digits(items: &[MnistItem], negative: u8, positive: u8) -> Result<LabeledTable> {
    let mut values = Vec::new();
    let mut labels = Vec::new();
    for item in items {
        let label = match item.label {
            l if l == negative => -1.0,
            l if l == positive => 1.0,
            _ => continue,
        };
        values.extend(pixels(item));
        labels.push(label);
    }
    LabeledTable::new(FeatureTable::new(values, IMAGE_PIXELS)?, labels)
}

/// Any lit pixel becomes `1.0`.
pub fn binarize(items: &[MnistItem]) -> Result<FeatureTable> {
    let values = items
        .iter()
        .flat_map(|item| item.image.iter().flatten())
        .map(|&p| if p > 0.0 { 1.0 } else { 0.0 })
        .collect();
    FeatureTable::new(values, IMAGE_PIXELS)
}

/// Random subset of `count` items, drawn without replacement.
pub fn sample(items: &[MnistItem], count: usize, seed: u64) -> Vec<MnistItem> {
    let mut picked = items.to_vec();
    picked.shuffle(&mut StdRng::seed_from_u64(seed));
    picked.truncate(count);
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(label: u8, value: f32) -> MnistItem {
        MnistItem {
            image: [[value; IMAGE_SIDE]; IMAGE_SIDE],
            label,
        }
    }

    #[test]
    fn binary_digits_filters_and_signs_labels() {
        let items = vec![item(2, 255.0), item(7, 10.0), item(5, 51.0)];
        let table = binary_digits(&items, 2, 5).unwrap();

        assert_eq!(table.labels, vec![-1.0, 1.0]);
        assert_eq!(table.features.num_cols(), IMAGE_PIXELS);
        assert!((table.features.row(1)[0] - 0.2).abs() < 1e-6);
        assert_eq!(table.count_label(1.0), 1);
    }

    #[test]
    fn binarize_thresholds_at_zero() {
        let table = binarize(&[item(0, 0.0), item(1, 3.0)]).unwrap();
        assert!(table.row(0).iter().all(|&p| p == 0.0));
        assert!(table.row(1).iter().all(|&p| p == 1.0));
        assert_eq!(table.find_non_binary(), None);
    }

    #[test]
    fn sample_truncates_without_repeats() {
        let items: Vec<_> = (0..10).map(|l| item(l, 0.0)).collect();
        let mut labels: Vec<u8> = sample(&items, 4, 1).iter().map(|i| i.label).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), 4);
    }
}
