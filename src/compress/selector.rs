//! Tier → parameter mapping.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

use super::tier::{CompressionParameters, QualityTier};

/// Built-in parameter table, least aggressive first.
pub const DEFAULT_TABLE: [CompressionParameters; 4] = [
    // high
    CompressionParameters {
        target_resolution_dpi: 150,
        reencode_quality: 80,
        scale_factor: 0.85,
        drop_images: false,
        drop_annotations: false,
        page_subsampling_stride: 1,
    },
    // medium
    CompressionParameters {
        target_resolution_dpi: 120,
        reencode_quality: 70,
        scale_factor: 0.70,
        drop_images: false,
        drop_annotations: true,
        page_subsampling_stride: 1,
    },
    // low
    CompressionParameters {
        target_resolution_dpi: 96,
        reencode_quality: 55,
        scale_factor: 0.55,
        drop_images: true,
        drop_annotations: true,
        page_subsampling_stride: 1,
    },
    // extreme
    CompressionParameters {
        target_resolution_dpi: 72,
        reencode_quality: 40,
        scale_factor: 0.40,
        drop_images: true,
        drop_annotations: true,
        page_subsampling_stride: 2,
    },
];

/// Maps each [`QualityTier`] to its [`CompressionParameters`].
///
/// A selector only exists with a valid table: every row is in range,
/// each tier is pointwise at least as aggressive as the one before it,
/// and only the most aggressive tier may subsample pages.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySelector {
    table: [CompressionParameters; 4],
}

impl StrategySelector {
    /// Build a selector from a table indexed like [`QualityTier::ALL`].
    pub fn new(table: [CompressionParameters; 4]) -> Result<Self> {
        for (tier, params) in QualityTier::ALL.iter().zip(table.iter()) {
            params
                .validate()
                .map_err(|e| Error::InvalidConfig(format!("{}: {}", tier, e)))?;
            if params.page_subsampling_stride > 1 && !tier.is_most_aggressive() {
                return Err(Error::InvalidConfig(format!(
                    "{}: page subsampling is only allowed for the most aggressive tier",
                    tier
                )));
            }
        }

        for pair in QualityTier::ALL.windows(2) {
            let (lower, higher) = (pair[0], pair[1]);
            if !table[higher.index()].is_at_least_as_aggressive_as(&table[lower.index()]) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be at least as aggressive as {} on every field",
                    higher, lower
                )));
            }
        }

        Ok(Self { table })
    }

    /// Load a table from JSON: an object keyed by tier name.
    ///
    /// ```json
    /// { "high": { "target_resolution_dpi": 150, ... }, "medium": { ... }, ... }
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let rows: BTreeMap<QualityTier, CompressionParameters> = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("tier table: {}", e)))?;

        let mut table = DEFAULT_TABLE;
        for tier in QualityTier::ALL {
            table[tier.index()] = *rows.get(&tier).ok_or_else(|| {
                Error::InvalidConfig(format!("tier table is missing {}", tier))
            })?;
        }
        Self::new(table)
    }

    /// Serialize the table in the format read by [`from_json`](Self::from_json).
    pub fn to_json(&self) -> Result<String> {
        let rows: BTreeMap<QualityTier, CompressionParameters> = QualityTier::ALL
            .iter()
            .map(|tier| (*tier, self.table[tier.index()]))
            .collect();
        serde_json::to_string_pretty(&rows).map_err(|e| Error::Other(e.to_string()))
    }

    /// Parameters for `tier`.
    pub fn parameters_for(&self, tier: QualityTier) -> CompressionParameters {
        self.table[tier.index()]
    }

    /// The whole table, least aggressive first.
    pub fn table(&self) -> &[CompressionParameters; 4] {
        &self.table
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_is_valid() {
        let selector = StrategySelector::new(DEFAULT_TABLE).unwrap();
        assert_eq!(selector, StrategySelector::default());
    }

    #[test]
    fn test_monotonic_over_all_pairs() {
        let selector = StrategySelector::default();
        for (i, lower) in QualityTier::ALL.iter().enumerate() {
            for higher in &QualityTier::ALL[i..] {
                let a = selector.parameters_for(*lower);
                let b = selector.parameters_for(*higher);
                assert!(
                    b.is_at_least_as_aggressive_as(&a),
                    "{} is gentler than {}",
                    higher,
                    lower
                );
            }
        }
    }

    #[test]
    fn test_known_rows() {
        let selector = StrategySelector::default();
        let high = selector.parameters_for(QualityTier::High);
        assert!(!high.drop_annotations);
        assert!(!high.drop_images);

        let extreme = selector.parameters_for(QualityTier::Extreme);
        assert_eq!(extreme.page_subsampling_stride, 2);
        assert!(extreme.drop_images);
    }

    #[test]
    fn test_rejects_non_monotonic_table() {
        let mut table = DEFAULT_TABLE;
        table[QualityTier::Low.index()].reencode_quality = 90;
        let err = StrategySelector::new(table).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(ref m) if m.contains("low")));
    }

    #[test]
    fn test_rejects_early_subsampling() {
        let mut table = DEFAULT_TABLE;
        table[QualityTier::Low.index()].page_subsampling_stride = 2;
        assert!(StrategySelector::new(table).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let json = StrategySelector::default().to_json().unwrap();
        assert!(json.contains("\"extreme\""));
        let selector = StrategySelector::from_json(&json).unwrap();
        assert_eq!(selector, StrategySelector::default());
    }

    #[test]
    fn test_json_missing_tier() {
        let json = r#"{ "high": { "target_resolution_dpi": 150, "reencode_quality": 80,
            "scale_factor": 0.85, "drop_images": false, "drop_annotations": false,
            "page_subsampling_stride": 1 } }"#;
        let err = StrategySelector::from_json(json).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(ref m) if m.contains("medium")));
        assert!(StrategySelector::from_json("not json").is_err());
    }
}
