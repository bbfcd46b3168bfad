//! Quality tiers and the parameters they map to.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Named compression aggressiveness, ordered from least to most aggressive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    High,
    #[default]
    Medium,
    Low,
    Extreme,
}

impl QualityTier {
    /// Every tier, least aggressive first.
    pub const ALL: [QualityTier; 4] = [
        QualityTier::High,
        QualityTier::Medium,
        QualityTier::Low,
        QualityTier::Extreme,
    ];

    /// Lowercase token used at the input boundary.
    pub fn name(&self) -> &'static str {
        match self {
            QualityTier::High => "high",
            QualityTier::Medium => "medium",
            QualityTier::Low => "low",
            QualityTier::Extreme => "extreme",
        }
    }

    /// Lenient token parsing: case-insensitive, unknown tokens mean `medium`.
    pub fn from_token(token: &str) -> Self {
        token.parse().unwrap_or_else(|_| {
            log::debug!("Unrecognized quality tier {:?}, using medium", token);
            QualityTier::Medium
        })
    }

    /// Position in [`QualityTier::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The next more aggressive tier, if any.
    pub fn next(&self) -> Option<QualityTier> {
        QualityTier::ALL.get(self.index() + 1).copied()
    }

    /// The most aggressive tier.
    pub fn most_aggressive() -> QualityTier {
        QualityTier::Extreme
    }

    /// Whether no tier is more aggressive.
    pub fn is_most_aggressive(&self) -> bool {
        *self == QualityTier::most_aggressive()
    }
}

impl FromStr for QualityTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        QualityTier::ALL
            .iter()
            .copied()
            .find(|tier| tier.name().eq_ignore_ascii_case(token))
            .ok_or_else(|| Error::InvalidInput(format!("Unsupported quality tier: {}", token)))
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Concrete transformation settings for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionParameters {
    /// Target raster resolution; images are capped at `dpi * 8` pixels per side
    pub target_resolution_dpi: u32,

    /// JPEG quality (0-100)
    pub reencode_quality: u8,

    /// Uniform page scale in (0, 1]
    pub scale_factor: f32,

    /// Remove every image XObject
    pub drop_images: bool,

    /// Remove annotations and optional page attachments
    pub drop_annotations: bool,

    /// Keep every Nth page (1 keeps all)
    pub page_subsampling_stride: u32,
}

impl CompressionParameters {
    /// Check per-field ranges.
    pub fn validate(&self) -> Result<()> {
        if self.target_resolution_dpi == 0 {
            return Err(Error::InvalidConfig(
                "target_resolution_dpi must be positive".to_string(),
            ));
        }
        if self.reencode_quality > 100 {
            return Err(Error::InvalidConfig(format!(
                "reencode_quality {} is outside 0-100",
                self.reencode_quality
            )));
        }
        if !(self.scale_factor > 0.0 && self.scale_factor <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "scale_factor {} is outside (0, 1]",
                self.scale_factor
            )));
        }
        if self.page_subsampling_stride == 0 {
            return Err(Error::InvalidConfig(
                "page_subsampling_stride must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `self` is pointwise at least as aggressive as `other`.
    pub fn is_at_least_as_aggressive_as(&self, other: &CompressionParameters) -> bool {
        self.target_resolution_dpi <= other.target_resolution_dpi
            && self.reencode_quality <= other.reencode_quality
            && self.scale_factor <= other.scale_factor
            && (self.drop_images || !other.drop_images)
            && (self.drop_annotations || !other.drop_annotations)
            && self.page_subsampling_stride >= other.page_subsampling_stride
    }

    /// Largest image side, in pixels, kept by re-encoding.
    pub fn max_image_dimension(&self) -> u32 {
        self.target_resolution_dpi.saturating_mul(8)
    }

    /// Resolution used when a page is rendered to a single image.
    pub fn raster_dpi(&self) -> u32 {
        ((self.target_resolution_dpi as f32 * self.scale_factor).round() as u32).max(1)
    }

    /// JPEG quality accepted by the encoder.
    pub fn jpeg_quality(&self) -> u8 {
        self.reencode_quality.clamp(1, 100)
    }

    /// Stable tag for images produced under these parameters.
    pub(crate) fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.target_resolution_dpi.hash(&mut hasher);
        self.reencode_quality.hash(&mut hasher);
        self.scale_factor.to_bits().hash(&mut hasher);
        hasher.finish()
    }
}
