//! Serializable summaries of finished operations.

use serde::{Deserialize, Serialize};

use crate::compress::{AttemptRecord, CompressionResult, CompressionStatus, QualityTier};
use crate::model::PageSize;

/// Qualitative verdict on a reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionGrade {
    /// At least 20 %
    Excellent,
    /// At least 10 %
    Good,
    Minimal,
}

impl CompressionGrade {
    /// Grade a reduction given in percent.
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 20.0 {
            CompressionGrade::Excellent
        } else if percent >= 10.0 {
            CompressionGrade::Good
        } else {
            CompressionGrade::Minimal
        }
    }

    /// Sentence for user-facing output.
    pub fn message(&self) -> &'static str {
        match self {
            CompressionGrade::Excellent => "Excellent compression achieved",
            CompressionGrade::Good => "Good compression achieved",
            CompressionGrade::Minimal => "Minimal compression, the file may already be optimized",
        }
    }
}

/// Outcome of a compression request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionReport {
    /// Download name
    pub filename: String,
    pub original_size: u64,
    pub compressed_size: u64,
    /// Rounded to two decimals
    pub reduction_percent: f64,
    pub tier_requested: QualityTier,
    pub tier_used: QualityTier,
    pub status: CompressionStatus,
    pub grade: CompressionGrade,
    pub page_count: u32,
    pub attempts: Vec<AttemptRecord>,
}

impl CompressionReport {
    /// Summarize a pipeline result.
    pub fn new(filename: impl Into<String>, result: &CompressionResult) -> Self {
        let percent = round2(result.reduction_percent());
        Self {
            filename: filename.into(),
            original_size: result.input_size,
            compressed_size: result.output_size,
            reduction_percent: percent,
            tier_requested: result.tier_requested,
            tier_used: result.tier_used,
            status: result.status,
            grade: CompressionGrade::from_percent(percent),
            page_count: result.page_count,
            attempts: result.attempts.clone(),
        }
    }
}

/// Outcome of a merge request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    pub filename: String,
    /// Inputs merged
    pub file_count: usize,
    /// Inputs skipped as invalid
    pub skipped: Vec<String>,
    pub page_count: u32,
    pub output_size: u64,
    pub resize: Option<PageSize>,
}

/// Outcome of a conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionReport {
    pub filename: String,
    pub source: String,
    pub output_size: u64,
    pub page_count: Option<u32>,
    pub converter: String,
}

/// Human-readable size, e.g. `1.50 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_thresholds() {
        assert_eq!(CompressionGrade::from_percent(35.0), CompressionGrade::Excellent);
        assert_eq!(CompressionGrade::from_percent(20.0), CompressionGrade::Excellent);
        assert_eq!(CompressionGrade::from_percent(19.99), CompressionGrade::Good);
        assert_eq!(CompressionGrade::from_percent(10.0), CompressionGrade::Good);
        assert_eq!(CompressionGrade::from_percent(0.0), CompressionGrade::Minimal);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(10 * 1024 * 1024), "10.00 MB");
    }

    #[test]
    fn test_report_serializes() {
        let result = CompressionResult {
            output: vec![0; 40],
            page_count: 3,
            input_size: 100,
            output_size: 40,
            tier_requested: QualityTier::Medium,
            tier_used: QualityTier::Low,
            reduction_ratio: 0.6,
            status: CompressionStatus::Accepted,
            attempts: Vec::new(),
        };
        let report = CompressionReport::new("compressed_a.pdf", &result);
        assert_eq!(report.reduction_percent, 60.0);
        assert_eq!(report.grade, CompressionGrade::Excellent);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tier_used"], "low");
        assert_eq!(json["status"], "accepted");
        assert_eq!(json["grade"], "excellent");
    }
}
