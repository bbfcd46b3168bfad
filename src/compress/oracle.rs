//! Size measurement and the acceptance policy.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Document;
use crate::writer::PdfWriter;

use super::tier::QualityTier;

/// When a result is good enough, and how far the pipeline may escalate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizePolicy {
    /// Smallest `1 - output/input` accepted without escalating
    pub minimum_reduction_ratio: f64,

    /// Escalations allowed after the first attempt
    pub max_escalation_steps: u32,
}

impl SizePolicy {
    /// Check ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.minimum_reduction_ratio) {
            return Err(Error::InvalidConfig(format!(
                "minimum_reduction_ratio {} is outside [0, 1)",
                self.minimum_reduction_ratio
            )));
        }
        let max_steps = (QualityTier::ALL.len() - 1) as u32;
        if self.max_escalation_steps > max_steps {
            return Err(Error::InvalidConfig(format!(
                "max_escalation_steps {} exceeds {}",
                self.max_escalation_steps, max_steps
            )));
        }
        Ok(())
    }

    /// Whether `ratio` meets the minimum.
    pub fn accepts(&self, ratio: f64) -> bool {
        ratio >= self.minimum_reduction_ratio
    }

    /// Tier to try after `steps_taken` escalations ended at `current`.
    ///
    /// Escalations move one tier at a time, except the last one allowed,
    /// which goes straight to the most aggressive tier. `None` once the
    /// budget is spent or nothing more aggressive exists.
    pub fn next_tier(&self, current: QualityTier, steps_taken: u32) -> Option<QualityTier> {
        if steps_taken >= self.max_escalation_steps || current.is_most_aggressive() {
            return None;
        }
        if steps_taken + 1 == self.max_escalation_steps {
            Some(QualityTier::most_aggressive())
        } else {
            current.next()
        }
    }

    /// Tiers an invocation starting at `requested` may attempt, assuming
    /// every attempt falls short.
    pub fn schedule(&self, requested: QualityTier) -> Vec<QualityTier> {
        let mut tiers = vec![requested];
        let mut current = requested;
        let mut steps = 0;
        while let Some(next) = self.next_tier(current, steps) {
            tiers.push(next);
            current = next;
            steps += 1;
        }
        tiers
    }
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self {
            minimum_reduction_ratio: 0.15,
            max_escalation_steps: 2,
        }
    }
}

/// Serialized sizes of an input and an output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeReport {
    pub input_size: u64,
    pub output_size: u64,
    pub ratio: f64,
}

impl SizeReport {
    /// Build a report from two byte counts.
    pub fn new(input_size: u64, output_size: u64) -> Self {
        Self {
            input_size,
            output_size,
            ratio: reduction_ratio(input_size, output_size),
        }
    }

    /// Reduction as a percentage.
    pub fn reduction_percent(&self) -> f64 {
        self.ratio * 100.0
    }

    /// Whether the output is larger than the input.
    pub fn grew(&self) -> bool {
        self.output_size > self.input_size
    }
}

/// `1 - output/input`; zero for an empty input.
pub fn reduction_ratio(input_size: u64, output_size: u64) -> f64 {
    if input_size == 0 {
        return 0.0;
    }
    1.0 - output_size as f64 / input_size as f64
}

/// Measures documents by their encoded size.
#[derive(Debug, Clone, Default)]
pub struct SizeOracle {
    writer: PdfWriter,
}

impl SizeOracle {
    /// Oracle using the default writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Oracle using a specific writer.
    pub fn with_writer(writer: PdfWriter) -> Self {
        Self { writer }
    }

    /// Encode `doc`; its length is the measured size.
    pub fn encode(&self, doc: &Document) -> Result<Vec<u8>> {
        self.writer.to_bytes(doc)
    }

    /// Compare two documents by encoded size.
    pub fn evaluate(&self, input: &Document, output: &Document) -> Result<SizeReport> {
        let input_size = self.encode(input)?.len() as u64;
        let output_size = self.encode(output)?.len() as u64;
        Ok(SizeReport::new(input_size, output_size))
    }

    /// Encode `output` and compare it with an input of known size.
    pub fn evaluate_against(&self, input_size: u64, output: &Document) -> Result<(Vec<u8>, SizeReport)> {
        let bytes = self.encode(output)?;
        let report = SizeReport::new(input_size, bytes.len() as u64);
        Ok((bytes, report))
    }
}
