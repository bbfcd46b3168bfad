//! The tiered compression state machine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Document;
use crate::parser::PdfParser;
use crate::timeout::{run_with_timeout, Deadline};

use super::options::CompressOptions;
use super::oracle::{SizeOracle, SizePolicy, SizeReport};
use super::selector::StrategySelector;
use super::tier::{CompressionParameters, QualityTier};
use super::transformer::PageTransformer;

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStatus {
    /// An attempt met the minimum reduction.
    Accepted,
    /// Escalation budget or deadline spent; best effort returned.
    Exhausted,
    /// No attempt produced a smaller file; the input is returned as-is.
    Unchanged,
}

impl std::fmt::Display for CompressionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CompressionStatus::Accepted => "accepted",
            CompressionStatus::Exhausted => "exhausted",
            CompressionStatus::Unchanged => "unchanged",
        })
    }
}

/// One tier attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub tier: QualityTier,
    pub output_size: Option<u64>,
    pub reduction_ratio: Option<f64>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Outcome of [`CompressionPipeline::run`].
#[derive(Debug, Clone)]
pub struct CompressionResult {
    /// Encoded output document
    pub output: Vec<u8>,
    /// Pages in the output
    pub page_count: u32,
    pub input_size: u64,
    pub output_size: u64,
    pub tier_requested: QualityTier,
    /// Tier whose attempt produced `output`; the requested tier when the
    /// input is returned as it was
    pub tier_used: QualityTier,
    /// `1 - output_size / input_size`, never negative
    pub reduction_ratio: f64,
    pub status: CompressionStatus,
    /// Every attempt, in order
    pub attempts: Vec<AttemptRecord>,
}

impl CompressionResult {
    /// The input returned untouched.
    fn original(
        input: &[u8],
        page_count: u32,
        requested: QualityTier,
        status: CompressionStatus,
        attempts: Vec<AttemptRecord>,
    ) -> Self {
        Self {
            output: input.to_vec(),
            page_count,
            input_size: input.len() as u64,
            output_size: input.len() as u64,
            tier_requested: requested,
            tier_used: requested,
            reduction_ratio: 0.0,
            status,
            attempts,
        }
    }

    /// Reduction as a percentage.
    pub fn reduction_percent(&self) -> f64 {
        self.reduction_ratio * 100.0
    }

    /// Sizes as a [`SizeReport`].
    pub fn size_report(&self) -> SizeReport {
        SizeReport {
            input_size: self.input_size,
            output_size: self.output_size,
            ratio: self.reduction_ratio,
        }
    }

    /// Tiers attempted, in order.
    pub fn tiers_attempted(&self) -> Vec<QualityTier> {
        self.attempts.iter().map(|a| a.tier).collect()
    }

    /// Whether the tier had to be raised.
    pub fn escalated(&self) -> bool {
        self.tier_used != self.tier_requested
    }
}

/// A successful attempt.
struct Candidate {
    bytes: Vec<u8>,
    report: SizeReport,
    page_count: u32,
    tier: QualityTier,
}

/// Applies tiers to a document until the size policy is met.
///
/// States: the requested tier is *attempted* (every page transformed with
/// that tier's parameters, the result encoded), the attempt is *evaluated*
/// against the input size, then the run is either *accepted*, *escalated*
/// to the tier [`SizePolicy::next_tier`] names, or *exhausted* when the
/// budget or deadline runs out. Attempts are sequential and each starts
/// from the decoded input, not from the previous attempt.
#[derive(Debug, Clone)]
pub struct CompressionPipeline {
    selector: StrategySelector,
    policy: SizePolicy,
    transformer: PageTransformer,
    oracle: SizeOracle,
    deadline: Duration,
    parallel: bool,
}

impl CompressionPipeline {
    /// Build a pipeline, validating the policy.
    pub fn new(options: &CompressOptions) -> Result<Self> {
        options.policy.validate()?;

        let mut transformer = PageTransformer::new();
        if let Some(rasterizer) = &options.rasterizer {
            transformer = transformer.with_rasterizer(Arc::clone(rasterizer));
        }

        Ok(Self {
            selector: options.selector.clone(),
            policy: options.policy,
            transformer,
            oracle: SizeOracle::new(),
            deadline: options.deadline,
            parallel: options.parallel,
        })
    }

    /// Acceptance policy in use.
    pub fn policy(&self) -> &SizePolicy {
        &self.policy
    }

    /// Tier table in use.
    pub fn selector(&self) -> &StrategySelector {
        &self.selector
    }

    /// Compress PDF bytes starting at `requested`.
    ///
    /// The output is never larger than `input`. Decode failures are fatal;
    /// failed attempts are recorded and escalated past, and only when no
    /// attempt succeeds does the run fail with [`Error::CompressionFailed`].
    /// If the deadline runs out before any attempt finishes, the input is
    /// returned as an `Exhausted` result.
    pub fn run(&self, input: &[u8], requested: QualityTier) -> Result<CompressionResult> {
        let deadline = Deadline::after(self.deadline);
        let input_size = input.len() as u64;

        let data = input.to_vec();
        let doc = run_with_timeout("decode", deadline.remaining().unwrap_or_default(), move || {
            PdfParser::from_bytes(&data)?.parse()
        })?;
        let doc = Arc::new(doc);
        let input_pages = doc.page_count();

        log::info!(
            "Compressing {} page(s), {} bytes, tier {}",
            input_pages,
            input_size,
            requested
        );

        let mut attempts = Vec::new();
        let mut latest: Option<Candidate> = None;
        let mut tier = requested;
        let mut steps = 0;

        let status = loop {
            let remaining = match deadline.remaining() {
                Some(remaining) => remaining,
                None => {
                    log::warn!("Deadline of {:?} reached before tier {}", self.deadline, tier);
                    break CompressionStatus::Exhausted;
                }
            };

            let started = Instant::now();
            log::debug!("Attempting tier {}: {:?}", tier, self.selector.parameters_for(tier));

            match self.attempt(Arc::clone(&doc), tier, input_size, remaining) {
                Ok(candidate) => {
                    let report = candidate.report;
                    log::debug!(
                        "Tier {}: {} -> {} bytes ({:.1}%)",
                        tier,
                        report.input_size,
                        report.output_size,
                        report.reduction_percent()
                    );
                    attempts.push(AttemptRecord {
                        tier,
                        output_size: Some(report.output_size),
                        reduction_ratio: Some(report.ratio),
                        error: None,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                    latest = Some(candidate);
                    if self.policy.accepts(report.ratio) {
                        break CompressionStatus::Accepted;
                    }
                }
                Err(e) => {
                    log::warn!("Tier {} failed: {}", tier, e);
                    attempts.push(AttemptRecord {
                        tier,
                        output_size: None,
                        reduction_ratio: None,
                        error: Some(e.to_string()),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                }
            }

            match self.policy.next_tier(tier, steps) {
                Some(next) => {
                    log::warn!("Escalating compression tier {} -> {}", tier, next);
                    tier = next;
                    steps += 1;
                }
                None => break CompressionStatus::Exhausted,
            }
        };

        let candidate = match latest {
            Some(candidate) => candidate,
            None => {
                if deadline.is_expired() {
                    log::warn!(
                        "Deadline of {:?} reached with no finished attempt, returning the input",
                        self.deadline
                    );
                    return Ok(CompressionResult::original(
                        input,
                        input_pages,
                        requested,
                        CompressionStatus::Exhausted,
                        attempts,
                    ));
                }
                return Err(Error::CompressionFailed {
                    attempts: attempts
                        .iter()
                        .map(|a| format!("{}: {}", a.tier, a.error.as_deref().unwrap_or("no result")))
                        .collect(),
                });
            }
        };

        if candidate.report.output_size >= input_size {
            log::info!(
                "No attempt beat the input ({} >= {} bytes), returning it unchanged",
                candidate.report.output_size,
                input_size
            );
            return Ok(CompressionResult::original(
                input,
                input_pages,
                requested,
                CompressionStatus::Unchanged,
                attempts,
            ));
        }

        log::info!(
            "Compression {}: {} -> {} bytes ({:.1}%) at tier {}",
            status,
            input_size,
            candidate.report.output_size,
            candidate.report.reduction_percent(),
            candidate.tier
        );

        Ok(CompressionResult {
            output: candidate.bytes,
            page_count: candidate.page_count,
            input_size,
            output_size: candidate.report.output_size,
            tier_requested: requested,
            tier_used: candidate.tier,
            reduction_ratio: candidate.report.ratio,
            status,
            attempts,
        })
    }

    /// Transform and encode one tier within `limit`.
    fn attempt(
        &self,
        doc: Arc<Document>,
        tier: QualityTier,
        input_size: u64,
        limit: Duration,
    ) -> Result<Candidate> {
        let params: CompressionParameters = self.selector.parameters_for(tier);
        let transformer = self.transformer.clone();
        let oracle = self.oracle.clone();
        let parallel = self.parallel;
        let operation = format!("compression at tier {}", tier);

        let (bytes, report, page_count) = run_with_timeout(&operation, limit, move || {
            let transformed = transformer.transform_document(&doc, &params, parallel);
            let page_count = transformed.page_count();
            let (bytes, report) = oracle.evaluate_against(input_size, &transformed)?;
            Ok((bytes, report, page_count))
        })?;

        Ok(Candidate {
            bytes,
            report,
            page_count,
            tier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object, Stream};

    /// Uncompressed PDF whose pages repeat a long drawing program and carry
    /// a link annotation, so every tier has something to remove.
    fn bulky_pdf(pages: usize) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content = "0 0 m 300 300 l S\n".repeat(400);
        let mut kids = Vec::new();
        for _ in 0..pages {
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.clone().into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0_i64.into(), 0_i64.into(), 612_i64.into(), 792_i64.into()],
                "Contents" => content_id,
                "Annots" => vec![Object::Dictionary(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Link",
                    "Rect" => vec![0_i64.into(), 0_i64.into(), 10_i64.into(), 10_i64.into()],
                })],
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn pipeline(policy: SizePolicy) -> CompressionPipeline {
        let options = CompressOptions::new().with_policy(policy).sequential();
        CompressionPipeline::new(&options).unwrap()
    }

    #[test]
    fn test_accepts_first_tier_with_enough_reduction() {
        let input = bulky_pdf(2);
        let result = pipeline(SizePolicy::default())
            .run(&input, QualityTier::High)
            .unwrap();

        assert_eq!(result.status, CompressionStatus::Accepted);
        assert_eq!(result.tier_used, QualityTier::High);
        assert_eq!(result.tiers_attempted(), vec![QualityTier::High]);
        assert!(result.output_size < result.input_size);
        assert_eq!(result.output.len() as u64, result.output_size);
        assert_eq!(result.page_count, 2);
        assert!(!result.escalated());
    }

    #[test]
    fn test_unreachable_threshold_escalates_to_extreme() {
        let input = bulky_pdf(4);
        let strict = SizePolicy {
            minimum_reduction_ratio: 0.999,
            max_escalation_steps: 2,
        };
        let result = pipeline(strict).run(&input, QualityTier::High).unwrap();

        assert_eq!(result.status, CompressionStatus::Exhausted);
        assert_eq!(
            result.tiers_attempted(),
            vec![QualityTier::High, QualityTier::Medium, QualityTier::Extreme]
        );
        assert_eq!(result.tier_used, QualityTier::Extreme);
        // stride 2 keeps pages 1 and 3
        assert_eq!(result.page_count, 2);
        assert!(result.output_size <= result.input_size);
    }

    #[test]
    fn test_no_escalation_budget() {
        let input = bulky_pdf(1);
        let policy = SizePolicy {
            minimum_reduction_ratio: 0.999,
            max_escalation_steps: 0,
        };
        let result = pipeline(policy).run(&input, QualityTier::Low).unwrap();
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.status, CompressionStatus::Exhausted);
    }

    #[test]
    fn test_output_never_larger_than_input() {
        // Already compact: one empty page with compressed streams.
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0_i64.into(), 0_i64.into(), 10_i64.into(), 10_i64.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1_i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc.compress();
        let mut input = Vec::new();
        doc.save_to(&mut input).unwrap();

        for tier in QualityTier::ALL {
            let result = pipeline(SizePolicy::default()).run(&input, tier).unwrap();
            assert!(result.output_size <= result.input_size);
            assert!(result.reduction_ratio >= 0.0);
            if result.status == CompressionStatus::Unchanged {
                assert_eq!(result.output, input);
                assert_eq!(result.reduction_ratio, 0.0);
                assert_eq!(result.tier_used, tier);
                assert!(!result.escalated());
            }
        }
    }

    #[test]
    fn test_corrupt_input_is_fatal() {
        let err = pipeline(SizePolicy::default())
            .run(b"%PDF-1.4\nthis is not a pdf", QualityTier::Medium)
            .unwrap_err();
        assert!(matches!(err, Error::FatalDecode(_)));
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let options = CompressOptions::new().with_policy(SizePolicy {
            minimum_reduction_ratio: -0.5,
            max_escalation_steps: 1,
        });
        assert!(matches!(
            CompressionPipeline::new(&options),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_decode_past_deadline_is_timeout() {
        let input = bulky_pdf(1);
        let options = CompressOptions::new().with_deadline(Duration::ZERO);
        let err = CompressionPipeline::new(&options)
            .unwrap()
            .run(&input, QualityTier::Medium)
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }
}
