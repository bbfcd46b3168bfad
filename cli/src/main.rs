//! pdfeditz CLI - compress, merge and convert PDF documents

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use pdfeditz::report::format_size;
use pdfeditz::staging::{compressed_name, read_bounded, write_atomic};
use pdfeditz::{
    parse_bytes_with_options, CompressionGrade, CompressionStatus, PageSize, ParseOptions,
    PdfEditz, PopplerRasterizer, QualityTier, SizePolicy, StrategySelector,
};

#[derive(Parser)]
#[command(name = "pdfeditz")]
#[command(version)]
#[command(about = "Compress, merge and convert PDF documents", long_about = None)]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every command.
#[derive(Args)]
struct ServiceArgs {
    /// Maximum input size in MB
    #[arg(long, global = true, env = "PDFEDITZ_MAX_UPLOAD_MB", default_value = "50")]
    max_size_mb: u64,

    /// Directory for per-run scratch space
    #[arg(long, global = true, env = "PDFEDITZ_SCRATCH_DIR", value_name = "DIR")]
    scratch_dir: Option<PathBuf>,

    /// Limit for each file read or write, in seconds
    #[arg(long, global = true, env = "PDFEDITZ_IO_TIMEOUT", default_value = "30")]
    io_timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a PDF at a quality tier
    Compress {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (default: compressed_<name>.pdf next to the input)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Quality tier: high, medium, low or extreme
        #[arg(short, long, env = "PDFEDITZ_QUALITY", default_value = "medium")]
        quality: String,

        /// Overall time budget in seconds
        #[arg(long, env = "PDFEDITZ_DEADLINE", default_value = "120")]
        deadline: u64,

        /// Minimum reduction (0-1) accepted without escalating
        #[arg(long, env = "PDFEDITZ_MIN_REDUCTION")]
        min_reduction: Option<f64>,

        /// Escalation steps allowed after the first attempt
        #[arg(long, env = "PDFEDITZ_MAX_ESCALATIONS")]
        max_escalations: Option<u32>,

        /// JSON file with a custom tier table
        #[arg(long, env = "PDFEDITZ_TIER_TABLE", value_name = "FILE")]
        tier_table: Option<PathBuf>,

        /// Rasterize image-heavy pages with pdftoppm
        #[arg(long, env = "PDFEDITZ_RASTERIZE")]
        rasterize: bool,

        /// pdftoppm binary
        #[arg(long, env = "PDFEDITZ_PDFTOPPM", default_value = "pdftoppm")]
        pdftoppm: PathBuf,

        /// Transform pages on one thread
        #[arg(long)]
        sequential: bool,
    },

    /// Merge PDFs in the given order
    Merge {
        /// Input PDF files (at least two)
        #[arg(value_name = "FILES", num_args = 2.., required = true)]
        inputs: Vec<PathBuf>,

        /// Output file
        #[arg(short, long, value_name = "FILE", default_value = pdfeditz::MERGED_NAME)]
        output: PathBuf,

        /// Fit every page to A4, A3, A5, Letter, Legal or Tabloid
        #[arg(long, env = "PDFEDITZ_RESIZE", default_value = "none")]
        resize: String,
    },

    /// Convert a .docx file to PDF with LibreOffice
    Convert {
        /// Input .docx file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (default: <stem>.pdf next to the input)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// LibreOffice binary
        #[arg(long, env = "PDFEDITZ_SOFFICE", default_value = "soffice")]
        soffice: PathBuf,

        /// Conversion time limit in seconds
        #[arg(long, env = "PDFEDITZ_CONVERT_TIMEOUT", default_value = "120")]
        timeout: u64,
    },

    /// Show document information
    Info {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Show the tier parameter table
    Tiers {
        /// JSON file with a custom tier table
        #[arg(long, env = "PDFEDITZ_TIER_TABLE", value_name = "FILE")]
        tier_table: Option<PathBuf>,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let service = build_service(&cli.service);
    let json = cli.json;

    let result = match cli.command {
        Commands::Compress {
            input,
            output,
            quality,
            deadline,
            min_reduction,
            max_escalations,
            tier_table,
            rasterize,
            pdftoppm,
            sequential,
        } => {
            let mut policy = SizePolicy::default();
            if let Some(ratio) = min_reduction {
                policy.minimum_reduction_ratio = ratio;
            }
            if let Some(steps) = max_escalations {
                policy.max_escalation_steps = steps;
            }
            let mut service = service
                .with_tier(parse_tier(&quality))
                .with_deadline(Duration::from_secs(deadline))
                .with_policy(policy);
            if rasterize {
                service = service.with_rasterizer(Arc::new(
                    PopplerRasterizer::new().with_binary(pdftoppm),
                ));
            }
            if sequential {
                service = service.sequential();
            }
            load_selector(tier_table.as_deref())
                .map(|selector| service.with_selector(selector))
                .and_then(|service| cmd_compress(&service, &input, output.as_deref(), json))
        }
        Commands::Merge {
            inputs,
            output,
            resize,
        } => cmd_merge(&service, &inputs, &output, &resize, json),
        Commands::Convert {
            input,
            output,
            soffice,
            timeout,
        } => {
            let service = service
                .with_office_binary(soffice)
                .with_convert_timeout(Duration::from_secs(timeout));
            cmd_convert(&service, &input, output.as_deref(), json)
        }
        Commands::Info { input } => cmd_info(&service, &input),
        Commands::Tiers { tier_table } => cmd_tiers(tier_table.as_deref(), json),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        let client_error = e
            .downcast_ref::<pdfeditz::Error>()
            .map(|e| e.is_client_error())
            .unwrap_or(false);
        std::process::exit(if client_error { 2 } else { 1 });
    }
}

fn build_service(args: &ServiceArgs) -> PdfEditz {
    let mut service = PdfEditz::new()
        .with_max_upload_size(args.max_size_mb.saturating_mul(1024 * 1024))
        .with_io_timeout(Duration::from_secs(args.io_timeout));
    if let Some(dir) = &args.scratch_dir {
        service = service.with_scratch_root(dir);
    }
    service
}

fn parse_tier(token: &str) -> QualityTier {
    match token.parse() {
        Ok(tier) => tier,
        Err(_) => {
            log::warn!("Unknown quality tier '{}', using medium", token);
            QualityTier::from_token(token)
        }
    }
}

fn load_selector(path: Option<&Path>) -> Result<StrategySelector, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(StrategySelector::from_json(&std::fs::read_to_string(path)?)?),
        None => Ok(StrategySelector::default()),
    }
}

fn spinner(message: &str) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    Ok(pb)
}

fn sibling(input: &Path, name: &str) -> PathBuf {
    input
        .parent()
        .map(|dir| dir.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

fn cmd_compress(service: &PdfEditz, input: &Path, output: Option<&Path>, json: bool) -> CliResult {
    let filename = input.file_name().unwrap_or_default().to_string_lossy();
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| sibling(input, &compressed_name(&filename)));

    let pb = spinner(&format!(
        "Compressing {} at {}...",
        filename,
        service.compress_options().tier
    ))?;
    let report = service.compress_file(input, &output);
    pb.finish_and_clear();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Compression complete".green().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "Original".bold(), format_size(report.original_size));
    println!("{}: {}", "Compressed".bold(), format_size(report.compressed_size));
    println!("{}: {:.2}%", "Reduction".bold(), report.reduction_percent);
    println!(
        "{}: {} (requested {})",
        "Tier".bold(),
        report.tier_used,
        report.tier_requested
    );
    println!("{}: {}", "Pages".bold(), report.page_count);

    let verdict = match report.grade {
        CompressionGrade::Excellent => report.grade.message().green(),
        CompressionGrade::Good => report.grade.message().cyan(),
        CompressionGrade::Minimal => report.grade.message().yellow(),
    };
    println!("{}", verdict);
    match report.status {
        CompressionStatus::Exhausted => println!(
            "{}",
            "Target reduction not reached; best result kept".yellow()
        ),
        CompressionStatus::Unchanged => {
            println!("{}", "No smaller version found; original kept".yellow())
        }
        CompressionStatus::Accepted => {}
    }
    println!("{} {}", "Saved to".green(), output.display());

    Ok(())
}

fn cmd_merge(service: &PdfEditz, inputs: &[PathBuf], output: &Path, resize: &str, json: bool) -> CliResult {
    let resize = PageSize::parse_option(resize)?;

    let pb = ProgressBar::new(inputs.len() as u64 + 2);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {msg}")?
            .progress_chars("#>-"),
    );

    let mut files = Vec::with_capacity(inputs.len());
    for input in inputs {
        let name = input.file_name().unwrap_or_default().to_string_lossy().into_owned();
        pb.set_message(format!("Reading {}...", name));
        let data = read_bounded(input, service.max_upload_size(), service.io_timeout())?;
        files.push((name, data));
        pb.inc(1);
    }

    pb.set_message("Merging...");
    let uploads: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(name, data)| (name.as_str(), data.as_slice()))
        .collect();
    let done = service.merge_uploads(&uploads, resize)?;
    pb.inc(1);

    pb.set_message("Writing...");
    write_atomic(output, &done.output, service.io_timeout())?;
    pb.inc(1);
    pb.finish_with_message("Done!");

    let report = done.report;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n{}", "Merge complete".green().bold());
    println!("{}: {}", "Files".bold(), report.file_count);
    for skipped in &report.skipped {
        println!("  {} {} (not a valid PDF)", "skipped".yellow(), skipped);
    }
    println!("{}: {}", "Pages".bold(), report.page_count);
    if let Some(size) = report.resize {
        println!("{}: {}", "Page size".bold(), size);
    }
    println!("{}: {}", "Size".bold(), format_size(report.output_size));
    println!("{} {}", "Saved to".green(), output.display());

    Ok(())
}

fn cmd_convert(service: &PdfEditz, input: &Path, output: Option<&Path>, json: bool) -> CliResult {
    let filename = input.file_name().unwrap_or_default().to_string_lossy();
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| sibling(input, &pdfeditz::convert::pdf_name_for(&filename)));

    let pb = spinner(&format!("Converting {}...", filename))?;
    let report = service.convert_file(input, &output);
    pb.finish_and_clear();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Conversion complete".green().bold());
    if let Some(pages) = report.page_count {
        println!("{}: {}", "Pages".bold(), pages);
    }
    println!("{}: {}", "Size".bold(), format_size(report.output_size));
    println!("{} {}", "Saved to".green(), output.display());

    Ok(())
}

fn cmd_info(service: &PdfEditz, input: &Path) -> CliResult {
    let data = read_bounded(input, service.max_upload_size(), service.io_timeout())?;
    // Lenient: show what can be read even when some pages are damaged
    let doc = parse_bytes_with_options(&data, ParseOptions::new().lenient())?;

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {}", "Size".bold(), format_size(data.len() as u64));
    println!("{}: PDF {}", "Format".bold(), doc.version);
    println!("{}: {}", "Pages".bold(), doc.page_count());

    let meta = &doc.metadata;
    for (label, value) in meta.entries() {
        println!("{}: {}", label.bold(), value);
    }
    if let Some(created) = meta.created {
        println!("{}: {}", "Created".bold(), created);
    }
    if let Some(modified) = meta.modified {
        println!("{}: {}", "Modified".bold(), modified);
    }

    println!();
    println!("{}", "Content Statistics".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    let annotations: usize = doc.pages.iter().map(|p| p.annotations.len()).sum();
    let image_bytes: usize = doc.pages.iter().map(|p| p.image_bytes()).sum();
    println!("{}: {}", "Images".bold(), doc.image_count());
    println!("{}: {}", "Image data".bold(), format_size(image_bytes as u64));
    println!("{}: {}", "Annotations".bold(), annotations);
    if let Some(first) = doc.pages.first() {
        let (w, h) = first.dimensions();
        println!("{}: {} x {} pt", "First page".bold(), w, h);
    }

    Ok(())
}

fn cmd_tiers(tier_table: Option<&Path>, json: bool) -> CliResult {
    let selector = load_selector(tier_table)?;
    if json {
        println!("{}", selector.to_json()?);
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<8} {:>5} {:>8} {:>6} {:>7} {:>7} {:>7}",
            "tier", "dpi", "quality", "scale", "images", "annots", "stride"
        )
        .cyan()
        .bold()
    );
    for tier in QualityTier::ALL {
        let p = selector.parameters_for(tier);
        println!(
            "{:<8} {:>5} {:>8} {:>6.2} {:>7} {:>7} {:>7}",
            tier.name(),
            p.target_resolution_dpi,
            p.reencode_quality,
            p.scale_factor,
            if p.drop_images { "drop" } else { "keep" },
            if p.drop_annotations { "drop" } else { "keep" },
            p.page_subsampling_stride
        );
    }

    let policy = SizePolicy::default();
    println!();
    println!(
        "{}: {:.0}% minimum reduction, up to {} escalation(s)",
        "Policy".bold(),
        policy.minimum_reduction_ratio * 100.0,
        policy.max_escalation_steps
    );

    Ok(())
}
