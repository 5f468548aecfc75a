//! CLI binary for pdfstitch.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `StitchConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdfstitch::{
    inspect, stitch_in_memory_to_file, stitch_to_file, Engine, PageSelection, ProgressCallback,
    StitchConfig, StitchProgressCallback, StitchStats,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a live bar plus one log line per merged page.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    /// Spinner until `on_stitch_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Stitching");
        self.bar.reset_eta();
    }
}

impl StitchProgressCallback for CliProgressCallback {
    fn on_stitch_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Stitching {total_pages} pages…"))
        ));
    }

    fn on_page_rendered(&self, page_num: usize, _total: usize, width: u32, height: u32) {
        self.bar
            .set_message(format!("page {page_num} rendered at {width}x{height}"));
    }

    fn on_page_merged(&self, page_num: usize, total: usize, width: u32, height: u32) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("composite {width}x{height}")),
        ));
        self.bar.inc(1);
    }

    fn on_stitch_complete(&self, total_pages: usize, _width: u32, _height: u32) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages stitched",
            green("✔"),
            bold(&total_pages.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Stitch every page into out/report.jpg
  pdfstitch report.pdf out/report

  # Lower resolution, wider output
  pdfstitch --dpi 150 --max-width 1200 report.pdf report

  # Selected pages only
  pdfstitch --pages 2-5 report.pdf excerpt

  # Fold in memory and encode once (more memory, fewer JPEG generations)
  pdfstitch --in-memory report.pdf report

  # Page sizes only, as JSON
  pdfstitch --inspect-only --json report.pdf -

OUTPUT:
  <OUTPUT_BASE>.jpg is created (or overwritten). While stitching, page
  files named <OUTPUT_BASE><n>.jpg appear briefly and are removed after
  each merge.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to an existing libpdfium. Otherwise the library
                    is looked up in the working directory, then on the
                    system library path.
  RUST_LOG          Log filter, overrides --verbose / --quiet
"#;

/// Render PDF pages and stitch them vertically into one JPEG.
#[derive(Parser, Debug)]
#[command(
    name = "pdfstitch",
    version,
    about = "Render PDF pages and stitch them vertically into one JPEG",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input PDF file.
    input: PathBuf,

    /// Output base path; the result is written to <OUTPUT_BASE>.jpg.
    output_base: PathBuf,

    /// Rendering DPI (1–2400).
    #[arg(long, env = "PDFSTITCH_DPI", default_value_t = 600,
          value_parser = clap::value_parser!(u32).range(1..=2400))]
    dpi: u32,

    /// Cap for the common width when both images are wider.
    #[arg(long, env = "PDFSTITCH_MAX_WIDTH", default_value_t = 600,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_width: u32,

    /// Pages rendered ahead of the fold.
    #[arg(short, long, env = "PDFSTITCH_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDFSTITCH_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFSTITCH_PASSWORD")]
    password: Option<String>,

    /// JPEG quality of page encodes (1–100).
    #[arg(long, default_value_t = 75,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    page_quality: u8,

    /// JPEG quality of merged composites (1–100).
    #[arg(long, default_value_t = 100,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    merge_quality: u8,

    /// Explicit path to the pdfium library.
    #[arg(long)]
    pdfium: Option<PathBuf>,

    /// Fold in memory and write the JPEG once instead of merging on disk.
    #[arg(long)]
    in_memory: bool,

    /// Print page count and page sizes only, no rendering.
    #[arg(long)]
    inspect_only: bool,

    /// Print results as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFSTITCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFSTITCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFSTITCH_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Engine ───────────────────────────────────────────────────────────
    let library = cli.pdfium.clone();
    let engine = tokio::task::block_in_place(|| match library {
        Some(path) => Engine::init_pdfium_at(path),
        None => Engine::init_pdfium(),
    })
    .context("Failed to initialise the PDF engine")?;

    let result = run(&cli, &engine, show_progress).await;

    tokio::task::block_in_place(|| engine.shutdown()).context("PDF engine shutdown failed")?;
    result
}

async fn run(cli: &Cli, engine: &Engine, show_progress: bool) -> Result<()> {
    let pdf = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let handle = engine.handle();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&handle, pdf, cli.password.as_deref())
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialise page info")?
            );
        } else {
            println!("File:   {}", cli.input.display());
            println!("Pages:  {}", info.page_count);
            for (i, size) in info.pages.iter().enumerate() {
                let px = size.pixels_at(cli.dpi);
                println!(
                    "  {:>4}  {:>7.1} x {:<7.1} pt  →  {} x {} px @ {} dpi",
                    i + 1,
                    size.width_pt,
                    size.height_pt,
                    px.width,
                    px.height,
                    cli.dpi
                );
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn StitchProgressCallback>)
    } else {
        None
    };
    let config = build_config(cli, progress_cb)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let stats = if cli.in_memory {
        stitch_in_memory_to_file(&handle, pdf, &cli.output_base, &config).await
    } else {
        stitch_to_file(&handle, pdf, &cli.output_base, &config).await
    }
    .context("Stitching failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    } else if !cli.quiet {
        print_summary(&stats);
    }

    Ok(())
}

fn print_summary(stats: &StitchStats) {
    let output = stats
        .output_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    eprintln!(
        "{}  {}/{} pages  {}x{}  {}ms  →  {}",
        green("✔"),
        stats.pages_stitched,
        stats.pages_in_document,
        stats.width,
        stats.height,
        stats.total_duration_ms,
        bold(&output),
    );
}

/// Map CLI args to `StitchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<StitchConfig> {
    let pages: PageSelection = cli.pages.parse()?;

    let mut builder = StitchConfig::builder()
        .dpi(cli.dpi)
        .max_width(cli.max_width)
        .concurrency(cli.concurrency)
        .page_quality(cli.page_quality)
        .merge_quality(cli.merge_quality)
        .pages(pages);

    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_flag_reaches_the_config() {
        let cli = Cli::try_parse_from(["pdfstitch", "--pages", "2,5-6", "in.pdf", "out"]).unwrap();
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.pages, PageSelection::Set(vec![2, 5, 6]));
    }

    #[test]
    fn bad_pages_flag_is_rejected() {
        let cli = Cli::try_parse_from(["pdfstitch", "--pages", "5-3", "in.pdf", "out"]).unwrap();
        let err = build_config(&cli, None).unwrap_err();
        assert!(err.to_string().contains("5-3"), "got: {err}");
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["pdfstitch", "in.pdf", "out/base"]).unwrap();
        assert_eq!(cli.dpi, 600);
        assert_eq!(cli.max_width, 600);
        assert_eq!(cli.concurrency, 4);
        assert!(!cli.in_memory);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.page_quality, 75);
        assert_eq!(config.merge_quality, 100);
    }

    #[test]
    fn cli_rejects_out_of_range_dpi() {
        assert!(Cli::try_parse_from(["pdfstitch", "--dpi", "0", "in.pdf", "out"]).is_err());
        assert!(Cli::try_parse_from(["pdfstitch", "--dpi", "2401", "in.pdf", "out"]).is_err());
    }
}
