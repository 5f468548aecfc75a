//! Configuration types for rendering and stitching.
//!
//! All stitching behaviour is controlled through [`StitchConfig`], built via
//! its [`StitchConfigBuilder`]. The config is cheap to clone and is shared
//! by reference with every page future of a run.

use crate::error::StitchError;
use crate::pipeline::composite::{SizePolicy, DEFAULT_MAX_WIDTH};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Highest accepted rendering DPI. A Letter page at 2400 DPI is already
/// a 20 400 × 26 400 px bitmap.
pub const MAX_DPI: u32 = 2400;

/// Configuration for a render-and-stitch run.
///
/// # Example
/// ```rust
/// use pdfstitch::StitchConfig;
///
/// let config = StitchConfig::builder()
///     .dpi(300)
///     .max_width(800)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 300);
/// ```
#[derive(Clone)]
pub struct StitchConfig {
    /// Rendering DPI. Page pixels = points × dpi / 72. Default: 600.
    pub dpi: u32,

    /// Width cap used by the sizing policy when both images are wider.
    /// Default: 600.
    pub max_width: u32,

    /// Number of pages rendered ahead of the fold. Default: 4.
    ///
    /// Engine calls are serialised regardless; this only bounds how many
    /// converted pages may wait in memory for the sequential fold.
    pub concurrency: usize,

    /// JPEG quality for the first page and scratch page files. Default: 75.
    pub page_quality: u8,

    /// JPEG quality for every merged composite. Default: 100.
    pub merge_quality: u8,

    /// User password for encrypted documents.
    pub password: Option<String>,

    /// Which pages to stitch. Default: all.
    pub pages: PageSelection,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Optional cooperative cancellation flag.
    pub cancel: Option<CancelToken>,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            dpi: 600,
            max_width: DEFAULT_MAX_WIDTH,
            concurrency: 4,
            page_quality: 75,
            merge_quality: 100,
            password: None,
            pages: PageSelection::default(),
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for StitchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StitchConfig")
            .field("dpi", &self.dpi)
            .field("max_width", &self.max_width)
            .field("concurrency", &self.concurrency)
            .field("page_quality", &self.page_quality)
            .field("merge_quality", &self.merge_quality)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pages", &self.pages)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn StitchProgressCallback>"),
            )
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl StitchConfig {
    /// Create a new builder for `StitchConfig`.
    pub fn builder() -> StitchConfigBuilder {
        StitchConfigBuilder {
            config: Self::default(),
        }
    }

    /// The sizing policy implied by `max_width`.
    pub fn size_policy(&self) -> SizePolicy {
        SizePolicy::new(self.max_width)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Builder for [`StitchConfig`].
#[derive(Debug)]
pub struct StitchConfigBuilder {
    config: StitchConfig,
}

impl StitchConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_width(mut self, px: u32) -> Self {
        self.config.max_width = px;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn page_quality(mut self, q: u8) -> Self {
        self.config.page_quality = q;
        self
    }

    pub fn merge_quality(mut self, q: u8) -> Self {
        self.config.merge_quality = q;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.config.cancel = Some(token);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<StitchConfig, StitchError> {
        let c = &self.config;
        if c.dpi == 0 || c.dpi > MAX_DPI {
            return Err(StitchError::InvalidConfig(format!(
                "DPI must be 1–{MAX_DPI}, got {}",
                c.dpi
            )));
        }
        if c.max_width == 0 {
            return Err(StitchError::InvalidConfig(
                "Maximum width must be ≥ 1".into(),
            ));
        }
        for (name, q) in [("Page", c.page_quality), ("Merge", c.merge_quality)] {
            if !(1..=100).contains(&q) {
                return Err(StitchError::InvalidConfig(format!(
                    "{name} JPEG quality must be 1–100, got {q}"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Cancellation ─────────────────────────────────────────────────────────

/// Cooperative cancellation shared between a caller and a running stitch.
///
/// Checked before each page is rendered and before each fold step. An
/// engine call that is already running is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Specifies which pages of the PDF to stitch.
///
/// Parses from the `--pages` syntax: `all`, a page (`5`), a range (`3-15`)
/// or a comma-separated list of pages and ranges (`1,4-6,9`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Stitch all pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, any order, duplicates allowed).
    Set(Vec<usize>),
}

/// pdfium addresses pages with a `u16`, so no list can name more pages.
const MAX_LISTED_PAGES: usize = u16::MAX as usize + 1;

impl PageSelection {
    /// Sorted, deduplicated 0-based indices of the selected pages that exist
    /// in a document of `total_pages`. Pages past the end are dropped.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let exists = |page: &usize| (1..=total_pages).contains(page);
        let pages: BTreeSet<usize> = match self {
            Self::All => return (0..total_pages).collect(),
            Self::Single(page) => Some(*page).filter(exists).into_iter().collect(),
            Self::Range(first, last) => ((*first).max(1)..=(*last).min(total_pages)).collect(),
            Self::Set(pages) => pages.iter().copied().filter(exists).collect(),
        };
        pages.into_iter().map(|page| page - 1).collect()
    }
}

impl FromStr for PageSelection {
    type Err = StitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }

        let spans = s
            .split(',')
            .map(parse_page_span)
            .collect::<Result<Vec<_>, _>>()?;

        if let [(first, last)] = spans[..] {
            return Ok(if first == last {
                Self::Single(first)
            } else {
                Self::Range(first, last)
            });
        }

        let listed: usize = spans.iter().map(|(first, last)| last - first + 1).sum();
        if listed > MAX_LISTED_PAGES {
            return Err(StitchError::InvalidConfig(format!(
                "page selection '{s}' lists {listed} pages, at most {MAX_LISTED_PAGES} are addressable"
            )));
        }
        Ok(Self::Set(
            spans.into_iter().flat_map(|(first, last)| first..=last).collect(),
        ))
    }
}

/// One comma-separated item of a page selection: `7` or `3-9`.
fn parse_page_span(item: &str) -> Result<(usize, usize), StitchError> {
    let item = item.trim();
    let invalid = |reason: &str| {
        StitchError::InvalidConfig(format!("page selection item '{item}': {reason}"))
    };
    let page = |text: &str| match text.trim().parse::<usize>() {
        Ok(0) => Err(invalid("pages are numbered from 1")),
        Ok(n) => Ok(n),
        Err(_) => Err(invalid("not a page number")),
    };

    let (first, last) = match item.split_once('-') {
        Some((first, last)) => (page(first)?, page(last)?),
        None => {
            let only = page(item)?;
            (only, only)
        }
    };
    if first > last {
        return Err(invalid("range ends before it starts"));
    }
    Ok((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_pipeline() {
        let c = StitchConfig::default();
        assert_eq!(c.dpi, 600);
        assert_eq!(c.max_width, 600);
        assert_eq!(c.page_quality, 75);
        assert_eq!(c.merge_quality, 100);
        assert_eq!(c.pages, PageSelection::All);
    }

    #[test]
    fn builder_rejects_zero_dpi() {
        let err = StitchConfig::builder().dpi(0).build().unwrap_err();
        assert!(matches!(err, StitchError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_bad_quality() {
        assert!(StitchConfig::builder().merge_quality(0).build().is_err());
        assert!(StitchConfig::builder().page_quality(101).build().is_err());
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = StitchConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn debug_redacts_password() {
        let c = StitchConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"), "got: {dbg}");
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let c = StitchConfig::builder().cancel_token(token.clone()).build().unwrap();
        assert!(!c.is_cancelled());
        token.cancel();
        assert!(c.is_cancelled());
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(2).to_indices(3), vec![1]);
        assert_eq!(PageSelection::Single(4).to_indices(3), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 9).to_indices(3), vec![1, 2]);
        assert_eq!(PageSelection::Set(vec![3, 1, 3]).to_indices(3), vec![0, 2]);
        assert_eq!(PageSelection::Range(5, 9).to_indices(3), Vec::<usize>::new());
        assert_eq!(PageSelection::All.to_indices(0), Vec::<usize>::new());
    }

    #[test]
    fn page_selection_parses_each_form() {
        let parse = |s: &str| s.parse::<PageSelection>().unwrap();
        assert_eq!(parse("all"), PageSelection::All);
        assert_eq!(parse(" ALL "), PageSelection::All);
        assert_eq!(parse("5"), PageSelection::Single(5));
        assert_eq!(parse("4-4"), PageSelection::Single(4));
        assert_eq!(parse("3-15"), PageSelection::Range(3, 15));
        assert_eq!(parse("1, 3,5"), PageSelection::Set(vec![1, 3, 5]));
        assert_eq!(parse("9,2-4"), PageSelection::Set(vec![9, 2, 3, 4]));
    }

    #[test]
    fn page_selection_errors_name_the_item() {
        for (input, reason) in [
            ("0", "numbered from 1"),
            ("0-3", "numbered from 1"),
            ("1,0", "numbered from 1"),
            ("5-3", "ends before it starts"),
            ("x", "not a page number"),
            ("2,", "not a page number"),
        ] {
            let err = input.parse::<PageSelection>().unwrap_err();
            let msg = err.to_string();
            assert!(matches!(err, StitchError::InvalidConfig(_)), "{input}: {msg}");
            assert!(msg.contains(reason), "{input}: {msg}");
        }
    }

    #[test]
    fn page_selection_list_is_bounded() {
        let err = "1,1-70000".parse::<PageSelection>().unwrap_err();
        assert!(err.to_string().contains("addressable"), "got: {err}");
    }
}
