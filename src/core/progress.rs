//! yt-dlp output parsing
//!
//! The extractor is asked to print tagged lines through `--progress-template`
//! and `--print`, which are matched first. The human-readable lines it prints
//! otherwise are still recognised so older builds keep working.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

/// Prefix of the lines produced by [`progress_template`]
pub const PROGRESS_TAG: &str = "ytb-progress";
/// Prefix of the lines produced by [`print_template`]
pub const FILE_TAG: &str = "ytb-file";

/// Keep at most this many error lines per item
const MAX_ERROR_LINES: usize = 8;

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[download\]\s+(\d{1,3}(?:\.\d+)?)%").expect("Invalid regex"));

static MERGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\[Merger\] Merging formats into "(.+)"$"#).expect("Invalid regex"));

static ALREADY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\] (.+) has already been downloaded").expect("Invalid regex")
});

/// Value for `--progress-template`
pub fn progress_template() -> String {
    format!(
        "download:{} %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s",
        PROGRESS_TAG
    )
}

/// Value for `--print`, emitted once the file is in its final place
pub fn print_template() -> String {
    format!("after_move:{} %(filepath)s", FILE_TAG)
}

/// A classified line of extractor output
#[derive(Debug, Clone, PartialEq)]
pub enum ToolLine {
    /// Fraction of the current stream in [0, 1]
    Progress(f64),
    /// Tagged progress line of a stream whose size is unknown
    Downloading,
    /// File currently being written
    Destination(PathBuf),
    /// Final file path after post-processing
    Finished(PathBuf),
    AlreadyDownloaded(PathBuf),
    Error(String),
    Other(String),
}

/// Classify one output line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<ToolLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(rest) = trimmed.strip_prefix(PROGRESS_TAG) {
        return Some(match parse_byte_progress(rest) {
            Some(fraction) => ToolLine::Progress(fraction),
            // Size unknown (live streams, some HLS): no fraction to report
            None => ToolLine::Downloading,
        });
    }

    if let Some(path) = trimmed.strip_prefix(FILE_TAG) {
        let path = path.trim();
        if !path.is_empty() && path != "NA" {
            return Some(ToolLine::Finished(PathBuf::from(path)));
        }
    }

    if let Some(msg) = trimmed.strip_prefix("ERROR:") {
        return Some(ToolLine::Error(msg.trim().to_string()));
    }

    if let Some(path) = trimmed
        .strip_prefix("[download] Destination:")
        .or_else(|| trimmed.strip_prefix("[ExtractAudio] Destination:"))
    {
        return Some(ToolLine::Destination(PathBuf::from(path.trim())));
    }

    if let Some(caps) = MERGER_RE.captures(trimmed) {
        return Some(ToolLine::Destination(PathBuf::from(&caps[1])));
    }

    if let Some(caps) = ALREADY_RE.captures(trimmed) {
        return Some(ToolLine::AlreadyDownloaded(PathBuf::from(&caps[1])));
    }

    if let Some(caps) = PERCENT_RE.captures(trimmed) {
        if let Ok(pct) = caps[1].parse::<f64>() {
            return Some(ToolLine::Progress((pct / 100.0).clamp(0.0, 1.0)));
        }
    }

    Some(ToolLine::Other(trimmed.to_string()))
}

/// "<downloaded> <total> <estimate>", any field may be "NA"
fn parse_byte_progress(rest: &str) -> Option<f64> {
    let mut fields = rest.split_whitespace().map(|f| f.parse::<f64>().ok());
    let downloaded = fields.next().flatten()?;
    let total = fields.next().flatten();
    let estimate = fields.next().flatten();

    let total = total.or(estimate).filter(|t| *t > 0.0)?;
    Some((downloaded / total).clamp(0.0, 1.0))
}

/// Everything learned about one item from its output stream
#[derive(Debug, Clone, Default)]
pub struct ItemState {
    /// Highest fraction seen so far; later streams of the same item
    /// (video then audio) start again from zero and are folded in here
    pub fraction: f64,
    pub destination: Option<PathBuf>,
    pub final_path: Option<PathBuf>,
    pub already_downloaded: bool,
    /// Any progress line was seen, so bytes were actually fetched
    pub downloading: bool,
    errors: Vec<String>,
}

impl ItemState {
    /// Fold a line in. Returns true if the fraction moved forward.
    pub fn apply(&mut self, line: &ToolLine) -> bool {
        match line {
            ToolLine::Downloading => self.downloading = true,
            ToolLine::Progress(fraction) => {
                self.downloading = true;
                if *fraction > self.fraction {
                    self.fraction = *fraction;
                    return true;
                }
            }
            ToolLine::Destination(path) => self.destination = Some(path.clone()),
            ToolLine::Finished(path) => self.final_path = Some(path.clone()),
            ToolLine::AlreadyDownloaded(path) => {
                self.already_downloaded = true;
                self.destination = Some(path.clone());
            }
            ToolLine::Error(msg) => {
                if self.errors.len() < MAX_ERROR_LINES {
                    self.errors.push(msg.clone());
                }
            }
            ToolLine::Other(_) => {}
        }
        false
    }

    /// The file was on disk before the run.
    ///
    /// `--print` silences the "has already been downloaded" message, so a
    /// final path reported without any progress line counts as well.
    pub fn reused_existing_file(&self) -> bool {
        self.already_downloaded || (self.final_path.is_some() && !self.downloading)
    }

    /// Best known location of the produced file
    pub fn output_path(&self) -> Option<PathBuf> {
        self.final_path.clone().or_else(|| self.destination.clone())
    }

    /// Captured error text, one line per error
    pub fn error_text(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_progress() {
        assert_eq!(
            parse_line("ytb-progress 250 1000 NA"),
            Some(ToolLine::Progress(0.25))
        );
        // Falls back to the estimate when the total is unknown
        assert_eq!(
            parse_line("ytb-progress 500 NA 1000.0"),
            Some(ToolLine::Progress(0.5))
        );
        assert_eq!(parse_line("ytb-progress 500 NA NA"), Some(ToolLine::Downloading));
    }

    #[test]
    fn test_free_text_percent() {
        let Some(ToolLine::Progress(fraction)) =
            parse_line("[download]  45.2% of 10.00MiB at 500.00KiB/s ETA 00:10")
        else {
            panic!("expected a progress line");
        };
        assert!((fraction - 0.452).abs() < 1e-9);
        assert_eq!(
            parse_line("[download] 100% of 10.00MiB in 00:03"),
            Some(ToolLine::Progress(1.0))
        );
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            parse_line("[download] Destination: /tmp/out/Me at the zoo.f137.mp4"),
            Some(ToolLine::Destination("/tmp/out/Me at the zoo.f137.mp4".into()))
        );
        assert_eq!(
            parse_line(r#"[Merger] Merging formats into "/tmp/out/Me at the zoo.mp4""#),
            Some(ToolLine::Destination("/tmp/out/Me at the zoo.mp4".into()))
        );
        assert_eq!(
            parse_line("ytb-file /tmp/out/Me at the zoo.mp4"),
            Some(ToolLine::Finished("/tmp/out/Me at the zoo.mp4".into()))
        );
        assert_eq!(
            parse_line("[download] /tmp/out/clip.mp4 has already been downloaded"),
            Some(ToolLine::AlreadyDownloaded("/tmp/out/clip.mp4".into()))
        );
    }

    #[test]
    fn test_errors_and_noise() {
        assert_eq!(
            parse_line("ERROR: [youtube] abc: Video unavailable"),
            Some(ToolLine::Error("[youtube] abc: Video unavailable".into()))
        );
        assert_eq!(parse_line("   \r\n"), None);
        assert!(matches!(
            parse_line("[youtube] Extracting URL: https://youtu.be/x"),
            Some(ToolLine::Other(_))
        ));
    }

    #[test]
    fn test_item_state_keeps_highest_fraction() {
        let mut state = ItemState::default();
        assert!(state.apply(&ToolLine::Progress(0.9)));
        // Second stream restarts at zero
        assert!(!state.apply(&ToolLine::Progress(0.1)));
        assert_eq!(state.fraction, 0.9);

        state.apply(&ToolLine::Destination("/a.f1.mp4".into()));
        assert_eq!(state.output_path(), Some("/a.f1.mp4".into()));
        state.apply(&ToolLine::Finished("/a.mp4".into()));
        assert_eq!(state.output_path(), Some("/a.mp4".into()));
    }

    #[test]
    fn test_existing_file_detection() {
        // Console output says so explicitly
        let mut console = ItemState::default();
        console.apply(&ToolLine::AlreadyDownloaded("/out/a.mp4".into()));
        assert!(console.reused_existing_file());

        // Tagged output: a final path with no progress at all
        let mut quiet = ItemState::default();
        quiet.apply(&ToolLine::Finished("/out/a.mp4".into()));
        assert!(quiet.reused_existing_file());

        let mut fetched = ItemState::default();
        fetched.apply(&ToolLine::Downloading);
        fetched.apply(&ToolLine::Finished("/out/a.mp4".into()));
        assert!(!fetched.reused_existing_file());

        assert!(!ItemState::default().reused_existing_file());
    }

    #[test]
    fn test_item_state_collects_errors() {
        let mut state = ItemState::default();
        assert_eq!(state.error_text(), None);
        state.apply(&ToolLine::Error("first".into()));
        state.apply(&ToolLine::Error("second".into()));
        assert_eq!(state.error_text().as_deref(), Some("first\nsecond"));
    }
}
