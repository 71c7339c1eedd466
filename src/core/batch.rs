//! Turning pasted text into download tasks

use url::Url;

use crate::error::{Result, YtBatchError};
use crate::types::{DownloadMode, DownloadTask};

/// Check that `raw` is an absolute http(s) URL with a host
pub fn validate_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| YtBatchError::InvalidUrl(format!("{}: {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(YtBatchError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            raw,
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(YtBatchError::InvalidUrl(format!("{}: missing host", raw)));
    }

    Ok(url)
}

/// One task per non-blank, non-comment line
///
/// Malformed lines are kept: they fail on their own when the batch runs
/// and show up in the results instead of vanishing.
pub fn parse_batch(text: &str, mode: DownloadMode, format: Option<&str>) -> Vec<DownloadTask> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| DownloadTask::new(line, mode).with_format(format.map(String::from)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_valid_urls() {
        assert!(validate_url("https://www.youtube.com/watch?v=jNQXAC9IVRw").is_ok());
        assert!(validate_url("  http://youtu.be/abc  ").is_ok());
    }

    #[test]
    fn test_invalid_urls() {
        for bad in ["not a url", "ftp://example.com/video", "youtube.com/watch?v=x", "file:///etc/passwd"] {
            let err = validate_url(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidUrl, "{}", bad);
        }
    }

    #[test]
    fn test_parse_batch_skips_blanks_and_comments() {
        let text = "
            https://youtu.be/a

            # saved for later
            https://youtu.be/b
            garbage
        ";
        let tasks = parse_batch(text, DownloadMode::Audio, Some("mp3"));

        let urls: Vec<&str> = tasks.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(urls, vec!["https://youtu.be/a", "https://youtu.be/b", "garbage"]);
        assert!(tasks.iter().all(|t| t.mode == DownloadMode::Audio));
        assert_eq!(tasks[0].target_format.as_deref(), Some("mp3"));
    }
}
