//! Interactive input with dialoguer

use crate::types::DownloadMode;
use dialoguer::{Input, Select, theme::ColorfulTheme};

/// Read URLs one per line until an empty line
pub fn prompt_urls() -> dialoguer::Result<Vec<String>> {
    let theme = ColorfulTheme::default();
    let mut urls = Vec::new();

    loop {
        let prompt = if urls.is_empty() {
            "Paste a URL".to_string()
        } else {
            format!("URL #{} (empty to start)", urls.len() + 1)
        };
        let line: String = Input::with_theme(&theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;

        let line = line.trim();
        if line.is_empty() {
            break;
        }
        urls.push(line.to_string());
    }

    Ok(urls)
}

/// Ask whether to keep the video or only the audio
pub fn prompt_mode() -> dialoguer::Result<Option<DownloadMode>> {
    let modes = [DownloadMode::Video, DownloadMode::Audio];
    let labels = ["🎬 Video", "🎵 Audio only"];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Download as")
        .items(&labels)
        .default(0)
        .interact_opt()?;

    Ok(selection.and_then(|i| modes.get(i).copied()))
}
