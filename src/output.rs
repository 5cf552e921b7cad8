use serde::Serialize;
use std::{
    io::{self, Write},
    sync::Mutex,
};

use crate::state::{DisplaySink, PlaybackState};

const ELLIPSIS: &str = "...";

/// A structure that can be serialized to JSON and parsed by Waybar.
#[derive(Serialize, Debug, Default)]
pub struct WaybarCustomModule {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tooltip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    class: Option<String>,
}

impl WaybarCustomModule {
    /// Create a new module with the given contents.
    pub fn new(
        text: Option<&str>,
        alt: Option<&str>,
        tooltip: Option<&str>,
        class: Option<&str>,
    ) -> Self {
        Self {
            text: text.map(html_escape::encode_text).map(String::from),
            alt: alt.map(html_escape::encode_text).map(String::from),
            tooltip: tooltip.map(html_escape::encode_text).map(String::from),
            class: class.map(html_escape::encode_text).map(String::from),
        }
    }

    /// Render a playback snapshot, cutting the bar text to `max_length` characters.
    pub fn from_state(state: &PlaybackState, max_length: usize) -> Self {
        if state.is_disconnected() {
            return Self::new(
                Some(&format!("▶ {}", truncate("Backend stopped", max_length))),
                Some("disconnected"),
                None,
                Some("disconnected"),
            );
        }

        let icon = if state.is_playing { "❚❚" } else { "▶" };
        let text = if state.is_idle() {
            "Not playing".to_owned()
        } else if !state.current_lyric.is_empty() {
            state.current_lyric.clone()
        } else if !state.artist.is_empty() && !state.title.is_empty() {
            format!("{} - {}", state.artist, state.title)
        } else if !state.title.is_empty() {
            state.title.clone()
        } else {
            "Music Ready".to_owned()
        };
        let tooltip = [
            &state.title,
            &state.artist,
            &state.current_lyric,
            &state.next_lyric,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");
        let class = if state.is_playing { "playing" } else { "paused" };

        Self::new(
            Some(&format!("{icon} {}", truncate(&text, max_length))),
            Some(class),
            (!tooltip.is_empty()).then_some(tooltip.as_str()),
            Some(class),
        )
    }

    pub fn error(message: &str, max_length: usize) -> Self {
        Self::new(
            Some(&format!("⚠ {}", truncate(message, max_length))),
            Some("error"),
            Some(message),
            Some("error"),
        )
    }

    /// Format the module as JSON and write it to the given writer.
    ///
    /// # Errors
    ///
    /// This function will return an error if writing to the given writer fails.
    pub fn format<T: Write>(&self, mut f: &mut T) -> io::Result<()> {
        serde_json::to_writer(&mut f, self)?;
        f.write_all(b"\n")?;
        f.flush()
    }
}

/// Cut `text` to at most `max_length` characters, marking the cut with an ellipsis when there is
/// room for one.
fn truncate(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_owned();
    }
    if max_length <= ELLIPSIS.len() {
        return text.chars().take(max_length).collect();
    }
    let keep = max_length - ELLIPSIS.len();
    text.chars().take(keep).chain(ELLIPSIS.chars()).collect()
}

/// Display sink printing one Waybar module per accepted state.
pub struct WaybarSink<W> {
    writer: Mutex<W>,
    max_length: usize,
}

impl WaybarSink<io::Stdout> {
    pub fn stdout(max_length: usize) -> Self {
        Self::new(io::stdout(), max_length)
    }
}

impl<W: Write> WaybarSink<W> {
    pub fn new(writer: W, max_length: usize) -> Self {
        Self {
            writer: Mutex::new(writer),
            max_length,
        }
    }

    fn emit(&self, module: &WaybarCustomModule) {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = module.format(&mut *writer) {
            tracing::error!(?e, "Failed to write Waybar module");
        }
    }
}

impl<W: Write + Send> DisplaySink for WaybarSink<W> {
    fn on_state_changed(&self, state: &PlaybackState) {
        self.emit(&WaybarCustomModule::from_state(state, self.max_length));
    }

    fn show_error(&self, message: &str) {
        self.emit(&WaybarCustomModule::error(message, self.max_length));
    }
}
