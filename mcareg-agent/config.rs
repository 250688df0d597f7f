use std::path::Path;
use std::time::Duration;

use mcareg_raw::wire::AUX_CONTROL_WORDS;
use serde_json::Value;

use crate::error::Result;

/// Flash commit time after a non-volatile write
pub const DEFAULT_FLASH_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Pause after every non-volatile write
    pub flash_settle: Duration,
    /// Number of `ctrl` words copied into a command packet
    pub aux_words: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            flash_settle: DEFAULT_FLASH_SETTLE,
            aux_words: AUX_CONTROL_WORDS,
        }
    }
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flash_settle(mut self, flash_settle: Duration) -> Self {
        self.flash_settle = flash_settle;
        self
    }

    /// Limit the auxiliary control words; the packet holds at most 30
    pub fn with_aux_words(mut self, aux_words: usize) -> Self {
        if aux_words > AUX_CONTROL_WORDS {
            tracing::warn!(
                "Requested {} auxiliary control words, packet holds {}",
                aux_words,
                AUX_CONTROL_WORDS
            );
        }
        self.aux_words = aux_words.min(AUX_CONTROL_WORDS);
        self
    }
}

/// Read a JSON file that may contain `#` comments
pub fn read_config(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    tracing::info!("Loaded {} ({} bytes)", path.display(), text.len());
    parse_config(&text)
}

pub fn parse_config(text: &str) -> Result<Value> {
    Ok(serde_json::from_str(&strip_comments(text))?)
}

/// Drop everything from a `#` to the end of its line, unless the `#` is
/// inside a string literal
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let mut in_string = false;
        let mut escaped = false;
        let mut end = line.len();
        for (i, c) in line.char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' if in_string => escaped = true,
                '"' => in_string = !in_string,
                '#' if !in_string => {
                    end = i;
                    break;
                }
                _ => {}
            }
        }
        out.push_str(&line[..end]);
        out.push('\n');
    }
    out
}
