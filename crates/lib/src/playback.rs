//! Playback boundary: reply text in, displayed text and gesture clips out.
//!
//! The relay calls [`PlaybackDispatcher::dispatch`] once per reply. [`GestureDispatcher`]
//! is the stock implementation: it shows the text and plays one clip per word found in
//! the word → clip mapping (`animationsMapping.json`, a flat JSON object).

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Receives finalized reply text, in the order the service returned it.
pub trait PlaybackDispatcher: Send + Sync {
    fn dispatch(&self, text: &str);
}

/// Where reply text is shown (a label in a headset, a terminal line).
pub trait ReplyDisplay: Send + Sync {
    fn show(&self, text: &str);
}

/// Plays a named gesture clip.
pub trait GesturePlayer: Send + Sync {
    fn play(&self, clip: &str);
}

/// Word → clip name lookup.
#[derive(Debug, Clone, Default)]
pub struct AnimationMapping {
    clips: HashMap<String, String>,
}

impl AnimationMapping {
    pub fn new(clips: HashMap<String, String>) -> Self {
        Self { clips }
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(s)?))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading animation mapping from {}", path.display()))?;
        Self::from_json(&s)
            .with_context(|| format!("parsing animation mapping from {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Exact key first, then the word lowercased with surrounding punctuation stripped.
    pub fn clip_for(&self, word: &str) -> Option<&str> {
        if let Some(clip) = self.clips.get(word) {
            return Some(clip.as_str());
        }
        let normalized = word
            .trim_matches(|c: char| c.is_ascii_punctuation())
            .to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        self.clips.get(&normalized).map(String::as_str)
    }

    /// Clips for each known word of `text`, in word order. Unknown words are skipped.
    pub fn clips_for<'a>(&'a self, text: &str) -> Vec<&'a str> {
        text.split_whitespace()
            .filter_map(|w| self.clip_for(w))
            .collect()
    }
}

/// Shows replies and plays their gestures. The mapping is read on first use; a missing or
/// invalid file is logged and read again on the next dispatch.
pub struct GestureDispatcher {
    mapping_path: PathBuf,
    mapping: Mutex<Option<Arc<AnimationMapping>>>,
    display: Arc<dyn ReplyDisplay>,
    player: Arc<dyn GesturePlayer>,
}

impl GestureDispatcher {
    pub fn new(
        mapping_path: PathBuf,
        display: Arc<dyn ReplyDisplay>,
        player: Arc<dyn GesturePlayer>,
    ) -> Self {
        Self {
            mapping_path,
            mapping: Mutex::new(None),
            display,
            player,
        }
    }

    /// Use an already loaded mapping; the path is never read.
    pub fn with_mapping(
        mapping: AnimationMapping,
        display: Arc<dyn ReplyDisplay>,
        player: Arc<dyn GesturePlayer>,
    ) -> Self {
        Self {
            mapping_path: PathBuf::new(),
            mapping: Mutex::new(Some(Arc::new(mapping))),
            display,
            player,
        }
    }

    fn mapping(&self) -> Option<Arc<AnimationMapping>> {
        let mut guard = self.mapping.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            match AnimationMapping::load(&self.mapping_path) {
                Ok(m) => {
                    log::debug!(
                        "loaded {} gesture mappings from {}",
                        m.len(),
                        self.mapping_path.display()
                    );
                    *guard = Some(Arc::new(m));
                }
                Err(e) => {
                    log::warn!("no gestures played: {:#}", e);
                    return None;
                }
            }
        }
        guard.clone()
    }

    /// Play the gestures for `text` without updating the display. Returns the number of clips played.
    pub fn animate(&self, text: &str) -> usize {
        let Some(mapping) = self.mapping() else {
            return 0;
        };
        let clips = mapping.clips_for(text);
        for clip in &clips {
            self.player.play(clip);
        }
        clips.len()
    }
}

impl PlaybackDispatcher for GestureDispatcher {
    fn dispatch(&self, text: &str) {
        self.display.show(text);
        self.animate(text);
    }
}
