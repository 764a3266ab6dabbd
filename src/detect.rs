//! Block and CAPTCHA page classification.
//!
//! The registry serves challenge or block pages with a 200 status, so
//! response bodies that fail to parse as data are run through a
//! [`BlockDetector`]. The heuristic is pluggable so it can be swapped or
//! stubbed without touching recovery logic.

/// Classification of a page body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSignal {
    /// The page is a block or challenge page.
    pub blocked: bool,
    /// Which indicator matched, when blocked.
    pub reason: Option<String>,
    /// The page is an explicit empty-result-set page.
    pub is_no_results: bool,
}

impl BlockSignal {
    /// A page that is neither a block nor an empty-result marker.
    pub fn clear() -> Self {
        Self {
            blocked: false,
            reason: None,
            is_no_results: false,
        }
    }

    /// An explicit empty result set.
    pub fn no_results() -> Self {
        Self {
            blocked: false,
            reason: None,
            is_no_results: true,
        }
    }

    /// A block page with the matched indicator.
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason.into()),
            is_no_results: false,
        }
    }
}

/// Trait for classifying page content as blocked / empty / clear.
pub trait BlockDetector: Send + Sync {
    /// Classifies the given page content.
    ///
    /// Implementations must check for an explicit no-results signal before
    /// any block indicator: a legitimately empty result set is never a block.
    fn classify(&self, page_content: &str) -> BlockSignal;
}

/// Default text-indicator detector.
pub struct TextBlockDetector {
    no_results_markers: Vec<String>,
    block_markers: Vec<String>,
}

impl TextBlockDetector {
    /// Creates a detector with the stock indicator lists.
    pub fn new() -> Self {
        Self {
            no_results_markers: vec![
                "no records found".to_string(),
                "no results found".to_string(),
                "\"totalresults\":0".to_string(),
                "\"records\":[]".to_string(),
            ],
            block_markers: vec![
                "captcha".to_string(),
                "recaptcha".to_string(),
                "are you a robot".to_string(),
                "access denied".to_string(),
                "temporarily blocked".to_string(),
                "too many requests".to_string(),
                "under maintenance".to_string(),
            ],
        }
    }

    /// Replaces the no-results indicator list.
    pub fn with_no_results_markers(mut self, markers: Vec<String>) -> Self {
        self.no_results_markers = markers;
        self
    }

    /// Replaces the block indicator list.
    pub fn with_block_markers(mut self, markers: Vec<String>) -> Self {
        self.block_markers = markers;
        self
    }
}

impl Default for TextBlockDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDetector for TextBlockDetector {
    fn classify(&self, page_content: &str) -> BlockSignal {
        let lowered = page_content.to_lowercase();

        // Empty result sets first: block markers on an explicit no-results
        // page must not win.
        if self
            .no_results_markers
            .iter()
            .any(|marker| lowered.contains(marker.as_str()))
        {
            return BlockSignal::no_results();
        }

        if let Some(marker) = self
            .block_markers
            .iter()
            .find(|marker| lowered.contains(marker.as_str()))
        {
            return BlockSignal::blocked(marker.clone());
        }

        BlockSignal::clear()
    }
}
