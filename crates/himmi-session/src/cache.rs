//! Cache-hit inference from reported usage

use himmi_client::UsageRecord;

/// Whether a response was served from the gateway cache
///
/// The gateway does not flag cache hits; a usage record reporting zero
/// prompt and zero completion tokens is the only signal.
pub const fn classify(record: &UsageRecord) -> bool {
    record.prompt_tokens == 0 && record.completion_tokens == 0
}

/// Counts classified usage records for session statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheClassifier {
    observed: u64,
    hits: u64,
}

impl CacheClassifier {
    /// Classify a record and count it
    pub fn observe(&mut self, record: &UsageRecord) -> bool {
        let hit = classify(record);

        self.observed += 1;
        if hit {
            self.hits += 1;
        }

        hit
    }

    pub const fn hits(&self) -> u64 {
        self.hits
    }

    pub const fn observed(&self) -> u64 {
        self.observed
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
