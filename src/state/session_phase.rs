/// Session phase definitions for tracking a day's crawl
///
/// A session walks through the phases strictly in order.
use std::fmt;

/// Represents the current phase of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// Validating the day and building the engine configuration
    Starting,

    /// The engine is fetching pages and invoking callbacks
    Crawling,

    /// Waiting for in-flight and queued work to finish
    Draining,

    /// Summary emitted and per-session state discarded
    Completed,
}

impl SessionPhase {
    /// Returns true if `next` directly follows this phase
    pub fn can_transition_to(&self, next: SessionPhase) -> bool {
        matches!(
            (self, next),
            (Self::Starting, Self::Crawling)
                | (Self::Crawling, Self::Draining)
                | (Self::Draining, Self::Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Crawling => "crawling",
            Self::Draining => "draining",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
