//! State management module
//!
//! This module handles tracking the state of a crawl session and the
//! article data accumulated while it runs.

mod pending;
mod session_phase;

pub use pending::{ArticleStore, PendingArticle};
pub use session_phase::SessionPhase;
