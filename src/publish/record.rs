use serde::{Deserialize, Serialize};

/// One completed article as it goes out on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Page the article was extracted from
    pub url: String,

    /// Publication time, RFC 3339 in UTC
    pub date: String,

    /// Title and body fragments joined with single spaces
    pub text: String,
}

/// Summary emitted once per finished crawl session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSignal {
    /// The crawled day, `YYYYMMDD`
    pub day: String,

    /// Articles successfully published during the session
    pub count: u64,

    /// Wall-clock duration of the session in milliseconds
    pub elapsed_ms: u64,
}
