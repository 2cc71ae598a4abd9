use chrono::NaiveDateTime;
use dashmap::DashMap;

/// Text and date collected for one article page
///
/// Fragments are kept in the order their callbacks fired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingArticle {
    pub fragments: Vec<String>,
    pub published_at: Option<NaiveDateTime>,
}

impl PendingArticle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment; returns true if an identical fragment was
    /// already present
    pub fn push_fragment(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        let duplicate = self.fragments.contains(&text);
        self.fragments.push(text);
        duplicate
    }

    /// Fragments joined with single spaces
    ///
    /// # Examples
    ///
    /// ```
    /// use newsreel::state::PendingArticle;
    ///
    /// let mut article = PendingArticle::new();
    /// article.push_fragment("Title");
    /// article.push_fragment("Body A");
    /// assert_eq!(article.text(), "Title Body A");
    /// ```
    pub fn text(&self) -> String {
        self.fragments.join(" ")
    }

    pub fn has_text(&self) -> bool {
        !self.fragments.is_empty()
    }
}

/// Per-session accumulation of article fragments keyed by page URL
///
/// Safe to share between concurrent page callbacks; updates to the same URL
/// are visible to every later callback for that URL.
#[derive(Debug, Default)]
pub struct ArticleStore {
    articles: DashMap<String, PendingArticle>,
}

impl ArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text fragment to the article at `url`, creating it on first
    /// use
    ///
    /// Returns true if the same fragment had already been recorded for the
    /// URL (a revisit).
    pub fn append_fragment(&self, url: &str, text: impl Into<String>) -> bool {
        self.articles
            .entry(url.to_string())
            .or_default()
            .push_fragment(text)
    }

    /// Records the parsed publication time of the article at `url`
    pub fn record_date(&self, url: &str, date: NaiveDateTime) {
        self.articles.entry(url.to_string()).or_default().published_at = Some(date);
    }

    /// Returns a copy of the article accumulated so far
    pub fn get(&self, url: &str) -> Option<PendingArticle> {
        self.articles.get(url).map(|entry| entry.value().clone())
    }

    /// Evicts a published article
    pub fn remove(&self, url: &str) -> Option<PendingArticle> {
        self.articles.remove(url).map(|(_, article)| article)
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// Drops everything accumulated for the session
    pub fn clear(&self) {
        self.articles.clear();
    }
}
