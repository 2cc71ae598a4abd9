//! HTML parser for article pages and day listings
//!
//! This module matches the page elements the crawl reacts to:
//! - Links to follow (from `<a href>` tags)
//! - Article date, title and body blocks
//! - The recommendation block that marks the end of an article page
//! - Pagination controls on day listings
//!
//! It also parses the article date text.

use crate::crawler::{Element, EngineError};
use chrono::NaiveDateTime;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

pub const LINK_SELECTOR: &str = "a[href]";
pub const DATE_SELECTOR: &str = "div.article__info-date";
pub const TITLE_SELECTORS: [&str; 2] = ["div.article__title", "h1.article__title"];
pub const BODY_SELECTOR: &str = "div.article__text";
pub const RECOMMENDATION_SELECTOR: &str = "div.recommend__place";
pub const LOAD_MORE_SELECTOR: &str = "div.list-more";
pub const ITEMS_LOADED_SELECTOR: &str = "div.list-items-loaded";

/// Attribute of the "load more" button holding the next fragment
pub const LOAD_MORE_ATTR: &str = "data-url";

/// Attribute of a loaded list chunk holding the next fragment
pub const ITEMS_LOADED_ATTR: &str = "data-next-url";

/// Layout of the date prefix, e.g. `15:04 05.03.2025`
pub const ARTICLE_DATE_FORMAT: &str = "%H:%M %d.%m.%Y";

/// Characters of the date block that carry the publication time
pub const ARTICLE_DATE_LEN: usize = 16;

/// Failure to read an article date
#[derive(Debug, Error)]
pub enum DateError {
    #[error("date text too short: '{0}'")]
    TooShort(String),

    #[error("unrecognized date '{text}': {source}")]
    Format {
        text: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Compiled selectors for every element the crawl reacts to
#[derive(Debug, Clone)]
pub struct Selectors {
    links: Selector,
    date: Selector,
    titles: Vec<Selector>,
    body: Selector,
    recommendation: Selector,
    load_more: Selector,
    items_loaded: Selector,
}

impl Selectors {
    /// Compiles the selectors for the news site's markup
    pub fn site_default() -> Result<Self, EngineError> {
        Ok(Self {
            links: compile(LINK_SELECTOR)?,
            date: compile(DATE_SELECTOR)?,
            titles: TITLE_SELECTORS
                .iter()
                .map(|css| compile(css))
                .collect::<Result<_, _>>()?,
            body: compile(BODY_SELECTOR)?,
            recommendation: compile(RECOMMENDATION_SELECTOR)?,
            load_more: compile(LOAD_MORE_SELECTOR)?,
            items_loaded: compile(ITEMS_LOADED_SELECTOR)?,
        })
    }
}

fn compile(css: &str) -> Result<Selector, EngineError> {
    Selector::parse(css).map_err(|e| EngineError::InvalidSelector(format!("{}: {:?}", css, e)))
}

/// Extracts the elements of a page, in callback order
///
/// Within a page, links come first, then the date, titles, body blocks,
/// at most one recommendation marker and finally pagination controls.
/// Elements of one kind keep document order.
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `page_url` - The URL the page was fetched from, for resolving links
/// * `selectors` - Compiled selectors
///
/// # Example
///
/// ```
/// use newsreel::crawler::{extract_elements, Element, Selectors};
/// use url::Url;
///
/// let html = r#"<div class="article__title">Headline</div><div class="recommend__place"></div>"#;
/// let page = Url::parse("https://ria.ru/20250305/a-1.html").unwrap();
/// let elements = extract_elements(html, &page, &Selectors::site_default().unwrap());
/// assert_eq!(
///     elements,
///     vec![Element::Title { text: "Headline".to_string() }, Element::Recommendation]
/// );
/// ```
pub fn extract_elements(html: &str, page_url: &Url, selectors: &Selectors) -> Vec<Element> {
    let document = Html::parse_document(html);
    let mut elements = Vec::new();

    for link in document.select(&selectors.links) {
        if let Some(href) = link.value().attr("href").and_then(|h| resolve_link(h, page_url)) {
            elements.push(Element::Link { href });
        }
    }

    for date in document.select(&selectors.date) {
        if let Some(text) = element_text(&date) {
            elements.push(Element::Date { text });
        }
    }

    for selector in &selectors.titles {
        for title in document.select(selector) {
            if let Some(text) = element_text(&title) {
                elements.push(Element::Title { text });
            }
        }
    }

    for body in document.select(&selectors.body) {
        if let Some(text) = element_text(&body) {
            elements.push(Element::Body { text });
        }
    }

    // One marker per page however many blocks the layout repeats
    if document.select(&selectors.recommendation).next().is_some() {
        elements.push(Element::Recommendation);
    }

    for button in document.select(&selectors.load_more) {
        if let Some(data_url) = non_empty_attr(&button, LOAD_MORE_ATTR) {
            elements.push(Element::LoadMore { data_url });
        }
    }

    for chunk in document.select(&selectors.items_loaded) {
        if let Some(next_url) = non_empty_attr(&chunk, ITEMS_LOADED_ATTR) {
            elements.push(Element::ItemsLoaded { next_url });
        }
    }

    elements
}

/// Whitespace-collapsed text of an element, `None` when blank
fn element_text(element: &ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<String>();
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

fn non_empty_attr(element: &ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolves a link href to an absolute URL
///
/// Returns None for:
/// - javascript:, mailto:, tel:, data: links
/// - fragment-only links
/// - hrefs that don't resolve to an http(s) URL
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then(|| absolute.to_string())
}

/// Parses the publication time from an article date block
///
/// Only the first [`ARTICLE_DATE_LEN`] characters are read, so trailing
/// text such as an "updated" note is ignored.
///
/// # Example
///
/// ```
/// use newsreel::crawler::parse_article_date;
///
/// let date = parse_article_date("15:04 05.03.2025 (updated: 16:00)").unwrap();
/// assert_eq!(date.to_string(), "2025-03-05 15:04:00");
/// ```
pub fn parse_article_date(text: &str) -> Result<NaiveDateTime, DateError> {
    let text = text.trim();
    let prefix: String = text.chars().take(ARTICLE_DATE_LEN).collect();

    if prefix.chars().count() < ARTICLE_DATE_LEN {
        return Err(DateError::TooShort(text.to_string()));
    }

    NaiveDateTime::parse_from_str(&prefix, ARTICLE_DATE_FORMAT).map_err(|source| DateError::Format {
        text: text.to_string(),
        source,
    })
}
