/// Length of the trailing `YYYYMMDD/` segment dropped from the current page URL
pub const MORE_LINK_SUFFIX_LEN: usize = 9;

/// Builds the next "load more" URL from the page it was found on
///
/// The listing page URL ends in the day segment (`https://ria.ru/20250305/`);
/// the site hands out a root-relative fragment
/// (`/services/20250305/more.html?id=...`). Dropping the trailing day segment
/// and the fragment's leading slash and gluing them together yields the
/// service endpoint.
///
/// Returns `None` when the fragment is empty or the current URL is too short
/// to strip.
///
/// # Examples
///
/// ```
/// use newsreel::url::rewrite_more_link;
///
/// let next = rewrite_more_link(
///     "https://ria.ru/20250305/",
///     "/services/20250305/more.html?id=1",
/// );
/// assert_eq!(
///     next.as_deref(),
///     Some("https://ria.ru/services/20250305/more.html?id=1")
/// );
/// ```
pub fn rewrite_more_link(current: &str, fragment: &str) -> Option<String> {
    let mut rest = fragment.chars();
    rest.next()?;

    let keep = current.chars().count().checked_sub(MORE_LINK_SUFFIX_LEN)?;
    let base: String = current.chars().take(keep).collect();

    Some(format!("{}{}", base, rest.as_str()))
}
