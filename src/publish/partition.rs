use xxhash_rust::xxh3::xxh3_64;

/// Picks the partition for a page URL
///
/// The hash is stable across runs and platforms, so the same URL always
/// lands on the same channel for a given partition count. A zero count is
/// treated as one.
///
/// # Examples
///
/// ```
/// use newsreel::publish::partition_for;
///
/// let url = "https://ria.ru/20250305/moskva-2003456789.html";
/// assert_eq!(partition_for(url, 5), partition_for(url, 5));
/// assert!(partition_for(url, 5) < 5);
/// ```
pub fn partition_for(url: &str, partitions: u32) -> u32 {
    let partitions = u64::from(partitions.max(1));
    (xxh3_64(url.as_bytes()) % partitions) as u32
}
