/// Tracked-site URL matching for X Screen Time
use url::Url;

/// Hostnames whose tabs are counted
pub const TRACKED_HOSTS: [&str; 2] = ["x.com", "twitter.com"];

/// Check whether a tab URL belongs to the tracked site
///
/// Rules:
/// 1. Scheme must be `https`
/// 2. Host must equal one of the tracked hosts exactly (no subdomains)
/// 3. No explicit port
///
/// Examples:
/// - https://x.com/home → true
/// - https://twitter.com/foo → true
/// - https://example.com → false
/// - http://x.com/home → false
pub fn is_tracked_url(url: &str) -> bool {
    matches_hosts(url, TRACKED_HOSTS.as_slice())
}

/// Same as [`is_tracked_url`] against an arbitrary host list
pub fn matches_hosts<S: AsRef<str>>(url: &str, hosts: &[S]) -> bool {
    if url.is_empty() {
        return false;
    }

    let Ok(parsed) = Url::parse(url.trim()) else {
        return false;
    };

    if parsed.scheme() != "https" || parsed.port().is_some() {
        return false;
    }

    match parsed.host_str() {
        Some(host) => hosts.iter().any(|h| h.as_ref().eq_ignore_ascii_case(host)),
        None => false,
    }
}
