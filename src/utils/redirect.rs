use log::{debug, warn};
use url::Url;

const MAX_REDIRECT_LENGTH: usize = 2048;

// Sentinel origin used to make sure a relative path cannot escape the site
const SENTINEL_ORIGIN: &str = "http://tutehub.invalid/";

// Encoded sequences that would smuggle a separator, a dot or a control byte
const ENCODED_BLOCKLIST: &[&str] = &["%2e", "%2f", "%5c", "%00", "%09", "%0a", "%0d", "%25"];

/// Validate a post-login redirect target
///
/// Only same-origin relative paths (`/courses?tab=1`) are accepted. Anything
/// else returns `None` and the caller falls back to its configured default.
#[must_use]
pub fn validate_post_auth_redirect(candidate: &str) -> Option<String> {
    if !is_relative_path(candidate) {
        warn!("Rejected non-relative redirect target");
        return None;
    }

    if candidate.len() > MAX_REDIRECT_LENGTH {
        warn!("Rejected redirect target of {} characters", candidate.len());
        return None;
    }

    if candidate.contains("..")
        || candidate.contains('\\')
        || candidate.chars().any(|c| c.is_control() || is_invisible(c))
    {
        warn!("Rejected redirect target with traversal or control characters");
        return None;
    }

    let lowered = candidate.to_ascii_lowercase();
    if ENCODED_BLOCKLIST.iter().any(|seq| lowered.contains(seq)) {
        warn!("Rejected redirect target with encoded separators");
        return None;
    }

    // Resolve against a fixed origin and make sure we stay there
    let base = Url::parse(SENTINEL_ORIGIN).ok()?;
    let resolved = base.join(candidate).ok()?;
    if resolved.origin() != base.origin() {
        warn!("Rejected redirect target that resolves off-site");
        return None;
    }

    debug!("Accepted redirect target {candidate}");
    Some(candidate.to_string())
}

fn is_relative_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.contains(':')
}

fn is_invisible(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200F}' | '\u{2000}'..='\u{200A}' | '\u{2060}'..='\u{2064}')
}
