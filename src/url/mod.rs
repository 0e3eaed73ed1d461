//! URL handling: link resolution and listing identity

mod normalize;

pub use normalize::normalize_url;

use url::Url;

/// Resolves a link target against the page it was found on
///
/// Relative references follow RFC 3986 resolution (`Url::join`). Returns
/// `None` for empty hrefs, non-navigational schemes (`javascript:`,
/// `mailto:`, `tel:`, `data:`) and anything that does not end up as an
/// `http`/`https` URL. Fragment-only hrefs are resolved, not dropped.
pub fn resolve_href(base_url: &Url, href: &str) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute)
        }
        _ => None,
    }
}

/// Identity key of a listing URL
///
/// Two listings with equal keys are the same listing. Falls back to the raw
/// string when the URL cannot be normalized.
pub fn listing_key(url: &str) -> String {
    normalize_url(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}
