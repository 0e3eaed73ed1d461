use crate::UrlError;
use url::Url;

/// Tracking query parameters dropped from listing identities
///
/// Every `utm_*` key is dropped as well. Generic names such as `ref` or
/// `source` are kept: boards use them to address distinct listings.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Normalizes a URL into the form used as a listing identity
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only `http` and `https`
/// 3. Lowercase the host and drop a leading `www.`
/// 4. Collapse duplicate slashes and dot segments, drop the trailing slash
///    (except for the root `/`)
/// 5. Remove tracking query parameters and sort the rest
///
/// The fragment is kept: listing pages that have no per-item detail URL
/// address their entries by fragment (`#quote-3`), and those must stay
/// distinct.
///
/// # Examples
///
/// ```
/// use listing_harvester::url::normalize_url;
///
/// let url = normalize_url("http://WWW.EXAMPLE.COM/topic/12/?utm_source=x").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/topic/12");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            let query = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query));
        }
    }

    Ok(url)
}

/// Removes dot segments, empty segments and the trailing slash
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_scheme() {
        let result = normalize_url("http://example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_remove_www() {
        let result = normalize_url("https://www.example.com/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = normalize_url("https://example.com/forum/topic/1/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/forum/topic/1");
    }

    #[test]
    fn test_keeps_fragment() {
        let result = normalize_url("https://quotes.example.com/#quote-3").unwrap();
        assert_eq!(result.as_str(), "https://quotes.example.com/#quote-3");
    }

    #[test]
    fn test_remove_tracking_params() {
        let result =
            normalize_url("https://example.com/page?utm_source=a&fbclid=b&keep=yes").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page?keep=yes");
    }

    #[test]
    fn test_keeps_generic_params() {
        let first = normalize_url("https://example.com/listing?source=1").unwrap();
        let second = normalize_url("https://example.com/listing?source=2&utm_medium=x").unwrap();
        assert_eq!(first.as_str(), "https://example.com/listing?source=1");
        assert_eq!(second.as_str(), "https://example.com/listing?source=2");

        let with_ref = normalize_url("https://example.com/listing?ref=9").unwrap();
        assert_eq!(with_ref.as_str(), "https://example.com/listing?ref=9");
    }

    #[test]
    fn test_sort_query_params() {
        let result = normalize_url("https://example.com/page?b=2&a=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page?a=1&b=2");
    }

    #[test]
    fn test_dot_and_duplicate_segments() {
        let result = normalize_url("https://example.com//a/../b/./c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/file");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_malformed_url() {
        assert!(normalize_url("not a url").is_err());
    }
}
