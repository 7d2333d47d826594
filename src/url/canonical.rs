use crate::UrlError;
use std::fmt;
use url::Url;

/// A URL in its canonical crawl form: absolute, in scope, no query, no fragment
///
/// Only [`Canonicalizer`] builds these from raw input; the store is keyed by them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalUrl(String);

impl CanonicalUrl {
    /// Wraps a value read back from the store, which only ever holds canonical URLs
    pub(crate) fn from_stored(url: String) -> Self {
        Self(url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Parses the canonical form back into a `Url`
    pub fn to_url(&self) -> Result<Url, UrlError> {
        Url::parse(&self.0).map_err(|e| UrlError::Parse(format!("{}: {}", self.0, e)))
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Maps raw links onto the crawl's canonical key space
///
/// # Rules
///
/// 1. Resolve the href against the page it was found on
/// 2. Reject anything that is not http/https
/// 3. Reject hosts other than the allowed domain
/// 4. Drop the query string and the fragment
/// 5. Reject results that do not start with the path prefix
///
/// The function is pure, so applying it to its own output changes nothing.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    allowed_domain: String,
    path_prefix: String,
}

impl Canonicalizer {
    /// Creates a canonicalizer for the given scope
    ///
    /// The prefix is run through the URL parser so that it compares against
    /// serialized URLs (for example `https://x` becomes `https://x/`).
    pub fn new(allowed_domain: &str, path_prefix: &str) -> Result<Self, UrlError> {
        let prefix = Url::parse(path_prefix)
            .map_err(|e| UrlError::Parse(format!("{}: {}", path_prefix, e)))?;

        Ok(Self {
            allowed_domain: allowed_domain.to_ascii_lowercase(),
            path_prefix: prefix.to_string(),
        })
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// Resolves `href` against `base` and returns its canonical form if in scope
    ///
    /// # Examples
    ///
    /// ```
    /// use doc_crawler::url::Canonicalizer;
    /// use url::Url;
    ///
    /// let canon = Canonicalizer::new("x", "https://x/doc").unwrap();
    /// let base = Url::parse("https://x/doc/intro").unwrap();
    ///
    /// let c = canon.canonicalize(&base, "setup?lang=en#install").unwrap();
    /// assert_eq!(c.as_str(), "https://x/doc/setup");
    /// assert!(canon.canonicalize(&base, "https://x/other").is_none());
    /// ```
    pub fn canonicalize(&self, base: &Url, href: &str) -> Option<CanonicalUrl> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }

        let resolved = base.join(href).ok()?;
        self.canonicalize_url(resolved)
    }

    /// Canonicalizes an absolute URL string
    pub fn canonicalize_absolute(&self, url: &str) -> Result<CanonicalUrl, UrlError> {
        let parsed = Url::parse(url.trim()).map_err(|e| UrlError::Parse(format!("{}: {}", url, e)))?;
        self.canonicalize_url(parsed)
            .ok_or_else(|| UrlError::OutOfScope(url.to_string()))
    }

    fn canonicalize_url(&self, mut url: Url) -> Option<CanonicalUrl> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }

        if url.host_str()? != self.allowed_domain {
            return None;
        }

        url.set_query(None);
        url.set_fragment(None);

        let canonical = url.to_string();
        if !canonical.starts_with(&self.path_prefix) {
            return None;
        }

        Some(CanonicalUrl(canonical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon() -> Canonicalizer {
        Canonicalizer::new("x", "https://x/doc").unwrap()
    }

    fn base() -> Url {
        Url::parse("https://x/doc/page").unwrap()
    }

    #[test]
    fn test_strips_query_and_fragment() {
        let c = canon()
            .canonicalize(&base(), "https://x/doc/a?utm_source=feed#top")
            .unwrap();
        assert_eq!(c.as_str(), "https://x/doc/a");
    }

    #[test]
    fn test_resolves_relative_links() {
        assert_eq!(
            canon().canonicalize(&base(), "b").unwrap().as_str(),
            "https://x/doc/b"
        );
        assert_eq!(
            canon().canonicalize(&base(), "/doc/c/d").unwrap().as_str(),
            "https://x/doc/c/d"
        );
        assert_eq!(
            canon().canonicalize(&base(), "../doc/e").unwrap().as_str(),
            "https://x/doc/e"
        );
    }

    #[test]
    fn test_rejects_other_domain() {
        assert!(canon().canonicalize(&base(), "https://y/doc/a").is_none());
        assert!(canon().canonicalize(&base(), "https://sub.x/doc/a").is_none());
    }

    #[test]
    fn test_rejects_outside_prefix() {
        assert!(canon().canonicalize(&base(), "https://x/other").is_none());
        assert!(canon().canonicalize(&base(), "/").is_none());
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        assert!(canon().canonicalize(&base(), "mailto:docs@x").is_none());
        assert!(canon().canonicalize(&base(), "javascript:void(0)").is_none());
        assert!(canon().canonicalize(&base(), "ftp://x/doc/file").is_none());
    }

    #[test]
    fn test_empty_href() {
        assert!(canon().canonicalize(&base(), "   ").is_none());
    }

    #[test]
    fn test_host_is_case_insensitive() {
        let c = canon().canonicalize(&base(), "HTTPS://X/doc/a").unwrap();
        assert_eq!(c.as_str(), "https://x/doc/a");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "https://x/doc/a?b=1#c",
            "relative/path?q",
            "/doc/./x/../y#frag",
            "https://X/doc",
            "https://x/doc/",
        ];

        for input in inputs {
            let once = canon().canonicalize(&base(), input).unwrap();
            let twice = canon().canonicalize(&base(), once.as_str()).unwrap();
            assert_eq!(once, twice, "not idempotent for {}", input);

            // the base page does not matter once the URL is absolute
            let other_base = Url::parse("https://x/doc/deep/nested/page").unwrap();
            assert_eq!(canon().canonicalize(&other_base, once.as_str()), Some(once));
        }
    }

    #[test]
    fn test_canonicalize_absolute() {
        let c = canon().canonicalize_absolute("https://x/doc?x=1").unwrap();
        assert_eq!(c.as_str(), "https://x/doc");

        assert!(matches!(
            canon().canonicalize_absolute("https://x/other"),
            Err(UrlError::OutOfScope(_))
        ));
        assert!(matches!(
            canon().canonicalize_absolute("not a url"),
            Err(UrlError::Parse(_))
        ));
    }

    #[test]
    fn test_prefix_is_normalized() {
        let c = Canonicalizer::new("x", "https://x").unwrap();
        assert_eq!(c.path_prefix(), "https://x/");
        assert!(c.canonicalize_absolute("https://x/anything").is_ok());
    }
}
