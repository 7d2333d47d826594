//! HTML parser for extracting content and links
//!
//! This module handles parsing rendered HTML to extract:
//! - The page title
//! - The primary text content (optionally narrowed by a CSS selector)
//! - Links to follow (from <a> tags and canonical links)

use crate::crawler::FetchError;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Extracted information from an HTML page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPage {
    /// The page title (from <title> tag), empty when absent
    pub title: String,

    /// Visible text of the primary content, one block per line
    pub content: String,

    /// All links found on the page (absolute URLs, not yet scoped)
    pub hrefs: Vec<String>,
}

/// Turns rendered HTML into a [`ParsedPage`]
pub trait PageParser: Send + Sync + 'static {
    /// Extracts title, content and links; `base_url` resolves relative links
    fn extract(&self, html: &str, base_url: &Url) -> Result<ParsedPage, FetchError>;
}

/// Elements whose text never counts as content
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "svg", "head"];

/// Elements that end a line of extracted text
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "table", "pre",
    "section", "article", "header", "footer", "nav", "blockquote", "br", "dd", "dt",
];

/// Default parser built on `scraper`
///
/// Without a content selector the whole `<body>` is taken as content. With
/// one, a page lacking the element is reported as
/// [`FetchError::MissingContent`], which is retryable: on script-heavy sites
/// it usually means the page was captured before it finished rendering.
#[derive(Debug, Clone, Default)]
pub struct HtmlParser {
    content_selector: Option<Selector>,
}

impl HtmlParser {
    pub fn new(content_selector: Option<&str>) -> Result<Self, ConfigError> {
        let content_selector = content_selector
            .map(|s| {
                Selector::parse(s).map_err(|e| {
                    ConfigError::Validation(format!("invalid content selector '{}': {:?}", s, e))
                })
            })
            .transpose()?;

        Ok(Self { content_selector })
    }
}

impl PageParser for HtmlParser {
    fn extract(&self, html: &str, base_url: &Url) -> Result<ParsedPage, FetchError> {
        let document = Html::parse_document(html);

        let title = extract_title(&document).unwrap_or_default();

        let root = match &self.content_selector {
            Some(selector) => document.select(selector).next(),
            None => body(&document),
        };
        let content = match root {
            Some(element) => visible_text(element),
            None if self.content_selector.is_some() => return Err(FetchError::MissingContent),
            None => String::new(),
        };

        let hrefs = extract_links(&document, base_url);

        Ok(ParsedPage {
            title,
            content,
            hrefs,
        })
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn body(document: &Html) -> Option<ElementRef<'_>> {
    let selector = Selector::parse("body").ok()?;
    document.select(&selector).next()
}

/// Collects the text under `element`, one line per block, whitespace collapsed
fn visible_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(element, &mut raw);

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            let name = child.value().name();
            if SKIPPED_ELEMENTS.contains(&name) {
                continue;
            }
            collect_text(child, out);
            if BLOCK_ELEMENTS.contains(&name) {
                out.push('\n');
            } else {
                out.push(' ');
            }
        }
    }
}

/// Extracts all followable links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    // Extract links from <a> tags
    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            // Skip if it has the download attribute
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, base_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    // Extract canonical link
    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, base_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL
///
/// Returns None for javascript:, mailto:, tel: and data: links, same-page
/// anchors and anything that does not resolve to http(s).
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    match absolute_url.scheme() {
        "http" | "https" => Some(absolute_url.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    fn parse(html: &str) -> ParsedPage {
        HtmlParser::default().extract(html, &base_url()).unwrap()
    }

    #[test]
    fn test_extract_title() {
        let html = r#"<html><head><title>  Test Page  </title></head><body></body></html>"#;
        assert_eq!(parse(html).title, "Test Page");
    }

    #[test]
    fn test_no_title() {
        let html = r#"<html><head></head><body></body></html>"#;
        assert_eq!(parse(html).title, "");
    }

    #[test]
    fn test_body_text_skips_scripts() {
        let html = r#"
            <html>
            <head><title>T</title><style>p { color: red }</style></head>
            <body>
                <h1>Heading</h1>
                <p>First   paragraph
                   continues here.</p>
                <script>var x = 1;</script>
                <p>Second <b>bold</b> paragraph.</p>
            </body>
            </html>
        "#;

        let content = parse(html).content;
        assert!(content.contains("Heading"));
        assert!(content.contains("Second bold paragraph."));
        assert!(!content.contains("var x"));
        assert!(!content.contains("color"));
    }

    #[test]
    fn test_content_selector() {
        let parser = HtmlParser::new(Some("main.docs")).unwrap();
        let html = r#"<html><body><nav>Menu</nav><main class="docs"><p>Body</p></main></body></html>"#;

        let parsed = parser.extract(html, &base_url()).unwrap();
        assert_eq!(parsed.content, "Body");
    }

    #[test]
    fn test_missing_content_is_retryable() {
        let parser = HtmlParser::new(Some("main.docs")).unwrap();
        let html = r#"<html><body><p>Loading...</p></body></html>"#;

        let err = parser.extract(html, &base_url()).unwrap_err();
        assert!(matches!(err, FetchError::MissingContent));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_selector() {
        assert!(HtmlParser::new(Some("<<<")).is_err());
    }

    #[test]
    fn test_extract_absolute_link() {
        let html = r#"<html><body><a href="https://other.com/page">Link</a></body></html>"#;
        assert_eq!(parse(html).hrefs, vec!["https://other.com/page"]);
    }

    #[test]
    fn test_extract_relative_link() {
        let html = r#"<html><body><a href="/other">Link</a></body></html>"#;
        assert_eq!(parse(html).hrefs, vec!["https://example.com/other"]);
    }

    #[test]
    fn test_extract_relative_path_link() {
        let html = r#"<html><body><a href="other">Link</a></body></html>"#;
        assert_eq!(parse(html).hrefs, vec!["https://example.com/other"]);
    }

    #[test]
    fn test_skip_special_schemes() {
        let html = r#"
            <html><body>
                <a href="javascript:void(0)">JS</a>
                <a href="mailto:test@example.com">Email</a>
                <a href="tel:+1234567890">Call</a>
                <a href="data:text/html,<h1>Test</h1>">Data</a>
                <a href="JavaScript:alert(1)">Mixed case</a>
            </body></html>
        "#;
        assert!(parse(html).hrefs.is_empty());
    }

    #[test]
    fn test_skip_download_link() {
        let html = r#"<html><body><a href="/file.pdf" download>Download</a></body></html>"#;
        assert!(parse(html).hrefs.is_empty());
    }

    #[test]
    fn test_skip_fragment_only() {
        let html = r##"<html><body><a href="#section">Jump</a></body></html>"##;
        assert!(parse(html).hrefs.is_empty());
    }

    #[test]
    fn test_follow_nofollow_links() {
        let html = r#"<html><body><a href="/page" rel="nofollow">Link</a></body></html>"#;
        assert_eq!(parse(html).hrefs, vec!["https://example.com/page"]);
    }

    #[test]
    fn test_extract_canonical_link() {
        let html = r#"<html><head><link rel="canonical" href="https://example.com/canonical" /></head><body></body></html>"#;
        assert!(parse(html)
            .hrefs
            .contains(&"https://example.com/canonical".to_string()));
    }

    #[test]
    fn test_mixed_valid_and_invalid_links() {
        let html = r#"
            <html>
            <body>
                <a href="/valid">Valid</a>
                <a href="javascript:alert('no')">Invalid</a>
                <a href="mailto:test@example.com">Invalid</a>
                <a href="/another-valid">Valid</a>
            </body>
            </html>
        "#;
        assert_eq!(parse(html).hrefs.len(), 2);
    }
}
