//! Search result page parsing
//!
//! Extracts listing stubs and the total page count from one HTML search page.
//! Selectors are configurable; the defaults match the catalogue's current markup.

use crate::ListingRecord;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// Listing name text
pub const DEFAULT_NAME_SELECTOR: &str = "h3.h4.mb-0 a.text-body span";
/// Listing profile link
pub const DEFAULT_LINK_SELECTOR: &str = "h3.h4.mb-0 a.text-body[href]";
/// Categories shown next to a listing
pub const DEFAULT_CATEGORY_SELECTOR: &str = r#"span[data-test-id="doctor-specializations"]"#;
/// Pagination links
pub const DEFAULT_PAGINATION_SELECTOR: &str = "ul.pagination li a";

/// Records and pagination metadata from one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPage {
    /// Listing stubs in page order
    pub records: Vec<ListingRecord>,
    /// Highest page number advertised by the pagination widget (at least 1)
    pub total_pages: u32,
}

/// Turns a page body into records
pub trait PageParser: Send + Sync {
    /// Parse one page body. Malformed markup yields fewer records, never an error.
    fn parse_page(&self, body: &str) -> ParsedPage;
}

/// Parser construction errors
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    /// A CSS selector did not compile
    #[error("invalid {role} selector '{selector}': {reason}")]
    InvalidSelector {
        /// Which selector
        role: &'static str,
        /// Its source text
        selector: String,
        /// Compiler message
        reason: String,
    },
}

/// CSS selectors used by [`SearchPageParser`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSelectors {
    /// Listing name text
    pub name: String,
    /// Listing link carrying `href`
    pub link: String,
    /// Listing categories
    pub categories: String,
    /// Pagination anchors
    pub pagination: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME_SELECTOR.to_string(),
            link: DEFAULT_LINK_SELECTOR.to_string(),
            categories: DEFAULT_CATEGORY_SELECTOR.to_string(),
            pagination: DEFAULT_PAGINATION_SELECTOR.to_string(),
        }
    }
}

/// HTML parser for search result pages
#[derive(Debug)]
pub struct SearchPageParser {
    base_url: Url,
    name: Selector,
    link: Selector,
    categories: Selector,
    pagination: Selector,
}

fn compile(role: &'static str, selector: &str) -> Result<Selector, ParserError> {
    Selector::parse(selector).map_err(|e| ParserError::InvalidSelector {
        role,
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

impl SearchPageParser {
    /// Create a parser resolving relative links against `base_url`
    pub fn new(base_url: Url, selectors: &ListingSelectors) -> Result<Self, ParserError> {
        Ok(Self {
            base_url,
            name: compile("name", &selectors.name)?,
            link: compile("link", &selectors.link)?,
            categories: compile("categories", &selectors.categories)?,
            pagination: compile("pagination", &selectors.pagination)?,
        })
    }

    /// Parser with the default selectors
    pub fn with_defaults(base_url: Url) -> Result<Self, ParserError> {
        Self::new(base_url, &ListingSelectors::default())
    }

    fn text_of(element: ElementRef<'_>) -> String {
        element
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn total_pages(&self, document: &Html) -> u32 {
        document
            .select(&self.pagination)
            .flat_map(|anchor| {
                let from_href = anchor.value().attr("href").and_then(page_param);
                let from_text = Self::text_of(anchor).parse::<u32>().ok();
                [from_href, from_text]
            })
            .flatten()
            .max()
            .unwrap_or(1)
            .max(1)
    }
}

/// Value of the first `page=<digits>` parameter in `href`
fn page_param(href: &str) -> Option<u32> {
    href.match_indices("page=").find_map(|(index, _)| {
        let preceded_ok = index == 0
            || matches!(href.as_bytes()[index - 1], b'?' | b'&' | b';');
        if !preceded_ok {
            return None;
        }
        let digits: String = href[index + "page=".len()..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    })
}

impl PageParser for SearchPageParser {
    fn parse_page(&self, body: &str) -> ParsedPage {
        let document = Html::parse_document(body);

        let names: Vec<String> = document.select(&self.name).map(Self::text_of).collect();
        let links: Vec<Option<String>> = document
            .select(&self.link)
            .map(|a| {
                a.value()
                    .attr("href")
                    .and_then(|href| self.base_url.join(href.trim()).ok())
                    .map(String::from)
            })
            .collect();
        let categories: Vec<String> = document
            .select(&self.categories)
            .map(Self::text_of)
            .collect();

        let records = names
            .into_iter()
            .zip(links)
            .enumerate()
            .filter_map(|(index, (name, url))| {
                let categories = categories.get(index).cloned().unwrap_or_default();
                let record = ListingRecord::new(name, url.unwrap_or_default(), categories);
                match record.validate() {
                    Ok(()) => Some(record),
                    Err(reason) => {
                        debug!(index, reason = %reason, "Skipping listing");
                        None
                    }
                }
            })
            .collect();

        ParsedPage {
            records,
            total_pages: self.total_pages(&document),
        }
    }
}
