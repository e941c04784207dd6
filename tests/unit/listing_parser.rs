//! Unit tests for search page parsing against realistic markup

use catalogue_crawler::fetcher::listing_parser::{ListingSelectors, PageParser, SearchPageParser};
use url::Url;

const RESULTS_PAGE: &str = r#"
<!DOCTYPE html>
<html>
<body>
  <div class="results">
    <div class="card">
      <h3 class="h4 mb-0"><a class="text-body" href="/clinic/aurora-health"><span>Aurora Health</span></a></h3>
      <span data-test-id="doctor-specializations">Cardiology, Internal medicine</span>
    </div>
    <div class="card">
      <h3 class="h4 mb-0"><a class="text-body" href="https://other.example/clinic/birch"><span>Birch   Clinic</span></a></h3>
      <span data-test-id="doctor-specializations">Dermatology</span>
    </div>
    <div class="card">
      <h3 class="h4 mb-0"><a class="text-body" href="/clinic/cedar"><span></span></a></h3>
    </div>
  </div>
  <ul class="pagination">
    <li><a href="?q=x&amp;page=1">1</a></li>
    <li><a href="?q=x&amp;page=2">2</a></li>
    <li><span>...</span></li>
    <li><a href="?q=x&amp;page=37">37</a></li>
    <li><a href="?q=x&amp;page=2">Next</a></li>
  </ul>
</body>
</html>
"#;

fn parser() -> SearchPageParser {
    SearchPageParser::with_defaults(Url::parse("https://catalogue.example/search").unwrap()).unwrap()
}

#[test]
fn test_records_in_page_order() {
    let page = parser().parse_page(RESULTS_PAGE);

    assert_eq!(page.records.len(), 2);
    assert_eq!(page.records[0].name, "Aurora Health");
    assert_eq!(page.records[0].url, "https://catalogue.example/clinic/aurora-health");
    assert_eq!(page.records[0].categories, "Cardiology, Internal medicine");
    assert_eq!(page.records[1].name, "Birch Clinic");
    assert_eq!(page.records[1].url, "https://other.example/clinic/birch");
}

#[test]
fn test_total_is_highest_advertised_page() {
    assert_eq!(parser().parse_page(RESULTS_PAGE).total_pages, 37);
}

#[test]
fn test_total_from_link_text_only() {
    let html = r#"<ul class="pagination"><li><a href="javascript:void(0)">1</a></li>
                  <li><a href="javascript:void(0)">4</a></li></ul>"#;
    assert_eq!(parser().parse_page(html).total_pages, 4);
}

#[test]
fn test_garbage_body_is_empty_single_page() {
    let page = parser().parse_page("\u{0}<<not html at all>>");
    assert!(page.records.is_empty());
    assert_eq!(page.total_pages, 1);
}

#[test]
fn test_custom_selectors() {
    let selectors = ListingSelectors {
        name: "li.item a".to_string(),
        link: "li.item a[href]".to_string(),
        categories: "li.item em".to_string(),
        pagination: "nav a".to_string(),
    };
    let parser = SearchPageParser::new(Url::parse("https://catalogue.example/").unwrap(), &selectors)
        .unwrap();
    let html = r#"<ul><li class="item"><a href="p/1">One</a><em>Tag</em></li></ul>
                  <nav><a href="?page=3">3</a></nav>"#;

    let page = parser.parse_page(html);
    assert_eq!(page.records.len(), 1);
    assert_eq!(page.records[0].url, "https://catalogue.example/p/1");
    assert_eq!(page.records[0].categories, "Tag");
    assert_eq!(page.total_pages, 3);
}
