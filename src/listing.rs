//! Catalogue listing: paginated fetch and card extraction.

use crate::config::Config;
use crate::error::ScrapeError;
use crate::helpers::{clean_text, non_empty};
use crate::http_client::Fetch;
use crate::models::CatalogItem;
use log::{info, warn};
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

pub const NO_RESULTS_MARKER: &str = "Aucun résultat trouvé, vérifiez bien votre recherche.";

static CONTAINER: LazyLock<Selector> = LazyLock::new(|| sel("div#list_catalog"));
static CARD: LazyLock<Selector> =
    LazyLock::new(|| sel("div.shrink-0.m-3.rounded.border-2.cursor-pointer"));
static LINK: LazyLock<Selector> = LazyLock::new(|| sel("a.flex.divide-x"));
static IMAGE: LazyLock<Selector> = LazyLock::new(|| sel("img"));
static INFO: LazyLock<Selector> = LazyLock::new(|| sel("div.infoCarteHorizontale"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| sel("h1"));
static ALT_TITLE: LazyLock<Selector> = LazyLock::new(|| sel("p.text-white.italic"));
static DESCRIPTOR: LazyLock<Selector> = LazyLock::new(|| sel("p.text-gray-300.font-medium"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Listing container fragments in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPages {
    pub fragments: Vec<String>,
}

impl ListingPages {
    pub fn joined(&self) -> String {
        self.fragments.join("\n")
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PageOutcome {
    Fragment(String),
    NoResults,
    MissingContainer,
}

fn inspect_page(body: &str) -> PageOutcome {
    let document = Html::parse_document(body);
    match document.select(&CONTAINER).next() {
        Some(container) => {
            let html = container.html();
            if html.contains(NO_RESULTS_MARKER) {
                PageOutcome::NoResults
            } else {
                PageOutcome::Fragment(html)
            }
        }
        None => PageOutcome::MissingContainer,
    }
}

pub fn listing_page_url(base_url: &str, page: u32) -> String {
    format!("{}/catalogue?page={}", base_url.trim_end_matches('/'), page)
}

/// Walk `catalogue?page=N` from page 1 until the site runs out of results.
///
/// A non-200 status, a fetch error or a page without the listing container
/// ends the walk but keeps whatever was collected. `max_listing_pages` bounds
/// the walk when the no-results marker never shows up.
pub async fn fetch_listing<F: Fetch + ?Sized>(fetcher: &F, config: &Config) -> Result<ListingPages, ScrapeError> {
    let mut pages = ListingPages::default();
    let timeout = config.http.listing_timeout();

    for page in 1..=config.max_listing_pages {
        let url = listing_page_url(&config.base_url, page);
        let response = match fetcher.get(&url, timeout).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Failed to retrieve page {}: {}", page, e);
                break;
            }
        };
        if !response.is_ok() {
            warn!("Failed to retrieve page {} (status {})", page, response.status);
            break;
        }
        match inspect_page(&response.body) {
            PageOutcome::Fragment(html) => {
                pages.fragments.push(html);
                if page == config.max_listing_pages {
                    warn!(
                        "Stopped listing walk after {} pages without a no-results marker",
                        page
                    );
                }
            }
            PageOutcome::NoResults => {
                info!("Listing exhausted at page {}", page);
                break;
            }
            PageOutcome::MissingContainer => {
                warn!("Listing container not found on page {}", page);
                break;
            }
        }
    }

    if pages.fragments.is_empty() {
        return Err(ScrapeError::EmptyListing);
    }
    info!("Collected {} listing pages", pages.fragments.len());
    Ok(pages)
}

/// Content types kept by the listing extractor.
pub fn is_scan_type(content_type: &str) -> bool {
    let lower = content_type.to_lowercase();
    lower.contains("scan") || lower.contains("manhwa")
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .and_then(|e| non_empty(&e.text().collect::<String>()))
}

fn parse_card(card: ElementRef<'_>) -> Option<CatalogItem> {
    let url = card
        .select(&LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(non_empty)?;
    let image_url = card
        .select(&IMAGE)
        .next()
        .and_then(|img| img.value().attr("src"))
        .and_then(non_empty);

    let info = card.select(&INFO).next()?;
    let title = first_text(info, &TITLE)?;
    let alt_title = first_text(info, &ALT_TITLE);

    // Descriptor paragraphs are positional: 0 = genres, 1 = type, 2 = language.
    // The site does not label them, so a reordering upstream mis-tags fields.
    let descriptors: Vec<String> = info
        .select(&DESCRIPTOR)
        .map(|p| clean_text(&p.text().collect::<String>()))
        .collect();
    let genres = descriptors
        .first()
        .map(|g| {
            g.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let content_type = descriptors.get(1).cloned().unwrap_or_default();
    let language = descriptors.get(2).cloned().unwrap_or_default();

    Some(CatalogItem {
        url,
        image_url,
        title,
        alt_title,
        genres,
        content_type,
        language,
    })
}

/// Parse listing HTML into scan/manhwa catalogue items.
pub fn extract_items(html: &str) -> Vec<CatalogItem> {
    let document = Html::parse_document(html);
    let mut items = Vec::new();
    let mut skipped = 0usize;

    for card in document.select(&CARD) {
        match parse_card(card) {
            Some(item) if is_scan_type(&item.content_type) => items.push(item),
            _ => skipped += 1,
        }
    }

    info!("Extracted {} scan/manhwa items ({} other cards skipped)", items.len(), skipped);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(href: &str, title: &str, descriptors: &[&str]) -> String {
        let paragraphs: String = descriptors
            .iter()
            .map(|d| format!(r#"<p class="mt-0.5 text-gray-300 font-medium text-xs truncate">{}</p>"#, d))
            .collect();
        format!(
            r#"<div class="shrink-0 m-3 rounded border-2 border-gray-400 border-opacity-50 shadow-2xl shadow-black hover:shadow-zinc-900 hover:opacity-80 bg-black bg-opacity-40 transition-all duration-200 cursor-pointer">
                <a class="flex divide-x" href="{href}">
                  <img src="https://cdn.test/{title}.jpg">
                  <div class="infoCarteHorizontale bg-black bg-opacity-40 p-2 pl-3">
                    <h1 class="text-white font-bold uppercase text-md line-clamp-2">{title}</h1>
                    <p class="text-white text-xs opacity-40 truncate italic">Alt {title}</p>
                    {paragraphs}
                  </div>
                </a>
              </div>"#
        )
    }

    #[test]
    fn positional_descriptors() {
        let html = card(
            "https://site.test/catalogue/solo/",
            "Solo",
            &["Action, Fantasy ,", "Scans", "VF"],
        );
        let items = extract_items(&html);
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.url, "https://site.test/catalogue/solo/");
        assert_eq!(item.image_url.as_deref(), Some("https://cdn.test/Solo.jpg"));
        assert_eq!(item.alt_title.as_deref(), Some("Alt Solo"));
        assert_eq!(item.genres, vec!["Action", "Fantasy"]);
        assert_eq!(item.content_type, "Scans");
        assert_eq!(item.language, "VF");
    }

    #[test]
    fn filters_non_scan_types() {
        let html = [
            card("https://site.test/catalogue/a/", "Anime Only", &["Action", "Anime", "VOSTFR"]),
            card("https://site.test/catalogue/b/", "Webtoon", &["Drama", "Manhwa", "VF"]),
            card("https://site.test/catalogue/c/", "Both", &["Drama", "Anime, Scans", "VF"]),
            card("https://site.test/catalogue/d/", "Untyped", &["Drama"]),
        ]
        .join("\n");
        let titles: Vec<_> = extract_items(&html).into_iter().map(|i| i.title).collect();
        assert_eq!(titles, vec!["Webtoon", "Both"]);
    }

    #[test]
    fn drops_cards_without_title() {
        let html = card("https://site.test/catalogue/x/", "", &["Action", "Scans", "VF"]);
        assert!(extract_items(&html).is_empty());
    }

    #[test]
    fn detects_no_results_marker() {
        let body = format!(r#"<html><body><div id="list_catalog"><p>{}</p></div></body></html>"#, NO_RESULTS_MARKER);
        assert_eq!(inspect_page(&body), PageOutcome::NoResults);
        assert_eq!(inspect_page("<html><body></body></html>"), PageOutcome::MissingContainer);
    }

    #[test]
    fn scan_type_matching_is_case_insensitive() {
        assert!(is_scan_type("Scans"));
        assert!(is_scan_type("MANHWA"));
        assert!(is_scan_type("Anime, scans"));
        assert!(!is_scan_type("Anime"));
    }
}
