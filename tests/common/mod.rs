#![allow(dead_code)]

use async_trait::async_trait;
use catalogue_scraper::config::Config;
use catalogue_scraper::error::FetchError;
use catalogue_scraper::http_client::{Fetch, FetchedPage};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

pub const BASE: &str = "http://fixture.test";
pub const DETAIL: &str = "http://fixture.test/catalogue/test-manga/";
pub const SCAN_VF: &str = "http://fixture.test/catalogue/test-manga/scan/vf/";
pub const EPISODES: &str = "http://fixture.test/catalogue/test-manga/scan/vf/episodes.js?filever=1234";
pub const NO_RESULTS: &str = "Aucun résultat trouvé, vérifiez bien votre recherche.";

enum Reply {
    Page(u16, String),
    Timeout,
}

/// In-memory `Fetch` keyed by exact URL. Unknown GETs fail, unknown HEADs 404.
#[derive(Default)]
pub struct FixtureFetcher {
    gets: HashMap<String, Reply>,
    heads: HashMap<String, u16>,
    pub requests: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.gets.insert(url.to_string(), Reply::Page(200, body.into()));
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.gets.insert(url.to_string(), Reply::Page(status, String::new()));
        self
    }

    pub fn timeout(mut self, url: &str) -> Self {
        self.gets.insert(url.to_string(), Reply::Timeout);
        self
    }

    pub fn head(mut self, url: &str, status: u16) -> Self {
        self.heads.insert(url.to_string(), status);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for FixtureFetcher {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<FetchedPage, FetchError> {
        self.requests.lock().unwrap().push(format!("GET {}", url));
        match self.gets.get(url) {
            Some(Reply::Page(status, body)) => Ok(FetchedPage {
                status: *status,
                body: body.clone(),
            }),
            Some(Reply::Timeout) => Err(FetchError::Timeout { url: url.to_string() }),
            None => Err(FetchError::Missing(url.to_string())),
        }
    }

    async fn head(&self, url: &str, _timeout: Duration) -> Result<u16, FetchError> {
        self.requests.lock().unwrap().push(format!("HEAD {}", url));
        Ok(self.heads.get(url).copied().unwrap_or(404))
    }
}

pub fn card(href: &str, title: &str, genres: &str, content_type: &str, language: &str) -> String {
    format!(
        r#"<div class="shrink-0 m-3 rounded border-2 border-gray-400 border-opacity-50 shadow-2xl cursor-pointer">
          <a class="flex divide-x" href="{href}">
            <img class="imageCarteHorizontale" src="{href}cover.jpg">
            <div class="infoCarteHorizontale bg-black p-2 pl-3">
              <h1 class="text-white font-bold uppercase text-md line-clamp-2">{title}</h1>
              <p class="text-white text-xs opacity-40 truncate italic">{title} Alt</p>
              <p class="mt-0.5 text-gray-300 font-medium text-xs truncate">{genres}</p>
              <p class="mt-0.5 text-gray-300 font-medium text-xs truncate">{content_type}</p>
              <p class="mt-0.5 text-gray-300 font-medium text-xs truncate">{language}</p>
            </div>
          </a>
        </div>"#
    )
}

pub fn listing_page(cards: &[String]) -> String {
    format!(
        r#"<html><body><div id="list_catalog" class="flex flex-wrap">{}</div></body></html>"#,
        cards.join("\n")
    )
}

pub fn empty_listing_page() -> String {
    format!(
        r#"<html><body><div id="list_catalog"><p class="text-white">{}</p></div></body></html>"#,
        NO_RESULTS
    )
}

pub fn detail_page(scan_calls: &[(&str, &str)]) -> String {
    let calls: String = std::iter::once(("nom", "url"))
        .chain(scan_calls.iter().copied())
        .map(|(name, url)| format!("panneauScan(\"{}\", \"{}\");\n", name, url))
        .collect();
    format!("<html><body><script>\n{}</script></body></html>", calls)
}

pub fn variant_page(scan_id: &str) -> String {
    format!(
        r#"<html><head><script src="episodes.js?filever={scan_id}"></script></head><body><div id="readerarea"></div></body></html>"#
    )
}

/// The single-title site: one "Test Manga" card with a "Scan VF" variant of
/// two chapters, 3 listed pages and an empty array with `.length = 5`.
pub fn test_manga_site() -> FixtureFetcher {
    FixtureFetcher::new()
        .page(
            &format!("{}/catalogue?page=1", BASE),
            listing_page(&[card(DETAIL, "Test Manga", "Action, Aventure", "Scans", "VF")]),
        )
        .page(&format!("{}/catalogue?page=2", BASE), empty_listing_page())
        .page(DETAIL, detail_page(&[("Scan VF", "scan/vf/")]))
        .page(SCAN_VF, variant_page("1234"))
        .page(
            EPISODES,
            "var eps1 = ['https://cdn.test/1/1.jpg', 'https://cdn.test/1/2.jpg', 'https://cdn.test/1/3.jpg'];\n\
             var eps2 = [];\n\
             eps2.length = 5;\n",
        )
}

pub fn test_config(base_url: &str, dir: &Path) -> Config {
    Config {
        base_url: base_url.to_string(),
        db_path: dir.join("catalogue.db").display().to_string(),
        snapshot_dir: dir.join("snapshots").display().to_string(),
        ..Config::default()
    }
}
