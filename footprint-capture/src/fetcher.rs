use crate::error::{CaptureError, Result};
use crate::request::{RequestEvent, SessionEvent};
use crate::session::{Browser, EventSender, Session};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use reqwest::header::{HeaderMap, LOCATION};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_CONCURRENCY: usize = 8;

/// Redirect hops followed per resource before the last 3xx is kept as final.
pub const MAX_REDIRECTS: usize = 5;

/// Element/attribute pairs that make a page pull in another resource.
const RESOURCE_SELECTORS: &[(&str, &str)] = &[
    ("script[src]", "src"),
    ("link[href]", "href"),
    ("img[src]", "src"),
    ("img[srcset]", "srcset"),
    ("source[src]", "src"),
    ("source[srcset]", "srcset"),
    ("iframe[src]", "src"),
    ("video[src]", "src"),
    ("video[poster]", "poster"),
    ("audio[src]", "src"),
    ("embed[src]", "src"),
];

/// `rel` values of `<link>` elements a browser actually downloads.
const FETCHED_LINK_RELS: &[&str] = &[
    "stylesheet",
    "icon",
    "apple-touch-icon",
    "preload",
    "modulepreload",
    "manifest",
];

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub request_timeout: Duration,
    pub max_concurrency: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// A headless page loader: fetches the document, then every subresource the
/// markup (and its stylesheets) reference, reporting each completed request.
///
/// It does not execute scripts, so requests issued from JavaScript after the
/// load are not seen. HAR replay covers those pages.
pub struct FetchBrowser {
    client: Client,
    max_concurrency: usize,
}

impl FetchBrowser {
    pub fn new() -> Result<Self> {
        Self::with_options(FetchOptions::default())
    }

    pub fn with_options(options: FetchOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; footprint/0.1; +https://github.com/trapdoorsec/footprint)")
            .timeout(options.request_timeout)
            .connect_timeout(options.request_timeout / 2)
            .pool_max_idle_per_host(8)
            // every hop is its own request with its own peer address
            .redirect(reqwest::redirect::Policy::none())
            // a proxy would report its own address for every request
            .no_proxy()
            // count bytes as they come off the wire
            .no_gzip()
            .build()?;

        Ok(Self {
            client,
            max_concurrency: options.max_concurrency.max(1),
        })
    }
}

impl Browser for FetchBrowser {
    fn open(&self, url: &Url) -> Result<Session> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CaptureError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                url.scheme(),
                url
            )));
        }

        let client = self.client.clone();
        let url = url.clone();
        let max_concurrency = self.max_concurrency;

        Ok(Session::spawn(move |tx| load_page(client, url, max_concurrency, tx)))
    }
}

struct Fetched {
    /// One event per request sent, redirect hops first.
    hops: Vec<RequestEvent>,
    content_type: Option<String>,
    final_url: Url,
    body: Option<String>,
}

impl Fetched {
    fn is_html(&self) -> bool {
        self.content_type
            .as_ref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false)
    }

    fn is_css(&self) -> bool {
        self.content_type
            .as_ref()
            .map(|ct| ct.contains("text/css"))
            .unwrap_or(false)
            || self.final_url.path().ends_with(".css")
    }

    /// The last hop never got a response.
    fn is_failed(&self) -> bool {
        self.hops.last().map(|hop| hop.remote_ip.is_none()).unwrap_or(true)
    }
}

async fn load_page(client: Client, url: Url, max_concurrency: usize, tx: EventSender) {
    info!("Loading document {}", url);

    let document = match fetch(&client, &url, true).await {
        Ok(fetched) => fetched,
        Err(e) => {
            let _ = tx
                .send(SessionEvent::LoadFailed(format!("{}: {}", url, e)))
                .await;
            return;
        }
    };

    let mut seen: HashSet<Url> = HashSet::new();
    seen.insert(url.clone());
    seen.insert(document.final_url.clone());

    let resources = match (&document.body, document.is_html()) {
        (Some(body), true) => extract_subresources(body, &document.final_url),
        _ => Vec::new(),
    };
    let failure = document
        .is_failed()
        .then(|| document.hops.last().and_then(|hop| hop.error.clone()));
    for hop in document.hops {
        if tx.send(SessionEvent::Request(hop)).await.is_err() {
            return;
        }
    }
    if let Some(reason) = failure {
        let reason = reason.unwrap_or_else(|| "no response".to_string());
        let _ = tx
            .send(SessionEvent::LoadFailed(format!("{}: {}", document.final_url, reason)))
            .await;
        return;
    }

    let first_wave = unseen(resources, &mut seen);
    debug!("Document references {} subresources", first_wave.len());
    let stylesheets = fetch_all(&client, first_wave, max_concurrency, &tx).await;

    let mut second_wave = Vec::new();
    for (css, base) in stylesheets {
        second_wave.extend(
            extract_css_references(&css)
                .iter()
                .filter_map(|href| resolve_resource(&base, href)),
        );
    }
    let second_wave = unseen(second_wave, &mut seen);
    if !second_wave.is_empty() {
        debug!("Stylesheets reference {} more resources", second_wave.len());
        fetch_all(&client, second_wave, max_concurrency, &tx).await;
    }

    let _ = tx.send(SessionEvent::LoadComplete).await;
}

/// Fetch `urls` concurrently, reporting each as it completes. Returns the
/// bodies of any stylesheets so their references can be followed.
async fn fetch_all(
    client: &Client,
    urls: Vec<Url>,
    max_concurrency: usize,
    tx: &EventSender,
) -> Vec<(String, Url)> {
    let mut completions = stream::iter(urls)
        .map(|url| async move {
            match fetch(client, &url, false).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!("Request to {} failed: {}", url, e);
                    Fetched {
                        hops: vec![RequestEvent::failed(url.to_string(), host_of(&url), e.to_string())],
                        content_type: None,
                        final_url: url,
                        body: None,
                    }
                }
            }
        })
        .buffer_unordered(max_concurrency);

    let mut stylesheets = Vec::new();
    while let Some(fetched) = completions.next().await {
        if fetched.is_css()
            && let Some(ref body) = fetched.body
        {
            stylesheets.push((body.clone(), fetched.final_url.clone()));
        }
        for hop in fetched.hops {
            if tx.send(SessionEvent::Request(hop)).await.is_err() {
                return stylesheets;
            }
        }
    }
    stylesheets
}

/// Fetch `url`, following redirects hop by hop so each one is reported
/// under its own host and peer address. Errors only when the first hop got
/// no response at all; a later hop that fails ends the chain as a failed event.
async fn fetch(client: &Client, url: &Url, keep_body: bool) -> std::result::Result<Fetched, reqwest::Error> {
    let mut hops = Vec::new();
    let mut current = url.clone();

    loop {
        let response = match client.get(current.clone()).send().await {
            Ok(response) => response,
            Err(e) if hops.is_empty() => return Err(e),
            Err(e) => {
                warn!("Redirect hop to {} failed: {}", current, e);
                hops.push(RequestEvent::failed(current.to_string(), host_of(&current), e.to_string()));
                return Ok(Fetched {
                    hops,
                    content_type: None,
                    final_url: current,
                    body: None,
                });
            }
        };

        let remote_ip = response.remote_addr().map(|addr| addr.ip());
        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let header_bytes: usize = response
            .headers()
            .iter()
            .map(|(name, value)| name.as_str().len() + value.as_bytes().len() + 4)
            .sum();

        let next = if status.is_redirection() && hops.len() < MAX_REDIRECTS {
            redirect_target(&current, response.headers())
        } else {
            None
        };
        let keep = next.is_none() && (keep_body || looks_like_css(content_type.as_deref(), &current));

        let (body_bytes, body, error) = match response.bytes().await {
            Ok(bytes) => {
                let text = keep.then(|| String::from_utf8_lossy(&bytes).into_owned());
                (bytes.len(), text, None)
            }
            Err(e) => (0, None, Some(format!("body read failed: {}", e))),
        };

        let mut event = RequestEvent::completed(
            current.to_string(),
            host_of(&current),
            remote_ip,
            (header_bytes + body_bytes) as u64,
        )
        .with_status(status.as_u16());
        event.error = error;
        hops.push(event);

        match next {
            Some(next) => {
                debug!("{} redirected to {}", current, next);
                current = next;
            }
            None => {
                return Ok(Fetched {
                    hops,
                    content_type,
                    final_url: current,
                    body,
                });
            }
        }
    }
}

/// Where a 3xx response points, if it names an http(s) location.
fn redirect_target(current: &Url, headers: &HeaderMap) -> Option<Url> {
    let location = headers.get(LOCATION)?.to_str().ok()?;
    let mut next = current.join(location.trim()).ok()?;
    if !matches!(next.scheme(), "http" | "https") {
        return None;
    }
    next.set_fragment(None);
    Some(next)
}

fn looks_like_css(content_type: Option<&str>, url: &Url) -> bool {
    content_type.map(|ct| ct.contains("text/css")).unwrap_or(false) || url.path().ends_with(".css")
}

fn host_of(url: &Url) -> String {
    url.host_str().unwrap_or("unknown").to_string()
}

fn unseen(urls: Vec<Url>, seen: &mut HashSet<Url>) -> Vec<Url> {
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

/// Resources a browser would download while rendering `html`, in document
/// order, without duplicates.
pub fn extract_subresources(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut found = Vec::new();
    let mut seen = HashSet::new();

    for (css, attr) in RESOURCE_SELECTORS {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };

        for element in document.select(&selector) {
            if element.value().name() == "link" && !is_fetched_link(element.value().attr("rel")) {
                continue;
            }
            let Some(value) = element.value().attr(attr) else {
                continue;
            };

            let href = if attr.ends_with("srcset") {
                first_srcset_candidate(value)
            } else {
                Some(value)
            };

            if let Some(href) = href
                && let Some(url) = resolve_resource(base, href)
                && seen.insert(url.clone())
            {
                found.push(url);
            }
        }
    }

    found
}

fn is_fetched_link(rel: Option<&str>) -> bool {
    rel.map(|rel| {
        rel.split_whitespace()
            .any(|token| FETCHED_LINK_RELS.contains(&token.to_ascii_lowercase().as_str()))
    })
    .unwrap_or(false)
}

fn first_srcset_candidate(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .next()
        .and_then(|candidate| candidate.split_whitespace().next())
}

/// Resolve `href` against `base`, keeping only fetchable http(s) targets.
pub fn resolve_resource(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("data:")
        || href.starts_with("blob:")
        || href.starts_with("javascript:")
        || href.starts_with("about:")
        || href.starts_with("mailto:")
    {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// `url(...)` and `@import "..."` targets in a stylesheet.
pub fn extract_css_references(css: &str) -> Vec<String> {
    let mut refs = Vec::new();

    let mut rest = css;
    while let Some(start) = rest.find("url(") {
        rest = &rest[start + 4..];
        let Some(end) = rest.find(')') else {
            break;
        };
        let inner = rest[..end].trim().trim_matches(|c| c == '"' || c == '\'').trim();
        if !inner.is_empty() {
            refs.push(inner.to_string());
        }
        rest = &rest[end + 1..];
    }

    let mut rest = css;
    while let Some(start) = rest.find("@import") {
        rest = rest[start + 7..].trim_start();
        if let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'')
            && let Some(end) = rest[1..].find(quote)
        {
            refs.push(rest[1..end + 1].to_string());
        }
    }

    refs
}
