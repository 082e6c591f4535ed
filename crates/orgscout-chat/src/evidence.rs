//! Evidence resolver.
//!
//! Turns the final citation list of a streamed answer into image URLs and
//! coordinate pairs. Every miss is silent; only the aggregate lists may end
//! up absent.

use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use orgscout_core::types::GeoPoint;

use crate::browser::BrowserCoordinates;

const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Locations and images found in a citation list. `None` means nothing
/// was found, which is distinct from an empty list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Evidence {
    pub locations: Option<Vec<GeoPoint>>,
    pub images: Option<Vec<String>>,
}

pub struct EvidenceResolver {
    browser: Option<Arc<dyn BrowserCoordinates>>,
}

impl EvidenceResolver {
    /// Resolver without a browser fallback; map pages that need one yield
    /// no location.
    pub fn new() -> Self {
        Self { browser: None }
    }

    pub fn with_browser(browser: Arc<dyn BrowserCoordinates>) -> Self {
        Self {
            browser: Some(browser),
        }
    }

    /// Classify each citation independently, preserving citation order.
    pub async fn resolve(&self, citations: &[String]) -> Evidence {
        let mut images = Vec::new();
        let mut locations = Vec::new();

        for citation in citations {
            if is_image_url(citation) {
                images.push(citation.clone());
            }

            let parsed = match Url::parse(citation) {
                Ok(u) => u,
                Err(_) => continue,
            };

            if is_google_maps(&parsed) {
                locations.extend(google_coordinates(&parsed));
            } else if is_yandex_org_page(&parsed) {
                let Some(browser) = &self.browser else {
                    debug!(url = %citation, "Browser fallback disabled, skipping map page");
                    continue;
                };
                match browser.resolve_coordinates(citation).await {
                    Ok(point) => locations.push(point),
                    Err(e) => warn!(url = %citation, error = %e, "Browser coordinate lookup failed"),
                }
            }
        }

        Evidence {
            locations: (!locations.is_empty()).then_some(locations),
            images: (!images.is_empty()).then_some(images),
        }
    }
}

impl Default for EvidenceResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the URL path ends in a known image extension, ignoring case.
pub fn is_image_url(raw: &str) -> bool {
    let path = match Url::parse(raw) {
        Ok(u) => u.path().to_ascii_lowercase(),
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase(),
    };
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn is_google_maps(url: &Url) -> bool {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if host == "maps.google.com" || host.starts_with("maps.google.") {
        return true;
    }
    let google = host == "google.com" || host.ends_with(".google.com");
    google && url.path().starts_with("/maps")
}

fn is_yandex_org_page(url: &Url) -> bool {
    if url.scheme() != "https" {
        return false;
    }
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    matches!(host, "yandex.uz" | "yandex.com") && url.path().starts_with("/maps/org")
}

/// Coordinates carried by a maps URL: an `@lat,lng` path segment and/or a
/// `q=lat,lng` query parameter.
pub fn google_coordinates(url: &Url) -> Vec<GeoPoint> {
    let mut points = Vec::new();

    if let Some(segment) = url.path_segments().into_iter().flatten().find(|s| s.starts_with('@')) {
        if let Some(point) = parse_pair(&segment[1..]) {
            points.push(point);
        }
    }

    if let Some((_, q)) = url.query_pairs().find(|(k, _)| k == "q") {
        if let Some(point) = parse_pair(&q) {
            points.push(point);
        }
    }
    points
}

/// Parse `lat,lng[,anything]`.
fn parse_pair(raw: &str) -> Option<GeoPoint> {
    let mut parts = raw.split(',');
    let latitude = parts.next()?.trim().parse::<f64>().ok()?;
    let longitude = parts.next()?.trim().parse::<f64>().ok()?;
    GeoPoint::checked(latitude, longitude)
}
