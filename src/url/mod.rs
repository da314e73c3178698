use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Parsed information from a MercadoLibre listing URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingUrlInfo {
    /// A classic listing page (`articulo.mercadolibre.../MLA-123-title-_JM`).
    Item { item_id: String },
    /// A catalog product page (`www.mercadolibre.../title/p/MLA123`). The
    /// winning item is only known when the URL carries `item_id` or `wid`.
    CatalogProduct {
        product_id: String,
        item_id: Option<String>,
    },
}

static RE_ITEM_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Za-z]{3})-?(\d+)").unwrap());

/// Parse a MercadoLibre URL into its component identifiers.
///
/// Supported URL patterns:
/// - `https://articulo.mercadolibre.com.ar/MLA-833704228-some-title-_JM`
/// - `https://www.mercadolibre.com.ar/some-title/p/MLA47481143`
/// - `https://www.mercadolibre.com.ar/some-title/p/MLA47481143?item_id=MLA2044371194`
///
/// If the host is not a MercadoLibre domain, returns an error.
pub fn parse_listing_url(input: &str) -> Result<ListingUrlInfo> {
    let url = url::Url::parse(input).map_err(|e| Error::InvalidIdentifier(e.to_string()))?;

    let host = url.host_str().unwrap_or("");
    if !host.contains("mercadolibre.") && !host.contains("mercadolivre.") {
        return Err(Error::InvalidIdentifier(format!(
            "not a MercadoLibre URL: {input}"
        )));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    // Catalog product: .../p/<product_id>
    if let Some(pos) = segments.iter().position(|s| *s == "p") {
        let product_id = segments
            .get(pos + 1)
            .and_then(|s| normalize_item_id(s))
            .ok_or_else(|| {
                Error::InvalidIdentifier(format!("missing product id in URL: {input}"))
            })?;
        let item_id = url
            .query_pairs()
            .find(|(k, _)| k == "item_id" || k == "wid")
            .and_then(|(_, v)| normalize_item_id(&v));
        return Ok(ListingUrlInfo::CatalogProduct {
            product_id,
            item_id,
        });
    }

    // Classic listing: first segment that starts with an item id
    segments
        .iter()
        .find_map(|s| normalize_item_id(s))
        .map(|item_id| ListingUrlInfo::Item { item_id })
        .ok_or_else(|| Error::InvalidIdentifier(format!("could not parse listing URL: {input}")))
}

/// Normalize `MLA-123`, `mla123` or `MLA123-title` to `MLA123`.
pub fn normalize_item_id(s: &str) -> Option<String> {
    let caps = RE_ITEM_ID.captures(s.trim())?;
    Some(format!("{}{}", caps[1].to_ascii_uppercase(), &caps[2]))
}

/// Check if a string is a bare item id (`MLA` + digits).
pub fn is_item_id(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() > 3
        && bytes[..3].iter().all(|b| b.is_ascii_uppercase())
        && bytes[3..].iter().all(|b| b.is_ascii_digit())
}

/// Extract an item id from either a raw id or a MercadoLibre URL.
pub fn resolve_item_id(input: &str) -> Result<String> {
    let input = input.trim();
    if is_item_id(input) {
        return Ok(input.to_string());
    }
    if input.starts_with("http://") || input.starts_with("https://") {
        return match parse_listing_url(input)? {
            ListingUrlInfo::Item { item_id } => Ok(item_id),
            ListingUrlInfo::CatalogProduct {
                item_id: Some(item_id),
                ..
            } => Ok(item_id),
            ListingUrlInfo::CatalogProduct { product_id, .. } => Err(Error::InvalidIdentifier(
                format!("catalog product {product_id} does not identify a single listing"),
            )),
        };
    }
    normalize_item_id(input)
        .ok_or_else(|| Error::InvalidIdentifier(format!("not an item id: {input}")))
}

/// Build the public listing URL for an item id.
pub fn generate_listing_url(item_id: &str) -> String {
    match normalize_item_id(item_id) {
        Some(id) if id.len() > 3 => {
            let (site, number) = id.split_at(3);
            format!("https://articulo.mercadolibre.com.ar/{site}-{number}")
        }
        _ => format!("https://articulo.mercadolibre.com.ar/{item_id}"),
    }
}
