use crate::api::types::{CatalogItem, UserProduct};

/// Attribute holding the seller's own SKU.
pub const SKU_ATTRIBUTE: &str = "SELLER_SKU";

/// Length of the key shared by SKUs and media file names.
pub const SKU_KEY_LEN: usize = 7;

/// The seven leading digits of a seller SKU, if it has them.
pub fn sku_key(raw: &str) -> Option<String> {
    let key: String = raw.trim().chars().take(SKU_KEY_LEN).collect();
    if key.len() == SKU_KEY_LEN && key.bytes().all(|b| b.is_ascii_digit()) {
        Some(key)
    } else {
        None
    }
}

/// SKU key of a listing without variations (`SELLER_SKU.value_name`).
pub fn item_sku(item: &CatalogItem) -> Option<String> {
    item.attribute(SKU_ATTRIBUTE)?
        .value_name
        .as_deref()
        .and_then(sku_key)
}

/// SKU key of a variation (`SELLER_SKU.values[0].name` on the user product).
pub fn user_product_sku(product: &UserProduct) -> Option<String> {
    product
        .attribute(SKU_ATTRIBUTE)?
        .values
        .first()?
        .name
        .as_deref()
        .and_then(sku_key)
}
