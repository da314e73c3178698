use serde::{Deserialize, Deserializer};

// The API sends `null` for many absent collections.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept integer or float JSON numbers; floats are rounded.
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Number>::deserialize(deserializer)?;
    Ok(value.and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64))))
}

/// `GET /users/me` (only the id matters).
#[derive(Debug, Clone, Deserialize)]
pub struct UserMe {
    pub id: serde_json::Value,
}

impl UserMe {
    /// The numeric id rendered as a string.
    pub fn id_string(&self) -> Option<String> {
        match &self.id {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

/// One page of `GET /users/{id}/items/search?search_type=scan`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub results: Vec<String>,
    #[serde(default)]
    pub scroll_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub total: u64,
}

/// One page of an offset-paginated item search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub results: Vec<String>,
    #[serde(default)]
    pub paging: Paging,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttributeValue {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attribute {
    pub id: String,
    #[serde(default)]
    pub value_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: Vec<AttributeValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Picture {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VariationRef {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub user_product_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub picture_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemRelation {
    pub id: String,
}

/// `GET /items/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pictures: Vec<Picture>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: Vec<Attribute>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub variations: Vec<VariationRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub catalog_listing: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub item_relations: Vec<ItemRelation>,
}

impl CatalogItem {
    pub fn attribute(&self, id: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.id == id)
    }
}

/// `GET /user-products/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProduct {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: Vec<Attribute>,
}

impl UserProduct {
    pub fn attribute(&self, id: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.id == id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerformanceRule {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerformanceVariable {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rules: Vec<PerformanceRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerformanceBucket {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub variables: Vec<PerformanceVariable>,
}

/// `GET /item/{id}/performance`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Performance {
    #[serde(default, deserialize_with = "lenient_int")]
    pub score: Option<i64>,
    #[serde(default)]
    pub level_wording: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub buckets: Vec<PerformanceBucket>,
}
