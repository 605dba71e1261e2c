use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::Product;

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 64, message = "article is required"))]
    pub article: String,
    #[validate(length(min = 1, max = 300, message = "name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 0, max = 100_000_000, message = "price must be between 0 and 100000000"))]
    pub price: i64,
    #[validate(range(min = 0, message = "stock cannot be negative"))]
    pub stock: i32,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub images: Vec<String>,
    pub composition: Option<String>,
    #[validate(range(min = 1))]
    pub width_cm: Option<i32>,
    pub legacy_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 64))]
    pub article: Option<String>,
    #[validate(length(min = 1, max = 300))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0, max = 100_000_000, message = "price must be between 0 and 100000000"))]
    pub price: Option<i64>,
    #[validate(range(min = 0, message = "stock cannot be negative"))]
    pub stock: Option<i32>,
    /// Omit to keep the category, `null` to detach the product from it.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<Uuid>, nullable)]
    pub category_id: Option<Option<Uuid>>,
    pub images: Option<Vec<String>>,
    pub composition: Option<String>,
    #[validate(range(min = 1))]
    pub width_cm: Option<i32>,
}

/// Tells an explicit `null` apart from a missing field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}
