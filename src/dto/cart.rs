use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::Product;

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AddToCartRequest {
    /// Product id, article number or legacy numeric id.
    #[validate(length(min = 1, message = "product_id is required"))]
    pub product_id: String,
    #[validate(range(min = 1, message = "quantity must be greater than 0"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, message = "quantity must be greater than 0"))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    /// `None` until the first item is added.
    pub id: Option<Uuid>,
    pub items: Vec<CartLine>,
    pub total_quantity: i64,
    pub total_amount: i64,
}

impl CartView {
    pub fn empty() -> Self {
        Self::from_lines(None, Vec::new())
    }

    pub fn from_lines(id: Option<Uuid>, items: Vec<CartLine>) -> Self {
        let total_quantity = items.iter().map(|line| i64::from(line.quantity)).sum();
        let total_amount = items
            .iter()
            .fold(0i64, |sum, line| sum.saturating_add(line.line_total));
        Self {
            id,
            items,
            total_quantity,
            total_amount,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartLine {
    pub id: Uuid,
    pub product: Product,
    pub quantity: i32,
    pub line_total: i64,
}
