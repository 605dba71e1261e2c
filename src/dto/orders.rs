use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{DeliveryMethod, Order, OrderItem, OrderStatus, PaymentMethod};

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 200, message = "customer_name is required"))]
    pub customer_name: String,
    #[validate(length(min = 3, max = 50, message = "phone is required"))]
    pub phone: String,
    pub delivery_method: DeliveryMethod,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    pub payment_method: PaymentMethod,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

/// Admin-only edits; everything else on an order is immutable.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateOrderRequest {
    pub status: Option<OrderStatus>,
    #[validate(length(max = 100))]
    pub tracking_number: Option<String>,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
