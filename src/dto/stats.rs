use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Order;

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct WeeklyRevenue {
    /// ISO week, `YYYY-Www`.
    pub week: String,
    pub revenue: i64,
    pub orders: i64,
}

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct ProductRevenue {
    pub product_id: Option<Uuid>,
    pub article: String,
    pub name: String,
    pub quantity: i64,
    pub revenue: i64,
}

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct CategoryRevenue {
    pub category: String,
    pub revenue: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderStats {
    pub total_revenue: i64,
    pub order_count: i64,
    pub customer_count: i64,
    pub average_order_value: f64,
    pub revenue_by_week: Vec<WeeklyRevenue>,
    pub top_products: Vec<ProductRevenue>,
    pub revenue_by_category: Vec<CategoryRevenue>,
    pub recent_orders: Vec<Order>,
    pub orders_by_status: BTreeMap<String, i64>,
}
