use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity;

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<entity::users::Model> for User {
    fn from(model: entity::users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            name: model.name,
            phone: model.phone,
            role: model.role,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<entity::categories::Model> for Category {
    fn from(model: entity::categories::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            slug: model.slug,
            description: model.description,
            image: model.image,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub legacy_id: Option<i64>,
    pub article: String,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub category_id: Option<Uuid>,
    pub images: Vec<String>,
    pub composition: Option<String>,
    pub width_cm: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<entity::products::Model> for Product {
    fn from(model: entity::products::Model) -> Self {
        let images = serde_json::from_value(model.images).unwrap_or_default();
        Self {
            id: model.id,
            legacy_id: model.legacy_id,
            article: model.article,
            name: model.name,
            description: model.description,
            price: model.price,
            stock: model.stock,
            category_id: model.category_id,
            images,
            composition: model.composition,
            width_cm: model.width_cm,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub customer_name: String,
    pub phone: String,
    pub address: Option<String>,
    pub delivery_method: String,
    pub payment_method: String,
    pub total_amount: i64,
    pub status: String,
    pub tracking_number: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<entity::orders::Model> for Order {
    fn from(model: entity::orders::Model) -> Self {
        Self {
            id: model.id,
            order_number: model.order_number,
            user_id: model.user_id,
            customer_name: model.customer_name,
            phone: model.phone,
            address: model.address,
            delivery_method: model.delivery_method,
            payment_method: model.payment_method,
            total_amount: model.total_amount,
            status: model.status,
            tracking_number: model.tracking_number,
            comment: model.comment,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// Line snapshot taken at order time; later catalog edits do not touch it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub article: String,
    pub category_name: Option<String>,
    pub price: i64,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Highest unit price the catalog accepts.
pub const MAX_PRICE: i64 = 100_000_000;

/// `price * quantity`, `None` on overflow.
pub fn line_amount(price: i64, quantity: i32) -> Option<i64> {
    price.checked_mul(i64::from(quantity))
}

impl OrderItem {
    /// Saturates instead of wrapping; only used for reporting.
    pub fn line_total(&self) -> i64 {
        line_amount(self.price, self.quantity).unwrap_or(i64::MAX)
    }
}

impl From<entity::order_items::Model> for OrderItem {
    fn from(model: entity::order_items::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            product_name: model.product_name,
            article: model.article,
            category_name: model.category_name,
            price: model.price,
            quantity: model.quantity,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Settings {
    pub store_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub working_hours: Option<String>,
    pub delivery_info: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<entity::settings::Model> for Settings {
    fn from(model: entity::settings::Model) -> Self {
        Self {
            store_name: model.store_name,
            phone: model.phone,
            email: model.email,
            address: model.address,
            working_hours: model.working_hours,
            delivery_info: model.delivery_info,
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// Order lifecycle.
///
/// The happy path is `pending -> processing -> shipped -> delivered`, one step
/// at a time. `canceled` can be entered from any non-terminal state and
/// `deleted` from any state; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    #[serde(alias = "cancelled")]
    Canceled,
    Deleted,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Canceled,
        OrderStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Deleted => "deleted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Canceled | OrderStatus::Deleted)
    }

    fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Processing),
            OrderStatus::Processing => Some(OrderStatus::Shipped),
            OrderStatus::Shipped => Some(OrderStatus::Delivered),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        if *self == target {
            return true;
        }
        match target {
            OrderStatus::Deleted => true,
            OrderStatus::Canceled => !self.is_terminal(),
            _ => self.next() == Some(target),
        }
    }

    /// Stock goes back to the shelf only if the goods have not left the store.
    pub fn restocks_on_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "cancelled" shows up in older clients.
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "canceled" | "cancelled" => Ok(OrderStatus::Canceled),
            "deleted" => Ok(OrderStatus::Deleted),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Pickup,
    Courier,
    Post,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMethod::Pickup => "pickup",
            DeliveryMethod::Courier => "courier",
            DeliveryMethod::Post => "post",
        }
    }

    pub fn requires_address(&self) -> bool {
        !matches!(self, DeliveryMethod::Pickup)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Transfer => "transfer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_one_step_at_a_time() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));

        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn cancel_and_delete_override() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            assert!(status.can_transition_to(OrderStatus::Canceled), "{status}");
            assert!(status.can_transition_to(OrderStatus::Deleted), "{status}");
        }
        assert!(OrderStatus::Canceled.can_transition_to(OrderStatus::Deleted));
        assert!(!OrderStatus::Deleted.can_transition_to(OrderStatus::Canceled));
        assert!(!OrderStatus::Canceled.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn same_status_is_allowed() {
        for status in OrderStatus::ALL {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn parses_both_cancel_spellings() {
        assert_eq!("cancelled".parse::<OrderStatus>(), Ok(OrderStatus::Canceled));
        assert_eq!(" Shipped ".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        assert!("paid".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn request_bodies_accept_both_cancel_spellings() {
        let status: OrderStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(status, OrderStatus::Canceled);
        let status: OrderStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(status, OrderStatus::Canceled);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"canceled\"");
    }

    #[test]
    fn line_amount_refuses_to_wrap() {
        assert_eq!(line_amount(850, 2), Some(1700));
        assert_eq!(line_amount(MAX_PRICE, i32::MAX), Some(MAX_PRICE * i64::from(i32::MAX)));
        assert_eq!(line_amount(i64::MAX / 2, 3), None);
    }

    #[test]
    fn reported_line_total_saturates() {
        let item = OrderItem {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: None,
            product_name: "Silk".into(),
            article: "SK-1".into(),
            category_name: None,
            price: i64::MAX / 2,
            quantity: 3,
            created_at: Utc::now(),
        };
        assert_eq!(item.line_total(), i64::MAX);
    }

    #[test]
    fn only_unshipped_orders_restock() {
        assert!(OrderStatus::Pending.restocks_on_cancel());
        assert!(OrderStatus::Processing.restocks_on_cancel());
        assert!(!OrderStatus::Shipped.restocks_on_cancel());
        assert!(!OrderStatus::Delivered.restocks_on_cancel());
    }
}
