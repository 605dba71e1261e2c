//! Order statistics, aggregated in memory over the caller's visible orders.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Datelike;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder};

use crate::{
    dto::{
        orders::OrderWithItems,
        stats::{CategoryRevenue, OrderStats, ProductRevenue, WeeklyRevenue},
    },
    entity::{
        order_items::Entity as OrderItems,
        orders::{Column as OrderCol, Entity as Orders},
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus},
    response::ApiResponse,
    state::AppState,
};

pub const TOP_PRODUCTS: usize = 5;
pub const RECENT_ORDERS: usize = 5;
pub const UNCATEGORIZED: &str = "Uncategorized";

pub async fn order_stats(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<OrderStats>> {
    let mut condition =
        Condition::all().add(OrderCol::Status.ne(OrderStatus::Deleted.as_str()));
    if !user.is_admin() {
        condition = condition.add(OrderCol::UserId.eq(user.user_id));
    }

    let orders: Vec<OrderWithItems> = Orders::find()
        .filter(condition)
        .order_by_asc(OrderCol::CreatedAt)
        .find_with_related(OrderItems)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|(order, items)| OrderWithItems {
            order: Order::from(order),
            items: items.into_iter().map(OrderItem::from).collect(),
        })
        .collect();

    tracing::debug!(orders = orders.len(), admin = user.is_admin(), "aggregating order stats");

    Ok(ApiResponse::success("Stats", aggregate(&orders), None))
}

/// Compute every statistic in one pass over `orders`. Revenue is the sum of
/// the stored order totals; per-product and per-category figures come from
/// the item snapshots.
pub fn aggregate(orders: &[OrderWithItems]) -> OrderStats {
    let mut total_revenue: i64 = 0;
    let mut customers = HashSet::new();
    let mut weeks: BTreeMap<String, (i64, i64)> = BTreeMap::new();
    let mut products: HashMap<String, ProductRevenue> = HashMap::new();
    let mut categories: HashMap<String, i64> = HashMap::new();
    let mut orders_by_status: BTreeMap<String, i64> = BTreeMap::new();

    for OrderWithItems { order, items } in orders {
        total_revenue = total_revenue.saturating_add(order.total_amount);
        customers.insert(order.user_id);
        *orders_by_status.entry(order.status.clone()).or_default() += 1;

        let week = weeks.entry(iso_week(order)).or_default();
        week.0 = week.0.saturating_add(order.total_amount);
        week.1 += 1;

        for item in items {
            let line_total = item.line_total();
            let key = item
                .product_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| item.article.clone());
            let entry = products.entry(key).or_insert_with(|| ProductRevenue {
                product_id: item.product_id,
                article: item.article.clone(),
                name: item.product_name.clone(),
                quantity: 0,
                revenue: 0,
            });
            entry.quantity += i64::from(item.quantity);
            entry.revenue = entry.revenue.saturating_add(line_total);

            let category = item
                .category_name
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| UNCATEGORIZED.to_string());
            let revenue = categories.entry(category).or_default();
            *revenue = revenue.saturating_add(line_total);
        }
    }

    let order_count = orders.len() as i64;
    let average_order_value = if order_count == 0 {
        0.0
    } else {
        total_revenue as f64 / order_count as f64
    };

    let revenue_by_week = weeks
        .into_iter()
        .map(|(week, (revenue, orders))| WeeklyRevenue {
            week,
            revenue,
            orders,
        })
        .collect();

    let mut top_products: Vec<ProductRevenue> = products.into_values().collect();
    top_products.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.article.cmp(&b.article))
    });
    top_products.truncate(TOP_PRODUCTS);

    let mut revenue_by_category: Vec<CategoryRevenue> = categories
        .into_iter()
        .map(|(category, revenue)| CategoryRevenue { category, revenue })
        .collect();
    revenue_by_category.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then_with(|| a.category.cmp(&b.category))
    });

    let mut recent: Vec<&Order> = orders.iter().map(|o| &o.order).collect();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let recent_orders = recent.into_iter().take(RECENT_ORDERS).cloned().collect();

    OrderStats {
        total_revenue,
        order_count,
        customer_count: customers.len() as i64,
        average_order_value,
        revenue_by_week,
        top_products,
        revenue_by_category,
        recent_orders,
        orders_by_status,
    }
}

fn iso_week(order: &Order) -> String {
    let week = order.created_at.iso_week();
    format!("{:04}-W{:02}", week.year(), week.week())
}
