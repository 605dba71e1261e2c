use std::collections::HashMap;

use chrono::Utc;
use rand::{Rng, SeedableRng, rngs::StdRng};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::{self, log_audit},
    dto::orders::{CreateOrderRequest, OrderList, OrderWithItems, UpdateOrderRequest},
    entity::{
        carts::Entity as Carts,
        categories::{Column as CategoryCol, Entity as Categories},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
        },
        orders::{self, ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult, is_unique_violation},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderItem, OrderStatus, line_amount},
    notify,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::cart_service,
    state::AppState,
};

pub const ORDER_NUMBER_PREFIX: &str = "FS-";
const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// `FS-` followed by six random digits.
pub fn generate_order_number<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{ORDER_NUMBER_PREFIX}{:06}", rng.gen_range(0..1_000_000u32))
}

/// Insert `order` under a fresh number. A taken number only rolls back to a
/// savepoint, so the surrounding checkout transaction survives the retry.
pub async fn insert_with_order_number<R: Rng + Send>(
    txn: &DatabaseTransaction,
    order: OrderActive,
    rng: &mut R,
) -> AppResult<orders::Model> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let candidate = generate_order_number(rng);
        let mut active = order.clone();
        active.order_number = Set(candidate.clone());

        let savepoint = txn.begin().await?;
        match active.insert(&savepoint).await {
            Ok(model) => {
                savepoint.commit().await?;
                return Ok(model);
            }
            Err(err) if is_unique_violation(&err) => {
                savepoint.rollback().await?;
                tracing::debug!(order_number = %candidate, "order number collision");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(AppError::Internal(anyhow::anyhow!(
        "no free order number after {ORDER_NUMBER_ATTEMPTS} attempts"
    )))
}

fn delivery_address(payload: &CreateOrderRequest) -> AppResult<Option<String>> {
    let address = payload
        .address
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string);
    if payload.delivery_method.requires_address() && address.is_none() {
        return Err(AppError::BadRequest(format!(
            "address is required for {} delivery",
            payload.delivery_method.as_str()
        )));
    }
    Ok(address)
}

/// Turn the caller's cart into an order.
///
/// Everything happens in one transaction: each line's stock is taken with a
/// conditional decrement, so two checkouts racing for the last unit cannot
/// both succeed. The cart is deleted before commit.
pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let address = delivery_address(&payload)?;

    let txn = state.orm.begin().await?;

    let cart = cart_service::find_cart(&txn, user.user_id)
        .await?
        .ok_or_else(|| AppError::BadRequest("Cart is empty".into()))?;
    let lines = cart_service::load_lines(&txn, cart.id).await?;
    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let category_ids: Vec<Uuid> = lines
        .iter()
        .filter_map(|line| line.product.category_id)
        .collect();
    let category_names: HashMap<Uuid, String> = if category_ids.is_empty() {
        HashMap::new()
    } else {
        Categories::find()
            .filter(CategoryCol::Id.is_in(category_ids))
            .all(&txn)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect()
    };

    let mut total_amount: i64 = 0;
    for line in &lines {
        let quantity = line.item.quantity;
        let result = Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(quantity))
            .col_expr(ProdCol::UpdatedAt, Expr::current_timestamp().into())
            .filter(ProdCol::Id.eq(line.product.id))
            .filter(ProdCol::Stock.gte(quantity))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for {}",
                line.product.article
            )));
        }
        total_amount = line_amount(line.product.price, quantity)
            .and_then(|amount| total_amount.checked_add(amount))
            .ok_or_else(|| AppError::BadRequest("Order total is too large".into()))?;
    }

    let now = Utc::now();

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        order_number: NotSet,
        user_id: Set(user.user_id),
        customer_name: Set(payload.customer_name.trim().to_string()),
        phone: Set(payload.phone.trim().to_string()),
        address: Set(address),
        delivery_method: Set(payload.delivery_method.as_str().to_string()),
        payment_method: Set(payload.payment_method.as_str().to_string()),
        total_amount: Set(total_amount),
        status: Set(OrderStatus::Pending.as_str().to_string()),
        tracking_number: Set(None),
        comment: Set(payload.comment.filter(|c| !c.trim().is_empty())),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    let order = insert_with_order_number(&txn, order, &mut StdRng::from_entropy()).await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(lines.len());
    for line in &lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(Some(line.product.id)),
            product_name: Set(line.product.name.clone()),
            article: Set(line.product.article.clone()),
            category_name: Set(line
                .product
                .category_id
                .and_then(|id| category_names.get(&id).cloned())),
            price: Set(line.product.price),
            quantity: Set(line.item.quantity),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(OrderItem::from(item));
    }

    Carts::delete_by_id(cart.id).exec(&txn).await?;

    txn.commit().await?;

    let order = Order::from(order);
    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        total = order.total_amount,
        lines = items.len(),
        "order created"
    );

    state.notify(notify::order_message(&order, &items));

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "order_create",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "order_number": order.order_number })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order created",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

/// Admins see every order, everyone else their own. Soft-deleted orders are
/// only listed when asked for by status.
pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();
    if !user.is_admin() {
        condition = condition.add(OrderCol::UserId.eq(user.user_id));
    }

    match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => {
            let status: OrderStatus = raw.parse().map_err(AppError::BadRequest)?;
            condition = condition.add(OrderCol::Status.eq(status.as_str()));
        }
        None => {
            condition = condition.add(OrderCol::Status.ne(OrderStatus::Deleted.as_str()));
        }
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

async fn order_items<C: ConnectionTrait>(db: &C, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(db)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect())
}

/// Owners and admins only; anyone else gets the same 404 as for a missing id.
pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let mut condition = Condition::all().add(OrderCol::Id.eq(id));
    if !user.is_admin() {
        condition = condition
            .add(OrderCol::UserId.eq(user.user_id))
            .add(OrderCol::Status.ne(OrderStatus::Deleted.as_str()));
    }

    let order = Orders::find()
        .filter(condition)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Order"))?;

    let items = order_items(&state.orm, order.id).await?;

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: Order::from(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Admin edit of status, tracking number and comment.
///
/// Status changes follow [`OrderStatus::can_transition_to`]. Cancelling an
/// order that has not shipped yet puts its stock back in the same
/// transaction.
pub async fn update_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound("Order"))?;

    let current: OrderStatus = order
        .status
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;

    let mut active: OrderActive = order.into();
    let mut restocked = false;

    if let Some(target) = payload.status {
        if !current.can_transition_to(target) {
            return Err(AppError::BadRequest(format!(
                "Cannot change order status from {current} to {target}"
            )));
        }
        if target != current {
            if target == OrderStatus::Canceled && current.restocks_on_cancel() {
                restock(&txn, id).await?;
                restocked = true;
            }
            active.status = Set(target.as_str().to_string());
        }
    }
    if let Some(tracking_number) = payload.tracking_number {
        let tracking_number = tracking_number.trim().to_string();
        active.tracking_number = Set((!tracking_number.is_empty()).then_some(tracking_number));
    }
    if let Some(comment) = payload.comment {
        active.comment = Set(Some(comment));
    }
    active.updated_at = Set(Utc::now().into());

    let order = active.update(&txn).await?;
    let items = order_items(&txn, order.id).await?;

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        from = %current,
        to = %order.status,
        restocked,
        "order updated"
    );

    audit::record(
        &state.orm,
        user,
        "order_update",
        "orders",
        serde_json::json!({
            "order_id": order.id,
            "from": current.as_str(),
            "to": order.status,
            "restocked": restocked,
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        OrderWithItems {
            order: Order::from(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Soft delete: the order stays in the table with status `deleted`.
pub async fn delete_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    update_order(
        state,
        user,
        id,
        UpdateOrderRequest {
            status: Some(OrderStatus::Deleted),
            ..Default::default()
        },
    )
    .await
}

/// Put the quantities of an order back on the shelf. Lines whose product
/// has since been deleted are skipped.
async fn restock<C: ConnectionTrait>(db: &C, order_id: Uuid) -> AppResult<()> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(db)
        .await?;

    for item in items {
        let Some(product_id) = item.product_id else {
            continue;
        };
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(item.quantity))
            .col_expr(ProdCol::UpdatedAt, Expr::current_timestamp().into())
            .filter(ProdCol::Id.eq(product_id))
            .exec(db)
            .await?;
    }
    Ok(())
}
