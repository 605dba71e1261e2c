use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddToCartRequest, CartLine, CartView, UpdateCartItemRequest},
    entity::{
        cart_items::{self, Entity as CartItems},
        carts::{self, Entity as Carts},
        products::{Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Product, line_amount},
    response::{ApiResponse, Meta},
    services::product_service::resolve_product,
    state::AppState,
};

/// A cart line together with the product it points at.
pub(crate) struct LoadedLine {
    pub item: cart_items::Model,
    pub product: ProductModel,
}

pub(crate) async fn find_cart<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
) -> AppResult<Option<carts::Model>> {
    Ok(Carts::find()
        .filter(carts::Column::UserId.eq(user_id))
        .one(db)
        .await?)
}

/// Lines of a cart joined with their products, oldest first. Lines whose
/// product has vanished are skipped; the foreign key cascades them away.
pub(crate) async fn load_lines<C: ConnectionTrait>(
    db: &C,
    cart_id: Uuid,
) -> AppResult<Vec<LoadedLine>> {
    let rows = CartItems::find()
        .filter(cart_items::Column::CartId.eq(cart_id))
        .find_also_related(Products)
        .order_by_asc(cart_items::Column::CreatedAt)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(item, product)| product.map(|product| LoadedLine { item, product }))
        .collect())
}

async fn cart_view<C: ConnectionTrait>(db: &C, user_id: Uuid) -> AppResult<CartView> {
    let cart = match find_cart(db, user_id).await? {
        Some(cart) => cart,
        None => return Ok(CartView::empty()),
    };

    let items = load_lines(db, cart.id)
        .await?
        .into_iter()
        .map(|line| CartLine {
            id: line.item.id,
            line_total: line_amount(line.product.price, line.item.quantity).unwrap_or(i64::MAX),
            quantity: line.item.quantity,
            product: Product::from(line.product),
        })
        .collect();

    Ok(CartView::from_lines(Some(cart.id), items))
}

fn ensure_quantity(quantity: i32, product: &ProductModel) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }
    if quantity > product.stock {
        return Err(AppError::BadRequest(format!(
            "Only {} of {} left in stock",
            product.stock, product.article
        )));
    }
    Ok(())
}

/// The user's cart, created on first use. Concurrent first adds race on the
/// unique `user_id`, so the insert ignores conflicts and re-reads.
async fn get_or_create_cart<C: ConnectionTrait>(db: &C, user_id: Uuid) -> AppResult<carts::Model> {
    if let Some(cart) = find_cart(db, user_id).await? {
        return Ok(cart);
    }

    let now = Utc::now();
    let cart = carts::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    Carts::insert(cart)
        .on_conflict(
            OnConflict::column(carts::Column::UserId)
                .do_nothing()
                .to_owned(),
        )
        .do_nothing()
        .exec(db)
        .await?;

    find_cart(db, user_id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("cart vanished after insert")))
}

async fn touch_cart<C: ConnectionTrait>(db: &C, cart: carts::Model) -> AppResult<()> {
    let mut active: carts::ActiveModel = cart.into();
    active.updated_at = Set(Utc::now().into());
    active.update(db).await?;
    Ok(())
}

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let view = cart_view(&state.orm, user.user_id).await?;
    Ok(ApiResponse::success("OK", view, None))
}

/// Put a product into the cart. An existing line gets its quantity replaced.
pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartView>> {
    let product = resolve_product(&state.orm, &payload.product_id).await?;
    ensure_quantity(payload.quantity, &product)?;

    let txn = state.orm.begin().await?;
    let cart = get_or_create_cart(&txn, user.user_id).await?;

    let line = cart_items::ActiveModel {
        id: Set(Uuid::new_v4()),
        cart_id: Set(cart.id),
        product_id: Set(product.id),
        quantity: Set(payload.quantity),
        created_at: Set(Utc::now().into()),
    };
    CartItems::insert(line)
        .on_conflict(
            OnConflict::columns([cart_items::Column::CartId, cart_items::Column::ProductId])
                .update_column(cart_items::Column::Quantity)
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;
    touch_cart(&txn, cart).await?;
    txn.commit().await?;

    tracing::debug!(
        user_id = %user.user_id,
        product_id = %product.id,
        quantity = payload.quantity,
        "cart line set"
    );

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product.id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let view = cart_view(&state.orm, user.user_id).await?;
    Ok(ApiResponse::success("OK", view, None))
}

pub async fn update_cart_item(
    state: &AppState,
    user: &AuthUser,
    product_key: &str,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartView>> {
    let product = resolve_product(&state.orm, product_key).await?;
    ensure_quantity(payload.quantity, &product)?;

    let cart = find_cart(&state.orm, user.user_id)
        .await?
        .ok_or(AppError::NotFound("Cart item"))?;
    let line = CartItems::find()
        .filter(cart_items::Column::CartId.eq(cart.id))
        .filter(cart_items::Column::ProductId.eq(product.id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Cart item"))?;

    let mut active: cart_items::ActiveModel = line.into();
    active.quantity = Set(payload.quantity);
    active.update(&state.orm).await?;
    touch_cart(&state.orm, cart).await?;

    let view = cart_view(&state.orm, user.user_id).await?;
    Ok(ApiResponse::success("OK", view, None))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_key: &str,
) -> AppResult<ApiResponse<CartView>> {
    let product = resolve_product(&state.orm, product_key).await?;
    let cart = find_cart(&state.orm, user.user_id)
        .await?
        .ok_or(AppError::NotFound("Cart item"))?;

    let result = CartItems::delete_many()
        .filter(cart_items::Column::CartId.eq(cart.id))
        .filter(cart_items::Column::ProductId.eq(product.id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Cart item"));
    }

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let view = cart_view(&state.orm, user.user_id).await?;
    Ok(ApiResponse::success("Removed from cart", view, None))
}

/// Drop the whole cart; its lines go with it.
pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    Carts::delete_many()
        .filter(carts::Column::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;

    Ok(ApiResponse::success(
        "Cart cleared",
        CartView::empty(),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(stock: i32) -> ProductModel {
        let now = Utc::now().into();
        ProductModel {
            id: Uuid::new_v4(),
            legacy_id: None,
            article: "LN-01".into(),
            name: "Linen".into(),
            description: None,
            price: 850,
            stock,
            category_id: None,
            images: serde_json::json!([]),
            composition: None,
            width_cm: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn quantity_within_stock_is_accepted() {
        assert!(ensure_quantity(3, &product(3)).is_ok());
    }

    #[test]
    fn quantity_over_stock_is_rejected() {
        let err = ensure_quantity(4, &product(3)).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        assert!(matches!(
            ensure_quantity(0, &product(3)),
            Err(AppError::BadRequest(_))
        ));
    }
}
