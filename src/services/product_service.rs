use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{CreateProductRequest, ProductList, UpdateProductRequest},
    entity::products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    error::{AppError, AppResult, conflict},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    services::{category_service, contains_pattern, escape_like},
    state::AppState,
};

/// One step of product identifier resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    ArticleExact(String),
    ArticleInsensitive(String),
    LegacyId(i64),
    Id(Uuid),
    ArticleContains(String),
    NameContains(String),
}

/// Strategies tried, in order, to turn a client-supplied identifier into a
/// product. Article numbers come first because some of them are numeric and
/// would otherwise be taken for legacy ids.
pub fn lookup_plan(raw: &str) -> Vec<Lookup> {
    let key = raw.trim();
    if key.is_empty() {
        return Vec::new();
    }

    let mut plan = vec![
        Lookup::ArticleExact(key.to_string()),
        Lookup::ArticleInsensitive(key.to_string()),
    ];
    if key.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(legacy_id) = key.parse::<i64>() {
            plan.push(Lookup::LegacyId(legacy_id));
        }
    } else if let Ok(id) = Uuid::parse_str(key) {
        plan.push(Lookup::Id(id));
    }
    plan.push(Lookup::ArticleContains(key.to_string()));
    plan.push(Lookup::NameContains(key.to_string()));
    plan
}

async fn run_lookup<C: ConnectionTrait>(db: &C, lookup: &Lookup) -> AppResult<Option<ProductModel>> {
    let found = match lookup {
        Lookup::ArticleExact(key) => {
            Products::find()
                .filter(Column::Article.eq(key.as_str()))
                .one(db)
                .await?
        }
        Lookup::ArticleInsensitive(key) => {
            Products::find()
                .filter(Expr::col(Column::Article).ilike(escape_like(key)))
                .order_by_asc(Column::Article)
                .one(db)
                .await?
        }
        Lookup::LegacyId(legacy_id) => {
            Products::find()
                .filter(Column::LegacyId.eq(*legacy_id))
                .one(db)
                .await?
        }
        Lookup::Id(id) => Products::find_by_id(*id).one(db).await?,
        Lookup::ArticleContains(key) => {
            Products::find()
                .filter(Expr::col(Column::Article).ilike(contains_pattern(key)))
                .order_by_asc(Column::Article)
                .one(db)
                .await?
        }
        Lookup::NameContains(key) => {
            Products::find()
                .filter(Expr::col(Column::Name).ilike(contains_pattern(key)))
                .order_by_asc(Column::Article)
                .one(db)
                .await?
        }
    };
    Ok(found)
}

/// Resolve an id, article number or legacy id to a product, trying each
/// [`lookup_plan`] step in order. The first hit wins.
pub async fn resolve_product<C: ConnectionTrait>(db: &C, raw: &str) -> AppResult<ProductModel> {
    for lookup in lookup_plan(raw) {
        if let Some(product) = run_lookup(db, &lookup).await? {
            tracing::debug!(key = raw, ?lookup, product_id = %product.id, "product resolved");
            return Ok(product);
        }
    }
    Err(AppError::NotFound("Product"))
}

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = contains_pattern(search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Article).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(category) = query.category.as_deref().filter(|s| !s.is_empty()) {
        let category = category_service::find_category(&state.orm, category).await?;
        condition = condition.add(Column::CategoryId.eq(category.id));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    if query.in_stock == Some(true) {
        condition = condition.add(Column::Stock.gt(0));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    let data = ProductList { items };
    Ok(ApiResponse::success("Products", data, Some(meta)))
}

pub async fn get_product(state: &AppState, key: &str) -> AppResult<ApiResponse<Product>> {
    let product = resolve_product(&state.orm, key).await?;
    Ok(ApiResponse::success("Product", Product::from(product), None))
}

async fn ensure_article_free<C: ConnectionTrait>(
    db: &C,
    article: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    let mut finder = Products::find().filter(Column::Article.eq(article));
    if let Some(id) = except {
        finder = finder.filter(Column::Id.ne(id));
    }
    if finder.one(db).await?.is_some() {
        return Err(AppError::BadRequest(format!(
            "Article {article} is already used by another product"
        )));
    }
    Ok(())
}

async fn ensure_category_exists<C: ConnectionTrait>(
    db: &C,
    category_id: Option<Uuid>,
) -> AppResult<()> {
    if let Some(id) = category_id {
        category_service::find_category(db, &id.to_string()).await?;
    }
    Ok(())
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let article = payload.article.trim().to_string();
    ensure_article_free(&state.orm, &article, None).await?;
    ensure_category_exists(&state.orm, payload.category_id).await?;

    if let Some(legacy_id) = payload.legacy_id {
        let taken = Products::find()
            .filter(Column::LegacyId.eq(legacy_id))
            .one(&state.orm)
            .await?;
        if taken.is_some() {
            return Err(AppError::BadRequest(format!(
                "Legacy id {legacy_id} is already used"
            )));
        }
    }

    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        legacy_id: Set(payload.legacy_id),
        article: Set(article),
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description),
        price: Set(payload.price),
        stock: Set(payload.stock),
        category_id: Set(payload.category_id),
        images: Set(serde_json::json!(payload.images)),
        composition: Set(payload.composition),
        width_cm: Set(payload.width_cm),
        created_at: NotSet,
        updated_at: NotSet,
    };
    // The checks above can lose a race; the unique keys settle it.
    let product = active
        .insert(&state.orm)
        .await
        .map_err(|e| conflict(e, "Article or legacy id is already used"))?;

    audit::record(
        &state.orm,
        user,
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id, "article": product.article }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

/// Partial update. Runs in a transaction holding the product row, so a
/// stock edit cannot interleave with a checkout's decrement of the same row.
pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let txn = state.orm.begin().await?;

    let existing = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    let previous_stock = existing.stock;

    let mut active: ActiveModel = existing.into();
    if let Some(article) = payload.article {
        let article = article.trim().to_string();
        ensure_article_free(&txn, &article, Some(id)).await?;
        active.article = Set(article);
    }
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    if let Some(category_id) = payload.category_id {
        ensure_category_exists(&txn, category_id).await?;
        active.category_id = Set(category_id);
    }
    if let Some(images) = payload.images {
        active.images = Set(serde_json::json!(images));
    }
    if let Some(composition) = payload.composition {
        active.composition = Set(Some(composition));
    }
    if let Some(width_cm) = payload.width_cm {
        active.width_cm = Set(Some(width_cm));
    }
    active.updated_at = Set(Utc::now().into());

    let product = active
        .update(&txn)
        .await
        .map_err(|e| conflict(e, "Article is already used by another product"))?;
    txn.commit().await?;

    if product.stock != previous_stock {
        tracing::info!(
            product_id = %product.id,
            from = previous_stock,
            to = product.stock,
            "stock adjusted"
        );
    }

    audit::record(
        &state.orm,
        user,
        "product_update",
        "products",
        serde_json::json!({
            "product_id": product.id,
            "stock": product.stock,
            "price": product.price,
            "category_id": product.category_id,
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Products::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Product"));
    }

    audit::record(
        &state.orm,
        user,
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_strategies_come_first() {
        let plan = lookup_plan("TK-104");
        assert_eq!(
            plan,
            vec![
                Lookup::ArticleExact("TK-104".into()),
                Lookup::ArticleInsensitive("TK-104".into()),
                Lookup::ArticleContains("TK-104".into()),
                Lookup::NameContains("TK-104".into()),
            ]
        );
    }

    #[test]
    fn numeric_key_tries_legacy_id_before_fuzzy() {
        let plan = lookup_plan(" 1042 ");
        assert_eq!(plan[0], Lookup::ArticleExact("1042".into()));
        assert_eq!(plan[2], Lookup::LegacyId(1042));
        assert_eq!(plan[3], Lookup::ArticleContains("1042".into()));
        assert!(!plan.iter().any(|l| matches!(l, Lookup::Id(_))));
    }

    #[test]
    fn uuid_key_tries_internal_id() {
        let id = Uuid::new_v4();
        let plan = lookup_plan(&id.to_string());
        assert_eq!(plan[2], Lookup::Id(id));
        assert!(!plan.iter().any(|l| matches!(l, Lookup::LegacyId(_))));
    }

    #[test]
    fn oversized_number_skips_legacy_lookup() {
        let plan = lookup_plan("99999999999999999999999");
        assert!(!plan.iter().any(|l| matches!(l, Lookup::LegacyId(_))));
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn blank_key_has_no_plan() {
        assert!(lookup_plan("   ").is_empty());
    }
}
