use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use fabric_store_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    dto::{
        cart::{AddToCartRequest, UpdateCartItemRequest},
        orders::{CreateOrderRequest, UpdateOrderRequest},
        products::UpdateProductRequest,
        users::UpdateUserRoleRequest,
    },
    entity::{
        carts::{Column as CartCol, Entity as Carts},
        categories::ActiveModel as CategoryActive,
        orders::ActiveModel as OrderActive,
        products::ActiveModel as ProductActive,
        products::Entity as Products,
        users::ActiveModel as UserActive,
    },
    error::{AppError, conflict, is_unique_violation},
    middleware::auth::{AuthUser, decode_token, issue_token_at},
    models::{DeliveryMethod, OrderStatus, PaymentMethod},
    routes::create_app,
    services::{cart_service, order_service, product_service, stats_service, user_service},
    state::AppState,
};
use rand::{SeedableRng, rngs::StdRng};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
    Statement, TransactionTrait,
};
use tower::ServiceExt;
use uuid::Uuid;

// Cart -> order -> stats against a real database; admin cancels and deletes.
#[tokio::test]
async fn cart_checkout_and_stats_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let buyer = create_user(&state, "user", "buyer@example.com").await?;
    let rival = create_user(&state, "user", "rival@example.com").await?;
    let admin = create_user(&state, "admin", "admin@example.com").await?;

    let linen_category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set("Linen".into()),
        slug: Set("linen".into()),
        description: Set(None),
        image: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let linen = create_product(&state, "LN-0850", "Washed linen", 850, 5, 2001, Some(linen_category.id)).await?;
    let silk = create_product(&state, "SK-1200", "Silk crepe", 1200, 1, 2002, None).await?;

    // Identifier resolution: article, lowercase article, legacy id, uuid, name fragment.
    let by_id = linen.to_string();
    for key in ["LN-0850", "ln-0850", "2001", by_id.as_str(), "washed"] {
        let found = product_service::get_product(&state, key).await?;
        assert_eq!(found.data.unwrap().id, linen, "key {key}");
    }
    assert!(matches!(
        product_service::get_product(&state, "no-such-fabric").await,
        Err(AppError::NotFound(_))
    ));

    // The rival puts the last silk in their cart first.
    cart_service::add_to_cart(&state, &rival, add("SK-1200", 1)).await?;

    // Adding twice replaces the quantity.
    cart_service::add_to_cart(&state, &buyer, add("LN-0850", 3)).await?;
    let cart = cart_service::add_to_cart(&state, &buyer, add("ln-0850", 2))
        .await?
        .data
        .unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 2);

    // Over stock: rejected, cart untouched.
    let err = cart_service::add_to_cart(&state, &buyer, add("2002", 2))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    let cart = cart_service::get_cart(&state, &buyer).await?.data.unwrap();
    assert_eq!(cart.items.len(), 1);

    let cart = cart_service::add_to_cart(&state, &buyer, add("2002", 1))
        .await?
        .data
        .unwrap();
    assert_eq!(cart.total_amount, 2900);

    let placed = order_service::create_order(&state, &buyer, order_request())
        .await?
        .data
        .unwrap();
    assert_eq!(placed.order.total_amount, 2900);
    assert_eq!(placed.order.status, "pending");
    assert!(placed.order.order_number.starts_with("FS-"));
    assert_eq!(placed.items.len(), 2);
    assert!(
        placed
            .items
            .iter()
            .any(|i| i.article == "LN-0850" && i.category_name.as_deref() == Some("Linen"))
    );

    // Cart is gone and stock went down by exactly the ordered quantities.
    let cart = cart_service::get_cart(&state, &buyer).await?.data.unwrap();
    assert!(cart.id.is_none());
    assert!(cart.items.is_empty());
    assert_eq!(stock_of(&state, linen).await?, 3);
    assert_eq!(stock_of(&state, silk).await?, 0);

    // The rival's checkout for the same last unit fails and changes nothing.
    let err = order_service::create_order(&state, &rival, order_request())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(stock_of(&state, silk).await?, 0);
    let rival_cart = cart_service::get_cart(&state, &rival).await?.data.unwrap();
    assert_eq!(rival_cart.items.len(), 1);

    // A later price change does not touch the order.
    product_service::update_product(
        &state,
        &admin,
        linen,
        UpdateProductRequest {
            price: Some(999),
            ..Default::default()
        },
    )
    .await?;
    let reread = order_service::get_order(&state, &buyer, placed.order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(reread.order.total_amount, 2900);

    // Other customers cannot see it.
    assert!(matches!(
        order_service::get_order(&state, &rival, placed.order.id).await,
        Err(AppError::NotFound(_))
    ));

    let stats = stats_service::order_stats(&state, &admin).await?.data.unwrap();
    assert_eq!(stats.total_revenue, 2900);
    assert_eq!(stats.order_count, 1);
    assert_eq!(stats.customer_count, 1);
    assert_eq!(stats.top_products[0].article, "LN-0850");
    let rival_stats = stats_service::order_stats(&state, &rival).await?.data.unwrap();
    assert_eq!(rival_stats.order_count, 0);
    assert!(rival_stats.top_products.is_empty());

    // Skipping a step is refused; cancelling puts the stock back.
    let err = order_service::update_order(&state, &admin, placed.order.id, status(OrderStatus::Shipped))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let canceled = order_service::update_order(&state, &admin, placed.order.id, status(OrderStatus::Canceled))
        .await?
        .data
        .unwrap();
    assert_eq!(canceled.order.status, "canceled");
    assert_eq!(stock_of(&state, linen).await?, 5);
    assert_eq!(stock_of(&state, silk).await?, 1);

    let err = order_service::update_order(&state, &admin, placed.order.id, status(OrderStatus::Processing))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Soft delete hides the order from stats and lists.
    order_service::delete_order(&state, &admin, placed.order.id).await?;
    let stats = stats_service::order_stats(&state, &admin).await?.data.unwrap();
    assert_eq!(stats.order_count, 0);
    assert_eq!(stats.total_revenue, 0);
    assert_eq!(stock_of(&state, linen).await?, 5);

    cart_line_edits(&state, &buyer, &rival).await?;
    catalog_edits(&state, &admin, linen, linen_category.id).await?;
    account_rules(&state, &admin, &buyer).await?;
    order_number_collision(&state, &buyer).await?;
    demoted_admin_session(&state, &admin).await?;

    Ok(())
}

// Stock here: LN-0850 = 5, SK-1200 = 1 (held in the rival's cart).
async fn cart_line_edits(state: &AppState, buyer: &AuthUser, rival: &AuthUser) -> anyhow::Result<()> {
    cart_service::add_to_cart(state, buyer, add("LN-0850", 1)).await?;

    // Over stock: refused, line unchanged.
    let err = cart_service::update_cart_item(state, buyer, "LN-0850", qty(6))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    let cart = cart_service::get_cart(state, buyer).await?.data.unwrap();
    assert_eq!(cart.items[0].quantity, 1);

    let cart = cart_service::update_cart_item(state, buyer, "ln-0850", qty(4))
        .await?
        .data
        .unwrap();
    assert_eq!(cart.items[0].quantity, 4);
    assert_eq!(cart.total_amount, 4 * 999);

    // Lines that are not in the cart.
    assert!(matches!(
        cart_service::update_cart_item(state, buyer, "SK-1200", qty(1)).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        cart_service::remove_from_cart(state, buyer, "SK-1200").await,
        Err(AppError::NotFound(_))
    ));

    let cart = cart_service::remove_from_cart(state, buyer, "LN-0850")
        .await?
        .data
        .unwrap();
    assert!(cart.items.is_empty());
    assert!(cart.id.is_some());

    // Clearing drops the cart row itself; the rival's cart is untouched.
    cart_service::add_to_cart(state, buyer, add("LN-0850", 2)).await?;
    cart_service::clear_cart(state, buyer).await?;
    let carts = Carts::find()
        .filter(CartCol::UserId.eq(buyer.user_id))
        .count(&state.orm)
        .await?;
    assert_eq!(carts, 0);
    assert!(cart_service::get_cart(state, buyer).await?.data.unwrap().id.is_none());
    let rival_cart = cart_service::get_cart(state, rival).await?.data.unwrap();
    assert_eq!(rival_cart.items.len(), 1);
    Ok(())
}

async fn catalog_edits(
    state: &AppState,
    admin: &AuthUser,
    linen: Uuid,
    category: Uuid,
) -> anyhow::Result<()> {
    let before = product_service::get_product(state, "LN-0850").await?.data.unwrap();
    assert_eq!(before.category_id, Some(category));

    // Omitted fields stay; `null` detaches the category.
    let updated = product_service::update_product(
        state,
        admin,
        linen,
        UpdateProductRequest {
            stock: Some(7),
            ..Default::default()
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(updated.stock, 7);
    assert_eq!(updated.category_id, Some(category));

    let detached = product_service::update_product(
        state,
        admin,
        linen,
        UpdateProductRequest {
            category_id: Some(None),
            ..Default::default()
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(detached.category_id, None);
    assert_eq!(stock_of(state, linen).await?, 7);

    assert!(matches!(
        product_service::update_product(
            state,
            admin,
            linen,
            UpdateProductRequest {
                category_id: Some(Some(Uuid::new_v4())),
                ..Default::default()
            },
        )
        .await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        product_service::update_product(
            state,
            admin,
            linen,
            UpdateProductRequest {
                article: Some("SK-1200".into()),
                ..Default::default()
            },
        )
        .await,
        Err(AppError::BadRequest(_))
    ));
    Ok(())
}

async fn account_rules(state: &AppState, admin: &AuthUser, buyer: &AuthUser) -> anyhow::Result<()> {
    let err = user_service::update_user_role(
        state,
        admin,
        admin.user_id,
        UpdateUserRoleRequest { role: "user".into() },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    assert!(matches!(
        user_service::delete_user(state, admin, admin.user_id).await,
        Err(AppError::BadRequest(_))
    ));
    // The buyer's order is soft-deleted but still references the account.
    assert!(matches!(
        user_service::delete_user(state, admin, buyer.user_id).await,
        Err(AppError::BadRequest(_))
    ));

    // A duplicate e-mail that slips past the lookup is a 400, not a 500.
    let err = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set("buyer@example.com".into()),
        name: Set("Copy".into()),
        phone: Set(None),
        password_hash: Set("dummy".into()),
        role: Set("user".into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .unwrap_err();
    assert!(is_unique_violation(&err));
    assert!(matches!(
        conflict(err, "Email is already taken"),
        AppError::BadRequest(_)
    ));
    Ok(())
}

async fn order_number_collision(state: &AppState, buyer: &AuthUser) -> anyhow::Result<()> {
    let seeded = StdRng::seed_from_u64(2026);
    let first = order_service::generate_order_number(&mut seeded.clone());

    let txn = state.orm.begin().await?;
    let mut taken = bare_order(buyer);
    taken.order_number = Set(first.clone());
    taken.insert(&txn).await?;

    // Same seed: the first draw collides, the retry lands on the next number.
    let inserted =
        order_service::insert_with_order_number(&txn, bare_order(buyer), &mut seeded.clone())
            .await?;
    assert_ne!(inserted.order_number, first);
    assert!(inserted.order_number.starts_with("FS-"));
    txn.commit().await?;
    Ok(())
}

async fn demoted_admin_session(state: &AppState, admin: &AuthUser) -> anyhow::Result<()> {
    let deputy = create_user(state, "admin", "deputy@example.com").await?;
    let issued = Utc::now() - Duration::days(25);
    let old = issue_token_at("test-secret", deputy.user_id, "admin", issued)?;
    let app = create_app(state.clone());

    // While still an admin: allowed, and the refreshed session stays admin.
    let response = app.clone().oneshot(get("/api/users", &old)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(refreshed_role(&response).as_deref(), Some("admin"));

    user_service::update_user_role(
        state,
        admin,
        deputy.user_id,
        UpdateUserRoleRequest { role: "user".into() },
    )
    .await?;

    let response = app.clone().oneshot(get("/api/users", &old)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.clone().oneshot(get("/api/cart", &old)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(refreshed_role(&response).as_deref(), Some("user"));

    // Once the account is gone the admin claim opens nothing and no new
    // session is issued.
    user_service::delete_user(state, admin, deputy.user_id).await?;
    let response = app.clone().oneshot(get("/api/cart", &old)).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let as_user = issue_token_at("test-secret", deputy.user_id, "user", issued)?;
    let response = app.oneshot(get("/api/cart", &as_user)).await?;
    assert!(!response.headers().contains_key(header::SET_COOKIE));
    Ok(())
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn refreshed_role(response: &axum::response::Response) -> Option<String> {
    let cookie = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    let token = cookie.split(';').next()?.strip_prefix("token=")?;
    decode_token("test-secret", token).ok().map(|claims| claims.role)
}

fn bare_order(user: &AuthUser) -> OrderActive {
    OrderActive {
        id: Set(Uuid::new_v4()),
        order_number: NotSet,
        user_id: Set(user.user_id),
        customer_name: Set("Anna".into()),
        phone: Set("+7 900 000-00-00".into()),
        address: Set(None),
        delivery_method: Set("pickup".into()),
        payment_method: Set("cash".into()),
        total_amount: Set(0),
        status: Set("canceled".into()),
        tracking_number: Set(None),
        comment: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
}

fn add(product_id: &str, quantity: i32) -> AddToCartRequest {
    AddToCartRequest {
        product_id: product_id.to_string(),
        quantity,
    }
}

fn qty(quantity: i32) -> UpdateCartItemRequest {
    UpdateCartItemRequest { quantity }
}

fn order_request() -> CreateOrderRequest {
    CreateOrderRequest {
        customer_name: "Anna".into(),
        phone: "+7 900 000-00-00".into(),
        delivery_method: DeliveryMethod::Courier,
        address: Some("Main st. 1".into()),
        payment_method: PaymentMethod::Card,
        comment: None,
    }
}

fn status(status: OrderStatus) -> UpdateOrderRequest {
    UpdateOrderRequest {
        status: Some(status),
        ..Default::default()
    }
}

async fn stock_of(state: &AppState, id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("product {id} missing"))?;
    Ok(product.stock)
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, cart_items, carts, audit_logs, products, categories, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState::new(orm, AppConfig::for_tests()))
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        name: Set("Test".into()),
        phone: Set(None),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role: user.role,
    })
}

async fn create_product(
    state: &AppState,
    article: &str,
    name: &str,
    price: i64,
    stock: i32,
    legacy_id: i64,
    category_id: Option<Uuid>,
) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        legacy_id: Set(Some(legacy_id)),
        article: Set(article.into()),
        name: Set(name.into()),
        description: Set(None),
        price: Set(price),
        stock: Set(stock),
        category_id: Set(category_id),
        images: Set(serde_json::json!([])),
        composition: Set(None),
        width_cm: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(product.id)
}
