use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{AddToCartRequest, CartLine, CartView, UpdateCartItemRequest},
        categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
        contact::ContactRequest,
        orders::{CreateOrderRequest, OrderList, OrderWithItems, UpdateOrderRequest},
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
        settings::UpdateSettingsRequest,
        stats::{CategoryRevenue, OrderStats, ProductRevenue, WeeklyRevenue},
        upload::UploadResponse,
        users::{UpdateProfileRequest, UpdateUserRoleRequest, UserList},
    },
    models::{
        Category, DeliveryMethod, Order, OrderItem, OrderStatus, PaymentMethod, Product, Settings,
        User,
    },
    response::{ApiResponse, Meta},
    routes::{
        auth, cart, categories, contact, health, orders, params, products, settings, upload, users,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "session_cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("token"))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::logout,
        auth::me,
        users::list_users,
        users::get_user,
        users::update_user_role,
        users::delete_user,
        users::get_profile,
        users::update_profile,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        cart::get_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        cart::clear_cart,
        orders::create_order,
        orders::list_orders,
        orders::order_stats,
        orders::get_order,
        orders::update_order,
        orders::delete_order,
        settings::get_settings,
        settings::update_settings,
        upload::upload_image,
        upload::serve_upload,
        contact::submit_contact
    ),
    components(
        schemas(
            User,
            Category,
            Product,
            Order,
            OrderItem,
            Settings,
            OrderStatus,
            DeliveryMethod,
            PaymentMethod,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartView,
            CartLine,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryList,
            CreateOrderRequest,
            UpdateOrderRequest,
            OrderList,
            OrderWithItems,
            OrderStats,
            WeeklyRevenue,
            ProductRevenue,
            CategoryRevenue,
            UpdateProfileRequest,
            UpdateUserRoleRequest,
            UserList,
            UpdateSettingsRequest,
            UploadResponse,
            ContactRequest,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::UserListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartView>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<OrderStats>
        )
    ),
    security(
        ("bearer_auth" = []),
        ("session_cookie" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration and sessions"),
        (name = "Users", description = "Profiles and admin user management"),
        (name = "Products", description = "Fabric catalog"),
        (name = "Categories", description = "Catalog categories"),
        (name = "Cart", description = "Shopping cart"),
        (name = "Orders", description = "Checkout, order management and statistics"),
        (name = "Settings", description = "Store reference data"),
        (name = "Upload", description = "Product images"),
        (name = "Contact", description = "Contact form"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_store_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/cart",
            "/api/cart/{product}",
            "/api/orders",
            "/api/orders/stats",
            "/api/products/{key}",
            "/api/upload",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
