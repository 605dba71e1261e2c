use chrono::Utc;
use fabric_store_api::{
    config::AppConfig,
    db::{OrmConn, create_orm_conn, run_migrations},
    entity::{
        categories::{ActiveModel as CategoryActive, Column as CategoryCol, Entity as Categories},
        products::{ActiveModel as ProductActive, Column as ProductCol, Entity as Products},
        settings::{ActiveModel as SettingsActive, Entity as SettingsEntity},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    models::{ROLE_ADMIN, ROLE_USER},
    services::{auth_service::hash_password, settings_service::SETTINGS_ID},
};
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

struct SeedFabric {
    legacy_id: i64,
    article: &'static str,
    name: &'static str,
    category: &'static str,
    price: i64,
    stock: i32,
    composition: &'static str,
    width_cm: i32,
}

const CATEGORIES: &[(&str, &str)] = &[
    ("Cotton", "cotton"),
    ("Linen", "linen"),
    ("Silk", "silk"),
    ("Wool", "wool"),
];

const FABRICS: &[SeedFabric] = &[
    SeedFabric {
        legacy_id: 1001,
        article: "LN-0850",
        name: "Washed linen, natural",
        category: "linen",
        price: 850,
        stock: 40,
        composition: "100% linen",
        width_cm: 150,
    },
    SeedFabric {
        legacy_id: 1002,
        article: "SK-1200",
        name: "Silk crepe de chine, ivory",
        category: "silk",
        price: 1200,
        stock: 15,
        composition: "100% silk",
        width_cm: 140,
    },
    SeedFabric {
        legacy_id: 1003,
        article: "CT-0420",
        name: "Cotton poplin, navy",
        category: "cotton",
        price: 420,
        stock: 120,
        composition: "100% cotton",
        width_cm: 145,
    },
    SeedFabric {
        legacy_id: 1004,
        article: "WL-1890",
        name: "Wool coating, camel",
        category: "wool",
        price: 1890,
        stock: 8,
        composition: "80% wool, 20% polyamide",
        width_cm: 150,
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "admin@example.com", "admin123", ROLE_ADMIN).await?;
    let user_id = ensure_user(&orm, "user@example.com", "user123", ROLE_USER).await?;
    seed_categories(&orm).await?;
    seed_fabrics(&orm).await?;
    seed_settings(&orm).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(orm: &OrmConn, email: &str, password: &str, role: &str) -> anyhow::Result<Uuid> {
    if let Some(existing) = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(orm)
        .await?
    {
        let mut active: UserActive = existing.into();
        active.role = Set(role.to_string());
        let user = active.update(orm).await?;
        println!("Ensured user {email} (role={role})");
        return Ok(user.id);
    }

    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        name: Set(email.split('@').next().unwrap_or_default().to_string()),
        phone: Set(None),
        password_hash: Set(password_hash),
        role: Set(role.to_string()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(orm)
    .await?;

    println!("Created user {email} (role={role})");
    Ok(user.id)
}

async fn seed_categories(orm: &OrmConn) -> anyhow::Result<()> {
    for (name, slug) in CATEGORIES {
        let exists = Categories::find()
            .filter(CategoryCol::Slug.eq(*slug))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }
        CategoryActive {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            slug: Set(slug.to_string()),
            description: Set(None),
            image: Set(None),
            created_at: NotSet,
        }
        .insert(orm)
        .await?;
        println!("Inserted category {slug}");
    }
    Ok(())
}

async fn seed_fabrics(orm: &OrmConn) -> anyhow::Result<()> {
    for fabric in FABRICS {
        let exists = Products::find()
            .filter(ProductCol::Article.eq(fabric.article))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }

        let category_id = Categories::find()
            .filter(CategoryCol::Slug.eq(fabric.category))
            .one(orm)
            .await?
            .map(|c| c.id);

        ProductActive {
            id: Set(Uuid::new_v4()),
            legacy_id: Set(Some(fabric.legacy_id)),
            article: Set(fabric.article.to_string()),
            name: Set(fabric.name.to_string()),
            description: Set(None),
            price: Set(fabric.price),
            stock: Set(fabric.stock),
            category_id: Set(category_id),
            images: Set(serde_json::json!([])),
            composition: Set(Some(fabric.composition.to_string())),
            width_cm: Set(Some(fabric.width_cm)),
            created_at: NotSet,
            updated_at: NotSet,
        }
        .insert(orm)
        .await?;
        println!("Inserted fabric {}", fabric.article);
    }
    Ok(())
}

async fn seed_settings(orm: &OrmConn) -> anyhow::Result<()> {
    let Some(existing) = SettingsEntity::find_by_id(SETTINGS_ID).one(orm).await? else {
        anyhow::bail!("settings row missing; migrations did not run");
    };
    if existing.phone.is_some() {
        return Ok(());
    }

    let mut active: SettingsActive = existing.into();
    active.phone = Set(Some("+7 900 000-00-00".to_string()));
    active.email = Set(Some("shop@example.com".to_string()));
    active.working_hours = Set(Some("Mon-Sat 10:00-19:00".to_string()));
    active.delivery_info = Set(Some(
        "Pickup from the store, courier within the city, or post.".to_string(),
    ));
    active.updated_at = Set(Utc::now().into());
    active.update(orm).await?;
    println!("Default settings filled");
    Ok(())
}
