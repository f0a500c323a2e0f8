//! Database tests for the catalog, cart and purchase ledger
//!
//! Each test gets a fresh database from `#[sqlx::test]` with the workspace
//! migrations applied. They need a PostgreSQL server on `DATABASE_URL`.

use api::{
    AppState, analysis,
    models::{
        NewProduct, Pagination, ProductQuery, ProductUpdate, PurchaseFilter,
        purchase::{DEFAULT_CART_NAME, LineDraft, PurchaseDetails, PurchaseDraft, PurchaseMeta},
    },
    repositories::{
        CartRepository, CreateOutcome, DeleteOutcome, ProductRepository, PurchaseRepository,
    },
    routes::create_router,
};
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use common::{error::RepositoryError, jwt::testing};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

async fn create_user(pool: &PgPool, email: &str) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO users (email, password_hash) VALUES ($1, 'not-a-real-hash') RETURNING id",
    )
    .bind(email)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn create_product(pool: &PgPool, user_id: Uuid, name: &str, cents: i64) -> Uuid {
    ProductRepository::new(pool.clone())
        .create(
            user_id,
            &NewProduct {
                name: name.to_string(),
                category: "groceries".to_string(),
                unit_price: Decimal::new(cents, 2),
            },
        )
        .await
        .unwrap()
        .id
}

fn checkout_meta() -> PurchaseMeta {
    PurchaseDetails::default()
        .validate(Some(DEFAULT_CART_NAME), None)
        .unwrap()
}

async fn purchase_count(pool: &PgPool, user_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM purchases WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Cart of 2 x 5.00 and 1 x 3.00
async fn fill_cart(pool: &PgPool, user_id: Uuid) -> (Uuid, Uuid) {
    let a = create_product(pool, user_id, "Product A", 500).await;
    let b = create_product(pool, user_id, "Product B", 300).await;
    let cart = CartRepository::new(pool.clone());
    cart.add(user_id, a, 2).await.unwrap();
    cart.add(user_id, b, 1).await.unwrap();
    (a, b)
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn products_are_scoped_to_their_owner(pool: PgPool) {
    let alice = create_user(&pool, "alice@example.com").await;
    let bob = create_user(&pool, "bob@example.com").await;
    let product = create_product(&pool, alice, "Coffee", 799).await;
    let products = ProductRepository::new(pool.clone());

    let (alice_items, alice_total) = products
        .list(alice, &ProductQuery::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(alice_total, 1);
    assert_eq!(alice_items[0].id, product);

    let (bob_items, bob_total) = products
        .list(bob, &ProductQuery::default(), Pagination::default())
        .await
        .unwrap();
    assert!(bob_items.is_empty());
    assert_eq!(bob_total, 0);

    assert!(products.get(bob, product).await.unwrap().is_none());
    assert!(matches!(
        products
            .update(bob, product, &ProductUpdate::default())
            .await,
        Err(RepositoryError::NotFound("Product"))
    ));
    assert!(matches!(
        products.delete(bob, product).await,
        Err(RepositoryError::NotFound("Product"))
    ));
    assert!(matches!(
        CartRepository::new(pool.clone()).add(bob, product, 1).await,
        Err(RepositoryError::NotFound("Product"))
    ));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn product_list_filters_and_pages(pool: PgPool) {
    let user = create_user(&pool, "filter@example.com").await;
    for name in ["Apples", "Bananas", "Green apples", "Milk"] {
        create_product(&pool, user, name, 100).await;
    }
    let products = ProductRepository::new(pool.clone());

    let query = ProductQuery {
        search: Some("APPLE".to_string()),
        ..Default::default()
    };
    let (items, total) = products
        .list(user, &query, Pagination::default())
        .await
        .unwrap();
    assert_eq!(total, 2);
    let names: Vec<&str> = items.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Apples", "Green apples"]);

    let (page, total) = products
        .list(user, &ProductQuery::default(), Pagination::new(Some(2), Some(3)))
        .await
        .unwrap();
    assert_eq!(total, 4);
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].name, "Milk");
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn adding_the_same_product_increments(pool: PgPool) {
    let user = create_user(&pool, "cart@example.com").await;
    let product = create_product(&pool, user, "Eggs", 250).await;
    let cart = CartRepository::new(pool.clone());

    cart.add(user, product, 2).await.unwrap();
    let item = cart.add(user, product, 3).await.unwrap();

    assert_eq!(item.quantity, 5);
    assert_eq!(item.line_total, Decimal::new(1250, 2));
    assert_eq!(cart.list(user).await.unwrap().len(), 1);

    let item = cart.set_quantity(user, product, 1).await.unwrap();
    assert_eq!(item.quantity, 1);

    cart.remove(user, product).await.unwrap();
    assert!(matches!(
        cart.remove(user, product).await,
        Err(RepositoryError::NotFound("Cart item"))
    ));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn deleted_products_cannot_be_added_to_the_cart(pool: PgPool) {
    let user = create_user(&pool, "stale@example.com").await;
    let product = create_product(&pool, user, "Discontinued", 199).await;
    sqlx::query("UPDATE products SET deleted_at = NOW() WHERE id = $1")
        .bind(product)
        .execute(&pool)
        .await
        .unwrap();

    let cart = CartRepository::new(pool.clone());
    assert!(matches!(
        cart.add(user, product, 1).await,
        Err(RepositoryError::NotFound("Product"))
    ));
    assert!(cart.list(user).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn checkout_records_snapshot_and_empties_cart(pool: PgPool) {
    let user = create_user(&pool, "checkout@example.com").await;
    fill_cart(&pool, user).await;
    let purchases = PurchaseRepository::new(pool.clone());

    let purchase = purchases
        .checkout(user, &checkout_meta())
        .await
        .unwrap()
        .into_inner();

    assert_eq!(purchase.total_amount, Decimal::new(1300, 2));
    assert_eq!(purchase.total_amount.to_string(), "13.00");
    assert_eq!(purchase.items_count, 2);
    assert_eq!(purchase.items.len(), 2);
    assert_eq!(purchase.cart_name, "Cart");
    assert_eq!(purchase.currency, "EUR");

    let line_sum: Decimal = purchase.items.iter().map(|line| line.line_total).sum();
    assert_eq!(line_sum, purchase.total_amount);

    assert!(CartRepository::new(pool.clone()).list(user).await.unwrap().is_empty());
    assert_eq!(purchase_count(&pool, user).await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn checkout_rolled_back_leaves_no_trace(pool: PgPool) {
    let user = create_user(&pool, "rollback@example.com").await;
    fill_cart(&pool, user).await;

    let mut tx = pool.begin().await.unwrap();
    let outcome = PurchaseRepository::checkout_in(&mut tx, user, &checkout_meta())
        .await
        .unwrap();
    assert!(matches!(outcome, CreateOutcome::Created(_)));
    tx.rollback().await.unwrap();

    assert_eq!(CartRepository::new(pool.clone()).list(user).await.unwrap().len(), 2);
    assert_eq!(purchase_count(&pool, user).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn concurrent_checkouts_record_one_purchase(pool: PgPool) {
    let user = create_user(&pool, "race@example.com").await;
    fill_cart(&pool, user).await;
    let purchases = PurchaseRepository::new(pool.clone());

    let meta = checkout_meta();
    let (first, second) = tokio::join!(
        purchases.checkout(user, &meta),
        purchases.checkout(user, &meta)
    );

    let created = [&first, &second]
        .iter()
        .filter(|result| matches!(result, Ok(CreateOutcome::Created(_))))
        .count();
    let rejected = [&first, &second]
        .iter()
        .filter(|result| matches!(result, Err(RepositoryError::Validation(_))))
        .count();
    assert_eq!((created, rejected), (1, 1));
    assert_eq!(purchase_count(&pool, user).await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn concurrent_checkouts_with_one_key_replay_the_purchase(pool: PgPool) {
    let user = create_user(&pool, "retry@example.com").await;
    fill_cart(&pool, user).await;
    let purchases = PurchaseRepository::new(pool.clone());

    let meta = PurchaseDetails {
        idempotency_key: Some("k1".to_string()),
        ..Default::default()
    }
    .validate(Some(DEFAULT_CART_NAME), None)
    .unwrap();
    let (first, second) = tokio::join!(
        purchases.checkout(user, &meta),
        purchases.checkout(user, &meta)
    );

    let (created, existing) = match (first.unwrap(), second.unwrap()) {
        (CreateOutcome::Created(created), CreateOutcome::Existing(existing))
        | (CreateOutcome::Existing(existing), CreateOutcome::Created(created)) => {
            (created, existing)
        }
        other => panic!("expected one created and one replayed purchase, got {:?}", other),
    };
    assert_eq!(created.id, existing.id);
    assert_eq!(existing.total_amount, Decimal::new(1300, 2));
    assert_eq!(existing.items.len(), 2);
    assert_eq!(purchase_count(&pool, user).await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn oversized_cart_total_is_a_validation_error(pool: PgPool) {
    let user = create_user(&pool, "bulk@example.com").await;
    let product = create_product(&pool, user, "Gold bar", 9_999_999_999).await;
    let cart = CartRepository::new(pool.clone());
    cart.add(user, product, 1000).await.unwrap();

    let result = PurchaseRepository::new(pool.clone())
        .checkout(user, &checkout_meta())
        .await;

    match result {
        Err(RepositoryError::Validation(fields)) => assert_eq!(
            fields.get("cart").unwrap()[0],
            "Total must be at most 9999999999.99"
        ),
        other => panic!("expected a validation error, got {:?}", other),
    }
    assert_eq!(cart.list(user).await.unwrap().len(), 1);
    assert_eq!(purchase_count(&pool, user).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn empty_cart_cannot_be_checked_out(pool: PgPool) {
    let user = create_user(&pool, "empty@example.com").await;

    let result = PurchaseRepository::new(pool.clone())
        .checkout(user, &checkout_meta())
        .await;

    match result {
        Err(RepositoryError::Validation(fields)) => {
            assert_eq!(fields.get("cart").unwrap()[0], "Cart is empty")
        }
        other => panic!("expected a validation error, got {:?}", other),
    }
    assert_eq!(purchase_count(&pool, user).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn snapshot_price_survives_product_updates(pool: PgPool) {
    let user = create_user(&pool, "snapshot@example.com").await;
    let (a, _) = fill_cart(&pool, user).await;
    let purchases = PurchaseRepository::new(pool.clone());
    let purchase = purchases
        .checkout(user, &checkout_meta())
        .await
        .unwrap()
        .into_inner();

    ProductRepository::new(pool.clone())
        .update(
            user,
            a,
            &ProductUpdate {
                name: Some("Renamed".to_string()),
                unit_price: Some(Decimal::new(999, 2)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let reloaded = purchases.get(user, purchase.id).await.unwrap().unwrap();
    let line = reloaded
        .items
        .iter()
        .find(|line| line.product_id == Some(a))
        .unwrap();
    assert_eq!(line.unit_price, Decimal::new(500, 2));
    assert_eq!(line.name, "Product A");
    assert_eq!(reloaded.total_amount, Decimal::new(1300, 2));

    let rewrite = sqlx::query("UPDATE purchase_lines SET unit_price = 0 WHERE id = $1")
        .bind(line.id)
        .execute(&pool)
        .await;
    assert!(rewrite.is_err());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn referenced_products_are_soft_deleted(pool: PgPool) {
    let user = create_user(&pool, "delete@example.com").await;
    let (a, b) = fill_cart(&pool, user).await;
    let purchases = PurchaseRepository::new(pool.clone());
    let products = ProductRepository::new(pool.clone());

    purchases
        .create(
            user,
            &PurchaseDraft {
                meta: checkout_meta(),
                lines: vec![LineDraft {
                    product_id: Some(a),
                    name: "Product A".to_string(),
                    unit_price: Decimal::new(500, 2),
                    quantity: 1,
                }],
            },
        )
        .await
        .unwrap();

    assert_eq!(products.delete(user, a).await.unwrap(), DeleteOutcome::SoftDeleted);
    assert_eq!(products.delete(user, b).await.unwrap(), DeleteOutcome::Deleted);

    assert!(products.get(user, a).await.unwrap().is_none());
    assert!(CartRepository::new(pool.clone()).list(user).await.unwrap().is_empty());

    let soft_deleted: bool =
        sqlx::query_scalar("SELECT deleted_at IS NOT NULL FROM products WHERE id = $1")
            .bind(a)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(soft_deleted);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn idempotency_key_returns_the_first_purchase(pool: PgPool) {
    let user = create_user(&pool, "idem@example.com").await;
    let purchases = PurchaseRepository::new(pool.clone());
    let draft = PurchaseDraft {
        meta: PurchaseMeta {
            idempotency_key: Some("trip-1".to_string()),
            ..checkout_meta()
        },
        lines: vec![LineDraft {
            product_id: None,
            name: "Bread".to_string(),
            unit_price: Decimal::new(210, 2),
            quantity: 1,
        }],
    };

    let first = purchases.create(user, &draft).await.unwrap();
    let second = purchases.create(user, &draft).await.unwrap();

    let first = match first {
        CreateOutcome::Created(purchase) => purchase,
        CreateOutcome::Existing(_) => panic!("first call must create"),
    };
    match second {
        CreateOutcome::Existing(purchase) => assert_eq!(purchase.id, first.id),
        CreateOutcome::Created(_) => panic!("second call must replay"),
    }
    assert_eq!(purchase_count(&pool, user).await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn foreign_product_cannot_be_referenced(pool: PgPool) {
    let alice = create_user(&pool, "owner@example.com").await;
    let mallory = create_user(&pool, "mallory@example.com").await;
    let product = create_product(&pool, alice, "Saffron", 1299).await;

    let result = PurchaseRepository::new(pool.clone())
        .create(
            mallory,
            &PurchaseDraft {
                meta: checkout_meta(),
                lines: vec![LineDraft {
                    product_id: Some(product),
                    name: "Saffron".to_string(),
                    unit_price: Decimal::new(1, 2),
                    quantity: 1,
                }],
            },
        )
        .await;

    assert!(matches!(result, Err(RepositoryError::NotFound("Product"))));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn soft_deleted_purchases_leave_history(pool: PgPool) {
    let user = create_user(&pool, "history@example.com").await;
    let other = create_user(&pool, "other@example.com").await;
    let (a, _) = fill_cart(&pool, user).await;
    let purchases = PurchaseRepository::new(pool.clone());

    let first = purchases
        .checkout(user, &checkout_meta())
        .await
        .unwrap()
        .into_inner();

    ProductRepository::new(pool.clone())
        .update(
            user,
            a,
            &ProductUpdate {
                unit_price: Some(Decimal::new(600, 2)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    CartRepository::new(pool.clone()).add(user, a, 1).await.unwrap();
    purchases.checkout(user, &checkout_meta()).await.unwrap();

    let series = analysis::build_series(
        purchases.price_observations(user, Some(a), None).await.unwrap(),
    );
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].points.len(), 2);
    assert_eq!(series[0].summary.change, Decimal::new(100, 2));

    assert!(purchases.price_observations(other, Some(a), None).await.unwrap().is_empty());

    purchases.soft_delete(user, first.id).await.unwrap();
    assert!(purchases.get(user, first.id).await.unwrap().is_none());

    let (listed, total) = purchases
        .list(user, &PurchaseFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_ne!(listed[0].id, first.id);

    let series = analysis::build_series(
        purchases.price_observations(user, Some(a), None).await.unwrap(),
    );
    assert_eq!(series[0].points.len(), 1);
    assert_eq!(series[0].points[0].unit_price, Decimal::new(600, 2));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn purchase_list_filters(pool: PgPool) {
    let user = create_user(&pool, "filters@example.com").await;
    let purchases = PurchaseRepository::new(pool.clone());

    for (store, currency, cents, tags) in [
        ("Corner Shop", "EUR", 1_000, vec!["weekly".to_string()]),
        ("Big Market", "USD", 5_000, vec![]),
        ("corner shop", "EUR", 2_500, vec!["party".to_string()]),
    ] {
        let mut meta = checkout_meta();
        meta.store_name = store.to_string();
        meta.currency = currency.to_string();
        meta.tags = tags;
        purchases
            .create(
                user,
                &PurchaseDraft {
                    meta,
                    lines: vec![LineDraft {
                        product_id: None,
                        name: "Item".to_string(),
                        unit_price: Decimal::new(cents, 2),
                        quantity: 1,
                    }],
                },
            )
            .await
            .unwrap();
    }

    let count = |filter: PurchaseFilter| {
        let purchases = purchases.clone();
        async move {
            purchases
                .list(user, &filter, Pagination::default())
                .await
                .unwrap()
                .1
        }
    };

    assert_eq!(
        count(PurchaseFilter {
            store: Some("CORNER".to_string()),
            ..Default::default()
        })
        .await,
        2
    );
    assert_eq!(
        count(PurchaseFilter {
            currency: Some("USD".to_string()),
            ..Default::default()
        })
        .await,
        1
    );
    assert_eq!(
        count(PurchaseFilter {
            min_total: Some(Decimal::new(2_000, 2)),
            max_total: Some(Decimal::new(3_000, 2)),
            ..Default::default()
        })
        .await,
        1
    );
    assert_eq!(
        count(PurchaseFilter {
            tag: Some("weekly".to_string()),
            ..Default::default()
        })
        .await,
        1
    );
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn checkout_over_http(pool: PgPool) {
    let user = create_user(&pool, "http@example.com").await;
    let app = create_router(AppState::new(pool.clone(), testing::verifier()));
    let token = testing::service().generate_access_token(user).unwrap();

    let send = |method: &str, uri: &str, body: Value| {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };
    async fn read(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    let mut ids = Vec::new();
    for (name, price) in [("Product A", "5.00"), ("Product B", "3.00")] {
        let response = app
            .clone()
            .oneshot(send("POST", "/products/", json!({ "name": name, "unit_price": price })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        ids.push(read(response).await["id"].as_str().unwrap().to_string());
    }

    for (id, quantity) in ids.iter().zip([2, 1]) {
        let response = app
            .clone()
            .oneshot(send("POST", "/cart/", json!({ "product_id": id, "quantity": quantity })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let cart = read(
        app.clone()
            .oneshot(send("GET", "/cart/", json!(null)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(cart["total"], "13.00");

    let response = app
        .clone()
        .oneshot(send("POST", "/cart/checkout/", json!({ "store_name": "Corner shop" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let purchase = read(response).await;
    assert_eq!(purchase["total_amount"], "13.00");
    assert_eq!(purchase["items"].as_array().unwrap().len(), 2);

    let response = app
        .clone()
        .oneshot(send("POST", "/cart/checkout/", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let stranger = testing::service()
        .generate_access_token(Uuid::new_v4())
        .unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/purchases/{}/", purchase["id"].as_str().unwrap()))
                .header(header::AUTHORIZATION, format!("Bearer {}", stranger))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
