//! Product repository for database operations

use common::error::{RepositoryError, RepositoryResult};
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    models::{NewProduct, Pagination, Product, ProductQuery, ProductUpdate},
    repositories::escape_like,
};

const PRODUCT_COLUMNS: &str = "id, user_id, name, category, unit_price, created_at, updated_at";

const PRODUCT_FILTER: &str = r#"
    WHERE user_id = $1
      AND deleted_at IS NULL
      AND ($2::text IS NULL OR LOWER(category) = LOWER($2))
      AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%')
"#;

/// How a product left the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Row removed
    Deleted,
    /// Still referenced by purchase lines; only marked deleted
    SoftDeleted,
}

/// Product repository for database operations
#[derive(Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    /// Create a new product repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List the caller's products ordered by name, with the unpaginated count
    #[instrument(skip(self, query))]
    pub async fn list(
        &self,
        user_id: Uuid,
        query: &ProductQuery,
        pagination: Pagination,
    ) -> RepositoryResult<(Vec<Product>, i64)> {
        let category = query.category();
        let search = query.search().map(escape_like);

        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products {} ORDER BY LOWER(name), id LIMIT $4 OFFSET $5",
            PRODUCT_COLUMNS, PRODUCT_FILTER
        ))
        .bind(user_id)
        .bind(category)
        .bind(search.as_deref())
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products {}", PRODUCT_FILTER))
                .bind(user_id)
                .bind(category)
                .bind(search.as_deref())
                .fetch_one(&self.pool)
                .await?;

        Ok((products, total))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, user_id: Uuid, id: Uuid) -> RepositoryResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create(&self, user_id: Uuid, product: &NewProduct) -> RepositoryResult<Product> {
        let created = sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (user_id, name, category, unit_price)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(user_id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.unit_price)
        .fetch_one(&self.pool)
        .await?;

        info!("Created product {}", created.id);
        Ok(created)
    }

    /// Apply the present fields of `update`
    #[instrument(skip(self, update))]
    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        update: &ProductUpdate,
    ) -> RepositoryResult<Product> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
            SET name = COALESCE($3, name),
                category = COALESCE($4, category),
                unit_price = COALESCE($5, unit_price),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(update.name.as_deref())
        .bind(update.category.as_deref())
        .bind(update.unit_price)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound("Product"))
    }

    /// Remove a product and any cart lines holding it
    ///
    /// Products that purchase lines still reference are soft-deleted so the
    /// ledger keeps its link.
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> RepositoryResult<DeleteOutcome> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM products
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            return Err(RepositoryError::NotFound("Product"));
        }

        sqlx::query("DELETE FROM cart_items WHERE product_id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let referenced: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM purchase_lines WHERE product_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let outcome = if referenced {
            sqlx::query("UPDATE products SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            DeleteOutcome::SoftDeleted
        } else {
            sqlx::query("DELETE FROM products WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            DeleteOutcome::Deleted
        };

        tx.commit().await?;

        info!("Deleted product {} ({:?})", id, outcome);
        Ok(outcome)
    }
}
