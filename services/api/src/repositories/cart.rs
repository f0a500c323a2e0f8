//! Cart repository for database operations

use common::{
    error::{RepositoryError, RepositoryResult},
    validation::FieldErrors,
};
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{models::CartItem, validation::QUANTITY_MAX};

const CART_ITEM_SELECT: &str = r#"
    SELECT ci.product_id, p.name, p.category, p.unit_price, ci.quantity,
           p.unit_price * ci.quantity AS line_total,
           ci.created_at AS added_at, ci.updated_at
    FROM cart_items ci
    JOIN products p ON p.id = ci.product_id
"#;

/// Cart repository for database operations
#[derive(Clone)]
pub struct CartRepository {
    pool: PgPool,
}

impl CartRepository {
    /// Create a new cart repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lines of the caller's cart in the order they were added
    #[instrument(skip(self))]
    pub async fn list(&self, user_id: Uuid) -> RepositoryResult<Vec<CartItem>> {
        let items = sqlx::query_as::<_, CartItem>(&format!(
            "{} WHERE ci.user_id = $1 AND p.deleted_at IS NULL ORDER BY ci.created_at, ci.id",
            CART_ITEM_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn find(
        conn: &mut PgConnection,
        user_id: Uuid,
        product_id: Uuid,
    ) -> RepositoryResult<CartItem> {
        sqlx::query_as::<_, CartItem>(&format!(
            "{} WHERE ci.user_id = $1 AND ci.product_id = $2 AND p.deleted_at IS NULL",
            CART_ITEM_SELECT
        ))
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound("Cart item"))
    }

    /// Add `quantity` of a product, incrementing an existing line
    #[instrument(skip(self))]
    pub async fn add(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> RepositoryResult<CartItem> {
        let mut tx = self.pool.begin().await?;

        // Shared lock; a concurrent product delete waits for the upsert
        let owned: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM products
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            FOR SHARE
            "#,
        )
        .bind(product_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if owned.is_none() {
            return Err(RepositoryError::NotFound("Product"));
        }

        // The upsert yields no row when the increment would pass the cap
        let updated: Option<i32> = sqlx::query_scalar(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id) DO UPDATE
            SET quantity = cart_items.quantity + EXCLUDED.quantity,
                updated_at = NOW()
            WHERE cart_items.quantity + EXCLUDED.quantity <= $4
            RETURNING quantity
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .bind(QUANTITY_MAX as i32)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_unique_violation(e, "Cart item already exists"))?;

        if updated.is_none() {
            return Err(RepositoryError::Validation(FieldErrors::single(
                "quantity",
                format!("Quantity must be at most {}", QUANTITY_MAX),
            )));
        }

        let item = Self::find(&mut tx, user_id, product_id).await?;
        tx.commit().await?;

        info!("Added {} x {} to cart", quantity, product_id);
        Ok(item)
    }

    /// Replace the quantity of an existing line
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> RepositoryResult<CartItem> {
        let result = sqlx::query(
            r#"
            UPDATE cart_items
            SET quantity = $3, updated_at = NOW()
            WHERE user_id = $1 AND product_id = $2
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("Cart item"));
        }
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, user_id, product_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, product_id: Uuid) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("Cart item"));
        }
        Ok(())
    }

    /// Empty the cart; returns the number of lines removed
    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        info!("Cleared {} cart lines", result.rows_affected());
        Ok(result.rows_affected())
    }
}
