//! Purchase ledger repository
//!
//! Purchases and their lines are inserted once and never updated; deletion
//! only stamps `deleted_at`. Checkout runs in one transaction that locks the
//! caller's cart rows, so two concurrent checkouts cannot both see the items.

use std::collections::HashMap;

use common::{
    error::{RepositoryError, RepositoryResult},
    validation::FieldErrors,
};
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    models::{
        Pagination, PriceObservation, Purchase, PurchaseDraft, PurchaseFilter, PurchaseLine,
        PurchaseMeta, purchase::LineDraft,
    },
    repositories::escape_like,
    validation::validate_total,
};

const PURCHASE_COLUMNS: &str = "id, user_id, cart_name, store_name, currency, notes, tags, \
     items_count, total_amount, idempotency_key, completed_at";

const PURCHASE_FILTER: &str = r#"
    WHERE user_id = $1
      AND deleted_at IS NULL
      AND ($2::text IS NULL OR store_name ILIKE '%' || $2 || '%')
      AND ($3::text IS NULL OR currency = $3)
      AND ($4::numeric IS NULL OR total_amount >= $4)
      AND ($5::numeric IS NULL OR total_amount <= $5)
      AND ($6::timestamptz IS NULL OR completed_at >= $6)
      AND ($7::timestamptz IS NULL OR completed_at <= $7)
      AND ($8::text IS NULL OR $8 = ANY(tags))
"#;

const LINE_COLUMNS: &str = "id, purchase_id, product_id, name, unit_price, quantity, \
     unit_price * quantity AS line_total, position, created_at";

/// Result of recording a purchase under an idempotency key
#[derive(Debug)]
pub enum CreateOutcome {
    Created(Purchase),
    /// A purchase with the same key already existed
    Existing(Purchase),
}

impl CreateOutcome {
    pub fn into_inner(self) -> Purchase {
        match self {
            CreateOutcome::Created(purchase) | CreateOutcome::Existing(purchase) => purchase,
        }
    }
}

/// A cart line locked for checkout
#[derive(sqlx::FromRow)]
struct LockedCartLine {
    product_id: Uuid,
    name: String,
    unit_price: rust_decimal::Decimal,
    quantity: i32,
}

/// Purchase repository for database operations
#[derive(Clone)]
pub struct PurchaseRepository {
    pool: PgPool,
}

impl PurchaseRepository {
    /// Create a new purchase repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach lines to each purchase, ordered by position
    async fn load_lines(
        conn: &mut PgConnection,
        purchases: &mut [Purchase],
    ) -> RepositoryResult<()> {
        if purchases.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = purchases.iter().map(|purchase| purchase.id).collect();
        let lines = sqlx::query_as::<_, PurchaseLine>(&format!(
            "SELECT {} FROM purchase_lines WHERE purchase_id = ANY($1) ORDER BY position, id",
            LINE_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;

        let mut by_purchase: HashMap<Uuid, Vec<PurchaseLine>> = HashMap::new();
        for line in lines {
            by_purchase.entry(line.purchase_id).or_default().push(line);
        }
        for purchase in purchases.iter_mut() {
            purchase.items = by_purchase.remove(&purchase.id).unwrap_or_default();
        }
        Ok(())
    }

    /// Newest first, with the unpaginated count
    #[instrument(skip(self, filter))]
    pub async fn list(
        &self,
        user_id: Uuid,
        filter: &PurchaseFilter,
        pagination: Pagination,
    ) -> RepositoryResult<(Vec<Purchase>, i64)> {
        let mut conn = self.pool.acquire().await?;
        let store = filter.store.as_deref().map(escape_like);

        let mut purchases = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {} FROM purchases {} ORDER BY completed_at DESC, id DESC LIMIT $9 OFFSET $10",
            PURCHASE_COLUMNS, PURCHASE_FILTER
        ))
        .bind(user_id)
        .bind(store.as_deref())
        .bind(filter.currency.as_deref())
        .bind(filter.min_total)
        .bind(filter.max_total)
        .bind(filter.completed_after)
        .bind(filter.completed_before)
        .bind(filter.tag.as_deref())
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&mut *conn)
        .await?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM purchases {}", PURCHASE_FILTER))
                .bind(user_id)
                .bind(store.as_deref())
                .bind(filter.currency.as_deref())
                .bind(filter.min_total)
                .bind(filter.max_total)
                .bind(filter.completed_after)
                .bind(filter.completed_before)
                .bind(filter.tag.as_deref())
                .fetch_one(&mut *conn)
                .await?;

        Self::load_lines(&mut conn, &mut purchases).await?;
        Ok((purchases, total))
    }

    async fn fetch(
        conn: &mut PgConnection,
        user_id: Uuid,
        id: Uuid,
    ) -> RepositoryResult<Option<Purchase>> {
        let purchase = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {} FROM purchases WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
            PURCHASE_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        match purchase {
            Some(purchase) => {
                let mut purchases = [purchase];
                Self::load_lines(conn, &mut purchases).await?;
                let [purchase] = purchases;
                Ok(Some(purchase))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, user_id: Uuid, id: Uuid) -> RepositoryResult<Option<Purchase>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, user_id, id).await
    }

    /// Look up a live purchase by idempotency key
    async fn find_by_idempotency_key(
        conn: &mut PgConnection,
        user_id: Uuid,
        key: &str,
    ) -> RepositoryResult<Option<Purchase>> {
        let id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM purchases WHERE user_id = $1 AND idempotency_key = $2",
        )
        .bind(user_id)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

        match id {
            Some(id) => Self::fetch(conn, user_id, id).await,
            None => Ok(None),
        }
    }

    /// Stamp `deleted_at`; lines are left untouched
    #[instrument(skip(self))]
    pub async fn soft_delete(&self, user_id: Uuid, id: Uuid) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE purchases SET deleted_at = NOW()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("Purchase"));
        }
        info!("Soft-deleted purchase {}", id);
        Ok(())
    }

    /// Insert the purchase row and its lines
    async fn insert(
        conn: &mut PgConnection,
        user_id: Uuid,
        draft: &PurchaseDraft,
    ) -> RepositoryResult<Purchase> {
        let meta = &draft.meta;
        let mut purchase = sqlx::query_as::<_, Purchase>(&format!(
            r#"
            INSERT INTO purchases
                (user_id, cart_name, store_name, currency, notes, tags,
                 items_count, total_amount, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            PURCHASE_COLUMNS
        ))
        .bind(user_id)
        .bind(&meta.cart_name)
        .bind(&meta.store_name)
        .bind(&meta.currency)
        .bind(&meta.notes)
        .bind(&meta.tags)
        .bind(draft.items_count())
        .bind(draft.total())
        .bind(meta.idempotency_key.as_deref())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            RepositoryError::from_unique_violation(e, "Purchase with this idempotency key exists")
        })?;

        let mut product_ids = Vec::with_capacity(draft.lines.len());
        let mut names = Vec::with_capacity(draft.lines.len());
        let mut unit_prices = Vec::with_capacity(draft.lines.len());
        let mut quantities = Vec::with_capacity(draft.lines.len());
        let mut positions = Vec::with_capacity(draft.lines.len());
        for (position, line) in draft.lines.iter().enumerate() {
            product_ids.push(line.product_id);
            names.push(line.name.clone());
            unit_prices.push(line.unit_price);
            quantities.push(line.quantity);
            positions.push(position as i32);
        }

        let mut lines = sqlx::query_as::<_, PurchaseLine>(&format!(
            r#"
            INSERT INTO purchase_lines
                (purchase_id, product_id, name, unit_price, quantity, position)
            SELECT $1::uuid, *
            FROM UNNEST($2::uuid[], $3::text[], $4::numeric[], $5::int4[], $6::int4[])
            RETURNING {}
            "#,
            LINE_COLUMNS
        ))
        .bind(purchase.id)
        .bind(&product_ids)
        .bind(&names)
        .bind(&unit_prices)
        .bind(&quantities)
        .bind(&positions)
        .fetch_all(&mut *conn)
        .await?;
        lines.sort_by_key(|line| line.position);
        purchase.items = lines;

        Ok(purchase)
    }

    /// Record a purchase from explicit lines
    ///
    /// Referenced products must belong to the caller. With an idempotency key
    /// that was already used, the earlier purchase is returned unchanged.
    #[instrument(skip(self, draft), fields(lines = draft.lines.len()))]
    pub async fn create(
        &self,
        user_id: Uuid,
        draft: &PurchaseDraft,
    ) -> RepositoryResult<CreateOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Some(key) = &draft.meta.idempotency_key {
            if let Some(existing) = Self::find_by_idempotency_key(&mut tx, user_id, key).await? {
                info!("Idempotent replay of purchase {}", existing.id);
                return Ok(CreateOutcome::Existing(existing));
            }
        }

        let product_ids = draft.product_ids();
        if !product_ids.is_empty() {
            let owned: Vec<Uuid> = sqlx::query_scalar(
                r#"
                SELECT id FROM products
                WHERE user_id = $1 AND id = ANY($2) AND deleted_at IS NULL
                FOR SHARE
                "#,
            )
            .bind(user_id)
            .bind(&product_ids)
            .fetch_all(&mut *tx)
            .await?;
            if owned.len() != product_ids.len() {
                return Err(RepositoryError::NotFound("Product"));
            }
        }

        match Self::insert(&mut tx, user_id, draft).await {
            Ok(purchase) => {
                tx.commit().await?;
                info!(
                    "Recorded purchase {} totalling {}",
                    purchase.id, purchase.total_amount
                );
                Ok(CreateOutcome::Created(purchase))
            }
            Err(RepositoryError::Conflict(message)) => {
                // A concurrent request with the same key won the race
                tx.rollback().await?;
                let key = draft.meta.idempotency_key.as_deref().unwrap_or_default();
                let mut conn = self.pool.acquire().await?;
                match Self::find_by_idempotency_key(&mut conn, user_id, key).await? {
                    Some(existing) => Ok(CreateOutcome::Existing(existing)),
                    None => Err(RepositoryError::Conflict(message)),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Turn the caller's cart into a purchase and empty the cart
    #[instrument(skip(self, meta))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        meta: &PurchaseMeta,
    ) -> RepositoryResult<CreateOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = Self::checkout_in(&mut tx, user_id, meta).await?;
        tx.commit().await?;

        if let CreateOutcome::Created(purchase) = &outcome {
            info!(
                "Checked out cart into purchase {} totalling {}",
                purchase.id, purchase.total_amount
            );
        }
        Ok(outcome)
    }

    /// Checkout steps on an open transaction; the caller commits or rolls back
    pub async fn checkout_in(
        conn: &mut PgConnection,
        user_id: Uuid,
        meta: &PurchaseMeta,
    ) -> RepositoryResult<CreateOutcome> {
        if let Some(key) = &meta.idempotency_key {
            if let Some(existing) = Self::find_by_idempotency_key(conn, user_id, key).await? {
                return Ok(CreateOutcome::Existing(existing));
            }
        }

        let cart = sqlx::query_as::<_, LockedCartLine>(
            r#"
            SELECT ci.product_id, p.name, p.unit_price, ci.quantity
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.user_id = $1 AND p.deleted_at IS NULL
            ORDER BY ci.created_at, ci.id
            FOR UPDATE OF ci
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

        if cart.is_empty() {
            // A concurrent checkout under the same key may have emptied the
            // cart while this one waited on the lock
            if let Some(key) = &meta.idempotency_key {
                if let Some(existing) = Self::find_by_idempotency_key(conn, user_id, key).await? {
                    info!("Idempotent replay of checkout {}", existing.id);
                    return Ok(CreateOutcome::Existing(existing));
                }
            }
            warn!("Checkout of an empty cart");
            return Err(RepositoryError::Validation(FieldErrors::single(
                "cart",
                "Cart is empty",
            )));
        }

        let draft = PurchaseDraft {
            meta: meta.clone(),
            lines: cart
                .into_iter()
                .map(|line| LineDraft {
                    product_id: Some(line.product_id),
                    name: line.name,
                    unit_price: line.unit_price,
                    quantity: line.quantity,
                })
                .collect(),
        };

        if let Err(message) = validate_total(draft.total()) {
            warn!("Cart total {} exceeds the ledger limit", draft.total());
            return Err(RepositoryError::Validation(FieldErrors::single("cart", message)));
        }

        let purchase = Self::insert(conn, user_id, &draft).await?;

        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        Ok(CreateOutcome::Created(purchase))
    }

    /// Lines of live purchases, oldest first, optionally narrowed
    #[instrument(skip(self))]
    pub async fn price_observations(
        &self,
        user_id: Uuid,
        product_id: Option<Uuid>,
        name: Option<&str>,
    ) -> RepositoryResult<Vec<PriceObservation>> {
        let observations = sqlx::query_as::<_, PriceObservation>(
            r#"
            SELECT pl.product_id, pl.name, p.id AS purchase_id, p.completed_at AS purchased_at,
                   pl.unit_price, pl.quantity, p.currency
            FROM purchase_lines pl
            JOIN purchases p ON p.id = pl.purchase_id
            WHERE p.user_id = $1
              AND p.deleted_at IS NULL
              AND ($2::uuid IS NULL OR pl.product_id = $2)
              AND ($3::text IS NULL OR pl.name ILIKE '%' || $3 || '%')
            ORDER BY p.completed_at, pl.position
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(name.map(escape_like))
        .fetch_all(&self.pool)
        .await?;
        Ok(observations)
    }
}
