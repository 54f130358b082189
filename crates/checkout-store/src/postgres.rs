use std::collections::HashMap;

use async_trait::async_trait;
use common::{CartId, GuestKey, Money, OrderId, ProductId, UserId};
use domain::{
    Cart, CartItem, CartOwner, CartStatus, CreateOrderInput, CustomerType, DomainError, Order,
    OrderItem, OrderStatus, PaymentMethod, order_number,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{CheckoutStore, OrderQuery},
};

/// PostgreSQL-backed checkout store.
///
/// The pool is constructed by the caller and passed in; the store holds
/// no global state. Every mutating cart operation runs its item write
/// and totals recalculation in one transaction.
#[derive(Clone)]
pub struct PostgresCheckoutStore {
    pool: PgPool,
}

impl PostgresCheckoutStore {
    /// Creates a new PostgreSQL checkout store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the given database URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

fn row_to_cart_header(row: &PgRow) -> Result<Cart> {
    let status_raw: String = row.try_get("status")?;
    let status = CartStatus::parse(&status_raw).ok_or(StoreError::InvalidColumn {
        column: "carts.status",
        value: status_raw,
    })?;

    Ok(Cart {
        id: CartId::new(row.try_get("id")?),
        user_id: row.try_get::<Option<i64>, _>("user_id")?.map(UserId::new),
        guest_key: row
            .try_get::<Option<Uuid>, _>("guest_key")?
            .map(GuestKey::from_uuid),
        status,
        currency: row.try_get("currency")?,
        subtotal: Money::from_minor(row.try_get("subtotal")?),
        discount_total: Money::from_minor(row.try_get("discount_total")?),
        shipping_total: Money::from_minor(row.try_get("shipping_total")?),
        tax_total: Money::from_minor(row.try_get("tax_total")?),
        grand_total: Money::from_minor(row.try_get("grand_total")?),
        items: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart_item(row: &PgRow) -> Result<CartItem> {
    let quantity: i64 = row.try_get("quantity")?;
    Ok(CartItem {
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: u32::try_from(quantity).map_err(|_| StoreError::InvalidColumn {
            column: "cart_items.quantity",
            value: quantity.to_string(),
        })?,
        unit_price: Money::from_minor(row.try_get("unit_price")?),
        currency: row.try_get("currency")?,
        line_total: Money::from_minor(row.try_get("line_total")?),
    })
}

fn row_to_order_header(row: &PgRow) -> Result<Order> {
    let customer_type_raw: String = row.try_get("customer_type")?;
    let customer_type =
        CustomerType::parse(&customer_type_raw).ok_or(StoreError::InvalidColumn {
            column: "orders.customer_type",
            value: customer_type_raw,
        })?;

    let payment_method_raw: String = row.try_get("payment_method")?;
    let payment_method =
        PaymentMethod::parse(&payment_method_raw).ok_or(StoreError::InvalidColumn {
            column: "orders.payment_method",
            value: payment_method_raw,
        })?;

    let status_raw: String = row.try_get("status")?;
    let status = OrderStatus::parse(&status_raw).ok_or(StoreError::InvalidColumn {
        column: "orders.status",
        value: status_raw,
    })?;

    // A corrupt audit snapshot reads back as null rather than failing
    // the whole order load.
    let payment_snapshot = row
        .try_get::<Option<String>, _>("payment_snapshot")?
        .and_then(|s| serde_json::from_str(&s).ok());

    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        order_number: row
            .try_get::<Option<String>, _>("order_number")?
            .unwrap_or_default(),
        user_id: row.try_get::<Option<i64>, _>("user_id")?.map(UserId::new),
        guest_key: row
            .try_get::<Option<Uuid>, _>("guest_key")?
            .map(GuestKey::from_uuid),
        customer_type,
        payment_method,
        status,
        currency: row.try_get("currency")?,
        subtotal: Money::from_minor(row.try_get("subtotal")?),
        discount_total: Money::from_minor(row.try_get("discount_total")?),
        shipping_total: Money::from_minor(row.try_get("shipping_total")?),
        tax_total: Money::from_minor(row.try_get("tax_total")?),
        grand_total: Money::from_minor(row.try_get("grand_total")?),
        buyer: domain::BuyerInfo {
            company_title: row.try_get("company_title")?,
            tax_number: row.try_get("tax_number")?,
            tax_office: row.try_get("tax_office")?,
            contact_name: row.try_get("contact_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            address_text: row.try_get("address_text")?,
            note: row.try_get("note")?,
        },
        payment_snapshot,
        cart_id: row.try_get::<Option<i64>, _>("cart_id")?.map(CartId::new),
        domain: row.try_get("domain")?,
        items: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
    let quantity: i64 = row.try_get("quantity")?;
    Ok(OrderItem {
        product_id: ProductId::new(row.try_get("product_id")?),
        code: row.try_get("code")?,
        title: row.try_get("title")?,
        unit_price: Money::from_minor(row.try_get("unit_price")?),
        quantity: u32::try_from(quantity).map_err(|_| StoreError::InvalidColumn {
            column: "order_items.quantity",
            value: quantity.to_string(),
        })?,
        currency: row.try_get("currency")?,
        line_total: Money::from_minor(row.try_get("line_total")?),
        image_path: row.try_get("image_path")?,
    })
}

const CART_COLUMNS: &str = "id, user_id, guest_key, status, currency, subtotal, discount_total, \
     shipping_total, tax_total, grand_total, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, order_number, user_id, guest_key, customer_type, payment_method, \
     status, currency, subtotal, discount_total, shipping_total, tax_total, grand_total, \
     company_title, tax_number, tax_office, contact_name, email, phone, address_text, note, \
     payment_snapshot, cart_id, domain, created_at, updated_at";

async fn load_cart(conn: &mut PgConnection, cart_id: CartId) -> Result<Option<Cart>> {
    let sql = format!("SELECT {CART_COLUMNS} FROM carts WHERE id = $1");
    let row = sqlx::query(&sql)
        .bind(cart_id.as_i64())
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut cart = row_to_cart_header(&row)?;

    let rows = sqlx::query(
        "SELECT product_id, quantity, unit_price, currency, line_total \
         FROM cart_items WHERE cart_id = $1 ORDER BY id ASC",
    )
    .bind(cart_id.as_i64())
    .fetch_all(&mut *conn)
    .await?;

    cart.items = rows
        .iter()
        .map(row_to_cart_item)
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(cart))
}

async fn select_active_cart_id(
    conn: &mut PgConnection,
    owner: CartOwner,
    lock: bool,
) -> Result<Option<CartId>> {
    let suffix = if lock { " FOR UPDATE" } else { "" };
    let id: Option<i64> = match owner {
        CartOwner::User(user_id) => {
            let sql =
                format!("SELECT id FROM carts WHERE user_id = $1 AND status = 'active'{suffix}");
            sqlx::query_scalar(&sql)
                .bind(user_id.as_i64())
                .fetch_optional(&mut *conn)
                .await?
        }
        CartOwner::Guest(guest_key) => {
            let sql =
                format!("SELECT id FROM carts WHERE guest_key = $1 AND status = 'active'{suffix}");
            sqlx::query_scalar(&sql)
                .bind(guest_key.as_uuid())
                .fetch_optional(&mut *conn)
                .await?
        }
    };
    Ok(id.map(CartId::new))
}

/// Locks the cart row and returns its currency; errors if the cart is
/// missing or no longer active.
async fn lock_active_cart(conn: &mut PgConnection, cart_id: CartId) -> Result<String> {
    let row = sqlx::query("SELECT status, currency FROM carts WHERE id = $1 FOR UPDATE")
        .bind(cart_id.as_i64())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::CartNotFound(cart_id))?;

    let status_raw: String = row.try_get("status")?;
    if CartStatus::parse(&status_raw) != Some(CartStatus::Active) {
        return Err(StoreError::CartNotFound(cart_id));
    }
    Ok(row.try_get("currency")?)
}

async fn resolve_catalog_price(conn: &mut PgConnection, product_id: ProductId) -> Result<Money> {
    let minor: Option<i64> =
        sqlx::query_scalar("SELECT unit_price FROM products WHERE id = $1 AND is_active")
            .bind(product_id.as_i64())
            .fetch_optional(&mut *conn)
            .await?;

    minor
        .map(Money::from_minor)
        .ok_or(StoreError::ProductUnavailable(product_id))
}

/// Adds quantity onto a cart line, creating it if absent. The unit price
/// always takes the supplied value so the latest price wins.
async fn upsert_item_add(
    conn: &mut PgConnection,
    cart_id: CartId,
    product_id: ProductId,
    quantity: u32,
    unit_price: Money,
    currency: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cart_items (cart_id, product_id, quantity, unit_price, currency, line_total)
        VALUES ($1, $2, $3, $4, $5, $3 * $4)
        ON CONFLICT (cart_id, product_id) DO UPDATE SET
            quantity = cart_items.quantity + EXCLUDED.quantity,
            unit_price = EXCLUDED.unit_price,
            line_total = (cart_items.quantity + EXCLUDED.quantity) * EXCLUDED.unit_price,
            updated_at = now()
        "#,
    )
    .bind(cart_id.as_i64())
    .bind(product_id.as_i64())
    .bind(i64::from(quantity))
    .bind(unit_price.minor())
    .bind(currency)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Re-derives the cart's rolled-up totals from its lines, in the same
/// transaction as the triggering write.
async fn recalc_totals(conn: &mut PgConnection, cart_id: CartId) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE carts SET
            subtotal = t.subtotal,
            grand_total = t.subtotal - discount_total + shipping_total + tax_total,
            updated_at = now()
        FROM (
            SELECT COALESCE(SUM(line_total), 0) AS subtotal
            FROM cart_items WHERE cart_id = $1
        ) AS t
        WHERE id = $1
        "#,
    )
    .bind(cart_id.as_i64())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl CheckoutStore for PostgresCheckoutStore {
    async fn ensure_active_cart(&self, owner: CartOwner, currency: Option<String>) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;

        if let Some(cart_id) = select_active_cart_id(&mut tx, owner, false).await? {
            let cart = load_cart(&mut tx, cart_id)
                .await?
                .ok_or(StoreError::CartNotFound(cart_id))?;
            tx.commit().await?;
            return Ok(cart);
        }

        let currency = currency.unwrap_or_else(|| "TRY".to_string());
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO carts (user_id, guest_key, status, currency)
            VALUES ($1, $2, 'active', $3)
            ON CONFLICT DO NOTHING
            RETURNING id
            "#,
        )
        .bind(owner.user_id().map(i64::from))
        .bind(owner.guest_key().map(Uuid::from))
        .bind(&currency)
        .fetch_optional(&mut *tx)
        .await?;

        // No returned id means a concurrent request won the partial
        // unique index race; its committed cart is now visible.
        let cart_id = match inserted {
            Some(id) => CartId::new(id),
            None => select_active_cart_id(&mut tx, owner, false)
                .await?
                .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?,
        };

        let cart = load_cart(&mut tx, cart_id)
            .await?
            .ok_or(StoreError::CartNotFound(cart_id))?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn get_active_cart(&self, owner: CartOwner) -> Result<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        match select_active_cart_id(&mut conn, owner, false).await? {
            Some(cart_id) => load_cart(&mut conn, cart_id).await,
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn add_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Option<Money>,
    ) -> Result<Cart> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity { quantity }.into());
        }

        let mut tx = self.pool.begin().await?;
        let currency = lock_active_cart(&mut tx, cart_id).await?;

        let price = match unit_price {
            Some(price) => price,
            None => resolve_catalog_price(&mut tx, product_id).await?,
        };

        upsert_item_add(&mut tx, cart_id, product_id, quantity, price, &currency).await?;
        recalc_totals(&mut tx, cart_id).await?;

        let cart = load_cart(&mut tx, cart_id)
            .await?
            .ok_or(StoreError::CartNotFound(cart_id))?;
        tx.commit().await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    async fn set_item_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Option<Money>,
    ) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;
        let currency = lock_active_cart(&mut tx, cart_id).await?;

        if quantity == 0 {
            sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
                .bind(cart_id.as_i64())
                .bind(product_id.as_i64())
                .execute(&mut *tx)
                .await?;
        } else {
            // Supplied price wins; otherwise keep the captured line
            // price; a brand-new line falls back to the catalog.
            let price = match unit_price {
                Some(price) => price,
                None => {
                    let existing: Option<i64> = sqlx::query_scalar(
                        "SELECT unit_price FROM cart_items WHERE cart_id = $1 AND product_id = $2",
                    )
                    .bind(cart_id.as_i64())
                    .bind(product_id.as_i64())
                    .fetch_optional(&mut *tx)
                    .await?;
                    match existing {
                        Some(minor) => Money::from_minor(minor),
                        None => resolve_catalog_price(&mut tx, product_id).await?,
                    }
                }
            };

            sqlx::query(
                r#"
                INSERT INTO cart_items (cart_id, product_id, quantity, unit_price, currency, line_total)
                VALUES ($1, $2, $3, $4, $5, $3 * $4)
                ON CONFLICT (cart_id, product_id) DO UPDATE SET
                    quantity = EXCLUDED.quantity,
                    unit_price = EXCLUDED.unit_price,
                    line_total = EXCLUDED.quantity * EXCLUDED.unit_price,
                    updated_at = now()
                "#,
            )
            .bind(cart_id.as_i64())
            .bind(product_id.as_i64())
            .bind(i64::from(quantity))
            .bind(price.minor())
            .bind(&currency)
            .execute(&mut *tx)
            .await?;
        }

        recalc_totals(&mut tx, cart_id).await?;
        let cart = load_cart(&mut tx, cart_id)
            .await?
            .ok_or(StoreError::CartNotFound(cart_id))?;
        tx.commit().await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    async fn remove_item(&self, cart_id: CartId, product_id: ProductId) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;
        lock_active_cart(&mut tx, cart_id).await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id.as_i64())
            .bind(product_id.as_i64())
            .execute(&mut *tx)
            .await?;

        recalc_totals(&mut tx, cart_id).await?;
        let cart = load_cart(&mut tx, cart_id)
            .await?
            .ok_or(StoreError::CartNotFound(cart_id))?;
        tx.commit().await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    async fn clear_cart(&self, cart_id: CartId) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;
        lock_active_cart(&mut tx, cart_id).await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_i64())
            .execute(&mut *tx)
            .await?;

        recalc_totals(&mut tx, cart_id).await?;
        let cart = load_cart(&mut tx, cart_id)
            .await?
            .ok_or(StoreError::CartNotFound(cart_id))?;
        tx.commit().await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    async fn attach_guest_cart(
        &self,
        guest_key: GuestKey,
        user_id: UserId,
    ) -> Result<Option<Cart>> {
        let mut tx = self.pool.begin().await?;

        let Some(guest_cart_id) =
            select_active_cart_id(&mut tx, CartOwner::Guest(guest_key), true).await?
        else {
            tx.commit().await?;
            return Ok(None);
        };

        let user_cart_id = select_active_cart_id(&mut tx, CartOwner::User(user_id), true).await?;

        let result_id = match user_cart_id {
            None => {
                // No user cart yet: re-parent the guest cart wholesale.
                sqlx::query(
                    "UPDATE carts SET user_id = $1, guest_key = NULL, updated_at = now() \
                     WHERE id = $2",
                )
                .bind(user_id.as_i64())
                .bind(guest_cart_id.as_i64())
                .execute(&mut *tx)
                .await?;
                guest_cart_id
            }
            Some(user_cart_id) => {
                // Merge line by line so add semantics (quantity
                // accumulation, price overwrite) are reused.
                let rows = sqlx::query(
                    "SELECT product_id, quantity, unit_price, currency FROM cart_items \
                     WHERE cart_id = $1 ORDER BY id ASC",
                )
                .bind(guest_cart_id.as_i64())
                .fetch_all(&mut *tx)
                .await?;

                for row in &rows {
                    let (product_id, quantity, unit_price, currency) =
                        row_to_cart_item_for_merge(row)?;
                    upsert_item_add(
                        &mut tx,
                        user_cart_id,
                        product_id,
                        quantity,
                        unit_price,
                        &currency,
                    )
                    .await?;
                }
                recalc_totals(&mut tx, user_cart_id).await?;

                sqlx::query(
                    "UPDATE carts SET status = 'cancelled', updated_at = now() WHERE id = $1",
                )
                .bind(guest_cart_id.as_i64())
                .execute(&mut *tx)
                .await?;
                user_cart_id
            }
        };

        let cart = load_cart(&mut tx, result_id)
            .await?
            .ok_or(StoreError::CartNotFound(result_id))?;
        tx.commit().await?;
        Ok(Some(cart))
    }

    #[tracing::instrument(skip(self, input))]
    async fn create_order(&self, input: CreateOrderInput) -> Result<Order> {
        // Fail fast: nothing below runs unless the input is internally
        // consistent with the pricing policy.
        input.validate()?;

        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (
                user_id, guest_key, customer_type, payment_method, status, currency,
                subtotal, discount_total, shipping_total, tax_total, grand_total,
                company_title, tax_number, tax_office, contact_name, email, phone,
                address_text, note, payment_snapshot, cart_id, domain
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22
            )
            RETURNING id
            "#,
        )
        .bind(input.owner.user_id().map(i64::from))
        .bind(input.owner.guest_key().map(Uuid::from))
        .bind(input.customer_type.as_str())
        .bind(input.payment_method.as_str())
        .bind(input.status.as_str())
        .bind(&input.currency)
        .bind(input.subtotal.minor())
        .bind(input.discount_total.minor())
        .bind(input.shipping_total.minor())
        .bind(input.tax_total.minor())
        .bind(input.grand_total.minor())
        .bind(&input.buyer.company_title)
        .bind(&input.buyer.tax_number)
        .bind(&input.buyer.tax_office)
        .bind(&input.buyer.contact_name)
        .bind(&input.buyer.email)
        .bind(&input.buyer.phone)
        .bind(&input.buyer.address_text)
        .bind(&input.buyer.note)
        .bind(input.payment_snapshot.as_ref().map(|v| v.to_string()))
        .bind(input.cart_id.map(i64::from))
        .bind(&input.domain)
        .fetch_one(&mut *tx)
        .await?;

        let order_id = OrderId::new(id);

        // The order number depends on the generated id, so it is
        // backfilled inside the same transaction.
        sqlx::query("UPDATE orders SET order_number = $1 WHERE id = $2")
            .bind(order_number(order_id))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for item in &input.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, product_id, code, title, unit_price, quantity,
                    currency, line_total, image_path
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(id)
            .bind(item.product_id.as_i64())
            .bind(&item.code)
            .bind(&item.title)
            .bind(item.unit_price.minor())
            .bind(i64::from(item.quantity))
            .bind(item.currency.as_deref().unwrap_or(&input.currency))
            .bind(item.line_total.minor())
            .bind(&item.image_path)
            .execute(&mut *tx)
            .await?;
        }

        // Checked out: the originating cart flips to converted and its
        // lines go away, atomically with the order itself.
        if let Some(cart_id) = input.cart_id {
            sqlx::query(
                "UPDATE carts SET status = 'converted', updated_at = now() \
                 WHERE id = $1 AND status = 'active'",
            )
            .bind(cart_id.as_i64())
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
                .bind(cart_id.as_i64())
                .execute(&mut *tx)
                .await?;

            recalc_totals(&mut tx, cart_id).await?;
        }

        tx.commit().await?;

        self.get_order(order_id)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(order_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = row_to_order_header(&row)?;

        let rows = sqlx::query(
            "SELECT product_id, code, title, unit_price, quantity, currency, line_total, \
             image_path FROM order_items WHERE order_id = $1 ORDER BY id ASC",
        )
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        order.items = rows
            .iter()
            .map(row_to_order_item)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(order))
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        if query.search.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND (contact_name ILIKE ${p} OR email ILIKE ${p} OR phone ILIKE ${p})",
                p = param_count
            ));
        }

        sql.push_str(" ORDER BY id DESC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);
        if let Some(ref term) = query.search {
            sqlx_query = sqlx_query.bind(format!("%{term}%"));
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let mut orders = rows
            .iter()
            .map(row_to_order_header)
            .collect::<Result<Vec<_>>>()?;

        if orders.is_empty() {
            return Ok(orders);
        }

        let ids: Vec<i64> = orders.iter().map(|o| o.id.as_i64()).collect();
        let item_rows = sqlx::query(
            "SELECT order_id, product_id, code, title, unit_price, quantity, currency, \
             line_total, image_path FROM order_items WHERE order_id = ANY($1) \
             ORDER BY order_id, id ASC",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<i64, Vec<OrderItem>> = HashMap::new();
        for row in &item_rows {
            let order_id: i64 = row.try_get("order_id")?;
            by_order
                .entry(order_id)
                .or_default()
                .push(row_to_order_item(row)?);
        }

        for order in &mut orders {
            if let Some(items) = by_order.remove(&order.id.as_i64()) {
                order.items = items;
            }
        }

        Ok(orders)
    }
}

fn row_to_cart_item_for_merge(row: &PgRow) -> Result<(ProductId, u32, Money, String)> {
    let quantity: i64 = row.try_get("quantity")?;
    Ok((
        ProductId::new(row.try_get("product_id")?),
        u32::try_from(quantity).map_err(|_| StoreError::InvalidColumn {
            column: "cart_items.quantity",
            value: quantity.to_string(),
        })?,
        Money::from_minor(row.try_get("unit_price")?),
        row.try_get("currency")?,
    ))
}
