use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, GuestKey, Money, OrderId, ProductId, UserId};
use domain::{
    Cart, CartOwner, CartStatus, CreateOrderInput, DomainError, Order, OrderItem, order_number,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{CheckoutStore, OrderQuery, Product},
};

#[derive(Default)]
struct Inner {
    carts: HashMap<CartId, Cart>,
    orders: HashMap<OrderId, Order>,
    products: HashMap<ProductId, Product>,
    next_cart_id: i64,
    next_order_id: i64,
}

impl Inner {
    fn active_cart_id(&self, owner: CartOwner) -> Option<CartId> {
        self.carts
            .values()
            .find(|c| {
                c.status == CartStatus::Active
                    && match owner {
                        CartOwner::User(user_id) => c.user_id == Some(user_id),
                        CartOwner::Guest(guest_key) => c.guest_key == Some(guest_key),
                    }
            })
            .map(|c| c.id)
    }

    fn resolve_price(&self, product_id: ProductId) -> Result<Money> {
        self.products
            .get(&product_id)
            .filter(|p| p.is_active)
            .map(|p| p.unit_price)
            .ok_or(StoreError::ProductUnavailable(product_id))
    }

    fn active_cart_mut(&mut self, cart_id: CartId) -> Result<&mut Cart> {
        match self.carts.get_mut(&cart_id) {
            Some(cart) if cart.status == CartStatus::Active => Ok(cart),
            _ => Err(StoreError::CartNotFound(cart_id)),
        }
    }
}

/// In-memory checkout store for tests.
///
/// Mirrors the semantics of the PostgreSQL implementation: each mutation
/// happens under a single write-lock section, so item writes and totals
/// recalculation are never observable half-done.
#[derive(Clone, Default)]
pub struct InMemoryCheckoutStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryCheckoutStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a catalog product for price resolution.
    pub async fn seed_product(&self, product: Product) {
        let mut inner = self.inner.write().await;
        inner.products.insert(product.id, product);
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.inner.read().await.orders.len()
    }

    /// Returns a cart by id regardless of status.
    pub async fn cart_by_id(&self, cart_id: CartId) -> Option<Cart> {
        self.inner.read().await.carts.get(&cart_id).cloned()
    }
}

#[async_trait]
impl CheckoutStore for InMemoryCheckoutStore {
    async fn ensure_active_cart(&self, owner: CartOwner, currency: Option<String>) -> Result<Cart> {
        let mut inner = self.inner.write().await;

        if let Some(cart_id) = inner.active_cart_id(owner) {
            return Ok(inner.carts[&cart_id].clone());
        }

        inner.next_cart_id += 1;
        let cart = Cart::new(
            CartId::new(inner.next_cart_id),
            owner,
            currency.unwrap_or_else(|| "TRY".to_string()),
        );
        inner.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn get_active_cart(&self, owner: CartOwner) -> Result<Option<Cart>> {
        let inner = self.inner.read().await;
        Ok(inner
            .active_cart_id(owner)
            .map(|cart_id| inner.carts[&cart_id].clone()))
    }

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

        let mut inner = self.inner.write().await;
        inner.active_cart_mut(cart_id)?;

        let price = match unit_price {
            Some(price) => price,
            None => inner.resolve_price(product_id)?,
        };

        let cart = inner.active_cart_mut(cart_id)?;
        cart.add_item(product_id, quantity, price)?;
        Ok(cart.clone())
    }

    async fn set_item_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Option<Money>,
    ) -> Result<Cart> {
        let mut inner = self.inner.write().await;
        let existing_price = inner
            .active_cart_mut(cart_id)?
            .item(product_id)
            .map(|i| i.unit_price);

        let price = match (unit_price, existing_price) {
            (Some(price), _) => price,
            (None, Some(price)) => price,
            (None, None) if quantity > 0 => inner.resolve_price(product_id)?,
            // Deleting an absent line never needs a price.
            (None, None) => Money::zero(),
        };

        let cart = inner.active_cart_mut(cart_id)?;
        cart.set_item_quantity(product_id, quantity, price);
        Ok(cart.clone())
    }

    async fn remove_item(&self, cart_id: CartId, product_id: ProductId) -> Result<Cart> {
        let mut inner = self.inner.write().await;
        let cart = inner.active_cart_mut(cart_id)?;
        cart.remove_item(product_id);
        Ok(cart.clone())
    }

    async fn clear_cart(&self, cart_id: CartId) -> Result<Cart> {
        let mut inner = self.inner.write().await;
        let cart = inner.active_cart_mut(cart_id)?;
        cart.clear_items();
        Ok(cart.clone())
    }

    async fn attach_guest_cart(
        &self,
        guest_key: GuestKey,
        user_id: UserId,
    ) -> Result<Option<Cart>> {
        let mut inner = self.inner.write().await;

        let Some(guest_cart_id) = inner.active_cart_id(CartOwner::Guest(guest_key)) else {
            return Ok(None);
        };

        match inner.active_cart_id(CartOwner::User(user_id)) {
            None => {
                let cart = inner.active_cart_mut(guest_cart_id)?;
                cart.user_id = Some(user_id);
                cart.guest_key = None;
                Ok(Some(cart.clone()))
            }
            Some(user_cart_id) => {
                let guest_items = inner.carts[&guest_cart_id].items.clone();

                let user_cart = inner.active_cart_mut(user_cart_id)?;
                for item in &guest_items {
                    user_cart.add_item(item.product_id, item.quantity, item.unit_price)?;
                }
                let merged = user_cart.clone();

                let guest_cart = inner.active_cart_mut(guest_cart_id)?;
                guest_cart.status = CartStatus::Cancelled;
                guest_cart.updated_at = Utc::now();

                Ok(Some(merged))
            }
        }
    }

    async fn create_order(&self, input: CreateOrderInput) -> Result<Order> {
        input.validate()?;

        let mut inner = self.inner.write().await;
        inner.next_order_id += 1;
        let order_id = OrderId::new(inner.next_order_id);
        let now = Utc::now();

        let items: Vec<OrderItem> = input
            .items
            .iter()
            .map(|item| OrderItem {
                product_id: item.product_id,
                code: item.code.clone(),
                title: item.title.clone(),
                unit_price: item.unit_price,
                quantity: item.quantity,
                currency: item
                    .currency
                    .clone()
                    .unwrap_or_else(|| input.currency.clone()),
                line_total: item.line_total,
                image_path: item.image_path.clone(),
            })
            .collect();

        let order = Order {
            id: order_id,
            order_number: order_number(order_id),
            user_id: input.owner.user_id(),
            guest_key: input.owner.guest_key(),
            customer_type: input.customer_type,
            payment_method: input.payment_method,
            status: input.status,
            currency: input.currency.clone(),
            subtotal: input.subtotal,
            discount_total: input.discount_total,
            shipping_total: input.shipping_total,
            tax_total: input.tax_total,
            grand_total: input.grand_total,
            buyer: input.buyer.clone(),
            payment_snapshot: input.payment_snapshot.clone(),
            cart_id: input.cart_id,
            domain: input.domain.clone(),
            items,
            created_at: now,
            updated_at: now,
        };

        if let Some(cart_id) = input.cart_id
            && let Some(cart) = inner.carts.get_mut(&cart_id)
            && cart.status == CartStatus::Active
        {
            cart.status = CartStatus::Converted;
            cart.clear_items();
        }

        inner.orders.insert(order_id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&order_id).cloned())
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| match &query.search {
                None => true,
                Some(term) => {
                    let term = term.to_lowercase();
                    [&o.buyer.contact_name, &o.buyer.email, &o.buyer.phone]
                        .into_iter()
                        .flatten()
                        .any(|field| field.to_lowercase().contains(&term))
                }
            })
            .cloned()
            .collect();

        orders.sort_by(|a, b| b.id.cmp(&a.id));

        let offset = query.offset.unwrap_or(0);
        let orders: Vec<Order> = orders.into_iter().skip(offset).collect();
        let orders = match query.limit {
            Some(limit) => orders.into_iter().take(limit).collect(),
            None => orders,
        };

        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{BuyerInfo, CustomerType, NewOrderItem, OrderStatus, PaymentMethod, pricing};

    fn product(id: i64, unit_minor: i64) -> Product {
        Product {
            id: ProductId::new(id),
            code: Some(format!("SKU-{id:03}")),
            title: format!("Product {id}"),
            unit_price: Money::from_minor(unit_minor),
            currency: "TRY".to_string(),
            image_path: None,
            is_active: true,
        }
    }

    fn order_input(
        customer_type: CustomerType,
        items: Vec<NewOrderItem>,
        cart_id: Option<CartId>,
    ) -> CreateOrderInput {
        let subtotal: Money = items.iter().map(|i| i.line_total).sum();
        let grand_total = pricing::discounted_total(subtotal, Some(customer_type));
        CreateOrderInput {
            owner: CartOwner::User(UserId::new(1)),
            customer_type,
            payment_method: PaymentMethod::Havale,
            status: OrderStatus::default(),
            currency: "TRY".to_string(),
            subtotal,
            discount_total: subtotal - grand_total,
            shipping_total: Money::zero(),
            tax_total: Money::zero(),
            grand_total,
            buyer: BuyerInfo::default(),
            payment_snapshot: None,
            cart_id,
            domain: None,
            items,
        }
    }

    fn line(product_id: i64, quantity: u32, unit_minor: i64) -> NewOrderItem {
        let unit_price = Money::from_minor(unit_minor);
        NewOrderItem {
            product_id: ProductId::new(product_id),
            code: None,
            title: format!("Product {product_id}"),
            unit_price,
            quantity,
            currency: None,
            line_total: unit_price.times(quantity),
            image_path: None,
        }
    }

    #[tokio::test]
    async fn ensure_active_cart_creates_once() {
        let store = InMemoryCheckoutStore::new();
        let owner = CartOwner::Guest(GuestKey::generate());

        let first = store.ensure_active_cart(owner, None).await.unwrap();
        let second = store.ensure_active_cart(owner, None).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.currency, "TRY");
    }

    #[tokio::test]
    async fn separate_owners_get_separate_carts() {
        let store = InMemoryCheckoutStore::new();
        let a = store
            .ensure_active_cart(CartOwner::User(UserId::new(1)), None)
            .await
            .unwrap();
        let b = store
            .ensure_active_cart(CartOwner::Guest(GuestKey::generate()), None)
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn add_item_resolves_catalog_price() {
        let store = InMemoryCheckoutStore::new();
        store.seed_product(product(1, 10_000)).await;
        let cart = store
            .ensure_active_cart(CartOwner::User(UserId::new(1)), None)
            .await
            .unwrap();

        let cart = store
            .add_item(cart.id, ProductId::new(1), 2, None)
            .await
            .unwrap();

        assert_eq!(cart.subtotal.minor(), 20_000);
        assert!(cart.totals_consistent());
    }

    #[tokio::test]
    async fn add_item_unknown_product_fails_before_write() {
        let store = InMemoryCheckoutStore::new();
        let cart = store
            .ensure_active_cart(CartOwner::User(UserId::new(1)), None)
            .await
            .unwrap();

        let result = store.add_item(cart.id, ProductId::new(9), 1, None).await;
        assert!(matches!(result, Err(StoreError::ProductUnavailable(_))));

        let cart = store.cart_by_id(cart.id).await.unwrap();
        assert!(cart.items.is_empty());
    }

    #[tokio::test]
    async fn add_item_inactive_product_fails() {
        let store = InMemoryCheckoutStore::new();
        let mut p = product(1, 10_000);
        p.is_active = false;
        store.seed_product(p).await;
        let cart = store
            .ensure_active_cart(CartOwner::User(UserId::new(1)), None)
            .await
            .unwrap();

        let result = store.add_item(cart.id, ProductId::new(1), 1, None).await;
        assert!(matches!(result, Err(StoreError::ProductUnavailable(_))));
    }

    #[tokio::test]
    async fn add_item_zero_quantity_fails() {
        let store = InMemoryCheckoutStore::new();
        let cart = store
            .ensure_active_cart(CartOwner::User(UserId::new(1)), None)
            .await
            .unwrap();

        let result = store
            .add_item(cart.id, ProductId::new(1), 0, Some(Money::from_minor(100)))
            .await;
        assert!(matches!(
            result,
            Err(StoreError::Domain(DomainError::InvalidQuantity { .. }))
        ));
    }

    #[tokio::test]
    async fn set_quantity_keeps_captured_price() {
        let store = InMemoryCheckoutStore::new();
        let cart = store
            .ensure_active_cart(CartOwner::User(UserId::new(1)), None)
            .await
            .unwrap();

        store
            .add_item(cart.id, ProductId::new(1), 1, Some(Money::from_minor(500)))
            .await
            .unwrap();
        let cart = store
            .set_item_quantity(cart.id, ProductId::new(1), 4, None)
            .await
            .unwrap();

        let item = cart.item(ProductId::new(1)).unwrap();
        assert_eq!(item.unit_price.minor(), 500);
        assert_eq!(item.line_total.minor(), 2_000);
    }

    #[tokio::test]
    async fn set_quantity_zero_deletes_and_readd_starts_fresh() {
        let store = InMemoryCheckoutStore::new();
        let cart = store
            .ensure_active_cart(CartOwner::User(UserId::new(1)), None)
            .await
            .unwrap();
        let price = Some(Money::from_minor(100));

        store
            .add_item(cart.id, ProductId::new(1), 5, price)
            .await
            .unwrap();
        let cart_state = store
            .set_item_quantity(cart.id, ProductId::new(1), 0, None)
            .await
            .unwrap();
        assert!(cart_state.items.is_empty());

        let cart_state = store
            .add_item(cart.id, ProductId::new(1), 2, price)
            .await
            .unwrap();
        assert_eq!(cart_state.item(ProductId::new(1)).unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn remove_item_is_idempotent() {
        let store = InMemoryCheckoutStore::new();
        let cart = store
            .ensure_active_cart(CartOwner::User(UserId::new(1)), None)
            .await
            .unwrap();

        let cart = store.remove_item(cart.id, ProductId::new(42)).await.unwrap();
        assert!(cart.items.is_empty());
        assert!(cart.totals_consistent());
    }

    #[tokio::test]
    async fn mutations_on_missing_cart_fail() {
        let store = InMemoryCheckoutStore::new();
        let result = store
            .add_item(CartId::new(99), ProductId::new(1), 1, Some(Money::zero()))
            .await;
        assert!(matches!(result, Err(StoreError::CartNotFound(_))));
    }

    #[tokio::test]
    async fn attach_guest_cart_without_guest_cart_returns_none() {
        let store = InMemoryCheckoutStore::new();
        let result = store
            .attach_guest_cart(GuestKey::generate(), UserId::new(1))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn attach_guest_cart_reparents_when_user_has_none() {
        let store = InMemoryCheckoutStore::new();
        let guest_key = GuestKey::generate();
        let guest_cart = store
            .ensure_active_cart(CartOwner::Guest(guest_key), None)
            .await
            .unwrap();
        store
            .add_item(
                guest_cart.id,
                ProductId::new(1),
                2,
                Some(Money::from_minor(100)),
            )
            .await
            .unwrap();

        let cart = store
            .attach_guest_cart(guest_key, UserId::new(7))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(cart.id, guest_cart.id);
        assert_eq!(cart.user_id, Some(UserId::new(7)));
        assert!(cart.guest_key.is_none());
        assert_eq!(cart.subtotal.minor(), 200);
    }

    #[tokio::test]
    async fn attach_guest_cart_merges_into_existing_user_cart() {
        let store = InMemoryCheckoutStore::new();
        let guest_key = GuestKey::generate();
        let user_id = UserId::new(7);
        let price = Some(Money::from_minor(100));

        // User cart with one overlapping product
        let user_cart = store
            .ensure_active_cart(CartOwner::User(user_id), None)
            .await
            .unwrap();
        store
            .add_item(user_cart.id, ProductId::new(1), 1, price)
            .await
            .unwrap();

        // Guest cart with two items, one overlapping
        let guest_cart = store
            .ensure_active_cart(CartOwner::Guest(guest_key), None)
            .await
            .unwrap();
        store
            .add_item(guest_cart.id, ProductId::new(1), 2, price)
            .await
            .unwrap();
        store
            .add_item(guest_cart.id, ProductId::new(2), 3, price)
            .await
            .unwrap();

        let merged = store
            .attach_guest_cart(guest_key, user_id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(merged.id, user_cart.id);
        assert_eq!(merged.item(ProductId::new(1)).unwrap().quantity, 3);
        assert_eq!(merged.item(ProductId::new(2)).unwrap().quantity, 3);
        assert!(merged.totals_consistent());

        let guest_cart = store.cart_by_id(guest_cart.id).await.unwrap();
        assert_eq!(guest_cart.status, CartStatus::Cancelled);
    }

    #[tokio::test]
    async fn create_order_assigns_number_from_id() {
        let store = InMemoryCheckoutStore::new();
        let order = store
            .create_order(order_input(
                CustomerType::Bireysel,
                vec![line(1, 1, 1_000)],
                None,
            ))
            .await
            .unwrap();

        assert_eq!(order.order_number, format!("ORD{:08}", order.id.as_i64()));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items.len(), 1);
    }

    #[tokio::test]
    async fn create_order_empty_items_writes_nothing() {
        let store = InMemoryCheckoutStore::new();
        let result = store
            .create_order(order_input(CustomerType::Bireysel, vec![], None))
            .await;

        assert!(matches!(
            result,
            Err(StoreError::Domain(DomainError::NoItems))
        ));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn create_order_converts_the_cart() {
        let store = InMemoryCheckoutStore::new();
        let cart = store
            .ensure_active_cart(CartOwner::User(UserId::new(1)), None)
            .await
            .unwrap();
        store
            .add_item(cart.id, ProductId::new(1), 2, Some(Money::from_minor(10_000)))
            .await
            .unwrap();

        store
            .create_order(order_input(
                CustomerType::Katilimci,
                vec![line(1, 2, 10_000)],
                Some(cart.id),
            ))
            .await
            .unwrap();

        let cart = store.cart_by_id(cart.id).await.unwrap();
        assert_eq!(cart.status, CartStatus::Converted);
        assert!(cart.items.is_empty());
    }

    #[tokio::test]
    async fn katilimci_order_totals() {
        let store = InMemoryCheckoutStore::new();
        let items = vec![line(1, 2, 10_000), line(2, 1, 5_000)];
        let order = store
            .create_order(order_input(CustomerType::Katilimci, items, None))
            .await
            .unwrap();

        assert_eq!(order.subtotal, Money::from_major(250));
        assert_eq!(order.grand_total.minor(), 18_750);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].line_total.minor(), 20_000);
        assert_eq!(order.items[1].line_total.minor(), 5_000);
    }

    #[tokio::test]
    async fn list_orders_searches_contact_fields() {
        let store = InMemoryCheckoutStore::new();

        let mut a = order_input(CustomerType::Bireysel, vec![line(1, 1, 100)], None);
        a.buyer.contact_name = Some("Ayşe Yılmaz".to_string());
        store.create_order(a).await.unwrap();

        let mut b = order_input(CustomerType::Bireysel, vec![line(2, 1, 100)], None);
        b.buyer.email = Some("mehmet@example.com".to_string());
        store.create_order(b).await.unwrap();

        let hits = store
            .list_orders(OrderQuery::new().search("mehmet"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].buyer.email.as_deref(), Some("mehmet@example.com"));
    }

    #[tokio::test]
    async fn list_orders_paginates_newest_first() {
        let store = InMemoryCheckoutStore::new();
        for i in 1..=5 {
            store
                .create_order(order_input(
                    CustomerType::Bireysel,
                    vec![line(i, 1, 100)],
                    None,
                ))
                .await
                .unwrap();
        }

        let page = store
            .list_orders(OrderQuery::new().limit(2).offset(1))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id.as_i64(), 4);
        assert_eq!(page[1].id.as_i64(), 3);
    }
}
