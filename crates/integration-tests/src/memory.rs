//! In-memory implementation of every repository trait.
//!
//! Writes are applied to a copy of the tables and swapped in only when the
//! whole write succeeds, so a failing save leaves nothing behind, as the
//! `PostgreSQL` transaction would.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::{Map, Value};
use shopsync_core::{
    CustomerId, Email, OrderId, OrderItemId, ProductId, RemoteId, StoreId, StoreOwner, StoreType,
    SyncFamily, VariantId,
};
use shopsync_engine::db::RepositoryError;
use shopsync_engine::models::{
    Customer, CustomerWrite, NewStore, Order, OrderAggregate, OrderItem, OrderItemWrite,
    OrderWrite, Product, ProductAggregate, ProductWrite, PurgeReport, PurgeTarget, Store,
    StoreDetails, Variant, VariantWrite,
};
use shopsync_engine::repository::{
    OrderRepository, ProductRepository, Repositories, StoreRepository,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    next_id: i32,
    stores: BTreeMap<StoreId, Store>,
    products: Vec<Product>,
    variants: Vec<Variant>,
    customers: Vec<Customer>,
    orders: Vec<Order>,
    items: Vec<OrderItem>,
    watermark_writes: Vec<(StoreId, SyncFamily, DateTime<Utc>)>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn owner_of(&self, product_id: ProductId) -> Option<StoreOwner> {
        self.products
            .iter()
            .find(|p| p.id == product_id)
            .map(|p| p.owner)
    }

    fn live_owner_of(&self, product_id: ProductId) -> Option<StoreOwner> {
        self.products
            .iter()
            .find(|p| p.id == product_id && p.deleted_at.is_none())
            .map(|p| p.owner)
    }

    fn load_product(&self, id: ProductId) -> Result<ProductAggregate, RepositoryError> {
        let product = self
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        let variants = self
            .variants
            .iter()
            .filter(|v| v.product_id == id)
            .cloned()
            .collect();
        Ok(ProductAggregate { product, variants })
    }

    fn load_order(&self, id: OrderId) -> Result<OrderAggregate, RepositoryError> {
        let order = self
            .orders
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        let items = self
            .items
            .iter()
            .filter(|i| i.order_id == id)
            .cloned()
            .collect();
        let customer = order
            .customer_id
            .and_then(|cid| self.customers.iter().find(|c| c.id == cid).cloned());
        Ok(OrderAggregate {
            order,
            items,
            customer,
        })
    }

    fn apply_product(&mut self, write: &ProductWrite) -> Result<ProductId, RepositoryError> {
        let now = Utc::now();
        let product_id = match write.existing {
            Some(id) => {
                let product = self
                    .products
                    .iter_mut()
                    .find(|p| p.id == id)
                    .ok_or(RepositoryError::NotFound)?;
                product.title.clone_from(&write.title);
                product.handle.clone_from(&write.handle);
                product.vendor.clone_from(&write.vendor);
                product.product_type.clone_from(&write.product_type);
                product.attributes = write.attributes.clone();
                product.store_created_at = write.store_created_at;
                product.store_updated_at = write.store_updated_at;
                product.deleted_at = None;
                product.updated_at = now;
                id
            }
            None => {
                if self
                    .products
                    .iter()
                    .any(|p| p.owner == write.owner && p.remote_id == write.remote_id)
                {
                    return Err(RepositoryError::Conflict("products_remote_key".to_string()));
                }
                let id = ProductId::new(self.next_id());
                self.products.push(Product {
                    id,
                    owner: write.owner,
                    remote_id: write.remote_id,
                    title: write.title.clone(),
                    handle: write.handle.clone(),
                    vendor: write.vendor.clone(),
                    product_type: write.product_type.clone(),
                    attributes: write.attributes.clone(),
                    store_created_at: write.store_created_at,
                    store_updated_at: write.store_updated_at,
                    created_at: now,
                    updated_at: now,
                    deleted_at: None,
                });
                id
            }
        };

        for variant in &write.variants {
            self.apply_variant(write.owner, product_id, variant, now)?;
        }
        for retired in &write.retire_variants {
            if let Some(variant) = self.variants.iter_mut().find(|v| v.id == *retired) {
                variant.deleted_at = Some(now);
                variant.updated_at = now;
            }
        }
        Ok(product_id)
    }

    fn apply_variant(
        &mut self,
        owner: StoreOwner,
        product_id: ProductId,
        write: &VariantWrite,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if let Some(id) = write.existing {
            let variant = self
                .variants
                .iter_mut()
                .find(|v| v.id == id)
                .ok_or(RepositoryError::NotFound)?;
            variant.product_id = product_id;
            variant.remote_product_id = write.remote_product_id;
            variant.title.clone_from(&write.title);
            variant.sku.clone_from(&write.sku);
            variant.price = write.price;
            variant.position = write.position;
            variant.inventory_quantity = write.inventory_quantity;
            variant.attributes = write.attributes.clone();
            variant.deleted_at = None;
            variant.updated_at = now;
            return Ok(());
        }

        let taken = self.variants.iter().any(|v| {
            v.remote_id == write.remote_id && self.owner_of(v.product_id) == Some(owner)
        });
        if taken {
            return Err(RepositoryError::Conflict("variants_remote_key".to_string()));
        }
        let id = VariantId::new(self.next_id());
        self.variants.push(Variant {
            id,
            product_id,
            remote_id: write.remote_id,
            remote_product_id: write.remote_product_id,
            title: write.title.clone(),
            sku: write.sku.clone(),
            price: write.price,
            position: write.position,
            inventory_quantity: write.inventory_quantity,
            attributes: write.attributes.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        });
        Ok(())
    }

    fn apply_customer(
        &mut self,
        owner: StoreOwner,
        write: &CustomerWrite,
        now: DateTime<Utc>,
    ) -> Result<CustomerId, RepositoryError> {
        if let Some(id) = write.existing {
            let customer = self
                .customers
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or(RepositoryError::NotFound)?;
            customer.remote_id = write.remote_id.or(customer.remote_id);
            customer.email = write.email.clone().or_else(|| customer.email.clone());
            customer.first_name.clone_from(&write.first_name);
            customer.last_name.clone_from(&write.last_name);
            customer.attributes = write.attributes.clone();
            customer.updated_at = now;
            return Ok(id);
        }

        if let Some(remote_id) = write.remote_id
            && self
                .customers
                .iter()
                .any(|c| c.owner == owner && c.remote_id == Some(remote_id))
        {
            return Err(RepositoryError::Conflict("customers_remote_key".to_string()));
        }
        let id = CustomerId::new(self.next_id());
        self.customers.push(Customer {
            id,
            owner,
            remote_id: write.remote_id,
            email: write.email.clone(),
            first_name: write.first_name.clone(),
            last_name: write.last_name.clone(),
            attributes: write.attributes.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        });
        Ok(id)
    }

    fn apply_order(&mut self, write: &OrderWrite) -> Result<OrderId, RepositoryError> {
        let now = Utc::now();
        let customer_id = match &write.customer {
            Some(customer) => Some(self.apply_customer(write.owner, customer, now)?),
            None => None,
        };

        let order_id = match write.existing {
            Some(id) => {
                let order = self
                    .orders
                    .iter_mut()
                    .find(|o| o.id == id)
                    .ok_or(RepositoryError::NotFound)?;
                order.customer_id = customer_id.or(order.customer_id);
                order.name.clone_from(&write.name);
                order.number = write.number;
                order.email.clone_from(&write.email);
                order.financial_status = write.financial_status;
                order.fulfillment_status = write.fulfillment_status;
                order.currency.clone_from(&write.currency);
                order.total_price = write.total_price;
                order.test = write.test;
                order.attributes = write.attributes.clone();
                order.processed_at = write.processed_at;
                order.store_created_at = write.store_created_at;
                order.store_updated_at = write.store_updated_at;
                order.deleted_at = None;
                order.updated_at = now;
                id
            }
            None => {
                if self
                    .orders
                    .iter()
                    .any(|o| o.owner == write.owner && o.remote_id == write.remote_id)
                {
                    return Err(RepositoryError::Conflict("orders_remote_key".to_string()));
                }
                let id = OrderId::new(self.next_id());
                self.orders.push(Order {
                    id,
                    owner: write.owner,
                    remote_id: write.remote_id,
                    customer_id,
                    name: write.name.clone(),
                    number: write.number,
                    email: write.email.clone(),
                    financial_status: write.financial_status,
                    fulfillment_status: write.fulfillment_status,
                    currency: write.currency.clone(),
                    total_price: write.total_price,
                    test: write.test,
                    attributes: write.attributes.clone(),
                    processed_at: write.processed_at,
                    store_created_at: write.store_created_at,
                    store_updated_at: write.store_updated_at,
                    created_at: now,
                    updated_at: now,
                    deleted_at: None,
                });
                id
            }
        };

        for item in &write.items {
            self.apply_item(order_id, item, now)?;
        }
        Ok(order_id)
    }

    fn apply_item(
        &mut self,
        order_id: OrderId,
        write: &OrderItemWrite,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if write.quantity < 0 {
            return Err(RepositoryError::DataCorruption(
                "order_items.quantity must not be negative".to_string(),
            ));
        }

        if let Some(id) = write.existing {
            let item = self
                .items
                .iter_mut()
                .find(|i| i.id == id && i.order_id == order_id)
                .ok_or(RepositoryError::NotFound)?;
            item.title.clone_from(&write.title);
            item.sku.clone_from(&write.sku);
            item.quantity = write.quantity;
            item.price = write.price;
            item.attributes = write.attributes.clone();
            item.updated_at = now;
            return Ok(());
        }

        if self
            .items
            .iter()
            .any(|i| i.order_id == order_id && i.remote_line_item_id == write.remote_line_item_id)
        {
            return Err(RepositoryError::Conflict("order_items_remote_key".to_string()));
        }
        let id = OrderItemId::new(self.next_id());
        self.items.push(OrderItem {
            id,
            order_id,
            product_id: write.product_id,
            variant_id: write.variant_id,
            remote_line_item_id: write.remote_line_item_id,
            remote_product_id: write.remote_product_id,
            remote_variant_id: write.remote_variant_id,
            title: write.title.clone(),
            sku: write.sku.clone(),
            quantity: write.quantity,
            price: write.price,
            attributes: write.attributes.clone(),
            created_at: now,
            updated_at: now,
        });
        Ok(())
    }
}

/// Stores, catalog and orders kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
    conflict_next_save: AtomicBool,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All three repository seams backed by this instance.
    #[must_use]
    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            stores: Arc::clone(self) as Arc<dyn StoreRepository>,
            products: Arc::clone(self) as Arc<dyn ProductRepository>,
            orders: Arc::clone(self) as Arc<dyn OrderRepository>,
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to a draft of the tables; keep it only on success.
    fn transaction<T>(
        &self,
        change: impl FnOnce(&mut Tables) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        if self.conflict_next_save.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Conflict("injected".to_string()));
        }
        let mut tables = self.tables();
        let mut draft = tables.clone();
        let value = change(&mut draft)?;
        *tables = draft;
        Ok(value)
    }

    /// Make the next product or order save fail with a unique violation.
    pub fn fail_next_save_with_conflict(&self) {
        self.conflict_next_save.store(true, Ordering::SeqCst);
    }

    /// Register an installed store created on the platform at `created_at`.
    #[must_use]
    pub fn add_store(&self, shop: &str, created_at: DateTime<Utc>) -> Store {
        let new = NewStore::new(shop, SecretString::from("shpat_test"), created_at);
        let mut tables = self.tables();
        let id = StoreId::new(tables.next_id());
        let store = Store {
            id,
            store_type: StoreType::Shopify,
            shop_domain: new.shop_domain,
            name: new.name,
            access_token: new.access_token,
            store_created_at: new.store_created_at,
            installed_at: Utc::now(),
            uninstalled_at: None,
            deleted_at: None,
            last_product_import_at: None,
            last_order_import_at: None,
            last_customer_import_at: None,
            details: Value::Object(Map::new()),
            customer_count: None,
            order_count: None,
            product_count: None,
            updated_at: Utc::now(),
        };
        tables.stores.insert(id, store.clone());
        store
    }

    #[must_use]
    pub fn store(&self, id: StoreId) -> Option<Store> {
        self.tables().stores.get(&id).cloned()
    }

    pub fn set_watermark(&self, id: StoreId, family: SyncFamily, at: Option<DateTime<Utc>>) {
        if let Some(store) = self.tables().stores.get_mut(&id) {
            match family {
                SyncFamily::Orders => store.last_order_import_at = at,
                SyncFamily::Products => store.last_product_import_at = at,
            }
        }
    }

    pub fn set_updated_at(&self, id: StoreId, at: DateTime<Utc>) {
        if let Some(store) = self.tables().stores.get_mut(&id) {
            store.updated_at = at;
        }
    }

    pub fn uninstall(&self, id: StoreId) {
        if let Some(store) = self.tables().stores.get_mut(&id) {
            store.uninstalled_at = Some(Utc::now());
        }
    }

    /// Every watermark write, in order.
    #[must_use]
    pub fn watermark_writes(&self) -> Vec<(StoreId, SyncFamily, DateTime<Utc>)> {
        self.tables().watermark_writes.clone()
    }

    #[must_use]
    pub fn products(&self) -> Vec<Product> {
        self.tables().products.clone()
    }

    #[must_use]
    pub fn variants(&self) -> Vec<Variant> {
        self.tables().variants.clone()
    }

    #[must_use]
    pub fn customers(&self) -> Vec<Customer> {
        self.tables().customers.clone()
    }

    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.tables().orders.clone()
    }

    #[must_use]
    pub fn order_items(&self) -> Vec<OrderItem> {
        self.tables().items.clone()
    }

    /// Items of the order with this remote id.
    #[must_use]
    pub fn items_of(&self, remote_order_id: i64) -> Vec<OrderItem> {
        let tables = self.tables();
        let Some(order) = tables
            .orders
            .iter()
            .find(|o| o.remote_id == RemoteId::new(remote_order_id))
        else {
            return Vec::new();
        };
        tables
            .items
            .iter()
            .filter(|i| i.order_id == order.id)
            .cloned()
            .collect()
    }

    /// Pretend the order with this remote id was created locally at `at`.
    pub fn backdate_order(&self, remote_order_id: i64, at: DateTime<Utc>) {
        if let Some(order) = self
            .tables()
            .orders
            .iter_mut()
            .find(|o| o.remote_id == RemoteId::new(remote_order_id))
        {
            order.created_at = at;
        }
    }

    /// Insert a product with the given variants directly.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the product already exists.
    pub fn seed_product(
        &self,
        store: &Store,
        remote_id: i64,
        variant_ids: &[i64],
    ) -> Result<ProductAggregate, RepositoryError> {
        let write = ProductWrite {
            existing: None,
            owner: store.owner(),
            remote_id: RemoteId::new(remote_id),
            title: format!("Product {remote_id}"),
            handle: None,
            vendor: None,
            product_type: None,
            attributes: serde_json::Value::Null,
            store_created_at: Some(store.store_created_at),
            store_updated_at: None,
            variants: variant_ids
                .iter()
                .map(|id| VariantWrite {
                    existing: None,
                    remote_id: RemoteId::new(*id),
                    remote_product_id: Some(RemoteId::new(remote_id)),
                    title: format!("Variant {id}"),
                    sku: None,
                    price: None,
                    position: None,
                    inventory_quantity: None,
                    attributes: serde_json::Value::Null,
                })
                .collect(),
            retire_variants: Vec::new(),
        };
        let mut tables = self.tables();
        let id = tables.apply_product(&write)?;
        tables.load_product(id)
    }
}

#[async_trait]
impl StoreRepository for MemoryRepository {
    async fn insert(&self, store: NewStore) -> Result<Store, RepositoryError> {
        if self
            .tables()
            .stores
            .values()
            .any(|s| s.shop_domain == store.shop_domain)
        {
            return Err(RepositoryError::Conflict("stores_domain_key".to_string()));
        }
        Ok(self.add_store(&store.shop_domain, store.store_created_at))
    }

    async fn get(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        Ok(self.store(id))
    }

    async fn list_installed(
        &self,
        after: Option<StoreId>,
        limit: u32,
        only: Option<&[StoreId]>,
    ) -> Result<Vec<Store>, RepositoryError> {
        let tables = self.tables();
        Ok(tables
            .stores
            .values()
            .filter(|s| s.is_installed())
            .filter(|s| after.is_none_or(|after| s.id > after))
            .filter(|s| only.is_none_or(|ids| ids.contains(&s.id)))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn update_details(
        &self,
        id: StoreId,
        details: &StoreDetails,
    ) -> Result<Store, RepositoryError> {
        let mut tables = self.tables();
        let store = tables.stores.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if details.name.is_some() {
            store.name.clone_from(&details.name);
        }
        if let Some(at) = details.store_created_at {
            store.store_created_at = at;
        }
        if let Some(payload) = &details.details {
            store.details.clone_from(payload);
        }
        let counts = details.counts;
        store.customer_count = counts.customers.or(store.customer_count);
        store.order_count = counts.orders.or(store.order_count);
        store.product_count = counts.products.or(store.product_count);
        store.updated_at = Utc::now();
        Ok(store.clone())
    }

    async fn advance_watermark(
        &self,
        id: StoreId,
        family: SyncFamily,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, RepositoryError> {
        let mut tables = self.tables();
        let store = tables.stores.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        let stored = store.watermark(family).map_or(at, |current| current.max(at));
        match family {
            SyncFamily::Orders => store.last_order_import_at = Some(stored),
            SyncFamily::Products => store.last_product_import_at = Some(stored),
        }
        tables.watermark_writes.push((id, family, stored));
        Ok(stored)
    }

    async fn purge(
        &self,
        id: StoreId,
        targets: &[PurgeTarget],
    ) -> Result<PurgeReport, RepositoryError> {
        self.transaction(|tables| {
            let mut report = PurgeReport::default();
            let owned = |owner: &StoreOwner| owner.owner_id == id;

            for target in PurgeTarget::ALL.into_iter().filter(|t| targets.contains(t)) {
                match target {
                    PurgeTarget::Orders => {
                        let doomed: Vec<OrderId> = tables
                            .orders
                            .iter()
                            .filter(|o| owned(&o.owner))
                            .map(|o| o.id)
                            .collect();
                        tables.items.retain(|i| !doomed.contains(&i.order_id));
                        tables.orders.retain(|o| !owned(&o.owner));
                        report.orders = doomed.len() as u64;
                        if let Some(store) = tables.stores.get_mut(&id) {
                            store.last_order_import_at = None;
                        }
                    }
                    PurgeTarget::Customers => {
                        let before = tables.customers.len();
                        tables.customers.retain(|c| !owned(&c.owner));
                        report.customers = (before - tables.customers.len()) as u64;
                        if let Some(store) = tables.stores.get_mut(&id) {
                            store.last_customer_import_at = None;
                        }
                    }
                    PurgeTarget::Products => {
                        let doomed: Vec<ProductId> = tables
                            .products
                            .iter()
                            .filter(|p| owned(&p.owner))
                            .map(|p| p.id)
                            .collect();
                        tables.variants.retain(|v| !doomed.contains(&v.product_id));
                        tables.products.retain(|p| !owned(&p.owner));
                        report.products = doomed.len() as u64;
                        if let Some(store) = tables.stores.get_mut(&id) {
                            store.last_product_import_at = None;
                        }
                    }
                    PurgeTarget::Store => {
                        if let Some(store) = tables.stores.get_mut(&id)
                            && store.deleted_at.is_none()
                        {
                            store.deleted_at = Some(Utc::now());
                            report.store_deleted = true;
                        }
                    }
                }
            }
            Ok(report)
        })
    }
}

#[async_trait]
impl ProductRepository for MemoryRepository {
    async fn existing_ids(
        &self,
        owner: StoreOwner,
        remote_ids: &[RemoteId],
    ) -> Result<HashMap<RemoteId, ProductId>, RepositoryError> {
        Ok(self
            .tables()
            .products
            .iter()
            .filter(|p| p.owner == owner && remote_ids.contains(&p.remote_id))
            .map(|p| (p.remote_id, p.id))
            .collect())
    }

    async fn find(
        &self,
        owner: StoreOwner,
        remote_id: RemoteId,
    ) -> Result<Option<ProductAggregate>, RepositoryError> {
        let tables = self.tables();
        tables
            .products
            .iter()
            .find(|p| p.owner == owner && p.remote_id == remote_id)
            .map(|p| tables.load_product(p.id))
            .transpose()
    }

    async fn variants_by_remote_ids(
        &self,
        owner: StoreOwner,
        remote_ids: &[RemoteId],
    ) -> Result<HashMap<RemoteId, Variant>, RepositoryError> {
        let tables = self.tables();
        Ok(tables
            .variants
            .iter()
            .filter(|v| !v.is_deleted() && remote_ids.contains(&v.remote_id))
            .filter(|v| tables.live_owner_of(v.product_id) == Some(owner))
            .map(|v| (v.remote_id, v.clone()))
            .collect())
    }

    async fn save(&self, write: ProductWrite) -> Result<ProductAggregate, RepositoryError> {
        self.transaction(|tables| {
            let id = tables.apply_product(&write)?;
            tables.load_product(id)
        })
    }
}

#[async_trait]
impl OrderRepository for MemoryRepository {
    async fn existing_ids(
        &self,
        owner: StoreOwner,
        remote_ids: &[RemoteId],
    ) -> Result<HashMap<RemoteId, OrderId>, RepositoryError> {
        Ok(self
            .tables()
            .orders
            .iter()
            .filter(|o| o.owner == owner && remote_ids.contains(&o.remote_id))
            .map(|o| (o.remote_id, o.id))
            .collect())
    }

    async fn find(
        &self,
        owner: StoreOwner,
        remote_id: RemoteId,
    ) -> Result<Option<OrderAggregate>, RepositoryError> {
        let tables = self.tables();
        tables
            .orders
            .iter()
            .find(|o| o.owner == owner && o.remote_id == remote_id)
            .map(|o| tables.load_order(o.id))
            .transpose()
    }

    async fn find_customer_by_remote_id(
        &self,
        owner: StoreOwner,
        remote_id: RemoteId,
    ) -> Result<Option<Customer>, RepositoryError> {
        Ok(self
            .tables()
            .customers
            .iter()
            .find(|c| c.owner == owner && c.remote_id == Some(remote_id))
            .cloned())
    }

    async fn find_customer_by_email(
        &self,
        owner: StoreOwner,
        email: &Email,
    ) -> Result<Option<Customer>, RepositoryError> {
        let wanted = email.normalized();
        Ok(self
            .tables()
            .customers
            .iter()
            .filter(|c| c.owner == owner && c.deleted_at.is_none())
            .find(|c| c.email.as_ref().is_some_and(|e| e.normalized() == wanted))
            .cloned())
    }

    async fn save(&self, write: OrderWrite) -> Result<OrderAggregate, RepositoryError> {
        self.transaction(|tables| {
            let id = tables.apply_order(&write)?;
            tables.load_order(id)
        })
    }
}
