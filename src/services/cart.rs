//! Cart and wishlist, priced against the live catalog.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::accounts::{load_user, save_user};
use super::catalog::get_product;
use crate::config::CommerceConfig;
use crate::domain::aggregates::{Cart, CartLine, MAX_LINE_QUANTITY, Product, User};
use crate::domain::{Money, Sku};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub item_count: u32,
    pub subtotal: Money,
    pub shipping_fee: Money,
    pub total: Money,
    /// False when any line cannot be bought as it stands.
    pub checkout_ready: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartItemView {
    pub product_id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub image: Option<String>,
    pub size: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub in_stock: u32,
    pub available: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CartItemInput {
    pub product_id: Uuid,
    pub size: Option<String>,
    #[validate(range(min = 0, max = 10, message = "Quantity must be between 1 and 10"))]
    #[serde(default = "one")]
    pub quantity: u32,
}

const fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartSyncInput {
    #[serde(default)]
    pub items: Vec<CartLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartSyncResult {
    pub added: usize,
    /// Local lines dropped because the product is unknown or not for sale.
    pub skipped: Vec<Uuid>,
    pub cart: CartView,
}

/// Flat fee below the free-shipping threshold; nothing for an empty cart.
pub fn shipping_fee(commerce: &CommerceConfig, subtotal: &Money) -> Money {
    if subtotal.amount() <= Decimal::ZERO || subtotal.amount() >= commerce.free_shipping_threshold {
        Money::zero(subtotal.currency())
    } else {
        Money::new(commerce.shipping_fee, subtotal.currency())
    }
}

/// Prices every line; lines whose product no longer exists are left out.
pub async fn price_cart(state: &AppState, cart: &Cart) -> AppResult<CartView> {
    let currency = state.config().commerce.currency.as_str();
    let mut items = Vec::with_capacity(cart.lines().len());
    let mut subtotal = Money::zero(currency);

    for line in cart.lines() {
        let Some(product) = get_product(state, line.product_id).await? else {
            continue;
        };
        let line_total = product.price().multiply(line.quantity);
        subtotal = subtotal.add(&line_total)?;
        items.push(CartItemView {
            product_id: product.id(),
            sku: product.sku().clone(),
            name: product.name().to_string(),
            image: product.images().first().cloned(),
            size: line.size.clone(),
            quantity: line.quantity,
            unit_price: product.price().clone(),
            line_total,
            in_stock: product.stock().value(),
            available: product.is_purchasable(line.quantity, line.size.as_deref()),
        });
    }

    let shipping_fee = shipping_fee(&state.config().commerce, &subtotal);
    Ok(CartView {
        item_count: items.iter().map(|i| i.quantity).sum(),
        checkout_ready: !items.is_empty() && items.iter().all(|i| i.available),
        total: subtotal.add(&shipping_fee)?,
        subtotal,
        shipping_fee,
        items,
    })
}

pub async fn view(state: &AppState, user_id: Uuid) -> AppResult<CartView> {
    let user = load_user(state, user_id).await?;
    price_cart(state, &user.cart).await
}

pub async fn add_item(state: &AppState, user_id: Uuid, input: CartItemInput) -> AppResult<CartView> {
    input.validate()?;
    let product = sellable_product(state, input.product_id).await?;
    let size = resolve_size(&product, input.size.as_deref())?;
    if !product.is_in_stock() {
        return Err(AppError::Conflict(format!("{} is out of stock", product.name())));
    }
    let mut user = load_user(state, user_id).await?;
    user.cart.add_item(product.id(), size, input.quantity)?;
    save_and_price(state, &mut user).await
}

/// Sets a line's quantity; zero removes the line.
pub async fn set_quantity(state: &AppState, user_id: Uuid, input: CartItemInput) -> AppResult<CartView> {
    input.validate()?;
    let mut user = load_user(state, user_id).await?;
    user.cart.set_quantity(input.product_id, input.size.as_deref(), input.quantity)?;
    save_and_price(state, &mut user).await
}

pub async fn remove_product(state: &AppState, user_id: Uuid, product_id: Uuid) -> AppResult<CartView> {
    let mut user = load_user(state, user_id).await?;
    user.cart.remove_product(product_id)?;
    save_and_price(state, &mut user).await
}

pub async fn clear(state: &AppState, user_id: Uuid) -> AppResult<CartView> {
    let mut user = load_user(state, user_id).await?;
    user.cart.clear();
    save_and_price(state, &mut user).await
}

/// Merges a client-side cart into the stored one. Lines already stored win.
pub async fn sync(state: &AppState, user_id: Uuid, input: CartSyncInput) -> AppResult<CartSyncResult> {
    let mut accepted = Vec::with_capacity(input.items.len());
    let mut skipped = Vec::new();
    for line in input.items {
        let known = get_product(state, line.product_id).await?.filter(Product::is_active);
        match known.map(|p| resolve_size(&p, line.size.as_deref())) {
            Some(Ok(size)) if line.quantity > 0 => accepted.push(CartLine {
                product_id: line.product_id,
                size,
                quantity: line.quantity.min(MAX_LINE_QUANTITY),
            }),
            _ => skipped.push(line.product_id),
        }
    }

    let mut user = load_user(state, user_id).await?;
    let added = user.cart.merge_local(accepted);
    let cart = save_and_price(state, &mut user).await?;
    Ok(CartSyncResult { added, skipped, cart })
}

async fn save_and_price(state: &AppState, user: &mut User) -> AppResult<CartView> {
    save_user(state, user).await?;
    price_cart(state, &user.cart).await
}

async fn sellable_product(state: &AppState, product_id: Uuid) -> AppResult<Product> {
    get_product(state, product_id)
        .await?
        .filter(Product::is_active)
        .ok_or_else(|| AppError::not_found("Product"))
}

/// Matches the requested size against the product's sizes, using the
/// product's spelling.
fn resolve_size(product: &Product, size: Option<&str>) -> AppResult<Option<String>> {
    let size = size.map(str::trim).filter(|s| !s.is_empty());
    match (product.sizes().is_empty(), size) {
        (true, _) => Ok(None),
        (false, None) => Err(AppError::BadRequest("Please select a size".into())),
        (false, Some(wanted)) => product
            .sizes()
            .iter()
            .find(|s| s.eq_ignore_ascii_case(wanted))
            .map(|s| Some(s.clone()))
            .ok_or_else(|| AppError::BadRequest(format!("Size {wanted} is not available"))),
    }
}

// =============================================================================
// Wishlist
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct WishlistSyncInput {
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
}

/// Wishlisted products that are still in the catalog.
pub async fn wishlist(state: &AppState, user_id: Uuid) -> AppResult<Vec<Product>> {
    let user = load_user(state, user_id).await?;
    wishlist_products(state, &user).await
}

pub async fn add_to_wishlist(state: &AppState, user_id: Uuid, product_id: Uuid) -> AppResult<Vec<Product>> {
    sellable_product(state, product_id).await?;
    let mut user = load_user(state, user_id).await?;
    if user.wishlist.add(product_id) {
        save_user(state, &mut user).await?;
    }
    wishlist_products(state, &user).await
}

pub async fn remove_from_wishlist(state: &AppState, user_id: Uuid, product_id: Uuid) -> AppResult<Vec<Product>> {
    let mut user = load_user(state, user_id).await?;
    if user.wishlist.remove(product_id) {
        save_user(state, &mut user).await?;
    }
    wishlist_products(state, &user).await
}

/// Union with the client-side list; unknown and unpublished products are
/// dropped.
pub async fn sync_wishlist(state: &AppState, user_id: Uuid, input: WishlistSyncInput) -> AppResult<Vec<Product>> {
    let mut known = Vec::with_capacity(input.product_ids.len());
    for id in input.product_ids {
        if get_product(state, id).await?.is_some_and(|p| p.is_active()) {
            known.push(id);
        }
    }
    let mut user = load_user(state, user_id).await?;
    if user.wishlist.merge(known) > 0 {
        save_user(state, &mut user).await?;
    }
    wishlist_products(state, &user).await
}

async fn wishlist_products(state: &AppState, user: &User) -> AppResult<Vec<Product>> {
    let mut products = Vec::with_capacity(user.wishlist.product_ids().len());
    for id in user.wishlist.product_ids() {
        if let Some(product) = get_product(state, *id).await?.filter(Product::is_active) {
            products.push(product);
        }
    }
    Ok(products)
}
