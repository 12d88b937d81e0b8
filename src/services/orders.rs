//! Checkout, payment confirmation, shipment and order management.
//!
//! ```text
//! checkout ─► gateway order ─► client pays ─► verify / webhook ─► Paid
//!                                                      │
//!                 shipment created (Processing) ◄──────┘
//!                          │
//!        AWB assigned (Shipped) ◄── refresher task / long-poll
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout_at};
use uuid::Uuid;

use super::accounts::{load_user, save_user};
use super::cart::shipping_fee;
use super::catalog::{get_product, save_product};
use super::{Paginated, Pagination};
use crate::domain::Money;
use crate::domain::aggregates::{LineItem, Order, OrderStatus};
use crate::error::{AppError, AppResult};
use crate::integrations::razorpay::WebhookEvent;
use crate::integrations::{GatewayOrder, OutgoingEmail};
use crate::state::AppState;
use crate::store::{Filter, Query, Sort};

/// How often a waiting shipment request checks for an AWB code.
pub const AWB_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Upper bound on `?wait=` for the shipment status endpoint.
pub const MAX_AWB_WAIT: Duration = Duration::from_secs(30);

// =============================================================================
// Checkout
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutInput {
    /// Defaults to the user's default address.
    pub address_id: Option<Uuid>,
}

/// What the client needs to open the payment widget.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub order: Order,
    pub gateway_order: GatewayOrder,
    pub key_id: String,
}

pub async fn checkout(state: &AppState, user_id: Uuid, input: CheckoutInput) -> AppResult<CheckoutSession> {
    let gateway = state.payments()?;
    let user = load_user(state, user_id).await?;
    if user.cart.is_empty() {
        return Err(AppError::BadRequest("Your cart is empty".into()));
    }
    let address = match input.address_id {
        Some(id) => user.address(id),
        None => user.default_address(),
    }
    .cloned()
    .ok_or_else(|| AppError::BadRequest("Please choose a shipping address".into()))?;

    let mut items = Vec::with_capacity(user.cart.lines().len());
    for line in user.cart.lines() {
        let product = get_product(state, line.product_id)
            .await?
            .ok_or_else(|| AppError::Conflict("An item in your cart is no longer available".into()))?;
        if !product.is_purchasable(line.quantity, line.size.as_deref()) {
            return Err(AppError::Conflict(format!(
                "{} is not available in the requested quantity",
                product.name()
            )));
        }
        items.push(LineItem::from_product(&product, line.size.clone(), line.quantity));
    }

    let currency = state.config().commerce.currency.clone();
    let subtotal = items.iter().try_fold(Money::zero(&currency), |acc, i| acc.add(&i.total))?;
    let fee = shipping_fee(&state.config().commerce, &subtotal);
    let mut order = Order::place(user.id(), user.email(), address, items, fee)?;

    let gateway_order = gateway.create_order(order.total(), order.order_number()).await?;
    order.attach_gateway_order(&gateway_order.id);
    state.collection::<Order>().insert(&order).await?;
    state.events().publish_all(order.take_events()).await;
    tracing::info!(order_id = %order.id(), order_number = %order.order_number(), total = %order.total(), "Order placed");

    Ok(CheckoutSession { order, gateway_order, key_id: gateway.key_id().to_string() })
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentInput {
    pub order_id: Uuid,
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

/// Confirms the payment the client reports. A bad signature marks the
/// payment failed.
pub async fn verify_payment(state: &AppState, user_id: Uuid, input: VerifyPaymentInput) -> AppResult<Order> {
    let gateway = state.payments()?;
    let mut order = get_own_order(state, user_id, input.order_id).await?;

    if order.payment().gateway_order_id.as_deref() != Some(input.razorpay_order_id.as_str()) {
        return Err(AppError::BadRequest("Payment does not belong to this order".into()));
    }
    if order.status().is_paid() {
        // The webhook got here first.
        return Ok(order);
    }

    let valid = gateway.verify_payment_signature(
        &input.razorpay_order_id,
        &input.razorpay_payment_id,
        &input.razorpay_signature,
    );
    if !valid {
        tracing::warn!(order_id = %order.id(), "Payment signature mismatch");
        if order.status() == OrderStatus::PendingPayment {
            order.mark_payment_failed()?;
            save_transition(state, &mut order, OrderStatus::PendingPayment).await?;
        }
        return Err(AppError::BadRequest("Payment verification failed".into()));
    }

    if order.status() == OrderStatus::Cancelled {
        record_late_capture(state, &mut order, &input.razorpay_payment_id).await?;
    } else {
        complete_payment(state, &mut order, &input.razorpay_payment_id).await?;
    }
    Ok(order)
}

/// Reconciles orders from gateway webhooks. Unknown events are ignored.
pub async fn handle_webhook(state: &AppState, body: &[u8], signature: &str) -> AppResult<()> {
    let gateway = state.payments()?;
    if !gateway.verify_webhook_signature(body, signature) {
        return Err(AppError::BadRequest("Invalid webhook signature".into()));
    }
    let event: WebhookEvent =
        serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid webhook body: {e}")))?;
    let Some(payment) = event.payload.payment.map(|p| p.entity) else {
        return Ok(());
    };
    let Some(gateway_order_id) = payment.order_id.as_deref() else {
        return Ok(());
    };
    let Some(mut order) = state
        .collection::<Order>()
        .find_one(Filter::new().eq("payment.gateway_order_id", gateway_order_id))
        .await?
    else {
        tracing::warn!(gateway_order_id, event = %event.event, "Webhook for unknown order");
        return Ok(());
    };

    match event.event.as_str() {
        "payment.captured" | "order.paid" if order.status() == OrderStatus::Cancelled => {
            record_late_capture(state, &mut order, &payment.id).await?;
        }
        "payment.captured" | "order.paid" if !order.status().is_paid() => {
            complete_payment(state, &mut order, &payment.id).await?;
        }
        "payment.failed" if order.status() == OrderStatus::PendingPayment => {
            order.mark_payment_failed()?;
            save_transition(state, &mut order, OrderStatus::PendingPayment).await?;
        }
        other => tracing::debug!(event = other, order_id = %order.id(), "Webhook ignored"),
    }
    Ok(())
}

/// Money arrived for an order that was cancelled meanwhile. The order stays
/// cancelled and is flagged for a refund.
async fn record_late_capture(state: &AppState, order: &mut Order, payment_id: &str) -> AppResult<()> {
    if order.record_late_capture(payment_id)? && save_transition(state, order, OrderStatus::Cancelled).await? {
        tracing::error!(order_id = %order.id(), payment_id, "Payment captured for a cancelled order, refund due");
    }
    Ok(())
}

/// Marks the order paid, then takes stock, empties the cart, sends the
/// confirmation and books the shipment. Only the state change can fail the
/// call; the rest is logged.
///
/// Client verification and the gateway webhook usually arrive together. Only
/// the request whose write moves the order to `Paid` runs the side effects;
/// the other one returns the order as stored.
async fn complete_payment(state: &AppState, order: &mut Order, payment_id: &str) -> AppResult<()> {
    let from = order.status();
    order.mark_paid(payment_id)?;
    if !save_transition(state, order, from).await? {
        if order.status() == OrderStatus::Cancelled {
            return record_late_capture(state, order, payment_id).await;
        }
        tracing::info!(order_id = %order.id(), payment_id, "Payment already recorded");
        return Ok(());
    }
    tracing::info!(order_id = %order.id(), payment_id, "Payment captured");

    for item in order.items() {
        if let Err(e) = take_stock(state, item.product_id, item.quantity).await {
            tracing::warn!(error = %e, product_id = %item.product_id, "Could not update stock");
        }
    }

    match load_user(state, order.user_id()).await {
        Ok(mut user) => {
            user.cart.clear();
            if let Err(e) = save_user(state, &mut user).await {
                tracing::warn!(error = %e, "Could not clear cart");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Could not load buyer"),
    }

    let email = OutgoingEmail {
        to: order.email().to_string(),
        subject: format!("Order {} confirmed", order.order_number()),
        body: confirmation_body(order),
    };
    if let Err(e) = state.mailer().send(email).await {
        tracing::warn!(error = %e, order_id = %order.id(), "Confirmation email failed");
    }

    if state.shipping().is_ok() {
        if let Err(e) = create_shipment(state, order).await {
            tracing::warn!(error = %e, order_id = %order.id(), "Shipment creation failed, will need a retry");
        }
    }
    Ok(())
}

async fn take_stock(state: &AppState, product_id: Uuid, quantity: u32) -> AppResult<()> {
    let mut product = get_product(state, product_id).await?.ok_or_else(|| AppError::not_found("Product"))?;
    if product.remove_stock(quantity).is_err() {
        tracing::warn!(product_id = %product_id, "Sold more than in stock");
        product.set_stock(0);
    }
    save_product(state, &mut product).await
}

async fn return_stock(state: &AppState, order: &Order) {
    for item in order.items() {
        let restocked = match get_product(state, item.product_id).await {
            Ok(Some(mut product)) => {
                product.add_stock(item.quantity);
                save_product(state, &mut product).await
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = restocked {
            tracing::warn!(error = %e, product_id = %item.product_id, "Could not return stock");
        }
    }
}

fn confirmation_body(order: &Order) -> String {
    let lines: Vec<String> = order
        .items()
        .iter()
        .map(|i| format!("  {} x {}{}  {}", i.quantity, i.name, i.size.as_deref().map(|s| format!(" ({s})")).unwrap_or_default(), i.total))
        .collect();
    format!(
        "Thank you for your order {}.\n\n{}\n\nSubtotal: {}\nShipping: {}\nTotal: {}\n\nWe will email you again when it ships.",
        order.order_number(),
        lines.join("\n"),
        order.subtotal(),
        order.shipping_fee(),
        order.total(),
    )
}

// =============================================================================
// Shipment
// =============================================================================

/// Books the shipment for a paid order and asks for an AWB straight away.
pub async fn create_shipment(state: &AppState, order: &mut Order) -> AppResult<()> {
    let provider = state.shipping()?;
    if order.status() != OrderStatus::Paid {
        return Err(AppError::Conflict(format!("Order is {}, not paid", order.status().as_str())));
    }
    let record = provider.create_shipment(order).await?;
    let shipment_id = record.shipment_id.clone();
    order.attach_shipment(record)?;
    if !save_transition(state, order, OrderStatus::Paid).await? {
        tracing::warn!(order_id = %order.id(), shipment_id, "Order changed while booking, shipment not recorded");
        return Err(AppError::Conflict(format!("Order is {}, not paid", order.status().as_str())));
    }
    tracing::info!(order_id = %order.id(), "Shipment created");

    if order.awb_code().is_none() {
        refresh_awb(state, order).await?;
    }
    Ok(())
}

/// Asks the provider for an AWB code. Returns true when one was assigned.
pub async fn refresh_awb(state: &AppState, order: &mut Order) -> AppResult<bool> {
    if order.status() != OrderStatus::Processing || order.awb_code().is_some() {
        return Ok(false);
    }
    let Some(shipment_id) = order.shipment().map(|s| s.shipment_id.clone()).filter(|id| !id.is_empty()) else {
        return Ok(false);
    };
    let Some(assignment) = state.shipping()?.assign_awb(&shipment_id).await? else {
        return Ok(false);
    };
    order.assign_awb(assignment.awb_code, assignment.courier_name)?;
    if !save_transition(state, order, OrderStatus::Processing).await? {
        return Ok(false);
    }
    tracing::info!(order_id = %order.id(), awb = ?order.awb_code(), "AWB assigned");
    Ok(true)
}

/// Current shipment state of an order, as polled by the client.
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentStatus {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
    pub tracking_status: Option<String>,
    pub tracking_url: Option<String>,
}

impl ShipmentStatus {
    fn of(state: &AppState, order: &Order) -> Self {
        let shipment = order.shipment();
        let awb_code = order.awb_code().map(str::to_string);
        Self {
            order_id: order.id(),
            status: order.status(),
            tracking_url: awb_code
                .as_deref()
                .and_then(|awb| state.shipping().ok().map(|p| p.tracking_url(awb))),
            awb_code,
            courier_name: shipment.and_then(|s| s.courier_name.clone()),
            tracking_status: shipment.and_then(|s| s.tracking_status.clone()),
        }
    }
}

/// Shipment state of the user's order. With `wait`, keeps checking every
/// [`AWB_POLL_INTERVAL`] for up to `wait` (at most [`MAX_AWB_WAIT`]) until an
/// AWB code shows up.
pub async fn shipment_status(state: &AppState, user_id: Uuid, order_id: Uuid, wait: Duration) -> AppResult<ShipmentStatus> {
    let mut order = get_own_order(state, user_id, order_id).await?;
    if order.status() == OrderStatus::Processing && order.awb_code().is_none() && !wait.is_zero() {
        wait_for_awb(state, &mut order, Instant::now() + wait.min(MAX_AWB_WAIT)).await;
    } else if order.status() == OrderStatus::Shipped {
        refresh_tracking(state, &mut order).await;
    }
    Ok(ShipmentStatus::of(state, &order))
}

/// Only the sleep between checks is bounded by `deadline`; a check that has
/// started always runs to completion, so an AWB the provider hands out is
/// never lost.
async fn wait_for_awb(state: &AppState, order: &mut Order, deadline: Instant) {
    let mut ticker = interval(AWB_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        if timeout_at(deadline, ticker.tick()).await.is_err() {
            return;
        }
        match refresh_awb(state, order).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, order_id = %order.id(), "AWB check failed");
                return;
            }
        }
        // Another request or the refresher may have moved the order on.
        match state.collection::<Order>().get(order.id()).await {
            Ok(Some(latest)) if latest.status() != OrderStatus::Processing || latest.awb_code().is_some() => {
                *order = latest;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Order reload failed");
                return;
            }
        }
    }
}

/// Pulls the courier's status for a shipped order; delivery closes the order.
async fn refresh_tracking(state: &AppState, order: &mut Order) {
    let (Ok(provider), Some(awb)) = (state.shipping(), order.awb_code().map(str::to_string)) else {
        return;
    };
    let info = match provider.track(&awb).await {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(error = %e, awb = %awb, "Tracking lookup failed");
            return;
        }
    };
    order.record_tracking_status(&info.status);
    if info.delivered {
        if let Err(e) = order.deliver() {
            tracing::warn!(error = %e, "Could not mark delivered");
        }
    }
    if let Err(e) = save_transition(state, order, OrderStatus::Shipped).await {
        tracing::warn!(error = %e, "Could not save tracking status");
    }
}

/// Tracking page for the user's order, once it has an AWB code.
pub async fn tracking_url(state: &AppState, user_id: Uuid, order_id: Uuid) -> AppResult<String> {
    let order = get_own_order(state, user_id, order_id).await?;
    let awb = order
        .awb_code()
        .ok_or_else(|| AppError::NotFound("Tracking is not available for this order yet".into()))?;
    Ok(state.shipping()?.tracking_url(awb))
}

/// Periodically asks for AWB codes of orders that are still waiting for one.
pub fn spawn_shipment_refresher(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = refresh_pending_shipments(&state).await {
                tracing::warn!(error = %e, "Shipment refresh failed");
            }
        }
    })
}

/// Returns how many orders got an AWB code.
pub async fn refresh_pending_shipments(state: &AppState) -> AppResult<usize> {
    if state.shipping().is_err() {
        return Ok(0);
    }
    let pending = state
        .collection::<Order>()
        .all(Filter::new().eq("status", OrderStatus::Processing), Sort::Oldest)
        .await?;
    let mut assigned = 0;
    for mut order in pending.into_iter().filter(|o| o.awb_code().is_none()) {
        match refresh_awb(state, &mut order).await {
            Ok(true) => assigned += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, order_id = %order.id(), "AWB refresh failed"),
        }
    }
    if assigned > 0 {
        tracing::info!(assigned, "AWB codes assigned");
    }
    Ok(assigned)
}

// =============================================================================
// Customer orders
// =============================================================================

pub async fn list_own_orders(state: &AppState, user_id: Uuid, pagination: Pagination) -> AppResult<Paginated<Order>> {
    let query = Query::new(Filter::new().eq("user_id", user_id)).paged(pagination.to_page());
    let (orders, total) = state.collection::<Order>().find(&query).await?;
    Ok(Paginated::new(orders, total, pagination))
}

/// Someone else's order reads as missing.
pub async fn get_own_order(state: &AppState, user_id: Uuid, order_id: Uuid) -> AppResult<Order> {
    get_order(state, order_id)
        .await?
        .filter(|o| o.user_id() == user_id)
        .ok_or_else(|| AppError::not_found("Order"))
}

/// Cancels before shipping. Paid orders get their stock back.
pub async fn cancel_own_order(state: &AppState, user_id: Uuid, order_id: Uuid) -> AppResult<Order> {
    let mut order = get_own_order(state, user_id, order_id).await?;
    cancel(state, &mut order).await?;
    Ok(order)
}

async fn cancel(state: &AppState, order: &mut Order) -> AppResult<()> {
    let from = order.status();
    order.cancel()?;
    if !save_transition(state, order, from).await? {
        return Err(changed_meanwhile(order));
    }
    if from.is_paid() {
        return_stock(state, order).await;
    }
    tracing::info!(order_id = %order.id(), "Order cancelled");
    Ok(())
}

// =============================================================================
// Admin
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<OrderStatus>,
    /// Order number or email.
    pub search: Option<String>,
}

pub async fn list_orders(state: &AppState, params: &OrderListParams) -> AppResult<Paginated<Order>> {
    let pagination = Pagination { page: params.page, per_page: params.per_page };
    let mut filter = Filter::new().search(&["order_number", "email"], params.search.as_deref().unwrap_or_default());
    if let Some(status) = params.status {
        filter = filter.eq("status", status);
    }
    let query = Query::new(filter).paged(pagination.to_page());
    let (orders, total) = state.collection::<Order>().find(&query).await?;
    Ok(Paginated::new(orders, total, pagination))
}

pub async fn get_order(state: &AppState, order_id: Uuid) -> AppResult<Option<Order>> {
    Ok(state.collection::<Order>().get(order_id).await?)
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateInput {
    pub status: OrderStatus,
    /// Required to mark an order shipped by hand.
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
}

/// Moves an order through the state machine on an admin's behalf.
pub async fn update_status(state: &AppState, order_id: Uuid, input: StatusUpdateInput) -> AppResult<Order> {
    let mut order = get_order(state, order_id).await?.ok_or_else(|| AppError::not_found("Order"))?;
    let from = order.status();
    match input.status {
        OrderStatus::Paid => {
            complete_payment(state, &mut order, "manual").await?;
            return Ok(order);
        }
        OrderStatus::Cancelled => {
            cancel(state, &mut order).await?;
            return Ok(order);
        }
        OrderStatus::PaymentFailed => order.mark_payment_failed()?,
        OrderStatus::Shipped => {
            let awb = input.awb_code.unwrap_or_default();
            order.assign_awb(awb, input.courier_name)?;
        }
        OrderStatus::Delivered => order.deliver()?,
        OrderStatus::Processing => {
            return Err(AppError::BadRequest("Create the shipment to start processing".into()));
        }
        OrderStatus::PendingPayment => {
            return Err(AppError::BadRequest("Orders cannot go back to pending payment".into()));
        }
    }
    if !save_transition(state, &mut order, from).await? {
        return Err(changed_meanwhile(&order));
    }
    tracing::info!(order_id = %order.id(), status = order.status().as_str(), "Order status updated");
    Ok(order)
}

/// Books the shipment again after a failure, or re-asks for the AWB code.
pub async fn retry_shipment(state: &AppState, order_id: Uuid) -> AppResult<Order> {
    let mut order = get_order(state, order_id).await?.ok_or_else(|| AppError::not_found("Order"))?;
    match order.status() {
        OrderStatus::Paid => create_shipment(state, &mut order).await?,
        OrderStatus::Processing => {
            refresh_awb(state, &mut order).await?;
        }
        other => return Err(AppError::Conflict(format!("Order is {}", other.as_str()))),
    }
    Ok(order)
}

/// Saves a change made to an order loaded in status `from`, and publishes
/// its events. When another request has moved the order on since, nothing is
/// written, `order` is reloaded and false is returned.
async fn save_transition(state: &AppState, order: &mut Order, from: OrderStatus) -> AppResult<bool> {
    if state.collection::<Order>().save_if(order, "status", from).await? {
        state.events().publish_all(order.take_events()).await;
        return Ok(true);
    }
    *order = get_order(state, order.id()).await?.ok_or_else(|| AppError::not_found("Order"))?;
    Ok(false)
}

fn changed_meanwhile(order: &Order) -> AppError {
    AppError::Conflict(format!("Order was updated meanwhile and is now {}", order.status().as_str()))
}
