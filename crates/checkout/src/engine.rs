//! The checkout engine: one entry point over reservation, settlement,
//! expiry and fulfillment.

use std::sync::Arc;

use common::{OrderId, UserId};
use domain::{Cart, CartItem, Order, OrderStatus, Payment};
use serde::Serialize;
use store::CheckoutStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use mockable::{Clock, DefaultClock};
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, Result};
use crate::fulfillment::Fulfillment;
use crate::reaper::{ExpirationReaper, ExpiryOutcome, ExpiryTrigger, SweepReport};
use crate::reservation::ReservationCoordinator;
use crate::services::{LogNotifier, Notifier, PaymentGateway, SimulatedGateway};
use crate::settlement::{PaymentSettlement, Settlement};

/// An order as shown to its owner, with the payment if one was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub payment: Option<Payment>,
}

/// Wires the checkout components over a single store.
pub struct CheckoutEngine<S> {
    store: S,
    config: CheckoutConfig,
    reservations: ReservationCoordinator<S>,
    settlement: PaymentSettlement<S>,
    reaper: ExpirationReaper<S>,
    fulfillment: Fulfillment<S>,
}

impl<S> CheckoutEngine<S>
where
    S: CheckoutStore + Clone + 'static,
{
    pub fn new(
        store: S,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: CheckoutConfig,
    ) -> Self {
        let reaper = ExpirationReaper::new(store.clone(), Arc::clone(&clock), config.sweep_batch_size);

        let mut reservations =
            ReservationCoordinator::new(store.clone(), Arc::clone(&clock), config.hold_duration);
        if config.expiry_timers {
            reservations = reservations.with_scheduler(Arc::new(reaper.clone()));
        }

        let settlement =
            PaymentSettlement::new(store.clone(), gateway, notifier, Arc::clone(&clock));
        let fulfillment = Fulfillment::new(store.clone(), clock);

        Self {
            store,
            config,
            reservations,
            settlement,
            reaper,
            fulfillment,
        }
    }

    /// An engine with the simulated gateway, the log notifier and the
    /// system clock.
    pub fn with_defaults(store: S, config: CheckoutConfig) -> Self {
        let gateway = Arc::new(SimulatedGateway::new(config.payment_success_rate));
        Self::new(store, gateway, Arc::new(LogNotifier), Arc::new(DefaultClock), config)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Replaces the user's cart after checking every line refers to a known
    /// product with a positive quantity. Stock is not checked until
    /// checkout.
    #[tracing::instrument(skip(self, items))]
    pub async fn replace_cart(&self, user_id: UserId, items: Vec<CartItem>) -> Result<Cart> {
        for item in &items {
            if item.quantity == 0 {
                return Err(CheckoutError::InvalidQuantity {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                });
            }
            if self.store.get_product(&item.product_id).await?.is_none() {
                return Err(CheckoutError::ProductNotFound(item.product_id.clone()));
            }
        }

        let cart = Cart::new(user_id, items);
        self.store.put_cart(&cart).await?;
        Ok(cart)
    }

    /// See [`ReservationCoordinator::create_order_from_cart`].
    pub async fn create_order_from_cart(&self, user_id: UserId) -> Result<Order> {
        self.reservations.create_order_from_cart(user_id).await
    }

    /// See [`PaymentSettlement::pay`].
    pub async fn pay(&self, order_id: OrderId, user_id: UserId) -> Result<Settlement> {
        self.settlement.pay(order_id, user_id).await
    }

    /// Expires one order now if its hold has elapsed.
    pub async fn expire_order(&self, order_id: OrderId) -> Result<ExpiryOutcome> {
        self.reaper.expire_order(order_id, ExpiryTrigger::Sweep).await
    }

    /// Runs one expiry sweep.
    pub async fn sweep_expired_orders(&self) -> Result<SweepReport> {
        self.reaper.sweep().await
    }

    /// Starts the periodic sweep with the configured interval.
    pub fn spawn_sweeper(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        self.reaper
            .spawn_sweeper(self.config.sweep_interval, shutdown)
    }

    /// See [`Fulfillment::advance_status`].
    pub async fn advance_status(&self, order_id: OrderId, target: OrderStatus) -> Result<Order> {
        self.fulfillment.advance_status(order_id, target).await
    }

    /// Reads an order and its payment on behalf of its owner.
    #[tracing::instrument(skip(self))]
    pub async fn order_details(&self, order_id: OrderId, user_id: UserId) -> Result<OrderDetails> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;
        if !order.is_owned_by(user_id) {
            return Err(CheckoutError::Forbidden { order_id, user_id });
        }

        let payment = self.store.get_payment_for_order(order_id).await?;
        Ok(OrderDetails { order, payment })
    }
}
