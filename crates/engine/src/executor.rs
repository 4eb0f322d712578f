use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use common::{
    error_hint, Error, ExchangeClient, Notifier, Order, OrderId, OrderRequest, OrderSide,
    OrderStatus, OrderType,
};

use crate::journal::{Journal, PendingOrder};
use crate::retry::{with_retry, RetryExhausted, RetryPolicy};

/// Delays and bounds of the execution protocol.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub order_type: OrderType,
    /// Placement attempts while no order id has been obtained.
    pub placement: RetryPolicy,
    /// Wait before each read of a freshly placed order.
    pub settle_delay: Duration,
    /// Extra wait when the exchange has not recorded the order yet.
    pub not_recorded_delay: Duration,
    pub poll_interval: Duration,
    /// Wait after a failed status read.
    pub error_delay: Duration,
    /// Pause between balance reads while a sell settles.
    pub balance_poll_interval: Duration,
    /// Give up confirming after this long. `None` waits forever.
    pub confirm_timeout: Option<Duration>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_type: OrderType::Market,
            placement: RetryPolicy::default(),
            settle_delay: Duration::from_secs(3),
            not_recorded_delay: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            error_delay: Duration::from_secs(2),
            balance_poll_interval: Duration::from_secs(1),
            confirm_timeout: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No order id was ever obtained; nothing is in flight.
    #[error(transparent)]
    Exhausted(#[from] RetryExhausted<Error>),
    /// The order exists but its fill was not seen in time. `pending` is
    /// what the caller needs to resume it later.
    #[error("order {} not confirmed after {waited:?}", .pending.order.exchange_order_id)]
    Unconfirmed { pending: PendingOrder, waited: Duration },
    #[error("order {order_id} closed by the exchange without a fill")]
    Closed { order_id: OrderId },
}

/// Drives one order from placement to a confirmed fill.
///
/// Placement is retried only while no order id exists; from then on the
/// order is only polled, never placed again.
pub struct OrderExecutor {
    client: Arc<dyn ExchangeClient>,
    notifier: Arc<dyn Notifier>,
    config: ExecutionConfig,
    journal: Option<Journal>,
}

impl OrderExecutor {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        notifier: Arc<dyn Notifier>,
        config: ExecutionConfig,
        journal: Option<Journal>,
    ) -> Self {
        Self { client, notifier, config, journal }
    }

    /// Place `request` and wait for it to fill. Returns the filled order.
    pub async fn execute(&self, request: &OrderRequest) -> Result<Order, ExecutionError> {
        let symbol = request.pair.symbol();
        info!(
            pair = %request.pair,
            side = %request.side,
            qty = request.quantity,
            price = request.price,
            order_type = ?self.config.order_type,
            "Executing order"
        );

        // Sells are confirmed against the pre-order base balance.
        let base_balance_before = match request.side {
            OrderSide::Sell => {
                let client = &self.client;
                let base = request.pair.base.as_str();
                with_retry(self.config.placement, "read base balance", move || {
                    client.free_balance(base)
                })
                .await?
            }
            OrderSide::Buy => 0.0,
        };

        let order_id = {
            let this = self;
            let symbol = symbol.as_str();
            with_retry(self.config.placement, "place order", move || {
                this.place(symbol, request)
            })
            .await?
        };
        info!(order_id, %symbol, "Order placed, waiting for the exchange");

        let order = Order {
            pair: request.pair.clone(),
            side: request.side,
            requested_quantity: request.quantity,
            requested_price: match self.config.order_type {
                OrderType::Market => None,
                OrderType::Limit => Some(request.price),
            },
            exchange_order_id: order_id,
            status: OrderStatus::Pending,
        };

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record_submitted(&order, base_balance_before).await {
                error!(order_id, error = %e, "Failed to journal placed order");
            }
        }

        self.confirm(order, base_balance_before).await
    }

    /// Continue confirming an order placed before a restart or an earlier
    /// timeout. Never places anything.
    pub async fn resume(&self, pending: PendingOrder) -> Result<Order, ExecutionError> {
        info!(
            order_id = pending.order.exchange_order_id,
            pair = %pending.order.pair,
            side = %pending.order.side,
            "Resuming confirmation of in-flight order"
        );
        self.confirm(pending.order, pending.base_balance_before).await
    }

    async fn place(&self, symbol: &str, request: &OrderRequest) -> common::Result<OrderId> {
        match self.config.order_type {
            OrderType::Market => {
                self.client
                    .place_market_order(symbol, request.side, request.quantity)
                    .await
            }
            OrderType::Limit => {
                self.client
                    .place_limit_order(symbol, request.side, request.quantity, request.price)
                    .await
            }
        }
    }

    async fn confirm(
        &self,
        mut order: Order,
        base_balance_before: f64,
    ) -> Result<Order, ExecutionError> {
        let symbol = order.pair.symbol();
        let order_id = order.exchange_order_id;
        let started = Instant::now();

        // Submitted: wait until the exchange knows the order.
        let mut status = loop {
            pause(self.config.settle_delay).await;
            match self.client.order_status(&symbol, order_id).await {
                Ok(status) => break status,
                Err(e) => {
                    log_status_error(order_id, &e);
                    pause(self.config.not_recorded_delay).await;
                }
            }
            self.check_deadline(&order, base_balance_before, started)?;
        };

        // ConfirmedPending: poll until FILLED.
        loop {
            match status {
                OrderStatus::Filled => break,
                OrderStatus::Cancelled => {
                    warn!(order_id, "Order closed by the exchange without a fill");
                    if let Some(journal) = &self.journal {
                        if let Err(e) = journal.mark_closed(order_id).await {
                            error!(order_id, error = %e, "Failed to journal closed order");
                        }
                    }
                    return Err(ExecutionError::Closed { order_id });
                }
                OrderStatus::Pending | OrderStatus::Unknown => {
                    debug!(order_id, ?status, "Order not filled yet");
                }
            }
            self.check_deadline(&order, base_balance_before, started)?;
            match self.client.order_status(&symbol, order_id).await {
                Ok(s) => {
                    status = s;
                    if status != OrderStatus::Filled {
                        pause(self.config.poll_interval).await;
                    }
                }
                Err(e) => {
                    log_status_error(order_id, &e);
                    pause(self.config.error_delay).await;
                }
            }
        }

        if order.side == OrderSide::Sell {
            self.await_balance_drop(&order, base_balance_before, started).await?;
        }

        order.status = OrderStatus::Filled;
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.mark_filled(order_id).await {
                error!(order_id, error = %e, "Failed to journal filled order");
            }
        }

        let verb = match order.side {
            OrderSide::Buy => "Bought",
            OrderSide::Sell => "Sold",
        };
        let msg = format!("{verb} {} of {}", order.requested_quantity, order.pair.base);
        info!(order_id, "{msg}");
        self.notifier.notify(msg);

        Ok(order)
    }

    /// A sell is only done once the base balance has actually dropped.
    async fn await_balance_drop(
        &self,
        order: &Order,
        before: f64,
        started: Instant,
    ) -> Result<(), ExecutionError> {
        let asset = order.pair.base.as_str();
        loop {
            match self.client.free_balance(asset).await {
                Ok(now) if now < before => {
                    debug!(asset, before, now, "Sell settled in balance");
                    return Ok(());
                }
                Ok(now) => debug!(asset, before, now, "Balance not updated yet"),
                Err(e) => warn!(asset, error = %e, "Balance read failed"),
            }
            self.check_deadline(order, before, started)?;
            pause(self.config.balance_poll_interval).await;
        }
    }

    fn check_deadline(
        &self,
        order: &Order,
        base_balance_before: f64,
        started: Instant,
    ) -> Result<(), ExecutionError> {
        match self.config.confirm_timeout {
            Some(limit) if started.elapsed() >= limit => Err(ExecutionError::Unconfirmed {
                pending: PendingOrder { order: order.clone(), base_balance_before },
                waited: started.elapsed(),
            }),
            _ => Ok(()),
        }
    }
}

fn log_status_error(order_id: OrderId, e: &Error) {
    let hint = e.api_code().and_then(error_hint).unwrap_or_default();
    if e.is_order_not_filled() {
        debug!(order_id, error = %e, hint, "Order status not available yet");
    } else {
        warn!(order_id, error = %e, hint, "Order status read failed");
    }
}

async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}
