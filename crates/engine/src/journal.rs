use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, info};

use common::{Error, Order, OrderId, OrderSide, PositionState, Result, TradingPair};

/// An order recorded as PENDING: placed on the exchange, fill not yet seen.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub order: Order,
    /// Free base balance before placement; sells wait for it to drop.
    pub base_balance_before: f64,
}

/// Durable record of in-flight orders and the committed position, so a
/// restart resumes polling instead of forgetting an order.
#[derive(Clone)]
pub struct Journal {
    db: SqlitePool,
}

type OrderRow = (i64, String, String, OrderSide, f64, Option<f64>, f64);

impl Journal {
    /// Open (creating if needed) the database at `url` and apply migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        // One connection: keeps `sqlite::memory:` a single shared database.
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await?;
        sqlx::migrate!("../../migrations")
            .run(&db)
            .await
            .map_err(|e| Error::Database(e.into()))?;
        info!(url, "Order journal ready");
        Ok(Self { db })
    }

    pub async fn record_submitted(&self, order: &Order, base_balance_before: f64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO orders
                (order_id, base_asset, quote_asset, side, quantity, price, status,
                 base_balance_before, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'PENDING', ?7, ?8, ?8)
            ON CONFLICT(order_id) DO NOTHING
            "#,
        )
        .bind(order.exchange_order_id)
        .bind(&order.pair.base)
        .bind(&order.pair.quote)
        .bind(order.side)
        .bind(order.requested_quantity)
        .bind(order.requested_price)
        .bind(base_balance_before)
        .bind(&now)
        .execute(&self.db)
        .await?;
        debug!(order_id = order.exchange_order_id, "Journaled pending order");
        Ok(())
    }

    pub async fn mark_filled(&self, order_id: OrderId) -> Result<()> {
        self.set_status(order_id, "FILLED").await
    }

    /// Closed by the exchange without a fill.
    pub async fn mark_closed(&self, order_id: OrderId) -> Result<()> {
        self.set_status(order_id, "CLOSED").await
    }

    async fn set_status(&self, order_id: OrderId, status: &str) -> Result<()> {
        sqlx::query("UPDATE orders SET status = ?1, updated_at = ?2 WHERE order_id = ?3")
            .bind(status)
            .bind(Utc::now().to_rfc3339())
            .bind(order_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// The oldest order still PENDING, if any.
    pub async fn in_flight(&self) -> Result<Option<PendingOrder>> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT order_id, base_asset, quote_asset, side, quantity, price, base_balance_before
            FROM orders
            WHERE status = 'PENDING'
            ORDER BY created_at, order_id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(id, base, quote, side, quantity, price, before)| PendingOrder {
            order: Order {
                pair: TradingPair::new(base, quote),
                side,
                requested_quantity: quantity,
                requested_price: price,
                exchange_order_id: id,
                status: common::OrderStatus::Pending,
            },
            base_balance_before: before,
        }))
    }

    pub async fn load_position(&self) -> Result<Option<PositionState>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT position FROM session WHERE id = 1")
            .fetch_optional(&self.db)
            .await?;
        row.map(|(p,)| p.parse()).transpose()
    }

    pub async fn save_position(&self, position: PositionState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session (id, position, updated_at) VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET position = excluded.position,
                                          updated_at = excluded.updated_at
            "#,
        )
        .bind(position.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn journal() -> Journal {
        Journal::connect("sqlite::memory:").await.unwrap()
    }

    fn order(id: OrderId, side: OrderSide) -> Order {
        Order {
            pair: TradingPair::new("BTC", "USDT"),
            side,
            requested_quantity: 0.012,
            requested_price: None,
            exchange_order_id: id,
            status: common::OrderStatus::Pending,
        }
    }

    #[tokio::test]
    async fn pending_order_round_trips_until_filled() {
        let j = journal().await;
        assert!(j.in_flight().await.unwrap().is_none());

        j.record_submitted(&order(42, OrderSide::Sell), 0.5).await.unwrap();
        let pending = j.in_flight().await.unwrap().unwrap();
        assert_eq!(pending.order.exchange_order_id, 42);
        assert_eq!(pending.order.side, OrderSide::Sell);
        assert_eq!(pending.order.pair.symbol(), "BTCUSDT");
        assert_eq!(pending.base_balance_before, 0.5);

        j.mark_filled(42).await.unwrap();
        assert!(j.in_flight().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_orders_leave_flight() {
        let j = journal().await;
        j.record_submitted(&order(7, OrderSide::Buy), 0.0).await.unwrap();
        j.mark_closed(7).await.unwrap();
        assert!(j.in_flight().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn position_defaults_to_none_then_persists() {
        let j = journal().await;
        assert_eq!(j.load_position().await.unwrap(), None);
        j.save_position(PositionState::Long).await.unwrap();
        j.save_position(PositionState::Flat).await.unwrap();
        j.save_position(PositionState::Long).await.unwrap();
        assert_eq!(j.load_position().await.unwrap(), Some(PositionState::Long));
    }
}
