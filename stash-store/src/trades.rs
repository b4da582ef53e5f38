//! Completed trade log (append-only)

use crate::error::StoreResult;
use sqlx::{Row, SqliteConnection};
use stash_domain::{CompletedTrade, UserId};

/// Append a settlement record
pub async fn record_trade(conn: &mut SqliteConnection, trade: &CompletedTrade) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO completed_listing_trades (buyer_id, seller_id, listing_id, price, timestamp) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(trade.buyer_id)
    .bind(trade.seller_id)
    .bind(trade.listing_id)
    .bind(trade.price)
    .bind(trade.timestamp)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Trades a user took part in, newest first
pub async fn trades_of(conn: &mut SqliteConnection, user_id: UserId) -> StoreResult<Vec<CompletedTrade>> {
    let rows = sqlx::query(
        "SELECT buyer_id, seller_id, listing_id, price, timestamp FROM completed_listing_trades \
         WHERE buyer_id = ? OR seller_id = ? ORDER BY timestamp DESC, rowid DESC",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut trades = Vec::with_capacity(rows.len());
    for row in rows {
        trades.push(CompletedTrade {
            buyer_id: row.try_get("buyer_id")?,
            seller_id: row.try_get("seller_id")?,
            listing_id: row.try_get("listing_id")?,
            price: row.try_get("price")?,
            timestamp: row.try_get("timestamp")?,
        });
    }
    Ok(trades)
}

/// Number of trades ever settled
pub async fn count_trades(conn: &mut SqliteConnection) -> StoreResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM completed_listing_trades")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}
