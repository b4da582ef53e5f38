//! Resting buy orders and their escrow

use crate::error::StoreResult;
use crate::users;
use sqlx::{Row, SqliteConnection};
use stash_domain::{BuyOrder, ListingId, Price, UnixSeconds, UserId};

fn parse_order(row: &sqlx::sqlite::SqliteRow) -> StoreResult<BuyOrder> {
    Ok(BuyOrder {
        user_id: row.try_get("user_id")?,
        listing_id: row.try_get("listing_id")?,
        price: Price::bid(row.try_get("price")?)?,
        quantity: row.try_get("quantity")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Which of a user's buy orders to cancel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelScope {
    /// Every order of the user
    All,
    /// Every order of the user in one listing
    Listing(ListingId),
    /// The single order at one price level
    PriceLevel(ListingId, Price),
}

/// Highest bid at or above `min_price`, earliest created first on ties
pub async fn best_bid(
    conn: &mut SqliteConnection,
    listing_id: ListingId,
    min_price: Price,
) -> StoreResult<Option<BuyOrder>> {
    let row = sqlx::query(
        "SELECT user_id, listing_id, quantity, price, created_at FROM listing_buy_orders \
         WHERE listing_id = ? AND price >= ? ORDER BY price DESC, created_at ASC LIMIT 1",
    )
    .bind(listing_id)
    .bind(min_price.amount())
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(parse_order).transpose()
}

/// Consume one unit of a resting order, deleting it when it reaches zero
pub async fn take_one(conn: &mut SqliteConnection, order: &BuyOrder) -> StoreResult<()> {
    sqlx::query(
        "DELETE FROM listing_buy_orders WHERE quantity = 1 AND user_id = ? AND listing_id = ? AND price = ?",
    )
    .bind(order.user_id)
    .bind(order.listing_id)
    .bind(order.price.amount())
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "UPDATE listing_buy_orders SET quantity = quantity - 1 WHERE user_id = ? AND listing_id = ? AND price = ?",
    )
    .bind(order.user_id)
    .bind(order.listing_id)
    .bind(order.price.amount())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Rest `quantity` more units at `price`, merging with an existing order at that level
pub async fn rest_bid(
    conn: &mut SqliteConnection,
    user_id: UserId,
    listing_id: ListingId,
    price: Price,
    quantity: i64,
    now: UnixSeconds,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO listing_buy_orders (user_id, listing_id, quantity, price, created_at) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (user_id, listing_id, price) DO UPDATE SET quantity = quantity + excluded.quantity",
    )
    .bind(user_id)
    .bind(listing_id)
    .bind(quantity)
    .bind(price.amount())
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Cancel orders in `scope`, refunding their escrow to the balance.
///
/// Returns the amount refunded.
pub async fn cancel_bids(
    conn: &mut SqliteConnection,
    user_id: UserId,
    scope: CancelScope,
) -> StoreResult<i64> {
    let (filter, listing, price) = match scope {
        CancelScope::All => ("user_id = ?", None, None),
        CancelScope::Listing(listing_id) => ("user_id = ? AND listing_id = ?", Some(listing_id), None),
        CancelScope::PriceLevel(listing_id, price) => (
            "user_id = ? AND listing_id = ? AND price = ?",
            Some(listing_id),
            Some(price.amount()),
        ),
    };

    let sum_sql = format!(
        "SELECT COALESCE(SUM(price * quantity), 0) FROM listing_buy_orders WHERE {}",
        filter
    );
    let mut sum = sqlx::query_scalar::<_, i64>(&sum_sql).bind(user_id);
    if let Some(listing_id) = listing {
        sum = sum.bind(listing_id);
    }
    if let Some(price) = price {
        sum = sum.bind(price);
    }
    let refund = sum.fetch_one(&mut *conn).await?;

    let delete_sql = format!("DELETE FROM listing_buy_orders WHERE {}", filter);
    let mut delete = sqlx::query(&delete_sql).bind(user_id);
    if let Some(listing_id) = listing {
        delete = delete.bind(listing_id);
    }
    if let Some(price) = price {
        delete = delete.bind(price);
    }
    delete.execute(&mut *conn).await?;

    if refund > 0 {
        users::credit(conn, user_id, refund).await?;
    }
    Ok(refund)
}

/// Open buy orders of a user, best price first
pub async fn orders_of(conn: &mut SqliteConnection, user_id: UserId) -> StoreResult<Vec<BuyOrder>> {
    let rows = sqlx::query(
        "SELECT user_id, listing_id, quantity, price, created_at FROM listing_buy_orders \
         WHERE user_id = ? ORDER BY listing_id, price DESC",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(parse_order).collect()
}
