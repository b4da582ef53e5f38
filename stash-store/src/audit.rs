//! Ledger audits

use crate::error::{StoreError, StoreResult};
use sqlx::{Row, SqliteConnection};
use tracing::error;

/// Check that every listing has exactly as many slots as confirmed items.
///
/// # Errors
/// [`StoreError::ConservationViolated`] naming the first listing that disagrees.
pub async fn verify_conservation(conn: &mut SqliteConnection) -> StoreResult<()> {
    let row = sqlx::query(
        "SELECT debts.listing_id, debts.cnt AS in_slots, storage.cnt AS in_storage FROM \
           (SELECT listings.listing_id, COUNT(slots.listing_id) AS cnt FROM listings \
              LEFT OUTER JOIN slots ON slots.listing_id = listings.listing_id \
              GROUP BY listings.listing_id) debts \
         INNER JOIN \
           (SELECT listings.listing_id, COUNT(inventory.listing_id) AS cnt FROM listings \
              LEFT OUTER JOIN inventory ON inventory.listing_id = listings.listing_id \
              GROUP BY listings.listing_id) storage \
         ON debts.listing_id = storage.listing_id \
         WHERE debts.cnt != storage.cnt \
         ORDER BY debts.listing_id LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(());
    };

    let violation = StoreError::ConservationViolated {
        listing_id: row.try_get("listing_id")?,
        in_slots: row.try_get("in_slots")?,
        in_storage: row.try_get("in_storage")?,
    };
    error!(error = %violation, "Ledger and physical custody diverged");
    Err(violation)
}

/// Sum of all balances plus all escrow held by open buy orders
pub async fn money_supply(conn: &mut SqliteConnection) -> StoreResult<i64> {
    let balances: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(balance), 0) FROM users")
        .fetch_one(&mut *conn)
        .await?;
    let escrow: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(price * quantity), 0) FROM listing_buy_orders")
            .fetch_one(&mut *conn)
            .await?;
    Ok(balances + escrow)
}
