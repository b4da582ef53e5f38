//! Pending deposits

use crate::error::StoreResult;
use sqlx::{Row, SqliteConnection};
use stash_domain::{DepositId, ListingId, PendingDeposit, UnixSeconds};

fn parse_deposit(row: &sqlx::sqlite::SqliteRow) -> StoreResult<PendingDeposit> {
    Ok(PendingDeposit {
        deposit_id: DepositId::from_column(row.try_get("deposit_id")?)?,
        user_id: row.try_get("user_id")?,
        listing_id: row.try_get("listing_id")?,
        expiry_time: row.try_get("expiry_time")?,
        picked_up_at: row.try_get("picked_up_at")?,
    })
}

/// Record a deposit promise
pub async fn insert_deposit(conn: &mut SqliteConnection, deposit: &PendingDeposit) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO pending_deposits (deposit_id, user_id, listing_id, expiry_time, picked_up_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(deposit.deposit_id.as_column())
    .bind(deposit.user_id)
    .bind(deposit.listing_id)
    .bind(deposit.expiry_time)
    .bind(deposit.picked_up_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Look up a pending deposit
pub async fn get_deposit(conn: &mut SqliteConnection, id: DepositId) -> StoreResult<Option<PendingDeposit>> {
    let row = sqlx::query(
        "SELECT deposit_id, user_id, listing_id, expiry_time, picked_up_at FROM pending_deposits WHERE deposit_id = ?",
    )
    .bind(id.as_column())
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(parse_deposit).transpose()
}

/// Stamp a pickup on an unexpired deposit of the given listing.
///
/// Returns whether a deposit matched.
pub async fn mark_picked_up(
    conn: &mut SqliteConnection,
    id: DepositId,
    listing_id: ListingId,
    now: UnixSeconds,
) -> StoreResult<bool> {
    let result = sqlx::query(
        "UPDATE pending_deposits SET picked_up_at = ? \
         WHERE deposit_id = ? AND listing_id = ? AND expiry_time > ?",
    )
    .bind(now)
    .bind(id.as_column())
    .bind(listing_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Remove a pending deposit; returns whether it existed
pub async fn delete_deposit(conn: &mut SqliteConnection, id: DepositId) -> StoreResult<bool> {
    let result = sqlx::query("DELETE FROM pending_deposits WHERE deposit_id = ?")
        .bind(id.as_column())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Delete expired deposits that were never picked up, or picked up more
/// than `stuck_after` seconds ago without confirmation.
pub async fn delete_abandoned(
    conn: &mut SqliteConnection,
    now: UnixSeconds,
    stuck_after: i64,
) -> StoreResult<u64> {
    let result = sqlx::query(
        "DELETE FROM pending_deposits WHERE expiry_time < ? \
         AND (picked_up_at IS NULL OR picked_up_at < ?)",
    )
    .bind(now)
    .bind(now - stuck_after)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Whether a deposit id is taken by a pending deposit or a confirmed item
pub async fn id_in_use(conn: &mut SqliteConnection, id: DepositId) -> StoreResult<bool> {
    let taken: i64 = sqlx::query_scalar(
        "SELECT (SELECT COUNT(*) FROM pending_deposits WHERE deposit_id = ?) \
              + (SELECT COUNT(*) FROM inventory WHERE item_id = ?)",
    )
    .bind(id.as_column())
    .bind(id.as_column())
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken > 0)
}
