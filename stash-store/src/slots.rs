//! Slot rows.
//!
//! Rows are decoded through [`SlotState::from_columns`], so an invalid column
//! combination is reported as corruption instead of being observed.

use crate::error::{StoreError, StoreResult};
use sqlx::{Row, SqliteConnection};
use stash_domain::{
    Ask, ListingId, Price, Slot, SlotColumns, SlotIndex, SlotState, UnixSeconds, UserId,
    WithdrawalCode,
};

const SLOT_COLUMNS: &str = "user_id, slot_index, listing_id, expiry_time, renewals, \
                            sale_price, for_sale_since, locked, withdrawal_code";

fn parse_slot(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Slot> {
    let state = SlotState::from_columns(SlotColumns {
        locked: row.try_get("locked")?,
        sale_price: row.try_get("sale_price")?,
        for_sale_since: row.try_get("for_sale_since")?,
        withdrawal_code: row.try_get("withdrawal_code")?,
    })?;

    Ok(Slot {
        user_id: row.try_get("user_id")?,
        index: row.try_get("slot_index")?,
        listing_id: row.try_get("listing_id")?,
        expiry_time: row.try_get("expiry_time")?,
        renewals: row.try_get("renewals")?,
        state,
    })
}

/// A slot about to be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewSlot {
    pub user_id: UserId,
    pub index: SlotIndex,
    pub listing_id: ListingId,
    pub expiry_time: UnixSeconds,
    pub renewals: i64,
}

/// Insert a fresh, unlisted slot
pub async fn insert_slot(conn: &mut SqliteConnection, slot: NewSlot) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO slots (user_id, slot_index, listing_id, expiry_time, renewals) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(slot.user_id)
    .bind(slot.index)
    .bind(slot.listing_id)
    .bind(slot.expiry_time)
    .bind(slot.renewals)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Load one slot of a user
pub async fn get_slot(
    conn: &mut SqliteConnection,
    user_id: UserId,
    index: SlotIndex,
) -> StoreResult<Slot> {
    let sql = format!("SELECT {} FROM slots WHERE user_id = ? AND slot_index = ?", SLOT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(index)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::not_found("slot", format!("{}/{}", user_id, index)))?;
    parse_slot(&row)
}

/// All slots of a user, by index
pub async fn slots_of(conn: &mut SqliteConnection, user_id: UserId) -> StoreResult<Vec<Slot>> {
    let sql = format!("SELECT {} FROM slots WHERE user_id = ? ORDER BY slot_index", SLOT_COLUMNS);
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(&mut *conn).await?;
    rows.iter().map(parse_slot).collect()
}

/// Number of slots a user currently fills
pub async fn count_slots(conn: &mut SqliteConnection, user_id: UserId) -> StoreResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM slots WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Indexes a user currently fills, ascending
pub async fn used_indexes(conn: &mut SqliteConnection, user_id: UserId) -> StoreResult<Vec<SlotIndex>> {
    let indexes = sqlx::query_scalar("SELECT slot_index FROM slots WHERE user_id = ? ORDER BY slot_index")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(indexes)
}

/// Persist a lifecycle state
pub async fn write_state(
    conn: &mut SqliteConnection,
    user_id: UserId,
    index: SlotIndex,
    state: &SlotState,
) -> StoreResult<()> {
    let columns = state.to_columns();
    let result = sqlx::query(
        "UPDATE slots SET locked = ?, sale_price = ?, for_sale_since = ?, withdrawal_code = ? \
         WHERE user_id = ? AND slot_index = ?",
    )
    .bind(columns.locked)
    .bind(columns.sale_price)
    .bind(columns.for_sale_since)
    .bind(columns.withdrawal_code)
    .bind(user_id)
    .bind(index)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() != 1 {
        return Err(StoreError::not_found("slot", format!("{}/{}", user_id, index)));
    }
    Ok(())
}

/// Persist a new expiry time
pub async fn set_expiry(
    conn: &mut SqliteConnection,
    user_id: UserId,
    index: SlotIndex,
    expiry_time: UnixSeconds,
) -> StoreResult<()> {
    sqlx::query("UPDATE slots SET expiry_time = ? WHERE user_id = ? AND slot_index = ?")
        .bind(expiry_time)
        .bind(user_id)
        .bind(index)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Remove a slot (sold away or withdrawn)
pub async fn delete_slot(conn: &mut SqliteConnection, user_id: UserId, index: SlotIndex) -> StoreResult<()> {
    let result = sqlx::query("DELETE FROM slots WHERE user_id = ? AND slot_index = ?")
        .bind(user_id)
        .bind(index)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() != 1 {
        return Err(StoreError::not_found("slot", format!("{}/{}", user_id, index)));
    }
    Ok(())
}

/// Cheapest ask at or below `max_price`, earliest listed first on ties
pub async fn best_ask(
    conn: &mut SqliteConnection,
    listing_id: ListingId,
    max_price: Price,
) -> StoreResult<Option<Ask>> {
    let row = sqlx::query(
        "SELECT user_id, slot_index, sale_price, for_sale_since FROM slots \
         WHERE listing_id = ? AND sale_price IS NOT NULL AND sale_price <= ? \
         ORDER BY sale_price ASC, for_sale_since ASC LIMIT 1",
    )
    .bind(listing_id)
    .bind(max_price.amount())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(Ask {
        user_id: row.try_get("user_id")?,
        slot_index: row.try_get("slot_index")?,
        price: Price::ask(row.try_get("sale_price")?)?,
        since: row.try_get("for_sale_since")?,
    }))
}

/// Extend every expired, unlocked, listed slot that still has renewals.
///
/// Returns the number of slots renewed.
pub async fn renew_expired_listed(
    conn: &mut SqliteConnection,
    now: UnixSeconds,
    period: i64,
) -> StoreResult<u64> {
    let result = sqlx::query(
        "UPDATE slots SET expiry_time = expiry_time + ?, renewals = renewals - 1 \
         WHERE expiry_time < ? AND sale_price IS NOT NULL AND renewals > 0 AND locked = 0",
    )
    .bind(period)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Oldest unlocked slot past expiry
pub async fn next_to_force_lock(conn: &mut SqliteConnection, now: UnixSeconds) -> StoreResult<Option<Slot>> {
    let sql = format!(
        "SELECT {} FROM slots WHERE locked = 0 AND expiry_time < ? ORDER BY expiry_time ASC LIMIT 1",
        SLOT_COLUMNS
    );
    let row = sqlx::query(&sql).bind(now).fetch_optional(&mut *conn).await?;
    row.as_ref().map(parse_slot).transpose()
}

/// Oldest force-sale-locked slot past its grace period that is not yet listed for free
pub async fn next_to_force_sell(conn: &mut SqliteConnection, now: UnixSeconds) -> StoreResult<Option<Slot>> {
    let sql = format!(
        "SELECT {} FROM slots WHERE locked = 1 AND expiry_time < ? AND sale_price IS NULL \
         ORDER BY expiry_time ASC LIMIT 1",
        SLOT_COLUMNS
    );
    let row = sqlx::query(&sql).bind(now).fetch_optional(&mut *conn).await?;
    row.as_ref().map(parse_slot).transpose()
}

/// Slot locked by a withdrawal code
pub async fn slot_for_withdrawal(
    conn: &mut SqliteConnection,
    code: WithdrawalCode,
) -> StoreResult<Option<Slot>> {
    let sql = format!("SELECT {} FROM slots WHERE withdrawal_code = ?", SLOT_COLUMNS);
    let row = sqlx::query(&sql).bind(code.value()).fetch_optional(&mut *conn).await?;
    row.as_ref().map(parse_slot).transpose()
}
