//! Pending withdrawals

use crate::error::StoreResult;
use sqlx::{Row, SqliteConnection};
use stash_domain::{
    BotUuid, DepositId, InventoryItem, Listing, PendingWithdrawal, SlotIndex, StorageSlot,
    UnixSeconds, UserId, WithdrawalCode,
};

fn parse_withdrawal(row: &sqlx::sqlite::SqliteRow) -> StoreResult<PendingWithdrawal> {
    Ok(PendingWithdrawal {
        code: WithdrawalCode::new(row.try_get("withdrawal_code")?),
        item_id: DepositId::from_column(row.try_get("item_id")?)?,
        expiry_time: row.try_get("expiry_time")?,
    })
}

/// Record a withdrawal promise
pub async fn insert_withdrawal(conn: &mut SqliteConnection, withdrawal: &PendingWithdrawal) -> StoreResult<()> {
    sqlx::query("INSERT INTO pending_withdrawals (withdrawal_code, item_id, expiry_time) VALUES (?, ?, ?)")
        .bind(withdrawal.code.value())
        .bind(withdrawal.item_id.as_column())
        .bind(withdrawal.expiry_time)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Look up a withdrawal by code
pub async fn get_withdrawal(
    conn: &mut SqliteConnection,
    code: WithdrawalCode,
) -> StoreResult<Option<PendingWithdrawal>> {
    let row = sqlx::query(
        "SELECT withdrawal_code, item_id, expiry_time FROM pending_withdrawals WHERE withdrawal_code = ?",
    )
    .bind(code.value())
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(parse_withdrawal).transpose()
}

/// Remove a pending withdrawal
pub async fn delete_withdrawal(conn: &mut SqliteConnection, code: WithdrawalCode) -> StoreResult<()> {
    sqlx::query("DELETE FROM pending_withdrawals WHERE withdrawal_code = ?")
        .bind(code.value())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Oldest withdrawal past its expiry
pub async fn next_expired(conn: &mut SqliteConnection, now: UnixSeconds) -> StoreResult<Option<PendingWithdrawal>> {
    let row = sqlx::query(
        "SELECT withdrawal_code, item_id, expiry_time FROM pending_withdrawals \
         WHERE expiry_time < ? ORDER BY expiry_time ASC LIMIT 1",
    )
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(parse_withdrawal).transpose()
}

/// Everything a redemption touches, joined from slot, withdrawal, inventory and listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub user_id: UserId,
    pub slot_index: SlotIndex,
    pub item: InventoryItem,
    pub listing: Listing,
}

/// Resolve a withdrawal code to the slot it locks and the item it releases
pub async fn redemption(conn: &mut SqliteConnection, code: WithdrawalCode) -> StoreResult<Option<Redemption>> {
    let row = sqlx::query(
        "SELECT slots.user_id, slots.slot_index, \
                inventory.item_id, inventory.bot_uuid, inventory.slot_number, \
                listings.listing_id, listings.server, listings.item_key, listings.item_name, listings.item_photo \
         FROM slots \
         INNER JOIN pending_withdrawals ON pending_withdrawals.withdrawal_code = slots.withdrawal_code \
         INNER JOIN inventory ON inventory.item_id = pending_withdrawals.item_id \
         INNER JOIN listings ON listings.listing_id = inventory.listing_id \
         WHERE slots.withdrawal_code = ? AND slots.locked = 2",
    )
    .bind(code.value())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let bot: String = row.try_get("bot_uuid")?;
    let listing = Listing {
        id: row.try_get("listing_id")?,
        server: row.try_get("server")?,
        item_key: row.try_get("item_key")?,
        name: row.try_get("item_name")?,
        photo: row.try_get("item_photo")?,
    };
    Ok(Some(Redemption {
        user_id: row.try_get("user_id")?,
        slot_index: row.try_get("slot_index")?,
        item: InventoryItem {
            item_id: DepositId::from_column(row.try_get("item_id")?)?,
            listing_id: listing.id,
            bot_uuid: bot.parse::<BotUuid>()?,
            slot: StorageSlot::new(row.try_get("slot_number")?)?,
        },
        listing,
    }))
}
