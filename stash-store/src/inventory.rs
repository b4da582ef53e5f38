//! Confirmed physical inventory

use crate::error::StoreResult;
use sqlx::{Row, SqliteConnection};
use stash_domain::{BotUuid, DepositId, InventoryItem, ListingId, StorageSlot};

fn parse_item(row: &sqlx::sqlite::SqliteRow) -> StoreResult<InventoryItem> {
    let bot: String = row.try_get("bot_uuid")?;
    Ok(InventoryItem {
        item_id: DepositId::from_column(row.try_get("item_id")?)?,
        listing_id: row.try_get("listing_id")?,
        bot_uuid: bot.parse::<BotUuid>()?,
        slot: StorageSlot::new(row.try_get("slot_number")?)?,
    })
}

/// Record an item as physically present
pub async fn insert_item(conn: &mut SqliteConnection, item: &InventoryItem) -> StoreResult<()> {
    sqlx::query("INSERT INTO inventory (item_id, listing_id, bot_uuid, slot_number) VALUES (?, ?, ?, ?)")
        .bind(item.item_id.as_column())
        .bind(item.listing_id)
        .bind(item.bot_uuid.to_string())
        .bind(item.slot.number())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Look up an item by its deposit id
pub async fn get_item(conn: &mut SqliteConnection, item_id: DepositId) -> StoreResult<Option<InventoryItem>> {
    let row = sqlx::query("SELECT item_id, listing_id, bot_uuid, slot_number FROM inventory WHERE item_id = ?")
        .bind(item_id.as_column())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(parse_item).transpose()
}

/// Forget an item that left custody
pub async fn delete_item(conn: &mut SqliteConnection, item_id: DepositId) -> StoreResult<()> {
    sqlx::query("DELETE FROM inventory WHERE item_id = ?")
        .bind(item_id.as_column())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Items of a listing that no pending withdrawal has claimed yet
pub async fn unclaimed_items(conn: &mut SqliteConnection, listing_id: ListingId) -> StoreResult<Vec<InventoryItem>> {
    let rows = sqlx::query(
        "SELECT item_id, listing_id, bot_uuid, slot_number FROM inventory \
         WHERE listing_id = ? AND item_id NOT IN (SELECT item_id FROM pending_withdrawals) \
         ORDER BY item_id",
    )
    .bind(listing_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(parse_item).collect()
}
