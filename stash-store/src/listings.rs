//! Listing catalogue

use crate::error::{StoreError, StoreResult};
use sqlx::{Row, SqliteConnection};
use stash_domain::{Listing, ListingId, NewListing};

const LISTING_COLUMNS: &str = "listing_id, server, item_key, item_name, item_photo";

fn parse_listing(row: &sqlx::sqlite::SqliteRow) -> Result<Listing, sqlx::Error> {
    Ok(Listing {
        id: row.try_get("listing_id")?,
        server: row.try_get("server")?,
        item_key: row.try_get("item_key")?,
        name: row.try_get("item_name")?,
        photo: row.try_get("item_photo")?,
    })
}

/// Insert a listing unless (server, item_key) already exists.
///
/// Returns whether a row was inserted.
pub async fn insert_listing(conn: &mut SqliteConnection, listing: &NewListing) -> StoreResult<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO listings (server, item_key, item_name, item_photo) VALUES (?, ?, ?, ?)",
    )
    .bind(&listing.server)
    .bind(&listing.item_key)
    .bind(&listing.name)
    .bind(&listing.photo)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Load a listing by id
pub async fn get_listing(conn: &mut SqliteConnection, listing_id: ListingId) -> StoreResult<Listing> {
    let sql = format!("SELECT {} FROM listings WHERE listing_id = ?", LISTING_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(listing_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::not_found("listing", listing_id))?;
    Ok(parse_listing(&row)?)
}

/// Find the listing whose contents key matches on `server`
pub async fn find_by_contents(
    conn: &mut SqliteConnection,
    contents: &str,
    server: &str,
) -> StoreResult<Option<Listing>> {
    let sql = format!("SELECT {} FROM listings WHERE item_key = ? AND server = ?", LISTING_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(contents)
        .bind(server)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(parse_listing).transpose()?)
}

/// All listings, by id
pub async fn all_listings(conn: &mut SqliteConnection) -> StoreResult<Vec<Listing>> {
    let sql = format!("SELECT {} FROM listings ORDER BY listing_id", LISTING_COLUMNS);
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(parse_listing).collect::<Result<_, _>>()?)
}
