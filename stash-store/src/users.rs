//! User accounts and balances

use crate::error::{StoreError, StoreResult};
use sqlx::{Row, SqliteConnection};
use stash_domain::{User, UserId};

fn parse_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("user_id")?,
        balance: row.try_get("balance")?,
        max_slots: row.try_get("max_slots")?,
    })
}

/// Create the user with defaults if missing, then return it
pub async fn ensure_user(conn: &mut SqliteConnection, user_id: UserId) -> StoreResult<User> {
    sqlx::query("INSERT OR IGNORE INTO users (user_id) VALUES (?)")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    get_user(conn, user_id).await
}

/// Load a user
pub async fn get_user(conn: &mut SqliteConnection, user_id: UserId) -> StoreResult<User> {
    let row = sqlx::query("SELECT user_id, balance, max_slots FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::not_found("user", user_id))?;
    Ok(parse_user(&row)?)
}

/// Add `amount` to a balance
pub async fn credit(conn: &mut SqliteConnection, user_id: UserId, amount: i64) -> StoreResult<()> {
    let result = sqlx::query("UPDATE users SET balance = balance + ? WHERE user_id = ?")
        .bind(amount)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() != 1 {
        return Err(StoreError::not_found("user", user_id));
    }
    Ok(())
}

/// Subtract `amount` from a balance.
///
/// The schema refuses a negative balance, surfacing as [`StoreError::Constraint`].
pub async fn debit(conn: &mut SqliteConnection, user_id: UserId, amount: i64) -> StoreResult<()> {
    let result = sqlx::query("UPDATE users SET balance = balance - ? WHERE user_id = ?")
        .bind(amount)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() != 1 {
        return Err(StoreError::not_found("user", user_id));
    }
    Ok(())
}

/// Overwrite a balance (administrative adjustment)
pub async fn set_balance(
    conn: &mut SqliteConnection,
    user_id: UserId,
    balance: i64,
) -> StoreResult<()> {
    let result = sqlx::query("UPDATE users SET balance = ? WHERE user_id = ?")
        .bind(balance)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() != 1 {
        return Err(StoreError::not_found("user", user_id));
    }
    Ok(())
}

/// Change how many slots a user may hold
pub async fn set_max_slots(
    conn: &mut SqliteConnection,
    user_id: UserId,
    max_slots: i64,
) -> StoreResult<()> {
    let result = sqlx::query("UPDATE users SET max_slots = ? WHERE user_id = ?")
        .bind(max_slots)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() != 1 {
        return Err(StoreError::not_found("user", user_id));
    }
    Ok(())
}
