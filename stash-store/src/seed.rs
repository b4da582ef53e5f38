//! Listing seeding.
//!
//! The built-in catalogue plus an optional JSON file of extra listings, both
//! inserted idempotently.

use crate::error::{StoreError, StoreResult};
use crate::listings;
use sqlx::SqliteConnection;
use stash_domain::{full_container_key, NewListing};
use std::path::Path;
use tracing::info;

/// Built-in listings for `server`: full containers of common trade goods
pub fn builtin_listings(server: &str) -> Vec<NewListing> {
    [
        ("item.appleGold;1", "gapples", "/static/gapple.png"),
        ("item.totem;0", "totems", "/static/totem.png"),
        ("item.end_crystal;0", "end crystals", "/static/endcrystal.png"),
    ]
    .into_iter()
    .map(|(item, name, photo)| NewListing {
        server: server.to_string(),
        item_key: full_container_key(item),
        name: name.to_string(),
        photo: photo.to_string(),
    })
    .collect()
}

/// Read extra listings from a JSON array of `{server, item_key, name, photo}`
pub async fn load_listings_file(path: &Path) -> StoreResult<Vec<NewListing>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StoreError::InvalidSeed(format!("{}: {}", path.display(), e)))?;
    parse_listings(&raw).map_err(|e| StoreError::InvalidSeed(format!("{}: {}", path.display(), e)))
}

fn parse_listings(raw: &str) -> Result<Vec<NewListing>, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Insert listings that do not exist yet; returns how many were new
pub async fn seed_listings(conn: &mut SqliteConnection, to_create: &[NewListing]) -> StoreResult<usize> {
    let mut created = 0;
    for listing in to_create {
        if listings::insert_listing(conn, listing).await? {
            created += 1;
        }
    }
    info!(created, total = to_create.len(), "Listings seeded");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_listings_are_full_containers() {
        let catalogue = builtin_listings("example.org");
        assert_eq!(catalogue.len(), 3);
        for listing in &catalogue {
            assert_eq!(listing.server, "example.org");
            assert_eq!(listing.item_key.split(',').count(), 27);
        }
    }

    #[test]
    fn test_parse_listings_file() {
        let raw = r#"[{"server":"s","item_key":"k","name":"n","photo":"/p.png"}]"#;
        let parsed = parse_listings(raw).unwrap();
        assert_eq!(parsed[0].item_key, "k");
        assert!(parse_listings("{}").is_err());
    }

    #[tokio::test]
    async fn test_seeding_is_idempotent() {
        let mut conn = crate::schema::connect("sqlite::memory:").await.unwrap();
        crate::schema::migrate(&mut conn).await.unwrap();

        let catalogue = builtin_listings("example.org");
        assert_eq!(seed_listings(&mut conn, &catalogue).await.unwrap(), 3);
        assert_eq!(seed_listings(&mut conn, &catalogue).await.unwrap(), 0);
        assert_eq!(listings::all_listings(&mut conn).await.unwrap().len(), 3);

        let found = listings::find_by_contents(&mut conn, &catalogue[1].item_key, "example.org")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "totems");
        assert!(listings::find_by_contents(&mut conn, &catalogue[1].item_key, "other.org")
            .await
            .unwrap()
            .is_none());
    }
}
