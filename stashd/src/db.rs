//! Database CLI subcommands for stashd.
//!
//! Provides `db migrate`, `db status`, and `db seed` commands.

use anyhow::{anyhow, Result};
use tracing::info;

use stash_store::{schema, seed};

use crate::config::Config;

/// Run database CLI subcommands.
///
/// Supported commands:
/// - `stashd db migrate` - Run pending migrations
/// - `stashd db status` - Check migration status
/// - `stashd db seed [--server NAME]` - Insert the built-in listings and `STASH_LISTINGS_FILE`
pub async fn run_db_command(config: &Config, args: &[String]) -> Result<()> {
    let command = args
        .get(2)
        .ok_or_else(|| anyhow!("Usage: stashd db <migrate|status|seed> [options]"))?;

    let mut conn = schema::connect(&config.store.database_url).await?;

    match command.as_str() {
        "migrate" => {
            schema::migrate(&mut conn).await?;
        },
        "status" => {
            let status = schema::status(&mut conn).await?;
            for migration in &status.applied {
                info!(
                    version = migration.version,
                    description = %migration.description,
                    success = migration.success,
                    "Applied migration"
                );
            }
            if status.is_current() {
                info!(applied = status.applied.len(), "Schema is up to date");
            } else {
                info!(pending = ?status.pending, "Schema has pending migrations");
            }
        },
        "seed" => {
            let server = parse_server_flag(&args[3..])?.unwrap_or_else(|| config.store.default_server.clone());
            let mut listings = seed::builtin_listings(&server);
            if let Some(path) = &config.store.listings_file {
                listings.extend(seed::load_listings_file(path).await?);
            }
            schema::migrate(&mut conn).await?;
            let created = seed::seed_listings(&mut conn, &listings).await?;
            info!(created, %server, "Seed complete");
        },
        other => {
            return Err(anyhow!("Unknown db command: {}. Use migrate, status, or seed", other));
        },
    }

    Ok(())
}

fn parse_server_flag(options: &[String]) -> Result<Option<String>> {
    match options {
        [] => Ok(None),
        [flag, value] if flag == "--server" => Ok(Some(value.clone())),
        [flag] if flag == "--server" => Err(anyhow!("--server requires a value")),
        [other, ..] => Err(anyhow!("Unknown option: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_server_flag() {
        assert_eq!(parse_server_flag(&[]).unwrap(), None);
        assert_eq!(
            parse_server_flag(&args(&["--server", "constantiam.net"])).unwrap(),
            Some("constantiam.net".to_string())
        );
        assert!(parse_server_flag(&args(&["--server"])).is_err());
        assert!(parse_server_flag(&args(&["--tenant", "x"])).is_err());
    }

    #[tokio::test]
    async fn test_seed_into_memory_database() {
        let config = Config::test();
        run_db_command(&config, &args(&["stashd", "db", "seed"])).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let config = Config::test();
        let err = run_db_command(&config, &args(&["stashd", "db", "drop"])).await.unwrap_err();
        assert!(err.to_string().contains("Unknown db command"));
    }

    #[tokio::test]
    async fn test_missing_command() {
        let err = run_db_command(&Config::test(), &args(&["stashd", "db"])).await.unwrap_err();
        assert!(err.to_string().starts_with("Usage"));
    }
}
