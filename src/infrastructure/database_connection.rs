// Database connection and pool management
// SQLite through sqlx; the schema is created in place by `migrate`.

use std::path::Path;
use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

use crate::domain::repositories::StoreResult;
use crate::infrastructure::config::DatabaseConfig;

const CREATE_PRICE_RECORDS: &str = r"
    CREATE TABLE IF NOT EXISTS price_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        pricing_date DATE NOT NULL,
        product_type TEXT NOT NULL,
        vendor_source TEXT NOT NULL,
        category TEXT NOT NULL DEFAULT 'emas_batangan',
        buy_price INTEGER NOT NULL CHECK (buy_price >= 0),
        buy_price_derived BOOLEAN NOT NULL DEFAULT 0,
        sell_price INTEGER NOT NULL CHECK (sell_price >= 0),
        scraped_at DATETIME NOT NULL,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (pricing_date, product_type, vendor_source)
    )
";

const CREATE_INDEXES: [&str; 3] = [
    "CREATE INDEX IF NOT EXISTS idx_price_records_pricing_date ON price_records (pricing_date)",
    "CREATE INDEX IF NOT EXISTS idx_price_records_vendor_source ON price_records (vendor_source)",
    "CREATE INDEX IF NOT EXISTS idx_price_records_scraped_at ON price_records (scraped_at)",
];

/// File path behind a `sqlite:` URL, `None` for in-memory databases.
fn database_file(database_url: &str) -> Option<&Path> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        None
    } else {
        Some(Path::new(path))
    }
}

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        Self::connect(&DatabaseConfig {
            url: database_url.to_string(),
            ..DatabaseConfig::default()
        })
        .await
    }

    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        if let Some(parent) = database_file(&config.url).and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(sqlx::Error::Io)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let in_memory = database_file(&config.url).is_none();
        let pool = SqlitePoolOptions::new()
            // every in-memory connection is its own database
            .max_connections(if in_memory { 1 } else { config.max_connections.max(1) })
            .connect_with(options)
            .await?;

        info!("Connected to database {}", config.url);
        Ok(Self { pool })
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(CREATE_PRICE_RECORDS).execute(&self.pool).await?;
        for statement in CREATE_INDEXES {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema is up to date");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_database_file() {
        assert_eq!(database_file("sqlite://data/emas.db"), Some(Path::new("data/emas.db")));
        assert_eq!(database_file("sqlite:/tmp/x.db?mode=rwc"), Some(Path::new("/tmp/x.db")));
        assert_eq!(database_file("sqlite::memory:"), None);
    }

    #[tokio::test]
    async fn test_database_connection_creates_parent_dirs() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("prices.db");
        let database_url = format!("sqlite://{}", db_path.display());

        let db = DatabaseConnection::new(&database_url).await.unwrap();
        assert!(!db.pool().is_closed());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_database_migration_is_repeatable() {
        let temp_dir = tempdir().unwrap();
        let database_url = format!("sqlite://{}", temp_dir.path().join("migrate.db").display());

        let db = DatabaseConnection::new(&database_url).await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'price_records'")
                .fetch_all(db.pool())
                .await
                .unwrap();
        assert_eq!(tables.len(), 1);
    }

    #[tokio::test]
    async fn test_unique_identity_enforced() {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();

        let insert = "INSERT INTO price_records (pricing_date, product_type, vendor_source, buy_price, sell_price, scraped_at)
                      VALUES ('2025-01-13', '1 gram', 'antam', 1, 2, '2025-01-13T00:00:00Z')";
        sqlx::query(insert).execute(db.pool()).await.unwrap();
        assert!(sqlx::query(insert).execute(db.pool()).await.is_err());
    }
}
