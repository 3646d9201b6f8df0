use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Database file kept inside the store's base directory.
pub const DB_FILE: &str = "index.sqlite";

pub fn db_path(base_dir: &Path) -> PathBuf {
    base_dir.join(DB_FILE)
}

pub async fn connect(base_dir: &Path) -> Result<SqlitePool, sqlx::Error> {
    std::fs::create_dir_all(base_dir)?;
    let db_path = db_path(base_dir);

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
