use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// Opens the database behind the `sqlite` backend.
///
/// The file must already exist. Connections are opened read-only, so even a
/// statement that slips past the `SELECT` check cannot modify the database.
pub async fn connect(db_file: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_file)
        .create_if_missing(false)
        .read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db_file.display()))?;

    tracing::info!(db_file = %db_file.display(), "connected to database");
    Ok(pool)
}
