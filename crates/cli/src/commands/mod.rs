//! Subcommand implementations.

pub mod admin;
pub mod migrate;
pub mod seed;

use booknest_api::db;
use secrecy::SecretString;
use sqlx::PgPool;

/// Environment variable holding the connection string.
pub const DATABASE_URL_VAR: &str = "BOOKNEST_DATABASE_URL";

#[derive(Debug, thiserror::Error)]
#[error("Missing environment variable: {0}")]
pub struct MissingEnvVar(pub &'static str);

/// Load `.env` and connect to the BookNest database.
///
/// # Errors
///
/// Returns an error if `BOOKNEST_DATABASE_URL` is unset or the connection fails.
pub async fn connect() -> Result<PgPool, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var(DATABASE_URL_VAR)
        .map(SecretString::from)
        .map_err(|_| MissingEnvVar(DATABASE_URL_VAR))?;

    tracing::info!("Connecting to database...");
    Ok(db::create_pool(&database_url).await?)
}
