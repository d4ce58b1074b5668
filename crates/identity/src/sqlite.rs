use {
    async_trait::async_trait,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    std::str::FromStr,
    tracing::debug,
    uuid::Uuid,
};

use crate::store::{Identity, IdentityStore, StoreError};

/// SQLite-backed identity store.
pub struct SqliteIdentityStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    token: String,
    name: String,
    credential_hash: String,
    created_at: i64,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = StoreError;

    fn try_from(r: IdentityRow) -> Result<Self, Self::Error> {
        let token = Uuid::parse_str(&r.token)
            .map_err(|e| StoreError::Corrupt(format!("token for {}: {e}", r.name)))?;
        Ok(Self {
            name: r.name,
            credential_hash: r.credential_hash,
            token,
            created_at: r.created_at as u64,
        })
    }
}

impl SqliteIdentityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::init(&pool).await?;
        debug!(url, "identity store ready");
        Ok(Self::new(pool))
    }

    /// Create the `identities` table if it doesn't exist.
    pub async fn init(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS identities (
                token           TEXT PRIMARY KEY,
                name            TEXT NOT NULL UNIQUE,
                credential_hash TEXT NOT NULL,
                created_at      INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for SqliteIdentityStore {
    async fn insert(&self, identity: &Identity) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO identities (token, name, credential_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(identity.token.to_string())
        .bind(&identity.name)
        .bind(&identity.credential_hash)
        .bind(identity.created_at as i64)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::NameTaken),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Identity>, StoreError> {
        sqlx::query_as::<_, IdentityRow>("SELECT * FROM identities WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .map(Identity::try_from)
            .transpose()
    }

    async fn find_by_token(&self, token: &Uuid) -> Result<Option<Identity>, StoreError> {
        sqlx::query_as::<_, IdentityRow>("SELECT * FROM identities WHERE token = ?")
            .bind(token.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(Identity::try_from)
            .transpose()
    }

    async fn name_exists(&self, name: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM identities WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count != 0)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
