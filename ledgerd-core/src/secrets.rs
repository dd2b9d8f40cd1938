//! Database credential resolution from AWS Secrets Manager.
//!
//! Credentials are fetched once per process and cached in a
//! single-initialization cell. A failed fetch leaves the cell empty so the
//! next call retries; a successful fetch is immutable for the process
//! lifetime (re-fetch requires a restart).

use async_trait::async_trait;
use aws_sdk_secretsmanager::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::error::SecretError;

/// Default logical secret name holding the database credentials.
pub const DEFAULT_SECRET_NAME: &str = "csm-app-db";

/// Default database name. Fixed by this service, not by the secret.
pub const DEFAULT_DATABASE: &str = "webappdb";

/// Payload stored in the secret: `{host, username, password}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DbSecret {
    pub host: String,
    pub username: String,
    pub password: String,
}

/// Resolved database credentials. Immutable once created.
#[derive(Clone)]
pub struct Credentials {
    pub host: String,
    pub username: String,
    pub database: String,
    password: String,
}

impl Credentials {
    pub fn new(secret: DbSecret, database: impl Into<String>) -> Self {
        Self {
            host: secret.host,
            username: secret.username,
            password: secret.password,
            database: database.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

// Manual Debug so the password never reaches logs or error chains.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("database", &self.database)
            .field("password", &"***")
            .finish()
    }
}

/// Raw secret retrieval, separated from caching so tests can inject
/// failing or counting sources.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Fetch the raw secret payload by logical name.
    async fn fetch(&self, secret_id: &str) -> Result<String, SecretError>;
}

/// AWS Secrets Manager source.
pub struct AwsSecretSource {
    client: Client,
}

impl AwsSecretSource {
    /// Build a client from the ambient AWS configuration
    /// (region/credentials from the environment or instance profile).
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&config),
        }
    }
}

#[async_trait]
impl SecretSource for AwsSecretSource {
    async fn fetch(&self, secret_id: &str) -> Result<String, SecretError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|err| SecretError::unavailable(err.to_string()))?;

        if let Some(value) = output.secret_string() {
            return Ok(value.to_owned());
        }

        // Binary secrets carry the same JSON payload, base64-decoded by the SDK.
        if let Some(blob) = output.secret_binary() {
            return String::from_utf8(blob.as_ref().to_vec())
                .map_err(|_| SecretError::malformed("secret binary is not valid UTF-8"));
        }

        Err(SecretError::malformed("secret has no value"))
    }
}

/// Parse the secret payload into its expected structure.
pub fn parse_secret(raw: &str) -> Result<DbSecret, SecretError> {
    serde_json::from_str(raw).map_err(|err| SecretError::malformed(err.to_string()))
}

/// Fetches and caches credentials from a secret store.
///
/// The first successful `resolve()` performs the network round trip and
/// caches the parsed result; subsequent calls return the cached value
/// without suspension. Failed fetches are not cached.
pub struct SecretProvider<S = AwsSecretSource> {
    source: S,
    secret_name: String,
    database: String,
    cache: OnceCell<Credentials>,
}

impl<S: SecretSource> SecretProvider<S> {
    pub fn new(source: S, secret_name: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            source,
            secret_name: secret_name.into(),
            database: database.into(),
            cache: OnceCell::new(),
        }
    }

    /// Resolve the database credentials, fetching on first call.
    pub async fn resolve(&self) -> Result<&Credentials, SecretError> {
        self.cache
            .get_or_try_init(|| async {
                tracing::info!(secret = %self.secret_name, "fetching database credentials");
                let raw = self.source.fetch(&self.secret_name).await?;
                let secret = parse_secret(&raw)?;
                Ok(Credentials::new(secret, self.database.clone()))
            })
            .await
    }
}
