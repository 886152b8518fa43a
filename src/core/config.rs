use std::env;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use url::Url;

use crate::errors::StoreError;

/// Request units reserved for a collection created by the provisioner.
pub const DEFAULT_OFFER_THROUGHPUT: u32 = 400;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for one database/collection pair.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub endpoint: String,
    pub auth_key: String,
    pub database: String,
    pub collection: String,
    pub offer_throughput: u32,
    pub request_timeout: Duration,
}

impl StoreConfig {
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        auth_key: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_key: auth_key.into(),
            database: database.into(),
            collection: collection.into(),
            offer_throughput: DEFAULT_OFFER_THROUGHPUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// # Errors
    ///
    /// Returns `ConfigurationError` when a required variable is missing or a
    /// numeric variable does not parse.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key source using the same variable
    /// names as [`StoreConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` when a required key is missing or a
    /// numeric key does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| StoreError::ConfigurationError(format!("{key}: not set")))
        };

        let mut config = Self::new(
            required("COSMOS_ENDPOINT")?,
            required("COSMOS_AUTH_KEY")?,
            required("COSMOS_DATABASE")?,
            required("COSMOS_COLLECTION")?,
        );

        if let Some(raw) = lookup("COSMOS_OFFER_THROUGHPUT") {
            config.offer_throughput = raw.trim().parse().map_err(|e| {
                StoreError::ConfigurationError(format!("COSMOS_OFFER_THROUGHPUT: {e}"))
            })?;
        }

        if let Some(raw) = lookup("COSMOS_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|e| {
                StoreError::ConfigurationError(format!("COSMOS_REQUEST_TIMEOUT_SECS: {e}"))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigurationError` if any identifier is blank, the endpoint is
    /// not an absolute http(s) URL, or the key is not valid base64.
    pub fn validate(&self) -> Result<(), StoreError> {
        for (name, value) in [("endpoint", &self.endpoint), ("auth key", &self.auth_key)] {
            if value.trim().is_empty() {
                return Err(StoreError::ConfigurationError(format!("{name} is empty")));
            }
        }

        validate_resource_id("database", &self.database)?;
        validate_resource_id("collection", &self.collection)?;

        self.endpoint_url()?;
        self.decoded_key()?;

        if self.offer_throughput == 0 {
            return Err(StoreError::ConfigurationError(
                "offer throughput must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ConfigurationError` if the endpoint is not an http(s) URL.
    pub fn endpoint_url(&self) -> Result<Url, StoreError> {
        let url = Url::parse(self.endpoint.trim())
            .map_err(|e| StoreError::ConfigurationError(format!("endpoint: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(StoreError::ConfigurationError(format!(
                "endpoint: unsupported scheme '{other}'"
            ))),
        }
    }

    /// # Errors
    ///
    /// Returns `ConfigurationError` if the key is not standard base64.
    pub fn decoded_key(&self) -> Result<Vec<u8>, StoreError> {
        STANDARD
            .decode(self.auth_key.trim())
            .map_err(|e| StoreError::ConfigurationError(format!("auth key: {e}")))
    }
}

/// Characters the store refuses in resource ids.
const INVALID_ID_CHARS: &[char] = &['/', '\\', '?', '#'];

/// Checks a database or collection id before it is put into a resource link.
///
/// # Errors
///
/// Returns `ConfigurationError` if `id` is blank or contains a character the
/// store refuses.
pub fn validate_resource_id(kind: &str, id: &str) -> Result<(), StoreError> {
    if id.trim().is_empty() {
        return Err(StoreError::ConfigurationError(format!("{kind} is empty")));
    }
    if let Some(c) = id.chars().find(|c| INVALID_ID_CHARS.contains(c)) {
        return Err(StoreError::ConfigurationError(format!(
            "{kind} id '{id}' contains forbidden character '{c}'"
        )));
    }
    Ok(())
}
