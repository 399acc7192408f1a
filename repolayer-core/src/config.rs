//! Connection settings.

use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Where the store lives.
///
/// Deserializes from `connectionString`/`database` keys, and from the PascalCase
/// `ConnectionString`/`Database` keys used by existing configuration files.
///
/// ```ignore
/// let settings: DbSettings = serde_json::from_str(
///     r#"{ "ConnectionString": "mongodb://localhost:27017", "Database": "ophelia" }"#,
/// )?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSettings {
    #[serde(alias = "ConnectionString")]
    pub connection_string: String,
    #[serde(alias = "Database")]
    pub database: String,
}

impl DbSettings {
    pub fn new(connection_string: impl Into<String>, database: impl Into<String>) -> Self {
        DbSettings {
            connection_string: connection_string.into(),
            database: database.into(),
        }
    }

    /// Returns the settings trimmed, rejecting blank values.
    pub fn validated(&self) -> DocumentStoreResult<Self> {
        let connection_string = self.connection_string.trim();
        if connection_string.is_empty() {
            return Err(DocumentStoreError::Initialization("connection string is empty".to_string()));
        }

        let database = self.database.trim();
        if database.is_empty() {
            return Err(DocumentStoreError::Initialization("database name is empty".to_string()));
        }

        Ok(DbSettings::new(connection_string, database))
    }
}
