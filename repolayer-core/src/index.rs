//! Index specifications and the per-collection index manager.

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    backend::StoreBackend,
    context::DbContext,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// How a single field participates in an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Ascending,
    Descending,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    pub name: String,
    pub kind: IndexKind,
}

impl IndexField {
    pub fn new(name: impl Into<String>, kind: IndexKind) -> Self {
        IndexField { name: name.into(), kind }
    }

    pub fn ascending(name: impl Into<String>) -> Self {
        Self::new(name, IndexKind::Ascending)
    }

    pub fn descending(name: impl Into<String>) -> Self {
        Self::new(name, IndexKind::Descending)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, IndexKind::Text)
    }
}

/// Settings shared by every field of a text index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextIndexOptions {
    pub default_language: String,
    pub text_index_version: i32,
}

impl Default for TextIndexOptions {
    fn default() -> Self {
        TextIndexOptions {
            default_language: "spanish".to_string(),
            text_index_version: 3,
        }
    }
}

impl TextIndexOptions {
    /// Reads `defaultLanguage` and `textIndexVersion` from loosely typed extended properties.
    ///
    /// Keys match case-insensitively; missing or unusable values keep their defaults.
    pub fn from_properties(properties: &Document) -> Self {
        let mut options = Self::default();

        for (key, value) in properties {
            match key.to_ascii_lowercase().as_str() {
                "defaultlanguage" => {
                    if let Bson::String(language) = value {
                        options.default_language = language.clone();
                    }
                }
                "textindexversion" => {
                    let version = match value {
                        Bson::Int32(version) => Some(*version),
                        Bson::Int64(version) => i32::try_from(*version).ok(),
                        Bson::String(version) => version.trim().parse().ok(),
                        _ => None,
                    };
                    if let Some(version) = version {
                        options.text_index_version = version;
                    }
                }
                _ => {}
            }
        }

        options
    }
}

/// A named index over one or more fields.
///
/// If any field is [`IndexKind::Text`] the whole index is created as a single text index over
/// every listed field, using [`TextIndexOptions`]; `unique` is ignored in that case. Otherwise the
/// fields form a compound ascending/descending key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<IndexField>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub text: TextIndexOptions,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, fields: Vec<IndexField>) -> Self {
        IndexSpec {
            name: name.into(),
            fields,
            unique: false,
            text: TextIndexOptions::default(),
        }
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_text_options(mut self, text: TextIndexOptions) -> Self {
        self.text = text;
        self
    }

    pub fn is_text(&self) -> bool {
        self.fields
            .iter()
            .any(|field| field.kind == IndexKind::Text)
    }

    /// Trims the index and field names and rejects empty ones.
    pub fn validate(mut self) -> DocumentStoreResult<Self> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(DocumentStoreError::InvalidArgument("name".to_string()));
        }
        if self.fields.is_empty() {
            return Err(DocumentStoreError::InvalidArgument("fields".to_string()));
        }

        for field in &mut self.fields {
            field.name = field.name.trim().to_string();
            if field.name.is_empty() {
                return Err(DocumentStoreError::InvalidArgument("fields".to_string()));
            }
        }

        Ok(self)
    }

    /// The index key document in the store's native form.
    pub fn keys(&self) -> Document {
        let text = self.is_text();

        self.fields
            .iter()
            .map(|field| {
                let direction = match (text, field.kind) {
                    (true, _) => Bson::String("text".to_string()),
                    (false, IndexKind::Descending) => Bson::Int32(-1),
                    (false, _) => Bson::Int32(1),
                };
                (field.name.clone(), direction)
            })
            .collect()
    }
}

/// Creates and lists the indexes of one collection.
pub struct IndexManager<'a, B: StoreBackend> {
    context: &'a DbContext<B>,
    collection: &'a str,
}

impl<'a, B: StoreBackend> IndexManager<'a, B> {
    pub(crate) fn new(context: &'a DbContext<B>, collection: &'a str) -> Self {
        IndexManager { context, collection }
    }

    /// Creates an index on the collection.
    ///
    /// # Arguments
    ///
    /// * `spec` - The index to create; names are trimmed before it reaches the store
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidArgument`] if the index or a field name is blank, or
    /// the store's error if creation fails.
    pub async fn create_index(&self, spec: IndexSpec) -> DocumentStoreResult<()> {
        let spec = spec.validate()?;
        debug!(collection = self.collection, index = %spec.name, text = spec.is_text(), "creating index");

        self.context
            .backend()
            .create_index(self.collection, &spec)
            .await
    }

    /// Creates an index whose text settings come from loosely typed extended properties.
    ///
    /// `properties` is read with [`TextIndexOptions::from_properties`]; it only affects text
    /// indexes.
    pub async fn create_index_with_properties(&self, spec: IndexSpec, properties: &Document) -> DocumentStoreResult<()> {
        self.create_index(spec.with_text_options(TextIndexOptions::from_properties(properties)))
            .await
    }

    pub async fn list_indexes(&self) -> DocumentStoreResult<Vec<Document>> {
        self.context
            .backend()
            .list_indexes(self.collection)
            .await
    }
}
