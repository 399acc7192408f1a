//! Schema-flexible containers for partial query results.
//!
//! An [`EntityProjection`] pairs a [`FieldNames`] table, shared by every projection built from the
//! same field set, with a value array owned by the instance. The table only ever grows; removing
//! a field from one instance overwrites its slot with a tombstone, so field positions stay valid
//! for every other instance sharing the table.

use bson::{Bson, Document};
use serde::{Deserialize, Deserializer, Serialize, Serializer, ser::SerializeMap};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    entity::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    query::LOGICAL_ID_FIELD,
};

/// How names passed to [`EntityProjection::set`] are resolved before they are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NamingStrategy {
    /// Names are kept as given.
    #[default]
    Default,
    /// The leading run of upper-case letters is lower-cased (`Id` -> `id`, `URLPath` -> `urlPath`).
    CamelCase,
}

impl NamingStrategy {
    pub fn resolve(&self, name: &str) -> String {
        match self {
            NamingStrategy::Default => name.to_string(),
            NamingStrategy::CamelCase => camel_case(name),
        }
    }
}

fn camel_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();

    if !chars
        .first()
        .is_some_and(|c| c.is_uppercase())
    {
        return name.to_string();
    }

    let mut resolved = chars.clone();
    for i in 0..chars.len() {
        if i == 1 && !chars[i].is_uppercase() {
            break;
        }

        let next = chars.get(i + 1).copied();
        if i > 0 && next.is_some_and(|c| !c.is_uppercase()) {
            if next.is_some_and(char::is_whitespace) {
                resolved[i] = lower(chars[i]);
            }
            break;
        }

        resolved[i] = lower(chars[i]);
    }

    resolved.into_iter().collect()
}

fn lower(c: char) -> char {
    c.to_lowercase()
        .next()
        .unwrap_or(c)
}

#[derive(Debug, Default)]
struct NameTable {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

/// Append-only, shared table of field names.
///
/// Cloning yields another handle to the same table.
#[derive(Clone, Default)]
pub struct FieldNames {
    table: Arc<RwLock<NameTable>>,
}

impl FieldNames {
    /// Creates a table from `names`; a repeated name resolves to its first position.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let names: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .collect();
        let mut lookup = HashMap::with_capacity(names.len());
        for (index, name) in names.iter().enumerate().rev() {
            lookup.insert(name.clone(), index);
        }

        FieldNames {
            table: Arc::new(RwLock::new(NameTable { names, lookup })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, NameTable> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, NameTable> {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.read()
            .lookup
            .get(name)
            .copied()
    }

    /// Returns the position of `name`, appending it if it is unknown.
    fn index_or_insert(&self, name: &str) -> usize {
        let mut table = self.write();
        if let Some(index) = table.lookup.get(name) {
            return *index;
        }

        let index = table.names.len();
        table.names.push(name.to_string());
        table.lookup.insert(name.to_string(), index);
        index
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the names in table order.
    pub fn names(&self) -> Vec<String> {
        self.read().names.clone()
    }

    /// Whether both handles point at the same table.
    pub fn shares_with(&self, other: &FieldNames) -> bool {
        Arc::ptr_eq(&self.table, &other.table)
    }
}

impl fmt::Debug for FieldNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.read().names.iter())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Tombstone,
    Value(Bson),
}

/// A sparse name-to-value map backed by a shared [`FieldNames`] table.
///
/// Lookups (`get`, `contains`, `remove`) use the name as given. Writes (`set`, `insert`) resolve
/// it first: `_id` becomes `Id`, and every name then passes through the instance's
/// [`NamingStrategy`]. Changing the strategy affects later writes only.
#[derive(Clone)]
pub struct EntityProjection {
    names: FieldNames,
    values: Vec<Slot>,
    strategy: NamingStrategy,
}

impl EntityProjection {
    /// An empty projection over a fresh table.
    pub fn new() -> Self {
        Self::with_names(FieldNames::default(), NamingStrategy::Default)
    }

    /// An empty projection over an existing table.
    pub fn with_names(names: FieldNames, strategy: NamingStrategy) -> Self {
        EntityProjection {
            names,
            values: Vec::new(),
            strategy,
        }
    }

    /// Pairs `values` positionally with the table's names.
    ///
    /// Fails with [`DocumentStoreError::InvalidArgument`] if there are more values than names.
    pub fn from_parts(names: FieldNames, values: Vec<Bson>, strategy: NamingStrategy) -> DocumentStoreResult<Self> {
        if values.len() > names.len() {
            return Err(DocumentStoreError::InvalidArgument("values".to_string()));
        }

        Ok(EntityProjection {
            names,
            values: values
                .into_iter()
                .map(Slot::Value)
                .collect(),
            strategy,
        })
    }

    /// Builds a projection by setting every key of `document` in order.
    pub fn from_document(names: FieldNames, document: Document, strategy: NamingStrategy) -> Self {
        let mut projection = Self::with_names(names, strategy);
        for (key, value) in document {
            projection.set(&key, value);
        }

        projection
    }

    pub fn naming_strategy(&self) -> NamingStrategy {
        self.strategy
    }

    pub fn set_naming_strategy(&mut self, strategy: NamingStrategy) {
        self.strategy = strategy;
    }

    /// Handle to the shared name table.
    pub fn field_names(&self) -> &FieldNames {
        &self.names
    }

    /// Number of names in the shared table, tombstoned or not.
    pub fn field_count(&self) -> usize {
        self.names.len()
    }

    fn resolve(&self, name: &str) -> String {
        let name = if name == ID_FIELD { LOGICAL_ID_FIELD } else { name };
        self.strategy.resolve(name)
    }

    fn live_index(&self, name: &str) -> Option<usize> {
        self.names
            .index_of(name)
            .filter(|index| matches!(self.values.get(*index), Some(Slot::Value(_))))
    }

    pub fn get(&self, name: &str) -> Option<&Bson> {
        match self.values.get(self.names.index_of(name)?) {
            Some(Slot::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.live_index(name).is_some()
    }

    /// Stores `value` under the resolved name, growing the table if needed.
    ///
    /// Returns the resolved name.
    pub fn set(&mut self, name: &str, value: impl Into<Bson>) -> String {
        let key = self.resolve(name);
        let index = self.names.index_or_insert(&key);
        self.store(index, value.into());

        key
    }

    /// Like [`set`](Self::set), but fails with [`DocumentStoreError::InvalidArgument`] if the
    /// resolved name already holds a value.
    pub fn insert(&mut self, name: &str, value: impl Into<Bson>) -> DocumentStoreResult<()> {
        let key = self.resolve(name);
        if self.live_index(&key).is_some() {
            return Err(DocumentStoreError::InvalidArgument(key));
        }

        let index = self.names.index_or_insert(&key);
        self.store(index, value.into());

        Ok(())
    }

    fn store(&mut self, index: usize, value: Bson) {
        if self.values.len() <= index {
            let len = self.names.len().max(index + 1);
            self.values.resize(len, Slot::Tombstone);
        }

        self.values[index] = Slot::Value(value);
    }

    /// Tombstones the field. Returns `false` if it held no value.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.live_index(name) {
            Some(index) => {
                self.values[index] = Slot::Tombstone;
                true
            }
            None => false,
        }
    }

    /// Tombstones every field; the table is untouched.
    pub fn clear(&mut self) {
        self.values
            .iter_mut()
            .for_each(|slot| *slot = Slot::Tombstone);
    }

    /// Present `(name, value)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (String, &Bson)> + '_ {
        let names = self.names.names();

        names
            .into_iter()
            .zip(self.values.iter())
            .filter_map(|(name, slot)| match slot {
                Slot::Value(value) => Some((name, value)),
                Slot::Tombstone => None,
            })
    }

    pub fn keys(&self) -> Vec<String> {
        self.iter()
            .map(|(name, _)| name)
            .collect()
    }

    pub fn values(&self) -> Vec<&Bson> {
        self.iter()
            .map(|(_, value)| value)
            .collect()
    }

    /// Number of present fields.
    pub fn len(&self) -> usize {
        self.values
            .iter()
            .filter(|slot| matches!(slot, Slot::Value(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_document(&self) -> Document {
        self.iter()
            .map(|(name, value)| (name, value.clone()))
            .collect()
    }

    pub fn to_json(&self) -> DocumentStoreResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Default for EntityProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntityProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter())
            .finish()
    }
}

impl PartialEq for EntityProjection {
    fn eq(&self, other: &Self) -> bool {
        self.to_document() == other.to_document()
    }
}

impl Serialize for EntityProjection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(&name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EntityProjection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let document = Document::deserialize(deserializer)?;

        Ok(EntityProjection::from_document(
            FieldNames::default(),
            document,
            NamingStrategy::Default,
        ))
    }
}
