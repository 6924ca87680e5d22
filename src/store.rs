// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Contract of the hosted document store.
//!
//! Reads go through [`Store::query_once`], which evaluates one or more
//! predicate queries and returns the matching documents grouped by
//! collection. Writes are an ordered list of [`Operation`]s handed to
//! [`Store::transact`]; the whole list is applied atomically or not at all.
//! There is no cross-batch isolation: concurrent writers to the same document
//! race and the last write wins.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

pub type Document = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("sqlite error")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error")]
    Json(#[from] serde_json::Error),
    #[error("malformed document in {collection}")]
    Decode {
        collection: Collection,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Households,
    HouseholdMembers,
    Accounts,
    CategoryGroups,
    Categories,
    CategoryMappings,
    Transactions,
    Budgets,
    BudgetSummaries,
    SharedExpenseSplits,
    Settlements,
    RecurringTemplates,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Households => "households",
            Collection::HouseholdMembers => "householdMembers",
            Collection::Accounts => "accounts",
            Collection::CategoryGroups => "categoryGroups",
            Collection::Categories => "categories",
            Collection::CategoryMappings => "categoryMappings",
            Collection::Transactions => "transactions",
            Collection::Budgets => "budgets",
            Collection::BudgetSummaries => "budgetSummaries",
            Collection::SharedExpenseSplits => "sharedExpenseSplits",
            Collection::Settlements => "settlements",
            Collection::RecurringTemplates => "recurringTemplates",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals value. `Null` also matches a missing field.
    Eq(String, Value),
    /// Field equals any of the values.
    In(String, Vec<Value>),
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq(field, Value::Null) => doc.get(field).is_none_or(Value::is_null),
            Filter::Eq(field, want) => doc.get(field) == Some(want),
            Filter::In(field, wants) => doc.get(field).is_some_and(|v| wants.contains(v)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: Collection,
    pub filters: Vec<Filter>,
}

impl Query {
    pub fn all(collection: Collection) -> Self {
        Query {
            collection,
            filters: Vec::new(),
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value.into()));
        self
    }

    pub fn where_in<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.filters.push(Filter::In(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }
}

/// Documents returned by one `query_once` call, keyed by collection.
#[derive(Debug, Default)]
pub struct QueryResult {
    docs: HashMap<Collection, Vec<Document>>,
}

impl QueryResult {
    pub fn push(&mut self, collection: Collection, doc: Document) {
        self.docs.entry(collection).or_default().push(doc);
    }

    pub fn ensure(&mut self, collection: Collection) {
        self.docs.entry(collection).or_default();
    }

    pub fn raw(&self, collection: Collection) -> &[Document] {
        self.docs.get(&collection).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Decode every document of `collection` into `T`.
    pub fn take<T: DeserializeOwned>(&mut self, collection: Collection) -> Result<Vec<T>, StoreError> {
        self.docs
            .remove(&collection)
            .unwrap_or_default()
            .into_iter()
            .map(|doc| {
                serde_json::from_value(Value::Object(doc))
                    .map_err(|source| StoreError::Decode { collection, source })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Merge `fields` into the document, creating it when absent.
    Update {
        collection: Collection,
        id: String,
        fields: Document,
    },
    Delete {
        collection: Collection,
        id: String,
    },
}

impl Operation {
    pub fn update(collection: Collection, id: &str, fields: Value) -> Self {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Document::new(),
        };
        Operation::Update {
            collection,
            id: id.to_string(),
            fields,
        }
    }

    /// Write a whole record. Its `id` field is dropped from the body since
    /// the store keys documents by id.
    pub fn put<T: Serialize>(collection: Collection, id: &str, record: &T) -> Result<Self, StoreError> {
        let mut value = serde_json::to_value(record)?;
        if let Value::Object(map) = &mut value {
            map.remove("id");
        }
        Ok(Operation::update(collection, id, value))
    }

    pub fn delete(collection: Collection, id: &str) -> Self {
        Operation::Delete {
            collection,
            id: id.to_string(),
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            Operation::Update { collection, .. } | Operation::Delete { collection, .. } => *collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Operation::Update { id, .. } | Operation::Delete { id, .. } => id,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Operation::Delete { .. })
    }
}

pub trait Store {
    fn query_once(&self, queries: &[Query]) -> Result<QueryResult, StoreError>;

    /// Apply every operation or none of them.
    fn transact(&self, ops: Vec<Operation>) -> Result<(), StoreError>;
}

/// Run a single query and decode its documents.
pub fn fetch<T: DeserializeOwned>(store: &dyn Store, query: Query) -> Result<Vec<T>, StoreError> {
    let collection = query.collection;
    let mut res = store.query_once(std::slice::from_ref(&query))?;
    res.take(collection)
}

pub fn fetch_one<T: DeserializeOwned>(store: &dyn Store, collection: Collection, id: &str) -> Result<Option<T>, StoreError> {
    let mut rows = fetch(store, Query::all(collection).where_eq("id", id))?;
    Ok(rows.pop())
}

/// Merge `fields` into `doc`, key by key.
pub(crate) fn merge_into(doc: &mut Document, fields: &Document) {
    for (k, v) in fields {
        doc.insert(k.clone(), v.clone());
    }
}

/// In-process store: keeps documents in insertion order, remembers every
/// committed batch and can be told to fail reads or writes.
#[derive(Default)]
pub struct MemoryStore {
    docs: RefCell<Vec<(Collection, String, Document)>>,
    batches: RefCell<Vec<Vec<Operation>>>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing batch bookkeeping.
    pub fn insert<T: Serialize>(&self, collection: Collection, id: &str, record: &T) -> Result<(), StoreError> {
        let op = Operation::put(collection, id, record)?;
        self.apply(&op);
        Ok(())
    }

    pub fn get(&self, collection: Collection, id: &str) -> Option<Document> {
        self.docs
            .borrow()
            .iter()
            .find(|(c, i, _)| *c == collection && i == id)
            .map(|(_, _, d)| d.clone())
    }

    pub fn count(&self, collection: Collection) -> usize {
        self.docs.borrow().iter().filter(|(c, _, _)| *c == collection).count()
    }

    pub fn batches(&self) -> Vec<Vec<Operation>> {
        self.batches.borrow().clone()
    }

    pub fn last_batch(&self) -> Option<Vec<Operation>> {
        self.batches.borrow().last().cloned()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    fn apply(&self, op: &Operation) {
        let mut docs = self.docs.borrow_mut();
        match op {
            Operation::Update { collection, id, fields } => {
                match docs.iter_mut().find(|(c, i, _)| c == collection && i == id) {
                    Some((_, _, doc)) => merge_into(doc, fields),
                    None => {
                        let mut doc = Document::new();
                        doc.insert("id".into(), Value::String(id.clone()));
                        merge_into(&mut doc, fields);
                        docs.push((*collection, id.clone(), doc));
                    }
                }
            }
            Operation::Delete { collection, id } => {
                docs.retain(|(c, i, _)| !(c == collection && i == id));
            }
        }
    }
}

impl Store for MemoryStore {
    fn query_once(&self, queries: &[Query]) -> Result<QueryResult, StoreError> {
        if self.fail_reads.get() {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        let docs = self.docs.borrow();
        let mut res = QueryResult::default();
        for q in queries {
            res.ensure(q.collection);
            for (c, _, doc) in docs.iter() {
                if *c == q.collection && q.matches(doc) {
                    res.push(*c, doc.clone());
                }
            }
        }
        Ok(res)
    }

    fn transact(&self, ops: Vec<Operation>) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        for op in &ops {
            self.apply(op);
        }
        self.batches.borrow_mut().push(ops);
        Ok(())
    }
}
