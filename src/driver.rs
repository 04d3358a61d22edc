//! Top-level driver façade.
//!
//! A driver owns one physical connection and a registry of collection
//! handles keyed by collection identifier. The registry is an identity
//! cache: the same identifier returns the same handle for the driver's
//! lifetime, and dropping a collection evicts the entry so the table is
//! recreated empty on next access.
//!
//! One driver serves one execution context; callers needing concurrency
//! open one driver (and thus one connection) per context.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::collection::Collection;
use crate::config::ConnectionOptions;
use crate::core::document::{self, Document};
use crate::core::traits::Backend;
use crate::drivers::{self, DialectImpl};
use crate::error::{DriverError, Result};
use crate::populate::ResultIterator;
use crate::query::{Filter, FindOptions, QueryBuilder};

/// What an `insert` call produced: one stored document, or the count of a
/// batch insert.
#[derive(Debug)]
pub enum Inserted {
    One(Document),
    Many(u64),
}

/// The document-store façade over one database connection.
pub struct Driver {
    backend: Arc<dyn Backend>,
    builder: QueryBuilder,
    collections: Mutex<HashMap<String, Arc<Collection>>>,
}

impl Driver {
    /// Connect and validate the server. Fails before any query when the
    /// connection kind is unusable or the server version is unsupported.
    pub async fn connect(options: &ConnectionOptions) -> Result<Self> {
        let (backend, dialect) = drivers::connect(options).await?;
        Ok(Self::assemble(backend, dialect))
    }

    #[cfg(test)]
    pub(crate) fn from_parts(backend: Arc<dyn Backend>, dialect: DialectImpl) -> Self {
        Self::assemble(backend, dialect)
    }

    fn assemble(backend: Arc<dyn Backend>, dialect: DialectImpl) -> Self {
        Self {
            backend,
            builder: QueryBuilder::new(dialect),
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// Compose a collection identifier from a name and an optional
    /// namespace: `db/name`, or just `name`.
    pub fn collection_id(name: &str, db: Option<&str>) -> String {
        match db {
            Some(db) => format!("{}/{}", db, name),
            None => name.to_string(),
        }
    }

    /// The collection handle for an identifier, creating the physical table
    /// on first access.
    pub async fn get_collection(&self, collection_id: &str) -> Result<Arc<Collection>> {
        let mut registry = self.collections.lock().await;

        if let Some(existing) = registry.get(collection_id) {
            return Ok(existing.clone());
        }

        let collection = Arc::new(Collection::new(
            self.backend.clone(),
            self.builder.clone(),
            collection_id.to_string(),
        ));
        collection.create_if_not_exists().await?;
        registry.insert(collection_id.to_string(), collection.clone());
        Ok(collection)
    }

    /// Drop a collection's table and evict it from the registry.
    pub async fn drop_collection(&self, collection_id: &str) -> Result<()> {
        let collection = self.get_collection(collection_id).await?;
        collection.drop().await?;
        self.collections.lock().await.remove(collection_id);
        Ok(())
    }

    /// Find matching documents. The returned iterator lazily applies any
    /// registered hasOne/hasMany relationships per document.
    pub async fn find(
        &self,
        collection_id: &str,
        filter: Filter,
        options: FindOptions,
    ) -> Result<ResultIterator<'_>> {
        let collection = self.get_collection(collection_id).await?;
        Ok(ResultIterator::new(self, collection.find(filter, options)))
    }

    /// The first matching document, or `None`.
    pub async fn find_one(&self, collection_id: &str, filter: Filter) -> Result<Option<Document>> {
        self.get_collection(collection_id)
            .await?
            .find_one(filter, FindOptions::default())
            .await
    }

    /// Find a document by its `_id`.
    pub async fn find_one_by_id(
        &self,
        collection_id: &str,
        doc_id: &str,
    ) -> Result<Option<Document>> {
        self.find_one(collection_id, id_filter(doc_id)).await
    }

    /// Save a document: insert when it has no `_id`; otherwise replace it
    /// wholesale when `is_create` is set, else merge-update. The flag is
    /// explicit, never inferred. Returns the stored document (with the
    /// assigned `_id` on insert).
    pub async fn save(
        &self,
        collection_id: &str,
        doc: Document,
        is_create: bool,
    ) -> Result<Document> {
        let doc_id = match document::doc_id(&doc) {
            Some(id) => id.to_string(),
            None => {
                return self
                    .get_collection(collection_id)
                    .await?
                    .insert_one(doc)
                    .await
            }
        };

        let collection = self.get_collection(collection_id).await?;
        if is_create {
            collection.replace_one(id_filter(&doc_id), doc.clone()).await?;
        } else {
            collection.update_one(id_filter(&doc_id), &doc).await?;
        }
        Ok(doc)
    }

    /// Insert a single document (JSON object) or a batch (JSON array of
    /// objects), dispatching on the payload shape.
    pub async fn insert(&self, collection_id: &str, payload: Value) -> Result<Inserted> {
        let collection = self.get_collection(collection_id).await?;
        match payload {
            Value::Object(doc) => Ok(Inserted::One(collection.insert_one(doc).await?)),
            Value::Array(items) => {
                let mut docs = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(doc) => docs.push(doc),
                        other => {
                            return Err(DriverError::InvalidDocument(format!(
                                "cannot insert non-object value: {}",
                                other
                            )))
                        }
                    }
                }
                Ok(Inserted::Many(collection.insert_many(docs).await?))
            }
            other => Err(DriverError::InvalidDocument(format!(
                "cannot insert non-object value: {}",
                other
            ))),
        }
    }

    /// Merge `data` into every matching document.
    pub async fn update(
        &self,
        collection_id: &str,
        filter: Filter,
        data: &Document,
    ) -> Result<bool> {
        self.get_collection(collection_id)
            .await?
            .update_many(filter, data, FindOptions::default())
            .await
    }

    /// Delete every matching document.
    pub async fn remove(&self, collection_id: &str, filter: Filter) -> Result<bool> {
        self.get_collection(collection_id)
            .await?
            .delete_many(filter)
            .await
    }

    /// Count matching documents.
    pub async fn count(&self, collection_id: &str, filter: Filter) -> Result<u64> {
        self.get_collection(collection_id)
            .await?
            .count_documents(filter)
            .await
    }

    /// Remove a field from every matching document that carries it. Each
    /// document is decoded, mutated and re-saved; a failure partway leaves
    /// earlier rewrites committed.
    pub async fn remove_field(
        &self,
        collection_id: &str,
        field: &str,
        filter: Filter,
    ) -> Result<()> {
        let docs = self
            .get_collection(collection_id)
            .await?
            .find(filter, FindOptions::default())
            .to_array()
            .await?;

        for mut doc in docs {
            if doc.remove(field).is_none() {
                continue;
            }
            self.save(collection_id, doc, true).await?;
        }
        Ok(())
    }

    /// Rename a field in every matching document that carries it.
    pub async fn rename_field(
        &self,
        collection_id: &str,
        field: &str,
        new_field: &str,
        filter: Filter,
    ) -> Result<()> {
        let docs = self
            .get_collection(collection_id)
            .await?
            .find(filter, FindOptions::default())
            .to_array()
            .await?;

        for mut doc in docs {
            let value = match doc.remove(field) {
                Some(value) => value,
                None => continue,
            };
            doc.insert(new_field.to_string(), value);
            self.save(collection_id, doc, true).await?;
        }
        Ok(())
    }

    /// Close the underlying connection. Further use of this driver fails.
    pub async fn close(&self) -> Result<()> {
        self.backend.close().await
    }
}

fn id_filter(doc_id: &str) -> Filter {
    let mut tree = Map::new();
    tree.insert("_id".to_string(), Value::String(doc_id.to_string()));
    Filter::Expr(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MysqlDialect;
    use crate::testutil::StubBackend;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn driver(stub: Arc<StubBackend>) -> Driver {
        Driver::from_parts(stub, DialectImpl::Mysql(MysqlDialect::new()))
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_registry_returns_same_handle() {
        let stub = Arc::new(StubBackend::new());
        let driver = driver(stub.clone());

        let a = driver.get_collection("posts").await.unwrap();
        let b = driver.get_collection("posts").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        // The table is only created once
        let creates = stub
            .executed()
            .iter()
            .filter(|sql| sql.starts_with("CREATE TABLE"))
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn test_namespaced_collection_id() {
        assert_eq!(Driver::collection_id("posts", Some("app")), "app/posts");
        assert_eq!(Driver::collection_id("posts", None), "posts");
    }

    #[tokio::test]
    async fn test_drop_collection_evicts_and_recreates() {
        let stub = Arc::new(StubBackend::new());
        let driver = driver(stub.clone());

        let before = driver.get_collection("posts").await.unwrap();
        driver.drop_collection("posts").await.unwrap();
        let after = driver.get_collection("posts").await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));

        let executed = stub.executed();
        let creates = executed
            .iter()
            .filter(|sql| sql.starts_with("CREATE TABLE"))
            .count();
        assert_eq!(creates, 2);
        assert!(executed.iter().any(|sql| sql.starts_with("DROP TABLE")));
    }

    #[tokio::test]
    async fn test_save_without_id_inserts() {
        let stub = Arc::new(StubBackend::new());
        let saved = driver(stub.clone())
            .save("posts", doc(json!({"name": "n"})), false)
            .await
            .unwrap();
        assert!(document::doc_id(&saved).is_some());
        assert!(stub.executed().iter().any(|sql| sql.starts_with("INSERT")));
    }

    #[tokio::test]
    async fn test_save_merge_vs_create() {
        let stub = Arc::new(StubBackend::new());
        let driver = driver(stub.clone());

        // Merge path: the stored document is fetched and merged
        stub.push_rows(vec![r#"{"_id":"a","kept":1}"#]);
        driver
            .save("posts", doc(json!({"_id": "a", "name": "n"})), false)
            .await
            .unwrap();
        let merged_update = stub
            .executed()
            .into_iter()
            .rev()
            .find(|sql| sql.starts_with("UPDATE"))
            .unwrap();
        assert!(merged_update.contains(r#"\"kept\":1"#));

        // Create path: full replacement, no merge
        stub.push_rows(vec![r#"{"_id":"a","kept":1}"#]);
        driver
            .save("posts", doc(json!({"_id": "a", "name": "n"})), true)
            .await
            .unwrap();
        let replace_update = stub
            .executed()
            .into_iter()
            .rev()
            .find(|sql| sql.starts_with("UPDATE"))
            .unwrap();
        assert!(!replace_update.contains("kept"));
    }

    #[tokio::test]
    async fn test_insert_dispatches_on_shape() {
        let stub = Arc::new(StubBackend::new());
        let driver = driver(stub.clone());

        match driver.insert("posts", json!({"a": 1})).await.unwrap() {
            Inserted::One(stored) => assert!(document::doc_id(&stored).is_some()),
            other => panic!("expected One, got {:?}", other),
        }

        match driver
            .insert("posts", json!([{"a": 1}, {"a": 2}]))
            .await
            .unwrap()
        {
            Inserted::Many(count) => assert_eq!(count, 2),
            other => panic!("expected Many, got {:?}", other),
        }

        assert!(driver.insert("posts", json!("scalar")).await.is_err());
        assert!(driver.insert("posts", json!([1])).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_field_rewrites_only_carriers() {
        let stub = Arc::new(StubBackend::new());
        let driver = driver(stub.clone());

        // Two documents match; only the first carries the field
        stub.push_rows(vec![
            r#"{"_id":"a","content":"x","rest":1}"#,
            r#"{"_id":"b","rest":2}"#,
        ]);
        // The rewrite goes through save(is_create) -> replace_one -> find_one
        stub.push_rows(vec![r#"{"_id":"a","content":"x","rest":1}"#]);

        driver
            .remove_field("posts", "content", Filter::empty())
            .await
            .unwrap();

        let updates: Vec<String> = stub
            .executed()
            .into_iter()
            .filter(|sql| sql.starts_with("UPDATE"))
            .collect();
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].contains("content"));
        assert!(updates[0].ends_with("WHERE `document` ->> '$._id' = 'a'"));
    }

    #[tokio::test]
    async fn test_rename_field_moves_value() {
        let stub = Arc::new(StubBackend::new());
        let driver = driver(stub.clone());

        stub.push_rows(vec![r#"{"_id":"a","old_name":"v"}"#]);
        stub.push_rows(vec![r#"{"_id":"a","old_name":"v"}"#]);

        driver
            .rename_field("posts", "old_name", "new_name", Filter::empty())
            .await
            .unwrap();

        let update = stub
            .executed()
            .into_iter()
            .find(|sql| sql.starts_with("UPDATE"))
            .unwrap();
        assert!(update.contains(r#"\"new_name\":\"v\""#));
        assert!(!update.contains("old_name"));
    }
}
