//! One collection bound to one physical table.
//!
//! A collection owns no connection of its own; it shares the driver's
//! backend and query builder and contributes the statement construction for
//! the document verbs. The table is created when the driver first hands out
//! the collection handle.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::core::document::{self, Document};
use crate::core::id;
use crate::core::traits::{Backend, Dialect};
use crate::cursor::Cursor;
use crate::error::{DriverError, Result};
use crate::query::{Filter, FindOptions, QueryBuilder};

/// A named set of documents, materialized as one table.
pub struct Collection {
    backend: Arc<dyn Backend>,
    builder: QueryBuilder,
    name: String,
}

impl Collection {
    pub(crate) fn new(backend: Arc<dyn Backend>, builder: QueryBuilder, name: String) -> Self {
        Self {
            backend,
            builder,
            name,
        }
    }

    /// The collection identifier (also the physical table name).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) async fn create_if_not_exists(&self) -> Result<()> {
        let sql = self.builder.build_create_table(&self.name);
        self.backend.execute_ddl(&sql).await
    }

    /// Start a find query. No I/O happens until the cursor is polled.
    pub fn find(&self, filter: Filter, options: FindOptions) -> Cursor {
        Cursor::new(
            self.backend.clone(),
            self.builder.clone(),
            self.name.clone(),
            filter,
            options,
        )
    }

    /// The first matching document, or `None`. An empty result is not an
    /// error.
    pub async fn find_one(
        &self,
        filter: Filter,
        options: FindOptions,
    ) -> Result<Option<Document>> {
        let options = FindOptions {
            limit: Some(1),
            ..options
        };
        let docs = self.find(filter, options).to_array().await?;
        Ok(docs.into_iter().next())
    }

    /// Insert one document, assigning `_id` when absent. Returns the stored
    /// document.
    pub async fn insert_one(&self, document: Document) -> Result<Document> {
        let document = with_id(document);
        let sql = self.insert_sql(std::slice::from_ref(&document));
        self.backend.execute(&sql).await?;
        Ok(document)
    }

    /// Insert several documents in one multi-row statement. Returns the
    /// inserted count.
    pub async fn insert_many(&self, documents: Vec<Document>) -> Result<u64> {
        if documents.is_empty() {
            return Ok(0);
        }
        let documents: Vec<Document> = documents.into_iter().map(with_id).collect();
        let sql = self.insert_sql(&documents);
        self.backend.execute(&sql).await?;
        Ok(documents.len() as u64)
    }

    /// Merge `patch` into every matching document and rewrite it. Returns
    /// whether anything matched.
    ///
    /// The match set is fully materialized before the first UPDATE: the
    /// single connection cannot run a write while a result set is open.
    pub async fn update_many(
        &self,
        filter: Filter,
        patch: &Document,
        options: FindOptions,
    ) -> Result<bool> {
        let matches = self.find(filter, options).to_array().await?;
        let mut updated = false;

        for item in matches {
            let id = document::doc_id(&item)
                .ok_or_else(|| {
                    DriverError::InvalidDocument("matched document has no _id".to_string())
                })?
                .to_string();
            let merged = document::merge(&item, patch);
            let sql = self.update_by_id_sql(&id, &merged);
            self.backend.execute(&sql).await?;
            updated = true;
        }

        Ok(updated)
    }

    /// Merge `patch` into the first matching document.
    pub async fn update_one(&self, filter: Filter, patch: &Document) -> Result<bool> {
        self.update_many(filter, patch, FindOptions::first()).await
    }

    /// Replace the first matching document wholesale (no merge). Returns
    /// whether a match was found.
    pub async fn replace_one(&self, filter: Filter, document: Document) -> Result<bool> {
        let target = match self.find_one(filter, FindOptions::default()).await? {
            Some(target) => target,
            None => return Ok(false),
        };
        let id = document::doc_id(&target)
            .ok_or_else(|| DriverError::InvalidDocument("matched document has no _id".to_string()))?
            .to_string();

        // The replacement keeps the matched row's identity
        let mut replacement = document;
        if document::doc_id(&replacement).is_none() {
            replacement.insert("_id".to_string(), Value::String(id.clone()));
        }

        let sql = self.update_by_id_sql(&id, &replacement);
        self.backend.execute(&sql).await?;
        Ok(true)
    }

    /// Delete every matching document. Only expression filters can be
    /// compiled into a DELETE.
    pub async fn delete_many(&self, filter: Filter) -> Result<bool> {
        let tree = match filter {
            Filter::Expr(tree) => tree,
            Filter::Predicate(_) => {
                return Err(DriverError::InvalidCondition(
                    "deleteMany does not accept predicate filters".to_string(),
                ))
            }
        };
        let mut sql = format!("DELETE FROM {}", self.builder.quote_ident(&self.name));
        if let Some(where_sql) = self.builder.build_where(&tree)? {
            sql.push(' ');
            sql.push_str(&where_sql);
        }
        self.backend.execute(&sql).await?;
        Ok(true)
    }

    /// Count matching documents. Expression filters push the count to SQL;
    /// a predicate filter enumerates in-process.
    pub async fn count_documents(&self, filter: Filter) -> Result<u64> {
        if let Filter::Expr(tree) = &filter {
            let mut sql = format!(
                "SELECT COUNT({}) FROM {}",
                self.builder.quote_ident("document"),
                self.builder.quote_ident(&self.name)
            );
            if let Some(where_sql) = self.builder.build_where(tree)? {
                sql.push(' ');
                sql.push_str(&where_sql);
            }
            let count = self.backend.query_scalar(&sql).await?.unwrap_or(0);
            return Ok(count.max(0) as u64);
        }

        let docs = self.find(filter, FindOptions::default()).to_array().await?;
        Ok(docs.len() as u64)
    }

    /// Drop the physical table. The owning driver evicts this handle from
    /// its registry; the table is recreated empty on next access.
    pub async fn drop(&self) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.builder.quote_ident(&self.name));
        self.backend.execute(&sql).await?;
        info!("dropped collection {}", self.name);
        Ok(())
    }

    fn insert_sql(&self, documents: &[Document]) -> String {
        let dialect = self.builder.dialect();
        let rows = documents
            .iter()
            .map(|doc| format!("({})", dialect.quote_str(&document::encode_document(doc))))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.builder.quote_ident(&self.name),
            self.builder.quote_ident("document"),
            rows
        )
    }

    fn update_by_id_sql(&self, id: &str, document: &Document) -> String {
        let dialect = self.builder.dialect();
        format!(
            "UPDATE {} SET {} = {} WHERE {} = {}",
            self.builder.quote_ident(&self.name),
            self.builder.quote_ident("document"),
            dialect.quote_str(&document::encode_document(document)),
            dialect.path_selector("_id", true),
            dialect.quote_str(id)
        )
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Assign a fresh `_id` unless the document already carries a non-empty one.
fn with_id(mut document: Document) -> Document {
    if document::doc_id(&document).is_none() {
        document.insert("_id".to_string(), Value::String(id::object_id()));
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{DialectImpl, MysqlDialect};
    use crate::query::FilterTree;
    use crate::testutil::StubBackend;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn collection(stub: Arc<StubBackend>) -> Collection {
        Collection::new(
            stub,
            QueryBuilder::new(DialectImpl::Mysql(MysqlDialect::new())),
            "posts".to_string(),
        )
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().unwrap().clone()
    }

    fn tree(value: serde_json::Value) -> FilterTree {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_insert_one_assigns_id() {
        let stub = Arc::new(StubBackend::new());
        let stored = collection(stub.clone())
            .insert_one(doc(json!({"name": "n"})))
            .await
            .unwrap();

        let id = stored.get("_id").and_then(Value::as_str).unwrap();
        assert_eq!(id.len(), 24);

        let sql = stub.executed().pop().unwrap();
        assert!(sql.starts_with("INSERT INTO `posts` (`document`) VALUES ('{"));
        assert!(sql.contains(id));
    }

    #[tokio::test]
    async fn test_insert_one_keeps_existing_id() {
        let stub = Arc::new(StubBackend::new());
        let stored = collection(stub)
            .insert_one(doc(json!({"_id": "fixed", "name": "n"})))
            .await
            .unwrap();
        assert_eq!(stored.get("_id"), Some(&json!("fixed")));
    }

    #[tokio::test]
    async fn test_insert_many_is_one_statement() {
        let stub = Arc::new(StubBackend::new());
        let count = collection(stub.clone())
            .insert_many(vec![doc(json!({"a": 1})), doc(json!({"a": 2}))])
            .await
            .unwrap();
        assert_eq!(count, 2);

        let executed = stub.executed();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].contains("VALUES ('{"));
        assert!(executed[0].contains("'), ('{"));
    }

    #[tokio::test]
    async fn test_update_many_merges_and_rewrites() {
        let stub = Arc::new(StubBackend::new());
        stub.push_rows(vec![r#"{"_id":"a","name":"old","kept":1}"#]);

        let updated = collection(stub.clone())
            .update_many(
                Filter::Expr(tree(json!({"name": "old"}))),
                &doc(json!({"name": "new"})),
                FindOptions::default(),
            )
            .await
            .unwrap();
        assert!(updated);

        let executed = stub.executed();
        // SELECT first (materialized), then the UPDATE
        assert!(executed[0].starts_with("SELECT"));
        let update = &executed[1];
        assert!(update.starts_with("UPDATE `posts` SET `document` = "));
        assert!(update.contains(r#"\"name\":\"new\""#));
        assert!(update.contains(r#"\"kept\":1"#));
        assert!(update.ends_with("WHERE `document` ->> '$._id' = 'a'"));
    }

    #[tokio::test]
    async fn test_update_many_without_match_reports_false() {
        let stub = Arc::new(StubBackend::new());
        stub.push_rows(vec![]);
        let updated = collection(stub)
            .update_many(Filter::empty(), &doc(json!({"a": 1})), FindOptions::default())
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn test_replace_one_overwrites_first_match_only() {
        let stub = Arc::new(StubBackend::new());
        stub.push_rows(vec![r#"{"_id":"a","old":true}"#]);

        let replaced = collection(stub.clone())
            .replace_one(Filter::Expr(tree(json!({"old": true}))), doc(json!({"fresh": 1})))
            .await
            .unwrap();
        assert!(replaced);

        let executed = stub.executed();
        // find_one carries LIMIT 1
        assert!(executed[0].contains("LIMIT 1"));
        let update = &executed[1];
        assert!(update.contains(r#"\"fresh\":1"#));
        // No merge: the old field is gone, the identity is kept
        assert!(!update.contains("old"));
        assert!(update.contains(r#"\"_id\":\"a\""#));
    }

    #[tokio::test]
    async fn test_replace_one_without_match() {
        let stub = Arc::new(StubBackend::new());
        stub.push_rows(vec![]);
        let replaced = collection(stub)
            .replace_one(Filter::empty(), doc(json!({"x": 1})))
            .await
            .unwrap();
        assert!(!replaced);
    }

    #[tokio::test]
    async fn test_delete_many_builds_where() {
        let stub = Arc::new(StubBackend::new());
        collection(stub.clone())
            .delete_many(Filter::Expr(tree(json!({"a": 1}))))
            .await
            .unwrap();
        assert_eq!(
            stub.executed().pop().unwrap(),
            "DELETE FROM `posts` WHERE `document` ->> '$.a' = '1'"
        );
    }

    #[tokio::test]
    async fn test_count_pushes_down_expression_filters() {
        let stub = Arc::new(StubBackend::new());
        stub.push_scalar(7);
        let count = collection(stub.clone())
            .count_documents(Filter::Expr(tree(json!({"a": 1}))))
            .await
            .unwrap();
        assert_eq!(count, 7);
        assert_eq!(
            stub.executed().pop().unwrap(),
            "SELECT COUNT(`document`) FROM `posts` WHERE `document` ->> '$.a' = '1'"
        );
    }

    #[tokio::test]
    async fn test_count_enumerates_for_predicates() {
        let stub = Arc::new(StubBackend::new());
        stub.push_rows(vec![r#"{"_id":"a","n":1}"#, r#"{"_id":"b","n":2}"#]);
        let count = collection(stub)
            .count_documents(Filter::predicate(|d: &Document| {
                d.get("n") == Some(&json!(2))
            }))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_drop_table() {
        let stub = Arc::new(StubBackend::new());
        collection(stub.clone()).drop().await.unwrap();
        assert_eq!(stub.executed().pop().unwrap(), "DROP TABLE IF EXISTS `posts`");
    }
}
