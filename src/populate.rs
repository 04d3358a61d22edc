//! Relationship population over a cursor.
//!
//! A `ResultIterator` wraps a cursor and, as each document is yielded,
//! joins in documents from other collections:
//!
//! - **hasOne**: a local foreign-key field holding another document's `_id`
//!   is replaced by that document (or JSON null when it is gone).
//! - **hasMany**: the documents of another collection whose back-reference
//!   field equals this document's `_id` are attached under that
//!   collection's name.
//!
//! Lookups are cached per `(collection, key)` for the iterator's lifetime,
//! so repeated foreign keys across one iteration cost one query each.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::core::document::Document;
use crate::cursor::Cursor;
use crate::driver::Driver;
use crate::error::Result;
use crate::query::{Filter, FindOptions};

/// A lazy result sequence with relationship population.
pub struct ResultIterator<'d> {
    driver: &'d Driver,
    cursor: Cursor,
    /// (local foreign-key field, target collection)
    has_one: Vec<(String, String)>,
    /// (target collection, remote foreign-key field)
    has_many: Vec<(String, String)>,
    one_cache: HashMap<(String, String), Value>,
    many_cache: HashMap<(String, String), Vec<Document>>,
}

impl<'d> ResultIterator<'d> {
    pub(crate) fn new(driver: &'d Driver, cursor: Cursor) -> Self {
        Self {
            driver,
            cursor,
            has_one: Vec::new(),
            has_many: Vec::new(),
            one_cache: HashMap::new(),
            many_cache: HashMap::new(),
        }
    }

    /// Register hasOne relationships: local foreign-key field → target
    /// collection. Repeated calls accumulate.
    pub fn has_one<I>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.has_one.extend(relations);
        self
    }

    /// Register hasMany relationships: target collection → remote field
    /// holding the back-reference to this document's `_id`. Repeated calls
    /// accumulate.
    pub fn has_many<I>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.has_many.extend(relations);
        self
    }

    /// Produce the next document with relationships applied.
    pub async fn next(&mut self) -> Result<Option<Document>> {
        let mut doc = match self.cursor.next().await? {
            Some(doc) => doc,
            None => return Ok(None),
        };
        self.apply_has_one(&mut doc).await?;
        self.apply_has_many(&mut doc).await?;
        Ok(Some(doc))
    }

    /// Drain into an ordered vector.
    pub async fn to_array(mut self) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        while let Some(doc) = self.next().await? {
            docs.push(doc);
        }
        Ok(docs)
    }

    async fn apply_has_one(&mut self, doc: &mut Document) -> Result<()> {
        let relations = self.has_one.clone();
        for (fkey, collection) in relations {
            let fk = match doc.get(&fkey) {
                Some(Value::String(fk)) if !fk.is_empty() => fk.clone(),
                _ => continue,
            };

            let cache_key = (collection.clone(), fk.clone());
            if !self.one_cache.contains_key(&cache_key) {
                let related = self.driver.find_one_by_id(&collection, &fk).await?;
                let resolved = related.map(Value::Object).unwrap_or(Value::Null);
                self.one_cache.insert(cache_key.clone(), resolved);
            }

            doc.insert(fkey, self.one_cache[&cache_key].clone());
        }
        Ok(())
    }

    async fn apply_has_many(&mut self, doc: &mut Document) -> Result<()> {
        let id = match doc.get("_id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => return Ok(()),
        };

        let relations = self.has_many.clone();
        for (collection, fkey) in relations {
            let cache_key = (collection.clone(), id.clone());
            if !self.many_cache.contains_key(&cache_key) {
                let mut tree = Map::new();
                tree.insert(fkey, Value::String(id.clone()));
                let related = self
                    .driver
                    .get_collection(&collection)
                    .await?
                    .find(Filter::Expr(tree), FindOptions::default())
                    .to_array()
                    .await?;
                self.many_cache.insert(cache_key.clone(), related);
            }

            let related = self.many_cache[&cache_key]
                .iter()
                .cloned()
                .map(Value::Object)
                .collect();
            doc.insert(collection, Value::Array(related));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Driver;
    use crate::drivers::{DialectImpl, MysqlDialect};
    use crate::testutil::StubBackend;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn driver(stub: Arc<StubBackend>) -> Driver {
        Driver::from_parts(stub, DialectImpl::Mysql(MysqlDialect::new()))
    }

    #[tokio::test]
    async fn test_has_one_replaces_fk_and_caches() {
        let stub = Arc::new(StubBackend::new());
        let driver = driver(stub.clone());

        // Two posts pointing at the same author
        stub.push_rows(vec![
            r#"{"_id":"p1","author":"u1"}"#,
            r#"{"_id":"p2","author":"u1"}"#,
        ]);
        // One author lookup; the second post hits the cache
        stub.push_rows(vec![r#"{"_id":"u1","name":"Ada"}"#]);

        let docs = driver
            .find("posts", Filter::empty(), FindOptions::default())
            .await
            .unwrap()
            .has_one(vec![("author".to_string(), "users".to_string())])
            .to_array()
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].get("author"), Some(&json!({"_id": "u1", "name": "Ada"})));
        assert_eq!(docs[1].get("author"), docs[0].get("author"));

        // posts scan + one users lookup (cached for the repeat)
        let selects = stub
            .executed()
            .iter()
            .filter(|sql| sql.starts_with("SELECT"))
            .count();
        assert_eq!(selects, 2);
    }

    #[tokio::test]
    async fn test_has_one_missing_target_becomes_null() {
        let stub = Arc::new(StubBackend::new());
        let driver = driver(stub.clone());

        stub.push_rows(vec![r#"{"_id":"p1","author":"gone"}"#]);
        stub.push_rows(vec![]);

        let docs = driver
            .find("posts", Filter::empty(), FindOptions::default())
            .await
            .unwrap()
            .has_one(vec![("author".to_string(), "users".to_string())])
            .to_array()
            .await
            .unwrap();

        assert_eq!(docs[0].get("author"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_has_many_attaches_children() {
        let stub = Arc::new(StubBackend::new());
        let driver = driver(stub.clone());

        stub.push_rows(vec![r#"{"_id":"p1"}"#]);
        stub.push_rows(vec![
            r#"{"_id":"c1","post":"p1"}"#,
            r#"{"_id":"c2","post":"p1"}"#,
        ]);

        let docs = driver
            .find("posts", Filter::empty(), FindOptions::default())
            .await
            .unwrap()
            .has_many(vec![("comments".to_string(), "post".to_string())])
            .to_array()
            .await
            .unwrap();

        let comments = docs[0].get("comments").and_then(Value::as_array).unwrap();
        assert_eq!(comments.len(), 2);

        // The child query filters on the back-reference field
        let child_query = stub
            .executed()
            .into_iter()
            .find(|sql| sql.starts_with("SELECT") && sql.contains("`comments`"))
            .unwrap();
        assert!(child_query.contains("`document` ->> '$.post' = 'p1'"));
    }

    #[tokio::test]
    async fn test_registrations_accumulate() {
        let stub = Arc::new(StubBackend::new());
        let driver = driver(stub.clone());

        stub.push_rows(vec![r#"{"_id":"p1","author":"u1","editor":"u2"}"#]);
        stub.push_rows(vec![r#"{"_id":"u1"}"#]);
        stub.push_rows(vec![r#"{"_id":"u2"}"#]);

        let docs = driver
            .find("posts", Filter::empty(), FindOptions::default())
            .await
            .unwrap()
            .has_one(vec![("author".to_string(), "users".to_string())])
            .has_one(vec![("editor".to_string(), "users".to_string())])
            .to_array()
            .await
            .unwrap();

        assert_eq!(docs[0].get("author"), Some(&json!({"_id": "u1"})));
        assert_eq!(docs[0].get("editor"), Some(&json!({"_id": "u2"})));
    }
}
