//! Lazy, single-pass document cursor.
//!
//! A cursor is constructed without touching the database; the SELECT is
//! built and executed when it is first polled. Expression filters push
//! WHERE/ORDER BY/LIMIT down to the server. A predicate filter scans the
//! whole table instead: the predicate runs in-process on each decoded
//! document, and skip/limit count *post-filter* matches, not raw rows.
//!
//! A cursor is one-shot: `to_array` consumes it, and `next` after
//! exhaustion keeps returning `None`. Re-running the query needs a new
//! cursor from `Collection::find`.

use std::sync::Arc;
use std::vec;

use tracing::debug;

use crate::core::document::{decode_document, Document, Projection};
use crate::core::traits::Backend;
use crate::error::Result;
use crate::query::{Filter, FindOptions, QueryBuilder};

enum State {
    Created,
    Live {
        rows: vec::IntoIter<String>,
        skipped: u64,
        yielded: u64,
    },
    Exhausted,
}

/// Streams the documents matching one `find` call.
pub struct Cursor {
    backend: Arc<dyn Backend>,
    builder: QueryBuilder,
    table: String,
    filter: Filter,
    options: FindOptions,
    projection: Option<Projection>,
    state: State,
}

impl Cursor {
    pub(crate) fn new(
        backend: Arc<dyn Backend>,
        builder: QueryBuilder,
        table: String,
        filter: Filter,
        options: FindOptions,
    ) -> Self {
        let projection = Projection::compile(options.fields.as_ref());
        Self {
            backend,
            builder,
            table,
            filter,
            options,
            projection,
            state: State::Created,
        }
    }

    /// Produce the next matching document, or `None` once exhausted.
    pub async fn next(&mut self) -> Result<Option<Document>> {
        loop {
            match &mut self.state {
                State::Created => self.materialize().await?,

                State::Live {
                    rows,
                    skipped,
                    yielded,
                } => {
                    let in_process = matches!(self.filter, Filter::Predicate(_));

                    if in_process {
                        if let Some(limit) = self.options.limit {
                            if *yielded >= limit {
                                self.state = State::Exhausted;
                                return Ok(None);
                            }
                        }
                    }

                    let raw = match rows.next() {
                        Some(raw) => raw,
                        None => {
                            self.state = State::Exhausted;
                            return Ok(None);
                        }
                    };

                    let doc = decode_document(&raw)?;

                    if let Filter::Predicate(predicate) = &self.filter {
                        if !predicate(&doc) {
                            continue;
                        }
                        let skip = self.options.skip.unwrap_or(0);
                        if *skipped < skip {
                            *skipped += 1;
                            continue;
                        }
                        *yielded += 1;
                    }

                    let doc = match &self.projection {
                        Some(projection) => projection.apply(doc),
                        None => doc,
                    };
                    return Ok(Some(doc));
                }

                State::Exhausted => return Ok(None),
            }
        }
    }

    /// Drain the cursor into an ordered vector, preserving row order.
    pub async fn to_array(mut self) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        while let Some(doc) = self.next().await? {
            docs.push(doc);
        }
        Ok(docs)
    }

    /// Build and run the SELECT, buffering the raw rows.
    async fn materialize(&mut self) -> Result<()> {
        let (where_sql, limit_sql) = match &self.filter {
            Filter::Expr(tree) => (
                self.builder.build_where(tree)?,
                self.builder
                    .build_limit(self.options.limit, self.options.skip),
            ),
            // A host predicate cannot be pushed down; scan everything and
            // apply skip/limit after filtering
            Filter::Predicate(_) => (None, None),
        };
        let order_by_sql = self.builder.build_order_by(self.options.sort.as_deref());

        let sql = self.builder.build_select(
            &self.table,
            where_sql.as_deref(),
            order_by_sql.as_deref(),
            limit_sql.as_deref(),
        );
        debug!("cursor query: {}", sql);

        let rows = self.backend.query_column(&sql).await?;
        self.state = State::Live {
            rows: rows.into_iter(),
            skipped: 0,
            yielded: 0,
        };
        Ok(())
    }
}
