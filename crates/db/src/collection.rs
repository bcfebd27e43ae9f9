use serde_json::Value;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::aggregate::{self, Pipeline, Stage};
use crate::error::StoreError;
use crate::eval::{check_projection, compare_docs, eval_filter, project, values_equal};
use crate::query::{FindOptions, Filter, Projection};
use crate::schema::{cast_value, CollectionSchema, FieldKind, ID_FIELD, VERSION_FIELD};
use crate::Document;

/// A named set of documents with per-document atomic writes.
///
/// Reads take a shared lock and writes an exclusive one; there are no
/// multi-document transactions.
pub struct Collection {
    schema: CollectionSchema,
    docs: RwLock<Vec<Document>>,
    snapshot: Option<PathBuf>,
}

impl Collection {
    pub(crate) async fn open(
        schema: CollectionSchema,
        snapshot: Option<PathBuf>,
    ) -> Result<Self, StoreError> {
        let mut docs = Vec::new();
        if let Some(path) = &snapshot {
            if tokio::fs::try_exists(path).await? {
                let raw = tokio::fs::read(path).await?;
                docs = serde_json::from_slice::<Vec<Document>>(&raw)?;
                tracing::info!(
                    collection = schema.name(),
                    documents = docs.len(),
                    path = %path.display(),
                    "loaded collection snapshot"
                );
            }
        }

        Ok(Self {
            schema,
            docs: RwLock::new(docs),
            snapshot,
        })
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Filter matching the document whose `_id` is `id`.
    pub fn id_filter(&self, id: &str) -> Result<Filter, StoreError> {
        let id = cast_value(FieldKind::Id, ID_FIELD, &Value::String(id.to_string()))?;
        Ok(Filter::eq(ID_FIELD, id))
    }

    /// Store `doc`, assigning `_id` and `__v`. Returns the stored document.
    pub async fn insert_one(&self, mut doc: Document) -> Result<Document, StoreError> {
        let started = Instant::now();
        doc.insert(
            ID_FIELD.to_string(),
            Value::String(Uuid::now_v7().hyphenated().to_string()),
        );
        doc.insert(VERSION_FIELD.to_string(), Value::from(0));

        let mut docs = self.docs.write().await;
        self.check_unique(&docs, &doc, None)?;
        docs.push(doc.clone());
        self.persist(&docs).await?;
        self.log_timing("insert_one", started, 1);
        Ok(doc)
    }

    pub async fn find(&self, filter: &Filter, opts: &FindOptions) -> Result<Vec<Document>, StoreError> {
        let started = Instant::now();
        let filter = self.schema.cast_filter(filter)?;
        check_projection(&opts.projection)?;

        let docs = self.docs.read().await;
        let mut matched: Vec<&Document> = docs.iter().filter(|d| eval_filter(d, &filter)).collect();
        if !opts.sort.is_empty() {
            matched.sort_by(|a, b| compare_docs(a, b, &opts.sort));
        }
        let hidden = self.schema.hidden_fields();
        let out: Vec<Document> = matched
            .into_iter()
            .skip(opts.skip)
            .take(opts.limit.unwrap_or(usize::MAX))
            .map(|d| project(d, &opts.projection, &hidden))
            .collect();
        self.log_timing("find", started, out.len());
        Ok(out)
    }

    pub async fn count(&self, filter: &Filter) -> Result<usize, StoreError> {
        let started = Instant::now();
        let filter = self.schema.cast_filter(filter)?;
        let n = self
            .docs
            .read()
            .await
            .iter()
            .filter(|d| eval_filter(d, &filter))
            .count();
        self.log_timing("count", started, n);
        Ok(n)
    }

    pub async fn find_one(
        &self,
        filter: &Filter,
        projection: &Projection,
    ) -> Result<Option<Document>, StoreError> {
        let started = Instant::now();
        let filter = self.schema.cast_filter(filter)?;
        check_projection(projection)?;
        let hidden = self.schema.hidden_fields();
        let found = self
            .docs
            .read()
            .await
            .iter()
            .find(|d| eval_filter(d, &filter))
            .map(|d| project(d, projection, &hidden));
        self.log_timing("find_one", started, usize::from(found.is_some()));
        Ok(found)
    }

    /// Overwrite the given top-level fields on the first match and return the
    /// updated document.
    pub async fn find_one_and_update(
        &self,
        filter: &Filter,
        changes: Document,
    ) -> Result<Option<Document>, StoreError> {
        let started = Instant::now();
        let filter = self.schema.cast_filter(filter)?;

        let mut docs = self.docs.write().await;
        let Some(idx) = docs.iter().position(|d| eval_filter(d, &filter)) else {
            self.log_timing("find_one_and_update", started, 0);
            return Ok(None);
        };
        let mut updated = docs[idx].clone();
        for (k, v) in changes {
            if k != ID_FIELD {
                updated.insert(k, v);
            }
        }
        self.check_unique(&docs, &updated, Some(idx))?;
        docs[idx] = updated.clone();
        self.persist(&docs).await?;
        self.log_timing("find_one_and_update", started, 1);

        let hidden = self.schema.hidden_fields();
        Ok(Some(project(&updated, &Projection::All, &hidden)))
    }

    pub async fn find_one_and_delete(&self, filter: &Filter) -> Result<Option<Document>, StoreError> {
        let started = Instant::now();
        let filter = self.schema.cast_filter(filter)?;

        let mut docs = self.docs.write().await;
        let removed = match docs.iter().position(|d| eval_filter(d, &filter)) {
            Some(idx) => {
                let removed = docs.remove(idx);
                self.persist(&docs).await?;
                Some(removed)
            }
            None => None,
        };
        self.log_timing("find_one_and_delete", started, usize::from(removed.is_some()));
        Ok(removed)
    }

    pub async fn delete_many(&self, filter: &Filter) -> Result<usize, StoreError> {
        let started = Instant::now();
        let filter = self.schema.cast_filter(filter)?;

        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|d| !eval_filter(d, &filter));
        let deleted = before - docs.len();
        if deleted > 0 {
            self.persist(&docs).await?;
        }
        self.log_timing("delete_many", started, deleted);
        Ok(deleted)
    }

    /// Run `pipeline` over every document.
    ///
    /// `Match` stages ahead of the first `Group` are cast against the schema;
    /// later ones address computed fields and are used as given.
    pub async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Document>, StoreError> {
        let started = Instant::now();
        let mut pipeline = pipeline.clone();
        for stage in pipeline.stages_mut() {
            match stage {
                Stage::Group { .. } => break,
                Stage::Match(filter) => *filter = self.schema.cast_filter(filter)?,
                _ => {}
            }
        }

        let docs = self.docs.read().await.clone();
        let out = aggregate::run(docs, &pipeline);
        self.log_timing("aggregate", started, out.len());
        Ok(out)
    }

    pub(crate) async fn flush(&self) -> Result<(), StoreError> {
        let docs = self.docs.read().await;
        self.persist(&docs).await
    }

    fn check_unique(
        &self,
        docs: &[Document],
        candidate: &Document,
        skip: Option<usize>,
    ) -> Result<(), StoreError> {
        for field in self.schema.unique_fields() {
            let Some(value) = candidate.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = docs
                .iter()
                .enumerate()
                .filter(|(idx, _)| Some(*idx) != skip)
                .any(|(_, d)| d.get(field).is_some_and(|other| values_equal(other, value)));
            if clash {
                return Err(StoreError::DuplicateKey {
                    field: field.clone(),
                    value: value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()),
                });
            }
        }
        Ok(())
    }

    async fn persist(&self, docs: &[Document]) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(docs)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    fn log_timing(&self, op: &'static str, started: Instant, documents: usize) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            collection = self.name(),
            op,
            documents,
            elapsed_ms,
            "query took {} ms",
            elapsed_ms
        );
    }
}
