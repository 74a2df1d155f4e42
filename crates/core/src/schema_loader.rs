use std::fmt;
use std::sync::Arc;

use crate::schema_tree::{LoadTarget, MetadataLoadError, SchemaTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LoadGeneration(u64);

impl LoadGeneration {
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for LoadGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub generation: LoadGeneration,
    pub target: LoadTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready(Arc<SchemaTree>),
    Failed(String),
}

/// Tracks the single schema load that is allowed to land.
///
/// Every `start` or `cancel` bumps the generation, so a completion carrying an
/// older generation is dropped on arrival. Fetches themselves are never
/// aborted.
#[derive(Debug, Default)]
pub struct SchemaLoader {
    generation: LoadGeneration,
    target: Option<LoadTarget>,
    state: LoadState,
}

impl SchemaLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn generation(&self) -> LoadGeneration {
        self.generation
    }

    #[must_use]
    pub fn state(&self) -> &LoadState {
        &self.state
    }

    #[must_use]
    pub fn target(&self) -> Option<&LoadTarget> {
        self.target.as_ref()
    }

    #[must_use]
    pub fn tree(&self) -> Option<&Arc<SchemaTree>> {
        match &self.state {
            LoadState::Ready(tree) => Some(tree),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self.state, LoadState::Loading)
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            LoadState::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn start(&mut self, target: LoadTarget) -> LoadRequest {
        self.generation = self.generation.next();
        self.target = Some(target.clone());
        self.state = LoadState::Loading;
        tracing::debug!(
            generation = %self.generation,
            connection_id = %target.connection_id,
            "schema load started"
        );
        LoadRequest {
            generation: self.generation,
            target,
        }
    }

    pub fn retry(&mut self) -> Option<LoadRequest> {
        let target = self.target.clone()?;
        Some(self.start(target))
    }

    pub fn cancel(&mut self) {
        self.generation = self.generation.next();
        self.target = None;
        self.state = LoadState::Idle;
        tracing::debug!(generation = %self.generation, "schema load cancelled");
    }

    /// Returns `true` when the result belonged to the current generation.
    pub fn apply(
        &mut self,
        generation: LoadGeneration,
        result: Result<SchemaTree, MetadataLoadError>,
    ) -> bool {
        if generation != self.generation || !self.is_loading() {
            tracing::debug!(
                completed = %generation,
                current = %self.generation,
                "discarding superseded schema load"
            );
            return false;
        }

        self.state = match result {
            Ok(tree) => LoadState::Ready(Arc::new(tree)),
            Err(error) => {
                tracing::warn!(generation = %generation, error = %error, "schema load failed");
                LoadState::Failed(error.message().to_string())
            }
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::{mpsc, oneshot};

    use super::{LoadGeneration, LoadState, SchemaLoader};
    use crate::schema_tree::{
        fetch_schema, ColumnRow, LoadTarget, MetadataLoadError, MetadataRows, MetadataSource,
        SchemaTree,
    };

    fn tree_with_catalog(name: &str) -> SchemaTree {
        SchemaTree::from_rows(MetadataRows {
            catalogs: vec![name.to_string()],
            ..MetadataRows::default()
        })
    }

    #[test]
    fn start_bumps_generation_and_marks_loading() {
        let mut loader = SchemaLoader::new();
        let first = loader.start(LoadTarget::new("a", "postgresql://a"));
        let second = loader.start(LoadTarget::new("b", "postgresql://b"));

        assert!(second.generation > first.generation);
        assert_eq!(loader.generation(), second.generation);
        assert!(loader.is_loading());
    }

    #[test]
    fn superseded_result_is_never_applied() {
        let mut loader = SchemaLoader::new();
        let first = loader.start(LoadTarget::new("a", "postgresql://a"));
        let second = loader.start(LoadTarget::new("b", "postgresql://b"));

        assert!(loader.apply(second.generation, Ok(tree_with_catalog("b_schema"))));
        assert!(!loader.apply(first.generation, Ok(tree_with_catalog("a_schema"))));

        let tree = loader.tree().expect("second load should be visible");
        assert!(tree.catalog("b_schema").is_some());
        assert!(tree.catalog("a_schema").is_none());
    }

    #[test]
    fn late_result_from_older_generation_does_not_clobber_loading() {
        let mut loader = SchemaLoader::new();
        let first = loader.start(LoadTarget::new("a", "postgresql://a"));
        loader.start(LoadTarget::new("b", "postgresql://b"));

        assert!(!loader.apply(first.generation, Err(MetadataLoadError::new("boom"))));
        assert!(loader.is_loading());
    }

    #[test]
    fn cancel_discards_outstanding_result() {
        let mut loader = SchemaLoader::new();
        let request = loader.start(LoadTarget::new("a", "postgresql://a"));
        loader.cancel();

        assert!(!loader.apply(request.generation, Ok(tree_with_catalog("public"))));
        assert_eq!(loader.state(), &LoadState::Idle);
        assert!(loader.target().is_none());
    }

    #[test]
    fn failure_is_distinct_from_empty_tree() {
        let mut loader = SchemaLoader::new();
        let request = loader.start(LoadTarget::new("a", "postgresql://a"));
        assert!(loader.apply(request.generation, Err(MetadataLoadError::new("refused"))));
        assert_eq!(loader.error(), Some("refused"));
        assert!(loader.tree().is_none());

        let retry = loader.retry().expect("retry should reuse the last target");
        assert!(loader.apply(retry.generation, Ok(SchemaTree::default())));
        assert!(loader.error().is_none());
        assert!(loader.tree().is_some_and(|tree| tree.is_empty()));
    }

    #[test]
    fn retry_without_target_is_noop() {
        let mut loader = SchemaLoader::new();
        assert!(loader.retry().is_none());
        assert_eq!(loader.generation(), LoadGeneration::default());
    }

    struct GatedSource {
        catalog: &'static str,
        gate: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait::async_trait]
    impl MetadataSource for GatedSource {
        async fn fetch_catalogs(
            &self,
            _target: &LoadTarget,
        ) -> Result<Vec<String>, MetadataLoadError> {
            if let Some(gate) = self.gate.lock().await.take() {
                let _ = gate.await;
            }
            Ok(vec![self.catalog.to_string()])
        }

        async fn fetch_tables(
            &self,
            _target: &LoadTarget,
        ) -> Result<Vec<(String, String)>, MetadataLoadError> {
            Ok(Vec::new())
        }

        async fn fetch_columns(
            &self,
            _target: &LoadTarget,
        ) -> Result<Vec<ColumnRow>, MetadataLoadError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn out_of_order_completions_keep_only_latest_load() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (release_first, first_gate) = oneshot::channel();
        let first_source = Arc::new(GatedSource {
            catalog: "from_a",
            gate: tokio::sync::Mutex::new(Some(first_gate)),
        });
        let second_source = Arc::new(GatedSource {
            catalog: "from_b",
            gate: tokio::sync::Mutex::new(None),
        });

        let mut loader = SchemaLoader::new();
        let first = loader.start(LoadTarget::new("a", "postgresql://a"));
        let second = loader.start(LoadTarget::new("b", "postgresql://b"));

        let tx = events_tx.clone();
        let first_task = tokio::spawn(async move {
            let result = fetch_schema(first_source.as_ref(), &first.target).await;
            let _ = tx.send((first.generation, result));
        });
        let tx = events_tx.clone();
        let second_task = tokio::spawn(async move {
            let result = fetch_schema(second_source.as_ref(), &second.target).await;
            let _ = tx.send((second.generation, result));
        });

        second_task.await.expect("second fetch should finish");
        release_first.send(()).expect("first fetch should be waiting");
        first_task.await.expect("first fetch should finish");
        drop(events_tx);

        let mut applied = Vec::new();
        while let Some((generation, result)) = events_rx.recv().await {
            applied.push(loader.apply(generation, result));
        }

        assert_eq!(applied, vec![true, false]);
        let tree = loader.tree().expect("latest load should be applied");
        assert!(tree.catalog("from_b").is_some());
    }
}
