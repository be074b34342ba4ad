//! One editing session: history, persistence and the result cache wired
//! together.
//!
//! A tool builds a [`GenerationRequest`]; [`EditorSession::apply`] resolves
//! it through the [`ResultCache`], commits the artifact to the history and
//! writes the history through to the [`PersistenceGateway`]. A failed or
//! cancelled request never touches the history.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use retouch_shared::{GenerationRequest, HistoryRecord, Snapshot, ToolTag};

use crate::cache::{Resolved, ResultCache};
use crate::capability::GenerationCapability;
use crate::config::SessionConfig;
use crate::error::{GenerationError, NavigationError};
use crate::gateway::PersistenceGateway;
use crate::history::{HistoryObserver, HistoryState, HistoryStore};

pub struct EditorSession {
    history: Mutex<HistoryStore>,
    gateway: Arc<dyn PersistenceGateway>,
    cache: ResultCache,
    persist_history: bool,
}

impl EditorSession {
    /// Build a session and restore the previously persisted history, if
    /// there is a usable one. A missing, unreadable or corrupt record
    /// starts an empty session.
    pub fn open(
        config: &SessionConfig,
        gateway: Arc<dyn PersistenceGateway>,
        capability: Arc<dyn GenerationCapability>,
    ) -> Self {
        let cache = ResultCache::new(gateway.clone(), capability, config.cache_policy);

        let mut history = HistoryStore::new();
        if config.persist_history {
            restore_history(&mut history, gateway.as_ref());
        }

        Self {
            history: Mutex::new(history),
            gateway,
            cache,
            persist_history: config.persist_history,
        }
    }

    /// Install the document-changed observer.
    ///
    /// The observer runs while the session's history lock is held and must
    /// not call back into the session.
    pub fn set_observer(&self, observer: Arc<dyn HistoryObserver>) {
        self.history().set_observer(observer);
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    /// Start a new document from an uploaded image.
    pub fn load_image(&self, snapshot: Snapshot) {
        let mut history = self.history();
        history.set_initial(snapshot);
        self.persist(&history);
    }

    /// Commit an edit produced locally (no generation involved).
    pub fn commit(&self, snapshot: Snapshot, tool_tag: ToolTag) {
        let mut history = self.history();
        history.commit(snapshot, tool_tag);
        self.persist(&history);
    }

    /// Resolve `request` and commit the result under `tool_tag`.
    pub async fn apply(
        &self,
        request: &GenerationRequest,
        tool_tag: ToolTag,
    ) -> Result<Resolved, GenerationError> {
        let resolved = self.cache.resolve(request).await?;
        self.commit_resolved(&resolved, tool_tag);
        Ok(resolved)
    }

    /// Like [`apply`](Self::apply); a request cancelled before it commits
    /// leaves the history untouched.
    pub async fn apply_with_cancel(
        &self,
        request: &GenerationRequest,
        tool_tag: ToolTag,
        token: &CancellationToken,
    ) -> Result<Resolved, GenerationError> {
        let resolved = self.cache.resolve_with_cancel(request, token).await?;
        if token.is_cancelled() {
            debug!(tool = %tool_tag, "cancelled after resolve, not committing");
            return Err(GenerationError::Cancelled);
        }
        self.commit_resolved(&resolved, tool_tag);
        Ok(resolved)
    }

    fn commit_resolved(&self, resolved: &Resolved, tool_tag: ToolTag) {
        info!(
            tool = %tool_tag,
            key = %resolved.key.short(),
            from_cache = resolved.from_cache(),
            "committing generated edit"
        );
        self.commit(resolved.artifact.clone().into(), tool_tag);
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn undo(&self) -> Result<(), NavigationError> {
        self.navigate(HistoryStore::undo)
    }

    pub fn redo(&self) -> Result<(), NavigationError> {
        self.navigate(HistoryStore::redo)
    }

    pub fn jump_to(&self, index: usize) -> Result<(), NavigationError> {
        self.navigate(|history| history.jump_to(index))
    }

    pub fn reset_to_original(&self) -> Result<(), NavigationError> {
        self.navigate(HistoryStore::reset_to_original)
    }

    /// Drop the document and its persisted history.
    pub fn clear(&self) {
        let mut history = self.history();
        history.clear();
        if self.persist_history {
            if let Err(e) = self.gateway.clear_history() {
                warn!(error = %e, "failed to clear persisted history");
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn current(&self) -> Option<Snapshot> {
        self.history().current().cloned()
    }

    pub fn original(&self) -> Option<Snapshot> {
        self.history().original().cloned()
    }

    pub fn can_undo(&self) -> bool {
        self.history().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history().can_redo()
    }

    pub fn state(&self) -> HistoryState {
        self.history().state()
    }

    pub fn record(&self) -> HistoryRecord {
        self.history().record()
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn history(&self) -> MutexGuard<'_, HistoryStore> {
        // every HistoryStore operation leaves a valid record, even mid-panic
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn navigate<F>(&self, op: F) -> Result<(), NavigationError>
    where
        F: FnOnce(&mut HistoryStore) -> Result<(), NavigationError>,
    {
        let mut history = self.history();
        op(&mut history)?;
        self.persist(&history);
        Ok(())
    }

    // called with the history lock held so writes land in mutation order
    fn persist(&self, history: &HistoryStore) {
        if !self.persist_history {
            return;
        }
        if let Err(e) = self.gateway.save_history(&history.record()) {
            warn!(error = %e, "failed to persist history, continuing in memory");
        }
    }
}

fn restore_history(history: &mut HistoryStore, gateway: &dyn PersistenceGateway) {
    match gateway.load_history() {
        Ok(Some(record)) => {
            let snapshots = record.snapshots.len();
            let cursor = record.cursor;
            match history.restore(record) {
                Ok(()) => info!(snapshots, ?cursor, "restored previous session"),
                Err(e) => warn!(error = %e, "persisted history is invalid, starting empty"),
            }
        }
        Ok(None) => debug!("no previous session"),
        Err(e) => warn!(error = %e, "could not load persisted history, starting empty"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use retouch_shared::{GenerationInput, GenerationOptions};
    use retouch_store::Database;

    use super::*;
    use crate::cache::ResolveSource;
    use crate::gateway::{MemoryGateway, SqliteGateway};
    use crate::testing::{FailingGateway, MockCapability};

    fn img(n: u8) -> Snapshot {
        Snapshot::new(vec![n; 8], "image/png")
    }

    fn restyle(prompt: &str) -> GenerationRequest {
        GenerationRequest::new("restyle")
            .with_input(GenerationInput::text(prompt))
            .with_options(GenerationOptions::Edit {
                mask_feather: None,
                preserve_identity: true,
            })
    }

    fn session_with(
        gateway: Arc<dyn PersistenceGateway>,
        capability: Arc<MockCapability>,
    ) -> EditorSession {
        EditorSession::open(&SessionConfig::default(), gateway, capability)
    }

    #[tokio::test]
    async fn test_apply_commits_and_persists() {
        let gateway = Arc::new(MemoryGateway::new());
        let session = session_with(gateway.clone(), Arc::new(MockCapability::new()));

        session.load_image(img(0));
        let resolved = session.apply(&restyle("noir"), ToolTag::from("styleTool")).await.unwrap();

        assert_eq!(session.current(), Some(resolved.artifact.clone().into()));
        assert!(session.can_undo());

        let persisted = gateway.load_history().unwrap().unwrap();
        assert_eq!(persisted, session.record());
        assert_eq!(persisted.tool_tags, vec![ToolTag::from("styleTool")]);
    }

    #[tokio::test]
    async fn test_repeated_apply_hits_cache() {
        let capability = Arc::new(MockCapability::new());
        let session = session_with(Arc::new(MemoryGateway::new()), capability.clone());
        session.load_image(img(0));

        session.apply(&restyle("noir"), ToolTag::from("styleTool")).await.unwrap();
        let again = session.apply(&restyle("noir"), ToolTag::from("styleTool")).await.unwrap();

        assert_eq!(again.source, ResolveSource::Cache);
        assert_eq!(capability.calls(), 1);
        assert_eq!(session.record().snapshots.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_generation_leaves_history_untouched() {
        let session = session_with(
            Arc::new(MemoryGateway::new()),
            Arc::new(MockCapability::failing("safety filter")),
        );
        session.load_image(img(0));
        let before = session.record();

        let err = session
            .apply(&restyle("x"), ToolTag::from("styleTool"))
            .await
            .unwrap_err();

        assert!(err.user_message().contains("safety filter"));
        assert_eq!(session.record(), before);
    }

    #[tokio::test]
    async fn test_cancelled_apply_never_commits() {
        let capability =
            Arc::new(MockCapability::new().with_delay(Duration::from_millis(200)));
        let session = session_with(Arc::new(MemoryGateway::new()), capability);
        session.load_image(img(0));

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = session
            .apply_with_cancel(&restyle("slow"), ToolTag::from("styleTool"), &token)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Cancelled));
        assert_eq!(session.record().snapshots, vec![img(0)]);
    }

    #[tokio::test]
    async fn test_example_scenario_through_session() {
        let session = session_with(Arc::new(MemoryGateway::new()), Arc::new(MockCapability::new()));

        session.load_image(img(0));
        session.commit(img(1), ToolTag::from("cropTool"));
        session.commit(img(2), ToolTag::from("adjustTool"));
        session.undo().unwrap();
        assert_eq!(session.current(), Some(img(1)));
        session.commit(img(3), ToolTag::from("styleTool"));

        let record = session.record();
        assert_eq!(record.snapshots, vec![img(0), img(1), img(3)]);
        assert_eq!(
            record.tool_tags,
            vec![ToolTag::from("cropTool"), ToolTag::from("styleTool")]
        );
        assert_eq!(record.cursor, Some(2));
        assert!(session.can_undo());
        assert!(!session.can_redo());
        assert_eq!(session.state(), HistoryState::AtHead);
    }

    #[test]
    fn test_session_restored_from_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retouch.db");

        let expected = {
            let gateway = Arc::new(SqliteGateway::open_at(&path).unwrap());
            let session = session_with(gateway, Arc::new(MockCapability::new()));
            session.load_image(img(0));
            session.commit(img(1), ToolTag::from("cropTool"));
            session.commit(img(2), ToolTag::from("adjustTool"));
            session.undo().unwrap();
            session.record()
        };

        let gateway = Arc::new(SqliteGateway::open_at(&path).unwrap());
        let restored = session_with(gateway, Arc::new(MockCapability::new()));

        assert_eq!(restored.record(), expected);
        assert_eq!(restored.current(), Some(img(1)));
        assert!(restored.can_redo());
    }

    #[test]
    fn test_corrupt_persisted_history_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retouch.db");

        {
            let gateway = Arc::new(SqliteGateway::open_at(&path).unwrap());
            let session = session_with(gateway, Arc::new(MockCapability::new()));
            session.load_image(img(0));
        }
        {
            let db = Database::open_at(&path).unwrap();
            db.conn().execute("UPDATE history SET cursor = 5", []).unwrap();
        }

        let gateway = Arc::new(SqliteGateway::open_at(&path).unwrap());
        let session = session_with(gateway, Arc::new(MockCapability::new()));
        assert_eq!(session.state(), HistoryState::Empty);
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_block_editing() {
        let session = session_with(Arc::new(FailingGateway), Arc::new(MockCapability::new()));

        session.load_image(img(0));
        let resolved = session
            .apply(&restyle("noir"), ToolTag::from("styleTool"))
            .await
            .unwrap();
        assert_eq!(resolved.source, ResolveSource::Generated);

        session.undo().unwrap();
        session.redo().unwrap();
        session.clear();
        assert_eq!(session.state(), HistoryState::Empty);
    }

    #[test]
    fn test_navigation_persists_cursor() {
        let gateway = Arc::new(MemoryGateway::new());
        let session = session_with(gateway.clone(), Arc::new(MockCapability::new()));
        session.load_image(img(0));
        session.commit(img(1), ToolTag::from("cropTool"));
        session.commit(img(2), ToolTag::from("adjustTool"));

        session.jump_to(0).unwrap();
        assert_eq!(gateway.load_history().unwrap().unwrap().cursor, Some(0));

        assert!(session.jump_to(7).is_err());
        assert_eq!(gateway.load_history().unwrap().unwrap().cursor, Some(0));
        assert_eq!(session.reset_to_original(), Err(NavigationError::AlreadyOriginal));

        session.jump_to(2).unwrap();
        session.reset_to_original().unwrap();
        let persisted = gateway.load_history().unwrap().unwrap();
        assert_eq!(persisted.snapshots, vec![img(0)]);
        assert_eq!(session.original(), Some(img(0)));
    }

    #[test]
    fn test_clear_removes_persisted_history() {
        let gateway = Arc::new(MemoryGateway::new());
        let session = session_with(gateway.clone(), Arc::new(MockCapability::new()));
        session.load_image(img(0));

        session.clear();

        assert!(gateway.load_history().unwrap().is_none());
        assert!(session.current().is_none());
    }

    #[test]
    fn test_persistence_disabled() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway
            .save_history(&HistoryRecord {
                snapshots: vec![img(9)],
                cursor: Some(0),
                tool_tags: vec![],
            })
            .unwrap();

        let config = SessionConfig {
            persist_history: false,
            ..SessionConfig::default()
        };
        let session = EditorSession::open(&config, gateway.clone(), Arc::new(MockCapability::new()));

        assert_eq!(session.state(), HistoryState::Empty);
        session.load_image(img(0));
        assert_eq!(
            gateway.load_history().unwrap().unwrap().snapshots,
            vec![img(9)]
        );
    }

    #[test]
    fn test_observer_notified_through_session() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let session = session_with(Arc::new(MemoryGateway::new()), Arc::new(MockCapability::new()));
        session.set_observer(Arc::new(move |current: Option<&Snapshot>| {
            sink.lock().unwrap().push(current.map(|s| s.len()));
        }));

        session.load_image(img(0));
        session.clear();

        assert_eq!(*seen.lock().unwrap(), vec![Some(8), None]);
    }
}
