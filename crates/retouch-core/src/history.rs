//! Linear edit history with a movable cursor.
//!
//! Committing after an undo discards every snapshot past the cursor; the
//! undone future is gone for good. All operations are synchronous and never
//! panic: a navigation whose precondition fails returns a
//! [`NavigationError`] and leaves the record exactly as it was.

use std::sync::Arc;

use retouch_shared::{HistoryRecord, RecordError, Snapshot, ToolTag};

use crate::error::NavigationError;

/// Notified with the current snapshot (or `None`) after every mutation, so
/// the owner can reset transient state tied to the old document (crop
/// selection, masks, ...).
pub trait HistoryObserver: Send + Sync {
    fn document_changed(&self, current: Option<&Snapshot>);
}

impl<F> HistoryObserver for F
where
    F: Fn(Option<&Snapshot>) + Send + Sync,
{
    fn document_changed(&self, current: Option<&Snapshot>) {
        self(current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryState {
    Empty,
    /// Cursor on the newest snapshot; nothing to redo.
    AtHead,
    /// Cursor behind the newest snapshot; redo available.
    MidHistory,
}

#[derive(Default)]
pub struct HistoryStore {
    record: HistoryRecord,
    observer: Option<Arc<dyn HistoryObserver>>,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("len", &self.record.snapshots.len())
            .field("cursor", &self.record.cursor)
            .field("tool_tags", &self.record.tool_tags)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_observer(&mut self, observer: Arc<dyn HistoryObserver>) {
        self.observer = Some(observer);
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Start a new timeline from `snapshot`.
    pub fn set_initial(&mut self, snapshot: Snapshot) {
        self.record = HistoryRecord {
            snapshots: vec![snapshot],
            cursor: Some(0),
            tool_tags: Vec::new(),
        };
        self.notify();
    }

    /// Append an edit after the cursor, dropping any redo future.
    ///
    /// On an empty record this starts the timeline; the tag is dropped
    /// because the first snapshot never carries one.
    pub fn commit(&mut self, snapshot: Snapshot, tool_tag: ToolTag) {
        let Some(cursor) = self.record.cursor else {
            tracing::debug!(tool = %tool_tag, "commit on empty history, starting new timeline");
            self.set_initial(snapshot);
            return;
        };

        let discarded = self.record.snapshots.len() - (cursor + 1);
        if discarded > 0 {
            tracing::debug!(discarded, "commit discards redo history");
        }

        self.record.snapshots.truncate(cursor + 1);
        self.record.tool_tags.truncate(cursor);
        self.record.snapshots.push(snapshot);
        self.record.tool_tags.push(tool_tag);
        self.record.cursor = Some(self.record.snapshots.len() - 1);

        self.notify();
    }

    pub fn undo(&mut self) -> Result<(), NavigationError> {
        match self.record.cursor {
            Some(c) if c > 0 => {
                self.record.cursor = Some(c - 1);
                self.notify();
                Ok(())
            }
            _ => Err(NavigationError::NothingToUndo),
        }
    }

    pub fn redo(&mut self) -> Result<(), NavigationError> {
        match self.record.cursor {
            Some(c) if c + 1 < self.record.snapshots.len() => {
                self.record.cursor = Some(c + 1);
                self.notify();
                Ok(())
            }
            _ => Err(NavigationError::NothingToRedo),
        }
    }

    pub fn jump_to(&mut self, index: usize) -> Result<(), NavigationError> {
        let len = self.record.snapshots.len();
        if index >= len {
            return Err(NavigationError::OutOfRange { index, len });
        }
        self.record.cursor = Some(index);
        self.notify();
        Ok(())
    }

    /// Drop every edit and keep only the original snapshot.
    pub fn reset_to_original(&mut self) -> Result<(), NavigationError> {
        match self.record.cursor {
            None => Err(NavigationError::NoDocument),
            Some(0) => Err(NavigationError::AlreadyOriginal),
            Some(_) => {
                self.record.snapshots.truncate(1);
                self.record.tool_tags.clear();
                self.record.cursor = Some(0);
                self.notify();
                Ok(())
            }
        }
    }

    pub fn clear(&mut self) {
        self.record = HistoryRecord::empty();
        self.notify();
    }

    /// Replace the record with one loaded from storage.
    pub fn restore(&mut self, record: HistoryRecord) -> Result<(), RecordError> {
        record.validate()?;
        self.record = record;
        self.notify();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn current(&self) -> Option<&Snapshot> {
        self.record
            .cursor
            .and_then(|c| self.record.snapshots.get(c))
    }

    pub fn original(&self) -> Option<&Snapshot> {
        self.record.snapshots.first()
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.record.cursor, Some(c) if c > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.record.cursor, Some(c) if c + 1 < self.record.snapshots.len())
    }

    pub fn state(&self) -> HistoryState {
        if self.record.snapshots.is_empty() {
            HistoryState::Empty
        } else if self.can_redo() {
            HistoryState::MidHistory
        } else {
            HistoryState::AtHead
        }
    }

    pub fn cursor(&self) -> Option<usize> {
        self.record.cursor
    }

    pub fn len(&self) -> usize {
        self.record.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.snapshots.is_empty()
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.record.snapshots
    }

    pub fn tool_tags(&self) -> &[ToolTag] {
        &self.record.tool_tags
    }

    /// Copy of the `(snapshots, cursor, tool_tags)` triple for persistence.
    /// Snapshot payloads are reference-counted, so this does not copy bytes.
    pub fn record(&self) -> HistoryRecord {
        self.record.clone()
    }

    fn notify(&self) {
        if let Some(observer) = &self.observer {
            observer.document_changed(self.current());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn img(n: u8) -> Snapshot {
        Snapshot::new(vec![n; 8], "image/png")
    }

    fn tag(name: &str) -> ToolTag {
        ToolTag::from(name)
    }

    fn populated(n: u8) -> HistoryStore {
        let mut history = HistoryStore::new();
        history.set_initial(img(0));
        for i in 1..n {
            history.commit(img(i), tag(&format!("tool{i}")));
        }
        history
    }

    fn assert_invariants(history: &HistoryStore) {
        assert!(history.record().validate().is_ok(), "{history:?}");
    }

    #[test]
    fn test_set_initial() {
        let mut history = HistoryStore::new();
        history.set_initial(img(0));

        assert_eq!(history.current(), Some(&img(0)));
        assert_eq!(history.original(), Some(&img(0)));
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert_eq!(history.state(), HistoryState::AtHead);
    }

    #[test]
    fn test_set_initial_replaces_existing_timeline() {
        let mut history = populated(4);
        history.set_initial(img(9));

        assert_eq!(history.len(), 1);
        assert!(history.tool_tags().is_empty());
        assert_eq!(history.cursor(), Some(0));
    }

    #[test]
    fn test_commit_is_monotonic() {
        let mut history = HistoryStore::new();
        history.set_initial(img(0));

        for i in 1..6u8 {
            let before = history.len();
            history.commit(img(i), tag("brush"));
            assert_eq!(history.len(), before + 1);
            assert_eq!(history.cursor(), Some(history.len() - 1));
            assert!(!history.can_redo());
            assert_invariants(&history);
        }
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let mut history = populated(4);
        history.undo().unwrap();

        let cursor = history.cursor();
        let current = history.current().cloned();

        history.undo().unwrap();
        history.redo().unwrap();

        assert_eq!(history.cursor(), cursor);
        assert_eq!(history.current().cloned(), current);
    }

    #[test]
    fn test_commit_discards_redo_future() {
        let mut history = HistoryStore::new();
        history.set_initial(img(b'A'));
        history.commit(img(b'B'), tag("t1"));
        history.commit(img(b'C'), tag("t2"));

        history.undo().unwrap();
        history.undo().unwrap();
        assert_eq!(history.current(), Some(&img(b'A')));

        history.commit(img(b'D'), tag("tag"));

        assert_eq!(history.snapshots(), &[img(b'A'), img(b'D')]);
        assert_eq!(history.tool_tags(), &[tag("tag")]);
        assert_eq!(history.cursor(), Some(1));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_reset_to_original_is_idempotent() {
        let mut history = populated(4);

        history.reset_to_original().unwrap();
        let once = history.record();

        assert_eq!(
            history.reset_to_original(),
            Err(NavigationError::AlreadyOriginal)
        );
        assert_eq!(history.record(), once);
        assert_eq!(once.snapshots, vec![img(0)]);
        assert_eq!(once.cursor, Some(0));
        assert!(once.tool_tags.is_empty());
    }

    #[test]
    fn test_reset_from_mid_history() {
        let mut history = populated(3);
        history.undo().unwrap();
        history.reset_to_original().unwrap();
        assert_eq!(history.len(), 1);
        assert_invariants(&history);
    }

    #[test]
    fn test_example_scenario() {
        let mut history = HistoryStore::new();
        history.set_initial(img(0));
        history.commit(img(1), tag("cropTool"));
        history.commit(img(2), tag("adjustTool"));
        history.undo().unwrap();
        assert_eq!(history.current(), Some(&img(1)));
        history.commit(img(3), tag("styleTool"));

        assert_eq!(history.snapshots(), &[img(0), img(1), img(3)]);
        assert_eq!(history.tool_tags(), &[tag("cropTool"), tag("styleTool")]);
        assert_eq!(history.cursor(), Some(2));
        assert!(history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_invalid_navigation_is_noop() {
        let mut history = HistoryStore::new();
        assert_eq!(history.undo(), Err(NavigationError::NothingToUndo));
        assert_eq!(history.redo(), Err(NavigationError::NothingToRedo));
        assert_eq!(
            history.jump_to(0),
            Err(NavigationError::OutOfRange { index: 0, len: 0 })
        );
        assert_eq!(history.reset_to_original(), Err(NavigationError::NoDocument));
        assert_eq!(history.state(), HistoryState::Empty);

        let mut history = populated(3);
        let before = history.record();
        assert_eq!(history.redo(), Err(NavigationError::NothingToRedo));
        assert_eq!(
            history.jump_to(3),
            Err(NavigationError::OutOfRange { index: 3, len: 3 })
        );
        assert_eq!(history.record(), before);
    }

    #[test]
    fn test_jump_to() {
        let mut history = populated(5);
        history.jump_to(1).unwrap();

        assert_eq!(history.current(), Some(&img(1)));
        assert_eq!(history.state(), HistoryState::MidHistory);
        assert_eq!(history.len(), 5);

        history.jump_to(4).unwrap();
        assert_eq!(history.state(), HistoryState::AtHead);
    }

    #[test]
    fn test_clear() {
        let mut history = populated(3);
        history.clear();

        assert!(history.is_empty());
        assert_eq!(history.cursor(), None);
        assert!(history.current().is_none());
        assert!(history.original().is_none());
        assert_eq!(history.state(), HistoryState::Empty);
    }

    #[test]
    fn test_commit_on_empty_starts_timeline() {
        let mut history = HistoryStore::new();
        history.commit(img(1), tag("styleTool"));

        assert_eq!(history.len(), 1);
        assert!(history.tool_tags().is_empty());
        assert_eq!(history.cursor(), Some(0));
        assert_invariants(&history);
    }

    #[test]
    fn test_restore_validates_record() {
        let mut history = HistoryStore::new();
        let bad = HistoryRecord {
            snapshots: vec![img(0)],
            cursor: Some(2),
            tool_tags: vec![],
        };
        assert!(history.restore(bad).is_err());
        assert!(history.is_empty());

        let good = populated(3).record();
        history.restore(good.clone()).unwrap();
        assert_eq!(history.record(), good);
    }

    #[test]
    fn test_observer_sees_every_mutation() {
        let seen: Arc<Mutex<Vec<Option<Snapshot>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut history = HistoryStore::new();
        history.set_observer(Arc::new(move |current: Option<&Snapshot>| {
            sink.lock().unwrap().push(current.cloned());
        }));

        history.set_initial(img(0));
        history.commit(img(1), tag("t1"));
        history.commit(img(2), tag("t2"));
        history.undo().unwrap();
        history.redo().unwrap();
        assert!(history.redo().is_err());
        history.jump_to(0).unwrap();
        assert!(history.undo().is_err());
        assert!(history.reset_to_original().is_err());
        assert!(history.jump_to(9).is_err());
        history.jump_to(2).unwrap();
        history.reset_to_original().unwrap();

        let restored = HistoryRecord {
            snapshots: vec![img(5), img(6)],
            cursor: Some(1),
            tool_tags: vec![tag("t6")],
        };
        history.restore(restored).unwrap();
        assert!(history
            .restore(HistoryRecord {
                snapshots: vec![],
                cursor: Some(0),
                tool_tags: vec![],
            })
            .is_err());
        history.clear();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                Some(img(0)), // set_initial
                Some(img(1)), // commit
                Some(img(2)), // commit
                Some(img(1)), // undo
                Some(img(2)), // redo
                Some(img(0)), // jump_to(0)
                Some(img(2)), // jump_to(2)
                Some(img(0)), // reset_to_original
                Some(img(6)), // restore
                None,         // clear
            ]
        );
    }
}
