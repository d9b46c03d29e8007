use foundation::ids::RecordId;
use index::{KeySet, RecordKey};

use crate::event::SourceEvent;
use crate::vector::VectorSource;

/// Selection and hide/show commands.
///
/// Each call emits at most one `SelectionChanged` and one `ShownChanged`,
/// and only when something actually changed. Hidden records can never be
/// selected.
impl VectorSource {
    pub fn is_selected(&self, id: &RecordId) -> bool {
        self.key_of(id).is_some_and(|k| self.selected.contains(k))
    }

    pub fn is_shown(&self, id: &RecordId) -> bool {
        self.key_of(id).is_some_and(|k| self.shown.contains(k))
    }

    /// Selected keys in selection order.
    pub fn selected_keys(&self) -> &[RecordKey] {
        self.selected.keys()
    }

    /// Selected ids in selection order.
    pub fn selected_ids(&self) -> Vec<RecordId> {
        self.selected
            .keys()
            .iter()
            .filter_map(|k| self.records.get(k).and_then(|r| r.id.clone()))
            .collect()
    }

    /// Adds records to the selection. Unknown and hidden ids are ignored.
    pub fn select(&mut self, ids: &[RecordId]) {
        if self.disposed {
            return;
        }
        let keys: Vec<RecordKey> = ids.iter().filter_map(|id| self.key_of(id)).collect();
        self.select_keys(keys);
    }

    pub fn deselect(&mut self, ids: &[RecordId]) {
        if self.disposed {
            return;
        }
        let keys = KeySet::from_keys(ids.iter().filter_map(|id| self.key_of(id)));
        let removed = self.selected.remove_all(&keys);
        self.selection_changed(Vec::new(), removed);
    }

    /// Selects every shown record, in insertion order.
    pub fn select_all(&mut self) {
        if self.disposed {
            return;
        }
        let keys: Vec<RecordKey> = self.records.keys().copied().collect();
        self.select_keys(keys);
    }

    pub fn select_none(&mut self) {
        if self.disposed {
            return;
        }
        let removed = self.selected.take();
        self.selection_changed(Vec::new(), removed);
    }

    /// Selects every shown record not currently selected and deselects the
    /// rest.
    pub fn invert_selection(&mut self) {
        if self.disposed {
            return;
        }
        let removed = self.selected.take();
        let was = KeySet::from_keys(removed.iter().copied());
        let added: Vec<RecordKey> = self
            .records
            .keys()
            .copied()
            .filter(|k| !was.contains(*k) && self.shown.contains(*k))
            .collect();
        for key in &added {
            self.selected.insert(*key);
        }
        self.selection_changed(added, removed);
    }

    /// Replaces the selection with `ids`, keeping their order. Used to
    /// restore a saved selection.
    pub fn set_selected_ids(&mut self, ids: &[RecordId]) {
        if self.disposed {
            return;
        }
        let target: Vec<RecordKey> = ids
            .iter()
            .filter_map(|id| self.key_of(id))
            .filter(|k| self.shown.contains(*k))
            .collect();
        if target.as_slice() == self.selected.keys() {
            return;
        }

        let previous = self.selected.take();
        for key in &target {
            self.selected.insert(*key);
        }
        let added = target
            .iter()
            .copied()
            .filter(|k| !previous.contains(k))
            .collect();
        let removed = previous
            .into_iter()
            .filter(|k| !self.selected.contains(*k))
            .collect();
        self.selection_changed(added, removed);
    }

    fn select_keys(&mut self, keys: Vec<RecordKey>) {
        let added: Vec<RecordKey> = keys
            .into_iter()
            .filter(|k| self.shown.contains(*k) && self.selected.insert(*k))
            .collect();
        self.selection_changed(added, Vec::new());
    }

    fn selection_changed(&mut self, added: Vec<RecordKey>, removed: Vec<RecordKey>) {
        if added.is_empty() && removed.is_empty() {
            return;
        }
        self.restyle(added.iter().chain(removed.iter()).copied());
        self.emit(SourceEvent::SelectionChanged { added, removed });
    }

    // ---- visibility -------------------------------------------------------

    /// Hides records, deselecting any that were selected.
    pub fn hide(&mut self, ids: &[RecordId]) {
        if self.disposed {
            return;
        }
        let keys: Vec<RecordKey> = ids.iter().filter_map(|id| self.key_of(id)).collect();
        self.hide_keys(keys);
    }

    pub fn show(&mut self, ids: &[RecordId]) {
        if self.disposed {
            return;
        }
        let keys: Vec<RecordKey> = ids.iter().filter_map(|id| self.key_of(id)).collect();
        self.show_keys(keys);
    }

    pub fn hide_selected(&mut self) {
        if self.disposed {
            return;
        }
        let keys = self.selected.keys().to_vec();
        self.hide_keys(keys);
    }

    pub fn hide_unselected(&mut self) {
        if self.disposed {
            return;
        }
        let keys: Vec<RecordKey> = self
            .records
            .keys()
            .copied()
            .filter(|k| !self.selected.contains(*k))
            .collect();
        self.hide_keys(keys);
    }

    /// Shows every hidden record.
    pub fn display_all(&mut self) {
        if self.disposed {
            return;
        }
        let keys: Vec<RecordKey> = self.records.keys().copied().collect();
        self.show_keys(keys);
    }

    fn hide_keys(&mut self, keys: Vec<RecordKey>) {
        let hidden: Vec<RecordKey> = keys
            .into_iter()
            .filter(|k| self.shown.remove(*k))
            .collect();
        if hidden.is_empty() {
            return;
        }

        let deselected = self.selected.remove_all(&KeySet::from_keys(hidden.iter().copied()));
        if !deselected.is_empty() {
            self.emit(SourceEvent::SelectionChanged {
                added: Vec::new(),
                removed: deselected,
            });
        }
        self.shown_changed(Vec::new(), hidden);
    }

    fn show_keys(&mut self, keys: Vec<RecordKey>) {
        let shown: Vec<RecordKey> = keys
            .into_iter()
            .filter(|k| self.records.contains_key(k) && self.shown.insert(*k))
            .collect();
        if shown.is_empty() {
            return;
        }
        self.shown_changed(shown, Vec::new());
    }

    fn shown_changed(&mut self, shown: Vec<RecordKey>, hidden: Vec<RecordKey>) {
        for key in shown.iter().chain(hidden.iter()) {
            self.sync_time_entry(*key);
        }
        self.animation.invalidate();
        self.restyle(shown.iter().chain(hidden.iter()).copied());
        self.emit(SourceEvent::ShownChanged { shown, hidden });
        if self.animation.is_enabled() {
            self.refresh_animation();
        }
    }
}
