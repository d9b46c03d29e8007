use foundation::ids::RecordId;

use crate::vector::VectorSource;

/// An undoable operation on a store.
///
/// `execute` and `revert` return `false` when they could not run (the
/// store is disposed, or `revert` was called before `execute`).
pub trait Command {
    fn title(&self) -> String;

    fn execute(&mut self, source: &mut VectorSource) -> bool;

    fn revert(&mut self, source: &mut VectorSource) -> bool;
}

/// Remembers the selection before a command and puts it back on revert.
#[derive(Debug, Default, Clone)]
struct SavedSelection(Option<Vec<RecordId>>);

impl SavedSelection {
    fn capture(&mut self, source: &VectorSource) -> bool {
        if source.is_disposed() {
            return false;
        }
        self.0 = Some(source.selected_ids());
        true
    }

    fn restore(&mut self, source: &mut VectorSource) -> bool {
        if source.is_disposed() {
            return false;
        }
        let Some(prior) = self.0.take() else {
            return false;
        };
        source.set_selected_ids(&prior);
        true
    }
}

#[derive(Debug, Default, Clone)]
pub struct SelectAll {
    saved: SavedSelection,
}

impl Command for SelectAll {
    fn title(&self) -> String {
        "Select All".to_string()
    }

    fn execute(&mut self, source: &mut VectorSource) -> bool {
        if !self.saved.capture(source) {
            return false;
        }
        source.select_all();
        true
    }

    fn revert(&mut self, source: &mut VectorSource) -> bool {
        self.saved.restore(source)
    }
}

#[derive(Debug, Default, Clone)]
pub struct SelectNone {
    saved: SavedSelection,
}

impl Command for SelectNone {
    fn title(&self) -> String {
        "Select None".to_string()
    }

    fn execute(&mut self, source: &mut VectorSource) -> bool {
        if !self.saved.capture(source) {
            return false;
        }
        source.select_none();
        true
    }

    fn revert(&mut self, source: &mut VectorSource) -> bool {
        self.saved.restore(source)
    }
}

#[derive(Debug, Default, Clone)]
pub struct InvertSelection {
    saved: SavedSelection,
}

impl Command for InvertSelection {
    fn title(&self) -> String {
        "Invert Selection".to_string()
    }

    fn execute(&mut self, source: &mut VectorSource) -> bool {
        if !self.saved.capture(source) {
            return false;
        }
        source.invert_selection();
        true
    }

    fn revert(&mut self, source: &mut VectorSource) -> bool {
        self.saved.restore(source)
    }
}

/// Adds specific records to the selection.
#[derive(Debug, Clone)]
pub struct SelectRecords {
    ids: Vec<RecordId>,
    saved: SavedSelection,
}

impl SelectRecords {
    pub fn new(ids: Vec<RecordId>) -> Self {
        Self {
            ids,
            saved: SavedSelection::default(),
        }
    }
}

impl Command for SelectRecords {
    fn title(&self) -> String {
        match self.ids.len() {
            1 => "Select Record".to_string(),
            n => format!("Select {n} Records"),
        }
    }

    fn execute(&mut self, source: &mut VectorSource) -> bool {
        if !self.saved.capture(source) {
            return false;
        }
        source.select(&self.ids);
        true
    }

    fn revert(&mut self, source: &mut VectorSource) -> bool {
        self.saved.restore(source)
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, InvertSelection, SelectAll, SelectNone, SelectRecords};
    use crate::record::Record;
    use crate::test_support::{ids, store};
    use foundation::ids::RecordId;
    use pretty_assertions::assert_eq;

    #[test]
    fn select_none_reverts_to_the_prior_selection() {
        let (mut src, _) = store();
        src.add_records(vec![
            Record::new("5"),
            Record::new(5i64),
            Record::new("6"),
        ]);
        src.process_now();

        let mut pick = SelectRecords::new(vec![RecordId::Text("5".into())]);
        assert!(pick.execute(&mut src));
        assert_eq!(src.selected_ids(), vec![RecordId::Text("5".into())]);

        let mut none = SelectNone::default();
        assert!(none.execute(&mut src));
        assert!(src.selected_ids().is_empty());

        assert!(none.revert(&mut src));
        assert_eq!(src.selected_ids(), vec![RecordId::Text("5".into())]);
        assert!(!src.is_selected(&RecordId::Num(5)));
    }

    #[test]
    fn revert_restores_exact_order() {
        let (mut src, _) = store();
        src.add_records((1..=5i64).map(Record::new).collect());
        src.process_now();
        src.select(&ids(&[4, 1, 3]));

        let mut invert = InvertSelection::default();
        invert.execute(&mut src);
        assert_eq!(src.selected_ids(), ids(&[2, 5]));
        invert.revert(&mut src);
        assert_eq!(src.selected_ids(), ids(&[4, 1, 3]));

        let mut all = SelectAll::default();
        all.execute(&mut src);
        assert_eq!(src.selected_ids().len(), 5);
        all.revert(&mut src);
        assert_eq!(src.selected_ids(), ids(&[4, 1, 3]));
    }

    #[test]
    fn revert_without_execute_and_after_dispose_fail() {
        let (mut src, _) = store();
        let mut none = SelectNone::default();
        assert!(!none.revert(&mut src));

        src.dispose();
        assert!(!none.execute(&mut src));
        assert_eq!(SelectRecords::new(ids(&[1, 2])).title(), "Select 2 Records");
    }
}
