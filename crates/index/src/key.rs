/// Store-internal slot key of a record.
///
/// A key is reused only after its record's removal has been finalized; a
/// stale entry for it in a pending ingestion queue is ignored once the key
/// is indexed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(pub u32);

impl RecordKey {
    pub fn index(&self) -> u32 {
        self.0
    }
}
