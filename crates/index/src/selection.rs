use crate::key::RecordKey;

/// Bitset of record keys.
///
/// Used for the shown/selected maps: O(1) membership by `RecordKey::index()`.
///
/// Ordering contract:
/// - Iteration yields keys in ascending index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    words: Vec<u64>,
    len: usize,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys(keys: impl IntoIterator<Item = RecordKey>) -> Self {
        let mut s = Self::new();
        for k in keys {
            s.insert(k);
        }
        s
    }

    pub fn clear(&mut self) {
        self.words.clear();
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, key: RecordKey) -> bool {
        let (word, bit) = word_bit(key.index());
        self.words
            .get(word)
            .is_some_and(|w| (w & (1u64 << bit)) != 0)
    }

    /// Returns `true` if the set changed.
    pub fn insert(&mut self, key: RecordKey) -> bool {
        let (word, bit) = word_bit(key.index());
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        let mask = 1u64 << bit;
        let w = &mut self.words[word];
        if (*w & mask) != 0 {
            return false;
        }
        *w |= mask;
        self.len += 1;
        true
    }

    /// Returns `true` if the set changed.
    pub fn remove(&mut self, key: RecordKey) -> bool {
        let (word, bit) = word_bit(key.index());
        let Some(w) = self.words.get_mut(word) else {
            return false;
        };
        let mask = 1u64 << bit;
        if (*w & mask) == 0 {
            return false;
        }
        *w &= !mask;
        self.len -= 1;
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = RecordKey> + '_ {
        KeyIter {
            words: &self.words,
            word_index: 0,
            current_word: 0,
            base_index: 0,
        }
    }
}

fn word_bit(index: u32) -> (usize, u32) {
    ((index / 64) as usize, index % 64)
}

struct KeyIter<'a> {
    words: &'a [u64],
    word_index: usize,
    current_word: u64,
    base_index: u32,
}

impl Iterator for KeyIter<'_> {
    type Item = RecordKey;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_word != 0 {
                let tz = self.current_word.trailing_zeros();
                self.current_word &= !(1u64 << tz);
                return Some(RecordKey(self.base_index + tz));
            }

            let w = *self.words.get(self.word_index)?;
            self.current_word = w;
            self.base_index = (self.word_index as u32) * 64;
            self.word_index += 1;
        }
    }
}

/// Selection kept both as an insertion-ordered list and a membership bitset.
///
/// Invariant: `order.len() == members.len()` and every key in `order` is in
/// `members` exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedSelection {
    order: Vec<RecordKey>,
    members: KeySet,
}

impl OrderedSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: RecordKey) -> bool {
        self.members.contains(key)
    }

    pub fn keys(&self) -> &[RecordKey] {
        &self.order
    }

    pub fn members(&self) -> &KeySet {
        &self.members
    }

    /// Appends `key` if absent. Returns `true` if the selection changed.
    pub fn insert(&mut self, key: RecordKey) -> bool {
        if !self.members.insert(key) {
            return false;
        }
        self.order.push(key);
        true
    }

    /// Removes every key in `keys`, preserving the order of the rest.
    ///
    /// Returns the keys actually removed, in selection order.
    pub fn remove_all(&mut self, keys: &KeySet) -> Vec<RecordKey> {
        let mut removed = Vec::new();
        for key in keys.iter() {
            if self.members.remove(key) {
                removed.push(key);
            }
        }
        if removed.is_empty() {
            return removed;
        }
        let members = &self.members;
        let mut in_order = Vec::with_capacity(removed.len());
        self.order.retain(|k| {
            if members.contains(*k) {
                true
            } else {
                in_order.push(*k);
                false
            }
        });
        in_order
    }

    pub fn remove(&mut self, key: RecordKey) -> bool {
        !self.remove_all(&KeySet::from_keys([key])).is_empty()
    }

    /// Empties the selection and returns what was selected, in order.
    pub fn take(&mut self) -> Vec<RecordKey> {
        self.members.clear();
        std::mem::take(&mut self.order)
    }
}
