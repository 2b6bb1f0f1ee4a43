//! vacuum/blockset - разреженное множество номеров блоков с упорядоченным обходом.
//!
//! Слова по 64 бита в BTreeMap: ключ - номер слова (blk / 64), значение - битовая маска.
//! Пустые слова не хранятся, так что обход и размер пропорциональны числу занятых слов.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSet {
    words: BTreeMap<u64, u64>,
    len: usize,
}

impl BlockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавить блок; false, если он уже был в множестве.
    pub fn insert(&mut self, blkno: u64) -> bool {
        let w = self.words.entry(blkno / 64).or_insert(0);
        let bit = 1u64 << (blkno % 64);
        if *w & bit != 0 {
            return false;
        }
        *w |= bit;
        self.len += 1;
        true
    }

    pub fn contains(&self, blkno: u64) -> bool {
        self.words
            .get(&(blkno / 64))
            .map_or(false, |w| w & (1u64 << (blkno % 64)) != 0)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Блоки по возрастанию.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.words.iter().flat_map(|(&wi, &bits)| {
            (0..64u64)
                .filter(move |b| bits & (1u64 << b) != 0)
                .map(move |b| wi * 64 + b)
        })
    }
}

impl FromIterator<u64> for BlockSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut s = BlockSet::new();
        for b in iter {
            s.insert(b);
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_members_iterate_ascending() {
        let mut s = BlockSet::new();
        assert!(s.is_empty());
        for b in [1_000_000u64, 3, 64, 63, 3] {
            s.insert(b);
        }
        assert_eq!(s.len(), 4);
        assert!(s.contains(63) && s.contains(64) && !s.contains(65));
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![3, 63, 64, 1_000_000]);
    }

    #[test]
    fn duplicate_insert_reports_false() {
        let mut s: BlockSet = [7u64, 9].into_iter().collect();
        assert!(!s.insert(7));
        assert!(s.insert(u64::MAX - 1));
        assert_eq!(s.iter().last(), Some(u64::MAX - 1));
    }
}
