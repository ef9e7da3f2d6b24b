//! Fixed-capacity open-addressed hash table keyed by a source-text slice.
//! Two instances exist at any time: the interpreter's global table (process
//! lifetime) and the current call frame's local table (call lifetime).
//! There is no delete operation; scopes end by discarding the whole table.

use crate::error::{InterpError, Location};
use crate::str_slice::{hash_bytes, SourceArena, SourceSlice};

#[derive(Debug, PartialEq, Eq)]
pub enum SetOutcome {
    Inserted,
    Updated,
}

#[derive(Clone)]
pub struct Table<V: Copy> {
    slots: Vec<Option<(SourceSlice, V)>>,
}

impl<V: Copy> Table<V> {
    pub fn new(size: usize) -> Self {
        Table { slots: vec![None; size] }
    }

    fn index_for(&self, key: &SourceSlice, arena: &SourceArena) -> usize {
        (hash_bytes(key.bytes(arena)) as usize) % self.slots.len()
    }

    /// Inserts or overwrites `key`. Fatal if the table is full and `key`
    /// isn't already present, matching the original's "no empty slot within
    /// the table" error.
    pub fn set(
        &mut self,
        key: SourceSlice,
        value: V,
        arena: &SourceArena,
    ) -> Result<SetOutcome, InterpError> {
        let start = self.index_for(&key, arena);
        let len = self.slots.len();
        for probe in 0..len {
            let idx = (start + probe) % len;
            match &self.slots[idx] {
                Some((k, _)) if k.eq_in(&key, arena) => {
                    self.slots[idx] = Some((key, value));
                    return Ok(SetOutcome::Updated);
                }
                None => {
                    self.slots[idx] = Some((key, value));
                    return Ok(SetOutcome::Inserted);
                }
                Some(_) => continue,
            }
        }
        Err(InterpError::runtime(
            Location { file: String::new(), line: 0 },
            format!("symbol table full (capacity {len})"),
        ))
    }

    pub fn get(&self, key: &SourceSlice, arena: &SourceArena) -> Option<V> {
        let start = self.index_for(key, arena);
        let len = self.slots.len();
        for probe in 0..len {
            let idx = (start + probe) % len;
            match &self.slots[idx] {
                Some((k, v)) if k.eq_in(key, arena) => return Some(*v),
                None => return None,
                Some(_) => continue,
            }
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = &(SourceSlice, V)> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(arena: &mut SourceArena, text: &str) -> SourceSlice {
        let id = arena.register("t.c".into(), text.as_bytes().to_vec());
        SourceSlice { source: id, start: 0, len: text.len() as u32 }
    }

    #[test]
    fn get_after_set_returns_same_value() {
        let mut arena = SourceArena::new();
        let mut table: Table<u32> = Table::new(11);
        let k1 = slice(&mut arena, "foo");
        let k2 = slice(&mut arena, "bar");
        table.set(k1, 1, &arena).unwrap();
        table.set(k2, 2, &arena).unwrap();
        assert_eq!(table.get(&k1, &arena), Some(1));
        assert_eq!(table.get(&k2, &arena), Some(2));
    }

    #[test]
    fn set_same_key_twice_updates_not_duplicates() {
        let mut arena = SourceArena::new();
        let mut table: Table<u32> = Table::new(11);
        let k1 = slice(&mut arena, "x");
        assert_eq!(table.set(k1, 1, &arena).unwrap(), SetOutcome::Inserted);
        assert_eq!(table.set(k1, 2, &arena).unwrap(), SetOutcome::Updated);
        assert_eq!(table.iter().count(), 1);
        assert_eq!(table.get(&k1, &arena), Some(2));
    }

    #[test]
    fn full_table_is_fatal() {
        let mut arena = SourceArena::new();
        let mut table: Table<u32> = Table::new(2);
        let a = slice(&mut arena, "a");
        let b = slice(&mut arena, "b");
        let c = slice(&mut arena, "c");
        table.set(a, 1, &arena).unwrap();
        table.set(b, 2, &arena).unwrap();
        assert!(table.set(c, 3, &arena).is_err());
    }
}
