use super::heap::Heap;
use super::object::{ObjRef, Objects};
use super::value::Value;

const MAX_LOAD: f64 = 0.75;

/// A live entry has a key. A keyless entry is empty when its value is `Nil`
/// and a tombstone when its value is `true`.
#[derive(Clone, Copy)]
struct Entry {
    key: Option<ObjRef>,
    value: Value,
}

const EMPTY: Entry = Entry {
    key: None,
    value: Value::Nil,
};

/// Open-addressing table keyed by interned strings. Probing is linear and
/// keys compare by handle identity, which interning makes sound.
pub struct Table {
    count: usize,
    entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Self {
        Self {
            count: 0,
            entries: Vec::new(),
        }
    }

    fn find_entry(entries: &[Entry], objects: &Objects, key: ObjRef) -> usize {
        let mut index = objects.string(key).hash as usize % entries.len();
        let mut tombstone = None;
        loop {
            let entry = &entries[index];
            match entry.key {
                None => {
                    if let Value::Nil = entry.value {
                        return tombstone.unwrap_or(index);
                    }
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Some(k) if k == key => return index,
                Some(_) => {}
            }
            index = (index + 1) % entries.len();
        }
    }

    fn adjust_capacity(&mut self, objects: &Objects, capacity: usize) {
        let mut entries = vec![EMPTY; capacity];
        self.count = 0;
        for entry in &self.entries {
            if entry.key.is_some() {
                let dest = Self::find_entry(&entries, objects, entry.key.unwrap());
                entries[dest] = *entry;
                self.count += 1;
            }
        }
        self.entries = entries;
    }

    /// Returns whether the key was new.
    pub fn set(&mut self, objects: &Objects, key: ObjRef, value: Value) -> bool {
        if (self.count + 1) as f64 > self.entries.len() as f64 * MAX_LOAD {
            let capacity = if self.entries.len() < 8 {
                8
            } else {
                self.entries.len() * 2
            };
            self.adjust_capacity(objects, capacity);
        }

        let index = Self::find_entry(&self.entries, objects, key);
        let entry = &mut self.entries[index];
        let is_new = entry.key.is_none();
        // a reused tombstone was already counted
        if is_new && matches!(entry.value, Value::Nil) {
            self.count += 1;
        }
        entry.key = Some(key);
        entry.value = value;
        is_new
    }

    pub fn get(&self, objects: &Objects, key: ObjRef) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let entry = &self.entries[Self::find_entry(&self.entries, objects, key)];
        entry.key.map(|_| entry.value)
    }

    /// Replaces the entry with a tombstone so probe chains stay intact.
    pub fn delete(&mut self, objects: &Objects, key: ObjRef) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = Self::find_entry(&self.entries, objects, key);
        let entry = &mut self.entries[index];
        if entry.key.is_none() {
            return false;
        }
        entry.key = None;
        entry.value = Value::Bool(true);
        true
    }

    pub fn add_all(&self, objects: &Objects, to: &mut Table) {
        for entry in &self.entries {
            if let Some(key) = entry.key {
                to.set(objects, key, entry.value);
            }
        }
    }

    /// Interning lookup: matches on length, hash, and bytes rather than
    /// handle identity, since the candidate string has no handle yet.
    pub fn find_string(&self, objects: &Objects, chars: &str, hash: u32) -> Option<ObjRef> {
        if self.count == 0 {
            return None;
        }
        let mut index = hash as usize % self.entries.len();
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None => {
                    if let Value::Nil = entry.value {
                        return None;
                    }
                }
                Some(key) => {
                    let s = objects.string(key);
                    if s.chars.len() == chars.len() && s.hash == hash && s.chars == chars {
                        return Some(key);
                    }
                }
            }
            index = (index + 1) % self.entries.len();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.entries
            .iter()
            .filter_map(|entry| entry.key.map(|key| (key, entry.value)))
    }

    /// Roots every key and value.
    pub fn mark(&self, heap: &mut Heap) {
        for (key, value) in self.iter() {
            heap.mark_object(key);
            heap.mark_value(value);
        }
    }

    /// Drops entries whose key did not survive marking; the intern table
    /// holds its strings weakly.
    pub fn remove_unmarked(&mut self, objects: &Objects) {
        for entry in &mut self.entries {
            if let Some(key) = entry.key {
                if !objects.is_marked(key) {
                    entry.key = None;
                    entry.value = Value::Bool(true);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::hash_string;
    use crate::object::{ObjKind, Str};

    fn new_string(objects: &mut Objects, chars: &str) -> ObjRef {
        objects.alloc(ObjKind::Str(Str {
            chars: chars.to_string(),
            hash: hash_string(chars),
        }))
    }

    #[test]
    fn set_get_overwrite() {
        let mut objects = Objects::new();
        let mut table = Table::new();
        let key = new_string(&mut objects, "answer");

        assert_eq!(table.get(&objects, key), None);
        assert!(table.set(&objects, key, Value::Number(42.0)));
        assert_eq!(table.get(&objects, key), Some(Value::Number(42.0)));

        // overwriting is not a new key
        assert!(!table.set(&objects, key, Value::Number(43.0)));
        assert_eq!(table.get(&objects, key), Some(Value::Number(43.0)));
    }

    #[test]
    fn survives_growth_past_the_load_factor() {
        let mut objects = Objects::new();
        let mut table = Table::new();
        let keys: Vec<ObjRef> = (0..100)
            .map(|i| new_string(&mut objects, &format!("key{}", i)))
            .collect();

        for (i, key) in keys.iter().enumerate() {
            table.set(&objects, *key, Value::Number(i as f64));
        }
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(table.get(&objects, *key), Some(Value::Number(i as f64)));
        }
    }

    #[test]
    fn delete_leaves_a_usable_tombstone() {
        let mut objects = Objects::new();
        let mut table = Table::new();
        let keys: Vec<ObjRef> = (0..20)
            .map(|i| new_string(&mut objects, &format!("key{}", i)))
            .collect();
        for key in &keys {
            table.set(&objects, *key, Value::Bool(false));
        }

        assert!(table.delete(&objects, keys[7]));
        assert!(!table.delete(&objects, keys[7]));
        assert_eq!(table.get(&objects, keys[7]), None);

        // probe chains that ran through the deleted slot still resolve
        for (i, key) in keys.iter().enumerate() {
            if i != 7 {
                assert_eq!(table.get(&objects, *key), Some(Value::Bool(false)));
            }
        }

        // and the tombstone is reused for a fresh insert
        assert!(table.set(&objects, keys[7], Value::Nil));
        assert_eq!(table.get(&objects, keys[7]), Some(Value::Nil));
    }

    #[test]
    fn add_all_copies_every_entry() {
        let mut objects = Objects::new();
        let mut from = Table::new();
        let mut to = Table::new();
        let a = new_string(&mut objects, "a");
        let b = new_string(&mut objects, "b");

        from.set(&objects, a, Value::Number(1.0));
        from.set(&objects, b, Value::Number(2.0));
        to.set(&objects, a, Value::Number(0.0));
        from.add_all(&objects, &mut to);

        assert_eq!(to.get(&objects, a), Some(Value::Number(1.0)));
        assert_eq!(to.get(&objects, b), Some(Value::Number(2.0)));
    }

    #[test]
    fn find_string_matches_on_contents() {
        let mut objects = Objects::new();
        let mut table = Table::new();
        let key = new_string(&mut objects, "needle");
        table.set(&objects, key, Value::Nil);

        assert_eq!(
            table.find_string(&objects, "needle", hash_string("needle")),
            Some(key)
        );
        assert_eq!(
            table.find_string(&objects, "nettle", hash_string("nettle")),
            None
        );
    }
}
