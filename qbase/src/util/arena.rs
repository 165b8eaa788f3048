/// A key into an [`Arena`].
///
/// A key stays valid until its entry is removed. Looking up a removed entry
/// fails even if the slot has since been reused, because the generation
/// stored in the slot no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    idx: u32,
    generation: u32,
}

#[derive(Debug)]
enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// A generational arena, a `Vec` of slots with a free list.
#[derive(Debug)]
pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) -> Key {
        self.len += 1;
        match self.free_head {
            Some(idx) => {
                let entry = &mut self.entries[idx as usize];
                let (generation, next_free) = match *entry {
                    Entry::Vacant {
                        generation,
                        next_free,
                    } => (generation.wrapping_add(1), next_free),
                    Entry::Occupied { .. } => unreachable!("free list points to a vacant slot"),
                };
                *entry = Entry::Occupied { generation, value };
                self.free_head = next_free;
                Key { idx, generation }
            }
            None => {
                let idx = self.entries.len() as u32;
                self.entries.push(Entry::Occupied {
                    generation: 0,
                    value,
                });
                Key { idx, generation: 0 }
            }
        }
    }

    pub fn get(&self, key: Key) -> Option<&T> {
        match self.entries.get(key.idx as usize)? {
            Entry::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        match self.entries.get_mut(key.idx as usize)? {
            Entry::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: Key) -> Option<T> {
        let entry = self.entries.get_mut(key.idx as usize)?;
        if !matches!(*entry, Entry::Occupied { generation, .. } if generation == key.generation) {
            return None;
        }
        let vacant = Entry::Vacant {
            generation: key.generation,
            next_free: self.free_head,
        };
        match std::mem::replace(entry, vacant) {
            Entry::Occupied { value, .. } => {
                self.free_head = Some(key.idx);
                self.len -= 1;
                Some(value)
            }
            Entry::Vacant { .. } => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| match entry {
                Entry::Occupied { generation, value } => Some((
                    Key {
                        idx: idx as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Entry::Vacant { .. } => None,
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Key, &mut T)> {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, entry)| match entry {
                Entry::Occupied { generation, value } => Some((
                    Key {
                        idx: idx as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Entry::Vacant { .. } => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::Arena;

    #[test]
    fn test_stale_key_misses() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.remove(a), None);

        // the slot of `a` is reused with a newer generation
        let c = arena.insert("c");
        assert_ne!(a, c);
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(c), Some(&"c"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_iter() {
        let mut arena = Arena::new();
        let keys = (0..5).map(|i| arena.insert(i)).collect::<Vec<_>>();
        arena.remove(keys[1]);
        arena.remove(keys[3]);
        for (_, v) in arena.iter_mut() {
            *v *= 10;
        }
        assert_eq!(
            arena.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
            vec![0, 20, 40]
        );
        assert!(arena.contains(keys[4]));
        assert!(!arena.contains(keys[3]));
    }
}
