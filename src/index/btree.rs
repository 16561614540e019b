//! In-memory B+Tree used as the backing structure for every index family.
//!
//! Keys live in sorted order; values sit only in leaves, interior nodes hold
//! routing separators. `insert` replaces any existing mapping for the key,
//! `delete` is a no-op for absent keys, and `all_entries` enumerates the
//! whole tree in ascending key order (used for index-file rewrites and the
//! positional re-numbering after a document deletion).
//!
//! The tree performs no synchronization of its own; callers serialize
//! access per tree through the locks manager or the owning concurrent map.

/// Maximum keys per node before a split.
const ORDER: usize = 32;

#[derive(Debug)]
pub struct BPlusTree<K, V> {
    root: Node<K, V>,
    len: usize,
}

#[derive(Debug)]
enum Node<K, V> {
    Leaf { keys: Vec<K>, values: Vec<V> },
    Internal { keys: Vec<K>, children: Vec<Node<K, V>> },
}

enum Inserted<K, V> {
    /// Key already existed, value replaced in place.
    Replaced,
    /// New entry absorbed without structural change.
    Done,
    /// New entry forced a split; carries the separator and the new right sibling.
    Split(K, Node<K, V>),
}

impl<K: Ord + Clone, V: Clone> BPlusTree<K, V> {
    pub fn new() -> Self {
        Self {
            root: Node::empty_leaf(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `key -> value`, replacing any existing mapping for `key`.
    pub fn insert(&mut self, key: K, value: V) {
        match self.root.insert(key, value) {
            Inserted::Replaced => {}
            Inserted::Done => self.len += 1,
            Inserted::Split(sep, right) => {
                self.len += 1;
                let left = std::mem::replace(&mut self.root, Node::empty_leaf());
                self.root = Node::Internal {
                    keys: vec![sep],
                    children: vec![left, right],
                };
            }
        }
    }

    /// Removes the mapping for `key` if present. Returns whether anything
    /// was removed.
    pub fn delete(&mut self, key: &K) -> bool {
        let removed = self.root.delete(key);
        if removed {
            self.len -= 1;
            // Hoist single-child roots left behind by emptied leaves.
            loop {
                let hoisted = match &mut self.root {
                    Node::Internal { children, .. } if children.len() == 1 => {
                        Some(children.remove(0))
                    }
                    _ => None,
                };
                match hoisted {
                    Some(child) => self.root = child,
                    None => break,
                }
            }
        }
        removed
    }

    pub fn search(&self, key: &K) -> Option<&V> {
        self.root.search(key)
    }

    /// All `(key, value)` pairs in ascending key order.
    pub fn all_entries(&self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.len);
        self.root.collect_into(&mut out);
        out
    }

    pub fn clear(&mut self) {
        self.root = Node::empty_leaf();
        self.len = 0;
    }
}

impl<K: Ord + Clone, V: Clone> Default for BPlusTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V: Clone> Node<K, V> {
    fn empty_leaf() -> Self {
        Node::Leaf {
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Index of the child a key routes to: the number of separators <= key.
    fn child_index(keys: &[K], key: &K) -> usize {
        keys.partition_point(|k| k <= key)
    }

    fn insert(&mut self, key: K, value: V) -> Inserted<K, V> {
        match self {
            Node::Leaf { keys, values } => match keys.binary_search(&key) {
                Ok(i) => {
                    values[i] = value;
                    Inserted::Replaced
                }
                Err(i) => {
                    keys.insert(i, key);
                    values.insert(i, value);
                    if keys.len() > ORDER {
                        let mid = keys.len() / 2;
                        let right_keys = keys.split_off(mid);
                        let right_values = values.split_off(mid);
                        let sep = right_keys[0].clone();
                        Inserted::Split(
                            sep,
                            Node::Leaf {
                                keys: right_keys,
                                values: right_values,
                            },
                        )
                    } else {
                        Inserted::Done
                    }
                }
            },
            Node::Internal { keys, children } => {
                let idx = Self::child_index(keys, &key);
                match children[idx].insert(key, value) {
                    Inserted::Split(sep, right) => {
                        keys.insert(idx, sep);
                        children.insert(idx + 1, right);
                        if keys.len() > ORDER {
                            let mid = keys.len() / 2;
                            let mut right_keys = keys.split_off(mid);
                            let sep_up = right_keys.remove(0);
                            let right_children = children.split_off(mid + 1);
                            Inserted::Split(
                                sep_up,
                                Node::Internal {
                                    keys: right_keys,
                                    children: right_children,
                                },
                            )
                        } else {
                            Inserted::Done
                        }
                    }
                    other => other,
                }
            }
        }
    }

    fn delete(&mut self, key: &K) -> bool {
        match self {
            Node::Leaf { keys, values } => match keys.binary_search(key) {
                Ok(i) => {
                    keys.remove(i);
                    values.remove(i);
                    true
                }
                Err(_) => false,
            },
            Node::Internal { keys, children } => {
                let idx = Self::child_index(keys, key);
                let removed = children[idx].delete(key);
                if removed {
                    let child_emptied = matches!(
                        &children[idx],
                        Node::Leaf { keys: ck, .. } if ck.is_empty()
                    );
                    if child_emptied && children.len() > 1 {
                        children.remove(idx);
                        if idx == 0 {
                            keys.remove(0);
                        } else {
                            keys.remove(idx - 1);
                        }
                    }
                }
                removed
            }
        }
    }

    fn search(&self, key: &K) -> Option<&V> {
        match self {
            Node::Leaf { keys, values } => keys.binary_search(key).ok().map(|i| &values[i]),
            Node::Internal { keys, children } => {
                children[Self::child_index(keys, key)].search(key)
            }
        }
    }

    fn collect_into(&self, out: &mut Vec<(K, V)>) {
        match self {
            Node::Leaf { keys, values } => {
                for (k, v) in keys.iter().zip(values.iter()) {
                    out.push((k.clone(), v.clone()));
                }
            }
            Node::Internal { children, .. } => {
                for child in children {
                    child.collect_into(out);
                }
            }
        }
    }
}
