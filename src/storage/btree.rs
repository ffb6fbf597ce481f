//! Copy-on-write B+ Tree for sqlvtab
//!
//! Nodes are shared through `Arc`. A write copies only the nodes on the path
//! from the root to the touched leaf (`Arc::make_mut`), so cloning a tree is
//! O(1) and the clone is an independent snapshot: later writes to either
//! side never show through to the other.
//!
//! Deletion removes emptied nodes but does not rebalance underfull ones.

use std::cmp::Ordering;
use std::fmt::Debug;
use std::ops::Bound;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_NODE_CAPACITY;
use crate::value::Value;

/// A key in the B+ tree (wraps Values for comparison)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexKey(pub Vec<Value>);

impl IndexKey {
    /// Create a new index key from a single value
    pub fn new(value: Value) -> Self {
        Self(vec![value])
    }

    /// Create a new composite index key
    pub fn composite(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Key components
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Compare two index keys component-wise in storage order; a proper
    /// prefix sorts first
    pub fn compare(&self, other: &IndexKey) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.storage_cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.0.len().cmp(&other.0.len())
    }

    /// Compare only the first `prefix.len()` components against `prefix`
    pub fn compare_prefix(&self, prefix: &[Value]) -> Ordering {
        for (a, b) in self.0.iter().zip(prefix) {
            match a.storage_cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        if self.0.len() < prefix.len() {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    }

    /// Whether `prefix` equals the leading components of this key
    pub fn starts_with(&self, prefix: &[Value]) -> bool {
        prefix.len() <= self.0.len()
            && self
                .0
                .iter()
                .zip(prefix)
                .all(|(a, b)| a.storage_cmp(b) == Ordering::Equal)
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

/// B+ Tree Node
#[derive(Debug, Clone)]
enum Node<V> {
    /// Internal node: `children[i]` holds keys below `keys[i]` and at or above `keys[i - 1]`
    Internal {
        keys: Vec<IndexKey>,
        children: Vec<Arc<Node<V>>>,
    },
    /// Leaf node with keys and their values
    Leaf { keys: Vec<IndexKey>, values: Vec<V> },
}

impl<V> Node<V> {
    fn empty_leaf() -> Self {
        Node::Leaf {
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Node::Internal { children, .. } => children.is_empty(),
            Node::Leaf { keys, .. } => keys.is_empty(),
        }
    }

    fn keys(&self) -> &[IndexKey] {
        match self {
            Node::Internal { keys, .. } | Node::Leaf { keys, .. } => keys,
        }
    }
}

/// Child position for `key`; exact separator matches go right
fn route(keys: &[IndexKey], key: &IndexKey) -> usize {
    match keys.binary_search(key) {
        Ok(p) => p + 1,
        Err(p) => p,
    }
}

type Split<V> = (IndexKey, Arc<Node<V>>);

/// Copy-on-write B+ Tree
#[derive(Debug, Clone)]
pub struct BPlusTree<V> {
    /// Root node
    root: Arc<Node<V>>,
    /// Number of entries
    size: usize,
    /// Maximum keys per node before a split
    capacity: usize,
}

impl<V: Clone> Default for BPlusTree<V> {
    fn default() -> Self {
        Self::new(DEFAULT_NODE_CAPACITY)
    }
}

impl<V: Clone> BPlusTree<V> {
    /// Create a new empty B+ tree
    pub fn new(capacity: usize) -> Self {
        Self {
            root: Arc::new(Node::empty_leaf()),
            size: 0,
            capacity: capacity.max(3),
        }
    }

    /// Insert a key-value pair, returning the value it replaced
    pub fn insert(&mut self, key: IndexKey, value: V) -> Option<V> {
        let capacity = self.capacity;
        let (old, split) = Self::insert_recursive(Arc::make_mut(&mut self.root), key, value, capacity);

        if let Some((mid_key, new_node)) = split {
            // Root split, create new root
            let left = Arc::clone(&self.root);
            self.root = Arc::new(Node::Internal {
                keys: vec![mid_key],
                children: vec![left, new_node],
            });
        }

        if old.is_none() {
            self.size += 1;
        }
        old
    }

    fn insert_recursive(
        node: &mut Node<V>,
        key: IndexKey,
        value: V,
        capacity: usize,
    ) -> (Option<V>, Option<Split<V>>) {
        match node {
            Node::Leaf { keys, values } => match keys.binary_search(&key) {
                Ok(pos) => {
                    keys[pos] = key;
                    (Some(std::mem::replace(&mut values[pos], value)), None)
                }
                Err(pos) => {
                    keys.insert(pos, key);
                    values.insert(pos, value);

                    if keys.len() > capacity {
                        let mid = keys.len() / 2;
                        let new_keys = keys.split_off(mid);
                        let new_values = values.split_off(mid);
                        let mid_key = new_keys[0].clone();
                        let right = Node::Leaf {
                            keys: new_keys,
                            values: new_values,
                        };
                        return (None, Some((mid_key, Arc::new(right))));
                    }
                    (None, None)
                }
            },
            Node::Internal { keys, children } => {
                let pos = route(keys, &key);
                let (old, split) =
                    Self::insert_recursive(Arc::make_mut(&mut children[pos]), key, value, capacity);

                if let Some((mid_key, new_node)) = split {
                    keys.insert(pos, mid_key);
                    children.insert(pos + 1, new_node);

                    if keys.len() > capacity {
                        let mid = keys.len() / 2;
                        let mid_key = keys[mid].clone();
                        let new_keys = keys.split_off(mid + 1);
                        keys.pop(); // Remove mid_key from left node
                        let new_children = children.split_off(mid + 1);
                        let right = Node::Internal {
                            keys: new_keys,
                            children: new_children,
                        };
                        return (old, Some((mid_key, Arc::new(right))));
                    }
                }
                (old, None)
            }
        }
    }

    /// Search for a key in the tree
    pub fn get(&self, key: &IndexKey) -> Option<&V> {
        let mut curr = self.root.as_ref();
        loop {
            match curr {
                Node::Leaf { keys, values } => {
                    return keys.binary_search(key).ok().map(|pos| &values[pos]);
                }
                Node::Internal { keys, children } => {
                    curr = &children[route(keys, key)];
                }
            }
        }
    }

    /// Whether the key is present
    pub fn contains_key(&self, key: &IndexKey) -> bool {
        self.get(key).is_some()
    }

    /// Delete a key from the tree, returning its value
    pub fn remove(&mut self, key: &IndexKey) -> Option<V> {
        // Avoid copying the path when there is nothing to remove
        if !self.contains_key(key) {
            return None;
        }

        let removed = Self::remove_recursive(Arc::make_mut(&mut self.root), key);

        // Collapse single-child roots
        loop {
            let only_child = match self.root.as_ref() {
                Node::Internal { children, .. } if children.len() == 1 => Arc::clone(&children[0]),
                Node::Internal { children, .. } if children.is_empty() => {
                    Arc::new(Node::empty_leaf())
                }
                _ => break,
            };
            self.root = only_child;
        }

        if removed.is_some() {
            self.size -= 1;
        }
        removed
    }

    fn remove_recursive(node: &mut Node<V>, key: &IndexKey) -> Option<V> {
        match node {
            Node::Leaf { keys, values } => {
                let pos = keys.binary_search(key).ok()?;
                keys.remove(pos);
                Some(values.remove(pos))
            }
            Node::Internal { keys, children } => {
                let pos = route(keys, key);
                let child = Arc::make_mut(&mut children[pos]);
                let removed = Self::remove_recursive(child, key);

                if child.is_empty() {
                    children.remove(pos);
                    if pos > 0 {
                        keys.remove(pos - 1);
                    } else if !keys.is_empty() {
                        keys.remove(0);
                    }
                }
                removed
            }
        }
    }

    /// Ascending iteration starting at `start`
    pub fn iter_from(&self, start: Bound<&IndexKey>) -> Iter<'_, V> {
        match start {
            Bound::Included(k) => self.seek(|x| x < k),
            Bound::Excluded(k) => self.seek(|x| x <= k),
            Bound::Unbounded => self.seek(|_| false),
        }
    }

    /// Descending iteration starting at `end`
    pub fn iter_back_from(&self, end: Bound<&IndexKey>) -> Iter<'_, V> {
        match end {
            Bound::Included(k) => self.seek_back(|x| x <= k),
            Bound::Excluded(k) => self.seek_back(|x| x < k),
            Bound::Unbounded => self.seek_back(|_| true),
        }
    }

    /// Ascending iteration from the first key for which `before` is false.
    ///
    /// `before` must hold for a leading run of keys in tree order and fail
    /// for the rest.
    pub fn seek(&self, before: impl Fn(&IndexKey) -> bool) -> Iter<'_, V> {
        let mut iter = Iter {
            stack: Vec::new(),
            reverse: false,
        };
        let mut curr = self.root.as_ref();
        loop {
            let pos = curr.keys().partition_point(|k| before(k));
            match curr {
                Node::Internal { children, .. } => {
                    iter.stack.push((curr, pos + 1));
                    curr = &children[pos];
                }
                Node::Leaf { .. } => {
                    iter.stack.push((curr, pos));
                    return iter;
                }
            }
        }
    }

    /// Descending iteration from the last key for which `through` holds.
    ///
    /// `through` must hold for a leading run of keys in tree order and fail
    /// for the rest.
    pub fn seek_back(&self, through: impl Fn(&IndexKey) -> bool) -> Iter<'_, V> {
        let mut iter = Iter {
            stack: Vec::new(),
            reverse: true,
        };
        let mut curr = self.root.as_ref();
        loop {
            let pos = curr.keys().partition_point(|k| through(k));
            match curr {
                Node::Internal { children, .. } => {
                    iter.stack.push((curr, pos));
                    curr = &children[pos];
                }
                Node::Leaf { .. } => {
                    iter.stack.push((curr, pos));
                    return iter;
                }
            }
        }
    }

    /// All entries in ascending key order
    pub fn iter(&self) -> Iter<'_, V> {
        self.iter_from(Bound::Unbounded)
    }

    /// Number of entries in the tree
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether two trees share the same root node
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }
}

/// Ordered iterator over a tree.
///
/// Each stack entry holds a node and a cursor into it. Ascending: the next
/// key (leaf) or next child (internal) to visit. Descending: how many keys or
/// children remain to the left.
pub struct Iter<'a, V> {
    stack: Vec<(&'a Node<V>, usize)>,
    reverse: bool,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a IndexKey, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (node, idx) = self.stack.last_mut()?;
            let node: &'a Node<V> = *node;
            match node {
                Node::Leaf { keys, values } => {
                    if self.reverse {
                        if *idx > 0 {
                            *idx -= 1;
                            return Some((&keys[*idx], &values[*idx]));
                        }
                    } else if *idx < keys.len() {
                        *idx += 1;
                        return Some((&keys[*idx - 1], &values[*idx - 1]));
                    }
                    self.stack.pop();
                }
                Node::Internal { children, .. } => {
                    let child = if self.reverse {
                        if *idx == 0 {
                            self.stack.pop();
                            continue;
                        }
                        *idx -= 1;
                        children[*idx].as_ref()
                    } else {
                        if *idx >= children.len() {
                            self.stack.pop();
                            continue;
                        }
                        *idx += 1;
                        children[*idx - 1].as_ref()
                    };
                    let start = match (self.reverse, child) {
                        (false, _) => 0,
                        (true, Node::Leaf { keys, .. }) => keys.len(),
                        (true, Node::Internal { children, .. }) => children.len(),
                    };
                    self.stack.push((child, start));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_key(i: i64) -> IndexKey {
        IndexKey::new(Value::Integer(i))
    }

    fn keys_of<'a, V: 'a>(iter: impl Iterator<Item = (&'a IndexKey, &'a V)>) -> Vec<i64> {
        iter.map(|(k, _)| k.0[0].as_i64().unwrap()).collect()
    }

    #[test]
    fn test_btree_insert_and_search() {
        let mut tree = BPlusTree::new(4);

        assert_eq!(tree.insert(make_key(5), "five"), None);
        tree.insert(make_key(3), "three");
        tree.insert(make_key(7), "seven");
        tree.insert(make_key(1), "one");

        assert_eq!(tree.get(&make_key(5)), Some(&"five"));
        assert_eq!(tree.get(&make_key(3)), Some(&"three"));
        assert_eq!(tree.get(&make_key(7)), Some(&"seven"));
        assert_eq!(tree.get(&make_key(1)), Some(&"one"));
        assert_eq!(tree.get(&make_key(99)), None);

        assert_eq!(tree.insert(make_key(5), "FIVE"), Some("five"));
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_btree_many_inserts() {
        let mut tree = BPlusTree::new(3);

        // Interleaved order exercises splits on both sides of separators
        for i in (0..200).map(|i| (i * 37) % 200) {
            tree.insert(make_key(i), i);
        }

        assert_eq!(tree.len(), 200);
        for i in 0..200 {
            assert_eq!(tree.get(&make_key(i)), Some(&i));
        }
        assert_eq!(keys_of(tree.iter()), (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn test_btree_delete() {
        let mut tree = BPlusTree::new(3);
        for i in 0..50 {
            tree.insert(make_key(i), i);
        }

        for i in (0..50).filter(|i| i % 3 != 0) {
            assert_eq!(tree.remove(&make_key(i)), Some(i));
        }
        assert_eq!(tree.remove(&make_key(1)), None);
        assert_eq!(tree.len(), 17);
        assert_eq!(
            keys_of(tree.iter()),
            (0..50).filter(|i| i % 3 == 0).collect::<Vec<_>>()
        );

        for i in (0..50).filter(|i| i % 3 == 0) {
            tree.remove(&make_key(i));
        }
        assert!(tree.is_empty());
        assert_eq!(tree.iter().count(), 0);

        tree.insert(make_key(8), 8);
        assert_eq!(keys_of(tree.iter()), vec![8]);
    }

    #[test]
    fn test_btree_range_scan() {
        let mut tree = BPlusTree::new(3);
        for i in [1, 3, 5, 7, 9, 11, 13, 15] {
            tree.insert(make_key(i), i);
        }

        let forward = keys_of(
            tree.iter_from(Bound::Included(&make_key(5)))
                .take_while(|(k, _)| **k <= make_key(11)),
        );
        assert_eq!(forward, vec![5, 7, 9, 11]);

        assert_eq!(
            keys_of(tree.iter_from(Bound::Excluded(&make_key(5))).take(2)),
            vec![7, 9]
        );
        assert_eq!(
            keys_of(tree.iter_from(Bound::Included(&make_key(6))).take(1)),
            vec![7]
        );
        assert_eq!(
            keys_of(tree.iter_back_from(Bound::Included(&make_key(9)))),
            vec![9, 7, 5, 3, 1]
        );
        assert_eq!(
            keys_of(tree.iter_back_from(Bound::Excluded(&make_key(9))).take(2)),
            vec![7, 5]
        );
        assert_eq!(
            keys_of(tree.iter_back_from(Bound::Unbounded)),
            vec![15, 13, 11, 9, 7, 5, 3, 1]
        );
        assert_eq!(tree.iter_from(Bound::Excluded(&make_key(15))).count(), 0);
    }

    #[test]
    fn test_clone_is_independent_snapshot() {
        let mut tree = BPlusTree::new(3);
        for i in 0..30 {
            tree.insert(make_key(i), i);
        }

        let snapshot = tree.clone();
        assert!(snapshot.ptr_eq(&tree));

        tree.remove(&make_key(10));
        tree.insert(make_key(100), 100);
        tree.insert(make_key(3), -3);

        assert!(!snapshot.ptr_eq(&tree));
        assert_eq!(snapshot.len(), 30);
        assert_eq!(snapshot.get(&make_key(10)), Some(&10));
        assert_eq!(snapshot.get(&make_key(100)), None);
        assert_eq!(snapshot.get(&make_key(3)), Some(&3));
        assert_eq!(tree.get(&make_key(3)), Some(&-3));
    }

    #[test]
    fn test_composite_key_order() {
        let a = IndexKey::composite(vec![Value::Integer(1), Value::Text("b".to_string())]);
        let b = IndexKey::composite(vec![Value::Real(1.0), Value::Text("c".to_string())]);
        let prefix = IndexKey::new(Value::Integer(1));

        assert!(a < b);
        assert!(prefix < a);
        assert!(a.starts_with(&[Value::Real(1.0)]));
        assert!(!a.starts_with(&[Value::Integer(2)]));
        assert_eq!(IndexKey::new(Value::Integer(2)), IndexKey::new(Value::Real(2.0)));
        assert!(IndexKey::new(Value::Null) < IndexKey::new(Value::Integer(i64::MIN)));
    }

    #[test]
    fn test_seek_by_prefix() {
        let mut tree = BPlusTree::new(3);
        for a in 1..=4 {
            for b in 1..=5 {
                let key = IndexKey::composite(vec![Value::Integer(a), Value::Integer(b)]);
                tree.insert(key, a * 10 + b);
            }
        }
        let prefix = [Value::Integer(3)];

        let forward: Vec<i64> = tree
            .seek(|k| k.compare_prefix(&prefix) == Ordering::Less)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(forward, vec![31, 32, 33, 34, 35]);

        let backward: Vec<i64> = tree
            .seek_back(|k| k.compare_prefix(&prefix) != Ordering::Greater)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(backward, vec![35, 34, 33, 32, 31]);

        let missing = [Value::Integer(9)];
        assert_eq!(
            tree.seek(|k| k.compare_prefix(&missing) == Ordering::Less)
                .count(),
            0
        );
    }
}
