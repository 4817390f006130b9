use std::cmp::Ordering;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::util::assert::hard_fail;

type Link<K, V> = Option<Arc<Node<K, V>>>;

struct Node<K, V> {
    key: K,
    value: V,
    height: usize,
    size: usize,
    left: Link<K, V>,
    right: Link<K, V>,
}

/// Immutable ordered map with structural sharing.
///
/// Every mutator returns a new map and leaves the receiver untouched; nodes
/// are shared between versions, so an insert or removal copies only the
/// search path. Old roots staying valid is what makes earlier document
/// snapshots observable after later local edits.
pub struct SortedMap<K, V> {
    root: Link<K, V>,
}

impl<K, V> SortedMap<K, V> {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn len(&self) -> usize {
        size(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter { stack: Vec::new() };
        iter.push_left_spine(self.root.as_deref());
        iter
    }

    #[cfg(test)]
    fn height(&self) -> usize {
        height(&self.root)
    }
}

impl<K: Ord, V> SortedMap<K, V> {
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            match key.cmp(&node.key) {
                Ordering::Less => current = node.left.as_deref(),
                Ordering::Greater => current = node.right.as_deref(),
                Ordering::Equal => return Some(&node.value),
            }
        }
        None
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }
}

impl<K: Ord + Clone, V: Clone> SortedMap<K, V> {
    /// A map with the entry added, replacing any existing value for the key.
    pub fn insert(&self, key: K, value: V) -> Self {
        Self {
            root: Some(insert_node(&self.root, key, value)),
        }
    }

    /// A map without the key. Returns an equivalent map when absent.
    pub fn remove(&self, key: &K) -> Self {
        Self {
            root: remove_node(&self.root, key),
        }
    }
}

impl<K, V> Clone for SortedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<K, V> Default for SortedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for SortedMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq> Eq for SortedMap<K, V> {}

impl<K: Debug, V: Debug> Debug for SortedMap<K, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord + Clone, V: Clone> FromIterator<(K, V)> for SortedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(entries: I) -> Self {
        entries
            .into_iter()
            .fold(Self::new(), |map, (key, value)| map.insert(key, value))
    }
}

/// In-order iterator over borrowed entries.
pub struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn push_left_spine(&mut self, mut current: Option<&'a Node<K, V>>) {
        while let Some(node) = current {
            self.stack.push(node);
            current = node.left.as_deref();
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left_spine(node.right.as_deref());
        Some((&node.key, &node.value))
    }
}

fn height<K, V>(link: &Link<K, V>) -> usize {
    link.as_ref().map_or(0, |node| node.height)
}

fn size<K, V>(link: &Link<K, V>) -> usize {
    link.as_ref().map_or(0, |node| node.size)
}

fn make_node<K, V>(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<Node<K, V>> {
    Arc::new(Node {
        height: 1 + height(&left).max(height(&right)),
        size: 1 + size(&left) + size(&right),
        key,
        value,
        left,
        right,
    })
}

/// Rebuild a node from parts, rotating when the two subtrees' heights differ
/// by more than one. A single insert or removal changes a subtree height by
/// at most one, so one rotation level is always enough.
fn balance<K: Clone, V: Clone>(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<Node<K, V>> {
    let left_height = height(&left);
    let right_height = height(&right);
    if left_height > right_height + 1 {
        let l = match left {
            Some(l) => l,
            None => hard_fail("left-heavy node without a left child"),
        };
        if height(&l.left) >= height(&l.right) {
            // single right rotation
            let new_right = make_node(key, value, l.right.clone(), right);
            make_node(l.key.clone(), l.value.clone(), l.left.clone(), Some(new_right))
        } else {
            // the left child leans right: rotate it left, then this node right
            let lr = match &l.right {
                Some(lr) => lr,
                None => hard_fail("right-leaning node without a right child"),
            };
            let new_left = make_node(l.key.clone(), l.value.clone(), l.left.clone(), lr.left.clone());
            let new_right = make_node(key, value, lr.right.clone(), right);
            make_node(lr.key.clone(), lr.value.clone(), Some(new_left), Some(new_right))
        }
    } else if right_height > left_height + 1 {
        let r = match right {
            Some(r) => r,
            None => hard_fail("right-heavy node without a right child"),
        };
        if height(&r.right) >= height(&r.left) {
            // single left rotation
            let new_left = make_node(key, value, left, r.left.clone());
            make_node(r.key.clone(), r.value.clone(), Some(new_left), r.right.clone())
        } else {
            let rl = match &r.left {
                Some(rl) => rl,
                None => hard_fail("left-leaning node without a left child"),
            };
            let new_left = make_node(key, value, left, rl.left.clone());
            let new_right = make_node(r.key.clone(), r.value.clone(), rl.right.clone(), r.right.clone());
            make_node(rl.key.clone(), rl.value.clone(), Some(new_left), Some(new_right))
        }
    } else {
        make_node(key, value, left, right)
    }
}

fn insert_node<K: Ord + Clone, V: Clone>(link: &Link<K, V>, key: K, value: V) -> Arc<Node<K, V>> {
    let node = match link {
        None => return make_node(key, value, None, None),
        Some(node) => node,
    };
    match key.cmp(&node.key) {
        Ordering::Less => balance(
            node.key.clone(),
            node.value.clone(),
            Some(insert_node(&node.left, key, value)),
            node.right.clone(),
        ),
        Ordering::Greater => balance(
            node.key.clone(),
            node.value.clone(),
            node.left.clone(),
            Some(insert_node(&node.right, key, value)),
        ),
        Ordering::Equal => make_node(key, value, node.left.clone(), node.right.clone()),
    }
}

fn remove_node<K: Ord + Clone, V: Clone>(link: &Link<K, V>, key: &K) -> Link<K, V> {
    let node = match link {
        None => return None,
        Some(node) => node,
    };
    match key.cmp(&node.key) {
        Ordering::Less => Some(balance(
            node.key.clone(),
            node.value.clone(),
            remove_node(&node.left, key),
            node.right.clone(),
        )),
        Ordering::Greater => Some(balance(
            node.key.clone(),
            node.value.clone(),
            node.left.clone(),
            remove_node(&node.right, key),
        )),
        Ordering::Equal => join(node.left.clone(), node.right.clone()),
    }
}

/// Merge the two subtrees of a removed node by pulling up the successor.
fn join<K: Ord + Clone, V: Clone>(left: Link<K, V>, right: Link<K, V>) -> Link<K, V> {
    match (left, right) {
        (None, right) => right,
        (left, None) => left,
        (Some(left), Some(right)) => {
            let (successor_key, successor_value) = min_entry(&right);
            let new_right = remove_min(&right);
            Some(balance(successor_key, successor_value, Some(left), new_right))
        }
    }
}

fn min_entry<K: Clone, V: Clone>(node: &Arc<Node<K, V>>) -> (K, V) {
    let mut current = node;
    while let Some(left) = &current.left {
        current = left;
    }
    (current.key.clone(), current.value.clone())
}

fn remove_min<K: Clone, V: Clone>(node: &Arc<Node<K, V>>) -> Link<K, V> {
    match &node.left {
        None => node.right.clone(),
        Some(left) => Some(balance(
            node.key.clone(),
            node.value.clone(),
            remove_min(left),
            node.right.clone(),
        )),
    }
}
