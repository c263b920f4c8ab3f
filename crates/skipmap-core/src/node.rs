use crate::{Error, Result};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Handle to a node slot inside an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

pub(crate) type Link = Option<NodeId>;

pub(crate) struct Node<K, V> {
    key: K,
    value: V,
    forward: Vec<Link>,
}

impl<K, V> Node<K, V> {
    /// A node of height `h` has `h + 1` forward links, one for each of the
    /// levels `0..=h`.
    pub(crate) fn new(key: K, value: V, height: usize) -> Result<Self> {
        let mut forward = Vec::new();
        forward
            .try_reserve_exact(height + 1)
            .map_err(|e| Error::allocation::<Link>(height + 1, e))?;
        forward.resize(height + 1, None);

        Ok(Node {
            key,
            value,
            forward,
        })
    }

    pub(crate) fn height(&self) -> usize {
        self.forward.len() - 1
    }

    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    pub(crate) fn value(&self) -> &V {
        &self.value
    }

    pub(crate) fn replace_value(&mut self, value: V) -> V {
        std::mem::replace(&mut self.value, value)
    }

    pub(crate) fn into_value(self) -> V {
        self.value
    }

    pub(crate) fn next(&self, level: usize) -> Link {
        self.forward.get(level).copied().flatten()
    }

    pub(crate) fn set_next(&mut self, level: usize, link: Link) {
        debug_assert!(level <= self.height());
        self.forward[level] = link;
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Node<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("height", &self.height())
            .finish()
    }
}

/// Slot table owning every node of a skip list.
///
/// Vacated slots are kept on a free list and handed out again by later
/// allocations. The free list always has room for every slot, so releasing a
/// node never allocates.
pub(crate) struct Arena<K, V> {
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
}

impl<K, V> Arena<K, V> {
    pub(crate) fn new() -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn alloc(&mut self, node: Node<K, V>) -> Result<NodeId> {
        if let Some(index) = self.free.pop() {
            debug_assert!(self.slots[index].is_none());
            self.slots[index] = Some(node);
            return Ok(NodeId(index));
        }

        self.slots
            .try_reserve(1)
            .map_err(|e| Error::allocation::<Option<Node<K, V>>>(1, e))?;
        let needed = self.slots.len() + 1 - self.free.len();
        self.free
            .try_reserve(needed)
            .map_err(|e| Error::allocation::<usize>(needed, e))?;

        self.slots.push(Some(node));
        Ok(NodeId(self.slots.len() - 1))
    }

    pub(crate) fn release(&mut self, id: NodeId) -> Node<K, V> {
        match self.slots.get_mut(id.0).and_then(Option::take) {
            Some(node) => {
                self.free.push(id.0);
                node
            }
            None => panic!("releasing vacant node slot {}", id.0),
        }
    }

    /// Number of occupied slots.
    #[cfg(test)]
    pub(crate) fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

impl<K, V> Index<NodeId> for Arena<K, V> {
    type Output = Node<K, V>;

    fn index(&self, id: NodeId) -> &Self::Output {
        match self.slots.get(id.0) {
            Some(Some(node)) => node,
            _ => panic!("accessing vacant node slot {}", id.0),
        }
    }
}

impl<K, V> IndexMut<NodeId> for Arena<K, V> {
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        match self.slots.get_mut(id.0) {
            Some(Some(node)) => node,
            _ => panic!("accessing vacant node slot {}", id.0),
        }
    }
}
