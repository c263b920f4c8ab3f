use crate::config::{Config, MAX_LEVEL_LIMIT};
use crate::level::LevelGenerator;
use crate::node::{Arena, Link, Node, NodeId};
use crate::{Error, Result};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::borrow::Borrow;
use std::fmt;
use std::fmt::Write as _;
use tracing::{debug, trace, warn};

/// Enough predecessor slots for the deepest allowed list.
const UPDATE_SLOTS: usize = MAX_LEVEL_LIMIT + 1;

#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The key was already present. The stored value is left untouched.
    AlreadyExists,
}

#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Sorted map over a skip list.
///
/// All state sits behind one reader/writer lock owned by the instance.
/// Mutations take the write side, so at most one insert or delete runs at a
/// time and a reader never sees a half-spliced node. Lookups take the read
/// side and may run in parallel with each other.
pub struct SkipList<K, V, R = StdRng> {
    inner: RwLock<Inner<K, V, R>>,
}

struct Inner<K, V, R> {
    /// Header forward links, one per level `0..=max_level`. In predecessor
    /// arrays the header is spelled `None`.
    head: Vec<Link>,
    arena: Arena<K, V>,
    levels: LevelGenerator<R>,
    max_level: usize,
    /// Highest level index holding a real node. 0 when empty.
    level: usize,
    len: usize,
}

impl<K: Ord, V> SkipList<K, V, StdRng> {
    pub fn new(max_level: usize) -> Result<Self> {
        Self::with_config(Config::new(max_level))
    }

    /// Builds a list drawing levels from `StdRng`, seeded from `config.seed`
    /// when given and from OS entropy otherwise.
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }
}

impl<K: Ord, V, R: RngCore> SkipList<K, V, R> {
    /// Builds a list drawing node heights from `rng`. `config.seed` is ignored.
    pub fn with_rng(config: Config, rng: R) -> Result<Self> {
        config.validate()?;

        let slots = config.max_level + 1;
        let mut head = Vec::new();
        head.try_reserve_exact(slots)
            .map_err(|e| Error::allocation::<Link>(slots, e))?;
        head.resize(slots, None);

        debug!(
            max_level = config.max_level,
            branching = config.branching,
            "created skip list"
        );

        Ok(SkipList {
            inner: RwLock::new(Inner {
                head,
                arena: Arena::new(),
                levels: LevelGenerator::new(rng, config.max_level, config.branching),
                max_level: config.max_level,
                level: 0,
                len: 0,
            }),
        })
    }

    /// Inserts `key` unless it is already present. A duplicate insert keeps
    /// the stored value and reports [`InsertOutcome::AlreadyExists`].
    pub fn insert(&self, key: K, value: V) -> Result<InsertOutcome> {
        self.inner.write().insert(key, value)
    }

    /// Replaces the value stored under `key`, returning the previous one.
    /// Absent keys are left absent.
    pub fn update<Q>(&self, key: &Q, value: V) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut inner = self.inner.write();
        let id = inner.find(key)?;
        Some(inner.arena[id].replace_value(value))
    }

    pub fn search<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.inner.read().find(key).is_some()
    }

    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.search(key)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        V: Clone,
    {
        let inner = self.inner.read();
        inner.find(key).map(|id| inner.arena[id].value().clone())
    }

    pub fn delete<Q>(&self, key: &Q) -> DeleteOutcome
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self.inner.write().unlink(key) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        }
    }

    /// Like [`SkipList::delete`], but hands back the removed value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.inner.write().unlink(key).map(Node::into_value)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.arena.clear();
        inner.head.iter_mut().for_each(|link| *link = None);
        inner.level = 0;
        inner.len = 0;
    }
}

impl<K, V, R> SkipList<K, V, R> {
    pub fn size(&self) -> usize {
        self.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_level(&self) -> usize {
        self.inner.read().max_level
    }

    /// Highest level index currently holding a node.
    pub fn current_level(&self) -> usize {
        self.inner.read().level
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        let inner = self.inner.read();
        inner.chain(0).map(|id| inner.arena[id].key().clone()).collect()
    }

    /// Key/value pairs in ascending key order.
    pub fn entries(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let inner = self.inner.read();
        inner
            .chain(0)
            .map(|id| {
                let node = &inner.arena[id];
                (node.key().clone(), node.value().clone())
            })
            .collect()
    }

    /// Keys present at each active level, level 0 first.
    pub fn levels(&self) -> Vec<Vec<K>>
    where
        K: Clone,
    {
        let inner = self.inner.read();
        (0..=inner.level)
            .map(|level| {
                inner
                    .chain(level)
                    .map(|id| inner.arena[id].key().clone())
                    .collect()
            })
            .collect()
    }

    /// Renders one line per active level, level 0 first.
    pub fn dump(&self) -> String
    where
        K: fmt::Display,
        V: fmt::Display,
    {
        let inner = self.inner.read();
        let mut out = String::new();
        for level in 0..=inner.level {
            let _ = write!(out, "Level {}:", level);
            for id in inner.chain(level) {
                let node = &inner.arena[id];
                let _ = write!(out, " {}: {};", node.key(), node.value());
            }
            out.push('\n');
        }
        out
    }
}

impl<K, V, R> fmt::Display for SkipList<K, V, R>
where
    K: fmt::Display,
    V: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump())
    }
}

impl<K, V, R> fmt::Debug for SkipList<K, V, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("SkipList")
            .field("len", &inner.len)
            .field("level", &inner.level)
            .field("max_level", &inner.max_level)
            .finish()
    }
}

impl<K, V, R> Inner<K, V, R> {
    fn next(&self, at: Link, level: usize) -> Link {
        match at {
            None => self.head[level],
            Some(id) => self.arena[id].next(level),
        }
    }

    fn set_next(&mut self, at: Link, level: usize, link: Link) {
        match at {
            None => self.head[level] = link,
            Some(id) => self.arena[id].set_next(level, link),
        }
    }

    fn key_of<Q>(&self, id: NodeId) -> &Q
    where
        K: Borrow<Q>,
        Q: ?Sized,
    {
        Borrow::<Q>::borrow(self.arena[id].key())
    }

    fn chain(&self, level: usize) -> Chain<'_, K, V, R> {
        Chain {
            inner: self,
            level,
            current: self.head[level],
        }
    }
}

impl<K: Ord, V, R: RngCore> Inner<K, V, R> {
    /// Walks down from the top level and returns the level-0 successor of
    /// the last node whose key is below `key`.
    fn lower_bound<Q>(&self, key: &Q) -> Link
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut current: Link = None;
        for level in (0..=self.level).rev() {
            while let Some(next) = self.next(current, level) {
                if self.key_of::<Q>(next) < key {
                    current = Some(next);
                } else {
                    break;
                }
            }
        }
        self.next(current, 0)
    }

    /// Same descent as `lower_bound`, also recording in `update[level]` the
    /// last node visited at each level.
    fn lower_bound_with_updates<Q>(&self, key: &Q, update: &mut [Link; UPDATE_SLOTS]) -> Link
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut current: Link = None;
        for level in (0..=self.level).rev() {
            while let Some(next) = self.next(current, level) {
                if self.key_of::<Q>(next) < key {
                    current = Some(next);
                } else {
                    break;
                }
            }
            update[level] = current;
        }
        self.next(current, 0)
    }

    fn find<Q>(&self, key: &Q) -> Option<NodeId>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if self.len == 0 {
            return None;
        }
        self.lower_bound(key)
            .filter(|&id| self.key_of::<Q>(id) == key)
    }

    fn insert(&mut self, key: K, value: V) -> Result<InsertOutcome> {
        let mut update: [Link; UPDATE_SLOTS] = [None; UPDATE_SLOTS];
        if let Some(id) = self.lower_bound_with_updates(&key, &mut update) {
            if *self.arena[id].key() == key {
                return Ok(InsertOutcome::AlreadyExists);
            }
        }

        let height = self.levels.random_level();
        let id = Node::new(key, value, height)
            .and_then(|node| self.arena.alloc(node))
            .map_err(|e| {
                warn!(error = %e, height, "node allocation failed");
                e
            })?;

        if height > self.level {
            // Levels above the old top have only the header in front of them.
            for slot in &mut update[self.level + 1..=height] {
                *slot = None;
            }
            trace!(from = self.level, to = height, "raised top level");
            self.level = height;
        }

        for level in 0..=height {
            let next = self.next(update[level], level);
            self.arena[id].set_next(level, next);
            self.set_next(update[level], level, Some(id));
        }

        self.len += 1;
        Ok(InsertOutcome::Inserted)
    }

    fn unlink<Q>(&mut self, key: &Q) -> Option<Node<K, V>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if self.len == 0 {
            return None;
        }

        let mut update: [Link; UPDATE_SLOTS] = [None; UPDATE_SLOTS];
        let target = self
            .lower_bound_with_updates(key, &mut update)
            .filter(|&id| self.key_of::<Q>(id) == key)?;

        // Every active level is checked on its own; a mismatch at one level
        // says nothing about the levels above it.
        for level in 0..=self.level {
            if self.next(update[level], level) == Some(target) {
                let next = self.arena[target].next(level);
                self.set_next(update[level], level, next);
            }
        }

        let top = self.level;
        while self.level > 0 && self.head[self.level].is_none() {
            self.level -= 1;
        }
        if self.level != top {
            trace!(from = top, to = self.level, "lowered top level");
        }

        self.len -= 1;
        Some(self.arena.release(target))
    }
}

struct Chain<'a, K, V, R> {
    inner: &'a Inner<K, V, R>,
    level: usize,
    current: Link,
}

impl<K, V, R> Iterator for Chain<'_, K, V, R> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        self.current = self.inner.arena[id].next(self.level);
        Some(id)
    }
}

#[cfg(test)]
impl<K: Ord + fmt::Debug, V, R> SkipList<K, V, R> {
    /// Panics unless every structural invariant holds.
    fn assert_invariants(&self) {
        let inner = self.inner.read();
        assert!(inner.level <= inner.max_level);
        assert_eq!(inner.arena.live(), inner.len);

        let bottom: Vec<NodeId> = inner.chain(0).collect();
        assert_eq!(bottom.len(), inner.len);

        for level in 0..=inner.max_level {
            let chain: Vec<NodeId> = inner.chain(level).collect();
            if level > inner.level {
                assert!(chain.is_empty(), "level {} above top is linked", level);
                continue;
            }
            if level > 0 && level == inner.level {
                assert!(!chain.is_empty(), "top level {} is empty", level);
            }

            for pair in chain.windows(2) {
                assert!(
                    inner.arena[pair[0]].key() < inner.arena[pair[1]].key(),
                    "level {} out of order",
                    level
                );
            }

            for &id in &chain {
                assert!(inner.arena[id].height() >= level);
            }
        }

        // A node of height h must be reachable at every level up to h.
        for &id in &bottom {
            for level in 0..=inner.arena[id].height() {
                assert!(
                    inner.chain(level).any(|other| other == id),
                    "node {:?} missing at level {}",
                    inner.arena[id].key(),
                    level
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::testing::ScriptedRng;

    fn scripted(max_level: usize, heights: &[usize]) -> SkipList<i32, &'static str, ScriptedRng> {
        SkipList::with_rng(
            Config::new(max_level),
            ScriptedRng::from_heights(max_level, heights),
        )
        .unwrap()
    }

    #[test]
    fn test_new() {
        let list: SkipList<i32, i32> = SkipList::new(6).unwrap();
        assert_eq!(list.len(), 0);
        assert!(list.is_empty());
        assert_eq!(list.max_level(), 6);
        assert_eq!(list.current_level(), 0);
        list.assert_invariants();
    }

    #[test]
    fn test_invalid_max_level() {
        let result: Result<SkipList<i32, i32>> = SkipList::new(0);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_insert_and_search() {
        let list = SkipList::new(6).unwrap();
        assert_eq!(list.insert(1, "one").unwrap(), InsertOutcome::Inserted);
        assert_eq!(list.insert(2, "two").unwrap(), InsertOutcome::Inserted);
        assert_eq!(list.insert(3, "three").unwrap(), InsertOutcome::Inserted);

        assert!(list.search(&1));
        assert!(list.search(&2));
        assert!(list.search(&3));
        assert!(!list.search(&4));
        assert!(list.contains_key(&3));
        assert!(!list.contains_key(&0));
        assert_eq!(list.get(&2), Some("two"));
        list.assert_invariants();
    }

    #[test]
    fn test_duplicate_keeps_value() {
        let list = SkipList::new(6).unwrap();
        assert_eq!(list.insert(1, "one").unwrap(), InsertOutcome::Inserted);
        assert_eq!(list.insert(1, "ONE").unwrap(), InsertOutcome::AlreadyExists);

        assert_eq!(list.get(&1), Some("one"));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_update() {
        let list = SkipList::new(6).unwrap();
        list.insert(1, "one").unwrap();

        assert_eq!(list.update(&1, "ONE"), Some("one"));
        assert_eq!(list.get(&1), Some("ONE"));
        assert_eq!(list.update(&2, "two"), None);
        assert!(!list.search(&2));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_search_empty() {
        let list: SkipList<i32, i32> = SkipList::new(4).unwrap();
        assert!(!list.search(&1));
        assert_eq!(list.get(&1), None);
        assert_eq!(list.delete(&1), DeleteOutcome::NotFound);
    }

    #[test]
    fn test_delete() {
        let list = SkipList::new(6).unwrap();
        list.insert(1, "one").unwrap();
        list.insert(2, "two").unwrap();
        list.insert(3, "three").unwrap();

        assert_eq!(list.delete(&2), DeleteOutcome::Deleted);
        assert_eq!(list.len(), 2);
        assert!(!list.search(&2));
        assert!(list.search(&1));
        assert!(list.search(&3));

        assert_eq!(list.delete(&2), DeleteOutcome::NotFound);
        assert_eq!(list.len(), 2);
        list.assert_invariants();
    }

    #[test]
    fn test_remove_returns_value() {
        let list = SkipList::new(6).unwrap();
        list.insert(7, "seven").unwrap();
        assert_eq!(list.remove(&7), Some("seven"));
        assert_eq!(list.remove(&7), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_borrowed_lookup() {
        let list: SkipList<String, u32> = SkipList::new(8).unwrap();
        list.insert("beta".to_string(), 2).unwrap();
        list.insert("alpha".to_string(), 1).unwrap();

        assert!(list.search("alpha"));
        assert_eq!(list.get("beta"), Some(2));
        assert_eq!(list.delete("alpha"), DeleteOutcome::Deleted);
        assert_eq!(list.keys(), vec!["beta".to_string()]);
    }

    #[test]
    fn test_scripted_shape() {
        let list = scripted(4, &[1, 3, 2, 1]);
        list.insert(10, "a").unwrap();
        list.insert(20, "b").unwrap();
        list.insert(30, "c").unwrap();
        list.insert(40, "d").unwrap();

        assert_eq!(list.current_level(), 3);
        assert_eq!(
            list.levels(),
            vec![
                vec![10, 20, 30, 40],
                vec![10, 20, 30, 40],
                vec![20, 30],
                vec![20],
            ]
        );
        list.assert_invariants();
    }

    #[test]
    fn test_delete_tallest_unlinks_every_level() {
        let list = scripted(4, &[1, 4, 2]);
        list.insert(10, "a").unwrap();
        list.insert(20, "b").unwrap();
        list.insert(30, "c").unwrap();
        assert_eq!(list.current_level(), 4);

        assert_eq!(list.delete(&20), DeleteOutcome::Deleted);
        assert_eq!(list.current_level(), 2);
        assert_eq!(
            list.levels(),
            vec![vec![10, 30], vec![10, 30], vec![30]]
        );
        list.assert_invariants();

        assert_eq!(list.delete(&30), DeleteOutcome::Deleted);
        assert_eq!(list.current_level(), 1);
        assert_eq!(list.delete(&10), DeleteOutcome::Deleted);
        assert_eq!(list.current_level(), 0);
        assert_eq!(list.levels(), vec![Vec::<i32>::new()]);
        list.assert_invariants();
    }

    #[test]
    fn test_level_only_rises_on_taller_insert() {
        let list = scripted(5, &[2, 1, 1, 3]);
        list.insert(5, "a").unwrap();
        assert_eq!(list.current_level(), 2);
        list.insert(6, "b").unwrap();
        list.insert(4, "c").unwrap();
        assert_eq!(list.current_level(), 2);
        assert_eq!(list.insert(6, "dup").unwrap(), InsertOutcome::AlreadyExists);
        assert_eq!(list.current_level(), 2);
        list.insert(7, "d").unwrap();
        assert_eq!(list.current_level(), 3);
    }

    #[test]
    fn test_duplicate_does_not_draw_level() {
        // Only two heights are scripted; a third draw would exhaust the source.
        let list = scripted(3, &[1, 2]);
        list.insert(1, "a").unwrap();
        assert_eq!(list.insert(1, "b").unwrap(), InsertOutcome::AlreadyExists);
        list.insert(2, "c").unwrap();
        assert_eq!(list.levels()[2], vec![2]);
    }

    #[test]
    fn test_dump() {
        let list = scripted(3, &[1, 2]);
        list.insert(3, "Third").unwrap();
        list.insert(1, "First").unwrap();

        let expected = "Level 0: 1: First; 3: Third;\n\
                        Level 1: 1: First; 3: Third;\n\
                        Level 2: 1: First;\n";
        assert_eq!(list.dump(), expected);
        assert_eq!(list.to_string(), expected);
    }

    #[test]
    fn test_dump_empty() {
        let list: SkipList<i32, i32> = SkipList::new(3).unwrap();
        assert_eq!(list.dump(), "Level 0:\n");
    }

    #[test]
    fn test_clear() {
        let list = SkipList::new(6).unwrap();
        for i in 0..50 {
            list.insert(i, i * 10).unwrap();
        }
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.current_level(), 0);
        assert!(!list.search(&10));
        list.assert_invariants();

        list.insert(3, 30).unwrap();
        assert_eq!(list.entries(), vec![(3, 30)]);
        list.assert_invariants();
    }

    #[test]
    fn test_max_level_one() {
        let list = SkipList::new(1).unwrap();
        for i in (0..100).rev() {
            list.insert(i, ()).unwrap();
        }
        assert_eq!(list.current_level(), 1);
        assert_eq!(list.keys(), (0..100).collect::<Vec<_>>());
        list.assert_invariants();
    }

    #[test]
    fn test_seeded_lists_share_shape() {
        let config = Config::new(12).with_seed(99);
        let a = SkipList::with_config(config.clone()).unwrap();
        let b = SkipList::with_config(config).unwrap();
        for i in 0..500 {
            a.insert(i, ()).unwrap();
            b.insert(i, ()).unwrap();
        }
        assert_eq!(a.levels(), b.levels());
    }

    #[test]
    fn test_debug() {
        let list = SkipList::new(6).unwrap();
        list.insert(1, 1).unwrap();
        let rendered = format!("{:?}", list);
        assert!(rendered.contains("len: 1"));
        assert!(rendered.contains("max_level: 6"));
    }

    #[cfg(test)]
    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        #[derive(Debug, Clone)]
        enum Op {
            Insert(i32, i32),
            Delete(i32),
            Update(i32, i32),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0i32..200, any::<i32>()).prop_map(|(k, v)| Op::Insert(k, v)),
                (0i32..200).prop_map(Op::Delete),
                (0i32..200, any::<i32>()).prop_map(|(k, v)| Op::Update(k, v)),
            ]
        }

        proptest! {
            #[test]
            fn prop_matches_btreemap(ops in prop::collection::vec(op(), 0..400), seed in any::<u64>()) {
                let list = SkipList::with_config(Config::new(8).with_seed(seed)).unwrap();
                let mut expected = BTreeMap::new();

                for op in ops {
                    match op {
                        Op::Insert(k, v) => {
                            let outcome = list.insert(k, v).unwrap();
                            if expected.contains_key(&k) {
                                prop_assert_eq!(outcome, InsertOutcome::AlreadyExists);
                            } else {
                                prop_assert_eq!(outcome, InsertOutcome::Inserted);
                                expected.insert(k, v);
                            }
                        }
                        Op::Delete(k) => {
                            let outcome = list.delete(&k);
                            let was_present = expected.remove(&k).is_some();
                            prop_assert_eq!(outcome == DeleteOutcome::Deleted, was_present);
                        }
                        Op::Update(k, v) => {
                            let previous = list.update(&k, v);
                            let expected_previous = expected.get_mut(&k).map(|slot| std::mem::replace(slot, v));
                            prop_assert_eq!(previous, expected_previous);
                        }
                    }
                    prop_assert!(list.current_level() <= list.max_level());
                }

                list.assert_invariants();
                let items: Vec<_> = expected.iter().map(|(k, v)| (*k, *v)).collect();
                prop_assert_eq!(list.entries(), items);
                prop_assert_eq!(list.size(), expected.len());

                for k in 0..200 {
                    prop_assert_eq!(list.search(&k), expected.contains_key(&k));
                }
            }

            #[test]
            fn prop_len_matches_distinct_keys(keys in prop::collection::vec(0i32..1000, 0..500)) {
                let list = SkipList::new(10).unwrap();
                let mut unique = std::collections::HashSet::new();

                for key in keys {
                    let outcome = list.insert(key, key).unwrap();
                    prop_assert_eq!(outcome == InsertOutcome::Inserted, unique.insert(key));
                }

                prop_assert_eq!(list.len(), unique.len());
                list.assert_invariants();
            }
        }
    }
}
