//! Intrusive splay tree
//!
//! A self-adjusting binary search tree over nodes embedded in caller-owned
//! objects. The tree never allocates: a [`TreeNode`] lives inside the user
//! struct and the [`TreeAdapter`] converts between the two and orders them.
//!
//! Every access splays the touched key to the root with an iterative
//! top-down splay, so lookups, inserts and removals run in amortized
//! O(log n) and recently used keys stay close to the root.
//!
//! # Example
//!
//! ```
//! use core::cmp::Ordering;
//! use core::ptr::NonNull;
//! use pkit_core::splaytree::{SplayTree, TreeAdapter, TreeNode};
//!
//! struct Entry {
//!     key: u32,
//!     node: TreeNode,
//! }
//!
//! struct ByKey;
//!
//! unsafe impl TreeAdapter for ByKey {
//!     type Object = Entry;
//!     type Key = u32;
//!
//!     fn node_of(obj: NonNull<Entry>) -> NonNull<TreeNode> {
//!         unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*obj.as_ptr()).node)) }
//!     }
//!
//!     unsafe fn object_of(node: NonNull<TreeNode>) -> NonNull<Entry> {
//!         let base = node.as_ptr().byte_sub(core::mem::offset_of!(Entry, node));
//!         NonNull::new_unchecked(base.cast())
//!     }
//!
//!     fn cmp_key(&self, key: &u32, obj: &Entry) -> Ordering {
//!         key.cmp(&obj.key)
//!     }
//!
//!     fn cmp_object(&self, a: &Entry, b: &Entry) -> Ordering {
//!         a.key.cmp(&b.key)
//!     }
//! }
//!
//! let mut entries: Vec<Entry> = (0..4).map(|key| Entry { key, node: TreeNode::new() }).collect();
//! let base = entries.as_mut_ptr();
//! let mut tree = SplayTree::new(ByKey);
//! for i in 0..entries.len() {
//!     unsafe { tree.insert(NonNull::new(base.add(i)).unwrap()).unwrap() };
//! }
//! let found = tree.find(&2).unwrap();
//! assert_eq!(unsafe { found.as_ref().key }, 2);
//! let keys: Vec<u32> = tree.ascending().map(|e| unsafe { e.as_ref().key }).collect();
//! assert_eq!(keys, [0, 1, 2, 3]);
//! tree.clear_all().unwrap();
//! ```

use crate::binstack::BinStack;
use crate::error::{FirstError, KitError, KitResult};
use crate::kwarn;
use core::cmp::Ordering;
use core::marker::PhantomData;
use core::mem::size_of;
use core::ptr::NonNull;

type Link = Option<NonNull<TreeNode>>;

/// Link field embedded in a user object
///
/// Both links are `None` while the node is not in a tree.
#[derive(Debug, Default)]
pub struct TreeNode {
    left: Link,
    right: Link,
}

impl TreeNode {
    pub const fn new() -> Self {
        TreeNode { left: None, right: None }
    }

    /// True when both child links are empty
    #[inline]
    pub fn is_unlinked(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Binds a user object type to the tree
///
/// # Safety
///
/// `object_of(node_of(obj))` must return `obj`, and `node_of` must point at
/// a `TreeNode` stored inside the object. The comparisons must describe a
/// total order that stays fixed while an object is in a tree.
pub unsafe trait TreeAdapter {
    /// The struct embedding a [`TreeNode`]
    type Object;
    /// Lookup key type
    type Key: ?Sized;

    /// Address of the node embedded in `obj`
    fn node_of(obj: NonNull<Self::Object>) -> NonNull<TreeNode>;

    /// Address of the object enclosing `node`
    ///
    /// # Safety
    ///
    /// `node` must have been obtained from [`node_of`](Self::node_of).
    unsafe fn object_of(node: NonNull<TreeNode>) -> NonNull<Self::Object>;

    /// Order `key` against the key of `obj`
    fn cmp_key(&self, key: &Self::Key, obj: &Self::Object) -> Ordering;

    /// Order two objects
    fn cmp_object(&self, a: &Self::Object, b: &Self::Object) -> Ordering;

    /// Destroy an object handed back by [`SplayTree::clear_all`]
    ///
    /// The node is already unlinked. The default keeps the object alive.
    fn delete_object(&self, obj: NonNull<Self::Object>) -> KitResult<()> {
        let _ = obj;
        Ok(())
    }
}

// Raw link accessors; callers guarantee `n` is a live node in this tree.

#[inline]
unsafe fn left(n: NonNull<TreeNode>) -> Link {
    (*n.as_ptr()).left
}

#[inline]
unsafe fn right(n: NonNull<TreeNode>) -> Link {
    (*n.as_ptr()).right
}

#[inline]
unsafe fn set_left(n: NonNull<TreeNode>, l: Link) {
    (*n.as_ptr()).left = l;
}

#[inline]
unsafe fn set_right(n: NonNull<TreeNode>, r: Link) {
    (*n.as_ptr()).right = r;
}

#[inline]
unsafe fn leftmost(mut n: NonNull<TreeNode>) -> NonNull<TreeNode> {
    while let Some(l) = left(n) {
        n = l;
    }
    n
}

#[inline]
unsafe fn rightmost(mut n: NonNull<TreeNode>) -> NonNull<TreeNode> {
    while let Some(r) = right(n) {
        n = r;
    }
    n
}

/// Splay tree over objects bound by adapter `A`
pub struct SplayTree<A: TreeAdapter> {
    root: Link,
    adapter: A,
}

// Safety: the tree only holds pointers into objects the caller handed over;
// moving the tree moves that borrowed access along with it.
unsafe impl<A: TreeAdapter + Send> Send for SplayTree<A> where A::Object: Send {}

impl<A: TreeAdapter> SplayTree<A> {
    pub const fn new(adapter: A) -> Self {
        SplayTree { root: None, adapter }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    #[inline]
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// The object currently at the root
    #[inline]
    pub fn root(&self) -> Option<NonNull<A::Object>> {
        // Safety: every node in the tree came from node_of
        self.root.map(|n| unsafe { A::object_of(n) })
    }

    #[inline]
    fn obj(&self, node: NonNull<TreeNode>) -> &A::Object {
        // Safety: nodes in the tree belong to live objects
        unsafe { A::object_of(node).as_ref() }
    }

    /// Top-down splay of the closest node to a target
    ///
    /// `cmp(node)` orders the target against `node`. Returns the order of
    /// the target against the new root, `None` for an empty tree.
    fn splay_by<F>(root: &mut Link, mut cmp: F) -> Option<Ordering>
    where
        F: FnMut(NonNull<TreeNode>) -> Ordering,
    {
        let mut t = (*root)?;

        // `lower` holds subtrees with keys below the target, chained
        // through their right links; `higher` the ones above, chained
        // through their left links.
        let mut lower_head: Link = None;
        let mut lower_tail: Link = None;
        let mut higher_head: Link = None;
        let mut higher_tail: Link = None;

        let mut order;
        // Safety: all nodes reached from the root are live tree nodes
        unsafe {
            loop {
                order = cmp(t);
                match order {
                    Ordering::Less => {
                        let Some(l) = left(t) else { break };
                        let (top, next) = if cmp(l) == Ordering::Less {
                            // zig-zig: rotate right
                            set_left(t, right(l));
                            set_right(l, Some(t));
                            match left(l) {
                                Some(ll) => (l, ll),
                                None => {
                                    t = l;
                                    break;
                                }
                            }
                        } else {
                            (t, l)
                        };
                        match higher_tail {
                            Some(h) => set_left(h, Some(top)),
                            None => higher_head = Some(top),
                        }
                        higher_tail = Some(top);
                        t = next;
                    }
                    Ordering::Greater => {
                        let Some(r) = right(t) else { break };
                        let (top, next) = if cmp(r) == Ordering::Greater {
                            // zag-zag: rotate left
                            set_right(t, left(r));
                            set_left(r, Some(t));
                            match right(r) {
                                Some(rr) => (r, rr),
                                None => {
                                    t = r;
                                    break;
                                }
                            }
                        } else {
                            (t, r)
                        };
                        match lower_tail {
                            Some(l) => set_right(l, Some(top)),
                            None => lower_head = Some(top),
                        }
                        lower_tail = Some(top);
                        t = next;
                    }
                    Ordering::Equal => break,
                }
            }

            // Reassemble: t's subtrees fill the open slots of the gather lists
            match lower_tail {
                Some(l) => set_right(l, left(t)),
                None => lower_head = left(t),
            }
            match higher_tail {
                Some(h) => set_left(h, right(t)),
                None => higher_head = right(t),
            }
            set_left(t, lower_head);
            set_right(t, higher_head);
        }

        *root = Some(t);
        Some(order)
    }

    fn splay_key(&mut self, key: &A::Key) -> Option<Ordering> {
        let adapter = &self.adapter;
        Self::splay_by(&mut self.root, |n| {
            // Safety: n is a live tree node
            adapter.cmp_key(key, unsafe { A::object_of(n).as_ref() })
        })
    }

    fn splay_node(&mut self, target: NonNull<TreeNode>) -> Option<Ordering> {
        let adapter = &self.adapter;
        // Safety: target belongs to a live object (caller contract)
        let target_obj = unsafe { A::object_of(target).as_ref() };
        Self::splay_by(&mut self.root, |n| {
            // Safety: n is a live tree node
            adapter.cmp_object(target_obj, unsafe { A::object_of(n).as_ref() })
        })
    }

    /// Look up `key`; the matching object (or its closest neighbour on a
    /// miss) becomes the root
    ///
    /// Fails with `NotFound` when no object compares equal.
    pub fn find(&mut self, key: &A::Key) -> KitResult<NonNull<A::Object>> {
        match self.splay_key(key) {
            Some(Ordering::Equal) => self.root().ok_or(KitError::NotFound),
            _ => Err(KitError::NotFound),
        }
    }

    /// Insert `obj`, which becomes the new root
    ///
    /// Fails with `Exists` and leaves the tree unchanged when an equal
    /// object is already present.
    ///
    /// # Safety
    ///
    /// `obj` must be live, must not be in any tree, and must neither move
    /// nor be dropped until it is removed again (or handed to
    /// `delete_object` by [`clear_all`](Self::clear_all)).
    pub unsafe fn insert(&mut self, obj: NonNull<A::Object>) -> KitResult<()> {
        let node = A::node_of(obj);
        debug_assert!(node.as_ref().is_unlinked(), "inserting a linked node");

        let order = match self.splay_node(node) {
            None => {
                set_left(node, None);
                set_right(node, None);
                self.root = Some(node);
                return Ok(());
            }
            Some(order) => order,
        };

        let Some(root) = self.root else {
            return Err(KitError::Invalid);
        };
        match order {
            Ordering::Equal => return Err(KitError::Exists),
            Ordering::Less => {
                set_left(node, left(root));
                set_right(node, Some(root));
                set_left(root, None);
            }
            Ordering::Greater => {
                set_right(node, right(root));
                set_left(node, Some(root));
                set_right(root, None);
            }
        }
        self.root = Some(node);
        Ok(())
    }

    /// Remove `obj` from the tree and unlink its node
    ///
    /// Fails with `NotFound` when `obj` itself is not in this tree.
    ///
    /// # Safety
    ///
    /// `obj` must be live. It may be in this tree or in no tree at all.
    pub unsafe fn remove(&mut self, obj: NonNull<A::Object>) -> KitResult<()> {
        let node = A::node_of(obj);
        if self.splay_node(node) != Some(Ordering::Equal) || self.root != Some(node) {
            return Err(KitError::NotFound);
        }

        self.root = match (left(node), right(node)) {
            (None, r) => r,
            (l, None) => l,
            (Some(l), Some(r)) => {
                // In-order successor takes the removed node's place
                let mut parent = None;
                let mut succ = r;
                while let Some(next) = left(succ) {
                    parent = Some(succ);
                    succ = next;
                }
                if let Some(parent) = parent {
                    set_left(parent, right(succ));
                    set_right(succ, Some(r));
                }
                set_left(succ, Some(l));
                Some(succ)
            }
        };

        set_left(node, None);
        set_right(node, None);
        Ok(())
    }

    /// Empty the tree, handing every object to `delete_object`
    ///
    /// Iterative post-order walk that reuses each node's left link as the
    /// parent stack. Continues past callback failures and returns the first.
    pub fn clear_all(&mut self) -> KitResult<()> {
        let mut first = FirstError::new();
        let mut parent: Link = None;
        let mut next = self.root.take();

        // Safety: the detached tree is exclusively ours until destroyed
        unsafe {
            loop {
                while let Some(n) = next {
                    next = left(n);
                    set_left(n, parent);
                    parent = Some(n);
                }

                let Some(n) = parent else { break };
                if let Some(r) = right(n) {
                    set_right(n, None);
                    next = Some(r);
                    continue;
                }

                parent = left(n);
                set_left(n, None);
                if let Err(e) = self.adapter.delete_object(A::object_of(n)) {
                    kwarn!("splaytree: delete_object failed: {}", e);
                    first.record(e);
                }
            }
        }
        first.into_result()
    }

    /// Check the search-tree order of every node
    ///
    /// Walks the tree without recursion, keeping the pending subtrees with
    /// their key bounds on a temporary [`BinStack`]. A violated bound (which
    /// also catches a node reachable twice) is `Invalid`.
    pub fn invariant_check(&self) -> KitResult<()> {
        #[derive(Clone, Copy)]
        struct Frame {
            node: NonNull<TreeNode>,
            lower: Link,
            upper: Link,
        }

        let Some(root) = self.root else { return Ok(()) };
        let frame_size = size_of::<Frame>();
        let mut stack = BinStack::new(64 * frame_size)?;

        let push = |stack: &mut BinStack, frame: Frame| -> KitResult<()> {
            let slot = stack.push(frame_size)?.cast::<Frame>();
            // Safety: the slot is frame_size bytes, aligned by the push size
            unsafe { slot.as_ptr().write(frame) };
            Ok(())
        };

        push(&mut stack, Frame { node: root, lower: None, upper: None })?;
        while !stack.is_empty() {
            // Safety: the top slot holds the last frame written
            let frame = unsafe { stack.top().cast::<Frame>().as_ptr().read() };
            stack.pop(frame_size)?;

            let obj = self.obj(frame.node);
            if let Some(lower) = frame.lower {
                if self.adapter.cmp_object(self.obj(lower), obj) != Ordering::Less {
                    return Err(KitError::Invalid);
                }
            }
            if let Some(upper) = frame.upper {
                if self.adapter.cmp_object(obj, self.obj(upper)) != Ordering::Less {
                    return Err(KitError::Invalid);
                }
            }

            // Safety: frame.node is a live tree node
            let (l, r) = unsafe { (left(frame.node), right(frame.node)) };
            if let Some(r) = r {
                push(&mut stack, Frame { node: r, lower: Some(frame.node), upper: frame.upper })?;
            }
            if let Some(l) = l {
                push(&mut stack, Frame { node: l, lower: frame.lower, upper: Some(frame.node) })?;
            }
        }
        stack.free()
    }

    /// Iterator positioned before the smallest object
    pub fn iter_first(&self) -> TreeIter<A> {
        // Safety: root is a live tree node
        TreeIter::new(self.root.map(|r| unsafe { leftmost(r) }))
    }

    /// Iterator positioned after the largest object
    pub fn iter_last(&self) -> TreeIter<A> {
        // Safety: root is a live tree node
        TreeIter::new(self.root.map(|r| unsafe { rightmost(r) }))
    }

    /// Borrowing ascending iterator
    pub fn ascending(&mut self) -> Ascending<'_, A> {
        let iter = self.iter_first();
        Ascending { tree: self, iter }
    }

    /// Borrowing descending iterator
    pub fn descending(&mut self) -> Descending<'_, A> {
        let iter = self.iter_last();
        Descending { tree: self, iter }
    }
}

/// Cursor over a [`SplayTree`] that survives removal of returned objects
///
/// Holds no borrow of the tree; each step takes the tree explicitly, so
/// the object returned by the previous step may be removed (or removed and
/// destroyed) before the next one. Objects not yet returned must stay in
/// the tree.
pub struct TreeIter<A: TreeAdapter> {
    next: Link,
    _adapter: PhantomData<fn() -> A>,
}

impl<A: TreeAdapter> TreeIter<A> {
    fn new(next: Link) -> Self {
        TreeIter { next, _adapter: PhantomData }
    }

    /// Next object in ascending order
    ///
    /// Splays the remembered successor to the root and remembers the
    /// leftmost node of its right subtree.
    pub fn next(&mut self, tree: &mut SplayTree<A>) -> Option<NonNull<A::Object>> {
        let node = self.next?;
        tree.splay_node(node);
        debug_assert_eq!(tree.root, Some(node), "iterator successor left the tree");
        // Safety: node is the live root
        self.next = unsafe { right(node).map(|r| leftmost(r)) };
        // Safety: node came from node_of
        Some(unsafe { A::object_of(node) })
    }

    /// Next object in descending order
    pub fn prev(&mut self, tree: &mut SplayTree<A>) -> Option<NonNull<A::Object>> {
        let node = self.next?;
        tree.splay_node(node);
        debug_assert_eq!(tree.root, Some(node), "iterator predecessor left the tree");
        // Safety: node is the live root
        self.next = unsafe { left(node).map(|l| rightmost(l)) };
        // Safety: node came from node_of
        Some(unsafe { A::object_of(node) })
    }
}

pub struct Ascending<'a, A: TreeAdapter> {
    tree: &'a mut SplayTree<A>,
    iter: TreeIter<A>,
}

impl<'a, A: TreeAdapter> Iterator for Ascending<'a, A> {
    type Item = NonNull<A::Object>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next(self.tree)
    }
}

pub struct Descending<'a, A: TreeAdapter> {
    tree: &'a mut SplayTree<A>,
    iter: TreeIter<A>,
}

impl<'a, A: TreeAdapter> Iterator for Descending<'a, A> {
    type Item = NonNull<A::Object>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.prev(self.tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use core::ptr::addr_of_mut;

    struct TestObj {
        key: u32,
        node: TreeNode,
        deleted: Cell<u32>,
    }

    impl TestObj {
        fn new(key: u32) -> Self {
            TestObj { key, node: TreeNode::new(), deleted: Cell::new(0) }
        }
    }

    /// Orders by key; `fail_key` makes delete_object fail for that key
    struct TestAdapter {
        fail_key: Option<u32>,
    }

    unsafe impl TreeAdapter for TestAdapter {
        type Object = TestObj;
        type Key = u32;

        fn node_of(obj: NonNull<TestObj>) -> NonNull<TreeNode> {
            unsafe { NonNull::new_unchecked(addr_of_mut!((*obj.as_ptr()).node)) }
        }

        unsafe fn object_of(node: NonNull<TreeNode>) -> NonNull<TestObj> {
            let base = node.as_ptr().byte_sub(core::mem::offset_of!(TestObj, node));
            NonNull::new_unchecked(base.cast())
        }

        fn cmp_key(&self, key: &u32, obj: &TestObj) -> Ordering {
            key.cmp(&obj.key)
        }

        fn cmp_object(&self, a: &TestObj, b: &TestObj) -> Ordering {
            a.key.cmp(&b.key)
        }

        fn delete_object(&self, obj: NonNull<TestObj>) -> KitResult<()> {
            let obj = unsafe { obj.as_ref() };
            obj.deleted.set(obj.deleted.get() + 1);
            if Some(obj.key) == self.fail_key {
                return Err(KitError::Os(libc::EIO));
            }
            Ok(())
        }
    }

    fn tree() -> SplayTree<TestAdapter> {
        SplayTree::new(TestAdapter { fail_key: None })
    }

    fn objects(keys: impl IntoIterator<Item = u32>) -> Vec<TestObj> {
        keys.into_iter().map(TestObj::new).collect()
    }

    fn ptr(objs: &mut [TestObj], i: usize) -> NonNull<TestObj> {
        unsafe { NonNull::new_unchecked(objs.as_mut_ptr().add(i)) }
    }

    fn key_of(obj: NonNull<TestObj>) -> u32 {
        unsafe { obj.as_ref().key }
    }

    fn root_key(tree: &SplayTree<TestAdapter>) -> Option<u32> {
        tree.root().map(key_of)
    }

    /// Fixed pseudo-random permutation of 0..n
    fn permutation(n: u32) -> Vec<u32> {
        let mut keys: Vec<u32> = (0..n).collect();
        let mut state = 0x2545_f491_u64;
        for i in (1..keys.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            keys.swap(i, (state % (i as u64 + 1)) as usize);
        }
        keys
    }

    #[test]
    fn test_ascending_insert_and_iterate() {
        let mut objs = objects(0..10);
        let mut tree = tree();
        for i in 0..objs.len() {
            unsafe { tree.insert(ptr(&mut objs, i)).unwrap() };
            assert_eq!(root_key(&tree), Some(i as u32));
            tree.invariant_check().unwrap();
        }

        let up: Vec<u32> = tree.ascending().map(key_of).collect();
        assert_eq!(up, (0..10).collect::<Vec<_>>());
        let down: Vec<u32> = tree.descending().map(key_of).collect();
        assert_eq!(down, (0..10).rev().collect::<Vec<_>>());
        tree.invariant_check().unwrap();
    }

    #[test]
    fn test_find_splays_to_root() {
        let mut objs = objects(permutation(100).into_iter().map(|k| k * 2));
        let mut tree = tree();
        for i in 0..objs.len() {
            unsafe { tree.insert(ptr(&mut objs, i)).unwrap() };
        }

        for key in [0u32, 198, 100, 42, 100] {
            let found = tree.find(&key).unwrap();
            assert_eq!(key_of(found), key);
            assert_eq!(root_key(&tree), Some(key));
        }

        // A miss still splays the closest neighbour up
        assert_eq!(tree.find(&51), Err(KitError::NotFound));
        let root = root_key(&tree).unwrap();
        assert!(root == 50 || root == 52);
        tree.invariant_check().unwrap();
    }

    #[test]
    fn test_find_on_empty_tree() {
        let mut tree = tree();
        assert!(tree.is_empty());
        assert_eq!(tree.find(&1), Err(KitError::NotFound));
        assert!(tree.iter_first().next(&mut tree).is_none());
        tree.invariant_check().unwrap();
    }

    #[test]
    fn test_duplicate_insert_leaves_tree_unchanged() {
        let mut objs = objects([5, 3, 8, 5]);
        let mut tree = tree();
        for i in 0..3 {
            unsafe { tree.insert(ptr(&mut objs, i)).unwrap() };
        }

        assert_eq!(unsafe { tree.insert(ptr(&mut objs, 3)) }, Err(KitError::Exists));
        assert!(objs[3].node.is_unlinked());
        let keys: Vec<u32> = tree.ascending().map(key_of).collect();
        assert_eq!(keys, [3, 5, 8]);
    }

    #[test]
    fn test_remove_unlinks_and_rejects_strangers() {
        let mut objs = objects([10, 5, 15, 3, 7, 12, 20, 7]);
        let mut tree = tree();
        for i in 0..7 {
            unsafe { tree.insert(ptr(&mut objs, i)).unwrap() };
        }

        // Same key, different object
        assert_eq!(unsafe { tree.remove(ptr(&mut objs, 7)) }, Err(KitError::NotFound));

        // Node with two children
        unsafe { tree.remove(ptr(&mut objs, 0)).unwrap() };
        assert!(objs[0].node.is_unlinked());
        tree.invariant_check().unwrap();
        assert_eq!(unsafe { tree.remove(ptr(&mut objs, 0)) }, Err(KitError::NotFound));

        let keys: Vec<u32> = tree.ascending().map(key_of).collect();
        assert_eq!(keys, [3, 5, 7, 12, 15, 20]);

        for i in 1..7 {
            unsafe { tree.remove(ptr(&mut objs, i)).unwrap() };
            tree.invariant_check().unwrap();
        }
        assert!(tree.is_empty());
        assert!(objs.iter().all(|o| o.node.is_unlinked()));
    }

    #[test]
    fn test_random_churn_remove_every_second() {
        let keys = permutation(10_000);
        let mut objs = objects(keys.iter().copied());
        let mut tree = tree();
        for i in 0..objs.len() {
            unsafe { tree.insert(ptr(&mut objs, i)).unwrap() };
        }
        tree.invariant_check().unwrap();

        // Remove the even keys while iterating; the returned object goes away
        let mut iter = tree.iter_first();
        while let Some(obj) = iter.next(&mut tree) {
            if key_of(obj) % 2 == 0 {
                unsafe { tree.remove(obj).unwrap() };
            }
        }
        tree.invariant_check().unwrap();

        let remaining: Vec<u32> = tree.ascending().map(key_of).collect();
        assert_eq!(remaining, (0..10_000).filter(|k| k % 2 == 1).collect::<Vec<_>>());

        tree.clear_all().unwrap();
        assert!(tree.is_empty());
        for obj in &objs {
            assert_eq!(obj.deleted.get(), obj.key % 2);
            assert!(obj.node.is_unlinked());
        }
    }

    #[test]
    fn test_descending_removal_while_iterating() {
        let mut objs = objects(permutation(64));
        let mut tree = tree();
        for i in 0..objs.len() {
            unsafe { tree.insert(ptr(&mut objs, i)).unwrap() };
        }

        let mut seen = Vec::new();
        let mut iter = tree.iter_last();
        while let Some(obj) = iter.prev(&mut tree) {
            seen.push(key_of(obj));
            unsafe { tree.remove(obj).unwrap() };
        }
        assert_eq!(seen, (0..64).rev().collect::<Vec<_>>());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_clear_all_reports_first_error_and_continues() {
        let mut objs = objects(permutation(50));
        let mut tree = SplayTree::new(TestAdapter { fail_key: Some(17) });
        for i in 0..objs.len() {
            unsafe { tree.insert(ptr(&mut objs, i)).unwrap() };
        }

        assert_eq!(tree.clear_all(), Err(KitError::Os(libc::EIO)));
        assert!(tree.is_empty());
        assert!(objs.iter().all(|o| o.deleted.get() == 1 && o.node.is_unlinked()));
    }

    #[test]
    fn test_invariant_check_detects_disorder() {
        let mut objs = objects([2, 1, 3]);
        let mut tree = tree();
        for i in 0..3 {
            unsafe { tree.insert(ptr(&mut objs, i)).unwrap() };
        }
        tree.invariant_check().unwrap();

        // Root 3 holds {1, 2} on its left; a root key below them breaks order
        let root = tree.root().unwrap();
        assert_eq!(root_key(&tree), Some(3));
        unsafe { (*root.as_ptr()).key = 0 };
        assert_eq!(tree.invariant_check(), Err(KitError::Invalid));
        unsafe { (*root.as_ptr()).key = 3 };
        tree.invariant_check().unwrap();

        // A node deeper down pushed past the root's bound
        let deep = objs.iter().position(|o| o.key == 1).unwrap();
        let deep = ptr(&mut objs, deep);
        unsafe { (*deep.as_ptr()).key = 7 };
        assert_eq!(tree.invariant_check(), Err(KitError::Invalid));
        unsafe { (*deep.as_ptr()).key = 1 };
        tree.invariant_check().unwrap();
    }

    // ------------------------------------------------------------------
    // Recursive bottom-up splay, used to cross-check the top-down one
    // ------------------------------------------------------------------

    unsafe fn key(n: NonNull<TreeNode>) -> u32 {
        TestAdapter::object_of(n).as_ref().key
    }

    unsafe fn rotate_right(n: NonNull<TreeNode>) -> NonNull<TreeNode> {
        let l = left(n).unwrap();
        set_left(n, right(l));
        set_right(l, Some(n));
        l
    }

    unsafe fn rotate_left(n: NonNull<TreeNode>) -> NonNull<TreeNode> {
        let r = right(n).unwrap();
        set_right(n, left(r));
        set_left(r, Some(n));
        r
    }

    unsafe fn recursive_splay(root: Link, k: u32) -> Link {
        let Some(mut root) = root else { return None };
        if k == key(root) {
            return Some(root);
        }
        if k < key(root) {
            let Some(l) = left(root) else { return Some(root) };
            if k < key(l) {
                set_left(l, recursive_splay(left(l), k));
                root = rotate_right(root);
            } else if k > key(l) {
                set_right(l, recursive_splay(right(l), k));
                if right(l).is_some() {
                    set_left(root, Some(rotate_left(l)));
                }
            }
            if left(root).is_some() { Some(rotate_right(root)) } else { Some(root) }
        } else {
            let Some(r) = right(root) else { return Some(root) };
            if k > key(r) {
                set_right(r, recursive_splay(right(r), k));
                root = rotate_left(root);
            } else if k < key(r) {
                set_left(r, recursive_splay(left(r), k));
                if left(r).is_some() {
                    set_right(root, Some(rotate_right(r)));
                }
            }
            if right(root).is_some() { Some(rotate_left(root)) } else { Some(root) }
        }
    }

    unsafe fn in_order(root: Link, out: &mut Vec<u32>) {
        if let Some(n) = root {
            in_order(left(n), out);
            out.push(key(n));
            in_order(right(n), out);
        }
    }

    /// Copy the shape of the tree over `src` onto the parallel objects in `dst`
    unsafe fn mirror_shape(src: &mut [TestObj], dst: &mut [TestObj]) {
        let base = src.as_mut_ptr() as usize;
        let map = |l: Link, dst: &mut [TestObj]| -> Link {
            l.map(|n| {
                let idx = (TestAdapter::object_of(n).as_ptr() as usize - base) / size_of::<TestObj>();
                TestAdapter::node_of(NonNull::new_unchecked(dst.as_mut_ptr().add(idx)))
            })
        };
        for i in 0..src.len() {
            let l = map(src[i].node.left, dst);
            let r = map(src[i].node.right, dst);
            dst[i].node.left = l;
            dst[i].node.right = r;
        }
    }

    #[test]
    fn test_top_down_matches_recursive_splay() {
        let keys: Vec<u32> = permutation(300).into_iter().map(|k| k * 3).collect();
        let mut objs = objects(keys.iter().copied());
        let mut shadow = objects(keys.iter().copied());
        let mut tree = tree();
        for i in 0..objs.len() {
            unsafe { tree.insert(ptr(&mut objs, i)).unwrap() };
        }

        let expected: Vec<u32> = (0..300).map(|k| k * 3).collect();
        for probe in permutation(900) {
            unsafe {
                mirror_shape(&mut objs, &mut shadow);
                let root_idx = (tree.root().unwrap().as_ptr() as usize - objs.as_ptr() as usize)
                    / size_of::<TestObj>();
                let shadow_root = Some(TestAdapter::node_of(ptr(&mut shadow, root_idx)));

                let _ = tree.find(&probe);
                let shadow_root = recursive_splay(shadow_root, probe);

                // Both splay the last node on the search path
                assert_eq!(root_key(&tree), shadow_root.map(|n| key(n)));

                let mut order = Vec::new();
                in_order(shadow_root, &mut order);
                assert_eq!(order, expected);
            }
        }
        tree.invariant_check().unwrap();
    }
}
