use core::ptr::NonNull;

use crate::header::Header;
use crate::mem::ALIGN;

type Link = Option<NonNull<TreeNode>>;

/// Header of the best-fit strategy: a node of the size-keyed free tree.
///
/// Equal sizes are allowed; nodes are told apart by address only.
#[repr(C)]
pub(crate) struct TreeNode {
    size: usize,
    left: Link,
    right: Link,
    height: usize,
}

const _: () = assert!(<TreeNode as Header>::SIZE % ALIGN == 0);

unsafe impl Header for TreeNode {
    #[inline]
    fn detached(size: usize) -> Self {
        Self {
            size,
            left: None,
            right: None,
            height: 1,
        }
    }

    #[inline]
    fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn set_size(&mut self, size: usize) {
        self.size = size
    }
}

impl TreeNode {
    #[inline]
    pub(crate) fn reset(&mut self) {
        self.left = None;
        self.right = None;
        self.height = 1;
    }
}

/// Free blocks ordered by payload size in a height-balanced binary tree.
///
/// Sizes smaller than a node go left, everything else (ties included) goes
/// right. After any change each node on the path is re-measured and rotated
/// once when one child is at least two levels taller than the other.
///
/// Only the owning [`BestFit`](crate::BestFit) heap builds and fills a tree;
/// outside the crate it is read through [`BestFit::free_tree`](crate::BestFit::free_tree).
///
/// ```compile_fail
/// let tree = fitalloc::FreeTree::new();
/// ```
///
/// ```compile_fail
/// let tree = fitalloc::FreeTree::default();
/// ```
///
/// ```
/// use fitalloc::prelude::*;
///
/// let mut heap = BestFit::new(MmapSource::new());
/// let ptr = heap.allocate(64);
/// unsafe { heap.free(ptr) };
/// assert_eq!(heap.free_tree().len(), 2);
/// assert!(heap.free_tree().height() >= 1);
/// ```
pub struct FreeTree {
    root: Link,
    len: usize,
}

impl FreeTree {
    pub(crate) const fn new() -> Self {
        Self { root: None, len: 0 }
    }

    /// Number of free blocks in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    #[inline]
    pub fn height(&self) -> usize {
        unsafe { height(self.root) }
    }

    /// Forgets every node. The nodes' memory is left untouched.
    pub(crate) fn clear(&mut self) {
        self.root = None;
        self.len = 0;
    }

    /// ## Safety
    /// `node` must be a detached, valid header that outlives its membership.
    pub(crate) unsafe fn insert(&mut self, node: NonNull<TreeNode>) {
        self.root = Some(unsafe { insert(node, self.root) });
        self.len += 1;
    }

    /// Detaches the smallest block of at least `size` bytes.
    ///
    /// The node found by the search is the node removed: its identity is
    /// carried back up the descent instead of being looked up a second time,
    /// which could land on a same-size twin.
    pub(crate) fn take_best_fit(&mut self, size: usize) -> Option<NonNull<TreeNode>> {
        let (root, best) = unsafe { take_best(self.root, size) };
        let mut best = best?;
        self.root = root;
        self.len -= 1;
        unsafe { best.as_mut().reset() };
        Some(best)
    }

    /// Visits every node's size in ascending order.
    pub(crate) fn for_each(&self, f: &mut dyn FnMut(usize)) {
        unsafe { walk(self.root, f) }
    }
}

impl core::fmt::Debug for FreeTree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FreeTree")
            .field("len", &self.len)
            .field("height", &self.height())
            .finish()
    }
}

#[inline]
unsafe fn height(link: Link) -> usize {
    link.map_or(0, |node| unsafe { node.as_ref().height })
}

#[inline]
unsafe fn update(mut node: NonNull<TreeNode>) {
    let n = unsafe { node.as_mut() };
    n.height = 1 + unsafe { height(n.left).max(height(n.right)) };
}

/// Re-measures `tree` and applies at most one rotation.
///
/// ## Returns
/// The root of the rebalanced subtree.
unsafe fn balance(mut tree: NonNull<TreeNode>) -> NonNull<TreeNode> {
    let t = unsafe { tree.as_mut() };
    let (lh, rh) = unsafe { (height(t.left), height(t.right)) };
    t.height = 1 + lh.max(rh);

    if lh + 1 < rh {
        unsafe { rotate_left(tree) }
    } else if rh + 1 < lh {
        unsafe { rotate_right(tree) }
    } else {
        tree
    }
}

/// Promotes the right child; its former left subtree becomes `tree`'s right.
unsafe fn rotate_left(mut tree: NonNull<TreeNode>) -> NonNull<TreeNode> {
    let t = unsafe { tree.as_mut() };
    let Some(mut right) = t.right else {
        return tree;
    };
    let r = unsafe { right.as_mut() };
    t.right = r.left;
    r.left = Some(tree);

    unsafe {
        update(tree);
        update(right);
    }
    right
}

/// Promotes the left child; its former right subtree becomes `tree`'s left.
unsafe fn rotate_right(mut tree: NonNull<TreeNode>) -> NonNull<TreeNode> {
    let t = unsafe { tree.as_mut() };
    let Some(mut left) = t.left else {
        return tree;
    };
    let l = unsafe { left.as_mut() };
    t.left = l.right;
    l.right = Some(tree);

    unsafe {
        update(tree);
        update(left);
    }
    left
}

unsafe fn insert(node: NonNull<TreeNode>, tree: Link) -> NonNull<TreeNode> {
    let Some(mut root) = tree else {
        return node;
    };
    let r = unsafe { root.as_mut() };
    if unsafe { node.as_ref().size } < r.size {
        r.left = Some(unsafe { insert(node, r.left) });
    } else {
        r.right = Some(unsafe { insert(node, r.right) });
    }
    unsafe { balance(root) }
}

/// Searches `tree` for the smallest node of at least `size` bytes and
/// detaches it.
///
/// A node that fits is the candidate unless its left subtree holds a
/// smaller one; a node that does not fit sends the search right.
///
/// ## Returns
/// (`root`, `best`)
/// - `root`: the new root of the subtree.
/// - `best`: the detached node, `None` if nothing fits. The subtree is then
///   returned untouched.
unsafe fn take_best(tree: Link, size: usize) -> (Link, Link) {
    let Some(mut root) = tree else {
        return (None, None);
    };
    let r = unsafe { root.as_mut() };

    if r.size < size {
        let (right, best) = unsafe { take_best(r.right, size) };
        if best.is_none() {
            return (tree, None);
        }
        r.right = right;
        (Some(unsafe { balance(root) }), best)
    } else {
        let (left, best) = unsafe { take_best(r.left, size) };
        if best.is_none() {
            return (unsafe { detach(root) }, Some(root));
        }
        r.left = left;
        (Some(unsafe { balance(root) }), best)
    }
}

/// Removes `node` from the top of its own subtree.
///
/// With two children the left-most node of the right subtree takes its place.
///
/// ## Returns
/// The root of the remaining subtree.
unsafe fn detach(node: NonNull<TreeNode>) -> Link {
    let (left, right) = unsafe {
        let n = node.as_ref();
        (n.left, n.right)
    };

    match (left, right) {
        (None, rest) | (rest, None) => rest,
        (Some(_), Some(right)) => {
            let (mut successor, rest) = unsafe { take_min(right) };
            let s = unsafe { successor.as_mut() };
            s.left = left;
            s.right = rest;
            Some(unsafe { balance(successor) })
        }
    }
}

/// Detaches the left-most node of `tree`.
///
/// ## Returns
/// (`min`, `rest`): the detached node and the rebalanced remainder.
unsafe fn take_min(mut tree: NonNull<TreeNode>) -> (NonNull<TreeNode>, Link) {
    let t = unsafe { tree.as_mut() };
    match t.left {
        None => (tree, t.right),
        Some(left) => {
            let (min, rest) = unsafe { take_min(left) };
            t.left = rest;
            (min, Some(unsafe { balance(tree) }))
        }
    }
}

unsafe fn walk(link: Link, f: &mut dyn FnMut(usize)) {
    if let Some(node) = link {
        let n = unsafe { node.as_ref() };
        unsafe { walk(n.left, f) };
        f(n.size);
        unsafe { walk(n.right, f) };
    }
}
