//! End-to-end tree construction and copy-GC round trip.
//!
//! Four workers bump-build a large 4-ary tree through one pool, then the
//! main thread drives a `gc()` whose callback deep-copies the tree into the
//! new generation. Workers park on a barrier until verification is done:
//! a thread's arenas are torn down when it exits, so the data they built
//! must be consumed (or copied) while they are still alive.

use std::collections::VecDeque;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;

use genpool::Pool;

const WORKERS: usize = 4;
const NODES_PER_WORKER: usize = 250_000;
const TOTAL_NODES: usize = 1 + WORKERS * NODES_PER_WORKER;

struct TreeNode {
    value: u32,
    children: [*mut TreeNode; 4],
}

struct SendPtr(*mut TreeNode);
unsafe impl Send for SendPtr {}

fn leaf(pool: &Pool, value: u32) -> *mut TreeNode {
    pool.new_object(TreeNode {
        value,
        children: [ptr::null_mut(); 4],
    })
    .expect("tree allocation failed")
    .as_ptr()
}

/// Build a balanced 4-ary subtree of `count` nodes, values
/// `first_value..first_value + count`.
fn build_subtree(pool: &Pool, first_value: u32, count: usize) -> *mut TreeNode {
    let root = leaf(pool, first_value);
    let mut frontier = VecDeque::new();
    frontier.push_back(root);
    let mut made = 1usize;
    while made < count {
        let parent = frontier.pop_front().unwrap();
        for slot in 0..4 {
            if made == count {
                break;
            }
            let child = leaf(pool, first_value + made as u32);
            unsafe { (*parent).children[slot] = child };
            frontier.push_back(child);
            made += 1;
        }
    }
    root
}

/// Iterative traversal: node count, value checksum, max value.
fn checksum(root: *mut TreeNode) -> (usize, u64, u32) {
    let mut stack = vec![root];
    let mut count = 0usize;
    let mut sum = 0u64;
    let mut max = 0u32;
    while let Some(node) = stack.pop() {
        count += 1;
        unsafe {
            sum += u64::from((*node).value);
            max = max.max((*node).value);
            for &child in &(*node).children {
                if !child.is_null() {
                    stack.push(child);
                }
            }
        }
    }
    (count, sum, max)
}

/// Deep-copy `old_root` using default allocations on `pool`.
fn copy_tree(pool: &Pool, old_root: *mut TreeNode) -> *mut TreeNode {
    let new_root = leaf(pool, unsafe { (*old_root).value });
    let mut stack = vec![(old_root, new_root)];
    while let Some((old, new)) = stack.pop() {
        for slot in 0..4 {
            let old_child = unsafe { (*old).children[slot] };
            if !old_child.is_null() {
                let new_child = leaf(pool, unsafe { (*old_child).value });
                unsafe { (*new).children[slot] = new_child };
                stack.push((old_child, new_child));
            }
        }
    }
    new_root
}

/// Build the full tree: root on the calling thread, one subtree per worker.
///
/// Workers hand their subtree over a channel and then park at `done`; they
/// must stay alive (and keep their arenas alive) until the caller has
/// finished with the tree and releases the barrier.
fn build_tree<'scope, 'env>(
    pool: &'env Pool,
    done: &'env Barrier,
    scope: &'scope thread::Scope<'scope, 'env>,
) -> *mut TreeNode {
    let root = leaf(pool, 0);
    let (tx, rx) = mpsc::channel();
    for w in 0..WORKERS {
        let tx = tx.clone();
        scope.spawn(move || {
            let first = 1 + (w * NODES_PER_WORKER) as u32;
            tx.send((w, SendPtr(build_subtree(pool, first, NODES_PER_WORKER))))
                .unwrap();
            done.wait();
        });
    }
    for _ in 0..WORKERS {
        let (slot, sub) = rx.recv().unwrap();
        unsafe { (*root).children[slot] = sub.0 };
    }
    root
}

#[test]
fn test_parallel_tree_build() {
    let pool = Pool::new().unwrap();
    let done = Barrier::new(WORKERS + 1);

    thread::scope(|s| {
        let root = build_tree(&pool, &done, s);

        let (count, _, max) = checksum(root);
        assert_eq!(count, TOTAL_NODES);
        assert!(max <= 1_000_000, "values stay in range, saw {}", max);

        let (primary, temp) = pool.allocated_bytes();
        assert!(primary >= TOTAL_NODES * std::mem::size_of::<TreeNode>());
        assert_eq!(temp, 0);

        done.wait();
    });
}

#[test]
fn test_copy_gc_preserves_structure() {
    let pool = Pool::new().unwrap();
    let done = Barrier::new(WORKERS + 1);

    thread::scope(|s| {
        let root = build_tree(&pool, &done, s);
        let before = checksum(root);
        assert_eq!(before.0, TOTAL_NODES);

        let root_cell = Arc::new(AtomicPtr::new(root));
        let gc_root = Arc::clone(&root_cell);
        pool.register_gc(move |p| {
            let old = gc_root.load(Ordering::Relaxed);
            let new = copy_tree(p, old);
            gc_root.store(new, Ordering::Relaxed);
        });

        // Workers are parked at the barrier: the pool is quiescent.
        pool.gc();

        let new_root = root_cell.load(Ordering::Relaxed);
        assert_ne!(new_root, root, "root must move to the new generation");
        // Pre-GC pointers (root and everything under it) are dead from here
        // on; only the copied tree is traversed.
        let after = checksum(new_root);
        assert_eq!(after, before, "copied tree is isomorphic");

        // The pool holds one tree's worth of bytes, not two, and the old
        // generation was retired.
        let (primary, temp) = pool.allocated_bytes();
        let node_bytes = TOTAL_NODES * std::mem::size_of::<TreeNode>();
        assert!(primary >= node_bytes);
        assert!(primary < 2 * node_bytes);
        assert_eq!(temp, 0);

        done.wait();
    });
}
