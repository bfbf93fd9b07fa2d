//! Pairing-heap scheduler.
//!
//! Orders the live models by next-event time `tn`. Nodes live in an
//! internal arena with a free list and are addressed by [`HeapHandle`]
//! indices; a handle stays valid from the model's insertion until its
//! scheduler node is destroyed, and the owning model is its only holder.
//!
//! Pop uses the classic multi-pass strategy: merge right siblings pairwise,
//! then fold the resulting list from the right. All operations run in
//! amortized sub-linear time.

use crate::arena::{Id, ModelId};
use crate::error::{Error, SimResult};
use crate::types::Time;

const NIL: u32 = u32::MAX;

/// Opaque index of a scheduler node.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HeapHandle(u32);

struct HeapNode {
    tn: Time,
    id: ModelId,
    prev: u32,
    next: u32,
    child: u32,
}

/// Pairing heap keyed on `tn` with an internal node arena.
pub struct Heap {
    nodes: Vec<HeapNode>,
    root: u32,
    free_list: u32,
    len: usize,
    capacity: usize,
}

impl Heap {
    pub fn with_capacity(capacity: usize) -> SimResult<Self> {
        if capacity == 0 || capacity >= NIL as usize {
            return Err(Error::ArenaOutOfCapacity);
        }

        let mut nodes = Vec::new();
        if nodes.try_reserve_exact(capacity).is_err() {
            return Err(Error::ArenaOutOfMemory);
        }

        Ok(Self {
            nodes,
            root: NIL,
            free_list: NIL,
            len: 0,
            capacity,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.root == NIL
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = NIL;
        self.free_list = NIL;
        self.len = 0;
    }

    /// Allocates a node for `(tn, id)` and merges it with the root.
    pub fn insert(&mut self, tn: Time, id: ModelId) -> HeapHandle {
        let index = if self.free_list != NIL {
            let index = self.free_list;
            self.free_list = self.nodes[index as usize].next;
            self.nodes[index as usize] = HeapNode {
                tn,
                id,
                prev: NIL,
                next: NIL,
                child: NIL,
            };
            index
        } else {
            let index = self.nodes.len() as u32;
            self.nodes.push(HeapNode {
                tn,
                id,
                prev: NIL,
                next: NIL,
                child: NIL,
            });
            index
        };

        self.reinsert(HeapHandle(index));
        HeapHandle(index)
    }

    /// Re-links a detached node (for example one returned by [`Heap::pop`])
    /// back into the heap.
    pub fn reinsert(&mut self, handle: HeapHandle) {
        let elem = handle.0;
        self.nodes[elem as usize].prev = NIL;
        self.nodes[elem as usize].next = NIL;
        self.nodes[elem as usize].child = NIL;

        self.len += 1;

        if self.root == NIL {
            self.root = elem;
        } else {
            self.root = self.merge(elem, self.root);
        }
    }

    /// Returns a detached node to the free list.
    pub fn destroy(&mut self, handle: HeapHandle) {
        if self.len == 0 {
            self.clear();
            return;
        }

        let elem = handle.0;
        self.nodes[elem as usize].prev = NIL;
        self.nodes[elem as usize].child = NIL;
        self.nodes[elem as usize].id = ModelId::default();
        self.nodes[elem as usize].next = self.free_list;
        self.free_list = elem;
    }

    /// Detaches an in-heap node without freeing it. Children of the removed
    /// node are merged back into the heap.
    pub fn remove(&mut self, handle: HeapHandle) {
        let elem = handle.0;

        if elem == self.root {
            self.pop();
            return;
        }

        self.len -= 1;
        self.detach_subheap(elem);

        if self.nodes[elem as usize].child != NIL {
            let merged = self.merge_subheaps(elem);
            self.nodes[elem as usize].child = NIL;
            self.root = self.merge(self.root, merged);
        }
    }

    /// Detaches and returns the minimum node. The node stays allocated; the
    /// caller either reinserts or destroys it.
    pub fn pop(&mut self) -> HeapHandle {
        debug_assert!(self.len > 0);

        self.len -= 1;
        let top = self.root;

        if self.nodes[top as usize].child == NIL {
            self.root = NIL;
        } else {
            self.root = self.merge_subheaps(top);
        }

        let node = &mut self.nodes[top as usize];
        node.child = NIL;
        node.next = NIL;
        node.prev = NIL;

        HeapHandle(top)
    }

    /// Restores heap order after the node's key decreased.
    pub fn decrease(&mut self, handle: HeapHandle) {
        let elem = handle.0;
        if self.nodes[elem as usize].prev == NIL {
            return;
        }

        self.detach_subheap(elem);
        self.root = self.merge(self.root, elem);
    }

    /// Restores heap order after the node's key increased.
    pub fn increase(&mut self, handle: HeapHandle) {
        self.remove(handle);
        self.reinsert(handle);
    }

    /// Unions another heap into this one.
    pub fn merge_heap(&mut self, other: &mut Heap) {
        if other.root == NIL {
            return;
        }

        // Imports the other heap's nodes wholesale; indices shift by our
        // node count.
        let offset = self.nodes.len() as u32;
        let remap = |idx: u32| if idx == NIL { NIL } else { idx + offset };

        for node in other.nodes.drain(..) {
            self.nodes.push(HeapNode {
                tn: node.tn,
                id: node.id,
                prev: remap(node.prev),
                next: remap(node.next),
                child: remap(node.child),
            });
        }

        let other_root = remap(other.root);
        self.root = if self.root == NIL {
            other_root
        } else {
            self.merge(self.root, other_root)
        };
        self.len += other.len;
        self.capacity += other.capacity;

        other.root = NIL;
        other.free_list = NIL;
        other.len = 0;
    }

    pub fn top(&self) -> Option<HeapHandle> {
        if self.root == NIL {
            None
        } else {
            Some(HeapHandle(self.root))
        }
    }

    pub fn tn(&self, handle: HeapHandle) -> Time {
        self.nodes[handle.0 as usize].tn
    }

    pub fn set_tn(&mut self, handle: HeapHandle, tn: Time) {
        self.nodes[handle.0 as usize].tn = tn;
    }

    pub fn id(&self, handle: HeapHandle) -> ModelId {
        self.nodes[handle.0 as usize].id
    }

    fn merge(&mut self, a: u32, b: u32) -> u32 {
        if self.nodes[a as usize].tn < self.nodes[b as usize].tn {
            let a_child = self.nodes[a as usize].child;
            if a_child != NIL {
                self.nodes[a_child as usize].prev = b;
            }

            let b_next = self.nodes[b as usize].next;
            if b_next != NIL {
                self.nodes[b_next as usize].prev = a;
            }

            self.nodes[a as usize].next = b_next;
            self.nodes[b as usize].next = a_child;
            self.nodes[a as usize].child = b;
            self.nodes[b as usize].prev = a;

            return a;
        }

        let b_child = self.nodes[b as usize].child;
        if b_child != NIL {
            self.nodes[b_child as usize].prev = a;
        }

        let a_prev = self.nodes[a as usize].prev;
        if a_prev != NIL && self.nodes[a_prev as usize].child != a {
            self.nodes[a_prev as usize].next = b;
        }

        self.nodes[b as usize].prev = a_prev;
        self.nodes[a as usize].prev = b;
        self.nodes[a as usize].next = b_child;
        self.nodes[b as usize].child = a;

        b
    }

    fn merge_right(&mut self, mut a: u32) -> u32 {
        let mut b = NIL;

        while a != NIL {
            b = self.nodes[a as usize].next;
            if b == NIL {
                return a;
            }

            b = self.merge(a, b);
            a = self.nodes[b as usize].next;
        }

        b
    }

    fn merge_left(&mut self, mut a: u32) -> u32 {
        let mut b = self.nodes[a as usize].prev;
        while b != NIL {
            a = self.merge(b, a);
            b = self.nodes[a as usize].prev;
        }

        a
    }

    fn merge_subheaps(&mut self, a: u32) -> u32 {
        let child = self.nodes[a as usize].child;
        self.nodes[child as usize].prev = NIL;

        let e = self.merge_right(child);
        self.merge_left(e)
    }

    fn detach_subheap(&mut self, elem: u32) {
        let prev = self.nodes[elem as usize].prev;
        let next = self.nodes[elem as usize].next;

        if self.nodes[prev as usize].child == elem {
            self.nodes[prev as usize].child = next;
        } else {
            self.nodes[prev as usize].next = next;
        }

        if next != NIL {
            self.nodes[next as usize].prev = prev;
        }

        self.nodes[elem as usize].prev = NIL;
        self.nodes[elem as usize].next = NIL;
    }
}

/// Thin wrapper pairing the heap with the model-facing protocol: a model is
/// inserted once, popped each time it fires, and reintegrated with its new
/// `tn`.
pub(crate) struct Scheduler {
    heap: Heap,
}

impl Scheduler {
    pub fn with_capacity(capacity: usize) -> SimResult<Self> {
        Ok(Self {
            heap: Heap::with_capacity(capacity)?,
        })
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn insert(&mut self, id: ModelId, tn: Time) -> HeapHandle {
        self.heap.insert(tn, id)
    }

    /// Puts a popped node back with a fresh `tn`.
    pub fn reintegrate(&mut self, handle: HeapHandle, tn: Time) {
        self.heap.set_tn(handle, tn);
        self.heap.reinsert(handle);
    }

    pub fn erase(&mut self, handle: HeapHandle) {
        self.heap.remove(handle);
        self.heap.destroy(handle);
    }

    /// Moves an in-heap node to `tn`, reordering as needed. `model_tn` is
    /// the node's previously scheduled time.
    pub fn update(&mut self, handle: HeapHandle, tn: Time, model_tn: Time) {
        self.heap.set_tn(handle, tn);

        if tn < model_tn {
            self.heap.decrease(handle);
        } else if tn > model_tn {
            self.heap.increase(handle);
        }
    }

    /// Pops every model sharing the current earliest `tn` into `out`.
    ///
    /// The batch is ordered by arena slot index, not by the order the
    /// heap happens to yield equal keys in.
    pub fn pop(&mut self, out: &mut Vec<ModelId>) {
        let t = self.tn();

        out.clear();
        let top = self.heap.pop();
        out.push(self.heap.id(top));

        while !self.heap.is_empty() && t == self.tn() {
            let top = self.heap.pop();
            out.push(self.heap.id(top));
        }

        out.sort_unstable_by_key(|id| id.index());
    }

    /// Earliest scheduled time. Only valid on a non-empty scheduler.
    pub fn tn(&self) -> Time {
        match self.heap.top() {
            Some(handle) => self.heap.tn(handle),
            None => Time::INFINITY,
        }
    }

    pub fn tn_of(&self, handle: HeapHandle) -> Time {
        self.heap.tn(handle)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Id;

    fn id(n: u32) -> ModelId {
        ModelId::from_parts(1, n)
    }

    #[test]
    fn test_insert_pop_ordering() {
        let mut heap = Heap::with_capacity(16).unwrap();
        heap.insert(3.0, id(3));
        heap.insert(1.0, id(1));
        heap.insert(2.0, id(2));

        let mut order = Vec::new();
        while !heap.is_empty() {
            let top = heap.pop();
            order.push(heap.tn(top));
            heap.destroy(top);
        }

        assert_eq!(order, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_pop_returns_model_id() {
        let mut heap = Heap::with_capacity(4).unwrap();
        heap.insert(5.0, id(42));
        let top = heap.pop();
        assert_eq!(heap.id(top), id(42));
    }

    #[test]
    fn test_reinsert_after_pop() {
        let mut heap = Heap::with_capacity(4).unwrap();
        let a = heap.insert(1.0, id(1));
        heap.insert(2.0, id(2));

        let top = heap.pop();
        assert_eq!(top, a);

        heap.set_tn(a, 3.0);
        heap.reinsert(a);

        let next = heap.pop();
        assert_eq!(heap.tn(next), 2.0);
    }

    #[test]
    fn test_decrease_moves_to_front() {
        let mut heap = Heap::with_capacity(8).unwrap();
        heap.insert(1.0, id(1));
        let b = heap.insert(5.0, id(2));
        heap.insert(3.0, id(3));

        heap.set_tn(b, 0.5);
        heap.decrease(b);

        let top = heap.pop();
        assert_eq!(heap.id(top), id(2));
    }

    #[test]
    fn test_increase_moves_back() {
        let mut heap = Heap::with_capacity(8).unwrap();
        let a = heap.insert(1.0, id(1));
        heap.insert(2.0, id(2));

        heap.set_tn(a, 4.0);
        heap.increase(a);

        let top = heap.pop();
        assert_eq!(heap.id(top), id(2));
    }

    #[test]
    fn test_remove_inner_node() {
        let mut heap = Heap::with_capacity(8).unwrap();
        heap.insert(1.0, id(1));
        let b = heap.insert(2.0, id(2));
        heap.insert(3.0, id(3));

        heap.remove(b);
        heap.destroy(b);

        let mut order = Vec::new();
        while !heap.is_empty() {
            let top = heap.pop();
            order.push(heap.tn(top));
            heap.destroy(top);
        }
        assert_eq!(order, vec![1.0, 3.0]);
    }

    #[test]
    fn test_merge_heaps() {
        let mut a = Heap::with_capacity(4).unwrap();
        let mut b = Heap::with_capacity(4).unwrap();
        a.insert(2.0, id(1));
        b.insert(1.0, id(2));
        b.insert(3.0, id(3));

        a.merge_heap(&mut b);
        assert_eq!(a.len(), 3);
        assert!(b.is_empty());

        let top = a.pop();
        assert_eq!(a.id(top), id(2));
    }

    #[test]
    fn test_scheduler_pop_batches_equal_tn() {
        let mut sched = Scheduler::with_capacity(8).unwrap();
        sched.insert(id(2), 1.0);
        sched.insert(id(1), 1.0);
        sched.insert(id(3), 2.0);

        let mut batch = Vec::new();
        sched.pop(&mut batch);

        // Slot order, regardless of insertion order.
        assert_eq!(batch, vec![id(1), id(2)]);
        assert_eq!(sched.len(), 1);
        assert_eq!(sched.tn(), 2.0);
    }

    #[test]
    fn test_scheduler_pop_orders_large_batch_by_slot() {
        let mut sched = Scheduler::with_capacity(16).unwrap();
        for &slot in &[5u32, 0, 3, 7, 1, 6, 2, 4] {
            sched.insert(id(slot), 4.0);
        }

        let mut batch = Vec::new();
        sched.pop(&mut batch);

        let slots: Vec<u32> = batch.iter().map(|m| m.index()).collect();
        assert_eq!(slots, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_scheduler_infinity_when_empty() {
        let sched = Scheduler::with_capacity(2).unwrap();
        assert!(sched.is_empty());
        assert_eq!(sched.tn(), Time::INFINITY);
    }

    #[test]
    fn test_many_inserts_stay_sorted() {
        let mut heap = Heap::with_capacity(128).unwrap();
        let times = [7.0, 3.0, 9.0, 1.0, 4.0, 8.0, 2.0, 6.0, 5.0, 0.0];
        for (i, &t) in times.iter().enumerate() {
            heap.insert(t, id(i as u32));
        }

        let mut prev = Time::NEG_INFINITY;
        while !heap.is_empty() {
            let top = heap.pop();
            let tn = heap.tn(top);
            assert!(tn >= prev);
            prev = tn;
            heap.destroy(top);
        }
    }
}
