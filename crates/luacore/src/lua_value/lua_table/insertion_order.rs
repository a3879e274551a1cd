//! Insertion-order list threaded through the hash part.
//!
//! Every node that has been given a key sits in the list until its slot is reused,
//! dead (nil-valued) nodes included. Traversal follows this list, so the hash part
//! iterates in insertion order.

use super::LuaTable;

impl LuaTable {
    /// Unlink node `i`; a node that is not linked is left alone
    pub(super) fn disconnect_node(&self, i: usize) {
        let node = &self.node[i];
        let prev = node.order_prev.take();
        let next = node.order_next.take();
        let me = Some(i as u32);

        match prev {
            Some(p) => self.node[p as usize].order_next.set(next),
            None if self.first_added.get() == me => self.first_added.set(next),
            None => {}
        }
        match next {
            Some(n) => self.node[n as usize].order_prev.set(prev),
            None if self.last_added.get() == me => self.last_added.set(prev),
            None => {}
        }
    }

    /// Link node `i` at the tail
    pub(super) fn append_node(&self, i: usize) {
        let me = Some(i as u32);
        debug_assert_ne!(self.last_added.get(), me);
        let node = &self.node[i];
        node.order_prev.set(self.last_added.get());
        node.order_next.set(None);
        match self.last_added.get() {
            Some(last) => self.node[last as usize].order_next.set(me),
            None => self.first_added.set(me),
        }
        self.last_added.set(me);
    }

    /// A dead node reached through a lookup moves to the tail
    pub(super) fn relocate_if_dead(&self, i: usize) {
        if !self.node[i].value.is_nil() {
            return;
        }
        self.disconnect_node(i);
        self.append_node(i);
    }

    /// Node `from` moved to the unlinked slot `to`: hand over its list position
    pub(super) fn transplant_links(&self, from: usize, to: usize) {
        let prev = self.node[from].order_prev.take();
        let next = self.node[from].order_next.take();
        let from_id = Some(from as u32);
        let to_id = Some(to as u32);

        self.node[to].order_prev.set(prev);
        self.node[to].order_next.set(next);
        match prev {
            Some(p) => self.node[p as usize].order_next.set(to_id),
            None if self.first_added.get() == from_id => self.first_added.set(to_id),
            None => {}
        }
        match next {
            Some(n) => self.node[n as usize].order_prev.set(to_id),
            None if self.last_added.get() == from_id => self.last_added.set(to_id),
            None => {}
        }
    }

    /// Node indices in list order
    pub(super) fn order_indices(&self) -> OrderIter<'_> {
        OrderIter {
            table: self,
            cur: self.first_added.get(),
        }
    }
}

pub(super) struct OrderIter<'a> {
    table: &'a LuaTable,
    cur: Option<u32>,
}

impl Iterator for OrderIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let i = self.cur? as usize;
        self.cur = self.table.node[i].order_next.get();
        Some(i)
    }
}
