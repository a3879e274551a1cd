mod insertion_order;
mod node;

use std::cell::Cell;
use std::mem;

use crate::gc::{BlockKind, GcHost, GcId, GcOwner};
use crate::lua_value::{LuaString, LuaValue};
use crate::lua_vm::lua_limits::{MAX_INT, MAXABITS, MAXASIZE, MAXBITS};
use crate::{LuaError, LuaResult};

pub(crate) use node::Node;
use node::{ceil_log2, main_position};

/// Lua table: an array part for keys `1..=array.len()` plus a chained scatter hash part
/// (Brent's variation) that remembers insertion order.
///
/// Main invariant of the hash part: if a key is not in its main position, the node
/// occupying that main position holds a key whose main position it is.
/// An empty hash part is represented by an empty node vector and is never written.
#[derive(Debug, Default)]
pub struct LuaTable {
    array: Vec<LuaValue>,
    node: Vec<Node>,
    /// Free slots are searched below this index
    last_free: usize,
    first_added: Cell<Option<u32>>,
    last_added: Cell<Option<u32>>,
    metatable: Option<GcId>,
}

/// Storage cell of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Array(usize),
    Node(usize),
}

/// Where a traversal resumes
enum Resume {
    Start,
    Array(usize),
    Node(usize),
}

impl LuaTable {
    /// An empty table; both parts are empty and nothing is allocated
    pub fn new() -> Self {
        Self::default()
    }

    /// A table pre-sized for `narray` sequential and `nhash` other entries
    pub fn with_capacity(gc: &mut dyn GcHost, narray: usize, nhash: usize) -> LuaResult<Self> {
        let mut t = Self::new();
        if narray > 0 || nhash > 0 {
            t.resize(gc, narray, nhash)?;
        }
        Ok(t)
    }

    #[inline(always)]
    pub fn array_size(&self) -> usize {
        self.array.len()
    }

    /// Hash part capacity; zero for the shared empty hash part
    #[inline(always)]
    pub fn node_size(&self) -> usize {
        self.node.len()
    }

    #[inline(always)]
    fn is_dummy(&self) -> bool {
        self.node.is_empty()
    }

    pub fn metatable(&self) -> Option<GcId> {
        self.metatable
    }

    pub fn set_metatable(&mut self, gc: &mut dyn GcHost, metatable: Option<GcId>) {
        if let Some(mt) = metatable {
            gc.barrier_back(GcOwner::Table(self), &LuaValue::Object(mt));
        }
        self.metatable = metatable;
    }

    // ============ Lookup ============

    #[inline(always)]
    fn main_position_of(&self, key: &LuaValue) -> Option<usize> {
        if self.is_dummy() {
            None
        } else {
            Some(main_position(key, self.node.len()))
        }
    }

    /// Walk the collision chain of `key`; dead keys still match
    fn find_node(&self, key: &LuaValue) -> Option<usize> {
        let mut idx = self.main_position_of(key)?;
        loop {
            let n = &self.node[idx];
            if n.key == *key {
                return Some(idx);
            }
            idx = n.chain? as usize;
        }
    }

    #[inline(always)]
    fn array_index(&self, key: &LuaValue) -> Option<usize> {
        let k = key.as_integer()?;
        if k >= 1 && (k as u64) <= self.array.len() as u64 {
            Some(k as usize - 1)
        } else {
            None
        }
    }

    /// Locate the cell of `key` without creating it.
    /// A dead hash node found on the way is moved to the tail of the insertion order.
    fn find_slot(&self, key: &LuaValue) -> Option<Slot> {
        if let Some(i) = self.array_index(key) {
            return Some(Slot::Array(i));
        }
        if key.is_nil() {
            return None;
        }
        let idx = self.find_node(key)?;
        self.relocate_if_dead(idx);
        Some(Slot::Node(idx))
    }

    #[inline(always)]
    fn slot_ref(&self, slot: Slot) -> &LuaValue {
        match slot {
            Slot::Array(i) => &self.array[i],
            Slot::Node(i) => &self.node[i].value,
        }
    }

    #[inline(always)]
    fn slot_mut(&mut self, slot: Slot) -> &mut LuaValue {
        match slot {
            Slot::Array(i) => &mut self.array[i],
            Slot::Node(i) => &mut self.node[i].value,
        }
    }

    /// Raw get; `None` when the key is absent or maps to nil
    pub fn raw_get(&self, key: &LuaValue) -> Option<LuaValue> {
        let v = self.slot_ref(self.find_slot(key)?);
        if v.is_nil() { None } else { Some(v.clone()) }
    }

    pub fn get_int(&self, key: i64) -> Option<LuaValue> {
        if key >= 1 && (key as u64) <= self.array.len() as u64 {
            let v = &self.array[key as usize - 1];
            return if v.is_nil() { None } else { Some(v.clone()) };
        }
        let idx = self.find_node(&LuaValue::integer(key))?;
        self.relocate_if_dead(idx);
        let v = &self.node[idx].value;
        if v.is_nil() { None } else { Some(v.clone()) }
    }

    /// Lookup specialized for strings: short strings are matched by identity
    pub fn get_str(&self, key: &LuaString) -> Option<LuaValue> {
        if !key.is_short() {
            return self.raw_get(&LuaValue::String(key.clone()));
        }
        let mut idx = self.main_position_of(&LuaValue::String(key.clone()))?;
        loop {
            let n = &self.node[idx];
            if let LuaValue::String(s) = &n.key {
                if s.ptr_eq(key) {
                    self.relocate_if_dead(idx);
                    return if n.value.is_nil() { None } else { Some(n.value.clone()) };
                }
            }
            idx = n.chain? as usize;
        }
    }

    // ============ Update ============

    fn check_key(key: &LuaValue) -> LuaResult<()> {
        match key {
            LuaValue::Nil => Err(LuaError::NilIndex),
            LuaValue::Number(n) if n.is_nan() => Err(LuaError::NanIndex),
            _ => Ok(()),
        }
    }

    /// The cell of `key`, created when missing.
    /// The caller stores into it and owes the collector a barrier for the stored value.
    pub fn set_cell(&mut self, gc: &mut dyn GcHost, key: &LuaValue) -> LuaResult<&mut LuaValue> {
        Self::check_key(key)?;
        let slot = match self.find_slot(key) {
            Some(slot) => slot,
            None => self.new_key(gc, key)?,
        };
        Ok(self.slot_mut(slot))
    }

    /// Raw set with barrier. Assigning nil to a missing key creates nothing.
    pub fn raw_set(&mut self, gc: &mut dyn GcHost, key: &LuaValue, value: LuaValue) -> LuaResult<()> {
        Self::check_key(key)?;
        let slot = match self.find_slot(key) {
            Some(slot) => slot,
            None if value.is_nil() => return Ok(()),
            None => self.new_key(gc, key)?,
        };
        if value.is_collectable() {
            gc.barrier_back(GcOwner::Table(self), &value);
        }
        *self.slot_mut(slot) = value;
        Ok(())
    }

    pub fn set_int(&mut self, gc: &mut dyn GcHost, key: i64, value: LuaValue) -> LuaResult<()> {
        self.raw_set(gc, &LuaValue::integer(key), value)
    }

    /// Next never-used node below `last_free`
    fn get_free_pos(&mut self) -> Option<usize> {
        while self.last_free > 0 {
            self.last_free -= 1;
            if self.node[self.last_free].is_free() {
                return Some(self.last_free);
            }
        }
        None
    }

    /// Insert a key that has no cell yet. If its main position is taken, the colliding
    /// node either moves to a free slot (when it is not in its own main position) or the
    /// new key goes to the free slot chained after it. The placed node goes to the tail
    /// of the insertion order.
    fn new_key(&mut self, gc: &mut dyn GcHost, key: &LuaValue) -> LuaResult<Slot> {
        let mp = match self.main_position_of(key) {
            Some(mp) if self.node[mp].value.is_nil() => mp,
            taken => match (taken, self.get_free_pos()) {
                (Some(mp), Some(free)) => self.place_colliding(mp, free),
                _ => {
                    self.rehash(gc, key)?;
                    return match self.find_slot(key) {
                        Some(slot) => Ok(slot),
                        None => self.new_key(gc, key),
                    };
                }
            },
        };

        self.disconnect_node(mp);
        self.append_node(mp);
        self.node[mp].key = key.clone();
        if key.is_collectable() {
            gc.barrier_back(GcOwner::Table(self), key);
        }
        debug_assert!(self.node[mp].value.is_nil());
        Ok(Slot::Node(mp))
    }

    /// Resolve a collision at `mp` using the free node `free`; returns the node for the new key
    fn place_colliding(&mut self, mp: usize, free: usize) -> usize {
        let other = main_position(&self.node[mp].key, self.node.len());
        if other == mp {
            // colliding node is in its own main position: new key goes into the free slot
            self.node[free].chain = self.node[mp].chain;
            self.node[mp].chain = Some(free as u32);
            return free;
        }

        // colliding node is out of its main position: move it into the free slot
        let mut prev = other;
        while let Some(next) = self.node[prev].chain {
            if next as usize == mp {
                break;
            }
            prev = next as usize;
        }
        self.node[prev].chain = Some(free as u32);

        let moved_key = mem::take(&mut self.node[mp].key);
        let moved_value = mem::take(&mut self.node[mp].value);
        let moved_chain = self.node[mp].chain.take();
        let target = &mut self.node[free];
        target.key = moved_key;
        target.value = moved_value;
        target.chain = moved_chain;
        self.transplant_links(mp, free);
        mp
    }

    // ============ Rehash ============

    /// Count non-nil array slots per slice: `nums[i]` counts keys in (2^(i-1), 2^i]
    fn num_use_array(&self, nums: &mut [usize]) -> usize {
        let size = self.array.len();
        let mut ause = 0;
        let mut i = 1;
        let mut ttlg = 1usize;
        for count in nums.iter_mut() {
            let mut lim = ttlg;
            if lim > size {
                lim = size;
                if i > lim {
                    break;
                }
            }
            let lc = self.array[i - 1..lim].iter().filter(|v| !v.is_nil()).count();
            *count += lc;
            ause += lc;
            i = lim + 1;
            ttlg *= 2;
        }
        ause
    }

    /// Live hash entries, and how many of them are array candidates
    fn num_use_hash(&self, nums: &mut [usize]) -> (usize, usize) {
        let mut total = 0;
        let mut ints = 0;
        for n in self.node.iter().filter(|n| !n.value.is_nil()) {
            ints += count_int(&n.key, nums);
            total += 1;
        }
        (total, ints)
    }

    /// Recompute both part sizes so that `extra_key` fits, then resize
    fn rehash(&mut self, gc: &mut dyn GcHost, extra_key: &LuaValue) -> LuaResult<()> {
        let mut nums = [0usize; MAXABITS as usize + 1];
        let mut nasize = self.num_use_array(&mut nums);
        let mut total_use = nasize;
        let (hash_use, hash_ints) = self.num_use_hash(&mut nums);
        total_use += hash_use;
        nasize += hash_ints;
        nasize += count_int(extra_key, &mut nums);
        total_use += 1;
        let na = compute_sizes(&nums, &mut nasize);
        log::debug!(
            "table rehash: array {} -> {}, hash {} -> {}",
            self.array.len(),
            nasize,
            self.node.len(),
            total_use - na
        );
        self.resize(gc, nasize, total_use - na)
    }

    /// Resize both parts. Entries of the vanishing array slice and every live hash entry
    /// are re-inserted, the hash entries in their previous insertion order.
    ///
    /// The hash part is never sized below the entries it has to take back: re-insertion
    /// never rehashes, and a refused allocation leaves the table untouched.
    pub fn resize(&mut self, gc: &mut dyn GcHost, nasize: usize, nhsize: usize) -> LuaResult<()> {
        let nasize = nasize.min(MAXASIZE);
        let old_asize = self.array.len();
        let old_hsize = self.node.len();
        let displaced = self
            .array
            .get(nasize..)
            .map_or(0, |slice| slice.iter().filter(|v| !v.is_nil()).count());
        let live = self
            .node
            .iter()
            .filter(|n| !n.value.is_nil())
            .filter(|n| !matches!(n.key.as_integer(), Some(k) if k >= 1 && (k as u64) <= nasize as u64))
            .count();
        let nhsize = nhsize.max(displaced + live);
        let new_hsize = if nhsize == 0 {
            0
        } else {
            let lsize = ceil_log2(nhsize);
            if lsize > MAXBITS {
                return Err(LuaError::TableOverflow);
            }
            1usize << lsize
        };

        // ask for memory before touching anything
        if new_hsize > 0 {
            gc.alloc_block(BlockKind::HashPart, new_hsize)?;
        }
        if nasize != old_asize {
            if let Err(e) = gc.realloc_block(BlockKind::ArrayPart, old_asize, nasize) {
                if new_hsize > 0 {
                    gc.free_block(BlockKind::HashPart, new_hsize);
                }
                return Err(e);
            }
        }

        if nasize > old_asize {
            self.array.resize(nasize, LuaValue::Nil);
        }
        let mut old_nodes = mem::replace(
            &mut self.node,
            std::iter::repeat_with(Node::default).take(new_hsize).collect(),
        );
        let old_first = self.first_added.take();
        self.last_added.set(None);
        self.last_free = new_hsize;

        if nasize < old_asize {
            let vanishing = self.array.split_off(nasize);
            self.array.shrink_to_fit();
            for (i, v) in vanishing.into_iter().enumerate() {
                if !v.is_nil() {
                    self.reinsert(gc, LuaValue::integer((nasize + i + 1) as i64), v)?;
                }
            }
        }

        let mut cur = old_first;
        while let Some(i) = cur {
            let n = &mut old_nodes[i as usize];
            cur = n.order_next.get();
            if !n.value.is_nil() {
                let key = mem::take(&mut n.key);
                let value = mem::take(&mut n.value);
                self.reinsert(gc, key, value)?;
            }
        }

        if old_hsize > 0 {
            gc.free_block(BlockKind::HashPart, old_hsize);
        }
        Ok(())
    }

    /// Resize the array part, keeping the hash part capacity when it still fits
    pub fn resize_array(&mut self, gc: &mut dyn GcHost, nasize: usize) -> LuaResult<()> {
        let nhsize = self.node.len();
        self.resize(gc, nasize, nhsize)
    }

    /// Store an entry that already belonged to this table
    fn reinsert(&mut self, gc: &mut dyn GcHost, key: LuaValue, value: LuaValue) -> LuaResult<()> {
        let slot = match self.find_slot(&key) {
            Some(slot) => slot,
            None => self.new_key(gc, &key)?,
        };
        *self.slot_mut(slot) = value;
        Ok(())
    }

    // ============ Bulk insertion ============

    /// Store `values` at keys `first_key, first_key + 1, ...`, growing the table at most
    /// once for the whole run.
    pub fn set_list(&mut self, gc: &mut dyn GcHost, first_key: i64, values: &[LuaValue]) -> LuaResult<()> {
        if first_key < 1 {
            return Err(LuaError::InvalidSetListKey);
        }
        if values.is_empty() {
            return Ok(());
        }
        let first = first_key as u64;
        let count = values.len() as u64;
        let last = first
            .checked_add(count - 1)
            .filter(|&l| l <= i64::MAX as u64)
            .ok_or(LuaError::InvalidSetListCount)?;

        // if any part of the run can live in the array part, size the array to fit it
        let asize = self.array.len() as u64;
        let max = MAXASIZE as u64;
        let mut new_asize = asize;
        if first <= max && last > asize {
            new_asize = last.min(max);
        }

        // how much overflows into the hash part
        let hgrow = if first > new_asize {
            count
        } else if last > new_asize {
            last - new_asize
        } else {
            0
        };

        let old_hsize = self.node.len() as u64;
        let mut new_hsize = old_hsize;
        if hgrow > 0 {
            if (self.last_free as u64) < hgrow * 2 {
                // too tight to bother counting
                new_hsize += hgrow;
            } else {
                let free = self.node[..self.last_free]
                    .iter()
                    .rev()
                    .filter(|n| n.is_free())
                    .take(hgrow as usize)
                    .count() as u64;
                new_hsize += hgrow - free;
            }
        }

        if new_asize > asize || new_hsize > old_hsize {
            self.resize(gc, new_asize as usize, new_hsize as usize)?;
        }

        let in_array = if first > self.array.len() as u64 {
            0
        } else {
            (self.array.len() as u64 - first + 1).min(count) as usize
        };
        for (offset, v) in values[..in_array].iter().enumerate() {
            if v.is_collectable() {
                gc.barrier_back(GcOwner::Table(self), v);
            }
            self.array[first as usize - 1 + offset] = v.clone();
        }
        for (offset, v) in values.iter().enumerate().skip(in_array) {
            self.raw_set(gc, &LuaValue::integer((first + offset as u64) as i64), v.clone())?;
        }
        Ok(())
    }

    // ============ Traversal ============

    /// Resolve a traversal key to its position; dead keys still resolve
    fn find_index(&self, key: &LuaValue) -> LuaResult<Resume> {
        if key.is_nil() {
            return Ok(Resume::Start);
        }
        if let Some(i) = self.array_index(key) {
            return Ok(Resume::Array(i));
        }
        self.find_node(key)
            .map(Resume::Node)
            .ok_or(LuaError::InvalidNextKey)
    }

    /// The entry after `key` (nil starts the traversal): array part in index order, then
    /// the hash part in insertion order. Nil values are skipped.
    pub fn next(&self, key: &LuaValue) -> LuaResult<Option<(LuaValue, LuaValue)>> {
        let resume = self.find_index(key)?;
        let array_from = match resume {
            Resume::Start => 0,
            Resume::Array(i) => i + 1,
            Resume::Node(_) => self.array.len(),
        };
        for (i, v) in self.array.iter().enumerate().skip(array_from) {
            if !v.is_nil() {
                return Ok(Some((LuaValue::integer(i as i64 + 1), v.clone())));
            }
        }

        let mut cur = match resume {
            Resume::Node(i) => self.node[i].order_next.get(),
            _ => self.first_added.get(),
        };
        while let Some(i) = cur {
            let n = &self.node[i as usize];
            if !n.value.is_nil() {
                return Ok(Some((n.key.clone(), n.value.clone())));
            }
            cur = n.order_next.get();
        }
        Ok(None)
    }

    pub fn iter(&self) -> TableIter<'_> {
        TableIter {
            table: self,
            key: LuaValue::Nil,
        }
    }

    // ============ Length ============

    /// A border: `t[n]` is present and `t[n + 1]` is absent (0 when `t[1]` is absent)
    pub fn length(&self) -> usize {
        let j = self.array.len();
        if j > 0 && self.array[j - 1].is_nil() {
            // there is a border in the array part: binary search for it
            let (mut i, mut j) = (0, j);
            while j - i > 1 {
                let m = (i + j) / 2;
                if self.array[m - 1].is_nil() {
                    j = m;
                } else {
                    i = m;
                }
            }
            return i;
        }
        if self.is_dummy() {
            return j;
        }
        self.unbound_search(j as u64) as usize
    }

    fn present(&self, key: u64) -> bool {
        self.get_int(key as i64).is_some()
    }

    fn unbound_search(&self, j: u64) -> u64 {
        let mut i = j; // zero or a present index
        let mut j = j + 1;
        while self.present(j) {
            i = j;
            j *= 2;
            if j > MAX_INT {
                // built with bad purposes: resort to a linear search
                let mut i = 1;
                while self.present(i) {
                    i += 1;
                }
                return i - 1;
            }
        }
        while j - i > 1 {
            let m = (i + j) / 2;
            if self.present(m) {
                i = m;
            } else {
                j = m;
            }
        }
        i
    }

    /// Number of live entries; `fuzzy` counts the whole array part instead of scanning it
    pub fn count(&self, fuzzy: bool) -> usize {
        let array = if fuzzy {
            self.array.len()
        } else {
            self.array.iter().filter(|v| !v.is_nil()).count()
        };
        let hash = self
            .order_indices()
            .filter(|&i| !self.node[i].value.is_nil())
            .count();
        array + hash
    }

    /// Release both parts through the collaborator
    pub fn free(self, gc: &mut dyn GcHost) {
        if !self.array.is_empty() {
            gc.free_block(BlockKind::ArrayPart, self.array.len());
        }
        if !self.node.is_empty() {
            gc.free_block(BlockKind::HashPart, self.node.len());
        }
    }
}

/// Candidate array key: counts it in its slice of `nums`
fn count_int(key: &LuaValue, nums: &mut [usize]) -> usize {
    match key.as_integer() {
        Some(k) if k >= 1 && (k as u64) <= MAXASIZE as u64 => {
            nums[ceil_log2(k as usize) as usize] += 1;
            1
        }
        _ => 0,
    }
}

/// Largest power of two `n` such that more than half of `1..=n` is in use.
/// Updates `narray` to that size and returns how many keys will live in the array part.
fn compute_sizes(nums: &[usize], narray: &mut usize) -> usize {
    let mut a = 0; // number of keys up to 2^i
    let mut na = 0; // number of keys going to the array part
    let mut n = 0; // optimal array size so far
    let mut twotoi = 1usize;
    for &count in nums {
        if twotoi / 2 >= *narray {
            break;
        }
        if count > 0 {
            a += count;
            if a > twotoi / 2 {
                n = twotoi;
                na = a;
            }
        }
        if a == *narray {
            break;
        }
        twotoi *= 2;
    }
    *narray = n;
    na
}

/// Iterator over a table through `next`
pub struct TableIter<'a> {
    table: &'a LuaTable,
    key: LuaValue,
}

impl Iterator for TableIter<'_> {
    type Item = (LuaValue, LuaValue);

    fn next(&mut self) -> Option<Self::Item> {
        let (k, v) = self.table.next(&self.key).ok().flatten()?;
        self.key = k.clone();
        Some((k, v))
    }
}

#[cfg(test)]
impl LuaTable {
    /// Panics when the chain or order structure is broken
    pub(crate) fn check_invariants(&self) {
        let size = self.node.len();
        for (i, n) in self.node.iter().enumerate() {
            if n.is_free() {
                assert!(n.chain.is_none(), "free node {} is chained", i);
                continue;
            }
            let mp = main_position(&n.key, size);
            if mp != i {
                let occupant = &self.node[mp];
                assert!(!occupant.is_free(), "main position {} of node {} is free", mp, i);
                assert_eq!(
                    main_position(&occupant.key, size),
                    mp,
                    "node {} displaced by a node out of its own main position",
                    i
                );
            }
            assert_eq!(self.find_node(&n.key), Some(i), "node {} unreachable", i);
        }

        let order: Vec<usize> = self.order_indices().collect();
        let used = self.node.iter().filter(|n| !n.is_free()).count();
        assert_eq!(order.len(), used, "insertion order does not cover used nodes");
        assert_eq!(self.first_added.get(), order.first().map(|&i| i as u32));
        assert_eq!(self.last_added.get(), order.last().map(|&i| i as u32));
        for w in order.windows(2) {
            assert_eq!(self.node[w[1]].order_prev.get(), Some(w[0] as u32));
        }
    }

    pub(crate) fn hash_keys_in_order(&self) -> Vec<LuaValue> {
        self.order_indices()
            .map(|i| self.node[i].key.clone())
            .collect()
    }
}
