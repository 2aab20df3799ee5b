//! The content cache: a hash table with chaining, a byte budget, and an
//! LRU eviction order, all manipulated only while the server's single
//! global lock is held (see [`crate::server`]).
//!
//! This module never blocks and never touches the network or the disk;
//! every method here runs inside a critical section bounded by a handful
//! of pointer operations, matching the concurrency model in the crate's
//! top-level documentation.

use crate::error::ProgrammingError;
use crate::list::List;
use crate::request::FileData;
use core::num::NonZeroUsize;
use core::ptr::NonNull;

extern crate alloc;
use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// A fixed hash-table bucket count, used when the caller doesn't want to
/// couple table size to the byte budget (spec.md §9 explicitly allows
/// this). Large enough that typical workloads see short chains without
/// wasting memory on a table sized to `max_cache_size` bytes.
const DEFAULT_BUCKET_COUNT: usize = 1021;

/// An arbitrary positive bound for the LRU list's nominal capacity field.
/// The real bound on LRU length is `cache_size_counter <= max_cache_size`,
/// enforced by [`Cache::insert`]/[`Cache::evict`], not by the list type;
/// every admission uses the list's unchecked insertion path.
const LRU_NOMINAL_CAPACITY: usize = 1 << 20;

/// One slot in a cache bucket chain.
///
/// Mirrors `CacheEntry` from spec.md §3 as a tagged state rather than an
/// always-allocated `file` field: `file: None` together with `deleted:
/// true` is the tombstone state described there. `transmitting` is the
/// pin count; `lru_node` links back to this entry's node in the cache's
/// [`List`], set by [`Cache::admit`] and cleared by [`Cache::evict`].
pub(crate) struct CacheEntry {
    name: String,
    file: Option<FileData>,
    transmitting: u32,
    deleted: bool,
    lru_node: Option<NonNull<crate::list::Entry<String>>>,
    next: Option<Box<CacheEntry>>,
}

// SAFETY: `lru_node` points at a node owned by this entry's `Cache`'s own
// `lru: List<String>`, never aliased outside the server's single lock;
// `Cache::touch`/`Cache::evict` are the only code that dereferences it,
// and both run only while that lock is held.
unsafe impl Send for CacheEntry {}
// SAFETY: no method reachable through a shared `&CacheEntry` dereferences
// `lru_node`; every mutation goes through `&mut self`/`EntryHandle`
// accessors gated by the server's lock.
unsafe impl Sync for CacheEntry {}

impl CacheEntry {
    /// Number of bytes this entry currently contributes to
    /// `cache_size_counter`, or 0 if it has been tombstoned.
    fn size(&self) -> u64 {
        self.file.as_ref().map_or(0, |f| f.size)
    }
}

/// The content cache described in spec.md §4.2.
///
/// Every method takes `&mut self` (or, for the read-only [`Cache::lookup`],
/// `&self`) because the server only ever reaches this type through its
/// single global lock — there is no internal locking here at all.
pub(crate) struct Cache {
    buckets: Vec<Option<Box<CacheEntry>>>,
    bucket_count: usize,
    max_size: u64,
    cache_size_counter: u64,
    lru: List<String>,
}

/// An opaque handle to a live cache entry, valid for as long as the
/// caller (or a pin it holds) keeps it alive. Never dereferenced outside
/// this module or [`crate::server`], and only ever while the server's
/// lock is held.
pub(crate) type EntryHandle = NonNull<CacheEntry>;

/// The result of [`Cache::insert`], distinguishing the two ways an
/// insertion can fail so the server can report [`crate::error::Outcome::Uncacheable`]
/// or [`crate::error::Outcome::EvictionBlocked`] rather than collapsing
/// both into a generic "not cached".
pub(crate) enum InsertOutcome {
    /// The file was admitted; the handle is not yet linked into the LRU
    /// list until the caller follows up with [`Cache::admit`].
    Inserted(EntryHandle),
    /// `file.size` alone exceeds `max_size`.
    Uncacheable,
    /// Eviction could not free enough room because every candidate is pinned.
    EvictionBlocked,
}

impl Cache {
    /// Builds a cache with the given byte budget. `max_size` must be
    /// greater than zero; the server bypasses this type entirely when
    /// `max_cache_size == 0` (spec.md §4.1/§4.5).
    pub(crate) fn new(max_size: u64) -> Self {
        let bucket_count = DEFAULT_BUCKET_COUNT;
        let mut buckets = Vec::with_capacity(bucket_count);
        buckets.resize_with(bucket_count, || None);
        Cache {
            buckets,
            bucket_count,
            max_size,
            cache_size_counter: 0,
            lru: List::new(NonZeroUsize::new(LRU_NOMINAL_CAPACITY).unwrap()),
        }
    }

    /// The current value of `cache_size_counter` (invariant G1).
    #[cfg(test)]
    pub(crate) fn cache_size(&self) -> u64 {
        self.cache_size_counter
    }

    /// Number of live (non-tombstoned) entries. Exposed for tests that
    /// check invariants P2/P3 against the LRU list length.
    #[cfg(test)]
    pub(crate) fn live_len(&self) -> usize {
        self.lru.len()
    }

    /// djb2-with-a-twist, taken verbatim from the original C
    /// implementation's `cache_lookup`/`cache_insert`: seed is `2*len+1`,
    /// each byte folds in via `hash*33 + byte`, using wrapping 32-bit
    /// arithmetic to reproduce the original's signed-overflow behavior.
    fn bucket_index(&self, name: &str) -> usize {
        let mut hash = 2i32.wrapping_mul(name.len() as i32).wrapping_add(1);
        for byte in name.bytes() {
            hash = hash.wrapping_mul(33).wrapping_add(byte as i32);
        }
        (hash.wrapping_abs() as u32 as usize) % self.bucket_count
    }

    /// `lookup(name)` from spec.md §4.2. Caller must hold the server's
    /// lock; returns the first non-deleted entry with a matching name,
    /// walking the bucket chain exhaustively.
    pub(crate) fn lookup(&self, name: &str) -> Option<EntryHandle> {
        let idx = self.bucket_index(name);
        let mut cursor = self.buckets[idx].as_deref();
        while let Some(entry) = cursor {
            if !entry.deleted && entry.name == name {
                return Some(NonNull::from(entry));
            }
            cursor = entry.next.as_deref();
        }
        None
    }

    /// Copies a live entry's bytes into `file`, used by both the cache-hit
    /// and double-check-hit paths in the worker loop (spec.md §4.4.b/c).
    ///
    /// # Safety
    /// `entry` must be a handle returned by `lookup`/`insert` on this
    /// cache and still live (not yet freed); the pin protocol in
    /// [`crate::server`] guarantees this.
    pub(crate) unsafe fn copy_into(entry: EntryHandle, file: &mut FileData) {
        // SAFETY: caller guarantees `entry` is live and not concurrently
        // mutated (the server's lock is held for the duration of this call).
        let cached = unsafe { entry.as_ref() }
            .file
            .as_ref()
            .expect("live cache entry always has a file");
        file.bytes = cached.bytes.clone();
        file.size = cached.size;
    }

    /// Increments the pin count. Paired with [`Cache::unpin`]; the two
    /// bracket a `request_sendfile` call made without the lock held.
    ///
    /// # Safety
    /// See [`Cache::copy_into`].
    pub(crate) unsafe fn pin(entry: EntryHandle) {
        // SAFETY: see above; this is the only mutation in flight since
        // the lock serializes all cache access.
        unsafe { (*entry.as_ptr()).transmitting += 1 };
    }

    /// Decrements the pin count. Aborts via [`ProgrammingError::PinUnderflow`]
    /// if it was already zero — a violated invariant, not a runtime error.
    ///
    /// # Safety
    /// See [`Cache::copy_into`].
    pub(crate) unsafe fn unpin(entry: EntryHandle) {
        // SAFETY: see above.
        let e = unsafe { &mut *entry.as_ptr() };
        match e.transmitting.checked_sub(1) {
            Some(v) => e.transmitting = v,
            None => ProgrammingError::PinUnderflow {
                name: e.name.clone(),
            }
            .abort(),
        }
    }

    /// `touch(name)` from spec.md §4.3, taking the entry handle the
    /// caller already has in hand (from `lookup`) rather than re-hashing
    /// the name. Moves the entry's LRU node to the head; a no-op if it is
    /// already there (R3).
    ///
    /// # Safety
    /// See [`Cache::copy_into`].
    pub(crate) unsafe fn touch(&mut self, entry: EntryHandle) {
        // SAFETY: see above.
        let e = unsafe { entry.as_ref() };
        match e.lru_node {
            // SAFETY: `node` is a live node owned by this cache's list.
            Some(node) => unsafe { self.lru.move_to_front(node.as_ptr()) },
            None => ProgrammingError::MissingLruNode {
                name: e.name.clone(),
            }
            .abort(),
        }
    }

    /// `admit(name)` from spec.md §4.3: allocates a fresh LRU node at the
    /// head for an entry that was just inserted, and links it back into
    /// the entry so future `touch`/`evict` calls can find it in O(1).
    pub(crate) fn admit(&mut self, entry: EntryHandle) {
        // SAFETY: `entry` was just returned by `self.insert`, so it is
        // live and owned by this cache's bucket storage.
        let name = unsafe { entry.as_ref() }.name.clone();
        let node = self.lru.add_unchecked(name);
        // SAFETY: `entry` is live; no other reference to it exists right now.
        unsafe { (*entry.as_ptr()).lru_node = Some(NonNull::new_unchecked(node)) };
    }

    /// `insert(file)` from spec.md §4.2. Precondition (enforced by the
    /// caller, per the double-check rule): `lookup(file.name)` has just
    /// returned `None` under the same, uninterrupted lock hold.
    pub(crate) fn insert(&mut self, file: &FileData) -> InsertOutcome {
        if file.size > self.max_size {
            return InsertOutcome::Uncacheable;
        }
        if self.cache_size_counter + file.size > self.max_size {
            let overflow = (self.cache_size_counter + file.size - self.max_size) as i64;
            if !self.evict(overflow) {
                return InsertOutcome::EvictionBlocked;
            }
        }
        self.cache_size_counter += file.size;

        let mut new_entry = Box::new(CacheEntry {
            name: file.name.clone(),
            file: Some(file.clone()),
            transmitting: 0,
            deleted: false,
            lru_node: None,
            next: None,
        });
        let ptr = NonNull::from(new_entry.as_ref());

        let idx = self.bucket_index(&file.name);
        let mut slot = &mut self.buckets[idx];
        loop {
            if slot.is_none() {
                *slot = Some(new_entry);
                break;
            }
            let reclaimable = {
                let head = slot.as_ref().unwrap();
                head.deleted && head.transmitting == 0
            };
            if reclaimable {
                let mut head = slot.take().unwrap();
                new_entry.next = head.next.take();
                *slot = Some(new_entry);
                break;
            }
            slot = &mut slot.as_mut().unwrap().next;
        }
        InsertOutcome::Inserted(ptr)
    }

    /// `evict(amount)` from spec.md §4.2, walking the LRU list tail-first
    /// exactly as described in §4.3/§9. Pinned entries are stepped past
    /// without being reordered. Returns `false` (`EvictionBlocked`) if the
    /// walk runs out of unpinned candidates before `amount` bytes are
    /// freed; per §9's recommended tie-break, the head candidate is
    /// still evicted on the way, so success is judged only after it.
    fn evict(&mut self, mut amount: i64) -> bool {
        if self.lru.is_empty() {
            if self.cache_size_counter > 0 {
                // G1 says the counter tracks exactly the live entries;
                // an empty list with a nonzero counter is a bug, not a
                // legitimate "nothing to evict" state.
                ProgrammingError::EvictExhausted { remaining: amount }.abort();
            }
            return false;
        }

        let mut cursor = self.lru.last_node();
        while amount > 0 {
            let node = match cursor {
                Some(n) => n,
                None => return false,
            };
            // SAFETY: `node` came from this list's own cursor walk.
            let name = unsafe { self.lru.get_value(node) }
                .expect("lru node holds a name")
                .clone();
            let entry = self
                .lookup(&name)
                .unwrap_or_else(|| ProgrammingError::MissingLruNode { name: name.clone() }.abort());
            // SAFETY: `entry` is live (just confirmed via `lookup`) and
            // the server's lock is held for the duration of this call.
            let e = unsafe { &mut *entry.as_ptr() };
            if e.transmitting > 0 {
                // SAFETY: `node` is a valid, currently-linked entry.
                cursor = unsafe { self.lru.prev_node(node) };
                continue;
            }

            amount -= e.size() as i64;
            self.cache_size_counter -= e.size();
            e.file = None;
            e.deleted = true;
            e.lru_node = None;

            // SAFETY: `node` is a valid, currently-linked entry.
            let prev = unsafe { self.lru.prev_node(node) };
            // SAFETY: `node` has not been removed yet.
            unsafe { self.lru.remove(node) };
            cursor = prev;
        }
        true
    }
}
