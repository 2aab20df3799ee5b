//! The dispatcher core: request buffer, worker pool, and the protocol
//! that ties them to the content cache (spec.md §4.4, §4.5, §6).
//!
//! [`Server`] is the `ServerHandle` of spec.md §6. It owns exactly one
//! [`parking_lot::Mutex`] guarding both the request buffer and the
//! content cache, plus the two condition variables the buffer's
//! `submit`/`take` protocol needs — matching §5's "all coordination uses
//! one global mutex" verbatim. Disk I/O and network I/O always run with
//! that lock released.

use crate::buffer::RingBuffer;
use crate::cache::{Cache, EntryHandle, InsertOutcome};
use crate::error::Outcome;
use crate::request::{FileData, RequestHandler};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;

struct Shared<C> {
    buffer: RingBuffer<C>,
    cache: Option<Cache>,
}

/// The concurrent file-serving dispatch core described by this crate.
///
/// Construct one with [`Server::init`], which returns it already wrapped
/// in an `Arc` since the worker pool (when `nr_threads > 0`) holds its
/// own clones for the lifetime of the process — teardown is out of
/// scope for this core (spec.md §4.5).
pub struct Server<C, H> {
    shared: Mutex<Shared<C>>,
    not_full: Condvar,
    not_empty: Condvar,
    nr_threads: usize,
    handler: H,
}

impl<C, H> std::fmt::Debug for Server<C, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("nr_threads", &self.nr_threads)
            .finish_non_exhaustive()
    }
}

impl<C, H> Server<C, H>
where
    C: Send + 'static,
    H: RequestHandler<C> + 'static,
{
    /// `init(nr_threads, max_requests, max_cache_size_bytes)` from
    /// spec.md §6, plus the `handler` this crate needs to actually parse
    /// requests, read files, and send bytes (the `request` collaborator
    /// of §6, injected rather than assumed as a global).
    ///
    /// Any of the three knobs may be zero independently, per §4.1/§4.5:
    /// `nr_threads == 0` makes every [`Server::submit`] call synchronous;
    /// `max_cache_size_bytes == 0` disables the cache entirely, bypassing
    /// its lock-protected state without ever touching it.
    pub fn init(
        nr_threads: usize,
        max_requests: usize,
        max_cache_size_bytes: u64,
        handler: H,
    ) -> Arc<Self> {
        let cache = (max_cache_size_bytes > 0).then(|| Cache::new(max_cache_size_bytes));
        let buffer_capacity = if nr_threads > 0 { max_requests } else { 0 };

        let server = Arc::new(Server {
            shared: Mutex::new(Shared {
                buffer: RingBuffer::new(buffer_capacity),
                cache,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            nr_threads,
            handler,
        });

        for _ in 0..nr_threads {
            let worker = Arc::clone(&server);
            thread::spawn(move || worker.worker_loop());
        }

        server
    }

    /// Returns a reference to the `request` collaborator this server was
    /// constructed with. Mainly useful for tests and embedders that keep
    /// their own observability state inside their [`RequestHandler`] impl.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// `submit(ServerHandle, connfd)` from spec.md §6. Enqueues `fd` for
    /// a worker to pick up, blocking while the buffer is full; in the
    /// `nr_threads == 0` degenerate configuration, serves `fd` inline on
    /// the calling thread instead (spec.md §4.1).
    pub fn submit(&self, fd: C) {
        if self.nr_threads == 0 {
            self.serve(fd);
            return;
        }

        let mut shared = self.shared.lock();
        while shared.buffer.is_full() {
            self.not_full.wait(&mut shared);
        }
        let was_empty = shared.buffer.is_empty();
        shared.buffer.push(fd);
        if was_empty {
            self.not_empty.notify_one();
        }
    }

    /// A worker's forever loop (spec.md §4.4 step 1 plus the dequeue
    /// protocol of §4.1): take a descriptor, serve it, repeat. Never
    /// returns; workers run for process lifetime (spec.md §4.5, §5).
    fn worker_loop(self: Arc<Self>) {
        loop {
            let fd = {
                let mut shared = self.shared.lock();
                while shared.buffer.is_empty() {
                    self.not_empty.wait(&mut shared);
                }
                let was_full = shared.buffer.is_full();
                let fd = shared.buffer.pop();
                if was_full {
                    self.not_full.notify_one();
                }
                fd
            };
            self.serve(fd);
        }
    }

    /// The per-request protocol of spec.md §4.4: parse, then either the
    /// no-cache fast path or the cache-aware hit/miss/double-check/insert
    /// dance, with disk reads and network sends always outside the lock.
    ///
    /// Returns an [`Outcome`] purely for observability (tests, an
    /// embedder's own logging) — never propagated to the client, per
    /// spec.md §7.
    fn serve(&self, fd: C) -> Outcome {
        let mut file = FileData::new();
        if !self.handler.request_init(&fd, &mut file) {
            self.handler.request_destroy(fd);
            return Outcome::MalformedRequest;
        }

        let outcome = if self.shared.lock().cache.is_none() {
            self.serve_uncached(&fd, &mut file)
        } else {
            self.serve_cached(&fd, &mut file)
        };
        self.handler.request_destroy(fd);
        outcome
    }

    /// `max_cache_size == 0` path: read from disk and send, touching
    /// neither the lock nor any cache state (spec.md §4.4 step 3).
    fn serve_uncached(&self, fd: &C, file: &mut FileData) -> Outcome {
        if !self.handler.request_readfile(file) {
            return Outcome::DiskReadFailed {
                name: file.name.clone(),
            };
        }
        self.handler.request_sendfile(fd, file);
        Outcome::Served {
            name: file.name.clone(),
            size: file.size,
            cached: false,
        }
    }

    /// The cache-aware protocol of spec.md §4.4 step 4: lookup, and on a
    /// miss, an unlocked disk read followed by a double-checked insert.
    fn serve_cached(&self, fd: &C, file: &mut FileData) -> Outcome {
        let mut shared = self.shared.lock();
        let cache = shared.cache.as_mut().expect("cache path only reached when enabled");
        if let Some(entry) = cache.lookup(&file.name) {
            cache_hit(cache, entry, file);
            drop(shared);
            return self.send_and_unpin(fd, file, entry, true);
        }
        drop(shared);

        if !self.handler.request_readfile(file) {
            return Outcome::DiskReadFailed {
                name: file.name.clone(),
            };
        }

        let mut shared = self.shared.lock();
        let cache = shared.cache.as_mut().expect("cache path only reached when enabled");
        if let Some(entry) = cache.lookup(&file.name) {
            // Double-check hit: another thread won the race to insert
            // this name while we were reading from disk. Discard our
            // disk-read bytes and reuse the cached copy.
            cache_hit(cache, entry, file);
            drop(shared);
            return self.send_and_unpin(fd, file, entry, true);
        }

        match cache.insert(file) {
            InsertOutcome::Inserted(entry) => {
                // SAFETY: `entry` was just returned by `insert` on this
                // same, still-locked cache.
                unsafe { Cache::pin(entry) };
                cache.admit(entry);
                drop(shared);
                self.send_and_unpin(fd, file, entry, true)
            }
            InsertOutcome::Uncacheable => {
                drop(shared);
                self.handler.request_sendfile(fd, file);
                Outcome::Uncacheable {
                    name: file.name.clone(),
                    size: file.size,
                }
            }
            InsertOutcome::EvictionBlocked => {
                drop(shared);
                self.handler.request_sendfile(fd, file);
                Outcome::EvictionBlocked {
                    name: file.name.clone(),
                }
            }
        }
    }

    /// Sends `file` with the lock released, then reacquires it just long
    /// enough to release the pin taken by the caller. Used by every path
    /// that serves from (or just admitted into) the cache.
    fn send_and_unpin(&self, fd: &C, file: &FileData, entry: EntryHandle, cached: bool) -> Outcome {
        self.handler.request_sendfile(fd, file);
        {
            let _shared = self.shared.lock();
            // SAFETY: `entry` cannot have been freed: its pin (taken by
            // the caller before releasing the lock) keeps it alive
            // across this unlocked send, per invariant G4.
            unsafe { Cache::unpin(entry) };
        }
        Outcome::Served {
            name: file.name.clone(),
            size: file.size,
            cached,
        }
    }
}

/// Copies a cache hit's bytes into `file`, pins the entry, and moves it
/// to the front of the LRU list — the three actions spec.md §4.4.b/c
/// bundle into a single, uninterrupted critical section.
fn cache_hit(cache: &mut Cache, entry: EntryHandle, file: &mut FileData) {
    // SAFETY: `entry` was just returned by `cache.lookup` on this same,
    // still-locked cache.
    unsafe {
        Cache::copy_into(entry, file);
        Cache::pin(entry);
        cache.touch(entry);
    }
}
