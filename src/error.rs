//! Error taxonomy.
//!
//! None of these are returned through `submit` — the client sees only a
//! successful transfer or a closed connection, never an error code. They
//! exist so the worker loop and its embedder can log what happened.
//! `ProgrammingError` is the exception: it marks invariant violations that
//! the lock discipline in the worker loop is supposed to make unreachable,
//! and aborts rather than returning.

use thiserror::Error;

/// An observable, non-fatal outcome of handling one request.
///
/// Every variant here corresponds to a handler decision documented in the
/// external interface: close the connection, serve uncached, or keep
/// going. None of them propagate past the worker loop.
#[derive(Debug, Error)]
pub enum Outcome {
    /// `request_init` rejected the connection; closed without reading a file.
    #[error("malformed request")]
    MalformedRequest,
    /// `request_readfile` failed; closed without touching the cache.
    #[error("disk read failed for {name:?}")]
    DiskReadFailed {
        /// Name of the file that failed to read.
        name: String,
    },
    /// File size alone exceeds `max_cache_size`; served without caching.
    #[error("file {name:?} of {size} bytes exceeds the cache budget")]
    Uncacheable {
        /// Name of the oversized file.
        name: String,
        /// Size that made it uncacheable.
        size: u64,
    },
    /// Eviction could not free enough space because every live entry is
    /// pinned; served without caching.
    #[error("eviction blocked for {name:?}: all cache entries pinned")]
    EvictionBlocked {
        /// Name of the file that could not be inserted.
        name: String,
    },
    /// The request was sent to completion. Not an error; the dispatcher
    /// returns this alongside the other variants so callers (tests, an
    /// embedder's own logging) can observe the outcome of every request
    /// uniformly. Never surfaced to the client.
    #[error("served {name:?} ({} bytes, cached={cached})", size)]
    Served {
        /// Name of the file that was served.
        name: String,
        /// Number of bytes sent.
        size: u64,
        /// Whether the bytes came from (or were placed into) the cache.
        cached: bool,
    },
}

/// A violated invariant. The lock discipline documented in the
/// concurrency model is supposed to make every one of these unreachable;
/// if one fires, it indicates a bug rather than a runtime condition to
/// recover from.
#[derive(Debug, Error)]
pub enum ProgrammingError {
    /// A live cache entry had no matching LRU node (violates invariant G2).
    #[error("no lru node for live cache entry {name:?}")]
    MissingLruNode {
        /// Name of the entry missing its node.
        name: String,
    },
    /// `transmitting` would have gone negative on release.
    #[error("pin underflow releasing {name:?}")]
    PinUnderflow {
        /// Name of the over-released entry.
        name: String,
    },
    /// Eviction reached the head of the LRU list while bytes were still owed
    /// and entries remained, which should only happen when every remaining
    /// entry is pinned.
    #[error("evict exhausted the lru list with {remaining} bytes still owed")]
    EvictExhausted {
        /// Bytes still required when the walk ran out of candidates.
        remaining: i64,
    },
}

impl ProgrammingError {
    /// Aborts the process with this invariant violation as the message.
    ///
    /// There is no recovery path: by the time this is reachable, the
    /// data structures under the lock are no longer trustworthy.
    pub fn abort(self) -> ! {
        panic!("{self}");
    }
}
