//! The `request` collaborator contract.
//!
//! Parsing an incoming connection, reading a file from disk, and writing
//! bytes back to a client are all out of scope for this crate (see the
//! crate-level documentation). What *is* in scope is the narrow interface
//! the worker loop uses to talk to whatever implements those concerns.
//!
//! An embedder provides a [`RequestHandler`] and a connection-handle type
//! `C` (an OS file descriptor, a `TcpStream`, a mock in a test harness,
//! anything `Send`). The dispatcher core never interprets `C`; it only
//! shuttles it between the request buffer and a worker.

/// An immutable-after-publish file payload.
///
/// Two instances exist per served request when the cache is enabled: one
/// owned by the in-flight [`Request`](crate::request::RequestHandler), one
/// owned by the cache entry if the file is cached. Equality for cache
/// purposes is by `name` only; `bytes` and `size` are not compared.
#[derive(Debug, Clone, Default)]
pub struct FileData {
    /// Name of the requested file. Doubles as the cache key.
    pub name: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
    /// Number of bytes in `bytes`. Tracked separately so a cache entry can
    /// report its size without holding a borrow on `bytes`.
    pub size: u64,
}

impl FileData {
    /// Creates an empty `FileData` ready to be filled in by
    /// [`RequestHandler::request_init`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `bytes` and updates `size` to match.
    pub fn set_bytes(&mut self, bytes: Vec<u8>) {
        self.size = bytes.len() as u64;
        self.bytes = bytes;
    }
}

/// The external collaborator contract described in the crate's interface
/// specification.
///
/// Implementations own the wire format, the filesystem, and the socket.
/// The dispatcher core calls these four methods in sequence for every
/// connection it dequeues; it never inspects `FileData.bytes` itself
/// except to copy them into or out of a cache entry.
///
/// `C` is the connection-handle type threaded through `submit`/`init`; it
/// is typically an OS file descriptor but any `Send` type works (tests use
/// a plain in-memory channel, for instance).
pub trait RequestHandler<C>: Send + Sync {
    /// Parses the incoming request on `fd`, writing the requested file's
    /// name into `file.name`.
    ///
    /// Returns `false` on malformed input ([`crate::error::Outcome::MalformedRequest`]);
    /// the caller closes the connection without reading a file.
    fn request_init(&self, fd: &C, file: &mut FileData) -> bool;

    /// Reads the file named in `file.name` from disk, filling `file.bytes`
    /// and `file.size`.
    ///
    /// Returns `false` on failure ([`crate::error::Outcome::DiskReadFailed`]);
    /// the cache is left untouched.
    fn request_readfile(&self, file: &mut FileData) -> bool;

    /// Writes `file`'s bytes to `fd` in whatever wire format this
    /// collaborator implements. Never fails observably to the core; any
    /// I/O error is the embedder's concern.
    fn request_sendfile(&self, fd: &C, file: &FileData);

    /// Releases any resources associated with `fd` (closes the
    /// connection). Called exactly once per dequeued descriptor.
    fn request_destroy(&self, fd: C);
}
