//! A concurrent file-serving dispatch core.
//!
//! This crate implements the producer/consumer request buffer, fixed
//! worker thread pool, and pinned-LRU content cache that sit between a
//! connection acceptor and a request handler in a small, multi-threaded
//! web server. It does not parse HTTP, read files, or write to sockets
//! itself — those concerns belong to the [`RequestHandler`] an embedder
//! supplies, which this crate calls back into at the right moments while
//! holding (or deliberately not holding) its single internal lock.
//!
//! # Architecture
//!
//! ```text
//! submit(fd) ──▶ [ request buffer ] ──▶ worker thread ──▶ request handler
//!                 (bounded ring,                │               │
//!                  one global lock)             ▼               ▼
//!                                         [ content cache ]  disk / network
//!                                         (hash table + LRU,
//!                                          same global lock)
//! ```
//!
//! A single [`parking_lot::Mutex`] guards both the request buffer and
//! the content cache; two [`parking_lot::Condvar`]s attached to it
//! implement the buffer's blocking push/pop protocol. Every critical
//! section here is a handful of pointer operations — disk reads and
//! network sends always happen with the lock released, and an in-flight
//! send can never have its cache entry evicted out from under it because
//! [`Server`] pins an entry for the duration of the send.
//!
//! # Example
//!
//! ```no_run
//! use dispatch_core::{FileData, RequestHandler, Server};
//!
//! struct Disk;
//!
//! impl RequestHandler<i32> for Disk {
//!     fn request_init(&self, _fd: &i32, file: &mut FileData) -> bool {
//!         file.name = "index.html".to_string();
//!         true
//!     }
//!     fn request_readfile(&self, file: &mut FileData) -> bool {
//!         file.set_bytes(b"hello".to_vec());
//!         true
//!     }
//!     fn request_sendfile(&self, _fd: &i32, _file: &FileData) {}
//!     fn request_destroy(&self, _fd: i32) {}
//! }
//!
//! let server = Server::init(4, 64, 1 << 20, Disk);
//! server.submit(7);
//! ```

mod buffer;
mod cache;
mod error;
mod list;
mod request;
mod server;

pub use error::{Outcome, ProgrammingError};
pub use request::{FileData, RequestHandler};
pub use server::Server;
