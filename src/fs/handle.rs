//! Open read handles.
//!
//! Each handle carries its path, a readahead buffer covering one contiguous
//! byte window, and a lazily created HTTP client so sequential reads reuse
//! the connection. The buffer is per-handle: two players seeking
//! independently in the same file must not thrash a shared window.

use bytes::Bytes;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A contiguous window `[start, end)` of remote bytes held in memory.
#[derive(Debug, Clone, Default)]
pub struct ReadBuffer {
    pub start: u64,
    pub end: u64,
    pub data: Bytes,
}

impl ReadBuffer {
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when the inclusive request range lies fully inside the window.
    pub fn covers(&self, start: u64, end_inclusive: u64) -> bool {
        !self.data.is_empty() && start >= self.start && end_inclusive + 1 <= self.end
    }

    /// Slice the inclusive request range out of the window. Caller must have
    /// checked [`covers`](Self::covers) first.
    pub fn slice(&self, start: u64, end_inclusive: u64) -> Bytes {
        let from = (start - self.start) as usize;
        let to = (end_inclusive + 1 - self.start) as usize;
        self.data.slice(from..to)
    }
}

/// Mutable per-handle state, locked for the duration of one read.
#[derive(Debug, Default)]
pub struct HandleState {
    pub buffer: ReadBuffer,
    pub client: Option<Client>,
}

/// One open file handle.
#[derive(Debug)]
pub struct OpenHandle {
    pub fh: u64,
    pub path: String,
    pub state: tokio::sync::Mutex<HandleState>,
}

/// Component C5: table of open handles.
#[derive(Debug)]
pub struct HandleTable {
    next_handle: AtomicU64,
    handles: Mutex<HashMap<u64, Arc<OpenHandle>>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            // 0 is reserved as the invalid handle.
            next_handle: AtomicU64::new(1),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Open a new handle for a path with an empty buffer and no HTTP client.
    pub fn allocate(&self, path: &str) -> u64 {
        let mut fh = self.next_handle.fetch_add(1, Ordering::SeqCst);
        if fh == 0 {
            fh = self.next_handle.fetch_add(1, Ordering::SeqCst);
        }

        let handle = Arc::new(OpenHandle {
            fh,
            path: path.to_string(),
            state: tokio::sync::Mutex::new(HandleState::default()),
        });

        self.handles
            .lock()
            .expect("handle table lock poisoned")
            .insert(fh, handle);
        fh
    }

    pub fn get(&self, fh: u64) -> Option<Arc<OpenHandle>> {
        self.handles
            .lock()
            .expect("handle table lock poisoned")
            .get(&fh)
            .cloned()
    }

    /// Remove a handle. The HTTP client is dropped (and its connections
    /// closed) when the last reference goes away.
    pub fn remove(&self, fh: u64) -> Option<Arc<OpenHandle>> {
        self.handles
            .lock()
            .expect("handle table lock poisoned")
            .remove(&fh)
    }

    pub fn len(&self) -> usize {
        self.handles
            .lock()
            .expect("handle table lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
