//! Per-request scratch state pooled alongside a connection's buffers.
//!
//! [`Context`] holds the two pieces of state a router/middleware chain needs
//! to stash per request: matched path parameters and a small user-defined
//! key/value bag. Unlike the connection-level buffers in
//! [`crate::server::connection`] (pre-allocated once per worker slot for the
//! lifetime of the program), a `Context` is acquired from a [`ContextPool`]
//! at the start of dispatch and released back to it afterward, following the
//! same "pre-allocate, never drop the slot" discipline.

use std::sync::Mutex;

/// Maximum number of `(key, value)` pairs a [`Context`] can carry.
///
/// Kept small and fixed-size so a `Context` never allocates: entries beyond
/// this are silently dropped by [`Context::insert`].
pub const MAX_ENTRIES: usize = 16;

/// Maximum number of route parameters a [`Context`] can carry (mirrors
/// [`crate::router::MAX_PARAMS`]).
pub const MAX_PARAMS: usize = 8;

/// Per-request scratch state: route parameters plus a small string-keyed bag.
///
/// Acquired from a [`ContextPool`] and released back to it once a request
/// finishes; never allocates on the hot path (entries and params live in
/// fixed-size inline arrays).
#[derive(Debug)]
pub struct Context {
    params: [(&'static str, &'static str); MAX_PARAMS],
    param_count: usize,
    entries: [(&'static str, &'static str); MAX_ENTRIES],
    entry_count: usize,
    #[cfg(debug_assertions)]
    released: bool,
}

impl Context {
    #[inline]
    fn new() -> Self {
        Self {
            params: [("", ""); MAX_PARAMS],
            param_count: 0,
            entries: [("", ""); MAX_ENTRIES],
            entry_count: 0,
            #[cfg(debug_assertions)]
            released: false,
        }
    }

    #[inline]
    fn clear(&mut self) {
        self.param_count = 0;
        self.entry_count = 0;
        #[cfg(debug_assertions)]
        {
            self.released = false;
        }
    }

    /// Appends a route parameter. Silently ignored past [`MAX_PARAMS`].
    #[inline]
    pub(crate) fn push_param(&mut self, name: &'static str, value: &'static str) {
        if let Some(slot) = self.params.get_mut(self.param_count) {
            *slot = (name, value);
            self.param_count += 1;
        }
    }

    /// Looks up a route parameter captured by the router (`:name` or
    /// `*name` segments).
    #[inline]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params[..self.param_count]
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
    }

    /// Iterates over all captured route parameters in match order.
    #[inline]
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params[..self.param_count]
            .iter()
            .map(|(k, v)| (*k, *v))
    }

    /// Stores a value in the request-scoped key/value bag, for passing state
    /// between middlewares and the terminal handler (e.g. the JWT claims
    /// subject extracted by an auth middleware).
    ///
    /// Returns `false` if the bag is already at [`MAX_ENTRIES`] capacity.
    #[inline]
    pub fn insert(&mut self, key: &'static str, value: &'static str) -> bool {
        if let Some(slot) = self.entries.get_mut(self.entry_count) {
            *slot = (key, value);
            self.entry_count += 1;
            true
        } else {
            false
        }
    }

    /// Reads a value previously stored with [`insert`](Self::insert).
    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries[..self.entry_count]
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
    }
}

/// Fixed-capacity free list of [`Context`] slots.
///
/// Pre-allocates `capacity` contexts up front (mirroring how
/// [`crate::server::server_impl::ServerBuilder`] pre-spawns exactly
/// `max_connections` worker slots) and hands them out via
/// [`acquire`](Self::acquire)/[`release`](Self::release). Requests beyond the
/// pool's capacity allocate a fresh `Context` on the spot rather than
/// blocking — the pool is a latency optimization, not a hard admission gate.
pub struct ContextPool {
    free: Mutex<Vec<Box<Context>>>,
}

impl ContextPool {
    /// Builds a pool with `capacity` pre-allocated contexts.
    pub fn new(capacity: usize) -> Self {
        let free = (0..capacity).map(|_| Box::new(Context::new())).collect();
        Self {
            free: Mutex::new(free),
        }
    }

    /// Acquires a context, reusing a pooled slot when one is free.
    pub fn acquire(&self) -> PooledContext<'_> {
        let slot = self
            .free
            .lock()
            .expect("context pool mutex poisoned")
            .pop()
            .unwrap_or_else(|| Box::new(Context::new()));

        PooledContext { pool: self, slot: Some(slot) }
    }
}

/// RAII handle returned by [`ContextPool::acquire`].
///
/// Releases the underlying [`Context`] back to the pool on drop. Debug
/// builds assert the slot isn't released twice.
pub struct PooledContext<'a> {
    pool: &'a ContextPool,
    slot: Option<Box<Context>>,
}

impl std::ops::Deref for PooledContext<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.slot.as_ref().expect("context already released")
    }
}

impl std::ops::DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.slot.as_mut().expect("context already released")
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        let Some(mut slot) = self.slot.take() else {
            return;
        };

        #[cfg(debug_assertions)]
        {
            debug_assert!(!slot.released, "context released twice");
            slot.released = true;
        }
        slot.clear();

        if let Ok(mut free) = self.pool.free.lock() {
            free.push(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_and_entries_round_trip() {
        let mut ctx = Context::new();
        ctx.push_param("id", "42");
        ctx.insert("user", "alice");

        assert_eq!(ctx.param("id"), Some("42"));
        assert_eq!(ctx.get("user"), Some("alice"));
        assert_eq!(ctx.param("missing"), None);
    }

    #[test]
    fn entries_beyond_capacity_are_rejected() {
        let mut ctx = Context::new();
        for i in 0..MAX_ENTRIES {
            assert!(ctx.insert("k", if i % 2 == 0 { "a" } else { "b" }));
        }
        assert!(!ctx.insert("overflow", "value"));
    }

    #[test]
    fn pool_reuses_released_slots() {
        let pool = ContextPool::new(1);
        {
            let mut ctx = pool.acquire();
            ctx.push_param("x", "1");
        }
        let ctx = pool.acquire();
        // Slot was cleared on release.
        assert_eq!(ctx.param("x"), None);
    }

    #[test]
    fn pool_grows_past_capacity_without_blocking() {
        let pool = ContextPool::new(1);
        let _a = pool.acquire();
        let _b = pool.acquire();
        let _c = pool.acquire();
    }
}
