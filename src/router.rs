//! Exact/longest-prefix URI dispatch with per-route protection.

use crate::{
    catalog::djb2,
    http::{request::Request, response::Handled, response::Response, types::Method},
};
use std::sync::Arc;

/// Synchronous request handler, invoked once the full body is available.
pub trait Handler: Send + Sync {
    /// Produces the response for a fully-buffered request.
    fn handle(&self, request: &Request, response: &mut Response) -> Handled;
}

/// Streaming request handler for routes marked via [`Router::route_async`].
///
/// Invoked with whatever body prefix has already arrived (possibly
/// empty) the moment the headers are parsed; the handler is responsible
/// for arranging to consume the remainder (e.g. via a transfer), per the
/// glossary's definition of an async route.
pub trait AsyncHandler: Send + Sync {
    /// Produces (or defers) the response given a partial body.
    fn handle_partial(&self, request: &Request, partial_body: &[u8], response: &mut Response) -> Handled;
}

/// Pre-handler gate. May influence the in-flight response (status 204 to
/// short-circuit with no body, 4xx/5xx to reject) but never runs the
/// route handler itself — the engine reads the response state it left
/// behind.
pub trait Protect: Send + Sync {
    /// Runs before the route handler for `method uri`.
    fn protect(&self, method: Method, uri: &[u8], response: &mut Response);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchMode {
    Exact,
    Prefix,
}

struct RouteEntry {
    uri: &'static [u8],
    signature: u32,
    mode: MatchMode,
    handler: Arc<dyn Handler>,
    async_handler: Option<Arc<dyn AsyncHandler>>,
    protect: Option<Arc<dyn Protect>>,
    next: i32,
}

/// Bounded route table keyed by URI signature. Route ids are 1-based; id `0` is reserved for
/// [`Router::protect_route`]'s "install the global protect callback" case.
pub struct Router {
    entries: Vec<Option<RouteEntry>>,
    buckets: Vec<i32>,
    free: Vec<usize>,
    global_protect: Option<Arc<dyn Protect>>,
    capacity: usize,
}

impl Router {
    pub(crate) fn new(capacity: usize) -> Self {
        let bucket_count = capacity.max(1).next_power_of_two();
        Self {
            entries: Vec::with_capacity(capacity),
            buckets: vec![-1; bucket_count],
            free: Vec::new(),
            global_protect: None,
            capacity,
        }
    }

    #[inline(always)]
    fn bucket_of(&self, signature: u32) -> usize {
        (signature as usize) & (self.buckets.len() - 1)
    }

    fn insert(&mut self, uri: &'static [u8], mode: MatchMode, handler: Arc<dyn Handler>) -> Option<usize> {
        let signature = djb2(uri);
        let entry = RouteEntry {
            uri,
            signature,
            mode,
            handler,
            async_handler: None,
            protect: None,
            next: -1,
        };

        let index = if let Some(index) = self.free.pop() {
            self.entries[index] = Some(entry);
            index
        } else {
            if self.entries.len() >= self.capacity {
                return None;
            }
            self.entries.push(Some(entry));
            self.entries.len() - 1
        };

        let bucket = self.bucket_of(signature);
        self.entries[index].as_mut().unwrap().next = self.buckets[bucket];
        self.buckets[bucket] = index as i32;

        Some(index)
    }

    /// Registers `uri` as an exact-match route. Returns `None` if the
    /// route table is full.
    pub fn route_exact(&mut self, uri: &'static [u8], handler: impl Handler + 'static) -> Option<usize> {
        self.insert(uri, MatchMode::Exact, Arc::new(handler))
            .map(|i| i + 1)
    }

    /// Registers `uri` as a prefix route, matching `uri` itself and any
    /// path beginning with `uri/`.
    pub fn route_prefix(&mut self, uri: &'static [u8], handler: impl Handler + 'static) -> Option<usize> {
        self.insert(uri, MatchMode::Prefix, Arc::new(handler))
            .map(|i| i + 1)
    }

    /// Marks an existing route able to receive its body in streaming mode.
    pub fn route_async(&mut self, id: usize, handler: impl AsyncHandler + 'static) {
        if let Some(Some(entry)) = id.checked_sub(1).map(|i| &mut self.entries[i]) {
            entry.async_handler = Some(Arc::new(handler));
        }
    }

    /// Installs a protect callback. `id == 0` installs the global
    /// callback that runs ahead of every route's own.
    pub fn protect_route(&mut self, id: usize, cb: impl Protect + 'static) {
        if id == 0 {
            self.global_protect = Some(Arc::new(cb));
            return;
        }
        if let Some(Some(entry)) = id.checked_sub(1).map(|i| &mut self.entries[i]) {
            entry.protect = Some(Arc::new(cb));
        }
    }

    /// Looks up the route for `uri`: exact match on the full URI first,
    /// then successively-stripped `/segment` prefixes, finally the root
    /// `/` prefix route.
    pub(crate) fn route_find(&self, uri: &[u8]) -> Option<usize> {
        if let Some(index) = self.find_exact(uri) {
            return Some(index);
        }

        let mut candidate = uri;
        loop {
            if let Some(index) = self.find_prefix(candidate) {
                return Some(index);
            }
            match candidate.iter().rposition(|&b| b == b'/') {
                Some(0) | None => break,
                Some(pos) => candidate = &candidate[..pos],
            }
        }

        self.find_prefix(b"/")
    }

    fn find_exact(&self, uri: &[u8]) -> Option<usize> {
        self.walk_bucket(uri, MatchMode::Exact)
    }

    fn find_prefix(&self, uri: &[u8]) -> Option<usize> {
        self.walk_bucket(uri, MatchMode::Prefix)
    }

    fn walk_bucket(&self, uri: &[u8], mode: MatchMode) -> Option<usize> {
        let signature = djb2(uri);
        let mut cursor = self.buckets[self.bucket_of(signature)];
        while cursor != -1 {
            let entry = self.entries[cursor as usize].as_ref().unwrap();
            if entry.mode == mode && entry.signature == signature && entry.uri == uri {
                return Some(cursor as usize + 1);
            }
            cursor = entry.next;
        }
        None
    }

    /// Removes the route registered for `uri`, freeing its slot for
    /// reuse by a later `route_exact`/`route_prefix` call.
    pub fn route_remove(&mut self, uri: &[u8]) {
        let signature = djb2(uri);
        let bucket = self.bucket_of(signature);

        let mut cursor = self.buckets[bucket];
        let mut prev: Option<usize> = None;
        while cursor != -1 {
            let index = cursor as usize;
            let entry = self.entries[index].as_ref().unwrap();
            if entry.signature == signature && entry.uri == uri {
                let next = entry.next;
                match prev {
                    Some(p) => self.entries[p].as_mut().unwrap().next = next,
                    None => self.buckets[bucket] = next,
                }
                self.entries[index] = None;
                self.free.push(index);
                return;
            }
            prev = Some(index);
            cursor = entry.next;
        }
    }

    pub(crate) fn handler(&self, id: usize) -> Option<&Arc<dyn Handler>> {
        self.entries.get(id.checked_sub(1)?)?.as_ref().map(|e| &e.handler)
    }

    pub(crate) fn async_handler(&self, id: usize) -> Option<&Arc<dyn AsyncHandler>> {
        self.entries.get(id.checked_sub(1)?)?.as_ref()?.async_handler.as_ref()
    }

    pub(crate) fn route_protect(&self, id: usize) -> Option<&Arc<dyn Protect>> {
        self.entries.get(id.checked_sub(1)?)?.as_ref()?.protect.as_ref()
    }

    pub(crate) fn global_protect(&self) -> Option<&Arc<dyn Protect>> {
        self.global_protect.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatusCode;

    struct Ok200;
    impl Handler for Ok200 {
        fn handle(&self, _: &Request, resp: &mut Response) -> Handled {
            resp.status(StatusCode::Ok).body(&[])
        }
    }

    #[rustfmt::skip]
    #[test]
    fn lookup_order_exact_then_prefix_then_root() {
        let mut router = Router::new(16);
        router.route_prefix(b"/", Ok200);
        router.route_prefix(b"/api", Ok200);
        router.route_exact(b"/api/users", Ok200);

        let cases: &[(&[u8], &[u8])] = &[
            (b"/api/users",       b"/api/users"),
            (b"/api/users/123",   b"/api"),
            (b"/anything/else",   b"/"),
        ];

        for &(uri, expect_uri) in cases {
            let id = router.route_find(uri).expect("route should match");
            let found = router.entries[id - 1].as_ref().unwrap();
            assert_eq!(found.uri, expect_uri, "uri {:?}", uri);
        }
    }

    #[test]
    fn no_match_without_root_prefix() {
        let mut router = Router::new(16);
        router.route_exact(b"/only", Ok200);
        assert_eq!(router.route_find(b"/missing"), None);
    }

    #[test]
    fn remove_frees_slot_for_reuse() {
        let mut router = Router::new(2);
        let id = router.route_exact(b"/a", Ok200).unwrap();
        router.route_remove(b"/a");
        assert_eq!(router.route_find(b"/a"), None);

        let id2 = router.route_exact(b"/b", Ok200).unwrap();
        assert_eq!(id, id2, "freed slot should be reused");
    }
}
