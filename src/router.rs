//! Radix-style route matching: dispatches a request to a registered handler
//! by method and path, capturing `:param` and `*wildcard` segments into the
//! per-request [`Context`].
//!
//! [`Router`] itself implements [`Handler`], so it can be installed directly
//! as a server's top-level handler (optionally wrapped by a
//! [`crate::middleware`] chain) without any glue code in the connection loop.

use crate::{
    context::{Context, ContextPool},
    http::{request::Request, response::{Handled, Response}},
    server::connection::ConnectionData,
    Handler, Method, StatusCode,
};
use std::{future::Future, pin::Pin, sync::Arc};

/// Maximum number of `:param`/`*wildcard` segments a single route pattern
/// may declare (mirrors [`crate::context::MAX_PARAMS`]).
pub const MAX_PARAMS: usize = 8;

const METHOD_COUNT: usize = 7;

#[inline(always)]
const fn method_index(method: Method) -> usize {
    match method {
        Method::Get => 0,
        Method::Put => 1,
        Method::Post => 2,
        Method::Head => 3,
        Method::Patch => 4,
        Method::Delete => 5,
        Method::Options => 6,
    }
}

const ALL_METHODS: [Method; METHOD_COUNT] = [
    Method::Get,
    Method::Put,
    Method::Post,
    Method::Head,
    Method::Patch,
    Method::Delete,
    Method::Options,
];

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single route's handler: like [`Handler`], but additionally receives the
/// per-request [`Context`] the router populated with captured path
/// parameters.
///
/// # Examples
/// ```
/// use shockwave::{router::RouteHandler, Context, Request, Response, Handled, StatusCode};
///
/// struct ShowUser;
///
/// impl RouteHandler for ShowUser {
///     async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response, ctx: &mut Context) -> Handled {
///         let id = ctx.param("id").unwrap_or("?");
///         resp.status(StatusCode::Ok).body(format!("user {id}"))
///     }
/// }
/// ```
pub trait RouteHandler<S = ()>: Sync + Send + 'static
where
    S: ConnectionData,
{
    /// Processes a matched request.
    fn handle(
        &self,
        connection_data: &mut S,
        request: &Request,
        response: &mut Response,
        context: &mut Context,
    ) -> impl Future<Output = Handled> + Send;
}

/// Blanket-implemented, object-safe counterpart of [`RouteHandler`].
///
/// `RouteHandler::handle` returns `impl Future`, which cannot appear in a
/// `dyn` trait object. This trait boxes that future so routes of different
/// concrete types can live in the same [`Router`] node.
trait DynRouteHandler<S>: Sync + Send {
    fn call<'a>(
        &'a self,
        connection_data: &'a mut S,
        request: &'a Request,
        response: &'a mut Response,
        context: &'a mut Context,
    ) -> BoxFuture<'a, Handled>;
}

impl<S, H> DynRouteHandler<S> for H
where
    S: ConnectionData,
    H: RouteHandler<S>,
{
    fn call<'a>(
        &'a self,
        connection_data: &'a mut S,
        request: &'a Request,
        response: &'a mut Response,
        context: &'a mut Context,
    ) -> BoxFuture<'a, Handled> {
        Box::pin(self.handle(connection_data, request, response, context))
    }
}

type Route<S> = Arc<dyn DynRouteHandler<S>>;

/// Why a [`Router::route`] registration was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteConflict {
    /// A route already exists for this exact method and pattern.
    Duplicate { method: Method, pattern: String },
    /// A pattern segment disagrees with an already-registered sibling about
    /// whether the segment is static, a param, or a wildcard
    /// (e.g. `/users/:id` vs `/users/*rest` at the same position).
    SegmentKindMismatch { pattern: String, segment: String },
    /// A wildcard (`*name`) was used anywhere but the final segment.
    WildcardNotTerminal { pattern: String },
    /// A wildcard was registered at a tree position that already has static
    /// or param siblings, or vice versa.
    WildcardWithSiblings { pattern: String },
    /// A pattern declares more than [`MAX_PARAMS`] `:param`/`*wildcard`
    /// segments.
    TooManyParams { pattern: String },
}

impl std::fmt::Display for RouteConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate { method, pattern } => {
                write!(f, "route already registered: {method:?} {pattern}")
            }
            Self::SegmentKindMismatch { pattern, segment } => {
                write!(f, "segment `{segment}` in `{pattern}` conflicts with a sibling of a different kind")
            }
            Self::WildcardNotTerminal { pattern } => {
                write!(f, "wildcard segment in `{pattern}` must be the last segment")
            }
            Self::WildcardWithSiblings { pattern } => {
                write!(f, "wildcard segment in `{pattern}` cannot share a position with other route segments")
            }
            Self::TooManyParams { pattern } => {
                write!(f, "pattern `{pattern}` declares more than {MAX_PARAMS} param/wildcard segments")
            }
        }
    }
}

impl std::error::Error for RouteConflict {}

enum Segment {
    Static(String),
    Param(&'static str),
    Wildcard(&'static str),
}

fn split_pattern(pattern: &'static str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if let Some(name) = s.strip_prefix(':') {
                Segment::Param(name)
            } else if let Some(name) = s.strip_prefix('*') {
                Segment::Wildcard(name)
            } else {
                Segment::Static(s.to_owned())
            }
        })
        .collect()
}

struct Node<S> {
    literal: String,
    param_name: Option<&'static str>,
    children: Vec<Node<S>>,
    param_child: Option<Box<Node<S>>>,
    wildcard: Option<(&'static str, Box<[Option<Route<S>>; METHOD_COUNT]>)>,
    methods: [Option<Route<S>>; METHOD_COUNT],
}

impl<S: ConnectionData> Node<S> {
    fn new(literal: String, param_name: Option<&'static str>) -> Self {
        Self {
            literal,
            param_name,
            children: Vec::new(),
            param_child: None,
            wildcard: None,
            methods: Default::default(),
        }
    }

    fn insert(
        &mut self,
        segments: &[Segment],
        full_pattern: &'static str,
        method: Method,
        handler: Route<S>,
    ) -> Result<(), RouteConflict> {
        let Some(segment) = segments.first() else {
            let slot = &mut self.methods[method_index(method)];
            if slot.is_some() {
                return Err(RouteConflict::Duplicate {
                    method,
                    pattern: full_pattern.to_owned(),
                });
            }
            *slot = Some(handler);
            return Ok(());
        };

        match segment {
            Segment::Static(text) => {
                if self.wildcard.is_some() {
                    return Err(RouteConflict::WildcardWithSiblings {
                        pattern: full_pattern.to_owned(),
                    });
                }
                if let Some(child) = self.children.iter_mut().find(|c| &c.literal == text) {
                    return child.insert(&segments[1..], full_pattern, method, handler);
                }
                let mut child = Node::new(text.clone(), None);
                child.insert(&segments[1..], full_pattern, method, handler)?;
                self.children.push(child);
                Ok(())
            }
            Segment::Param(name) => {
                if self.wildcard.is_some() {
                    return Err(RouteConflict::WildcardWithSiblings {
                        pattern: full_pattern.to_owned(),
                    });
                }
                if let Some(child) = &mut self.param_child {
                    // One capture slot per tree position: two patterns that
                    // both place a param here must agree on its name, or a
                    // handler could silently read the wrong bound value
                    // depending on registration order.
                    if child.param_name != Some(*name) {
                        return Err(RouteConflict::SegmentKindMismatch {
                            pattern: full_pattern.to_owned(),
                            segment: format!(":{name}"),
                        });
                    }
                    return child.insert(&segments[1..], full_pattern, method, handler);
                }
                let mut child = Node::new(String::new(), Some(*name));
                child.insert(&segments[1..], full_pattern, method, handler)?;
                self.param_child = Some(Box::new(child));
                Ok(())
            }
            Segment::Wildcard(name) => {
                if segments.len() != 1 {
                    return Err(RouteConflict::WildcardNotTerminal {
                        pattern: full_pattern.to_owned(),
                    });
                }
                if !self.children.is_empty() || self.param_child.is_some() {
                    return Err(RouteConflict::WildcardWithSiblings {
                        pattern: full_pattern.to_owned(),
                    });
                }
                if let Some((existing_name, _)) = &self.wildcard {
                    if *existing_name != *name {
                        return Err(RouteConflict::SegmentKindMismatch {
                            pattern: full_pattern.to_owned(),
                            segment: format!("*{name}"),
                        });
                    }
                }
                let (_, table) = self
                    .wildcard
                    .get_or_insert_with(|| (*name, Box::new(Default::default())));
                let slot = &mut table[method_index(method)];
                if slot.is_some() {
                    return Err(RouteConflict::Duplicate {
                        method,
                        pattern: full_pattern.to_owned(),
                    });
                }
                *slot = Some(handler);
                Ok(())
            }
        }
    }
}

/// Outcome of matching a path against the tree, independent of method.
enum Lookup<'n, S> {
    /// No node along the path matched at all.
    NotFound,
    /// A node matched the path but has no handler for the requested method.
    /// Carries the set of methods that *do* have a handler there, for the
    /// `Allow` header on a `405`.
    MethodMismatch(Vec<Method>),
    Matched(&'n Route<S>),
}

/// A radix-style HTTP router.
///
/// Routes are registered once at startup via [`route`](Self::route) (or the
/// `get`/`post`/... shorthands) and never change afterward; lookups only
/// read the tree, so no synchronization is needed on the hot path.
///
/// # Examples
/// ```
/// use shockwave::{router::{Router, RouteHandler}, Context, Request, Response, Handled, StatusCode};
///
/// struct Hello;
/// impl RouteHandler for Hello {
///     async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response, _: &mut Context) -> Handled {
///         resp.status(StatusCode::Ok).body("hello")
///     }
/// }
///
/// let mut router = Router::<()>::new(64);
/// router.get("/hello", Hello).unwrap();
/// ```
pub struct Router<S = ()>
where
    S: ConnectionData,
{
    root: Node<S>,
    contexts: ContextPool,
}

impl<S: ConnectionData> Router<S> {
    /// Builds an empty router with a context pool pre-sized for
    /// `expected_concurrency` in-flight requests.
    pub fn new(expected_concurrency: usize) -> Self {
        Self {
            root: Node::new(String::new(), None),
            contexts: ContextPool::new(expected_concurrency),
        }
    }

    /// Registers a handler for `method` at `pattern`.
    ///
    /// `pattern` segments starting with `:` capture a single path segment
    /// (e.g. `:id`); a segment starting with `*` captures the remainder of
    /// the path including any `/` separators and must be last (e.g.
    /// `/files/*path`).
    pub fn route(
        &mut self,
        method: Method,
        pattern: &'static str,
        handler: impl RouteHandler<S>,
    ) -> Result<&mut Self, RouteConflict> {
        let segments = split_pattern(pattern);
        let param_count = segments
            .iter()
            .filter(|s| matches!(s, Segment::Param(_) | Segment::Wildcard(_)))
            .count();
        if param_count > MAX_PARAMS {
            return Err(RouteConflict::TooManyParams {
                pattern: pattern.to_owned(),
            });
        }
        self.root
            .insert(&segments, pattern, method, Arc::new(handler))?;
        Ok(self)
    }

    /// Shorthand for `route(Method::Get, ..)`.
    pub fn get(
        &mut self,
        pattern: &'static str,
        handler: impl RouteHandler<S>,
    ) -> Result<&mut Self, RouteConflict> {
        self.route(Method::Get, pattern, handler)
    }

    /// Shorthand for `route(Method::Post, ..)`.
    pub fn post(
        &mut self,
        pattern: &'static str,
        handler: impl RouteHandler<S>,
    ) -> Result<&mut Self, RouteConflict> {
        self.route(Method::Post, pattern, handler)
    }

    /// Shorthand for `route(Method::Put, ..)`.
    pub fn put(
        &mut self,
        pattern: &'static str,
        handler: impl RouteHandler<S>,
    ) -> Result<&mut Self, RouteConflict> {
        self.route(Method::Put, pattern, handler)
    }

    /// Shorthand for `route(Method::Patch, ..)`.
    pub fn patch(
        &mut self,
        pattern: &'static str,
        handler: impl RouteHandler<S>,
    ) -> Result<&mut Self, RouteConflict> {
        self.route(Method::Patch, pattern, handler)
    }

    /// Shorthand for `route(Method::Delete, ..)`.
    pub fn delete(
        &mut self,
        pattern: &'static str,
        handler: impl RouteHandler<S>,
    ) -> Result<&mut Self, RouteConflict> {
        self.route(Method::Delete, pattern, handler)
    }

    fn lookup<'r>(
        &'r self,
        segments: &[&'static [u8]],
        path: &'static [u8],
        method: Method,
        ctx: &mut Context,
    ) -> Lookup<'r, S> {
        Self::walk(&self.root, segments, path, method, ctx)
    }

    fn walk<'r>(
        node: &'r Node<S>,
        segments: &[&'static [u8]],
        path: &'static [u8],
        method: Method,
        ctx: &mut Context,
    ) -> Lookup<'r, S> {
        let Some((head, rest)) = segments.split_first() else {
            return match &node.methods[method_index(method)] {
                Some(route) => Lookup::Matched(route),
                None => {
                    let allowed = ALL_METHODS
                        .into_iter()
                        .filter(|m| node.methods[method_index(*m)].is_some())
                        .collect::<Vec<_>>();
                    if allowed.is_empty() {
                        Lookup::NotFound
                    } else {
                        Lookup::MethodMismatch(allowed)
                    }
                }
            };
        };

        if let Some(text) = std::str::from_utf8(head).ok() {
            if let Some(child) = node.children.iter().find(|c| c.literal == text) {
                match Self::walk(child, rest, path, method, ctx) {
                    Lookup::NotFound => {}
                    found => return found,
                }
            }
        }

        if let Some(child) = &node.param_child {
            if let Some(name) = child.param_name {
                if let Ok(value) = std::str::from_utf8(head) {
                    ctx.push_param(name, value);
                    match Self::walk(child, rest, path, method, ctx) {
                        Lookup::NotFound => {}
                        found => return found,
                    }
                }
            }
        }

        if let Some((name, table)) = &node.wildcard {
            if let Some(value) = wildcard_remainder(path, head) {
                ctx.push_param(name, value);
                return match &table[method_index(method)] {
                    Some(route) => Lookup::Matched(route),
                    None => {
                        let allowed = ALL_METHODS
                            .into_iter()
                            .filter(|m| table[method_index(*m)].is_some())
                            .collect::<Vec<_>>();
                        if allowed.is_empty() {
                            Lookup::NotFound
                        } else {
                            Lookup::MethodMismatch(allowed)
                        }
                    }
                };
            }
        }

        Lookup::NotFound
    }
}

/// Reconstructs the raw remainder of `path` starting at `first_segment`,
/// including interior `/` separators, by exploiting that [`Url::path_segments`]
/// are themselves byte-slice views into `path`'s backing buffer.
///
/// [`Url::path_segments`]: crate::Url::path_segments
fn wildcard_remainder(path: &'static [u8], first_segment: &'static [u8]) -> Option<&'static str> {
    let path_start = path.as_ptr() as usize;
    let path_end = path_start + path.len();
    let seg_start = first_segment.as_ptr() as usize;

    if seg_start < path_start || seg_start > path_end {
        return None;
    }

    let offset = seg_start - path_start;
    std::str::from_utf8(&path[offset..]).ok()
}

impl<S: ConnectionData> Handler<S> for Router<S> {
    async fn handle(&self, connection_data: &mut S, request: &Request, response: &mut Response) -> Handled {
        let mut ctx = self.contexts.acquire();
        let segments = request.url().path_segments();

        match self.lookup(segments, request.url().path(), request.method(), &mut ctx) {
            Lookup::Matched(route) => route.call(connection_data, request, response, &mut ctx).await,
            Lookup::MethodMismatch(allowed) => {
                tracing::debug!(method = ?request.method(), path = %String::from_utf8_lossy(request.url().path()), "method not allowed");
                let names: Vec<&str> = allowed.iter().map(method_name).collect();
                response
                    .status(StatusCode::MethodNotAllowed)
                    .header_multi("allow", ", ", names)
                    .body("Method not allowed")
            }
            Lookup::NotFound => {
                tracing::debug!(path = %String::from_utf8_lossy(request.url().path()), "route not found");
                response.status(StatusCode::NotFound).body("Not found")
            }
        }
    }
}

fn method_name(method: &Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::Put => "PUT",
        Method::Post => "POST",
        Method::Head => "HEAD",
        Method::Patch => "PATCH",
        Method::Delete => "DELETE",
        Method::Options => "OPTIONS",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::{ReqLimits, RespLimits};

    struct Echo(&'static str);
    impl RouteHandler for Echo {
        async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response, ctx: &mut Context) -> Handled {
            let param = ctx.param("id").unwrap_or("");
            resp.status(StatusCode::Ok).body(format!("{}:{param}", self.0))
        }
    }

    fn blank_request() -> Request {
        Request::new(&ReqLimits::default())
    }

    fn blank_response() -> Response {
        Response::new(&RespLimits::default())
    }

    fn blank_context_pool() -> ContextPool {
        ContextPool::new(1)
    }

    /// Splits a path the same way [`crate::http::request`] does: segments
    /// must stay real subslices of `path`'s backing buffer so
    /// [`wildcard_remainder`] can reconstruct multi-segment captures.
    fn split_path(path: &'static [u8]) -> Vec<&'static [u8]> {
        path.split(|&b| b == b'/').filter(|s| !s.is_empty()).collect()
    }

    #[test]
    fn static_route_matches() {
        let mut router = Router::<()>::new(4);
        router.get("/health", Echo("health")).unwrap();
        assert!(router.root.children.iter().any(|c| c.literal == "health"));
    }

    #[test]
    fn duplicate_route_is_rejected() {
        let mut router = Router::<()>::new(4);
        router.get("/health", Echo("a")).unwrap();
        let err = router.get("/health", Echo("b")).unwrap_err();
        assert!(matches!(err, RouteConflict::Duplicate { .. }));
    }

    #[test]
    fn wildcard_must_be_terminal() {
        let mut router = Router::<()>::new(4);
        let err = router.get("/files/*rest/extra", Echo("x")).unwrap_err();
        assert!(matches!(err, RouteConflict::WildcardNotTerminal { .. }));
    }

    #[test]
    fn wildcard_rejects_existing_siblings() {
        let mut router = Router::<()>::new(4);
        router.get("/files/:id", Echo("a")).unwrap();
        let err = router.post("/files/*rest", Echo("b")).unwrap_err();
        assert!(matches!(err, RouteConflict::WildcardWithSiblings { .. }));
    }

    #[test]
    fn sibling_rejects_existing_wildcard() {
        let mut router = Router::<()>::new(4);
        router.get("/files/*rest", Echo("a")).unwrap();
        let err = router.post("/files/:id", Echo("b")).unwrap_err();
        assert!(matches!(err, RouteConflict::WildcardWithSiblings { .. }));

        let mut router = Router::<()>::new(4);
        router.get("/files/*rest", Echo("a")).unwrap();
        let err = router.post("/files/static", Echo("b")).unwrap_err();
        assert!(matches!(err, RouteConflict::WildcardWithSiblings { .. }));
    }

    #[test]
    fn pattern_with_too_many_params_is_rejected() {
        let mut router = Router::<()>::new(4);
        let err = router
            .get("/:a/:b/:c/:d/:e/:f/:g/:h/:i", Echo("x"))
            .unwrap_err();
        assert!(matches!(err, RouteConflict::TooManyParams { .. }));
    }

    #[test]
    fn conflicting_param_names_at_same_position_are_rejected() {
        let mut router = Router::<()>::new(4);
        router.get("/users/:id", Echo("a")).unwrap();
        let err = router.post("/users/:user_id", Echo("b")).unwrap_err();
        assert!(matches!(err, RouteConflict::SegmentKindMismatch { .. }));
    }

    #[test]
    fn lookup_matches_param_segment_and_captures_value() {
        let mut router = Router::<()>::new(4);
        router.get("/users/:id", Echo("user")).unwrap();

        let path: &'static [u8] = b"/users/42";
        let segments = split_path(path);
        let pool = blank_context_pool();
        let mut ctx = pool.acquire();

        match router.lookup(&segments, path, Method::Get, &mut ctx) {
            Lookup::Matched(_) => {}
            _ => panic!("expected a match"),
        }
        assert_eq!(ctx.param("id"), Some("42"));
    }

    #[test]
    fn lookup_reconstructs_wildcard_remainder_with_slashes() {
        let mut router = Router::<()>::new(4);
        router.get("/files/*rest", Echo("file")).unwrap();

        let path: &'static [u8] = b"/files/a/b/c.txt";
        let segments = split_path(path);
        let pool = blank_context_pool();
        let mut ctx = pool.acquire();

        match router.lookup(&segments, path, Method::Get, &mut ctx) {
            Lookup::Matched(_) => {}
            _ => panic!("expected a match"),
        }
        assert_eq!(ctx.param("rest"), Some("a/b/c.txt"));
    }

    #[test]
    fn lookup_reports_unknown_path_as_not_found() {
        let router = Router::<()>::new(4);
        let path: &'static [u8] = b"/missing";
        let segments = split_path(path);
        let pool = blank_context_pool();
        let mut ctx = pool.acquire();

        assert!(matches!(
            router.lookup(&segments, path, Method::Get, &mut ctx),
            Lookup::NotFound
        ));
    }

    #[test]
    fn lookup_reports_method_mismatch_with_allowed_set() {
        let mut router = Router::<()>::new(4);
        router.get("/only-get", Echo("x")).unwrap();

        let path: &'static [u8] = b"/only-get";
        let segments = split_path(path);
        let pool = blank_context_pool();
        let mut ctx = pool.acquire();

        match router.lookup(&segments, path, Method::Post, &mut ctx) {
            Lookup::MethodMismatch(allowed) => assert_eq!(allowed, vec![Method::Get]),
            _ => panic!("expected a method mismatch"),
        }
    }

    #[tokio::test]
    async fn handle_dispatches_through_the_boxed_route() {
        let mut router = Router::<()>::new(4);
        router.get("/users/:id", Echo("user")).unwrap();

        let pool = blank_context_pool();
        let path: &'static [u8] = b"/users/7";
        let segments = split_path(path);
        let route = {
            let mut ctx = pool.acquire();
            match router.lookup(&segments, path, Method::Get, &mut ctx) {
                Lookup::Matched(route) => route.clone(),
                _ => panic!("expected a match"),
            }
        };

        let mut data = ();
        let request = blank_request();
        let mut response = blank_response();
        let mut ctx = pool.acquire();
        ctx.push_param("id", "7");

        let _handled = route.call(&mut data, &request, &mut response, &mut ctx).await;
    }
}
