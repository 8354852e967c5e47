//! Onion-style middleware composition layered in front of a terminal
//! [`Handler`] (typically a [`crate::router::Router`]).
//!
//! Each [`Middleware`] receives a [`Next`] continuation representing the
//! rest of the chain; calling [`Next::run`] invokes the next middleware, or
//! the terminal handler once the chain is exhausted. A middleware can
//! short-circuit by returning without calling `next.run(..)`, or post-process
//! by inspecting `response` after awaiting it.

use crate::{
    http::{request::Request, response::{Handled, Response}},
    server::connection::ConnectionData,
    Handler,
};
use std::{future::Future, pin::Pin, sync::Arc};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single layer in a middleware chain.
///
/// # Examples
/// ```
/// use shockwave::{middleware::{Middleware, Next}, ConnectionData, Request, Response, Handled};
///
/// struct RequestId;
///
/// impl Middleware for RequestId {
///     async fn call(&self, data: &mut (), req: &Request, resp: &mut Response, next: Next<'_, ()>) -> Handled {
///         let handled = next.run(data, req, resp).await;
///         resp.header("x-request-id", "generated-elsewhere");
///         handled
///     }
/// }
/// ```
pub trait Middleware<S = ()>: Sync + Send + 'static
where
    S: ConnectionData,
{
    /// Runs this layer. Call [`Next::run`] to continue down the chain, or
    /// return directly to short-circuit (e.g. to reject an unauthenticated
    /// request before it reaches the router).
    fn call(
        &self,
        connection_data: &mut S,
        request: &Request,
        response: &mut Response,
        next: Next<'_, S>,
    ) -> impl Future<Output = Handled> + Send;
}

trait DynMiddleware<S>: Sync + Send {
    fn call<'a>(
        &'a self,
        connection_data: &'a mut S,
        request: &'a Request,
        response: &'a mut Response,
        next: Next<'a, S>,
    ) -> BoxFuture<'a, Handled>;
}

impl<S, M> DynMiddleware<S> for M
where
    S: ConnectionData,
    M: Middleware<S>,
{
    fn call<'a>(
        &'a self,
        connection_data: &'a mut S,
        request: &'a Request,
        response: &'a mut Response,
        next: Next<'a, S>,
    ) -> BoxFuture<'a, Handled> {
        Box::pin(self.call(connection_data, request, response, next))
    }
}

trait DynHandler<S>: Sync + Send {
    fn call<'a>(
        &'a self,
        connection_data: &'a mut S,
        request: &'a Request,
        response: &'a mut Response,
    ) -> BoxFuture<'a, Handled>;
}

impl<S, H> DynHandler<S> for H
where
    S: ConnectionData,
    H: Handler<S>,
{
    fn call<'a>(
        &'a self,
        connection_data: &'a mut S,
        request: &'a Request,
        response: &'a mut Response,
    ) -> BoxFuture<'a, Handled> {
        Box::pin(self.handle(connection_data, request, response))
    }
}

/// The remainder of a middleware chain, handed to each [`Middleware::call`].
pub struct Next<'a, S> {
    remaining: &'a [Arc<dyn DynMiddleware<S>>],
    terminal: &'a dyn DynHandler<S>,
}

impl<'a, S: ConnectionData> Next<'a, S> {
    /// Invokes the next middleware in the chain, or the terminal handler if
    /// this was the last one.
    pub async fn run(
        self,
        connection_data: &mut S,
        request: &Request,
        response: &mut Response,
    ) -> Handled {
        match self.remaining.split_first() {
            Some((layer, rest)) => {
                let next = Next { remaining: rest, terminal: self.terminal };
                layer.call(connection_data, request, response, next).await
            }
            None => self.terminal.call(connection_data, request, response).await,
        }
    }
}

/// A terminal [`Handler`] wrapped by zero or more [`Middleware`] layers.
///
/// Implements [`Handler`] itself, so it can be passed straight to
/// [`ServerBuilder::handler`](crate::ServerBuilder::handler).
///
/// # Examples
/// ```
/// use shockwave::{middleware::{MiddlewareStack, Middleware, Next}, router::Router, Handled, Request, Response};
///
/// struct Timing;
/// impl Middleware for Timing {
///     async fn call(&self, data: &mut (), req: &Request, resp: &mut Response, next: Next<'_, ()>) -> Handled {
///         next.run(data, req, resp).await
///     }
/// }
///
/// let router = Router::<()>::new(64);
/// let stack = MiddlewareStack::new(router).layer(Timing);
/// ```
pub struct MiddlewareStack<S = ()>
where
    S: ConnectionData,
{
    layers: Vec<Arc<dyn DynMiddleware<S>>>,
    terminal: Arc<dyn DynHandler<S>>,
}

impl<S: ConnectionData> MiddlewareStack<S> {
    /// Starts a chain with `handler` as the terminal step.
    pub fn new(handler: impl Handler<S>) -> Self {
        Self {
            layers: Vec::new(),
            terminal: Arc::new(handler),
        }
    }

    /// Appends a middleware layer. Layers added earlier run first and wrap
    /// every layer (and the terminal handler) added after them.
    pub fn layer(mut self, middleware: impl Middleware<S>) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }
}

impl<S: ConnectionData> Handler<S> for MiddlewareStack<S> {
    async fn handle(&self, connection_data: &mut S, request: &Request, response: &mut Response) -> Handled {
        let next = Next { remaining: &self.layers, terminal: self.terminal.as_ref() };
        next.run(connection_data, request, response).await
    }
}
