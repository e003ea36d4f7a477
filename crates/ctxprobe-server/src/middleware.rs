//! Middleware: the single capability every filter is expressed through.
//!
//! A middleware receives the request context and a [`Next`] handle for the
//! rest of the pipeline (further middleware, then the endpoint). Hook-style
//! filters implement [`ActionFilter`] instead and are adapted with
//! [`ActionFilterMiddleware`].

use std::future::Future;
use std::pin::Pin;

use ctxprobe_protocol::{HandlerResult, ProbeError, RequestContext};

use crate::endpoints::Endpoint;

/// Trait for request middleware.
pub trait Middleware: Send + Sync {
    /// Handle a request. Call `next.run(ctx)` to continue the pipeline, or
    /// return without calling it to short-circuit.
    fn handle<'a>(
        &'a self,
        ctx: &'a RequestContext,
        next: Next<'a>,
    ) -> impl Future<Output = HandlerResult> + Send;

    /// Middleware name for debugging.
    const NAME: &'static str;
}

/// Hook-style filter: runs around the endpoint but never drives it.
pub trait ActionFilter: Send + Sync {
    /// Runs before the endpoint. An error skips the endpoint and is returned
    /// as the pipeline result.
    fn on_action_executing(
        &self,
        ctx: &RequestContext,
    ) -> impl Future<Output = Result<(), ProbeError>> + Send;

    /// Runs after the endpoint with its result (optional).
    fn on_action_executed(
        &self,
        _ctx: &RequestContext,
        _result: &HandlerResult,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    const NAME: &'static str;
}

/// Runs an [`ActionFilter`]'s hooks around the rest of the pipeline.
pub struct ActionFilterMiddleware<F> {
    filter: F,
}

impl<F: ActionFilter> ActionFilterMiddleware<F> {
    pub fn new(filter: F) -> Self {
        Self { filter }
    }

    pub fn inner(&self) -> &F {
        &self.filter
    }
}

impl<F: ActionFilter> Middleware for ActionFilterMiddleware<F> {
    const NAME: &'static str = F::NAME;

    async fn handle<'a>(&'a self, ctx: &'a RequestContext, next: Next<'a>) -> HandlerResult {
        self.filter.on_action_executing(ctx).await?;
        let result = next.run(ctx).await;
        self.filter.on_action_executed(ctx, &result).await;
        result
    }
}

/// The rest of the pipeline: remaining middleware, then the endpoint.
///
/// Consumed by [`Next::run`], so a middleware can continue at most once.
pub struct Next<'a> {
    chain: &'a [Box<dyn MiddlewareDyn>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Box<dyn MiddlewareDyn>], endpoint: &'a dyn Endpoint) -> Self {
        Self { chain, endpoint }
    }

    /// Continue the pipeline and return its result.
    pub async fn run(self, ctx: &'a RequestContext) -> HandlerResult {
        match self.chain.split_first() {
            Some((first, rest)) => first.handle_dyn(ctx, Next::new(rest, self.endpoint)).await,
            None => self.endpoint.handle(ctx),
        }
    }
}

/// Object-safe version of Middleware trait: all refs share lifetime `'a`.
pub(crate) trait MiddlewareDyn: Send + Sync {
    fn handle_dyn<'a>(
        &'a self,
        ctx: &'a RequestContext,
        next: Next<'a>,
    ) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>>;
}

impl<T: Middleware> MiddlewareDyn for T {
    fn handle_dyn<'a>(
        &'a self,
        ctx: &'a RequestContext,
        next: Next<'a>,
    ) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>> {
        Box::pin(self.handle(ctx, next))
    }
}
