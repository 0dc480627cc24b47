//! Tower middleware that gates a service on a per-principal [`RateLimiter`].
//!
//! The layer resolves a principal from each request, asks the limiter, and
//! either forwards the request or fails fast:
//!
//! - no principal: [`AdmissionError::UnresolvedPrincipal`], the limiter is never
//!   consulted (an HTTP front end maps this to `400`);
//! - denied: [`AdmissionError::RateLimited`] carrying the `retry_after`
//!   estimate (an HTTP front end maps this to `429` plus `Retry-After`).
//!
//! The decision is made synchronously inside `call`, so the returned future
//! never waits for a token.

use crate::error::AdmissionError;
use crate::limiter::RateLimiter;
use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Extracts the rate-limiting principal from a request.
pub trait PrincipalResolver<Req> {
    /// `None` (or an empty string) means the request cannot be attributed.
    fn resolve(&self, req: &Req) -> Option<String>;
}

impl<Req, F> PrincipalResolver<Req> for F
where
    F: Fn(&Req) -> Option<String>,
{
    fn resolve(&self, req: &Req) -> Option<String> {
        self(req)
    }
}

/// A layer that enforces per-principal limits using a [`RateLimiter`].
#[derive(Clone, Debug)]
pub struct RateLimitLayer<P> {
    limiter: RateLimiter,
    resolver: P,
}

impl<P> RateLimitLayer<P> {
    /// Create a new rate limit layer. All services built from it share `limiter`.
    pub fn new(limiter: RateLimiter, resolver: P) -> Self {
        Self { limiter, resolver }
    }
}

impl<S, P: Clone> Layer<S> for RateLimitLayer<P> {
    type Service = RateLimitService<S, P>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            limiter: self.limiter.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

/// Middleware service that enforces per-principal limits.
#[derive(Clone, Debug)]
pub struct RateLimitService<S, P> {
    inner: S,
    limiter: RateLimiter,
    resolver: P,
}

impl<S, P> RateLimitService<S, P> {
    pub fn new(inner: S, limiter: RateLimiter, resolver: P) -> Self {
        Self { inner, limiter, resolver }
    }

    /// The limiter shared by this service.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

impl<S, P, Req> Service<Req> for RateLimitService<S, P>
where
    S: Service<Req>,
    P: PrincipalResolver<Req>,
{
    type Response = S::Response;
    type Error = AdmissionError<S::Error>;
    type Future = ResponseFuture<S::Future, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AdmissionError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let principal = match self.resolver.resolve(&req) {
            Some(p) if !p.is_empty() => p,
            _ => return ResponseFuture::rejected(AdmissionError::UnresolvedPrincipal),
        };

        if self.limiter.allow(&principal) {
            ResponseFuture::forward(self.inner.call(req))
        } else {
            let retry_after = self.limiter.retry_after(&principal);
            ResponseFuture::rejected(AdmissionError::RateLimited { principal, retry_after })
        }
    }
}

/// Response future for [`RateLimitService`].
#[pin_project]
pub struct ResponseFuture<F, E> {
    #[pin]
    kind: Kind<F, E>,
}

#[pin_project(project = KindProj)]
enum Kind<F, E> {
    Forward {
        #[pin]
        fut: F,
    },
    Rejected {
        err: Option<AdmissionError<E>>,
    },
}

impl<F, E> ResponseFuture<F, E> {
    fn forward(fut: F) -> Self {
        Self { kind: Kind::Forward { fut } }
    }

    fn rejected(err: AdmissionError<E>) -> Self {
        Self { kind: Kind::Rejected { err: Some(err) } }
    }
}

impl<F, T, E> Future for ResponseFuture<F, E>
where
    F: Future<Output = Result<T, E>>,
{
    type Output = Result<T, AdmissionError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().kind.project() {
            KindProj::Forward { fut } => fut.poll(cx).map_err(AdmissionError::Inner),
            KindProj::Rejected { err } => match err.take() {
                Some(err) => Poll::Ready(Err(err)),
                None => panic!("ResponseFuture polled after completion"),
            },
        }
    }
}
