//! Access log middleware: one line per finished request, tagged with the
//! calling user.

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::http::{Method, StatusCode};
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::USER_HEADER;

/// Caller recorded when the user header is absent or blank.
const ANONYMOUS: &str = "anonymous";

/// Request logger middleware factory.
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware { service }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: S,
}

/// What is known about a request before it is handled.
struct AccessEntry {
    method: Method,
    path: String,
    user: String,
    started: Instant,
}

impl AccessEntry {
    fn capture(req: &ServiceRequest) -> Self {
        Self {
            method: req.method().clone(),
            path: req.path().to_string(),
            user: caller(req),
            started: Instant::now(),
        }
    }

    fn finish(&self, status: StatusCode) {
        let status = status.as_u16();
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let (method, path, user) = (&self.method, &self.path, &self.user);

        match status {
            500.. => error!(target: "api", %method, %path, %user, status, elapsed_ms, "Request failed"),
            400..=499 => warn!(target: "api", %method, %path, %user, status, elapsed_ms, "Request rejected"),
            _ => info!(target: "api", %method, %path, %user, status, elapsed_ms, "Request served"),
        }
    }
}

fn caller(req: &ServiceRequest) -> String {
    req.headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let entry = AccessEntry::capture(&req);
        let fut = self.service.call(req);

        Box::pin(async move {
            match fut.await {
                Ok(res) => {
                    entry.finish(res.status());
                    Ok(res)
                }
                Err(e) => {
                    entry.finish(e.as_response_error().status_code());
                    Err(e)
                }
            }
        })
    }
}
