//! Access to the remote function namespace.
//!
//! [`FunctionsApi`] is the seam the pruner and orchestrator talk to;
//! [`CloudFunctionsClient`] implements it over the Cloud Functions v1 REST
//! API using credentials resolved once into a [`GcpContext`].

mod client;
mod context;
mod error;

use std::future::Future;
use std::pin::Pin;

use crate::resource::{IamPolicy, RemoteResource};

pub use client::{CloudFunctionsClient, DEFAULT_API_URL, DEFAULT_TIMEOUT};
pub use context::{ContextError, GcpContext};
pub use error::FunctionsApiError;

/// Future returned by [`FunctionsApi`] operations.
pub type ApiFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface over a remote function namespace.
pub trait FunctionsApi {
    /// Error type returned by the implementation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists every function under `parent`, following pagination until the
    /// listing is complete.
    fn list_functions<'a>(
        &'a self,
        parent: &'a str,
    ) -> ApiFuture<'a, Vec<RemoteResource>, Self::Error>;

    /// Issues a single delete request for the named function. Completion of
    /// the server-side operation is not awaited.
    fn delete_function<'a>(&'a self, name: &'a str) -> ApiFuture<'a, (), Self::Error>;

    /// Replaces the IAM policy of the named function.
    fn set_iam_policy<'a>(
        &'a self,
        resource: &'a str,
        policy: &'a IamPolicy,
    ) -> ApiFuture<'a, (), Self::Error>;
}
