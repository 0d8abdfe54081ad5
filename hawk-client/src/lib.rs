//! An HTTP client for persistent-connection protocols with pluggable request authentication
//! and exactly-once cleanup of response resources.
//!
//! Real-time clients keep long-lived `GET` requests open while firing short `POST` requests,
//! and any of those requests can be aborted from the outside at any moment. This crate makes
//! two guarantees for every call:
//!
//! - The response body is released exactly once, however the race between the response
//!   arriving and the call being aborted plays out. See [`guard`].
//! - Requests are authenticated by a scheme plugged in as Tower middleware, without the
//!   transport knowing anything about it. See [`auth`].
//!
//! # Example
//!
//! ```
//! use hawk_client::{RequestExecutor, BoxError};
//! use hawk_client::request::OutgoingRequest;
//! use http::Response;
//! use http_body_util::{BodyExt, Full};
//! use bytes::Bytes;
//! use tower::service_fn;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), BoxError> {
//! // any `Service` can act as the transport
//! let transport = service_fn(|_req: OutgoingRequest| async {
//!     Ok::<_, BoxError>(Response::new(Full::new(Bytes::from_static(b"ok"))))
//! });
//! let executor = RequestExecutor::new(transport.clone(), transport);
//!
//! let res = executor
//!     .get("http://localhost/signalr/poll", |req| {
//!         req.set_user_agent("chat-client/1.0");
//!     }, true)
//!     .await?;
//!
//! let body = res.into_body().collect().await?.to_bytes();
//! assert_eq!(body, "ok");
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - `client` (enabled by default): [`HawkClient`], built on `hyper-util`'s pooled client.

#![warn(
    clippy::all,
    clippy::dbg_macro,
    clippy::todo,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::mem_forget,
    clippy::unused_self,
    clippy::filter_map_next,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::if_let_mutex,
    clippy::await_holding_lock,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::lossy_float_literal,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::fn_params_excessive_bools,
    clippy::exit,
    clippy::inefficient_to_string,
    clippy::linkedlist,
    clippy::macro_use_imports,
    clippy::option_option,
    clippy::verbose_file_reads,
    clippy::unnested_or_patterns,
    rust_2018_idioms,
    future_incompatible,
    nonstandard_style,
    missing_docs
)]
#![deny(unreachable_pub)]
#![allow(elided_lifetimes_in_paths, clippy::type_complexity)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod auth;
pub mod body;
pub mod cancel;
pub mod error;
pub mod executor;
pub mod form;
pub mod guard;
pub mod request;

#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

#[cfg(test)]
mod test_helpers;

#[doc(inline)]
pub use self::{
    body::GuardedBody,
    cancel::CancelHook,
    error::{BoxError, Error, StatusError},
    executor::RequestExecutor,
    form::FormData,
    guard::DisposalGuard,
    request::{ExecuteRequest, PrepareRequest},
};

#[cfg(feature = "client")]
#[doc(inline)]
pub use self::client::{ClientConfig, HawkClient, TransportConfig};
