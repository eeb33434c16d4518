//! centralized (web) client creation
//!
//! The engine itself is generic over any HTTP client [`Service`],
//! which allows the test suites to swap in mock clients
//! while the binary always goes through this module.

use rama::{
    Service,
    error::{BoxError, ErrorContext as _},
    http::{Request, Response, client::EasyHttpWebClient},
    rt::Executor,
};

/// Create a new web client that can be cloned and shared between workers.
///
/// Connections are pooled and kept alive, so a worker hitting the same
/// target over and over again reuses its connection.
pub fn new_web_client(
    exec: Executor,
) -> Result<impl Service<Request, Output = Response, Error = BoxError> + Clone, BoxError> {
    Ok(EasyHttpWebClient::connector_builder()
        .with_default_transport_connector()
        .without_tls_proxy_support()
        .without_proxy_support()
        .with_tls_support_using_boringssl(None)
        .with_default_http_connector(exec)
        .try_with_default_connection_pool()
        .context("create connection pool for stampede web client")?
        .build_client())
}
