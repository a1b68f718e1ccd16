use reqwest::Client;
use rustls::client::Resumption;
use rustls::{ClientConfig, crypto::ring};
use rustls_platform_verifier::BuilderVerifierExt;
use std::sync::Arc;
use tracing::debug;

use crate::config::BenchConfig;
use crate::error::BenchError;
use crate::timing::{ConnectTimingLayer, TimedResolver, TlsStartMarker};

const MAX_REDIRECTS: usize = 10;

/// Create the process-wide client with the timing hooks installed.
///
/// Response bodies are never transparently decompressed, so reported byte
/// counts match what crossed the wire.
pub fn create_client(config: &BenchConfig) -> Result<Client, BenchError> {
    let provider = Arc::new(ring::default_provider());

    let mut tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_platform_verifier()?
        .with_no_client_auth();
    tls_config.resumption = Resumption::store(Arc::new(TlsStartMarker::new()));

    let mut client_builder = Client::builder()
        .user_agent(&config.user_agent)
        .use_preconfigured_tls(tls_config)
        .dns_resolver(Arc::new(TimedResolver))
        .connector_layer(ConnectTimingLayer)
        .pool_idle_timeout(config.pool_idle_timeout)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(MAX_REDIRECTS)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    debug!(
        user_agent = %config.user_agent,
        timeout = ?config.timeout,
        connect_timeout = ?config.connect_timeout,
        "Building HTTP client"
    );

    client_builder.build().map_err(BenchError::from)
}
