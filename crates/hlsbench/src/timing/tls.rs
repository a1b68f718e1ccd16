use rustls::NamedGroup;
use rustls::client::{
    ClientSessionMemoryCache, ClientSessionStore, Tls12ClientSessionValue, Tls13ClientSessionValue,
};
use rustls::pki_types::ServerName;

use super::{Phase, TimingRecorder};

const SESSION_CACHE_SIZE: usize = 256;

/// Session store that marks the start of the TLS handshake.
///
/// rustls consults the resumption store while building the ClientHello, which
/// happens right after the TCP connection is established. Storage is delegated
/// to the default in-memory cache, so resumption behaves as usual.
#[derive(Debug)]
pub struct TlsStartMarker {
    inner: ClientSessionMemoryCache,
}

impl TlsStartMarker {
    pub fn new() -> Self {
        Self {
            inner: ClientSessionMemoryCache::new(SESSION_CACHE_SIZE),
        }
    }

    fn mark_handshake_start(&self) {
        if let Some(recorder) = TimingRecorder::current() {
            recorder.mark(Phase::TlsStart);
        }
    }
}

impl Default for TlsStartMarker {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSessionStore for TlsStartMarker {
    fn set_kx_hint(&self, server_name: ServerName<'static>, group: NamedGroup) {
        self.inner.set_kx_hint(server_name, group);
    }

    fn kx_hint(&self, server_name: &ServerName<'_>) -> Option<NamedGroup> {
        self.mark_handshake_start();
        self.inner.kx_hint(server_name)
    }

    fn set_tls12_session(&self, server_name: ServerName<'static>, value: Tls12ClientSessionValue) {
        self.inner.set_tls12_session(server_name, value);
    }

    fn tls12_session(&self, server_name: &ServerName<'_>) -> Option<Tls12ClientSessionValue> {
        self.mark_handshake_start();
        self.inner.tls12_session(server_name)
    }

    fn remove_tls12_session(&self, server_name: &ServerName<'static>) {
        self.inner.remove_tls12_session(server_name);
    }

    fn insert_tls13_ticket(
        &self,
        server_name: ServerName<'static>,
        value: Tls13ClientSessionValue,
    ) {
        self.inner.insert_tls13_ticket(server_name, value);
    }

    fn take_tls13_ticket(
        &self,
        server_name: &ServerName<'static>,
    ) -> Option<Tls13ClientSessionValue> {
        self.mark_handshake_start();
        self.inner.take_tls13_ticket(server_name)
    }
}
