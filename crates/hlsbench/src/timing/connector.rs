use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use super::{Phase, TimingRecorder};

/// Tower layer installed with `ClientBuilder::connector_layer`.
///
/// The wrapped connector covers DNS, TCP and TLS, so this layer brackets the
/// whole connection setup: start before resolution, done once the transport
/// (including any TLS session) is ready to carry the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectTimingLayer;

impl<S> Layer<S> for ConnectTimingLayer {
    type Service = TimedConnect<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimedConnect { inner }
    }
}

#[derive(Debug, Clone)]
pub struct TimedConnect<S> {
    inner: S,
}

impl<S, R> Service<R> for TimedConnect<S>
where
    S: Service<R>,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: R) -> Self::Future {
        let recorder = TimingRecorder::current();
        if let Some(recorder) = &recorder {
            recorder.mark(Phase::ConnectStart);
        }
        let connecting = self.inner.call(req);
        Box::pin(async move {
            let result = connecting.await;
            if let (Ok(_), Some(recorder)) = (&result, &recorder) {
                recorder.mark(Phase::ConnectDone);
            }
            result
        })
    }
}
