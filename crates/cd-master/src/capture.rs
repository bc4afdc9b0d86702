//! Asynchronous capture finalization.

use std::future::{Future, IntoFuture};
use std::pin::Pin;

use cd_engine::{CaptureAsset, CaptureError, CaptureTake};
use tokio::sync::oneshot;
use tracing::warn;

/// Resolves to the finished asset once the background encode completes.
///
/// Await it directly, or call [`blocking_asset`](Self::blocking_asset)
/// outside of an async runtime.
pub struct CaptureFinalizer {
    rx: oneshot::Receiver<CaptureAsset>,
}

impl CaptureFinalizer {
    /// Finalize `take` on a worker thread.
    pub(crate) fn spawn(take: CaptureTake) -> Result<Self, CaptureError> {
        let (tx, rx) = oneshot::channel();
        std::thread::Builder::new()
            .name("cd-capture-finalize".into())
            .spawn(move || {
                if tx.send(take.finalize()).is_err() {
                    warn!("capture asset dropped before delivery");
                }
            })
            .map_err(|_| CaptureError::Interrupted)?;
        Ok(Self { rx })
    }

    pub async fn asset(self) -> Result<CaptureAsset, CaptureError> {
        self.rx.await.map_err(|_| CaptureError::Interrupted)
    }

    pub fn blocking_asset(self) -> Result<CaptureAsset, CaptureError> {
        self.rx.blocking_recv().map_err(|_| CaptureError::Interrupted)
    }
}

impl IntoFuture for CaptureFinalizer {
    type Output = Result<CaptureAsset, CaptureError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.asset())
    }
}
