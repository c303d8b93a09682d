//! Transport gateway contract
//!
//! A gateway accepts a request and hands back a [`ResponseHandle`] that
//! resolves to exactly one [`Completion`]: the device's success reply or its
//! failure reply. The wait timeout belongs to the handle.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::request::Request;
use crate::response::{FailurePdu, Response};

/// How a submitted request finished
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Success(Response),
    Failure(FailurePdu),
}

impl Completion {
    /// Success payload; `None` when the request failed
    pub fn success_payload(&self) -> Option<&Response> {
        match self {
            Completion::Success(response) => Some(response),
            Completion::Failure(_) => None,
        }
    }

    /// Failure payload; `None` when the request succeeded
    pub fn failure_payload(&self) -> Option<&FailurePdu> {
        match self {
            Completion::Success(_) => None,
            Completion::Failure(failure) => Some(failure),
        }
    }
}

/// Errors that leave a request without any completion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Gateway closed before replying")]
    Closed,
}

/// Pending reply of a submitted request
#[derive(Debug)]
pub struct ResponseHandle {
    rx: oneshot::Receiver<Completion>,
    timeout: Duration,
}

impl ResponseHandle {
    pub fn new(rx: oneshot::Receiver<Completion>, timeout: Duration) -> Self {
        Self { rx, timeout }
    }

    /// Handle that is already resolved
    pub fn ready(completion: Completion) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(completion);
        Self::new(rx, Duration::from_secs(1))
    }

    /// Wait for the completion
    pub async fn wait(self) -> Result<Completion, GatewayError> {
        match tokio::time::timeout(self.timeout, self.rx).await {
            Ok(Ok(completion)) => Ok(completion),
            Ok(Err(_)) => Err(GatewayError::Closed),
            Err(_) => Err(GatewayError::Timeout(self.timeout)),
        }
    }
}

impl IntoFuture for ResponseHandle {
    type Output = Result<Completion, GatewayError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

/// Carries requests to devices
pub trait TransportGateway: Send + Sync {
    fn submit(&self, request: Request) -> ResponseHandle;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConfirmedService;

    #[tokio::test]
    async fn test_ready_handle() {
        let completion = Completion::Success(Response::SimpleAck {
            service: ConfirmedService::WriteProperty,
        });
        let handle = ResponseHandle::ready(completion.clone());
        let result = handle.await.unwrap();
        assert_eq!(result, completion);
        assert!(result.success_payload().is_some());
        assert!(result.failure_payload().is_none());
    }

    #[tokio::test]
    async fn test_dropped_sender_is_closed() {
        let (tx, rx) = oneshot::channel();
        drop(tx);
        let handle = ResponseHandle::new(rx, Duration::from_secs(1));
        assert_eq!(handle.wait().await.unwrap_err(), GatewayError::Closed);
    }

    #[tokio::test]
    async fn test_timeout() {
        let (_tx, rx) = oneshot::channel();
        let handle = ResponseHandle::new(rx, Duration::from_millis(50));
        assert_eq!(
            handle.wait().await.unwrap_err(),
            GatewayError::Timeout(Duration::from_millis(50))
        );
    }
}
