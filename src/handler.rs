//! Message handler seam between the serve loop and the embedding
//! application.
//!
//! A handler is invoked once per received message, inside the serve loop
//! task, and must not block indefinitely: all further receives stall while it
//! runs. Handler failures never cross the loop boundary; they are counted
//! and answered with an empty reply.

use async_trait::async_trait;
use thiserror::Error;

use crate::frame::Message;

/// A failed handler invocation.
///
/// Visible to the embedder only through the handler-failure counter, never as
/// a serve-loop error.
#[derive(Debug, Error)]
#[error("handler failed: {0}")]
pub struct HandlerError(pub String);

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self { Self(message.to_owned()) }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self { Self(message) }
}

/// Application callback producing a reply for each received message.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Produce the reply for `request`.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] when the request cannot be served; the
    /// serve loop counts the failure and sends an empty reply in its place.
    async fn handle(&self, request: Message) -> Result<Message, HandlerError>;
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Message, HandlerError>> + Send,
{
    async fn handle(&self, request: Message) -> Result<Message, HandlerError> {
        (self.0)(request).await
    }
}

/// Wrap an async closure as a [`MessageHandler`].
///
/// ```no_run
/// use framelink::handler::handler_fn;
///
/// let handler = handler_fn(|request| async move { Ok(request) });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Message, HandlerError>> + Send,
{
    FnHandler(f)
}
