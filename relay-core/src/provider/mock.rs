//! Mock LLM provider for testing.
//!
//! Provides [`MockProvider`], a scripted implementation of [`LlmProvider`]
//! for unit and integration testing.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{LlmProvider, ProviderError, ProviderEvent, ProviderStream, TurnRequest};

/// One scripted turn.
#[derive(Debug)]
enum ScriptedTurn {
    /// Stream these items, then end.
    Events(Vec<Result<ProviderEvent, ProviderError>>),
    /// Fail before the stream opens.
    StartFailure(ProviderError),
}

/// A mock LLM provider for testing.
///
/// Turns are served in FIFO order. When no turn is scripted, a single
/// "Mock response" text event followed by a `stop` finish is streamed.
///
/// # Examples
///
/// ```
/// use relay_core::provider::{MockProvider, ProviderEvent};
///
/// let provider = MockProvider::new()
///     .with_turn(vec![ProviderEvent::text("Hel"), ProviderEvent::text("lo")])
///     .with_turn(vec![ProviderEvent::text("second turn")]);
/// ```
#[derive(Debug, Default)]
pub struct MockProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<TurnRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A poisoned mutex only means another test thread panicked.
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MockProvider {
    /// Create a new mock provider with no scripted turns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a turn that streams `events` and ends.
    #[must_use]
    pub fn with_turn(self, events: Vec<ProviderEvent>) -> Self {
        lock(&self.turns).push_back(ScriptedTurn::Events(events.into_iter().map(Ok).collect()));
        self
    }

    /// Script a turn that streams `events` and then fails with `error`.
    #[must_use]
    pub fn with_failing_turn(self, events: Vec<ProviderEvent>, error: ProviderError) -> Self {
        let mut items: Vec<_> = events.into_iter().map(Ok).collect();
        items.push(Err(error));
        lock(&self.turns).push_back(ScriptedTurn::Events(items));
        self
    }

    /// Script a turn that fails before any event is streamed.
    #[must_use]
    pub fn with_start_failure(self, error: ProviderError) -> Self {
        lock(&self.turns).push_back(ScriptedTurn::StartFailure(error));
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<TurnRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream_turn(&self, request: TurnRequest) -> Result<ProviderStream, ProviderError> {
        lock(&self.requests).push(request);

        let turn = lock(&self.turns).pop_front();
        let items = match turn {
            Some(ScriptedTurn::Events(items)) => items,
            Some(ScriptedTurn::StartFailure(error)) => return Err(error),
            None => vec![
                Ok(ProviderEvent::text("Mock response")),
                Ok(ProviderEvent::finish("stop")),
            ],
        };

        Ok(Box::pin(futures::stream::iter(items)))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::message::{Message, Role};

    async fn collect(provider: &MockProvider) -> Vec<Result<ProviderEvent, ProviderError>> {
        let stream = provider
            .stream_turn(TurnRequest::default())
            .await
            .unwrap();
        stream.collect().await
    }

    #[tokio::test]
    async fn test_mock_provider_default_turn() {
        let provider = MockProvider::new();
        let items = collect(&provider).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().text, "Mock response");
        assert_eq!(
            items[1].as_ref().unwrap().finish_reason.as_deref(),
            Some("stop")
        );
    }

    #[tokio::test]
    async fn test_mock_provider_turns_are_fifo() {
        let provider = MockProvider::new()
            .with_turn(vec![ProviderEvent::text("first")])
            .with_turn(vec![ProviderEvent::text("second")]);

        let first = collect(&provider).await;
        let second = collect(&provider).await;

        assert_eq!(first[0].as_ref().unwrap().text, "first");
        assert_eq!(second[0].as_ref().unwrap().text, "second");
    }

    #[tokio::test]
    async fn test_mock_provider_start_failure() {
        let provider = MockProvider::new()
            .with_start_failure(ProviderError::RequestFailed("offline".to_string()));

        let result = provider.stream_turn(TurnRequest::default()).await;
        assert!(matches!(result, Err(ProviderError::RequestFailed(_))));
    }

    #[tokio::test]
    async fn test_mock_provider_failing_turn() {
        let provider = MockProvider::new().with_failing_turn(
            vec![ProviderEvent::text("partial")],
            ProviderError::RequestFailed("connection reset".to_string()),
        );

        let items = collect(&provider).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_mock_provider_records_requests() {
        let provider = MockProvider::new();
        let request = TurnRequest {
            messages: vec![Message::new(Role::User, "Hello")],
            system_prompt: Some("Be brief.".to_string()),
            tools: Vec::new(),
        };
        provider.stream_turn(request).await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0].content, "Hello");
        assert_eq!(requests[0].system_prompt.as_deref(), Some("Be brief."));
    }
}
