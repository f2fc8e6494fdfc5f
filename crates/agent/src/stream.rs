//! Consume a streamed completion under a cancellation token.

use localcoder_core::error::WorkflowError;
use localcoder_core::event::{DomainEvent, EventBus};
use localcoder_core::message::Message;
use localcoder_core::persona::Persona;
use localcoder_core::provider::{Provider, ProviderRequest};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Build a request for `persona` with its system prompt prepended.
pub fn persona_request(persona: &Persona, mut messages: Vec<Message>) -> ProviderRequest {
    messages.insert(0, Message::system(persona.system_prompt.clone()));
    ProviderRequest::new(persona.model.clone(), messages).with_temperature(persona.temperature)
}

/// Stream one completion for `persona`, publishing each fragment, and
/// return the accumulated text.
///
/// Cancellation is observed while waiting for the stream to open and between
/// fragments; partial output is discarded.
pub async fn collect_stream(
    provider: &dyn Provider,
    persona: &Persona,
    messages: Vec<Message>,
    bus: &EventBus,
    cancel: &CancellationToken,
) -> Result<String, WorkflowError> {
    let request = persona_request(persona, messages);
    debug!(persona = %persona.kind, model = %request.model, "Streaming completion");

    let mut rx = tokio::select! {
        _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
        opened = provider.stream(request) => opened?,
    };

    let mut text = String::new();
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
            next = rx.recv() => next,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk?;
        if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
            bus.publish(DomainEvent::ModelFragment {
                persona: persona.kind,
                text: content.clone(),
            });
            text.push_str(&content);
        }
        if chunk.done {
            break;
        }
    }

    debug!(persona = %persona.kind, chars = text.len(), "Completion finished");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{SequentialMockProvider, persona};
    use localcoder_core::persona::PersonaKind;
    use localcoder_core::message::Role;

    #[tokio::test]
    async fn accumulates_and_publishes_fragments() {
        let provider = SequentialMockProvider::new(vec!["Hello there, world"]);
        let bus = EventBus::default();
        let mut events = bus.subscribe();

        let text = collect_stream(
            &provider,
            &persona(PersonaKind::Executor),
            vec![Message::user("hi")],
            &bus,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(text, "Hello there, world");
        let first = events.recv().await.unwrap();
        assert!(matches!(
            first.as_ref(),
            DomainEvent::ModelFragment { persona: PersonaKind::Executor, .. }
        ));

        let request = provider.requests().remove(0);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.model, "test-model");
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_stream() {
        let provider = SequentialMockProvider::new(vec!["never read"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = collect_stream(
            &provider,
            &persona(PersonaKind::Planner),
            vec![Message::user("hi")],
            &EventBus::default(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WorkflowError::Cancelled));
    }
}
