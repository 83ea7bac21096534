//! Test fixtures with sample data.
//!
//! This module provides pre-built handlers, payloads and requests.

use pact_provider::{
    BoxError, Message, MessageHandlers, ProviderState, ProviderStateResponse, StateHandlers,
    VerifyRequest,
};
use serde_json::{Map, Value, json};

/// State registered by [`user_state_handlers`].
pub const USER_EXISTS_STATE: &str = "User foo exists";

/// Message registered by [`order_message_handlers`].
pub const ORDER_CREATED_MESSAGE: &str = "an order created event";

/// Setup payload for [`USER_EXISTS_STATE`] with an `id` parameter.
#[must_use]
pub fn user_exists_setup() -> Value {
    json!({"action": "setup", "state": USER_EXISTS_STATE, "id": "foo"})
}

/// Teardown payload for [`USER_EXISTS_STATE`].
#[must_use]
pub fn user_exists_teardown() -> Value {
    json!({"action": "teardown", "state": USER_EXISTS_STATE, "id": "foo"})
}

/// Handlers answering [`USER_EXISTS_STATE`] on setup with `{"userId": 42}`.
///
/// Teardown returns nothing.
#[must_use]
pub fn user_state_handlers() -> StateHandlers {
    StateHandlers::new().with_fn(USER_EXISTS_STATE, user_exists)
}

fn user_exists(
    setup: bool,
    _state: &ProviderState,
) -> Result<Option<ProviderStateResponse>, BoxError> {
    if !setup {
        return Ok(None);
    }
    let mut values = Map::new();
    values.insert("userId".to_string(), json!(42));
    Ok(Some(values))
}

/// Handlers producing [`ORDER_CREATED_MESSAGE`].
#[must_use]
pub fn order_message_handlers() -> MessageHandlers {
    MessageHandlers::new().with_fn(
        ORDER_CREATED_MESSAGE,
        |_states: &[ProviderState]| -> Result<Message, BoxError> {
            Ok(Message::json(json!({"orderId": 7, "status": "CREATED"}))
                .with_metadata("queue", "orders"))
        },
    )
}

/// Request for `user-service` with one pact file and nothing else.
#[must_use]
pub fn sample_request() -> VerifyRequest {
    VerifyRequest::new("user-service").with_pact_file("pacts/web-user-service.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_user_state_handler() {
        let handlers = user_state_handlers();
        let handler = handlers.get(USER_EXISTS_STATE).unwrap();
        let state = ProviderState::new(USER_EXISTS_STATE);

        let setup = handler.handle(true, &state).await.unwrap();
        assert_eq!(setup.unwrap().get("userId"), Some(&json!(42)));
        assert!(handler.handle(false, &state).await.unwrap().is_none());
    }

    #[test]
    fn test_sample_request() {
        let request = sample_request();
        assert_eq!(request.provider, "user-service");
        assert_eq!(request.pact_files.len(), 1);
        assert!(request.provider_base_url.is_none());
    }

    #[test]
    fn test_payload_actions() {
        assert_eq!(user_exists_setup()["action"], "setup");
        assert_eq!(user_exists_teardown()["action"], "teardown");
    }
}
