//! Shared proptest generators for state-change and message payloads.

use proptest::prelude::*;
use serde_json::{Map, Value, json};

use pact_provider::{MessageRequest, ProviderState, ProviderStateParams};

/// Generate provider state names.
pub fn state_name_strategy() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{2,8}( [a-z0-9]{1,8}){0,4}"
}

/// Generate `setup` or `teardown`.
pub fn action_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just("setup".to_string()), Just("teardown".to_string())]
}

/// Generate JSON parameter values.
pub fn param_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-zA-Z0-9 _-]{0,20}".prop_map(Value::from),
        Just(Value::Null),
        proptest::collection::vec(any::<u8>(), 0..4).prop_map(|v| json!(v)),
    ]
}

/// Generate state parameters; never contains `action` or `state`.
pub fn state_params_strategy() -> impl Strategy<Value = ProviderStateParams> {
    proptest::collection::btree_map("[a-z][a-zA-Z0-9]{0,10}", param_value_strategy(), 0..5)
        .prop_filter("control keys are not parameters", |params| {
            !params.contains_key("action") && !params.contains_key("state")
        })
        .prop_map(|params| params.into_iter().collect::<Map<String, Value>>())
}

/// Generate provider states.
pub fn provider_state_strategy() -> impl Strategy<Value = ProviderState> {
    (state_name_strategy(), state_params_strategy())
        .prop_map(|(name, parameters)| ProviderState { name, parameters })
}

/// Generate `(action, state, params, payload)` where `payload` is the flat
/// state-change body the engine would post.
pub fn state_change_strategy(
) -> impl Strategy<Value = (String, String, ProviderStateParams, Value)> {
    (action_strategy(), state_name_strategy(), state_params_strategy()).prop_map(
        |(action, state, params)| {
            let mut payload = params.clone();
            payload.insert("action".to_string(), json!(action));
            payload.insert("state".to_string(), json!(state));
            (action, state, params, Value::Object(payload))
        },
    )
}

/// Generate message requests.
pub fn message_request_strategy() -> impl Strategy<Value = MessageRequest> {
    (
        "[a-z]{2,8}( [a-z]{2,8}){0,3}",
        proptest::collection::vec(provider_state_strategy(), 0..3),
    )
        .prop_map(|(description, states)| MessageRequest {
            description,
            states,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn test_state_change_payload_shape() {
        let mut runner = TestRunner::default();
        for _ in 0..10 {
            let (action, state, params, payload) = state_change_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            assert_eq!(payload["action"], json!(action));
            assert_eq!(payload["state"], json!(state));
            assert_eq!(payload.as_object().unwrap().len(), params.len() + 2);
        }
    }

    #[test]
    fn test_params_exclude_control_keys() {
        let mut runner = TestRunner::default();
        for _ in 0..10 {
            let params = state_params_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            assert!(!params.contains_key("action"));
            assert!(!params.contains_key("state"));
        }
    }

    #[test]
    fn test_message_request_serializes_provider_states() {
        let mut runner = TestRunner::default();
        let request = message_request_strategy()
            .new_tree(&mut runner)
            .unwrap()
            .current();
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("providerStates").is_some());
    }
}
