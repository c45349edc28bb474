//! `auth/user`: user listing and profile lookup.

use micro_protocol::{CallError, CallPayload};
use micro_services::LogicModule;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct ProfileQuery {
    name: String,
}

pub fn module() -> LogicModule {
    LogicModule::new()
        .export("list", |payload: CallPayload| async move {
            Ok(json!({
                "from": payload.field("from").cloned().unwrap_or(Value::Null),
                "data": [{"name": "jason"}],
            }))
        })
        .export("profile", |payload: CallPayload| async move {
            let query: ProfileQuery = payload.parse_data()?;
            if query.name != "jason" {
                return Err(CallError::domain(format!("Unknown user: {}", query.name)).with_code(404));
            }
            Ok(json!({"name": query.name, "origin": payload.origin}))
        })
        // Shared helper. Never callable.
        .export("_normalize", |payload: CallPayload| async move { Ok(payload.data) })
}
