//! Building exports out of other handlers.

use std::sync::Arc;

use micro_protocol::{CallPayload, Reply};
use serde_json::Value;

use crate::Handler;

/// Run `handlers` one after another on the same payload and reply with the
/// last result.
///
/// The first error stops the chain. A step that takes over the connection
/// also ends it, since nothing after it could still answer. An empty chain
/// replies `null`.
pub fn compose(handlers: Vec<Handler>) -> Handler {
    let handlers = Arc::new(handlers);
    Box::new(move |payload: CallPayload| {
        let handlers = Arc::clone(&handlers);
        Box::pin(async move {
            let mut last = Reply::Value(Value::Null);
            for step in handlers.iter() {
                last = step(payload.clone()).await?;
                if matches!(last, Reply::TakeOver(_)) {
                    break;
                }
            }
            Ok(last)
        })
    })
}

/// Same as [`compose`].
pub fn pipe(handlers: Vec<Handler>) -> Handler {
    compose(handlers)
}

/// Bind fixed arguments to a handler.
///
/// Object fields in `args` are written over the call's data, so bound
/// arguments win over what the caller sent. Non-object data is replaced.
pub fn with_args(handler: Handler, args: Value) -> Handler {
    Box::new(move |mut payload: CallPayload| {
        match (&mut payload.data, &args) {
            (Value::Object(data), Value::Object(bound)) => {
                data.extend(bound.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            (data, bound) => *data = bound.clone(),
        }
        handler(payload)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use micro_protocol::{CallError, Origin};
    use serde_json::json;

    use super::*;
    use crate::handler;

    fn reply_value(reply: Reply) -> Value {
        match reply {
            Reply::Value(value) => value,
            Reply::TakeOver(_) => panic!("expected a value reply"),
        }
    }

    #[tokio::test]
    async fn compose_runs_every_step_and_keeps_the_last_reply() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let composed = compose(vec![
            handler(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!("first"))
                }
            }),
            handler(|payload: CallPayload| async move { Ok(payload.data) }),
        ]);

        let payload = CallPayload::new(Origin::Api).with_data(json!({"n": 1}));
        let reply = composed(payload).await.unwrap();
        assert_eq!(reply_value(reply), json!({"n": 1}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn compose_stops_at_first_error() {
        let reached = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reached);
        let composed = pipe(vec![
            handler(|_| async { Err::<Value, _>(CallError::domain("stop").with_code(409)) }),
            handler(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }
            }),
        ]);

        let err = composed(CallPayload::new(Origin::Socket)).await.unwrap_err();
        assert_eq!(err.code, 409);
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_chain_replies_null() {
        let reply = compose(Vec::new())(CallPayload::new(Origin::Api))
            .await
            .unwrap();
        assert_eq!(reply_value(reply), Value::Null);
    }

    #[tokio::test]
    async fn bound_args_override_call_data() {
        let bound = with_args(
            handler(|payload: CallPayload| async move { Ok(payload.data) }),
            json!({"role": "admin"}),
        );

        let payload = CallPayload::new(Origin::Api).with_data(json!({"role": "guest", "page": 2}));
        let reply = bound(payload).await.unwrap();
        assert_eq!(reply_value(reply), json!({"role": "admin", "page": 2}));

        let reply = bound(CallPayload::new(Origin::Api)).await.unwrap();
        assert_eq!(reply_value(reply), json!({"role": "admin"}));
    }
}
