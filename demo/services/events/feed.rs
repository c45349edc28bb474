//! `events/feed`: writes its own response instead of returning a value.
//!
//! Over HTTP the ticks are streamed as server-sent events; over the socket
//! they are pushed as `tick` frames followed by an acknowledgment.

use micro_protocol::{CallPayload, NativeContext, Reply};
use micro_services::LogicModule;
use serde_json::json;

const DEFAULT_TICKS: u64 = 3;
const MAX_TICKS: u64 = 100;

pub fn module() -> LogicModule {
    LogicModule::new().export("watch", |payload: CallPayload| async move {
        let ticks = payload
            .field("count")
            .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
            .unwrap_or(DEFAULT_TICKS)
            .min(MAX_TICKS);

        Ok(Reply::take_over(move |ctx| async move {
            match ctx {
                NativeContext::Http(mut http) => {
                    http.response.send_head(
                        200,
                        vec![
                            ("content-type".into(), "text/event-stream".into()),
                            ("cache-control".into(), "no-cache".into()),
                        ],
                    );
                    for n in 0..ticks {
                        let chunk = format!("event: tick\ndata: {n}\n\n");
                        if http.response.write(chunk).await.is_err() {
                            return;
                        }
                    }
                    http.response.finish();
                }
                NativeContext::Socket(socket) => {
                    for n in 0..ticks {
                        if socket.emit("tick", json!(n)).await.is_err() {
                            return;
                        }
                    }
                    let _ = socket.ack(json!({"ticks": ticks})).await;
                }
            }
        }))
    })
}
