//! Protocol layer tests: payload defaults, envelopes, errors, call targets,
//! socket frames.

#[cfg(test)]
mod tests {
    use micro_protocol::frame::{ACK_EVENT, CALL_EVENT};
    use micro_protocol::*;
    use serde::Deserialize;
    use serde_json::json;

    // ─────────────────────────────────────────────────────────────────────
    // CallPayload
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn payload_defaults() {
        let payload = CallPayload::new(Origin::Api);
        assert_eq!(payload.token, None);
        assert_eq!(payload.access_key, None);
        assert_eq!(payload.signature, None);
        assert_eq!(payload.data, json!({}));
    }

    #[test]
    fn payload_null_data_becomes_empty_object() {
        let payload = CallPayload::new(Origin::Socket).with_data(json!(null));
        assert_eq!(payload.data, json!({}));
    }

    #[test]
    fn payload_serializes_camel_case_with_origin_tag() {
        let mut payload = CallPayload::new(Origin::Socket).with_data(json!({"a": 1}));
        payload.set_header("accessKey", Some("k".into()));
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["accessKey"], "k");
        assert_eq!(value["token"], json!(null));
        assert_eq!(value["from"], "socket");
        assert_eq!(value["data"]["a"], 1);
    }

    #[test]
    fn payload_deserializes_with_missing_fields() {
        let payload: CallPayload = serde_json::from_value(json!({"from": "api"})).unwrap();
        assert_eq!(payload.origin, Origin::Api);
        assert_eq!(payload.data, json!({}));
    }

    #[test]
    fn set_header_keeps_unknown_names_aside() {
        let mut payload = CallPayload::new(Origin::Api);
        payload.set_header("signature", Some("sig".into()));
        payload.set_header("tenant", Some("acme".into()));
        assert_eq!(payload.signature.as_deref(), Some("sig"));
        assert_eq!(payload.headers["tenant"], "acme");
        assert!(payload.data.get("tenant").is_none());
    }

    #[derive(Debug, Deserialize)]
    struct ListParams {
        from: String,
        #[serde(default)]
        limit: Option<u32>,
    }

    #[test]
    fn parse_data_typed() {
        let payload = CallPayload::new(Origin::Api).with_data(json!({"from": "test", "limit": 3}));
        let params: ListParams = payload.parse_data().unwrap();
        assert_eq!(params.from, "test");
        assert_eq!(params.limit, Some(3));
    }

    #[test]
    fn parse_data_mismatch_is_validation_failure() {
        let payload = CallPayload::new(Origin::Api).with_data(json!({"limit": "many"}));
        let err = payload.parse_data::<ListParams>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationFailed);
        assert_eq!(err.code, 400);
        assert!(err.details.as_ref().unwrap().is_array());
    }

    // ─────────────────────────────────────────────────────────────────────
    // CallTarget
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn target_parse_three_segments() {
        let target = CallTarget::parse("auth/user/list").unwrap();
        assert_eq!(target, CallTarget::new("auth", "user", "list"));
        assert_eq!(target.to_string(), "auth/user/list");
        assert!(target.is_valid());
    }

    #[test]
    fn target_parse_rejects_wrong_segment_count() {
        for path in ["", "auth", "auth/user", "auth/user/list/extra"] {
            let err = CallTarget::parse(path).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidRequest, "{path}");
        }
    }

    #[test]
    fn target_with_modifier_is_invalid() {
        assert!(!CallTarget::new("_auth", "user", "list").is_valid());
        assert!(!CallTarget::new("auth", "$user", "list").is_valid());
        assert!(!CallTarget::new("auth", "user", "").is_valid());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Errors and envelopes
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn error_default_codes() {
        assert_eq!(CallError::invalid_request().code, 400);
        assert_eq!(CallError::not_found("a/b/c").code, 404);
        assert_eq!(CallError::unauthorized().code, 401);
        assert_eq!(CallError::forbidden("no").code, 403);
        assert_eq!(CallError::domain("boom").code, 500);
        assert_eq!(CallError::domain("boom").with_code(4001).code, 4001);
    }

    #[test]
    fn error_display_is_message() {
        assert_eq!(CallError::unauthorized().to_string(), "Invalid token");
        assert_eq!(CallError::not_found("a/b/c").to_string(), "Function not found: a/b/c");
    }

    #[test]
    fn success_envelope_shape() {
        let env = Envelope::success(json!({"x": 1}));
        assert_eq!(serde_json::to_value(&env).unwrap(), json!({"success": true, "data": {"x": 1}}));
    }

    #[test]
    fn success_envelope_replaces_null_with_empty_object() {
        assert_eq!(Envelope::success(json!(null)).data, json!({}));
        assert_eq!(Envelope::success(json!(0)).data, json!(0));
    }

    #[test]
    fn failure_envelope_omits_missing_details() {
        let env = Envelope::failure(&CallError::domain("boom"));
        assert!(!env.is_success());
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"success": false, "data": {"code": 500, "message": "boom"}})
        );
    }

    #[test]
    fn validation_envelope_carries_details() {
        let err = CallError::validation(vec![json!({"message": "\"name\" is required"})]);
        let env = Envelope::failure(&err);
        assert_eq!(env.data["code"], 400);
        assert_eq!(env.data["message"], "Bad request");
        assert_eq!(env.data["details"][0]["message"], "\"name\" is required");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Replies and frames
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn reply_from_value() {
        let reply: Reply = json!([1, 2]).into();
        assert_eq!(reply.as_value(), Some(&json!([1, 2])));
        assert!(!reply.is_take_over());
        assert!(Reply::take_over(|_ctx| async {}).is_take_over());
    }

    #[test]
    fn call_frame_parses() {
        let frame: SocketFrame = serde_json::from_value(json!({
            "event": CALL_EVENT,
            "id": 3,
            "data": {"path": "auth/user/list"}
        }))
        .unwrap();
        assert!(frame.is_call());
        assert_eq!(frame.id, Some(json!(3)));
    }

    #[test]
    fn ack_frame_serializes() {
        let frame = SocketFrame::ack(json!("a1"), json!({"success": true, "data": {}}));
        let value: serde_json::Value = serde_json::from_str(&frame.to_text()).unwrap();
        assert_eq!(value["event"], ACK_EVENT);
        assert_eq!(value["id"], "a1");
        assert_eq!(value["data"]["success"], true);
    }
}
