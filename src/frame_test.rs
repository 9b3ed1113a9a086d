use super::*;

#[test]
fn request_sets_fields() {
    let frame = Frame::request("project:join", Data::new());
    assert_eq!(frame.syscall, "project:join");
    assert_eq!(frame.status, Status::Request);
    assert!(frame.parent_id.is_none());
    assert!(frame.project_id.is_none());
    assert!(frame.ts > 0);
}

#[test]
fn reply_inherits_context() {
    let project_id = Uuid::new_v4();
    let req = Frame::request("project:join", Data::new()).with_project_id(project_id);
    let done = req.done();

    assert_eq!(done.parent_id, Some(req.id));
    assert_eq!(done.project_id, Some(project_id));
    assert_eq!(done.syscall, "project:join");
    assert_eq!(done.status, Status::Done);
    assert!(done.data.is_empty());
}

#[test]
fn done_with_carries_data() {
    let req = Frame::request("project:join", Data::new());
    let mut data = Data::new();
    data.insert("members".into(), serde_json::json!([]));
    let done = req.done_with(data);
    assert!(done.data.contains_key("members"));
}

#[test]
fn prefix_and_op_extraction() {
    let frame = Frame::request("comment:typing", Data::new());
    assert_eq!(frame.prefix(), "comment");
    assert_eq!(frame.op(), "typing");

    let frame = Frame::request("task_updated", Data::new());
    assert_eq!(frame.prefix(), "task_updated");
    assert_eq!(frame.op(), "");
}

#[test]
fn uuid_field_reads_data_then_falls_back_to_project_id() {
    let project_id = Uuid::new_v4();
    let task_id = Uuid::new_v4();

    let frame = Frame::request("task:editing", Data::new())
        .with_project_id(project_id)
        .with_data("task_id", task_id.to_string());
    assert_eq!(frame.uuid_field("project_id"), Some(project_id));
    assert_eq!(frame.uuid_field("task_id"), Some(task_id));

    let other = Uuid::new_v4();
    let frame = frame.with_data("project_id", other.to_string());
    assert_eq!(frame.uuid_field("project_id"), Some(other));
}

#[test]
fn uuid_field_rejects_garbage() {
    let frame = Frame::request("project:join", Data::new()).with_data("project_id", "not-a-uuid");
    assert_eq!(frame.uuid_field("project_id"), None);
    assert_eq!(frame.uuid_field("missing"), None);
}

#[test]
fn inbound_json_without_optional_fields_parses() {
    let id = Uuid::new_v4();
    let json = format!(r#"{{"id":"{id}","parent_id":null,"ts":1,"syscall":"project:leave","status":"request"}}"#);
    let frame: Frame = serde_json::from_str(&json).expect("parse");
    assert_eq!(frame.id, id);
    assert!(frame.from.is_none());
    assert!(frame.data.is_empty());
}

#[test]
fn error_from_typed() {
    #[derive(Debug, thiserror::Error)]
    #[error("access denied")]
    struct Denied;

    impl ErrorCode for Denied {
        fn error_code(&self) -> &'static str {
            "E_ACCESS_DENIED"
        }
    }

    let req = Frame::request("project:join", Data::new());
    let err = req.error_from(&Denied);

    assert_eq!(err.status, Status::Error);
    assert_eq!(err.data.get("code").and_then(|v| v.as_str()), Some("E_ACCESS_DENIED"));
    assert_eq!(err.data.get("message").and_then(|v| v.as_str()), Some("access denied"));
    assert_eq!(
        err.data
            .get("retryable")
            .and_then(serde_json::Value::as_bool),
        Some(false)
    );
}
