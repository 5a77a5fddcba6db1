//! 对象句柄与管理 API 测试

use std::sync::Arc;

use serde_json::json;
use vcd_platform::*;
use vcd_transport::{Method, MockTransport};

fn setup() -> (Arc<MockTransport>, VcdClient) {
    let mock = Arc::new(MockTransport::new());
    let client = VcdClient::with_clock(
        mock.clone(),
        PlatformConfig::default(),
        Arc::new(ManualClock::new()),
    );
    (mock, client)
}

#[tokio::test]
async fn test_repeated_refresh_does_not_accumulate() {
    let (mock, client) = setup();
    mock.respond(
        Method::GET,
        "/api/vApp/1",
        200,
        json!({
            "href": "/api/vApp/1",
            "name": "web",
            "vms": [
                {"href": "/api/vApp/vm-1", "name": "a"},
                {"href": "/api/vApp/vm-2", "name": "b"},
                {"href": "/api/vApp/vm-3", "name": "c"}
            ]
        }),
    );

    let mut vapp = client.vapp().get("/api/vApp/1").await.unwrap();
    for _ in 0..3 {
        vapp.refresh().await.unwrap();
        assert_eq!(vapp.snapshot().unwrap().vms.len(), 3);
    }

    let vms = client.vapp().list_vms(&mut vapp).await.unwrap();
    assert_eq!(vms.len(), 3);
    assert_eq!(vms[2].name(), "c");
}

#[tokio::test]
async fn test_refresh_uninitialized_handle() {
    let (mock, client) = setup();
    let mut org = OrgHandle::new(client.transport(), "");

    let err = org.refresh().await.unwrap_err();
    assert!(matches!(err, RefreshError::NotInitialized(ObjectKind::Org)));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_refresh_absent_object() {
    let (_mock, client) = setup();
    let mut vdc = VdcHandle::new(client.transport(), "/api/vdc/gone");

    let err = vdc.refresh().await.unwrap_err();
    assert!(matches!(err, RefreshError::ObjectAbsent { kind: ObjectKind::Vdc, .. }));
}

#[tokio::test]
async fn test_refresh_failure_wraps_cause() {
    let (mock, client) = setup();
    mock.respond(Method::GET, "/api/vdc/1", 500, json!({"message": "database down"}));
    let mut vdc = VdcHandle::new(client.transport(), "/api/vdc/1");

    match vdc.refresh().await.unwrap_err() {
        RefreshError::RefreshFailed { cause, .. } => {
            assert!(matches!(*cause, VcdError::Api { status: 500, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_find_org_by_name() {
    let (mock, client) = setup();
    mock.respond(
        Method::GET,
        "/api/query?type=organization&format=references&filter=name==acme",
        200,
        json!({"total": 1, "reference": [{"href": "/api/admin/org/1", "name": "acme"}]}),
    );
    mock.respond(
        Method::GET,
        "/api/admin/org/1",
        200,
        json!({"href": "/api/admin/org/1", "name": "acme", "isEnabled": true}),
    );

    let org = client.org().find_by_name("acme").await.unwrap();
    assert_eq!(org.href(), "/api/admin/org/1");
    assert!(org.snapshot().unwrap().is_enabled);

    let err = client.org().find_by_name("missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_create_vdc_returns_task() {
    let (mock, client) = setup();
    mock.respond(
        Method::POST,
        "/api/admin/org/1/vdcsparams",
        201,
        json!({
            "href": "/api/admin/vdc/2",
            "name": "vdc-2",
            "tasks": [{"href": "/api/task/30", "status": "running", "operation": "Creating VDC"}]
        }),
    );
    mock.respond(
        Method::GET,
        "/api/task/30",
        200,
        json!({"href": "/api/task/30", "status": "success"}),
    );
    let org = OrgHandle::new(client.transport(), "/api/admin/org/1");

    let params = CreateVdcParams::new("vdc-2", Reference::new("/api/admin/providervdc/1", "pvdc"));
    let (vdc, task) = client.vdc().create(&org, &params).await.unwrap();
    assert_eq!(vdc.name(), "vdc-2");

    let mut task = task.unwrap();
    assert_eq!(task.operation(), "Creating VDC");
    client
        .tracker()
        .await_completion(&mut task, std::time::Duration::from_secs(30))
        .await
        .unwrap();

    let body: serde_json::Value =
        serde_json::from_str(mock.calls()[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(body["providerVdcReference"]["href"], "/api/admin/providervdc/1");
    assert_eq!(body["allocationModel"], "AllocationVApp");
}

#[tokio::test]
async fn test_disable_missing_object_is_not_found() {
    let (_mock, client) = setup();
    let vdc = VdcHandle::new(client.transport(), "/api/vdc/gone");

    let err = client.vdc().disable(&vdc).await.unwrap_err();
    assert!(err.is_not_found());

    // 删除不存在的对象不是错误
    assert!(client.vdc().delete(&vdc, true, true).await.unwrap().is_none());
}

#[tokio::test]
async fn test_submit_and_wait_awaits_task() {
    let (mock, client) = setup();
    mock.respond(
        Method::POST,
        "/api/vApp/1/power/action/powerOn",
        202,
        json!({"href": "/api/task/40", "status": "queued"}),
    );
    mock.respond(
        Method::GET,
        "/api/task/40",
        200,
        json!({"href": "/api/task/40", "status": "running"}),
    );
    mock.respond(
        Method::GET,
        "/api/task/40",
        200,
        json!({"href": "/api/task/40", "status": "success"}),
    );
    let vapp = VAppHandle::new(client.transport(), "/api/vApp/1");

    let api = client.vapp();
    let target = &vapp;
    let submission = client
        .submit_and_wait("vApp 开机", move || async move {
            Ok(match api.power_on(target).await? {
                Some(task) => Submission::Task(task),
                None => Submission::Completed,
            })
        })
        .await
        .unwrap();

    let task = submission.into_task().unwrap();
    assert_eq!(task.status(), TaskStatus::Success);
    assert_eq!(mock.calls_to(Method::GET, "/api/task/40"), 2);
}
