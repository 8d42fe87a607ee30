use limelight_proxy::proxy::rewrite::{RouteRule, RouteTable};

#[test]
fn test_camera_always_maps_to_stream_endpoint() {
    let table = RouteTable::limelight();

    for path in [
        "/dash/limelight/camera",
        "/dash/limelight/camera/",
        "/dash/limelight/camera/anything",
        "/dash/limelight/camera/a/b/c.jpg",
        "/dash/limelight/cameraXYZ",
    ] {
        assert_eq!(table.rewrite(path), "/stream.mjpeg", "path {path}");
    }
}

#[test]
fn test_dashboard_strips_prefix() {
    let table = RouteTable::limelight();

    assert_eq!(table.rewrite("/dash/limelight/dashboard"), "/");
    assert_eq!(table.rewrite("/dash/limelight/dashboard/"), "/");
    assert_eq!(
        table.rewrite("/dash/limelight/dashboard/assets/app.js"),
        "/assets/app.js"
    );
}

#[test]
fn test_api_strips_prefix_and_defaults_to_status() {
    let table = RouteTable::limelight();

    assert_eq!(table.rewrite("/dash/limelight/api"), "/status");
    assert_eq!(table.rewrite("/dash/limelight/api/results"), "/results");
    assert_eq!(table.rewrite("/dash/limelight/api/"), "/");
}

#[test]
fn test_unmatched_paths_pass_through() {
    let table = RouteTable::limelight();

    assert_eq!(table.rewrite("/dash/other"), "/dash/other");
    assert_eq!(table.rewrite("/"), "/");
    assert_eq!(table.rewrite(""), "");
}

#[test]
fn test_custom_rules_are_ordered() {
    let table = RouteTable::new(vec![
        RouteRule::strip("/v1/video", "/feed"),
        RouteRule::replace("/v1", "/legacy"),
    ]);

    assert_eq!(table.rewrite("/v1/video"), "/feed");
    assert_eq!(table.rewrite("/v1/video/hd"), "/hd");
    assert_eq!(table.rewrite("/v1/other"), "/legacy");
    assert_eq!(table.rules().len(), 2);
}
