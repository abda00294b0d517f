#[cfg(test)]
mod tests {
    use crate::config::ServerConfig;
    use crate::process::fake::FakeLauncher;
    use crate::router::create_router;
    use crate::state::ServerState;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn create_test_state() -> (Arc<ServerState>, Arc<FakeLauncher>) {
        let config = ServerConfig::from_lookup(|_| None).expect("default config");
        let launcher = Arc::new(FakeLauncher::new());
        let state = Arc::new(ServerState::with_launcher(config, launcher.clone()));
        (state, launcher)
    }

    async fn send_request(
        state: &Arc<ServerState>,
        request: Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response = create_router(state.clone())
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value =
            serde_json::from_slice(&body).unwrap_or(serde_json::json!({}));

        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn panel_start() -> serde_json::Value {
        json!({
            "tiktok": "alice",
            "yt": "KEY",
            "fb": "",
            "fps": "30",
            "ratio": "mobile"
        })
    }

    #[tokio::test]
    async fn test_control_panel_served() {
        let (state, _launcher) = create_test_state();

        let response = create_router(state).oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("/start"));
        assert!(html.contains("/logs"));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _launcher) = create_test_state();

        let (status, body) = send_request(&state, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["stream_status"], "Idle");
    }

    #[tokio::test]
    async fn test_start_with_panel_fields() {
        let (state, launcher) = create_test_state();

        let (status, body) = send_request(&state, post_json("/start", panel_start())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
        assert_eq!(launcher.launch_count(), 1);

        let spec = &launcher.last().spec;
        assert_eq!(spec.extraction.source_url, "https://www.tiktok.com/@alice/live");
        assert_eq!(spec.sinks.len(), 1);
        assert_eq!((spec.transform.width, spec.transform.height), (720, 1280));

        let (_, logs) = send_request(&state, get("/logs")).await;
        assert_eq!(logs["status"], "Streaming");
    }

    #[tokio::test]
    async fn test_start_with_numeric_fps_and_two_destinations() {
        let (state, launcher) = create_test_state();

        let (status, _) = send_request(
            &state,
            post_json(
                "/start",
                json!({
                    "source_url": "https://platform/live/bob",
                    "primary_destination_url": "rtmp://a/x/K1",
                    "secondary_destination_url": "rtmp://b/y/K2",
                    "frame_rate": 60,
                    "aspect_profile": "landscape"
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let spec = &launcher.last().spec;
        assert_eq!(spec.sinks.len(), 2);
        assert_eq!(spec.transform.frame_rate, 60);
        assert_eq!(spec.transform.gop_size, 120);
    }

    #[tokio::test]
    async fn test_start_with_invalid_fps() {
        let (state, launcher) = create_test_state();
        let mut body = panel_start();
        body["fps"] = json!("fast");

        let (status, body) = send_request(&state, post_json("/start", body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert!(body["error"].is_string());
        assert_eq!(launcher.launch_count(), 0);

        let (_, logs) = send_request(&state, get("/logs")).await;
        assert_eq!(logs["status"], "Idle");
    }

    #[tokio::test]
    async fn test_start_with_oversized_fps() {
        let (state, launcher) = create_test_state();
        let mut body = panel_start();
        body["fps"] = json!("3000000000");

        let (status, body) = send_request(&state, post_json("/start", body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert_eq!(launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_start_rejects_tee_syntax_in_key() {
        let (state, launcher) = create_test_state();
        let mut body = panel_start();
        body["yt"] = json!("KEY|[f=flv]rtmp://elsewhere/live/x");

        let (status, body) = send_request(&state, post_json("/start", body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("'|'"));
        assert_eq!(launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_start_with_malformed_body() {
        let (state, launcher) = create_test_state();

        let request = Request::builder()
            .method("POST")
            .uri("/start")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send_request(&state, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert_eq!(launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_start_launch_failure() {
        let (state, launcher) = create_test_state();
        launcher.fail_next("streamlink: command not found");

        let (status, body) = send_request(&state, post_json("/start", panel_start())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["ok"], false);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("Failed to start pipeline"));
    }

    #[tokio::test]
    async fn test_mute_without_stream() {
        let (state, _launcher) = create_test_state();

        let (status, body) = send_request(&state, post("/mute")).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "No pipeline is running");
    }

    #[tokio::test]
    async fn test_mute_toggles() {
        let (state, launcher) = create_test_state();
        send_request(&state, post_json("/start", panel_start())).await;

        let (status, body) = send_request(&state, post("/mute")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "muted": true }));
        assert!(launcher.last().spec.muted);

        let (_, body) = send_request(&state, post("/mute")).await;
        assert_eq!(body, json!({ "muted": false }));
    }

    #[tokio::test]
    async fn test_stop_twice() {
        let (state, _launcher) = create_test_state();
        send_request(&state, post_json("/start", panel_start())).await;

        let (status, body) = send_request(&state, post("/stop")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));

        let (status, body) = send_request(&state, post("/stop")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));

        let (_, logs) = send_request(&state, get("/logs")).await;
        assert_eq!(logs["status"], "Stopped");
    }

    #[tokio::test]
    async fn test_logs_show_pipeline_output() {
        let (state, launcher) = create_test_state();
        send_request(&state, post_json("/start", panel_start())).await;
        launcher.last().emit("[cli][info] Opening stream: 720p (hls)");

        let mut logs = serde_json::Value::Null;
        for _ in 0..200 {
            let (_, body) = send_request(&state, get("/logs")).await;
            logs = body;
            if logs["logs"].as_array().is_some_and(|l| l.len() == 2) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let lines = logs["logs"].as_array().unwrap();
        assert!(lines[0]
            .as_str()
            .unwrap()
            .starts_with("[relay] launching: streamlink "));
        assert!(!lines[0].as_str().unwrap().contains("live2/KEY"));
        assert_eq!(lines[1], "[cli][info] Opening stream: 720p (hls)");
        assert_eq!(logs["status"], "Streaming");
    }

    #[tokio::test]
    async fn test_status_masks_stream_keys() {
        let (state, _launcher) = create_test_state();
        send_request(&state, post_json("/start", panel_start())).await;

        let (status, body) = send_request(&state, get("/status")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Streaming");
        assert_eq!(body["muted"], false);
        assert_eq!(body["mute_strategy"], "restart_pipeline");
        assert_eq!(
            body["config"]["primary_destination_url"],
            "rtmp://a.rtmp.youtube.com/live2/****"
        );
        assert!(!body.to_string().contains("live2/KEY"));
    }
}
