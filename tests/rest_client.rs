//! REST client against a stub device served by axum

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::{json, Value};

use ultiplay::error::DeviceCommandError;
use ultiplay::player::{DeviceCommands, Drive, MediaSource, Runner, UltimateDevice};

/// One request as the stub saw it
#[derive(Debug, Clone)]
struct Seen {
    method: Method,
    path: String,
    query: String,
    password: Option<String>,
    content_type: Option<String>,
    body: Vec<u8>,
}

type Log = Arc<Mutex<Vec<Seen>>>;

fn ok() -> Response {
    axum::Json(json!({ "errors": [] })).into_response()
}

async fn stub(State(log): State<Log>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    log.lock().unwrap().push(Seen {
        method,
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        password: header("x-password"),
        content_type: header("content-type"),
        body: body.to_vec(),
    });

    match uri.path() {
        "/v1/info" => axum::Json(json!({
            "product": "Ultimate 64",
            "firmware_version": "3.12",
            "hostname": "c64u",
            "unique_id": "8D927F",
            "errors": []
        }))
        .into_response(),
        "/v1/configs/Audio%20Mixer/Vol%20UltiSid%201" => axum::Json(json!({
            "Audio Mixer": { "Vol UltiSid 1": { "current": "+2 dB", "default": "0 dB" } },
            "errors": []
        }))
        .into_response(),
        "/v1/machine:readmem" => vec![0u8].into_response(),
        "/v1/machine:pause" => (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response(),
        "/v1/machine:reset" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            ok()
        }
        "/v1/runners:sidplay" => axum::Json(json!({ "errors": ["File not found"] })).into_response(),
        _ => ok(),
    }
}

/// Serve the stub on an ephemeral port
async fn start() -> (String, Log) {
    let log: Log = Arc::default();
    let app = Router::new().fallback(stub).with_state(Arc::clone(&log));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), log)
}

fn device(base: &str, password: Option<&str>) -> UltimateDevice {
    UltimateDevice::new(base, password.map(str::to_string), Duration::from_millis(500)).unwrap()
}

fn last(log: &Log) -> Seen {
    log.lock().unwrap().last().cloned().expect("no request seen")
}

#[tokio::test]
async fn test_password_header_and_machine_commands() {
    let (base, log) = start().await;
    let device = device(&base, Some("secret"));

    device.reboot().await.unwrap();
    let seen = last(&log);
    assert_eq!(seen.method, Method::PUT);
    assert_eq!(seen.path, "/v1/machine:reboot");
    assert_eq!(seen.password.as_deref(), Some("secret"));

    // No password configured, no header
    let open = self::device(&base, None);
    open.resume().await.unwrap();
    assert_eq!(last(&log).password, None);
}

#[tokio::test]
async fn test_small_writes_go_inline_as_hex() {
    let (base, log) = start().await;
    let device = device(&base, None);

    device.write_memory(0x0277, &[0x4c, 0x0d]).await.unwrap();
    let seen = last(&log);
    assert_eq!(seen.method, Method::PUT);
    assert_eq!(seen.path, "/v1/machine:writemem");
    assert_eq!(seen.query, "address=0277&data=4C0D");
}

#[tokio::test]
async fn test_large_writes_are_posted() {
    let (base, log) = start().await;
    let device = device(&base, None);

    let payload = vec![0xAA; 200];
    device.write_memory(0x0801, &payload).await.unwrap();
    let seen = last(&log);
    assert_eq!(seen.method, Method::POST);
    assert_eq!(seen.query, "address=0801");
    assert_eq!(seen.content_type.as_deref(), Some("application/octet-stream"));
    assert_eq!(seen.body, payload);
}

#[tokio::test]
async fn test_read_memory_returns_body() {
    let (base, log) = start().await;
    let device = device(&base, None);

    assert_eq!(device.read_memory(0x00C6, 1).await.unwrap(), vec![0]);
    assert_eq!(last(&log).query, "address=00C6&length=1");
}

#[tokio::test]
async fn test_config_round_trip() {
    let (base, log) = start().await;
    let device = device(&base, None);

    let value = device.get_config("Audio Mixer", "Vol UltiSid 1").await.unwrap();
    assert_eq!(value, "+2 dB");

    device
        .batch_set_config(
            "Audio Mixer",
            &[
                ("Vol UltiSid 1".to_string(), "OFF".to_string()),
                ("Vol Socket 1".to_string(), "OFF".to_string()),
            ],
        )
        .await
        .unwrap();
    let seen = last(&log);
    assert_eq!(seen.method, Method::POST);
    assert_eq!(seen.path, "/v1/configs");
    let body: Value = serde_json::from_slice(&seen.body).unwrap();
    assert_eq!(
        body,
        json!({ "Audio Mixer": { "Vol UltiSid 1": "OFF", "Vol Socket 1": "OFF" } })
    );

    device.set_config("Audio Mixer", "Vol Socket 2", "0 dB").await.unwrap();
    let seen = last(&log);
    assert_eq!(seen.path, "/v1/configs/Audio%20Mixer/Vol%20Socket%202");
    assert_eq!(seen.query, "value=0+dB");
}

#[tokio::test]
async fn test_remote_and_uploaded_runs() {
    let (base, log) = start().await;
    let device = device(&base, None);

    device
        .run(Runner::RunPrg, &MediaSource::Remote("/USB0/demo.prg".to_string()), None)
        .await
        .unwrap();
    let seen = last(&log);
    assert_eq!(seen.method, Method::PUT);
    assert_eq!(seen.path, "/v1/runners:run_prg");
    assert_eq!(seen.query, "file=%2FUSB0%2Fdemo.prg");

    let upload = MediaSource::Upload {
        name: "game.d64".to_string(),
        bytes: vec![1, 2, 3],
    };
    device.mount(Drive::B, &upload).await.unwrap();
    let seen = last(&log);
    assert_eq!(seen.method, Method::POST);
    assert_eq!(seen.path, "/v1/drives/b:mount");
    assert_eq!(seen.query, "type=d64&mode=readonly");
    assert!(seen
        .content_type
        .as_deref()
        .is_some_and(|c| c.starts_with("multipart/form-data")));
}

#[tokio::test]
async fn test_error_mapping() {
    let (base, _log) = start().await;
    let device = device(&base, None);

    match device.pause().await {
        Err(DeviceCommandError::Status { status, message, .. }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "busy");
        }
        other => panic!("expected status error, got {:?}", other),
    }

    let sid = MediaSource::Remote("/USB0/missing.sid".to_string());
    match device.run(Runner::SidPlay, &sid, Some(1)).await {
        Err(DeviceCommandError::Protocol { message, .. }) => assert_eq!(message, "File not found"),
        other => panic!("expected protocol error, got {:?}", other),
    }

    assert!(matches!(device.reset().await, Err(DeviceCommandError::Timeout { .. })));
}

#[tokio::test]
async fn test_info_identity() {
    let (base, _log) = start().await;
    let device = device(&base, None);

    let info = device.info().await.unwrap();
    assert_eq!(info.product, "Ultimate 64");
    assert_eq!(info.identity(), Some("8D927F"));
}
