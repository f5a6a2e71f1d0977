use std::io::Read;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use posthog_dispatch::{ApiRequest, Context, DispatchError, Dispatcher, HttpApiClient, JsonParameters};
use serde_json::{json, Value};
use tiny_http::{Header, Response, Server};

struct Captured {
    method: String,
    url: String,
    body: Value,
}

/// Serves `replies.len()` requests, answering each with the given status and body.
fn mock_ingestion(
    replies: Vec<(u16, &'static str)>,
) -> Result<(String, thread::JoinHandle<Vec<Captured>>)> {
    let server = Server::http("127.0.0.1:0").map_err(|err| anyhow!("bind failed: {err}"))?;
    let addr = server
        .server_addr()
        .to_ip()
        .ok_or_else(|| anyhow!("server has no ip address"))?;
    let handle = thread::spawn(move || {
        let mut captured = Vec::new();
        for (status, reply) in replies {
            let mut request = match server.recv() {
                Ok(request) => request,
                Err(_) => break,
            };
            let mut text = String::new();
            let _ = request.as_reader().read_to_string(&mut text);
            captured.push(Captured {
                method: request.method().to_string(),
                url: request.url().to_string(),
                body: serde_json::from_str(&text).unwrap_or(Value::Null),
            });
            let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                .expect("static header");
            let response = Response::from_string(reply)
                .with_status_code(status)
                .with_header(header);
            let _ = request.respond(response);
        }
        captured
    });
    Ok((format!("http://{addr}"), handle))
}

fn client(url: &str) -> HttpApiClient {
    HttpApiClient::with_timeout(url, "phc_test", Duration::from_secs(5))
}

#[test]
fn capture_batch_reaches_server_with_api_key() -> Result<()> {
    let (url, handle) = mock_ingestion(vec![(200, "{\"status\":1}")])?;
    let dispatcher = Dispatcher::new(client(&url));
    let source = JsonParameters::from_value(json!({
        "items": [
            { "eventName": "signup", "distinctId": "u1" },
            { "eventName": "signup", "distinctId": "u2" }
        ]
    }))?;
    let mut ctx = Context::new();

    let output = dispatcher.run(&mut ctx, &source, "event", "create")?;
    assert_eq!(output, vec![json!({ "status": 1 })]);

    let captured = handle.join().map_err(|_| anyhow!("server thread panicked"))?;
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].method, "POST");
    assert_eq!(captured[0].url, "/capture");
    assert_eq!(captured[0].body["api_key"], json!("phc_test"));
    assert_eq!(captured[0].body["batch"][1]["properties"]["distinct_id"], json!("u2"));
    Ok(())
}

#[test]
fn empty_and_plain_text_replies_are_wrapped() -> Result<()> {
    let (url, handle) = mock_ingestion(vec![(200, ""), (200, "ok")])?;
    let api = client(&url);

    assert_eq!(api.submit("POST", "/batch", json!({ "event": "$identify" }))?, json!({}));
    assert_eq!(
        api.submit("POST", "/batch", json!({ "event": "$identify" }))?,
        json!({ "body": "ok" })
    );
    handle.join().map_err(|_| anyhow!("server thread panicked"))?;
    Ok(())
}

#[test]
fn error_status_becomes_transport_error() -> Result<()> {
    let (url, handle) = mock_ingestion(vec![(401, "{\"detail\":\"invalid api key\"}")])?;
    let err = client(&url)
        .submit("POST", "/batch", json!({ "event": "$identify" }))
        .unwrap_err();

    match err.downcast_ref::<DispatchError>() {
        Some(DispatchError::Transport {
            status: Some(401),
            message,
        }) => assert!(message.contains("invalid api key")),
        other => panic!("unexpected error: {other:?}"),
    }
    handle.join().map_err(|_| anyhow!("server thread panicked"))?;
    Ok(())
}

#[test]
fn unreachable_host_is_a_transport_error_without_status() -> Result<()> {
    let server = Server::http("127.0.0.1:0").map_err(|err| anyhow!("bind failed: {err}"))?;
    let addr = server
        .server_addr()
        .to_ip()
        .ok_or_else(|| anyhow!("server has no ip address"))?;
    drop(server);

    let err = client(&format!("http://{addr}"))
        .submit("POST", "/batch", json!({}))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DispatchError>(),
        Some(DispatchError::Transport { status: None, .. })
    ));
    Ok(())
}
