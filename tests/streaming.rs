mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use route_scope::http::{sse_fn, ws_fn};
use route_scope::security::roles;
use route_scope::{App, ServerConfig};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use common::{secured_app, Trail};

#[tokio::test]
async fn test_sse_events_reach_client() {
    let app = App::new(ServerConfig::default());
    app.routes()
        .path("/events")
        .sse(
            "/:topic",
            sse_fn(|client| {
                let topic = client.path_param("topic").unwrap_or_default().to_owned();
                client.send_event("greeting", &format!("hello {topic}"));
                client.send_data("second");
                // Dropping the last client clone ends the stream.
            }),
            None,
        )
        .unwrap();
    let (addr, shutdown) = common::spawn(app.into_server().unwrap()).await;

    let response = reqwest::get(format!("http://{addr}/events/news")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let body = tokio::time::timeout(Duration::from_secs(5), response.text())
        .await
        .unwrap()
        .unwrap();
    assert!(body.contains("event: greeting\ndata: hello news\n"), "{body}");
    assert!(body.contains("data: second\n"), "{body}");

    shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_completes_with_sse_client_connected() {
    let app = App::new(ServerConfig::default());
    app.routes()
        .sse(
            "/ticks",
            sse_fn(|client| {
                tokio::spawn(async move {
                    while client.send_data("tick") {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                });
            }),
            None,
        )
        .unwrap();
    let (addr, shutdown, task) = common::spawn_with_task(app.into_server().unwrap()).await;

    let mut response = reqwest::get(format!("http://{addr}/ticks")).await.unwrap();
    let first = tokio::time::timeout(Duration::from_secs(5), response.chunk())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(String::from_utf8_lossy(&first).contains("data: tick"));

    shutdown.trigger();

    let stopped = tokio::time::timeout(Duration::from_secs(3), task).await;
    assert!(stopped.is_ok(), "server kept draining an open event stream");
    drop(response);
}

#[tokio::test]
async fn test_websocket_echo_with_hooks() {
    let app = App::new(ServerConfig::default());
    let trail = Trail::default();
    let seen = trail.clone();
    let ws = app.routes().path("/ws");

    ws.ws_before(
        None,
        ws_fn(|config| {
            config.on_connect(|ctx| {
                ctx.send("welcome");
            });
        }),
    )
    .unwrap()
    .ws(
        "/echo",
        ws_fn(|config| {
            config.on_message(|ctx, text| {
                ctx.send(text.to_owned());
            });
        }),
        None,
    )
    .unwrap()
    .ws_after(
        None,
        ws_fn(move |config| {
            let seen = seen.clone();
            config.on_message(move |_, text| seen.push(text));
        }),
    )
    .unwrap();

    let (addr, _shutdown) = common::spawn(app.into_server().unwrap()).await;
    let (mut socket, _) = connect_async(format!("ws://{addr}/ws/echo")).await.unwrap();

    let greeting = socket.next().await.unwrap().unwrap();
    assert_eq!(greeting.to_text().unwrap(), "welcome");

    socket.send(Message::Text("ping".into())).await.unwrap();
    let echo = socket.next().await.unwrap().unwrap();
    assert_eq!(echo.to_text().unwrap(), "ping");

    for _ in 0..50 {
        if !trail.steps().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(trail.steps(), vec!["ping"]);

    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn test_websocket_upgrade_checks_roles() {
    let app = secured_app(ServerConfig::default());
    app.routes()
        .ws("/admin/feed", ws_fn(|_| {}), Some(roles(["admin"])))
        .unwrap();
    let (addr, _shutdown) = common::spawn(app.into_server().unwrap()).await;

    let denied = connect_async(format!("ws://{addr}/admin/feed")).await;
    assert!(denied.is_err());
}

#[tokio::test]
async fn test_client_close_is_answered_with_close_frame() {
    let app = App::new(ServerConfig::default());
    app.routes()
        .ws(
            "/echo",
            ws_fn(|config| {
                config.on_message(|ctx, text| {
                    ctx.send(text.to_owned());
                });
            }),
            None,
        )
        .unwrap();
    let (addr, _shutdown) = common::spawn(app.into_server().unwrap()).await;
    let (mut socket, _) = connect_async(format!("ws://{addr}/echo")).await.unwrap();

    socket.send(Message::Close(None)).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(3), socket.next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(reply, Ok(Message::Close(_))), "{reply:?}");
}

#[tokio::test]
async fn test_shutdown_closes_websocket_sessions() {
    let app = App::new(ServerConfig::default());
    app.routes().ws("/idle", ws_fn(|_| {}), None).unwrap();
    let (addr, shutdown, task) = common::spawn_with_task(app.into_server().unwrap()).await;
    let (mut socket, _) = connect_async(format!("ws://{addr}/idle")).await.unwrap();

    shutdown.trigger();

    let frame = tokio::time::timeout(Duration::from_secs(3), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match frame {
        Message::Close(Some(close)) => assert_eq!(u16::from(close.code), 1001),
        other => panic!("expected close frame, got {other:?}"),
    }
    assert!(tokio::time::timeout(Duration::from_secs(3), task).await.is_ok());
}
