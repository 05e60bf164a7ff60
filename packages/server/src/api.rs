use actix_web::{
    HttpRequest, HttpResponse, Result, error::ErrorServiceUnavailable, get, route,
    web::{self, Json},
};
use serde_json::{Value, json};

use crate::ws::{
    handler::{self, ConnectionSettings},
    server::MatchServerHandle,
};

pub fn bind_services(cfg: &mut web::ServiceConfig) {
    cfg.service(home_endpoint)
        .service(health_endpoint)
        .service(users_endpoint)
        .service(websocket);
}

#[get("/")]
pub async fn home_endpoint() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body("<h1>Hello World!</h1>")
}

#[route("/health", method = "GET")]
pub async fn health_endpoint() -> Result<Json<Value>> {
    log::trace!("Healthy");
    Ok(Json(json!({"healthy": true})))
}

/// Sorted display names of every connected, named client.
#[get("/users")]
pub async fn users_endpoint(server: web::Data<MatchServerHandle>) -> Result<Json<Vec<String>>> {
    let users = server
        .connected_users()
        .await
        .map_err(ErrorServiceUnavailable)?;

    Ok(Json(users))
}

#[allow(clippy::future_not_send)]
#[get("/ws")]
pub async fn websocket(
    req: HttpRequest,
    stream: web::Payload,
    server: web::Data<MatchServerHandle>,
    settings: web::Data<ConnectionSettings>,
) -> Result<HttpResponse> {
    let (response, session, msg_stream) = actix_ws::handle(&req, stream)?;

    // spawn websocket handler (and don't await it) so that the response is returned immediately
    actix_web::rt::spawn(handler::handle_ws(
        server.get_ref().clone(),
        *settings.get_ref(),
        session,
        msg_stream,
    ));

    Ok(response)
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use actix_http::ws::{CloseCode, Frame, Message, ProtocolError};
    use actix_web::{App, http::StatusCode, test};
    use futures_util::{SinkExt as _, Stream, StreamExt as _};
    use pairplay_matchmaking::models::{OutboundAction, OutboundPayload};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ws::server::MatchServer;

    fn start_ws_server(
        handle: &MatchServerHandle,
        settings: ConnectionSettings,
    ) -> actix_test::TestServer {
        let handle = handle.clone();
        actix_test::start(move || {
            App::new()
                .app_data(web::Data::new(handle.clone()))
                .app_data(web::Data::new(settings))
                .configure(bind_services)
        })
    }

    /// Next frame that is not a heartbeat.
    async fn next_frame(
        ws: &mut (impl Stream<Item = Result<Frame, ProtocolError>> + Unpin),
    ) -> Frame {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("no frame within 2s")
                .expect("websocket stream ended")
                .expect("websocket protocol error");

            match frame {
                Frame::Ping(_) | Frame::Pong(_) => {}
                frame => return frame,
            }
        }
    }

    async fn next_payload(
        ws: &mut (impl Stream<Item = Result<Frame, ProtocolError>> + Unpin),
    ) -> OutboundPayload {
        match next_frame(ws).await {
            Frame::Text(bytes) => serde_json::from_slice(&bytes).unwrap(),
            frame => panic!("expected a text frame, got {frame:?}"),
        }
    }

    async fn wait_for_users(handle: &MatchServerHandle, expected: &[&str]) {
        for _ in 0..200 {
            if handle.connected_users().await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("connected users never became {expected:?}");
    }

    fn start_server() -> MatchServerHandle {
        let (server, handle) = MatchServer::new(Duration::from_millis(50));
        actix_web::rt::spawn(server.run());
        handle
    }

    #[test_log::test(actix_web::test)]
    async fn home_says_hello() {
        let app = test::init_service(App::new().service(home_endpoint)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "<h1>Hello World!</h1>");
    }

    #[test_log::test(actix_web::test)]
    async fn health_reports_healthy() {
        let app = test::init_service(App::new().service(health_endpoint)).await;

        let body: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/health").to_request(),
        )
        .await;

        assert_eq!(body, json!({"healthy": true}));
    }

    #[test_log::test(actix_web::test)]
    async fn users_lists_connected_names() {
        let handle = start_server();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(handle.clone()))
                .service(users_endpoint),
        )
        .await;

        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        let (conn, _token) = handle.connect(tx).await.unwrap();
        handle
            .send_message(
                conn,
                serde_json::from_value(json!({"action": "hello", "username": "zed"})).unwrap(),
            )
            .await
            .unwrap();

        let body: Vec<String> =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/users").to_request())
                .await;

        assert_eq!(body, vec!["zed".to_string()]);
    }

    #[test_log::test(actix_web::test)]
    async fn users_unavailable_after_shutdown() {
        let handle = start_server();
        handle.shutdown();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(handle))
                .service(users_endpoint),
        )
        .await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/users").to_request()).await;

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test_log::test(actix_web::test)]
    async fn websocket_requires_upgrade() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(start_server()))
                .app_data(web::Data::new(ConnectionSettings::default()))
                .service(websocket),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ws").to_request()).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test_log::test(actix_web::test)]
    async fn malformed_frame_gets_error_and_connection_stays_open() {
        let handle = start_server();
        let mut srv = start_ws_server(&handle, ConnectionSettings::default());
        let mut ws = srv.ws_at("/ws").await.unwrap();

        ws.send(Message::Text("not json".into())).await.unwrap();
        let response = next_payload(&mut ws).await;
        assert_eq!(response.action, OutboundAction::Error);
        assert!(response.message.starts_with("Invalid message"));

        ws.send(Message::Text(
            r#"{"action": "match", "username": "alice"}"#.into(),
        ))
        .await
        .unwrap();
        assert_eq!(
            next_payload(&mut ws).await,
            OutboundPayload::match_fail(vec!["alice".into()])
        );

        let users: Vec<String> = srv
            .get("/users")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(users, vec!["alice".to_string()]);

        ws.send(Message::Close(None)).await.unwrap();
        wait_for_users(&handle, &[]).await;
    }

    #[test_log::test(actix_web::test)]
    async fn paired_clients_relay_moves_over_websocket() {
        let handle = start_server();
        let mut srv = start_ws_server(&handle, ConnectionSettings::default());
        let mut alice = srv.ws_at("/ws").await.unwrap();
        alice
            .send(Message::Text(r#"{"action": "match", "username": "alice"}"#.into()))
            .await
            .unwrap();
        next_payload(&mut alice).await;

        let mut bob = srv.ws_at("/ws").await.unwrap();
        bob.send(Message::Text(r#"{"action": "match", "username": "bob"}"#.into()))
            .await
            .unwrap();
        let matched = next_payload(&mut bob).await;
        assert_eq!(matched.action, OutboundAction::MatchSuccess);
        assert!(matched.first_move);

        bob.send(Message::Binary(r#"{"action": "move", "move": 4, "message": "e4"}"#.into()))
            .await
            .unwrap();
        assert_eq!(
            next_payload(&mut alice).await,
            OutboundPayload::relayed_move(4, "e4")
        );
    }

    #[test_log::test(actix_web::test)]
    async fn silent_client_is_disconnected() {
        let handle = start_server();
        let settings = ConnectionSettings {
            heartbeat_interval: Duration::from_millis(50),
            client_timeout: Duration::from_millis(150),
            ..ConnectionSettings::default()
        };
        let mut srv = start_ws_server(&handle, settings);
        let mut ws = srv.ws_at("/ws").await.unwrap();

        ws.send(Message::Text(r#"{"username": "carol"}"#.into()))
            .await
            .unwrap();
        wait_for_users(&handle, &["carol"]).await;

        assert!(matches!(next_frame(&mut ws).await, Frame::Close(None)));
        wait_for_users(&handle, &[]).await;
    }

    #[test_log::test(actix_web::test)]
    async fn server_shutdown_closes_socket() {
        let handle = start_server();
        let mut srv = start_ws_server(&handle, ConnectionSettings::default());
        let mut ws = srv.ws_at("/ws").await.unwrap();

        ws.send(Message::Text(r#"{"action": "match"}"#.into()))
            .await
            .unwrap();
        next_payload(&mut ws).await;

        handle.shutdown();

        match next_frame(&mut ws).await {
            Frame::Close(Some(reason)) => assert_eq!(reason.code, CloseCode::Normal),
            frame => panic!("expected a close frame, got {frame:?}"),
        }
    }
}
