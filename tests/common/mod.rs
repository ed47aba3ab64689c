use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mentorship_service::config::Config;
use mentorship_service::routes;
use mentorship_service::security::jwt::TokenService;
use mentorship_service::state::AppState;
use mentorship_service::store::{MemoryStore, Store};
use mentorship_service::websocket::ConnectionRegistry;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use uuid::Uuid;

pub struct TestApp {
    pub addr: SocketAddr,
    pub state: AppState,
    pub client: reqwest::Client,
}

#[allow(dead_code)]
pub async fn spawn_app() -> TestApp {
    spawn_app_with(Arc::new(MemoryStore::new()), Config::test_defaults()).await
}

/// Boot the full router on an ephemeral port. The store and config are
/// injectable so tests can shrink timeouts or wrap the store.
#[allow(dead_code)]
pub async fn spawn_app_with(store: Arc<dyn Store>, config: Config) -> TestApp {
    let state = AppState {
        store,
        tokens: Arc::new(TokenService::new(&config.jwt_secret)),
        registry: ConnectionRegistry::new(),
        config: Arc::new(config),
    };
    let app = routes::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("test listener addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server crashed");
    });

    TestApp {
        addr,
        state,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    #[allow(dead_code)]
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Register a user and return the parsed 201 body
    /// (`user`, `accessToken`, `refreshToken`).
    #[allow(dead_code)]
    pub async fn register(&self, username: &str, role: &str) -> Value {
        let res = self
            .client
            .post(self.url("/auth/register"))
            .json(&json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "a sufficiently long password",
                "role": role,
            }))
            .send()
            .await
            .expect("register request");
        assert_eq!(res.status(), 201, "registration should succeed");
        res.json().await.expect("register response body")
    }
}

#[allow(dead_code)]
pub fn user_id_of(body: &Value) -> Uuid {
    Uuid::parse_str(body["user"]["id"].as_str().expect("user.id"))
        .expect("user.id is a uuid")
}

#[allow(dead_code)]
pub fn access_token_of(body: &Value) -> String {
    body["accessToken"].as_str().expect("accessToken").to_string()
}

#[allow(dead_code)]
pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[allow(dead_code)]
pub async fn connect_ws(app: &TestApp) -> WsClient {
    let (socket, _) = connect_async(app.ws_url()).await.expect("ws connect");
    socket
}

#[allow(dead_code)]
pub async fn ws_send_json(socket: &mut WsClient, value: &Value) {
    socket
        .send(WsMessage::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

#[allow(dead_code)]
pub async fn ws_authenticate(socket: &mut WsClient, token: &str) {
    ws_send_json(socket, &json!({ "type": "authenticate", "token": token })).await;
}

/// Next text frame as JSON, skipping control frames. Panics after 3s.
#[allow(dead_code)]
pub async fn ws_recv_json(socket: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(3), socket.next())
            .await
            .expect("timed out waiting for ws frame")
            .expect("ws stream ended")
            .expect("ws frame error");
        match frame {
            WsMessage::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("ws frame is json")
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("unexpected ws frame: {other:?}"),
        }
    }
}

/// Wait for the server to close the socket and return the close code.
#[allow(dead_code)]
pub async fn ws_expect_close(socket: &mut WsClient) -> u16 {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(3), socket.next())
            .await
            .expect("timed out waiting for close frame")
            .expect("ws stream ended without a close frame")
            .expect("ws frame error");
        match frame {
            WsMessage::Close(Some(frame)) => return u16::from(frame.code),
            WsMessage::Close(None) => panic!("close frame carried no code"),
            _ => continue,
        }
    }
}

/// Block until the hub has registered the user, so a test can rely on pushes
/// being routable before it sends.
#[allow(dead_code)]
pub async fn wait_until_registered(app: &TestApp, user_id: Uuid) {
    for _ in 0..200 {
        if app.state.registry.is_registered(user_id).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("user {user_id} never registered on the hub");
}
