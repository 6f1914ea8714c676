#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    Clock, InMemoryStore, MessageService, MessageServiceDependencies, PresenceRegistry, RoomHub,
    RoomHubDependencies, RoomService, RoomServiceDependencies, SystemClock,
};
use domain::UserId;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::{net::TcpListener, sync::oneshot, time::timeout};
use tokio_tungstenite::{tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;
use web_api::{router, AppState, JwtConfig, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub jwt: Arc<JwtService>,
    pub store: Arc<InMemoryStore>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}/api/v1{}", self.addr, path)
    }

    pub fn ws(&self, token: &str) -> String {
        format!("ws://{}/api/v1/ws?token={}", self.addr, token)
    }

    pub fn token(&self, user_id: UserId, username: &str) -> String {
        self.jwt.generate_token(user_id, username).expect("token")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 在随机端口上启动使用内存存储的完整服务
pub async fn spawn_server() -> TestServer {
    let store = Arc::new(InMemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let presence = Arc::new(PresenceRegistry::new());
    let jwt = Arc::new(JwtService::new(JwtConfig {
        secret: "test-secret-key-with-at-least-32-characters".to_string(),
        expiration_hours: 1,
    }));

    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        room_repository: store.clone(),
        member_repository: store.clone(),
        message_repository: store.clone(),
        clock: clock.clone(),
    }));
    let room_service = Arc::new(RoomService::new(RoomServiceDependencies {
        room_repository: store.clone(),
        member_repository: store.clone(),
        clock: clock.clone(),
    }));
    let hub = Arc::new(RoomHub::new(RoomHubDependencies {
        room_repository: store.clone(),
        member_repository: store.clone(),
        connection_repository: store.clone(),
        message_service: message_service.clone(),
        presence,
        token_verifier: jwt.clone(),
        clock,
    }));

    let state = AppState::new(hub, room_service, message_service, jwt.clone());
    let app = router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        addr,
        jwt,
        store,
        shutdown: Some(shutdown_tx),
    }
}

pub fn new_user() -> UserId {
    UserId::from(Uuid::new_v4())
}

/// 读取下一条 JSON 事件，忽略控制帧
pub async fn next_event(ws: &mut WsClient) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("event within timeout")
            .expect("stream open")
            .expect("frame");
        if let TungsteniteMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("json event");
        }
    }
}

/// 读到指定类型的事件为止
pub async fn next_event_of(ws: &mut WsClient, kind: &str) -> Value {
    loop {
        let event = next_event(ws).await;
        if event["type"] == kind {
            return event;
        }
    }
}

/// 短时间内没有新的文本事件
pub async fn assert_silent(ws: &mut WsClient) {
    let result = timeout(Duration::from_millis(200), ws.next()).await;
    if let Ok(Some(Ok(TungsteniteMessage::Text(text)))) = result {
        panic!("unexpected event: {}", text.as_str());
    }
}
