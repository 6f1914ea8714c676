use std::sync::Arc;

use application::{ClientEvent, EventReceiver, RoomHub, ServerEvent, Session};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{stream::SplitStream, SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// WebSocket 连接
///
/// 一个连接对应一个任务对：发送任务把房间中心推来的事件与控制帧写入 socket，
/// 接收任务解析客户端动作并按到达顺序交给房间中心处理。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    token: String,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState, token: String) -> Self {
        Self {
            socket,
            state,
            token,
        }
    }

    /// 运行连接直到任意一端关闭，然后下线
    pub async fn run(self) {
        let Self {
            socket,
            state,
            token,
        } = self;
        let hub = state.hub.clone();

        let (event_tx, events) = mpsc::unbounded_channel();
        let session = match hub.connect(&token, event_tx).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(error = %err, "WebSocket 鉴权失败");
                reject(socket, ServerEvent::error(err.code(), err.to_string())).await;
                return;
            }
        };

        let (mut sender, incoming) = socket.split();

        // 所有写操作都经过命令通道
        let (cmd_tx, cmd_rx) = mpsc::channel::<WsCommand>(32);

        let mut send_task = tokio::spawn(async move {
            pump_outgoing(&mut sender, cmd_rx, events).await;
            tracing::debug!("WebSocket发送任务结束");
        });

        let mut recv_task = {
            let hub = hub.clone();
            let session = session.clone();
            tokio::spawn(async move {
                pump_incoming(incoming, &hub, &session, &cmd_tx).await;
                tracing::debug!("WebSocket接收任务结束");
            })
        };

        // 等待任意一个任务完成（连接断开）；正在处理的客户端动作不会被中断
        tokio::select! {
            _ = &mut send_task => {
                let _ = recv_task.await;
            }
            _ = &mut recv_task => send_task.abort(),
        }

        hub.disconnect(&session).await;
        tracing::info!(
            user_id = %session.user_id(),
            connection_id = %session.connection_id,
            "WebSocket连接已断开"
        );
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendEvent(ServerEvent),
    SendPong(Vec<u8>),
}

async fn pump_outgoing(
    sender: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>,
    mut cmd_rx: mpsc::Receiver<WsCommand>,
    mut events: EventReceiver,
) {
    loop {
        let frame = tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(WsCommand::SendEvent(event)) => encode(&event),
                Some(WsCommand::SendPong(data)) => Some(WsMessage::Pong(data.into())),
                None => break,
            },
            // 房间中心移除发送端后通道关闭
            event = events.recv() => match event {
                Some(event) => encode(&event),
                None => break,
            },
        };
        let Some(frame) = frame else {
            continue;
        };
        if sender.send(frame).await.is_err() {
            tracing::warn!("Failed to send websocket frame");
            break;
        }
    }
    let _ = sender.close().await;
}

async fn pump_incoming(
    mut incoming: SplitStream<WebSocket>,
    hub: &Arc<RoomHub>,
    session: &Session,
    cmd_tx: &mpsc::Sender<WsCommand>,
) {
    while let Some(Ok(message)) = incoming.next().await {
        match message {
            WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => hub.handle(session, event).await,
                Err(err) => {
                    tracing::debug!(error = %err, "无法解析客户端消息");
                    let reply = ServerEvent::error("INVALID_MESSAGE", err.to_string());
                    if cmd_tx.send(WsCommand::SendEvent(reply)).await.is_err() {
                        break;
                    }
                }
            },
            WsMessage::Ping(data) => {
                if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                    tracing::warn!("Failed to send pong command");
                    break;
                }
            }
            WsMessage::Close(_) => {
                tracing::debug!("WebSocket收到关闭消息");
                break;
            }
            WsMessage::Pong(_) | WsMessage::Binary(_) => {}
        }
    }
}

fn encode(event: &ServerEvent) -> Option<WsMessage> {
    match serde_json::to_string(event) {
        Ok(json) => Some(WsMessage::Text(json.into())),
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize websocket payload");
            None
        }
    }
}

async fn reject(mut socket: WebSocket, event: ServerEvent) {
    if let Some(frame) = encode(&event) {
        let _ = socket.send(frame).await;
    }
    let _ = socket.close().await;
}
