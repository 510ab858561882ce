use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub type Responder = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

/// In-process websocket backend that scripts replies per incoming request.
pub struct StubBackend {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Value>>>,
    pushes: broadcast::Sender<String>,
    disconnect: broadcast::Sender<()>,
    accept_task: JoinHandle<()>,
}

impl StubBackend {
    /// Bind on an ephemeral port and answer each request via `responder`.
    pub async fn spawn<F>(responder: F) -> Self
    where
        F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub backend");
        let addr = listener.local_addr().expect("stub backend addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (pushes, _) = broadcast::channel(64);
        let (disconnect, _) = broadcast::channel(4);
        let responder: Responder = Arc::new(responder);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            responder,
            requests.clone(),
            pushes.clone(),
            disconnect.clone(),
        ));
        Self {
            addr,
            requests,
            pushes,
            disconnect,
            accept_task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// All requests received so far, across connections, in arrival order.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }

    /// Send an unsolicited frame to every live connection.
    pub fn push(&self, payload: Value) {
        let _ = self.pushes.send(payload.to_string());
    }

    /// Send a raw text frame verbatim, valid JSON or not.
    pub fn push_raw(&self, frame: impl Into<String>) {
        let _ = self.pushes.send(frame.into());
    }

    /// Close every live connection, leaving the listener up for reconnects.
    pub fn drop_connections(&self) {
        let _ = self.disconnect.send(());
    }

    pub fn shutdown(self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    responder: Responder,
    requests: Arc<Mutex<Vec<Value>>>,
    pushes: broadcast::Sender<String>,
    disconnect: broadcast::Sender<()>,
) {
    loop {
        let Ok((socket, _)) = listener.accept().await else {
            break;
        };
        tokio::spawn(serve_connection(
            socket,
            responder.clone(),
            requests.clone(),
            pushes.subscribe(),
            disconnect.subscribe(),
        ));
    }
}

async fn serve_connection(
    socket: TcpStream,
    responder: Responder,
    requests: Arc<Mutex<Vec<Value>>>,
    mut pushes: broadcast::Receiver<String>,
    mut disconnect: broadcast::Receiver<()>,
) {
    let Ok(mut stream) = accept_async(socket).await else {
        return;
    };
    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(raw))) => {
                        let Ok(request) = serde_json::from_str::<Value>(&raw) else {
                            continue;
                        };
                        requests.lock().push(request.clone());
                        for reply in responder(&request) {
                            if stream.send(Message::Text(reply.to_string())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => return,
                }
            }
            pushed = pushes.recv() => {
                match pushed {
                    Ok(frame) => {
                        if stream.send(Message::Text(frame)).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
            _ = disconnect.recv() => {
                let _ = stream.close(None).await;
                return;
            }
        }
    }
}
