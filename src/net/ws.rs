//! The WebSocket broadcast hub. Every mutation committed by the engine
//! emits an event; the hub relays it as a JSON frame to every connected
//! client, dropping clients whose sockets fail to accept the write.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use futures::{SinkExt, StreamExt};
use once_cell::sync::Lazy;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dbs::engine;
use crate::net::auth::Identity;

static HUB: Lazy<Hub> = Lazy::new(Hub::default);

#[derive(Default)]
pub struct Hub {
	clients: RwLock<HashMap<Uuid, UnboundedSender<Message>>>,
}

impl Hub {
	async fn join(&self, id: Uuid, sender: UnboundedSender<Message>) {
		self.clients.write().await.insert(id, sender);
	}

	async fn leave(&self, id: Uuid) {
		self.clients.write().await.remove(&id);
	}

	/// Broadcast one frame. Iteration runs over a snapshot so clients can
	/// disconnect concurrently; failed writes evict the client.
	async fn broadcast(&self, frame: String) {
		let snapshot: Vec<(Uuid, UnboundedSender<Message>)> = {
			let clients = self.clients.read().await;
			clients.iter().map(|(id, tx)| (*id, tx.clone())).collect()
		};
		let mut dead = Vec::new();
		for (id, sender) in snapshot {
			if sender.send(Message::Text(frame.clone().into())).is_err() {
				dead.push(id);
			}
		}
		if !dead.is_empty() {
			let mut clients = self.clients.write().await;
			for id in dead {
				clients.remove(&id);
			}
		}
	}
}

/// Subscribe the hub to the engine's event emitter. Runs for the lifetime
/// of the process.
pub fn init() {
	let (_, mut events) = engine().emitter.subscribe(None);
	tokio::spawn(async move {
		while let Some(event) = events.recv().await {
			match serde_json::to_string(&event.payload) {
				Ok(frame) => HUB.broadcast(frame).await,
				Err(err) => warn!(target: "lattice::ws", "unserialisable event: {err}"),
			}
		}
	});
}

pub fn router() -> Router {
	Router::new().route("/ws", any(upgrade))
}

async fn upgrade(ws: WebSocketUpgrade, _identity: Identity) -> impl IntoResponse {
	ws.on_upgrade(serve)
}

async fn serve(socket: WebSocket) {
	let id = Uuid::new_v4();
	let (mut sink, mut stream) = socket.split();
	let (sender, mut receiver) = unbounded_channel::<Message>();
	HUB.join(id, sender).await;
	trace!(target: "lattice::ws", "WebSocket {id} connected");

	let mut write_task = tokio::spawn(async move {
		while let Some(message) = receiver.recv().await {
			if sink.send(message).await.is_err() {
				break;
			}
		}
	});

	// Clients only listen; the read side exists to observe the close.
	loop {
		tokio::select! {
			message = stream.next() => match message {
				Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
				Some(Ok(_)) => continue,
			},
			_ = &mut write_task => break,
		}
	}

	HUB.leave(id).await;
	trace!(target: "lattice::ws", "WebSocket {id} disconnected");
}
