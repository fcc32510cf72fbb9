//! A small in-process event emitter. Subscribers register a channel for an
//! event name (or all events); emit walks a snapshot of the subscriber
//! table so concurrent subscribe/unsubscribe never deadlocks, and dead
//! channels are pruned as they are discovered.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value as Json;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Event {
	pub name: String,
	pub payload: Json,
}

struct Subscriber {
	filter: Option<String>,
	sender: UnboundedSender<Event>,
}

#[derive(Default)]
pub struct EventEmitter {
	subscribers: Mutex<HashMap<Uuid, Subscriber>>,
}

impl EventEmitter {
	pub fn new() -> EventEmitter {
		EventEmitter::default()
	}

	/// Subscribe to one event name, or to everything when `filter` is None.
	/// Dropping the receiver is enough to unsubscribe eventually; calling
	/// [`EventEmitter::unsubscribe`] removes the entry immediately.
	pub fn subscribe(&self, filter: Option<&str>) -> (Uuid, UnboundedReceiver<Event>) {
		let (sender, receiver) = unbounded_channel();
		let id = Uuid::new_v4();
		self.subscribers.lock().expect("emitter lock").insert(
			id,
			Subscriber {
				filter: filter.map(str::to_owned),
				sender,
			},
		);
		(id, receiver)
	}

	pub fn unsubscribe(&self, id: Uuid) {
		self.subscribers.lock().expect("emitter lock").remove(&id);
	}

	/// Deliver an event to every matching subscriber. O(subscribers).
	pub fn emit(&self, name: &str, payload: Json) {
		let event = Event {
			name: name.to_owned(),
			payload,
		};
		let mut dead = Vec::new();
		{
			let subscribers = self.subscribers.lock().expect("emitter lock");
			for (id, subscriber) in subscribers.iter() {
				if subscriber.filter.as_deref().is_some_and(|f| f != event.name) {
					continue;
				}
				if subscriber.sender.send(event.clone()).is_err() {
					dead.push(*id);
				}
			}
		}
		if !dead.is_empty() {
			let mut subscribers = self.subscribers.lock().expect("emitter lock");
			for id in dead {
				subscribers.remove(&id);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[tokio::test]
	async fn subscribers_receive_matching_events_only() {
		let emitter = EventEmitter::new();
		let (_, mut inserts) = emitter.subscribe(Some("INSERT"));
		let (_, mut all) = emitter.subscribe(None);

		emitter.emit("INSERT", json!({"table": "users"}));
		emitter.emit("DELETE", json!({"table": "users"}));

		assert_eq!(inserts.recv().await.unwrap().name, "INSERT");
		assert!(inserts.try_recv().is_err());
		assert_eq!(all.recv().await.unwrap().name, "INSERT");
		assert_eq!(all.recv().await.unwrap().name, "DELETE");
	}

	#[tokio::test]
	async fn unsubscribed_and_dropped_channels_stop_receiving() {
		let emitter = EventEmitter::new();
		let (id, mut receiver) = emitter.subscribe(None);
		emitter.unsubscribe(id);
		emitter.emit("UPDATE", json!({}));
		assert!(receiver.try_recv().is_err());

		let (_, receiver) = emitter.subscribe(None);
		drop(receiver);
		// emit prunes the dead channel rather than erroring
		emitter.emit("UPDATE", json!({}));
		assert_eq!(emitter.subscribers.lock().unwrap().len(), 0);
	}
}
