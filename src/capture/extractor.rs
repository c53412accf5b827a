//! Attribute extractor stage.
//!
//! Decodes each packet into the indexable attribute tuple; all other
//! messages pass through unchanged.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use super::message::Message;
use crate::constants::CHANNEL_CAPACITY;
use crate::packet;

/// Spawn the extractor stage.
pub fn spawn_extractor(mut rx: mpsc::Receiver<Message>) -> (JoinHandle<()>, mpsc::Receiver<Message>) {
    let (tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        info!(component = "packet-extractor", "started");

        while let Some(mut msg) = rx.recv().await {
            if let Message::Packet(record) = &mut msg {
                record.meta = Some(packet::extract(&record.data));
            }
            if tx.send(msg).await.is_err() {
                break;
            }
        }

        info!(component = "packet-extractor", "completed");
    });

    (handle, out_rx)
}
