//! Fan-in of all writer outputs into a single stream.
//!
//! No ordering is imposed between writers; within one writer's output the
//! order is preserved. The output closes after the last input closes.

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::info;

use super::message::Message;
use crate::constants::CHANNEL_CAPACITY;

/// Combine `inputs` into one output queue.
pub fn spawn_mux(inputs: Vec<mpsc::Receiver<Message>>) -> (JoinHandle<()>, mpsc::Receiver<Message>) {
    let (tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        info!(component = "message-muxer", inputs = inputs.len(), "started");

        let mut forwarders = JoinSet::new();
        for mut input in inputs {
            let out = tx.clone();
            forwarders.spawn(async move {
                while let Some(msg) = input.recv().await {
                    if out.send(msg).await.is_err() {
                        return;
                    }
                }
            });
        }
        // The clones above own the only senders; once every forwarder is
        // done the output closes.
        drop(tx);

        while forwarders.join_next().await.is_some() {}
        info!(component = "message-muxer", "completed");
    });

    (handle, out_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::message::FileClosed;

    #[tokio::test]
    async fn preserves_per_input_order_and_closes_after_last_input() {
        let (tx_a, rx_a) = mpsc::channel(8);
        let (tx_b, rx_b) = mpsc::channel(8);
        let (handle, mut out) = spawn_mux(vec![rx_a, rx_b]);

        for i in 0..3u8 {
            tx_a.send(Message::FileClosed(FileClosed { base: format!("a{i}"), pcap_idx: 0 }))
                .await
                .unwrap();
        }
        drop(tx_a);
        tx_b.send(Message::FileClosed(FileClosed { base: "b0".into(), pcap_idx: 1 }))
            .await
            .unwrap();
        drop(tx_b);

        let mut from_a = Vec::new();
        let mut from_b = Vec::new();
        while let Some(msg) = out.recv().await {
            let Message::FileClosed(fc) = msg else { panic!("unexpected message") };
            if fc.pcap_idx == 0 {
                from_a.push(fc.base);
            } else {
                from_b.push(fc.base);
            }
        }

        assert_eq!(from_a, vec!["a0", "a1", "a2"]);
        assert_eq!(from_b, vec!["b0"]);
        handle.await.unwrap();
    }
}
