use crate::records::OperationRecord;
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::Notify;

/// Bounded, non-blocking write queue (§4.12): `send` never awaits and never blocks the hot
/// path. When the queue is at capacity, the oldest queued record is dropped and a warning is
/// logged — callers are never made to wait on persistence.
#[derive(Clone)]
pub struct WriteChannel {
    buf: Arc<Mutex<VecDeque<OperationRecord>>>,
    capacity: usize,
    notify: Arc<Notify>,
}

impl WriteChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Enqueue a record. Returns `true` if an older record was dropped to make room.
    pub fn send(&self, record: OperationRecord) -> bool {
        let mut buf = self.buf.lock();
        let dropped = if buf.len() >= self.capacity {
            buf.pop_front();
            true
        } else {
            false
        };
        buf.push_back(record);
        drop(buf);
        self.notify.notify_one();
        if dropped {
            tracing::warn!("persistence write channel full, dropped oldest record");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.buf.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain every record currently queued, without waiting for new ones. Used by the writer
    /// task's flush loop.
    pub fn drain(&self) -> Vec<OperationRecord> {
        self.buf.lock().drain(..).collect()
    }

    /// Wait until at least one record is queued, then drain everything available.
    pub async fn recv_batch(&self) -> Vec<OperationRecord> {
        loop {
            let batch = self.drain();
            if !batch.is_empty() {
                return batch;
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::OperationLogRecord;
    use arbitros_integration::time::now_ms;

    fn log(msg: &str) -> OperationRecord {
        OperationRecord::OperationLog(OperationLogRecord {
            category: "test".into(),
            message: msg.into(),
            at: now_ms(),
        })
    }

    #[test]
    fn overflow_drops_oldest_not_newest() {
        let channel = WriteChannel::new(2);
        assert!(!channel.send(log("a")));
        assert!(!channel.send(log("b")));
        assert!(channel.send(log("c")));

        let batch = channel.drain();
        assert_eq!(batch.len(), 2);
        match &batch[0] {
            OperationRecord::OperationLog(r) => assert_eq!(r.message, "b"),
            _ => panic!("unexpected variant"),
        }
        match &batch[1] {
            OperationRecord::OperationLog(r) => assert_eq!(r.message, "c"),
            _ => panic!("unexpected variant"),
        }
    }

    #[tokio::test]
    async fn recv_batch_waits_for_a_send() {
        let channel = WriteChannel::new(8);
        let waiter = channel.clone();
        let handle = tokio::spawn(async move { waiter.recv_batch().await });

        tokio::task::yield_now().await;
        channel.send(log("a"));

        let batch = handle.await.unwrap();
        assert_eq!(batch.len(), 1);
    }
}
