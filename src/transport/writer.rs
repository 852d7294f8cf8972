use super::stats::ChannelCounters;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Single writer task owning one socket.
///
/// Submissions go through a bounded queue and are written in order. When the
/// queue is full the new datum is dropped. Dropping the writer aborts the
/// task, which closes the socket without waiting for queued writes.
pub(crate) struct SocketWriter {
    label: &'static str,
    tx: mpsc::Sender<Bytes>,
    open: Arc<AtomicBool>,
    counters: Arc<ChannelCounters>,
    task: JoinHandle<()>,
}

impl SocketWriter {
    pub(crate) fn tcp(
        label: &'static str,
        mut stream: TcpStream,
        capacity: usize,
        counters: Arc<ChannelCounters>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<Bytes>(capacity.max(1));
        let open = Arc::new(AtomicBool::new(true));

        let task = {
            let open = Arc::clone(&open);
            let counters = Arc::clone(&counters);
            tokio::spawn(async move {
                while let Some(bytes) = rx.recv().await {
                    if let Err(e) = stream.write_all(&bytes).await {
                        warn!("{} stream write failed, closing: {}", label, e);
                        counters.record_dropped();
                        break;
                    }
                    counters.record_sent(bytes.len());
                    trace!("{} wrote {} bytes", label, bytes.len());
                }
                open.store(false, Ordering::Release);
                debug!("{} stream writer stopped", label);
            })
        };

        Self {
            label,
            tx,
            open,
            counters,
            task,
        }
    }

    /// `socket` must already be connected to its destination
    pub(crate) fn udp(
        label: &'static str,
        socket: UdpSocket,
        capacity: usize,
        counters: Arc<ChannelCounters>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<Bytes>(capacity.max(1));
        let open = Arc::new(AtomicBool::new(true));

        let task = {
            let open = Arc::clone(&open);
            let counters = Arc::clone(&counters);
            tokio::spawn(async move {
                while let Some(bytes) = rx.recv().await {
                    // Datagram loss is tolerated, the socket stays usable
                    match socket.send(&bytes).await {
                        Ok(_) => counters.record_sent(bytes.len()),
                        Err(e) => {
                            counters.record_dropped();
                            debug!("{} datagram of {} bytes not sent: {}", label, bytes.len(), e);
                        }
                    }
                }
                open.store(false, Ordering::Release);
                debug!("{} datagram writer stopped", label);
            })
        };

        Self {
            label,
            tx,
            open,
            counters,
            task,
        }
    }

    /// Queue `bytes` for writing without waiting
    pub(crate) fn try_send(&self, bytes: Bytes) -> bool {
        match self.tx.try_send(bytes) {
            Ok(()) => true,
            Err(TrySendError::Full(bytes)) => {
                self.counters.record_dropped();
                trace!("{} queue full, dropping {} bytes", self.label, bytes.len());
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.record_dropped();
                false
            }
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Drop for SocketWriter {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
        self.task.abort();
    }
}
