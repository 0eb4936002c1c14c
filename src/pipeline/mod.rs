//! Pipeline (C9, optional high-throughput mode): three dedicated OS threads
//! (RX, Process, TX) linked by bounded lock-free SPSC queues.
//!
//! Grounded on `process_pool.rs`'s worker-lifecycle shape (spawn, shared
//! `Arc` state, graceful join), generalized from async tokio workers to
//! plain `std::thread` workers with blocking sockets — the pipeline's
//! threads are meant to be pinned, CPU-bound workers, not tokio tasks that
//! could migrate or yield mid-crypto-operation. `crossbeam-queue`'s
//! `ArrayQueue` (justified in `other_examples/shranto27-WRAITH-Protocol`'s
//! manifest) gives the lock-free bounded SPSC/MPMC queue the spec calls for.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use tracing::{error, warn};

use crate::proto::WireFrame;
use crate::session::{InboundOutcome, Session};

pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;
const POLL_BACKOFF: Duration = Duration::from_micros(50);
const SOCKET_READ_TIMEOUT: Duration = Duration::from_millis(100);

fn next_power_of_two(n: usize) -> usize {
    n.next_power_of_two().max(1)
}

/// Counters exposed for diagnostics; all monotonically increasing.
#[derive(Default)]
pub struct PipelineStats {
    pub rx_dropped: AtomicU64,
    pub tx_dropped: AtomicU64,
    pub decoded_dropped: AtomicU64,
}

/// Three-thread RX -> Process -> TX pipeline for one session.
pub struct Pipeline {
    rx_queue: Arc<ArrayQueue<Vec<u8>>>,
    submit_queue: Arc<ArrayQueue<WireFrame>>,
    tx_queue: Arc<ArrayQueue<Vec<u8>>>,
    decoded_queue: Arc<ArrayQueue<WireFrame>>,
    stats: Arc<PipelineStats>,
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawns the RX, Process, and TX threads. `socket` must already be
    /// connected or otherwise scoped to `remote` — RX/TX both address only
    /// `remote`.
    pub fn spawn(
        socket: UdpSocket,
        remote: SocketAddr,
        session: Arc<Mutex<Session>>,
        capacity: usize,
    ) -> Self {
        let capacity = next_power_of_two(capacity);
        let rx_queue = Arc::new(ArrayQueue::new(capacity));
        let submit_queue = Arc::new(ArrayQueue::new(capacity));
        let tx_queue = Arc::new(ArrayQueue::new(capacity));
        let decoded_queue = Arc::new(ArrayQueue::new(capacity));
        let stats = Arc::new(PipelineStats::default());
        let stop = Arc::new(AtomicBool::new(false));

        socket
            .set_read_timeout(Some(SOCKET_READ_TIMEOUT))
            .expect("setting a read timeout on a freshly bound socket cannot fail");
        let rx_socket = socket.try_clone().expect("UDP socket clone for RX thread");
        let tx_socket = socket;

        let rx_handle = {
            let rx_queue = Arc::clone(&rx_queue);
            let stats = Arc::clone(&stats);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || rx_thread(rx_socket, remote, rx_queue, stats, stop))
        };

        let process_handle = {
            let rx_queue = Arc::clone(&rx_queue);
            let submit_queue = Arc::clone(&submit_queue);
            let tx_queue = Arc::clone(&tx_queue);
            let decoded_queue = Arc::clone(&decoded_queue);
            let stats = Arc::clone(&stats);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                process_thread(session, rx_queue, submit_queue, tx_queue, decoded_queue, stats, stop)
            })
        };

        let tx_handle = {
            let tx_queue = Arc::clone(&tx_queue);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || tx_thread(tx_socket, remote, tx_queue, stop))
        };

        Pipeline {
            rx_queue,
            submit_queue,
            tx_queue,
            decoded_queue,
            stats,
            stop,
            handles: vec![rx_handle, process_handle, tx_handle],
        }
    }

    /// Submits a frame for encryption and transmission. Returns `false`
    /// (and increments a counter) if the submit queue is full — this mode
    /// prefers loss over unbounded buffering, per §4.8.
    pub fn submit_tx(&self, frame: WireFrame) -> bool {
        match self.submit_queue.push(frame) {
            Ok(()) => true,
            Err(_) => {
                self.stats.tx_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pops one decoded inbound frame, if available, without blocking.
    pub fn try_recv(&self) -> Option<WireFrame> {
        self.decoded_queue.pop()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Signals all three threads to exit and joins them.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn rx_thread(
    socket: UdpSocket,
    remote: SocketAddr,
    rx_queue: Arc<ArrayQueue<Vec<u8>>>,
    stats: Arc<PipelineStats>,
    stop: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; 2048];
    while !stop.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) if from == remote => {
                if rx_queue.push(buf[..len].to_vec()).is_err() {
                    stats.rx_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(_) => {}
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {}
            Err(e) => warn!(error = %e, "pipeline RX thread socket error"),
        }
    }
}

fn tx_thread(
    socket: UdpSocket,
    remote: SocketAddr,
    tx_queue: Arc<ArrayQueue<Vec<u8>>>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        match tx_queue.pop() {
            Some(bytes) => {
                if let Err(e) = socket.send_to(&bytes, remote) {
                    warn!(error = %e, "pipeline TX thread send failed");
                }
            }
            None => std::thread::sleep(POLL_BACKOFF),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn process_thread(
    session: Arc<Mutex<Session>>,
    rx_queue: Arc<ArrayQueue<Vec<u8>>>,
    submit_queue: Arc<ArrayQueue<WireFrame>>,
    tx_queue: Arc<ArrayQueue<Vec<u8>>>,
    decoded_queue: Arc<ArrayQueue<WireFrame>>,
    stats: Arc<PipelineStats>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        let mut did_work = false;

        if let Some(datagram) = rx_queue.pop() {
            did_work = true;
            let outcome = {
                let mut session = session.lock().expect("session mutex poisoned");
                session.decrypt_inbound(&datagram)
            };
            match outcome {
                InboundOutcome::Accepted(frame) => {
                    if decoded_queue.push(frame).is_err() {
                        stats.decoded_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                InboundOutcome::Dropped => {}
                InboundOutcome::Fatal => {
                    error!("session reported a fatal inbound error, stopping pipeline");
                    stop.store(true, Ordering::SeqCst);
                }
            }
        }

        if let Some(frame) = submit_queue.pop() {
            did_work = true;
            let datagram = {
                let mut session = session.lock().expect("session mutex poisoned");
                session.encrypt_outbound(frame)
            };
            if tx_queue.push(datagram).is_err() {
                stats.tx_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        if !did_work {
            std::thread::sleep(POLL_BACKOFF);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_of_two_rounding() {
        assert_eq!(next_power_of_two(4096), 4096);
        assert_eq!(next_power_of_two(4097), 8192);
        assert_eq!(next_power_of_two(1), 1);
    }
}
