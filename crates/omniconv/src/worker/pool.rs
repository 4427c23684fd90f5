//! Fixed pool of background workers consuming dispatch tickets.
//!
//! Each worker owns nothing but a handle to the shared dispatcher, so a
//! long-running conversion on one worker never blocks unrelated jobs on
//! the others. Strategies within one job stay strictly sequential.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info};

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::WorkerError;

/// A unit of queued work: dispatch this job.
#[derive(Debug, Clone)]
pub struct DispatchTicket {
    pub job_id: String,
}

/// Terminal outcome of one dispatched ticket.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub job_id: String,
    pub outcome: DispatchOutcome,
}

pub struct WorkerPool {
    ticket_sender: Sender<DispatchTicket>,
    result_receiver: Receiver<DispatchResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Starts `worker_count` workers over the shared dispatcher.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(dispatcher: Arc<Dispatcher>, worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (ticket_sender, ticket_receiver) = bounded::<DispatchTicket>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<DispatchResult>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let ticket_rx = ticket_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_dispatcher = Arc::clone(&dispatcher);

            let handle = thread::spawn(move || {
                run_worker(worker_id, ticket_rx, result_tx, shutdown_flag, worker_dispatcher);
            });

            workers.push(handle);
        }

        info!("Started {} conversion workers", worker_count);

        Self {
            ticket_sender,
            result_receiver,
            workers,
            shutdown,
        }
    }

    pub fn submit(&self, ticket: DispatchTicket) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.ticket_sender
            .send(ticket)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<DispatchResult> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<DispatchResult> {
        self.result_receiver.recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<DispatchResult> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.ticket_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    ticket_receiver: Receiver<DispatchTicket>,
    result_sender: Sender<DispatchResult>,
    shutdown: Arc<AtomicBool>,
    dispatcher: Arc<Dispatcher>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match ticket_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(ticket) => {
                debug!("Worker {} dispatching job {}", worker_id, ticket.job_id);

                let outcome = dispatcher.dispatch(&ticket.job_id);
                let result = DispatchResult {
                    job_id: ticket.job_id,
                    outcome,
                };

                if let Err(e) = result_sender.send(result) {
                    error!("Worker {} failed to send result: {}", worker_id, e);
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} ticket channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
