//! Receive session: routing logic, worker threads, and the
//! `Searching → Locked → Done` state machine.
//!
//! One producer (the capture loop calling [`Receiver::push_block`]) feeds two
//! consumer workers, of which only one is ever active: the sync worker slides
//! its window over pre-lock blocks hunting for the preamble, and the demod
//! worker drains the post-lock sample queue symbol by symbol. The hand-off at
//! lock transfers the exact residual slice, so no sample at the boundary is
//! dropped or duplicated.

use crate::config::RxConfig;
use crate::demod::Demodulator;
use crate::error::{ReceiverError, Result};
use crate::source::SampleSource;
use crate::spectrum::{FftPeakEstimator, FrequencyEstimator};
use crate::sync::{cross_correlate, preamble_template, PreambleDetector, SyncDecision};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Still hunting for the preamble in the sliding window
    Searching,
    /// Preamble confirmed; samples route to the demodulation queue
    Locked,
    /// Stop sentinel observed; the message is ready
    Done,
}

const STATE_SEARCHING: u8 = 0;
const STATE_LOCKED: u8 = 1;
const STATE_DONE: u8 = 2;

struct Shared {
    /// Blocks awaiting the sync stage, strictly in arrival order
    inbox: Mutex<VecDeque<Vec<f32>>>,
    inbox_cond: Condvar,
    /// Samples awaiting demodulation, strictly in arrival order
    queue: Mutex<VecDeque<f32>>,
    queue_cond: Condvar,
    state: AtomicU8,
    running: AtomicBool,
    /// Producer promise that no further blocks will arrive
    input_done: AtomicBool,
}

impl Shared {
    fn state(&self) -> SessionState {
        match self.state.load(Ordering::Acquire) {
            STATE_SEARCHING => SessionState::Searching,
            STATE_LOCKED => SessionState::Locked,
            _ => SessionState::Done,
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn input_done(&self) -> bool {
        self.input_done.load(Ordering::Acquire)
    }

    // A waiter checks its predicate while holding the buffer lock, so the
    // flag store must be ordered through both locks before the notify or a
    // worker between check and wait could sleep through the wake.
    fn wake_all(&self) {
        drop(lock_ignore_poison(&self.inbox));
        drop(lock_ignore_poison(&self.queue));
        self.inbox_cond.notify_all();
        self.queue_cond.notify_all();
    }
}

// A worker that panicked must not wedge the producer behind a poisoned lock.
fn lock_ignore_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A single receive session.
///
/// Spawning starts both workers; blocks are then routed by state. The
/// session ends either when the demodulator observes the stop sentinel
/// (state `Done`, [`Receiver::join`] yields the message) or when
/// [`Receiver::cancel`] aborts it.
pub struct Receiver {
    config: RxConfig,
    shared: Arc<Shared>,
    sync_worker: Option<JoinHandle<()>>,
    demod_worker: Option<JoinHandle<Result<Vec<u8>>>>,
}

impl Receiver {
    /// Spawn a session with the default FFT peak estimator.
    pub fn spawn(config: RxConfig) -> Result<Self> {
        Self::spawn_with_estimator(config, Box::new(FftPeakEstimator::new()))
    }

    /// Spawn a session with a caller-provided frequency estimator.
    pub fn spawn_with_estimator(
        config: RxConfig,
        estimator: Box<dyn FrequencyEstimator>,
    ) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            inbox: Mutex::new(VecDeque::new()),
            inbox_cond: Condvar::new(),
            queue: Mutex::new(VecDeque::new()),
            queue_cond: Condvar::new(),
            state: AtomicU8::new(STATE_SEARCHING),
            running: AtomicBool::new(true),
            input_done: AtomicBool::new(false),
        });

        let sync_worker = {
            let shared = Arc::clone(&shared);
            let config = config.clone();
            thread::Builder::new()
                .name("bfskrx-sync".into())
                .spawn(move || sync_worker(&config, &shared))?
        };

        let demod_worker = {
            let shared = Arc::clone(&shared);
            let config = config.clone();
            thread::Builder::new()
                .name("bfskrx-demod".into())
                .spawn(move || demod_worker(&config, &shared, estimator))
        };
        let demod_worker = match demod_worker {
            Ok(handle) => handle,
            Err(e) => {
                shared.running.store(false, Ordering::Release);
                shared.wake_all();
                let _ = sync_worker.join();
                return Err(e.into());
            }
        };

        Ok(Self {
            config,
            shared,
            sync_worker: Some(sync_worker),
            demod_worker: Some(demod_worker),
        })
    }

    /// Route one symbol period of samples into the session.
    ///
    /// Pre-lock blocks go to the sync stage, post-lock blocks to the
    /// demodulation queue; the two stages are mutually exclusive consumers.
    /// Blocks arriving after completion are dropped.
    pub fn push_block(&self, block: &[f32]) -> Result<()> {
        let expected = self.config.symbol_samples;
        if block.len() != expected {
            return Err(ReceiverError::InvalidBlockSize {
                expected,
                actual: block.len(),
            });
        }

        match self.shared.state() {
            SessionState::Locked => self.enqueue(block),
            SessionState::Done => {
                log::trace!("dropping block after session completion");
            }
            SessionState::Searching => {
                let mut inbox = lock_ignore_poison(&self.shared.inbox);
                // Re-check under the lock: the sync worker commits the lock
                // transition while holding it, so a racing block must land
                // in the queue, never in the dead sync stage.
                if self.shared.state() == SessionState::Searching {
                    inbox.push_back(block.to_vec());
                    drop(inbox);
                    self.shared.inbox_cond.notify_one();
                } else {
                    drop(inbox);
                    self.enqueue(block);
                }
            }
        }
        Ok(())
    }

    fn enqueue(&self, block: &[f32]) {
        let mut queue = lock_ignore_poison(&self.shared.queue);
        queue.extend(block.iter().copied());
        drop(queue);
        self.shared.queue_cond.notify_one();
    }

    /// Feed blocks from a source until it is exhausted or the session ends.
    pub fn feed_from<S: SampleSource>(&self, source: &mut S) -> Result<()> {
        while self.state() != SessionState::Done {
            match source.next_block() {
                Some(block) => self.push_block(&block)?,
                None => break,
            }
        }
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_finished(&self) -> bool {
        self.state() == SessionState::Done
    }

    /// Ask both workers to stop and unblock any parked waiter.
    pub fn cancel(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.wake_all();
    }

    /// Signal that no further input will arrive.
    ///
    /// The sync worker exits once its backlog is exhausted and the demod
    /// worker keeps draining whole symbols from the queue; [`join`] then
    /// yields the message if the stop sentinel was reached, or
    /// `Err(Incomplete)` if the input ran out first. Unlike [`cancel`],
    /// this never cuts off samples that are already queued.
    ///
    /// [`join`]: Receiver::join
    /// [`cancel`]: Receiver::cancel
    pub fn finish(&self) {
        self.shared.input_done.store(true, Ordering::Release);
        self.shared.wake_all();
    }

    /// Wait for the session to finish and return the decoded message.
    ///
    /// Blocks until the stop sentinel has been demodulated, the session was
    /// cancelled (`Err(Cancelled)`), or [`finish`] was signalled and the
    /// remaining input drained without a sentinel (`Err(Incomplete)`).
    /// Callers that cannot guarantee a sentinel must [`finish`] or
    /// [`cancel`] first.
    ///
    /// [`finish`]: Receiver::finish
    /// [`cancel`]: Receiver::cancel
    pub fn join(mut self) -> Result<Vec<u8>> {
        // The demod worker alone cannot observe cancellation delivered while
        // the sync stage still owns the stream, so stop the sync worker too.
        if let Some(handle) = self.sync_worker.take() {
            handle.join().map_err(|_| ReceiverError::WorkerPanicked)?;
        }
        match self.demod_worker.take() {
            Some(handle) => handle.join().map_err(|_| ReceiverError::WorkerPanicked)?,
            None => Err(ReceiverError::WorkerPanicked),
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        // Joining here could block a caller that never fed a sentinel, so
        // the workers are cancelled and detached; both exit promptly once
        // the running flag is down.
        self.cancel();
    }
}

fn sync_worker(config: &RxConfig, shared: &Shared) {
    let template = preamble_template(config);
    let mut detector = PreambleDetector::new(config);
    let symbol_samples = config.symbol_samples;
    let mut window = vec![0.0f32; config.window_samples()];

    loop {
        let block = {
            let mut inbox = lock_ignore_poison(&shared.inbox);
            loop {
                if !shared.running() {
                    return;
                }
                if let Some(block) = inbox.pop_front() {
                    break block;
                }
                // Backlog drained with no lock confirmed and no more input
                // coming: the search is over.
                if shared.input_done() {
                    return;
                }
                inbox = shared
                    .inbox_cond
                    .wait(inbox)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        };

        // Strict fixed-size FIFO: evict exactly one symbol period from the
        // front, append exactly one at the back.
        window.drain(..symbol_samples);
        window.extend_from_slice(&block);

        // The inbox lock is already released; the O(window × template)
        // correlation scan never blocks the producer.
        let Some(best) = cross_correlate(&window, &template) else {
            continue;
        };

        match detector.observe(best) {
            SyncDecision::Confirmed { data_start } => {
                log::debug!(
                    "lock confirmed at window offset {} (score {:.4})",
                    best.position,
                    best.score
                );
                commit_lock(shared, &window, data_start);
                return;
            }
            SyncDecision::Tentative => {
                log::debug!(
                    "candidate detection at {} (score {:.4}), awaiting confirmation",
                    best.position,
                    best.score
                );
            }
            SyncDecision::NoDetection => {}
        }
    }
}

/// Publish the lock: hand the residual post-preamble samples (plus any
/// blocks the producer delivered while the final correlation ran) to the
/// demodulation queue, then flip the routing switch.
fn commit_lock(shared: &Shared, window: &[f32], data_start: usize) {
    let mut inbox = lock_ignore_poison(&shared.inbox);
    let mut handed_off = 0;
    {
        let mut queue = lock_ignore_poison(&shared.queue);
        queue.extend(window[data_start..].iter().copied());
        handed_off += window.len() - data_start;
        for block in inbox.drain(..) {
            handed_off += block.len();
            queue.extend(block);
        }
    }
    // The store happens under the inbox lock; push_block re-checks the state
    // there, so no producer block can slip into the dead sync stage.
    shared.state.store(STATE_LOCKED, Ordering::Release);
    drop(inbox);
    shared.queue_cond.notify_one();
    log::info!("preamble lock confirmed, {handed_off} residual samples handed to demodulation");
}

fn demod_worker(
    config: &RxConfig,
    shared: &Shared,
    estimator: Box<dyn FrequencyEstimator>,
) -> Result<Vec<u8>> {
    let symbol_samples = config.symbol_samples;
    let mut demod = Demodulator::new(config, estimator);
    let mut chunk = vec![0.0f32; symbol_samples];

    loop {
        {
            let mut queue = lock_ignore_poison(&shared.queue);
            loop {
                if !shared.running() {
                    log::debug!(
                        "demodulation cancelled with {} bits accumulated",
                        demod.bit_count()
                    );
                    return Err(ReceiverError::Cancelled);
                }
                if queue.len() >= symbol_samples {
                    break;
                }
                // Less than a symbol left and the producer is done: the
                // stream ended without reaching the stop sentinel.
                if shared.input_done() {
                    log::debug!(
                        "input ended mid-transmission with {} bits accumulated",
                        demod.bit_count()
                    );
                    return Err(ReceiverError::Incomplete);
                }
                queue = shared
                    .queue_cond
                    .wait(queue)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            for (slot, sample) in chunk.iter_mut().zip(queue.drain(..symbol_samples)) {
                *slot = sample;
            }
        }

        // Lock released before the FFT so producer appends are never
        // delayed by estimator compute.
        if demod.feed_symbol(&chunk)? {
            break;
        }
    }

    shared.state.store(STATE_DONE, Ordering::Release);
    let message = demod.finish();
    log::info!("stop tone observed, {} message bytes decoded", message.len());
    Ok(message)
}
