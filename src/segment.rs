//! Segmentation client: one request in flight, results delivered in request order.
//!
//! The model itself is an external collaborator with unbounded latency. [`ThreadedSegmenter`]
//! runs a blocking [`SegmentationModel`] on a dedicated worker thread and talks to it through
//! capacity-1 channels; hosts with their own asynchronous model implement [`Segmenter`] directly.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};

use crate::{
    error::{BackdropError, BackdropResult},
    foundation::core::{FrameRgba, SegmentationMask},
};

/// Blocking foreground/background separation.
pub trait SegmentationModel: Send + 'static {
    fn segment(&mut self, frame: &FrameRgba) -> BackdropResult<SegmentationMask>;
}

impl<F> SegmentationModel for F
where
    F: FnMut(&FrameRgba) -> BackdropResult<SegmentationMask> + Send + 'static,
{
    fn segment(&mut self, frame: &FrameRgba) -> BackdropResult<SegmentationMask> {
        self(frame)
    }
}

/// Non-blocking segmentation backend.
///
/// `start` is only called while no request is outstanding; `poll` returns the result of the
/// outstanding request once it is available.
pub trait Segmenter {
    fn start(&mut self, frame: Arc<FrameRgba>) -> BackdropResult<()>;

    fn poll(&mut self) -> Option<BackdropResult<SegmentationMask>>;

    /// Releases model resources. Called once; further calls must be no-ops.
    fn close(&mut self) {}
}

/// Runs a [`SegmentationModel`] on its own thread.
pub struct ThreadedSegmenter {
    requests: Option<Sender<Arc<FrameRgba>>>,
    results: Receiver<BackdropResult<SegmentationMask>>,
    worker: Option<JoinHandle<()>>,
    /// A request was sent and its result has not been polled yet.
    busy: bool,
}

impl ThreadedSegmenter {
    pub fn spawn<M: SegmentationModel>(mut model: M) -> BackdropResult<Self> {
        let (req_tx, req_rx) = bounded::<Arc<FrameRgba>>(1);
        let (res_tx, res_rx) = bounded::<BackdropResult<SegmentationMask>>(1);

        let worker = thread::Builder::new()
            .name("backdrop-segmenter".to_string())
            .spawn(move || {
                tracing::debug!("segmentation worker started");
                while let Ok(frame) = req_rx.recv() {
                    let result = catch_unwind(AssertUnwindSafe(|| model.segment(&frame)))
                        .unwrap_or_else(|payload| {
                            Err(BackdropError::segmentation(format!(
                                "model panicked: {}",
                                panic_message(payload.as_ref())
                            )))
                        });
                    if res_tx.send(result).is_err() {
                        break;
                    }
                }
                // The model is always dropped here, on the worker.
                drop(model);
                tracing::debug!("segmentation worker stopped");
            })
            .map_err(|e| {
                BackdropError::Other(anyhow::Error::new(e).context("spawn segmentation worker"))
            })?;

        Ok(Self {
            requests: Some(req_tx),
            results: res_rx,
            worker: Some(worker),
            busy: false,
        })
    }
}

impl Segmenter for ThreadedSegmenter {
    fn start(&mut self, frame: Arc<FrameRgba>) -> BackdropResult<()> {
        let Some(tx) = self.requests.as_ref() else {
            return Err(BackdropError::segmentation("segmenter is closed"));
        };
        match tx.try_send(frame) {
            Ok(()) => {
                self.busy = true;
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(BackdropError::segmentation(
                "segmenter already has a request queued",
            )),
            Err(TrySendError::Disconnected(_)) => {
                Err(BackdropError::segmentation("segmentation worker stopped"))
            }
        }
    }

    fn poll(&mut self) -> Option<BackdropResult<SegmentationMask>> {
        match self.results.try_recv() {
            Ok(result) => {
                self.busy = false;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(BackdropError::segmentation(
                "segmentation worker stopped",
            ))),
        }
    }

    /// Stops the worker. An idle worker is joined here; a worker still inside a model call is
    /// joined by a reaper thread so the caller never waits on the model. Either way the model is
    /// dropped on the worker as soon as its current call returns.
    fn close(&mut self) {
        // Dropping the sender ends the worker loop once the current request finishes.
        self.requests = None;
        let Some(worker) = self.worker.take() else {
            return;
        };
        if !self.busy {
            join_worker(worker);
            return;
        }
        tracing::debug!("segmentation worker busy at close, handing it to a reaper");
        let reaper = thread::Builder::new()
            .name("backdrop-segmenter-reaper".to_string())
            .spawn(move || join_worker(worker));
        if let Err(e) = reaper {
            tracing::warn!(error = %e, "could not spawn reaper, detaching segmentation worker");
        }
    }
}

impl Drop for ThreadedSegmenter {
    fn drop(&mut self) {
        self.close();
    }
}

fn join_worker(worker: JoinHandle<()>) {
    if worker.join().is_err() {
        tracing::warn!("segmentation worker panicked during shutdown");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Identifies one submitted request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ticket {
    /// Monotonic per client.
    pub seq: u64,
    /// Playback epoch the frame was captured in.
    pub epoch: u64,
    /// Source position of the submitted frame, in seconds.
    pub position: f64,
}

#[derive(Debug)]
pub struct Completion {
    pub ticket: Ticket,
    pub frame: Arc<FrameRgba>,
    pub result: BackdropResult<SegmentationMask>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Submission {
    Started(Ticket),
    /// A request is already outstanding; nothing was submitted.
    Busy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentationStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub dropped_busy: u64,
    pub discarded_stale: u64,
}

#[derive(Debug)]
enum InFlight {
    Idle,
    Pending {
        ticket: Ticket,
        frame: Arc<FrameRgba>,
    },
}

type MaskHandler = Box<dyn FnMut(&Completion)>;

/// Single-in-flight front end over a [`Segmenter`].
pub struct SegmentationClient {
    segmenter: Box<dyn Segmenter>,
    in_flight: InFlight,
    next_seq: u64,
    handlers: Vec<MaskHandler>,
    stats: SegmentationStats,
    closed: bool,
}

impl SegmentationClient {
    pub fn new(segmenter: Box<dyn Segmenter>) -> Self {
        Self {
            segmenter,
            in_flight: InFlight::Idle,
            next_seq: 0,
            handlers: Vec::new(),
            stats: SegmentationStats::default(),
            closed: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.in_flight, InFlight::Pending { .. })
    }

    pub fn stats(&self) -> SegmentationStats {
        self.stats
    }

    /// Registers a handler called once per completed request, in request order.
    pub fn on_mask(&mut self, handler: impl FnMut(&Completion) + 'static) {
        self.handlers.push(Box::new(handler));
    }

    /// Starts segmenting `frame` unless a request is already outstanding.
    pub fn submit(
        &mut self,
        frame: FrameRgba,
        epoch: u64,
        position: f64,
    ) -> BackdropResult<Submission> {
        if self.closed {
            return Err(BackdropError::segmentation("segmentation client is closed"));
        }
        if self.is_pending() {
            self.stats.dropped_busy += 1;
            return Ok(Submission::Busy);
        }

        let ticket = Ticket {
            seq: self.next_seq,
            epoch,
            position,
        };
        let frame = Arc::new(frame);
        if let Err(e) = self.segmenter.start(Arc::clone(&frame)) {
            self.stats.failed += 1;
            return Err(e);
        }
        self.next_seq += 1;
        self.stats.submitted += 1;
        self.in_flight = InFlight::Pending { ticket, frame };
        tracing::trace!(seq = ticket.seq, epoch, position, "segmentation submitted");
        Ok(Submission::Started(ticket))
    }

    /// Collects the outstanding result if it is ready. Never blocks.
    pub fn pump(&mut self) -> Option<Completion> {
        if !self.is_pending() {
            return None;
        }
        let result = self.segmenter.poll()?;
        let InFlight::Pending { ticket, frame } =
            std::mem::replace(&mut self.in_flight, InFlight::Idle)
        else {
            return None;
        };

        match &result {
            Ok(_) => self.stats.completed += 1,
            Err(_) => self.stats.failed += 1,
        }
        let completion = Completion {
            ticket,
            frame,
            result,
        };
        for handler in &mut self.handlers {
            handler(&completion);
        }
        Some(completion)
    }

    /// Records that a completed result was not used because playback moved on.
    pub fn note_discarded(&mut self) {
        self.stats.discarded_stale += 1;
    }

    /// Releases the underlying model. An outstanding request is abandoned.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.in_flight = InFlight::Idle;
        self.handlers.clear();
        self.segmenter.close();
        tracing::debug!(stats = ?self.stats, "segmentation client closed");
    }
}

impl Drop for SegmentationClient {
    fn drop(&mut self) {
        self.close();
    }
}
