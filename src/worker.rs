//! Background detection worker.
//!
//! Frames are handed to a dedicated thread through a rendezvous channel: a
//! frame is accepted only when the worker is idle and waiting, otherwise it is
//! dropped. Nothing is ever queued behind a frame in flight, which bounds the
//! latency between capture and delivered result to one pipeline run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};

use crate::depth::{DepthSource, SensorDepth};
use crate::frame::Frame;
use crate::pipeline::{FrameSkipper, Pipeline, ResultSink};

/// Outcome of [`FrameWorker::submit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// Dropped by the frame-skip cadence.
    Skipped,
    /// Dropped because a frame is still being processed.
    Busy,
    /// The worker has stopped.
    Closed,
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    pub processed: AtomicU64,
    pub dropped_busy: AtomicU64,
}

/// Frame plus the sensor depth image captured with it, if any.
type Job = (Frame, Option<SensorDepth>);

pub struct FrameWorker {
    tx: Option<SyncSender<Job>>,
    handle: Option<JoinHandle<()>>,
    skipper: FrameSkipper,
    stats: Arc<WorkerStats>,
}

impl FrameWorker {
    /// Start the worker thread. Results are delivered to `sink` on that thread.
    pub fn spawn<S>(pipeline: Pipeline, mut sink: S) -> Result<Self>
    where
        S: ResultSink + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel::<Job>(0);
        let stats = Arc::new(WorkerStats::default());
        let skipper = FrameSkipper::new(pipeline.settings().frame_skip);
        let worker_stats = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("sightline-worker".to_string())
            .spawn(move || {
                for (frame, sensor_depth) in rx {
                    let depth = sensor_depth.as_ref().map(|d| d as &dyn DepthSource);
                    let result = pipeline.run(&frame, depth);
                    worker_stats.processed.fetch_add(1, Ordering::Relaxed);
                    sink.deliver(&result);
                }
                log::debug!("detection worker stopped");
            })
            .map_err(|e| anyhow!("failed to spawn detection worker: {}", e))?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            skipper,
            stats,
        })
    }

    /// Offer a frame to the worker without blocking.
    pub fn submit(&mut self, frame: Frame) -> Submission {
        self.dispatch(frame, None)
    }

    /// Offer a frame together with its hardware depth image. Sensor depth
    /// takes precedence over the depth model for this frame.
    pub fn submit_with_depth(&mut self, frame: Frame, depth: SensorDepth) -> Submission {
        self.dispatch(frame, Some(depth))
    }

    fn dispatch(&mut self, frame: Frame, depth: Option<SensorDepth>) -> Submission {
        if !self.skipper.should_process() {
            return Submission::Skipped;
        }
        let Some(tx) = &self.tx else {
            return Submission::Closed;
        };
        match tx.try_send((frame, depth)) {
            Ok(()) => Submission::Accepted,
            Err(TrySendError::Full(_)) => {
                self.stats.dropped_busy.fetch_add(1, Ordering::Relaxed);
                Submission::Busy
            }
            Err(TrySendError::Disconnected(_)) => Submission::Closed,
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Stop accepting frames and wait for the in-flight frame to finish.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("detection worker panicked"))?;
        }
        Ok(())
    }
}

impl Drop for FrameWorker {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("{}", err);
        }
    }
}
