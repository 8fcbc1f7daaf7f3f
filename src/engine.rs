//! Engine - the two-thread matching pipeline.
//!
//! ```text
//! [OrderSource] --> [Ingest Thread (owns BookRegistry)] --> [FlushBarrierQueue]
//!                                                                  |
//!                                                   [Publish Thread] --> [LogSink]
//! ```
//!
//! The ingest thread matches orders and queues their log lines. On a flush
//! it queues an end-of-batch marker and waits until the publish thread has
//! written everything before it, so no line from after a flush can reach
//! the sink ahead of a line from before it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::command::{LogLine, Order};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::flush_queue::FlushBarrierQueue;
use crate::registry::BookRegistry;
use crate::sink::LogSink;
use crate::transport::OrderSource;

/// Work item passed from the ingest thread to the publish thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Publication {
    /// Log lines of one order, in emission order
    Lines(Vec<LogLine>),
    /// Close the current batch
    EndOfBatch,
}

/// Counters reported once a run has shut down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Orders ingested
    pub orders: u64,
    /// Flush orders among them
    pub flushes: u64,
    /// Log lines written to the sink
    pub lines: u64,
    /// Non-empty batches closed
    pub batches: u64,
}

/// The matching engine: book state plus the knobs for running it.
pub struct Engine {
    registry: BookRegistry,
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            registry: BookRegistry::new(&config),
            config,
        }
    }

    /// Process a single order and return its log lines (`None` on flush).
    ///
    /// This is the entry point for synchronous usage (testing, benchmarks).
    #[inline]
    pub fn process_order(&mut self, order: &Order) -> Option<Vec<LogLine>> {
        self.registry.handle_order(order)
    }

    pub fn registry(&self) -> &BookRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Pin the current thread to the last available CPU core.
    ///
    /// The last core is typically isolated from OS interrupts.
    pub fn pin_to_core(&self) {
        match core_affinity::get_core_ids().and_then(|ids| ids.last().copied()) {
            Some(core) if core_affinity::set_for_current(core) => {
                debug!(core = core.id, "ingest thread pinned");
            }
            _ => warn!("could not pin ingest thread"),
        }
    }

    /// Warm up the engine by pre-faulting order memory.
    pub fn warm_up(&mut self) {
        self.registry.warm_up();
    }

    /// Start the ingest and publish threads.
    ///
    /// The engine moves into the ingest thread and comes back from
    /// [`RunningEngine::join`].
    pub fn start<S, K>(self, source: S, sink: K) -> Result<RunningEngine>
    where
        S: OrderSource + Send + 'static,
        K: LogSink + 'static,
    {
        let queue = Arc::new(FlushBarrierQueue::new());

        let publish = {
            let queue = Arc::clone(&queue);
            thread::Builder::new()
                .name("publish".into())
                .spawn(move || publish(sink, &queue))?
        };

        let ingest = {
            let queue = Arc::clone(&queue);
            thread::Builder::new()
                .name("ingest".into())
                .spawn(move || ingest(self, source, &queue))
        };
        let ingest = match ingest {
            Ok(handle) => handle,
            Err(err) => {
                queue.request_stop();
                let _ = publish.join();
                return Err(err.into());
            }
        };

        Ok(RunningEngine {
            ingest: Some(ingest),
            publish: Some(publish),
            queue,
        })
    }

    /// Run the pipeline on the given source and sink until the input ends.
    pub fn run<S, K>(self, source: S, sink: K) -> Result<(Engine, RunSummary)>
    where
        S: OrderSource + Send + 'static,
        K: LogSink + 'static,
    {
        self.start(source, sink)?.join()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

/// Handle to a started pipeline. Dropping it waits for the run to finish.
pub struct RunningEngine {
    ingest: Option<JoinHandle<(Engine, Result<IngestStats>)>>,
    publish: Option<JoinHandle<Result<PublishStats>>>,
    queue: Arc<FlushBarrierQueue<Publication>>,
}

#[derive(Default)]
struct IngestStats {
    orders: u64,
    flushes: u64,
}

#[derive(Default)]
struct PublishStats {
    lines: u64,
    batches: u64,
}

impl RunningEngine {
    /// Wait for the input to end and everything to be published.
    ///
    /// # Returns
    /// The engine with its final book state, and the run counters. The
    /// first error of either thread wins, ingest first.
    pub fn join(mut self) -> Result<(Engine, RunSummary)> {
        self.join_threads()
    }

    fn join_threads(&mut self) -> Result<(Engine, RunSummary)> {
        let ingest = self.ingest.take().map(JoinHandle::join);
        // Already requested unless the ingest thread died early
        self.queue.request_stop();
        let publish = self.publish.take().map(JoinHandle::join);

        let (engine, ingest) = match ingest {
            Some(Ok(joined)) => joined,
            _ => return Err(EngineError::ThreadPanicked("ingest")),
        };
        let publish = match publish {
            Some(Ok(stats)) => stats,
            _ => return Err(EngineError::ThreadPanicked("publish")),
        };

        let ingest = ingest?;
        let publish = publish?;
        let summary = RunSummary {
            orders: ingest.orders,
            flushes: ingest.flushes,
            lines: publish.lines,
            batches: publish.batches,
        };
        info!(?summary, "engine stopped");
        Ok((engine, summary))
    }
}

impl Drop for RunningEngine {
    fn drop(&mut self) {
        if self.ingest.is_some() {
            if let Err(err) = self.join_threads() {
                error!(%err, "engine stopped with error");
            }
        }
    }
}

impl std::fmt::Debug for RunningEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningEngine")
            .field("running", &self.ingest.is_some())
            .finish()
    }
}

// ============================================================================
// Threads
// ============================================================================

fn ingest<S: OrderSource>(
    mut engine: Engine,
    mut source: S,
    queue: &FlushBarrierQueue<Publication>,
) -> (Engine, Result<IngestStats>) {
    if engine.config.pin_ingest_core {
        engine.pin_to_core();
    }
    if engine.config.warm_up {
        engine.warm_up();
    }

    let mut stats = IngestStats::default();
    let result = loop {
        if queue.is_abandoned() {
            break Err(EngineError::ThreadPanicked("publish"));
        }
        let order = match source.recv() {
            Ok(Some(order)) => order,
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        };
        stats.orders += 1;

        match engine.process_order(&order) {
            Some(lines) => {
                if !lines.is_empty() {
                    queue.push(Publication::Lines(lines));
                }
            }
            None => {
                stats.flushes += 1;
                queue.push(Publication::EndOfBatch);
                queue.wait_until_empty();
                debug!(flush = stats.flushes, "flush barrier passed");
            }
        }
    };

    // Close the last batch and drain before stopping
    queue.push(Publication::EndOfBatch);
    queue.wait_until_empty();
    queue.request_stop();

    if let Err(err) = &result {
        error!(%err, orders = stats.orders, "ingest failed");
    } else {
        debug!(orders = stats.orders, "input exhausted");
    }
    (engine, result.map(|()| stats))
}

fn publish<K: LogSink>(mut sink: K, queue: &FlushBarrierQueue<Publication>) -> Result<PublishStats> {
    let mut stats = PublishStats::default();
    let mut dirty = false;
    let mut failure = None;

    while let Some(item) = queue.pop_blocking() {
        // After a failure keep draining so the ingest side never blocks
        if failure.is_some() {
            continue;
        }
        let written = match &*item {
            Publication::Lines(lines) => sink.write_lines(lines).map(|()| {
                stats.lines += lines.len() as u64;
                dirty = true;
            }),
            Publication::EndOfBatch => sink.end_batch().map(|()| {
                if dirty {
                    stats.batches += 1;
                    info!(batch = stats.batches, "batch published");
                }
                dirty = false;
            }),
        };
        if let Err(err) = written {
            error!(%err, "log sink failed, discarding remaining output");
            failure = Some(err);
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(stats),
    }
}
