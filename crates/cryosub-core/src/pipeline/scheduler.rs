use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, info_span};

use crate::error::{Result, SubtractError};
use crate::fourier::{ImageTransform, Spectrum};
use crate::metadata::StackGroup;

use super::pool::{InFlightLimit, JobHandle, Permit, WorkerPool};
use super::store::{StackSink, StackStore};
use super::types::{ProgressReporter, StackReport, Subtractor};

/// A submitted particle waiting to be written, in destination order.
struct Ticket {
    index: usize,
    image: String,
    job: JobHandle<Spectrum>,
    permit: Permit,
}

/// Runs output stacks one at a time on a shared worker pool.
///
/// For each stack the calling thread reads and transforms particles and
/// submits them to the pool, while a writer thread consumes results in
/// submission order. At most `queue_capacity` jobs are submitted but not
/// yet written.
pub struct Scheduler {
    pool: WorkerPool,
    queue_capacity: usize,
}

impl Scheduler {
    pub fn new(workers: usize, queue_capacity: usize) -> Result<Self> {
        if queue_capacity == 0 {
            return Err(SubtractError::Pipeline(
                "queue capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            pool: WorkerPool::new(workers)?,
            queue_capacity,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.workers()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Subtract and write every particle of one output stack.
    ///
    /// On any failure nothing is left at `group.path` and the error names
    /// the particle that caused it.
    pub fn process_stack<S, K>(
        &self,
        group: &StackGroup,
        store: &S,
        kernel: &Arc<K>,
        reporter: &dyn ProgressReporter,
    ) -> Result<StackReport>
    where
        S: StackStore + ?Sized,
        K: Subtractor + ?Sized + 'static,
    {
        let span = info_span!("stack", path = %group.path.display());
        let _enter = span.enter();

        for (i, particle) in group.particles.iter().enumerate() {
            if particle.destination.index != i {
                return Err(SubtractError::Pipeline(format!(
                    "destination indices of {} are not dense: position {} has index {}",
                    group.path.display(),
                    i,
                    particle.destination.index
                )));
            }
        }
        let Some(first) = group.particles.first() else {
            return Ok(StackReport {
                path: group.path.clone(),
                written: 0,
                peak_in_flight: 0,
            });
        };

        let size = kernel.image_size();
        let transform = ImageTransform::new(size, size);
        let limit = InFlightLimit::new(self.queue_capacity);
        let (tx, rx) = mpsc::sync_channel::<Ticket>(self.queue_capacity);
        let writer = StackWriter {
            store,
            path: group.path.as_path(),
            transform: transform.clone(),
            pixel_size: first.pixel_size,
            reporter,
        };

        info!(particles = group.len(), "Processing stack");
        let (produced, consumed) = thread::scope(|scope| {
            let writer_span = span.clone();
            let consumer = scope.spawn(move || {
                let _enter = writer_span.enter();
                writer.run(rx)
            });
            let produced = self.produce(tx, group, store, kernel, &limit, &transform);
            let consumed = consumer.join().unwrap_or_else(|_| {
                Err(SubtractError::Pipeline("stack writer thread panicked".into()))
            });
            (produced, consumed)
        });

        match (produced, consumed) {
            (Ok(submitted), Ok((sink, written))) => {
                if written != submitted {
                    if let Some(sink) = sink {
                        sink.abort();
                    }
                    return Err(SubtractError::Pipeline(format!(
                        "submitted {} particles but wrote {}",
                        submitted, written
                    )));
                }
                if let Some(sink) = sink {
                    sink.commit()?;
                }
                let peak_in_flight = limit.peak();
                info!(written, peak_in_flight, "Stack written");
                Ok(StackReport {
                    path: group.path.clone(),
                    written,
                    peak_in_flight,
                })
            }
            (Err(e), Ok((sink, _))) => {
                if let Some(sink) = sink {
                    sink.abort();
                }
                Err(e)
            }
            // The writer's error names the failing particle and it has
            // already discarded its output.
            (_, Err(e)) => Err(e),
        }
    }

    /// Read, transform and submit particles in destination order. Returns
    /// the number submitted. Dropping `tx` on return closes the queue.
    fn produce<S, K>(
        &self,
        tx: SyncSender<Ticket>,
        group: &StackGroup,
        store: &S,
        kernel: &Arc<K>,
        limit: &Arc<InFlightLimit>,
        transform: &ImageTransform,
    ) -> Result<usize>
    where
        S: StackStore + ?Sized,
        K: Subtractor + ?Sized + 'static,
    {
        for particle in &group.particles {
            let permit = limit.acquire();
            let image = particle.image_name();
            let raw = store
                .read_particle(&particle.source)
                .map_err(|e| e.for_particle(image.as_str()))?;
            let p1 = transform
                .forward(&raw)
                .map_err(|e| e.for_particle(image.as_str()))?;

            let kernel = Arc::clone(kernel);
            let record = particle.clone();
            let job = self.pool.submit(move || kernel.subtract(&p1, &record));
            debug!(index = particle.destination.index, image = %image, "Submitted");

            let ticket = Ticket {
                index: particle.destination.index,
                image,
                job,
                permit,
            };
            if tx.send(ticket).is_err() {
                return Err(SubtractError::Pipeline(
                    "stack writer stopped before all particles were submitted".into(),
                ));
            }
        }
        Ok(group.len())
    }
}

/// Consumer side of one stack.
struct StackWriter<'a, S: ?Sized> {
    store: &'a S,
    path: &'a std::path::Path,
    transform: ImageTransform,
    pixel_size: f64,
    reporter: &'a dyn ProgressReporter,
}

impl<S: StackStore + ?Sized> StackWriter<'_, S> {
    /// Write tickets until the queue is closed. Returns the uncommitted
    /// sink and the number of images written; on error the sink has
    /// already been aborted.
    fn run(self, rx: Receiver<Ticket>) -> Result<(Option<Box<dyn StackSink>>, usize)> {
        let mut sink = None;
        match self.drain(rx, &mut sink) {
            Ok(written) => Ok((sink, written)),
            Err(e) => {
                if let Some(sink) = sink.take() {
                    sink.abort();
                }
                Err(e)
            }
        }
    }

    fn drain(
        &self,
        rx: Receiver<Ticket>,
        sink: &mut Option<Box<dyn StackSink>>,
    ) -> Result<usize> {
        let mut written = 0;
        for ticket in rx {
            let Ticket {
                index,
                image,
                job,
                permit,
            } = ticket;
            if index != written {
                return Err(SubtractError::Pipeline(format!(
                    "expected destination index {}, got {}",
                    written, index
                ))
                .for_particle(image));
            }

            let spectrum = job.wait().map_err(|e| e.for_particle(image.as_str()))?;
            let result = self
                .transform
                .inverse(&spectrum)
                .map_err(|e| e.for_particle(image.as_str()))?;

            if sink.is_none() {
                debug!(index, "Write");
                let created = self
                    .store
                    .create_stack(self.path, self.transform.image_shape(), self.pixel_size)
                    .map_err(|e| e.for_particle(image.as_str()))?;
                *sink = Some(created);
            } else {
                debug!(index, "Append");
            }
            if let Some(out) = sink.as_mut() {
                out.append(&result)
                    .map_err(|e| e.for_particle(image.as_str()))?;
            }

            drop(permit);
            written += 1;
            self.reporter.advance(1);
        }
        Ok(written)
    }
}
