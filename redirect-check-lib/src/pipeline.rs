//! Bounded-concurrency verification pipeline.
//!
//! Rows flow through three stages:
//!
//! 1. A single dispatcher reads rows in file order, drops malformed ones,
//!    waits for an admission token and pushes the row into a bounded queue.
//!    When the queue is full the dispatcher waits, so no row is ever lost
//!    to backpressure.
//! 2. A fixed pool of workers pulls rows off the queue. Each worker checks
//!    all eligible pairs of its row at once, and each pair checks its source
//!    and destination at once.
//! 3. Every classified pair is appended to the shared [`ResultWriter`] as
//!    soon as it is known.
//!
//! Cancelling the token stops admission immediately. Workers finish the row
//! they hold and exit without picking up queued rows.

use crate::classifier::outcome_for;
use crate::error::{AdmissionError, RedirectCheckError, RowError};
use crate::input::read_rows_from_path;
use crate::protocols::{HttpTransport, ReqwestTransport, UrlVerifier};
use crate::rate_limiter::AdmissionLimiter;
use crate::schema::{Row, RowSchema};
use crate::types::{Action, RunConfig, RunSummary, UrlPair};
use crate::writer::ResultWriter;
use async_channel::{Receiver, Sender};
use futures::future::join_all;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Shared run counters.
#[derive(Debug, Default)]
pub struct RunStats {
    rows_read: AtomicUsize,
    rows_admitted: AtomicUsize,
    rows_skipped: AtomicUsize,
    rows_not_admitted: AtomicUsize,
    pairs_evaluated: AtomicUsize,
    analyze: AtomicUsize,
    redirect: AtomicUsize,
    change: AtomicUsize,
}

impl RunStats {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, action: Action) {
        Self::bump(&self.pairs_evaluated);
        match action {
            Action::Analyze => Self::bump(&self.analyze),
            Action::Redirect => Self::bump(&self.redirect),
            Action::Change => Self::bump(&self.change),
        }
    }

    /// Copy the counters into a summary.
    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            rows_read: self.rows_read.load(Ordering::Relaxed),
            rows_admitted: self.rows_admitted.load(Ordering::Relaxed),
            rows_skipped: self.rows_skipped.load(Ordering::Relaxed),
            rows_not_admitted: self.rows_not_admitted.load(Ordering::Relaxed),
            pairs_evaluated: self.pairs_evaluated.load(Ordering::Relaxed),
            analyze: self.analyze.load(Ordering::Relaxed),
            redirect: self.redirect.load(Ordering::Relaxed),
            change: self.change.load(Ordering::Relaxed),
            ..RunSummary::default()
        }
    }
}

/// Producer side of the pipeline.
pub struct Dispatcher {
    limiter: AdmissionLimiter,
    schema: Arc<RowSchema>,
    backoff: Duration,
    stats: Arc<RunStats>,
}

impl Dispatcher {
    pub fn new(limiter: AdmissionLimiter, schema: Arc<RowSchema>, backoff: Duration) -> Self {
        Self {
            limiter,
            schema,
            backoff,
            stats: Arc::new(RunStats::default()),
        }
    }

    fn with_stats(mut self, stats: Arc<RunStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    /// Feed `rows` into `queue` in order, then close it.
    ///
    /// Returns when every row has been handled, the token fires, or every
    /// receiver is gone. Rows left over after an early stop are still
    /// counted, as skipped or not admitted.
    pub async fn dispatch<I>(&self, rows: I, queue: Sender<Row>, cancel: &CancellationToken)
    where
        I: IntoIterator<Item = Result<Row, RowError>>,
    {
        let mut rows = rows.into_iter();
        for item in rows.by_ref() {
            RunStats::bump(&self.stats.rows_read);

            let row = match self.checked(item) {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(line = e.line(), error = %e, "skipping row");
                    RunStats::bump(&self.stats.rows_skipped);
                    continue;
                }
            };

            if cancel.is_cancelled() {
                RunStats::bump(&self.stats.rows_not_admitted);
                break;
            }

            match self.limiter.acquire(cancel).await {
                Ok(()) => {}
                Err(AdmissionError::Cancelled) => {
                    tracing::warn!(line = row.line, "row not admitted, run cancelled");
                    RunStats::bump(&self.stats.rows_not_admitted);
                    break;
                }
                Err(e @ AdmissionError::TimedOut(_)) => {
                    tracing::warn!(line = row.line, error = %e, "row not admitted");
                    RunStats::bump(&self.stats.rows_not_admitted);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.backoff) => continue,
                    }
                }
            }

            let line = row.line;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(line, "row not queued, run cancelled");
                    RunStats::bump(&self.stats.rows_not_admitted);
                    break;
                }
                sent = queue.send(row) => match sent {
                    Ok(()) => RunStats::bump(&self.stats.rows_admitted),
                    Err(_) => {
                        tracing::warn!(line, "queue closed, stopping dispatch");
                        RunStats::bump(&self.stats.rows_not_admitted);
                        break;
                    }
                },
            }
        }

        let abandoned = self.abandon(rows);
        if abandoned > 0 {
            tracing::warn!(rows = abandoned, "rows left unprocessed");
        }

        queue.close();
        tracing::debug!("dispatcher finished");
    }

    fn checked(&self, item: Result<Row, RowError>) -> Result<Row, RowError> {
        item.and_then(|row| self.schema.check(&row).map(|_| row))
    }

    /// Count rows that will never be dispatched.
    fn abandon<I>(&self, rest: I) -> usize
    where
        I: Iterator<Item = Result<Row, RowError>>,
    {
        let mut count = 0;
        for item in rest {
            RunStats::bump(&self.stats.rows_read);
            match self.checked(item) {
                Ok(_) => RunStats::bump(&self.stats.rows_not_admitted),
                Err(_) => RunStats::bump(&self.stats.rows_skipped),
            }
            count += 1;
        }
        count
    }
}

/// State shared by every worker of one run.
struct WorkerContext<W: Write> {
    verifier: UrlVerifier,
    schema: Arc<RowSchema>,
    writer: Arc<ResultWriter<W>>,
    stats: Arc<RunStats>,
    failure: Mutex<Option<RedirectCheckError>>,
    cancel: CancellationToken,
}

impl<W: Write> WorkerContext<W> {
    async fn work(&self, id: usize, queue: Receiver<Row>) {
        loop {
            let row = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                received = queue.recv() => match received {
                    Ok(row) => row,
                    Err(_) => break,
                },
            };
            self.process_row(&row).await;
        }
        tracing::debug!(worker = id, "worker finished");
    }

    async fn process_row(&self, row: &Row) {
        let identifier = self.schema.identifier(row);
        let pairs = self.schema.eligible_pairs(row);
        if pairs.is_empty() {
            tracing::debug!(line = row.line, %identifier, "no eligible pairs");
            return;
        }

        join_all(pairs.iter().map(|pair| self.evaluate(identifier, pair))).await;
    }

    async fn evaluate(&self, identifier: &str, pair: &UrlPair) {
        let (source, destination) = self
            .verifier
            .verify_pair(&pair.source, &pair.destination)
            .await;
        let outcome = outcome_for(identifier, pair, source.status, destination.status);

        tracing::info!(
            %identifier,
            pair = %pair.name,
            source_status = outcome.source_status,
            source_method = %source.method,
            destination_status = outcome.destination_status,
            destination_method = %destination.method,
            action = %outcome.action,
            "pair classified"
        );
        self.stats.record(outcome.action);

        if let Err(e) = self.writer.write(&outcome) {
            self.fail(e);
        }
    }

    /// Keep the first fatal error and stop the run.
    fn fail(&self, error: RedirectCheckError) {
        tracing::error!(error = %error, "stopping run");
        if let Ok(mut slot) = self.failure.lock() {
            slot.get_or_insert(error);
        }
        self.cancel.cancel();
    }

    fn take_failure(&self) -> Option<RedirectCheckError> {
        self.failure.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// A configured verification run.
///
/// # Example
///
/// ```rust,no_run
/// use redirect_check_lib::{Pipeline, RunConfig};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn demo() -> redirect_check_lib::Result<()> {
/// let pipeline = Pipeline::new(RunConfig::default())?;
/// let summary = pipeline
///     .run_files("input.csv", "output.csv", CancellationToken::new())
///     .await?;
/// println!("{} pairs checked", summary.pairs_evaluated);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    config: RunConfig,
    verifier: UrlVerifier,
}

impl Pipeline {
    /// Build a pipeline with the reqwest transport.
    pub fn new(config: RunConfig) -> Result<Self, RedirectCheckError> {
        let transport = ReqwestTransport::new(&config.http)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a pipeline over any transport.
    pub fn with_transport(
        config: RunConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, RedirectCheckError> {
        config
            .schema
            .validate()
            .map_err(RedirectCheckError::config)?;
        let verifier = UrlVerifier::new(transport, config.probe);
        Ok(Self { config, verifier })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Read `input`, create `output` and run.
    ///
    /// Both files are opened before any request is made, so a bad path
    /// aborts the run with nothing processed.
    pub async fn run_files<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        cancel: CancellationToken,
    ) -> Result<RunSummary, RedirectCheckError> {
        let rows = read_rows_from_path(input)?;
        let writer = Arc::new(ResultWriter::create(output)?);
        self.run(rows, writer, cancel).await
    }

    /// Run all `rows` through the pipeline, writing to `writer`.
    ///
    /// Returns a summary even when cancelled; `summary.cancelled` tells.
    /// A write failure stops the run and is returned as the error.
    pub async fn run<I, W>(
        &self,
        rows: I,
        writer: Arc<ResultWriter<W>>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, RedirectCheckError>
    where
        I: IntoIterator<Item = Result<Row, RowError>>,
        W: Write + Send + 'static,
    {
        let started = Instant::now();
        let stats = Arc::new(RunStats::default());
        let schema = Arc::new(self.config.schema.clone());
        let (tx, rx) = async_channel::bounded(self.config.queue_capacity.max(1));

        let context = Arc::new(WorkerContext {
            verifier: self.verifier.clone(),
            schema: Arc::clone(&schema),
            writer,
            stats: Arc::clone(&stats),
            failure: Mutex::new(None),
            cancel: cancel.clone(),
        });

        tracing::info!(
            workers = self.config.workers,
            rate = self.config.rate_per_second,
            queue = self.config.queue_capacity,
            probe = %self.config.probe,
            "starting run"
        );

        let workers: Vec<_> = (0..self.config.workers.max(1))
            .map(|id| {
                let context = Arc::clone(&context);
                let queue = rx.clone();
                tokio::spawn(async move { context.work(id, queue).await })
            })
            .collect();
        drop(rx);

        let dispatcher = Dispatcher::new(
            AdmissionLimiter::new(self.config.rate_per_second, self.config.admission_timeout),
            schema,
            self.config.admission_backoff,
        )
        .with_stats(Arc::clone(&stats));
        dispatcher.dispatch(rows, tx, &cancel).await;

        for result in join_all(workers).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "worker task failed");
            }
        }

        if let Some(error) = context.take_failure() {
            return Err(error);
        }

        let mut summary = stats.snapshot();
        summary.duration_ms = started.elapsed().as_millis();
        summary.cancelled = cancel.is_cancelled();
        tracing::info!(
            pairs = summary.pairs_evaluated,
            duration_ms = summary.duration_ms,
            cancelled = summary.cancelled,
            "run finished"
        );
        Ok(summary)
    }
}

/// What a dry run learns about an input without sending requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct InputSurvey {
    pub rows: usize,
    pub valid_rows: usize,
    pub skipped_rows: usize,
    pub eligible_pairs: usize,
}

/// Count rows and eligible pairs the way the dispatcher would see them.
pub fn survey(rows: &[Result<Row, RowError>], schema: &RowSchema) -> InputSurvey {
    let mut survey = InputSurvey {
        rows: rows.len(),
        ..InputSurvey::default()
    };
    for row in rows {
        match row {
            Ok(row) if schema.check(row).is_ok() => {
                survey.valid_rows += 1;
                survey.eligible_pairs += schema.eligible_pairs(row).len();
            }
            _ => survey.skipped_rows += 1,
        }
    }
    survey
}
