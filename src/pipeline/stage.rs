//! Stage executor: drives one filter between two channels.
//!
//! Each tick of the loop:
//! 1. Block on the upstream reader until it yields a batch.
//! 2. Run the filter over the batch.
//! 3. Forward the outputs, in order, to the downstream writer.
//!
//! When the upstream reports end-of-stream the downstream is finished. Any
//! error on the way (upstream failure, filter error, cancellation) is sent
//! downstream as the single terminal failure instead; the two outcomes are
//! exclusive because the writer is consumed by whichever happens.

use crate::error::{PipelineError, Result};
use crate::pipe::{PipeReader, PipeWriter};
use crate::pipeline::filter::Filter;
use crate::pool::Task;
use std::marker::PhantomData;

/// Per-run counters, logged when the stage completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    pub batches: u64,
    pub elements_in: u64,
    pub elements_out: u64,
}

/// Schedulable unit binding a filter to its upstream and downstream.
pub struct FilterTask<I, O, F> {
    label: String,
    upstream: PipeReader<I>,
    filter: F,
    downstream: PipeWriter<O>,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O, F> FilterTask<I, O, F>
where
    F: Filter<I, O>,
{
    /// Bind `filter` between `upstream` and `downstream`. The label is taken
    /// from the downstream channel, which is named after the stage.
    pub fn new(upstream: PipeReader<I>, filter: F, downstream: PipeWriter<O>) -> Self {
        Self {
            label: downstream.label().to_string(),
            upstream,
            filter,
            downstream,
            _marker: PhantomData,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run until the upstream ends, then write the terminal marker.
    pub fn execute(mut self) -> StageStats {
        let mut stats = StageStats::default();
        tracing::debug!("Stage '{}' started", self.label);

        // Cancellation is reported under the label of the stage that saw it.
        let outcome = self.pump(&mut stats).map_err(|e| match e {
            PipelineError::Cancelled { .. } => PipelineError::Cancelled {
                stage: self.label.clone(),
            },
            other => other,
        });
        match &outcome {
            Ok(()) => tracing::debug!(
                "Stage '{}' finished: {} batches, {} in, {} out",
                self.label,
                stats.batches,
                stats.elements_in,
                stats.elements_out
            ),
            Err(PipelineError::ConsumerGone { .. }) => {
                tracing::debug!("Stage '{}' stopped: consumer is gone", self.label);
                return stats;
            }
            Err(e) if e.is_cancelled() => {
                tracing::debug!("Stage '{}' cancelled", self.label)
            }
            Err(e) => tracing::warn!("Stage '{}' failed: {}", self.label, e),
        }

        self.downstream.complete(outcome);
        stats
    }

    fn pump(&mut self, stats: &mut StageStats) -> Result<()> {
        let mut batch = Vec::new();
        while self.upstream.has_data() {
            self.upstream.get_data(&mut batch)?;
            if batch.is_empty() {
                continue;
            }

            stats.batches += 1;
            stats.elements_in += batch.len() as u64;
            tracing::trace!("Stage '{}' filtering {} elements", self.label, batch.len());

            let outputs = self
                .filter
                .filter(std::mem::take(&mut batch))
                .map_err(|e| PipelineError::stage(self.label.as_str(), e))?;

            stats.elements_out += outputs.len() as u64;
            for element in outputs {
                self.downstream.put(element)?;
            }
        }
        Ok(())
    }
}

impl<I, O, F> Task for FilterTask<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Filter<I, O> + 'static,
{
    fn label(&self) -> &str {
        &self.label
    }

    fn run(self: Box<Self>) {
        self.execute();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{channel, preloaded, CancellationToken, ChannelOptions};
    use crate::pipeline::filters::{map, Identity};
    use anyhow::bail;

    fn sink<T>(label: &str) -> (PipeWriter<T>, PipeReader<T>) {
        channel(label, ChannelOptions::unbounded(), &CancellationToken::new())
    }

    #[test]
    fn test_identity_stage_preserves_order() {
        let (writer, reader) = sink("identity");
        let stats = FilterTask::new(preloaded("src", vec![1, 2, 3]), Identity, writer).execute();

        assert_eq!(reader.collect_all().unwrap(), vec![1, 2, 3]);
        assert_eq!(stats.elements_in, 3);
        assert_eq!(stats.elements_out, 3);
        assert_eq!(stats.batches, 1);
    }

    #[test]
    fn test_stage_label_comes_from_downstream() {
        let (writer, _reader) = sink::<u32>("double");
        let task = FilterTask::new(preloaded("src", Vec::<u32>::new()), Identity, writer);
        assert_eq!(task.label(), "double");
        assert_eq!(Task::label(&task), "double");
    }

    #[test]
    fn test_empty_upstream_finishes_downstream() {
        let (writer, mut reader) = sink::<u32>("noop");
        let stats = FilterTask::new(preloaded("src", Vec::new()), Identity, writer).execute();

        let mut out = Vec::new();
        assert_eq!(reader.get_data(&mut out).unwrap(), 0);
        assert!(!reader.has_data());
        assert_eq!(stats, StageStats::default());
    }

    #[test]
    fn test_filter_error_is_wrapped_with_stage_label() {
        let (writer, reader) = sink::<u32>("reject");
        let failing = |_: Vec<u32>| -> anyhow::Result<Vec<u32>> { bail!("malformed record") };
        FilterTask::new(preloaded("src", vec![1]), failing, writer).execute();

        let err = reader.collect_all().unwrap_err();
        assert_eq!(err.stage_label(), Some("reject"));
        assert_eq!(err.to_string(), "stage 'reject' failed: malformed record");
    }

    #[test]
    fn test_upstream_failure_is_forwarded_without_filtering() {
        let (mut up_writer, up_reader) = sink::<u32>("first");
        up_writer.put(1).unwrap();
        up_writer.exception(PipelineError::stage("first", anyhow::anyhow!("root cause")));

        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let counting = map("second", move |x: u32| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            x
        });

        let (writer, reader) = sink::<u32>("second");
        FilterTask::new(up_reader, counting, writer).execute();

        let mut iter = reader.into_iter();
        // The element ahead of the failure still flows through.
        assert_eq!(iter.next().unwrap().unwrap(), 1);
        let err = iter.next().unwrap().unwrap_err();
        assert_eq!(err.stage_label(), Some("first"));
        assert!(iter.next().is_none());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancellation_is_reported_downstream() {
        let token = CancellationToken::new();
        let (_up_writer, up_reader) = channel::<u32>("src", ChannelOptions::unbounded(), &token);
        let (writer, reader) = channel::<u32>("stage", ChannelOptions::unbounded(), &token);
        // Read with a live token so the marker the stage wrote is what surfaces.
        let mut reader = reader.bind_cancel_token(&CancellationToken::new());

        let handle = std::thread::spawn(move || {
            FilterTask::new(up_reader, Identity, writer).execute();
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        token.cancel();
        handle.join().unwrap();

        let mut out = Vec::new();
        let err = reader.get_data(&mut out).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { ref stage } if stage == "stage"));
        assert!(!reader.has_data());
    }

    #[test]
    fn test_forwarded_cancellation_is_relabelled() {
        let (up_writer, up_reader) = sink::<u32>("src");
        up_writer.exception(PipelineError::Cancelled {
            stage: "src".to_string(),
        });

        let (writer, reader) = sink::<u32>("stage");
        FilterTask::new(up_reader, Identity, writer).execute();

        let err = reader.collect_all().unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { ref stage } if stage == "stage"));
    }

    #[test]
    fn test_dropped_writer_is_not_mistaken_for_cancellation() {
        let token = CancellationToken::new();
        let (writer, reader) = channel::<u32>("stage", ChannelOptions::unbounded(), &token);
        let mut reader = reader.bind_cancel_token(&CancellationToken::new());
        token.cancel();
        drop(writer);

        let mut out = Vec::new();
        let err = reader.get_data(&mut out).unwrap_err();
        assert!(matches!(err, PipelineError::ProducerLost { .. }));
    }

    #[test]
    fn test_consumer_gone_stops_quietly() {
        let (writer, reader) = sink::<u32>("orphan");
        drop(reader);
        let stats = FilterTask::new(preloaded("src", vec![1, 2]), Identity, writer).execute();
        assert_eq!(stats.elements_in, 2);
    }
}
