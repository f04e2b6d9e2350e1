/// Progress notifications emitted while a pipeline runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The run is starting and will execute `stages` stages.
    Start { stages: usize },
    /// Stage `index` (0-based), read from script line `line`, is starting.
    StageStarted {
        index: usize,
        verb: &'static str,
        line: usize,
    },
    /// Stage `index` finished writing `samples` samples.
    StageFinished { index: usize, samples: u64 },
    /// The result has been moved to the destination.
    Finish,
}

/// Receives [`ProgressEvent`]s. All methods default to doing nothing.
pub trait ProgressReporter {
    fn report(&mut self, _event: ProgressEvent) {}
}

impl<F> ProgressReporter for F
where
    F: FnMut(ProgressEvent),
{
    fn report(&mut self, event: ProgressEvent) {
        self(event)
    }
}

/// Reporter that discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}
