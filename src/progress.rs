/// Receives the completed fraction of a decode, in `[0, 1]`.
///
/// Called synchronously on the decoding thread; implementations must return
/// promptly.
pub trait ProgressSink {
    fn report(&mut self, ratio: f64);
}

impl<F: FnMut(f64)> ProgressSink for F {
    fn report(&mut self, ratio: f64) {
        self(ratio)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _ratio: f64) {}
}

const MIN_STEP: f64 = 0.01;

/// Forwards to a sink only once the ratio has moved by at least 1%.
pub(crate) struct Progress<'a> {
    sink: &'a mut dyn ProgressSink,
    ratio: f64,
}

impl<'a> Progress<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, ratio: 0.0 }
    }

    pub fn update(&mut self, done: usize, total: usize) {
        if total == 0 {
            return;
        }

        let ratio = (done as f64 / total as f64).min(1.0);
        if ratio - self.ratio >= MIN_STEP {
            self.sink.report(ratio);
            self.ratio = ratio;
        }
    }
}
