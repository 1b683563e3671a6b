use irrigation_shared::{RingBuffer, TelemetrySample};

/// Samples shown on the chart.
pub const WINDOW_LEN: usize = 6;

/// Rolling chart history: the last [`WINDOW_LEN`] samples in arrival order.
///
/// Samples are taken as they come. Nothing is reordered or deduplicated, so
/// a late sample with an older timestamp still lands at the end.
#[derive(Debug, Clone)]
pub struct TelemetryWindow {
    samples: RingBuffer<TelemetrySample>,
}

impl Default for TelemetryWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryWindow {
    pub fn new() -> Self {
        Self {
            samples: RingBuffer::new(WINDOW_LEN),
        }
    }

    pub fn push(&mut self, sample: TelemetrySample) {
        self.samples.push(sample);
    }

    /// Appends a batch (e.g. stored logs), oldest first.
    pub fn extend<I: IntoIterator<Item = TelemetrySample>>(&mut self, samples: I) {
        for s in samples {
            self.push(s);
        }
    }

    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.samples.latest()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<TelemetrySample> {
        self.samples.to_vec()
    }
}
