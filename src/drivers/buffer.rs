use std::collections::VecDeque;
/// One decoded reading: raw ADC counts and its reconstructed time in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub value: i16,
    pub timestamp: f64,
}
/// Copy of the buffer contents handed to the filter / plot side.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleWindow {
    pub values: Vec<i16>,
    pub timestamps: Vec<f64>,
}
impl SampleWindow {
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    pub fn values_f64(&self) -> Vec<f64> {
        self.values.iter().map(|&v| v as f64).collect()
    }
}
/// Fixed-capacity FIFO of samples. Once full, every append evicts the oldest
/// entry, so memory stays bounded however long the stream runs.
pub struct RollingBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}
impl RollingBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    pub fn append(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }
    pub fn extend(&mut self, samples: impl IntoIterator<Item = Sample>) {
        for sample in samples {
            self.append(sample);
        }
    }
    /// Shrinking keeps the most recent samples.
    pub fn set_capacity(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        while self.samples.len() > capacity {
            self.samples.pop_front();
        }
        self.capacity = capacity;
    }
    pub fn clear(&mut self) {
        self.samples.clear();
    }
    pub fn snapshot(&self) -> SampleWindow {
        let (values, timestamps) = self
            .samples
            .iter()
            .map(|s| (s.value, s.timestamp))
            .unzip();
        SampleWindow { values, timestamps }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn sample(i: usize) -> Sample {
        Sample {
            value: i as i16,
            timestamp: i as f64 * 0.002,
        }
    }
    #[test]
    fn overflow_keeps_most_recent_in_order() {
        let mut buffer = RollingBuffer::with_capacity(8);
        buffer.extend((0..8 + 5).map(sample));
        assert_eq!(buffer.len(), 8);
        let window = buffer.snapshot();
        assert_eq!(window.values, (5..13).map(|i| i as i16).collect::<Vec<_>>());
        assert_eq!(window.values.len(), window.timestamps.len());
        assert!(window.timestamps.windows(2).all(|p| p[1] > p[0]));
    }
    #[test]
    fn never_exceeds_capacity() {
        let mut buffer = RollingBuffer::with_capacity(3);
        for i in 0..100 {
            buffer.append(sample(i));
            assert!(buffer.len() <= 3);
        }
    }
    #[test]
    fn snapshot_is_a_detached_copy() {
        let mut buffer = RollingBuffer::with_capacity(4);
        buffer.extend((0..2).map(sample));
        let window = buffer.snapshot();
        buffer.append(sample(2));
        assert_eq!(window.len(), 2);
        assert_eq!(buffer.len(), 3);
    }
    #[test]
    fn clear_and_shrink() {
        let mut buffer = RollingBuffer::with_capacity(10);
        buffer.extend((0..10).map(sample));
        buffer.set_capacity(4);
        assert_eq!(buffer.snapshot().values, vec![6, 7, 8, 9]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 4);
        assert!(buffer.snapshot().is_empty());
    }
}
