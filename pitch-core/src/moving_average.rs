/// Running mean over the most recent `size` values, backed by a circular buffer.
///
/// Until `size` values have been pushed the mean is taken over the values
/// seen so far.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    buffer: Vec<f64>,
    next: usize,
    len: usize,
    sum: f64,
}

impl MovingAverage {
    /// `size` is clamped to at least one slot.
    pub fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            next: 0,
            len: 0,
            sum: 0.0,
        }
    }

    /// Adds a value, evicting the oldest once full, and returns the new mean.
    pub fn insert(&mut self, value: f64) -> f64 {
        if self.len == self.buffer.len() {
            self.sum -= self.buffer[self.next];
        } else {
            self.len += 1;
        }
        self.buffer[self.next] = value;
        self.sum += value;
        self.next = (self.next + 1) % self.buffer.len();
        self.average()
    }

    /// Current mean, or 0.0 before the first insert.
    pub fn average(&self) -> f64 {
        if self.len == 0 {
            0.0
        } else {
            self.sum / self.len as f64
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.next = 0;
        self.len = 0;
        self.sum = 0.0;
    }
}
