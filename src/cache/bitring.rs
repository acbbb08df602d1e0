//! Error detector: a fixed-capacity ring of recent success/failure samples.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Records 1 for error, 0 for success over the last `size` operations.
/// The condition trips when errors/size >= threshold and the absolute
/// error count has reached `min_errors`.
#[derive(Debug)]
pub struct BitRing {
    window: Mutex<VecDeque<bool>>,
    size: usize,
    threshold: f64,
    min_errors: usize,
}

impl BitRing {
    pub fn new(size: usize, threshold: f64, min_errors: usize) -> Self {
        assert!(size > 0, "ring size must be positive");
        Self {
            window: Mutex::new(VecDeque::with_capacity(size)),
            size,
            threshold,
            min_errors,
        }
    }

    pub fn record(&self, error: bool) {
        let mut window = self.window.lock().expect("bitring poisoned");
        if window.len() == self.size {
            window.pop_front();
        }
        window.push_back(error);
    }

    pub fn tripped(&self) -> bool {
        let window = self.window.lock().expect("bitring poisoned");
        let errors = window.iter().filter(|&&e| e).count();
        errors >= self.min_errors && (errors as f64) / (self.size as f64) >= self.threshold
    }

    pub fn reset(&self) {
        self.window.lock().expect("bitring poisoned").clear();
    }
}
