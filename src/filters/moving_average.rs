use super::PositionFilter;
use std::collections::VecDeque;

/// Mean of the last `window_size` positions
pub struct MovingAverageFilter {
    window_size: usize,
    history: VecDeque<(f64, f64)>,
}

impl MovingAverageFilter {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            history: VecDeque::with_capacity(window_size),
        }
    }
}

impl PositionFilter for MovingAverageFilter {
    fn apply(&mut self, x: f64, y: f64) -> (f64, f64) {
        if self.history.len() >= self.window_size {
            self.history.pop_front();
        }
        self.history.push_back((x, y));

        let n = self.history.len() as f64;
        let (sx, sy) = self
            .history
            .iter()
            .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
        (sx / n, sy / n)
    }

    fn reset(&mut self) {
        self.history.clear();
    }

    fn name(&self) -> &str {
        "MovingAverageFilter"
    }
}
