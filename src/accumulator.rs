use csv::StringRecord;

use crate::config::ChunkPlan;
use crate::fetcher::Page;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkBuffer {
    pub rows: Vec<StringRecord>,
}

impl ChunkBuffer {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
#[derive(Debug)]
pub struct Accumulator {
    plan: ChunkPlan,
    chunk_start: u64,
    next_offset: u64,
    exhausted: bool,
    buffer: ChunkBuffer,
}

impl Accumulator {
    pub fn new(plan: ChunkPlan, chunk_start: u64) -> Self {
        Self {
            plan,
            chunk_start,
            next_offset: chunk_start,
            exhausted: false,
            buffer: ChunkBuffer::default(),
        }
    }

    pub fn push(&mut self, page: Page) {
        self.exhausted |= page.exhausted;
        self.next_offset = page.offset + self.plan.page_stride;
        self.buffer.rows.extend(page.rows);
    }

    pub fn positions_since_flush(&self) -> u64 {
        self.next_offset.saturating_sub(self.chunk_start)
    }

    pub fn ready(&self) -> bool {
        self.exhausted || self.positions_since_flush() >= self.plan.chunk_row_threshold - 1
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn buffer(&self) -> &ChunkBuffer {
        &self.buffer
    }
    pub fn clear(&mut self) {
        self.chunk_start = self.next_offset;
        self.buffer = ChunkBuffer::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(offset: u64, rows: usize) -> Page {
        Page {
            offset,
            rows: (0..rows)
                .map(|i| StringRecord::from(vec![format!("{}", offset + i as u64)]))
                .collect(),
            exhausted: rows == 0,
        }
    }

    #[test]
    fn ready_after_threshold_positions() {
        let plan = ChunkPlan::new(30, 10).unwrap();
        let mut acc = Accumulator::new(plan, 0);
        acc.push(page(0, 10));
        assert!(!acc.ready());
        acc.push(page(10, 10));
        assert!(!acc.ready());
        acc.push(page(20, 10));
        assert!(acc.ready());
        assert_eq!(acc.buffer().len(), 30);

        acc.clear();
        assert!(acc.buffer().is_empty());
        assert_eq!(acc.positions_since_flush(), 0);
        assert_eq!(acc.next_offset(), 30);
    }

    #[test]
    fn ready_on_exhaustion_below_threshold() {
        let plan = ChunkPlan::new(30, 10).unwrap();
        let mut acc = Accumulator::new(plan, 60);
        acc.push(page(60, 4));
        assert!(!acc.ready());
        acc.push(page(70, 0));
        assert!(acc.ready());
        assert!(acc.is_exhausted());
        assert_eq!(acc.buffer().len(), 4);
    }
}
