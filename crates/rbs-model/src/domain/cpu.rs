use std::{fmt, ops::Range};

/// Contiguous half-open range of logical CPU indices owned by one sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuSlice {
    pub start: usize,
    pub end: usize,
}

impl CpuSlice {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "cpu slice start after end");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn overlaps(&self, other: &CpuSlice) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Comma-separated index list accepted by `--cpuset-cpus`.
    pub fn cpuset(&self) -> String {
        self.range()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for CpuSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpuset_lists_every_index() {
        assert_eq!(CpuSlice::new(0, 1).cpuset(), "0");
        assert_eq!(CpuSlice::new(2, 5).cpuset(), "2,3,4");
        assert_eq!(CpuSlice::new(2, 5).len(), 3);
    }

    #[test]
    fn overlap_is_half_open() {
        let a = CpuSlice::new(0, 2);
        assert!(!a.overlaps(&CpuSlice::new(2, 4)));
        assert!(a.overlaps(&CpuSlice::new(1, 3)));
        assert!(CpuSlice::new(0, 8).overlaps(&CpuSlice::new(3, 4)));
    }

    #[test]
    fn display() {
        assert_eq!(CpuSlice::new(0, 1).to_string(), "[0,1)");
    }
}
