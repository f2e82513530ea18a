//! CPU allow-list applied when admitting buffers.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Highest CPU number accepted by [`CpuBitmap::parse`].
pub const MAX_CPU: u32 = 65535;

/// A bitmap of CPUs whose trace data should be kept.
///
/// Each bit represents one CPU: 1 = admitted. Uses 64-bit words.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CpuBitmap {
    words: Vec<u64>,
}

impl CpuBitmap {
    /// Create an empty bitmap (admits no CPU).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bitmap admitting exactly the given CPUs.
    pub fn from_cpus<I: IntoIterator<Item = u32>>(cpus: I) -> Self {
        let mut bitmap = Self::new();
        for cpu in cpus {
            bitmap.set(cpu);
        }
        bitmap
    }

    /// Parse a CPU list such as `"0-3,8,10-11"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for malformed entries, reversed ranges or
    /// CPUs above [`MAX_CPU`].
    pub fn parse(list: &str) -> Result<Self> {
        let mut bitmap = Self::new();
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (start, end) = match part.split_once('-') {
                Some((a, b)) => (parse_cpu(a)?, parse_cpu(b)?),
                None => {
                    let cpu = parse_cpu(part)?;
                    (cpu, cpu)
                }
            };
            if end < start {
                return Err(Error::OutOfRange(format!("cpu range {part}")));
            }
            for cpu in start..=end {
                bitmap.set(cpu);
            }
        }
        Ok(bitmap)
    }

    /// Admit `cpu`.
    pub fn set(&mut self, cpu: u32) {
        let word_idx = cpu as usize / 64;
        let bit_idx = cpu as usize % 64;
        if word_idx >= self.words.len() {
            self.words.resize(word_idx + 1, 0);
        }
        self.words[word_idx] |= 1u64 << bit_idx;
    }

    /// Stop admitting `cpu`.
    pub fn clear(&mut self, cpu: u32) {
        let word_idx = cpu as usize / 64;
        if let Some(word) = self.words.get_mut(word_idx) {
            *word &= !(1u64 << (cpu as usize % 64));
        }
    }

    /// Check whether `cpu` is admitted.
    pub fn test(&self, cpu: u32) -> bool {
        let word_idx = cpu as usize / 64;
        let bit_idx = cpu as usize % 64;
        self.words
            .get(word_idx)
            .is_some_and(|word| word & (1u64 << bit_idx) != 0)
    }

    /// Number of admitted CPUs.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Admitted CPUs in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            (0..64u32)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| word_idx as u32 * 64 + bit)
        })
    }
}

fn parse_cpu(s: &str) -> Result<u32> {
    s.trim()
        .parse()
        .ok()
        .filter(|cpu| *cpu <= MAX_CPU)
        .ok_or_else(|| Error::OutOfRange(format!("cpu '{s}'")))
}

impl FromStr for CpuBitmap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for CpuBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Decide whether a buffer from `cpu` is admitted.
///
/// Always true without a bitmap, and for `cpu == -1` (no CPU affinity).
/// Rejection is a silent drop, not an error.
pub fn passes(filter: Option<&CpuBitmap>, cpu: i32) -> bool {
    match filter {
        None => true,
        Some(_) if cpu == -1 => true,
        Some(bitmap) => u32::try_from(cpu).is_ok_and(|cpu| bitmap.test(cpu)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_test_clear() {
        let mut bitmap = CpuBitmap::new();
        assert!(!bitmap.test(0));
        bitmap.set(0);
        bitmap.set(65);
        assert!(bitmap.test(0));
        assert!(bitmap.test(65));
        assert!(!bitmap.test(64));
        assert_eq!(bitmap.count(), 2);

        bitmap.clear(65);
        assert!(!bitmap.test(65));
        bitmap.clear(1000);
        assert_eq!(bitmap.count(), 1);
    }

    #[test]
    fn test_parse_list() {
        let bitmap = CpuBitmap::parse("0-3, 8,10-11").unwrap();
        assert_eq!(bitmap.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 8, 10, 11]);

        let bitmap: CpuBitmap = "127".parse().unwrap();
        assert!(bitmap.test(127));
        assert_eq!(bitmap.count(), 1);

        assert!(CpuBitmap::parse("").unwrap().iter().next().is_none());
        assert!(CpuBitmap::parse("3-1").is_err());
        assert!(CpuBitmap::parse("a").is_err());
        assert!(CpuBitmap::parse("-1").is_err());
    }

    #[test]
    fn test_parse_rejects_huge_cpus() {
        assert!(matches!(
            CpuBitmap::parse("0-4294967295"),
            Err(Error::OutOfRange(_))
        ));
        assert!(CpuBitmap::parse("65536").is_err());

        let bitmap = CpuBitmap::parse("65535").unwrap();
        assert!(bitmap.test(MAX_CPU));
    }

    #[test]
    fn test_passes_without_filter() {
        for cpu in [-1, 0, 5, 1023, i32::MAX] {
            assert!(passes(None, cpu));
        }
    }

    #[test]
    fn test_passes_no_affinity() {
        let empty = CpuBitmap::new();
        let some = CpuBitmap::from_cpus([2]);
        assert!(passes(Some(&empty), -1));
        assert!(passes(Some(&some), -1));
    }

    #[test]
    fn test_passes_with_filter() {
        let bitmap = CpuBitmap::from_cpus([1, 3]);
        assert!(passes(Some(&bitmap), 1));
        assert!(passes(Some(&bitmap), 3));
        assert!(!passes(Some(&bitmap), 0));
        assert!(!passes(Some(&bitmap), 200));
        assert!(!passes(Some(&bitmap), -2));
    }
}
