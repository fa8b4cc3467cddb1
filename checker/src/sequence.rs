//! Enumeration of candidate action sequences and argument vectors.

use sam_types::ActionLabel;

use crate::CheckOptions;

/// Every sequence of intent indices of length exactly `depth_max`.
///
/// The first step skips labels listed in `do_not_start_with`; with
/// `no_duplicate_action` no label follows itself. Order is lexicographic by
/// registration index.
#[must_use]
pub fn sequences(labels: &[ActionLabel], options: &CheckOptions) -> Vec<Vec<usize>> {
    if options.depth_max == 0 {
        return Vec::new();
    }

    let mut level: Vec<Vec<usize>> = labels
        .iter()
        .enumerate()
        .filter(|&(_, label)| !options.do_not_start_with.contains(label))
        .map(|(index, _)| vec![index])
        .collect();

    for _ in 1..options.depth_max {
        let mut extended = Vec::with_capacity(level.len() * labels.len());
        for sequence in &level {
            let previous = sequence.last().map(|&index| &labels[index]);
            for (index, label) in labels.iter().enumerate() {
                if options.no_duplicate_action && previous == Some(label) {
                    continue;
                }
                let mut next = sequence.clone();
                next.push(index);
                extended.push(next);
            }
        }
        level = extended;
    }
    level
}

/// Mixed-radix counter over per-position argument choices.
///
/// Yields every digit vector with `digits[i] < radices[i]`, most significant
/// (first) position first. Yields nothing when any radix is zero and a single
/// empty vector when there are no positions.
#[derive(Debug, Clone)]
pub struct ArgumentOdometer {
    radices: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl ArgumentOdometer {
    #[must_use]
    pub fn new(radices: Vec<usize>) -> Self {
        let next = (!radices.contains(&0)).then(|| vec![0; radices.len()]);
        Self { radices, next }
    }

    /// Number of vectors the odometer yields; `None` on overflow.
    #[must_use]
    pub fn count_for(radices: &[usize]) -> Option<usize> {
        radices
            .iter()
            .try_fold(1_usize, |total, &radix| total.checked_mul(radix))
    }
}

impl Iterator for ArgumentOdometer {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        let mut digits = current.clone();
        for position in (0..digits.len()).rev() {
            digits[position] += 1;
            if digits[position] < self.radices[position] {
                self.next = Some(digits);
                break;
            }
            digits[position] = 0;
        }
        Some(current)
    }
}
