//! Result of an all-gather.

use crate::CollectiveError;
use gridkernel_types::Rank;

/// Concatenated contributions plus the offset at which each rank's begins.
///
/// Contribution `r` spans `displacements[r]..displacements[r + 1]` (the last
/// one runs to the end of the buffer), so empty contributions occupy a
/// zero-length span but still have an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gathered {
    buffer: Vec<u8>,
    displacements: Vec<usize>,
}

impl Gathered {
    /// Validate and wrap a gathered buffer.
    ///
    /// The table must have one entry per participant, start at 0, never
    /// decrease, and stay within the buffer.
    pub fn new(buffer: Vec<u8>, displacements: Vec<usize>) -> Result<Self, CollectiveError> {
        match displacements.first() {
            None => {
                return Err(CollectiveError::MalformedDisplacements(
                    "no contributions".to_string(),
                ))
            }
            Some(&first) if first != 0 => {
                return Err(CollectiveError::MalformedDisplacements(format!(
                    "first contribution starts at {first}, expected 0"
                )))
            }
            Some(_) => {}
        }
        if let Some(pos) = displacements.windows(2).position(|w| w[1] < w[0]) {
            return Err(CollectiveError::MalformedDisplacements(format!(
                "displacement of rank {} precedes rank {}",
                pos + 1,
                pos
            )));
        }
        if let Some(&last) = displacements.last() {
            if last > buffer.len() {
                return Err(CollectiveError::MalformedDisplacements(format!(
                    "displacement {last} beyond buffer of {} bytes",
                    buffer.len()
                )));
            }
        }
        Ok(Self {
            buffer,
            displacements,
        })
    }

    /// Concatenate contributions given in rank order.
    pub fn from_contributions<B: AsRef<[u8]>>(parts: &[B]) -> Result<Self, CollectiveError> {
        let total = parts.iter().map(|p| p.as_ref().len()).sum();
        let mut buffer = Vec::with_capacity(total);
        let mut displacements = Vec::with_capacity(parts.len());
        for part in parts {
            displacements.push(buffer.len());
            buffer.extend_from_slice(part.as_ref());
        }
        Self::new(buffer, displacements)
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn displacements(&self) -> &[usize] {
        &self.displacements
    }

    pub fn num_contributions(&self) -> usize {
        self.displacements.len()
    }

    /// Bytes contributed by `rank`, or `None` if the rank did not participate.
    pub fn contribution(&self, rank: Rank) -> Option<&[u8]> {
        let start = *self.displacements.get(rank.0)?;
        let end = self
            .displacements
            .get(rank.0 + 1)
            .copied()
            .unwrap_or(self.buffer.len());
        Some(&self.buffer[start..end])
    }

    /// Every contribution in rank order, including empty ones.
    pub fn contributions(&self) -> impl Iterator<Item = (Rank, &[u8])> + '_ {
        (0..self.num_contributions()).filter_map(move |r| {
            self.contribution(Rank(r)).map(|bytes| (Rank(r), bytes))
        })
    }
}
