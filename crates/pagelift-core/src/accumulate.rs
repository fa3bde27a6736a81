//! Ordered reassembly of partial-text chunks.
//!
//! Chunks are appended strictly in arrival order; the transport guarantees
//! per-session FIFO delivery, so no reordering, deduplication, or dropping
//! happens here.

use crate::{ErrorKind, ExtractionError};

#[derive(Debug, Default)]
pub struct ResultAccumulator {
    chunks: Vec<String>,
    saw_final: bool,
    finalized: Option<String>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk. `is_final` marks the last flush of the session;
    /// a `fullText` message is absorbed as a single final chunk.
    pub fn absorb(&mut self, text: String, is_final: bool) {
        if self.finalized.is_some() {
            tracing::debug!("chunk after finalize dropped");
            return;
        }
        self.chunks.push(text);
        if is_final {
            self.saw_final = true;
        }
    }

    /// Total length of text absorbed so far.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(String::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenate all chunks into the final output.
    ///
    /// Idempotent: a second call returns the previously computed value.
    /// Calling before a final chunk has arrived is a caller bug surfaced as
    /// [`ErrorKind::PrematureFinalize`].
    pub fn finalize(&mut self) -> Result<String, ExtractionError> {
        if let Some(ref text) = self.finalized {
            return Ok(text.clone());
        }
        if !self.saw_final {
            return Err(ExtractionError::new(
                ErrorKind::PrematureFinalize,
                "finalize called before the final chunk arrived",
            ));
        }
        let text = self.chunks.concat();
        self.finalized = Some(text.clone());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_concatenate_in_arrival_order() {
        let mut acc = ResultAccumulator::new();
        acc.absorb("page one\n".into(), false);
        acc.absorb("page two\n".into(), false);
        acc.absorb("page three\n".into(), true);
        assert_eq!(acc.finalize().unwrap(), "page one\npage two\npage three\n");
    }

    #[test]
    fn chunked_path_matches_full_text_path() {
        let full = "alpha beta gamma delta";

        let mut chunked = ResultAccumulator::new();
        chunked.absorb("alpha ".into(), false);
        chunked.absorb("beta ".into(), false);
        chunked.absorb("gamma delta".into(), true);

        let mut whole = ResultAccumulator::new();
        whole.absorb(full.into(), true);

        assert_eq!(chunked.finalize().unwrap(), whole.finalize().unwrap());
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut acc = ResultAccumulator::new();
        acc.absorb("text".into(), true);
        let first = acc.finalize().unwrap();
        let second = acc.finalize().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn premature_finalize_is_an_error() {
        let mut acc = ResultAccumulator::new();
        acc.absorb("partial".into(), false);
        let err = acc.finalize().unwrap_err();
        assert_eq!(err.kind, ErrorKind::PrematureFinalize);

        // the accumulator is still usable once the final chunk lands
        acc.absorb(" rest".into(), true);
        assert_eq!(acc.finalize().unwrap(), "partial rest");
    }

    #[test]
    fn length_is_monotonic_and_late_chunks_are_dropped() {
        let mut acc = ResultAccumulator::new();
        acc.absorb("ab".into(), false);
        assert_eq!(acc.len(), 2);
        acc.absorb("cd".into(), true);
        assert_eq!(acc.len(), 4);

        let text = acc.finalize().unwrap();
        acc.absorb("late".into(), false);
        assert_eq!(acc.finalize().unwrap(), text);
    }
}
