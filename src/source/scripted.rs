//! Scripted face-count source
//!
//! Replays a fixed sequence of counts and faults. Used by `simulate` and by
//! tests that need a deterministic detector.

use std::collections::VecDeque;
use std::str::FromStr;

use super::FaceSource;
use crate::{Error, Result};

/// One scripted tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Report this many faces
    Faces(usize),
    /// Fail the tick with this message
    Fault(String),
}

/// Source that plays back a script of ticks
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    script: Vec<ScriptStep>,
    pending: VecDeque<ScriptStep>,
    looping: bool,
    acquired: bool,
}

impl ScriptedSource {
    /// Create a source that plays `script` once
    #[must_use]
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            pending: script.iter().cloned().collect(),
            script,
            looping: false,
            acquired: false,
        }
    }

    /// Create a source from plain face counts
    #[must_use]
    pub fn from_counts(counts: &[usize]) -> Self {
        Self::new(counts.iter().copied().map(ScriptStep::Faces).collect())
    }

    /// Restart the script from the top when it runs out
    #[must_use]
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Number of ticks left before the script is exhausted
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Total scripted ticks
    #[must_use]
    pub fn len(&self) -> usize {
        self.script.len()
    }

    /// Whether the script has no ticks at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }
}

impl FromStr for ScriptedSource {
    type Err = Error;

    /// Parse a comma or whitespace separated script such as `0,1,1,x,2`
    ///
    /// `x` (or `!`) marks a faulty tick.
    fn from_str(s: &str) -> Result<Self> {
        let script = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(|token| match token {
                "x" | "X" | "!" => Ok(ScriptStep::Fault("scripted fault".to_string())),
                n => n
                    .parse()
                    .map(ScriptStep::Faces)
                    .map_err(|_| Error::Config(format!("invalid script step: {n:?}"))),
            })
            .collect::<Result<Vec<_>>>()?;

        if script.is_empty() {
            return Err(Error::Config("script is empty".to_string()));
        }

        Ok(Self::new(script))
    }
}

impl FaceSource for ScriptedSource {
    fn name(&self) -> String {
        format!("scripted ({} ticks)", self.script.len())
    }

    fn acquire(&mut self) -> Result<()> {
        if self.script.is_empty() {
            return Err(Error::SourceUnavailable("script is empty".to_string()));
        }
        self.acquired = true;
        Ok(())
    }

    fn capture_and_count(&mut self) -> Result<usize> {
        if !self.acquired {
            return Err(Error::Capture("source not acquired".to_string()));
        }

        if self.pending.is_empty() && self.looping {
            self.pending.extend(self.script.iter().cloned());
        }

        match self.pending.pop_front() {
            Some(ScriptStep::Faces(count)) => Ok(count),
            Some(ScriptStep::Fault(message)) => Err(Error::Capture(message)),
            None => Err(Error::Capture("script exhausted".to_string())),
        }
    }

    fn release(&mut self) {
        self.acquired = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_counts_and_faults() {
        let source: ScriptedSource = "0, 1 1,x,2".parse().unwrap();
        assert_eq!(
            source.script,
            vec![
                ScriptStep::Faces(0),
                ScriptStep::Faces(1),
                ScriptStep::Faces(1),
                ScriptStep::Fault("scripted fault".to_string()),
                ScriptStep::Faces(2),
            ]
        );
    }

    #[test]
    fn rejects_bad_scripts() {
        assert!("".parse::<ScriptedSource>().is_err());
        assert!("1,two".parse::<ScriptedSource>().is_err());
    }

    #[test]
    fn plays_once_then_exhausts() {
        let mut source = ScriptedSource::from_counts(&[1, 0]);
        source.acquire().unwrap();

        assert_eq!(source.capture_and_count().unwrap(), 1);
        assert_eq!(source.capture_and_count().unwrap(), 0);
        assert_eq!(source.remaining(), 0);
        assert!(matches!(source.capture_and_count(), Err(Error::Capture(_))));
    }

    #[test]
    fn looping_restarts() {
        let mut source = ScriptedSource::from_counts(&[3]).looping();
        source.acquire().unwrap();

        for _ in 0..4 {
            assert_eq!(source.capture_and_count().unwrap(), 3);
        }
    }

    #[test]
    fn requires_acquire() {
        let mut source = ScriptedSource::from_counts(&[1]);
        assert!(source.capture_and_count().is_err());

        source.acquire().unwrap();
        source.release();
        assert!(source.capture_and_count().is_err());
    }

    #[test]
    fn empty_script_cannot_be_acquired() {
        let mut source = ScriptedSource::new(Vec::new());
        assert!(matches!(source.acquire(), Err(Error::SourceUnavailable(_))));
    }
}
