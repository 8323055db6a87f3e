//! Detach sequence detection
//!
//! [`EscapeDetector`] sits inline on the local input path and watches for the
//! configured [`DetachSequence`]. Bytes that belong to a (possibly partial)
//! match are absorbed; everything else passes through unchanged and in order.
//!
//! Matching is byte-driven only. A pause between keystrokes never resets a
//! partial match, and bytes absorbed by a match that later fails are dropped
//! rather than re-injected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default detach keys: ctrl-p followed by ctrl-q
pub const DEFAULT_DETACH_KEYS: &str = "ctrl-p,ctrl-q";

/// Errors from parsing a detach key list
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetachKeysError {
    #[error("Detach key list is empty")]
    Empty,

    #[error("Invalid detach key: {0:?}")]
    InvalidKey(String),
}

/// Ordered byte codes that trigger a detach when typed consecutively
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DetachSequence {
    bytes: Vec<u8>,
}

impl DetachSequence {
    /// Build a sequence from raw byte codes
    ///
    /// Only bytes the key-list syntax can spell are accepted: ASCII other
    /// than `,` and space.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, DetachKeysError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(DetachKeysError::Empty);
        }
        if let Some(&b) = bytes.iter().find(|&&b| !is_key_byte(b)) {
            return Err(DetachKeysError::InvalidKey(format!("{:#04x}", b)));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; a sequence holds at least one byte
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Default for DetachSequence {
    fn default() -> Self {
        Self {
            bytes: vec![0x10, 0x11],
        }
    }
}

/// Parses a docker-style key list such as `ctrl-p,ctrl-q` or `ctrl-a,d`
impl FromStr for DetachSequence {
    type Err = DetachKeysError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(DetachKeysError::Empty);
        }
        let bytes = s
            .split(',')
            .map(|key| parse_key(key.trim()))
            .collect::<Result<Vec<u8>, _>>()?;
        Self::new(bytes)
    }
}

fn is_key_byte(b: u8) -> bool {
    b.is_ascii() && b != b',' && b != b' '
}

fn parse_key(key: &str) -> Result<u8, DetachKeysError> {
    let invalid = || DetachKeysError::InvalidKey(key.to_string());

    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => return Ok(c as u8),
        (None, _) => return Err(invalid()),
        _ => {}
    }

    let lower = key.to_ascii_lowercase();
    let rest = lower.strip_prefix("ctrl-").ok_or_else(invalid)?;
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (Some(c @ 'a'..='z'), None) => Ok(c as u8 - b'a' + 1),
        (Some(c @ ('@' | '[' | '\\' | ']' | '^' | '_')), None) => Ok(c as u8 - b'@'),
        _ => Err(invalid()),
    }
}

impl fmt::Display for DetachSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, &b) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match b {
                1..=26 => write!(f, "ctrl-{}", (b'a' + b - 1) as char)?,
                0 | 27..=31 => write!(f, "ctrl-{}", (b'@' + b) as char)?,
                _ => write!(f, "{}", b as char)?,
            }
        }
        Ok(())
    }
}

impl TryFrom<String> for DetachSequence {
    type Error = DetachKeysError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DetachSequence> for String {
    fn from(seq: DetachSequence) -> Self {
        seq.to_string()
    }
}

/// Position of the detector within the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    /// `sequence[..=k]` has been seen
    Matched(usize),
    Triggered,
}

/// How a byte relates to the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteClass {
    /// Continues the current partial match
    Next,
    /// Equals the first byte of the sequence
    Start,
    Other,
}

/// Outcome of feeding one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Forward(u8),
    Absorbed,
    Detach,
}

/// Outcome of scanning a chunk of input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// No detach; all forwardable bytes were emitted
    Pass,
    /// The sequence completed; `consumed` bytes of the chunk were examined,
    /// the rest must not be forwarded
    Detach { consumed: usize },
}

/// Inline scanner for a [`DetachSequence`]
#[derive(Debug, Clone)]
pub struct EscapeDetector {
    sequence: DetachSequence,
    state: DetectorState,
}

impl EscapeDetector {
    pub fn new(sequence: DetachSequence) -> Self {
        Self {
            sequence,
            state: DetectorState::Idle,
        }
    }

    pub fn sequence(&self) -> &DetachSequence {
        &self.sequence
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
    }

    /// Feed a single byte through the transition table
    pub fn step(&mut self, byte: u8) -> Step {
        let class = self.classify(byte);
        let (next, step) = match (self.state, class) {
            (DetectorState::Matched(k), ByteClass::Next) => self.enter(k + 1),
            (_, ByteClass::Start) => self.enter(0),
            (_, ByteClass::Other) => (DetectorState::Idle, Step::Forward(byte)),
            // Next is only produced while matching
            (DetectorState::Idle | DetectorState::Triggered, ByteClass::Next) => {
                (DetectorState::Idle, Step::Forward(byte))
            }
        };

        // Triggered is transient: report it, then start over
        self.state = match next {
            DetectorState::Triggered => DetectorState::Idle,
            other => other,
        };
        step
    }

    /// Scan a chunk, appending forwardable bytes to `out`
    pub fn scan(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Scan {
        for (i, &byte) in chunk.iter().enumerate() {
            match self.step(byte) {
                Step::Forward(b) => out.push(b),
                Step::Absorbed => {}
                Step::Detach => return Scan::Detach { consumed: i + 1 },
            }
        }
        Scan::Pass
    }

    fn classify(&self, byte: u8) -> ByteClass {
        let seq = self.sequence.as_bytes();
        if let DetectorState::Matched(k) = self.state
            && seq.get(k + 1) == Some(&byte)
        {
            return ByteClass::Next;
        }
        if seq[0] == byte {
            ByteClass::Start
        } else {
            ByteClass::Other
        }
    }

    fn enter(&self, index: usize) -> (DetectorState, Step) {
        if index + 1 == self.sequence.len() {
            (DetectorState::Triggered, Step::Detach)
        } else {
            (DetectorState::Matched(index), Step::Absorbed)
        }
    }
}
