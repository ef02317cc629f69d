//! Keyframe seek index.
//!
//! Two parallel sequences: the time of each video key frame in seconds and
//! the byte offset of its tag. Entries are appended in ingestion order, which
//! keeps both sequences sorted.

use crate::amf::AmfValue;

const TIMES_KEY: &str = "times";
const POSITIONS_KEY: &str = "filepositions";

/// Append-only (seconds, byte offset) index of video key frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyframeIndex {
    times: Vec<f64>,
    positions: Vec<u64>,
}

impl KeyframeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key frame at `time_secs` starting at byte `offset`.
    pub fn push(&mut self, time_secs: f64, offset: u64) {
        self.times.push(time_secs);
        self.positions.push(offset);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn positions(&self) -> &[u64] {
        &self.positions
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, u64)> + '_ {
        self.times.iter().copied().zip(self.positions.iter().copied())
    }

    /// Copy of this index with every offset shifted by `delta` bytes.
    pub fn rebased(&self, delta: u64) -> Self {
        Self {
            times: self.times.clone(),
            positions: self.positions.iter().map(|p| p + delta).collect(),
        }
    }

    /// Last entry whose time is at or before `target_ms`.
    pub fn locate(&self, target_ms: u32) -> Option<(f64, u64)> {
        let target_secs = target_ms as f64 / 1000.0;
        // Times were produced as ms / 1000; allow for float rounding.
        let count = self.times.partition_point(|t| *t <= target_secs + 1e-9);
        count
            .checked_sub(1)
            .map(|i| (self.times[i], self.positions[i]))
    }

    /// AMF form stored under `keyframes` in `onMetaData`.
    pub fn to_amf(&self) -> AmfValue {
        AmfValue::Object(vec![
            (
                TIMES_KEY.to_string(),
                AmfValue::StrictArray(self.times.iter().map(|t| AmfValue::Number(*t)).collect()),
            ),
            (
                POSITIONS_KEY.to_string(),
                AmfValue::StrictArray(
                    self.positions
                        .iter()
                        .map(|p| AmfValue::Number(*p as f64))
                        .collect(),
                ),
            ),
        ])
    }

    /// Parse the AMF form; `None` if either sequence is missing or malformed.
    pub fn from_amf(value: &AmfValue) -> Option<Self> {
        let times = numbers(value.get(TIMES_KEY)?)?;
        let positions = numbers(value.get(POSITIONS_KEY)?)?;
        if times.len() != positions.len() {
            return None;
        }
        let positions = positions
            .into_iter()
            .map(|p| (p.is_finite() && p >= 0.0).then_some(p as u64))
            .collect::<Option<Vec<_>>>()?;
        Some(Self { times, positions })
    }
}

fn numbers(value: &AmfValue) -> Option<Vec<f64>> {
    match value {
        AmfValue::StrictArray(items) => items.iter().map(AmfValue::as_number).collect(),
        _ => None,
    }
}
