// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Temporal notes and the window/scale results built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::error::{validate_score, JudgmentError};

/// Coherence reported for a scale with no windows.
///
/// Zero means "no evidence of coherence"; callers should check
/// [`ScaleResult::status`] before interpreting the value.
pub const COHERENCE_UNDEFINED: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Salience {
    High,
    #[default]
    Normal,
}

/// A timestamped observation produced by an external note pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalNote {
    pub timestamp: DateTime<Utc>,

    /// Milliseconds since the start of the note stream
    #[serde(default)]
    pub elapsed_ms: u64,

    pub score: f64,

    #[serde(default)]
    pub observation: Option<String>,

    #[serde(default)]
    pub salience: Salience,
}

impl TemporalNote {
    pub fn new(timestamp: DateTime<Utc>, elapsed_ms: u64, score: f64) -> Result<Self, JudgmentError> {
        validate_score(score, "note score")?;
        Ok(Self {
            timestamp,
            elapsed_ms,
            score,
            observation: None,
            salience: Salience::Normal,
        })
    }

    pub fn with_observation(mut self, observation: impl Into<String>) -> Self {
        self.observation = Some(observation.into());
        self
    }

    pub fn with_salience(mut self, salience: Salience) -> Self {
        self.salience = salience;
        self
    }

    pub fn validate(&self) -> Result<(), JudgmentError> {
        validate_score(self.score, "note score")
    }

    /// Parse a note from JSON, reporting missing or malformed fields as invalid input
    pub fn from_json(value: serde_json::Value) -> Result<Self, JudgmentError> {
        let note: TemporalNote = serde_json::from_value(value)
            .map_err(|e| JudgmentError::InvalidInput(format!("malformed temporal note: {}", e)))?;
        note.validate()?;
        Ok(note)
    }
}

/// Validated, append-only collection of notes for one observation session
#[derive(Debug, Clone, Default)]
pub struct TemporalNoteStream {
    started_at: Option<DateTime<Utc>>,
    notes: Vec<TemporalNote>,
}

impl TemporalNoteStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_temporal_note(&mut self, note: TemporalNote) -> Result<(), JudgmentError> {
        note.validate()?;
        if self.started_at.is_none() {
            self.started_at = Some(note.timestamp);
        }
        self.notes.push(note);
        Ok(())
    }

    /// Record an observation, deriving `elapsed_ms` from the first note's timestamp
    pub fn observe(
        &mut self,
        timestamp: DateTime<Utc>,
        score: f64,
        observation: Option<String>,
        salience: Salience,
    ) -> Result<(), JudgmentError> {
        let started_at = *self.started_at.get_or_insert(timestamp);
        let elapsed_ms = (timestamp - started_at).num_milliseconds().max(0) as u64;
        let mut note = TemporalNote::new(timestamp, elapsed_ms, score)?.with_salience(salience);
        note.observation = observation;
        self.add_temporal_note(note)
    }

    pub fn notes(&self) -> &[TemporalNote] {
        &self.notes
    }

    pub fn into_notes(self) -> Vec<TemporalNote> {
        self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

/// Fixed time bucket of notes at one aggregation scale.
///
/// `start_time` is inclusive and `end_time` exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub notes: Vec<TemporalNote>,
    /// Decay-weighted mean score
    pub avg_score: f64,
    pub raw_count: usize,
}

impl Window {
    /// Observation text of all member notes, in time order
    pub fn observation_text(&self) -> String {
        self.notes
            .iter()
            .filter_map(|n| n.observation.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceStatus {
    /// No windows; coherence holds [`COHERENCE_UNDEFINED`]
    Undefined,
    /// One window; coherence uses intra-window metrics and a neutral direction
    SingleWindow,
    Complete,
}

/// Individual coherence sub-metrics, each in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceBreakdown {
    pub direction: f64,
    pub variance: f64,
    /// Absent when no note carries observation text
    pub observation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleResult {
    pub scale: String,
    pub window_ms: u64,
    pub windows: Vec<Window>,
    pub coherence: f64,
    pub breakdown: CoherenceBreakdown,
    pub status: CoherenceStatus,
}

impl ScaleResult {
    pub(crate) fn empty(scale: impl Into<String>, window_ms: u64) -> Self {
        Self {
            scale: scale.into(),
            window_ms,
            windows: Vec::new(),
            coherence: COHERENCE_UNDEFINED,
            breakdown: CoherenceBreakdown {
                direction: 0.0,
                variance: 0.0,
                observation: None,
            },
            status: CoherenceStatus::Undefined,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn note_count(&self) -> usize {
        self.windows.iter().map(|w| w.raw_count).sum()
    }

    /// Compact summary for prompt builders
    pub fn digest(&self) -> ScaleDigest {
        let scores: Vec<f64> = self.windows.iter().map(|w| w.avg_score).collect();
        let first_score = scores.first().copied();
        let last_score = scores.last().copied();
        ScaleDigest {
            scale: self.scale.clone(),
            window_count: self.windows.len(),
            note_count: self.note_count(),
            first_score,
            last_score,
            mean_score: if scores.is_empty() {
                None
            } else {
                Some(scores.iter().sum::<f64>() / scores.len() as f64)
            },
            net_change: match (first_score, last_score) {
                (Some(first), Some(last)) => Some(last - first),
                _ => None,
            },
            coherence: self.coherence,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleDigest {
    pub scale: String,
    pub window_count: usize,
    pub note_count: usize,
    pub first_score: Option<f64>,
    pub last_score: Option<f64>,
    pub mean_score: Option<f64>,
    pub net_change: Option<f64>,
    pub coherence: f64,
    pub status: CoherenceStatus,
}

/// Independent partitions of one note stream, keyed by scale name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiScaleResult {
    pub scales: BTreeMap<String, ScaleResult>,
}

impl MultiScaleResult {
    pub fn get(&self, scale: &str) -> Option<&ScaleResult> {
        self.scales.get(scale)
    }

    pub fn digests(&self) -> Vec<ScaleDigest> {
        self.scales.values().map(ScaleResult::digest).collect()
    }
}
