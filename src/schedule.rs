//! Coinjoin schedule projection
//!
//! jmwalletd reports a running scheduler as a list of 7-element arrays:
//!
//! ```text
//! [mixdepth, amount_fraction, counterparties, destination, wait_minutes, rounding, completion]
//! [1, 0.5748023323401029, 9, "INTERNAL", 59.15, 16, 0]
//! ```
//!
//! `destination` is an address or `"INTERNAL"` (next mixdepth of the same
//! wallet). `completion` is `0` until the transaction is seen, then its txid,
//! then `1` once confirmed.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};

/// Lower bound of a step's width, in percentage points
pub const MIN_STEP_WIDTH_PERCENT: f64 = 10.0;

const INTERNAL_DESTINATION: &str = "INTERNAL";

#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    /// An address from the wallet's next mixdepth
    Internal,
    Address(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Pending,
    /// Seen on the network, not yet confirmed
    Broadcast(String),
    Confirmed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTransaction {
    pub mixdepth: u32,
    /// Share of the mixdepth to spend; `0` means sweep
    pub amount_fraction: f64,
    pub counterparties: u32,
    pub destination: Destination,
    pub wait_minutes: f64,
    /// Significant figures the amount is rounded to (16 = no rounding)
    pub rounding: u32,
    pub completion: Completion,
}

impl ScheduledTransaction {
    pub fn is_completed(&self) -> bool {
        matches!(self.completion, Completion::Confirmed)
    }
}

type RawEntry = (u32, f64, u32, String, f64, u32, serde_json::Value);

impl<'de> Deserialize<'de> for ScheduledTransaction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (mixdepth, amount_fraction, counterparties, destination, wait_minutes, rounding, flag): RawEntry =
            Deserialize::deserialize(deserializer)?;

        let destination = if destination == INTERNAL_DESTINATION {
            Destination::Internal
        } else {
            Destination::Address(destination)
        };

        let completion = match flag {
            serde_json::Value::Number(n) if n.as_u64() == Some(1) => Completion::Confirmed,
            serde_json::Value::Number(n) if n.as_u64() == Some(0) => Completion::Pending,
            serde_json::Value::String(txid) => Completion::Broadcast(txid),
            other => {
                return Err(de::Error::custom(format!(
                    "invalid completion flag: {}",
                    other
                )))
            }
        };

        Ok(Self {
            mixdepth,
            amount_fraction,
            counterparties,
            destination,
            wait_minutes,
            rounding,
            completion,
        })
    }
}

impl Serialize for ScheduledTransaction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(7)?;
        tuple.serialize_element(&self.mixdepth)?;
        tuple.serialize_element(&self.amount_fraction)?;
        tuple.serialize_element(&self.counterparties)?;
        match &self.destination {
            Destination::Internal => tuple.serialize_element(INTERNAL_DESTINATION)?,
            Destination::Address(address) => tuple.serialize_element(address)?,
        }
        tuple.serialize_element(&self.wait_minutes)?;
        tuple.serialize_element(&self.rounding)?;
        match &self.completion {
            Completion::Pending => tuple.serialize_element(&0u8)?,
            Completion::Broadcast(txid) => tuple.serialize_element(txid)?,
            Completion::Confirmed => tuple.serialize_element(&1u8)?,
        }
        tuple.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepState {
    Complete,
    Active,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressStep {
    pub width_percent: f64,
    pub state: StepState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressModel {
    pub total_wait_seconds: f64,
    pub completed_count: usize,
    pub steps: Vec<ProgressStep>,
}

/// How the progress banner phrases the remaining wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationSummary {
    Seconds(u64),
    Hours(u64),
}

impl ProgressModel {
    pub fn duration_summary(&self) -> DurationSummary {
        let hours = (self.total_wait_seconds / 3600.0).ceil() as u64;
        if hours <= 1 {
            DurationSummary::Seconds(self.total_wait_seconds.ceil() as u64)
        } else {
            DurationSummary::Hours(hours)
        }
    }

    /// Index of the step currently being worked on, if any remain
    pub fn active_index(&self) -> Option<usize> {
        (self.completed_count < self.steps.len()).then_some(self.completed_count)
    }
}

/// Project a schedule into a progress model
///
/// Widths are proportional to each entry's wait time and floored at
/// [`MIN_STEP_WIDTH_PERCENT`]; floors are not renormalized, so the sum may
/// exceed 100. With zero total wait every step gets the floor.
pub fn project_schedule(schedule: &[ScheduledTransaction]) -> ProgressModel {
    let completed_count = schedule.iter().filter(|tx| tx.is_completed()).count();
    let total_wait_seconds: f64 = schedule.iter().map(|tx| tx.wait_minutes * 60.0).sum();

    let steps = schedule
        .iter()
        .enumerate()
        .map(|(i, tx)| {
            let width_percent = if total_wait_seconds > 0.0 {
                let raw = (tx.wait_minutes * 60.0 / total_wait_seconds) * 100.0;
                raw.max(MIN_STEP_WIDTH_PERCENT)
            } else {
                MIN_STEP_WIDTH_PERCENT
            };
            let state = if i < completed_count {
                StepState::Complete
            } else if i == completed_count {
                StepState::Active
            } else {
                StepState::Pending
            };
            ProgressStep {
                width_percent,
                state,
            }
        })
        .collect();

    ProgressModel {
        total_wait_seconds,
        completed_count,
        steps,
    }
}
