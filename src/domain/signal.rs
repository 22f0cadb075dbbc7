//! Fast/slow EMA crossover detection.
//!
//! Each bar is classified by sign(fast - slow). An event fires when the
//! class differs from the previous bar's and the new class is directional:
//! entering Bullish is an Entry, entering Bearish is an Exit. Moving into
//! Flat never fires, and bar 0 has no predecessor so it never fires either.

use std::fmt;

use chrono::NaiveDateTime;

use super::error::BacktestError;
use super::indicator::ema::calculate_ema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    Bullish,
    Bearish,
    Flat,
}

impl SignalState {
    pub fn classify(fast: f64, slow: f64) -> Self {
        if fast > slow {
            SignalState::Bullish
        } else if fast < slow {
            SignalState::Bearish
        } else {
            SignalState::Flat
        }
    }
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalState::Bullish => write!(f, "bullish"),
            SignalState::Bearish => write!(f, "bearish"),
            SignalState::Flat => write!(f, "flat"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossoverKind {
    Entry,
    Exit,
}

impl fmt::Display for CrossoverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrossoverKind::Entry => write!(f, "entry"),
            CrossoverKind::Exit => write!(f, "exit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossoverEvent {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub kind: CrossoverKind,
}

/// Averages, per-bar states and the events derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSeries {
    pub fast: Vec<f64>,
    pub slow: Vec<f64>,
    pub states: Vec<SignalState>,
    pub events: Vec<CrossoverEvent>,
}

impl SignalSeries {
    /// The event fired on bar `index`, if any.
    pub fn event_at(&self, index: usize) -> Option<CrossoverKind> {
        self.events
            .binary_search_by_key(&index, |e| e.index)
            .ok()
            .map(|pos| self.events[pos].kind)
    }
}

pub fn validate_periods(fast_period: usize, slow_period: usize) -> Result<(), BacktestError> {
    if fast_period == 0 {
        return Err(BacktestError::parameter("fast_period", "must be at least 1"));
    }
    if slow_period == 0 {
        return Err(BacktestError::parameter("slow_period", "must be at least 1"));
    }
    if fast_period >= slow_period {
        return Err(BacktestError::parameter(
            "fast_period",
            format!("must be less than slow_period ({fast_period} >= {slow_period})"),
        ));
    }
    Ok(())
}

pub fn detect_crossovers(
    timestamps: &[NaiveDateTime],
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
) -> Result<SignalSeries, BacktestError> {
    validate_periods(fast_period, slow_period)?;
    if timestamps.len() != prices.len() {
        return Err(BacktestError::InvalidInput {
            index: None,
            reason: format!(
                "{} timestamps for {} prices",
                timestamps.len(),
                prices.len()
            ),
        });
    }

    let fast = calculate_ema(prices, fast_period)?;
    let slow = calculate_ema(prices, slow_period)?;

    let states: Vec<SignalState> = fast
        .iter()
        .zip(&slow)
        .map(|(&f, &s)| SignalState::classify(f, s))
        .collect();

    let events = states
        .windows(2)
        .enumerate()
        .filter_map(|(i, pair)| {
            let kind = match (pair[0], pair[1]) {
                (prev, SignalState::Bullish) if prev != SignalState::Bullish => {
                    CrossoverKind::Entry
                }
                (prev, SignalState::Bearish) if prev != SignalState::Bearish => {
                    CrossoverKind::Exit
                }
                _ => return None,
            };
            Some(CrossoverEvent {
                index: i + 1,
                timestamp: timestamps[i + 1],
                kind,
            })
        })
        .collect();

    Ok(SignalSeries {
        fast,
        slow,
        states,
        events,
    })
}
