//! Strategy registry and crossover parameters.

use std::fmt;
use std::str::FromStr;

use super::error::BacktestError;
use super::signal::validate_periods;

/// Registered strategy families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    EmaCrossover,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 1] = [StrategyKind::EmaCrossover];

    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::EmaCrossover => "ema_crossover",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| format!("unknown strategy '{}'", s.trim()))
    }
}

/// Which close series drives the signal, lot prices and marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceSource {
    #[default]
    Raw,
    Derived,
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceSource::Raw => write!(f, "raw"),
            PriceSource::Derived => write!(f, "derived"),
        }
    }
}

impl FromStr for PriceSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raw" => Ok(PriceSource::Raw),
            "derived" | "heikin_ashi" | "ha" => Ok(PriceSource::Derived),
            other => Err(format!(
                "unknown price source '{other}' (expected raw or derived)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub kind: StrategyKind,
    pub fast_period: usize,
    pub slow_period: usize,
    pub price_source: PriceSource,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy {
            kind: StrategyKind::EmaCrossover,
            fast_period: 9,
            slow_period: 21,
            price_source: PriceSource::Raw,
        }
    }
}

impl Strategy {
    pub fn validate(&self) -> Result<(), BacktestError> {
        validate_periods(self.fast_period, self.slow_period)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({},{}) on {} closes",
            self.kind, self.fast_period, self.slow_period, self.price_source
        )
    }
}
