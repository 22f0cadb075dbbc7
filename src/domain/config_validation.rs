//! Configuration validation.
//!
//! Validates every config key before any candle is read.

use std::str::FromStr;

use crate::domain::error::BacktestError;
use crate::domain::strategy::{PriceSource, StrategyKind};
use crate::ports::config_port::ConfigPort;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    validate_initial_capital(config)?;
    validate_commission(config)?;
    validate_position_size(config)?;
    validate_lot_quantities(config)?;
    validate_risk_free_rate(config)?;
    validate_periods_per_year(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    validate_strategy_name(config)?;
    validate_ema_periods(config)?;
    validate_price_source(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    for key in ["directory", "symbol", "interval"] {
        if let Some(value) = config.get_string("data", key) {
            if value.trim().is_empty() {
                return Err(invalid("data", key, format!("{key} must not be empty")));
            }
        }
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> BacktestError {
    BacktestError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// `Ok(None)` when the key is absent; `ConfigInvalid` when present but unparsable.
fn parse_value<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, BacktestError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(section, key, format!("'{}' is not a number", raw.trim()))),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(value) = parse_value::<f64>(config, "backtest", "initial_capital")? {
        if !value.is_finite() || value <= 0.0 {
            return Err(invalid(
                "backtest",
                "initial_capital",
                "initial_capital must be positive",
            ));
        }
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(value) = parse_value::<f64>(config, "backtest", "commission_rate")? {
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(
                "backtest",
                "commission_rate",
                "commission_rate must be non-negative",
            ));
        }
    }
    Ok(())
}

fn validate_position_size(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(value) = parse_value::<f64>(config, "backtest", "position_size_fraction")? {
        if !value.is_finite() || value <= 0.0 || value > 1.0 {
            return Err(invalid(
                "backtest",
                "position_size_fraction",
                "position_size_fraction must be in (0, 1]",
            ));
        }
    }
    Ok(())
}

fn validate_lot_quantities(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    for key in ["fixed_lot_quantity", "exit_lot_quantity"] {
        if let Some(value) = parse_value::<f64>(config, "backtest", key)? {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid("backtest", key, format!("{key} must be positive")));
            }
        }
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(value) = parse_value::<f64>(config, "backtest", "risk_free_rate")? {
        if !(0.0..1.0).contains(&value) {
            return Err(invalid(
                "backtest",
                "risk_free_rate",
                "risk_free_rate must be between 0 and 1",
            ));
        }
    }
    Ok(())
}

fn validate_periods_per_year(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(value) = parse_value::<f64>(config, "backtest", "periods_per_year")? {
        if !value.is_finite() || value <= 0.0 {
            return Err(invalid(
                "backtest",
                "periods_per_year",
                "periods_per_year must be positive",
            ));
        }
    }
    Ok(())
}

fn validate_strategy_name(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(name) = config.get_string("strategy", "name") {
        name.parse::<StrategyKind>()
            .map_err(|reason| invalid("strategy", "name", reason))?;
    }
    Ok(())
}

fn validate_ema_periods(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    let fast = parse_value::<i64>(config, "strategy", "fast_period")?.unwrap_or(9);
    let slow = parse_value::<i64>(config, "strategy", "slow_period")?.unwrap_or(21);

    if fast < 1 {
        return Err(invalid(
            "strategy",
            "fast_period",
            "fast_period must be at least 1",
        ));
    }
    if slow < 1 {
        return Err(invalid(
            "strategy",
            "slow_period",
            "slow_period must be at least 1",
        ));
    }
    if fast >= slow {
        return Err(invalid(
            "strategy",
            "fast_period",
            format!("fast_period ({fast}) must be less than slow_period ({slow})"),
        ));
    }
    Ok(())
}

fn validate_price_source(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(source) = config.get_string("strategy", "price_source") {
        source
            .parse::<PriceSource>()
            .map_err(|reason| invalid("strategy", "price_source", reason))?;
    }
    Ok(())
}
