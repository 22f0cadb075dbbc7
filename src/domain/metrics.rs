//! Performance metrics and statistics.

use super::backtest::BacktestResult;
use super::equity::EquityPoint;
use super::lot::ClosedTrade;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of bars spent below a prior equity peak.
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_holding_hours: f64,
}

impl Metrics {
    /// Trade statistics use pnl net of commission.
    pub fn compute(result: &BacktestResult, risk_free_rate: f64, periods_per_year: f64) -> Self {
        Self::from_parts(
            &result.equity_curve,
            &result.trades,
            result.summary.initial_capital,
            risk_free_rate,
            periods_per_year,
        )
    }

    pub fn from_parts(
        equity_curve: &[EquityPoint],
        trades: &[ClosedTrade],
        initial_capital: f64,
        risk_free_rate: f64,
        periods_per_year: f64,
    ) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let years = equity_curve.len() as f64 / periods_per_year;
        let annualized_return = if years > 0.0 && total_return.is_finite() && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);

        let period_rf = risk_free_rate / periods_per_year;
        let (sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(equity_curve, period_rf, periods_per_year);

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_holding_secs = 0i64;

        for trade in trades {
            let pnl = trade.net_pnl();
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
            total_holding_secs += trade.holding_time().num_seconds();
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            trades_won as f64 / total_trades as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if trades_won > 0 {
            total_wins / trades_won as f64
        } else {
            0.0
        };

        let avg_loss = if trades_lost > 0 {
            total_losses / trades_lost as f64
        } else {
            0.0
        };

        let avg_holding_hours = if total_trades > 0 {
            total_holding_secs as f64 / 3600.0 / total_trades as f64
        } else {
            0.0
        };

        Metrics {
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            profit_factor,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            avg_holding_hours,
        }
    }
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(
    equity_curve: &[EquityPoint],
    period_rf: f64,
    periods_per_year: f64,
) -> (f64, f64) {
    if equity_curve.len() < 2 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                (w[1].equity - prev) / prev
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let excess_return = mean - period_rf;
    let annualizer = periods_per_year.sqrt();

    let sharpe = if stddev > 0.0 {
        excess_return / stddev * annualizer
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < period_rf)
        .map(|&r| (r - period_rf).powi(2))
        .sum();
    let downside_stddev = (downside / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        excess_return / downside_stddev * annualizer
    } else {
        0.0
    };

    (sharpe, sortino)
}
