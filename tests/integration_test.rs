//! Engine-level integration tests.
//!
//! Tests cover:
//! - Reference scenarios: flat prices, a single rise and fall, exits with nothing open,
//!   partial FIFO closes
//! - FIFO conservation and equity continuity over whole runs
//! - Run independence and determinism
//! - Generated candle series via proptest

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use kline_backtester::domain::backtest::{run_backtest, BacktestConfig, BacktestResult, BarAction};
use kline_backtester::domain::error::BacktestError;
use kline_backtester::domain::heikin_ashi::{derive_candles, HeikinAshi};
use kline_backtester::domain::ledger::{PositionLedger, PositionState};
use kline_backtester::domain::lot::LotId;
use kline_backtester::domain::signal::CrossoverKind;
use kline_backtester::domain::strategy::{PriceSource, Strategy};
use std::collections::HashMap;

fn issued_lots(result: &BacktestResult) -> Vec<u64> {
    result
        .bars
        .iter()
        .filter(|b| b.action == BarAction::Opened)
        .map(|b| b.lot_label.parse().unwrap())
        .collect()
}

fn assert_conservation(result: &BacktestResult) {
    let mut matched: HashMap<u64, f64> = HashMap::new();
    for t in &result.trades {
        *matched.entry(t.lot_id.0).or_default() += t.matched_quantity;
    }
    for id in issued_lots(result) {
        let open: f64 = result
            .open_lots
            .iter()
            .filter(|l| l.id.0 == id)
            .map(|l| l.quantity)
            .sum();
        let closed = matched.get(&id).copied().unwrap_or(0.0);
        assert_abs_diff_eq!(open + closed, result.lot_quantity, epsilon = 1e-9);
    }
}

fn assert_equity_continuity(result: &BacktestResult, last_price: f64) {
    let realized: f64 = result.trades.iter().map(|t| t.realized_pnl).sum();
    let unrealized: f64 = result
        .open_lots
        .iter()
        .map(|l| l.quantity * (last_price - l.entry_price))
        .sum();
    let expected = result.summary.initial_capital + realized - result.summary.total_commission
        + unrealized;
    assert_abs_diff_eq!(result.summary.final_equity, expected, epsilon = 1e-6);
    assert_abs_diff_eq!(
        result.equity_curve.last().unwrap().equity,
        result.summary.final_equity,
        epsilon = 1e-12
    );
}

mod reference_scenarios {
    use super::*;

    #[test]
    fn constant_close_gives_no_trades_and_flat_equity() {
        let candles = candles_from_closes(&[250.0; 60]);
        for source in [PriceSource::Raw, PriceSource::Derived] {
            let strategy = Strategy {
                price_source: source,
                ..Strategy::default()
            };
            let result = run_backtest(&candles, &strategy, &fixed_config(1.0)).unwrap();

            assert!(result.signals.events.is_empty());
            assert!(result.trades.is_empty());
            assert!(result.open_lots.is_empty());
            assert!(result.equity_curve.iter().all(|p| p.equity == 100_000.0));
            assert_eq!(result.summary.return_pct, 0.0);
        }
    }

    #[test]
    fn rise_then_fall_yields_one_profitable_trade() {
        let closes = rise_then_fall(30, 30, 100.0, 1.0);
        let candles = candles_from_closes(&closes);
        let strategy = Strategy {
            fast_period: 9,
            slow_period: 21,
            ..Strategy::default()
        };
        let result = run_backtest(&candles, &strategy, &fixed_config(1.0)).unwrap();

        let kinds: Vec<CrossoverKind> = result.signals.events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![CrossoverKind::Entry, CrossoverKind::Exit]);

        let exit = result.signals.events[1];
        assert!(exit.index >= 30, "exit at bar {} precedes the peak", exit.index);

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.lot_id, LotId(1));
        assert!(trade.realized_pnl > 0.0);
        assert_eq!(result.bars.last().unwrap().position, PositionState::Flat);
    }

    #[test]
    fn exit_with_nothing_open_is_a_no_op() {
        let mut ledger = PositionLedger::new(1.0, 1.0, 0.0).unwrap();
        let trades = ledger.exit(100.0, hour(0)).unwrap();

        assert!(trades.is_empty());
        assert!(ledger.closed_trades().is_empty());
        assert!(!ledger.has_open_lots());
        assert_eq!(ledger.state(), PositionState::Flat);
    }

    #[test]
    fn falling_series_never_opens_lots() {
        let closes: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
        let result = run_backtest(
            &candles_from_closes(&closes),
            &Strategy::default(),
            &fixed_config(1.0),
        )
        .unwrap();

        assert!(issued_lots(&result).is_empty());
        assert!(result.trades.is_empty());
        assert!(result.bars.iter().all(|b| b.action != BarAction::Opened));
    }

    #[test]
    fn half_lot_exits_close_in_two_steps() {
        let mut ledger = PositionLedger::new(2.0, 1.0, 0.0).unwrap();
        let id = ledger.enter(100.0, hour(0));

        let first = ledger.exit(110.0, hour(1)).unwrap().to_vec();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].lot_id, id);
        assert_abs_diff_eq!(first[0].matched_quantity, 1.0);

        let residual: Vec<_> = ledger.open_lots().cloned().collect();
        assert_eq!(residual.len(), 1);
        assert_eq!(residual[0].id, id);
        assert_abs_diff_eq!(residual[0].quantity, 1.0);
        assert_eq!(residual[0].entry_price, 100.0);
        assert_eq!(residual[0].entry_timestamp, hour(0));

        let second = ledger.exit(120.0, hour(2)).unwrap().to_vec();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].lot_id, id);
        assert_abs_diff_eq!(second[0].realized_pnl, 20.0);
        assert!(!ledger.has_open_lots());
        assert!(ledger.verify_conservation().is_ok());
    }

    #[test]
    fn residual_lot_keeps_fifo_priority_across_runs_of_signals() {
        let closes = zigzag(4, 30, 100.0, 1.0);
        let config = BacktestConfig {
            fixed_lot_quantity: Some(1.0),
            exit_lot_quantity: Some(0.5),
            ..BacktestConfig::default()
        };
        let result =
            run_backtest(&candles_from_closes(&closes), &Strategy::default(), &config).unwrap();

        assert_eq!(issued_lots(&result), vec![1, 2]);
        assert_eq!(result.trades.len(), 2);
        assert!(result.trades.iter().all(|t| t.lot_id == LotId(1)));
        assert_eq!(result.open_lots.len(), 1);
        assert_eq!(result.open_lots[0].id, LotId(2));
        assert_abs_diff_eq!(result.open_lots[0].quantity, 1.0);
        assert_conservation(&result);
    }
}

mod accounting {
    use super::*;

    #[test]
    fn conservation_and_continuity_over_zigzag() {
        let closes = zigzag(6, 25, 500.0, 3.0);
        let candles = candles_from_closes(&closes);
        let config = BacktestConfig {
            fixed_lot_quantity: Some(2.0),
            exit_lot_quantity: Some(3.0),
            commission_rate: 0.001,
            ..BacktestConfig::default()
        };
        let result = run_backtest(&candles, &Strategy::default(), &config).unwrap();

        assert!(!result.trades.is_empty());
        assert_conservation(&result);
        assert_equity_continuity(&result, *closes.last().unwrap());
    }

    #[test]
    fn trades_ordered_by_exit_time() {
        let closes = zigzag(8, 20, 300.0, 2.0);
        let config = BacktestConfig {
            fixed_lot_quantity: Some(1.0),
            exit_lot_quantity: Some(0.4),
            ..BacktestConfig::default()
        };
        let result =
            run_backtest(&candles_from_closes(&closes), &Strategy::default(), &config).unwrap();

        assert!(
            result
                .trades
                .windows(2)
                .all(|w| w[0].exit_timestamp <= w[1].exit_timestamp)
        );
    }

    #[test]
    fn fraction_sizing_uses_first_price() {
        let closes = rise_then_fall(30, 30, 100.0, 1.0);
        let config = BacktestConfig {
            initial_capital: 10_000.0,
            position_size_fraction: 0.5,
            ..BacktestConfig::default()
        };
        let result =
            run_backtest(&candles_from_closes(&closes), &Strategy::default(), &config).unwrap();

        assert_abs_diff_eq!(result.lot_quantity, 50.0);
        assert_abs_diff_eq!(result.exit_quantity, 50.0);
        assert_abs_diff_eq!(result.trades[0].matched_quantity, 50.0);
    }

    #[test]
    fn commission_charged_on_both_sides() {
        let closes = rise_then_fall(30, 30, 100.0, 1.0);
        let candles = candles_from_closes(&closes);
        let gross = run_backtest(&candles, &Strategy::default(), &fixed_config(1.0)).unwrap();
        let config = BacktestConfig {
            commission_rate: 0.01,
            ..fixed_config(1.0)
        };
        let net = run_backtest(&candles, &Strategy::default(), &config).unwrap();

        let trade = &net.trades[0];
        let expected = 0.01 * (trade.entry_price + trade.exit_price);
        assert_abs_diff_eq!(trade.commission, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(net.summary.total_commission, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(
            net.summary.final_equity,
            gross.summary.final_equity - expected,
            epsilon = 1e-9
        );
        assert_eq!(trade.realized_pnl, gross.trades[0].realized_pnl);
    }
}

mod run_independence {
    use super::*;

    #[test]
    fn repeated_runs_are_bit_identical() {
        let closes = zigzag(5, 17, 123.45, 1.7);
        let candles = candles_from_closes(&closes);
        let strategy = Strategy {
            price_source: PriceSource::Derived,
            ..Strategy::default()
        };
        let config = BacktestConfig {
            exit_lot_quantity: Some(0.3),
            ..fixed_config(1.0)
        };

        let a = run_backtest(&candles, &strategy, &config).unwrap();
        let b = run_backtest(&candles, &strategy, &config).unwrap();
        assert_eq!(a.trades, b.trades);
        assert_eq!(a.equity_curve, b.equity_curve);
    }

    #[test]
    fn earlier_run_does_not_leak_into_later_run() {
        let busy = candles_from_closes(&zigzag(6, 20, 100.0, 1.0));
        let flat = candles_from_closes(&[100.0; 30]);

        let _ = run_backtest(&busy, &Strategy::default(), &fixed_config(1.0)).unwrap();
        let result = run_backtest(&flat, &Strategy::default(), &fixed_config(1.0)).unwrap();

        assert!(result.trades.is_empty());
        assert!(result.open_lots.is_empty());
    }

    #[test]
    fn failed_run_returns_no_result() {
        let mut candles = candles_from_closes(&rise_then_fall(10, 10, 100.0, 1.0));
        candles[5].timestamp = candles[4].timestamp;
        let err = run_backtest(&candles, &Strategy::default(), &fixed_config(1.0)).unwrap_err();
        assert!(matches!(err, BacktestError::InvalidInput { index: Some(5), .. }));
    }
}

mod derived_candles {
    use super::*;

    #[test]
    fn incremental_extension_matches_full_recompute() {
        let candles = candles_from_closes(&zigzag(3, 10, 50.0, 0.7));
        let full = derive_candles(&candles).unwrap();

        let head = derive_candles(&candles[..12]).unwrap();
        let last = head.last().unwrap();
        let mut builder = HeikinAshi::resume(last.open, last.close);
        let tail: Vec<_> = candles[12..].iter().map(|c| builder.next(c)).collect();

        assert_eq!(&full[..12], &head[..]);
        assert_eq!(&full[12..], &tail[..]);
    }
}

mod properties {
    use super::*;
    use proptest::prelude::{any, prop, prop_assert, prop_assert_eq, proptest, Just};
    use proptest::strategy::Strategy as _;

    fn arb_candles() -> impl proptest::strategy::Strategy<Value = Vec<Candle>> {
        prop::collection::vec((1.0f64..1000.0, 0.0f64..0.05, 0.0f64..0.05), 1..150).prop_map(
            |rows| {
                rows.into_iter()
                    .enumerate()
                    .map(|(i, (close, up, down))| Candle {
                        timestamp: hour(i),
                        open: close * (1.0 + up - down),
                        high: close * (1.0 + up) + close * 0.01,
                        low: close * (1.0 - down) - close * 0.005,
                        close,
                    })
                    .collect()
            },
        )
    }

    fn arb_periods() -> impl proptest::strategy::Strategy<Value = (usize, usize)> {
        (1usize..10).prop_flat_map(|fast| (Just(fast), fast + 1..30))
    }

    proptest! {
        #[test]
        fn output_lengths_match_input(
            candles in arb_candles(),
            (fast, slow) in arb_periods(),
            derived in any::<bool>(),
        ) {
            let strategy = Strategy {
                fast_period: fast,
                slow_period: slow,
                price_source: if derived { PriceSource::Derived } else { PriceSource::Raw },
                ..Default::default()
            };
            let result = run_backtest(&candles, &strategy, &fixed_config(1.0)).unwrap();
            prop_assert_eq!(result.derived.len(), candles.len());
            prop_assert_eq!(result.equity_curve.len(), candles.len());
            prop_assert_eq!(result.bars.len(), candles.len());
        }

        #[test]
        fn derived_open_recurrence_holds(candles in arb_candles()) {
            let d = derive_candles(&candles).unwrap();
            prop_assert_eq!(d[0].open, (candles[0].open + candles[0].close) / 2.0);
            for i in 1..d.len() {
                prop_assert_eq!(d[i].open, (d[i - 1].open + d[i - 1].close) / 2.0);
                prop_assert!(d[i].high >= d[i].open && d[i].high >= d[i].close);
                prop_assert!(d[i].low <= d[i].open && d[i].low <= d[i].close);
            }
        }

        #[test]
        fn lots_conserved_and_equity_continuous(
            candles in arb_candles(),
            (fast, slow) in arb_periods(),
            exit_quantity in 0.1f64..3.0,
            commission_rate in 0.0f64..0.01,
        ) {
            let strategy = Strategy {
                fast_period: fast,
                slow_period: slow,
                ..Default::default()
            };
            let config = BacktestConfig {
                fixed_lot_quantity: Some(1.0),
                exit_lot_quantity: Some(exit_quantity),
                commission_rate,
                ..BacktestConfig::default()
            };
            let result = run_backtest(&candles, &strategy, &config).unwrap();
            assert_conservation(&result);
            assert_equity_continuity(&result, candles[candles.len() - 1].close);
            prop_assert!(result.open_lots.iter().all(|l| l.quantity > 0.0));
        }
    }
}
