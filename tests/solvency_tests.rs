//! Solvency invariant tests.
//!
//! These tests verify invariants that must hold for the pool to stay whole
//! under arbitrary sequences of trades, price moves and LP exits.

use margin_pool_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const T0: i64 = 1_700_000_000;
const LP: AccountId = AccountId(1);

fn busd() -> AssetId {
    AssetId::new("BUSD")
}

fn set_btc(engine: &mut Engine, btc: Decimal) {
    let now = engine.time();
    engine.oracle_mut().set_value("BTCUSD", btc, now);
}

fn futures_engine(liquidity: Decimal, traders: &[AccountId], margin: Decimal) -> (Engine, SymbolId) {
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    engine.set_time(Timestamp::from_secs(T0));
    set_btc(&mut engine, dec!(60000));
    engine.add_liquidity(LP, Quote::new(liquidity)).unwrap();
    let btc = engine.add_symbol(FuturesSymbol::btc_usd()).unwrap();
    for &trader in traders {
        engine.deposit_collateral(trader, &busd(), margin).unwrap();
    }
    (engine, btc)
}

// pool NAV, accrued protocol fee and every trader's base balance
fn total_value(engine: &Engine) -> Decimal {
    let traders: Decimal = engine
        .accounts()
        .map(|(_, account)| account.balance(&busd()))
        .sum();
    engine.pool().nav().value() + engine.pool().protocol_fee_accrued.value() + traders
}

fn volume_strategy() -> impl Strategy<Value = Decimal> {
    (-100i64..=100i64).prop_map(|x| Decimal::new(x, 2)) // -1.00 to 1.00 BTC
}

fn price_strategy() -> impl Strategy<Value = Decimal> {
    (55_000i64..65_000i64).prop_map(Decimal::from)
}

proptest! {
    /// Value only moves between traders, the pool and the protocol.
    #[test]
    fn value_is_conserved(
        steps in proptest::collection::vec((0usize..3, volume_strategy(), price_strategy(), 0i64..7200), 1..25),
    ) {
        let traders = [AccountId(10), AccountId(11), AccountId(12)];
        let (mut engine, btc) = futures_engine(dec!(1_000_000), &traders, dec!(50000));
        let initial = total_value(&engine);

        for (who, volume, price, elapsed) in steps {
            engine.advance_time(elapsed);
            set_btc(&mut engine, price);
            let _ = engine.trade(traders[who], &btc, SignedSize::new(volume));
            let drift = (total_value(&engine) - initial).abs();
            prop_assert!(drift < dec!(0.000001), "value drifted by {}", drift);
        }
    }

    /// A rejected trade changes nothing.
    #[test]
    fn rejected_trades_leave_state_untouched(
        margin in 100i64..5000i64,
        volume in 1i64..50i64,
    ) {
        let trader = AccountId(10);
        let (mut engine, btc) = futures_engine(dec!(1_000_000), &[trader], Decimal::from(margin));
        let nav = engine.pool().nav();
        let events = engine.events().len();

        // at least 6,000 of initial margin per BTC
        let result = engine.trade(trader, &btc, SignedSize::new(Decimal::from(volume)));
        prop_assert!(matches!(result, Err(EngineError::MarginCheckFailed { .. })), "expected MarginCheckFailed, got {:?}", result);
        prop_assert_eq!(engine.pool().nav(), nav);
        prop_assert_eq!(engine.events().len(), events);
        prop_assert_eq!(engine.account(trader).unwrap().balance(&busd()), Decimal::from(margin));
        prop_assert!(!engine.symbols().has_positions(trader));
    }

    /// Funding is one per-unit index: longs pay exactly what shorts and the
    /// pool receive.
    #[test]
    fn funding_is_symmetric(
        long in 1i64..100i64,
        short in 1i64..100i64,
        elapsed in 60i64..172_800i64,
    ) {
        let (alice, bob) = (AccountId(10), AccountId(11));
        let (mut engine, btc) = futures_engine(dec!(1_000_000), &[alice, bob], dec!(100000));
        engine.trade(alice, &btc, SignedSize::new(Decimal::new(long, 2))).unwrap();
        engine.trade(bob, &btc, SignedSize::new(-Decimal::new(short, 2))).unwrap();

        engine.advance_time(elapsed);
        set_btc(&mut engine, dec!(60000));
        let nav = engine.pool().nav();

        let paid_long = engine.trade(alice, &btc, SignedSize::zero()).unwrap().settlement.funding;
        let paid_short = engine.trade(bob, &btc, SignedSize::zero()).unwrap().settlement.funding;

        let per_long = paid_long.value() / Decimal::new(long, 2);
        let per_short = -paid_short.value() / Decimal::new(short, 2);
        prop_assert!((per_long - per_short).abs() < dec!(0.000001));

        let pool_gain = engine.pool().nav().sub(nav).value();
        prop_assert!((pool_gain - paid_long.add(paid_short).value()).abs() < dec!(0.000001));
    }

    /// With prices held still, nothing the engine accepts leaves the pool
    /// below its floors.
    #[test]
    fn accepted_operations_keep_pool_solvent(
        ops in proptest::collection::vec((any::<bool>(), 0usize..3, volume_strategy(), 1i64..20_000i64), 1..30),
    ) {
        let traders = [AccountId(10), AccountId(11), AccountId(12)];
        let (mut engine, btc) = futures_engine(dec!(50000), &traders, dec!(100000));

        for (is_trade, who, volume, shares) in ops {
            let accepted = if is_trade {
                engine.trade(traders[who], &btc, SignedSize::new(volume)).is_ok()
            } else {
                engine.remove_liquidity(LP, Decimal::from(shares)).is_ok()
            };
            if accepted {
                let solvency = engine.pool_solvency().unwrap();
                prop_assert!(solvency.is_solvent(), "ratio {} below {}", solvency.ratio, solvency.required);
            }
        }
    }
}
