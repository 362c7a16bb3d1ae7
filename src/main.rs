//! Margin pool simulation.
//!
//! Walks the engine through an LP deposit, option and futures trading, lazy
//! funding, a liquidation and a dated option expiry. Set `RUST_LOG=debug` to
//! see every event.

use margin_pool_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

const LP: AccountId = AccountId(1);
const ALICE: AccountId = AccountId(10);
const BOB: AccountId = AccountId(11);
const KEEPER: AccountId = AccountId(99);

fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Margin Pool Settlement Simulation");
    println!("Shared LP pool, cross margin, lazy funding\n");

    scenario_1_reference()?;
    scenario_2_funding_accrual()?;
    scenario_3_liquidation()?;
    scenario_4_expiry()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn set_prices(engine: &mut Engine, btc: Decimal, bnb: Decimal) {
    let now = engine.time();
    let oracle = engine.oracle_mut();
    oracle.set_value("BTCUSD", btc, now);
    oracle.set_value("VOL-BTCUSD", dec!(0.8), now);
    oracle.set_value("BNBUSD", bnb, now);
    oracle.set_value("CAKEUSD", dec!(2), now);
}

fn engine_with_pool(liquidity: Decimal) -> Result<Engine, EngineError> {
    let mut engine = Engine::new(EngineConfig::default())?;
    engine.set_time(Timestamp::from_secs(1_700_000_000));
    set_prices(&mut engine, dec!(60000), dec!(500));
    engine
        .swapper_mut()
        .set_rate(&AssetId::new("BNB"), &AssetId::new("BUSD"), dec!(500));
    engine.add_liquidity(LP, Quote::new(liquidity))?;
    Ok(engine)
}

/// LP funds the pool, a trader posts native collateral and buys one option.
fn scenario_1_reference() -> Result<(), EngineError> {
    println!("Scenario 1: Reference Flow\n");

    let mut engine = engine_with_pool(dec!(1000000))?;
    let call = engine.add_symbol(OptionSymbol::new("BTCUSD-60000-C", OptionParams::btc_call(dec!(60000))))?;
    println!("  LP deposits 1,000,000 BUSD, NAV {}", engine.pool().nav());

    engine.add_margin(ALICE, CollateralTransfer::Native { value: dec!(10) })?;
    println!("  Alice posts 10 BNB as margin");

    let trade = engine.trade(ALICE, &call, SignedSize::new(dec!(1)))?;
    println!(
        "  Alice buys 1 {} at {:.2}, fee {:.2}, margin ratio {:.4}",
        call, trade.settlement.trade_price, trade.settlement.fee.value(), trade.margin_ratio_after
    );

    let removal = engine.remove_liquidity(LP, dec!(10000))?;
    let solvency = engine.pool_solvency()?;
    println!(
        "  LP withdraws {} shares for {:.2}; pool ratio {:.2} (required {:.4})\n",
        removal.shares,
        removal.value.value(),
        solvency.ratio,
        solvency.required
    );
    Ok(())
}

/// Funding accrues only when someone touches the symbol.
fn scenario_2_funding_accrual() -> Result<(), EngineError> {
    println!("Scenario 2: Lazy Funding\n");

    let mut engine = engine_with_pool(dec!(1000000))?;
    let btc = engine.add_symbol(FuturesSymbol::btc_usd())?;
    engine.deposit_collateral(ALICE, &AssetId::new("BUSD"), dec!(20000))?;
    engine.deposit_collateral(BOB, &AssetId::new("BUSD"), dec!(20000))?;

    engine.trade(ALICE, &btc, SignedSize::new(dec!(2)))?;
    engine.trade(BOB, &btc, SignedSize::new(dec!(-0.5)))?;
    println!("  Alice long 2 BTC, Bob short 0.5 BTC; pool is net short 1.5");

    engine.advance_time(86_400);
    set_prices(&mut engine, dec!(60000), dec!(500));

    let alice = engine.trade(ALICE, &btc, SignedSize::zero())?;
    let bob = engine.trade(BOB, &btc, SignedSize::zero())?;
    println!("  one day later, Alice pays {:.2} funding", alice.settlement.funding.value());
    println!("  Bob receives {:.2}", bob.settlement.funding.negate().value());
    println!("  pool NAV {:.2}\n", engine.pool().nav().value());
    Ok(())
}

/// A price drop pushes a leveraged long under maintenance.
fn scenario_3_liquidation() -> Result<(), EngineError> {
    println!("Scenario 3: Liquidation\n");

    let mut engine = engine_with_pool(dec!(1000000))?;
    let btc = engine.add_symbol(FuturesSymbol::btc_usd())?;
    engine.add_margin(ALICE, CollateralTransfer::Native { value: dec!(14) })?;
    engine.trade(ALICE, &btc, SignedSize::new(dec!(0.9)))?;
    println!("  Alice posts 14 BNB and goes long 0.9 BTC at 60,000");

    set_prices(&mut engine, dec!(56000), dec!(500));
    println!("  BTC drops to 56,000: {:?}", engine.liquidation_state(ALICE)?);

    let result = engine.liquidate(KEEPER, ALICE)?;
    println!(
        "  keeper closes {} position(s), remaining {:.2}, reward {:.2}, pool gets {:.2}",
        result.closed.len(),
        result.remaining_margin.value(),
        result.reward.value(),
        result.pool_residual.value()
    );
    println!("  Alice is now {:?}\n", engine.liquidation_state(ALICE)?);
    Ok(())
}

/// Dated option settles at intrinsic once expired.
fn scenario_4_expiry() -> Result<(), EngineError> {
    println!("Scenario 4: Dated Option Expiry\n");

    let mut engine = engine_with_pool(dec!(1000000))?;
    let expires_at = engine.time().plus_secs(7 * 86_400);
    let call = engine.add_symbol(OptionSymbol::new(
        "BTCUSD-7D-58000-C",
        OptionParams::btc_call(dec!(58000)).dated(expires_at),
    ))?;
    engine.deposit_collateral(ALICE, &AssetId::new("BUSD"), dec!(20000))?;
    let trade = engine.trade(ALICE, &call, SignedSize::new(dec!(1)))?;
    println!("  Alice buys 1 call at {:.2}", trade.settlement.trade_price);

    engine.set_time(expires_at.plus_secs(60));
    set_prices(&mut engine, dec!(61000), dec!(500));
    match engine.trade(ALICE, &call, SignedSize::new(dec!(1))) {
        Err(err) => println!("  trading after expiry: {err}"),
        Ok(_) => println!("  unexpected: trade accepted after expiry"),
    }

    let settlement = engine.settle_expired(ALICE, &call)?;
    println!(
        "  settled at intrinsic {:.2}, realized {:.2}\n",
        settlement.trade_price,
        settlement.realized_pnl.value()
    );
    Ok(())
}
