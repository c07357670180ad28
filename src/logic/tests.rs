use super::*;
use crate::config::{DeploymentConfig, RouterConfig};
use crate::error::RouterError;
use crate::external::{FixedPriceOracle, OracleExchange};
use crate::strategies::{MockStrategy, StrategyError, StrategyState};
use crate::utils::{MAX_AMOUNT, MathError, PRECISION, Token, mul_div, parse_amount, parse_config, parse_uniform};
use alloy_primitives::{Address, U256};
use std::sync::Arc;

const OWNER: Address = Address::new([0xaa; 20]);
const FEE: Address = Address::new([0xfe; 20]);
const ALICE: Address = Address::new([0xa1; 20]);
const BOB: Address = Address::new([0xb0; 20]);
const UNLOCKER: Address = Address::new([0x0c; 20]);

const USDC: Address = Address::new([0x01; 20]);
const BUSD: Address = Address::new([0x02; 20]);
const USDT: Address = Address::new([0x03; 20]);

struct Fixture {
    router: StrategyRouter,
    exchange: Arc<OracleExchange>,
}

fn tokens() -> Vec<Token> {
    vec![
        Token::new_with_data(USDC, Some("USDC".to_string()), None, Some(18)),
        Token::new_with_data(BUSD, Some("BUSD".to_string()), None, Some(8)),
        Token::new_with_data(USDT, Some("USDT".to_string()), None, Some(6)),
    ]
}

fn config() -> RouterConfig {
    RouterConfig::default().with_owner(OWNER).with_cycle_duration(0).with_fee(2000, FEE)
}

fn fixture_with(config: RouterConfig, strategies: Vec<(MockStrategy, u64)>) -> Fixture {
    fixture_with_fee(config, strategies, 0)
}

fn fixture_with_fee(config: RouterConfig, strategies: Vec<(MockStrategy, u64)>, fee_bps: u64) -> Fixture {
    let oracle = Arc::new(FixedPriceOracle::new());
    oracle.set_price(USDC, parse_uniform("1").unwrap(), 18);
    oracle.set_price(BUSD, parse_uniform("1.01").unwrap(), 18);
    oracle.set_price(USDT, parse_uniform("0.99").unwrap(), 18);
    let exchange = Arc::new(OracleExchange::with_tokens(oracle.clone(), fee_bps, &tokens()));

    let mut builder = StrategyRouterBuilder::new().with_config(config).with_oracle(oracle).with_exchange(exchange.clone());
    for token in tokens() {
        builder = builder.with_token(token);
    }
    for (strategy, weight) in strategies {
        builder = builder.with_strategy(Box::new(strategy), weight);
    }
    Fixture { router: builder.build().unwrap(), exchange }
}

fn fixture() -> Fixture {
    fixture_with(
        config(),
        vec![
            (MockStrategy::new(Address::new([0x10; 20]), BUSD), 5000),
            (MockStrategy::new(Address::new([0x11; 20]), USDC), 3000),
            (MockStrategy::new(Address::new([0x12; 20]), USDT), 2000),
        ],
    )
}

fn usdc(value: &str) -> U256 {
    parse_amount(value, 18).unwrap()
}

fn busd(value: &str) -> U256 {
    parse_amount(value, 8).unwrap()
}

fn usdt(value: &str) -> U256 {
    parse_amount(value, 6).unwrap()
}

fn usd(value: &str) -> U256 {
    parse_uniform(value).unwrap()
}

fn assert_close(actual: U256, expected: U256, tolerance_bps: u64) {
    let diff = if actual > expected { actual - expected } else { expected - actual };
    assert!(
        diff * U256::from(10_000u64) <= expected * U256::from(tolerance_bps),
        "{actual} is not within {tolerance_bps} bps of {expected}"
    );
}

#[test]
fn test_deposit_reaches_strategies() -> eyre::Result<()> {
    let f = fixture();
    let id = f.router.deposit_to_batch(ALICE, BUSD, busd("100"))?;
    assert_eq!(id, 1);
    assert_eq!(f.router.get_batch_value()?.total, usd("101"));

    f.router.deposit_to_strategies(ALICE)?;
    let strategies = f.router.get_strategies_value()?;
    assert_close(strategies.total, usd("100"), 200);
    assert_eq!(f.router.current_cycle(), 1);

    let shares = f.router.unlock_shares(ALICE, &[id])?;
    assert_eq!(f.router.shares_balance_of(ALICE), shares);
    assert_close(f.router.shares_to_usd(f.router.total_shares())?, strategies.total, 1);
    Ok(())
}

#[test]
fn test_withdraw_from_batching_returns_exact_amount() -> eyre::Result<()> {
    let f = fixture();
    let amount = usdt("123.456789");
    let id = f.router.deposit_to_batch(ALICE, USDT, amount)?;

    let payout = f.router.withdraw_from_batching(ALICE, &[id], USDT, &[MAX_AMOUNT])?;
    assert_eq!(payout, amount);
    assert!(f.router.get_batch_value()?.balances.is_empty());
    assert!(matches!(f.router.get_receipt(id), Err(RouterError::ReceiptNotFound(_))));
    Ok(())
}

#[test]
fn test_partial_batch_withdrawal_keeps_receipt() -> eyre::Result<()> {
    let f = fixture();
    let id = f.router.deposit_to_batch(ALICE, USDC, usdc("100"))?;

    assert_eq!(f.router.withdraw_from_batching(ALICE, &[id], USDC, &[usdc("40")])?, usdc("40"));
    let receipt = f.router.get_receipt(id)?;
    assert_eq!(receipt.amount, usdc("60"));
    assert_eq!(receipt.initial_amount, usdc("100"));

    assert!(matches!(
        f.router.withdraw_from_batching(ALICE, &[id], USDC, &[usdc("61")]),
        Err(RouterError::InsufficientBalance { .. })
    ));
    assert!(matches!(
        f.router.withdraw_from_batching(ALICE, &[id], USDC, &[]),
        Err(RouterError::LengthMismatch { left: 1, right: 0 })
    ));
    assert!(matches!(
        f.router.withdraw_from_batching(BOB, &[id], USDC, &[MAX_AMOUNT]),
        Err(RouterError::Unauthorized { .. })
    ));
    Ok(())
}

#[test]
fn test_batch_withdrawal_after_rebalance_uses_other_tokens() -> eyre::Result<()> {
    let f = fixture();
    let id = f.router.deposit_to_batch(ALICE, BUSD, busd("100"))?;
    let report = f.router.rebalance_batching(OWNER)?;
    assert_eq!(report.swaps, 2);

    let payout = f.router.withdraw_from_batching(ALICE, &[id], BUSD, &[MAX_AMOUNT])?;
    assert_close(payout, busd("100"), 1);
    Ok(())
}

#[test]
fn test_unlock_then_withdraw_shares_matches_direct_withdraw() -> eyre::Result<()> {
    let unlocked = fixture();
    let direct = fixture();
    for f in [&unlocked, &direct] {
        f.router.deposit_to_batch(ALICE, USDC, usdc("1000"))?;
        f.router.deposit_to_strategies(ALICE)?;
    }

    unlocked.router.unlock_shares(ALICE, &[1])?;
    let via_shares = unlocked.router.withdraw_shares(ALICE, MAX_AMOUNT, USDC)?;
    let via_receipt = direct.router.withdraw_from_strategies(ALICE, &[1], USDC, MAX_AMOUNT)?;

    assert_eq!(via_shares, via_receipt);
    assert_close(via_receipt, usdc("1000"), 100);
    assert_eq!(direct.router.total_shares(), U256::ZERO);
    Ok(())
}

#[test]
fn test_withdraw_universal_matches_sequential() -> eyre::Result<()> {
    let universal = fixture();
    let sequential = fixture();
    for f in [&universal, &sequential] {
        f.router.deposit_to_batch(ALICE, USDC, usdc("1000"))?;
        f.router.deposit_to_strategies(ALICE)?;
        f.router.deposit_to_batch(ALICE, BUSD, busd("500"))?;
    }

    let combined = universal.router.withdraw_universal(ALICE, &[2], &[1], USDT, &[MAX_AMOUNT], MAX_AMOUNT)?;
    let from_batch = sequential.router.withdraw_from_batching(ALICE, &[2], USDT, &[MAX_AMOUNT])?;
    let from_strategies = sequential.router.withdraw_from_strategies(ALICE, &[1], USDT, MAX_AMOUNT)?;

    assert_eq!(combined, from_batch + from_strategies);
    assert_eq!(universal.router.get_strategies_value()?, sequential.router.get_strategies_value()?);
    assert_eq!(universal.router.get_batch_value()?, sequential.router.get_batch_value()?);
    assert_eq!(universal.router.total_shares(), sequential.router.total_shares());
    Ok(())
}

#[test]
fn test_remove_strategy_then_rebalance_preserves_value() -> eyre::Result<()> {
    let f = fixture();
    f.router.deposit_to_batch(ALICE, USDC, usdc("1000"))?;
    f.router.deposit_to_strategies(ALICE)?;
    let before = f.router.get_strategies_value()?.total;

    let removed = f.router.remove_strategy(OWNER, 0)?;
    let info = f.router.strategy_info(removed)?;
    assert_eq!(info.state, StrategyState::Removed);
    assert_eq!(info.tokens, U256::ZERO);

    // the last strategy took the freed index
    let strategies = f.router.view_strategies();
    assert_eq!(strategies.len(), 2);
    assert_eq!(strategies[0].token, USDT);

    let after = f.router.rebalance_strategies(OWNER)?;
    assert_close(after.total, before, 1);
    assert_close(after.values[0].1, mul_div(after.total, U256::from(2), U256::from(5))?, 10);
    Ok(())
}

#[test]
fn test_remove_strategy_errors() {
    let f = fixture_with(config(), vec![(MockStrategy::new(Address::new([0x10; 20]), USDC), 100)]);
    assert!(matches!(f.router.remove_strategy(OWNER, 3), Err(RouterError::InvalidIndex { index: 3, len: 1 })));
    assert!(matches!(f.router.remove_strategy(OWNER, 0), Err(RouterError::CannotRemoveLastStrategy)));
    assert!(matches!(f.router.remove_strategy(ALICE, 0), Err(RouterError::Unauthorized { .. })));
}

#[test]
fn test_receipts_credit_shares_proportionally() -> eyre::Result<()> {
    let f = fixture();
    let a = f.router.deposit_to_batch(ALICE, BUSD, busd("10000"))?;
    let b = f.router.deposit_to_batch(BOB, BUSD, busd("20000"))?;
    f.router.deposit_to_strategies(OWNER)?;

    f.router.set_unlocker(OWNER, UNLOCKER, true)?;
    f.router.unlock_shares_from_receipts(UNLOCKER, &[a, b])?;

    let alice = f.router.shares_balance_of(ALICE);
    let bob = f.router.shares_balance_of(BOB);
    assert!(!alice.is_zero());
    let doubled = alice * U256::from(2);
    let diff = if bob > doubled { bob - doubled } else { doubled - bob };
    assert!(diff <= U256::from(1), "bob {bob} vs alice {alice}");
    Ok(())
}

#[test]
fn test_unlock_authorization() -> eyre::Result<()> {
    let f = fixture();
    let id = f.router.deposit_to_batch(ALICE, USDC, usdc("100"))?;
    f.router.deposit_to_strategies(OWNER)?;

    assert!(matches!(f.router.unlock_shares_from_receipts(BOB, &[id]), Err(RouterError::Unauthorized { .. })));

    // unlockers may only use the receipt-based entry point
    f.router.set_unlocker(OWNER, UNLOCKER, true)?;
    assert!(matches!(f.router.unlock_shares(UNLOCKER, &[id]), Err(RouterError::Unauthorized { .. })));
    assert!(f.router.get_receipt(id).is_ok());

    assert!(f.router.set_unlocker(ALICE, BOB, true).is_err());
    Ok(())
}

#[test]
fn test_processed_state_of_receipts() -> eyre::Result<()> {
    let f = fixture();
    let id = f.router.deposit_to_batch(ALICE, USDC, usdc("100"))?;
    assert!(matches!(f.router.unlock_shares(ALICE, &[id]), Err(RouterError::ReceiptNotProcessed(_))));
    assert!(matches!(f.router.receipts_to_shares(&[id]), Err(RouterError::ReceiptNotProcessed(_))));

    f.router.deposit_to_strategies(OWNER)?;
    assert!(matches!(
        f.router.withdraw_from_batching(ALICE, &[id], USDC, &[MAX_AMOUNT]),
        Err(RouterError::ReceiptAlreadyProcessed(_))
    ));

    let expected = f.router.receipts_to_shares(&[id])?;
    assert_eq!(f.router.unlock_shares(ALICE, &[id])?, expected);
    assert!(matches!(f.router.unlock_shares(ALICE, &[id]), Err(RouterError::ReceiptNotFound(_))));
    assert!(f.router.receipts_of(ALICE).is_empty());
    Ok(())
}

#[test]
fn test_cross_withdraw_from_batching() -> eyre::Result<()> {
    let f = fixture();
    let a = f.router.deposit_to_batch(ALICE, USDC, usdc("1000"))?;
    f.router.deposit_to_strategies(OWNER)?;
    f.router.unlock_shares(ALICE, &[a])?;
    let b = f.router.deposit_to_batch(BOB, USDC, usdc("500"))?;

    let strategies_before = f.router.get_strategies_value()?.total;
    let shares = f.router.shares_balance_of(ALICE) / U256::from(5);
    let expected = f.router.shares_to_usd(shares)?;

    let payout = f.router.cross_withdraw_shares(ALICE, shares, USDC)?;
    assert_eq!(payout, expected);
    assert_eq!(f.router.get_strategies_value()?.total, strategies_before);
    assert_eq!(f.router.router_pool_shares(), shares);
    assert_eq!(f.router.cycle_info(1).unwrap().shares_bought, shares);

    f.router.deposit_to_strategies(OWNER)?;
    f.router.unlock_shares(BOB, &[b])?;
    assert_close(f.router.shares_to_usd(f.router.shares_balance_of(BOB))?, usd("500"), 100);
    assert_close(f.router.shares_to_usd(f.router.shares_balance_of(ALICE))?, usd("800"), 100);
    Ok(())
}

#[test]
fn test_cross_withdraw_from_strategies() -> eyre::Result<()> {
    let f = fixture();
    let a = f.router.deposit_to_batch(ALICE, USDC, usdc("1000"))?;
    f.router.deposit_to_strategies(OWNER)?;
    f.router.unlock_shares(ALICE, &[a])?;
    let shares_before = f.router.total_shares();

    let b = f.router.deposit_to_batch(BOB, USDT, usdt("300"))?;
    let payout = f.router.cross_withdraw_from_strategies(BOB, &[b], USDT, &[MAX_AMOUNT])?;
    assert_close(payout, usdt("300"), 100);
    assert!(f.router.get_receipt(b).is_err());
    assert_eq!(f.router.get_batch_value()?.balances, vec![(USDT, usdt("300"), usd("297"))]);

    // the orphaned batch funds return to existing holders at close
    f.router.deposit_to_strategies(OWNER)?;
    assert_eq!(f.router.total_shares(), shares_before);
    assert_close(f.router.shares_to_usd(f.router.shares_balance_of(ALICE))?, usd("1000"), 100);
    Ok(())
}

#[test]
fn test_receipt_paid_from_strategies_takes_back_bought_shares() -> eyre::Result<()> {
    let f = fixture();
    let a = f.router.deposit_to_batch(ALICE, USDC, usdc("1000"))?;
    f.router.deposit_to_strategies(OWNER)?;
    f.router.unlock_shares(ALICE, &[a])?;
    let pool_before = f.router.router_pool_shares();
    let b = f.router.deposit_to_batch(BOB, USDC, usdc("500"))?;

    let shares = f.router.shares_balance_of(ALICE) / U256::from(5);
    assert_close(f.router.cross_withdraw_shares(ALICE, shares, USDC)?, usdc("200"), 1);
    assert_close(f.router.cross_withdraw_from_strategies(BOB, &[b], USDC, &[MAX_AMOUNT])?, usdc("500"), 1);

    // the pool shares bought with Bob's funds left with his receipt
    assert_eq!(f.router.router_pool_shares(), pool_before);
    assert_eq!(f.router.cycle_info(1).unwrap().shares_bought, U256::ZERO);
    assert_close(f.router.shares_to_usd(f.router.shares_balance_of(ALICE))?, usd("800"), 1);

    assert_close(f.router.withdraw_shares(ALICE, MAX_AMOUNT, USDC)?, usdc("800"), 1);
    assert_eq!(f.router.total_shares(), pool_before);
    assert!(f.router.get_batch_value()?.total < usd("0.01"));
    Ok(())
}

#[test]
fn test_cross_withdraw_shares_tops_up_from_strategies() -> eyre::Result<()> {
    let f = fixture();
    let a = f.router.deposit_to_batch(ALICE, USDC, usdc("1000"))?;
    f.router.deposit_to_strategies(OWNER)?;
    f.router.unlock_shares(ALICE, &[a])?;
    let b = f.router.deposit_to_batch(BOB, USDC, usdc("500"))?;

    let shares = f.router.shares_balance_of(ALICE) * U256::from(4) / U256::from(5);
    assert_close(f.router.cross_withdraw_shares(ALICE, shares, USDC)?, usdc("800"), 1);
    assert!(f.router.get_batch_value()?.balances.is_empty());
    assert_close(f.router.get_strategies_value()?.total, usd("700"), 1);

    // only what the batch paid is bought for the cycle's depositors
    let bought = f.router.cycle_info(1).unwrap().shares_bought;
    assert_close(bought, mul_div(shares, U256::from(5), U256::from(8))?, 1);
    assert_close(f.router.shares_to_usd(f.router.shares_balance_of(ALICE))?, usd("200"), 1);

    let c = f.router.deposit_to_batch(BOB, USDC, usdc("100"))?;
    f.router.deposit_to_strategies(OWNER)?;
    f.router.unlock_shares(BOB, &[b, c])?;
    assert_close(f.router.shares_to_usd(f.router.shares_balance_of(BOB))?, usd("600"), 1);
    assert_close(f.router.shares_to_usd(f.router.shares_balance_of(ALICE))?, usd("200"), 1);
    Ok(())
}

#[test]
fn test_cross_withdraw_from_strategies_tops_up_from_batch() -> eyre::Result<()> {
    let f = fixture();
    let a = f.router.deposit_to_batch(ALICE, USDC, usdc("100"))?;
    f.router.deposit_to_strategies(OWNER)?;
    f.router.unlock_shares(ALICE, &[a])?;

    let b = f.router.deposit_to_batch(BOB, USDT, usdt("300"))?;
    assert_close(f.router.cross_withdraw_from_strategies(BOB, &[b], USDT, &[MAX_AMOUNT])?, usdt("300"), 1);
    assert_eq!(f.router.get_strategies_value()?.total, U256::ZERO);

    // the batch funds Bob left behind now back Alice's shares
    assert_close(f.router.get_batch_value()?.total, usd("100"), 1);
    assert_close(f.router.shares_to_usd(f.router.shares_balance_of(ALICE))?, usd("100"), 1);

    assert_close(f.router.withdraw_shares(ALICE, MAX_AMOUNT, USDT)?, usdt("101.010101"), 1);
    assert!(f.router.get_batch_value()?.total < usd("0.01"));
    Ok(())
}

#[test]
fn test_batch_receipts_share_rebalance_swap_fees() -> eyre::Result<()> {
    let f = fixture_with_fee(
        config(),
        vec![
            (MockStrategy::new(Address::new([0x10; 20]), BUSD), 50),
            (MockStrategy::new(Address::new([0x11; 20]), USDC), 50),
        ],
        30,
    );
    let a = f.router.deposit_to_batch(ALICE, BUSD, busd("1000"))?;
    let b = f.router.deposit_to_batch(BOB, BUSD, busd("1000"))?;

    // half of the 2020 USD batch pays a 0.3% swap fee
    f.router.rebalance_batching(OWNER)?;
    assert_eq!(f.router.get_batch_value()?.total, usd("2016.97"));

    assert_eq!(f.router.withdraw_from_batching(ALICE, &[a], BUSD, &[MAX_AMOUNT])?, busd("998.5"));
    assert_close(f.router.withdraw_from_batching(BOB, &[b], USDC, &[MAX_AMOUNT])?, usdc("1008.485"), 1);
    assert!(f.router.get_batch_value()?.total < usd("0.01"));
    Ok(())
}

#[test]
fn test_oversized_deposit_is_rejected() {
    let f = fixture();
    let huge = U256::from(1) << 250usize;
    assert!(matches!(f.router.deposit_to_batch(ALICE, USDT, huge), Err(RouterError::Math(MathError::Overflow(_)))));
    assert!(matches!(f.router.deposit_to_batch(ALICE, USDC, huge), Err(RouterError::Math(_))));
    assert!(f.router.receipts_of(ALICE).is_empty());
}

#[test]
fn test_withdraw_universal_shares_include_receipts() -> eyre::Result<()> {
    let f = fixture();
    let a = f.router.deposit_to_batch(ALICE, USDC, usdc("100"))?;
    f.router.deposit_to_strategies(OWNER)?;

    assert!(matches!(
        f.router.withdraw_universal(ALICE, &[], &[a], USDC, &[], U256::ZERO),
        Err(RouterError::InvalidParameter { name: "shares", .. })
    ));
    assert!(f.router.get_receipt(a).is_ok());

    let unlocked = f.router.receipts_to_shares(&[a])?;
    let half = unlocked / U256::from(2);
    f.router.withdraw_universal(ALICE, &[], &[a], USDC, &[], half)?;
    assert_eq!(f.router.shares_balance_of(ALICE), unlocked - half);
    Ok(())
}

#[test]
fn test_rebalance_batching_skips_dust() -> eyre::Result<()> {
    let f = fixture_with(config(), vec![(MockStrategy::new(Address::new([0x10; 20]), USDC), 100)]);
    f.router.deposit_to_batch(ALICE, USDC, usdc("100"))?;
    f.router.deposit_to_batch(BOB, USDT, usdt("0.001"))?;

    let report = f.router.rebalance_batching(OWNER)?;
    assert_eq!(report.swaps, 0);
    assert_eq!(f.exchange.swaps_executed(), 0);
    assert_eq!(report.allocations.len(), 1);
    assert_eq!(report.allocations[0].1, usdc("100"));
    assert!(report.balances.contains(&(USDT, usdt("0.001"))));
    Ok(())
}

#[test]
fn test_rebalance_batching_is_idempotent() -> eyre::Result<()> {
    let f = fixture();
    f.router.deposit_to_batch(ALICE, BUSD, busd("1000"))?;

    let first = f.router.rebalance_batching(OWNER)?;
    assert_eq!(first.swaps, 2);
    let swaps = f.exchange.swaps_executed();

    let second = f.router.rebalance_batching(OWNER)?;
    assert_eq!(second.swaps, 0);
    assert_eq!(f.exchange.swaps_executed(), swaps);
    assert_eq!(second.balances, first.balances);
    assert_close(second.total_before, first.total_before, 1);
    Ok(())
}

#[test]
fn test_rebalance_requires_funds_and_owner() {
    let f = fixture();
    assert!(matches!(f.router.rebalance_batching(OWNER), Err(RouterError::NothingToRebalance)));
    assert!(matches!(f.router.rebalance_strategies(OWNER), Err(RouterError::NothingToRebalance)));
    assert!(matches!(f.router.rebalance_batching(ALICE), Err(RouterError::Unauthorized { .. })));
}

#[test]
fn test_failing_strategy_leaves_state_untouched() -> eyre::Result<()> {
    let f = fixture();
    let mut paused = MockStrategy::new(Address::new([0x13; 20]), USDC);
    paused.paused = true;
    f.router.add_strategy(OWNER, Box::new(paused), USDC, 1000)?;
    let id = f.router.deposit_to_batch(ALICE, USDC, usdc("100"))?;
    f.router.take_events();

    let result = f.router.deposit_to_strategies(OWNER);
    assert!(matches!(result, Err(RouterError::Strategy(StrategyError::Paused(_)))));

    assert_eq!(f.router.current_cycle(), 0);
    assert_eq!(f.router.get_batch_value()?.total, usd("100"));
    assert_eq!(f.router.get_strategies_value()?.total, U256::ZERO);
    assert_eq!(f.router.get_receipt(id)?.amount, usdc("100"));
    assert_eq!(f.router.total_shares(), U256::ZERO);
    assert!(f.router.take_events().is_empty());
    Ok(())
}

#[test]
fn test_performance_fee_shares() -> eyre::Result<()> {
    let strategy = MockStrategy::new(Address::new([0x10; 20]), USDC).with_profit_bps(1000);
    let f = fixture_with(config(), vec![(strategy, 100)]);

    let a = f.router.deposit_to_batch(ALICE, USDC, usdc("100"))?;
    f.router.deposit_to_strategies(OWNER)?;
    assert_eq!(f.router.unlock_shares(ALICE, &[a])?, usd("100"));

    f.router.deposit_to_batch(BOB, USDC, usdc("10"))?;
    let settlement = f.router.deposit_to_strategies(OWNER)?;

    // 10% yield on 100, 20% of it as fee
    let fee_shares = mul_div(usd("2"), usd("100"), usd("108"))?;
    assert_eq!(settlement.fee_shares, fee_shares);
    assert_eq!(f.router.shares_balance_of(FEE), fee_shares);
    assert_close(f.router.shares_to_usd(fee_shares)?, usd("2"), 1);
    assert_close(f.router.shares_to_usd(usd("100"))?, usd("108"), 1);
    Ok(())
}

#[test]
fn test_compound_all_charges_fee() -> eyre::Result<()> {
    let strategy = MockStrategy::new(Address::new([0x10; 20]), USDC).with_profit_bps(500);
    let f = fixture_with(config(), vec![(strategy, 100)]);
    let a = f.router.deposit_to_batch(ALICE, USDC, usdc("100"))?;
    f.router.deposit_to_strategies(OWNER)?;
    f.router.unlock_shares(ALICE, &[a])?;

    let (gain, fee_shares) = f.router.compound_all(OWNER)?;
    assert_eq!(gain, usd("5"));
    assert_eq!(fee_shares, mul_div(usd("1"), usd("100"), usd("104"))?);
    assert!(matches!(f.router.compound_all(ALICE), Err(RouterError::Unauthorized { .. })));
    Ok(())
}

#[test]
fn test_cycle_gating_and_minimum() -> eyre::Result<()> {
    let f = fixture_with(config().with_cycle_duration(3600), vec![(MockStrategy::new(Address::new([0x10; 20]), USDC), 1)]);
    assert!(matches!(f.router.deposit_to_strategies(OWNER), Err(RouterError::BelowMinimum { .. })));

    f.router.deposit_to_batch(ALICE, USDC, usdc("0.5"))?;
    assert!(matches!(f.router.deposit_to_strategies(OWNER), Err(RouterError::BelowMinimum { .. })));

    f.router.deposit_to_batch(ALICE, USDC, usdc("10"))?;
    assert!(matches!(
        f.router.deposit_to_strategies(OWNER),
        Err(RouterError::CycleNotElapsed { cycle_id: 0, remaining_secs: 3600 })
    ));

    f.router.advance_time(1800);
    assert!(matches!(
        f.router.deposit_to_strategies(OWNER),
        Err(RouterError::CycleNotElapsed { remaining_secs: 1800, .. })
    ));

    f.router.advance_time(1800);
    f.router.deposit_to_strategies(BOB)?;
    assert_eq!(f.router.current_cycle(), 1);
    assert_eq!(f.router.cycle_info(1).unwrap().started_at, 3600);
    assert!(f.router.cycle_info(0).unwrap().is_closed());
    Ok(())
}

#[test]
fn test_deposit_validation() -> eyre::Result<()> {
    let f = fixture();
    let dai = Address::new([0x04; 20]);
    assert!(matches!(f.router.deposit_to_batch(ALICE, dai, usdc("100")), Err(RouterError::UnsupportedToken(_))));
    assert!(matches!(f.router.deposit_to_batch(ALICE, USDC, U256::from(1)), Err(RouterError::BelowMinimum { .. })));
    assert!(matches!(f.router.deposit_to_batch(ALICE, USDC, U256::ZERO), Err(RouterError::BelowMinimum { .. })));

    f.router.deposit_to_batch(ALICE, USDC, usdc("1"))?;
    let events = f.router.take_events();
    assert_eq!(events.len(), 1);
    assert_eq!(RouterEventKind::from(&events[0]), RouterEventKind::Deposit);
    Ok(())
}

#[test]
fn test_supported_token_management() -> eyre::Result<()> {
    let f = fixture();
    let dai = Token::new_with_data(Address::new([0x04; 20]), Some("DAI".to_string()), None, Some(18));

    assert!(matches!(f.router.set_supported_token(OWNER, Token::new(USDC), false), Err(RouterError::TokenInUse(_))));
    f.router.set_supported_token(OWNER, dai.clone(), true)?;
    assert_eq!(f.router.supported_tokens().len(), 4);

    f.router.set_supported_token(OWNER, dai.clone(), false)?;
    assert!(!f.router.supported_tokens().contains(&dai));
    assert!(matches!(f.router.set_supported_token(ALICE, dai, true), Err(RouterError::Unauthorized { .. })));
    Ok(())
}

#[test]
fn test_share_and_receipt_transfers() -> eyre::Result<()> {
    let f = fixture();
    let a = f.router.deposit_to_batch(ALICE, USDC, usdc("100"))?;
    f.router.transfer_receipt(ALICE, a, BOB)?;
    assert_eq!(f.router.receipts_of(BOB), vec![a]);

    f.router.deposit_to_strategies(OWNER)?;
    let shares = f.router.unlock_shares(BOB, &[a])?;
    f.router.transfer_shares(BOB, ALICE, shares / U256::from(2))?;
    assert_eq!(f.router.shares_balance_of(ALICE) + f.router.shares_balance_of(BOB), shares);

    assert!(matches!(
        f.router.withdraw_shares(ALICE, shares, USDC),
        Err(RouterError::InsufficientBalance { .. })
    ));
    Ok(())
}

#[test]
fn test_add_strategy_validation() {
    let f = fixture();
    let strategy = MockStrategy::new(Address::new([0x20; 20]), USDC);
    assert!(matches!(
        f.router.add_strategy(OWNER, Box::new(strategy.clone()), USDT, 100),
        Err(RouterError::StrategyTokenMismatch { .. })
    ));
    assert!(matches!(
        f.router.add_strategy(OWNER, Box::new(MockStrategy::new(Address::new([0x10; 20]), BUSD)), BUSD, 100),
        Err(RouterError::DuplicateStrategy(_))
    ));
    assert!(matches!(f.router.add_strategy(ALICE, Box::new(strategy), USDC, 100), Err(RouterError::Unauthorized { .. })));
}

#[test]
fn test_update_config() -> eyre::Result<()> {
    let f = fixture();
    let updated = config().with_cycle_duration(60);
    f.router.update_config(OWNER, updated.clone())?;
    assert_eq!(f.router.config(), updated);

    let invalid = config().with_fee(20_000, FEE);
    assert!(matches!(f.router.update_config(OWNER, invalid), Err(RouterError::InvalidParameter { .. })));
    assert_eq!(f.router.config().cycle_duration_secs, 60);
    Ok(())
}

#[test]
fn test_router_from_deployment() -> eyre::Result<()> {
    let deployment: DeploymentConfig = parse_config(
        r#"
[router]
owner = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
cycle_duration_secs = 0

[[tokens]]
address = "0x0202020202020202020202020202020202020202"
symbol = "BUSD"
decimals = 8
price = "1.01"

[[strategies]]
weight = 1

[strategies.strategy]
type = "MockStrategy"
address = "0x1010101010101010101010101010101010101010"
token = "0x0202020202020202020202020202020202020202"
"#,
    )?;
    let router = StrategyRouterBuilder::from_deployment(deployment)?.build()?;
    assert_eq!(router.view_strategies().len(), 1);

    let id = router.deposit_to_batch(ALICE, BUSD, busd("10"))?;
    router.deposit_to_strategies(OWNER)?;
    assert_eq!(router.unlock_shares(ALICE, &[id])?, usd("10.1"));
    assert_eq!(router.price_per_share()?, PRECISION);
    Ok(())
}

#[test]
fn test_builder_requires_oracle() {
    assert!(matches!(StrategyRouterBuilder::new().build(), Err(RouterError::InvalidParameter { name: "oracle", .. })));
}
