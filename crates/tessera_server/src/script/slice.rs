//! Instruction slice arithmetic.

use super::ThreadPriority;

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn balance_bounds(base: u64) -> (i64, i64) {
    let base = base.min(i64::MAX as u64) as i64;
    (-(base / 2), base)
}

/// Slice granted to a thread this tick.
///
/// Base scaled by priority (×2 High, ÷2 Low), plus the carried balance
/// clamped to `[-base/2, base]`. Never less than 1.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn instruction_slice(base: u64, priority: ThreadPriority, balance: i64) -> u64 {
    let scaled = match priority {
        ThreadPriority::High => base.saturating_mul(2),
        ThreadPriority::Normal => base,
        ThreadPriority::Low => base / 2,
    };
    let (lo, hi) = balance_bounds(base);
    let slice = (scaled.min(i64::MAX as u64) as i64).saturating_add(balance.clamp(lo, hi));
    slice.max(1) as u64
}

/// Balance carried into the next tick after executing `executed` of
/// `granted` instructions.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn next_balance(base: u64, granted: u64, executed: u64) -> i64 {
    let (lo, hi) = balance_bounds(base);
    let diff = i128::from(granted) - i128::from(executed);
    diff.clamp(i128::from(lo), i128::from(hi)) as i64
}
