//! Order-completion verification: a bounded poll loop with an optional
//! cancel-on-timeout fallback.
//!
//! The decision logic is a pure function of the order and the poll count,
//! so it tests without real delays; the engine injects a [`Clock`] for the
//! 1-second sleeps.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::exchange::Exchange;
use crate::order::Order;

/// Maximum number of status polls before giving up on an order.
pub const POLL_BUDGET: u32 = 60;
/// Delay between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Time source and sleep, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// What the verification loop should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextAction {
    /// Sleep one interval and fetch the order again.
    Poll,
    /// Poll budget exhausted: attempt a cancel, then stop.
    Cancel,
    /// The order reached a terminal status (or the budget ran out on an
    /// order we let keep filling).
    Done,
}

/// Decide the next verification step for `order` after `polls_used` polls.
pub fn next_action(
    order: &Order,
    polls_used: u32,
    budget: u32,
    cancel_on_timeout: bool,
) -> NextAction {
    if order.has_ended() {
        NextAction::Done
    } else if polls_used >= budget {
        if cancel_on_timeout {
            NextAction::Cancel
        } else {
            NextAction::Done
        }
    } else {
        NextAction::Poll
    }
}

/// Drive `order` to completion: poll once per interval until it ends or
/// the budget runs out.
///
/// On timeout, cancellation is attempted at most once; its failure is
/// logged, not retried. A failed status fetch consumes a poll and the
/// loop continues — there is no backoff at this layer.
pub fn verify_order<E: Exchange + ?Sized>(
    exchange: &E,
    clock: &dyn Clock,
    mut order: Order,
    budget: u32,
    interval: Duration,
    cancel_on_timeout: bool,
    source: &str,
) -> Order {
    let mut polls_used = 0u32;
    loop {
        match next_action(&order, polls_used, budget, cancel_on_timeout) {
            NextAction::Done => return order,
            NextAction::Cancel => {
                warn!(
                    "order {} on {} not ended after {} polls, cancelling",
                    order.id, order.market, polls_used
                );
                match exchange.cancel_order(&order.id, &order.market, source) {
                    Ok(Some(cancelled)) => return cancelled,
                    Ok(None) => return order,
                    Err(e) => {
                        warn!("failed to cancel order {}: {e}", order.id);
                        return order;
                    }
                }
            }
            NextAction::Poll => {
                clock.sleep(interval);
                polls_used += 1;
                match exchange.get_order(&order.id, &order.market) {
                    Ok(Some(updated)) => order = updated,
                    Ok(None) => debug!("order {} not found, retrying", order.id),
                    Err(e) => debug!("status fetch for order {} failed: {e}", order.id),
                }
            }
        }
    }
}
