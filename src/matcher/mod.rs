//! Active item matcher (spec §4.4) — periodic trade-construction engine.

pub mod round;
pub mod swap;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cancellation::CancellationToken;
use crate::collaborators::{AccountHandle, Confirmer};
use crate::config::constants::{ACTIVE_MATCH_PERIOD, ACTIVE_MATCH_ROUND_DELAY, MAX_MATCHING_ROUNDS};
use crate::directory::DirectoryClient;
use crate::error::TriState;
use crate::web::{InventorySource, TradeSubmitter};

use round::match_actively_round;
use types::TriedPartners;

/// Drives the active-matching loop for a single account (spec §4.4). Created once per account;
/// `try_match` is safe to call from multiple ticks because of the try-acquire semaphore.
pub struct ActiveMatcher {
    account: Arc<dyn AccountHandle>,
    web: Arc<dyn InventorySource>,
    trade_submitter: Arc<dyn TradeSubmitter>,
    directory: Arc<DirectoryClient>,
    confirmer: Arc<dyn Confirmer>,
    in_flight: Arc<Semaphore>,
}

impl ActiveMatcher {
    pub fn new(
        account: Arc<dyn AccountHandle>,
        web: Arc<dyn InventorySource>,
        trade_submitter: Arc<dyn TradeSubmitter>,
        directory: Arc<DirectoryClient>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        Self {
            account,
            web,
            trade_submitter,
            directory,
            confirmer,
            in_flight: Arc::new(Semaphore::new(1)),
        }
    }

    /// Preconditions + try-acquire guard (spec §4.4): a tick that finds the semaphore already
    /// held is silently dropped rather than queued.
    pub async fn try_match<F, Fut>(&self, eligibility: F, cancel: &CancellationToken) -> bool
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = TriState>,
    {
        let Ok(_permit) = self.in_flight.clone().try_acquire_owned() else {
            debug!("active match already in flight, dropping this tick");
            return false;
        };

        let prefs = self.account.trading_preferences();
        if !self.account.is_connected_and_logged_on()
            || !prefs.match_actively
            || prefs.match_everything
        {
            return false;
        }
        if eligibility().await != TriState::True {
            return false;
        }

        self.run_rounds(eligibility, cancel).await;
        true
    }

    async fn run_rounds<F, Fut>(&self, eligibility: F, cancel: &CancellationToken)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = TriState>,
    {
        let mut tried_partners = TriedPartners::new();

        for round_number in 1..=MAX_MATCHING_ROUNDS {
            if cancel.is_cancelled() {
                debug!("cancellation requested, stopping matching loop");
                break;
            }
            if round_number > 1 && eligibility().await != TriState::True {
                debug!("account no longer eligible between matching rounds, stopping");
                break;
            }

            let outcome = match_actively_round(
                &self.account,
                &self.web,
                &self.trade_submitter,
                &self.directory,
                &self.confirmer,
                &mut tried_partners,
            )
            .await;

            match outcome {
                Ok(true) => {
                    info!(round = round_number, "matching round made progress");
                }
                Ok(false) => {
                    debug!(round = round_number, "matching round made no progress, stopping");
                    break;
                }
                Err(e) => {
                    warn!(round = round_number, error = %e, "matching round failed fatally");
                    break;
                }
            }

            if round_number < MAX_MATCHING_ROUNDS {
                tokio::select! {
                    _ = tokio::time::sleep(ACTIVE_MATCH_ROUND_DELAY) => {}
                    _ = cancel.clone().cancelled() => {
                        debug!("cancellation requested during inter-round delay, stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Initial delay before the first tick: `1h + loadBalancingDelay * accountCount` (spec §4.4).
    pub fn initial_delay(load_balancing_delay: Duration, account_count: u32) -> Duration {
        Duration::from_secs(3600) + load_balancing_delay * account_count
    }

    pub fn period() -> Duration {
        ACTIVE_MATCH_PERIOD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_delay_adds_load_balancing_stagger() {
        let delay = ActiveMatcher::initial_delay(Duration::from_secs(2), 5);
        assert_eq!(delay, Duration::from_secs(3600 + 10));
    }
}
