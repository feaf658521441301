//! Per-round bookkeeping (spec §3 `TriedPartner`).

use std::collections::HashMap;
use std::collections::HashSet;

/// Sentinel `tries` value meaning "do not retry this partner for the rest of the pass" (spec §3).
pub const TRIES_BLACKLISTED: u8 = 255;

/// `(tries, givenAssetIDs, receivedAssetIDs)` for one partner within one matching pass.
///
/// Always construct explicitly via [`TriedPartner::default`] before first use — the source this
/// was distilled from reads `previousAttempt.GivenAssetIDs` from a struct that may never have
/// been initialized on the first attempt (spec §9 open question); here, `HashMap::entry(...)
/// .or_insert_with(TriedPartner::default)` guarantees a partner always has one before it is read.
#[derive(Debug, Clone, Default)]
pub struct TriedPartner {
    pub tries: u8,
    pub given_asset_ids: HashSet<u64>,
    pub received_asset_ids: HashSet<u64>,
}

impl TriedPartner {
    pub fn is_blacklisted(&self) -> bool {
        self.tries == TRIES_BLACKLISTED
    }

    pub fn blacklist(&mut self) {
        self.tries = TRIES_BLACKLISTED;
    }

    /// True if this exact give/receive asset-ID set was already proposed to this partner
    /// (spec §4.4.1 step 6, boundary scenario 4).
    pub fn proposed_exact_set_before(&self, give: &[u64], receive: &[u64]) -> bool {
        !self.given_asset_ids.is_empty()
            && give.iter().all(|id| self.given_asset_ids.contains(id))
            && give.len() == self.given_asset_ids.len()
            && receive.iter().all(|id| self.received_asset_ids.contains(id))
            && receive.len() == self.received_asset_ids.len()
    }

    pub fn record_attempt(&mut self, give: &[u64], receive: &[u64]) {
        self.given_asset_ids.extend(give.iter().copied());
        self.received_asset_ids.extend(receive.iter().copied());
        self.tries = self.tries.saturating_add(1);
    }
}

/// Per-partner bookkeeping for one matching pass, keyed by account ID. Destroyed at the end of
/// the pass (spec §3 lifecycle).
pub type TriedPartners = HashMap<u64, TriedPartner>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazily_constructed_partner_starts_clean() {
        let mut partners: TriedPartners = HashMap::new();
        let partner = partners.entry(1).or_insert_with(TriedPartner::default);
        assert_eq!(partner.tries, 0);
        assert!(partner.given_asset_ids.is_empty());
    }

    #[test]
    fn detects_exact_repeat_proposal() {
        let mut partner = TriedPartner::default();
        partner.record_attempt(&[1, 2], &[3, 4]);
        assert!(partner.proposed_exact_set_before(&[1, 2], &[3, 4]));
        assert!(!partner.proposed_exact_set_before(&[1, 2], &[3, 5]));
        assert!(!partner.proposed_exact_set_before(&[1], &[3]));
    }

    #[test]
    fn blacklist_sets_sentinel_value() {
        let mut partner = TriedPartner::default();
        partner.blacklist();
        assert!(partner.is_blacklisted());
        assert_eq!(partner.tries, TRIES_BLACKLISTED);
    }
}
