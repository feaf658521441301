//! The swap inner loop (spec §4.4.2).
//!
//! Resolved open question: the inner loop decrements our tradable count by the swapped amount
//! (`tradableAmount - amount`), not by the full count — the distilled source's `fullAmount -
//! amount` read looked like a copy-paste bug from the full-state branch, and mixing full-state
//! arithmetic into the tradable mapping would let `tradable` exceed `full` (spec §8 invariant 1).

use std::collections::HashMap;

/// One set's worth of proposed swaps, as class IDs (not yet resolved to concrete asset IDs).
#[derive(Debug, Default, Clone)]
pub struct SwapPlan {
    pub class_ids_to_give: Vec<u64>,
    pub class_ids_to_receive: Vec<u64>,
}

impl SwapPlan {
    pub fn is_empty(&self) -> bool {
        self.class_ids_to_give.is_empty()
    }
}

/// Runs the swap inner loop for a single set key against one candidate's tradable holdings.
///
/// `our_full`/`our_tradable` are this account's counts for the set, mutated in place.
/// `partner_tradable` is the candidate's tradable counts for the same set, mutated in place so
/// repeated calls across sets in the same round see consistent availability.
/// `items_in_trade` is a running per-partner counter shared across sets within one trade attempt.
pub fn run_swap_inner_loop(
    our_full: &mut HashMap<u64, u32>,
    our_tradable: &mut HashMap<u64, u32>,
    partner_tradable: &mut HashMap<u64, u32>,
    items_in_trade: &mut u32,
    max_items_per_trade: u32,
) -> SwapPlan {
    let mut plan = SwapPlan::default();

    loop {
        if *items_in_trade >= max_items_per_trade.saturating_sub(1) {
            break;
        }

        let mut give_candidates: Vec<(u64, u32)> = our_full
            .iter()
            .filter(|&(_, &count)| count >= 2)
            .map(|(&id, &count)| (id, count))
            .collect();
        // Give candidates ordered by count DESC (spec §4.4.3); class ID breaks ties.
        give_candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut accepted = false;

        'give: for (give_id, give_count) in give_candidates {
            let mut receive_candidates: Vec<(u64, u32)> = partner_tradable
                .iter()
                .filter(|&(&id, &count)| count > 0 && id != give_id)
                .map(|(&id, _)| (id, our_full.get(&id).copied().unwrap_or(0)))
                .collect();
            // Receive candidates ordered by how little we already own ASC (spec §4.4.3).
            receive_candidates.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

            for (receive_id, our_amount_of_receive) in receive_candidates {
                if give_count <= our_amount_of_receive + 1 {
                    continue;
                }

                *our_full.get_mut(&give_id).unwrap() -= 1;
                *our_full.entry(receive_id).or_insert(0) += 1;
                if let Some(tradable_count) = our_tradable.get_mut(&give_id) {
                    *tradable_count = tradable_count.saturating_sub(1);
                }
                if let Some(partner_count) = partner_tradable.get_mut(&receive_id) {
                    *partner_count = partner_count.saturating_sub(1);
                }

                plan.class_ids_to_give.push(give_id);
                plan.class_ids_to_receive.push(receive_id);
                *items_in_trade += 2;
                accepted = true;
                break 'give;
            }
        }

        if !accepted {
            break;
        }
    }

    plan
}
