//! `matchActivelyRound` (spec §4.4.1).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::collaborators::{AccountHandle, Confirmer};
use crate::config::constants::{MAX_MATCHED_BOTS_HARD, MAX_MATCHED_BOTS_SOFT, TRADES_PER_ACCOUNT};
use crate::config::constants::MAX_ITEMS_PER_TRADE_OFFER;
use crate::directory::{DirectoryClient, ListedUser};
use crate::matcher::swap::run_swap_inner_loop;
use crate::matcher::types::TriedPartners;
use crate::web::types::{Asset, InventoryState, ItemType, SetKey};
use crate::web::{InventorySource, TradeSubmitter};

/// Picks `count` tradable assets of `class_id` out of `pool`, removing them as they're taken so
/// the same physical asset is never offered twice within one trade.
fn take_assets(pool: &mut Vec<Asset>, class_id: u64, count: usize) -> Vec<Asset> {
    let mut taken = Vec::with_capacity(count);
    let mut i = 0;
    while taken.len() < count && i < pool.len() {
        if pool[i].class_id == class_id && pool[i].tradable {
            taken.push(pool.remove(i));
        } else {
            i += 1;
        }
    }
    taken
}

/// Step 7: blacklist `candidate_id` only when it consumed nothing this round AND the round is
/// still clean, i.e. no earlier candidate has consumed any sets yet (spec §4.4.1 step 7). A
/// partner that merely found its wanted sets already taken by an earlier candidate this round
/// gets another shot once the working state changes, not a permanent 255.
fn apply_empty_match_outcome(
    tried_partners: &mut TriedPartners,
    candidate_id: u64,
    consumed_anything: bool,
    round_skipped_sets: &HashSet<SetKey>,
) {
    if !consumed_anything && round_skipped_sets.is_empty() {
        tried_partners
            .entry(candidate_id)
            .or_insert_with(Default::default)
            .blacklist();
    }
}

fn our_dupe_item_types(state: &InventoryState) -> HashSet<ItemType> {
    state
        .full
        .iter()
        .filter(|(_, classes)| classes.values().any(|&c| c > 1))
        .map(|(set, _)| set.item_type)
        .collect()
}

/// Runs one round of active matching. Returns whether the round made progress (spec §4.4.1 step 9).
pub async fn match_actively_round(
    account: &Arc<dyn AccountHandle>,
    web: &Arc<dyn InventorySource>,
    trade_submitter: &Arc<dyn TradeSubmitter>,
    directory: &DirectoryClient,
    confirmer: &Arc<dyn Confirmer>,
    tried_partners: &mut TriedPartners,
) -> Result<bool> {
    // Step 1: our inventory, partitioned by set.
    let our_assets = web
        .fetch_inventory(account.account_id(), &ItemType::ACCEPTED)
        .await?;
    let mut state = InventoryState::from_assets(&our_assets);
    let mut our_assets_pool = our_assets.clone();

    // Step 2.
    if !state.has_any_duplicate() {
        return Ok(false);
    }

    // Step 3.
    let candidates = directory.fetch_bots().await?;

    // Step 4.
    let wanted_types = our_dupe_item_types(&state);
    let mut ranked: Vec<&ListedUser> = candidates
        .iter()
        .filter(|c| c.match_everything)
        .filter(|c| wanted_types.iter().any(|&t| c.matchable.accepts(t)))
        .filter(|c| {
            tried_partners
                .get(&c.account_id)
                .map(|p| !p.is_blacklisted())
                .unwrap_or(true)
        })
        .collect();
    ranked.sort_by(|a, b| {
        let tries_a = tried_partners.get(&a.account_id).map(|p| p.tries).unwrap_or(0);
        let tries_b = tried_partners.get(&b.account_id).map(|p| p.tries).unwrap_or(0);
        tries_a.cmp(&tries_b).then(
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    ranked.truncate(MAX_MATCHED_BOTS_HARD);

    let mut round_skipped_sets: HashSet<SetKey> = HashSet::new();
    let mut empty_matches = 0u32;

    'candidates: for candidate in ranked {
        if state.full.is_empty() {
            break;
        }

        let wanted_sets: Vec<SetKey> = state
            .full
            .keys()
            .copied()
            .filter(|s| candidate.matchable.accepts(s.item_type))
            .filter(|s| !round_skipped_sets.contains(s))
            .collect();
        if wanted_sets.is_empty() {
            continue;
        }

        // Step 5.
        let candidate_assets = match web
            .fetch_inventory_for_sets(candidate.account_id, &wanted_sets)
            .await
        {
            Ok(assets) => assets,
            Err(e) => {
                warn!(account_id = candidate.account_id, error = %e, "failed fetching candidate inventory");
                continue;
            }
        };
        let mut candidate_tradable: HashMap<SetKey, HashMap<u64, u32>> = HashMap::new();
        let mut candidate_assets_pool = Vec::new();
        for asset in &candidate_assets {
            if !asset.tradable {
                continue;
            }
            *candidate_tradable
                .entry(asset.set_key())
                .or_default()
                .entry(asset.class_id)
                .or_insert(0) += asset.amount;
            candidate_assets_pool.push(asset.clone());
        }

        let mut user_skipped_sets: HashSet<SetKey> = HashSet::new();
        let mut consumed_anything = false;

        'trades: for _ in 0..TRADES_PER_ACCOUNT {
            let mut items_in_trade = 0u32;
            let mut give_plan: Vec<(SetKey, u64)> = Vec::new();
            let mut receive_plan: Vec<(SetKey, u64)> = Vec::new();

            for &set in &wanted_sets {
                if user_skipped_sets.contains(&set) {
                    continue;
                }
                let Some(our_full) = state.full.get(&set).cloned() else {
                    continue;
                };
                let Some(mut partner_tradable) = candidate_tradable.get(&set).cloned() else {
                    continue;
                };
                let mut our_full_mut = our_full;
                let mut our_tradable_mut = state.tradable.get(&set).cloned().unwrap_or_default();

                let plan = run_swap_inner_loop(
                    &mut our_full_mut,
                    &mut our_tradable_mut,
                    &mut partner_tradable,
                    &mut items_in_trade,
                    MAX_ITEMS_PER_TRADE_OFFER as u32,
                );

                if !plan.is_empty() {
                    state.full.insert(set, our_full_mut);
                    state.tradable.insert(set, our_tradable_mut);
                    candidate_tradable.insert(set, partner_tradable);
                    for id in plan.class_ids_to_give {
                        give_plan.push((set, id));
                    }
                    for id in plan.class_ids_to_receive {
                        receive_plan.push((set, id));
                    }
                }

                if items_in_trade >= MAX_ITEMS_PER_TRADE_OFFER as u32 - 1 {
                    break;
                }
            }

            if give_plan.is_empty() {
                break 'trades;
            }

            let mut items_to_give = Vec::new();
            for (_, class_id) in &give_plan {
                items_to_give.extend(take_assets(&mut our_assets_pool, *class_id, 1));
            }
            let mut items_to_receive = Vec::new();
            for (_, class_id) in &receive_plan {
                items_to_receive.extend(take_assets(&mut candidate_assets_pool, *class_id, 1));
            }

            // Invariant 2 (spec §8): a fair exchange always has equal counts on both sides.
            if items_to_give.len() != items_to_receive.len() {
                bail!("fair-exchange invariant violated: give/receive count mismatch");
            }

            let give_ids: Vec<u64> = items_to_give.iter().map(|a| a.asset_id).collect();
            let receive_ids: Vec<u64> = items_to_receive.iter().map(|a| a.asset_id).collect();

            let partner = tried_partners
                .entry(candidate.account_id)
                .or_insert_with(Default::default);

            if partner.proposed_exact_set_before(&give_ids, &receive_ids) {
                partner.blacklist();
                break 'trades;
            }
            partner.record_attempt(&give_ids, &receive_ids);

            let dispatch = trade_submitter
                .submit_trade(
                    candidate.account_id,
                    items_to_give,
                    items_to_receive,
                    Some(&candidate.trade_token),
                    false,
                )
                .await;

            match dispatch {
                Ok(result) => {
                    if result.requires_mobile_confirmation && !result.trade_offer_ids.is_empty() {
                        if let Err(e) = confirmer.confirm_trade_offers(&result.trade_offer_ids).await {
                            warn!(error = %e, "mobile confirmation failed");
                        }
                    }
                    consumed_anything = true;
                    for (set, _) in give_plan.iter().chain(receive_plan.iter()) {
                        user_skipped_sets.insert(*set);
                    }
                }
                Err(e) => {
                    debug!(account_id = candidate.account_id, error = %e, "trade dispatch failed");
                    break 'trades;
                }
            }
        }

        // Step 7.
        if !consumed_anything {
            apply_empty_match_outcome(
                tried_partners,
                candidate.account_id,
                consumed_anything,
                &round_skipped_sets,
            );
            empty_matches += 1;
            if empty_matches >= MAX_MATCHED_BOTS_SOFT {
                break 'candidates;
            }
        }

        // Step 8.
        for set in &user_skipped_sets {
            round_skipped_sets.insert(*set);
            state.remove_set(set);
        }
        if state.full.is_empty() || !state.has_any_duplicate() {
            break 'candidates;
        }
    }

    // Step 9.
    Ok(!round_skipped_sets.is_empty())
}
