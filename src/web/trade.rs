//! Trade-offer submission (spec §4.2 trade submission).
//!
//! A fair exchange can exceed what a single trade offer will carry, so it is split into
//! sub-trades bounded by [`crate::config::constants::MAX_ITEMS_PER_TRADE_OFFER`] per side, each
//! submitted as its own `json_tradeoffer` POST; the caller gets back one aggregate result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::constants::{MAX_ITEMS_PER_TRADE_OFFER, MAX_TRADE_OFFERS_PER_SUBMISSION};
use crate::error::WebError;
use crate::web::client::{Host, SessionFormField, SessionMode, WebClient};
use crate::web::types::Asset;
use crate::web::TradeSubmitter;

/// Outcome of submitting one (possibly split) fair trade (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct TradeSubmitResult {
    pub trade_offer_ids: Vec<u64>,
    pub requires_mobile_confirmation: bool,
}

impl TradeSubmitResult {
    fn merge(&mut self, other: TradeSubmitResult) {
        self.trade_offer_ids.extend(other.trade_offer_ids);
        self.requires_mobile_confirmation |= other.requires_mobile_confirmation;
    }
}

#[derive(Debug, Serialize)]
struct TradeOfferItem {
    appid: u32,
    contextid: String,
    amount: u32,
    assetid: String,
}

impl From<&Asset> for TradeOfferItem {
    fn from(a: &Asset) -> Self {
        TradeOfferItem {
            appid: a.real_app_id,
            contextid: a.context_id.to_string(),
            amount: a.amount,
            assetid: a.asset_id.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TradeOfferBody {
    newversion: bool,
    version: u32,
    me: TradeOfferSide,
    them: TradeOfferSide,
}

#[derive(Debug, Serialize)]
struct TradeOfferSide {
    assets: Vec<TradeOfferItem>,
    currency: Vec<()>,
    ready: bool,
}

#[derive(Debug, Deserialize)]
struct TradeOfferResponse {
    #[serde(default)]
    tradeofferid: Option<String>,
    #[serde(default)]
    needs_mobile_confirmation: bool,
}

/// Splits `items` into chunks no longer than [`MAX_ITEMS_PER_TRADE_OFFER`], preserving order.
fn split_items(items: &[Asset]) -> Vec<&[Asset]> {
    if items.is_empty() {
        return vec![&[]];
    }
    items.chunks(MAX_ITEMS_PER_TRADE_OFFER).collect()
}

async fn submit_one(
    client: &WebClient,
    partner_id: u64,
    give: &[Asset],
    receive: &[Asset],
    trade_token: Option<&str>,
) -> Result<TradeSubmitResult, WebError> {
    let body = TradeOfferBody {
        newversion: true,
        version: 4,
        me: TradeOfferSide {
            assets: give.iter().map(TradeOfferItem::from).collect(),
            currency: vec![],
            ready: true,
        },
        them: TradeOfferSide {
            assets: receive.iter().map(TradeOfferItem::from).collect(),
            currency: vec![],
            ready: true,
        },
    };

    let serialized = serde_json::to_string(&body).map_err(|e| WebError::Decode(e.to_string()))?;

    let mut form = vec![
        ("partner".to_string(), partner_id.to_string()),
        ("json_tradeoffer".to_string(), serialized),
        ("serverid".to_string(), "1".to_string()),
        ("tradeoffermessage".to_string(), String::new()),
    ];

    if let Some(token) = trade_token {
        form.push(("trade_offer_access_token".to_string(), token.to_string()));
    }

    let response: TradeOfferResponse = client
        .post_form_json(
            Host::Community,
            "/tradeoffer/new/send",
            &form,
            SessionMode::Attach(SessionFormField::Lowercase),
        )
        .await?;

    let trade_offer_ids = response
        .tradeofferid
        .and_then(|id| id.parse().ok())
        .into_iter()
        .collect();

    Ok(TradeSubmitResult {
        trade_offer_ids,
        requires_mobile_confirmation: response.needs_mobile_confirmation,
    })
}

#[async_trait]
impl TradeSubmitter for WebClient {
    async fn submit_trade(
        &self,
        partner_id: u64,
        items_to_give: Vec<Asset>,
        items_to_receive: Vec<Asset>,
        trade_token: Option<&str>,
        force_single_offer: bool,
    ) -> Result<TradeSubmitResult, WebError> {
        if force_single_offer
            && (items_to_give.len() > MAX_ITEMS_PER_TRADE_OFFER
                || items_to_receive.len() > MAX_ITEMS_PER_TRADE_OFFER)
        {
            return Err(WebError::Validation(
                "trade exceeds the per-offer item cap and splitting was disallowed".into(),
            ));
        }

        let give_chunks = split_items(&items_to_give);
        let receive_chunks = split_items(&items_to_receive);
        let rounds = give_chunks.len().max(receive_chunks.len());

        // Spec §4.2: splitting is bounded by a per-account maximum number of trades.
        if rounds > MAX_TRADE_OFFERS_PER_SUBMISSION {
            return Err(WebError::Validation(format!(
                "fair exchange needs {rounds} sub-trades, exceeding the per-account max of {MAX_TRADE_OFFERS_PER_SUBMISSION}"
            )));
        }

        let mut result = TradeSubmitResult::default();
        for i in 0..rounds {
            let give = give_chunks.get(i).copied().unwrap_or(&[]);
            let receive = receive_chunks.get(i).copied().unwrap_or(&[]);
            if give.is_empty() && receive.is_empty() {
                continue;
            }
            let sub_result = submit_one(self, partner_id, give, receive, trade_token).await?;
            result.merge(sub_result);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::types::{ItemType, Rarity};

    fn asset(id: u64) -> Asset {
        Asset {
            asset_id: id,
            class_id: id,
            context_id: 6,
            amount: 1,
            real_app_id: 730,
            item_type: ItemType::TradingCard,
            rarity: Rarity::Common,
            marketable: true,
            tradable: true,
        }
    }

    #[test]
    fn split_items_chunks_at_the_per_offer_cap() {
        let items: Vec<Asset> = (0..(MAX_ITEMS_PER_TRADE_OFFER * 2 + 3) as u64)
            .map(asset)
            .collect();
        let chunks = split_items(&items);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), MAX_ITEMS_PER_TRADE_OFFER);
        assert_eq!(chunks[2].len(), 3);
    }

    #[test]
    fn split_items_of_empty_slice_is_one_empty_chunk() {
        let items: Vec<Asset> = vec![];
        let chunks = split_items(&items);
        assert_eq!(chunks, vec![&[] as &[Asset]]);
    }

    #[tokio::test]
    async fn submit_trade_rejects_exchanges_needing_too_many_sub_trades() {
        use crate::config::GlobalConfig;
        use crate::rate_limiter::RateLimiterRegistry;
        use std::sync::Arc;
        use std::time::Duration;
        use tokio::sync::Semaphore;

        let account = Arc::new(crate::collaborators::tests::FakeAccount::default());
        let rl = Arc::new(RateLimiterRegistry::new(4, Duration::from_millis(0)));
        let sem = Arc::new(Semaphore::new(1));
        let config = GlobalConfig::default();
        let client = WebClient::new(&config, crate::web::client::HostUrls::default(), account, rl, sem);

        let too_many = (MAX_TRADE_OFFERS_PER_SUBMISSION + 1) * MAX_ITEMS_PER_TRADE_OFFER;
        let items: Vec<Asset> = (0..too_many as u64).map(asset).collect();

        let result = client
            .submit_trade(1, items.clone(), items, None, false)
            .await;
        assert!(result.is_err());
    }
}
