//! Public matching-directory client (spec §6).
//!
//! The directory server is a separate, trusted, low-traffic collaborator — unlike the platform
//! hosts behind [`crate::web::WebClient`], it needs neither session cookies nor the §4.5 rate
//! limiter. Grounded in the teacher's "one small module per upstream API" layout
//! (`scrapers/polymarket_api.rs`, `scrapers/polymarket_gamma.rs`).

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::web::types::ItemType;

/// A record fetched from the matching directory (spec §3 `ListedUser`).
#[derive(Debug, Clone)]
pub struct ListedUser {
    pub account_id: u64,
    pub trade_token: String,
    pub games_count: u16,
    pub items_count: u16,
    pub matchable: MatchableTypes,
    pub match_everything: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchableTypes {
    pub backgrounds: bool,
    pub cards: bool,
    pub emoticons: bool,
    pub foil_cards: bool,
}

impl MatchableTypes {
    pub fn accepts(&self, item_type: ItemType) -> bool {
        match item_type {
            ItemType::ProfileBackground => self.backgrounds,
            ItemType::TradingCard => self.cards,
            ItemType::Emoticon => self.emoticons,
            ItemType::FoilTradingCard => self.foil_cards,
            ItemType::Other(_) => false,
        }
    }

    pub fn any(&self) -> bool {
        self.backgrounds || self.cards || self.emoticons || self.foil_cards
    }

    /// The configured flags as concrete accepted item types, for the `/Api/Announce`
    /// `MatchableTypes` field (spec §4.3, §6) — only the types this account is set up to
    /// match, not the full accepted set.
    pub fn item_types(&self) -> Vec<ItemType> {
        ItemType::ACCEPTED
            .into_iter()
            .filter(|t| self.accepts(*t))
            .collect()
    }
}

impl ListedUser {
    /// Ranking signal only — no arithmetic depends on its exact value (spec §3).
    pub fn score(&self) -> f64 {
        if self.items_count == 0 {
            0.0
        } else {
            self.games_count as f64 / self.items_count as f64
        }
    }
}

#[derive(Debug, Deserialize)]
struct BotsResponseWire {
    #[serde(default)]
    bots: Vec<ListedUserWire>,
}

#[derive(Debug, Deserialize)]
struct ListedUserWire {
    steam_id: u64,
    trade_token: String,
    games_count: u16,
    items_count: u16,
    #[serde(default)]
    matchable_backgrounds: u8,
    #[serde(default)]
    matchable_cards: u8,
    #[serde(default)]
    matchable_emoticons: u8,
    #[serde(default)]
    matchable_foil_cards: u8,
    #[serde(default)]
    match_everything: u8,
}

impl From<ListedUserWire> for ListedUser {
    fn from(w: ListedUserWire) -> Self {
        ListedUser {
            account_id: w.steam_id,
            trade_token: w.trade_token,
            games_count: w.games_count,
            items_count: w.items_count,
            matchable: MatchableTypes {
                backgrounds: w.matchable_backgrounds != 0,
                cards: w.matchable_cards != 0,
                emoticons: w.matchable_emoticons != 0,
                foil_cards: w.matchable_foil_cards != 0,
            },
            match_everything: w.match_everything != 0,
        }
    }
}

#[derive(Debug, Serialize)]
struct AnnounceForm {
    #[serde(rename = "AvatarHash")]
    avatar_hash: String,
    #[serde(rename = "GamesCount")]
    games_count: u32,
    #[serde(rename = "Guid")]
    guid: String,
    #[serde(rename = "ItemsCount")]
    items_count: usize,
    #[serde(rename = "MatchableTypes")]
    matchable_types: String,
    #[serde(rename = "MatchEverything")]
    match_everything: &'static str,
    #[serde(rename = "Nickname")]
    nickname: String,
    #[serde(rename = "SteamID")]
    steam_id: String,
    #[serde(rename = "TradeToken")]
    trade_token: String,
}

#[derive(Debug, Serialize)]
struct HeartBeatForm {
    #[serde(rename = "Guid")]
    guid: String,
    #[serde(rename = "SteamID")]
    steam_id: String,
}

/// Everything needed to build the `/Api/Announce` form (spec §6).
pub struct AnnounceRequest {
    pub guid: String,
    pub account_id: u64,
    pub nickname: String,
    pub avatar_hash: String,
    pub items_count: usize,
    pub games_count: u32,
    pub matchable_types: Vec<ItemType>,
    pub match_everything: bool,
    pub trade_token: String,
}

/// Client for the `/Api/Announce`, `/Api/HeartBeat`, and `/Api/Bots` directory endpoints.
pub struct DirectoryClient {
    http: Client,
    base_url: String,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build directory HTTP client");
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// `POST /Api/Announce`. Success = non-4xx (spec §6).
    pub async fn announce(&self, req: AnnounceRequest) -> Result<bool> {
        let type_ids: Vec<u32> = req.matchable_types.into_iter().map(u32::from).collect();
        let form = AnnounceForm {
            avatar_hash: req.avatar_hash,
            games_count: req.games_count,
            guid: req.guid,
            items_count: req.items_count,
            matchable_types: serde_json::to_string(&type_ids)
                .context("failed to encode matchable types")?,
            match_everything: if req.match_everything { "1" } else { "0" },
            nickname: req.nickname,
            steam_id: req.account_id.to_string(),
            trade_token: req.trade_token,
        };

        let url = format!("{}/Api/Announce", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .context("announce request failed")?;

        Ok(!response.status().is_client_error())
    }

    /// `POST /Api/HeartBeat`. Success = non-4xx (spec §6).
    pub async fn heartbeat(&self, guid: &str, account_id: u64) -> Result<bool> {
        let form = HeartBeatForm {
            guid: guid.to_string(),
            steam_id: account_id.to_string(),
        };
        let url = format!("{}/Api/HeartBeat", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .context("heartbeat request failed")?;

        Ok(!response.status().is_client_error())
    }

    /// `GET /Api/Bots?matchEverything=1`. Unknown fields are logged and ignored (spec §6).
    pub async fn fetch_bots(&self) -> Result<Vec<ListedUser>> {
        let url = format!("{}/Api/Bots", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("matchEverything", "1")])
            .send()
            .await
            .context("bots request failed")?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            bail!("directory rate-limited the bots request");
        }
        if !response.status().is_success() {
            bail!("directory returned {} for /Api/Bots", response.status());
        }

        let body: BotsResponseWire = response
            .json()
            .await
            .context("failed to parse /Api/Bots response")?;

        let mut users = Vec::with_capacity(body.bots.len());
        for wire in body.bots {
            if wire.trade_token.is_empty() {
                warn!(steam_id = wire.steam_id, "listed user missing trade token, skipping");
                continue;
            }
            users.push(ListedUser::from(wire));
        }
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_games_over_items() {
        let user = ListedUser {
            account_id: 1,
            trade_token: "t".into(),
            games_count: 50,
            items_count: 200,
            matchable: MatchableTypes::default(),
            match_everything: true,
        };
        assert!((user.score() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn score_of_zero_items_is_zero_not_nan() {
        let user = ListedUser {
            account_id: 1,
            trade_token: "t".into(),
            games_count: 0,
            items_count: 0,
            matchable: MatchableTypes::default(),
            match_everything: true,
        };
        assert_eq!(user.score(), 0.0);
    }

    #[test]
    fn matchable_types_accepts_only_flagged_types() {
        let m = MatchableTypes {
            cards: true,
            ..Default::default()
        };
        assert!(m.accepts(ItemType::TradingCard));
        assert!(!m.accepts(ItemType::Emoticon));
        assert!(!m.accepts(ItemType::Other(99)));
    }
}
