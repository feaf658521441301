//! Paginated inventory fetch (spec §4.2, §4.4.1 step 1).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::sleep;

use crate::config::constants::MAX_ITEMS_IN_SINGLE_INVENTORY_REQUEST;
use crate::error::WebError;
use crate::web::client::{Host, WebClient};
use crate::web::types::{Asset, ItemType, Rarity, SetKey};
use crate::web::InventorySource;

#[derive(Debug, Deserialize)]
struct InventoryPage {
    #[serde(default)]
    assets: Vec<AssetWire>,
    #[serde(default)]
    descriptions: Vec<DescriptionWire>,
    #[serde(default)]
    more_items: u8,
    #[serde(default)]
    last_assetid: Option<String>,
    #[serde(default)]
    success: u8,
}

#[derive(Debug, Deserialize)]
struct AssetWire {
    assetid: String,
    classid: String,
    contextid: String,
    #[serde(default = "default_amount")]
    amount: String,
}

fn default_amount() -> String {
    "1".to_string()
}

#[derive(Debug, Deserialize)]
struct DescriptionWire {
    classid: String,
    #[serde(default)]
    marketable: u8,
    #[serde(default)]
    tradable: u8,
    #[serde(default)]
    market_fee_app: Option<u32>,
    appid: u32,
    #[serde(default)]
    tags: Vec<TagWire>,
}

#[derive(Debug, Deserialize)]
struct TagWire {
    category: String,
    #[serde(default)]
    internal_name: String,
}

fn parse_u64(s: &str) -> Result<u64, WebError> {
    s.parse().map_err(|_| WebError::Decode(format!("not an integer: {s}")))
}

fn classify(desc: &DescriptionWire) -> (ItemType, Rarity) {
    let mut item_type = ItemType::Other(0);
    let mut rarity = Rarity::Other(0);
    for tag in &desc.tags {
        match tag.category.as_str() {
            "item_class" => {
                item_type = match tag.internal_name.as_str() {
                    "item_class_2" => ItemType::TradingCard,
                    "item_class_3" => ItemType::FoilTradingCard,
                    "item_class_4" => ItemType::Emoticon,
                    "item_class_5" => ItemType::ProfileBackground,
                    other => ItemType::Other(other.len() as u32),
                };
            }
            "Rarity" | "droprate" => {
                rarity = match tag.internal_name.as_str() {
                    "common" | "droprate_0" => Rarity::Common,
                    "uncommon" | "droprate_1" => Rarity::Uncommon,
                    "rare" | "droprate_2" => Rarity::Rare,
                    _ => Rarity::Other(0),
                };
            }
            _ => {}
        }
    }
    (item_type, rarity)
}

/// Fetches one account's inventory for `app_id`/`context_id`, paginating until the server stops
/// reporting `more_items` (spec §4.2). `real_app_id_override` lets callers force the set key's
/// `realAppID` when the container app (e.g. a badge-granting app) differs from the market app.
pub async fn fetch_all_pages(
    client: &WebClient,
    account_id: u64,
    app_id: u32,
    context_id: u64,
) -> Result<Vec<Asset>, WebError> {
    let mut assets = Vec::new();
    let mut start_assetid: Option<String> = None;

    loop {
        let _permit = client.inventory_semaphore.clone().acquire_owned().await;

        let mut path = format!(
            "/inventory/{account_id}/{app_id}/{context_id}?count={}&l=english",
            MAX_ITEMS_IN_SINGLE_INVENTORY_REQUEST
        );
        if let Some(start) = &start_assetid {
            path.push_str(&format!("&start_assetid={start}"));
        }

        let page: InventoryPage = client.get_json(Host::Community, &path).await?;

        let delay = client.inventory_limiter_delay;
        if !delay.is_zero() {
            sleep(delay).await;
        }

        if page.success == 0 {
            return Err(WebError::Decode("inventory request reported success=0".into()));
        }

        let descriptions: HashMap<u64, DescriptionWire> = page
            .descriptions
            .into_iter()
            .filter_map(|d| parse_u64(&d.classid).ok().map(|id| (id, d)))
            .collect();

        for raw in page.assets {
            let class_id = parse_u64(&raw.classid)?;
            let Some(desc) = descriptions.get(&class_id) else {
                continue;
            };
            let (item_type, rarity) = classify(desc);
            assets.push(Asset {
                asset_id: parse_u64(&raw.assetid)?,
                class_id,
                context_id: parse_u64(&raw.contextid)?,
                amount: raw.amount.parse().unwrap_or(1),
                real_app_id: desc.market_fee_app.unwrap_or(desc.appid),
                item_type,
                rarity,
                marketable: desc.marketable != 0,
                tradable: desc.tradable != 0,
            });
        }

        if page.more_items == 0 {
            break;
        }
        match page.last_assetid.as_deref() {
            Some(id) if id != "0" => start_assetid = Some(id.to_string()),
            _ => {
                return Err(WebError::Decode(
                    "server reported more items with no last_assetid".into(),
                ))
            }
        }
    }

    Ok(assets)
}

#[async_trait]
impl InventorySource for WebClient {
    async fn fetch_inventory(
        &self,
        account_id: u64,
        accepted_types: &[ItemType],
    ) -> Result<Vec<Asset>, WebError> {
        let assets = fetch_all_pages(self, account_id, 753, 6).await?;
        Ok(assets
            .into_iter()
            .filter(|a| accepted_types.contains(&a.item_type))
            .collect())
    }

    async fn fetch_inventory_for_sets(
        &self,
        account_id: u64,
        wanted_sets: &[SetKey],
    ) -> Result<Vec<Asset>, WebError> {
        let assets = fetch_all_pages(self, account_id, 753, 6).await?;
        Ok(assets
            .into_iter()
            .filter(|a| wanted_sets.contains(&a.set_key()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_reads_item_class_and_rarity_tags() {
        let desc = DescriptionWire {
            classid: "1".into(),
            marketable: 1,
            tradable: 1,
            market_fee_app: Some(730),
            appid: 753,
            tags: vec![
                TagWire {
                    category: "item_class".into(),
                    internal_name: "item_class_2".into(),
                },
                TagWire {
                    category: "Rarity".into(),
                    internal_name: "rare".into(),
                },
            ],
        };
        let (item_type, rarity) = classify(&desc);
        assert_eq!(item_type, ItemType::TradingCard);
        assert_eq!(rarity, Rarity::Rare);
    }

    #[test]
    fn classify_defaults_to_other_when_tags_are_missing() {
        let desc = DescriptionWire {
            classid: "1".into(),
            marketable: 0,
            tradable: 0,
            market_fee_app: None,
            appid: 753,
            tags: vec![],
        };
        let (item_type, _) = classify(&desc);
        assert_eq!(item_type, ItemType::Other(0));
    }
}
