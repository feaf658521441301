//! Session-aware HTTP client (spec §4.2) — the hardest subsystem, per spec §1.
//!
//! Split the way the teacher splits its scraper modules: one file per concern
//! (`client` for the request/session machinery, `session_init` for the login handshake,
//! `inventory` for paginated inventory fetches, `apikey` for the developer-key state machine,
//! `trade` for trade-offer submission), all re-exported from here.

pub mod apikey;
pub mod client;
pub mod inventory;
pub mod session_init;
pub mod trade;
pub mod types;

use async_trait::async_trait;

use crate::error::WebError;
use crate::web::types::{Asset, ItemType, SetKey};

pub use client::{Host, HostUrls, SessionFormField, SessionMode, WebClient};
pub use trade::TradeSubmitResult;

/// What the matcher and announcement engine need from the web client, as traits rather than a
/// concrete struct — lets both be unit-tested against fakes instead of a live upstream, the same
/// way the teacher's `vault::execution::ExecutionAdapter` trait decouples strategies from a
/// concrete broker connection.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Paginated GET of the account's inventory, filtered to `accepted_types` (spec §4.2
    /// inventory fetch, §4.4.1 step 1).
    async fn fetch_inventory(
        &self,
        account_id: u64,
        accepted_types: &[ItemType],
    ) -> Result<Vec<Asset>, WebError>;

    /// Same fetch, additionally filtered to a specific set of wanted set keys (spec §4.4.1 step 5).
    async fn fetch_inventory_for_sets(
        &self,
        account_id: u64,
        wanted_sets: &[SetKey],
    ) -> Result<Vec<Asset>, WebError>;
}

#[async_trait]
pub trait TradeSubmitter: Send + Sync {
    /// Submit a fair item-for-item trade, splitting into sub-trades per §4.2 trade submission.
    async fn submit_trade(
        &self,
        partner_id: u64,
        items_to_give: Vec<Asset>,
        items_to_receive: Vec<Asset>,
        trade_token: Option<&str>,
        force_single_offer: bool,
    ) -> Result<TradeSubmitResult, WebError>;
}
