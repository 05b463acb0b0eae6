use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::campaign::CampaignId;
use crate::tenant::TenantId;
use crate::typedid::{TypedId, TypedIdMarker};

pub mod db;
pub mod endpoints;
pub mod manager;
pub use endpoints::*;

pub type ProductId = TypedId<Product>;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: ProductId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub image: Option<String>,
    pub refund_policy: Option<String>,
    /// The launchpad this product was materialized from, if any.
    pub source_launchpad: Option<CampaignId>,
    pub is_private: bool,
    pub is_archived: bool,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

impl Product {
    pub fn is_public(&self) -> bool {
        !self.is_private && !self.is_archived
    }
}

impl TypedIdMarker for Product {
    fn tag() -> &'static str {
        "PRD"
    }
}
