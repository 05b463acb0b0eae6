use std::fmt::{self, Display};

use chrono::{DateTime, Duration, Utc};
use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::product::ProductId;
use crate::tenant::TenantId;
use crate::typedid::{TypedId, TypedIdMarker};

pub mod db;
pub mod endpoints;
pub mod manager;
pub use endpoints::*;

pub type CampaignId = TypedId<Campaign>;

/// A time-boxed crowdfunding offer, shown to shoppers as a "launchpad".
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Campaign {
    #[serde(rename = "_id")]
    pub id: CampaignId,
    pub tenant_id: TenantId,
    pub title: String,
    pub description: String,
    /// In minor currency units.
    pub original_price: i64,
    pub duration_hours: i64,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub image: Option<String>,
    pub refund_policy: Option<String>,
    pub status: CampaignStatus,
    pub priority: Option<i32>,
    pub rejection_reason: Option<String>,
    #[serde(default, with = "crate::utils::optional_bson_datetime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::utils::optional_bson_datetime")]
    pub end_time: Option<DateTime<Utc>>,
    pub created_product: Option<ProductId>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

impl TypedIdMarker for Campaign {
    fn tag() -> &'static str {
        "LPD"
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Live,
    Ended,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Pending => "pending",
            CampaignStatus::Approved => "approved",
            CampaignStatus::Rejected => "rejected",
            CampaignStatus::Live => "live",
            CampaignStatus::Ended => "ended",
        }
    }
}

impl Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<CampaignStatus> for Bson {
    fn from(status: CampaignStatus) -> Bson {
        status.as_str().into()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Transition {
    Submit,
    Approve,
    Reject,
    Publish,
    Expire,
}

impl Transition {
    pub fn sources(&self) -> &'static [CampaignStatus] {
        match self {
            Transition::Submit => &[CampaignStatus::Draft, CampaignStatus::Rejected],
            Transition::Approve => &[CampaignStatus::Pending],
            Transition::Reject => &[CampaignStatus::Pending],
            Transition::Publish => &[CampaignStatus::Approved],
            Transition::Expire => &[CampaignStatus::Live],
        }
    }

    pub fn target(&self) -> CampaignStatus {
        match self {
            Transition::Submit => CampaignStatus::Pending,
            Transition::Approve => CampaignStatus::Approved,
            Transition::Reject => CampaignStatus::Rejected,
            Transition::Publish => CampaignStatus::Live,
            Transition::Expire => CampaignStatus::Ended,
        }
    }

    pub fn check(&self, campaign: &Campaign) -> Result<(), Error> {
        if !self.sources().contains(&campaign.status) {
            return Err(Error::InvalidCampaignState {
                campaign_id: campaign.id,
                expected: self.sources().to_vec(),
                actual: campaign.status,
            });
        }

        Ok(())
    }
}

/// The fields a transition writes. The write only applies while the stored
/// status still equals `from`.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusChange {
    pub from: CampaignStatus,
    pub to: CampaignStatus,
    pub priority: Option<i32>,
    pub rejection_reason: Option<String>,
    pub schedule: Option<Schedule>,
}

impl StatusChange {
    pub fn new(from: CampaignStatus, transition: Transition) -> StatusChange {
        StatusChange {
            from,
            to: transition.target(),
            priority: None,
            rejection_reason: None,
            schedule: None,
        }
    }

    pub fn apply(&self, campaign: &mut Campaign) {
        campaign.status = self.to;
        if let Some(priority) = self.priority {
            campaign.priority = Some(priority);
        }
        if let Some(reason) = &self.rejection_reason {
            campaign.rejection_reason = Some(reason.clone());
        }
        if let Some(schedule) = self.schedule {
            campaign.start_time = Some(schedule.start_time);
            campaign.end_time = Some(schedule.end_time);
        }
    }
}

/// Longest run a launchpad may be scheduled for, ten years.
pub const MAX_DURATION_HOURS: i64 = 24 * 366 * 10;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Schedule {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Schedule {
    pub fn starting_at(start_time: DateTime<Utc>, duration_hours: i64) -> Result<Schedule, Error> {
        if !(1..=MAX_DURATION_HOURS).contains(&duration_hours) {
            return Err(Error::InvalidDuration { duration_hours });
        }
        let end_time = start_time
            .checked_add_signed(Duration::hours(duration_hours))
            .ok_or(Error::InvalidDuration { duration_hours })?;

        Ok(Schedule {
            start_time,
            end_time,
        })
    }
}
