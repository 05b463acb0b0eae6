use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson;
use mongodb::options::FindOptions;

use crate::database::{poisoned, MongoCampaignStore};
use crate::error::Error;
use crate::product::ProductId;
use crate::tenant::TenantId;

use super::{Campaign, CampaignId, CampaignStatus, StatusChange};

#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), Error>;

    async fn fetch_campaign_by_id(&self, campaign_id: CampaignId)
        -> Result<Option<Campaign>, Error>;

    async fn fetch_campaigns_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<Campaign>, Error>;

    /// Live campaigns, highest priority first, then soonest to end.
    async fn fetch_live_campaigns(&self) -> Result<Vec<Campaign>, Error>;

    /// Live campaigns whose end time is at or before `now`.
    async fn fetch_expired_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, Error>;

    /// Ended campaigns that were never linked to a product.
    async fn fetch_unlinked_ended_campaigns(&self) -> Result<Vec<Campaign>, Error>;

    /// Live campaigns whose end time falls in `(after, until]`.
    async fn fetch_campaigns_ending_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Campaign>, Error>;

    async fn update_campaign_status(
        &self,
        campaign: Campaign,
        change: StatusChange,
    ) -> Result<Campaign, Error>;

    async fn update_campaign_created_product(
        &self,
        campaign: Campaign,
        product_id: ProductId,
    ) -> Result<Campaign, Error>;
}

#[async_trait]
impl CampaignStore for MongoCampaignStore {
    #[tracing::instrument(skip(self))]
    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), Error> {
        self.insert_one(campaign, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_campaign_by_id(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Option<Campaign>, Error> {
        let campaign = self
            .find_one(bson::doc! { "_id": campaign_id }, None)
            .await?;

        Ok(campaign)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_campaigns_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<Campaign>, Error> {
        let options = FindOptions::builder()
            .sort(bson::doc! { "created_at": -1 })
            .build();

        let campaigns: Vec<Campaign> = self
            .find(bson::doc! { "tenant_id": tenant_id }, options)
            .await?
            .try_collect()
            .await?;

        Ok(campaigns)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_live_campaigns(&self) -> Result<Vec<Campaign>, Error> {
        let options = FindOptions::builder()
            .sort(bson::doc! { "priority": -1, "end_time": 1 })
            .build();

        let campaigns: Vec<Campaign> = self
            .find(bson::doc! { "status": CampaignStatus::Live }, options)
            .await?
            .try_collect()
            .await?;

        Ok(campaigns)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_expired_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, Error> {
        let now = bson::DateTime::from_chrono(now);

        let campaigns: Vec<Campaign> = self
            .find(
                bson::doc! {
                    "status": CampaignStatus::Live,
                    "end_time": { "$lte": now },
                },
                None,
            )
            .await?
            .try_collect()
            .await?;

        Ok(campaigns)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_unlinked_ended_campaigns(&self) -> Result<Vec<Campaign>, Error> {
        let campaigns: Vec<Campaign> = self
            .find(
                bson::doc! {
                    "status": CampaignStatus::Ended,
                    "created_product": bson::Bson::Null,
                },
                None,
            )
            .await?
            .try_collect()
            .await?;

        Ok(campaigns)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_campaigns_ending_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Campaign>, Error> {
        let after = bson::DateTime::from_chrono(after);
        let until = bson::DateTime::from_chrono(until);

        let campaigns: Vec<Campaign> = self
            .find(
                bson::doc! {
                    "status": CampaignStatus::Live,
                    "end_time": { "$gt": after, "$lte": until },
                },
                None,
            )
            .await?
            .try_collect()
            .await?;

        Ok(campaigns)
    }

    #[tracing::instrument(skip(self))]
    async fn update_campaign_status(
        &self,
        mut campaign: Campaign,
        change: StatusChange,
    ) -> Result<Campaign, Error> {
        let now = Utc::now();
        let mut update = bson::doc! {
            "status": change.to,
            "modified_at": bson::DateTime::from_chrono(now),
        };
        if let Some(priority) = change.priority {
            update.insert("priority", priority);
        }
        if let Some(reason) = &change.rejection_reason {
            update.insert("rejection_reason", reason.as_str());
        }
        if let Some(schedule) = change.schedule {
            update.insert("start_time", bson::DateTime::from_chrono(schedule.start_time));
            update.insert("end_time", bson::DateTime::from_chrono(schedule.end_time));
        }

        let result = self
            .update_one(
                bson::doc! { "_id": campaign.id, "status": change.from },
                bson::doc! { "$set": update },
                None,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(Error::ConcurrentModificationDetected);
        }

        change.apply(&mut campaign);
        campaign.modified_at = now;

        Ok(campaign)
    }

    #[tracing::instrument(skip(self))]
    async fn update_campaign_created_product(
        &self,
        mut campaign: Campaign,
        product_id: ProductId,
    ) -> Result<Campaign, Error> {
        let now = Utc::now();
        let old_modified_at = bson::DateTime::from_chrono(campaign.modified_at);
        let new_modified_at = bson::DateTime::from_chrono(now);

        let result = self
            .update_one(
                bson::doc! {
                    "_id": campaign.id,
                    "modified_at": old_modified_at,
                    "created_product": bson::Bson::Null,
                },
                bson::doc! { "$set": { "created_product": product_id, "modified_at": new_modified_at } },
                None,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(Error::ConcurrentModificationDetected);
        }

        campaign.modified_at = now;
        campaign.created_product = Some(product_id);

        Ok(campaign)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCampaignStore {
    campaigns: Mutex<HashMap<CampaignId, Campaign>>,
}

impl MemoryCampaignStore {
    fn select<F>(&self, filter: F) -> Result<Vec<Campaign>, Error>
    where
        F: Fn(&Campaign) -> bool,
    {
        let campaigns = self.campaigns.lock().map_err(poisoned)?;

        Ok(campaigns.values().filter(|c| filter(c)).cloned().collect())
    }
}

#[async_trait]
impl CampaignStore for MemoryCampaignStore {
    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), Error> {
        let mut campaigns = self.campaigns.lock().map_err(poisoned)?;
        campaigns.insert(campaign.id, campaign.clone());

        Ok(())
    }

    async fn fetch_campaign_by_id(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Option<Campaign>, Error> {
        let campaigns = self.campaigns.lock().map_err(poisoned)?;

        Ok(campaigns.get(&campaign_id).cloned())
    }

    async fn fetch_campaigns_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<Campaign>, Error> {
        let mut campaigns = self.select(|c| c.tenant_id == tenant_id)?;
        campaigns.sort_by_key(|c| Reverse(c.created_at));

        Ok(campaigns)
    }

    async fn fetch_live_campaigns(&self) -> Result<Vec<Campaign>, Error> {
        let mut campaigns = self.select(|c| c.status == CampaignStatus::Live)?;
        campaigns.sort_by_key(|c| (Reverse(c.priority), c.end_time));

        Ok(campaigns)
    }

    async fn fetch_expired_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, Error> {
        self.select(|c| {
            c.status == CampaignStatus::Live && matches!(c.end_time, Some(end) if end <= now)
        })
    }

    async fn fetch_unlinked_ended_campaigns(&self) -> Result<Vec<Campaign>, Error> {
        self.select(|c| c.status == CampaignStatus::Ended && c.created_product.is_none())
    }

    async fn fetch_campaigns_ending_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Campaign>, Error> {
        self.select(|c| {
            c.status == CampaignStatus::Live
                && matches!(c.end_time, Some(end) if after < end && end <= until)
        })
    }

    async fn update_campaign_status(
        &self,
        mut campaign: Campaign,
        change: StatusChange,
    ) -> Result<Campaign, Error> {
        let mut campaigns = self.campaigns.lock().map_err(poisoned)?;
        let stored = match campaigns.get_mut(&campaign.id) {
            Some(stored) if stored.status == change.from => stored,
            _ => return Err(Error::ConcurrentModificationDetected),
        };

        let now = Utc::now();
        change.apply(stored);
        stored.modified_at = now;
        change.apply(&mut campaign);
        campaign.modified_at = now;

        Ok(campaign)
    }

    async fn update_campaign_created_product(
        &self,
        mut campaign: Campaign,
        product_id: ProductId,
    ) -> Result<Campaign, Error> {
        let mut campaigns = self.campaigns.lock().map_err(poisoned)?;
        let stored = match campaigns.get_mut(&campaign.id) {
            Some(stored)
                if stored.modified_at == campaign.modified_at
                    && stored.created_product.is_none() =>
            {
                stored
            }
            _ => return Err(Error::ConcurrentModificationDetected),
        };

        let now = Utc::now();
        stored.created_product = Some(product_id);
        stored.modified_at = now;
        campaign.created_product = Some(product_id);
        campaign.modified_at = now;

        Ok(campaign)
    }
}
