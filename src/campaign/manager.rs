use chrono::{DateTime, Utc};
use tracing::info;

use crate::database::Database;
use crate::error::Error;
use crate::product;
use crate::tenant::TenantId;
use crate::user::Identity;

use super::{Campaign, CampaignId, CampaignStatus, Schedule, StatusChange, Transition};

#[derive(Clone, Debug, PartialEq)]
pub struct NewCampaign {
    pub tenant_id: TenantId,
    pub title: String,
    pub description: String,
    pub original_price: i64,
    pub duration_hours: i64,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub image: Option<String>,
    pub refund_policy: Option<String>,
}

#[tracing::instrument(skip(db))]
pub async fn create_campaign(
    db: &dyn Database,
    identity: &Identity,
    new_campaign: NewCampaign,
) -> Result<Campaign, Error> {
    identity.assert_can_act_for(new_campaign.tenant_id)?;
    if new_campaign.title.trim().is_empty() {
        return Err(Error::MissingRequiredField { field: "title" });
    }
    let now = Utc::now();
    Schedule::starting_at(now, new_campaign.duration_hours)?;

    let campaign = Campaign {
        id: CampaignId::new(),
        tenant_id: new_campaign.tenant_id,
        title: new_campaign.title,
        description: new_campaign.description,
        original_price: new_campaign.original_price,
        duration_hours: new_campaign.duration_hours,
        category: new_campaign.category,
        tags: new_campaign.tags,
        image: new_campaign.image,
        refund_policy: new_campaign.refund_policy,
        status: CampaignStatus::Draft,
        priority: None,
        rejection_reason: None,
        start_time: None,
        end_time: None,
        created_product: None,
        created_at: now,
        modified_at: now,
    };

    db.campaigns().insert_campaign(&campaign).await?;

    Ok(campaign)
}

#[tracing::instrument(skip(db))]
pub async fn get_campaign_by_id(
    db: &dyn Database,
    campaign_id: CampaignId,
) -> Result<Option<Campaign>, Error> {
    let campaign = db.campaigns().fetch_campaign_by_id(campaign_id).await?;

    Ok(campaign)
}

#[tracing::instrument(skip(db))]
pub async fn expect_campaign_by_id(
    db: &dyn Database,
    campaign_id: CampaignId,
) -> Result<Campaign, Error> {
    get_campaign_by_id(db, campaign_id)
        .await?
        .ok_or(Error::CampaignNotFound { campaign_id })
}

/// Live campaigns are public; every other status is only visible to the
/// owning tenant and admins.
#[tracing::instrument(skip(db))]
pub async fn get_visible_campaign_by_id(
    db: &dyn Database,
    identity: Option<&Identity>,
    campaign_id: CampaignId,
) -> Result<Campaign, Error> {
    get_campaign_by_id(db, campaign_id)
        .await?
        .filter(|campaign| {
            campaign.status == CampaignStatus::Live
                || identity.map_or(false, |identity| identity.can_act_for(campaign.tenant_id))
        })
        .ok_or(Error::CampaignNotFound { campaign_id })
}

#[tracing::instrument(skip(db))]
pub async fn get_live_campaigns(db: &dyn Database) -> Result<Vec<Campaign>, Error> {
    let campaigns = db.campaigns().fetch_live_campaigns().await?;

    Ok(campaigns)
}

#[tracing::instrument(skip(db))]
pub async fn get_tenant_campaigns(
    db: &dyn Database,
    identity: &Identity,
    tenant_id: TenantId,
) -> Result<Vec<Campaign>, Error> {
    identity.assert_can_act_for(tenant_id)?;

    let campaigns = db.campaigns().fetch_campaigns_by_tenant(tenant_id).await?;

    Ok(campaigns)
}

#[tracing::instrument(skip(db))]
pub async fn submit_for_approval(
    db: &dyn Database,
    identity: &Identity,
    campaign: Campaign,
) -> Result<Campaign, Error> {
    identity.assert_can_act_for(campaign.tenant_id)?;
    Transition::Submit.check(&campaign)?;

    let change = StatusChange::new(campaign.status, Transition::Submit);
    let campaign = db.campaigns().update_campaign_status(campaign, change).await?;
    info!(campaign_id = %campaign.id, "launchpad submitted for approval");

    Ok(campaign)
}

#[tracing::instrument(skip(db))]
pub async fn approve_campaign(
    db: &dyn Database,
    identity: &Identity,
    campaign: Campaign,
    priority: Option<i32>,
) -> Result<Campaign, Error> {
    identity.assert_admin()?;
    Transition::Approve.check(&campaign)?;

    let mut change = StatusChange::new(campaign.status, Transition::Approve);
    change.priority = priority;
    let campaign = db.campaigns().update_campaign_status(campaign, change).await?;
    info!(campaign_id = %campaign.id, ?priority, "launchpad approved");

    Ok(campaign)
}

#[tracing::instrument(skip(db))]
pub async fn reject_campaign(
    db: &dyn Database,
    identity: &Identity,
    campaign: Campaign,
    reason: String,
) -> Result<Campaign, Error> {
    identity.assert_admin()?;
    Transition::Reject.check(&campaign)?;
    if reason.trim().is_empty() {
        return Err(Error::MissingRequiredField { field: "reason" });
    }

    let mut change = StatusChange::new(campaign.status, Transition::Reject);
    change.rejection_reason = Some(reason);
    let campaign = db.campaigns().update_campaign_status(campaign, change).await?;
    info!(campaign_id = %campaign.id, "launchpad rejected");

    Ok(campaign)
}

#[tracing::instrument(skip(db))]
pub async fn publish_campaign(
    db: &dyn Database,
    identity: &Identity,
    campaign: Campaign,
    now: DateTime<Utc>,
) -> Result<Campaign, Error> {
    identity.assert_can_act_for(campaign.tenant_id)?;
    Transition::Publish.check(&campaign)?;

    let mut change = StatusChange::new(campaign.status, Transition::Publish);
    change.schedule = Some(Schedule::starting_at(now, campaign.duration_hours)?);
    let campaign = db.campaigns().update_campaign_status(campaign, change).await?;
    info!(campaign_id = %campaign.id, end_time = ?campaign.end_time, "launchpad is live");

    Ok(campaign)
}

/// Ends a live campaign whose end time has passed and materializes its
/// product. The status write happens first so that an overlapping sweep loses
/// the conditional update instead of creating a second product. A failure
/// after that write leaves the campaign for [`link_product`] to finish.
#[tracing::instrument(skip(db))]
pub async fn expire_campaign(
    db: &dyn Database,
    campaign: Campaign,
    now: DateTime<Utc>,
) -> Result<Campaign, Error> {
    Transition::Expire.check(&campaign)?;
    if !matches!(campaign.end_time, Some(end_time) if end_time <= now) {
        return Err(Error::CampaignNotYetEnded {
            campaign_id: campaign.id,
        });
    }

    let change = StatusChange::new(campaign.status, Transition::Expire);
    let campaign = db.campaigns().update_campaign_status(campaign, change).await?;
    info!(campaign_id = %campaign.id, "launchpad ended");

    link_product(db, campaign).await
}

/// Attaches a product to an ended campaign. A product already snapshotted
/// from this campaign by an interrupted attempt is reused.
#[tracing::instrument(skip(db))]
pub async fn link_product(db: &dyn Database, campaign: Campaign) -> Result<Campaign, Error> {
    if campaign.status != CampaignStatus::Ended {
        return Err(Error::InvalidCampaignState {
            campaign_id: campaign.id,
            expected: vec![CampaignStatus::Ended],
            actual: campaign.status,
        });
    }
    if campaign.created_product.is_some() {
        return Ok(campaign);
    }

    let existing = db
        .products()
        .fetch_products_by_source_launchpad(campaign.id)
        .await?;
    let product_id = match existing.first() {
        Some(product) => product.id,
        None => {
            product::manager::create_product_from_campaign(db, &campaign)
                .await?
                .id
        }
    };

    let campaign = db
        .campaigns()
        .update_campaign_created_product(campaign, product_id)
        .await?;
    info!(campaign_id = %campaign.id, %product_id, "linked product to launchpad");

    Ok(campaign)
}
