use actix_web::web::{Data, Json, Path};
use actix_web::{get, post};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::database::Database;
use crate::error::Error;
use crate::product::ProductId;
use crate::tenant::TenantId;
use crate::user::Identity;

use super::manager::{self, NewCampaign};
use super::{Campaign, CampaignId, CampaignStatus};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateCampaignBody {
    pub tenant_id: TenantId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub original_price: i64,
    pub duration_hours: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub refund_policy: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionBody {
    pub id: CampaignId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApproveBody {
    pub id: CampaignId,
    #[serde(default)]
    pub priority: Option<i32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RejectBody {
    pub id: CampaignId,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CampaignBody {
    pub id: CampaignId,
    pub tenant_id: TenantId,
    pub title: String,
    pub description: String,
    pub original_price: i64,
    pub duration_hours: i64,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub image: Option<String>,
    pub refund_policy: Option<String>,
    pub status: CampaignStatus,
    pub priority: Option<i32>,
    pub rejection_reason: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_product: Option<ProductId>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl CampaignBody {
    pub fn render(campaign: Campaign) -> CampaignBody {
        CampaignBody {
            id: campaign.id,
            tenant_id: campaign.tenant_id,
            title: campaign.title,
            description: campaign.description,
            original_price: campaign.original_price,
            duration_hours: campaign.duration_hours,
            category: campaign.category,
            tags: campaign.tags,
            image: campaign.image,
            refund_policy: campaign.refund_policy,
            status: campaign.status,
            priority: campaign.priority,
            rejection_reason: campaign.rejection_reason,
            start_time: campaign.start_time,
            end_time: campaign.end_time,
            created_product: campaign.created_product,
            created_at: campaign.created_at,
            modified_at: campaign.modified_at,
        }
    }
}

#[post("/launchpads")]
#[tracing::instrument(skip(db))]
pub async fn create_campaign(
    db: Data<dyn Database>,
    identity: Identity,
    body: Json<CreateCampaignBody>,
) -> Result<Json<CampaignBody>, Error> {
    let body = body.into_inner();
    let new_campaign = NewCampaign {
        tenant_id: body.tenant_id,
        title: body.title,
        description: body.description,
        original_price: body.original_price,
        duration_hours: body.duration_hours,
        category: body.category,
        tags: body.tags,
        image: body.image,
        refund_policy: body.refund_policy,
    };

    let campaign = manager::create_campaign(&**db, &identity, new_campaign).await?;

    Ok(Json(CampaignBody::render(campaign)))
}

#[get("/launchpads")]
#[tracing::instrument(skip(db))]
pub async fn get_live_campaigns(db: Data<dyn Database>) -> Result<Json<Vec<CampaignBody>>, Error> {
    let campaigns = manager::get_live_campaigns(&**db).await?;

    let body = campaigns.into_iter().map(CampaignBody::render).collect();

    Ok(Json(body))
}

#[get("/launchpads/{campaign_id}")]
#[tracing::instrument(skip(db))]
pub async fn get_campaign_by_id(
    db: Data<dyn Database>,
    identity: Option<Identity>,
    params: Path<CampaignId>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign_id = params.into_inner();
    let campaign =
        manager::get_visible_campaign_by_id(&**db, identity.as_ref(), campaign_id).await?;

    Ok(Json(CampaignBody::render(campaign)))
}

#[get("/tenants/{tenant_id}/launchpads")]
#[tracing::instrument(skip(db))]
pub async fn get_tenant_campaigns(
    db: Data<dyn Database>,
    identity: Identity,
    params: Path<TenantId>,
) -> Result<Json<Vec<CampaignBody>>, Error> {
    let tenant_id = params.into_inner();
    let campaigns = manager::get_tenant_campaigns(&**db, &identity, tenant_id).await?;

    let body = campaigns.into_iter().map(CampaignBody::render).collect();

    Ok(Json(body))
}

#[post("/launchpads/submit")]
#[tracing::instrument(skip(db))]
pub async fn submit_campaign(
    db: Data<dyn Database>,
    identity: Identity,
    body: Json<TransitionBody>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign = manager::expect_campaign_by_id(&**db, body.id).await?;

    let campaign = manager::submit_for_approval(&**db, &identity, campaign).await?;

    Ok(Json(CampaignBody::render(campaign)))
}

#[post("/launchpads/approve")]
#[tracing::instrument(skip(db))]
pub async fn approve_campaign(
    db: Data<dyn Database>,
    identity: Identity,
    body: Json<ApproveBody>,
) -> Result<Json<CampaignBody>, Error> {
    let body = body.into_inner();
    let campaign = manager::expect_campaign_by_id(&**db, body.id).await?;

    let campaign = manager::approve_campaign(&**db, &identity, campaign, body.priority).await?;

    Ok(Json(CampaignBody::render(campaign)))
}

#[post("/launchpads/reject")]
#[tracing::instrument(skip(db))]
pub async fn reject_campaign(
    db: Data<dyn Database>,
    identity: Identity,
    body: Json<RejectBody>,
) -> Result<Json<CampaignBody>, Error> {
    let body = body.into_inner();
    let campaign = manager::expect_campaign_by_id(&**db, body.id).await?;
    let reason = body.reason.unwrap_or_default();

    let campaign = manager::reject_campaign(&**db, &identity, campaign, reason).await?;

    Ok(Json(CampaignBody::render(campaign)))
}

#[post("/launchpads/publish")]
#[tracing::instrument(skip(db, clock))]
pub async fn publish_campaign(
    db: Data<dyn Database>,
    clock: Data<dyn Clock>,
    identity: Identity,
    body: Json<TransitionBody>,
) -> Result<Json<CampaignBody>, Error> {
    let campaign = manager::expect_campaign_by_id(&**db, body.id).await?;

    let campaign = manager::publish_campaign(&**db, &identity, campaign, clock.now()).await?;

    Ok(Json(CampaignBody::render(campaign)))
}
