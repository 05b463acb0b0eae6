use chrono::Utc;
use tracing::info;

use crate::campaign::{Campaign, CampaignId, CampaignStatus};
use crate::database::Database;
use crate::error::Error;
use crate::tenant::TenantId;
use crate::user::{Role, User, UserId};

const ADMIN_ID: &str = "USR-0B7E0A52-6F6C-4C3F-9C3B-6D7C1C2A9E01";
const OWNER_ID: &str = "USR-5A1D2C7B-3E84-4F0A-8B6E-2F9A4C1D7E22";
const TENANT_ID: &str = "TNT-9C4E7B1A-2D53-4E68-A0F7-1B3C5D7E9F31";
const CAMPAIGN_ID: &str = "LPD-3F6A9D2C-7B14-4E85-96C0-8A2D4F6B1C43";

/// Fills an empty database with a platform admin, a tenant owner, and one
/// draft launchpad, using fixed ids so they can be addressed from scripts.
pub async fn seed(db: &dyn Database) -> Result<(), Error> {
    let admin_id: UserId = parse(ADMIN_ID)?;
    let owner_id: UserId = parse(OWNER_ID)?;
    let tenant_id: TenantId = parse(TENANT_ID)?;
    let campaign_id: CampaignId = parse(CAMPAIGN_ID)?;

    let now = Utc::now();
    let users = vec![
        User {
            id: admin_id,
            name: "Platform Admin".to_string(),
            roles: vec![Role::Admin],
            tenants: vec![],
            created_at: now,
        },
        User {
            id: owner_id,
            name: "Harbor Goods".to_string(),
            roles: vec![Role::User],
            tenants: vec![tenant_id],
            created_at: now,
        },
    ];

    let campaign = Campaign {
        id: campaign_id,
        tenant_id,
        title: "Cast Iron Dutch Oven".to_string(),
        description: "Enameled 5.5 qt oven, pre-order batch".to_string(),
        original_price: 12_900,
        duration_hours: 72,
        category: Some("kitchen".to_string()),
        tags: vec!["cookware".to_string(), "cast-iron".to_string()],
        image: None,
        refund_policy: Some("Full refund until the batch ships".to_string()),
        status: CampaignStatus::Draft,
        priority: None,
        rejection_reason: None,
        start_time: None,
        end_time: None,
        created_product: None,
        created_at: now,
        modified_at: now,
    };

    for user in &users {
        db.users().insert_user(user).await?;
    }
    db.campaigns().insert_campaign(&campaign).await?;

    info!(%admin_id, %owner_id, %tenant_id, %campaign_id, "seeded database");

    Ok(())
}

fn parse<T: std::str::FromStr>(id: &str) -> Result<T, Error> {
    id.parse()
        .map_err(|_| Error::ExistentialState(format!("seed id {} is malformed", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDatabase;

    #[tokio::test]
    async fn seeded_owner_can_act_for_the_seeded_tenant() {
        let db = MemoryDatabase::new();

        seed(&db).await.unwrap();

        let owner = db
            .users()
            .fetch_user_by_id(OWNER_ID.parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        let campaign = db
            .campaigns()
            .fetch_campaign_by_id(CAMPAIGN_ID.parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(owner.tenants.contains(&campaign.tenant_id));
        assert_eq!(campaign.status, CampaignStatus::Draft);
    }
}
