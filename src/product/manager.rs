use chrono::Utc;
use tracing::info;

use crate::campaign::Campaign;
use crate::database::Database;
use crate::error::Error;
use crate::tenant::TenantId;
use crate::user::Identity;

use super::{Product, ProductId};

/// Snapshots an ended launchpad into a standing catalog product.
#[tracing::instrument(skip(db))]
pub async fn create_product_from_campaign(
    db: &dyn Database,
    campaign: &Campaign,
) -> Result<Product, Error> {
    let now = Utc::now();
    let product = Product {
        id: ProductId::new(),
        tenant_id: campaign.tenant_id,
        name: campaign.title.clone(),
        description: campaign.description.clone(),
        price: campaign.original_price,
        category: campaign.category.clone(),
        tags: campaign.tags.clone(),
        image: campaign.image.clone(),
        refund_policy: campaign.refund_policy.clone(),
        source_launchpad: Some(campaign.id),
        is_private: false,
        is_archived: false,
        created_at: now,
        modified_at: now,
    };

    db.products().insert_product(&product).await?;
    info!(product_id = %product.id, campaign_id = %campaign.id, "created product from launchpad");

    Ok(product)
}

#[tracing::instrument(skip(db))]
pub async fn get_public_products(
    db: &dyn Database,
    tenant_id: Option<TenantId>,
) -> Result<Vec<Product>, Error> {
    let products = db.products().fetch_public_products(tenant_id).await?;

    Ok(products)
}

/// Hidden products only resolve for members of the owning tenant.
#[tracing::instrument(skip(db))]
pub async fn get_product_by_id(
    db: &dyn Database,
    identity: Option<&Identity>,
    product_id: ProductId,
) -> Result<Product, Error> {
    let product = db
        .products()
        .fetch_product_by_id(product_id)
        .await?
        .filter(|product| {
            product.is_public()
                || identity.map_or(false, |identity| identity.can_act_for(product.tenant_id))
        })
        .ok_or(Error::ProductNotFound { product_id })?;

    Ok(product)
}
