use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::campaign::{manager, Campaign, CampaignId};
use crate::clock::Clock;
use crate::database::Database;
use crate::error::Error;

pub mod endpoints;
pub use endpoints::*;

/// How far ahead the sweep looks for campaigns that are about to end.
pub const UPCOMING_WINDOW_HOURS: i64 = 1;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepResults {
    /// Expired campaigns the sweep attempted, failures included.
    pub expired: usize,
    /// Ended campaigns from earlier sweeps that now have their product.
    pub repaired: usize,
    pub failed: usize,
    pub upcoming: usize,
}

/// Finishes campaigns a previous sweep ended without a product, ends every
/// live campaign past its end time, then reports the ones ending within the
/// next hour. A failure on one campaign is logged and does not stop the
/// others; a failing query fails the whole sweep.
#[tracing::instrument(skip(db))]
pub async fn run_sweep(db: &dyn Database, now: DateTime<Utc>) -> Result<SweepResults, Error> {
    let (repaired, repair_failed) = repair_unlinked_campaigns(db).await?;
    let ((expired, expire_failed), upcoming) =
        futures::try_join!(expire_due_campaigns(db, now), find_upcoming_expirations(db, now))?;

    let results = SweepResults {
        expired,
        repaired,
        failed: repair_failed + expire_failed,
        upcoming: upcoming.len(),
    };
    info!(?results, "launchpad sweep finished");

    Ok(results)
}

async fn repair_unlinked_campaigns(db: &dyn Database) -> Result<(usize, usize), Error> {
    let campaigns = db.campaigns().fetch_unlinked_ended_campaigns().await?;

    let mut repaired = 0;
    let mut failed = 0;
    for campaign in campaigns {
        let campaign_id = campaign.id;
        match manager::link_product(db, campaign).await {
            Ok(_) => repaired += 1,
            Err(err) => {
                log_failure(campaign_id, &err);
                failed += 1;
            }
        }
    }

    Ok((repaired, failed))
}

async fn expire_due_campaigns(
    db: &dyn Database,
    now: DateTime<Utc>,
) -> Result<(usize, usize), Error> {
    let campaigns = db.campaigns().fetch_expired_campaigns(now).await?;

    let mut attempted = 0;
    let mut failed = 0;
    for campaign in campaigns {
        attempted += 1;
        let campaign_id = campaign.id;
        if let Err(err) = manager::expire_campaign(db, campaign, now).await {
            log_failure(campaign_id, &err);
            failed += 1;
        }
    }

    Ok((attempted, failed))
}

fn log_failure(campaign_id: CampaignId, err: &Error) {
    match err {
        Error::ConcurrentModificationDetected => {
            warn!(%campaign_id, "launchpad was modified during the sweep, skipping");
        }
        err => error!(%campaign_id, error = %err, "failed to finish launchpad"),
    }
}

async fn find_upcoming_expirations(
    db: &dyn Database,
    now: DateTime<Utc>,
) -> Result<Vec<Campaign>, Error> {
    let until = now + Duration::hours(UPCOMING_WINDOW_HOURS);
    let campaigns = db
        .campaigns()
        .fetch_campaigns_ending_between(now, until)
        .await?;

    for campaign in &campaigns {
        info!(campaign_id = %campaign.id, end_time = ?campaign.end_time, "launchpad ends soon");
    }

    Ok(campaigns)
}

/// Runs the sweep on a fixed interval for the lifetime of the process.
pub fn spawn_sweeper(
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
    interval: StdDuration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = run_sweep(&*db, clock.now()).await {
                error!(error = %err, "launchpad sweep failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::db::CampaignStore;
    use crate::campaign::manager::tests::campaign_in;
    use crate::campaign::CampaignStatus;
    use crate::chat::db::{ConversationStore, MessageStore};
    use crate::clock::FixedClock;
    use crate::database::MemoryDatabase;
    use crate::product::db::{MemoryProductStore, ProductStore};
    use crate::product::{Product, ProductId};
    use crate::tenant::TenantId;
    use crate::user::db::UserStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Delegates to a memory database but refuses to store products whose
    /// name matches `poisoned_name`, until it is cleared.
    struct FlakyProducts {
        inner: MemoryDatabase,
        products: FlakyProductStore,
    }

    struct FlakyProductStore {
        inner: MemoryProductStore,
        poisoned_name: Mutex<Option<String>>,
    }

    #[async_trait]
    impl ProductStore for FlakyProductStore {
        async fn insert_product(&self, product: &Product) -> Result<(), Error> {
            {
                let poisoned_name = self.poisoned_name.lock().unwrap();
                if poisoned_name.as_deref() == Some(product.name.as_str()) {
                    return Err(Error::ExistentialState("product insert failed".into()));
                }
            }
            self.inner.insert_product(product).await
        }

        async fn fetch_product_by_id(
            &self,
            product_id: ProductId,
        ) -> Result<Option<Product>, Error> {
            self.inner.fetch_product_by_id(product_id).await
        }

        async fn fetch_public_products(
            &self,
            tenant_id: Option<TenantId>,
        ) -> Result<Vec<Product>, Error> {
            self.inner.fetch_public_products(tenant_id).await
        }

        async fn fetch_products_by_source_launchpad(
            &self,
            campaign_id: crate::campaign::CampaignId,
        ) -> Result<Vec<Product>, Error> {
            self.inner.fetch_products_by_source_launchpad(campaign_id).await
        }
    }

    impl Database for FlakyProducts {
        fn campaigns(&self) -> &dyn CampaignStore {
            self.inner.campaigns()
        }

        fn products(&self) -> &dyn ProductStore {
            &self.products
        }

        fn users(&self) -> &dyn UserStore {
            self.inner.users()
        }

        fn conversations(&self) -> &dyn ConversationStore {
            self.inner.conversations()
        }

        fn messages(&self) -> &dyn MessageStore {
            self.inner.messages()
        }
    }

    fn live_campaign(title: &str, end_time: DateTime<Utc>) -> Campaign {
        let mut campaign = campaign_in(CampaignStatus::Live);
        campaign.title = title.into();
        campaign.start_time = Some(end_time - Duration::hours(campaign.duration_hours));
        campaign.end_time = Some(end_time);
        campaign
    }

    #[tokio::test]
    async fn sweep_expires_past_due_campaigns_once() {
        let db = MemoryDatabase::new();
        let now = Utc::now();
        let campaign = live_campaign("Pour-over Kettle", now - Duration::minutes(5));
        db.campaigns().insert_campaign(&campaign).await.unwrap();

        let results = run_sweep(&db, now).await.unwrap();

        assert_eq!(
            results,
            SweepResults {
                expired: 1,
                repaired: 0,
                failed: 0,
                upcoming: 0
            }
        );
        let ended = db
            .campaigns()
            .fetch_campaign_by_id(campaign.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ended.status, CampaignStatus::Ended);
        let products = db
            .products()
            .fetch_products_by_source_launchpad(campaign.id)
            .await
            .unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(ended.created_product, Some(products[0].id));

        let results = run_sweep(&db, now).await.unwrap();

        assert_eq!(results, SweepResults::default());
        let products = db
            .products()
            .fetch_products_by_source_launchpad(campaign.id)
            .await
            .unwrap();
        assert_eq!(products.len(), 1);
    }

    #[tokio::test]
    async fn sweep_isolates_a_failing_campaign_and_repairs_it_later() {
        let db = FlakyProducts {
            inner: MemoryDatabase::new(),
            products: FlakyProductStore {
                inner: MemoryProductStore::default(),
                poisoned_name: Mutex::new(Some("Broken Blender".into())),
            },
        };
        let now = Utc::now();
        let titles = ["Linen Apron", "Broken Blender", "Bamboo Steamer"];
        let mut campaigns = vec![];
        for title in titles.iter() {
            let campaign = live_campaign(title, now - Duration::hours(2));
            db.campaigns().insert_campaign(&campaign).await.unwrap();
            campaigns.push(campaign);
        }

        let results = run_sweep(&db, now).await.unwrap();

        assert_eq!(results.expired, 3);
        assert_eq!(results.failed, 1);
        let broken = campaigns[1].id;
        for campaign in &campaigns {
            let stored = db
                .campaigns()
                .fetch_campaign_by_id(campaign.id)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.status, CampaignStatus::Ended);
            assert_eq!(stored.created_product.is_some(), campaign.id != broken);
        }

        let results = run_sweep(&db, now).await.unwrap();
        assert_eq!(results.repaired, 0);
        assert_eq!(results.failed, 1);

        *db.products.poisoned_name.lock().unwrap() = None;
        let results = run_sweep(&db, now).await.unwrap();

        assert_eq!(
            results,
            SweepResults {
                expired: 0,
                repaired: 1,
                failed: 0,
                upcoming: 0
            }
        );
        let stored = db
            .campaigns()
            .fetch_campaign_by_id(broken)
            .await
            .unwrap()
            .unwrap();
        let products = db
            .products()
            .fetch_products_by_source_launchpad(broken)
            .await
            .unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(stored.created_product, Some(products[0].id));

        let results = run_sweep(&db, now).await.unwrap();
        assert_eq!(results, SweepResults::default());
    }

    #[tokio::test]
    async fn sweeper_task_uses_the_injected_clock() {
        let db = Arc::new(MemoryDatabase::new());
        let now = Utc::now() + Duration::days(30);
        let campaign = live_campaign("Cedar Spice Rack", now - Duration::minutes(1));
        db.campaigns().insert_campaign(&campaign).await.unwrap();

        let sweeper = spawn_sweeper(
            db.clone(),
            Arc::new(FixedClock(now)),
            StdDuration::from_millis(10),
        );
        let mut status = CampaignStatus::Live;
        for _ in 0..100 {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
            let stored = db
                .campaigns()
                .fetch_campaign_by_id(campaign.id)
                .await
                .unwrap()
                .unwrap();
            status = stored.status;
            if stored.created_product.is_some() {
                break;
            }
        }
        sweeper.abort();

        assert_eq!(status, CampaignStatus::Ended);
    }

    #[tokio::test]
    async fn sweep_reports_upcoming_without_changing_them() {
        let db = MemoryDatabase::new();
        let now = Utc::now();
        let soon = live_campaign("Ceramic Planter", now + Duration::minutes(30));
        let later = live_campaign("Wool Blanket", now + Duration::hours(5));
        let exactly_now = live_campaign("Copper Mug", now);
        for campaign in [&soon, &later, &exactly_now] {
            db.campaigns().insert_campaign(campaign).await.unwrap();
        }

        let results = run_sweep(&db, now).await.unwrap();

        assert_eq!(results.upcoming, 1);
        assert_eq!(results.expired, 1);
        let stored = db
            .campaigns()
            .fetch_campaign_by_id(soon.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, CampaignStatus::Live);
    }

    #[tokio::test]
    async fn sweep_ignores_campaigns_that_are_not_live() {
        let db = MemoryDatabase::new();
        let now = Utc::now();
        let mut campaign = live_campaign("Tea Caddy", now - Duration::hours(1));
        campaign.status = CampaignStatus::Approved;
        db.campaigns().insert_campaign(&campaign).await.unwrap();

        let results = run_sweep(&db, now).await.unwrap();

        assert_eq!(results, SweepResults::default());
    }
}
