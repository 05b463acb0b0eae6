#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use actix_web::web::Data;
use chrono::{DateTime, Duration, Utc};

use marketplace_server::clock::Clock;
use marketplace_server::config::{Config, DatabaseBackend};
use marketplace_server::database::{Database, MemoryDatabase};
use marketplace_server::realtime::transport::LocalTransport;
use marketplace_server::realtime::RealtimeHub;
use marketplace_server::tenant::TenantId;
use marketplace_server::user::{Role, User, UserId};

pub const CRON_SECRET: &str = "s3cret-sweep";

/// A clock the tests move forward by hand.
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

pub struct Fixture {
    pub db: Arc<MemoryDatabase>,
    pub clock: Arc<ManualClock>,
    pub tenant_id: TenantId,
    pub owner: UserId,
    pub admin: UserId,
    pub outsider: UserId,
}

impl Fixture {
    pub async fn new() -> Fixture {
        let db = Arc::new(MemoryDatabase::new());
        let tenant_id = TenantId::new();
        let owner = insert_user(&*db, vec![Role::User], vec![tenant_id]).await;
        let admin = insert_user(&*db, vec![Role::Admin], vec![]).await;
        let outsider = insert_user(&*db, vec![Role::User], vec![]).await;

        Fixture {
            db,
            clock: Arc::new(ManualClock(Mutex::new(Utc::now()))),
            tenant_id,
            owner,
            admin,
            outsider,
        }
    }

    pub fn config(&self) -> Config {
        Config {
            bind_address: "127.0.0.1:0".into(),
            mongodb_uri: String::new(),
            database_name: String::new(),
            database_backend: DatabaseBackend::Memory,
            cron_secret: CRON_SECRET.into(),
            sweep_interval: StdDuration::from_secs(0),
            reassembly_timeout: StdDuration::from_secs(60),
            seed_database: false,
        }
    }

    pub fn database(&self) -> Data<dyn Database> {
        let db: Arc<dyn Database> = self.db.clone();
        Data::from(db)
    }

    pub fn clock(&self) -> Data<dyn Clock> {
        let clock: Arc<dyn Clock> = self.clock.clone();
        Data::from(clock)
    }

    pub fn hub(&self) -> Data<RealtimeHub> {
        Data::new(RealtimeHub::new(
            Arc::new(LocalTransport::new()),
            StdDuration::from_secs(60),
        ))
    }
}

/// Builds the full service around a [`Fixture`].
#[macro_export]
macro_rules! init_app {
    ($fixture:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data($fixture.database())
                .app_data($fixture.clock())
                .app_data($fixture.hub())
                .app_data(actix_web::web::Data::new($fixture.config()))
                .configure(marketplace_server::configure)
                .default_service(actix_web::web::to(|| async {
                    actix_web::ResponseError::error_response(
                        &marketplace_server::Error::PathNotFound,
                    )
                })),
        )
        .await
    };
}

async fn insert_user(db: &dyn Database, roles: Vec<Role>, tenants: Vec<TenantId>) -> UserId {
    let user = User {
        id: UserId::new(),
        name: "Tester".into(),
        roles,
        tenants,
        created_at: Utc::now(),
    };
    db.users().insert_user(&user).await.unwrap();
    user.id
}
