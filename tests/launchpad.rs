use actix_web::http::header::AUTHORIZATION;
use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use chrono::Duration;
use serde_json::{json, Value};

use marketplace_server::campaign::CampaignStatus;
use marketplace_server::clock::Clock;
use marketplace_server::user::extract::USER_ID_HEADER;
use marketplace_server::user::UserId;
use marketplace_server::{CampaignBody, CreateCampaignBody, ProductBody, SweepBody};

#[macro_use]
mod common;

use common::{Fixture, CRON_SECRET};

fn new_campaign(fixture: &Fixture) -> CreateCampaignBody {
    CreateCampaignBody {
        tenant_id: fixture.tenant_id,
        title: "Walnut Cutting Board".into(),
        description: "End-grain board, limited run".into(),
        original_price: 8_900,
        duration_hours: 48,
        category: Some("kitchen".into()),
        tags: vec!["wood".into()],
        image: None,
        refund_policy: None,
    }
}

fn as_user(request: TestRequest, user_id: UserId) -> TestRequest {
    request.insert_header((USER_ID_HEADER, user_id.to_string()))
}

#[actix_web::test]
async fn launchpad_lifecycle_ends_in_a_product() {
    let fixture = Fixture::new().await;
    let app = init_app!(fixture);

    let req = as_user(TestRequest::post().uri("/launchpads"), fixture.owner)
        .set_json(&new_campaign(&fixture))
        .to_request();
    let campaign: CampaignBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(campaign.status, CampaignStatus::Draft);

    let req = as_user(TestRequest::post().uri("/launchpads/submit"), fixture.owner)
        .set_json(&json!({ "id": campaign.id }))
        .to_request();
    let campaign: CampaignBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(campaign.status, CampaignStatus::Pending);

    let req = as_user(TestRequest::post().uri("/launchpads/approve"), fixture.owner)
        .set_json(&json!({ "id": campaign.id, "priority": 5 }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let req = as_user(TestRequest::post().uri("/launchpads/approve"), fixture.admin)
        .set_json(&json!({ "id": campaign.id, "priority": 5 }))
        .to_request();
    let campaign: CampaignBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(campaign.status, CampaignStatus::Approved);
    assert_eq!(campaign.priority, Some(5));

    let published_at = fixture.clock.now();
    let req = as_user(TestRequest::post().uri("/launchpads/publish"), fixture.owner)
        .set_json(&json!({ "id": campaign.id }))
        .to_request();
    let campaign: CampaignBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(campaign.status, CampaignStatus::Live);
    assert_eq!(campaign.start_time, Some(published_at));
    assert_eq!(campaign.end_time, Some(published_at + Duration::hours(48)));

    let req = TestRequest::get().uri("/launchpads").to_request();
    let live: Vec<CampaignBody> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(live.len(), 1);

    fixture.clock.advance(Duration::hours(49));
    let req = TestRequest::post()
        .uri("/cron/expire-launchpads")
        .insert_header((AUTHORIZATION, format!("Bearer {}", CRON_SECRET)))
        .to_request();
    let sweep: SweepBody = test::call_and_read_body_json(&app, req).await;
    assert!(sweep.success);
    assert_eq!(sweep.results.expired, 1);
    assert_eq!(sweep.results.failed, 0);

    let req = as_user(
        TestRequest::get().uri(&format!("/launchpads/{}", campaign.id)),
        fixture.owner,
    )
    .to_request();
    let campaign: CampaignBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(campaign.status, CampaignStatus::Ended);
    let product_id = campaign.created_product.expect("no product linked");

    let req = TestRequest::get()
        .uri(&format!("/products/{}", product_id))
        .to_request();
    let product: ProductBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(product.name, "Walnut Cutting Board");
    assert_eq!(product.price, 8_900);
    assert_eq!(product.source_launchpad, Some(campaign.id));

    let req = TestRequest::get().uri("/launchpads").to_request();
    let live: Vec<CampaignBody> = test::call_and_read_body_json(&app, req).await;
    assert!(live.is_empty());
}

#[actix_web::test]
async fn requests_without_a_known_user_are_unauthenticated() {
    let fixture = Fixture::new().await;
    let app = init_app!(fixture);

    let req = TestRequest::post()
        .uri("/launchpads")
        .set_json(&new_campaign(&fixture))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = as_user(TestRequest::post().uri("/launchpads"), UserId::new())
        .set_json(&new_campaign(&fixture))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn outsiders_cannot_create_for_a_tenant() {
    let fixture = Fixture::new().await;
    let app = init_app!(fixture);

    let req = as_user(TestRequest::post().uri("/launchpads"), fixture.outsider)
        .set_json(&new_campaign(&fixture))
        .to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["error_code"], "E4031001");
}

#[actix_web::test]
async fn illegal_transition_reports_expected_states() {
    let fixture = Fixture::new().await;
    let app = init_app!(fixture);

    let req = as_user(TestRequest::post().uri("/launchpads"), fixture.owner)
        .set_json(&new_campaign(&fixture))
        .to_request();
    let campaign: CampaignBody = test::call_and_read_body_json(&app, req).await;

    let req = as_user(TestRequest::post().uri("/launchpads/publish"), fixture.owner)
        .set_json(&json!({ "id": campaign.id }))
        .to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(
        body["message"],
        "The requested launchpad must be in approved status"
    );
    assert_eq!(body["error_meta"]["actual"], "draft");
}

#[actix_web::test]
async fn rejection_keeps_the_reason_and_allows_resubmission() {
    let fixture = Fixture::new().await;
    let app = init_app!(fixture);

    let req = as_user(TestRequest::post().uri("/launchpads"), fixture.owner)
        .set_json(&new_campaign(&fixture))
        .to_request();
    let campaign: CampaignBody = test::call_and_read_body_json(&app, req).await;
    let req = as_user(TestRequest::post().uri("/launchpads/submit"), fixture.owner)
        .set_json(&json!({ "id": campaign.id }))
        .to_request();
    let _: CampaignBody = test::call_and_read_body_json(&app, req).await;

    let req = as_user(TestRequest::post().uri("/launchpads/reject"), fixture.admin)
        .set_json(&json!({ "id": campaign.id }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let req = as_user(TestRequest::post().uri("/launchpads/reject"), fixture.admin)
        .set_json(&json!({ "id": campaign.id, "reason": "Photos are missing" }))
        .to_request();
    let campaign: CampaignBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(campaign.status, CampaignStatus::Rejected);
    assert_eq!(
        campaign.rejection_reason.as_deref(),
        Some("Photos are missing")
    );

    let req = as_user(TestRequest::post().uri("/launchpads/submit"), fixture.owner)
        .set_json(&json!({ "id": campaign.id }))
        .to_request();
    let campaign: CampaignBody = test::call_and_read_body_json(&app, req).await;
    assert_eq!(campaign.status, CampaignStatus::Pending);
}

#[actix_web::test]
async fn unknown_launchpad_and_route_are_not_found() {
    let fixture = Fixture::new().await;
    let app = init_app!(fixture);

    let req = as_user(TestRequest::post().uri("/launchpads/submit"), fixture.owner)
        .set_json(&json!({ "id": "LPD-3F6A9D2C-7B14-4E85-96C0-8A2D4F6B1C43" }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let req = TestRequest::get().uri("/nowhere").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["error_code"], "E4041000");
}

#[actix_web::test]
async fn malformed_json_is_a_bad_request() {
    let fixture = Fixture::new().await;
    let app = init_app!(fixture);

    let req = as_user(TestRequest::post().uri("/launchpads"), fixture.owner)
        .insert_header(("content-type", "application/json"))
        .set_payload("{ not json")
        .to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["error_code"], "E4001000");
}

#[actix_web::test]
async fn sweep_trigger_requires_the_cron_secret() {
    let fixture = Fixture::new().await;
    let app = init_app!(fixture);

    let req = TestRequest::get()
        .uri("/cron/expire-launchpads")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = TestRequest::get()
        .uri("/cron/expire-launchpads")
        .insert_header((AUTHORIZATION, "Bearer wrong"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = TestRequest::get()
        .uri("/cron/expire-launchpads")
        .insert_header((AUTHORIZATION, format!("Bearer {}", CRON_SECRET)))
        .to_request();
    let sweep: SweepBody = test::call_and_read_body_json(&app, req).await;
    assert!(sweep.success);
    assert_eq!(sweep.results.expired, 0);
}
