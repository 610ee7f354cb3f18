//! Webhook Tests
//!
//! - Inbound verification: signature, freshness window, replayed nonces
//! - Nonce retention and cleanup
//! - The inbound HTTP endpoint end to end
//! - Outbound signed notifications recorded on the settlement row

use actix_web::http::StatusCode;
use actix_web::{test, web, App, HttpRequest, HttpResponse, HttpServer};
use chrono::{Duration as ChronoDuration, Utc};
use server::error::SettlementError;
use server::handlers::platform_webhooks::{receive_platform_webhook, WebhookState};
use server::models::audit_event::Actor;
use server::models::webhook_nonce::WebhookNonce;
use server::services::nonce_cleanup::NonceCleanupWorker;
use server::services::webhook_signing::{
    signature_header, verify_signature, EVENT_HEADER, NONCE_HEADER, SIGNATURE_HEADER,
    TIMESTAMP_HEADER,
};
use server::services::webhook_verifier::InboundHeaders;
use std::sync::Mutex;
use std::time::Duration;

use crate::mock_infrastructure::{TestContext, PLATFORM_SECRET};

const PLATFORM: &str = "casino-one";

fn deposit_body(reference: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "event": "deposit.requested",
        "data": {
            "reference": reference,
            "user_id": "player-7",
            "tkoin_amount": 5_000_000_000i64
        }
    }))
    .unwrap()
}

fn signed_headers(body: &[u8], nonce: &str, timestamp: i64) -> InboundHeaders {
    InboundHeaders {
        signature: Some(signature_header(PLATFORM_SECRET, timestamp, body).unwrap()),
        timestamp: Some(timestamp.to_string()),
        nonce: Some(nonce.to_string()),
    }
}

#[tokio::test]
async fn test_replayed_nonce_is_rejected() {
    let ctx = TestContext::new();
    ctx.register_platform(PLATFORM).await;
    let body = deposit_body("dep-1");
    let headers = signed_headers(&body, "N1", Utc::now().timestamp());

    let platform = ctx
        .core
        .verifier
        .verify_inbound(PLATFORM, &headers, &body)
        .await
        .unwrap();
    assert_eq!(platform.id, PLATFORM);

    let err = ctx
        .core
        .verifier
        .verify_inbound(PLATFORM, &headers, &body)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::ReplayDetected(ref n) if n == "N1"));
}

#[tokio::test]
async fn test_bad_signature_does_not_burn_nonce() {
    let ctx = TestContext::new();
    ctx.register_platform(PLATFORM).await;
    let body = deposit_body("dep-2");
    let now = Utc::now().timestamp();

    let mut forged = signed_headers(&body, "N2", now);
    forged.signature = Some(signature_header("not-the-secret-at-all", now, &body).unwrap());
    let err = ctx
        .core
        .verifier
        .verify_inbound(PLATFORM, &forged, &body)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidSignature));

    // The genuine request with the same nonce still goes through
    let genuine = signed_headers(&body, "N2", now);
    ctx.core
        .verifier
        .verify_inbound(PLATFORM, &genuine, &body)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stale_and_tampered_requests_are_rejected() {
    let ctx = TestContext::new();
    ctx.register_platform(PLATFORM).await;
    let body = deposit_body("dep-3");

    let stale = Utc::now().timestamp() - ctx.config.webhook.freshness_window_secs - 60;
    let err = ctx
        .core
        .verifier
        .verify_inbound(PLATFORM, &signed_headers(&body, "N3", stale), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::StaleTimestamp(_)));

    let headers = signed_headers(&body, "N4", Utc::now().timestamp());
    let tampered = deposit_body("dep-3-tampered");
    let err = ctx
        .core
        .verifier
        .verify_inbound(PLATFORM, &headers, &tampered)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidSignature));

    let mut no_nonce = signed_headers(&body, "unused", Utc::now().timestamp());
    no_nonce.nonce = None;
    let err = ctx
        .core
        .verifier
        .verify_inbound(PLATFORM, &no_nonce, &body)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Unauthorized(_)));
}

#[tokio::test]
async fn test_inactive_or_unknown_platform_is_rejected() {
    let ctx = TestContext::new();
    ctx.register_platform(PLATFORM).await;
    let body = deposit_body("dep-5");

    let err = ctx
        .core
        .verifier
        .verify_inbound("nobody", &signed_headers(&body, "N5", Utc::now().timestamp()), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::NotFound { .. }));

    ctx.core
        .settlements
        .set_platform_active(PLATFORM, false, &Actor::admin("admin-1"))
        .await
        .unwrap();
    let err = ctx
        .core
        .verifier
        .verify_inbound(PLATFORM, &signed_headers(&body, "N6", Utc::now().timestamp()), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Unauthorized(_)));
}

#[tokio::test]
async fn test_nonce_cleanup_purges_only_expired() {
    let ctx = TestContext::new();
    ctx.register_platform(PLATFORM).await;
    {
        let mut conn = ctx.conn();
        let now = Utc::now().naive_utc();
        WebhookNonce::consume(&mut conn, "old-1", PLATFORM, now - ChronoDuration::hours(1)).unwrap();
        WebhookNonce::consume(&mut conn, "old-2", PLATFORM, now - ChronoDuration::seconds(1)).unwrap();
        WebhookNonce::consume(&mut conn, "fresh", PLATFORM, now + ChronoDuration::hours(23)).unwrap();
    }

    let worker = NonceCleanupWorker::new(ctx.pool.clone(), Duration::from_secs(3600));
    assert_eq!(worker.run_once().await.unwrap(), 2);
    assert_eq!(WebhookNonce::count(&mut ctx.conn()).unwrap(), 1);

    // A retained nonce still blocks replays
    let err = WebhookNonce::consume(
        &mut ctx.conn(),
        "fresh",
        PLATFORM,
        Utc::now().naive_utc() + ChronoDuration::hours(24),
    )
    .unwrap_err();
    assert!(matches!(err, SettlementError::ReplayDetected(_)));
}

#[actix_web::test]
async fn test_inbound_endpoint_accepts_once_then_rejects_replay() {
    let ctx = TestContext::new();
    ctx.register_platform(PLATFORM).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(WebhookState {
                verifier: ctx.core.verifier.clone(),
                settlements: ctx.core.settlements.clone(),
            }))
            .service(receive_platform_webhook),
    )
    .await;

    let body = deposit_body("dep-http-1");
    let timestamp = Utc::now().timestamp();
    let signature = signature_header(PLATFORM_SECRET, timestamp, &body).unwrap();
    let request = || {
        test::TestRequest::post()
            .uri(&format!("/api/platforms/{PLATFORM}/webhook"))
            .insert_header(("Content-Type", "application/json"))
            .insert_header((SIGNATURE_HEADER, signature.clone()))
            .insert_header((TIMESTAMP_HEADER, timestamp.to_string()))
            .insert_header((NONCE_HEADER, "http-N1"))
            .set_payload(body.clone())
            .to_request()
    };

    let accepted = test::call_service(&app, request()).await;
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);
    let json: serde_json::Value = test::read_body_json(accepted).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["duplicate"], false);
    let settlement_id = json["settlement_id"].as_str().unwrap().to_string();

    let replay = test::call_service(&app, request()).await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    let json: serde_json::Value = test::read_body_json(replay).await;
    assert_eq!(json["error_code"], "HOOK-001");

    let bad = test::TestRequest::post()
        .uri(&format!("/api/platforms/{PLATFORM}/webhook"))
        .insert_header((SIGNATURE_HEADER, "sha256=00"))
        .insert_header((TIMESTAMP_HEADER, timestamp.to_string()))
        .insert_header((NONCE_HEADER, "http-N2"))
        .set_payload(body.clone())
        .to_request();
    let rejected = test::call_service(&app, bad).await;
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);

    let undelivered = ctx.core.settlements.list_undelivered(PLATFORM).await.unwrap();
    assert!(undelivered.is_empty());
    assert!(!settlement_id.is_empty());
}

#[actix_web::test]
async fn test_inbound_endpoint_rejects_unknown_event_after_auth() {
    let ctx = TestContext::new();
    ctx.register_platform(PLATFORM).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(WebhookState {
                verifier: ctx.core.verifier.clone(),
                settlements: ctx.core.settlements.clone(),
            }))
            .service(receive_platform_webhook),
    )
    .await;

    let body = serde_json::to_vec(&serde_json::json!({
        "event": "jackpot.won",
        "data": {}
    }))
    .unwrap();
    let timestamp = Utc::now().timestamp();
    let req = test::TestRequest::post()
        .uri(&format!("/api/platforms/{PLATFORM}/webhook"))
        .insert_header((
            SIGNATURE_HEADER,
            signature_header(PLATFORM_SECRET, timestamp, &body).unwrap(),
        ))
        .insert_header((TIMESTAMP_HEADER, timestamp.to_string()))
        .insert_header((NONCE_HEADER, "http-N3"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_settlement_reference_keeps_first_row() {
    let ctx = TestContext::new();
    ctx.register_platform(PLATFORM).await;
    let inbound: server::services::settlement::InboundSettlement =
        serde_json::from_value(serde_json::json!({
            "reference": "wd-9",
            "user_id": "player-7",
            "tkoin_amount": 1_000_000_000i64
        }))
        .unwrap();

    let (first, created) = ctx
        .core
        .settlements
        .record_inbound(
            PLATFORM,
            server::models::platform_settlement::SettlementKind::Withdrawal,
            inbound.clone(),
        )
        .await
        .unwrap();
    assert!(created);
    let (second, created) = ctx
        .core
        .settlements
        .record_inbound(
            PLATFORM,
            server::models::platform_settlement::SettlementKind::Withdrawal,
            inbound,
        )
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn test_failed_delivery_is_recorded_on_settlement() {
    let ctx = TestContext::new();
    ctx.register_platform(PLATFORM).await;
    let inbound: server::services::settlement::InboundSettlement =
        serde_json::from_value(serde_json::json!({
            "reference": "dep-dead-1",
            "user_id": "player-7",
            "tkoin_amount": 1_000_000_000i64
        }))
        .unwrap();
    let (settlement, _) = ctx
        .core
        .settlements
        .record_inbound(
            PLATFORM,
            server::models::platform_settlement::SettlementKind::Deposit,
            inbound,
        )
        .await
        .unwrap();

    let completion = ctx
        .core
        .settlements
        .complete_settlement(&settlement.id)
        .await
        .unwrap();
    let notification = completion.notification.unwrap();
    assert!(!notification.delivered);
    assert_eq!(notification.attempts, 1);
    assert_eq!(completion.settlement.status, "completed");
    assert_eq!(completion.settlement.webhook_delivered, 0);
    assert_eq!(completion.settlement.webhook_attempts, 1);
    assert!(completion.settlement.webhook_last_response.is_some());

    // Finishing twice does not notify twice
    let again = ctx
        .core
        .settlements
        .complete_settlement(&settlement.id)
        .await
        .unwrap();
    assert!(again.notification.is_none());

    let undelivered = ctx.core.settlements.list_undelivered(PLATFORM).await.unwrap();
    assert_eq!(undelivered.len(), 1);
}

#[tokio::test]
async fn test_inactive_platform_is_not_notified() {
    let ctx = TestContext::new();
    ctx.register_platform(PLATFORM).await;
    let inbound: server::services::settlement::InboundSettlement =
        serde_json::from_value(serde_json::json!({
            "reference": "dep-paused-1",
            "user_id": "player-7",
            "tkoin_amount": 1_000_000_000i64
        }))
        .unwrap();
    let (settlement, _) = ctx
        .core
        .settlements
        .record_inbound(
            PLATFORM,
            server::models::platform_settlement::SettlementKind::Deposit,
            inbound,
        )
        .await
        .unwrap();
    ctx.core
        .settlements
        .set_platform_active(PLATFORM, false, &Actor::admin("admin-1"))
        .await
        .unwrap();

    let completion = ctx
        .core
        .settlements
        .complete_settlement(&settlement.id)
        .await
        .unwrap();
    assert!(completion.notification.is_none());
    assert_eq!(completion.settlement.status, "completed");
    assert_eq!(completion.settlement.webhook_attempts, 0);
    assert_eq!(completion.settlement.webhook_delivered, 0);

    let err = ctx.core.settlements.redeliver(&settlement.id).await.unwrap_err();
    assert!(matches!(err, SettlementError::Validation(_)));

    let undelivered = ctx.core.settlements.list_undelivered(PLATFORM).await.unwrap();
    assert_eq!(undelivered.len(), 1);
}

#[derive(Default)]
struct Received {
    requests: Mutex<Vec<(String, String, String, String, Vec<u8>)>>,
}

async fn capture(req: HttpRequest, body: web::Bytes, received: web::Data<Received>) -> HttpResponse {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    received.requests.lock().unwrap().push((
        header(SIGNATURE_HEADER),
        header(TIMESTAMP_HEADER),
        header(NONCE_HEADER),
        header(EVENT_HEADER),
        body.to_vec(),
    ));
    HttpResponse::Ok().body("ok")
}

#[actix_web::test]
async fn test_outbound_notification_is_signed_and_recorded() {
    let received = web::Data::new(Received::default());
    let receiver_data = received.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(receiver_data.clone())
            .route("/hook", web::post().to(capture))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();
    let addr = server.addrs()[0];
    let handle = server.run();
    let server_handle = handle.handle();
    actix_web::rt::spawn(handle);

    let ctx = TestContext::new();
    ctx.core
        .settlements
        .register_platform(
            PLATFORM,
            "Live Casino",
            &format!("http://{addr}/hook"),
            PLATFORM_SECRET,
            &Actor::admin("admin-1"),
        )
        .await
        .unwrap();
    let inbound: server::services::settlement::InboundSettlement =
        serde_json::from_value(serde_json::json!({
            "reference": "dep-live-1",
            "user_id": "player-7",
            "tkoin_amount": 2_000_000_000i64
        }))
        .unwrap();
    let (settlement, _) = ctx
        .core
        .settlements
        .record_inbound(
            PLATFORM,
            server::models::platform_settlement::SettlementKind::Deposit,
            inbound,
        )
        .await
        .unwrap();

    let completion = ctx
        .core
        .settlements
        .complete_settlement(&settlement.id)
        .await
        .unwrap();
    assert!(completion.notification.unwrap().delivered);
    assert_eq!(completion.settlement.webhook_delivered, 1);

    let requests = received.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let (signature, timestamp, nonce, event, body) = &requests[0];
    assert_eq!(event, "deposit.completed");
    assert!(!nonce.is_empty());
    let timestamp: i64 = timestamp.parse().unwrap();
    verify_signature(PLATFORM_SECRET, timestamp, body, signature).unwrap();

    let payload: serde_json::Value = serde_json::from_slice(body).unwrap();
    assert_eq!(payload["data"]["reference"], "dep-live-1");
    assert_eq!(payload["nonce"], nonce.as_str());

    server_handle.stop(true).await;
}
