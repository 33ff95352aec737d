use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use ride_dispatch::api::rest::router;
use ride_dispatch::auth::issue_token;
use ride_dispatch::config::Config;
use ride_dispatch::engine::dispatch::run_dispatch_engine;
use ride_dispatch::models::identity::Role;
use ride_dispatch::models::ride::GeoPoint;
use ride_dispatch::realtime::notifier::run_event_notifier;
use ride_dispatch::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test-secret";

fn test_config() -> Config {
    Config {
        http_port: 0,
        log_level: "info".to_string(),
        jwt_secret: SECRET.to_string(),
        dispatch_queue_size: 64,
        event_buffer_size: 256,
        offer_deadline: Duration::from_secs(2),
        presence_freshness: Duration::from_secs(30),
        search_radius_km: 5.0,
        radius_growth_factor: 2.0,
        max_search_attempts: 3,
    }
}

struct TestApp {
    app: Router,
    state: Arc<AppState>,
}

fn setup_with(config: Config) -> TestApp {
    let (state, dispatch_rx) = AppState::new(config);
    let state = Arc::new(state);

    tokio::spawn(run_dispatch_engine(state.clone(), dispatch_rx));
    tokio::spawn(run_event_notifier(state.clone(), state.rides.subscribe()));

    TestApp {
        app: router(state.clone()),
        state,
    }
}

fn setup() -> TestApp {
    setup_with(test_config())
}

fn token(role: Role, id: Uuid) -> String {
    issue_token(SECRET, role, id).unwrap()
}

fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn create_body(order_id: &str, store_owner_id: Uuid) -> Value {
    json!({
        "order_id": order_id,
        "store_owner_id": store_owner_id,
        "pickup": "MG Road 12",
        "destination": "Residency Rd 4",
        "pickup_location": { "lat": 12.9716, "lng": 77.5946 },
        "drop_location": { "lat": 12.9352, "lng": 77.6245 },
        "vehicle_type": "bike"
    })
}

/// Creates a ride and moves it to pending-captain. Returns
/// (ride json as seen by the customer, customer token, owner token).
async fn ride_awaiting_captain(harness: &TestApp) -> (Value, String, String) {
    let customer = Uuid::new_v4();
    let owner = Uuid::new_v4();
    let customer_token = token(Role::Customer, customer);
    let owner_token = token(Role::StoreOwner, owner);

    let response = harness
        .app
        .clone()
        .oneshot(post_json(
            "/api/rides/create",
            &customer_token,
            create_body("ord-1", owner),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ride = body_json(response).await;

    let response = harness
        .app
        .clone()
        .oneshot(post_json(
            "/api/rides/store-owner-accept",
            &owner_token,
            json!({ "ride_id": ride["id"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let accepted = body_json(response).await;
    assert_eq!(accepted["status"], "pending-captain");

    (ride, customer_token, owner_token)
}

#[tokio::test]
async fn health_returns_ok() {
    let harness = setup();
    let response = harness.app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["rides"], 0);
    assert_eq!(body["open_offers"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let harness = setup();
    let response = harness.app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    assert!(body.contains("rides_active"));
    assert!(body.contains("rides_awaiting_dispatch"));
}

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let harness = setup();
    let request = Request::builder()
        .method("POST")
        .uri("/api/rides/create")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_string(&create_body("ord-1", Uuid::new_v4())).unwrap(),
        ))
        .unwrap();

    let response = harness.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_requires_customer_role() {
    let harness = setup();
    let owner_token = token(Role::StoreOwner, Uuid::new_v4());

    let response = harness
        .app
        .oneshot(post_json(
            "/api/rides/create",
            &owner_token,
            create_body("ord-1", Uuid::new_v4()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_ride_starts_pending_store_owner() {
    let harness = setup();
    let customer_token = token(Role::Customer, Uuid::new_v4());

    let response = harness
        .app
        .oneshot(post_json(
            "/api/rides/create",
            &customer_token,
            create_body("ord-1", Uuid::new_v4()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let ride = body_json(response).await;
    assert_eq!(ride["status"], "pending-store-owner");
    assert!(ride["fare"].as_f64().unwrap() > 0.0);
    assert_eq!(ride["otp"].as_str().unwrap().len(), 4);
    assert!(ride["captain_id"].is_null());
}

#[tokio::test]
async fn create_ride_rejects_empty_order_id() {
    let harness = setup();
    let customer_token = token(Role::Customer, Uuid::new_v4());
    let mut body = create_body("  ", Uuid::new_v4());
    body["order_id"] = json!("  ");

    let response = harness
        .app
        .oneshot(post_json("/api/rides/create", &customer_token, body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_fare_returns_per_vehicle_estimates() {
    let harness = setup();
    let customer_token = token(Role::Customer, Uuid::new_v4());

    let response = harness
        .app
        .oneshot(get_with_token(
            "/api/rides/get-fare?pickup_lat=12.9716&pickup_lng=77.5946&drop_lat=12.9352&drop_lng=77.6245",
            &customer_token,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let fares = body_json(response).await;
    let bike = fares["bike"].as_f64().unwrap();
    let auto = fares["auto"].as_f64().unwrap();
    let car = fares["car"].as_f64().unwrap();
    assert!(bike < auto && auto < car);
}

#[tokio::test]
async fn get_fare_rejects_out_of_range_coordinates() {
    let harness = setup();
    let customer_token = token(Role::Customer, Uuid::new_v4());

    let response = harness
        .app
        .oneshot(get_with_token(
            "/api/rides/get-fare?pickup_lat=200.0&pickup_lng=77.5946&drop_lat=12.9352&drop_lng=77.6245",
            &customer_token,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_store_owner_cannot_accept() {
    let harness = setup();
    let customer_token = token(Role::Customer, Uuid::new_v4());
    let owner = Uuid::new_v4();

    let response = harness
        .app
        .clone()
        .oneshot(post_json(
            "/api/rides/create",
            &customer_token,
            create_body("ord-1", owner),
        ))
        .await
        .unwrap();
    let ride = body_json(response).await;

    let impostor_token = token(Role::StoreOwner, Uuid::new_v4());
    let response = harness
        .app
        .oneshot(post_json(
            "/api/rides/store-owner-accept",
            &impostor_token,
            json!({ "ride_id": ride["id"] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn store_owner_reject_cancels_the_ride() {
    let harness = setup();
    let customer_token = token(Role::Customer, Uuid::new_v4());
    let owner = Uuid::new_v4();
    let owner_token = token(Role::StoreOwner, owner);

    let response = harness
        .app
        .clone()
        .oneshot(post_json(
            "/api/rides/create",
            &customer_token,
            create_body("ord-1", owner),
        ))
        .await
        .unwrap();
    let ride = body_json(response).await;

    let response = harness
        .app
        .oneshot(post_json(
            "/api/rides/store-owner-reject",
            &owner_token,
            json!({ "ride_id": ride["id"] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let rejected = body_json(response).await;
    assert_eq!(rejected["status"], "cancelled");
    assert_eq!(rejected["cancelled_reason"], "store-rejected");
}

#[tokio::test]
async fn captain_cannot_accept_before_store_owner() {
    let harness = setup();
    let customer_token = token(Role::Customer, Uuid::new_v4());
    let captain_token = token(Role::Captain, Uuid::new_v4());

    let response = harness
        .app
        .clone()
        .oneshot(post_json(
            "/api/rides/create",
            &customer_token,
            create_body("ord-1", Uuid::new_v4()),
        ))
        .await
        .unwrap();
    let ride = body_json(response).await;

    let response = harness
        .app
        .oneshot(post_json(
            "/api/rides/captain-accept",
            &captain_token,
            json!({ "ride_id": ride["id"] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn full_delivery_flow_with_otp_handoffs() {
    let harness = setup();
    let (ride, customer_token, owner_token) = ride_awaiting_captain(&harness).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();
    let customer_otp = ride["otp"].as_str().unwrap().to_string();

    // The store owner's view carries the pickup code.
    let response = harness
        .app
        .clone()
        .oneshot(get_with_token(&format!("/api/rides/{ride_id}"), &owner_token))
        .await
        .unwrap();
    let owner_view = body_json(response).await;
    let store_otp = owner_view["otp"].as_str().unwrap().to_string();
    assert_ne!(store_otp, customer_otp);

    let captain = Uuid::new_v4();
    let captain_token = token(Role::Captain, captain);

    let response = harness
        .app
        .clone()
        .oneshot(post_json(
            "/api/rides/captain-accept",
            &captain_token,
            json!({ "ride_id": ride_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let accepted = body_json(response).await;
    assert_eq!(accepted["status"], "accepted");
    assert_eq!(accepted["captain_id"], json!(captain));
    // The captain's view never carries an OTP.
    assert!(accepted.get("otp").is_none() || accepted["otp"].is_null());

    // A second captain is told the ride is gone.
    let rival_token = token(Role::Captain, Uuid::new_v4());
    let response = harness
        .app
        .clone()
        .oneshot(post_json(
            "/api/rides/captain-accept",
            &rival_token,
            json!({ "ride_id": ride_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Wrong pickup code: reported, state unchanged, code not revealed.
    let wrong_otp = if store_otp == "0000" { "0001" } else { "0000" };
    let response = harness
        .app
        .clone()
        .oneshot(post_json(
            "/api/rides/verify-store-otp",
            &captain_token,
            json!({ "ride_id": ride_id, "otp": wrong_otp }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["error"], "incorrect code");

    let response = harness
        .app
        .clone()
        .oneshot(get_with_token(&format!("/api/rides/{ride_id}"), &customer_token))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["status"], "accepted");

    // Correct pickup code.
    let response = harness
        .app
        .clone()
        .oneshot(post_json(
            "/api/rides/verify-store-otp",
            &captain_token,
            json!({ "ride_id": ride_id, "otp": store_otp }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "enroute");

    // Resubmitting the same correct code is a conflict, not a second effect.
    let response = harness
        .app
        .clone()
        .oneshot(post_json(
            "/api/rides/verify-store-otp",
            &captain_token,
            json!({ "ride_id": ride_id, "otp": store_otp }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Drop-off code completes the ride.
    let response = harness
        .app
        .clone()
        .oneshot(post_json(
            "/api/rides/confirm-delivery",
            &captain_token,
            json!({ "ride_id": ride_id, "otp": customer_otp, "rating": 5.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "delivered");
}

#[tokio::test]
async fn concurrent_captain_accepts_have_exactly_one_winner() {
    let harness = setup();
    let (ride, _customer_token, _owner_token) = ride_awaiting_captain(&harness).await;
    let ride_id = ride["id"].clone();

    let first_token = token(Role::Captain, Uuid::new_v4());
    let second_token = token(Role::Captain, Uuid::new_v4());

    let first = harness.app.clone().oneshot(post_json(
        "/api/rides/captain-accept",
        &first_token,
        json!({ "ride_id": ride_id }),
    ));
    let second = harness.app.clone().oneshot(post_json(
        "/api/rides/captain-accept",
        &second_token,
        json!({ "ride_id": ride_id }),
    ));

    let (first, second) = tokio::join!(first, second);
    let statuses = [first.unwrap().status(), second.unwrap().status()];

    assert!(statuses.contains(&StatusCode::OK));
    assert!(statuses.contains(&StatusCode::CONFLICT));
}

#[tokio::test]
async fn captain_with_active_ride_cannot_take_a_second() {
    let harness = setup();
    let captain = Uuid::new_v4();
    let captain_token = token(Role::Captain, captain);

    let (first_ride, _, _) = ride_awaiting_captain(&harness).await;
    let response = harness
        .app
        .clone()
        .oneshot(post_json(
            "/api/rides/captain-accept",
            &captain_token,
            json!({ "ride_id": first_ride["id"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (second_ride, _, _) = ride_awaiting_captain(&harness).await;
    let response = harness
        .app
        .oneshot(post_json(
            "/api/rides/captain-accept",
            &captain_token,
            json!({ "ride_id": second_ride["id"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn customer_can_cancel_their_ride() {
    let harness = setup();
    let (ride, customer_token, _owner_token) = ride_awaiting_captain(&harness).await;

    let response = harness
        .app
        .clone()
        .oneshot(post_json(
            "/api/rides/cancel",
            &customer_token,
            json!({ "ride_id": ride["id"] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cancelled = body_json(response).await;
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["cancelled_reason"], "customer-cancelled");

    // A captain arriving afterwards is told the ride is gone.
    let captain_token = token(Role::Captain, Uuid::new_v4());
    let response = harness
        .app
        .oneshot(post_json(
            "/api/rides/captain-accept",
            &captain_token,
            json!({ "ride_id": ride["id"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn stranger_cannot_cancel_someone_elses_ride() {
    let harness = setup();
    let (ride, _customer_token, _owner_token) = ride_awaiting_captain(&harness).await;

    let stranger_token = token(Role::Customer, Uuid::new_v4());
    let response = harness
        .app
        .oneshot(post_json(
            "/api/rides/cancel",
            &stranger_token,
            json!({ "ride_id": ride["id"] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_ride_returns_404() {
    let harness = setup();
    let customer_token = token(Role::Customer, Uuid::new_v4());

    let response = harness
        .app
        .oneshot(get_with_token(
            &format!("/api/rides/{}", Uuid::new_v4()),
            &customer_token,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_exhaustion_cancels_instead_of_hanging() {
    let mut config = test_config();
    config.offer_deadline = Duration::from_millis(30);
    config.max_search_attempts = 2;
    let harness = setup_with(config);

    // No captains online at all.
    let (ride, customer_token, _owner_token) = ride_awaiting_captain(&harness).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();

    let mut last_status = String::new();
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let response = harness
            .app
            .clone()
            .oneshot(get_with_token(&format!("/api/rides/{ride_id}"), &customer_token))
            .await
            .unwrap();
        let view = body_json(response).await;
        last_status = view["status"].as_str().unwrap().to_string();
        if last_status == "cancelled" {
            assert_eq!(view["cancelled_reason"], "no-captain-found");
            return;
        }
    }

    panic!("ride never resolved, stuck in {last_status}");
}

#[tokio::test]
async fn polling_fallback_surfaces_open_offers() {
    let harness = setup();
    let captain = Uuid::new_v4();
    let captain_token = token(Role::Captain, captain);

    // Captain is online near the pickup before the search starts.
    harness.state.hub.record_location(
        captain,
        GeoPoint {
            lat: 12.9716,
            lng: 77.5946,
        },
        Utc::now(),
    );

    let (ride, _customer_token, _owner_token) = ride_awaiting_captain(&harness).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();

    let mut offered = Vec::new();
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let response = harness
            .app
            .clone()
            .oneshot(get_with_token("/api/rides/pending-for-captain", &captain_token))
            .await
            .unwrap();
        let body = body_json(response).await;
        offered = body.as_array().unwrap().clone();
        if !offered.is_empty() {
            break;
        }
    }

    assert_eq!(offered.len(), 1);
    assert_eq!(offered[0]["id"].as_str().unwrap(), ride_id);
    // Offers shown to captains carry no handoff code.
    assert!(offered[0].get("otp").is_none() || offered[0]["otp"].is_null());

    let response = harness
        .app
        .clone()
        .oneshot(post_json(
            "/api/rides/captain-accept",
            &captain_token,
            json!({ "ride_id": ride_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = harness
        .app
        .clone()
        .oneshot(get_with_token("/api/rides/current-for-captain", &captain_token))
        .await
        .unwrap();
    let current = body_json(response).await;
    assert_eq!(current["id"].as_str().unwrap(), ride_id);
    assert_eq!(current["status"], "accepted");
}

#[tokio::test]
async fn current_for_captain_is_null_without_a_ride() {
    let harness = setup();
    let captain_token = token(Role::Captain, Uuid::new_v4());

    let response = harness
        .app
        .oneshot(get_with_token("/api/rides/current-for-captain", &captain_token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await.is_null());
}
