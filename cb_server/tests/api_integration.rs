//! HTTP API integration tests over the in-memory repository.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use cb_server::api::{AppState, create_router};
use chrono::{Duration, TimeZone, Utc};
use club_bracket::db::InMemoryBracketRepository;
use club_bracket::tournament::{
    BracketManager, Participant, RankTier, RewardPolicy, Tournament, TournamentStatus,
    TournamentType,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method

async fn create_test_server(players: i64) -> (axum::Router, Arc<InMemoryBracketRepository>) {
    let repo = Arc::new(InMemoryBracketRepository::new());
    repo.add_tournament(Tournament {
        id: 1,
        name: "Friday nine-ball".to_string(),
        tournament_type: TournamentType::SingleElimination,
        max_participants: 16,
        current_participants: 0,
        status: TournamentStatus::RegistrationClosed,
        has_third_place_match: true,
    })
    .await;

    let opened = Utc.with_ymd_and_hms(2026, 5, 8, 19, 0, 0).unwrap();
    for i in 1..=players {
        repo.add_participant(
            1,
            Participant {
                player_id: i,
                display_name: format!("Player {i}"),
                elo_rating: 1800 - (i as i32) * 20,
                rank_tier: RankTier::H,
                registered_at: opened + Duration::minutes(i),
            },
        )
        .await;
    }

    let manager = BracketManager::new(repo.clone(), Arc::new(RewardPolicy::default()));
    let app = create_router(AppState {
        manager: Arc::new(manager),
    });
    (app, repo)
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn post(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn generate(app: &axum::Router) -> Value {
    let (status, body) = post(
        app,
        "/api/v1/tournaments/1/bracket",
        json!({ "seeding_method": "elo_ranking" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_check_endpoint() {
    let (app, _) = create_test_server(4).await;

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "health-check-1")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "health-check-1"
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn test_health_check_reports_storage_outage() {
    let (app, repo) = create_test_server(4).await;
    repo.set_unavailable(true).await;

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn test_request_id_generated_when_absent() {
    let (app, _) = create_test_server(4).await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    let id = response.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

// ============================================================================
// Bracket Tests
// ============================================================================

#[tokio::test]
async fn test_check_then_generate() {
    let (app, _) = create_test_server(6).await;

    let (status, body) = get(&app, "/api/v1/tournaments/1/bracket/check").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["valid"], true);
    assert_eq!(body["data"]["participant_count"], 6);
    assert_eq!(body["data"]["bracket_exists"], false);

    let body = generate(&app).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["bracket_size"], 8);
    assert_eq!(body["data"]["byes"], 2);
    assert_eq!(body["data"]["rounds"], 3);
    // 4 + 2 + 1 main draw plus the third-place match
    assert_eq!(body["data"]["matches_created"], 8);

    let (_, body) = get(&app, "/api/v1/tournaments/1/bracket/check").await;
    assert_eq!(body["data"]["bracket_exists"], true);
}

#[tokio::test]
async fn test_generate_twice_conflicts() {
    let (app, _) = create_test_server(4).await;
    generate(&app).await;

    let (status, body) = post(
        &app,
        "/api/v1/tournaments/1/bracket",
        json!({ "seeding_method": "elo_ranking" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "bracket_already_exists");
    assert_eq!(body["retryable"], false);

    let (status, body) = post(
        &app,
        "/api/v1/tournaments/1/bracket",
        json!({ "seeding_method": "random", "force_regenerate": true, "random_seed": 7 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["regenerated"], true);
}

#[tokio::test]
async fn test_generate_with_one_player_rejected() {
    let (app, _) = create_test_server(1).await;

    let (status, body) = post(
        &app,
        "/api/v1/tournaments/1/bracket",
        json!({ "seeding_method": "registration_order" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "invalid_participant_count");
}

#[tokio::test]
async fn test_unknown_tournament_is_not_found() {
    let (app, _) = create_test_server(4).await;

    let (status, body) = get(&app, "/api/v1/tournaments/999/bracket").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "bracket_not_found");

    let (status, body) = get(&app, "/api/v1/tournaments/999/results").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "tournament_not_found");
}

#[tokio::test]
async fn test_bracket_view_and_verify() {
    let (app, _) = create_test_server(8).await;
    generate(&app).await;

    let (status, body) = get(&app, "/api/v1/tournaments/1/bracket").await;
    assert_eq!(status, StatusCode::OK);
    let rounds = body["data"]["rounds"].as_array().unwrap();
    let labels: Vec<_> = rounds.iter().map(|r| r["label"].as_str().unwrap()).collect();
    assert_eq!(labels, vec!["Quarterfinals", "Semifinals", "Final"]);
    assert!(body["data"]["third_place_match"].is_object());
    assert!(body["data"].get("champion").is_none());

    let (status, body) = get(&app, "/api/v1/tournaments/1/bracket/verify").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], true);
    assert_eq!(body["data"]["expected_matches"], 8);
}

// ============================================================================
// Match Tests
// ============================================================================

#[tokio::test]
async fn test_full_tournament_over_http() {
    let (app, repo) = create_test_server(4).await;
    generate(&app).await;

    let mut last = Value::Null;
    loop {
        let (status, body) = get(&app, "/api/v1/tournaments/1/matches/pending").await;
        assert_eq!(status, StatusCode::OK);
        let pending = body["data"].as_array().unwrap().clone();
        let Some(next) = pending.first() else {
            break;
        };

        let id = next["id"].as_str().unwrap();
        let p1 = next["player1_id"].as_i64().unwrap();
        let p2 = next["player2_id"].as_i64().unwrap();

        let (status, _) = post(&app, &format!("/api/v1/matches/{id}/start"), json!({})).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = post(
            &app,
            &format!("/api/v1/matches/{id}/result"),
            json!({ "winner_id": p1.min(p2), "score_player1": 5, "score_player2": 3 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        last = body;
    }

    assert_eq!(last["data"]["tournament_complete"], true);
    let standings = last["data"]["final_results"].as_array().unwrap();
    assert_eq!(standings.len(), 4);

    let (status, body) = get(&app, "/api/v1/tournaments/1/results").await;
    assert_eq!(status, StatusCode::OK);
    let champion = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["final_position"] == 1)
        .unwrap();
    assert_eq!(champion["player_id"], 1);
    // Tier H pays 1000 * 140%
    assert_eq!(champion["spa_points_earned"], 1400);

    let (_, view) = get(&app, "/api/v1/tournaments/1/bracket").await;
    assert_eq!(view["data"]["champion"], 1);

    let (status, body) = post(&app, "/api/v1/tournaments/1/finalize", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["already_finalized"], true);
    assert_eq!(repo.ranking(1).await.unwrap().1, 1400);
}

#[tokio::test]
async fn test_report_twice_is_rejected() {
    let (app, _) = create_test_server(4).await;
    generate(&app).await;

    let (_, body) = get(&app, "/api/v1/tournaments/1/matches/pending").await;
    let first = &body["data"][0];
    let id = first["id"].as_str().unwrap();
    let winner = first["player1_id"].as_i64().unwrap();
    let result = json!({ "winner_id": winner, "score_player1": 5, "score_player2": 2 });

    let (status, body) = post(&app, &format!("/api/v1/matches/{id}/result"), result.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["next_round"], 2);
    assert_eq!(body["data"]["next_match_number"], 1);

    let (status, body) = post(&app, &format!("/api/v1/matches/{id}/result"), result).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "invalid_match_state");
}

#[tokio::test]
async fn test_winner_outside_match_rejected() {
    let (app, _) = create_test_server(4).await;
    generate(&app).await;

    let (_, body) = get(&app, "/api/v1/tournaments/1/matches/pending").await;
    let id = body["data"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = post(
        &app,
        &format!("/api/v1/matches/{id}/result"),
        json!({ "winner_id": 999, "score_player1": 5, "score_player2": 2 }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("winner"));
}

#[tokio::test]
async fn test_oversized_score_is_validation_error() {
    let (app, _) = create_test_server(4).await;
    generate(&app).await;

    let (_, body) = get(&app, "/api/v1/tournaments/1/matches/pending").await;
    let id = body["data"][0]["id"].as_str().unwrap().to_string();
    let winner = body["data"][0]["player1_id"].as_i64().unwrap();

    let (status, body) = post(
        &app,
        &format!("/api/v1/matches/{id}/result"),
        json!({ "winner_id": winner, "score_player1": 3_000_000_000u32, "score_player2": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "invalid_match_state");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_finalize_before_completion_conflicts() {
    let (app, _) = create_test_server(4).await;
    generate(&app).await;

    let (status, body) = post(&app, "/api/v1/tournaments/1/finalize", json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "tournament_not_complete");
}

#[tokio::test]
async fn test_advance_is_idempotent() {
    let (app, _) = create_test_server(4).await;
    generate(&app).await;

    let (_, body) = get(&app, "/api/v1/tournaments/1/matches/pending").await;
    let first = &body["data"][0];
    let id = first["id"].as_str().unwrap().to_string();
    let winner = first["player1_id"].as_i64().unwrap();
    post(
        &app,
        &format!("/api/v1/matches/{id}/result"),
        json!({ "winner_id": winner, "score_player1": 5, "score_player2": 2 }),
    )
    .await;

    for _ in 0..2 {
        let (status, body) = post(
            &app,
            &format!("/api/v1/matches/{id}/advance"),
            json!({ "tournament_id": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["winner_id"], winner);
    }
}

#[tokio::test]
async fn test_unknown_match_is_not_found() {
    let (app, _) = create_test_server(4).await;
    generate(&app).await;

    let missing = uuid::Uuid::new_v4();
    let (status, body) = post(&app, &format!("/api/v1/matches/{missing}/start"), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "match_not_found");
}

#[tokio::test]
async fn test_malformed_match_id_rejected() {
    let (app, _) = create_test_server(4).await;

    let (status, _) = post(&app, "/api/v1/matches/not-a-uuid/start", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_storage_outage_is_retryable() {
    let (app, repo) = create_test_server(4).await;
    generate(&app).await;
    repo.set_unavailable(true).await;

    let (status, body) = get(&app, "/api/v1/tournaments/1/bracket").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "storage_unavailable");
    assert_eq!(body["retryable"], true);
}
