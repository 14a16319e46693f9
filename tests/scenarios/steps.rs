//! Step driver scenarios

use crate::harness::{fast_config, MockGameServer};
use mmosim::client::types::Id;
use mmosim::{GameClient, RunStatus, Step, StepRunner};

async fn setup() -> (MockGameServer, GameClient, StepRunner) {
    let server = MockGameServer::start().await.expect("Failed to start server");
    let config = fast_config(&server);
    let client = GameClient::new(&config).expect("client");
    let runner = StepRunner::new(client.clone(), config);
    (server, client, runner)
}

/// Create the test user (and optionally their hero) ahead of a direct step
async fn seed_test_user(client: &GameClient, with_character: bool) -> (String, Option<Id>) {
    let token = client
        .register("TestUser", "testuser@example.com", "password123")
        .await
        .expect("register")
        .token;
    let id = if with_character {
        client.create_character(&token, "TestHero").await
    } else {
        None
    };
    (token, id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_steps_complete() {
    let (server, _client, mut runner) = setup().await;

    let status = runner.run(Step::All).await;
    assert_eq!(status, RunStatus::Completed);

    let session = runner.session();
    assert!(session.token.is_some());
    assert_eq!(session.user_id, Some(Id::Int(1)));
    let hero_id = session.character_id.clone().expect("character");

    let hero = server.character_of("TestUser").expect("hero");
    assert_eq!(Id::Int(hero.id), hero_id);
    assert_eq!(hero.name, "TestHero");
    assert_eq!(hero.position, (10.0, 10.0, 0.0));
    assert!(!hero.in_game, "exit step should leave the world");

    let report = runner.simulation_report().expect("simulation ran");
    assert_eq!(report.players.len(), 2);
    assert_eq!(report.finished(), 2);

    // TestUser plus the two simulated players
    assert_eq!(server.world(|w| w.users.len()), 3);
    assert_eq!(server.world(|w| w.count(&format!("enter:{}", hero.id))), 1);
    assert_eq!(server.world(|w| w.count(&format!("exit:{}", hero.id))), 1);
    assert_eq!(server.world(|w| w.count(&format!("nearby:{}", hero.id))), 1);
}

#[tokio::test]
async fn test_all_aborts_when_unhealthy() {
    let (server, _client, mut runner) = setup().await;
    server.configure(|b| b.health_status = "degraded".to_string());

    assert_eq!(runner.run(Step::All).await, RunStatus::Aborted);
    assert_eq!(server.world(|w| w.users.len()), 0);
}

#[tokio::test]
async fn test_health_step_alone_does_not_abort() {
    let (server, _client, mut runner) = setup().await;
    server.configure(|b| b.health_error = true);

    assert_eq!(runner.run(Step::Health).await, RunStatus::Completed);
    assert_eq!(server.world(|w| w.health_hits), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_reuses_existing_character() {
    let (server, client, mut runner) = setup().await;
    let (_, existing) = seed_test_user(&client, true).await;

    assert_eq!(runner.run(Step::All).await, RunStatus::Completed);
    assert_eq!(runner.session().character_id, existing);
    assert_eq!(server.world(|w| w.users.len()), 3);
}

#[tokio::test]
async fn test_all_aborts_without_any_character() {
    let (server, _client, mut runner) = setup().await;
    server.configure(|b| b.reject_characters = true);

    assert_eq!(runner.run(Step::All).await, RunStatus::Aborted);
    assert_eq!(server.world(|w| w.count("enter:")), 0);
}

#[tokio::test]
async fn test_user_step_registers() {
    let (server, _client, mut runner) = setup().await;

    assert_eq!(runner.run(Step::User).await, RunStatus::Completed);
    assert!(runner.session().token.is_some());
    assert_eq!(server.world(|w| w.users[0].username.clone()), "TestUser");
}

#[tokio::test]
async fn test_character_step_needs_an_account() {
    let (_server, _client, mut runner) = setup().await;

    assert_eq!(runner.run(Step::Character).await, RunStatus::Aborted);
}

#[tokio::test]
async fn test_character_step_logs_in_first() {
    let (server, client, mut runner) = setup().await;
    seed_test_user(&client, false).await;

    assert_eq!(runner.run(Step::Character).await, RunStatus::Completed);
    assert!(server.character_of("TestUser").is_some());
}

#[tokio::test]
async fn test_enter_step_creates_missing_character() {
    let (server, client, mut runner) = setup().await;
    seed_test_user(&client, false).await;

    assert_eq!(runner.run(Step::Enter).await, RunStatus::Completed);
    let hero = server.character_of("TestUser").expect("hero created");
    assert_eq!(hero.name, "TestHero");
    assert!(hero.in_game);
}

#[tokio::test]
async fn test_position_step_enters_and_moves() {
    let (server, client, mut runner) = setup().await;
    seed_test_user(&client, true).await;

    assert_eq!(runner.run(Step::Position).await, RunStatus::Completed);
    let hero = server.character_of("TestUser").expect("hero");
    assert!(hero.in_game);
    assert_eq!(hero.position, (10.0, 10.0, 0.0));
}

#[tokio::test]
async fn test_nearby_step_without_character_aborts() {
    let (server, client, mut runner) = setup().await;
    seed_test_user(&client, false).await;

    assert_eq!(runner.run(Step::Nearby).await, RunStatus::Aborted);
    assert_eq!(server.world(|w| w.count("nearby:")), 0);
}

#[tokio::test]
async fn test_nearby_step_queries() {
    let (server, client, mut runner) = setup().await;
    seed_test_user(&client, true).await;

    assert_eq!(runner.run(Step::Nearby).await, RunStatus::Completed);
    assert_eq!(server.world(|w| w.count("nearby:")), 1);
}

#[tokio::test]
async fn test_exit_step_leaves_world() {
    let (server, client, mut runner) = setup().await;
    let (token, id) = seed_test_user(&client, true).await;
    let id = id.expect("character");
    assert!(client.enter_game(&token, &id).await);

    assert_eq!(runner.run(Step::Exit).await, RunStatus::Completed);
    assert!(!server.character_of("TestUser").expect("hero").in_game);
    // The exit step does not enter the world on its own
    assert_eq!(server.world(|w| w.count("enter:")), 1);
}
