//! MockGameServer - in-process stand-in for the game server
//!
//! Serves the HTTP API the driver talks to from in-memory state, on a random
//! local port. Tests can flip a few switches to make it misbehave and then
//! inspect what the driver did.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A registered account
#[derive(Debug, Clone)]
pub struct MockUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub token: String,
}

/// A character and its place in the world
#[derive(Debug, Clone)]
pub struct MockCharacter {
    pub id: i64,
    pub owner: i64,
    pub name: String,
    pub position: (f64, f64, f64),
    pub in_game: bool,
}

/// Switches for failure scenarios
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Value of `status` in the health report
    pub health_status: String,
    /// Answer /health with 500
    pub health_error: bool,
    /// Delay before answering /health
    pub health_delay: Option<Duration>,
    /// Refuse every character creation
    pub reject_characters: bool,
    /// Delay before answering /game/nearby
    pub nearby_delay: Option<Duration>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            health_status: "ok".to_string(),
            health_error: false,
            health_delay: None,
            reject_characters: false,
            nearby_delay: None,
        }
    }
}

/// Server-side record of everything the driver did
#[derive(Debug, Default)]
pub struct World {
    pub users: Vec<MockUser>,
    pub characters: Vec<MockCharacter>,
    /// "enter:<id>", "exit:<id>", "move:<id>", "nearby:<id>" in arrival order
    pub events: Vec<String>,
    pub health_hits: u32,
    next_id: i64,
}

impl World {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_by_token(&self, headers: &HeaderMap) -> Option<MockUser> {
        let token = headers
            .get("authorization")?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        self.users.iter().find(|u| u.token == token).cloned()
    }

    fn owned_character(&mut self, owner: i64, id: i64) -> Option<&mut MockCharacter> {
        self.characters
            .iter_mut()
            .find(|c| c.id == id && c.owner == owner)
    }

    /// Count events starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.events.iter().filter(|e| e.starts_with(prefix)).count()
    }
}

#[derive(Clone, Default)]
struct MockState {
    world: Arc<Mutex<World>>,
    behavior: Arc<Mutex<Behavior>>,
}

/// Mock game server bound to a random port
pub struct MockGameServer {
    pub addr: SocketAddr,
    state: MockState,
    handle: JoinHandle<()>,
}

impl MockGameServer {
    /// Start a new mock server
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = MockState::default();
        let router = router(state.clone());

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                eprintln!("Mock server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    /// Get the base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Change failure switches
    pub fn configure(&self, f: impl FnOnce(&mut Behavior)) {
        f(&mut self.state.behavior.lock());
    }

    /// Inspect server state
    pub fn world<T>(&self, f: impl FnOnce(&World) -> T) -> T {
        f(&self.state.world.lock())
    }

    /// Character currently owned by `username`, if any
    pub fn character_of(&self, username: &str) -> Option<MockCharacter> {
        self.world(|w| {
            let user = w.users.iter().find(|u| u.username == username)?;
            w.characters.iter().find(|c| c.owner == user.id).cloned()
        })
    }
}

impl Drop for MockGameServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn router(state: MockState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/characters", get(list_characters).post(create_character))
        .route("/game/enter", post(enter_game))
        .route("/game/position", post(update_position))
        .route("/game/nearby", get(nearby))
        .route("/game/exit", post(exit_game))
        .with_state(state)
}

fn fail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn character_id(body: &Value) -> Option<i64> {
    body.get("characterId")?.as_i64()
}

async fn health(State(state): State<MockState>) -> Response {
    let behavior = state.behavior.lock().clone();
    // Counted on arrival, so requests the client gave up on still show up
    state.world.lock().health_hits += 1;
    if let Some(delay) = behavior.health_delay {
        tokio::time::sleep(delay).await;
    }

    let world = state.world.lock();
    if behavior.health_error {
        return fail(StatusCode::INTERNAL_SERVER_ERROR, "database unreachable");
    }

    let active = world.characters.iter().filter(|c| c.in_game).count();
    Json(json!({
        "status": behavior.health_status,
        "services": { "database": "connected", "redis": "connected" },
        "players": { "active": active }
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    username: String,
    email: String,
    password: String,
}

async fn register(State(state): State<MockState>, Json(body): Json<RegisterBody>) -> Response {
    let mut world = state.world.lock();
    if world
        .users
        .iter()
        .any(|u| u.email == body.email || u.username == body.username)
    {
        return fail(StatusCode::BAD_REQUEST, "User already exists");
    }

    let user = MockUser {
        id: world.next_id(),
        username: body.username,
        email: body.email,
        password: body.password,
        token: uuid::Uuid::new_v4().to_string(),
    };
    world.users.push(user.clone());

    Json(json!({
        "token": user.token,
        "user": { "id": user.id, "username": user.username, "email": user.email }
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(state): State<MockState>, Json(body): Json<LoginBody>) -> Response {
    let world = state.world.lock();
    match world
        .users
        .iter()
        .find(|u| u.email == body.email && u.password == body.password)
    {
        Some(user) => Json(json!({
            "token": user.token,
            "user": { "id": user.id, "username": user.username, "email": user.email }
        }))
        .into_response(),
        None => fail(StatusCode::UNAUTHORIZED, "Invalid credentials"),
    }
}

async fn create_character(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let reject = state.behavior.lock().reject_characters;
    let mut world = state.world.lock();
    let Some(user) = world.user_by_token(&headers) else {
        return fail(StatusCode::UNAUTHORIZED, "Unauthorized");
    };
    if reject {
        return fail(StatusCode::FORBIDDEN, "Character creation disabled");
    }

    let Some(name) = body.get("name").and_then(Value::as_str) else {
        return fail(StatusCode::BAD_REQUEST, "Name required");
    };
    if world.characters.iter().any(|c| c.name == name) {
        return fail(StatusCode::BAD_REQUEST, "Character name already taken");
    }

    let character = MockCharacter {
        id: world.next_id(),
        owner: user.id,
        name: name.to_string(),
        position: (0.0, 0.0, 0.0),
        in_game: false,
    };
    world.characters.push(character.clone());

    Json(json!({ "id": character.id, "name": character.name })).into_response()
}

async fn list_characters(State(state): State<MockState>, headers: HeaderMap) -> Response {
    let world = state.world.lock();
    let Some(user) = world.user_by_token(&headers) else {
        return fail(StatusCode::UNAUTHORIZED, "Unauthorized");
    };

    let owned: Vec<Value> = world
        .characters
        .iter()
        .filter(|c| c.owner == user.id)
        .map(|c| json!({ "id": c.id, "name": c.name }))
        .collect();
    Json(Value::Array(owned)).into_response()
}

async fn enter_game(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut world = state.world.lock();
    let Some(user) = world.user_by_token(&headers) else {
        return fail(StatusCode::UNAUTHORIZED, "Unauthorized");
    };
    let Some(id) = character_id(&body) else {
        return fail(StatusCode::BAD_REQUEST, "characterId required");
    };
    let Some(character) = world.owned_character(user.id, id) else {
        return fail(StatusCode::NOT_FOUND, "Character not found");
    };

    character.in_game = true;
    world.events.push(format!("enter:{}", id));
    Json(json!({ "success": true })).into_response()
}

async fn update_position(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut world = state.world.lock();
    let Some(user) = world.user_by_token(&headers) else {
        return fail(StatusCode::UNAUTHORIZED, "Unauthorized");
    };
    let Some(id) = character_id(&body) else {
        return fail(StatusCode::BAD_REQUEST, "characterId required");
    };
    let coord = |axis: &str| body["position"][axis].as_f64().unwrap_or(0.0);
    let position = (coord("x"), coord("y"), coord("z"));

    let Some(character) = world.owned_character(user.id, id) else {
        return fail(StatusCode::NOT_FOUND, "Character not found");
    };
    if !character.in_game {
        return fail(StatusCode::BAD_REQUEST, "Character not in game");
    }

    character.position = position;
    world.events.push(format!("move:{}", id));
    Json(json!({ "success": true })).into_response()
}

async fn nearby(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let delay = state.behavior.lock().nearby_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut world = state.world.lock();
    let Some(user) = world.user_by_token(&headers) else {
        return fail(StatusCode::UNAUTHORIZED, "Unauthorized");
    };
    let Some(id) = params.get("characterId").and_then(|v| v.parse::<i64>().ok()) else {
        return fail(StatusCode::BAD_REQUEST, "characterId required");
    };
    let radius = params
        .get("radius")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(20.0);

    let Some(me) = world.owned_character(user.id, id).map(|c| c.clone()) else {
        return fail(StatusCode::NOT_FOUND, "Character not found");
    };

    let players: Vec<Value> = world
        .characters
        .iter()
        .filter(|c| c.in_game && c.id != me.id)
        .filter_map(|c| {
            let (dx, dy, dz) = (
                c.position.0 - me.position.0,
                c.position.1 - me.position.1,
                c.position.2 - me.position.2,
            );
            let distance = (dx * dx + dy * dy + dz * dz).sqrt();
            (distance <= radius).then(|| {
                json!({
                    "id": c.id,
                    "name": c.name,
                    "position": { "x": c.position.0, "y": c.position.1, "z": c.position.2 },
                    "distance": distance
                })
            })
        })
        .collect();

    world.events.push(format!("nearby:{}", id));
    Json(json!({ "players": players })).into_response()
}

async fn exit_game(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut world = state.world.lock();
    let Some(user) = world.user_by_token(&headers) else {
        return fail(StatusCode::UNAUTHORIZED, "Unauthorized");
    };
    let Some(id) = character_id(&body) else {
        return fail(StatusCode::BAD_REQUEST, "characterId required");
    };
    let Some(character) = world.owned_character(user.id, id) else {
        return fail(StatusCode::NOT_FOUND, "Character not found");
    };

    character.in_game = false;
    world.events.push(format!("exit:{}", id));
    Json(json!({ "success": true })).into_response()
}
