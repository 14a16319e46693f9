//! Game server HTTP client
//!
//! Provides:
//! - `send`, a request loop that retries transport failures with jittered delay
//! - One wrapper per API call; each logs its outcome and reports plain success
//!   or failure instead of an error

mod error;
mod retry;
pub mod types;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
pub use error::ClientError;
pub use retry::RetryPolicy;
use types::{
    AuthResponse, Character, CharacterRef, CreateCharacterRequest, CreatedCharacter,
    Credentials, HealthReport, Id, LoginRequest, NearbyPlayer, NearbyResponse, Position,
    PositionUpdate, RegisterRequest,
};

/// A single API request
#[derive(Debug, Clone)]
pub struct ApiCall<'a> {
    method: Method,
    path: &'a str,
    token: Option<&'a str>,
    body: Option<serde_json::Value>,
    query: Vec<(&'static str, String)>,
}

impl<'a> ApiCall<'a> {
    pub fn new(method: Method, path: &'a str) -> Self {
        Self {
            method,
            path,
            token: None,
            body: None,
            query: Vec::new(),
        }
    }

    pub fn get(path: &'a str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &'a str) -> Self {
        Self::new(Method::POST, path)
    }

    /// Authenticate with a bearer token
    pub fn bearer(mut self, token: &'a str) -> Self {
        self.token = Some(token);
        self
    }

    /// Attach a JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Append a query parameter
    pub fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }
}

/// A fully read response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// HTTP client for the game server.
///
/// Cloning is cheap and clones share the connection pool.
#[derive(Debug, Clone)]
pub struct GameClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl GameClient {
    /// Create a client from the driver configuration
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            retry: RetryPolicy::new(config.max_retries, config.retry_delay()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Send a request, retrying transport failures.
    ///
    /// Any HTTP status counts as an answer and is returned as is. Timeouts,
    /// connection failures and other request errors are retried until the
    /// policy runs out of attempts, then the last error is returned.
    pub async fn send(&self, call: &ApiCall<'_>) -> Result<ApiResponse, ClientError> {
        let url = format!("{}{}", self.base_url, call.path);
        let mut attempt: u32 = 0;

        loop {
            if attempt > 0 {
                let delay = self.retry.backoff(&mut rand::rng());
                info!(
                    "Retry attempt {}/{} after {:.1}s delay",
                    attempt,
                    self.retry.max_retries,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(call, &url).await {
                Ok(response) => {
                    if response.status.is_client_error() || response.status.is_server_error() {
                        debug!(
                            "Request failed: {} {}, status: {}",
                            call.method, url, response.status
                        );
                        debug!("Response: {}", response.body);
                    }
                    return Ok(response);
                }
                Err(err) => {
                    match &err {
                        ClientError::Timeout(_) => {
                            warn!("Timeout on {} {}", call.method, call.path)
                        }
                        ClientError::Connect(_) => {
                            warn!("Connection error on {} {}", call.method, call.path)
                        }
                        other => {
                            warn!("Request error on {} {}: {}", call.method, call.path, other)
                        }
                    }

                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt.saturating_add(1) >= self.retry.attempts() {
                        error!("Maximum retries reached for {} {}", call.method, call.path);
                        return Err(err);
                    }
                }
            }

            attempt += 1;
        }
    }

    async fn attempt(&self, call: &ApiCall<'_>, url: &str) -> Result<ApiResponse, ClientError> {
        let mut request = self.http.request(call.method.clone(), url);
        if let Some(token) = call.token {
            request = request.bearer_auth(token);
        }
        if !call.query.is_empty() {
            request = request.query(&call.query);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ClientError::transport)?;
        let status = response.status();
        let body = response.text().await.map_err(ClientError::transport)?;

        Ok(ApiResponse { status, body })
    }

    /// Check whether the server is healthy.
    ///
    /// Returns the parsed report whenever the server answered 200, including
    /// when it reports a degraded status.
    pub async fn check_health(&self) -> (bool, Option<HealthReport>) {
        info!("Checking server health at {}/health", self.base_url);

        let response = match self.send(&ApiCall::get("/health")).await {
            Ok(response) => response,
            Err(e) => {
                error!("Server health check failed: {}", e);
                return (false, None);
            }
        };

        if !response.is_ok() {
            error!(
                "Server health check failed with status code: {}",
                response.status.as_u16()
            );
            error!("Response: {}", response.body);
            return (false, None);
        }

        let report: HealthReport = match response.json() {
            Ok(report) => report,
            Err(e) => {
                error!("Server health check failed: {}", e);
                return (false, None);
            }
        };

        if !report.is_ok() {
            warn!(
                "Server health check reports degraded status: {}",
                report.status
            );
            warn!("Health details: {:?}", report);
            return (false, Some(report));
        }

        info!("Server is healthy: {}", report.status);
        info!(
            "Database: {}",
            report.services.database.as_deref().unwrap_or("unknown")
        );
        info!(
            "Redis: {}",
            report.services.redis.as_deref().unwrap_or("unknown")
        );
        if let Some(players) = &report.players {
            info!("Active players: {}", players.active);
        }

        (true, Some(report))
    }

    /// Register a user, falling back to login when the account already exists
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Option<Credentials> {
        info!("Registering test user: {}", username);

        let body = RegisterRequest {
            username,
            email,
            password,
        };
        let response = match self.post("/auth/register", None, &body).await {
            Ok(response) => response,
            Err(e) => {
                error!("Registration failed: {}", e);
                return None;
            }
        };

        if response.is_ok() {
            let credentials = read_credentials(&response, "Registration")?;
            info!(
                "Registered: {} (ID: {})",
                username,
                display_id(credentials.user_id.as_ref())
            );
            Some(credentials)
        } else if response.status == StatusCode::BAD_REQUEST
            && response.body.contains("already exists")
        {
            info!("User {} already exists, attempting login...", username);
            self.login(email, password).await
        } else {
            error!("Registration failed: {}", response.body);
            None
        }
    }

    /// Log in with email and password
    pub async fn login(&self, email: &str, password: &str) -> Option<Credentials> {
        info!("Logging in user: {}", email);

        let body = LoginRequest { email, password };
        let response = match self.post("/auth/login", None, &body).await {
            Ok(response) => response,
            Err(e) => {
                error!("Login failed: {}", e);
                return None;
            }
        };

        if !response.is_ok() {
            error!("Login failed: {}", response.body);
            return None;
        }

        let credentials = read_credentials(&response, "Login")?;
        info!(
            "Logged in user: {} (ID: {})",
            email,
            display_id(credentials.user_id.as_ref())
        );
        Some(credentials)
    }

    /// Create a character, returning its id
    pub async fn create_character(&self, token: &str, name: &str) -> Option<Id> {
        info!("Creating character: {}", name);

        let body = CreateCharacterRequest { name };
        let response = match self.post("/characters", Some(token), &body).await {
            Ok(response) => response,
            Err(e) => {
                error!("Character creation failed: {}", e);
                return None;
            }
        };

        if !response.is_ok() {
            error!("Character creation failed: {}", response.body);
            return None;
        }

        match response.json::<CreatedCharacter>() {
            Ok(CreatedCharacter { id: Some(id) }) => {
                info!("Character created: {} (ID: {})", name, id);
                Some(id)
            }
            Ok(CreatedCharacter { id: None }) => {
                error!("Character creation failed: response carried no id");
                None
            }
            Err(e) => {
                error!("Character creation failed: {}", e);
                None
            }
        }
    }

    /// List the user's characters. An empty list is still a success.
    pub async fn list_characters(&self, token: &str) -> (bool, Vec<Character>) {
        info!("Retrieving user characters");

        let response = match self.send(&ApiCall::get("/characters").bearer(token)).await {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to get characters: {}", e);
                return (false, Vec::new());
            }
        };

        if !response.is_ok() {
            error!("Failed to get characters: {}", response.body);
            return (false, Vec::new());
        }

        let characters: Vec<Character> = match response.json() {
            Ok(characters) => characters,
            Err(e) => {
                error!("Failed to get characters: {}", e);
                return (false, Vec::new());
            }
        };

        if characters.is_empty() {
            warn!("No characters found for user");
        } else {
            info!("Found {} characters", characters.len());
            for character in &characters {
                info!("  - {} (ID: {})", character.name, character.id);
            }
        }

        (true, characters)
    }

    /// First character owned by the user, if any
    pub async fn first_character(&self, token: &str) -> Option<Character> {
        let (ok, characters) = self.list_characters(token).await;
        if ok {
            characters.into_iter().next()
        } else {
            None
        }
    }

    /// Enter the game world
    pub async fn enter_game(&self, token: &str, character_id: &Id) -> bool {
        info!("Entering game with character ID: {}", character_id);

        let body = CharacterRef { character_id };
        match self.post("/game/enter", Some(token), &body).await {
            Ok(response) if response.is_ok() => {
                info!("Entered game with character ID: {}", character_id);
                true
            }
            Ok(response) => {
                error!("Failed to enter game: {}", response.body);
                false
            }
            Err(e) => {
                error!("Failed to enter game: {}", e);
                false
            }
        }
    }

    /// Move the character
    pub async fn update_position(&self, token: &str, character_id: &Id, position: Position) -> bool {
        info!("Moving character to position {}", position);

        let body = PositionUpdate {
            character_id,
            position,
        };
        match self.post("/game/position", Some(token), &body).await {
            Ok(response) if response.is_ok() => {
                info!("Moved to position: {}", position);
                true
            }
            Ok(response) => {
                error!("Failed to move: {}", response.body);
                false
            }
            Err(e) => {
                error!("Failed to move: {}", e);
                false
            }
        }
    }

    /// Other players within `radius` of the character
    pub async fn nearby_players(
        &self,
        token: &str,
        character_id: &Id,
        radius: f64,
    ) -> (bool, Vec<NearbyPlayer>) {
        info!("Checking for nearby players (radius: {})", radius);

        let call = ApiCall::get("/game/nearby")
            .bearer(token)
            .query("characterId", character_id)
            .query("radius", radius);
        let response = match self.send(&call).await {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to check nearby players: {}", e);
                return (false, Vec::new());
            }
        };

        if !response.is_ok() {
            error!("Failed to check nearby players: {}", response.body);
            return (false, Vec::new());
        }

        let nearby = match response.json::<NearbyResponse>() {
            Ok(nearby) => nearby.players,
            Err(e) => {
                error!("Failed to check nearby players: {}", e);
                return (false, Vec::new());
            }
        };

        if nearby.is_empty() {
            info!("No nearby players found");
        } else {
            info!("Found {} nearby players:", nearby.len());
            for player in &nearby {
                info!(
                    "  - {} at position {}, distance: {:.2}",
                    player.name, player.position, player.distance
                );
            }
        }

        (true, nearby)
    }

    /// Leave the game world
    pub async fn exit_game(&self, token: &str, character_id: &Id) -> bool {
        info!("Exiting game with character ID: {}", character_id);

        let body = CharacterRef { character_id };
        match self.post("/game/exit", Some(token), &body).await {
            Ok(response) if response.is_ok() => {
                info!("Exited game with character ID: {}", character_id);
                true
            }
            Ok(response) => {
                error!("Failed to exit game: {}", response.body);
                false
            }
            Err(e) => {
                error!("Failed to exit game: {}", e);
                false
            }
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &T,
    ) -> Result<ApiResponse, ClientError> {
        let mut call = ApiCall::post(path).json(body)?;
        if let Some(token) = token {
            call = call.bearer(token);
        }
        self.send(&call).await
    }
}

fn read_credentials(response: &ApiResponse, action: &str) -> Option<Credentials> {
    let auth: AuthResponse = match response.json() {
        Ok(auth) => auth,
        Err(e) => {
            error!("{} failed: {}", action, e);
            return None;
        }
    };

    let Some(token) = auth.token else {
        error!("{} failed: response carried no token", action);
        return None;
    };

    Some(Credentials {
        token,
        user_id: auth.user.and_then(|user| user.id),
    })
}

fn display_id(id: Option<&Id>) -> String {
    id.map(ToString::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}
