//! Wire types for the game server API

use std::fmt;

use serde::{Deserialize, Serialize};

/// User or character identifier.
///
/// Servers hand these out either as JSON numbers or strings; the value is
/// sent back in whichever form it arrived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Int(i64),
    Text(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Int(n) => write!(f, "{}", n),
            Id::Text(s) => f.write_str(s),
        }
    }
}

/// World position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Position on the ground plane
    pub fn flat(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// This position shifted by `dx`, `dy`
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Token and user id from a successful register or login
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub token: String,
    pub user_id: Option<Id>,
}

/// Register request body
#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// Login request body
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Register and login response
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserInfo>,
}

#[derive(Debug, Deserialize)]
pub struct UserInfo {
    pub id: Option<Id>,
}

/// Create-character request body
#[derive(Debug, Serialize)]
pub struct CreateCharacterRequest<'a> {
    pub name: &'a str,
}

/// Body for enter/exit calls
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRef<'a> {
    pub character_id: &'a Id,
}

/// Position update body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate<'a> {
    pub character_id: &'a Id,
    pub position: Position,
}

/// Response to character creation
#[derive(Debug, Deserialize)]
pub struct CreatedCharacter {
    pub id: Option<Id>,
}

/// A character owned by the user
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Character {
    pub id: Id,
    #[serde(default)]
    pub name: String,
}

/// Health endpoint report
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthReport {
    #[serde(default = "unknown")]
    pub status: String,
    #[serde(default)]
    pub services: ServiceStatus,
    #[serde(default)]
    pub players: Option<PlayerCounts>,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Backing service states reported by the health endpoint
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ServiceStatus {
    pub database: Option<String>,
    pub redis: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct PlayerCounts {
    #[serde(default)]
    pub active: u64,
}

/// Proximity query response
#[derive(Debug, Deserialize)]
pub struct NearbyResponse {
    #[serde(default)]
    pub players: Vec<NearbyPlayer>,
}

/// Another player within the query radius
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NearbyPlayer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub distance: f64,
}

fn unknown() -> String {
    "unknown".to_string()
}
