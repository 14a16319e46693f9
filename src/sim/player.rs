//! A single virtual player
//!
//! Logs in, picks a character, enters the world, then wanders around its
//! base position and polls for neighbours until time runs out or the
//! coordinator asks it to stop. Once in the world it always exits again.

use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::client::types::{Id, Position};
use crate::client::GameClient;
use crate::config::SimulationConfig;

/// Password shared by all generated players
pub const PLAYER_PASSWORD: &str = "password123";

/// Spacing between neighbouring players' base positions
pub const PLAYER_SPACING: f64 = 5.0;

/// Generated identity of a virtual player
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerProfile {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Position the player wanders around
    pub base: Position,
}

impl PlayerProfile {
    /// Profile for player `n` (1-based)
    pub fn numbered(n: u32) -> Self {
        let offset = f64::from(n.saturating_sub(1)) * PLAYER_SPACING;
        Self {
            username: format!("TestPlayer_{}", n),
            email: format!("player{}@test.com", n),
            password: PLAYER_PASSWORD.to_string(),
            base: Position::flat(offset, offset),
        }
    }

    /// Profiles for players `1..=count`
    pub fn roster(count: u32) -> Vec<Self> {
        (1..=count).map(Self::numbered).collect()
    }

    pub fn character_name(&self) -> String {
        format!("{}_Hero", self.username)
    }
}

/// Small deterministic wobble around the base position, driven by wall-clock
/// seconds. Stays within +/-2.5 on x and +/-3.5 on y.
pub fn wander_offset(t: f64) -> (f64, f64) {
    (t.rem_euclid(5.0) - 2.5, t.rem_euclid(7.0) - 3.5)
}

/// Where a player gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortStage {
    Auth,
    Character,
    EnterGame,
}

impl fmt::Display for AbortStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            AbortStage::Auth => "register/login",
            AbortStage::Character => "character",
            AbortStage::EnterGame => "enter game",
        };
        f.write_str(stage)
    }
}

/// How a player's run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerOutcome {
    /// Played for the full duration and exited
    Completed,
    /// Stopped early on request and exited
    Stopped,
    Aborted(AbortStage),
    /// The player task panicked
    Unfinished,
}

/// Success/failure counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub ok: u32,
    pub failed: u32,
}

impl Tally {
    pub fn record(&mut self, ok: bool) {
        if ok {
            self.ok += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn total(&self) -> u32 {
        self.ok + self.failed
    }
}

impl std::ops::AddAssign for Tally {
    fn add_assign(&mut self, other: Self) {
        self.ok += other.ok;
        self.failed += other.failed;
    }
}

/// What one player did
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerReport {
    pub username: String,
    pub outcome: PlayerOutcome,
    pub moves: Tally,
    pub nearby_checks: Tally,
    /// Whether the exit call succeeded (`None` if the player never entered)
    pub exited: Option<bool>,
}

impl PlayerReport {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            outcome: PlayerOutcome::Unfinished,
            moves: Tally::default(),
            nearby_checks: Tally::default(),
            exited: None,
        }
    }

    fn aborted(mut self, stage: AbortStage) -> Self {
        self.outcome = PlayerOutcome::Aborted(stage);
        self
    }
}

/// A player running the scripted session
pub struct VirtualPlayer {
    client: GameClient,
    profile: PlayerProfile,
    settings: SimulationConfig,
    radius: f64,
    stop: watch::Receiver<bool>,
}

impl VirtualPlayer {
    pub fn new(
        client: GameClient,
        profile: PlayerProfile,
        settings: SimulationConfig,
        radius: f64,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            profile,
            settings,
            radius,
            stop,
        }
    }

    pub fn profile(&self) -> &PlayerProfile {
        &self.profile
    }

    /// Run the whole session
    pub async fn run(mut self) -> PlayerReport {
        let username = self.profile.username.clone();
        let mut report = PlayerReport::new(&username);
        info!("Starting simulation for {}", username);

        let Some(credentials) = self
            .client
            .register(&username, &self.profile.email, &self.profile.password)
            .await
        else {
            error!("Failed to register/login {}", username);
            return report.aborted(AbortStage::Auth);
        };
        let token = credentials.token;

        let Some(character_id) = self.pick_character(&token).await else {
            error!("Failed to create/get character for {}", username);
            return report.aborted(AbortStage::Character);
        };

        if !self.client.enter_game(&token, &character_id).await {
            error!("Failed to enter game for {}", username);
            return report.aborted(AbortStage::EnterGame);
        }

        if !self
            .client
            .update_position(&token, &character_id, self.profile.base)
            .await
        {
            warn!(
                "Failed to set initial position for {}, but continuing",
                username
            );
        }

        let stopped = self.wander(&token, &character_id, &mut report).await;

        report.exited = Some(self.client.exit_game(&token, &character_id).await);
        report.outcome = if stopped {
            PlayerOutcome::Stopped
        } else {
            PlayerOutcome::Completed
        };
        info!("Simulation for {} completed", username);

        report
    }

    /// Create this player's hero, or fall back to a character it already owns
    async fn pick_character(&self, token: &str) -> Option<Id> {
        if let Some(id) = self
            .client
            .create_character(token, &self.profile.character_name())
            .await
        {
            return Some(id);
        }

        let existing = self.client.first_character(token).await?;
        info!(
            "Using existing character: {} (ID: {})",
            existing.name, existing.id
        );
        Some(existing.id)
    }

    /// Main loop. Returns true if the player was told to stop early.
    async fn wander(&mut self, token: &str, character_id: &Id, report: &mut PlayerReport) -> bool {
        let duration = self.settings.duration();
        let tick = self.settings.tick();
        let (move_interval, check_interval) = {
            let mut rng = rand::rng();
            (
                self.settings.move_interval(&mut rng),
                self.settings.check_interval(&mut rng),
            )
        };

        let start = Instant::now();
        let mut last_move = start;
        let mut last_check = start;

        while start.elapsed() < duration {
            if *self.stop.borrow() {
                return true;
            }

            let now = Instant::now();

            if now.duration_since(last_check) >= check_interval {
                let (ok, _) = self
                    .client
                    .nearby_players(token, character_id, self.radius)
                    .await;
                report.nearby_checks.record(ok);
                last_check = now;
            }

            if now.duration_since(last_move) >= move_interval {
                let (dx, dy) = wander_offset(wall_clock_secs());
                let target = self.profile.base.offset(dx, dy);
                let ok = self
                    .client
                    .update_position(token, character_id, target)
                    .await;
                report.moves.record(ok);
                last_move = now;
            }

            tokio::select! {
                _ = sleep(tick) => {}
                changed = self.stop.changed() => {
                    // A dropped coordinator counts as a stop request
                    if changed.is_err() || *self.stop.borrow() {
                        return true;
                    }
                }
            }
        }

        false
    }
}

fn wall_clock_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
