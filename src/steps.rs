//! Step-by-step driver
//!
//! Runs one step of the client lifecycle, or all of them in order. Steps
//! share a session (token, user id, character id). In `all` mode a failed
//! prerequisite aborts the run; a step run on its own sets up whatever it
//! needs by logging in with the test identity.

use std::fmt;
use std::process::ExitCode;

use clap::ValueEnum;
use tracing::{error, info, warn};

use crate::client::types::{Id, Position};
use crate::client::GameClient;
use crate::config::Config;
use crate::sim::{Simulation, SimulationReport};

/// Selectable test step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Step {
    #[default]
    All,
    Health,
    User,
    Character,
    Enter,
    Position,
    Nearby,
    Exit,
    Simulate,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::All => "all",
            Step::Health => "health",
            Step::User => "user",
            Step::Character => "character",
            Step::Enter => "enter",
            Step::Position => "position",
            Step::Nearby => "nearby",
            Step::Exit => "exit",
            Step::Simulate => "simulate",
        }
    }

    /// Whether running `self` includes `step`
    pub fn includes(self, step: Step) -> bool {
        self == Step::All || self == step
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Aborted,
}

impl RunStatus {
    pub fn exit_code(self) -> ExitCode {
        match self {
            RunStatus::Completed => ExitCode::SUCCESS,
            RunStatus::Aborted => ExitCode::from(1),
        }
    }
}

/// Values carried from one step to the next
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub token: Option<String>,
    pub user_id: Option<Id>,
    pub character_id: Option<Id>,
}

impl Session {
    /// Token and character, if both are known
    fn ready(&self) -> Option<(String, Id)> {
        Some((self.token.clone()?, self.character_id.clone()?))
    }
}

/// Runs steps against one server
pub struct StepRunner {
    client: GameClient,
    config: Config,
    session: Session,
    simulation: Option<SimulationReport>,
}

impl StepRunner {
    pub fn new(client: GameClient, config: Config) -> Self {
        Self {
            client,
            config,
            session: Session::default(),
            simulation: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Report of the simulation step, if it ran
    pub fn simulation_report(&self) -> Option<&SimulationReport> {
        self.simulation.as_ref()
    }

    /// Run `step` (or every step, for `Step::All`)
    pub async fn run(&mut self, step: Step) -> RunStatus {
        let all = step == Step::All;

        if step.includes(Step::Health) {
            let (healthy, _) = self.client.check_health().await;
            if !healthy && all {
                error!("Health check failed, aborting further tests");
                return RunStatus::Aborted;
            }
        }

        if step.includes(Step::User) {
            let user = &self.config.test_user;
            let registered = self
                .client
                .register(&user.username, &user.email, &user.password)
                .await;
            let ok = registered.is_some();
            if let Some(credentials) = registered {
                self.session.token = Some(credentials.token);
                self.session.user_id = credentials.user_id;
            }
            if !ok && all {
                error!("User registration/login failed, aborting further tests");
                return RunStatus::Aborted;
            }
        }

        if step.includes(Step::Character) {
            if self.session.token.is_none() {
                if all {
                    error!("No authentication token available, aborting character test");
                    return RunStatus::Aborted;
                }
                if !self.login().await {
                    error!("Login failed, aborting character test");
                    return RunStatus::Aborted;
                }
            }
            let token = self.session.token.clone().unwrap_or_default();

            self.session.character_id = self
                .client
                .create_character(&token, &self.config.test_user.character)
                .await;

            if self.session.character_id.is_none() && all {
                match self.client.first_character(&token).await {
                    Some(existing) => {
                        info!(
                            "Using existing character: {} (ID: {})",
                            existing.name, existing.id
                        );
                        self.session.character_id = Some(existing.id);
                    }
                    None => {
                        error!("Character creation/retrieval failed, aborting further tests");
                        return RunStatus::Aborted;
                    }
                }
            }
        }

        if step.includes(Step::Enter) {
            let (token, character_id) = match self.session.ready() {
                Some(ready) => ready,
                None if all => {
                    error!("Missing token or character_id, aborting enter game test");
                    return RunStatus::Aborted;
                }
                None => match self.prepare_for_enter().await {
                    Some(ready) => ready,
                    None => return RunStatus::Aborted,
                },
            };

            let entered = self.client.enter_game(&token, &character_id).await;
            if !entered && all {
                error!("Enter game failed, aborting further tests");
                return RunStatus::Aborted;
            }
        }

        if step.includes(Step::Position) {
            let Some((token, character_id)) = self.require_in_game(all, "position").await else {
                return RunStatus::Aborted;
            };

            let moved = self
                .client
                .update_position(&token, &character_id, Position::flat(10.0, 10.0))
                .await;
            if !moved && all {
                warn!("Position update failed, but continuing with further tests");
            }
        }

        if step.includes(Step::Nearby) {
            let Some((token, character_id)) = self.require_in_game(all, "nearby").await else {
                return RunStatus::Aborted;
            };

            let (ok, _) = self
                .client
                .nearby_players(&token, &character_id, self.config.nearby_radius)
                .await;
            if !ok && all {
                warn!("Nearby check failed, but continuing with further tests");
            }
        }

        if step.includes(Step::Exit) {
            let (token, character_id) = match self.session.ready() {
                Some(ready) => ready,
                None if all => {
                    error!("Missing token or character_id, aborting exit test");
                    return RunStatus::Aborted;
                }
                None => match self.login_with_character().await {
                    Some(ready) => ready,
                    None => {
                        error!("Failed to get character for exit test");
                        return RunStatus::Aborted;
                    }
                },
            };

            let exited = self.client.exit_game(&token, &character_id).await;
            if !exited && all {
                warn!("Exit game failed");
            }
        }

        if step.includes(Step::Simulate) {
            let simulation = Simulation::new(
                self.client.clone(),
                self.config.simulation.clone(),
                self.config.nearby_radius,
            );
            let report = simulation.run().await;
            report.log_summary();
            self.simulation = Some(report);
        }

        info!("Test sequence completed!");
        RunStatus::Completed
    }

    /// Log in with the test identity and remember the credentials
    async fn login(&mut self) -> bool {
        let user = &self.config.test_user;
        match self.client.login(&user.email, &user.password).await {
            Some(credentials) => {
                self.session.token = Some(credentials.token);
                self.session.user_id = credentials.user_id;
                true
            }
            None => false,
        }
    }

    /// Log in and take the first existing character
    async fn login_with_character(&mut self) -> Option<(String, Id)> {
        if !self.login().await {
            return None;
        }
        let token = self.session.token.clone()?;
        let character = self.client.first_character(&token).await?;
        self.session.character_id = Some(character.id.clone());
        Some((token, character.id))
    }

    /// Setup for running the enter step on its own: log in, then use the
    /// first character or create one
    async fn prepare_for_enter(&mut self) -> Option<(String, Id)> {
        if !self.login().await {
            error!("Login failed, aborting enter game test");
            return None;
        }
        let token = self.session.token.clone()?;

        let character_id = match self.client.first_character(&token).await {
            Some(character) => character.id,
            None => {
                let Some(id) = self
                    .client
                    .create_character(&token, &self.config.test_user.character)
                    .await
                else {
                    error!("Character creation failed, aborting enter game test");
                    return None;
                };
                id
            }
        };

        self.session.character_id = Some(character_id.clone());
        Some((token, character_id))
    }

    /// Token and character for a step that needs to be in the world. Run on
    /// its own, the step logs in, takes the first character and enters.
    async fn require_in_game(&mut self, all: bool, test: &str) -> Option<(String, Id)> {
        if let Some(ready) = self.session.ready() {
            return Some(ready);
        }
        if all {
            error!("Missing token or character_id, aborting {} test", test);
            return None;
        }

        let Some((token, character_id)) = self.login_with_character().await else {
            error!("Failed to get character for {} test", test);
            return None;
        };
        self.client.enter_game(&token, &character_id).await;
        Some((token, character_id))
    }
}
