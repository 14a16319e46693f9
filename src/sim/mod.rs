//! Multiplayer simulation
//!
//! Launches one independent task per virtual player and keeps an eye on them
//! until they are all done, reporting progress along the way.

mod player;

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, info_span, warn, Instrument};

use crate::client::GameClient;
use crate::config::SimulationConfig;
pub use player::{
    wander_offset, AbortStage, PlayerOutcome, PlayerProfile, PlayerReport, Tally, VirtualPlayer,
};

/// Result of a simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub players: Vec<PlayerReport>,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl SimulationReport {
    /// Players that reached the world and left it again
    pub fn finished(&self) -> usize {
        self.players
            .iter()
            .filter(|p| matches!(p.outcome, PlayerOutcome::Completed | PlayerOutcome::Stopped))
            .count()
    }

    pub fn aborted(&self) -> usize {
        self.players
            .iter()
            .filter(|p| matches!(p.outcome, PlayerOutcome::Aborted(_)))
            .count()
    }

    pub fn moves(&self) -> Tally {
        let mut total = Tally::default();
        for player in &self.players {
            total += player.moves;
        }
        total
    }

    pub fn nearby_checks(&self) -> Tally {
        let mut total = Tally::default();
        for player in &self.players {
            total += player.nearby_checks;
        }
        total
    }

    /// Log a one-screen summary
    pub fn log_summary(&self) {
        let moves = self.moves();
        let checks = self.nearby_checks();
        info!(
            "Simulation summary: {}/{} players finished, {} aborted, {:.1}s",
            self.finished(),
            self.players.len(),
            self.aborted(),
            self.elapsed.as_secs_f64()
        );
        info!(
            "Moves: {} ok, {} failed; nearby checks: {} ok, {} failed",
            moves.ok, moves.failed, checks.ok, checks.failed
        );
        for player in &self.players {
            match player.outcome {
                PlayerOutcome::Aborted(stage) => {
                    warn!("  - {} aborted at {}", player.username, stage)
                }
                PlayerOutcome::Unfinished => {
                    warn!("  - {} did not finish", player.username)
                }
                _ if player.exited == Some(false) => {
                    warn!("  - {} failed to exit the game", player.username)
                }
                _ => {}
            }
        }
    }
}

/// Coordinator for a crowd of virtual players
pub struct Simulation {
    client: GameClient,
    settings: SimulationConfig,
    radius: f64,
}

impl Simulation {
    pub fn new(client: GameClient, settings: SimulationConfig, radius: f64) -> Self {
        Self {
            client,
            settings,
            radius,
        }
    }

    /// Run until every player is done; Ctrl-C stops the players early
    pub async fn run(&self) -> SimulationReport {
        self.run_until(async {
            if tokio::signal::ctrl_c().await.is_err() {
                // No signal handler available: never interrupt
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until every player is done, or `interrupt` resolves
    pub async fn run_until<F>(&self, interrupt: F) -> SimulationReport
    where
        F: Future<Output = ()>,
    {
        let count = self.settings.players;
        info!(
            "Running multiplayer simulation with {} players for {} seconds",
            count, self.settings.duration_secs
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut players: Vec<(String, JoinHandle<PlayerReport>)> =
            Vec::with_capacity(count as usize);
        let mut interrupted = false;
        tokio::pin!(interrupt);

        for profile in PlayerProfile::roster(count) {
            let player = VirtualPlayer::new(
                self.client.clone(),
                profile,
                self.settings.clone(),
                self.radius,
                stop_rx.clone(),
            );
            let username = player.profile().username.clone();
            let span = info_span!("player", username = %username);
            players.push((username, tokio::spawn(player.run().instrument(span))));

            let stagger = self.settings.stagger(&mut rand::rng());
            tokio::select! {
                _ = sleep(stagger) => {}
                _ = &mut interrupt => {
                    interrupted = true;
                    break;
                }
            }
        }
        if interrupted {
            info!(
                "Interrupted while launching players, {} of {} started",
                players.len(),
                count
            );
        }

        let start = Instant::now();
        let duration = self.settings.duration();

        while !interrupted {
            let active = active_count(&players);
            if active == 0 {
                break;
            }

            let elapsed = start.elapsed();
            if elapsed >= duration {
                info!(
                    "Simulation duration elapsed, waiting for {} players to complete...",
                    active
                );
            } else {
                info!(
                    "Simulation in progress: {:.1}s elapsed, {:.1}s remaining, {}/{} players active",
                    elapsed.as_secs_f64(),
                    (duration - elapsed).as_secs_f64(),
                    active,
                    players.len()
                );
            }

            tokio::select! {
                _ = sleep(self.settings.progress_interval()) => {}
                _ = &mut interrupt => {
                    interrupted = true;
                    break;
                }
            }
        }

        if interrupted {
            warn!("Simulation interrupted by user");
            info!("Waiting for players to finish cleanup...");
            stop_tx.send_replace(true);

            for _ in 0..self.settings.shutdown_grace_secs {
                if active_count(&players) == 0 {
                    break;
                }
                sleep(Duration::from_secs(1)).await;
            }

            let active = active_count(&players);
            if active > 0 {
                warn!(
                    "{} players still finishing, waiting for them to leave the game",
                    active
                );
            }
        }

        let mut reports = Vec::with_capacity(players.len());
        for (username, handle) in players {
            reports.push(collect(username, handle).await);
        }

        info!("Multiplayer simulation completed");
        SimulationReport {
            players: reports,
            interrupted,
            elapsed: start.elapsed(),
        }
    }
}

fn active_count(players: &[(String, JoinHandle<PlayerReport>)]) -> usize {
    players.iter().filter(|(_, h)| !h.is_finished()).count()
}

/// Wait for a player to wrap up. A player in the world always gets to exit it.
async fn collect(username: String, handle: JoinHandle<PlayerReport>) -> PlayerReport {
    match handle.await {
        Ok(report) => report,
        Err(e) => {
            warn!("Player {} task failed: {}", username, e);
            PlayerReport::new(username)
        }
    }
}
