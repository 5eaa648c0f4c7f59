//! Moderation executor: deletes history and bans every user of a ban file,
//! writing the unprocessed rows back when interrupted.

use anyhow::{Context, Result};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::{BannedRights, Channel, GroupApi};
use crate::batch::{read_ban_file, write_ban_table, BanTask};
use crate::cancel::CancelToken;
use crate::checkpoint::save_remainder;
use crate::logger::RunLogger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationOutcome {
    Completed {
        processed: usize,
        failures: usize,
    },
    /// Stopped before entry `next_index`; `remaining` entries were left untouched
    Interrupted {
        next_index: usize,
        remaining: usize,
        failures: usize,
    },
}

impl ModerationOutcome {
    pub fn processed(&self) -> usize {
        match self {
            ModerationOutcome::Completed { processed, .. } => *processed,
            ModerationOutcome::Interrupted { next_index, .. } => *next_index,
        }
    }

    /// Number of failed remote calls (each entry makes two)
    pub fn failures(&self) -> usize {
        match self {
            ModerationOutcome::Completed { failures, .. }
            | ModerationOutcome::Interrupted { failures, .. } => *failures,
        }
    }
}

pub struct ModerationExecutor {
    api: Arc<dyn GroupApi>,
    channel: Channel,
    rights: BannedRights,
}

impl ModerationExecutor {
    pub fn new(api: Arc<dyn GroupApi>, channel: Channel) -> Self {
        Self {
            api,
            channel,
            rights: BannedRights::permanent(),
        }
    }

    /// Process `tasks` in order until done or cancelled
    pub async fn execute(
        &self,
        tasks: &[BanTask],
        cancel: &CancelToken,
        logger: &RunLogger,
    ) -> ModerationOutcome {
        let total = tasks.len();
        let mut failures = 0;

        for (index, task) in tasks.iter().enumerate() {
            if cancel.is_cancelled() {
                return ModerationOutcome::Interrupted {
                    next_index: index,
                    remaining: total - index,
                    failures,
                };
            }

            failures += self.process(task).await;
            info!("Done processing user #{} out of {}", index + 1, total);
            logger.advance_progress(&format!("user {}", task.user.user_id));
        }

        ModerationOutcome::Completed {
            processed: total,
            failures,
        }
    }

    /// Both calls are always attempted; returns how many of them failed
    async fn process(&self, task: &BanTask) -> usize {
        let user = &task.user;
        let mut failures = 0;

        if let Err(e) = self.api.delete_history(&self.channel, user).await {
            error!("Failed to delete history of user {}: {}", user.user_id, e);
            failures += 1;
        }
        if let Err(e) = self.api.ban(&self.channel, user, &self.rights).await {
            error!("Failed to ban user {}: {}", user.user_id, e);
            failures += 1;
        }
        failures
    }
}

/// Moderation run over a ban file. On interruption the unprocessed rows replace
/// the file's contents so the same command resumes the run.
pub async fn run_ban_file(
    api: Arc<dyn GroupApi>,
    channel: Channel,
    path: &Path,
    cancel: &CancelToken,
    logger: &RunLogger,
) -> Result<ModerationOutcome> {
    let file = read_ban_file(path)?;
    if file.skipped > 0 {
        warn!("{} malformed rows in {} will be ignored", file.skipped, path.display());
    }
    info!("Loaded {} users to ban from {}", file.tasks.len(), path.display());

    let executor = ModerationExecutor::new(api, channel);
    logger.start_progress(file.tasks.len() as u64);
    let outcome = executor.execute(&file.tasks, cancel, logger).await;
    logger.finish_progress();

    if let ModerationOutcome::Interrupted { next_index, .. } = outcome {
        if next_index == 0 {
            info!(
                "Interrupted before any user was processed; rerun with {} to start over",
                path.display()
            );
        } else {
            let remaining = &file.tasks[next_index..];
            if let Err(e) = save_remainder(path, &file.header, remaining) {
                error!(
                    "Could not rewrite {}: {:#}. Remaining users follow on stdout",
                    path.display(),
                    e
                );
                let stdout = io::stdout().lock();
                if let Err(stdout_err) = write_ban_table(stdout, &file.header, remaining) {
                    error!("Failed to write remaining users to stdout: {}", stdout_err);
                }
                return Err(e).with_context(|| {
                    format!(
                        "{} of {} users were processed; drop the first {} rows of {} before rerunning",
                        next_index,
                        file.tasks.len(),
                        next_index,
                        path.display()
                    )
                });
            }
            info!(
                "Interrupted after {} users; rerun with {} to continue",
                next_index,
                path.display()
            );
        }
    }

    Ok(outcome)
}
