use std::io::Write;

use anyhow::{anyhow, Context};
use comreq_core::{ComRequest, RequestStateService};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::output::Printer;

/// One line of the input stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Seed {
        user: Option<String>,
        requests: Vec<Value>,
    },
    Update {
        user: Option<String>,
        request: Value,
    },
    Get {
        user: Option<String>,
    },
    Clear {
        user: Option<String>,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub applied: usize,
    pub rejected: usize,
}

/// Drives the cache from a command stream, the way a UI would from backend
/// pushes and user actions.
pub struct Session<W> {
    service: RequestStateService,
    default_user: Option<String>,
    printer: Printer<W>,
}

impl<W: Write + Send + 'static> Session<W> {
    pub fn new(
        service: RequestStateService,
        default_user: Option<String>,
        printer: Printer<W>,
    ) -> Self {
        Self {
            service,
            default_user,
            printer,
        }
    }

    /// Applies every line until EOF. Bad lines are logged and skipped.
    pub async fn run<R>(&self, reader: R) -> Summary
    where
        R: AsyncBufRead + Unpin,
    {
        let mut segments = reader.split(b'\n');
        let mut summary = Summary::default();
        let mut line_no = 0usize;

        loop {
            let segment = match segments.next_segment().await {
                Ok(Some(segment)) => segment,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, line = line_no + 1, "failed to read input, stopping");
                    break;
                }
            };
            line_no += 1;
            // decoded per line so one bad line does not end the session
            let line = match std::str::from_utf8(&segment) {
                Ok(line) => line,
                Err(e) => {
                    warn!(
                        line = line_no,
                        error = %e,
                        "command rejected: input is not valid UTF-8"
                    );
                    summary.rejected += 1;
                    continue;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match self.apply_line(trimmed).await {
                Ok(()) => summary.applied += 1,
                Err(e) => {
                    let reason = format!("{e:#}");
                    warn!(line = line_no, error = %reason, "command rejected");
                    summary.rejected += 1;
                }
            }
        }

        info!(applied = summary.applied, rejected = summary.rejected, "input exhausted");
        summary
    }

    pub async fn apply_line(&self, line: &str) -> anyhow::Result<()> {
        let command: Command = serde_json::from_str(line).context("malformed command")?;
        self.apply(command).await
    }

    pub async fn apply(&self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Seed { user, requests } => {
                let user = self.resolve_user(user)?;
                let requests = requests
                    .into_iter()
                    .enumerate()
                    .map(|(i, value)| {
                        ComRequest::from_value(value).with_context(|| format!("seed record #{i}"))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                let count = requests.len();
                self.service.set_initial_data(&user, requests).await?;
                debug!(user_id = %user, count, "seeded");
            }
            Command::Update { user, request } => {
                let user = self.resolve_user(user)?;
                let request = ComRequest::from_value(request)?;
                self.service.update_data(&user, request).await?;
            }
            Command::Get { user } => {
                let user = self.resolve_user(user)?;
                let requests = self.service.get_user_requests(&user).await;
                self.printer
                    .print_snapshot(&user, &requests)
                    .context("failed to write snapshot")?;
            }
            Command::Clear { user } => {
                let user = self.resolve_user(user)?;
                if !self.service.clear_user(&user).await {
                    debug!(user_id = %user, "clear for user without cache");
                }
            }
        }
        Ok(())
    }

    fn resolve_user(&self, user: Option<String>) -> anyhow::Result<String> {
        user.or_else(|| self.default_user.clone())
            .ok_or_else(|| anyhow!("command names no user and no default user is configured"))
    }
}
