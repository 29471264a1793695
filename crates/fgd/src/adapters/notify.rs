//! Desktop notifications through `notify-send`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use fg_core::{LimitedAppConfig, PackageId};
use tokio::process::Command;
use tracing::{debug, info};

use crate::ports::{Notifier, PortError, PortResult};

const NOTIFY_SEND: &str = "notify-send";
const APP_NAME: &str = "focusguard";

/// Notifier that shells out to a freedesktop notification client.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    program: String,
    focus_command: Option<Vec<String>>,
}

impl DesktopNotifier {
    pub fn new(focus_command: Option<Vec<String>>) -> Self {
        Self {
            program: NOTIFY_SEND.to_string(),
            focus_command,
        }
    }

    /// Uses `program` instead of `notify-send`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn notify(&self, urgency: &str, summary: &str, body: &str) -> PortResult<()> {
        let args = [
            "--app-name",
            APP_NAME,
            "--urgency",
            urgency,
            summary,
            body,
        ];
        run(&self.program, &args).await
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn show_warning(
        &self,
        config: &LimitedAppConfig,
        display_name: &str,
        elapsed: Duration,
    ) -> PortResult<()> {
        info!(
            package = %config.package(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Showing usage warning"
        );
        let body = format!(
            "You have been using {display_name} for {}. Your limit is {}.",
            human_duration(elapsed),
            human_duration(config.limit()),
        );
        self.notify("normal", "Time limit reached", &body).await
    }

    async fn bring_app_to_foreground(&self, package: &PackageId) -> PortResult<()> {
        let Some((program, args)) = self.focus_command.as_ref().and_then(|c| c.split_first()) else {
            debug!(package = %package, "No focus command configured");
            return Ok(());
        };

        let mut args: Vec<&str> = args.iter().map(String::as_str).collect();
        args.push(package.as_str());
        info!(package = %package, "Raising window");
        run(program, &args).await
    }

    async fn show_dissuasion_message(&self, display_name: &str) -> PortResult<()> {
        info!(app = display_name, "Showing dissuasion message");
        let body = format!("You are well past your limit for {display_name}. Time to take a break.");
        self.notify("critical", "Step away", &body).await
    }
}

async fn run(program: &str, args: &[&str]) -> PortResult<()> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| PortError::Unavailable(format!("{program}: {e}")))?;

    if status.success() {
        Ok(())
    } else {
        Err(PortError::Io(format!("{program} exited with {status}")))
    }
}

/// Renders a duration as `1h 5m`, `12m` or `40s`.
fn human_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}
