//! Reboot command: confirm, dispatch, then follow the settling window.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use fleetpulse_core::{DeviceStatus, Monitor, MonitorEvent};

use crate::cli::{GlobalOpts, RebootArgs};
use crate::error::CliError;
use crate::output;

use super::util;

/// How the command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Dispatched,
    Recovered,
    /// The session ended without a recovery event, e.g. a missed broadcast.
    Settled,
    Interrupted,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RebootSummary {
    address: String,
    outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

fn summary_line(s: &RebootSummary) -> String {
    let elapsed = s
        .elapsed_secs
        .map(|secs| util::human_duration(Duration::from_secs(secs)));
    match (s.outcome, elapsed) {
        (Outcome::Dispatched, _) => format!("Reboot command sent to {}", s.address),
        (Outcome::Recovered, Some(e)) => format!("{} is back online after {e}", s.address),
        (Outcome::Recovered | Outcome::Settled, _) => format!("{} is back", s.address),
        (Outcome::Interrupted, _) => format!(
            "Stopped following {}; the reboot continues on the device",
            s.address
        ),
    }
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    monitor: &Monitor,
    args: RebootArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let address = args.address.trim().to_owned();
    let device = monitor
        .get(&address)
        .ok_or_else(|| CliError::NotFound {
            address: address.clone(),
        })?;
    if device.is_rebooting() {
        return Err(CliError::RebootInProgress { address });
    }

    let prompt = format!("Reboot {} ({}, {})?", device.name, address, device.building);
    if !util::confirm(&prompt, global.yes)? {
        return Ok(());
    }

    // Subscribe before initiating so no transition is missed.
    let mut events = monitor.events();
    let ticket = monitor.initiate(&address)?;

    let bar = spinner(global.quiet);
    bar.set_message(format!("Sending reboot command to {address}"));

    let receipt = match ticket.wait().await {
        Ok(r) => r,
        Err(e) => {
            bar.finish_and_clear();
            return Err(e.into());
        }
    };
    tracing::debug!(address = %address, message = ?receipt.message, "reboot dispatched");

    let mut summary = RebootSummary {
        address: address.clone(),
        outcome: Outcome::Dispatched,
        elapsed_secs: None,
        output: receipt.output,
    };

    if !args.no_wait {
        follow(monitor, &mut events, &bar, &mut summary).await?;
    }
    bar.finish_and_clear();

    let out = output::render_single(&global.output, &summary, summary_line, |s| {
        s.address.clone()
    });
    output::print_output(&out, global.quiet);
    if global.verbose > 0 {
        if let Some(ref diag) = summary.output {
            eprintln!("{diag}");
        }
    }
    Ok(())
}

/// Wait for the session to end, refreshing the spinner once a second.
async fn follow(
    monitor: &Monitor,
    events: &mut tokio::sync::broadcast::Receiver<MonitorEvent>,
    bar: &ProgressBar,
    summary: &mut RebootSummary,
) -> Result<(), CliError> {
    let address = summary.address.clone();
    let mut tick = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                summary.outcome = Outcome::Interrupted;
                return Ok(());
            }
            ev = events.recv() => match ev {
                Ok(MonitorEvent::RebootRecovered { address: a, elapsed }) if a == address => {
                    summary.outcome = Outcome::Recovered;
                    summary.elapsed_secs = Some(elapsed.as_secs());
                    return Ok(());
                }
                Ok(MonitorEvent::RebootStalled { address: a, elapsed }) if a == address => {
                    bar.finish_and_clear();
                    return Err(CliError::RebootStalled {
                        address,
                        elapsed: util::human_duration(elapsed),
                    });
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => {
                    return Err(CliError::Internal("monitor event channel closed".into()));
                }
            },
            _ = tick.tick() => {
                let Some(device) = monitor.get(&address) else {
                    return Err(CliError::NotFound { address });
                };
                let now = monitor.now();
                match device.reboot_elapsed(now) {
                    Some(elapsed) => {
                        let mut msg = format!(
                            "Waiting for {address} to come back ({})",
                            util::human_duration(elapsed)
                        );
                        if device.reboot_overdue(now, &monitor.thresholds_for(&device)) {
                            msg.push_str(", taking longer than expected");
                        }
                        bar.set_message(msg);
                    }
                    // Session ended and the event was lost to lag.
                    None if device.status == DeviceStatus::Offline => {
                        bar.finish_and_clear();
                        return Err(CliError::RebootStalled {
                            address,
                            elapsed: "the stall timeout".into(),
                        });
                    }
                    None => {
                        summary.outcome = Outcome::Settled;
                        return Ok(());
                    }
                }
            }
        }
    }
}
