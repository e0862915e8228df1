//! Watch command: print monitor transitions until Ctrl-C.

use chrono::Local;
use owo_colors::OwoColorize;
use tokio::sync::broadcast::error::RecvError;

use fleetpulse_core::{DeviceFilter, Monitor, MonitorEvent};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

/// One human-readable line per event.
fn event_line(ev: &MonitorEvent) -> String {
    match ev {
        MonitorEvent::BootstrapFailed { message } => format!("device list unavailable: {message}"),
        MonitorEvent::DevicesAdded { addresses } => format!("added {}", addresses.join(", ")),
        MonitorEvent::DevicesRemoved { addresses } => format!("removed {}", addresses.join(", ")),
        MonitorEvent::StatusChanged { address, from, to } => format!("{address}  {from} -> {to}"),
        MonitorEvent::AddressChanged { address, ip } => format!("{address}  address {ip}"),
        MonitorEvent::RebootAccepted { address, .. } => format!("{address}  reboot requested"),
        MonitorEvent::RebootDispatched { address, .. } => format!("{address}  reboot dispatched"),
        MonitorEvent::RebootRejected { address, message } => {
            format!("{address}  reboot rejected: {message}")
        }
        MonitorEvent::RebootRecovered { address, elapsed } => format!(
            "{address}  back online after {}",
            util::human_duration(*elapsed)
        ),
        MonitorEvent::RebootStalled { address, elapsed } => format!(
            "{address}  did not come back after {}",
            util::human_duration(*elapsed)
        ),
        MonitorEvent::ControlReleased {
            address,
            still_rebooting,
        } => {
            if *still_rebooting {
                format!("{address}  reboot control re-enabled, still waiting")
            } else {
                format!("{address}  reboot control re-enabled")
            }
        }
    }
}

/// Events about a device outside the filter are dropped; fleet-wide
/// events always pass.
fn wanted(ev: &MonitorEvent, monitor: &Monitor, filter: &DeviceFilter) -> bool {
    if filter.is_empty() {
        return true;
    }
    match ev.address() {
        Some(address) => monitor.get(address).is_some_and(|d| filter.matches(&d)),
        None => true,
    }
}

fn render_event(ev: &MonitorEvent, format: &OutputFormat, color: bool) -> String {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            output::render_json_compact(ev)
        }
        OutputFormat::Table | OutputFormat::Plain => {
            let stamp = Local::now().format("%H:%M:%S").to_string();
            let line = event_line(ev);
            let line = match ev {
                MonitorEvent::RebootStalled { .. }
                | MonitorEvent::RebootRejected { .. }
                | MonitorEvent::BootstrapFailed { .. }
                    if color =>
                {
                    line.red().to_string()
                }
                MonitorEvent::RebootRecovered { .. } if color => line.green().to_string(),
                _ => line,
            };
            if color {
                format!("{} {line}", stamp.dimmed())
            } else {
                format!("{stamp} {line}")
            }
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(monitor: &Monitor, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let filter = util::device_filter(&args.filter);

    let mut events = monitor.events();

    if !global.quiet {
        let matching = monitor.devices().filtered(&filter).len();
        eprintln!(
            "Watching {matching} of {} devices. Press Ctrl-C to stop.",
            monitor.registry().len()
        );
    }

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            ev = events.recv() => match ev {
                Ok(ev) => {
                    if wanted(&ev, monitor, &filter) {
                        output::print_output(&render_event(&ev, &global.output, color), global.quiet);
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event output fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fleetpulse_core::DeviceStatus;

    use super::*;

    #[test]
    fn status_change_line() {
        let ev = MonitorEvent::StatusChanged {
            address: "rm-101".into(),
            from: DeviceStatus::Online,
            to: DeviceStatus::Offline,
        };
        assert_eq!(event_line(&ev), "rm-101  online -> offline");
    }

    #[test]
    fn json_output_is_one_event_per_line() {
        let ev = MonitorEvent::RebootRecovered {
            address: "rm-101".into(),
            elapsed: Duration::from_secs(40),
        };
        let line = render_event(&ev, &OutputFormat::Json, false);
        assert!(!line.contains('\n'));
        assert!(line.contains(r#""event":"reboot_recovered""#));
    }
}
