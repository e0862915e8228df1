//! Device command handlers.

use std::sync::Arc;

use tabled::Tabled;

use fleetpulse_core::{Device, Monitor};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Building")]
    building: String,
    #[tabled(rename = "Tech")]
    tech: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
}

impl DeviceRow {
    fn new(d: &Device, color: bool) -> Self {
        Self {
            address: d.address.clone(),
            name: d.name.clone(),
            building: d.building.clone(),
            tech: d.tech.clone(),
            status: output::status_label(d.display_status(), color),
            ip: d.ip.map(|ip| ip.to_string()).unwrap_or_default(),
            latency: d
                .latency
                .map(|l| format!("{}ms", l.as_millis()))
                .unwrap_or_default(),
            last_seen: d
                .last_seen
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
        }
    }
}

pub(crate) fn detail(d: &Device, monitor: &Monitor, color: bool) -> String {
    let mut lines = vec![
        format!("Address:   {}", d.address),
        format!("Name:      {}", d.name),
        format!("Building:  {}", d.building),
        format!("Tech:      {}", d.tech),
        format!("MAC:       {}", d.mac),
        format!(
            "IP:        {}",
            d.ip.map_or_else(|| "-".into(), |ip| ip.to_string())
        ),
        format!(
            "Status:    {}",
            output::status_label(d.display_status(), color)
        ),
        format!(
            "Last seen: {}",
            d.last_seen.map_or_else(|| "-".into(), |t| t.to_rfc3339())
        ),
    ];
    if let Some(latency) = d.latency {
        lines.push(format!("Latency:   {}ms", latency.as_millis()));
    }
    let now = monitor.now();
    if let Some(elapsed) = d.reboot_elapsed(now) {
        let mut line = format!("Rebooting: {}", util::human_duration(elapsed));
        if d.reboot_overdue(now, &monitor.thresholds_for(d)) {
            line.push_str(" (taking longer than expected)");
        }
        lines.push(line);
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    monitor: &Monitor,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);

    match args.command {
        DevicesCommand::List { filter, probe } => {
            if probe {
                let probed = monitor.probe_all().await;
                tracing::debug!(probed, "probe round complete");
            }
            let filter = util::device_filter(&filter);
            let snap: Vec<Arc<Device>> = monitor.devices().filtered(&filter);
            let out = output::render_list(
                &global.output,
                &snap,
                |d| DeviceRow::new(d, color),
                |d| d.address.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Get { address, probe } => {
            if probe {
                monitor.probe_device(&address).await?;
            }
            let device = monitor
                .get(&address)
                .ok_or(CliError::NotFound { address })?;
            let out = output::render_single(
                &global.output,
                &device,
                |d| detail(d, monitor, color),
                |d| d.address.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
