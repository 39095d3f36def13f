use colored::Colorize;

use crate::clean::CleanReport;
use crate::upgrade::{DeviceStatus, UpgradeReport};

/// Render an upgrade report for terminal output.
pub fn render_upgrade_text(report: &UpgradeReport) -> String {
    let mut out = Vec::new();
    out.push(format!(
        "upgrade store={} config_dir={}",
        report.store, report.config_dir
    ));

    for device in &report.devices {
        let tag = match device.status {
            DeviceStatus::Migrated => "[OK]".green(),
            DeviceStatus::Partial => "[PARTIAL]".yellow(),
            _ => "[FAIL]".red(),
        };
        let written: Vec<String> = device.written.iter().map(ToString::to_string).collect();
        out.push(format!(
            "{tag} {} network={} status={:?} written={}",
            device.id,
            device.network,
            device.status,
            written.join(",")
        ));
        for error in &device.errors {
            out.push(format!("  error: {error}"));
        }
    }
    for id in &report.non_servers {
        out.push(format!("{} {id} not a server node", "[SKIP]".cyan()));
    }
    for row in &report.parse_failures {
        out.push(format!("{} {} {}", "[SKIP]".magenta(), row.key, row.reason));
    }

    let failed = report
        .devices
        .iter()
        .filter(|d| d.status.is_failure())
        .count();
    out.push(format!(
        "upgrade_summary scanned={} migrated={} partial={} failed={} non_server={} parse_failures={}",
        report.scanned,
        report.count(DeviceStatus::Migrated),
        report.count(DeviceStatus::Partial),
        failed,
        report.non_servers.len(),
        report.parse_failures.len()
    ));
    out.join("\n")
}

/// Render a clean report for terminal output.
pub fn render_clean_text(report: &CleanReport) -> String {
    let mut out = Vec::new();
    out.push(format!(
        "clean network={} devices={}",
        report.network, report.devices
    ));

    for removal in &report.removals {
        let line = format!("remove {:?} {}", removal.role, removal.device);
        match &removal.error {
            None => out.push(format!("{} {line}", "[OK]".green())),
            Some(err) => out.push(format!("{} {line}: {err}", "[FAIL]".red())),
        }
    }
    if let Some(err) = &report.ext_clients_error {
        out.push(format!("{} reset ext clients: {err}", "[FAIL]".red()));
    }
    for reset in &report.firewall {
        let line = format!("{} on {}", reset.command, reset.host);
        match &reset.error {
            None => out.push(format!("{} {line}", "[OK]".green())),
            Some(err) => out.push(format!("{} {line}: {err}", "[FAIL]".red())),
        }
    }

    out.push(format!(
        "clean_summary removals={} firewall={} failures={}",
        report.removals.len(),
        report.firewall.len(),
        report.failures()
    ));
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::render_upgrade_text;
    use crate::materialize::Artifact;
    use crate::upgrade::{DeviceReport, DeviceStatus, SkippedRow, UpgradeReport};

    #[test]
    fn summary_line_counts_outcomes() {
        colored::control::set_override(false);
        let report = UpgradeReport {
            store: "/x.db".to_string(),
            config_dir: "/cfg".to_string(),
            scanned: 3,
            devices: vec![DeviceReport {
                id: "a".to_string(),
                network: "net".to_string(),
                status: DeviceStatus::Migrated,
                written: vec![Artifact::Secret, Artifact::Descriptor],
                omitted: Vec::new(),
                errors: Vec::new(),
            }],
            non_servers: vec!["b".to_string()],
            parse_failures: vec![SkippedRow {
                key: "c".to_string(),
                reason: "bad json".to_string(),
            }],
        };

        let text = render_upgrade_text(&report);
        assert!(text.contains("[OK] a network=net status=Migrated written=secret,descriptor"));
        assert!(text.ends_with(
            "upgrade_summary scanned=3 migrated=1 partial=0 failed=0 non_server=1 parse_failures=1"
        ));
    }
}
