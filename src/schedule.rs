//! systemd service and timer generation for periodic runs

use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// A `drivesync run` service paired with the timer that triggers it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemdUnits {
    /// Base name shared by the `.service` and `.timer` files
    pub unit_name: String,
    /// Absolute path of the drivesync executable
    pub executable: PathBuf,
    /// Config file passed with `--config`, if not the default
    pub config_path: Option<PathBuf>,
    /// systemd calendar expression, e.g. `daily` or `*-*-* 03:30:00`
    pub on_calendar: String,
    /// Where `--report` should write the JSON run report
    pub report_path: Option<PathBuf>,
}

impl SystemdUnits {
    pub fn new(executable: impl Into<PathBuf>, on_calendar: impl Into<String>) -> Result<Self> {
        let on_calendar = on_calendar.into();
        if on_calendar.trim().is_empty() || on_calendar.contains('\n') {
            return Err(Error::configuration(format!(
                "invalid OnCalendar expression {on_calendar:?}"
            )));
        }
        Ok(Self {
            unit_name: "drivesync".to_string(),
            executable: executable.into(),
            config_path: None,
            on_calendar,
            report_path: None,
        })
    }

    pub fn with_config(mut self, config_path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(config_path.into());
        self
    }

    pub fn with_report(mut self, report_path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(report_path.into());
        self
    }

    pub fn service_file_name(&self) -> String {
        format!("{}.service", self.unit_name)
    }

    pub fn timer_file_name(&self) -> String {
        format!("{}.timer", self.unit_name)
    }

    fn exec_start(&self) -> String {
        let mut args = vec![self.executable.display().to_string()];
        if let Some(config) = &self.config_path {
            args.push("--config".to_string());
            args.push(config.display().to_string());
        }
        args.push("run".to_string());
        if let Some(report) = &self.report_path {
            args.push("--report".to_string());
            args.push(report.display().to_string());
        }
        args.iter().map(|a| quote(a)).collect::<Vec<_>>().join(" ")
    }

    pub fn render_service(&self) -> String {
        let mut service = String::new();

        service.push_str("[Unit]\n");
        service.push_str("Description=drivesync incremental backup\n");
        service.push_str("Wants=network-online.target\n");
        service.push_str("After=network-online.target\n\n");

        service.push_str("[Service]\n");
        service.push_str("Type=oneshot\n");
        service.push_str(&format!("ExecStart={}\n", self.exec_start()));
        service.push_str("StandardOutput=journal\n");
        service.push_str("StandardError=journal\n");

        service
    }

    pub fn render_timer(&self) -> String {
        let mut timer = String::new();

        timer.push_str("[Unit]\n");
        timer.push_str("Description=Timer for drivesync incremental backup\n");
        timer.push_str(&format!("Requires={}\n\n", self.service_file_name()));

        timer.push_str("[Timer]\n");
        timer.push_str(&format!("OnCalendar={}\n", self.on_calendar));
        timer.push_str("Persistent=true\n\n");

        timer.push_str("[Install]\n");
        timer.push_str("WantedBy=timers.target\n");

        timer
    }

    /// Write both unit files into `dir`, returning their paths
    pub fn write_to(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(dir)?;

        let service_file = dir.join(self.service_file_name());
        fs::write(&service_file, self.render_service())?;

        let timer_file = dir.join(self.timer_file_name());
        fs::write(&timer_file, self.render_timer())?;

        info!(
            "Wrote {} and {}",
            service_file.display(),
            timer_file.display()
        );
        Ok((service_file, timer_file))
    }
}

/// Per-user systemd unit directory (`~/.config/systemd/user`)
pub fn user_unit_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| Error::configuration("could not determine config directory"))?;
    Ok(config_dir.join("systemd").join("user"))
}

/// Quote an ExecStart argument when it contains whitespace or quotes
fn quote(arg: &str) -> String {
    if arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\') {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_service_runs_with_config_and_report() -> Result<()> {
        let units = SystemdUnits::new("/usr/local/bin/drivesync", "daily")?
            .with_config("/etc/drivesync/config.toml")
            .with_report("/var/log/drivesync/last run.json");

        let service = units.render_service();
        assert!(service.contains("Type=oneshot"));
        assert!(service.contains(
            "ExecStart=/usr/local/bin/drivesync --config /etc/drivesync/config.toml run --report \"/var/log/drivesync/last run.json\"\n"
        ));
        Ok(())
    }

    #[test]
    fn test_timer_uses_calendar_expression() -> Result<()> {
        let units = SystemdUnits::new("/usr/bin/drivesync", "*-*-* 03:30:00")?;
        let timer = units.render_timer();

        assert!(timer.contains("OnCalendar=*-*-* 03:30:00\n"));
        assert!(timer.contains("Requires=drivesync.service"));
        assert!(timer.contains("Persistent=true"));
        Ok(())
    }

    #[test]
    fn test_blank_calendar_is_rejected() {
        assert!(matches!(
            SystemdUnits::new("/usr/bin/drivesync", "  "),
            Err(Error::Configuration { .. })
        ));
        assert!(SystemdUnits::new("/usr/bin/drivesync", "daily\nExecStart=/bin/sh").is_err());
    }

    #[test]
    fn test_write_units() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let units = SystemdUnits::new("/usr/bin/drivesync", "hourly")?;

        let (service, timer) = units.write_to(temp_dir.path())?;
        assert_eq!(service, temp_dir.path().join("drivesync.service"));
        assert!(fs::read_to_string(timer)?.contains("OnCalendar=hourly"));
        Ok(())
    }
}
