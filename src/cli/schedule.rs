//! `drivesync schedule`

use super::Context;
use crate::schedule::{user_unit_dir, SystemdUnits};
use anyhow::Context as _;
use clap::Args;
use std::path::PathBuf;
use std::process::ExitCode;

/// Arguments for the schedule command
#[derive(Args)]
pub struct ScheduleArgs {
    /// systemd calendar expression, e.g. `daily` or `*-*-* 03:30:00`
    #[arg(long, default_value = "daily")]
    pub on_calendar: String,

    /// Write the units into this directory instead of printing them
    #[arg(long)]
    pub install_dir: Option<PathBuf>,

    /// Write the units into the per-user systemd directory
    #[arg(long, conflicts_with = "install_dir")]
    pub user: bool,

    /// JSON report path passed to `run --report`
    #[arg(long)]
    pub report: Option<PathBuf>,
}

pub async fn run(args: ScheduleArgs, ctx: &Context) -> anyhow::Result<ExitCode> {
    let executable = std::env::current_exe().context("cannot locate the drivesync executable")?;

    let mut units = SystemdUnits::new(executable, args.on_calendar)?;
    if let Some(config_path) = &ctx.config_path {
        let absolute = if config_path.is_absolute() {
            config_path.clone()
        } else {
            std::env::current_dir()?.join(config_path)
        };
        units = units.with_config(absolute);
    }
    if let Some(report) = args.report {
        units = units.with_report(report);
    }

    let install_dir = match (args.install_dir, args.user) {
        (Some(dir), _) => Some(dir),
        (None, true) => Some(user_unit_dir()?),
        (None, false) => None,
    };

    match install_dir {
        Some(dir) => {
            let (service, timer) = units.write_to(&dir)?;
            println!("Wrote {}", service.display());
            println!("Wrote {}", timer.display());
            println!(
                "Enable with: systemctl --user daemon-reload && systemctl --user enable --now {}",
                units.timer_file_name()
            );
        }
        None => {
            println!("# {}", units.service_file_name());
            print!("{}", units.render_service());
            println!();
            println!("# {}", units.timer_file_name());
            print!("{}", units.render_timer());
        }
    }
    Ok(ExitCode::SUCCESS)
}
