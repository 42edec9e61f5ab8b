//! `infraprobe fixtures` command handler

use std::io::Write;

use serde::Serialize;

use infraprobe_core::config::InfraprobeConfig;

use crate::cli::{FixturesAction, FixturesArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `fixtures` command.
pub fn execute(
    args: FixturesArgs,
    config: &InfraprobeConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        FixturesAction::List => writer.render(&FixtureListReport::from_config(config)),
    }
}

/// One configured fixture.
#[derive(Serialize)]
pub struct FixtureSummary {
    pub name: String,
    pub dir: String,
    /// Whether the directory exists on disk right now
    pub exists: bool,
    pub apply: bool,
    pub vars: usize,
    pub sensitive_vars: usize,
}

/// Fixture list report.
#[derive(Serialize)]
pub struct FixtureListReport {
    pub fixtures: Vec<FixtureSummary>,
}

impl FixtureListReport {
    pub fn from_config(config: &InfraprobeConfig) -> Self {
        let fixtures = config
            .fixtures
            .iter()
            .map(|(name, fixture)| FixtureSummary {
                name: name.clone(),
                dir: fixture.dir.clone(),
                exists: config.fixture_dir(name).is_ok_and(|dir| dir.is_dir()),
                apply: fixture.apply,
                vars: fixture.vars.len(),
                sensitive_vars: fixture.sensitive_vars.len(),
            })
            .collect();
        Self { fixtures }
    }
}

impl Render for FixtureListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.fixtures.is_empty() {
            writeln!(w, "No fixtures configured.")?;
            return Ok(());
        }

        writeln!(
            w,
            "{:<20} {:<30} {:<7} {:<6} {}",
            "NAME".bold(),
            "DIR".bold(),
            "EXISTS".bold(),
            "APPLY".bold(),
            "VARS".bold()
        )?;
        for fixture in &self.fixtures {
            let exists = if fixture.exists {
                "yes".green()
            } else {
                "no".red()
            };
            writeln!(
                w,
                "{:<20} {:<30} {:<7} {:<6} {} ({} sensitive)",
                fixture.name,
                fixture.dir,
                exists,
                fixture.apply,
                fixture.vars,
                fixture.sensitive_vars
            )?;
        }
        writeln!(w)?;
        writeln!(w, "Total: {} fixture(s)", self.fixtures.len())?;

        Ok(())
    }
}
