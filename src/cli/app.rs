//! Main CLI application

use crate::config::{
    load_env_file, parse_duration, parse_plan_auto, parse_plan_file, serialize_plan, PlanFile,
};
use crate::exit_codes;
use crate::logging::{self, Verbosity};
use crate::runner::{Cancellation, Context, LocalExecutor, PackageBackend, Plan, Runner};
use crate::ui;
use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use colored::Colorize;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use tracing::debug;

/// Report format for `run`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Human,
    Yaml,
}

/// A loaded and validated plan together with where it came from
pub struct App {
    plan: Plan,
    plan_path: PathBuf,
    verbosity: Verbosity,
}

impl App {
    /// Load the plan from `path`, or discover it from the current directory
    pub fn load(path: Option<PathBuf>, verbosity: Verbosity) -> anyhow::Result<Self> {
        let (file, plan_path) = match path {
            Some(path) => {
                let file = parse_plan_file(&path)
                    .with_context(|| format!("failed to load plan {}", path.display()))?;
                (file, path)
            }
            None => parse_plan_auto().context("failed to load plan")?,
        };
        debug!(path = %plan_path.display(), "loaded plan file");

        Self::from_file(&file, plan_path, verbosity)
    }

    fn from_file(file: &PlanFile, plan_path: PathBuf, verbosity: Verbosity) -> anyhow::Result<Self> {
        let plan = Plan::from_config(file)
            .with_context(|| format!("invalid plan {}", plan_path.display()))?;

        Ok(App {
            plan,
            plan_path,
            verbosity,
        })
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// `validate`: print the task list
    pub fn validate(&self) -> anyhow::Result<i32> {
        if self.verbosity > Verbosity::Silent {
            println!(
                "{} Plan '{}' is valid ({} tasks)",
                "✓".green(),
                self.plan_path.display(),
                self.plan.tasks().len()
            );
            print!("{}", ui::render_plan(&self.plan));
        }
        Ok(exit_codes::OK)
    }

    /// `show`: print the canonical plan
    pub fn show(&self) -> anyhow::Result<i32> {
        let yaml = serialize_plan(&self.plan.to_config())?;
        print!("{}", yaml);
        Ok(exit_codes::OK)
    }

    /// `run`: execute the plan against the local host
    pub fn execute(
        &self,
        format: ReportFormat,
        timeout_override: Option<&str>,
        cancellation: Cancellation,
    ) -> anyhow::Result<i32> {
        let settings = self.plan.settings();

        let default_timeout = match timeout_override {
            Some(value) => Some(parse_duration(value)?),
            None => settings.timeout,
        };

        let env = load_env_file(&self.plan_path)?;
        let mut target = LocalExecutor::new()
            .with_interpreter(settings.interpreter.clone().unwrap_or_default())
            .with_backend(PackageBackend::for_manager(settings.package_manager))
            .with_env(env);

        let ctx = Context::new()
            .with_default_timeout(default_timeout)
            .with_cancellation(cancellation);

        let outcome = Runner::new(&mut target, ctx).run(&self.plan);

        match format {
            ReportFormat::Yaml => print!("{}", serde_yaml::to_string(&outcome)?),
            ReportFormat::Human if self.verbosity > Verbosity::Silent => {
                print!("{}", ui::render_report(&outcome))
            }
            ReportFormat::Human => {}
        }

        Ok(outcome.exit_code())
    }
}

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("rplay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run declarative YAML provisioning plans")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Path to the plan file (default: rplay.yml, searched upwards)")
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only log errors")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Execute the plan against the local host")
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_name("FORMAT")
                        .value_parser(["human", "yaml"])
                        .default_value("human")
                        .help("Report format"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_name("DURATION")
                        .help("Default per-task timeout, overriding the plan (e.g. 30s, 5m)"),
                ),
        )
        .subcommand(Command::new("validate").about("Check the plan and list its tasks"))
        .subcommand(Command::new("show").about("Print the normalized plan as YAML"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(value_parser!(Shell)),
                ),
        )
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

fn get_format(matches: &ArgMatches) -> ReportFormat {
    match matches.get_one::<String>("format").map(String::as_str) {
        Some("yaml") => ReportFormat::Yaml,
        _ => ReportFormat::Human,
    }
}

/// Run the CLI with the process arguments and return the exit code
pub fn run() -> anyhow::Result<i32> {
    run_from(std::env::args_os())
}

/// Run the CLI with explicit arguments
pub fn run_from<I, T>(args: I) -> anyhow::Result<i32>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = match build_command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            return Ok(code);
        }
    };

    let verbosity = get_verbosity(&matches);
    logging::init(verbosity);

    let Some((name, sub_matches)) = matches.subcommand() else {
        return Ok(exit_codes::INVALID);
    };

    if name == "completions" {
        if let Some(shell) = sub_matches.get_one::<Shell>("shell").copied() {
            let mut command = build_command();
            clap_complete::generate(shell, &mut command, "rplay", &mut io::stdout());
        }
        return Ok(exit_codes::OK);
    }

    let app = App::load(matches.get_one::<PathBuf>("file").cloned(), verbosity)?;

    match name {
        "validate" => app.validate(),
        "show" => app.show(),
        "run" => {
            let cancellation = Cancellation::new();
            let handle = cancellation.clone();
            ctrlc::set_handler(move || handle.cancel())
                .context("failed to install Ctrl-C handler")?;

            app.execute(
                get_format(sub_matches),
                sub_matches.get_one::<String>("timeout").map(String::as_str),
                cancellation,
            )
        }
        other => anyhow::bail!("unknown command '{}'", other),
    }
}
