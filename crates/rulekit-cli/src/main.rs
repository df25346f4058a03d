//! # rulekit
//!
//! Command line front end: evaluates rule documents against a JSON context,
//! simulates host events, and validates rule files. Reports go to stdout as
//! JSON, logs go to stderr.

#![deny(unsafe_code)]

mod host;

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use rulekit_core::{Context, HandlerKind};
use rulekit_engine::{ExecutionReport, Operator, Rule, RuleEngine, parse_rules};
use rulekit_packages::{GatewayOptions, HookGateway, PackageRegistry, StaticPackage};
use rulekit_settings::{LogFormat, RulekitSettings, SettingsError};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::host::OneShotHost;

/// Package holding the categories read from `--context`.
const CLI_PACKAGE: &str = "cli";

/// Evaluate declarative rules against JSON context.
#[derive(Parser, Debug)]
#[command(name = "rulekit", version, about = "Evaluate declarative rules against JSON context")]
struct Cli {
    /// Settings file (defaults to `~/.rulekit/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Print single-line JSON.
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every enabled rule against a context document.
    Eval {
        /// Rule document (JSON array of rules).
        #[arg(long)]
        rules: PathBuf,
        /// Context document (JSON object of categories).
        #[arg(long)]
        context: Option<PathBuf>,
        /// Extra condition type reading a context path, as `TYPE=PATH`.
        #[arg(long = "condition", value_name = "TYPE=PATH")]
        conditions: Vec<String>,
    },
    /// Bind rules to their events and fire one event.
    Fire {
        /// Rule document (JSON array of rules).
        #[arg(long)]
        rules: PathBuf,
        /// Context document (JSON object of categories).
        #[arg(long)]
        context: Option<PathBuf>,
        /// Event to fire.
        #[arg(long)]
        event: String,
        /// Event arguments as a JSON array.
        #[arg(long, default_value = "[]")]
        args: String,
        /// Extra condition type reading a context path, as `TYPE=PATH`.
        #[arg(long = "condition", value_name = "TYPE=PATH")]
        conditions: Vec<String>,
    },
    /// Validate a rule document against the known handlers and operators.
    Check {
        /// Rule document (JSON array of rules).
        #[arg(long)]
        rules: PathBuf,
        /// Extra condition type reading a context path, as `TYPE=PATH`.
        #[arg(long = "condition", value_name = "TYPE=PATH")]
        conditions: Vec<String>,
    },
}

/// Result of `rulekit fire`.
#[derive(Debug, Serialize)]
struct FireReport {
    event: String,
    bindings: BTreeMap<String, i32>,
    report: ExecutionReport,
}

/// Result of `rulekit check`.
#[derive(Debug, Default, Serialize)]
struct CheckReport {
    rules: usize,
    problems: Vec<String>,
}

fn read_json(path: &Path) -> Result<Value> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn load_rules(path: &Path) -> Result<Vec<Rule>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_rules(&content).with_context(|| format!("Invalid rule document {}", path.display()))
}

fn load_context(path: Option<&Path>) -> Result<Value> {
    let Some(path) = path else {
        return Ok(Value::Object(serde_json::Map::new()));
    };
    let value = read_json(path)?;
    if !value.is_object() {
        bail!("Context document {} must be a JSON object", path.display());
    }
    Ok(value)
}

fn parse_condition_spec(spec: &str) -> Result<(&str, &str)> {
    match spec.split_once('=') {
        Some((condition_type, path)) if !condition_type.trim().is_empty() && !path.trim().is_empty() => {
            Ok((condition_type.trim(), path.trim()))
        }
        _ => bail!("Invalid --condition '{spec}', expected TYPE=PATH"),
    }
}

fn build_engine(settings: &RulekitSettings, conditions: &[String]) -> Result<RuleEngine> {
    let mut engine = RuleEngine::with_builtins();
    settings.placeholders.install(engine.placeholders_mut());
    for spec in conditions {
        let (condition_type, path) = parse_condition_spec(spec)?;
        engine
            .handlers_mut()
            .register_path_condition(condition_type, path)
            .with_context(|| format!("Invalid path in --condition '{spec}'"))?;
        debug!(condition_type, path, "registered path condition");
    }
    Ok(engine)
}

fn eval(engine: &RuleEngine, rules: &[Rule], context: Value) -> ExecutionReport {
    engine.execute(rules, &Context::from_value(context))
}

fn fire(
    engine: RuleEngine,
    settings: &RulekitSettings,
    rules: Vec<Rule>,
    context: Value,
    event: &str,
    args: &[Value],
) -> Result<FireReport> {
    let packages = Rc::new(RefCell::new(PackageRegistry::new()));
    packages
        .borrow_mut()
        .register(StaticPackage::new(CLI_PACKAGE).with_categories(context));

    let host = Rc::new(OneShotHost::default());
    let options = GatewayOptions {
        default_priority: settings.gateway.default_priority,
        hook_category: settings.gateway.hook_category.clone(),
        package: Some(CLI_PACKAGE.to_string()),
    };
    let gateway = HookGateway::with_options(host.clone(), packages, Rc::new(engine), options);

    let (bound, unbound): (Vec<Rule>, Vec<Rule>) =
        rules.into_iter().partition(|rule| rule.metadata.event_name.is_some());
    for rule in &unbound {
        warn!(rule_id = %rule.id, "rule has no metadata.event_name, skipping");
    }
    gateway.register_rules(bound)?;

    let report = gateway.fire(event, args);
    Ok(FireReport {
        event: event.to_string(),
        bindings: host.bindings(),
        report,
    })
}

fn check(engine: &RuleEngine, rules: &[Rule]) -> CheckReport {
    let handlers = engine.handlers();
    let mut report = CheckReport {
        rules: rules.len(),
        problems: Vec::new(),
    };
    let mut seen = HashSet::new();

    for rule in rules {
        if !seen.insert(rule.id.as_str()) {
            report.problems.push(format!("{}: duplicate rule id", rule.id));
        }
        for condition in &rule.conditions {
            if handlers
                .resolve_name(HandlerKind::Condition, &condition.condition_type)
                .is_none()
            {
                report
                    .problems
                    .push(format!("{}: unknown condition type '{}'", rule.id, condition.condition_type));
            }
            if Operator::parse(&condition.operator).is_none() {
                report
                    .problems
                    .push(format!("{}: unknown operator '{}'", rule.id, condition.operator));
            }
        }
        for action in &rule.actions {
            if handlers.resolve_name(HandlerKind::Action, &action.action_type).is_none() {
                report
                    .problems
                    .push(format!("{}: unknown action type '{}'", rule.id, action.action_type));
            }
        }
    }
    report
}

fn print_json(value: &impl Serialize, compact: bool) -> Result<()> {
    let out = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{out}");
    Ok(())
}

/// Settings for this run, plus the error that forced a fallback to defaults.
///
/// An explicit `--settings` file must load; the default file may be broken,
/// in which case defaults are used and the error is reported once logging
/// is up.
fn load_cli_settings(path: Option<&Path>) -> Result<(RulekitSettings, Option<SettingsError>)> {
    match path {
        Some(path) => rulekit_settings::load_settings_from_path(path)
            .map(|settings| (settings, None))
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(defaults_on_error(rulekit_settings::load_settings())),
    }
}

fn defaults_on_error(loaded: rulekit_settings::Result<RulekitSettings>) -> (RulekitSettings, Option<SettingsError>) {
    match loaded {
        Ok(settings) => (settings, None),
        Err(error) => (RulekitSettings::default(), Some(error)),
    }
}

fn warn_settings_fallback(path: &Path, error: &SettingsError) {
    warn!(path = %path.display(), %error, "settings file ignored, using defaults");
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings first: they choose the log level and format.
    let (settings, fallback) = load_cli_settings(cli.settings.as_deref())?;
    match settings.logging.format {
        LogFormat::Compact => rulekit_core::logging::init_subscriber(&settings.logging.level),
        LogFormat::Json => rulekit_core::logging::init_json_subscriber(&settings.logging.level),
    }
    if let Some(error) = &fallback {
        warn_settings_fallback(&rulekit_settings::settings_path(), error);
    }

    match cli.command {
        Command::Eval {
            rules,
            context,
            conditions,
        } => {
            let engine = build_engine(&settings, &conditions)?;
            let rules = load_rules(&rules)?;
            let context = load_context(context.as_deref())?;
            let report = eval(&engine, &rules, context);
            info!(evaluated = report.evaluated, matched = report.matched.len(), "evaluation complete");
            print_json(&report, cli.compact)
        }
        Command::Fire {
            rules,
            context,
            event,
            args,
            conditions,
        } => {
            let engine = build_engine(&settings, &conditions)?;
            let rules = load_rules(&rules)?;
            let context = load_context(context.as_deref())?;
            let args: Vec<Value> = serde_json::from_str(&args).context("--args must be a JSON array")?;
            let report = fire(engine, &settings, rules, context, &event, &args)?;
            print_json(&report, cli.compact)
        }
        Command::Check { rules, conditions } => {
            let engine = build_engine(&settings, &conditions)?;
            let report = check(&engine, &load_rules(&rules)?);
            print_json(&report, cli.compact)?;
            if !report.problems.is_empty() {
                bail!("{} problem(s) found", report.problems.len());
            }
            Ok(())
        }
    }
}
