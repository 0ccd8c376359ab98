use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gotmpl_core::Template;
use renderer::{encode_legacy, Bridge, BridgeConfig, ErrorKind};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gotmpl")]
#[command(about = "Render Go text/templates against JSON documents.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a template and print the output.
    Render {
        /// Template file, or `-` for stdin.
        #[arg(long)]
        template: PathBuf,
        /// JSON data file, or `-` for stdin.
        #[arg(long, conflicts_with = "data_json", required_unless_present = "data_json")]
        data: Option<PathBuf>,
        /// Inline JSON data.
        #[arg(long)]
        data_json: Option<String>,
        /// Print the single prefixed string the C ABI returns.
        #[arg(long, default_value_t = false)]
        legacy: bool,
    },
    /// Parse a template and print a JSON report.
    Check {
        /// Template file, or `-` for stdin.
        #[arg(long)]
        template: PathBuf,
    },
}

#[derive(Serialize, Debug)]
struct CheckReport {
    ok: bool,
    name: String,
    templates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> ExitCode {
    init_tracing();
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("GOTMPL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Command::Render {
            template,
            data,
            data_json,
            legacy,
        } => run_render(&template, data.as_deref(), data_json, legacy),
        Command::Check { template } => run_check(&template),
    }
}

fn read_input(path: &Path) -> Result<String> {
    let text = if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("read stdin")?;
        text
    } else {
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
    };
    tracing::debug!(path = %path.display(), bytes = text.len(), "read input");
    Ok(text)
}

fn describe(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::JsonError => "invalid JSON data",
        ErrorKind::TemplateParseError => "template parse error",
        ErrorKind::TemplateExecuteError => "template execution error",
        ErrorKind::InvalidInput => "invalid input",
        ErrorKind::Internal => "internal error",
    }
}

fn run_render(
    template_path: &Path,
    data_path: Option<&Path>,
    data_json: Option<String>,
    legacy: bool,
) -> Result<ExitCode> {
    let template = read_input(template_path)?;
    let data = match (data_path, data_json) {
        (_, Some(inline)) => inline,
        (Some(path), None) => read_input(path)?,
        (None, None) => anyhow::bail!("one of --data or --data-json is required"),
    };

    let bridge = Bridge::new(BridgeConfig::from_env());
    let outcome = bridge.render(&template, &data);
    let mut stdout = std::io::stdout().lock();
    if legacy {
        stdout
            .write_all(encode_legacy(&outcome).as_bytes())
            .context("write stdout")?;
        stdout.flush().context("flush stdout")?;
        return Ok(if outcome.is_ok() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }
    match outcome {
        Ok(text) => {
            stdout.write_all(text.as_bytes()).context("write stdout")?;
            stdout.flush().context("flush stdout")?;
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            tracing::debug!(kind = %failure.kind, "render failed");
            eprintln!("{}: {}", describe(failure.kind), failure.message);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_check(template_path: &Path) -> Result<ExitCode> {
    let text = read_input(template_path)?;
    let name = BridgeConfig::from_env().template_name;
    let report = match Template::parse(&name, &text) {
        Ok(template) => CheckReport {
            ok: true,
            templates: template
                .defined_templates()
                .into_iter()
                .map(str::to_string)
                .collect(),
            name,
            error: None,
        },
        Err(err) => CheckReport {
            ok: false,
            templates: Vec::new(),
            name,
            error: Some(err.to_string()),
        },
    };
    tracing::debug!(name = %report.name, ok = report.ok, "checked template");
    println!("{}", serde_json::to_string(&report).context("encode report")?);
    Ok(if report.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
