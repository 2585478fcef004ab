#![allow(clippy::result_large_err)]

use anyhow::{anyhow, Context};
use std::path::PathBuf;
use workload_operator::config::{DeclarationsConfig, OperatorConfig};
use workload_operator::telemetry;

enum CliCommand {
    Run {
        declarations_path: Option<String>,
        output_path: Option<String>,
    },
    Validate {
        configs: Vec<String>,
    },
    Help,
    ValidateHelp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise telemetry")?;

    match parse_cli_args()? {
        CliCommand::Run {
            declarations_path,
            output_path,
        } => {
            let mut config = OperatorConfig::load().context("failed to load configuration")?;
            if let Some(path) = declarations_path {
                config.declarations_path = Some(path);
            }
            if let Some(path) = output_path {
                config.output_path = path;
            }

            let app = workload_operator::app::OperatorApp::initialise(config)
                .await
                .context("failed to construct operator")?;

            let result = app.run().await.context("operator runtime error");
            // A pending stdin read would otherwise hold the runtime open on drop.
            if let Err(err) = &result {
                eprintln!("Error: {err:?}");
                std::process::exit(1);
            }
            std::process::exit(0);
        }
        CliCommand::Validate { configs } => run_validate_command(configs),
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::ValidateHelp => {
            print_validate_help();
            Ok(())
        }
    }
}

fn parse_cli_args() -> anyhow::Result<CliCommand> {
    let mut args = std::env::args().skip(1);
    let Some(first) = args.next() else {
        return Ok(CliCommand::Run {
            declarations_path: None,
            output_path: None,
        });
    };

    if first == "validate" {
        return parse_validate_args(args);
    }

    let mut declarations_path = None;
    let mut output_path = None;
    let mut pending = Some(first);

    loop {
        let arg = match pending.take() {
            Some(value) => value,
            None => match args.next() {
                Some(value) => value,
                None => break,
            },
        };

        match arg.as_str() {
            "-c" | "--declarations" => {
                if declarations_path.is_some() {
                    anyhow::bail!("declarations path specified multiple times");
                }
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("expected path after {arg}"))?;
                declarations_path = Some(value);
            }
            "-o" | "--output" => {
                if output_path.is_some() {
                    anyhow::bail!("output path specified multiple times");
                }
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("expected path after {arg}"))?;
                output_path = Some(value);
            }
            "-h" | "--help" => return Ok(CliCommand::Help),
            other => anyhow::bail!("unrecognised argument `{other}`"),
        }
    }

    Ok(CliCommand::Run {
        declarations_path,
        output_path,
    })
}

fn parse_validate_args<I>(args: I) -> anyhow::Result<CliCommand>
where
    I: IntoIterator<Item = String>,
{
    let mut configs = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliCommand::ValidateHelp),
            other => configs.push(other.to_string()),
        }
    }

    if configs.is_empty() {
        anyhow::bail!("workload-operator validate requires at least one declarations path");
    }

    Ok(CliCommand::Validate { configs })
}

fn print_help() {
    println!(
        "\
Usage: workload-operator [OPTIONS]
       workload-operator validate <DECLARATIONS>...

Reads reconcile events as JSON lines on stdin.

Options:
  -c, --declarations <PATH>  Path to the declarations YAML file
  -o, --output <PATH>        Where the rendered workload configuration is written
  -h, --help                 Print this help message
"
    );
}

fn print_validate_help() {
    println!(
        "\
Usage: workload-operator validate <DECLARATIONS>...

Options:
  -h, --help             Print this help message
"
    );
}

fn run_validate_command(configs: Vec<String>) -> anyhow::Result<()> {
    let mut had_error = false;

    for config in configs {
        let path = PathBuf::from(&config);
        match DeclarationsConfig::from_path(&path) {
            Ok(declarations) => println!(
                "validated {} ({} relations)",
                path.display(),
                declarations.relations.len()
            ),
            Err(err) => {
                eprintln!("{}: {err}", path.display());
                had_error = true;
            }
        }
    }

    if had_error {
        Err(anyhow!("one or more declarations files failed validation"))
    } else {
        Ok(())
    }
}
