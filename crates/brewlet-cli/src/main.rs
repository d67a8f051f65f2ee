use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Context;
use brewlet::{BREWLET_VERSION, BeverageOutcome, Dispenser, MachineConfig};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
struct Args {
    config: PathBuf,
    brew_ms: Option<u64>,
    refills: Vec<(String, u32)>,
    json: bool,
    beverages: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let args = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            print_usage();
            process::exit(2);
        }
    };

    init_tracing();

    if let Err(e) = run(args).await {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!("brewlet {BREWLET_VERSION}");
    eprintln!();
    eprintln!("Usage: brewlet --config <file> [options] <beverage>...");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <file>        Machine config JSON");
    eprintln!("  --brew-ms <ms>         Simulated brew time [default: 5000]");
    eprintln!("  --refill <name=qty>    Add stock before serving (repeatable)");
    eprintln!("  --json                 Print the stock report as JSON");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  BREWLET_LOG            debug|info|warn|error [default: info]");
    eprintln!("  LOG_FORMAT=json        Structured log output");
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut config: Option<PathBuf> = None;
    let mut brew_ms = None;
    let mut refills = Vec::new();
    let mut json = false;
    let mut beverages = Vec::new();

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config = Some(PathBuf::from(
                    args.get(i).ok_or("--config requires a value")?,
                ));
            }
            "--brew-ms" => {
                i += 1;
                let raw = args.get(i).ok_or("--brew-ms requires a value")?;
                brew_ms = Some(
                    raw.parse()
                        .map_err(|_| format!("invalid --brew-ms value: {raw}"))?,
                );
            }
            "--refill" => {
                i += 1;
                let raw = args.get(i).ok_or("--refill requires a value")?;
                refills.push(parse_refill(raw)?);
            }
            "--json" => json = true,
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => beverages.push(arg.to_string()),
        }
        i += 1;
    }

    let config = config.ok_or("missing required option: --config")?;
    Ok(Args {
        config,
        brew_ms,
        refills,
        json,
        beverages,
    })
}

fn parse_refill(raw: &str) -> Result<(String, u32), String> {
    let (name, qty) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid --refill '{raw}', expected name=qty"))?;
    if name.is_empty() {
        return Err(format!("invalid --refill '{raw}', empty ingredient name"));
    }
    let qty = qty
        .parse()
        .map_err(|_| format!("invalid --refill quantity in '{raw}'"))?;
    Ok((name.to_string(), qty))
}

/// Initialize tracing with BREWLET_LOG and LOG_FORMAT support.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("BREWLET_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("brewlet={level},brewlet_cli={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let machine = MachineConfig::from_path(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let mut config = machine.dispenser_config()?;
    if let Some(ms) = args.brew_ms {
        config = config.with_brew_duration(Duration::from_millis(ms));
    }
    let dispenser = Dispenser::new(config, machine.recipe_book()?, machine.inventory()?)?;

    dispenser.start();

    if !args.refills.is_empty() {
        dispenser.refill_ingredients(args.refills)?;
    }

    let report = dispenser.request_batch(&args.beverages);
    for outcome in report.outcomes() {
        match outcome {
            BeverageOutcome::Dispatched { beverage } => println!("{beverage}: brewing"),
            BeverageOutcome::UnknownBeverage { beverage } => {
                println!("{beverage}: no composition data")
            }
            BeverageOutcome::Insufficient {
                beverage,
                shortfall,
            } => println!("{beverage}: cannot be prepared because {shortfall}"),
            BeverageOutcome::DispatchFailed { beverage, error } => {
                println!("{beverage}: {error}")
            }
        }
    }

    let stock = dispenser.report_inventory();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stock)?);
    } else {
        print!("{stock}");
    }

    info!("Waiting for outlets to finish");
    let outcome = dispenser.stop().await;
    if !outcome.is_clean() {
        warn!(?outcome, "Some beverages were abandoned");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("brewlet")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_full_command_line() {
        let args = parse_args(&argv(&[
            "--config",
            "input.json",
            "--brew-ms",
            "10",
            "--refill",
            "hot_water=200",
            "--json",
            "hot_tea",
            "black_tea",
        ]))
        .unwrap();

        assert_eq!(args.config, PathBuf::from("input.json"));
        assert_eq!(args.brew_ms, Some(10));
        assert_eq!(args.refills, [("hot_water".to_string(), 200)]);
        assert!(args.json);
        assert_eq!(args.beverages, ["hot_tea", "black_tea"]);
    }

    #[test]
    fn config_is_required() {
        let err = parse_args(&argv(&["hot_tea"])).unwrap_err();
        assert_eq!(err, "missing required option: --config");
    }

    #[test]
    fn rejects_unknown_flag() {
        let err = parse_args(&argv(&["--config", "x.json", "--fast"])).unwrap_err();
        assert_eq!(err, "unknown flag: --fast");
    }

    #[test]
    fn refill_needs_name_and_quantity() {
        assert!(parse_refill("sugar_syrup").is_err());
        assert!(parse_refill("=5").is_err());
        assert!(parse_refill("sugar_syrup=-5").is_err());
        assert_eq!(
            parse_refill("sugar_syrup=60").unwrap(),
            ("sugar_syrup".to_string(), 60)
        );
    }
}
