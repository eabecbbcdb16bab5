use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;

use custody_ledger::{CommitReceipt, InMemoryStore};
use custody_machine::{CustodyError, CustodyMachine, CustodyResult};
use custody_server::{CustodyConfig, CustodyServer};
use custody_types::{BatchId, MetadataRef, PartyDirectory, PartyId, Role};

use crate::cli::*;

const DEFAULT_CONFIG: &str = "custody.toml";

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone();
    match cli.command {
        Command::Serve(args) => cmd_serve(config_path.as_deref(), args).await,
        Command::Demo(args) => cmd_demo(config_path.as_deref(), args, &cli.format).await,
        Command::Config(args) => cmd_config(config_path.as_deref(), args),
    }
}

/// Load the explicit config file, else `./custody.toml`, else demo
/// defaults. Environment overrides apply in every case.
fn load_config(path: Option<&Path>) -> anyhow::Result<CustodyConfig> {
    let mut config = match path {
        Some(path) => CustodyConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            CustodyConfig::load(&PathBuf::from(DEFAULT_CONFIG))?
        }
        None => CustodyConfig::demo(),
    };
    config.apply_env()?;
    Ok(config)
}

async fn cmd_serve(path: Option<&Path>, args: ServeArgs) -> anyhow::Result<()> {
    let mut config = load_config(path)?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind
            .parse()
            .with_context(|| format!("invalid bind address '{bind}'"))?;
    }
    println!(
        "{} custody server on {} ({})",
        "▶".green().bold(),
        config.server.bind_addr.to_string().bold(),
        if config.ledger.is_some() { "ledger".cyan() } else { "in-memory".yellow() },
    );
    CustodyServer::new(config).serve().await?;
    Ok(())
}

fn cmd_config(path: Option<&Path>, args: ConfigArgs) -> anyhow::Result<()> {
    let config = if args.defaults {
        CustodyConfig::default()
    } else {
        load_config(path)?
    };
    print!("{}", config.to_toml_string()?);
    Ok(())
}

// ---------------------------------------------------------------------------
// demo
// ---------------------------------------------------------------------------

async fn cmd_demo(path: Option<&Path>, args: DemoArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let parties = &config.parties;
    let mfg = party(parties, Role::Manufacturer)?;
    let log = party(parties, Role::Logistics)?;
    let ret = party(parties, Role::Retailer)?;

    let machine = CustodyMachine::new(Arc::new(InMemoryStore::new()), config.machine.clone());
    let batch = BatchId::parse(args.batch)?;
    let metadata = MetadataRef::parse(args.metadata)?;
    let text = *format == OutputFormat::Text;

    let steps: Vec<(String, CustodyResult<CommitReceipt>)> = vec![
        (
            format!("{mfg} registers {batch}"),
            machine.register(&batch, &metadata, &mfg).await,
        ),
        (
            format!("{mfg} offers custody to {log}"),
            machine.initiate_transfer(&batch, &log, &mfg).await,
        ),
        (
            format!("{mfg} tries to accept its own handoff"),
            machine.accept_transfer(&batch, &mfg).await,
        ),
        (
            format!("{log} accepts custody"),
            machine.accept_transfer(&batch, &log).await,
        ),
        (
            format!("{log} reports a temperature excursion"),
            machine.report_violation(&batch, "temp excursion", &log).await,
        ),
        (
            format!("{log} offers custody to {ret}"),
            machine.initiate_transfer(&batch, &ret, &log).await,
        ),
        (
            format!("{ret} accepts custody"),
            machine.accept_transfer(&batch, &ret).await,
        ),
    ];

    if text {
        for (label, outcome) in &steps {
            print_step(label, outcome);
        }
    }
    if let Some((_, Err(err))) = steps.iter().find(|(_, r)| matches!(r, Err(e) if e.rejection().is_none())) {
        anyhow::bail!("demo aborted: {err}");
    }

    let status = machine.get_status(&batch).await?;
    let timeline = machine.custody_history(&batch).await?;
    let report = machine.verify(&batch).await?;

    match format {
        OutputFormat::Json => {
            let out = json!({ "status": status, "history": timeline, "verify": report });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!();
            println!("Batch {} ({})", batch.as_str().bold(), status.state.to_string().cyan());
            if let Some(owner) = &status.owner {
                println!("  Owner: {}", owner.as_str().yellow());
            }
            if let Some(violation) = &status.violation {
                println!("  Violation: {}", violation.red());
            }
            if let Some(proof) = &status.proof_ref {
                println!("  Proof: {}", proof.short().dimmed());
            }
            println!("\nJourney:");
            for entry in &timeline.entries {
                println!(
                    "  {} {:<18} {}",
                    format!("#{}", entry.seq).yellow(),
                    entry.kind.to_string(),
                    entry.summary
                );
            }
            let verdict = if report.is_valid() { "✓ intact".green() } else { "✗ broken".red() };
            println!("\nChain: {} entries, {}", report.entry_count.to_string().bold(), verdict);
        }
    }
    Ok(())
}

fn party(parties: &PartyDirectory, role: Role) -> anyhow::Result<PartyId> {
    parties
        .resolve(role)
        .cloned()
        .with_context(|| format!("no party configured for role {role}"))
}

fn print_step(label: &str, outcome: &Result<CommitReceipt, CustodyError>) {
    match outcome {
        Ok(receipt) => println!(
            "{} {}  {}",
            "✓".green().bold(),
            label,
            receipt.transaction_ref.short().dimmed()
        ),
        Err(err) => println!("{} {}  {}", "✗".red().bold(), label, err.to_string().red()),
    }
}
