//! # scrap-pos CLI
//!
//! Command-line front end for the point-of-sale core.
//!
//! ## Usage
//!
//! ```bash
//! # Weigh, save and print a transaction
//! scrap-pos checkout --material Steel=10@50 --material Copper=2.5@800 --print
//!
//! # Accumulate several weighings of one material
//! scrap-pos checkout --batch Aluminium@120=1.2,0.8,2.0 --print-later
//!
//! # Retry a failed save up to twice before giving up
//! scrap-pos checkout --material Brass=4@300 --retry-save 2
//!
//! # Work with receipts saved for later
//! scrap-pos receipts list
//! scrap-pos receipts print receipt_1768910400000
//!
//! # Run the diagnostic suite against a simulated printer
//! scrap-pos --simulate-printer diagnose --stress 5
//!
//! # Check the printer itself
//! scrap-pos test-page
//! ```

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use scrap_pos::{
    ScrapPosError,
    checkout::{Completion, SaveFailureOption, save_failure_message},
    config::PosConfig,
    diagnostics::RunStatus,
    event::Outcome,
    format,
    pending::ReceiptKey,
    printer::{BluetoothPrinter, PrintUpdate, PrinterMode},
    protocol,
    session::{PosSession, SessionUpdate},
    transaction::{TransactionDraft, WeighingBatch, WeightSource, model::millis},
};

/// scrap-pos - Scrap-metal point of sale
#[derive(Parser, Debug)]
#[command(name = "scrap-pos")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for transactions and pending receipts
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Printer device path
    #[arg(long, global = true, value_name = "PATH")]
    device: Option<PathBuf>,

    /// Use the simulated printer
    #[arg(long, global = true)]
    simulate_printer: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Confirm and save a transaction
    Checkout(CheckoutArgs),

    /// Receipts saved for later printing
    Receipts {
        #[command(subcommand)]
        command: ReceiptCommands,
    },

    /// Saved transactions
    Transactions {
        #[command(subcommand)]
        command: TransactionCommands,
    },

    /// Run the connection diagnostic suite
    Diagnose {
        /// Also run a connection stress test with N iterations
        #[arg(long, value_name = "N")]
        stress: Option<u32>,

        /// Zero the health counters before running
        #[arg(long)]
        reset_health: bool,
    },

    /// Print the printer test page
    TestPage,
}

#[derive(Args, Debug)]
struct CheckoutArgs {
    /// Weighed material as NAME=KG@PRICE (repeatable)
    #[arg(long = "material", value_name = "NAME=KG@PRICE", value_parser = parse_material)]
    materials: Vec<(String, f64, f64)>,

    /// Several weighings of one material as NAME@PRICE=KG,KG,...
    #[arg(long = "batch", value_name = "NAME@PRICE=KG,...", value_parser = parse_batch)]
    batches: Vec<WeighingBatch>,

    /// Drop a material line added by --material or --batch (repeatable)
    #[arg(long = "remove", value_name = "NAME")]
    removed: Vec<String>,

    /// Weights were entered by hand rather than read from the scale
    #[arg(long)]
    manual: bool,

    /// Retry a failed save up to N times
    #[arg(long, value_name = "N", default_value_t = 0)]
    retry_save: u32,

    /// Extra notes stored with the transaction
    #[arg(long)]
    notes: Option<String>,

    /// Print the receipt once saved
    #[arg(long, conflicts_with = "print_later")]
    print: bool,

    /// Keep the receipt for later printing
    #[arg(long)]
    print_later: bool,

    /// Show the receipt text
    #[arg(long)]
    preview: bool,
}

#[derive(Subcommand, Debug)]
enum ReceiptCommands {
    /// List pending receipts
    List,
    /// Show one receipt
    Show { key: ReceiptKey },
    /// Print one receipt and remove it
    Print { key: ReceiptKey },
    /// Remove one receipt
    Delete { key: ReceiptKey },
    /// Remove every receipt
    Clear,
}

#[derive(Subcommand, Debug)]
enum TransactionCommands {
    /// List saved transactions, newest first
    List,
    /// Show one transaction and its materials
    Show { row_id: i64 },
    /// Totals over completed transactions
    Stats,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), ScrapPosError> {
    let mut config = match &cli.config {
        Some(path) => PosConfig::load(path)?,
        None => PosConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(device) = cli.device {
        config.printer.device = device;
    }
    if cli.simulate_printer {
        config.printer.mode = PrinterMode::Simulated;
    }

    let mut session = PosSession::open(config)?;

    match cli.command {
        Commands::Checkout(args) => checkout(&mut session, args).await,
        Commands::Receipts { command } => receipts(&session, command),
        Commands::Transactions { command } => transactions(&session, command),
        Commands::Diagnose {
            stress,
            reset_health,
        } => diagnose(&mut session, stress, reset_health).await,
        Commands::TestPage => test_page(&session),
    }
}

// ============================================================================
// CHECKOUT
// ============================================================================

async fn checkout(session: &mut PosSession, args: CheckoutArgs) -> Result<(), ScrapPosError> {
    let now = Local::now();
    let currency = session.config().shop.currency.clone();

    let mut draft = TransactionDraft::new();
    for (name, weight, price) in &args.materials {
        draft.add(name, *weight, *price, millis(&now))?;
    }
    for batch in &args.batches {
        println!(
            "{}: {} weighings, {}, {}",
            batch.material_name,
            batch.weights().len(),
            format::weight_kg(batch.total_weight()),
            format::currency(&currency, batch.total_value())
        );
        draft.add_batch(batch, millis(&now))?;
    }
    for name in &args.removed {
        if draft.remove(name).is_none() {
            tracing::warn!("No material named {:?} to remove", name);
        }
    }
    println!(
        "Confirming {} materials, {}, {}",
        draft.len(),
        format::weight_kg(draft.total_weight()),
        format::currency(&currency, draft.total_value())
    );

    let source = if args.manual {
        WeightSource::Manual
    } else {
        WeightSource::BleScale
    };
    session
        .checkout()
        .confirm(&draft, source, args.notes.as_deref(), now)?;

    let mut completion = next_completion(session).await?;
    let mut retries_left = args.retry_save;
    while let Completion::SaveFailed { error, .. } = &completion {
        if retries_left == 0 {
            break;
        }
        retries_left -= 1;
        println!("Save failed: {}", error);
        println!("{}...", SaveFailureOption::RetrySave.label());
        session.checkout().retry_save()?;
        completion = next_completion(session).await?;
    }

    match &completion {
        Completion::Saved {
            row_id,
            summary,
            detail,
            ..
        } => {
            println!("{}", summary);
            println!("{}", detail);
            println!("Row: {}", row_id);
        }
        Completion::SaveFailed {
            error,
            transaction,
            options,
            ..
        } => {
            println!("{}", save_failure_message(error, transaction, &currency));
            let labels: Vec<_> = options.iter().map(|o| o.label()).collect();
            println!("Options: {}", labels.join(" / "));
            println!("Use --retry-save N to retry, --print to print anyway");
        }
    }

    if args.preview {
        println!();
        print!("{}", completion.receipt());
    }

    let receipt = completion.receipt().to_string();
    if args.print_later {
        let key = session.print().print_later(&receipt)?;
        println!("Receipt saved for later: {}", key);
    } else if args.print {
        print_with_retries(session, receipt).await?;
    }

    if matches!(completion, Completion::SaveFailed { .. }) {
        return Err(ScrapPosError::Persistence("Transaction was not saved".into()));
    }
    Ok(())
}

async fn next_completion(session: &mut PosSession) -> Result<Completion, ScrapPosError> {
    loop {
        match session.next_update().await {
            Some(SessionUpdate::Checkout(completion)) => return Ok(completion),
            Some(other) => tracing::debug!("Skipping {:?}", other),
            None => return Err(ScrapPosError::Persistence("Save never completed".into())),
        }
    }
}

/// Print, retrying while attempts remain; a final failure stores the
/// receipt for later.
async fn print_with_retries(session: &mut PosSession, receipt: String) -> Result<(), ScrapPosError> {
    let mut attempt = session.print().request_print(receipt.clone())?;
    loop {
        println!("Printing receipt (attempt {})...", attempt);
        match session.next_update().await {
            Some(SessionUpdate::Print(PrintUpdate::Succeeded { .. })) => {
                println!("Receipt printed");
                session.print().dismiss();
                return Ok(());
            }
            Some(SessionUpdate::Print(PrintUpdate::Failed {
                reason, can_retry, ..
            })) => {
                println!("Print failed: {}", reason);
                if can_retry {
                    attempt = session.print().retry()?;
                    continue;
                }
                let key = session.print().print_later(&receipt)?;
                session.print().dismiss();
                println!("Receipt saved for later: {}", key);
                return Ok(());
            }
            Some(other) => tracing::debug!("Skipping {:?}", other),
            None => return Err(ScrapPosError::Transport("Print never completed".into())),
        }
    }
}

// ============================================================================
// RECEIPTS, TRANSACTIONS
// ============================================================================

fn receipts(session: &PosSession, command: ReceiptCommands) -> Result<(), ScrapPosError> {
    let store = session.pending();
    match command {
        ReceiptCommands::List => {
            let receipts = store.list_all()?;
            if receipts.is_empty() {
                println!("No pending receipts");
            }
            for receipt in receipts {
                println!("{}  {}", receipt.key, receipt.title());
            }
        }
        ReceiptCommands::Show { key } => match store.get(&key)? {
            Some(content) => print!("{}", content),
            None => println!("No pending receipt {}", key),
        },
        ReceiptCommands::Print { key } => {
            store.print_now(session.printer().as_ref(), &key)?;
            println!("Printed {}", key);
        }
        ReceiptCommands::Delete { key } => {
            if store.delete(&key)? {
                println!("Deleted {}", key);
            } else {
                println!("No pending receipt {}", key);
            }
        }
        ReceiptCommands::Clear => {
            let count = store.clear()?;
            println!("Cleared {} receipts", count);
        }
    }
    Ok(())
}

fn transactions(session: &PosSession, command: TransactionCommands) -> Result<(), ScrapPosError> {
    let currency = &session.config().shop.currency;
    let repository = session.repository();
    match command {
        TransactionCommands::List => {
            let stored = repository.list()?;
            if stored.is_empty() {
                println!("No transactions");
            }
            for s in stored {
                let t = &s.transaction;
                println!(
                    "{:>4}  {}  {}  {} materials  {:>12}  {}",
                    s.row_id,
                    t.transaction_id,
                    t.formatted_timestamp(),
                    t.material_count,
                    t.formatted_total_weight(),
                    t.formatted_total_value(currency)
                );
            }
        }
        TransactionCommands::Show { row_id } => match repository.get(row_id)? {
            Some(s) => {
                let t = &s.transaction;
                println!("{}  (row {})", t.transaction_id, s.row_id);
                println!("Date:   {}", t.formatted_timestamp());
                if let Some(notes) = &t.notes {
                    println!("Notes:  {}", notes);
                }
                for item in &s.items {
                    println!(
                        "  {:<20} {:>12}  @ {}/kg",
                        item.material_name,
                        format::weight_kg(item.weight),
                        format::currency(currency, item.price_per_kg)
                    );
                }
                println!("Total:  {}  {}", t.formatted_total_weight(), t.formatted_total_value(currency));
            }
            None => println!("No transaction with row {}", row_id),
        },
        TransactionCommands::Stats => {
            let stats = repository.stats()?;
            println!("Transactions: {}", stats.total_transactions);
            println!("Total weight: {}", stats.formatted_total_weight());
            println!("Total value:  {}", stats.formatted_total_value(currency));
        }
    }
    Ok(())
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

async fn diagnose(
    session: &mut PosSession,
    stress: Option<u32>,
    reset_health: bool,
) -> Result<(), ScrapPosError> {
    if reset_health {
        session.health().reset()?;
        println!("Health counters reset");
    }
    if session.diagnostics().run_comprehensive() == RunStatus::Started {
        println!("Running diagnostics...");
    }
    let results = loop {
        match session.next_update().await {
            Some(SessionUpdate::Diagnostics(outcome)) => break outcome,
            Some(other) => tracing::debug!("Skipping {:?}", other),
            None => return Err(ScrapPosError::Diagnostic("Diagnostics never completed".into())),
        }
    };
    let passed = match results {
        Outcome::Success(results) => {
            print!("{}", results);
            results.all_passed()
        }
        Outcome::Failure(reason) => return Err(ScrapPosError::Diagnostic(reason)),
        Outcome::Cancelled => return Err(ScrapPosError::Diagnostic("Diagnostics cancelled".into())),
    };

    if let Some(iterations) = stress {
        session.diagnostics().run_stress_test(iterations);
        let report = loop {
            match session.next_update().await {
                Some(SessionUpdate::StressTest(outcome)) => break outcome,
                Some(other) => tracing::debug!("Skipping {:?}", other),
                None => return Err(ScrapPosError::Diagnostic("Stress test never completed".into())),
            }
        };
        match report {
            Outcome::Success(report) => print!("{}", report),
            Outcome::Failure(reason) => println!("Stress test not run: {}", reason),
            Outcome::Cancelled => println!("Stress test cancelled"),
        }
    }

    if !passed {
        return Err(ScrapPosError::Diagnostic("Some diagnostics failed".into()));
    }
    Ok(())
}

fn test_page(session: &PosSession) -> Result<(), ScrapPosError> {
    let settings = &session.config().printer;
    if settings.mode == PrinterMode::Simulated {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let job = protocol::encode_test_page(&stamp, "simulated");
        println!("Simulated test page: {} bytes", job.len());
        return Ok(());
    }
    let sent = BluetoothPrinter::new(settings).print_test_page()?;
    println!("Test page sent ({} bytes)", sent);
    Ok(())
}

// ============================================================================
// ARGUMENT PARSING
// ============================================================================

/// `NAME=KG@PRICE`
fn parse_material(s: &str) -> Result<(String, f64, f64), String> {
    let (name, rest) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=KG@PRICE, got '{}'", s))?;
    let (weight, price) = rest
        .split_once('@')
        .ok_or_else(|| format!("expected NAME=KG@PRICE, got '{}'", s))?;
    Ok((
        name.trim().to_string(),
        parse_number(weight, "weight")?,
        parse_number(price, "price")?,
    ))
}

/// `NAME@PRICE=KG,KG,...`
fn parse_batch(s: &str) -> Result<WeighingBatch, String> {
    let (head, weights) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME@PRICE=KG,..., got '{}'", s))?;
    let (name, price) = head
        .rsplit_once('@')
        .ok_or_else(|| format!("expected NAME@PRICE=KG,..., got '{}'", s))?;

    let mut batch = WeighingBatch::new(name.trim(), parse_number(price, "price")?);
    for weight in weights.split(',').filter(|w| !w.trim().is_empty()) {
        batch
            .push(parse_number(weight, "weight")?)
            .map_err(|e| e.to_string())?;
    }
    Ok(batch)
}

fn parse_number(s: &str, what: &str) -> Result<f64, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("invalid {} '{}'", what, s.trim()))
}
