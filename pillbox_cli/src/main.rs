use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use pillbox_core::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pillbox")]
#[command(about = "Daily medication intake tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: $XDG_CONFIG_HOME/pillbox/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Act as this user instead of the configured default
    #[arg(long, global = true)]
    user: Option<String>,

    /// Pin the clock to an RFC 3339 instant
    #[arg(long, global = true, value_parser = parse_instant)]
    at: Option<DateTime<Utc>>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show today's schedule with taken and pending slots (default)
    Today,

    /// Record today's intake of a slot
    Take {
        medication: Uuid,
        /// morning, lunch or evening
        slot: String,
    },

    /// Cancel today's intake of a slot
    Undo {
        medication: Uuid,
        /// morning, lunch or evening
        slot: String,
    },

    /// Report whether any dose is still pending today
    Alarm,

    /// List what was taken on a date (default: today)
    Calendar {
        /// YYYY-MM-DD
        date: Option<String>,
    },

    /// Append calendar entries for a date range to a CSV file
    Export {
        /// First date, YYYY-MM-DD
        #[arg(long)]
        from: String,
        /// Last date (inclusive), YYYY-MM-DD
        #[arg(long)]
        to: String,
        /// Output CSV path
        #[arg(long)]
        out: PathBuf,
    },

    /// Manage medications
    #[command(subcommand)]
    Med(MedCommands),
}

#[derive(Subcommand)]
enum MedCommands {
    /// Add a medication for the current user
    Add {
        name: String,
        /// Comma separated slots, e.g. morning,evening
        #[arg(long, default_value = "morning,lunch,evening")]
        slots: String,
        /// prescription or supplement
        #[arg(long, default_value = "prescription")]
        kind: String,
        /// Do not raise the alarm for pending doses
        #[arg(long)]
        no_alarm: bool,
        /// Use a fixed id instead of a random one
        #[arg(long)]
        id: Option<Uuid>,
    },

    /// List the current user's medications
    List,

    /// Stop scheduling a medication (history is kept)
    Retire { medication: Uuid },

    /// Replace a medication's slots
    Slots {
        medication: Uuid,
        /// Comma separated slots
        slots: String,
    },
}

type Service = IntakeService<JsonMedicationStore, JsonlLedger, Box<dyn Clock>>;

fn parse_instant(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 instant '{}': {}", s, e))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    pillbox_core::logging::init(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_rejection() => {
            eprintln!("{}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = cli.data_dir {
        config.data.data_dir = dir;
    }
    let user = cli.user.unwrap_or_else(|| config.user.default_user.clone());

    let clock: Box<dyn Clock> = match cli.at {
        Some(at) => Box::new(FixedClock::new(at)),
        None => Box::new(SystemClock),
    };
    let service: Service = IntakeService::new(
        JsonMedicationStore::new(config.medications_path()),
        JsonlLedger::new(config.ledger_dir()),
        config.resolver()?,
        clock,
    );
    tracing::debug!("Using data dir {:?} as {}", config.data.data_dir, user);

    match cli.command.unwrap_or(Commands::Today) {
        Commands::Today => cmd_today(&service, &user),
        Commands::Take { medication, slot } => cmd_take(&service, &user, medication, &slot),
        Commands::Undo { medication, slot } => cmd_undo(&service, &user, medication, &slot),
        Commands::Alarm => cmd_alarm(&service, &user),
        Commands::Calendar { date } => cmd_calendar(&service, &user, date.as_deref()),
        Commands::Export { from, to, out } => cmd_export(&service, &user, &from, &to, &out),
        Commands::Med(cmd) => cmd_med(&service, &user, cmd),
    }
}

fn local_time(service: &Service, instant: DateTime<Utc>) -> String {
    instant
        .with_timezone(&service.resolver().offset())
        .format("%H:%M:%S")
        .to_string()
}

fn cmd_today(service: &Service, user: &str) -> Result<()> {
    let view = service.today_view(user)?;
    let now = service.clock().now();

    println!("Today ({})", view.window.date);
    if view.medications.is_empty() {
        println!("  No active medications.");
        return Ok(());
    }

    for day in &view.medications {
        println!();
        println!("  {} [{}] {}", day.name, day.kind.as_str(), day.medication_id);
        for status in &day.slots {
            let state = match status.taken_at {
                Some(at) => format!("taken at {}", local_time(service, at)),
                None if status.is_overdue(now) => "overdue".to_string(),
                None => "pending".to_string(),
            };
            println!("    {:<8} {}", status.slot.as_str(), state);
        }
    }
    Ok(())
}

/// Medications of other users are reported as unknown
fn ensure_owned(service: &Service, user: &str, medication: Uuid) -> Result<()> {
    match service.medications().get(medication)? {
        Some(med) if med.owner_id == user => Ok(()),
        _ => Err(Error::UnknownMedication(medication)),
    }
}

fn cmd_take(service: &Service, user: &str, medication: Uuid, slot: &str) -> Result<()> {
    let slot: Slot = slot.parse()?;
    ensure_owned(service, user, medication)?;
    let record = service.record(medication, slot)?;
    println!(
        "✓ Recorded {} at {} ({})",
        slot,
        local_time(service, record.occurred_at),
        record.id
    );
    Ok(())
}

fn cmd_undo(service: &Service, user: &str, medication: Uuid, slot: &str) -> Result<()> {
    let slot: Slot = slot.parse()?;
    ensure_owned(service, user, medication)?;
    service.cancel(medication, slot)?;
    println!("✓ Cancelled {}", slot);
    Ok(())
}

fn cmd_alarm(service: &Service, user: &str) -> Result<()> {
    if !service.alarm_state(user)? {
        println!("clear");
        return Ok(());
    }

    println!("pending");
    let view = service.today_view(user)?;
    for day in alarm::pending_medications(&view.medications) {
        let slots: Vec<&str> = day.pending().map(|s| s.slot.as_str()).collect();
        println!("  {}: {}", day.name, slots.join(", "));
    }
    Ok(())
}

fn cmd_calendar(service: &Service, user: &str, date: Option<&str>) -> Result<()> {
    let date: NaiveDate = match date {
        Some(d) => DayResolver::parse_date(d)?,
        None => service.resolver().today(service.clock())?.date,
    };
    let entries = service.calendar_view(user, date)?;

    println!("Intakes on {}", date);
    if entries.is_empty() {
        println!("  No records.");
    }
    for entry in entries {
        println!(
            "  {} {:<8} {} [{}]",
            local_time(service, entry.record.occurred_at),
            entry.record.slot.as_str(),
            entry.medication_name,
            entry.kind.as_str()
        );
    }
    Ok(())
}

fn cmd_export(service: &Service, user: &str, from: &str, to: &str, out: &Path) -> Result<()> {
    let from = DayResolver::parse_date(from)?;
    let to = DayResolver::parse_date(to)?;
    let count = service.export_calendar(user, from, to, out)?;
    println!("✓ Exported {} intakes to {}", count, out.display());
    Ok(())
}

fn cmd_med(service: &Service, user: &str, cmd: MedCommands) -> Result<()> {
    let store = service.medications();
    let now = service.clock().now();

    match cmd {
        MedCommands::Add {
            name,
            slots,
            kind,
            no_alarm,
            id,
        } => {
            let mut med = Medication::new(user, name, kind.parse()?, SlotSet::parse_list(&slots)?, now);
            if let Some(id) = id {
                med.id = id;
            }
            med.alarm_enabled = !no_alarm;
            let errors = med.validate();
            if !errors.is_empty() {
                return Err(Error::InvalidMedication(errors.join("; ")));
            }
            store.insert(med.clone())?;
            println!("✓ Added {} ({})", med.name, med.id);
        }
        MedCommands::List => {
            let meds = store.list_by_owner(user)?;
            if meds.is_empty() {
                println!("No medications.");
            }
            for med in meds {
                println!(
                    "{} {} [{}] slots={} alarm={}{}",
                    med.id,
                    med.name,
                    med.kind.as_str(),
                    med.slots,
                    if med.alarm_enabled { "on" } else { "off" },
                    if med.active { "" } else { " (retired)" }
                );
            }
        }
        MedCommands::Retire { medication } => {
            let med = modify_owned(store, user, medication, |m| {
                m.active = false;
                m.updated_at = now;
            })?;
            println!("✓ Retired {}", med.name);
        }
        MedCommands::Slots { medication, slots } => {
            let slots = SlotSet::parse_list(&slots)?;
            if slots.is_empty() {
                return Err(Error::InvalidMedication("at least one slot is required".into()));
            }
            let med = modify_owned(store, user, medication, |m| {
                m.slots = slots;
                m.updated_at = now;
            })?;
            println!("✓ {} now scheduled for {}", med.name, med.slots);
        }
    }
    Ok(())
}

/// Edit one of `user`'s medications under the registry lock
fn modify_owned<F>(
    store: &JsonMedicationStore,
    user: &str,
    medication: Uuid,
    f: F,
) -> Result<Medication>
where
    F: FnOnce(&mut Medication),
{
    store.update(|registry| {
        let med = registry
            .medications
            .iter_mut()
            .find(|m| m.id == medication && m.owner_id == user)
            .ok_or(Error::UnknownMedication(medication))?;
        f(med);
        Ok(med.clone())
    })
}
