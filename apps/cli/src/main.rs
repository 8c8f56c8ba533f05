#![deny(warnings)]

//! Headless CLI for listing, validating and playing boss-game scenarios.

use anyhow::{bail, Context, Result};
use content::ContentStore;
use game_ai::{autoplay, GreedyPolicy, Policy, RandomPolicy};
use game_core::{BossGameConfig, DecisionOption, GameMeters};
use game_session::{Session, SessionConfig, SessionEvent};
use persistence::{default_save_dir, SaveStore};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

const DEFAULT_MODULE: &str = "cash-flow-stress-test";

#[derive(Debug, Clone, Copy, PartialEq)]
enum AutoMode {
    Greedy,
    Random,
}

#[derive(Debug, Default)]
struct Args {
    module: Option<String>,
    content: Option<PathBuf>,
    save_dir: Option<PathBuf>,
    auto: Option<AutoMode>,
    seed: Option<u64>,
    no_save: bool,
    fresh: bool,
    list: bool,
    validate: bool,
    version: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--module" => args.module = it.next(),
            "--content" => args.content = it.next().map(PathBuf::from),
            "--save-dir" => args.save_dir = it.next().map(PathBuf::from),
            "--auto" => {
                args.auto = match it.next().as_deref() {
                    Some("greedy") => Some(AutoMode::Greedy),
                    Some("random") => Some(AutoMode::Random),
                    other => bail!("--auto expects greedy|random, got {:?}", other),
                }
            }
            "--seed" => {
                let raw = it.next().context("--seed expects a number")?;
                args.seed = Some(raw.parse().with_context(|| format!("bad seed {raw:?}"))?);
            }
            "--no-save" => args.no_save = true,
            "--fresh" => args.fresh = true,
            "--list" => args.list = true,
            "--validate" => args.validate = true,
            "--version" => args.version = true,
            other => bail!("unknown argument {other:?}"),
        }
    }
    Ok(args)
}

fn meters_line(m: &GameMeters) -> String {
    format!(
        "income: {} | hourly value: {} | energy: {} | replaceability: {} | optionality: {}",
        m.income, m.hourly_value, m.energy, m.replaceability, m.optionality
    )
}

fn print_events(events: &[SessionEvent]) {
    for event in events {
        match event {
            SessionEvent::Resumed { decisions } => {
                println!("Resumed saved game ({decisions} decisions made)")
            }
            SessionEvent::MonthStarted {
                month,
                title,
                intro,
            } => {
                println!("\n=== Month {}: {} ===", month + 1, title);
                if !intro.is_empty() {
                    println!("{}", intro.trim());
                }
            }
            SessionEvent::DecisionResolved {
                feedback, meters, ..
            } => {
                if !feedback.is_empty() {
                    println!("> {feedback}");
                }
                println!("  {}", meters_line(meters));
            }
            SessionEvent::SpecialEvent { text } => println!("* {text}"),
            SessionEvent::GameCompleted { ending } => {
                println!("\n*** {} ({}) ***", ending.title, ending.trajectory);
                println!("{}", ending.description);
                if !ending.snapshot.is_empty() {
                    println!("Snapshot: {}", ending.snapshot);
                }
            }
            SessionEvent::Checkpointed { key } => info!(key = %key, "checkpoint saved"),
        }
    }
}

/// Read a 1-based choice; `None` on end of input.
fn prompt_choice(count: usize) -> Result<Option<usize>> {
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("Choose 1-{count}: ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        match line.trim().parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => return Ok(Some(n - 1)),
            _ => println!("Please enter a number between 1 and {count}."),
        }
    }
}

fn run_interactive(cfg: &BossGameConfig, args: &Args) -> Result<()> {
    let store = if args.no_save {
        None
    } else {
        let dir = args
            .save_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_save_dir()));
        Some(SaveStore::open(&dir).with_context(|| format!("opening saves at {}", dir.display()))?)
    };
    let (mut session, mut events) = Session::start(cfg, store, SessionConfig::default())?;
    if args.fresh {
        events = session.reset()?;
    }
    println!("{}\n{}", cfg.title, cfg.description.trim());
    print_events(&events);

    while !session.state().is_complete() {
        for decision in session.pending()? {
            println!("\n[{:?}] {}", decision.category, decision.prompt);
            let offered: Vec<&DecisionOption> = decision
                .options
                .iter()
                .filter(|o| o.is_available(session.state().unlocks()))
                .collect();
            for (i, o) in offered.iter().enumerate() {
                println!("  {}) {}", i + 1, o.label);
                if !o.description.is_empty() {
                    println!("     {}", o.description);
                }
            }
            let Some(idx) = prompt_choice(offered.len())? else {
                println!("\nProgress is saved at the end of each month.");
                return Ok(());
            };
            let events = session.choose(decision.id.as_str(), offered[idx].id.as_str())?;
            print_events(&events);
        }
        let events = session.advance()?;
        print_events(&events);
    }
    Ok(())
}

fn run_auto(cfg: &BossGameConfig, mode: AutoMode, seed: u64) -> Result<()> {
    let mut policy: Box<dyn Policy> = match mode {
        AutoMode::Greedy => Box::new(GreedyPolicy),
        AutoMode::Random => Box::new(RandomPolicy::seeded(seed)),
    };
    let run = autoplay(cfg, policy.as_mut())?;
    for record in run.state.decisions() {
        println!(
            "Month {} | {} -> {}",
            record.month + 1,
            record.decision,
            record.option
        );
    }
    for text in &run.events {
        println!("* {text}");
    }
    println!("Final | {}", meters_line(run.state.meters()));
    println!(
        "Ending | {} | {} | {}",
        run.ending.id, run.ending.title, run.ending.trajectory
    );
    Ok(())
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::DEBUG)
        .with_writer(io::stderr)
        .init();

    let args = parse_args()?;
    if args.version {
        println!("boss-cli {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_SHA"));
        return Ok(());
    }
    info!(module = ?args.module, content = ?args.content, auto = ?args.auto, "starting CLI");

    let store = match &args.content {
        Some(dir) => ContentStore::load_dir(dir)
            .with_context(|| format!("loading scenarios from {}", dir.display()))?,
        None => ContentStore::builtin()?,
    };

    if args.list {
        for cfg in store.iter() {
            println!(
                "{} | {} | months: {} | decisions: {} | endings: {}",
                cfg.id,
                cfg.title,
                cfg.months.len(),
                cfg.decision_count(),
                cfg.endings.len()
            );
        }
        return Ok(());
    }
    if args.validate {
        // Loading already validated every scenario.
        println!("Content OK | scenarios: {}", store.len());
        return Ok(());
    }

    let module = args.module.as_deref().unwrap_or(DEFAULT_MODULE);
    let cfg = store
        .get(module)
        .with_context(|| format!("unknown module {module:?}"))?;
    match args.auto {
        Some(mode) => run_auto(cfg, mode, args.seed.unwrap_or(42)),
        None => run_interactive(cfg, &args),
    }
}
