use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::Rng;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use skipmap_core::{Config, DeleteOutcome, InsertOutcome, SkipList};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skipmap")]
#[command(about = "Skip list sorted map: demo, stress test and shell")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the reference insert/search/delete sequence.
    Demo {
        #[arg(short, long, default_value_t = 6)]
        max_level: usize,
    },

    /// Hammer one list with concurrent inserts, then concurrent searches.
    Stress {
        #[arg(short, long, default_value_t = 1)]
        threads: usize,

        #[arg(short, long, default_value_t = 100_000)]
        count: usize,

        #[arg(short, long, default_value_t = 18)]
        max_level: usize,
    },

    /// Interactive shell over an in-memory list with integer keys.
    Shell {
        #[arg(short, long, default_value_t = 16)]
        max_level: usize,

        #[arg(short, long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { max_level } => run_demo(max_level),
        Commands::Stress {
            threads,
            count,
            max_level,
        } => run_stress(threads, count, max_level),
        Commands::Shell { max_level, seed } => run_shell(max_level, seed),
    }
}

fn run_demo(max_level: usize) -> Result<()> {
    let list = SkipList::new(max_level).context("Failed to create skip list")?;

    let inserts = [
        (1, "First insert"),
        (22, "Second insert"),
        (3, "Third insert"),
        (14, "Forth insert"),
        (1, "Fifth insert"),
    ];
    for (key, value) in inserts {
        match list.insert(key, value.to_string())? {
            InsertOutcome::Inserted => println!("Inserted {}: {}", key, value),
            InsertOutcome::AlreadyExists => println!("Key {} already exists", key),
        }
    }

    println!("skiplist size: {}", list.size());
    print!("{}", list);

    for key in [3, 8] {
        if list.search(&key) {
            println!("Found key {}", key);
        } else {
            println!("Key {} not found", key);
        }
    }

    report_delete(&list, 3);
    print!("{}", list);
    report_delete(&list, 15);

    Ok(())
}

fn report_delete(list: &SkipList<i64, String>, key: i64) {
    match list.delete(&key) {
        DeleteOutcome::Deleted => println!("Deleted key {}", key),
        DeleteOutcome::NotFound => println!("Key {} not found, nothing deleted", key),
    }
}

fn run_stress(threads: usize, count: usize, max_level: usize) -> Result<()> {
    if threads == 0 {
        anyhow::bail!("threads must be at least 1");
    }

    let list: SkipList<usize, String> =
        SkipList::new(max_level).context("Failed to create skip list")?;
    let per_thread = count / threads;
    info!(threads, count, max_level, "starting stress run");

    let elapsed = timed_workers(threads, |_| {
        let mut rng = rand::thread_rng();
        for _ in 0..per_thread {
            list.insert(rng.gen_range(0..count.max(1)), "a".to_string())?;
        }
        Ok(())
    })?;
    println!("insert elapsed: {:.6}s", elapsed.as_secs_f64());
    println!("size after inserts: {}", list.size());

    let elapsed = timed_workers(threads, |_| {
        let mut rng = rand::thread_rng();
        for _ in 0..per_thread {
            list.search(&rng.gen_range(0..count.max(1)));
        }
        Ok(())
    })?;
    println!("search elapsed: {:.6}s", elapsed.as_secs_f64());

    Ok(())
}

/// Runs `work` on `threads` scoped workers and returns the wall time until
/// all of them finish.
fn timed_workers<F>(threads: usize, work: F) -> Result<Duration>
where
    F: Fn(usize) -> Result<()> + Sync,
{
    let start = Instant::now();
    let work = &work;

    crossbeam::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|id| s.spawn(move |_| work(id)))
            .collect();

        handles.into_iter().try_for_each(|handle| {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("worker thread panicked"))?
        })
    })
    .map_err(|_| anyhow::anyhow!("unable to join worker threads"))??;

    Ok(start.elapsed())
}

fn run_shell(max_level: usize, seed: Option<u64>) -> Result<()> {
    let mut config = Config::new(max_level);
    config.seed = seed;
    let list = SkipList::with_config(config).context("Failed to create skip list")?;

    let mut rl = DefaultEditor::new()?;

    println!("skipmap shell");
    println!("Commands: insert <key> <value>, update <key> <value>, get <key>, search <key>, delete <key>, size, dump, quit");
    println!();

    loop {
        let readline = rl.readline("skipmap> ");

        match readline {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                if line == "quit" || line == "exit" {
                    break;
                }

                match handle_shell_command(&list, line) {
                    Ok(output) => println!("{}", output),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted");
                break;
            }
            Err(ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                break;
            }
        }
    }

    println!("Goodbye");
    Ok(())
}

fn parse_key(raw: &str) -> Result<i64> {
    raw.parse()
        .with_context(|| format!("Invalid key '{}': expected an integer", raw))
}

fn handle_shell_command(list: &SkipList<i64, String>, line: &str) -> Result<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.is_empty() {
        return Ok(String::new());
    }

    let output = match parts[0] {
        "insert" | "put" => {
            if parts.len() < 3 {
                anyhow::bail!("Usage: insert <key> <value>");
            }

            let key = parse_key(parts[1])?;
            let value = parts[2..].join(" ");

            match list.insert(key, value)? {
                InsertOutcome::Inserted => "OK".to_string(),
                InsertOutcome::AlreadyExists => format!("Key {} already exists", key),
            }
        }

        "update" => {
            if parts.len() < 3 {
                anyhow::bail!("Usage: update <key> <value>");
            }

            let key = parse_key(parts[1])?;
            let value = parts[2..].join(" ");

            match list.update(&key, value) {
                Some(previous) => format!("OK (was {})", previous),
                None => "(nil)".to_string(),
            }
        }

        "get" => {
            if parts.len() != 2 {
                anyhow::bail!("Usage: get <key>");
            }

            let key = parse_key(parts[1])?;
            list.get(&key).unwrap_or_else(|| "(nil)".to_string())
        }

        "search" => {
            if parts.len() != 2 {
                anyhow::bail!("Usage: search <key>");
            }

            let key = parse_key(parts[1])?;
            list.search(&key).to_string()
        }

        "delete" | "del" => {
            if parts.len() != 2 {
                anyhow::bail!("Usage: delete <key>");
            }

            let key = parse_key(parts[1])?;
            match list.delete(&key) {
                DeleteOutcome::Deleted => "OK".to_string(),
                DeleteOutcome::NotFound => "(not found)".to_string(),
            }
        }

        "size" => list.size().to_string(),

        "dump" => list.dump().trim_end().to_string(),

        _ => {
            anyhow::bail!("Unknown command: {}", parts[0]);
        }
    };

    Ok(output)
}
