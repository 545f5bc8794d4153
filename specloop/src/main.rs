//! Spec-driven execution loop CLI.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use specloop::core::artifact::validate_artifact;
use specloop::exit_codes;
use specloop::io::config::{LoopConfig, load_config};
use specloop::io::executor::CommandExecutor;
use specloop::io::generator::CommandGenerator;
use specloop::io::paths::{InitOptions, SpecDirPaths, SpecloopPaths, init_layout};
use specloop::io::spec_store::load_spec;
use specloop::manager::{TaskManager, TaskManagerOptions};
use specloop::orchestrator::{RunOutcome, StepOptions, StepOutcome, run_loop, run_step};
use specloop::ralph::{RalphLoop, RalphOptions};
use specloop::spec::SpecArtifact;
use specloop::tasks::{Task, walk_tasks};

#[derive(Parser)]
#[command(
    name = "specloop",
    version,
    about = "Spec-driven task execution with bounded self-correction"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.specloop/` scaffolding and a sample spec directory.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Check the parsed spec and the three artifacts against their schemas.
    Validate,
    /// Print the id of the next eligible task.
    Select,
    /// Print per-task status and attempt counters.
    Status,
    /// Execute one select-execute-correct round.
    Step {
        /// Include optional tasks in selection.
        #[arg(long)]
        include_optional: bool,
    },
    /// Run rounds until the spec completes or a task escalates.
    Run {
        /// Include optional tasks in selection.
        #[arg(long)]
        include_optional: bool,
    },
    /// Clear the correction attempt counter for a task (escalation recovery).
    ResetAttempts { task_id: String },
}

fn main() {
    specloop::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = std::env::current_dir().context("resolve working directory")?;
    match cli.command {
        Command::Init { force } => cmd_init(&root, force),
        Command::Validate => cmd_validate(&root),
        Command::Select => cmd_select(&root),
        Command::Status => cmd_status(&root),
        Command::Step { include_optional } => cmd_step(&root, include_optional),
        Command::Run { include_optional } => cmd_run(&root, include_optional),
        Command::ResetAttempts { task_id } => cmd_reset_attempts(&root, &task_id),
    }
}

struct Loaded {
    paths: SpecloopPaths,
    spec_paths: SpecDirPaths,
    config: LoopConfig,
}

fn load_environment(root: &Path) -> Result<Loaded> {
    let paths = SpecloopPaths::new(root);
    let config = load_config(&paths.config_path)?;
    let spec_paths = SpecDirPaths::new(root.join(&config.spec_dir));
    Ok(Loaded {
        paths,
        spec_paths,
        config,
    })
}

fn load_manager(env: &Loaded) -> Result<TaskManager> {
    let spec = load_spec(&env.spec_paths.parsed_spec_path())?;
    TaskManager::load(
        spec,
        TaskManagerOptions {
            state_path: env.paths.state_path.clone(),
            task_file_path: env.spec_paths.artifact_path(SpecArtifact::Tasks),
        },
    )
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let config = LoopConfig::default();
    let spec_dir = root.join(&config.spec_dir);
    let paths = init_layout(root, &spec_dir, &InitOptions { force })?;
    println!("initialized {}", paths.specloop_dir.display());
    println!("spec directory: {}", spec_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(root: &Path) -> Result<i32> {
    let env = load_environment(root)?;
    let mut errors = Vec::new();

    match load_spec(&env.spec_paths.parsed_spec_path()) {
        Ok(_) => {}
        Err(err) => errors.push(format!("spec.json: {err:#}")),
    }
    for artifact in SpecArtifact::ALL {
        let path = env.spec_paths.artifact_path(artifact);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                for error in validate_artifact(artifact, &contents, env.config.strict_validation) {
                    errors.push(format!("{}: {}", path.display(), error));
                }
            }
            Err(err) => errors.push(format!("{}: {}", path.display(), err)),
        }
    }

    if errors.is_empty() {
        println!("spec valid");
        return Ok(exit_codes::OK);
    }
    for error in &errors {
        eprintln!("{error}");
    }
    Ok(exit_codes::INVALID)
}

fn cmd_select(root: &Path) -> Result<i32> {
    let env = load_environment(root)?;
    let manager = load_manager(&env)?;
    if let Some(current) = manager.current_task() {
        println!("{current} (in progress)");
        return Ok(exit_codes::OK);
    }
    match manager.select_next_task(env.config.include_optional) {
        Some(task) => {
            println!("{}", task.id);
            Ok(exit_codes::OK)
        }
        None => {
            println!("complete");
            Ok(exit_codes::COMPLETE)
        }
    }
}

fn cmd_status(root: &Path) -> Result<i32> {
    let env = load_environment(root)?;
    let manager = load_manager(&env)?;
    let state = manager.state();

    println!("spec: {}", state.spec_id);
    if let Some(current) = manager.current_task() {
        println!("in flight: {current}");
    }
    if manager.is_complete() {
        println!("all non-optional tasks completed");
    }
    walk_tasks(manager.tasks(), &mut |task: &Task| {
        let depth = task.id.chars().filter(|c| *c == '.').count();
        let attempts = manager.attempts(&task.id);
        let attempts_note = if attempts > 0 {
            format!(" attempts={attempts}")
        } else {
            String::new()
        };
        let optional_note = if task.optional { " (optional)" } else { "" };
        println!(
            "{}{} [{}]{}{} {}",
            "  ".repeat(depth),
            task.id,
            task.status.as_str(),
            optional_note,
            attempts_note,
            task.description
        );
    });
    Ok(exit_codes::OK)
}

fn cmd_step(root: &Path, include_optional: bool) -> Result<i32> {
    let env = load_environment(root)?;
    let mut manager = load_manager(&env)?;
    let (executor, generator, mut ralph, options) = build_loop(root, &env, include_optional);

    let step = run_step(&mut manager, &mut ralph, &executor, &generator, &options)?;
    report_step(&step);
    if matches!(step, StepOutcome::Escalated { .. }) {
        return Ok(exit_codes::ESCALATED);
    }
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, include_optional: bool) -> Result<i32> {
    let env = load_environment(root)?;
    let mut manager = load_manager(&env)?;
    let (executor, generator, mut ralph, options) = build_loop(root, &env, include_optional);

    let outcome = run_loop(
        &mut manager,
        &mut ralph,
        &executor,
        &generator,
        &options,
        |step| report_step(step),
    )?;

    match outcome {
        RunOutcome::Complete {
            completed,
            skipped_optional,
        } => {
            println!("run complete: {completed} tasks completed");
            if !skipped_optional.is_empty() {
                println!("skipped optional: {}", skipped_optional.join(", "));
            }
            Ok(exit_codes::OK)
        }
        RunOutcome::Escalated {
            task_id,
            context,
            attempts,
            history,
        } => {
            // Escalation surfaces the full context verbatim, unsummarized.
            eprintln!("task '{task_id}' escalated after {attempts} attempts");
            eprintln!("--- error message ---");
            eprintln!("{}", context.message);
            if let Some(failed_test) = &context.failed_test {
                eprintln!("failed test: {failed_test}");
            }
            if !context.trace.is_empty() {
                eprintln!("--- trace ---");
                eprintln!("{}", context.trace);
            }
            eprintln!("--- attempt history ---");
            for record in &history {
                let result = if record.applied {
                    "applied".to_string()
                } else {
                    format!(
                        "failed: {}",
                        record.error.as_deref().unwrap_or("unspecified")
                    )
                };
                eprintln!(
                    "attempt {} [{}] {}",
                    record.attempt,
                    record.kind.as_str(),
                    result
                );
            }
            eprintln!("run `specloop reset-attempts {task_id}` after fixing the spec by hand");
            Ok(exit_codes::ESCALATED)
        }
    }
}

fn cmd_reset_attempts(root: &Path, task_id: &str) -> Result<i32> {
    let env = load_environment(root)?;
    let mut manager = load_manager(&env)?;
    manager.reset_attempts(task_id)?;
    println!("attempt counter for '{task_id}' reset");
    Ok(exit_codes::OK)
}

fn build_loop(
    root: &Path,
    env: &Loaded,
    include_optional: bool,
) -> (CommandExecutor, CommandGenerator, RalphLoop, StepOptions) {
    let executor = CommandExecutor {
        command: env.config.executor.command.clone(),
    };
    let generator = CommandGenerator {
        command: env.config.generator.command.clone(),
    };
    let ralph = RalphLoop::new(RalphOptions {
        max_attempts: env.config.max_attempts,
        spec_dir: env.spec_paths.dir.clone(),
        backup_dir: env.paths.backups_dir.clone(),
        max_backups: env.config.max_backups,
        strict_validation: env.config.strict_validation,
        corrections_dir: env.paths.corrections_dir.clone(),
        workdir: root.to_path_buf(),
        generator_timeout: Duration::from_secs(env.config.generator.timeout_secs),
        generator_output_limit_bytes: env.config.generator.output_limit_bytes,
    });
    let options = StepOptions {
        include_optional: include_optional || env.config.include_optional,
        workdir: root.to_path_buf(),
        error_path: env.paths.error_path.clone(),
        executor_timeout: Duration::from_secs(env.config.executor.timeout_secs),
        executor_output_limit_bytes: env.config.executor.output_limit_bytes,
    };
    (executor, generator, ralph, options)
}

fn report_step(step: &StepOutcome) {
    match step {
        StepOutcome::Completed { task_id } => println!("completed {task_id}"),
        StepOutcome::Corrected { task_id, attempt } => {
            println!("corrected {task_id} (attempt {attempt}), retrying");
        }
        StepOutcome::CorrectionFailed {
            task_id,
            attempt,
            error,
        } => {
            println!("correction for {task_id} failed (attempt {attempt}): {error}");
        }
        StepOutcome::Escalated {
            task_id, attempts, ..
        } => {
            println!("escalated {task_id} after {attempts} attempts");
        }
        StepOutcome::AllDone => println!("nothing left to do"),
    }
}
