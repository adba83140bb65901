
mod autobid;
mod charts;
mod error;
mod logger;
mod market;
mod params;
mod recommend;
mod scenarios;
mod solver;
mod utils;

use logger::{sanitize_filename, ConsoleReceiver, FileReceiver, LogEvent, Logger};
use std::path::PathBuf;

use scenarios::get_scenario_catalog;
use std::sync::atomic::Ordering;
use utils::{RAND_SEED, TOTAL_SOLVE_CALLS, VERBOSE_SOLVE};

fn main() {
    let raw_args: Vec<String> = std::env::args().collect();

    // Parse and filter out --verbose and --fastbreak arguments
    let mut args = Vec::new();
    let mut skip_next = false;
    let mut fastbreak = false;
    for (i, arg) in raw_args.iter().enumerate() {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--verbose" {
            if i + 1 < raw_args.len() && raw_args[i + 1] == "solve" {
                VERBOSE_SOLVE.store(true, Ordering::Relaxed);
                skip_next = true;
            }
            continue;
        }
        if arg == "--fastbreak" {
            fastbreak = true;
            continue;
        }
        args.push(arg.clone());
    }

    // Check if "charts" argument is provided
    if args.len() > 1 && args[1] == "charts" {
        match charts::generate_all_charts() {
            Ok(()) => {
                println!("All chart generation completed successfully.");
            }
            Err(e) => {
                eprintln!("Error generating charts: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if args.len() > 1 {
        let scenario_arg = &args[1];

        // Parse iterations parameter if present
        let iterations = if args.len() > 2 {
            match args[2].parse::<u64>() {
                Ok(n) => n,
                Err(_) => {
                    eprintln!(
                        "Error: Invalid iterations parameter '{}'. Expected a number.",
                        args[2]
                    );
                    std::process::exit(1);
                }
            }
        } else {
            1
        };

        // Parse optional starting iteration index if present
        let start_iteration = if args.len() > 3 {
            match args[3].parse::<u64>() {
                Ok(n) => n,
                Err(_) => {
                    eprintln!(
                        "Error: Invalid start iteration parameter '{}'. Expected a number.",
                        args[3]
                    );
                    std::process::exit(1);
                }
            }
        } else {
            0
        };

        // Get all scenarios from the catalog
        let all_scenarios = get_scenario_catalog();

        // Filter scenarios: if "all", use all scenarios; otherwise filter to the named scenario
        let selected: Vec<_> = if scenario_arg == "all" {
            all_scenarios.clone()
        } else {
            let found = all_scenarios.iter().find(|s| s.short_name == scenario_arg);
            match found {
                Some(scenario) => vec![scenario.clone()],
                None => {
                    eprintln!("Error: Scenario '{}' not found.", scenario_arg);
                    eprintln!("Available scenarios:");
                    for s in &all_scenarios {
                        eprintln!("  - {}", s.short_name);
                    }
                    std::process::exit(1);
                }
            }
        };

        // Set up logger with console and validation file receivers
        // Single-scenario single-iteration runs also show Scenario events on console;
        // multi-iteration runs suppress them to avoid cluttering output
        let mut logger = Logger::new();
        if scenario_arg != "all" && iterations == 1 {
            logger.add_receiver(ConsoleReceiver::new(vec![
                LogEvent::Validation,
                LogEvent::Scenario,
            ]));
        } else {
            logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation]));
        }

        // Add validation receiver (for validation events)
        let summary_receiver_id = logger.add_receiver(FileReceiver::new(
            &PathBuf::from("log/summary.log"),
            vec![LogEvent::Validation],
        ));

        // Optional per-solve log file
        let solve_receiver_id = if VERBOSE_SOLVE.load(Ordering::Relaxed) {
            Some(logger.add_receiver(FileReceiver::new(
                &PathBuf::from("log/solve.log"),
                vec![LogEvent::Solve],
            )))
        } else {
            None
        };

        // Reset and log initial solve count
        TOTAL_SOLVE_CALLS.store(0, Ordering::Relaxed);
        let initial_count = TOTAL_SOLVE_CALLS.load(Ordering::Relaxed);

        if scenario_arg == "all" {
            if iterations > 1 {
                logln!(&mut logger, LogEvent::Validation, "Running all scenarios {} times... (Total model solves: {})\n", iterations, initial_count);
            } else {
                logln!(&mut logger, LogEvent::Validation, "Running all scenarios... (Total model solves: {})\n", initial_count);
            }
        } else {
            if iterations > 1 {
                logln!(&mut logger, LogEvent::Validation, "Running scenario '{}' {} times... (Total model solves: {})\n", scenario_arg, iterations, initial_count);
            } else {
                logln!(&mut logger, LogEvent::Validation, "Running scenario '{}'... (Total model solves: {})\n", scenario_arg, initial_count);
            }
        }

        // Outer loop for scenarios
        'scenarios: for scenario in &selected {
            log!(&mut logger, LogEvent::Validation, "{}: ", scenario.short_name);

            // Add scenario-level receiver
            let scenario_receiver_id = logger.add_receiver(FileReceiver::new(
                &PathBuf::from(format!(
                    "log/{}/scenario.log",
                    sanitize_filename(scenario.short_name)
                )),
                vec![LogEvent::Scenario],
            ));

            // Inner loop for iterations
            for i in start_iteration..(start_iteration + iterations) {
                if iterations > 1 {
                    let iteration_num = i - start_iteration + 1;
                    log!(&mut logger, LogEvent::Validation, "[{}/{}] ", iteration_num, iterations);
                }

                // Set RAND_SEED to iteration number
                RAND_SEED.store(i, Ordering::Relaxed);

                match (scenario.run)(scenario.short_name, &mut logger) {
                    Ok(()) => {
                        if iterations > 1 {
                            logln!(&mut logger, LogEvent::Validation, "✓");
                        } else {
                            logln!(&mut logger, LogEvent::Validation, "✓ PASSED");
                        }
                    }
                    Err(e) => {
                        if iterations > 1 {
                            logln!(&mut logger, LogEvent::Validation, "✗");
                        } else {
                            logln!(&mut logger, LogEvent::Validation, "✗ FAILED: {}", e);
                        }

                        // If fastbreak is enabled, stop immediately on first failure
                        if fastbreak {
                            logger.remove_receiver(scenario_receiver_id);
                            logln!(&mut logger, LogEvent::Validation, "\nStopping scenario execution due to failure (--fastbreak enabled)");
                            if iterations > 1 {
                                let iteration_num = i - start_iteration + 1;
                                logln!(&mut logger, LogEvent::Validation, "Error at iteration {}/{} (seed {}): {}", iteration_num, iterations, i, e);
                            } else {
                                logln!(&mut logger, LogEvent::Validation, "Error: {}", e);
                            }
                            break 'scenarios;
                        }
                    }
                }

                // Flush to ensure validation is written to summary.log
                let _ = logger.flush();
            }

            // Remove scenario-level receiver
            logger.remove_receiver(scenario_receiver_id);
        }

        // Log final solve count
        let final_count = TOTAL_SOLVE_CALLS.load(Ordering::Relaxed);
        logln!(&mut logger, LogEvent::Validation, "\nTotal model solves completed: {}", final_count);

        if let Some(id) = solve_receiver_id {
            logger.remove_receiver(id);
        }
        logger.remove_receiver(summary_receiver_id);
    } else {
        // Default behavior: run the contested auto-bid scenario with round-level verbosity
        let mut logger = Logger::new();
        logger.add_receiver(ConsoleReceiver::new(vec![
            LogEvent::Convergence,
            LogEvent::Scenario,
            LogEvent::Validation,
        ]));
        if let Err(e) = scenarios::contested_autobid::run("contested_autobid", &mut logger) {
            eprintln!("Error running scenario: {}", e);
            std::process::exit(1);
        }
    }
}
