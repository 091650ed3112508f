use std::path::PathBuf;

use horde_camp::Encampment;
use horde_doctor::{CheckContext, Mode, RunnerOptions, default_registry, run_with_options};

pub struct Args {
    pub fix: bool,
    pub dry_run: bool,
    pub warband: Option<String>,
    pub restart_sessions: bool,
    pub skip: Vec<String>,
    pub root: Option<String>,
    pub json: bool,
}

pub fn run(args: Args) {
    let root = resolve_root(args.root.as_deref());

    let ctx = CheckContext::production(&root)
        .with_warband(args.warband)
        .with_restart_sessions(args.restart_sessions);

    let mode = if args.fix {
        Mode::Fix
    } else if args.dry_run {
        Mode::DryRun
    } else {
        Mode::Detect
    };
    let options = RunnerOptions {
        skip_fixes: args.skip.into_iter().collect(),
    };

    let mut registry = default_registry();
    let report = run_with_options(&mut registry, &ctx, mode, &options);

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(2);
            }
        }
    } else {
        print!("{}", report.render_text());
    }

    std::process::exit(report.exit_code());
}

fn resolve_root(arg: Option<&str>) -> PathBuf {
    if let Some(root) = arg {
        return PathBuf::from(root);
    }
    let cwd = std::env::current_dir().unwrap_or_else(|e| {
        eprintln!("error: cannot resolve the current directory: {e}");
        std::process::exit(2);
    });
    match Encampment::discover(&cwd) {
        Some(encampment) => encampment.root().to_path_buf(),
        // Run against the cwd anyway: encampment-config will say
        // precisely what is missing instead of a bare CLI error.
        None => cwd,
    }
}
