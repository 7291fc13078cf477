//! Report Playground CLI
//!
//! Usage:
//!   report-playground [OPTIONS] <COMMAND>
//!
//! Commands:
//!   render   Render the active template once
//!   check    Compile the active template and report diagnostics
//!   watch    Re-render whenever the template project changes
//!
//! Options:
//!   -c, --config <FILE>     Playground configuration (TOML format)
//!   -r, --root <DIR>        Template project root
//!   -t, --template <NAME>   Template directory, instead of the pointer file
//!   -h, --help              Print help

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use report_playground::{
    preprocess, ChangeWatcher, IgnoredPaths, NotifyWatcher, PlaygroundConfig, ProjectRoot,
    RenderError, Report, ReportRenderer, TextDocument,
};

/// Events closer together than this are handled by a single render
const DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "report-playground")]
#[command(about = "Live-recompiling document templates")]
struct Cli {
    /// Playground configuration file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Template project root, overriding the configuration
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Template directory to render instead of the one named by the pointer file
    #[arg(short, long)]
    template: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render the active template once
    Render {
        /// Write the rendered document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compile the active template and report diagnostics
    Check,
    /// Re-render whenever the template project changes
    Watch {
        /// Write the rendered document here after every render
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();
}

fn load_config(cli: &Cli) -> Result<PlaygroundConfig, RenderError> {
    let mut config = match &cli.config {
        Some(path) => PlaygroundConfig::from_file(path)?,
        None => PlaygroundConfig::default(),
    };
    if let Some(root) = &cli.root {
        config = config.with_root(ProjectRoot::Path(root.clone()));
    }
    if let Some(name) = &cli.template {
        config = config.with_template(name.clone());
    }
    Ok(config)
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match &cli.command {
        Command::Render { output, json } => {
            let renderer = ReportRenderer::without_watcher(config);
            render_once(&renderer, output.as_deref(), *json)
        }
        Command::Check => check(&ReportRenderer::without_watcher(config)),
        Command::Watch { output } => watch(config, output.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn render_once(renderer: &ReportRenderer, output: Option<&Path>, json: bool) -> Result<(), RenderError> {
    let mut document = TextDocument::new();
    let report = match renderer.render(&mut document) {
        Ok(report) => report,
        Err(RenderError::Compilation(err)) => {
            print_diagnostics(renderer, &err);
            return Err(RenderError::Compilation(err));
        }
        Err(e) => return Err(e),
    };

    if json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    print_log(&report);
    write_output(&report, output)
}

fn print_log(report: &Report) {
    for line in report.log() {
        eprintln!("{}", line);
    }
}

fn write_output(report: &Report, output: Option<&Path>) -> Result<(), RenderError> {
    match output {
        Some(path) => fs::write(path, report.rendered_bytes()).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        }),
        None => {
            println!("{}", String::from_utf8_lossy(report.rendered_bytes()));
            Ok(())
        }
    }
}

/// Pretty-print compile diagnostics against the preprocessed template
fn print_diagnostics(renderer: &ReportRenderer, err: &report_playground::CompileError) {
    let Ok(location) = renderer.locate_template() else {
        return;
    };
    let Ok(source) = fs::read_to_string(&location.file) else {
        return;
    };
    let filename = location.file.display().to_string();
    eprintln!("{}", err.format(&preprocess(&source), &filename));
}

fn check(renderer: &ReportRenderer) -> Result<(), RenderError> {
    match renderer.check() {
        Ok((location, unit)) => {
            let source = fs::read_to_string(&location.file).unwrap_or_default();
            let preprocessed = preprocess(&source);
            let filename = location.file.display().to_string();
            for warning in unit.warnings() {
                eprintln!("{}", warning.format(&preprocessed, &filename));
            }
            println!(
                "{}: ok ({} warning{})",
                location.name,
                unit.warnings().len(),
                if unit.warnings().len() == 1 { "" } else { "s" }
            );
            Ok(())
        }
        Err(RenderError::Compilation(err)) => {
            print_diagnostics(renderer, &err);
            Err(RenderError::Compilation(err))
        }
        Err(e) => Err(e),
    }
}

fn watch(config: PlaygroundConfig, output: Option<&Path>) -> Result<(), RenderError> {
    // Our own writes inside the project must not trigger another render
    let mut ignored = IgnoredPaths::new();
    if let Some(path) = output {
        ignored = ignored.with(path);
    }
    if let Some(dir) = &config.scratch_dir {
        ignored = ignored.with(dir);
    }

    let (tx, rx) = mpsc::channel();
    let watcher = Arc::new(NotifyWatcher::new(move |event| {
        if ignored.is_relevant(event) {
            let _ = tx.send(());
        }
    })?);
    watcher.watch(&config.project_root())?;

    let renderer = ReportRenderer::new(config, watcher);
    loop {
        if let Err(e) = render_once(&renderer, output, false) {
            eprintln!("Error: {}", e);
        }

        // Wait for a change, then let the burst of events settle
        if rx.recv().is_err() {
            return Ok(());
        }
        while rx.recv_timeout(DEBOUNCE).is_ok() {}
    }
}
