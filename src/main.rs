use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use nixpam::config::{
    default_config_path, read_from_path, save_to_path, Settings, ValidationError,
    ValidationIssue,
};
use nixpam::search::{prioritize, run_search};
use nixpam::template::{
    current_system, ensure_mkapp, fill_package_template, ModuleTarget, MKAPP_PATH,
};
use nixpam::{write_atomic, EntryState, FlakeLayout, NixError, PackageInfo};
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nixpam")]
#[command(about = "Enable apps in NixOS / nix-darwin flake configurations", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the flake (overrides the settings file)
    #[arg(long, global = true, env = "NIXPAM_FLAKE")]
    flake: Option<PathBuf>,

    /// Settings file (default: $NIXPAM_CONFIG or ~/.config/nixpam/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enable a package under a category, creating the category if needed
    Enable {
        /// Attribute name of the package, e.g. `firefox`
        package: String,

        /// Category inside the apps container, e.g. `browsers`
        #[arg(short, long)]
        category: String,

        #[command(flatten)]
        target: Target,

        #[command(flatten)]
        module: ModuleArgs,

        /// Insert an empty apps container when the file has none
        #[arg(long)]
        create_container: bool,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Show whether a package is declared and enabled under a category
    Status {
        package: String,

        #[arg(short, long)]
        category: String,

        #[command(flatten)]
        target: Target,
    },

    /// List hosts in the flake
    Hosts,

    /// List app categories in the flake
    Categories,

    /// Search nixpkgs for packages
    Search {
        query: String,

        /// System to search for (default: settings `default_system`)
        #[arg(long)]
        system: Option<String>,

        /// Include nested packages such as `python311Packages.numpy`
        #[arg(short, long)]
        all: bool,
    },

    /// Write a settings file pointing at `--flake`
    Init {
        /// Default system for searches, e.g. `x86_64-linux`
        #[arg(long)]
        system: Option<String>,

        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },
}

/// How the package module is generated.
#[derive(Args)]
struct ModuleArgs {
    /// Attribute path in nixpkgs, e.g. `python311Packages.numpy` (default: the package)
    #[arg(long)]
    attr: Option<String>,

    /// System the module targets (default: settings `default_system`, then this machine)
    #[arg(long)]
    system: Option<String>,

    /// On Darwin, install as a Homebrew cask instead of a Nix package
    #[arg(long)]
    homebrew: bool,

    /// Only edit the host file, never write a package module
    #[arg(long)]
    no_module: bool,
}

/// Which Nix file to edit.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct Target {
    /// Edit `<flake>/<host_dir>/<host>/configuration.nix`
    #[arg(long)]
    host: Option<String>,

    /// Edit this file directly
    #[arg(long)]
    file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Enable {
            package,
            category,
            target,
            module,
            create_container,
            dry_run,
            diff,
        } => cmd_enable(
            &cli,
            package,
            category,
            target,
            module,
            *create_container,
            *dry_run,
            *diff,
        ),

        Commands::Status {
            package,
            category,
            target,
        } => cmd_status(&cli, package, category, target),

        Commands::Hosts => cmd_hosts(&cli),

        Commands::Categories => cmd_categories(&cli),

        Commands::Search { query, system, all } => {
            cmd_search(&cli, query, system.as_deref(), *all)
        }

        Commands::Init { system, force } => cmd_init(&cli, system.clone(), *force),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("nixpam=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    cli.config
        .clone()
        .or_else(default_config_path)
        .context("could not determine a settings path; pass --config")
}

/// Resolve settings for this invocation
///
/// Priority order for the flake path:
/// 1. Explicit --flake flag (or NIXPAM_FLAKE)
/// 2. `flake_path` in the settings file
///
/// A missing settings file means defaults. `require_flake` is false for
/// commands that can run without one (`--file` edits, search).
fn resolve_settings(cli: &Cli, require_flake: bool) -> Result<Settings> {
    let path = config_path(cli)?;
    let mut settings = if path.exists() {
        read_from_path(&path)?
    } else {
        tracing::debug!(path = %path.display(), "no settings file, using defaults");
        Settings::default()
    };

    if let Some(flake) = &cli.flake {
        settings.flake_path = flake.display().to_string();
    }

    if let Err(err) = settings.validate() {
        let issues: Vec<ValidationIssue> = err
            .issues
            .into_iter()
            .filter(|issue| {
                require_flake
                    || !matches!(
                        issue,
                        ValidationIssue::MissingField {
                            field: "flake_path"
                        }
                    )
            })
            .collect();

        if !issues.is_empty() {
            let err = ValidationError { issues };
            if require_flake && settings.flake_path.trim().is_empty() {
                anyhow::bail!(
                    "{}\n{}\n  {}\n  {}\n  {}",
                    "No flake configured.".red(),
                    "Try one of:".bold(),
                    "1. Pass it explicitly: nixpam --flake ~/nixos <command>",
                    "2. Set environment variable: export NIXPAM_FLAKE=~/nixos",
                    "3. Save it once: nixpam init --flake ~/nixos"
                );
            }
            return Err(anyhow::Error::new(err).context("invalid settings"));
        }
    }

    Ok(settings)
}

/// Resolve settings and the file a command edits.
fn resolve_target(cli: &Cli, target: &Target) -> Result<(Settings, PathBuf)> {
    match (&target.host, &target.file) {
        (Some(host), _) => {
            let settings = resolve_settings(cli, true)?;
            let path = FlakeLayout::from_settings(&settings).host_config(host)?;
            Ok((settings, path))
        }
        (None, Some(file)) => Ok((resolve_settings(cli, false)?, file.clone())),
        (None, None) => anyhow::bail!("either --host or --file is required"),
    }
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (edited)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn cmd_enable(
    cli: &Cli,
    package: &str,
    category: &str,
    target: &Target,
    module: &ModuleArgs,
    create_container: bool,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let (settings, path) = resolve_target(cli, target)?;
    let original = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    println!("File: {}", path.display());
    if dry_run {
        println!("{}", "[DRY RUN - showing what would be changed]".cyan());
    }

    let mut editor = settings.editor(original.as_str());
    let result = if create_container {
        editor
            .ensure_container_exists()
            .and_then(|()| editor.upsert(category, package))
    } else {
        editor.upsert(category, package)
    };

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{} {}: Error - {}", "✗".red(), package, e);
            match &e {
                NixError::ContainerNotFound { container } => {
                    eprintln!(
                        "  No `{} = {{` block in {}",
                        container,
                        path.display()
                    );
                    eprintln!("  Action: rerun with --create-container to insert one");
                }
                NixError::MalformedDocument { section } => {
                    eprintln!("  `{} = {{` is never closed with `}};`", section);
                    eprintln!("  Action: fix the block by hand; nothing was written");
                }
                _ => {}
            }
            std::process::exit(1);
        }
    };

    let modified = editor.into_content();
    let changed = modified != original;

    if outcome.changed() {
        let verb = if dry_run { "Would be" } else { "Now" };
        println!(
            "{} {}: {} enabled in {} ({})",
            "✓".green(),
            package,
            verb,
            category,
            outcome
        );
    } else {
        println!(
            "{} {}: Already enabled in {}",
            "⊙".yellow(),
            package,
            category
        );
    }

    if show_diff && changed {
        display_diff(&path, &original, &modified);
    }

    // Module before the host file
    if !module.no_module && !settings.flake_path.trim().is_empty() {
        write_module(&settings, package, category, module, dry_run)?;
    }

    if changed && !dry_run {
        write_atomic(&path, modified.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(())
}

/// Write `<module_dir>/<category>/<package>.nix` unless it already exists.
fn write_module(
    settings: &Settings,
    package: &str,
    category: &str,
    args: &ModuleArgs,
    dry_run: bool,
) -> Result<()> {
    let path = FlakeLayout::from_settings(settings).module_path(category, package)?;
    if path.exists() {
        println!("{} Module exists: {}", "⊙".yellow(), path.display());
        return Ok(());
    }

    let info = PackageInfo {
        pname: package.to_string(),
        attr_path: args.attr.clone().unwrap_or_else(|| package.to_string()),
        system: args
            .system
            .clone()
            .or_else(|| settings.default_system.clone())
            .unwrap_or_else(current_system),
        ..PackageInfo::default()
    };
    let target = ModuleTarget::new(&settings.container, category, &settings.module_dir)?;
    let text = fill_package_template(&info, &target, args.homebrew);

    if dry_run {
        println!("{} Would write module {}", "✓".green(), path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    write_atomic(&path, text.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("{} Wrote module {}", "✓".green(), path.display());

    if ensure_mkapp(&settings.flake_root())? {
        println!("{} Created {}", "✓".green(), MKAPP_PATH);
    }
    Ok(())
}

fn cmd_status(cli: &Cli, package: &str, category: &str, target: &Target) -> Result<()> {
    let (settings, path) = resolve_target(cli, target)?;
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let editor = settings.editor(content);

    println!("{}", "Package Status Report".bold());
    println!("File: {}", path.display());
    println!();

    if !editor.exists(editor.container()) {
        println!(
            "{} {} block not found",
            "✗".red(),
            editor.container().bold()
        );
    }

    if !editor.exists(category) {
        println!("{} category {} not found", "✗".red(), category.bold());
        return Ok(());
    }
    println!("{} category {} present", "✓".green(), category.bold());

    match editor.entry_state(category, package) {
        Some(EntryState::Enabled) => {
            println!("{} {} {}", "✓".green(), package, "ENABLED".green().bold())
        }
        Some(state @ (EntryState::Disabled | EntryState::Declared)) => println!(
            "{} {} {}",
            "⊙".yellow(),
            package,
            state.to_string().to_uppercase().yellow().bold()
        ),
        None => println!(
            "{} {} {}",
            "⊘".cyan(),
            package,
            "NOT DECLARED".cyan().bold()
        ),
    }

    Ok(())
}

fn cmd_hosts(cli: &Cli) -> Result<()> {
    let settings = resolve_settings(cli, true)?;
    let hosts = FlakeLayout::from_settings(&settings).hosts()?;
    print_names("hosts", &hosts);
    Ok(())
}

fn cmd_categories(cli: &Cli) -> Result<()> {
    let settings = resolve_settings(cli, true)?;
    let categories = FlakeLayout::from_settings(&settings).categories()?;
    print_names("categories", &categories);
    Ok(())
}

fn print_names(kind: &str, names: &[String]) {
    if names.is_empty() {
        println!("{}", format!("No {kind} found").yellow());
        return;
    }
    for name in names {
        println!("{name}");
    }
}

fn cmd_search(cli: &Cli, query: &str, system: Option<&str>, show_all: bool) -> Result<()> {
    let settings = resolve_settings(cli, false)?;
    let system = system.or(settings.default_system.as_deref());

    println!("Searching nixpkgs for '{}'...", query);
    let packages = prioritize(run_search(query, system)?, show_all);

    if packages.is_empty() {
        println!("{}", "No packages found".yellow());
        return Ok(());
    }

    for package in &packages {
        println!(
            "{} {}",
            package.attr_path.bold(),
            format!("({})", package.version).dimmed()
        );
        if !package.description.is_empty() {
            println!("  {}", package.description);
        }
    }

    println!();
    println!("  {} packages", format!("{}", packages.len()).green());
    Ok(())
}

fn cmd_init(cli: &Cli, system: Option<String>, force: bool) -> Result<()> {
    let Some(flake) = &cli.flake else {
        anyhow::bail!("init needs a flake: nixpam init --flake <path>");
    };
    let flake = flake
        .canonicalize()
        .with_context(|| format!("flake not found: {}", flake.display()))?;

    let path = config_path(cli)?;
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }

    let settings = Settings {
        flake_path: flake.display().to_string(),
        default_system: system,
        ..Settings::default()
    };
    settings.validate().context("invalid settings")?;
    save_to_path(&settings, &path)?;

    println!("{} Wrote settings to {}", "✓".green(), path.display());
    println!("  Flake: {}", flake.display());

    if ensure_mkapp(&flake)? {
        println!("{} Created {}", "✓".green(), MKAPP_PATH);
    } else {
        println!("{} {} already exists", "⊙".yellow(), MKAPP_PATH);
    }
    Ok(())
}
