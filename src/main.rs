//! Traitforge CLI
//!
//! Command-line interface for the traitforge rarity engine.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use traitforge::cli::{commands, Cli, Commands};
use traitforge::ConstraintKind;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    info!("Traitforge v{}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Some(cmd) => handle_command(&cli.project, cmd).map_err(|e| {
            let hint = e.recovery_suggestion();
            let err = anyhow::Error::new(e);
            match hint {
                Some(hint) => err.context(hint),
                None => err,
            }
        }),
        None => {
            println!("Traitforge v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    };
    result.with_context(|| format!("project {}", cli.project.display()))
}

fn handle_command(project: &std::path::Path, cmd: Commands) -> traitforge::Result<()> {
    match cmd {
        Commands::Init => commands::init(project),
        Commands::ImportLayer { dir, name } => {
            commands::import_layer(project, &dir, name.as_deref())
        }
        Commands::Show => commands::show(project),
        Commands::Sets => commands::list_sets(project),
        Commands::AddSet => commands::add_set(project),
        Commands::DuplicateSet { number } => commands::duplicate_set(project, number),
        Commands::DeleteSet { number } => commands::delete_set(project, number),
        Commands::SelectSet { set_id } => commands::select_set(project, &set_id),
        Commands::ToggleLayer { layer } => commands::toggle_layer(project, &layer),
        Commands::ToggleTrait { layer, trait_name } => {
            commands::toggle_trait(project, &layer, &trait_name)
        }
        Commands::Weight {
            layer,
            trait_name,
            value,
        } => commands::set_weight(project, &layer, &trait_name, value),
        Commands::Equalize { layer } => commands::equalize(project, &layer),
        Commands::Randomize { layer, seed } => commands::randomize(project, &layer, seed),
        Commands::Reset { layer } => commands::reset(project, &layer),
        Commands::MoveLayer { from, to } => commands::move_layer(project, from, to),
        Commands::Incompatible {
            layer_a,
            trait_a,
            layer_b,
            trait_b,
        } => commands::add_rule(
            project,
            ConstraintKind::Incompatibility,
            (layer_a.as_str(), trait_a.as_str()),
            (layer_b.as_str(), trait_b.as_str()),
        ),
        Commands::Force {
            layer_a,
            trait_a,
            layer_b,
            trait_b,
        } => commands::add_rule(
            project,
            ConstraintKind::ForcedCombination,
            (layer_a.as_str(), trait_a.as_str()),
            (layer_b.as_str(), trait_b.as_str()),
        ),
        Commands::RemoveRule {
            kind,
            layer_a,
            trait_a,
            layer_b,
            trait_b,
        } => commands::remove_rule(
            project,
            kind.into(),
            (layer_a.as_str(), trait_a.as_str()),
            (layer_b.as_str(), trait_b.as_str()),
        ),
        Commands::Override { layer, trait_name } => {
            commands::set_override(project, &layer, trait_name.as_deref())
        }
        Commands::Combinations => commands::combinations(project),
    }
}
