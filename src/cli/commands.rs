//! CLI Command Implementations
//!
//! Each command opens the project through the JSON file gateway, applies one
//! engine operation and flushes the resulting saves before returning.

use std::fs;
use std::path::Path;

use tracing::info;
use walkdir::WalkDir;

use crate::constraints::{ConstraintKind, TraitRef};
use crate::engine::{Engine, Outcome};
use crate::error::{ForgeError, Result};
use crate::persistence::JsonFileGateway;
use crate::runtime::Session;
use crate::settings::{EngineSettings, SETTINGS_FILE};

type ProjectSession = Session<JsonFileGateway>;

/// Load a project directory with its settings.
pub fn open(project: &Path) -> Result<ProjectSession> {
    let settings = EngineSettings::load(project)?;
    let gateway = JsonFileGateway::new(project, settings.max_backups);
    Ok(Session::load(gateway, settings))
}

/// Open the project, run one engine operation and flush its effects.
///
/// No undo snapshot is taken; the history would not outlive the command.
fn commit<O, F>(project: &Path, op: F) -> Result<(O::Output, ProjectSession)>
where
    O: Outcome,
    F: FnOnce(&mut Engine) -> O,
{
    let mut session = open(project)?;
    let output = session.apply(op);
    session.flush();
    Ok((output, session))
}

fn active_set(session: &ProjectSession) -> Result<String> {
    session
        .engine()
        .active_set_id()
        .map(str::to_string)
        .ok_or(ForgeError::NoActiveSet)
}

/// Create the project directory, a settings file and every store.
pub fn init(project: &Path) -> Result<()> {
    info!("Initializing project at: {}", project.display());

    fs::create_dir_all(project).map_err(|e| ForgeError::DirectoryCreateError {
        path: project.to_path_buf(),
        source: e,
    })?;

    let settings_path = project.join(SETTINGS_FILE);
    if !settings_path.exists() {
        let content = serde_json::to_string_pretty(&EngineSettings::default())?;
        fs::write(&settings_path, content).map_err(|e| ForgeError::FileWriteError {
            path: settings_path.clone(),
            source: e,
        })?;
    }

    let mut session = open(project)?;
    session.apply(|e| e.everything_changed());
    session.flush();

    println!("Project initialized: {}", project.display());
    Ok(())
}

/// Register a layer whose traits are the file stems in `dir`.
pub fn import_layer(project: &Path, dir: &Path, name: Option<&str>) -> Result<()> {
    let layer = match name {
        Some(name) => name.to_string(),
        None => dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ForgeError::InvalidLayerOrder {
                reason: format!("cannot derive a layer name from {}", dir.display()),
            })?,
    };

    let mut traits: Vec<String> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
        })
        .filter(|stem| !stem.starts_with('.'))
        .collect();
    traits.sort();
    traits.dedup();

    info!(layer = %layer, traits = traits.len(), "importing layer");

    let count = traits.len();
    commit(project, |e| e.register_layer(&layer, traits))?;

    println!("Imported layer '{}' with {} traits", layer, count);
    Ok(())
}

/// Print the active set.
pub fn show(project: &Path) -> Result<()> {
    let mut session = open(project)?;
    session.flush();
    let engine = session.engine();
    let set_id = active_set(&session)?;
    let Some(set) = engine.set(&set_id) else {
        return Err(ForgeError::SetNotFound { set_id });
    };

    println!("{} ({}) - {} outputs", set.display_name(), set.id, set.nft_count);
    println!("{:-<60}", "");

    for layer_name in &set.layers {
        let Some(layer) = engine.rarity().layer(layer_name) else {
            continue;
        };
        let state = if layer.is_active(&set_id) { "on" } else { "off" };
        let pinned = engine.rarity().forced_trait(&set_id, layer_name);
        println!(
            "{} [{}] sum={:.2}{}",
            layer_name,
            state,
            layer.enabled_weight_sum(&set_id),
            pinned.map(|t| format!(" pinned={}", t)).unwrap_or_default()
        );

        for (trait_name, config) in &layer.traits {
            if let Some(entry) = config.sets.get(&set_id) {
                let marker = if entry.enabled { "+" } else { "-" };
                println!("  {} {:<24} {:>7.2}", marker, trait_name, entry.value);
            }
        }
    }

    for kind in [ConstraintKind::Incompatibility, ConstraintKind::ForcedCombination] {
        let pairs = engine.state().registry(kind).pairs(&set_id);
        if pairs.is_empty() {
            continue;
        }
        println!("{:-<60}", "");
        println!("{} rules:", kind);
        for pair in pairs {
            println!("  {} <-> {}", pair.a, pair.b);
        }
    }

    println!("{:-<60}", "");
    println!("Possible combinations: {}", set.possible_combinations);
    Ok(())
}

/// List sets in display order.
pub fn list_sets(project: &Path) -> Result<()> {
    let session = open(project)?;
    let engine = session.engine();
    let active = engine.active_set_id();

    for set in engine.sets() {
        let marker = if Some(set.id.as_str()) == active {
            ">>> "
        } else {
            "    "
        };
        println!(
            "{}{}: {} ({} layers, {} outputs, {} combinations)",
            marker,
            set.id,
            set.display_name(),
            set.layers.len(),
            set.nft_count,
            set.possible_combinations
        );
    }
    Ok(())
}

pub fn add_set(project: &Path) -> Result<()> {
    let (set_id, _) = commit(project, |e| e.add_set())?;
    println!("Added {}", set_id);
    Ok(())
}

pub fn duplicate_set(project: &Path, number: u32) -> Result<()> {
    let (created, _) = commit(project, |e| e.duplicate_set(number))?;
    match created {
        Some(set_id) => println!("Duplicated set {} as {}", number, set_id),
        None => println!("Set {} not found", number),
    }
    Ok(())
}

pub fn delete_set(project: &Path, number: u32) -> Result<()> {
    commit(project, |e| e.delete_set(number))?.0?;
    println!("Deleted set {}", number);
    Ok(())
}

pub fn select_set(project: &Path, set_id: &str) -> Result<()> {
    let (_, session) = commit(project, |e| e.select_set(set_id))?;
    println!("Active set: {}", active_set(&session)?);
    Ok(())
}

pub fn toggle_layer(project: &Path, layer: &str) -> Result<()> {
    commit(project, |e| e.toggle_layer_active(layer))?;
    Ok(())
}

pub fn toggle_trait(project: &Path, layer: &str, trait_name: &str) -> Result<()> {
    commit(project, |e| e.toggle_trait_enabled(layer, trait_name))?;
    Ok(())
}

pub fn set_weight(project: &Path, layer: &str, trait_name: &str, value: f64) -> Result<()> {
    let applied = commit(project, |e| e.update_trait_weight(layer, trait_name, value))?.0?;
    println!("{}/{} = {:.2}", layer, trait_name, applied);
    Ok(())
}

pub fn equalize(project: &Path, layer: &str) -> Result<()> {
    commit(project, |e| e.equalize_layer(layer))?;
    Ok(())
}

pub fn randomize(project: &Path, layer: &str, seed: Option<u64>) -> Result<()> {
    commit(project, |e| {
        if let Some(seed) = seed {
            e.reseed(seed);
        }
        e.randomize_layer(layer)
    })?;
    Ok(())
}

pub fn reset(project: &Path, layer: &str) -> Result<()> {
    commit(project, |e| e.reset_layer(layer))?;
    Ok(())
}

pub fn move_layer(project: &Path, from: usize, to: usize) -> Result<()> {
    commit(project, |e| e.move_layer(from, to))?.0?;
    Ok(())
}

pub fn add_rule(
    project: &Path,
    kind: ConstraintKind,
    a: (&str, &str),
    b: (&str, &str),
) -> Result<()> {
    let (a, b) = (TraitRef::new(a.0, a.1), TraitRef::new(b.0, b.1));
    commit(project, |e| e.add_constraint(kind, &a, &b))?.0?;
    println!("Added {}: {} <-> {}", kind, a, b);
    Ok(())
}

pub fn remove_rule(
    project: &Path,
    kind: ConstraintKind,
    a: (&str, &str),
    b: (&str, &str),
) -> Result<()> {
    let (a, b) = (TraitRef::new(a.0, a.1), TraitRef::new(b.0, b.1));
    commit(project, |e| e.remove_constraint(kind, &a, &b))?;
    Ok(())
}

pub fn set_override(project: &Path, layer: &str, trait_name: Option<&str>) -> Result<()> {
    match trait_name {
        Some(trait_name) => commit(project, |e| e.set_forced_trait_override(layer, trait_name))?,
        None => commit(project, |e| e.remove_forced_trait_override(layer))?,
    };
    Ok(())
}

/// Recompute the active set now and print the report.
pub fn combinations(project: &Path) -> Result<()> {
    let mut session = open(project)?;
    let set_id = active_set(&session)?;
    let Some(report) = session.engine().calculate_possible_combinations(&set_id) else {
        return Err(ForgeError::SetNotFound { set_id });
    };
    session.apply(|e| e.record_combinations(&set_id, &report));
    session.flush();

    println!("Baseline:    {}", report.baseline);
    println!("Constrained: {}", report.constrained);
    if !report.exact {
        println!("(estimate: a constrained group exceeded the enumeration limit)");
    }
    Ok(())
}
