//! Engine Scenario Tests
//!
//! End-to-end checks of weight distribution, set management, rules and
//! combination counting through the public engine API.

use approx::assert_relative_eq;
use pretty_assertions::assert_eq;
use test_case::test_case;

use traitforge::{Engine, EngineSettings, StoreKind};

fn engine(layers: &[(&str, &[&str])]) -> Engine {
    let mut engine = Engine::new(EngineSettings::default()).with_seed(42);
    for (name, traits) in layers {
        let _ = engine.register_layer(name, traits.iter().map(|t| t.to_string()).collect());
    }
    engine
}

fn value(engine: &Engine, set_id: &str, layer: &str, trait_name: &str) -> f64 {
    engine
        .rarity()
        .trait_set(layer, trait_name, set_id)
        .map(|c| c.value)
        .unwrap_or(f64::NAN)
}

fn layer_sum(engine: &Engine, set_id: &str, layer: &str) -> f64 {
    engine.rarity().layer(layer).unwrap().enabled_weight_sum(set_id)
}

fn combinations(engine: &Engine) -> u64 {
    let set_id = engine.active_set_id().unwrap();
    engine
        .calculate_possible_combinations(set_id)
        .unwrap()
        .constrained
}

// === Weight Distribution ===

#[test]
fn test_equalize_three_traits() {
    let mut engine = engine(&[("L", &["A", "B", "C"])]);
    engine.update_trait_weight("L", "A", 70.0).unwrap();
    let _ = engine.equalize_layer("L");

    for t in ["A", "B", "C"] {
        assert_relative_eq!(value(&engine, "set1", "L", t), 100.0 / 3.0, epsilon = 1e-9);
    }
}

#[test]
fn test_disable_then_redistribute() {
    let mut engine = engine(&[("L", &["A", "B", "C"])]);
    let _ = engine.equalize_layer("L");
    let _ = engine.toggle_trait_enabled("L", "B");

    assert_relative_eq!(value(&engine, "set1", "L", "A"), 50.0, epsilon = 1e-9);
    assert_relative_eq!(value(&engine, "set1", "L", "C"), 50.0, epsilon = 1e-9);
    assert_eq!(value(&engine, "set1", "L", "B"), 0.0);
    assert!(!engine.rarity().is_trait_enabled("set1", "L", "B"));
}

#[test]
fn test_reenable_gives_equal_split_not_old_values() {
    let mut engine = engine(&[("L", &["A", "B", "C"])]);
    engine.update_trait_weight("L", "A", 90.0).unwrap();
    let _ = engine.toggle_trait_enabled("L", "A");
    let _ = engine.toggle_trait_enabled("L", "A");

    assert!(engine.rarity().is_trait_enabled("set1", "L", "A"));
    assert_relative_eq!(layer_sum(&engine, "set1", "L"), 100.0, epsilon = 0.01);
    assert_relative_eq!(value(&engine, "set1", "L", "A"), 100.0 / 3.0, epsilon = 1e-9);
}

#[test_case(2 ; "two traits")]
#[test_case(5 ; "five traits")]
#[test_case(12 ; "twelve traits")]
fn test_randomize_sums_to_hundred(n: usize) {
    let traits: Vec<String> = (0..n).map(|i| format!("t{}", i)).collect();
    let names: Vec<&str> = traits.iter().map(String::as_str).collect();
    let mut engine = engine(&[("L", &names)]);

    for _ in 0..20 {
        let _ = engine.randomize_layer("L");
        for t in &names {
            let v = value(&engine, "set1", "L", t);
            assert!((0.0..=100.0).contains(&v), "{} out of range: {}", t, v);
        }
        assert_relative_eq!(layer_sum(&engine, "set1", "L"), 100.0, epsilon = 0.01);
    }
}

#[test]
fn test_weight_edit_scales_others() {
    let mut engine = engine(&[("L", &["A", "B", "C"])]);
    let applied = engine.update_trait_weight("L", "A", 150.0).unwrap().0;

    assert_eq!(applied, 100.0);
    assert_eq!(value(&engine, "set1", "L", "B"), 0.0);
    assert_eq!(value(&engine, "set1", "L", "C"), 0.0);
}

#[test]
fn test_non_finite_weight_is_rejected() {
    let mut engine = engine(&[("L", &["A", "B"])]);
    let before = engine.state().clone();

    let err = engine.update_trait_weight("L", "A", f64::NAN).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_WEIGHT");
    assert_eq!(engine.state(), &before);
}

// === Layer Order ===

#[test_case(0 ; "zero")]
#[test_case(-5 ; "negative")]
#[test_case(traitforge::model::MAX_Z_INDEX_SPACING + 1 ; "above bound")]
#[test_case(i64::MAX ; "max")]
fn test_layer_spacing_out_of_range_is_rejected(spacing: i64) {
    let mut engine = engine(&[("bg", &["a"]), ("body", &["b"]), ("eyes", &["c"])]);
    let before = engine.state().clone();

    let err = engine.set_layer_spacing(spacing).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_LAYER_ORDER");
    assert_eq!(engine.state(), &before);
}

#[test]
fn test_layer_spacing_at_bound_is_accepted() {
    let spacing = traitforge::model::MAX_Z_INDEX_SPACING;
    let mut engine = engine(&[("bg", &["a"]), ("body", &["b"]), ("eyes", &["c"])]);

    engine.set_layer_spacing(spacing).unwrap();
    let z = engine.rarity().trait_set("eyes", "c", "set1").unwrap().z_index;
    assert_eq!(z, 2 * spacing);
}

// === Combinations ===

#[test]
fn test_unconstrained_product() {
    let engine = engine(&[("L1", &["a", "b"]), ("L2", &["x", "y", "z"])]);
    let report = engine.calculate_possible_combinations("set1").unwrap();

    assert_eq!(report.baseline, 6);
    assert_eq!(report.constrained, 6);
    assert!(report.exact);
}

#[test]
fn test_rules_narrow_the_count() {
    let mut engine = engine(&[("L1", &["a", "b"]), ("L2", &["x", "y", "z"])]);

    engine.add_incompatibility("L1", "a", "L2", "x").unwrap();
    assert_eq!(combinations(&engine), 5);

    let _ = engine.remove_constraint(
        traitforge::ConstraintKind::Incompatibility,
        &traitforge::TraitRef::new("L1", "a"),
        &traitforge::TraitRef::new("L2", "x"),
    );
    engine.add_forced_combination("L1", "a", "L2", "x").unwrap();
    assert_eq!(combinations(&engine), 3);
}

#[test]
fn test_override_pins_one_trait() {
    let mut engine = engine(&[("L1", &["a", "b"]), ("L2", &["x", "y", "z"])]);
    let _ = engine.set_forced_trait_override("L1", "b");

    let report = engine.calculate_possible_combinations("set1").unwrap();
    assert_eq!(report.constrained, 3);
    assert_eq!(report.baseline, 6);
}

#[test]
fn test_inactive_layer_does_not_count() {
    let mut engine = engine(&[("L1", &["a", "b"]), ("L2", &["x", "y", "z"])]);
    let _ = engine.toggle_layer_active("L2");

    assert_eq!(combinations(&engine), 2);
}

// === Rules ===

#[test]
fn test_registries_are_mutually_exclusive() {
    let mut engine = engine(&[("bg", &["a", "b"]), ("eyes", &["x", "y"])]);
    engine.add_incompatibility("bg", "a", "eyes", "x").unwrap();
    let before = engine.state().clone();

    let err = engine
        .add_forced_combination("eyes", "x", "bg", "a")
        .unwrap_err();
    assert_eq!(err.error_code(), "CONSTRAINT_CONFLICT");
    assert_eq!(engine.state(), &before);

    let err = engine.add_incompatibility("bg", "a", "eyes", "x").unwrap_err();
    assert_eq!(err.error_code(), "CONSTRAINT_ALREADY_EXISTS");
}

#[test]
fn test_rules_need_enabled_traits_in_different_layers() {
    let mut engine = engine(&[("bg", &["a", "b"]), ("eyes", &["x", "y"])]);
    let _ = engine.toggle_trait_enabled("eyes", "y");

    let err = engine.add_incompatibility("bg", "a", "eyes", "y").unwrap_err();
    assert_eq!(err.error_code(), "TRAIT_NOT_ENABLED");

    let err = engine.add_incompatibility("bg", "a", "bg", "b").unwrap_err();
    assert_eq!(err.error_code(), "SAME_LAYER_CONSTRAINT");
}

// === Sets ===

#[test]
fn test_new_set_inherits_layers_duplicate_copies_weights() {
    let mut engine = engine(&[("bg", &["a", "b"]), ("eyes", &["x", "y"])]);
    engine.update_trait_weight("bg", "a", 80.0).unwrap();

    let (set2, _) = engine.add_set();
    assert_eq!(engine.set(&set2).unwrap().layers, vec!["bg", "eyes"]);
    assert_eq!(value(&engine, &set2, "bg", "a"), 50.0);
    assert_eq!(value(&engine, &set2, "bg", "b"), 50.0);

    let (set3, _) = engine.duplicate_set(1);
    let set3 = set3.unwrap();
    assert_eq!(value(&engine, &set3, "bg", "a"), value(&engine, "set1", "bg", "a"));
    assert_eq!(value(&engine, &set3, "bg", "b"), value(&engine, "set1", "bg", "b"));
    assert_relative_eq!(value(&engine, &set3, "bg", "b"), 20.0, epsilon = 1e-9);
}

#[test]
fn test_deleting_active_set_falls_back() {
    let mut engine = engine(&[("bg", &["a", "b"])]);
    let (set2, _) = engine.add_set();
    let _ = engine.select_set(&set2);

    let transition = engine.delete_set(2).unwrap();
    assert_eq!(engine.active_set_id(), Some("set1"));
    assert!(transition.persists(StoreKind::LayerOrder));
}

#[test]
fn test_deleted_set_leaves_no_trace() {
    let mut engine = engine(&[("bg", &["a", "b"]), ("eyes", &["x", "y"])]);
    let (set2, _) = engine.add_set();
    let _ = engine.select_set(&set2);
    engine.add_incompatibility("bg", "a", "eyes", "x").unwrap();
    engine.add_forced_combination("bg", "b", "eyes", "y").unwrap();
    let _ = engine.set_forced_trait_override("bg", "a");
    let _ = engine.toggle_layer_expanded("bg");

    engine.delete_set(2).unwrap();

    assert!(!engine.state().references_set(&set2));
    assert!(engine.set(&set2).is_none());
}
