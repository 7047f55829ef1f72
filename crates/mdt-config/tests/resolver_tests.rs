//! Tests for per model resolution against the default document

use mdt_config::{
    ConfigNode, ConfigResolver, ConfigStore, DEFAULT_CONFIG, Error, Mapping, MergeEngine,
    MergeSchema, OptimizerSpec,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn default_store() -> ConfigStore {
    let store = ConfigStore::new();
    store
        .load_named("<defaults>", DEFAULT_CONFIG)
        .expect("Default document should load");
    store
}

fn optimizer(name: &str, patience: u32) -> OptimizerSpec {
    OptimizerSpec {
        name: name.to_string(),
        patience: Some(patience),
        options: Default::default(),
    }
}

fn mapping(yaml: &str) -> Mapping {
    ConfigNode::parse("test", yaml)
        .unwrap()
        .as_mapping()
        .cloned()
        .unwrap()
}

mod default_document_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_noddi_appends_its_optimizer() {
        let resolved = default_store().resolve("Noddi").unwrap();
        let settings = resolved.optimization_settings().unwrap();

        assert_eq!(
            settings.optimizers,
            vec![optimizer("Powell", 2), optimizer("NMSimplex", 10)]
        );
        assert_eq!(settings.effective_optimizer(), Some(&optimizer("NMSimplex", 10)));
        assert_eq!(resolved.contributing_patterns(), &["^Noddi$".to_string()]);
    }

    #[test]
    fn test_ex_vivo_keeps_untouched_general_values() {
        let resolved = default_store().resolve("SomeModel-ExVivo").unwrap();
        let settings = resolved.optimization_settings().unwrap();

        assert_eq!(settings.load_balancer.single_batch_length, 2.0e6);
        assert_eq!(settings.load_balancer.name, "PreferGPU");
        assert_eq!(
            settings.optimizers,
            vec![optimizer("Powell", 2), optimizer("Powell", 10)]
        );
        assert_eq!(settings.extra_optim_runs, 1);
        assert_eq!(resolved.contributing_patterns(), &["^(.*)-ExVivo".to_string()]);
    }

    #[test]
    fn test_ball_stick_enables_grid_search() {
        let settings = default_store()
            .resolve("BallStickStick")
            .unwrap()
            .optimization_settings()
            .unwrap();

        assert!(settings.enable_grid_search);
        assert_eq!(settings.effective_optimizer(), Some(&optimizer("Powell", 5)));
    }

    #[test]
    fn test_unmatched_model_gets_general_settings() {
        let store = default_store();
        let resolved = store.resolve("Tensor").unwrap();
        let snapshot = store.snapshot().unwrap();

        assert_eq!(resolved.config(), snapshot.resolver().general());
        assert!(resolved.contributing_patterns().is_empty());

        let settings = resolved.optimization_settings().unwrap();
        assert!(settings.uses_all_devices());
        assert!(!settings.extra_run_modes_conflict());
        assert_eq!(settings.smoothing_routines.len(), 1);
    }

    #[test]
    fn test_resolutions_do_not_share_state() {
        let store = default_store();
        let first = store.resolve("Noddi").unwrap();
        let _ = store.resolve("SomeModel-ExVivo").unwrap();
        let again = store.resolve("Noddi").unwrap();

        assert_eq!(first, again);
        assert_eq!(
            store.snapshot().unwrap().resolver().general().get("optimizers").and_then(|n| n.as_sequence()).map(|s| s.len()),
            Some(1)
        );
    }
}

mod matching_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[rstest]
    #[case("Noddi", true)]
    #[case("Noddi2", false)]
    #[case("XNoddi", false)]
    #[case("noddi", false)]
    fn test_anchored_pattern(#[case] model: &str, #[case] expected: bool) {
        assert_eq!(mdt_config::matches("^Noddi$", model).unwrap(), expected);
    }

    #[rstest]
    #[case("BallStickStick", true)]
    #[case("BallStickStickStick-T2", true)]
    #[case("BallStickStick-T2T2", true)]
    #[case("BallStick", false)]
    #[case("XBallStickStick", false)]
    fn test_group_pattern(#[case] model: &str, #[case] expected: bool) {
        assert_eq!(
            mdt_config::matches("^BallStick(Stick)+(-(T2)+)?", model).unwrap(),
            expected
        );
    }

    #[test]
    fn test_unanchored_pattern_searches() {
        assert!(mdt_config::matches("Noddi", "XNoddi2").unwrap());
    }

    #[test]
    fn test_invalid_pattern_fails_at_load() {
        let store = ConfigStore::new();
        let err = store
            .load("optimization_settings:\n  single_model:\n    - model_name: '^Ball(Stick'\n      config: {}\n")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }), "got: {err:?}");
    }
}

mod ordering_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GENERAL: &str = "load_balancer:\n  name: PreferGPU\n  run_in_batches: true\noptimizers:\n  - name: Powell\n";
    const FIRST: &str = "load_balancer:\n  name: FirstBalancer\noptimizers:\n  - name: NMSimplex\n";
    const SECOND: &str = "load_balancer:\n  name: SecondBalancer\n  run_in_batches: false\n";

    fn document(rules: &[(&str, &str)]) -> String {
        let mut doc = String::from("optimization_settings:\n  general:\n");
        for line in GENERAL.lines() {
            doc.push_str(&format!("    {line}\n"));
        }
        doc.push_str("  single_model:\n");
        for (pattern, config) in rules {
            doc.push_str(&format!("    - model_name: '{pattern}'\n      config:\n"));
            for line in config.lines() {
                doc.push_str(&format!("        {line}\n"));
            }
        }
        doc
    }

    fn resolver(rules: &[(&str, &str)]) -> ConfigResolver {
        ConfigResolver::from_root(&ConfigNode::parse("test", &document(rules)).unwrap()).unwrap()
    }

    #[test]
    fn test_later_rule_wins() {
        let resolved = resolver(&[("^Model", FIRST), ("X$", SECOND)])
            .resolve("ModelX")
            .unwrap();
        assert_eq!(
            resolved.lookup("load_balancer.name").and_then(|n| n.as_str()),
            Some("SecondBalancer")
        );
        assert_eq!(
            resolved.lookup("load_balancer.run_in_batches").and_then(|n| n.as_bool()),
            Some(false)
        );
    }

    #[test]
    fn test_swapping_rules_swaps_the_winner() {
        let resolved = resolver(&[("X$", SECOND), ("^Model", FIRST)])
            .resolve("ModelX")
            .unwrap();
        assert_eq!(
            resolved.lookup("load_balancer.name").and_then(|n| n.as_str()),
            Some("FirstBalancer")
        );
        assert_eq!(resolved.contributing_patterns(), &["X$".to_string(), "^Model".to_string()]);
    }

    #[test]
    fn test_result_equals_sequential_merge() {
        let resolved = resolver(&[("^Model", FIRST), ("X$", SECOND)])
            .resolve("ModelX")
            .unwrap();

        let schema = MergeSchema::optimization();
        let engine = MergeEngine::new(&schema);
        let expected = engine
            .merge(
                &engine.merge(&mapping(GENERAL), &mapping(FIRST)).unwrap(),
                &mapping(SECOND),
            )
            .unwrap();

        assert_eq!(resolved.config(), &expected);
    }

    #[test]
    fn test_only_matching_rules_apply() {
        let resolved = resolver(&[("^Model", FIRST), ("X$", SECOND)])
            .resolve("ModelY")
            .unwrap();
        assert_eq!(resolved.contributing_patterns(), &["^Model".to_string()]);
        assert_eq!(
            resolved.lookup("load_balancer.run_in_batches").and_then(|n| n.as_bool()),
            Some(true)
        );
    }
}

mod error_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rule_without_model_name_is_rejected() {
        let err = ConfigStore::new()
            .load("optimization_settings:\n  single_model:\n    - config:\n        extra_optim_runs: 1\n")
            .unwrap_err();
        assert!(err.to_string().contains("single_model[0]"), "got: {err}");
    }

    #[test]
    fn test_rule_with_wrong_typed_field_is_rejected() {
        let err = ConfigStore::new()
            .load("optimization_settings:\n  single_model:\n    - model_name: 'Noddi'\n      config:\n        enable_grid_search: 3\n")
            .unwrap_err();
        match err {
            Error::Type { path, .. } => assert_eq!(
                path.to_string(),
                "optimization_settings.single_model[0].config.enable_grid_search"
            ),
            other => panic!("expected type error, got {other:?}"),
        }
    }

    #[test]
    fn test_syntax_error_names_the_source() {
        let err = ConfigStore::new()
            .load_named("broken.yaml", "optimization_settings: [unclosed\n")
            .unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }), "got: {err:?}");
        assert!(err.to_string().contains("broken.yaml"));
    }
}
