use pn_synth::config::SynthConfig;
use pn_synth::engine::{EngineError, SynthesisEngine};
use pn_synth::net::{IncidenceMatrix, Marking, WorkflowNet};
use pn_synth::oracle::{OracleError, Verdict};
use pn_synth::synth::{Rule, SynthError, is_free_choice};
use proptest::prelude::*;

fn accept_all(_: &WorkflowNet, _: &Marking, _: &Marking) -> Result<Verdict, OracleError> {
    Ok(Verdict::Sound)
}

fn engine(seed: u64) -> SynthesisEngine {
    let config = SynthConfig {
        seed: Some(seed),
        max_attempts: 200,
        ..SynthConfig::default()
    };
    SynthesisEngine::new(config, Box::new(accept_all))
}

fn rule(index: usize) -> Rule {
    match index % 4 {
        0 => Rule::abstraction(),
        1 => Rule::dual_abstraction(),
        2 => Rule::LinearPlace,
        _ => Rule::LinearTransition,
    }
}

fn apply_tolerant(engine: &mut SynthesisEngine, rule: &Rule) -> bool {
    match engine.apply(rule) {
        Ok(_) => true,
        Err(EngineError::Synth(SynthError::RuleNotApplicable(_))) => false,
        Err(err) => panic!("{rule} failed unexpectedly: {err}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_rules_preserve_validity_and_free_choice(
        seed in any::<u64>(),
        rules in proptest::collection::vec(0..4usize, 1..8)
    ) {
        let mut engine = engine(seed);
        engine.init_seed().unwrap();
        for index in rules {
            let before = engine.matrix().unwrap().clone();
            let applied = apply_tolerant(&mut engine, &rule(index));
            let after = engine.matrix().unwrap();
            prop_assert!(after.is_valid(), "{:?}", after.violations());
            prop_assert!(is_free_choice(after));
            if applied {
                prop_assert_eq!(after.places(), before.places() + usize::from(index != 3));
                prop_assert_eq!(after.transitions(), before.transitions() + usize::from(index != 2));
            } else {
                prop_assert_eq!(after, &before);
            }
        }
    }

    #[test]
    fn prop_undo_round_trip(
        seed in any::<u64>(),
        rules in proptest::collection::vec(0..4usize, 1..6)
    ) {
        let mut engine = engine(seed);
        engine.init_chain(3, 2).unwrap();
        let matrix = engine.matrix().unwrap().clone();
        let log = engine.log().clone();

        let mut applied = 0;
        for index in rules {
            if apply_tolerant(&mut engine, &rule(index)) {
                applied += 1;
            }
        }
        for _ in 0..applied {
            engine.undo().unwrap();
        }
        prop_assert_eq!(engine.matrix(), Some(&matrix));
        prop_assert_eq!(engine.log(), &log);
    }

    #[test]
    fn prop_derivation_is_deterministic(
        seed in any::<u64>(),
        steps in 0..5usize
    ) {
        let mut engine = engine(seed);
        engine.init_seed().unwrap();
        engine.generate(steps, &[]).unwrap();
        let matrix = engine.matrix().unwrap();
        prop_assert_eq!(
            WorkflowNet::from_matrix(matrix).unwrap(),
            WorkflowNet::from_matrix(&matrix.clone()).unwrap()
        );
        prop_assert_eq!(engine.net().unwrap(), &WorkflowNet::from_matrix(matrix).unwrap());
    }
}

#[test]
fn rejecting_oracle_exhausts_growth() {
    let reject = |_: &WorkflowNet, _: &Marking, _: &Marking| -> Result<Verdict, OracleError> {
        Ok(Verdict::Unsound)
    };
    let config = SynthConfig {
        seed: Some(1),
        max_attempts: 40,
        ..SynthConfig::default()
    };
    let mut engine = SynthesisEngine::new(config, Box::new(reject));
    engine.init_seed().unwrap();
    let err = engine.apply(&Rule::LinearPlace).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Synth(SynthError::RuleNotApplicable(_))
    ));
    let stats = engine.last_stats();
    assert_eq!(stats.attempts, 40);
    assert_eq!(stats.fallback_candidates, 3);
    assert!(stats.oracle_calls <= 40 + 3);
    assert_eq!(engine.matrix(), Some(&IncidenceMatrix::seed()));
}

#[test]
fn same_seed_same_net() {
    let run = |seed| {
        let mut engine = engine(seed);
        engine.init_seed().unwrap();
        engine.generate(6, &[]).unwrap();
        engine.matrix().unwrap().clone()
    };
    assert_eq!(run(21), run(21));
}
