//! Property tests: the log reproduces the meta store.

use mmmeta_core::{now, Config, MetaOptions, MetaReconciler, Record, Table};
use mmmeta_testkit::prelude::*;
use proptest::prelude::*;

fn run_cycles(cycles: &[Vec<Record>], ensure_liveness: bool) -> (Table, mmmeta_core::AppendLog) {
    let config = Config::new().unique(GENERATED_UNIQUE);
    let log = memory_log(GENERATED_UNIQUE);
    let mut meta = Table::new(GENERATED_UNIQUE);
    let opts = MetaOptions {
        ensure_liveness,
        ..MetaOptions::default()
    };
    for batch in cycles {
        let reconciler = MetaReconciler::new(&config, &log);
        reconciler
            .reconcile(&mut meta, batch.iter().cloned().map(Ok), now(), opts)
            .unwrap();
    }
    (meta, log)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn replay_matches_meta_store(cycles in cycles_strategy(), liveness in any::<bool>()) {
        let (meta, log) = run_cycles(&cycles, liveness);
        assert_tables_equivalent(&meta, &replay(&log, GENERATED_UNIQUE));
    }

    #[test]
    fn squash_preserves_replay(cycles in cycles_strategy(), more in batch_strategy()) {
        let (_, log) = run_cycles(&cycles, true);
        let before = replay(&log, GENERATED_UNIQUE);
        log.squash().unwrap();
        let after = replay(&log, GENERATED_UNIQUE);
        assert_tables_equivalent(&before, &after);

        // Steps written after a squash still apply on top of it
        let config = Config::new().unique(GENERATED_UNIQUE);
        let mut meta = after;
        MetaReconciler::new(&config, &log)
            .reconcile(&mut meta, more.into_iter().map(Ok), now(), MetaOptions::default())
            .unwrap();
        assert_tables_equivalent(&meta, &replay(&log, GENERATED_UNIQUE));
    }

    #[test]
    fn repeated_cycle_writes_nothing(batch in batch_strategy()) {
        let (_, log) = run_cycles(&[batch.clone()], false);
        let steps = log.steps().unwrap().len();
        let (_, log) = run_cycles(&[batch.clone(), batch], false);
        prop_assert_eq!(log.steps().unwrap().len(), steps);
    }
}
