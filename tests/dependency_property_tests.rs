//! Property tests: full recomputation keeps the dependency graph exact
//! across arbitrary transaction sequences

use std::collections::BTreeSet;
use std::sync::Arc;

use modstore::plugin::FilePlugin;
use modstore::registry::BUILTIN_MODULES;
use modstore::schema::{NodeKind, ResolvedExpr, SchemaContext, ValueType};
use modstore::{DsBindings, ModuleSet, ModuleStore};
use proptest::prelude::*;
use tempfile::TempDir;

mod common;
use common::{assert_deps_consistent, base_builder};

/// Candidate modules; each references the next one in the ring when both
/// are installed.
const UNIVERSE: [&str; 4] = ["m0", "m1", "m2", "m3"];

/// Compile a context for the given installed subset of the universe
fn build_ctx(installed: &BTreeSet<usize>) -> SchemaContext {
    let mut b = base_builder();

    let mut modules = [None; 4];
    let mut leaves = [None; 4];
    for &i in installed {
        let module = b.module(UNIVERSE[i], None);
        let container = b.node(module, None, "data", NodeKind::Container);
        let leaf = b.leaf(module, Some(container), "name", ValueType::Plain);
        modules[i] = Some(module);
        leaves[i] = Some((container, leaf));
    }

    // wire the ring references that are expressible in this subset
    for &i in installed {
        let next = (i + 1) % UNIVERSE.len();
        if next == i {
            continue;
        }
        if let (Some((container, _)), Some((_, target))) = (leaves[i], leaves[next]) {
            b.leaf(
                modules[i].unwrap(),
                Some(container),
                "next-ref",
                ValueType::Leafref {
                    path: ResolvedExpr::new(format!("/{}:data/name", UNIVERSE[next]), [target]),
                    require_instance: true,
                },
            );
        }
    }

    b.build().unwrap()
}

fn check(store: &ModuleStore, ctx: &SchemaContext, installed: &BTreeSet<usize>) {
    let registry = store.load(ctx, false).unwrap();

    let mut expected: Vec<&str> = BUILTIN_MODULES.to_vec();
    expected.extend(installed.iter().map(|&i| UNIVERSE[i]));
    let mut actual: Vec<&str> = registry.modules.iter().map(|m| m.name.as_str()).collect();
    expected.sort_unstable();
    actual.sort_unstable();
    assert_eq!(actual, expected, "installed module set");

    assert_deps_consistent(&registry, ctx);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// After every install/remove in a random sequence, each remaining
    /// module's dependency section matches a fresh recomputation and the
    /// inverse relation is exact.
    #[test]
    fn prop_recomputation_never_goes_stale(
        ops in proptest::collection::vec((0..2usize, 0..UNIVERSE.len()), 1..12),
    ) {
        let dir = TempDir::new().unwrap();
        let store = ModuleStore::new(Arc::new(FilePlugin::new(dir.path()).unwrap()));

        let mut installed: BTreeSet<usize> = BTreeSet::new();
        let ctx = build_ctx(&installed);
        store.load(&ctx, true).unwrap();

        for (op, i) in ops {
            match op {
                0 => {
                    installed.insert(i);
                    let ctx = build_ctx(&installed);
                    let mut set = ModuleSet::new();
                    store
                        .install_module(&ctx, UNIVERSE[i], &DsBindings::default(), &mut set)
                        .unwrap();
                    check(&store, &ctx, &installed);
                }
                _ => {
                    if installed.remove(&i) {
                        let ctx = build_ctx(&installed);
                        store.remove_modules(&ctx, &[UNIVERSE[i]]).unwrap();
                        check(&store, &ctx, &installed);
                    }
                }
            }
        }
    }
}
