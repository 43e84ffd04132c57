//! Shared helpers for registry tests

use modstore::registry::collector::collect_module;
use modstore::registry::{Registry, BUILTIN_MODULES};
use modstore::schema::{ContextBuilder, SchemaContext};

/// Builder pre-seeded with the built-in modules bootstrap requires
pub fn base_builder() -> ContextBuilder {
    let mut b = ContextBuilder::new();
    for &name in BUILTIN_MODULES {
        b.module(name, Some("2024-01-01"));
    }
    b
}

/// Check that every module's dependency data matches what a fresh
/// recomputation over `ctx` would produce, that no dependency references an
/// uninstalled module, and that inverse deps are exactly the derived
/// relation.
pub fn assert_deps_consistent(registry: &Registry, ctx: &SchemaContext) {
    for record in &registry.modules {
        let id = ctx.module_id(&record.name).expect("module in context");
        let (deps, rpcs, notifs) = collect_module(ctx, id).unwrap();
        assert_eq!(record.deps, deps, "stale deps on {}", record.name);
        assert_eq!(record.rpcs, rpcs, "stale rpc deps on {}", record.name);
        assert_eq!(
            record.notifications, notifs,
            "stale notification deps on {}",
            record.name
        );

        // every target module is installed
        for lref in &record.deps.lrefs {
            assert!(
                registry.module(&lref.target_module).is_some(),
                "dep of {} references removed module {}",
                record.name,
                lref.target_module
            );
        }
    }

    // inverse_deps(M) == { N : M appears as a target_module in deps(N) }
    for target in &registry.modules {
        let mut expected: Vec<&str> = Vec::new();
        for source in &registry.modules {
            let references = source
                .deps
                .lrefs
                .iter()
                .map(|l| l.target_module.as_str())
                .chain(
                    source
                        .deps
                        .xpaths
                        .iter()
                        .flat_map(|x| x.target_modules.iter().map(String::as_str)),
                )
                .any(|m| m == target.name);
            if references && !expected.contains(&source.name.as_str()) {
                expected.push(&source.name);
            }
        }
        assert_eq!(
            target.inverse_deps, expected,
            "inverse deps of {}",
            target.name
        );
    }
}
