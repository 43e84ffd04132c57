//! Module registry transaction tests

use std::sync::Arc;
use std::time::SystemTime;

use modstore::plugin::{DatastoreKind, DatastorePlugin, FilePlugin};
use modstore::registry::{LeafrefDep, REGISTRY_MODULE};
use modstore::schema::{NodeKind, ResolvedExpr, SchemaContext, ValueType};
use modstore::{DsBindings, ModuleSet, ModuleStore, NotificationLog};
use tempfile::TempDir;

mod common;
use common::{assert_deps_consistent, base_builder};

/// Context with "ietf-interfaces" and a "test" module holding a leafref
/// into it
fn interfaces_ctx(with_test: bool) -> SchemaContext {
    let mut b = base_builder();

    let ifmod = b.module("ietf-interfaces", Some("2018-02-20"));
    let interfaces = b.node(ifmod, None, "interfaces", NodeKind::Container);
    let interface = b.node(ifmod, Some(interfaces), "interface", NodeKind::List);
    let name = b.leaf(ifmod, Some(interface), "name", ValueType::Plain);

    if with_test {
        let test = b.module("test", None);
        let cfg = b.node(test, None, "config", NodeKind::Container);
        b.leaf(
            test,
            Some(cfg),
            "interface-ref",
            ValueType::Leafref {
                path: ResolvedExpr::new("/ietf-interfaces:interfaces/interface/name", [name]),
                require_instance: true,
            },
        );
    }

    b.build().unwrap()
}

fn new_store(dir: &TempDir) -> (ModuleStore, Arc<FilePlugin>) {
    let plugin = Arc::new(FilePlugin::new(dir.path()).unwrap());
    (ModuleStore::new(plugin.clone()), plugin)
}

#[test]
fn test_install_and_remove_end_to_end() {
    let dir = TempDir::new().unwrap();
    let (store, _) = new_store(&dir);

    // bootstrap without "test"; ietf-interfaces comes in with the built-ins
    let ctx = interfaces_ctx(false);
    store.load(&ctx, true).unwrap();

    // install "test"
    let ctx = interfaces_ctx(true);
    let mut set = ModuleSet::new();
    let registry = store
        .install_module(&ctx, "test", &DsBindings::default(), &mut set)
        .unwrap();

    let test = registry.module("test").unwrap();
    assert_eq!(
        test.deps.lrefs,
        [LeafrefDep {
            target_path: "/ietf-interfaces:interfaces/interface/name".to_string(),
            target_module: "ietf-interfaces".to_string(),
        }]
    );
    let interfaces = registry.module("ietf-interfaces").unwrap();
    assert!(interfaces.inverse_deps.contains(&"test".to_string()));
    assert_deps_consistent(&registry, &ctx);

    // remove "test": both the dep and the inverse dep disappear
    let post_ctx = interfaces_ctx(false);
    let (removed, registry) = store.remove_modules(&post_ctx, &["test"]).unwrap();

    assert_eq!(removed.modules.len(), 1);
    assert_eq!(removed.modules[0].name, "test");
    // detached record keeps its last persisted dependency data
    assert_eq!(removed.modules[0].deps.lrefs.len(), 1);

    assert!(registry.module("test").is_none());
    let interfaces = registry.module("ietf-interfaces").unwrap();
    assert!(interfaces.inverse_deps.is_empty());
    assert_deps_consistent(&registry, &post_ctx);
}

#[test]
fn test_reinstall_recomputes_stale_dependencies() {
    let dir = TempDir::new().unwrap();
    let (store, plugin) = new_store(&dir);

    let ctx = interfaces_ctx(true);
    store.load(&ctx, true).unwrap();

    // corrupt the persisted dependency data behind the store's back
    let mut registry = store.load(&ctx, false).unwrap();
    registry
        .module_mut("ietf-interfaces")
        .unwrap()
        .deps
        .lrefs
        .push(LeafrefDep {
            target_path: "/nowhere:x".to_string(),
            target_module: "test".to_string(),
        });
    plugin
        .store(
            REGISTRY_MODULE,
            DatastoreKind::Startup,
            &registry.encode().unwrap(),
        )
        .unwrap();

    // installing an already-present module changes nothing in the module
    // list but still runs the full recomputation, flushing the stale record
    let mut set = ModuleSet::new();
    let registry = store
        .install_module(&ctx, "test", &DsBindings::default(), &mut set)
        .unwrap();

    assert!(set.is_empty());
    assert!(registry
        .module("ietf-interfaces")
        .unwrap()
        .deps
        .lrefs
        .is_empty());
    assert_deps_consistent(&registry, &ctx);
}

#[test]
fn test_feature_toggle_recomputes_whole_graph() {
    let dir = TempDir::new().unwrap();
    let (store, _) = new_store(&dir);

    // with the feature off, "gated" has no leafref leaf compiled in
    let base = |on: bool| {
        let mut b = base_builder();
        let ifmod = b.module("ietf-interfaces", Some("2018-02-20"));
        let interfaces = b.node(ifmod, None, "interfaces", NodeKind::Container);
        let interface = b.node(ifmod, Some(interfaces), "interface", NodeKind::List);
        let name = b.leaf(ifmod, Some(interface), "name", ValueType::Plain);

        let gated = b.module("gated", None);
        if on {
            b.feature(gated, "bind");
            let cfg = b.node(gated, None, "config", NodeKind::Container);
            b.leaf(
                gated,
                Some(cfg),
                "bound-if",
                ValueType::Leafref {
                    path: ResolvedExpr::new("/ietf-interfaces:interfaces/interface/name", [name]),
                    require_instance: true,
                },
            );
        }
        b.build().unwrap()
    };

    let ctx = base(false);
    store.load(&ctx, true).unwrap();
    assert!(store
        .load(&ctx, false)
        .unwrap()
        .module("gated")
        .unwrap()
        .deps
        .is_empty());

    // enabling the feature makes the leafref reachable
    let ctx = base(true);
    let registry = store.set_feature(&ctx, "gated", "bind", true).unwrap();
    assert_eq!(registry.module("gated").unwrap().deps.lrefs.len(), 1);
    assert_eq!(
        registry.module("ietf-interfaces").unwrap().inverse_deps,
        ["gated"]
    );
    assert_deps_consistent(&registry, &ctx);

    // disabling flushes it again
    let ctx = base(false);
    let registry = store.set_feature(&ctx, "gated", "bind", false).unwrap();
    assert!(registry.module("gated").unwrap().deps.is_empty());
    assert!(registry
        .module("ietf-interfaces")
        .unwrap()
        .inverse_deps
        .is_empty());
    assert_deps_consistent(&registry, &ctx);
}

#[test]
fn test_content_id_increments_once_per_schema_change() {
    let dir = TempDir::new().unwrap();
    let (store, _) = new_store(&dir);

    let ctx = interfaces_ctx(true);
    let registry = store.load(&ctx, true).unwrap();
    assert_eq!(registry.content_id, 1);

    let registry = store.update_module(&ctx, "ietf-interfaces").unwrap();
    assert_eq!(registry.content_id, 2);

    // replay toggling is not a schema change
    struct NoLog;
    impl NotificationLog for NoLog {
        fn earliest(&self, _m: &str) -> modstore::Result<Option<SystemTime>> {
            Ok(None)
        }
    }
    let (registry, changed) = store
        .set_replay_support(&ctx, Some("test"), true, &NoLog)
        .unwrap();
    assert_eq!(changed, ["test"]);
    assert_eq!(registry.content_id, 2);

    let post_ctx = interfaces_ctx(false);
    let (_, registry) = store.remove_modules(&post_ctx, &["test"]).unwrap();
    assert_eq!(registry.content_id, 3);
}

#[test]
fn test_persisted_registry_roundtrips_across_store_instances() {
    let dir = TempDir::new().unwrap();

    let ctx = interfaces_ctx(true);
    let registry = {
        let (store, _) = new_store(&dir);
        store.load(&ctx, true).unwrap()
    };

    // a second store (another process, conceptually) sees the identical tree
    let (store, _) = new_store(&dir);
    let reloaded = store.load(&ctx, false).unwrap();
    assert_eq!(reloaded, registry);
}

#[test]
fn test_failed_transaction_leaves_registry_untouched() {
    let dir = TempDir::new().unwrap();
    let (store, _) = new_store(&dir);

    let ctx = interfaces_ctx(true);
    store.load(&ctx, true).unwrap();
    let before = store.load(&ctx, false).unwrap();

    // removing a module that is not installed fails mid-transaction
    assert!(store
        .remove_modules(&ctx, &["test", "missing"])
        .is_err());

    let after = store.load(&ctx, false).unwrap();
    assert_eq!(after, before);
}

#[test]
fn test_install_registers_transitive_imports_of_present_modules() {
    let dir = TempDir::new().unwrap();
    let (store, _) = new_store(&dir);

    // "app" present from bootstrap, importing nothing yet
    let mut b = base_builder();
    b.module("app", None);
    let ctx = b.build().unwrap();
    store.load(&ctx, true).unwrap();

    // new compilation: "app" now imports "newdep" (implemented)
    let mut b = base_builder();
    let newdep = b.module("newdep", None);
    let app = b.module("app", None);
    b.import(app, newdep);
    let ctx = b.build().unwrap();

    // installing "app" again is a no-op for "app" itself but still follows
    // its imports and pulls the new dependency in
    let mut set = ModuleSet::new();
    let registry = store
        .install_module(&ctx, "app", &DsBindings::default(), &mut set)
        .unwrap();

    assert!(registry.module("newdep").is_some());
    assert_eq!(set.len(), 1);
}
