//! Integration tests for feature repository scanning and indexing
//!
//! Each test lays out a small install on disk and drives the repository the
//! way a provisioning pass would.

mod common;

use common::{manifest, public_feature, Install};
use featurekit_core::repository::{FeatureRepository, Repository};
use featurekit_core::version::Version;
use filetime::{set_file_mtime, FileTime};
use std::collections::BTreeSet;
use std::sync::Arc;

fn names(defs: &[Arc<featurekit_core::FeatureDefinition>]) -> BTreeSet<String> {
    defs.iter().map(|d| d.symbolic_name().to_string()).collect()
}

#[test]
fn test_short_and_symbolic_name_lookup() {
    let install = Install::new();
    install.write_core("foo-1.0.mf", &public_feature("com.example.foo", "foo-1.0"));

    let mut repo = FeatureRepository::new(install.config());
    repo.init();

    let by_short = repo.get_feature("foo-1.0").expect("lookup by short name");
    let by_symbolic = repo
        .get_feature("com.example.foo")
        .expect("lookup by symbolic name");
    assert!(Arc::ptr_eq(&by_short, &by_symbolic));
    assert_eq!(by_short.version(), &Version::new(1, 0, 0, ""));
}

#[test]
fn test_public_lookup_ignores_case_except_prefix() {
    let install = Install::new();
    install.write_core(
        "foo.mf",
        &manifest(
            "com.example.Foo",
            "public",
            "1.0.0",
            "IBM-ShortName: Foo-1.0\nWLP-AlsoKnownAs: legacyFoo-1.0\n",
        ),
    );
    install.write_usr("bar.mf", &public_feature("com.example.bar", "bar-1.0"));

    let mut repo = FeatureRepository::new(install.config());
    repo.init();

    for name in ["foo-1.0", "FOO-1.0", "com.example.foo", "COM.EXAMPLE.FOO"] {
        let def = repo.get_feature(name).unwrap_or_else(|| panic!("{name} not found"));
        assert_eq!(def.symbolic_name(), "com.example.Foo");
    }
    assert_eq!(repo.matches_alternate("LEGACYFOO-1.0"), Some("Foo-1.0"));
    let via_alternate = repo.matches_alternate("legacyfoo-1.0").unwrap();
    assert_eq!(
        repo.get_feature(via_alternate).unwrap().symbolic_name(),
        "com.example.Foo"
    );

    assert_eq!(
        repo.get_feature("usr:BAR-1.0").unwrap().feature_name(),
        "usr:bar-1.0"
    );
    assert!(repo.get_feature("USR:bar-1.0").is_none());
    assert!(repo.get_feature("bar-1.0").is_none());
}

#[test]
fn test_private_features_not_publicly_indexed() {
    let install = Install::new();
    install.write_core(
        "internal.mf",
        &manifest("com.example.internal", "private", "1.0.0", ""),
    );

    let mut repo = FeatureRepository::new(install.config());
    repo.init();

    assert!(repo.get_feature("com.example.internal").is_some());
    assert!(repo.get_feature("COM.EXAMPLE.INTERNAL").is_none());
    assert_eq!(
        repo.select(&|d| d.visibility() == featurekit_core::attributes::Visibility::Private)
            .len(),
        1
    );
}

#[test]
fn test_feature_version_validation() {
    let install = Install::new();
    let v3 = install.write_core(
        "v3.mf",
        &manifest("com.example.v3", "public", "1.0.0", "IBM-Feature-Version: 3\n"),
    );
    install.write_core(
        "v2.mf",
        &manifest("com.example.v2", "public", "1.0.0", "IBM-Feature-Version: 2\n"),
    );
    install.write_core(
        "v0.mf",
        &manifest("com.example.v0", "public", "1.0.0", "IBM-Feature-Version: 0\n"),
    );
    install.write_core(
        "neg.mf",
        &manifest("com.example.neg", "public", "1.0.0", "IBM-Feature-Version: -1\n"),
    );
    install.write_core(
        "junk.mf",
        &manifest("com.example.junk", "public", "1.0.0", "IBM-Feature-Version: x\n"),
    );

    let mut repo = FeatureRepository::new(install.config());
    repo.init();

    assert_eq!(
        names(&repo.get_features()),
        BTreeSet::from([
            "com.example.v2".to_string(),
            "com.example.v0".to_string(),
            "com.example.neg".to_string(),
            "com.example.junk".to_string(),
        ])
    );
    assert_eq!(repo.get_feature("com.example.neg").unwrap().attributes().feature_version, 0);
    let bad: Vec<_> = repo.bad_files().into_iter().map(|(p, _)| p).collect();
    assert_eq!(bad, vec![v3]);
}

#[test]
fn test_invalid_manifests_are_skipped() {
    let install = Install::new();
    install.write_core("no-name.mf", "Subsystem-Type: osgi.subsystem.feature\nSubsystem-Version: 1\n");
    install.write_core(
        "app.mf",
        "Subsystem-SymbolicName: com.example.app\nSubsystem-Type: osgi.subsystem.application\nSubsystem-Version: 1\n",
    );
    install.write_core(
        "no-version.mf",
        "Subsystem-SymbolicName: com.example.nov\nSubsystem-Type: osgi.subsystem.feature\n",
    );
    install.write_core("ok.mf", &public_feature("com.example.ok", "ok-1.0"));

    let mut repo = FeatureRepository::new(install.config());
    repo.init();

    assert_eq!(repo.get_features().len(), 1);
    assert_eq!(repo.bad_files().len(), 3);
}

#[test]
fn test_collision_first_seen_wins() {
    let install = Install::new();
    install.write_core(
        "a-dup.mf",
        &manifest("com.example.dup", "public", "1.0.0", ""),
    );
    let rejected = install.write_core(
        "b-dup.mf",
        &manifest("com.example.dup", "public", "9.0.0", ""),
    );

    let mut repo = FeatureRepository::new(install.config());
    repo.init();

    let winner = repo.get_feature("com.example.dup").unwrap();
    assert_eq!(winner.version(), &Version::new(1, 0, 0, ""));
    assert!(winner.feature_file().unwrap().ends_with("a-dup.mf"));
    assert_eq!(repo.get_features().len(), 1);
    let bad: Vec<_> = repo.bad_files().into_iter().map(|(p, _)| p).collect();
    assert_eq!(bad, vec![rejected]);

    // same outcome on the next pass: the rejected file is not retried
    repo.store_cache();
    repo.dispose();
    repo.init();
    assert!(!repo.is_dirty());
    assert_eq!(
        repo.get_feature("com.example.dup").unwrap().version(),
        &Version::new(1, 0, 0, "")
    );
}

#[test]
fn test_changed_manifest_is_reloaded() {
    let install = Install::new();
    install.write_core("foo.mf", &public_feature("com.example.foo", "foo-1.0"));

    let mut repo = FeatureRepository::new(install.config());
    repo.init();
    repo.store_cache();
    assert!(!repo.is_dirty());
    let before = repo.get_feature("foo-1.0").unwrap();
    repo.dispose();

    // a different length changes the file signature
    install.write_core(
        "foo.mf",
        &manifest(
            "com.example.foo",
            "public",
            "1.0.1",
            "IBM-ShortName: foo-1.0\nIBM-API-Package: com.example.foo.api\n",
        ),
    );
    repo.init();

    assert!(repo.is_dirty());
    let after = repo.get_feature("foo-1.0").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.version(), &Version::new(1, 0, 1, ""));
    assert!(after.attributes().has_api_packages);
    assert_eq!(repo.get_features().len(), 1);
}

#[test]
fn test_deleted_manifest_is_removed() {
    let install = Install::new();
    install.write_core("foo.mf", &public_feature("com.example.foo", "foo-1.0"));
    let bar = install.write_core("bar.mf", &public_feature("com.example.bar", "bar-1.0"));

    let mut repo = FeatureRepository::new(install.config());
    repo.init();
    repo.store_cache();
    repo.dispose();

    std::fs::remove_file(bar).unwrap();
    repo.init();

    assert!(repo.is_dirty());
    assert!(repo.get_feature("bar-1.0").is_none());
    assert!(repo.get_feature("foo-1.0").is_some());
}

#[test]
fn test_renamed_manifest_survives_reinit() {
    let install = Install::new();
    let old = install.write_core("a.mf", &public_feature("com.example.foo", "foo-1.0"));

    let mut repo = FeatureRepository::new(install.config());
    repo.init();
    repo.store_cache();
    repo.dispose();

    let new = old.with_file_name("b.mf");
    std::fs::rename(&old, &new).unwrap();
    repo.init();

    assert!(repo.is_dirty());
    let moved = repo.get_feature("foo-1.0").expect("renamed feature still installed");
    assert_eq!(moved.feature_file(), Some(new.as_path()));
    assert!(repo.bad_files().is_empty());
    repo.dispose();

    let mut restarted = FeatureRepository::new(install.config());
    restarted.init();
    assert!(!restarted.is_dirty());
    assert!(restarted.get_feature("foo-1.0").is_some());
    assert!(restarted.bad_files().is_empty());
}

#[test]
fn test_replacement_file_takes_over_symbolic_name() {
    let install = Install::new();
    let old = install.write_core("foo-old.mf", &public_feature("com.example.foo", "foo-1.0"));

    let mut repo = FeatureRepository::new(install.config());
    repo.init();
    repo.store_cache();
    repo.dispose();

    std::fs::remove_file(old).unwrap();
    install.write_core(
        "foo-new.mf",
        &manifest("com.example.foo", "public", "1.0.5", "IBM-ShortName: foo-1.0\n"),
    );
    repo.init();

    let replaced = repo.get_feature("com.example.foo").unwrap();
    assert_eq!(replaced.version(), &Version::new(1, 0, 5, ""));
    assert!(repo.bad_files().is_empty());
}

#[test]
fn test_modification_time_change_alone_reloads() {
    let install = Install::new();
    let path = install.write_core("foo.mf", &public_feature("com.example.foo", "foo-1.0"));
    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let mut repo = FeatureRepository::new(install.config());
    repo.init();
    repo.store_cache();
    let before = repo.get_feature("foo-1.0").unwrap();
    repo.dispose();

    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_010, 0)).unwrap();
    repo.init();

    assert!(repo.is_dirty());
    let after = repo.get_feature("foo-1.0").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
}

#[test]
fn test_sub_second_time_change_is_skipped() {
    let install = Install::new();
    let path = install.write_core("foo.mf", &public_feature("com.example.foo", "foo-1.0"));
    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 100_000_000)).unwrap();

    let mut repo = FeatureRepository::new(install.config());
    repo.init();
    repo.store_cache();
    let before = repo.get_feature("foo-1.0").unwrap();
    repo.dispose();

    // same second, same length
    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 900_000_000)).unwrap();
    repo.init();

    assert!(!repo.is_dirty());
    let after = repo.get_feature("foo-1.0").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
}

#[test]
fn test_idempotent_reload() {
    let install = Install::new();
    install.write_core("foo.mf", &public_feature("com.example.foo", "foo-1.0"));
    install.write_usr("bar.mf", &public_feature("com.example.bar", "bar-1.0"));

    let mut repo = FeatureRepository::new(install.config());
    repo.init();
    repo.store_cache();
    assert!(!repo.is_dirty());
    let first = repo.get_features();

    repo.init();
    assert!(!repo.is_dirty());
    let second = repo.get_features();
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert!(Arc::ptr_eq(a, b));
    }
    assert!(repo.get_feature("usr:bar-1.0").is_some());
}

#[test]
fn test_kernel_features_installed_each_init() {
    let install = Install::new();
    install.write_kernel(
        "kernelCore-1.0.mf",
        &manifest("com.example.kernel.core-1.0", "private", "1.0.0", ""),
    );
    install.write_core("foo.mf", &public_feature("com.example.foo", "foo-1.0"));

    let mut repo = FeatureRepository::new(install.config());
    repo.init();
    let kernel = repo.get_feature("com.example.kernel.core-1.0").unwrap();
    assert!(kernel.is_kernel());
    repo.dispose();

    repo.init();
    let again = repo.get_feature("com.example.kernel.core-1.0").unwrap();
    assert!(Arc::ptr_eq(&kernel, &again));
    assert!(!repo.is_dirty());
}

#[test]
fn test_auto_feature_satisfaction_against_installed() {
    let install = Install::new();
    install.write_core("a.mf", &public_feature("com.example.a", "a-1.0"));
    install.write_core("b.mf", &public_feature("com.example.b", "b-1.0"));
    install.write_core(
        "ab.mf",
        &manifest(
            "com.example.a.b",
            "private",
            "1.0.0",
            "IBM-Provision-Capability: osgi.identity; filter:=\"(&(type=osgi.subsystem.feature)(osgi.identity=com.example.a))\", osgi.identity; filter:=\"(&(type=osgi.subsystem.feature)(osgi.identity=com.example.b))\"\n",
        ),
    );

    let mut repo = FeatureRepository::new(install.config());
    repo.init();

    let auto = repo.get_auto_features().unwrap();
    assert_eq!(auto.len(), 1);
    let a = repo.get_feature("a-1.0").unwrap();
    let b = repo.get_feature("b-1.0").unwrap();
    assert!(auto[0].is_capability_satisfied(&[a.clone(), b]));
    assert!(!auto[0].is_capability_satisfied(&[a]));
}
