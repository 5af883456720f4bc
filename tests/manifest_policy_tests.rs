#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests for the party room client.
//!
//! These tests parse `Cargo.toml` and `fuzz/Cargo.toml` and verify that the
//! panic-free lint policy, the feature layout, and the fuzz targets stay as
//! agreed. A failure means the manifest has drifted from project policy.

use std::path::PathBuf;

/// Returns the project root directory (where Cargo.toml lives).
fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Reads and parses a TOML file relative to the project root.
fn read_manifest(relative_path: &str) -> toml::Table {
    let path = project_root().join(relative_path);
    let contents = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read '{}': {e}", path.display()));
    contents
        .parse::<toml::Table>()
        .unwrap_or_else(|e| panic!("'{}' is not valid TOML: {e}", path.display()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: lint_policy
// ─────────────────────────────────────────────────────────────────────────────

mod lint_policy {
    use super::*;

    const REQUIRED_DENY_LINTS: &[&str] = &[
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ];

    #[test]
    fn cargo_toml_denies_all_panic_prone_lints() {
        let manifest = read_manifest("Cargo.toml");
        let clippy = manifest["lints"]["clippy"]
            .as_table()
            .expect("Cargo.toml must have a [lints.clippy] table");

        for lint in REQUIRED_DENY_LINTS {
            assert_eq!(
                clippy.get(*lint).and_then(toml::Value::as_str),
                Some("deny"),
                "Cargo.toml must set `{lint} = \"deny\"` in [lints.clippy] to keep \
                 library code panic-free."
            );
        }
    }

    #[test]
    fn msrv_is_declared() {
        let manifest = read_manifest("Cargo.toml");
        let msrv = manifest["package"]["rust-version"]
            .as_str()
            .expect("Cargo.toml must declare a rust-version");
        assert!(
            msrv.split('.').count() == 3,
            "rust-version '{msrv}' should be a full major.minor.patch version"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: feature_layout
// ─────────────────────────────────────────────────────────────────────────────

mod feature_layout {
    use super::*;

    #[test]
    fn websocket_transport_is_default_and_optional() {
        let manifest = read_manifest("Cargo.toml");
        let features = manifest["features"].as_table().expect("[features]");

        let default: Vec<&str> = features["default"]
            .as_array()
            .expect("default feature list")
            .iter()
            .filter_map(toml::Value::as_str)
            .collect();
        assert_eq!(default, ["transport-websocket"]);

        for dep in ["tokio-tungstenite", "futures-util"] {
            let optional = manifest["dependencies"][dep]
                .get("optional")
                .and_then(toml::Value::as_bool);
            assert_eq!(
                optional,
                Some(true),
                "`{dep}` must stay optional so the core builds without a WebSocket stack"
            );
        }
    }

    #[test]
    fn fuzz_targets_exist() {
        let fuzz = read_manifest("fuzz/Cargo.toml");
        let bins = fuzz["bin"].as_array().expect("fuzz [[bin]] targets");
        assert!(!bins.is_empty());

        for bin in bins {
            let path = bin["path"].as_str().expect("bin path");
            assert!(
                project_root().join("fuzz").join(path).is_file(),
                "fuzz target '{path}' is declared but missing"
            );
        }
    }
}
