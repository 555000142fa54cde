//! Artifact rendering: the dependency-ordered bundle and its manifest.
//!
//! A bundle is the concatenation of atom code bodies in sorted order, each
//! under a `[type] name` comment header, wrapped in a strict-mode IIFE so
//! atoms from other bundles loaded in the same page never collide. The
//! manifest lists installed external libraries plus artifact metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Atom, AtomName, AtomType, BuildId, InstalledExternal};

/// Canonical relative filename of the latest bundle artifact.
pub const BUNDLE_FILENAME: &str = "latest.js";

/// Artifact paths for one game, under its scope-namespaced prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundlePaths {
    /// Always-overwritten latest bundle (served uncached).
    pub latest: String,
    /// Build-id-versioned copy (cacheable).
    pub versioned: String,
    /// Externals manifest (served uncached).
    pub manifest: String,
}

impl BundlePaths {
    /// Compute the artifact paths for a game and build.
    pub fn for_build(game_name: &str, build_id: BuildId) -> Self {
        Self {
            latest: format!("{game_name}/{BUNDLE_FILENAME}"),
            versioned: format!("{game_name}/build_{build_id}.js"),
            manifest: format!("{game_name}/manifest.json"),
        }
    }
}

/// One external library entry in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestExternal {
    /// Library name.
    pub name: String,
    /// CDN URL to load from.
    pub cdn_url: String,
    /// Global binding the library installs.
    pub global_name: String,
    /// Load mechanism: `"script"` or `"module"`.
    pub load_type: String,
    /// Import map for module-loaded libraries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_imports: Option<BTreeMap<String, String>>,
}

/// The bundle manifest: externals to load plus artifact metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    /// External libraries the runtime must load before the bundle.
    pub externals: Vec<ManifestExternal>,
    /// Relative filename of the bundle this manifest describes.
    pub bundle_url: String,
    /// Build timestamp (RFC 3339).
    pub built_at: String,
}

impl BundleManifest {
    /// Build a manifest from the installed externals.
    pub fn new(externals: &[InstalledExternal], built_at: &str) -> Self {
        Self {
            externals: externals
                .iter()
                .map(|ext| ManifestExternal {
                    name: ext.name.clone(),
                    cdn_url: ext.cdn_url.clone(),
                    global_name: ext.global_name.clone(),
                    load_type: ext.load_type.clone(),
                    module_imports: ext.module_imports.clone(),
                })
                .collect(),
            bundle_url: BUNDLE_FILENAME.to_string(),
            built_at: built_at.to_string(),
        }
    }
}

/// Select the boot entry point among sorted atoms: the core atom literally
/// named `game_loop` or `main`, else the last core atom in sort order, else
/// none.
pub fn select_entry_point<'a>(sorted: &'a [AtomName], atoms: &[Atom]) -> Option<&'a AtomName> {
    let core: Vec<&AtomName> = sorted
        .iter()
        .filter(|name| {
            atoms
                .iter()
                .any(|a| a.name == **name && a.atom_type == AtomType::Core)
        })
        .collect();
    core.iter()
        .find(|name| name.as_str() == "game_loop" || name.as_str() == "main")
        .copied()
        .or_else(|| core.last().copied())
}

/// Render the full bundle text for a game.
///
/// `sorted` must be a permutation of the atom names; atoms are emitted in
/// that order.
pub fn render_bundle(game_name: &str, atoms: &[Atom], sorted: &[AtomName], built_at: &str) -> String {
    let sections: Vec<String> = sorted
        .iter()
        .filter_map(|name| atoms.iter().find(|a| a.name == *name))
        .map(|atom| {
            format!(
                "  // --- [{}] {} ---\n{}",
                atom.atom_type,
                atom.name,
                indent(&atom.code, 2)
            )
        })
        .collect();

    let boot_section = match select_entry_point(sorted, atoms) {
        Some(entry) => format!("\n  // Boot\n  if (typeof {entry} === 'function') {entry}();"),
        None => "\n  // No entry point found (no 'core' atom)".to_string(),
    };

    let order: Vec<&str> = sorted.iter().map(AtomName::as_str).collect();
    [
        "// === Atomic Coding Bundle ===".to_string(),
        format!("// Game: {game_name}"),
        format!("// Generated: {built_at}"),
        format!("// Atoms: {}", atoms.len()),
        format!("// Order: {}", order.join(" -> ")),
        "(function() {".to_string(),
        "  \"use strict\";".to_string(),
        String::new(),
        sections.join("\n\n"),
        boot_section,
        "})();".to_string(),
    ]
    .join("\n")
}

/// Indent every non-blank line of `code` by `spaces` spaces.
fn indent(code: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    code.lines()
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn atom(name: &str, atom_type: AtomType, code: &str) -> Atom {
        Atom {
            name: AtomName::raw(name),
            atom_type,
            code: code.to_string(),
            description: None,
            inputs: vec![],
            outputs: vec![],
            version: 1,
        }
    }

    #[test]
    fn test_paths_layout() {
        let build = BuildId::new(Uuid::nil());
        let paths = BundlePaths::for_build("pong", build);
        assert_eq!(paths.latest, "pong/latest.js");
        assert_eq!(paths.versioned, format!("pong/build_{build}.js"));
        assert_eq!(paths.manifest, "pong/manifest.json");
    }

    #[test]
    fn test_entry_point_prefers_game_loop() {
        let atoms = vec![
            atom("setup", AtomType::Core, ""),
            atom("game_loop", AtomType::Core, ""),
            atom("late_core", AtomType::Core, ""),
        ];
        let sorted: Vec<AtomName> = atoms.iter().map(|a| a.name.clone()).collect();
        assert_eq!(
            select_entry_point(&sorted, &atoms).unwrap().as_str(),
            "game_loop"
        );
    }

    #[test]
    fn test_entry_point_falls_back_to_last_core() {
        let atoms = vec![
            atom("helper", AtomType::Util, ""),
            atom("first_core", AtomType::Core, ""),
            atom("second_core", AtomType::Core, ""),
        ];
        let sorted: Vec<AtomName> = atoms.iter().map(|a| a.name.clone()).collect();
        assert_eq!(
            select_entry_point(&sorted, &atoms).unwrap().as_str(),
            "second_core"
        );
    }

    #[test]
    fn test_no_core_atom_means_no_entry_point() {
        let atoms = vec![atom("helper", AtomType::Util, "")];
        let sorted: Vec<AtomName> = atoms.iter().map(|a| a.name.clone()).collect();
        assert!(select_entry_point(&sorted, &atoms).is_none());
        let bundle = render_bundle("pong", &atoms, &sorted, "2026-01-01T00:00:00Z");
        assert!(bundle.contains("// No entry point found (no 'core' atom)"));
    }

    #[test]
    fn test_render_orders_sections_and_wraps_iife() {
        let atoms = vec![
            atom("player_jump", AtomType::Feature, "function player_jump() {}"),
            atom("math_clamp", AtomType::Util, "function math_clamp(v) { return v; }"),
        ];
        let sorted = vec![AtomName::raw("math_clamp"), AtomName::raw("player_jump")];
        let bundle = render_bundle("pong", &atoms, &sorted, "2026-01-01T00:00:00Z");

        assert!(bundle.starts_with("// === Atomic Coding Bundle ==="));
        assert!(bundle.contains("// Order: math_clamp -> player_jump"));
        assert!(bundle.contains("(function() {"));
        assert!(bundle.contains("\"use strict\";"));
        assert!(bundle.trim_end().ends_with("})();"));

        let clamp_at = bundle.find("// --- [util] math_clamp ---").unwrap();
        let jump_at = bundle.find("// --- [feature] player_jump ---").unwrap();
        assert!(clamp_at < jump_at);
        assert!(bundle.contains("  function math_clamp(v) { return v; }"));
    }

    #[test]
    fn test_indent_preserves_blank_lines() {
        assert_eq!(indent("a\n\nb", 2), "  a\n\n  b");
    }

    #[test]
    fn test_manifest_shape() {
        let manifest = BundleManifest::new(&[], "2026-01-01T00:00:00Z");
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["bundle_url"], "latest.js");
        assert_eq!(json["externals"], serde_json::json!([]));
        assert_eq!(json["built_at"], "2026-01-01T00:00:00Z");
    }
}
