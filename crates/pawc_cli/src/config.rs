//! Project configuration from `paw.toml`.
//!
//! The manifest is optional: a missing file or missing keys fall back to
//! documented defaults (`bin` crate type, `opt_level = 2`, `debug = false`).
//!
//! ```toml
//! [package]
//! name = "calc"
//! version = "0.1.0"
//! edition = "2025"
//! description = "A tiny calculator"
//!
//! [lib]
//! type = "bin"
//!
//! [build]
//! target = "x86_64-unknown-linux-gnu"
//! opt_level = 2
//! debug = false
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

pub const MANIFEST_NAME: &str = "paw.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub package: Package,
    pub lib: Lib,
    pub build: Build,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Package {
    pub name: Option<String>,
    pub version: Option<String>,
    pub edition: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Lib {
    /// `bin` or `lib`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for Lib {
    fn default() -> Self {
        Self { kind: "bin".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Build {
    pub target: Option<String>,
    pub opt_level: u32,
    pub debug: bool,
}

impl Default for Build {
    fn default() -> Self {
        Self { target: None, opt_level: 2, debug: false }
    }
}

impl Manifest {
    /// Loads `paw.toml` from `dir`, or the defaults when it is absent.
    pub fn load(dir: &Path) -> Result<Self, String> {
        let path = dir.join(MANIFEST_NAME);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| format!("cannot read '{}': {e}", path.display()))?;
        let manifest: Manifest = toml::from_str(&text)
            .map_err(|e| format!("invalid '{}': {e}", path.display()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), String> {
        match self.lib.kind.as_str() {
            "bin" | "lib" => Ok(()),
            other => Err(format!(
                "invalid lib type '{other}' in {MANIFEST_NAME}; expected 'bin' or 'lib'"
            )),
        }
    }

    pub fn is_library(&self) -> bool {
        self.lib.kind == "lib"
    }

    /// Extra arguments for the external compiler driver derived from the
    /// `[build]` section.
    pub fn link_args(&self) -> Vec<String> {
        let mut args = vec![format!("-O{}", self.build.opt_level)];
        if self.build.debug {
            args.push("-g".to_string());
        }
        if let Some(target) = &self.build.target {
            args.push(format!("--target={target}"));
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_manifest_uses_defaults() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::load(dir.path()).unwrap();
        assert_eq!(manifest.lib.kind, "bin");
        assert_eq!(manifest.build.opt_level, 2);
        assert!(!manifest.build.debug);
        assert!(!manifest.is_library());
    }

    #[test]
    fn partial_manifest_fills_in_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(MANIFEST_NAME),
            "[package]\nname = \"demo\"\n\n[build]\ndebug = true\n",
        )
        .unwrap();

        let manifest = Manifest::load(dir.path()).unwrap();
        assert_eq!(manifest.package.name.as_deref(), Some("demo"));
        assert_eq!(manifest.build.opt_level, 2);
        assert!(manifest.build.debug);
        assert!(manifest.link_args().contains(&"-g".to_string()));
    }

    #[test]
    fn invalid_lib_type_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_NAME), "[lib]\ntype = \"dylib\"\n").unwrap();
        let err = Manifest::load(dir.path()).unwrap_err();
        assert!(err.contains("invalid lib type 'dylib'"));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_NAME), "[package\nname=").unwrap();
        assert!(Manifest::load(dir.path()).is_err());
    }

    #[test]
    fn build_section_maps_to_driver_flags() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(MANIFEST_NAME),
            "[build]\nopt_level = 0\ntarget = \"aarch64-apple-darwin\"\n",
        )
        .unwrap();
        let manifest = Manifest::load(dir.path()).unwrap();
        let args = manifest.link_args();
        assert!(args.contains(&"-O0".to_string()));
        assert!(args.contains(&"--target=aarch64-apple-darwin".to_string()));
    }
}
