//! Multi-module loading, import resolution, and topological ordering.
//!
//! Given an entry file, the loader parses it, extracts its `import`
//! statements, resolves each dotted path to a file, and recurses. Modules
//! are memoized by import path. Import resolution replaces `::` with `/`,
//! appends the `.paw` extension, and searches the standard-library root
//! before the entry file's directory.
//!
//! A module that is revisited while still on the loading stack is a cyclic
//! import; the error names the whole chain. The final order is a
//! depth-first postorder: every module precedes its importers and the entry
//! module comes last.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use pawc_base::{Diagnostic, Span};
use pawc_syntax::ast::Program;
use pawc_syntax::{Lexer, Parser};

/// Source file extension for Paw modules.
pub const SOURCE_EXTENSION: &str = "paw";

/// A loaded and parsed module.
#[derive(Debug)]
pub struct ModuleInfo {
    /// Import path of the module (`std::math`), or the entry file's stem.
    pub name: String,
    /// Resolved file path, for diagnostics.
    pub path: PathBuf,
    /// Full source text, for snippet rendering.
    pub source: String,
    pub program: Program,
    /// Import paths of direct dependencies, in source order.
    pub dependencies: Vec<String>,
}

impl ModuleInfo {
    /// The short name used as the backend module name and symbol-table key:
    /// the last `::` segment.
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }
}

pub fn short_name(module_path: &str) -> &str {
    module_path.rsplit("::").next().unwrap_or(module_path)
}

/// Loads an entry module and every transitive dependency.
pub struct ModuleLoader {
    /// Directory of the entry file; second entry of the search path.
    base_dir: PathBuf,
    /// Standard-library root; first entry of the search path.
    stdlib_root: PathBuf,
    modules: HashMap<String, ModuleInfo>,
    /// Modules currently being loaded, for cycle detection.
    loading: Vec<String>,
    errors: Vec<Diagnostic>,
}

impl ModuleLoader {
    pub fn new(base_dir: impl Into<PathBuf>, stdlib_root: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            stdlib_root: stdlib_root.into(),
            modules: HashMap::new(),
            loading: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Loads the entry file and its import closure. On success returns the
    /// topological compile order (dependencies first, entry last); on
    /// failure returns every diagnostic gathered along the way.
    pub fn load(mut self, entry: &Path) -> Result<(Vec<String>, HashMap<String, ModuleInfo>), Vec<Diagnostic>> {
        let entry_name = entry
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("main")
            .to_string();

        let mut order = Vec::new();
        self.load_module(&entry_name, entry.to_path_buf(), &mut order);

        if self.errors.is_empty() {
            Ok((order, self.modules))
        } else {
            Err(self.errors)
        }
    }

    fn load_module(&mut self, name: &str, path: PathBuf, order: &mut Vec<String>) {
        if self.modules.contains_key(name) {
            return;
        }
        if self.loading.iter().any(|loading| loading == name) {
            let mut chain: Vec<&str> = self.loading.iter().map(String::as_str).collect();
            chain.push(name);
            self.errors.push(Diagnostic::error(
                format!("cyclic import: {}", chain.join(" -> ")),
                path.display().to_string(),
                Span::default(),
            ));
            return;
        }

        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(io_err) => {
                self.errors.push(Diagnostic::error(
                    format!("cannot open module file '{}': {}", path.display(), io_err),
                    String::new(),
                    Span::default(),
                ));
                return;
            }
        };

        let tokens = Lexer::new(&source).tokenize();
        let (program, parse_errors) = Parser::new(tokens).parse();
        if !parse_errors.is_empty() {
            let file = path.display().to_string();
            for err in parse_errors {
                self.errors.push(Diagnostic::from_error(err, file.clone()));
            }
            // The module set is already unusable; still record the source
            // so the driver can render snippets.
        }

        let dependencies: Vec<String> =
            program.imports().into_iter().map(str::to_string).collect();

        self.loading.push(name.to_string());
        for dep in &dependencies {
            let dep_path = self.resolve_module_path(dep);
            self.load_module(dep, dep_path, order);
        }
        self.loading.pop();

        self.modules.insert(
            name.to_string(),
            ModuleInfo {
                name: name.to_string(),
                path,
                source,
                program,
                dependencies,
            },
        );
        // Postorder: dependencies were pushed above, so every module
        // precedes its importers and the entry module lands last.
        order.push(name.to_string());
    }

    /// `a::b::c` → `a/b/c.paw`, preferring the standard-library root.
    fn resolve_module_path(&self, import_path: &str) -> PathBuf {
        let relative = PathBuf::from(import_path.replace("::", "/")).with_extension(SOURCE_EXTENSION);

        let stdlib_candidate = self.stdlib_root.join(&relative);
        if stdlib_candidate.is_file() {
            return stdlib_candidate;
        }
        self.base_dir.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn loads_single_module() {
        let dir = tempdir().unwrap();
        let entry = write(dir.path(), "main.paw", "fn main() -> i32 { return 0; }");

        let loader = ModuleLoader::new(dir.path(), dir.path().join("stdlib"));
        let (order, modules) = loader.load(&entry).unwrap();

        assert_eq!(order, vec!["main"]);
        assert!(modules["main"].dependencies.is_empty());
    }

    #[test]
    fn order_is_topological_with_entry_last() {
        let dir = tempdir().unwrap();
        write(dir.path(), "m.paw", "pub fn add(a: i32, b: i32) -> i32 { return a + b; }");
        write(dir.path(), "util.paw", "import m;\npub fn twice(x: i32) -> i32 { return m::add(x, x); }");
        let entry = write(
            dir.path(),
            "main.paw",
            "import util;\nimport m;\nfn main() -> i32 { return util::twice(21); }",
        );

        let loader = ModuleLoader::new(dir.path(), dir.path().join("stdlib"));
        let (order, modules) = loader.load(&entry).unwrap();

        assert_eq!(*order.last().unwrap(), "main");
        let pos = |name: &str| order.iter().position(|m| m == name).unwrap();
        assert!(pos("m") < pos("util"), "dependency must precede importer");
        assert!(pos("util") < pos("main"));
        assert_eq!(modules.len(), 3);
    }

    #[test]
    fn modules_are_memoized_by_name() {
        let dir = tempdir().unwrap();
        write(dir.path(), "shared.paw", "pub fn one() -> i32 { return 1; }");
        write(dir.path(), "a.paw", "import shared;\npub fn fa() -> i32 { return shared::one(); }");
        write(dir.path(), "b.paw", "import shared;\npub fn fb() -> i32 { return shared::one(); }");
        let entry = write(dir.path(), "main.paw", "import a;\nimport b;\nfn main() -> i32 { return 0; }");

        let loader = ModuleLoader::new(dir.path(), dir.path().join("stdlib"));
        let (order, _) = loader.load(&entry).unwrap();

        assert_eq!(order.iter().filter(|m| m.as_str() == "shared").count(), 1);
    }

    #[test]
    fn cyclic_import_names_the_chain() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.paw", "import b;\npub fn fa() -> i32 { return 1; }");
        write(dir.path(), "b.paw", "import a;\npub fn fb() -> i32 { return 2; }");
        let entry = write(dir.path(), "main.paw", "import a;\nfn main() -> i32 { return 0; }");

        let loader = ModuleLoader::new(dir.path(), dir.path().join("stdlib"));
        let errors = loader.load(&entry).unwrap_err();

        let cycle = errors.iter().find(|d| d.message.contains("cyclic import")).unwrap();
        assert!(cycle.message.contains('a'), "cycle should name module a: {}", cycle.message);
        assert!(cycle.message.contains('b'), "cycle should name module b: {}", cycle.message);
    }

    #[test]
    fn missing_module_file_is_reported() {
        let dir = tempdir().unwrap();
        let entry = write(dir.path(), "main.paw", "import nowhere;\nfn main() -> i32 { return 0; }");

        let loader = ModuleLoader::new(dir.path(), dir.path().join("stdlib"));
        let errors = loader.load(&entry).unwrap_err();
        assert!(errors[0].message.contains("cannot open module file"));
        assert!(errors[0].message.contains("nowhere.paw"));
    }

    #[test]
    fn stdlib_root_is_searched_first() {
        let dir = tempdir().unwrap();
        let stdlib = dir.path().join("stdlib");
        write(&stdlib, "std/math.paw", "pub fn abs(x: i32) -> i32 { return if x < 0 { 0 - x } else { x }; }");
        let entry = write(
            dir.path(),
            "main.paw",
            "import std::math;\nfn main() -> i32 { return math::abs(0 - 4); }",
        );

        let loader = ModuleLoader::new(dir.path(), &stdlib);
        let (order, modules) = loader.load(&entry).unwrap();

        assert!(order.contains(&"std::math".to_string()));
        assert_eq!(modules["std::math"].short_name(), "math");
        assert!(modules["std::math"].path.starts_with(&stdlib));
    }

    #[test]
    fn parse_errors_carry_the_file_name() {
        let dir = tempdir().unwrap();
        let entry = write(dir.path(), "main.paw", "fn main( { }");

        let loader = ModuleLoader::new(dir.path(), dir.path().join("stdlib"));
        let errors = loader.load(&entry).unwrap_err();
        assert!(errors[0].file.ends_with("main.paw"));
    }
}
