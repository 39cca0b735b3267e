//! Cross-module symbol table.
//!
//! Two-level map: module name → symbol name → [`Symbol`]. Entries are
//! append-only for the life of a compilation; double registration of the
//! same `(module, name)` pair is an error. Cross-module lookups resolve a
//! symbol only when it is public.
//!
//! Symbols carry a raw AST handle rather than backend values: every LLIR
//! module is an independent context, so consumers re-resolve a symbol's
//! signature in their own module (mirroring a declaration for plain calls,
//! re-instantiating for generics). Generic declarations are stored as AST;
//! their concrete monomorphizations are registered as ordinary function
//! symbols under their mangled names.

use std::collections::{BTreeMap, HashMap};

use pawc_base::{CompileError, Result, Span};
use pawc_syntax::ast::{EnumDecl, FunctionDecl, StructDecl};

/// What a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    GenericFunction,
    /// A struct or enum (generic or concrete, including mangled instances).
    Type,
    Variable,
}

/// Borrowed AST handle for cross-module resolution and monomorphization.
#[derive(Debug, Clone, Copy)]
pub enum AstHandle<'a> {
    Function(&'a FunctionDecl),
    Struct(&'a StructDecl),
    Enum(&'a EnumDecl),
}

impl<'a> AstHandle<'a> {
    pub fn as_function(&self) -> Option<&'a FunctionDecl> {
        match self {
            AstHandle::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&'a StructDecl> {
        match self {
            AstHandle::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&'a EnumDecl> {
        match self {
            AstHandle::Enum(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Symbol<'a> {
    pub name: String,
    pub module: String,
    pub kind: SymbolKind,
    pub is_public: bool,
    pub ast: Option<AstHandle<'a>>,
    /// For mangled generic-struct instances: the base generic's name.
    pub generic_base: Option<String>,
}

/// The compilation-wide symbol table.
#[derive(Default)]
pub struct SymbolTable<'a> {
    modules: BTreeMap<String, HashMap<String, Symbol<'a>>>,
}

impl<'a> SymbolTable<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_function(
        &mut self,
        module: &str,
        name: &str,
        is_public: bool,
        ast: Option<&'a FunctionDecl>,
        span: Span,
    ) -> Result<()> {
        self.insert(
            module,
            Symbol {
                name: name.to_string(),
                module: module.to_string(),
                kind: SymbolKind::Function,
                is_public,
                ast: ast.map(AstHandle::Function),
                generic_base: None,
            },
            span,
        )
    }

    pub fn register_generic_function(
        &mut self,
        module: &str,
        name: &str,
        is_public: bool,
        ast: &'a FunctionDecl,
        span: Span,
    ) -> Result<()> {
        self.insert(
            module,
            Symbol {
                name: name.to_string(),
                module: module.to_string(),
                kind: SymbolKind::GenericFunction,
                is_public,
                ast: Some(AstHandle::Function(ast)),
                generic_base: None,
            },
            span,
        )
    }

    pub fn register_type(
        &mut self,
        module: &str,
        name: &str,
        is_public: bool,
        ast: Option<AstHandle<'a>>,
        span: Span,
    ) -> Result<()> {
        self.insert(
            module,
            Symbol {
                name: name.to_string(),
                module: module.to_string(),
                kind: SymbolKind::Type,
                is_public,
                ast,
                generic_base: None,
            },
            span,
        )
    }

    /// Registers a concrete generic-struct instance (e.g. `Pair_i32_string`)
    /// with a back-pointer to the base generic's AST.
    pub fn register_generic_struct_instance(
        &mut self,
        module: &str,
        mangled_name: &str,
        base_name: &str,
        is_public: bool,
        ast: &'a StructDecl,
        span: Span,
    ) -> Result<()> {
        self.insert(
            module,
            Symbol {
                name: mangled_name.to_string(),
                module: module.to_string(),
                kind: SymbolKind::Type,
                is_public,
                ast: Some(AstHandle::Struct(ast)),
                generic_base: Some(base_name.to_string()),
            },
            span,
        )
    }

    pub fn register_variable(
        &mut self,
        module: &str,
        name: &str,
        is_public: bool,
        span: Span,
    ) -> Result<()> {
        self.insert(
            module,
            Symbol {
                name: name.to_string(),
                module: module.to_string(),
                kind: SymbolKind::Variable,
                is_public,
                ast: None,
                generic_base: None,
            },
            span,
        )
    }

    fn insert(&mut self, module: &str, symbol: Symbol<'a>, span: Span) -> Result<()> {
        let entries = self.modules.entry(module.to_string()).or_default();
        if entries.contains_key(&symbol.name) {
            return Err(CompileError::new(
                format!(
                    "symbol '{}' is already defined in module '{}'",
                    symbol.name, module
                ),
                span,
            ));
        }
        entries.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Resolves `name` from `current_module`: the current module's symbol
    /// wins; otherwise the first public symbol with that name elsewhere.
    pub fn lookup(&self, name: &str, current_module: &str) -> Option<&Symbol<'a>> {
        if let Some(symbol) = self
            .modules
            .get(current_module)
            .and_then(|entries| entries.get(name))
        {
            return Some(symbol);
        }
        self.modules
            .iter()
            .filter(|(module, _)| module.as_str() != current_module)
            .filter_map(|(_, entries)| entries.get(name))
            .find(|symbol| symbol.is_public)
    }

    /// Exact lookup in one module, regardless of visibility.
    pub fn lookup_in_module(&self, module: &str, name: &str) -> Option<&Symbol<'a>> {
        self.modules.get(module)?.get(name)
    }

    /// A symbol is accessible from its own module or, elsewhere, when public.
    pub fn is_accessible(&self, symbol: &Symbol<'a>, from_module: &str) -> bool {
        symbol.module == from_module || symbol.is_public
    }

    /// All public symbols of a module, for diagnostics.
    pub fn public_symbols(&self, module: &str) -> Vec<&Symbol<'a>> {
        self.modules
            .get(module)
            .map(|entries| entries.values().filter(|s| s.is_public).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::new(1, 1)
    }

    #[test]
    fn lookup_prefers_current_module() {
        let mut table = SymbolTable::new();
        table.register_function("a", "f", true, None, span()).unwrap();
        table.register_function("b", "f", true, None, span()).unwrap();

        let symbol = table.lookup("f", "b").unwrap();
        assert_eq!(symbol.module, "b");
    }

    #[test]
    fn private_symbols_are_invisible_across_modules() {
        let mut table = SymbolTable::new();
        table.register_function("m", "secret", false, None, span()).unwrap();

        assert!(table.lookup("secret", "main").is_none());
        // Still visible from its own module.
        assert!(table.lookup("secret", "m").is_some());
        // And exact lookup sees it regardless.
        assert!(table.lookup_in_module("m", "secret").is_some());
    }

    #[test]
    fn public_symbols_are_visible_everywhere() {
        let mut table = SymbolTable::new();
        table.register_function("m", "add", true, None, span()).unwrap();

        let symbol = table.lookup("add", "main").unwrap();
        assert!(table.is_accessible(symbol, "main"));
        assert!(table.is_accessible(symbol, "m"));
    }

    #[test]
    fn double_registration_is_an_error() {
        let mut table = SymbolTable::new();
        table.register_type("m", "Point", true, None, span()).unwrap();
        let err = table
            .register_type("m", "Point", true, None, span())
            .unwrap_err();
        assert!(err.message.contains("already defined"));
    }

    #[test]
    fn same_name_in_different_modules_is_fine() {
        let mut table = SymbolTable::new();
        table.register_variable("a", "x", false, span()).unwrap();
        table.register_variable("b", "x", false, span()).unwrap();
        assert!(table.lookup_in_module("a", "x").is_some());
        assert!(table.lookup_in_module("b", "x").is_some());
    }

    #[test]
    fn public_symbols_lists_only_public() {
        let mut table = SymbolTable::new();
        table.register_function("m", "add", true, None, span()).unwrap();
        table.register_function("m", "secret", false, None, span()).unwrap();

        let symbols = table.public_symbols("m");
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "add");
    }
}
