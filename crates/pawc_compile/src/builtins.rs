//! Runtime extern declarations and built-in print wrappers.
//!
//! Every backend module starts from the same baseline: the libc externs the
//! lowering emits calls to (`printf`, `malloc`, `memcpy`, `strlen`,
//! `strcpy`, `strcat`, `write`), plus `print`/`println`/`eprint`/`eprintln`
//! defined in-module under link-once linkage so duplicate definitions
//! across modules collapse at link time.
//!
//! `print`/`println` route through `printf`; `eprint`/`eprintln` go through
//! `write(2, buf, strlen(buf))` so stderr output works without a stdio
//! handle.

use std::collections::HashMap;

use pawc_llir::{FuncId, Linkage, Module, Ty, Value};

/// Names of libc functions declared in every module.
const LIBC_EXTERNS: &[(&str, &[Ty], Ty, bool)] = &[
    ("printf", &[Ty::Ptr], Ty::I32, true),
    ("malloc", &[Ty::I64], Ty::Ptr, false),
    ("memcpy", &[Ty::Ptr, Ty::Ptr, Ty::I64], Ty::Ptr, false),
    ("strlen", &[Ty::Ptr], Ty::I64, false),
    ("strcpy", &[Ty::Ptr, Ty::Ptr], Ty::Ptr, false),
    ("strcat", &[Ty::Ptr, Ty::Ptr], Ty::Ptr, false),
    ("write", &[Ty::I32, Ty::Ptr, Ty::I64], Ty::I64, false),
];

/// The built-in functions callable from Paw source by bare name.
pub struct Builtins {
    functions: HashMap<String, FuncId>,
}

impl Builtins {
    /// Declares the libc externs and defines the print wrappers in `module`.
    pub fn declare_all(module: &mut Module) -> Self {
        for (name, params, ret, varargs) in LIBC_EXTERNS {
            module.declare_function(name, params.to_vec(), ret.clone(), *varargs, Linkage::External);
        }

        let mut functions = HashMap::new();
        functions.insert("print".to_string(), define_print(module));
        functions.insert("println".to_string(), define_println(module));
        functions.insert("eprint".to_string(), define_eprint(module, "eprint", false));
        functions.insert("eprintln".to_string(), define_eprint(module, "eprintln", true));
        Self { functions }
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<FuncId> {
        self.functions.get(name).copied()
    }
}

/// `void print(ptr)`: `printf("%s", s)` without the format detour; the
/// string is passed as the format itself, matching the runtime contract
/// that `print` does no formatting.
fn define_print(module: &mut Module) -> FuncId {
    let printf = module.get_function("printf").expect("printf declared");
    let func = module.declare_function("print", vec![Ty::Ptr], Ty::Void, false, Linkage::LinkOnceOdr);
    let entry = module.append_block(func, "entry");
    let saved = module.insert_point();
    module.position_at_end(func, entry);

    let arg = module.param(func, 0);
    module.build_call(printf, vec![arg]);
    module.build_ret_void();

    module.restore_insert_point(saved);
    func
}

/// `void println(ptr)`: `printf("%s\n", s)`.
fn define_println(module: &mut Module) -> FuncId {
    let printf = module.get_function("printf").expect("printf declared");
    let func =
        module.declare_function("println", vec![Ty::Ptr], Ty::Void, false, Linkage::LinkOnceOdr);
    let entry = module.append_block(func, "entry");
    let saved = module.insert_point();
    module.position_at_end(func, entry);

    let format = module.global_string("%s\n");
    let arg = module.param(func, 0);
    module.build_call(printf, vec![format, arg]);
    module.build_ret_void();

    module.restore_insert_point(saved);
    func
}

/// `void eprint(ptr)` / `void eprintln(ptr)`: `write(2, s, strlen(s))`,
/// plus a trailing newline write for the `ln` form.
fn define_eprint(module: &mut Module, name: &str, newline: bool) -> FuncId {
    let strlen = module.get_function("strlen").expect("strlen declared");
    let write = module.get_function("write").expect("write declared");
    let func = module.declare_function(name, vec![Ty::Ptr], Ty::Void, false, Linkage::LinkOnceOdr);
    let entry = module.append_block(func, "entry");
    let saved = module.insert_point();
    module.position_at_end(func, entry);

    let stderr_fd = Value::const_int(Ty::I32, 2);
    let arg = module.param(func, 0);
    let len = module.build_call(strlen, vec![arg.clone()]);
    module.build_call(write, vec![stderr_fd.clone(), arg, len]);
    if newline {
        let nl = module.global_string("\n");
        module.build_call(write, vec![stderr_fd, nl, Value::const_int(Ty::I64, 1)]);
    }
    module.build_ret_void();

    module.restore_insert_point(saved);
    func
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_libc_externs() {
        let mut module = Module::new("m");
        let _ = Builtins::declare_all(&mut module);
        for (name, ..) in LIBC_EXTERNS {
            let func = module.get_function(name).unwrap_or_else(|| panic!("{name} missing"));
            assert!(module.func(func).is_declaration());
        }
    }

    #[test]
    fn print_wrappers_are_link_once_definitions() {
        let mut module = Module::new("m");
        let builtins = Builtins::declare_all(&mut module);
        for name in ["print", "println", "eprint", "eprintln"] {
            assert!(builtins.is_builtin(name));
            let func = builtins.get(name).unwrap();
            assert!(!module.func(func).is_declaration(), "{name} must have a body");
        }
        let ir = module.print_ir();
        assert!(ir.contains("define linkonce_odr void @println(ptr %arg0)"));
        assert!(ir.contains("call i64 @write(i32 2"));
    }

    #[test]
    fn libc_functions_are_not_builtins() {
        let mut module = Module::new("m");
        let builtins = Builtins::declare_all(&mut module);
        assert!(!builtins.is_builtin("malloc"));
        assert!(!builtins.is_builtin("printf"));
    }

    #[test]
    fn wrappers_verify() {
        let mut module = Module::new("m");
        let builtins = Builtins::declare_all(&mut module);
        for name in ["print", "println", "eprint", "eprintln"] {
            module.verify_function(builtins.get(name).unwrap()).unwrap();
        }
    }
}
