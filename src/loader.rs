//! Program loading.
//!
//! Turns a root source file plus everything it imports into a frozen [`Program`]: the
//! macro table, the global constants and the rule registry. Loading order:
//!
//! 1. builtin macros;
//! 2. for each file, its imports (depth first, each module at most once), then its own
//!    macro and rule declarations in source order;
//! 3. `let` constants, evaluated in declaration order once every macro is known.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::ast::{ClauseDecl, Declaration, Phrase};
use crate::build::rules::{Rule, RuleRegistry};
use crate::errors::{NgmakeError, NgmakeResult, SourceContext};
use crate::macros::{register_builtins, Clause, MacroProvenance, MacroTable};
use crate::runtime::{Bindings, Evaluator, DEFAULT_MAX_DEPTH};
use crate::syntax;

// ============================================================================
// MODULE RESOLUTION
// ============================================================================

/// Source text of an imported module.
#[derive(Debug, Clone)]
pub struct ModuleSource {
    /// Name used in diagnostics.
    pub name: String,
    /// Location on disk, used to resolve the module's own relative imports.
    pub path: Option<PathBuf>,
    pub text: String,
}

/// Maps a module name such as `std::list` to its source.
pub trait ModuleResolver {
    /// Returns `Ok(None)` when this resolver does not know the module.
    fn resolve(&self, module: &str, importer: Option<&Path>) -> NgmakeResult<Option<ModuleSource>>;
}

/// The embedded standard library.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdModules;

impl StdModules {
    pub const LIST: &'static str = include_str!("stdlib/list.ngm");
    pub const BOOL: &'static str = include_str!("stdlib/bool.ngm");

    pub fn names() -> &'static [&'static str] {
        &["std::bool", "std::list"]
    }
}

impl ModuleResolver for StdModules {
    fn resolve(
        &self,
        module: &str,
        _importer: Option<&Path>,
    ) -> NgmakeResult<Option<ModuleSource>> {
        let text = match module {
            "std::list" => Self::LIST,
            "std::bool" => Self::BOOL,
            _ => return Ok(None),
        };
        Ok(Some(ModuleSource {
            name: format!("<{module}>"),
            path: None,
            text: text.to_string(),
        }))
    }
}

/// Resolves `a::b` to `a/b.ngm`, first next to the importing file, then under each
/// search path in order.
#[derive(Debug, Clone, Default)]
pub struct SearchPathResolver {
    roots: Vec<PathBuf>,
}

impl SearchPathResolver {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    pub fn module_path(module: &str) -> PathBuf {
        let mut path: PathBuf = module.split("::").collect();
        path.set_extension("ngm");
        path
    }
}

impl ModuleResolver for SearchPathResolver {
    fn resolve(&self, module: &str, importer: Option<&Path>) -> NgmakeResult<Option<ModuleSource>> {
        let relative = Self::module_path(module);
        let local = importer.and_then(Path::parent).map(Path::to_path_buf);

        for root in local.iter().chain(self.roots.iter()) {
            let candidate = root.join(&relative);
            if !candidate.is_file() {
                continue;
            }
            let text = fs::read_to_string(&candidate)
                .map_err(|e| NgmakeError::io(candidate.display(), e))?;
            return Ok(Some(ModuleSource {
                name: candidate.display().to_string(),
                path: Some(candidate),
                text,
            }));
        }
        Ok(None)
    }
}

// ============================================================================
// PROGRAM
// ============================================================================

/// A fully loaded build description. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub macros: MacroTable,
    pub constants: Bindings,
    pub rules: RuleRegistry,
}

impl Program {
    /// An evaluator over this program's macros and constants.
    pub fn evaluator(&self, max_depth: usize) -> Evaluator<'_> {
        Evaluator::new(&self.macros, &self.constants).with_max_depth(max_depth)
    }
}

// ============================================================================
// LOADER
// ============================================================================

/// Builds a [`Program`] from source files.
pub struct Loader {
    resolvers: Vec<Box<dyn ModuleResolver>>,
    max_depth: usize,
    loaded: HashSet<String>,
    macros: MacroTable,
    lets: Vec<(String, Phrase)>,
    rules: RuleRegistry,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    /// A loader that knows the standard library and modules next to the importing file.
    pub fn new() -> Self {
        let mut macros = MacroTable::new();
        if let Err(error) = register_builtins(&mut macros) {
            warn!(%error, "builtin macros unavailable");
        }
        Self {
            resolvers: vec![Box::new(StdModules), Box::new(SearchPathResolver::default())],
            max_depth: DEFAULT_MAX_DEPTH,
            loaded: HashSet::new(),
            macros,
            lets: Vec::new(),
            rules: RuleRegistry::new(),
        }
    }

    pub fn with_search_paths(mut self, roots: impl IntoIterator<Item = PathBuf>) -> Self {
        self.resolvers.push(Box::new(SearchPathResolver::new(roots)));
        self
    }

    /// Adds a resolver consulted after the built-in ones.
    pub fn with_resolver(mut self, resolver: impl ModuleResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    /// Depth bound used while evaluating `let` constants.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn load_file(mut self, path: impl AsRef<Path>) -> NgmakeResult<Program> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| NgmakeError::io(path.display(), e))?;
        let source = SourceContext::from_file(path.display().to_string(), text);
        self.load_source(&source, Some(path), MacroProvenance::User)?;
        self.finish()
    }

    pub fn load_str(mut self, name: &str, text: &str) -> NgmakeResult<Program> {
        let source = SourceContext::from_file(name, text);
        self.load_source(&source, None, MacroProvenance::User)?;
        self.finish()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn load_source(
        &mut self,
        source: &SourceContext,
        path: Option<&Path>,
        provenance: MacroProvenance,
    ) -> NgmakeResult<()> {
        let declarations = syntax::parse(source)?;
        debug!(file = %source.name, declarations = declarations.len(), "parsed");

        let (imports, others): (Vec<_>, Vec<_>) = declarations
            .into_iter()
            .partition(|d| matches!(d, Declaration::Import { .. }));

        for import in imports {
            if let Declaration::Import { module, .. } = import {
                self.import(&module, path)?;
            }
        }

        for declaration in others {
            self.declare(declaration, source, provenance)?;
        }
        Ok(())
    }

    fn import(&mut self, module: &str, importer: Option<&Path>) -> NgmakeResult<()> {
        if !self.loaded.insert(module.to_string()) {
            debug!(module, "already loaded");
            return Ok(());
        }

        let mut found = None;
        for resolver in &self.resolvers {
            if let Some(source) = resolver.resolve(module, importer)? {
                found = Some(source);
                break;
            }
        }
        let module_source = found.ok_or_else(|| NgmakeError::ModuleNotFound {
            module: module.to_string(),
        })?;

        debug!(module, from = %module_source.name, "importing");
        let source = SourceContext::from_file(module_source.name.clone(), module_source.text);
        self.load_source(&source, module_source.path.as_deref(), MacroProvenance::Module)
    }

    fn declare(
        &mut self,
        declaration: Declaration,
        source: &SourceContext,
        provenance: MacroProvenance,
    ) -> NgmakeResult<()> {
        match declaration {
            Declaration::Import { .. } => Ok(()),

            Declaration::Let { name, value, .. } => {
                if self.lets.iter().any(|(existing, _)| *existing == name) {
                    warn!(
                        constant = %name,
                        file = %source.name,
                        "constant redefined; the later definition wins"
                    );
                }
                self.lets.push((name, value));
                Ok(())
            }

            Declaration::Macro { name, clauses, .. } => {
                let clauses = clauses
                    .into_iter()
                    .map(|ClauseDecl { pattern, body }| Clause::template(pattern, body))
                    .collect();
                if let Some(previous) = self.macros.define(&name, clauses, provenance)? {
                    if previous.provenance != MacroProvenance::Builtin {
                        warn!(
                            macro_name = %name,
                            file = %source.name,
                            "macro redefined; the later definition wins"
                        );
                    }
                }
                Ok(())
            }

            Declaration::Rule {
                name,
                deps,
                action,
                span,
            } => {
                let rule = Rule::new(name, deps, action).with_origin(source.name.clone(), span);
                if let Some(previous) = self.rules.register(rule) {
                    warn!(
                        target_name = %previous.describe(),
                        file = %source.name,
                        "rule redefined; the later definition wins"
                    );
                }
                Ok(())
            }
        }
    }

    fn finish(self) -> NgmakeResult<Program> {
        let mut constants = Bindings::new();
        for (name, phrase) in &self.lets {
            let value = Evaluator::new(&self.macros, &constants)
                .with_max_depth(self.max_depth)
                .eval_phrase(phrase, &Bindings::new())?;
            constants.bind(name.clone(), value);
        }

        debug!(
            macros = self.macros.len(),
            constants = constants.len(),
            rules = self.rules.len(),
            "program loaded"
        );
        Ok(Program {
            macros: self.macros,
            constants,
            rules: self.rules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn std_modules_resolve_by_name() {
        let list = StdModules.resolve("std::list", None).unwrap().unwrap();
        assert!(list.text.contains("macro reverse"));
        assert!(StdModules.resolve("std::nope", None).unwrap().is_none());
    }

    #[test]
    fn module_path_maps_separators_to_directories() {
        assert_eq!(
            SearchPathResolver::module_path("tools::cxx"),
            PathBuf::from("tools").join("cxx.ngm")
        );
    }

    #[test]
    fn constants_see_imported_macros() {
        let program = Loader::new()
            .load_str(
                "Ngmakefile",
                "import 'std::list' .
                 let files = reverse( 'a', 'b' ) .",
            )
            .unwrap();
        assert_eq!(program.constants.get("files"), Some(&Value::atoms(["b", "a"])));
    }

    #[test]
    fn imports_are_loaded_once() {
        let program = Loader::new()
            .load_str(
                "Ngmakefile",
                "import 'std::bool' . import 'std::bool' . let t = not( false ) .",
            )
            .unwrap();
        assert_eq!(program.constants.get("t"), Some(&Value::atom("true")));
    }

    #[test]
    fn unknown_module_is_reported() {
        let err = Loader::new()
            .load_str("Ngmakefile", "import 'std::missing' .")
            .unwrap_err();
        assert!(matches!(err, NgmakeError::ModuleNotFound { module } if module == "std::missing"));
    }

    #[test]
    fn later_constant_wins() {
        let program = Loader::new()
            .load_str("Ngmakefile", "let cc = 'gcc' . let cc = 'clang' .")
            .unwrap();
        assert_eq!(program.constants.get("cc"), Some(&Value::atom("clang")));
    }
}
