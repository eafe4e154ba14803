//! Best-effort cross-file resolution of imports, base classes and calls
//!
//! Everything here works on names only. A reference that cannot be pinned
//! to a node in this build is dropped rather than guessed.

use crate::extractor::{ImportKind, ImportRef};
use locus_core::{NodeId, NodeKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Maps module paths to the files that implement them.
pub(crate) struct ModuleIndex {
    files: BTreeSet<String>,
    /// Extension-less path (`pkg/a`, and `pkg` for `pkg/__init__.py`) -> files.
    modules: BTreeMap<String, Vec<String>>,
}

impl ModuleIndex {
    pub fn new<'a>(files: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = ModuleIndex {
            files: BTreeSet::new(),
            modules: BTreeMap::new(),
        };
        for file in files {
            index.files.insert(file.to_string());
            let stem = strip_extension(file);
            index.register(stem, file);
            if let Some((package, last)) = stem.rsplit_once('/') {
                if matches!(last, "__init__" | "index") {
                    index.register(package, file);
                }
            }
        }
        index
    }

    fn register(&mut self, key: &str, file: &str) {
        let slot = self.modules.entry(key.to_string()).or_default();
        if !slot.iter().any(|f| f == file) {
            slot.push(file.to_string());
        }
    }

    /// Files an import refers to, excluding the importer itself.
    pub fn resolve(&self, importer: &str, import: &ImportRef) -> Vec<String> {
        let mut found: Vec<String> = match import.kind {
            ImportKind::Module { level } => self.resolve_module(importer, import, level),
            ImportKind::Script => self.resolve_script(importer, &import.spec),
            ImportKind::Include => self.resolve_include(importer, &import.spec),
        };
        found.retain(|f| f != importer);
        found.sort();
        found.dedup();
        found
    }

    fn resolve_module(&self, importer: &str, import: &ImportRef, level: usize) -> Vec<String> {
        let path = import.spec.replace('.', "/");
        let base = match level {
            0 => None,
            _ => {
                let mut dir = parent_dir(importer);
                for _ in 1..level {
                    dir = parent_dir(dir);
                }
                Some(dir)
            }
        };
        let lookup = |module_path: &str| -> Option<String> {
            match base {
                Some(dir) => self.lookup_exact(&join(dir, module_path), importer),
                None => self
                    .lookup_exact(module_path, importer)
                    .or_else(|| self.lookup_suffix(module_path, importer)),
            }
        };

        let mut found = Vec::new();
        for name in &import.names {
            let candidate = match path.is_empty() {
                true => name.clone(),
                false => format!("{path}/{name}"),
            };
            found.extend(lookup(&candidate));
        }
        if !path.is_empty() || base.is_some() {
            match lookup(&path) {
                Some(file) => found.push(file),
                // `import a.b.func` / `import static a.B.m`: retry one level up
                None if found.is_empty() => {
                    if let Some((parent, _)) = path.rsplit_once('/') {
                        found.extend(lookup(parent));
                    }
                }
                None => {}
            }
        }
        found
    }

    fn resolve_script(&self, importer: &str, spec: &str) -> Vec<String> {
        if !spec.starts_with('.') {
            return Vec::new();
        }
        let Some(target) = normalize(&join(parent_dir(importer), spec)) else {
            return Vec::new();
        };
        if self.files.contains(&target) {
            return vec![target];
        }
        self.lookup_exact(strip_extension(&target), importer)
            .into_iter()
            .collect()
    }

    fn resolve_include(&self, importer: &str, spec: &str) -> Vec<String> {
        if let Some(target) = normalize(&join(parent_dir(importer), spec)) {
            if self.files.contains(&target) {
                return vec![target];
            }
        }
        let suffix = format!("/{}", spec.trim_start_matches("./"));
        self.files
            .iter()
            .filter(|f| f.ends_with(&suffix) || f.as_str() == &suffix[1..])
            .min_by(|a, b| (a.len(), a.as_str()).cmp(&(b.len(), b.as_str())))
            .cloned()
            .into_iter()
            .collect()
    }

    fn lookup_exact(&self, key: &str, importer: &str) -> Option<String> {
        let key = normalize(key)?;
        self.modules
            .get(&key)
            .and_then(|files| prefer_same_extension(files, importer))
    }

    /// `core.models` also matches `src/core/models.py`; the shortest match wins.
    fn lookup_suffix(&self, path: &str, importer: &str) -> Option<String> {
        let suffix = format!("/{path}");
        self.modules
            .iter()
            .filter(|(key, _)| key.ends_with(&suffix))
            .min_by(|(a, _), (b, _)| (a.len(), a.as_str()).cmp(&(b.len(), b.as_str())))
            .and_then(|(_, files)| prefer_same_extension(files, importer))
    }
}

fn prefer_same_extension(files: &[String], importer: &str) -> Option<String> {
    let ext = importer.rsplit_once('.').map(|(_, e)| e);
    files
        .iter()
        .find(|f| f.rsplit_once('.').map(|(_, e)| e) == ext)
        .or_else(|| files.first())
        .cloned()
}

fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..name_start + dot],
        _ => path,
    }
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn join(dir: &str, rel: &str) -> String {
    match (dir.is_empty(), rel.is_empty()) {
        (true, _) => rel.to_string(),
        (false, true) => dir.to_string(),
        (false, false) => format!("{dir}/{rel}"),
    }
}

/// Resolve `.` and `..`; `None` if the path climbs out of the root.
fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

#[derive(Debug, Clone)]
struct SymbolRef {
    id: NodeId,
    kind: NodeKind,
    parent: Option<NodeId>,
}

/// Name lookup over emitted class and function nodes.
#[derive(Default)]
pub(crate) struct SymbolTable {
    by_file: HashMap<String, HashMap<String, Vec<SymbolRef>>>,
    global: HashMap<String, Vec<SymbolRef>>,
}

impl SymbolTable {
    pub fn insert(&mut self, file: &str, name: &str, id: NodeId, kind: NodeKind, parent: Option<NodeId>) {
        let symbol = SymbolRef { id, kind, parent };
        self.by_file
            .entry(file.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default()
            .push(symbol.clone());
        self.global.entry(name.to_string()).or_default().push(symbol);
    }

    /// Same file first (preferring siblings of `scope`), then files the
    /// importer imports, then a name that is unique across the build.
    pub fn resolve(
        &self,
        name: &str,
        kinds: &[NodeKind],
        file: &str,
        imported: &[String],
        scope: Option<&NodeId>,
        exclude: Option<&NodeId>,
    ) -> Option<NodeId> {
        let accept = |s: &&SymbolRef| kinds.contains(&s.kind) && exclude != Some(&s.id);

        let local: Vec<&SymbolRef> = self
            .by_file
            .get(file)
            .and_then(|names| names.get(name))
            .map(|list| list.iter().filter(accept).collect())
            .unwrap_or_default();
        if !local.is_empty() {
            let sibling = local.iter().find(|s| scope.is_some() && s.parent.as_ref() == scope);
            return sibling.or(local.first()).map(|s| s.id.clone());
        }

        for other in imported {
            let hit = self
                .by_file
                .get(other)
                .and_then(|names| names.get(name))
                .and_then(|list| list.iter().find(accept));
            if let Some(symbol) = hit {
                return Some(symbol.id.clone());
            }
        }

        let mut global = self.global.get(name)?.iter().filter(accept);
        match (global.next(), global.next()) {
            (Some(only), None) => Some(only.id.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(spec: &str, level: usize, names: &[&str]) -> ImportRef {
        ImportRef {
            spec: spec.to_string(),
            kind: ImportKind::Module { level },
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    fn index() -> ModuleIndex {
        ModuleIndex::new([
            "app/main.py",
            "app/core/__init__.py",
            "app/core/models.py",
            "app/core/util.py",
            "web/src/index.js",
            "web/src/board.js",
            "web/src/lib/index.ts",
            "native/include/util.h",
            "native/src/main.c",
            "java/com/shop/Item.java",
            "java/com/shop/Order.java",
        ])
    }

    #[test]
    fn test_python_absolute_and_suffix_imports() {
        let idx = index();
        assert_eq!(
            idx.resolve("app/main.py", &module("app.core.models", 0, &[])),
            vec!["app/core/models.py"]
        );
        assert_eq!(
            idx.resolve("app/main.py", &module("core.util", 0, &[])),
            vec!["app/core/util.py"]
        );
        assert_eq!(
            idx.resolve("app/main.py", &module("core", 0, &["models", "Thing"])),
            vec!["app/core/__init__.py", "app/core/models.py"]
        );
        assert!(idx.resolve("app/main.py", &module("numpy", 0, &[])).is_empty());
    }

    #[test]
    fn test_python_relative_imports() {
        let idx = index();
        assert_eq!(
            idx.resolve("app/core/models.py", &module("", 1, &["util"])),
            vec!["app/core/__init__.py", "app/core/util.py"]
        );
        assert_eq!(
            idx.resolve("app/core/models.py", &module("main", 2, &[])),
            vec!["app/main.py"]
        );
        assert!(idx.resolve("app/main.py", &module("x", 5, &[])).is_empty());
    }

    #[test]
    fn test_script_and_include_imports() {
        let idx = index();
        let script = |spec: &str| ImportRef {
            spec: spec.to_string(),
            kind: ImportKind::Script,
            names: vec![],
        };
        assert_eq!(idx.resolve("web/src/index.js", &script("./board")), vec!["web/src/board.js"]);
        assert_eq!(idx.resolve("web/src/board.js", &script("./lib")), vec!["web/src/lib/index.ts"]);
        assert_eq!(idx.resolve("web/src/board.js", &script("./board.js")), Vec::<String>::new());
        assert!(idx.resolve("web/src/index.js", &script("react")).is_empty());

        let include = ImportRef {
            spec: "util.h".to_string(),
            kind: ImportKind::Include,
            names: vec![],
        };
        assert_eq!(idx.resolve("native/src/main.c", &include), vec!["native/include/util.h"]);
    }

    #[test]
    fn test_java_imports_by_suffix() {
        let idx = index();
        assert_eq!(
            idx.resolve("java/com/shop/Order.java", &module("com.shop.Item", 0, &[])),
            vec!["java/com/shop/Item.java"]
        );
        // static member import falls back to the class file
        assert_eq!(
            idx.resolve("java/com/shop/Order.java", &module("com.shop.Item.create", 0, &[])),
            vec!["java/com/shop/Item.java"]
        );
    }

    #[test]
    fn test_symbol_resolution_tiers() {
        let mut table = SymbolTable::default();
        let id = |s: &str| NodeId::from(s);
        table.insert("a.py", "Base", id("a.py::Base"), NodeKind::Class, None);
        table.insert("b.py", "Base", id("b.py::Base"), NodeKind::Class, None);
        table.insert("b.py", "helper", id("b.py::helper"), NodeKind::Function, None);
        table.insert("c.py", "run", id("c.py::A.run"), NodeKind::Function, Some(id("c.py::A")));
        table.insert("c.py", "run", id("c.py::B.run"), NodeKind::Function, Some(id("c.py::B")));

        let class = [NodeKind::Class];
        let callable = [NodeKind::Function, NodeKind::Class];

        // same file wins
        assert_eq!(table.resolve("Base", &class, "a.py", &[], None, None), Some(id("a.py::Base")));
        // imported file next
        let imported = vec!["b.py".to_string()];
        assert_eq!(
            table.resolve("Base", &class, "z.py", &imported, None, None),
            Some(id("b.py::Base"))
        );
        // ambiguous globally
        assert_eq!(table.resolve("Base", &class, "z.py", &[], None, None), None);
        // unique globally
        assert_eq!(
            table.resolve("helper", &callable, "z.py", &[], None, None),
            Some(id("b.py::helper"))
        );
        // kind filter
        assert_eq!(table.resolve("helper", &class, "z.py", &[], None, None), None);
        // sibling preferred within a file
        assert_eq!(
            table.resolve("run", &callable, "c.py", &[], Some(&id("c.py::B")), None),
            Some(id("c.py::B.run"))
        );
        // self excluded, so the only other Base is picked up
        assert_eq!(
            table.resolve("Base", &class, "a.py", &[], None, Some(&id("a.py::Base"))),
            Some(id("b.py::Base"))
        );
    }
}
