//! Member sets of existing classes and of registry interfaces.

use anatomist::imports::resolve_import;
use anatomist::{ClassInfo, ParserHost, SourceModel};
use catalog::Catalog;
use common::InterfaceRegistry;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Names a class or interface provides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberSet {
    pub methods: BTreeSet<String>,
    pub fields: BTreeSet<String>,
}

impl MemberSet {
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.fields.is_empty()
    }

    /// `true` when `self` has every method and field `required` names.
    ///
    /// A field may be provided by a method of the same name (a property).
    pub fn covers(&self, required: &MemberSet) -> bool {
        required.methods.is_subset(&self.methods)
            && required
                .fields
                .iter()
                .all(|f| self.fields.contains(f) || self.methods.contains(f))
    }

    fn extend(&mut self, other: MemberSet) {
        self.methods.extend(other.methods);
        self.fields.extend(other.fields);
    }
}

/// Members an interface requires, its registered bases included.
pub fn interface_members(registry: &InterfaceRegistry, name: &str) -> MemberSet {
    let mut out = MemberSet::default();
    for decl in registry.closure([name]) {
        let inherited = decl.name == name
            || registry
                .get(name)
                .is_some_and(|root| reaches(registry, root.bases.iter(), &decl.name));
        if inherited {
            out.methods.extend(decl.method_names());
            out.fields.extend(decl.field_names());
        }
    }
    out
}

/// `true` when `target` is among `bases` or their registered ancestors.
fn reaches<'a>(
    registry: &InterfaceRegistry,
    bases: impl Iterator<Item = &'a String>,
    target: &str,
) -> bool {
    let mut stack: Vec<&String> = bases.collect();
    let mut seen = BTreeSet::new();
    while let Some(base) = stack.pop() {
        if base == target {
            return true;
        }
        if seen.insert(base) {
            if let Some(decl) = registry.get(base) {
                stack.extend(decl.bases.iter());
            }
        }
    }
    false
}

/// Collects class members through local, builtin, registry and imported
/// base classes.
pub struct MemberCollector<'a> {
    pub catalog: &'a Catalog,
    pub registry: &'a InterfaceRegistry,
    pub registry_module: &'a str,
    pub project_root: &'a Path,
    host: ParserHost,
    /// Parsed models of imported project files.
    imported: HashMap<PathBuf, Option<SourceModel>>,
}

impl<'a> MemberCollector<'a> {
    pub fn new(
        host: ParserHost,
        catalog: &'a Catalog,
        registry: &'a InterfaceRegistry,
        registry_module: &'a str,
        project_root: &'a Path,
    ) -> Self {
        Self {
            catalog,
            registry,
            registry_module,
            project_root,
            host,
            imported: HashMap::new(),
        }
    }

    /// Every member `class` has, own and inherited.
    ///
    /// `file` locates imported bases; without it only local, builtin and
    /// registry bases contribute.
    pub fn collect(&mut self, class: &ClassInfo, model: &SourceModel, file: Option<&Path>) -> MemberSet {
        let mut visited = BTreeSet::new();
        self.collect_inner(class, model, file, &mut visited)
    }

    fn collect_inner(
        &mut self,
        class: &ClassInfo,
        model: &SourceModel,
        file: Option<&Path>,
        visited: &mut BTreeSet<(Option<PathBuf>, String)>,
    ) -> MemberSet {
        let mut members = MemberSet {
            methods: class.methods.clone(),
            fields: class.fields.clone(),
        };
        if !visited.insert((file.map(Path::to_path_buf), class.name.clone())) {
            return members;
        }
        for base in &class.bases {
            let base = base_name(base);
            let inherited = self.base_members(base, model, file, visited);
            trace!(class = %class.name, base, found = inherited.is_some(), "base members");
            if let Some(inherited) = inherited {
                members.extend(inherited);
            }
        }
        members
    }

    fn base_members(
        &mut self,
        base: &str,
        model: &SourceModel,
        file: Option<&Path>,
        visited: &mut BTreeSet<(Option<PathBuf>, String)>,
    ) -> Option<MemberSet> {
        if let Some(local) = model.class(base) {
            let local = local.clone();
            return Some(self.collect_inner(&local, model, file, visited));
        }
        if let Some((module, name)) = model.import_source(base) {
            if module == self.registry_module {
                return Some(interface_members(self.registry, name));
            }
            let (module, name) = (module.to_string(), name.to_string());
            return self.imported_members(&module, &name, file?, visited);
        }
        self.catalog.get(base).map(|entry| MemberSet {
            methods: entry.members.clone(),
            fields: entry.members.clone(),
        })
    }

    fn imported_members(
        &mut self,
        module: &str,
        name: &str,
        file: &Path,
        visited: &mut BTreeSet<(Option<PathBuf>, String)>,
    ) -> Option<MemberSet> {
        let path = resolve_import(file, module, self.project_root)?;
        if !self.imported.contains_key(&path) {
            let model = std::fs::read_to_string(&path)
                .ok()
                .and_then(|source| self.host.model(&source).ok());
            self.imported.insert(path.clone(), model);
        }
        let model = self.imported.get(&path)?.clone()?;
        let class = model.class(name)?.clone();
        Some(self.collect_inner(&class, &model, Some(&path), visited))
    }
}

/// `pkg.Base[int]` -> `Base`.
fn base_name(expr: &str) -> &str {
    let head = expr.split('[').next().unwrap_or(expr).trim();
    head.rsplit('.').next().unwrap_or(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anatomist::parser::parse_source;
    use common::{InterfaceDecl, Member, ParamDecl, TypeExpr};

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn collector<'a>(
        catalog: &'a Catalog,
        registry: &'a InterfaceRegistry,
        root: &'a Path,
    ) -> MemberCollector<'a> {
        MemberCollector::new(
            ParserHost::new().unwrap(),
            catalog,
            registry,
            "interfaces.interfaces",
            root,
        )
    }

    #[test]
    fn test_local_and_builtin_bases() {
        let src = "class Base:\n    def send(self, to):\n        pass\n\n\
                   class Bag(Base, list):\n    def __init__(self):\n        self.content = 1\n";
        let model = parse_source(src).unwrap();
        let catalog = Catalog::builtin();
        let registry = InterfaceRegistry::new();
        let root = PathBuf::from("/nonexistent");
        let mut members = collector(&catalog, &registry, &root);
        let bag = members.collect(&model.classes[1], &model, None);
        assert!(bag.methods.contains("send"));
        assert!(bag.methods.contains("__len__"));
        assert!(bag.fields.contains("content"));
    }

    #[test]
    fn test_imported_base_is_followed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        std::fs::write(
            root.join("base.py"),
            "class Base:\n    def send(self, to):\n        pass\n",
        )
        .unwrap();
        let main = root.join("main.py");
        let src = "from base import Base\nclass Message(Base):\n    content: str\n";
        std::fs::write(&main, src).unwrap();

        let model = parse_source(src).unwrap();
        let catalog = Catalog::builtin();
        let registry = InterfaceRegistry::new();
        let mut members = collector(&catalog, &registry, &root);
        let message = members.collect(&model.classes[0], &model, Some(&main));
        assert_eq!(message.methods, set(&["send"]));
        assert_eq!(message.fields, set(&["content"]));
    }

    #[test]
    fn test_self_referencing_bases_terminate() {
        let src = "class A(B):\n    x = 1\n\nclass B(A):\n    y = 2\n";
        let model = parse_source(src).unwrap();
        let catalog = Catalog::builtin();
        let registry = InterfaceRegistry::new();
        let root = PathBuf::from("/nonexistent");
        let mut members = collector(&catalog, &registry, &root);
        let a = members.collect(&model.classes[0], &model, None);
        assert_eq!(a.fields, set(&["x", "y"]));
    }

    #[test]
    fn test_interface_members_follow_registered_bases() {
        let mut partial = InterfaceDecl::new("Message1");
        partial
            .members
            .insert("content".into(), Member::Field(TypeExpr::named("str")));
        partial.members.insert(
            "send".into(),
            Member::Method(vec![ParamDecl::new("arg0", None)]),
        );
        let mut aggregate = InterfaceDecl::new("Message");
        aggregate.bases = vec!["Message1".into()];
        let mut unrelated = InterfaceDecl::new("Content1");
        unrelated
            .members
            .insert("text".into(), Member::Field(TypeExpr::named("str")));
        partial
            .members
            .insert("body".into(), Member::Field(TypeExpr::named("Content1")));
        let registry = InterfaceRegistry::from_decls([partial, aggregate, unrelated]);

        let required = interface_members(&registry, "Message");
        assert_eq!(required.methods, set(&["send"]));
        assert_eq!(required.fields, set(&["body", "content"]));

        let provider = MemberSet {
            methods: set(&["send", "body"]),
            fields: set(&["content"]),
        };
        assert!(provider.covers(&required));
        assert!(!MemberSet::default().covers(&required));
    }

    #[test]
    fn test_base_name_strips_module_and_arguments() {
        assert_eq!(base_name("typing.Generic[T]"), "Generic");
        assert_eq!(base_name("Base"), "Base");
    }
}
