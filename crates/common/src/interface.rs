//! Synthesized structural interface declarations.

use crate::types::{Bindings, PlaceholderId, TypeExpr, Unbound};
use crate::Capability;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One parameter of a synthesized method (the receiver is implicit).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub annotation: Option<TypeExpr>,
    /// Default value text, e.g. `...`.
    pub default: Option<String>,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, annotation: Option<TypeExpr>) -> Self {
        Self {
            name: name.into(),
            annotation,
            default: None,
        }
    }

    fn render(&self, bindings: &dyn Bindings) -> String {
        let mut out = self.name.clone();
        if let Some(annotation) = &self.annotation {
            out.push_str(": ");
            out.push_str(&annotation.render(bindings));
        }
        if let Some(default) = &self.default {
            out.push_str(if self.annotation.is_some() { " = " } else { "=" });
            out.push_str(default);
        }
        out
    }
}

/// A member of an interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Member {
    /// `name: <type>`
    Field(TypeExpr),
    /// `def name(self, <params>): ...`
    Method(Vec<ParamDecl>),
}

/// A structural interface: `@runtime_checkable class Name(<bases>, Protocol)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDecl {
    pub name: String,
    /// Explicit bases other than `Protocol`.
    pub bases: Vec<String>,
    pub members: BTreeMap<String, Member>,
}

impl InterfaceDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            members: BTreeMap::new(),
        }
    }

    pub fn field_names(&self) -> BTreeSet<String> {
        self.members
            .iter()
            .filter(|(_, m)| matches!(m, Member::Field(_)))
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn method_names(&self) -> BTreeSet<String> {
        self.members
            .iter()
            .filter(|(_, m)| matches!(m, Member::Method(_)))
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Capabilities this declaration provides.
    pub fn capabilities(&self) -> BTreeSet<Capability> {
        self.members
            .iter()
            .map(|(name, member)| match member {
                Member::Field(_) => Capability::from_member(name, None),
                Member::Method(params) => Capability::from_member(name, Some(params.len())),
            })
            .collect()
    }

    /// Placeholders referenced by field or parameter types.
    pub fn placeholders(&self) -> BTreeSet<PlaceholderId> {
        let mut out = BTreeSet::new();
        for member in self.members.values() {
            match member {
                Member::Field(ty) => ty.placeholders(&mut out),
                Member::Method(params) => params
                    .iter()
                    .filter_map(|p| p.annotation.as_ref())
                    .for_each(|a| a.placeholders(&mut out)),
            }
        }
        out
    }

    /// Identifiers referenced by bases, field types and parameter annotations.
    pub fn referenced_names(&self) -> BTreeSet<String> {
        let mut out: BTreeSet<String> = self.bases.iter().cloned().collect();
        for member in self.members.values() {
            match member {
                Member::Field(ty) => ty.referenced_names(&mut out),
                Member::Method(params) => params
                    .iter()
                    .filter_map(|p| p.annotation.as_ref())
                    .for_each(|a| a.referenced_names(&mut out)),
            }
        }
        out
    }

    /// Replaces bound placeholders in every member type.
    pub fn substitute(&self, bindings: &dyn Bindings) -> InterfaceDecl {
        self.map_types(|ty| ty.substitute(bindings))
    }

    /// Renames referenced identifiers (bases included). The declaration's own
    /// name is left alone.
    pub fn rename_references(&self, map: &BTreeMap<String, String>) -> InterfaceDecl {
        let mut renamed = self.map_types(|ty| ty.rename(map));
        renamed.bases = self
            .bases
            .iter()
            .map(|b| map.get(b).cloned().unwrap_or_else(|| b.clone()))
            .collect();
        renamed
    }

    fn map_types(&self, f: impl Fn(&TypeExpr) -> TypeExpr) -> InterfaceDecl {
        let members = self
            .members
            .iter()
            .map(|(name, member)| {
                let member = match member {
                    Member::Field(ty) => Member::Field(f(ty)),
                    Member::Method(params) => Member::Method(
                        params
                            .iter()
                            .map(|p| ParamDecl {
                                name: p.name.clone(),
                                annotation: p.annotation.as_ref().map(&f),
                                default: p.default.clone(),
                            })
                            .collect(),
                    ),
                };
                (name.clone(), member)
            })
            .collect();
        InterfaceDecl {
            name: self.name.clone(),
            bases: self.bases.clone(),
            members,
        }
    }

    /// Canonical text of everything but the name; equal shapes mean the two
    /// declarations are interchangeable.
    pub fn shape(&self) -> String {
        let mut anonymous = self.clone();
        anonymous.name = String::from("_");
        anonymous.render(&Unbound)
    }

    /// Renders the declaration as Python source (4-space indent, trailing newline).
    ///
    /// Fields come first, then methods, each group in name order.
    pub fn render(&self, bindings: &dyn Bindings) -> String {
        let mut bases: Vec<&str> = self.bases.iter().map(String::as_str).collect();
        bases.push("Protocol");
        let mut out = format!(
            "@runtime_checkable\nclass {}({}):\n",
            self.name,
            bases.join(", ")
        );
        let mut body = 0;
        for (name, member) in &self.members {
            if let Member::Field(ty) = member {
                out.push_str(&format!("    {name}: {}\n", ty.render(bindings)));
                body += 1;
            }
        }
        for (name, member) in &self.members {
            if let Member::Method(params) = member {
                let mut rendered = vec![String::from("self")];
                rendered.extend(params.iter().map(|p| p.render(bindings)));
                out.push_str(&format!("    def {name}({}): ...\n", rendered.join(", ")));
                body += 1;
            }
        }
        if body == 0 {
            out.push_str("    pass\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn message() -> InterfaceDecl {
        let mut decl = InterfaceDecl::new("Message1");
        decl.members.insert(
            "content".into(),
            Member::Field(TypeExpr::Placeholder(PlaceholderId("Content1".into()))),
        );
        let mut arg1 = ParamDecl::new("arg1", Some(TypeExpr::named("str")));
        arg1.default = Some("...".into());
        decl.members.insert(
            "send".into(),
            Member::Method(vec![
                ParamDecl::new("arg0", Some(TypeExpr::named("int"))),
                arg1,
            ]),
        );
        decl
    }

    #[test]
    fn test_render_layout() {
        assert_eq!(
            message().render(&Unbound),
            "@runtime_checkable\n\
             class Message1(Protocol):\n    \
             content: Literal['Content1']\n    \
             def send(self, arg0: int, arg1: str = ...): ...\n"
        );
    }

    #[test]
    fn test_empty_body_renders_pass() {
        let mut decl = InterfaceDecl::new("Message");
        decl.bases = vec!["Message1".into(), "Message2".into()];
        assert_eq!(
            decl.render(&Unbound),
            "@runtime_checkable\nclass Message(Message1, Message2, Protocol):\n    pass\n"
        );
    }

    #[test]
    fn test_shape_ignores_name() {
        let a = message();
        let mut b = message();
        b.name = "Message7".into();
        assert_eq!(a.shape(), b.shape());
        b.members.remove("send");
        assert_ne!(a.shape(), b.shape());
    }

    #[test]
    fn test_capabilities_and_names() {
        let decl = message();
        assert_eq!(decl.field_names().into_iter().collect::<Vec<_>>(), vec!["content"]);
        assert_eq!(decl.method_names().into_iter().collect::<Vec<_>>(), vec!["send"]);
        assert!(decl.capabilities().contains(&Capability::Method {
            name: "send".into(),
            arity: 2
        }));
        assert_eq!(decl.placeholders().len(), 1);
    }
}
