//! Probe programs: the analysed file with placeholder slots.

use anatomist::{AnatomistError, Span};
use common::{Bindings, PlaceholderId, TypeExpr};
use std::collections::BTreeMap;

/// First lines of every probe, so abstract and typing names resolve without
/// touching the analysed file's own imports.
pub const PROBE_PRELUDE: &[&str] = &[
    "import collections.abc",
    "from collections.abc import *",
    "from typing import *",
    "from typing import Any, Literal, Protocol, Union, runtime_checkable",
];

/// Temporary placeholder values for a single probe.
pub type Overrides = BTreeMap<PlaceholderId, TypeExpr>;

/// Bindings with a layer of overrides on top.
pub struct Overlay<'a> {
    pub base: &'a dyn Bindings,
    pub top: &'a Overrides,
}

impl Bindings for Overlay<'_> {
    fn lookup(&self, id: &PlaceholderId) -> Option<&TypeExpr> {
        self.top.get(id).or_else(|| self.base.lookup(id))
    }
}

/// A piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Text(String),
    /// Renders the placeholder's current binding.
    Slot(PlaceholderId),
}

/// Source text with placeholder slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeTemplate {
    chunks: Vec<Chunk>,
}

impl ProbeTemplate {
    /// Splits `source` at the given replacement sites.
    ///
    /// # Errors
    /// [`AnatomistError::OverlappingEdits`] when two sites overlap.
    pub fn from_source(
        source: &str,
        mut sites: Vec<(Span, Vec<Chunk>)>,
    ) -> Result<Self, AnatomistError> {
        sites.sort_by_key(|(span, _)| (span.start, span.end));
        let mut chunks = Vec::new();
        let mut cursor = 0;
        let mut previous: Option<Span> = None;
        for (span, replacement) in sites {
            if let Some(prev) = previous {
                if prev.end > span.start {
                    return Err(AnatomistError::OverlappingEdits {
                        first: prev,
                        second: span,
                    });
                }
            }
            chunks.push(Chunk::Text(source[cursor..span.start].to_string()));
            chunks.extend(replacement);
            cursor = span.end;
            previous = Some(span);
        }
        chunks.push(Chunk::Text(source[cursor..].to_string()));
        Ok(Self { chunks })
    }

    /// Placeholders with at least one slot.
    pub fn slots(&self) -> impl Iterator<Item = &PlaceholderId> {
        self.chunks.iter().filter_map(|c| match c {
            Chunk::Slot(id) => Some(id),
            Chunk::Text(_) => None,
        })
    }

    pub fn render(&self, bindings: &dyn Bindings) -> String {
        let mut out = String::new();
        for chunk in &self.chunks {
            match chunk {
                Chunk::Text(text) => out.push_str(text),
                Chunk::Slot(id) => out.push_str(&TypeExpr::Placeholder(id.clone()).render(bindings)),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Unbound;

    fn id(name: &str) -> PlaceholderId {
        PlaceholderId(name.into())
    }

    #[test]
    fn test_slots_render_through_overlay() {
        let src = "def f(a, b):\n    pass\n";
        let template = ProbeTemplate::from_source(
            src,
            vec![
                (
                    Span::new(10, 10),
                    vec![Chunk::Text(": ".into()), Chunk::Slot(id("B1"))],
                ),
                (
                    Span::new(6, 7),
                    vec![Chunk::Text("a: ".into()), Chunk::Slot(id("A1"))],
                ),
            ],
        );
        let template = template.unwrap();
        assert_eq!(
            template.render(&Unbound),
            "def f(a: Literal['A1'], b: Literal['B1']):\n    pass\n"
        );

        let base = BTreeMap::from([(id("A1"), TypeExpr::named("str"))]);
        let top = BTreeMap::from([(id("B1"), TypeExpr::NoneType)]);
        let overlay = Overlay { base: &base, top: &top };
        assert_eq!(
            template.render(&overlay),
            "def f(a: str, b: None):\n    pass\n"
        );
        assert_eq!(template.slots().count(), 2);
    }

    #[test]
    fn test_overlapping_sites_are_rejected() {
        let result = ProbeTemplate::from_source(
            "abcdef",
            vec![
                (Span::new(0, 3), vec![Chunk::Text("x".into())]),
                (Span::new(2, 4), vec![Chunk::Text("y".into())]),
            ],
        );
        assert!(result.is_err());
    }
}
