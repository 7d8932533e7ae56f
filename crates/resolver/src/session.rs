//! Per-function resolution state and the placeholder fixpoint.

use crate::hints::combine_with_hint;
use crate::probe::{Overlay, Overrides, ProbeTemplate, PROBE_PRELUDE};
use crate::{ResolveError, ResolverConfig, MAX_PASSES, MAX_SUBSCRIPT_DEPTH, MAX_WIDENING_STEPS};
use catalog::signatures::stub_params;
use catalog::Catalog;
use common::{
    interface_stem, InterfaceDecl, InterfaceRegistry, Member, NameCounters, ParamDecl,
    PlaceholderId, TypeExpr,
};
use miner::{ArgumentSlot, Miner};
use oracle::{Diagnostic, Oracle};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// Shared collaborators of a resolution.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub oracle: &'a dyn Oracle,
    pub catalog: &'a Catalog,
    pub counters: &'a NameCounters,
    pub config: &'a ResolverConfig,
    /// Topological rank of the file being resolved.
    pub rank: usize,
}

/// What a finished session hands back to the file resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionResult {
    /// Final type per target placeholder, placeholders substituted.
    pub annotations: BTreeMap<PlaceholderId, TypeExpr>,
    /// Interfaces reachable from the annotations.
    pub decls: Vec<InterfaceDecl>,
    /// `from m import X` lines for accepted library classes.
    pub external_imports: BTreeSet<String>,
}

/// Resolution state for one function.
///
/// The probe is `PROBE_PRELUDE`, one extra-import line, the fixed preamble
/// (registry interfaces the file already uses), the interfaces synthesized
/// in this session and finally the body template.
pub struct Session<'a> {
    ctx: Context<'a>,
    miner: Miner,
    function: String,
    preamble: String,
    body: ProbeTemplate,
    targets: Vec<PlaceholderId>,
    interfaces: BTreeMap<String, InterfaceDecl>,
    bindings: BTreeMap<PlaceholderId, TypeExpr>,
    pending: BTreeSet<PlaceholderId>,
    /// Field placeholder -> (interface, member).
    field_placeholders: BTreeMap<PlaceholderId, (String, String)>,
    hints: BTreeMap<PlaceholderId, TypeExpr>,
    external_imports: BTreeSet<String>,
}

impl<'a> Session<'a> {
    /// Starts a session over `body` whose slots are the `targets`.
    ///
    /// `preamble` is inserted verbatim between the extra-import line and the
    /// session's interfaces; it must end with a newline when non-empty.
    pub fn new(
        ctx: Context<'a>,
        function: impl Into<String>,
        preamble: String,
        body: ProbeTemplate,
        targets: Vec<PlaceholderId>,
        hints: BTreeMap<PlaceholderId, TypeExpr>,
    ) -> Self {
        Self {
            ctx,
            miner: Miner::new(),
            function: function.into(),
            preamble,
            body,
            pending: targets.iter().cloned().collect(),
            targets,
            interfaces: BTreeMap::new(),
            bindings: BTreeMap::new(),
            field_placeholders: BTreeMap::new(),
            hints,
            external_imports: BTreeSet::new(),
        }
    }

    /// Renders the probe for the current state plus `overrides`.
    pub fn render(&self, overrides: &Overrides, extra_import: Option<&str>) -> String {
        let overlay = Overlay {
            base: &self.bindings,
            top: overrides,
        };
        let mut out = String::new();
        for line in PROBE_PRELUDE {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(extra_import.unwrap_or("pass"));
        out.push('\n');
        out.push_str(&self.preamble);
        for decl in self.interfaces.values() {
            out.push_str(&decl.render(&overlay));
        }
        out.push_str(&self.body.render(&overlay));
        out
    }

    fn probe(
        &self,
        overrides: &Overrides,
        extra_import: Option<&str>,
    ) -> Result<Vec<Diagnostic>, ResolveError> {
        let source = self.render(overrides, extra_import);
        let diagnostics = self.ctx.oracle.check(&source, self.ctx.config.mode)?;
        debug!(
            function = %self.function,
            overrides = overrides.len(),
            diagnostics = diagnostics.len(),
            "probe"
        );
        Ok(diagnostics)
    }

    // ---- fixpoint ----

    /// Resolves every target, then every placeholder the targets pull in.
    ///
    /// # Errors
    /// Oracle failures, [`ResolveError::WideningExceeded`] and
    /// [`ResolveError::FixpointExceeded`] when placeholders keep appearing
    /// after [`MAX_PASSES`] passes.
    pub fn run(&mut self) -> Result<(), ResolveError> {
        for pass in 0..MAX_PASSES {
            let promoted = self.promote()?;
            if self.pending.is_empty() && !promoted {
                debug!(function = %self.function, passes = pass, "fixpoint reached");
                return Ok(());
            }
            let batch = std::mem::take(&mut self.pending);
            for id in batch {
                let inferred = self.resolve(&id, 0, &Overrides::new())?;
                let combined =
                    combine_with_hint(self.hints.get(&id), inferred, self.ctx.config.allow_any);
                trace!(placeholder = %id, resolved = %combined, "bound");
                self.bindings.insert(id, combined);
            }
        }
        Err(ResolveError::FixpointExceeded {
            function: self.function.clone(),
            passes: MAX_PASSES,
        })
    }

    /// Infers the type of one placeholder.
    ///
    /// `outer` holds the values of enclosing placeholders while an element
    /// type is being resolved.
    fn resolve(
        &mut self,
        id: &PlaceholderId,
        depth: usize,
        outer: &Overrides,
    ) -> Result<TypeExpr, ResolveError> {
        let catalog = self.ctx.catalog;
        let config = self.ctx.config;

        let baseline = self.probe(&with_value(outer, id, TypeExpr::Any), None)?;
        let inert = self.probe(&with_value(outer, id, TypeExpr::NoneType), None)?;
        let shape = self.miner.mine(&difference(&inert, &baseline));

        if let Some(literal) = shape.literal {
            return Ok(TypeExpr::parse(&literal));
        }
        if shape.is_empty() {
            return Ok(TypeExpr::Any);
        }
        let required = shape.required_members();
        if required.is_empty() {
            let mut compatible = shape.compatible.clone();
            if config.exclude_memoryview {
                compatible.remove("memoryview");
            }
            return Ok(TypeExpr::union(
                catalog.minimal(&compatible).iter().map(|n| TypeExpr::parse(n)),
            ));
        }

        let mut remaining = catalog.matching(&required);
        remaining.extend(
            shape
                .compatible
                .iter()
                .filter(|c| !catalog.contains(c))
                .cloned(),
        );
        if config.exclude_memoryview {
            remaining.remove("memoryview");
        }

        // Most general candidates first; accepting one settles its subtypes.
        let mut accepted = Vec::new();
        while !remaining.is_empty() {
            let roots = catalog.minimal(&remaining);
            if roots.is_empty() {
                break;
            }
            for root in roots {
                remaining.remove(&root);
                if self.validate(id, &root, outer, &baseline, None)? {
                    for below in catalog.descendants(&root, &remaining) {
                        remaining.remove(&below);
                    }
                    accepted.push(root);
                } else {
                    debug!(placeholder = %id, candidate = %root, "candidate rejected");
                }
            }
        }

        let mut externals = Vec::new();
        for entry in catalog.matching_external(&required) {
            if accepted.iter().any(|a| entry.supertypes.contains(a)) {
                continue;
            }
            let line = entry.import_line();
            if self.validate(id, &entry.name, outer, &baseline, line.as_deref())? {
                externals.push(entry.name.clone());
                self.external_imports.extend(line);
            }
        }

        let covered = !externals.is_empty()
            || accepted
                .iter()
                .any(|n| catalog.get(n).is_some_and(|e| e.provides(&required)));

        let mut parts = Vec::new();
        for name in &accepted {
            parts.push(self.parametrize(id, name, depth, outer)?);
        }
        parts.extend(externals.into_iter().map(TypeExpr::Named));
        if !covered || config.add_protocols_on_builtin {
            parts.push(TypeExpr::Named(self.synthesize(id, &required)));
        }
        Ok(TypeExpr::union(parts))
    }

    /// `true` when substituting `candidate` raises no new incompatibility.
    fn validate(
        &self,
        id: &PlaceholderId,
        candidate: &str,
        outer: &Overrides,
        baseline: &[Diagnostic],
        extra_import: Option<&str>,
    ) -> Result<bool, ResolveError> {
        let diagnostics = self.probe(
            &with_value(outer, id, TypeExpr::parse(candidate)),
            extra_import,
        )?;
        let new = difference(&diagnostics, baseline);
        Ok(!self.miner.rejects_candidate(candidate, &new))
    }

    /// Fills in the element types of a generic candidate.
    fn parametrize(
        &mut self,
        id: &PlaceholderId,
        name: &str,
        depth: usize,
        outer: &Overrides,
    ) -> Result<TypeExpr, ResolveError> {
        let bare = TypeExpr::parse(name);
        let params = self.ctx.catalog.get(name).map_or(0, |e| e.type_params);
        if params == 0 || depth >= MAX_SUBSCRIPT_DEPTH {
            return Ok(bare);
        }
        let generic = |args: Vec<TypeExpr>| TypeExpr::Generic {
            base: name.to_string(),
            args,
        };

        let args = if params == 1 {
            let sub = id.subscript();
            let scope = with_value(outer, id, generic(vec![TypeExpr::Placeholder(sub.clone())]));
            vec![self.resolve(&sub, depth + 1, &scope)?]
        } else {
            let (first, second) = (id.first_subscript(), id.second_subscript());
            let scope = with_value(
                outer,
                id,
                generic(vec![TypeExpr::Placeholder(first.clone()), TypeExpr::Any]),
            );
            let key = self.resolve(&first, depth + 1, &scope)?;
            let scope = with_value(
                outer,
                id,
                generic(vec![TypeExpr::Any, TypeExpr::Placeholder(second.clone())]),
            );
            let value = self.resolve(&second, depth + 1, &scope)?;
            vec![key, value]
        };

        if args.iter().all(TypeExpr::is_any) && !self.ctx.config.allow_any {
            return Ok(bare);
        }
        let parametrized = generic(args);
        if let Some(max) = self.ctx.config.max_hint_length {
            if parametrized.render(&self.bindings).len() > max {
                return Ok(bare);
            }
        }
        Ok(parametrized)
    }

    /// Declares an interface named after `id` providing `required`.
    ///
    /// Known dunders get their stub signature; every other member becomes a
    /// field typed by a fresh placeholder, resolved in a later pass.
    fn synthesize(&mut self, id: &PlaceholderId, required: &BTreeSet<String>) -> String {
        let name = id.as_str().to_string();
        let mut decl = self
            .interfaces
            .remove(&name)
            .unwrap_or_else(|| InterfaceDecl::new(name.clone()));
        for member in required {
            if decl.members.contains_key(member) {
                continue;
            }
            let declared = match stub_params(member) {
                Some(params) => Member::Method(params),
                None => {
                    let stem = interface_stem(member);
                    let number = self.ctx.counters.allocate(&stem, self.ctx.rank);
                    let field = PlaceholderId::numbered(&stem, number);
                    self.pending.insert(field.clone());
                    self.field_placeholders
                        .insert(field.clone(), (name.clone(), member.clone()));
                    Member::Field(TypeExpr::Placeholder(field))
                }
            };
            decl.members.insert(member.clone(), declared);
        }
        debug!(interface = %name, members = decl.members.len(), "interface synthesized");
        self.interfaces.insert(name.clone(), decl);
        name
    }

    // ---- promotion & widening ----

    /// Turns fields seen being called into methods. Returns `true` when at
    /// least one field was promoted.
    fn promote(&mut self) -> Result<bool, ResolveError> {
        if self.field_placeholders.is_empty() {
            return Ok(false);
        }
        let diagnostics = self.probe(&Overrides::new(), None)?;
        let mut promoted = false;
        for raw in self.miner.not_callable_placeholders(&diagnostics) {
            let field = PlaceholderId(raw);
            let Some((interface, member)) = self.field_placeholders.remove(&field) else {
                continue;
            };
            self.pending.remove(&field);
            self.bindings.remove(&field);
            if let Some(decl) = self.interfaces.get_mut(&interface) {
                decl.members.insert(member.clone(), Member::Method(Vec::new()));
            }
            debug!(%interface, %member, "field promoted to method");
            self.widen(&interface, &member)?;
            promoted = true;
        }
        Ok(promoted)
    }

    /// Adds parameters to `interface.method` until no call site passes more
    /// arguments than it declares.
    fn widen(&mut self, interface: &str, method: &str) -> Result<(), ResolveError> {
        for _ in 0..MAX_WIDENING_STEPS {
            let diagnostics = self.probe(&Overrides::new(), None)?;
            let surplus = self
                .miner
                .too_many_arguments(&diagnostics)
                .iter()
                .any(|t| t.is(method, interface));
            if surplus {
                let position = self.method_params(interface, method).len();
                self.add_parameter(
                    interface,
                    method,
                    format!("arg{position}"),
                    ArgumentSlot::Position(position + 1),
                )?;
                continue;
            }

            let keywords = self
                .miner
                .unexpected_keywords(&diagnostics)
                .into_iter()
                .find(|(t, _)| t.is(method, interface))
                .map(|(_, names)| names);
            if let Some(names) = keywords {
                for keyword in names {
                    let slot = ArgumentSlot::Keyword(keyword.clone());
                    self.add_parameter(interface, method, keyword, slot)?;
                }
                continue;
            }
            return Ok(());
        }
        Err(ResolveError::WideningExceeded {
            interface: interface.to_string(),
            method: method.to_string(),
        })
    }

    /// Appends `name: None`, probes, then settles its annotation from the
    /// captured argument types and gives it a default when some call site
    /// leaves it out.
    fn add_parameter(
        &mut self,
        interface: &str,
        method: &str,
        name: String,
        slot: ArgumentSlot,
    ) -> Result<(), ResolveError> {
        let mut params = self.method_params(interface, method);
        let defaulted_before = params.iter().any(|p| p.default.is_some());
        let mut probing = params.clone();
        probing.push(ParamDecl::new(name.clone(), Some(TypeExpr::NoneType)));
        self.set_method_params(interface, method, probing);

        let diagnostics = self.probe(&Overrides::new(), None)?;
        let captured = self
            .miner
            .captured_argument_type(&diagnostics, method, interface, &slot);
        let missing = self
            .miner
            .missing_positional(&diagnostics, &name, method, interface);

        let annotation = if captured.is_any() && !self.ctx.config.allow_any {
            None
        } else {
            Some(captured)
        };
        let mut settled = ParamDecl::new(name.clone(), annotation);
        if missing || defaulted_before {
            settled.default = Some(String::from("..."));
        }
        debug!(%interface, %method, parameter = %name, "method widened");
        params.push(settled);
        self.set_method_params(interface, method, params);
        Ok(())
    }

    fn method_params(&self, interface: &str, method: &str) -> Vec<ParamDecl> {
        match self.interfaces.get(interface).and_then(|d| d.members.get(method)) {
            Some(Member::Method(params)) => params.clone(),
            _ => Vec::new(),
        }
    }

    fn set_method_params(&mut self, interface: &str, method: &str, params: Vec<ParamDecl>) {
        if let Some(decl) = self.interfaces.get_mut(interface) {
            decl.members.insert(method.to_string(), Member::Method(params));
        }
    }

    // ---- results ----

    /// Substitutes every binding and keeps the interfaces the target
    /// annotations reach.
    pub fn finish(self) -> SessionResult {
        let annotations: BTreeMap<PlaceholderId, TypeExpr> = self
            .targets
            .iter()
            .map(|id| {
                let ty = self
                    .bindings
                    .get(id)
                    .map_or(TypeExpr::Any, |t| t.substitute(&self.bindings));
                (id.clone(), ty)
            })
            .collect();

        let materialized = InterfaceRegistry::from_decls(
            self.interfaces.values().map(|d| d.substitute(&self.bindings)),
        );
        let mut roots = BTreeSet::new();
        for ty in annotations.values() {
            ty.referenced_names(&mut roots);
        }
        let decls = materialized
            .closure(roots.iter().map(String::as_str))
            .into_iter()
            .cloned()
            .collect();

        SessionResult {
            annotations,
            decls,
            external_imports: self.external_imports,
        }
    }
}

fn with_value(outer: &Overrides, id: &PlaceholderId, value: TypeExpr) -> Overrides {
    let mut overrides = outer.clone();
    overrides.insert(id.clone(), value);
    overrides
}

/// Diagnostics of `probe` that the baseline does not have.
fn difference(probe: &[Diagnostic], baseline: &[Diagnostic]) -> Vec<Diagnostic> {
    let known: BTreeSet<&Diagnostic> = baseline.iter().collect();
    probe.iter().filter(|d| !known.contains(d)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anatomist::Span;
    use crate::probe::Chunk;
    use oracle::{line_of, ScriptedOracle};
    use pretty_assertions::assert_eq;

    fn template(source: &str, param_end: usize, id: &PlaceholderId) -> ProbeTemplate {
        ProbeTemplate::from_source(
            source,
            vec![(
                Span::new(param_end, param_end),
                vec![Chunk::Text(": ".into()), Chunk::Slot(id.clone())],
            )],
        )
        .unwrap()
    }

    fn context<'a>(
        oracle: &'a dyn Oracle,
        catalog: &'a Catalog,
        counters: &'a NameCounters,
        config: &'a ResolverConfig,
    ) -> Context<'a> {
        Context {
            oracle,
            catalog,
            counters,
            config,
            rank: 0,
        }
    }

    #[test]
    fn test_difference_drops_baseline() {
        let a = Diagnostic::error(3, "a");
        let b = Diagnostic::error(4, "b");
        assert_eq!(difference(&[a.clone(), b.clone()], &[a]), vec![b]);
    }

    #[test]
    fn test_probe_layout() {
        let oracle = ScriptedOracle::silent();
        let catalog = Catalog::builtin();
        let counters = NameCounters::new();
        let config = ResolverConfig::default();
        let id = PlaceholderId("P1".into());
        let src = "def f(p):\n    pass\n";
        let session = Session::new(
            context(&oracle, &catalog, &counters, &config),
            "f",
            String::from("X_ = int\n"),
            template(src, 7, &id),
            vec![id.clone()],
            BTreeMap::new(),
        );
        let probe = session.render(&Overrides::new(), Some("from m import Y"));
        let lines: Vec<&str> = probe.lines().collect();
        assert_eq!(lines.len(), PROBE_PRELUDE.len() + 4);
        assert_eq!(lines[PROBE_PRELUDE.len()], "from m import Y");
        assert_eq!(lines[PROBE_PRELUDE.len() + 1], "X_ = int");
        assert_eq!(lines[PROBE_PRELUDE.len() + 2], "def f(p: Literal['P1']):");
    }

    #[test]
    fn test_unused_parameter_resolves_to_any() {
        let oracle = ScriptedOracle::silent();
        let catalog = Catalog::builtin();
        let counters = NameCounters::new();
        let config = ResolverConfig::default();
        let id = PlaceholderId("P1".into());
        let src = "def f(p):\n    pass\n";
        let mut session = Session::new(
            context(&oracle, &catalog, &counters, &config),
            "f",
            String::new(),
            template(src, 7, &id),
            vec![id.clone()],
            BTreeMap::new(),
        );
        session.run().unwrap();
        let result = session.finish();
        assert_eq!(result.annotations[&id], TypeExpr::Any);
        assert!(result.decls.is_empty());
    }

    #[test]
    fn test_literal_expectation_is_the_answer() {
        let oracle = ScriptedOracle::new(|src| {
            if src.contains("p: None") {
                vec![Diagnostic::error(
                    line_of(src, "g(p)"),
                    r#"Argument 1 to "g" has incompatible type "None"; expected "Literal['r', 'w']""#,
                )]
            } else {
                Vec::new()
            }
        });
        let catalog = Catalog::builtin();
        let counters = NameCounters::new();
        let config = ResolverConfig::default();
        let id = PlaceholderId("P1".into());
        let src = "def f(p):\n    g(p)\n";
        let mut session = Session::new(
            context(&oracle, &catalog, &counters, &config),
            "f",
            String::new(),
            template(src, 7, &id),
            vec![id.clone()],
            BTreeMap::new(),
        );
        session.run().unwrap();
        assert_eq!(
            session.finish().annotations[&id],
            TypeExpr::named("Literal['r', 'w']")
        );
    }

    #[test]
    fn test_compatibility_only_gives_minimal_union() {
        let oracle = ScriptedOracle::new(|src| {
            if src.contains("p: None") {
                vec![Diagnostic::error(
                    line_of(src, "g(p)"),
                    r#"Argument 1 to "g" has incompatible type "None"; expected "int | str""#,
                )]
            } else {
                Vec::new()
            }
        });
        let catalog = Catalog::builtin();
        let counters = NameCounters::new();
        let config = ResolverConfig::default();
        let id = PlaceholderId("P1".into());
        let src = "def f(p):\n    g(p)\n";
        let mut session = Session::new(
            context(&oracle, &catalog, &counters, &config),
            "f",
            String::new(),
            template(src, 7, &id),
            vec![id.clone()],
            BTreeMap::new(),
        );
        session.run().unwrap();
        assert_eq!(
            session.finish().annotations[&id],
            TypeExpr::parse("Union[int, str]")
        );
    }

    #[test]
    fn test_endless_widening_is_an_error() {
        // Every probe reports surplus arguments for the promoted method.
        let oracle = ScriptedOracle::new(|src| {
            let mut out = Vec::new();
            if src.contains("p: None") {
                out.push(Diagnostic::error(
                    line_of(src, "p.run()"),
                    r#""None" has no attribute "run""#,
                ));
            }
            if src.contains("run: Literal['Run1']") {
                out.push(Diagnostic::error(
                    line_of(src, "p.run()"),
                    r#""Literal['Run1']" not callable"#,
                ));
            }
            if src.contains("def run(self") {
                out.push(Diagnostic::error(
                    line_of(src, "p.run()"),
                    r#"Too many arguments for "run" of "P1""#,
                ));
            }
            out
        });
        let catalog = Catalog::builtin();
        let counters = NameCounters::new();
        let config = ResolverConfig::default();
        let id = PlaceholderId("P1".into());
        let src = "def f(p):\n    p.run()\n";
        let mut session = Session::new(
            context(&oracle, &catalog, &counters, &config),
            "f",
            String::new(),
            template(src, 7, &id),
            vec![id.clone()],
            BTreeMap::new(),
        );
        let err = session.run().unwrap_err();
        assert!(matches!(err, ResolveError::WideningExceeded { .. }));
    }
}
