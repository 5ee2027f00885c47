//! The manager: owner of all compiled extractors.
//!
//! A manager holds one dictionary per extractor kind plus an `imports`
//! dictionary of child managers (file imports and nested namespaces, which
//! keep a link back to their parent). It resolves dotted names through
//! imports and parent managers, applies the lexical substitutions attached
//! to rule definitions, dispatches matching, memoizes results per token
//! sequence, and tracks document-level recorded matches for the `when`
//! coordinator.

use crate::cache::{substitution_hash, CacheOp, MatchCache};
use crate::coordinator::{Coordinator, CoordinatorExpression};
use crate::fa::{Lexicon, NfaKind, PatternRule, PhraseExtractor};
use crate::frame::{Frame, FrameExpression, FrameExtractor};
use crate::matches::Match;
use crate::regexp::RegexpExpression;
use crate::sequence::TokenSequence;
use crate::statement::{dedent, Delimiter, Region, Statement, StatementParser};
use crate::tokentest::{TermExpander, TokenTest, TokenTestExpression};
use crate::util::Log;
use crate::{ExtractorKind, MatchError, MatchResult, Requirement, Substitutions};
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

static TOKEN_TEST_IMPORT: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?s)^([cj]?)\{(.*)\}(s?i?s?)$").unwrap());

/// Names of all built-in rules, pre-registered in every manager.
pub const BUILTINS: [&str; 4] = ["ANY", "START", "END", "ROOT"];

#[derive(Clone)]
pub(crate) enum ResolvedExtractor {
    Test(Rc<TokenTest>),
    Phrase(Rc<PhraseExtractor>),
    Parse(Rc<PatternRule>),
    Coord(Rc<Coordinator>),
    Frame(Rc<FrameExtractor>),
}

#[derive(Debug, Clone)]
/// A statement that failed to parse or register, kept for diagnostics.
pub struct BrokenStatement {
    pub start: usize,
    pub end: usize,
    pub message: String,
}

/// The process-wide (but re-entrant) owner of a rule set.
pub struct Manager {
    name: RefCell<Option<String>>,
    parent: RefCell<Weak<Manager>>,
    pattern_file: RefCell<Option<PathBuf>>,
    data_dir: RefCell<Option<PathBuf>>,
    exception_on_redefinition: Cell<bool>,
    tests: RefCell<HashMap<String, Rc<TokenTest>>>,
    phrases: RefCell<HashMap<String, Rc<PhraseExtractor>>>,
    parses: RefCell<HashMap<String, Rc<PatternRule>>>,
    coords: RefCell<HashMap<String, Rc<Coordinator>>>,
    frames: RefCell<HashMap<String, Rc<FrameExtractor>>>,
    imports: RefCell<HashMap<String, Rc<Manager>>>,
    /// Original source text of every rule, for diagnostics and tooling.
    expressions: RefCell<HashMap<String, (ExtractorKind, Option<String>)>>,
    bindings: RefCell<HashMap<String, Rc<HashMap<String, String>>>>,
    cache: RefCell<MatchCache>,
    recorded: RefCell<HashMap<String, HashSet<usize>>>,
    broken: RefCell<Vec<BrokenStatement>>,
    expander: RefCell<Option<Rc<dyn TermExpander>>>,
    debug: OnceCell<Log<&'static str>>,
}

fn parse_import_name(name: &str) -> Option<(&str, &str)> {
    name.split_once('.')
}

impl Manager {
    pub fn new() -> Rc<Manager> {
        Manager::with_options(true, true)
    }

    pub fn with_options(caching: bool, exception_on_redefinition: bool) -> Rc<Manager> {
        let manager = Rc::new(Manager {
            name: RefCell::new(None),
            parent: RefCell::new(Weak::new()),
            pattern_file: RefCell::new(None),
            data_dir: RefCell::new(None),
            exception_on_redefinition: Cell::new(exception_on_redefinition),
            tests: RefCell::new(HashMap::new()),
            phrases: RefCell::new(HashMap::new()),
            parses: RefCell::new(HashMap::new()),
            coords: RefCell::new(HashMap::new()),
            frames: RefCell::new(HashMap::new()),
            imports: RefCell::new(HashMap::new()),
            expressions: RefCell::new(HashMap::new()),
            bindings: RefCell::new(HashMap::new()),
            cache: RefCell::new(MatchCache::new(caching)),
            recorded: RefCell::new(HashMap::new()),
            broken: RefCell::new(Vec::new()),
            expander: RefCell::new(None),
            debug: OnceCell::new(),
        });
        manager.install_builtins();
        manager
    }

    fn install_builtins(&self) {
        let mut phrases = self.phrases.borrow_mut();
        phrases.insert("START".to_string(), Rc::new(PhraseExtractor::SeqStart));
        phrases.insert("END".to_string(), Rc::new(PhraseExtractor::SeqEnd));
        phrases.insert("ROOT".to_string(), Rc::new(PhraseExtractor::ParseRoot));
        self.tests
            .borrow_mut()
            .insert("ANY".to_string(), Rc::new(TokenTest::Any));
        let mut expressions = self.expressions.borrow_mut();
        for name in ["START", "END", "ROOT"] {
            expressions.insert(name.to_string(), (ExtractorKind::Phrase, None));
        }
        expressions.insert("ANY".to_string(), (ExtractorKind::Test, None));
    }

    /// Create a child manager whose parent chain ends at `self`.
    fn child(self: &Rc<Self>, name: Option<String>) -> Rc<Manager> {
        let child = Manager::with_options(
            self.cache.borrow().enabled(),
            self.exception_on_redefinition.get(),
        );
        *child.name.borrow_mut() = name;
        *child.parent.borrow_mut() = Rc::downgrade(self);
        *child.data_dir.borrow_mut() = self.data_dir.borrow().clone();
        child
    }

    fn parent(&self) -> Option<Rc<Manager>> {
        self.parent.borrow().upgrade()
    }

    pub fn name(&self) -> Option<String> {
        self.name.borrow().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.borrow_mut() = Some(name.into());
    }

    /// The directory holding built-in rule data files, consulted last
    /// during import path resolution.
    pub fn set_data_dir(&self, path: impl Into<PathBuf>) {
        *self.data_dir.borrow_mut() = Some(path.into());
    }

    pub fn set_exception_on_redefinition(&self, value: bool) {
        self.exception_on_redefinition.set(value);
    }

    pub fn set_expander(&self, expander: Rc<dyn TermExpander>) {
        *self.expander.borrow_mut() = Some(expander);
    }

    pub(crate) fn expander(&self) -> Option<Rc<dyn TermExpander>> {
        if let Some(expander) = self.expander.borrow().as_ref() {
            return Some(expander.clone());
        }
        self.parent().and_then(|parent| parent.expander())
    }

    /// Set a log label to debug match dispatch based on the level of [Log].
    pub fn set_log(&self, debugger: Log<&'static str>) -> Result<(), String> {
        self.debug
            .set(debugger)
            .map_err(|err| format!("Debugger {} is already set for this manager.", err))
    }

    ///////////////////////////////////////////////////////////////////////
    // Ingesting rules
    //

    /// Parse a rule file, representing its statements as extractors (or
    /// child managers for imports).
    pub fn parse_file(self: &Rc<Self>, path: impl AsRef<Path>) -> MatchResult<()> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| MatchError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        *self.pattern_file.borrow_mut() = Some(path.to_path_buf());
        self.parse_block(&contents);
        Ok(())
    }

    /// Parse a block of rule text. A statement that fails to parse or
    /// register is recorded as broken and skipped; ingestion never aborts.
    pub fn parse_block(self: &Rc<Self>, text: &str) {
        for region in StatementParser::new(text).regions() {
            match region {
                Region::Statement(stmt) => {
                    if let Err(err) = self.register_statement(&stmt) {
                        self.broken.borrow_mut().push(BrokenStatement {
                            start: stmt.start,
                            end: stmt.end,
                            message: err.to_string(),
                        });
                    }
                }
                Region::Broken {
                    start,
                    end,
                    message,
                } => {
                    self.broken.borrow_mut().push(BrokenStatement {
                        start,
                        end,
                        message: message
                            .unwrap_or_else(|| "Unparsable statement".to_string()),
                    });
                }
                Region::Comment { .. } => {}
            }
        }
    }

    /// Statements that failed to parse or register so far.
    pub fn broken_statements(&self) -> Vec<BrokenStatement> {
        self.broken.borrow().clone()
    }

    pub(crate) fn register_statement(self: &Rc<Self>, stmt: &Statement) -> MatchResult<()> {
        match &stmt.op {
            Delimiter::Test => {
                let test = TokenTestExpression::new(self).parse(&stmt.expression)?;
                self.install(stmt, ExtractorKind::Test, |mgr, name| {
                    mgr.tests.borrow_mut().insert(name.to_string(), Rc::new(test));
                })
            }
            Delimiter::Phrase { case_insensitive } => {
                let regex = RegexpExpression::parse(&stmt.expression)?;
                let rule = PatternRule::new(NfaKind::Phrase, regex, *case_insensitive);
                self.install(stmt, ExtractorKind::Phrase, |mgr, name| {
                    mgr.phrases
                        .borrow_mut()
                        .insert(name.to_string(), Rc::new(PhraseExtractor::Pattern(rule)));
                })
            }
            Delimiter::Parse { case_insensitive } => {
                let regex = RegexpExpression::parse(&stmt.expression)?;
                let rule = PatternRule::new(NfaKind::Parse, regex, *case_insensitive);
                self.install(stmt, ExtractorKind::Parse, |mgr, name| {
                    mgr.parses.borrow_mut().insert(name.to_string(), Rc::new(rule));
                })
            }
            Delimiter::Lexicon {
                case_insensitive,
                csv_column,
            } => {
                let path = self.resolve_import_path(stmt.expression.trim())?;
                let mut lexicon = Lexicon::new(*case_insensitive);
                match csv_column {
                    Some(column) => lexicon.load_from_csv(&path, *column)?,
                    None => lexicon.load_from_text(&path)?,
                }
                self.install(stmt, ExtractorKind::Phrase, |mgr, name| {
                    mgr.phrases
                        .borrow_mut()
                        .insert(name.to_string(), Rc::new(PhraseExtractor::Lexicon(lexicon)));
                })
            }
            Delimiter::Coord => {
                let coordinator = CoordinatorExpression::parse(&stmt.expression)?;
                self.install(stmt, ExtractorKind::Coord, |mgr, name| {
                    mgr.coords
                        .borrow_mut()
                        .insert(name.to_string(), Rc::new(coordinator));
                })
            }
            Delimiter::Frame => {
                let extractor = FrameExpression::parse(&stmt.expression, self)?;
                self.install(stmt, ExtractorKind::Frame, |mgr, name| {
                    mgr.frames
                        .borrow_mut()
                        .insert(name.to_string(), Rc::new(extractor));
                })
            }
            Delimiter::Import => {
                let expr = stmt.expression.trim().to_string();
                let child = if stmt.first_line_empty && !expr.is_empty() {
                    // Indented block: a nested namespace whose rules can
                    // reference the enclosing manager's rules.
                    let child = self.child(Some(stmt.name.clone()));
                    child.parse_block(&dedent(&stmt.expression));
                    child
                } else if expr.is_empty() {
                    self.child(Some(stmt.name.clone()))
                } else if expr.contains('{') {
                    self.import_token_tests(&stmt.name, &expr)?
                } else {
                    self.import_file(&expr)?
                };
                child.set_name(stmt.name.clone());
                self.raise_if_defined(&stmt.name)?;
                self.imports.borrow_mut().insert(stmt.name.clone(), child);
                self.expressions.borrow_mut().insert(
                    stmt.name.clone(),
                    (ExtractorKind::Phrase, Some(stmt.expression.clone())),
                );
                self.store_bindings(stmt);
                Ok(())
            }
        }
    }

    fn install(
        self: &Rc<Self>,
        stmt: &Statement,
        kind: ExtractorKind,
        insert: impl FnOnce(&Rc<Manager>, &str),
    ) -> MatchResult<()> {
        self.raise_if_defined(&stmt.name)?;
        if !self.exception_on_redefinition.get() {
            self.remove_own(&stmt.name);
        }
        insert(self, &stmt.name);
        self.expressions
            .borrow_mut()
            .insert(stmt.name.clone(), (kind, Some(stmt.expression.clone())));
        self.store_bindings(stmt);
        Ok(())
    }

    fn store_bindings(&self, stmt: &Statement) {
        if !stmt.bindings.is_empty() {
            let map: HashMap<String, String> = stmt.bindings.iter().cloned().collect();
            self.bindings
                .borrow_mut()
                .insert(stmt.name.clone(), Rc::new(map));
        }
    }

    fn raise_if_defined(&self, name: &str) -> MatchResult<()> {
        if !self.exception_on_redefinition.get() {
            return Ok(());
        }
        if let Some((existing, _)) = self.lookup_own_pattern(name) {
            return Err(MatchError::Redefinition {
                name: name.to_string(),
                existing,
            });
        }
        Ok(())
    }

    /// Remove a rule from this manager's own dictionaries.
    fn remove_own(&self, name: &str) {
        self.tests.borrow_mut().remove(name);
        self.phrases.borrow_mut().remove(name);
        self.parses.borrow_mut().remove(name);
        self.coords.borrow_mut().remove(name);
        self.frames.borrow_mut().remove(name);
        self.expressions.borrow_mut().remove(name);
        self.bindings.borrow_mut().remove(name);
        self.cache.borrow_mut().purge(name);
        self.recorded.borrow_mut().remove(name);
    }

    /// Remove the named rules, keeping everything else.
    pub fn forget(&self, names: &[&str]) {
        for name in names {
            self.remove_own(name);
        }
    }

    /// Reset the rule set to only the built-in rules.
    pub fn forget_all(&self) {
        self.tests.borrow_mut().clear();
        self.phrases.borrow_mut().clear();
        self.parses.borrow_mut().clear();
        self.coords.borrow_mut().clear();
        self.frames.borrow_mut().clear();
        self.imports.borrow_mut().clear();
        self.expressions.borrow_mut().clear();
        self.bindings.borrow_mut().clear();
        self.cache.borrow_mut().clear();
        self.recorded.borrow_mut().clear();
        self.broken.borrow_mut().clear();
        self.install_builtins();
    }

    ///////////////////////////////////////////////////////////////////////
    // Imports
    //

    /// Resolve a rules or data file path: absolute, then relative to the
    /// working directory, then relative to the directory of the importing
    /// rule file, then the built-in data directory.
    pub fn resolve_import_path(&self, fname: &str) -> MatchResult<PathBuf> {
        let mut tried = Vec::new();
        let candidate = Path::new(fname);
        if candidate.is_absolute() {
            if candidate.exists() {
                return Ok(candidate.to_path_buf());
            }
            tried.push(fname.to_string());
        } else {
            if candidate.exists() {
                return Ok(candidate.to_path_buf());
            }
            tried.push(fname.to_string());
            if let Some(pattern_file) = self.pattern_file.borrow().as_ref() {
                if let Some(dir) = pattern_file.parent() {
                    let local = dir.join(fname);
                    if local.exists() {
                        return Ok(local);
                    }
                    tried.push(local.display().to_string());
                }
            }
            if let Some(data_dir) = self.data_dir.borrow().as_ref() {
                let builtin = data_dir.join(fname);
                if builtin.exists() {
                    return Ok(builtin);
                }
                tried.push(builtin.display().to_string());
            }
        }
        Err(MatchError::ImportUnresolved {
            path: fname.to_string(),
            tried,
        })
    }

    /// Ingest another rule file into a child manager.
    fn import_file(self: &Rc<Self>, fname: &str) -> MatchResult<Rc<Manager>> {
        let path = self.resolve_import_path(fname)?;
        let child = self.child(None);
        child.parse_file(path)?;
        Ok(child)
    }

    /// Import membership token tests from a word list (`{path}`), a label
    /// and cluster file pair (`c{labels;clusters}`), or a JSON object
    /// (`j{path}`). Cluster imports define one test per cluster.
    fn import_token_tests(self: &Rc<Self>, name: &str, expr: &str) -> MatchResult<Rc<Manager>> {
        let caps = TOKEN_TEST_IMPORT.captures(expr).ok_or_else(|| {
            MatchError::Syntax(crate::ParseError::new(
                0,
                format!("Unparsable token test import '{}'", expr),
            ))
        })?;
        let source = caps[1].to_string();
        let body = caps[2].to_string();
        let case_sensitive = !caps[3].contains('i');
        let stemming = caps[3].contains('s');
        let child = self.child(Some(name.to_string()));

        let normalize = |member: &str| {
            if case_sensitive {
                member.to_string()
            } else {
                member.to_lowercase()
            }
        };

        let add_test = |test_name: &str, members: HashSet<String>| {
            child.tests.borrow_mut().insert(
                test_name.to_string(),
                Rc::new(TokenTest::Membership {
                    members,
                    case_sensitive,
                    stemming,
                }),
            );
            child
                .expressions
                .borrow_mut()
                .insert(test_name.to_string(), (ExtractorKind::Test, None));
        };

        match source.as_str() {
            "c" => {
                let (label_part, cluster_part) = body.split_once(';').ok_or_else(|| {
                    MatchError::Syntax(crate::ParseError::new(
                        0,
                        format!("Cluster import '{}' needs 'labels;clusters'", expr),
                    ))
                })?;
                let labels = self.read_lines(label_part.trim())?;
                let clusters = self.read_lines(cluster_part.trim())?;
                let mut memberships: HashMap<String, HashSet<String>> = HashMap::new();
                for (label, cluster) in labels.iter().zip(clusters.iter()) {
                    memberships
                        .entry(cluster.clone())
                        .or_default()
                        .insert(normalize(label));
                }
                for (cluster, members) in memberships {
                    add_test(&cluster, members);
                }
            }
            "j" => {
                let path = self.resolve_import_path(body.trim())?;
                let contents = std::fs::read_to_string(&path).map_err(|err| MatchError::Io {
                    path: path.display().to_string(),
                    message: err.to_string(),
                })?;
                let parsed: serde_json::Value =
                    serde_json::from_str(&contents).map_err(|err| MatchError::Io {
                        path: path.display().to_string(),
                        message: err.to_string(),
                    })?;
                if let serde_json::Value::Object(clusters) = parsed {
                    for (cluster, members) in clusters {
                        let members = members
                            .as_array()
                            .map(|values| {
                                values
                                    .iter()
                                    .filter_map(|v| v.as_str())
                                    .map(|m| normalize(m))
                                    .collect()
                            })
                            .unwrap_or_default();
                        add_test(&cluster, members);
                    }
                }
            }
            _ => {
                let members = self
                    .read_lines(body.trim())?
                    .into_iter()
                    .map(|m| normalize(&m))
                    .collect();
                add_test(name, members);
            }
        }
        Ok(child)
    }

    fn read_lines(&self, fname: &str) -> MatchResult<Vec<String>> {
        let path = self.resolve_import_path(fname)?;
        let contents = std::fs::read_to_string(&path).map_err(|err| MatchError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Ok(contents
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }

    ///////////////////////////////////////////////////////////////////////
    // Introspection and name resolution
    //

    /// All rule names defined directly in this manager.
    pub fn extractor_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.expressions.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    fn lookup_own_pattern(&self, name: &str) -> Option<(ExtractorKind, Option<String>)> {
        self.expressions.borrow().get(name).cloned()
    }

    /// The kind and source expression of a rule, resolving dotted names
    /// through imports and falling back to the parent chain.
    pub fn lookup_pattern(&self, name: &str) -> Option<(ExtractorKind, Option<String>)> {
        if let Some((first, rest)) = parse_import_name(name) {
            let import = self.imports.borrow().get(first).cloned();
            if let Some(child) = import {
                if let Some(found) = child.lookup_pattern(rest) {
                    return Some(found);
                }
                return self.parent().and_then(|parent| parent.lookup_pattern(name));
            }
        }
        if let Some(found) = self.lookup_own_pattern(name) {
            return Some(found);
        }
        self.parent().and_then(|parent| parent.lookup_pattern(name))
    }

    /// True if `name` resolves to a token test in this manager or its
    /// ancestors. Consulted while compiling regexes to decide between test
    /// transitions and callouts.
    pub fn test_defined(&self, name: &str) -> bool {
        matches!(self.lookup_pattern(name), Some((ExtractorKind::Test, _)))
    }

    pub fn extractor_defined(&self, name: &str) -> bool {
        self.lookup_pattern(name).is_some()
    }

    fn lookup_own(&self, name: &str) -> Option<(ResolvedExtractor, ExtractorKind)> {
        if let Some(ext) = self.coords.borrow().get(name) {
            return Some((ResolvedExtractor::Coord(ext.clone()), ExtractorKind::Coord));
        }
        if let Some(ext) = self.phrases.borrow().get(name) {
            return Some((ResolvedExtractor::Phrase(ext.clone()), ExtractorKind::Phrase));
        }
        if let Some(ext) = self.parses.borrow().get(name) {
            return Some((ResolvedExtractor::Parse(ext.clone()), ExtractorKind::Parse));
        }
        if let Some(ext) = self.frames.borrow().get(name) {
            return Some((ResolvedExtractor::Frame(ext.clone()), ExtractorKind::Frame));
        }
        if let Some(ext) = self.tests.borrow().get(name) {
            return Some((ResolvedExtractor::Test(ext.clone()), ExtractorKind::Test));
        }
        None
    }

    /// Resolve a (possibly dotted) name to an extractor, its kind, its
    /// home manager, and the substitutions merged from the rule's bindings
    /// and the caller's (the caller wins on collision).
    pub(crate) fn lookup_extractor(
        self: &Rc<Self>,
        name: &str,
        subst: &Substitutions,
    ) -> MatchResult<Option<(ResolvedExtractor, ExtractorKind, Rc<Manager>, Substitutions)>> {
        if let Some((first, rest)) = parse_import_name(name) {
            let import = self.imports.borrow().get(first).cloned();
            if let Some(child) = import {
                if let Some(found) = child.lookup_extractor(rest, subst)? {
                    return Ok(Some(found));
                }
                if let Some(parent) = self.parent() {
                    return parent.lookup_extractor(name, subst);
                }
                return Ok(None);
            }
        }
        if let Some((ext, kind)) = self.lookup_own(name) {
            let merged = self.merge_substitutions(name, subst);
            return Ok(Some((ext, kind, self.clone(), merged)));
        }
        if let Some(parent) = self.parent() {
            return parent.lookup_extractor(name, subst);
        }
        Ok(None)
    }

    /// Apply the substitution map to a name, repeating until a fixed point
    /// is reached. A cycle guard stops self-referential maps.
    pub fn apply_substitutions(name: &str, subst: &Substitutions) -> String {
        let mut name = name.to_string();
        if let Some(map) = subst {
            let mut seen = HashSet::new();
            while let Some(next) = map.get(&name) {
                if !seen.insert(name.clone()) {
                    break;
                }
                name = next.clone();
            }
        }
        name
    }

    fn merge_substitutions(&self, rule_name: &str, incoming: &Substitutions) -> Substitutions {
        let own = self.bindings.borrow().get(rule_name).cloned();
        match (own, incoming) {
            (None, incoming) => incoming.clone(),
            (Some(own), None) => Some(own),
            (Some(own), Some(incoming)) => {
                let mut merged = (*own).clone();
                for (key, value) in incoming.iter() {
                    merged.insert(key.clone(), value.clone());
                }
                Some(Rc::new(merged))
            }
        }
    }

    fn substitute_and_lookup(
        self: &Rc<Self>,
        name: &str,
        subst: &Substitutions,
    ) -> MatchResult<(String, ResolvedExtractor, ExtractorKind, Rc<Manager>, Substitutions)> {
        let applied = Self::apply_substitutions(name, subst);
        let (ext, kind, home, merged) = self
            .lookup_extractor(&applied, subst)?
            .ok_or_else(|| MatchError::UnresolvedName(applied.clone()))?;
        Ok((applied, ext, kind, home, merged))
    }

    /// The kind of the named extractor, after substitutions.
    pub(crate) fn lookup_kind(
        self: &Rc<Self>,
        name: &str,
        subst: &Substitutions,
    ) -> MatchResult<ExtractorKind> {
        let (_, _, kind, _, _) = self.substitute_and_lookup(name, subst)?;
        Ok(kind)
    }

    pub(crate) fn lookup_test(
        self: &Rc<Self>,
        name: &str,
        subst: &Substitutions,
    ) -> MatchResult<(Rc<TokenTest>, Rc<Manager>, Substitutions)> {
        let (applied, ext, kind, home, merged) = self.substitute_and_lookup(name, subst)?;
        match ext {
            ResolvedExtractor::Test(test) => Ok((test, home, merged)),
            _ => Err(MatchError::KindMismatch {
                name: applied,
                expected: "token test",
                found: kind,
            }),
        }
    }

    pub(crate) fn lookup_frame(self: &Rc<Self>, name: &str) -> Option<Rc<FrameExtractor>> {
        match self.lookup_extractor(name, &None) {
            Ok(Some((ResolvedExtractor::Frame(frame), ..))) => Some(frame),
            _ => None,
        }
    }

    ///////////////////////////////////////////////////////////////////////
    // Running rules
    //

    /// All matches of the named rule within the bounds.
    pub fn scan(
        self: &Rc<Self>,
        name: &str,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: Option<usize>,
        subst: &Substitutions,
    ) -> MatchResult<Vec<Match>> {
        let (resolved, ext, kind, home, merged) = self.substitute_and_lookup(name, subst)?;
        let end = end.unwrap_or_else(|| seq.len());
        self.cached(CacheOp::Scan, &resolved, &ext, kind, &home, seq, start, end, &merged)
    }

    /// All matches of the named rule starting exactly at `start` and
    /// ending no later than `end`.
    pub fn matches(
        self: &Rc<Self>,
        name: &str,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: Option<usize>,
        subst: &Substitutions,
    ) -> MatchResult<Vec<Match>> {
        let (resolved, ext, kind, home, merged) = self.substitute_and_lookup(name, subst)?;
        let end = end.unwrap_or_else(|| seq.len());
        self.cached(
            CacheOp::Matches,
            &resolved,
            &ext,
            kind,
            &home,
            seq,
            start,
            end,
            &merged,
        )
    }

    /// The first match encountered within the bounds, if any.
    pub fn search(
        self: &Rc<Self>,
        name: &str,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: Option<usize>,
        subst: &Substitutions,
    ) -> MatchResult<Option<Match>> {
        Ok(self.scan(name, seq, start, end, subst)?.into_iter().next())
    }

    /// The longest match starting exactly at `start`, if any.
    pub fn match_at(
        self: &Rc<Self>,
        name: &str,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: Option<usize>,
        subst: &Substitutions,
    ) -> MatchResult<Option<Match>> {
        let mut longest: Option<Match> = None;
        for m in self.scan(name, seq, start, end, subst)? {
            if m.begin != start {
                continue;
            }
            if longest.as_ref().map_or(true, |best| m.end > best.end) {
                longest = Some(m);
            }
        }
        Ok(longest)
    }

    #[allow(clippy::too_many_arguments)]
    fn cached(
        &self,
        op: CacheOp,
        name: &str,
        ext: &ResolvedExtractor,
        kind: ExtractorKind,
        home: &Rc<Manager>,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        subst: &Substitutions,
    ) -> MatchResult<Vec<Match>> {
        let key = (
            op,
            name.to_string(),
            kind,
            start,
            end,
            substitution_hash(subst),
        );
        {
            let mut cache = self.cache.borrow_mut();
            cache.note_sequence(Rc::as_ptr(seq) as usize);
            if let Some(hit) = cache.find(&key) {
                return Ok(hit);
            }
        }
        let raw = Self::run(op, home, ext, name, seq, start, end, subst)?;
        let mut out = Vec::with_capacity(raw.len());
        for mut m in raw {
            // Defensive check against buggy extractors: never let an
            // out-of-bounds match abort a scan.
            if m.begin < start || m.end > end {
                self.log_skipped(name, &m, start, end);
                continue;
            }
            m.set_name(name);
            out.push(m);
        }
        self.cache.borrow_mut().insert(key, out.clone());
        Ok(out)
    }

    fn run(
        op: CacheOp,
        home: &Rc<Manager>,
        ext: &ResolvedExtractor,
        name: &str,
        seq: &Rc<TokenSequence>,
        start: usize,
        end: usize,
        subst: &Substitutions,
    ) -> MatchResult<Vec<Match>> {
        match ext {
            ResolvedExtractor::Test(test) => match op {
                CacheOp::Scan => test.scan(seq, start, end, home, subst),
                CacheOp::Matches => test.matches(seq, start, end, home, subst),
            },
            ResolvedExtractor::Phrase(phrase) => match op {
                CacheOp::Scan => phrase.scan(home, seq, start, end, subst, name),
                CacheOp::Matches => phrase.matches(home, seq, start, end, subst, name),
            },
            ResolvedExtractor::Parse(rule) => {
                let nfa = rule.nfa(home, name)?;
                match op {
                    CacheOp::Scan => nfa.scan(home, seq, start, end, subst),
                    CacheOp::Matches => nfa.matches(home, seq, start, end, subst),
                }
            }
            ResolvedExtractor::Coord(coordinator) => match op {
                CacheOp::Scan => coordinator.scan(home, seq, start, end, subst),
                CacheOp::Matches => coordinator.matches(home, seq, start, end, subst),
            },
            ResolvedExtractor::Frame(frame) => {
                // Scanning a frame rule yields its anchor's matches.
                match op {
                    CacheOp::Scan => home.scan(&frame.anchor, seq, start, Some(end), subst),
                    CacheOp::Matches => {
                        home.matches(&frame.anchor, seq, start, Some(end), subst)
                    }
                }
            }
        }
    }

    fn log_skipped(&self, name: &str, m: &Match, start: usize, end: usize) {
        if let Some(log) = self.debug.get() {
            if log.order() >= Log::Result(()).order() {
                println!(
                    "[{}] Dropping match ({},{}) outside limits <{},{}> for '{}'",
                    log, m.begin, m.end, start, end, name
                );
            }
        }
    }

    /// Project frames for the named frame rule over a token sequence,
    /// merging frames whose anchor matches share an extent.
    pub fn frames(
        self: &Rc<Self>,
        name: &str,
        seq: &Rc<TokenSequence>,
    ) -> MatchResult<Vec<Frame>> {
        let (applied, ext, kind, home, merged) = self.substitute_and_lookup(name, &None)?;
        let frame_extractor = match ext {
            ResolvedExtractor::Frame(frame) => frame,
            _ => {
                return Err(MatchError::KindMismatch {
                    name: applied,
                    expected: "frame",
                    found: kind,
                });
            }
        };
        let mut result: Vec<((usize, usize), Frame)> = Vec::new();
        for m in self.scan(&applied, seq, 0, None, &None)? {
            let frame = frame_extractor.extract_from_match(&home, &m, &merged)?;
            let key = m.span();
            match result.iter().position(|(k, _)| *k == key) {
                Some(at) => result[at].1.merge(frame),
                None => result.push((key, frame)),
            }
        }
        Ok(result.into_iter().map(|(_, frame)| frame).collect())
    }

    ///////////////////////////////////////////////////////////////////////
    // Document-level recording for the `when` coordinator
    //

    /// Record that the named rule matched in the given sequence.
    pub fn record(&self, name: &str, seq: &Rc<TokenSequence>) {
        self.recorded
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .insert(Rc::as_ptr(seq) as usize);
    }

    /// Whether the named rule matched in a sequence *other than* the given
    /// one since the last document boundary.
    pub fn recorded(&self, name: &str, seq: &Rc<TokenSequence>) -> bool {
        let recorded = self.recorded.borrow();
        match recorded.get(name) {
            None => false,
            Some(seqs) => {
                if seqs.contains(&(Rc::as_ptr(seq) as usize)) {
                    seqs.len() > 1
                } else {
                    !seqs.is_empty()
                }
            }
        }
    }

    /// Clear the recorded-match sets, here and in imports. Called at
    /// document boundaries.
    pub fn clear_recorded(&self) {
        self.recorded.borrow_mut().clear();
        for child in self.imports.borrow().values() {
            child.clear_recorded();
        }
    }

    /// Document hook: call before starting a new document.
    pub fn begin_document(&self) {
        self.clear_recorded();
    }

    /// Document hook: call after finishing a document.
    pub fn end_document(&self) {
        self.clear_recorded();
    }

    ///////////////////////////////////////////////////////////////////////
    // Requirements
    //

    /// The annotation layers and resources the named rule depends on,
    /// aggregated transitively.
    pub fn requirements(
        self: &Rc<Self>,
        name: &str,
        subst: &Substitutions,
    ) -> MatchResult<HashSet<Requirement>> {
        let (applied, ext, _, home, merged) = self.substitute_and_lookup(name, subst)?;
        match ext {
            ResolvedExtractor::Test(test) => test.requirements(&home, &merged),
            ResolvedExtractor::Phrase(phrase) => phrase.requirements(&home, &merged, &applied),
            ResolvedExtractor::Parse(rule) => {
                rule.nfa(&home, &applied)?.requirements(&home, &merged)
            }
            ResolvedExtractor::Coord(coordinator) => coordinator.requirements(&home, &merged),
            ResolvedExtractor::Frame(frame) => frame.requirements(&home, &merged),
        }
    }

    /// The requirements of the entire rule set, including imports.
    pub fn requirements_all(self: &Rc<Self>) -> MatchResult<HashSet<Requirement>> {
        let mut req = HashSet::new();
        let tests: Vec<Rc<TokenTest>> = self.tests.borrow().values().cloned().collect();
        for test in tests {
            req.extend(test.requirements(self, &None)?);
        }
        let parses: Vec<(String, Rc<PatternRule>)> = self
            .parses
            .borrow()
            .iter()
            .map(|(name, rule)| (name.clone(), rule.clone()))
            .collect();
        for (name, rule) in parses {
            req.extend(rule.nfa(self, &name)?.requirements(self, &None)?);
        }
        let imports: Vec<Rc<Manager>> = self.imports.borrow().values().cloned().collect();
        for child in imports {
            req.extend(child.requirements_all()?);
        }
        Ok(req)
    }
}
