//! The statement parser: splits rule text into regions.
//!
//! A statement is introduced by a flush-left line of the form
//! `NAME DELIM [bindings] RHS` and continues on indented lines until a
//! blank line, a comment line, or the next flush-left statement. Comment
//! lines start with `#`. A `name <-` statement with no right-hand side on
//! its first line introduces a nested namespace populated by the indented
//! statements that follow.

use once_cell::sync::Lazy;

static STATEMENT_START: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"^(\w+)\s*(i?->|L[ic0-9]*->|:|<-|~|\^|\$)\s*(.*)$").unwrap());
static BINDINGS_PREFIX: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"^\[([^\]]*)\]\s*(.*)$").unwrap());
static BINDING_PAIR: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(\w+)\s*=\s*([\w.]+)").unwrap());
static CSV_FLAG: Lazy<regex::Regex> = Lazy::new(|| regex::Regex::new(r"c(\d*)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
/// The delimiter of a rule definition, with its parsed option flags.
pub enum Delimiter {
    /// `:`
    Test,
    /// `->`, or `i->` for case-insensitive matching.
    Phrase { case_insensitive: bool },
    /// `^`
    Parse { case_insensitive: bool },
    /// `L...->`: lexicon import, optionally case-insensitive (`i`) and CSV
    /// with a target column (`c<digits>`).
    Lexicon {
        case_insensitive: bool,
        csv_column: Option<usize>,
    },
    /// `~`
    Coord,
    /// `$`
    Frame,
    /// `<-`
    Import,
}

#[derive(Debug, Clone)]
/// One parsed statement, with its offsets into the source text.
pub struct Statement {
    pub start: usize,
    pub end: usize,
    pub name: String,
    pub op: Delimiter,
    pub bindings: Vec<(String, String)>,
    /// The right-hand side, including raw continuation lines.
    pub expression: String,
    /// Whether the statement line itself had an empty right-hand side
    /// (the nested-namespace import form).
    pub first_line_empty: bool,
}

impl Statement {
    /// Construct the extractor this statement describes and install it
    /// into the manager, raising on redefinition unless the manager allows
    /// it.
    pub fn register(&self, manager: &std::rc::Rc<crate::Manager>) -> crate::MatchResult<()> {
        manager.register_statement(self)
    }
}

#[derive(Debug, Clone)]
/// One region of a rule file.
pub enum Region {
    Comment {
        start: usize,
        end: usize,
    },
    Broken {
        start: usize,
        end: usize,
        message: Option<String>,
    },
    Statement(Statement),
}

impl Region {
    pub fn offsets(&self) -> (usize, usize) {
        match self {
            Region::Comment { start, end } => (*start, *end),
            Region::Broken { start, end, .. } => (*start, *end),
            Region::Statement(stmt) => (stmt.start, stmt.end),
        }
    }

    /// Construct the extractor this region describes and install it into
    /// the manager. Comment and broken regions register nothing.
    pub fn register(&self, manager: &std::rc::Rc<crate::Manager>) -> crate::MatchResult<()> {
        match self {
            Region::Statement(stmt) => stmt.register(manager),
            _ => Ok(()),
        }
    }
}

struct PendingStatement {
    start: usize,
    end: usize,
    name: String,
    op: Delimiter,
    bindings: Vec<(String, String)>,
    first_rhs: String,
    continuation: Vec<String>,
}

impl PendingStatement {
    fn into_region(self) -> Region {
        let first_line_empty = self.first_rhs.trim().is_empty();
        let mut pieces = Vec::new();
        if !first_line_empty {
            pieces.push(self.first_rhs.clone());
        }
        pieces.extend(self.continuation.iter().cloned());
        Region::Statement(Statement {
            start: self.start,
            end: self.end,
            name: self.name,
            op: self.op,
            bindings: self.bindings,
            expression: pieces.join("\n"),
            first_line_empty,
        })
    }
}

fn parse_delimiter(op: &str) -> Delimiter {
    match op {
        ":" => Delimiter::Test,
        "->" => Delimiter::Phrase {
            case_insensitive: false,
        },
        "i->" => Delimiter::Phrase {
            case_insensitive: true,
        },
        "^" => Delimiter::Parse {
            case_insensitive: false,
        },
        "~" => Delimiter::Coord,
        "$" => Delimiter::Frame,
        "<-" => Delimiter::Import,
        _ => {
            // Lexicon form, L with option characters.
            let case_insensitive = op.contains('i');
            let csv_column = CSV_FLAG.captures(op).map(|caps| {
                if caps[1].is_empty() {
                    0
                } else {
                    caps[1].parse().unwrap()
                }
            });
            Delimiter::Lexicon {
                case_insensitive,
                csv_column,
            }
        }
    }
}

/// Strip the common indentation of a nested namespace body so it can be
/// re-parsed as flush-left statements.
pub fn dedent(block: &str) -> String {
    let indent = block
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    block
        .lines()
        .map(|line| line.get(indent..).unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits rule text into an ordered list of regions.
pub struct StatementParser<'t> {
    text: &'t str,
}

impl<'t> StatementParser<'t> {
    pub fn new(text: &'t str) -> Self {
        Self { text }
    }

    pub fn regions(&self) -> Vec<Region> {
        let mut regions = Vec::new();
        let mut pending: Option<PendingStatement> = None;
        let mut offset = 0usize;

        for line in self.text.split('\n') {
            let llen = line.len();
            let trimmed = line.trim_end();
            let tlen = trimmed.len();

            if trimmed.starts_with('#') {
                if let Some(stmt) = pending.take() {
                    regions.push(stmt.into_region());
                }
                regions.push(Region::Comment {
                    start: offset,
                    end: offset + tlen,
                });
            } else if trimmed.is_empty() {
                if let Some(stmt) = pending.take() {
                    regions.push(stmt.into_region());
                }
            } else if line.starts_with(char::is_whitespace) {
                match pending.as_mut() {
                    Some(stmt) => {
                        stmt.continuation.push(trimmed.to_string());
                        stmt.end = offset + tlen;
                    }
                    None => regions.push(Region::Broken {
                        start: offset,
                        end: offset + tlen,
                        message: None,
                    }),
                }
            } else {
                if let Some(stmt) = pending.take() {
                    regions.push(stmt.into_region());
                }
                match STATEMENT_START.captures(trimmed) {
                    Some(caps) => {
                        let name = caps[1].to_string();
                        let op = parse_delimiter(&caps[2]);
                        let rhs = caps[3].to_string();
                        let (bindings, rhs) = match BINDINGS_PREFIX.captures(&rhs) {
                            Some(bcaps) => {
                                let pairs = BINDING_PAIR
                                    .captures_iter(&bcaps[1])
                                    .map(|p| (p[1].to_string(), p[2].to_string()))
                                    .collect();
                                (pairs, bcaps[2].to_string())
                            }
                            None => (Vec::new(), rhs),
                        };
                        pending = Some(PendingStatement {
                            start: offset,
                            end: offset + tlen,
                            name,
                            op,
                            bindings,
                            first_rhs: rhs,
                            continuation: Vec::new(),
                        });
                    }
                    None => regions.push(Region::Broken {
                        start: offset,
                        end: offset + tlen,
                        message: None,
                    }),
                }
            }

            offset += llen + 1;
        }

        if let Some(stmt) = pending.take() {
            regions.push(stmt.into_region());
        }
        regions
    }

    /// Just the interpretable statements.
    pub fn statements(&self) -> Vec<Statement> {
        self.regions()
            .into_iter()
            .filter_map(|region| match region {
                Region::Statement(stmt) => Some(stmt),
                _ => None,
            })
            .collect()
    }
}
