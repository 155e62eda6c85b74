/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Source Parser (C4)

  Line-oriented scanner over the contract source text. Deliberately not a
  grammar-based parser (§9 "Source-parser fragility") - a full parser could
  replace this without changing any downstream contract, as long as the
  Function/Usage shapes below match §4.4 exactly.
 ═══════════════════════════════════════════════════════════════════════════════
*/

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    External,
    Internal,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Default,
    View,
    Pure,
    Constant,
    Payable,
}

impl Mutability {
    pub fn is_view_or_pure(&self) -> bool {
        matches!(self, Mutability::View | Mutability::Pure | Mutability::Constant)
    }
}

#[derive(Debug, Clone)]
pub struct ContractInfo {
    pub name: String,
    pub bases: Vec<String>,
    /// Order this contract was declared in the file; used by the storage
    /// resolver to find "the most-derived contract" (§4.5).
    pub declaration_order: usize,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub contract: String,
    pub start_line: usize,
    pub end_line: usize,
    pub visibility: Visibility,
    pub mutability: Mutability,
    pub modifiers: Vec<String>,
    pub is_constructor: bool,
    pub is_fallback_or_receive: bool,
    pub is_modifier: bool,
    pub has_access_control: bool,
    /// Body contains a `require`/`assert`/`if`/`while` statement anywhere,
    /// not just adjacent to a particular usage line (§4.8 `has_source_guard`
    /// clause "function body contains a require/assert/if statement").
    pub has_condition: bool,
}

impl Function {
    pub fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageKind {
    Read,
    Write,
    Declaration,
}

#[derive(Debug, Clone)]
pub struct Usage {
    pub variable: String,
    pub line: usize,
    pub kind: UsageKind,
    /// `None` for a contract-scope declaration.
    pub function_name: Option<String>,
    pub contract: String,
    pub source_has_condition: bool,
    pub code: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedSource {
    pub contracts: Vec<ContractInfo>,
    pub functions: Vec<Function>,
    pub usages: Vec<Usage>,
}

impl ParsedSource {
    pub fn function_at(&self, line: usize) -> Option<&Function> {
        // A line can only belong to one function in well-formed source;
        // prefer the innermost (latest-declared, i.e. last match) in the
        // unlikely event ranges overlap due to parser fidelity limits.
        self.functions.iter().rev().find(|f| f.contains_line(line))
    }
}

static CONTRACT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:abstract\s+)?contract\s+(\w+)(?:\s+is\s+([^{]+))?").unwrap());
static CONSTRUCTOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*constructor\s*\(").unwrap());
static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*function\s*(\w*)\s*\(").unwrap());
static MODIFIER_DEF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*modifier\s+(\w+)\s*\(").unwrap());
static FALLBACK_RECEIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(fallback|receive)\s*\(").unwrap());
static RETURNS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"returns\s*\([^)]*\)").unwrap());
static ACCESS_MODIFIER_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(only|is|require|restricted|auth)").unwrap());
static CALLER_CHECK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"require\s*\(\s*msg\.sender\s*==|require\s*\([^)]*==\s*msg\.sender|msg\.sender\s*==\s*owner|owner\s*==\s*msg\.sender",
    )
    .unwrap()
});
static CONDITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(require|assert|if|while)\s*\(").unwrap());

const VISIBILITY_KEYWORDS: &[&str] = &["public", "external", "internal", "private"];
const MUTABILITY_KEYWORDS: &[&str] = &["view", "pure", "constant", "payable"];
const IGNORED_TAIL_KEYWORDS: &[&str] = &["virtual", "override", "returns"];

pub struct SourceParser;

impl SourceParser {
    /// Parse source text, returning contracts, functions, and Usages for
    /// each of `key_vars` (§4.4).
    pub fn parse(source: &str, key_vars: &[String]) -> ParsedSource {
        let lines: Vec<&str> = source.lines().collect();

        let contracts = Self::scan_contracts(&lines);
        let functions = Self::scan_functions(&lines, &contracts);
        let usages = Self::scan_usages(&lines, &functions, &contracts, key_vars);

        tracing::debug!(
            contract_count = contracts.len(),
            function_count = functions.len(),
            usage_count = usages.len(),
            "parsed source"
        );

        ParsedSource {
            contracts,
            functions,
            usages,
        }
    }

    fn scan_contracts(lines: &[&str]) -> Vec<ContractInfo> {
        let mut contracts = Vec::new();
        for line in lines {
            if let Some(caps) = CONTRACT_RE.captures(line) {
                let name = caps[1].to_string();
                let bases = caps
                    .get(2)
                    .map(|m| {
                        m.as_str()
                            .split(',')
                            .map(|b| {
                                b.trim()
                                    .split('(')
                                    .next()
                                    .unwrap_or("")
                                    .trim()
                                    .to_string()
                            })
                            .filter(|b| !b.is_empty())
                            .collect()
                    })
                    .unwrap_or_default();
                let declaration_order = contracts.len();
                contracts.push(ContractInfo {
                    name,
                    bases,
                    declaration_order,
                });
            }
        }
        contracts
    }

    fn scan_functions(lines: &[&str], contracts: &[ContractInfo]) -> Vec<Function> {
        let mut functions = Vec::new();
        let mut contract_stack: Vec<(String, i32)> = Vec::new();
        let mut depth: i32 = 0;

        let mut idx = 0usize;
        while idx < lines.len() {
            let line = lines[idx];

            if let Some(caps) = CONTRACT_RE.captures(line) {
                contract_stack.push((caps[1].to_string(), depth));
            }

            let current_contract = contract_stack
                .last()
                .map(|(n, _)| n.clone())
                .unwrap_or_default();

            let header_kind = Self::classify_header(line);
            if let Some(kind) = header_kind {
                if let Some(func) =
                    Self::parse_function(lines, idx, &kind, &current_contract, contracts)
                {
                    idx = func.end_line; // end_line is 1-indexed; resume after it
                    functions.push(func);
                    continue;
                }
            }

            depth += brace_delta(line);
            while let Some(&(_, entry_depth)) = contract_stack.last() {
                if depth <= entry_depth {
                    contract_stack.pop();
                } else {
                    break;
                }
            }
            idx += 1;
        }

        functions
    }

    fn classify_header(line: &str) -> Option<HeaderKind> {
        if CONSTRUCTOR_RE.is_match(line) {
            return Some(HeaderKind::Constructor);
        }
        if let Some(caps) = MODIFIER_DEF_RE.captures(line) {
            return Some(HeaderKind::Modifier(caps[1].to_string()));
        }
        if let Some(caps) = FALLBACK_RECEIVE_RE.captures(line) {
            return Some(HeaderKind::FallbackReceive(caps[1].to_string()));
        }
        if let Some(caps) = FUNCTION_RE.captures(line) {
            return Some(HeaderKind::Function(caps[1].to_string()));
        }
        None
    }

    /// Parses one function/modifier/constructor/fallback declaration
    /// starting at `start_idx`, accumulating header lines until the opening
    /// brace, then counting braces until the body closes. Returns `None` for
    /// a declaration with no body (interface stub, ends in `;`).
    fn parse_function(
        lines: &[&str],
        start_idx: usize,
        kind: &HeaderKind,
        current_contract: &str,
        contracts: &[ContractInfo],
    ) -> Option<Function> {
        let mut header = String::new();
        let mut scan_idx = start_idx;
        let mut brace_open_idx = None;

        loop {
            let line = lines.get(scan_idx)?;
            header.push_str(line);
            header.push(' ');
            if line.contains('{') {
                brace_open_idx = Some(scan_idx);
                break;
            }
            if line.trim_end().ends_with(';') {
                // Declaration-only (interface/abstract): no body to analyse.
                return None;
            }
            scan_idx += 1;
            if scan_idx >= lines.len() {
                return None;
            }
        }
        let body_start_idx = brace_open_idx.unwrap();

        // Relative brace depth with the body's own opening brace as 1; the
        // body closes on the line where this returns to 0 (§4.4 "nested
        // braces are counted to find a function's end").
        let mut rel_depth = 1 + brace_delta_after_first_brace(lines[body_start_idx]);
        let mut end_idx = body_start_idx;
        let mut scan = body_start_idx + 1;
        while rel_depth > 0 && scan < lines.len() {
            rel_depth += brace_delta(lines[scan]);
            end_idx = scan;
            scan += 1;
        }

        let tail = extract_tail(&header);
        let modifiers = extract_modifiers(&tail);
        let visibility = extract_visibility(&tail);
        let mutability = extract_mutability(&tail);

        let (name, is_fallback, is_modifier, is_ctor_keyword) = match kind {
            HeaderKind::Constructor => ("constructor".to_string(), false, false, true),
            HeaderKind::Modifier(n) => (n.clone(), false, true, false),
            HeaderKind::FallbackReceive(n) => (n.clone(), true, false, false),
            HeaderKind::Function(n) => (n.clone(), n.is_empty(), false, false),
        };

        let is_legacy_ctor = !is_ctor_keyword
            && contracts.iter().any(|c| c.name == name && !name.is_empty())
            && name == current_contract;

        let body_text: String = lines[start_idx..=end_idx].join("\n");
        let has_access_control = modifiers
            .iter()
            .any(|m| ACCESS_MODIFIER_NAME_RE.is_match(m))
            || CALLER_CHECK_RE.is_match(&body_text);
        let has_condition = CONDITION_RE.is_match(&body_text);

        Some(Function {
            name,
            contract: current_contract.to_string(),
            start_line: start_idx + 1,
            end_line: end_idx + 1,
            visibility,
            mutability,
            modifiers,
            is_constructor: is_ctor_keyword || is_legacy_ctor,
            is_fallback_or_receive: is_fallback,
            is_modifier,
            has_access_control,
            has_condition,
        })
    }

    fn scan_usages(
        lines: &[&str],
        functions: &[Function],
        contracts: &[ContractInfo],
        key_vars: &[String],
    ) -> Vec<Usage> {
        let mut usages = Vec::new();
        // Fallback when no enclosing function claims the line (e.g. a
        // top-level state-variable reference): `ContractInfo` doesn't carry
        // a line range, so this can only fall back to the last-declared
        // contract, not resolve per-line. Good enough since nothing reads
        // `Usage.contract` downstream (§9).
        let fallback_contract_name = || -> String { contracts.last().map(|c| c.name.clone()).unwrap_or_default() };

        for var in key_vars {
            let word_re = Regex::new(&format!(r"\b{}\b", regex::escape(var))).unwrap();
            for (idx, line) in lines.iter().enumerate() {
                let line_no = idx + 1;
                if !word_re.is_match(line) {
                    continue;
                }
                let func = functions.iter().find(|f| f.contains_line(line_no));
                let is_declaration = func.is_none() && looks_like_declaration(line, var);

                let kind = if is_declaration {
                    UsageKind::Declaration
                } else if is_write(line, var, &word_re) {
                    UsageKind::Write
                } else {
                    UsageKind::Read
                };

                let window_has_condition = [idx.checked_sub(1), Some(idx), Some(idx + 1)]
                    .into_iter()
                    .flatten()
                    .filter_map(|i| lines.get(i))
                    .any(|l| CONDITION_RE.is_match(l));

                let contract = func.map(|f| f.contract.clone()).unwrap_or_else(fallback_contract_name);

                usages.push(Usage {
                    variable: var.clone(),
                    line: line_no,
                    kind,
                    function_name: func.map(|f| f.name.clone()),
                    contract,
                    source_has_condition: window_has_condition,
                    code: line.trim().to_string(),
                });
            }
        }
        usages
    }
}

enum HeaderKind {
    Constructor,
    Modifier(String),
    FallbackReceive(String),
    Function(String),
}

fn brace_delta(line: &str) -> i32 {
    line.matches('{').count() as i32 - line.matches('}').count() as i32
}

fn brace_delta_after_first_brace(line: &str) -> i32 {
    match line.find('{') {
        Some(pos) => brace_delta(&line[pos + 1..]),
        None => 0,
    }
}

/// Extracts the text between a function header's parameter-closing paren and
/// its opening brace: the visibility/mutability/modifier tail.
fn extract_tail(header: &str) -> String {
    let open_paren = match header.find('(') {
        Some(p) => p,
        None => return String::new(),
    };
    let mut depth = 0i32;
    let mut close_paren = None;
    for (i, ch) in header[open_paren..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    close_paren = Some(open_paren + i);
                    break;
                }
            }
            _ => {}
        }
    }
    let close_paren = match close_paren {
        Some(p) => p,
        None => return String::new(),
    };
    let brace = header.find('{').unwrap_or(header.len());
    if close_paren + 1 >= brace {
        return String::new();
    }
    let raw_tail = &header[close_paren + 1..brace];
    RETURNS_RE.replace_all(raw_tail, " ").to_string()
}

/// Tokenizes the tail at paren-depth 0, skipping modifier-invocation
/// arguments, and keeps only tokens that are not visibility/mutability
/// keywords (§4.4 modifier-name list).
fn extract_modifiers(tail: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in tail.chars() {
        match ch {
            '(' => {
                depth += 1;
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            ')' => {
                depth -= 1;
            }
            c if c.is_alphanumeric() || c == '_' => {
                if depth == 0 {
                    current.push(c);
                }
            }
            _ => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
        .into_iter()
        .filter(|t| {
            !VISIBILITY_KEYWORDS.contains(&t.as_str())
                && !MUTABILITY_KEYWORDS.contains(&t.as_str())
                && !IGNORED_TAIL_KEYWORDS.contains(&t.as_str())
        })
        .collect()
}

fn extract_visibility(tail: &str) -> Visibility {
    if tail.contains("external") {
        Visibility::External
    } else if tail.contains("private") {
        Visibility::Private
    } else if tail.contains("internal") {
        Visibility::Internal
    } else {
        // Solidity's default for free functions is internal, but for
        // contract member functions lacking an explicit keyword it is
        // `public`; this detector only deals with contract members.
        Visibility::Public
    }
}

fn extract_mutability(tail: &str) -> Mutability {
    if tail.contains("payable") {
        Mutability::Payable
    } else if tail.contains("pure") {
        Mutability::Pure
    } else if tail.contains("view") {
        Mutability::View
    } else if tail.contains("constant") {
        Mutability::Constant
    } else {
        Mutability::Default
    }
}

fn looks_like_declaration(line: &str, var: &str) -> bool {
    static DECL_RE_CACHE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^\s*(mapping\s*\(.*\)|[\w\[\]<>\.]+)\s+((public|private|internal|constant|immutable)\s+)*")
            .unwrap()
    });
    let trimmed = line.trim_start();
    if !DECL_RE_CACHE.is_match(line) {
        return false;
    }
    let name_re = Regex::new(&format!(r"\b{}\s*(=|;)", regex::escape(var))).unwrap();
    name_re.is_match(trimmed) && !trimmed.starts_with("function") && !trimmed.starts_with("return")
}

fn is_write(line: &str, var: &str, word_re: &Regex) -> bool {
    const COMPOUND_OPS: &[&str] = &["+=", "-=", "*=", "/=", "%=", "|=", "&=", "^=", "<<=", ">>="];
    for m in word_re.find_iter(line) {
        let after = line[m.end()..].trim_start();
        if COMPOUND_OPS.iter().any(|op| after.starts_with(op)) {
            return true;
        }
        if let Some(rest) = after.strip_prefix('=') {
            if !rest.starts_with('=') {
                // Make sure we're not looking at the RHS of `==` (preceding
                // char already excluded by strip_prefix consuming one `=`);
                // also exclude `!=`, `<=`, `>=` by checking the char right
                // before the match is not one of those comparison heads.
                let before = line[..m.start()].trim_end();
                if !before.ends_with('!') && !before.ends_with('<') && !before.ends_with('>') {
                    return true;
                }
            }
        }
    }
    false
}
