/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - Storage Resolver (C5)

  Maps each key variable name to a declaration slot index, by walking state
  variable declarations in file order within the primary contract's
  inheritance chain and applying simple type sizing (§4.5). Ambiguity (a
  name that cannot be pinned to a unique slot) degrades to `Ambiguous`
  rather than a hard error (§7 slot-ambiguous).
 ═══════════════════════════════════════════════════════════════════════════════
*/

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::parser::ParsedSource;
use super::ContractInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableType {
    Scalar,
    Mapping,
    Array,
    Struct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBinding {
    Resolved { slot: usize, var_type: VariableType },
    /// Not declared in the primary contract's inheritance chain, or its
    /// position could not be pinned down uniquely (§4.5, §7 slot-ambiguous).
    Ambiguous,
}

const PRIMITIVE_TYPES_PREFIXES: &[&str] = &[
    "uint", "int", "address", "bool", "bytes", "string", "fixed", "ufixed",
];

static DECL_SKIP_KEYWORDS: &[&str] = &[
    "function", "modifier", "constructor", "event", "struct", "enum", "contract",
    "interface", "library", "import", "pragma", "using", "error", "abstract",
];

static FIXED_ARRAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]\s*$").unwrap());
static CONTRACT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:abstract\s+)?contract\s+(\w+)(?:\s+is\s+([^{]+))?").unwrap());

pub struct StorageResolver;

struct RawDeclaration {
    contract: String,
    name: String,
    type_text: String,
    modifiers: Vec<String>,
}

impl StorageResolver {
    /// Resolve slots for `key_vars` against `source`, treating the last
    /// contract declared in the file as the primary (analysed) contract -
    /// the usual convention when a file declares one concrete contract plus
    /// its base contracts/interfaces above it. This is an explicit decision
    /// where §9 leaves the question open (see DESIGN.md).
    pub fn resolve(
        source: &str,
        parsed: &ParsedSource,
        key_vars: &[String],
    ) -> IndexMap<String, StorageBinding> {
        let declarations = Self::scan_declarations(source, parsed);
        let primary = match parsed.contracts.last() {
            Some(c) => c.name.clone(),
            None => String::new(),
        };
        let order = Self::linearize(&parsed.contracts, &primary);

        let mut next_slot: usize = 0;
        let mut slots: HashMap<String, (usize, VariableType)> = HashMap::new();

        for contract_name in &order {
            for decl in declarations.iter().filter(|d| &d.contract == contract_name) {
                if decl.modifiers.iter().any(|m| m == "constant" || m == "immutable") {
                    continue; // occupy no slot, per §4.5
                }
                let (var_type, width) = Self::classify(&decl.type_text);
                slots.insert(decl.name.clone(), (next_slot, var_type));
                next_slot += width;
            }
        }

        let mut result = IndexMap::new();
        for var in key_vars {
            let binding = match slots.get(var) {
                Some((slot, var_type)) => StorageBinding::Resolved {
                    slot: *slot,
                    var_type: *var_type,
                },
                None => StorageBinding::Ambiguous,
            };
            if matches!(binding, StorageBinding::Ambiguous) {
                tracing::warn!(variable = %var, "could not resolve a unique storage slot");
            }
            result.insert(var.clone(), binding);
        }
        result
    }

    fn linearize(contracts: &[ContractInfo], primary: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        Self::visit(primary, contracts, &mut order, &mut visited);
        order
    }

    fn visit(name: &str, contracts: &[ContractInfo], order: &mut Vec<String>, visited: &mut HashSet<String>) {
        if name.is_empty() || !visited.insert(name.to_string()) {
            return;
        }
        if let Some(c) = contracts.iter().find(|c| c.name == name) {
            for base in &c.bases {
                Self::visit(base, contracts, order, visited);
            }
        }
        order.push(name.to_string());
    }

    /// Classify a type string into its report tag and slot width (§4.5:
    /// scalars take 1 slot, mappings/dynamic arrays take 1 base slot, fixed
    /// arrays of length N take N slots).
    fn classify(type_text: &str) -> (VariableType, usize) {
        if type_text.starts_with("mapping") {
            return (VariableType::Mapping, 1);
        }
        if let Some(caps) = FIXED_ARRAY_RE.captures(type_text) {
            let n: usize = caps[1].parse().unwrap_or(1).max(1);
            return (VariableType::Array, n);
        }
        if type_text.ends_with("[]") {
            return (VariableType::Array, 1);
        }
        let base = type_text.trim_end_matches(|c| c == '[' || c == ']' || c.is_ascii_digit());
        let is_primitive = PRIMITIVE_TYPES_PREFIXES
            .iter()
            .any(|p| base == *p || base.starts_with(p));
        if !is_primitive && base.chars().next().is_some_and(|c| c.is_uppercase()) {
            return (VariableType::Struct, 1);
        }
        (VariableType::Scalar, 1)
    }

    fn scan_declarations(source: &str, parsed: &ParsedSource) -> Vec<RawDeclaration> {
        let lines: Vec<&str> = source.lines().collect();
        let mut declarations = Vec::new();
        let mut depth: i32 = 0;
        let mut contract_stack: Vec<(String, i32)> = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            let line_no = idx + 1;
            if let Some(caps) = CONTRACT_RE.captures(line) {
                contract_stack.push((caps[1].to_string(), depth));
            }
            let current = contract_stack.last();
            let inside_function = parsed.functions.iter().any(|f| f.contains_line(line_no));

            if let Some((contract_name, entry_depth)) = current {
                if !inside_function && depth == entry_depth + 1 {
                    if let Some((type_text, modifiers, name)) = parse_declaration(line) {
                        declarations.push(RawDeclaration {
                            contract: contract_name.clone(),
                            name,
                            type_text,
                            modifiers,
                        });
                    }
                }
            }

            depth += line.matches('{').count() as i32 - line.matches('}').count() as i32;
            while let Some(&(_, entry_depth)) = contract_stack.last() {
                if depth <= entry_depth {
                    contract_stack.pop();
                } else {
                    break;
                }
            }
        }
        declarations
    }
}

fn parse_declaration(line: &str) -> Option<(String, Vec<String>, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || !trimmed.ends_with(';') {
        return None;
    }
    let body = &trimmed[..trimmed.len() - 1];
    let body_start = body.trim_start();
    if DECL_SKIP_KEYWORDS.iter().any(|kw| body_start.starts_with(kw)) {
        return None;
    }

    let header = strip_initializer(body).trim();
    if header.is_empty() {
        return None;
    }

    if let Some(rest) = header.strip_prefix("mapping") {
        let rest_trimmed = rest.trim_start();
        if !rest_trimmed.starts_with('(') {
            return None;
        }
        let mut depth = 0i32;
        let mut end = None;
        for (i, c) in rest_trimmed.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let end = end?;
        let type_text = format!("mapping{}", &rest_trimmed[..=end]);
        let remainder: Vec<&str> = rest_trimmed[end + 1..].split_whitespace().collect();
        let name = remainder.last()?.to_string();
        let modifiers = remainder[..remainder.len().saturating_sub(1)]
            .iter()
            .map(|s| s.to_string())
            .collect();
        return Some((type_text, modifiers, name));
    }

    let parts: Vec<&str> = header.split_whitespace().collect();
    if parts.len() < 2 {
        return None;
    }
    let type_text = parts[0].to_string();
    let name = (*parts.last()?).to_string();
    let modifiers = parts[1..parts.len() - 1]
        .iter()
        .map(|s| s.to_string())
        .collect();
    Some((type_text, modifiers, name))
}

fn strip_initializer(body: &str) -> &str {
    let chars: Vec<char> = body.chars().collect();
    for i in 0..chars.len() {
        if chars[i] == '=' {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            let next = chars.get(i + 1).copied();
            if prev == Some('=')
                || next == Some('=')
                || next == Some('>')
                || prev == Some('!')
                || prev == Some('<')
                || prev == Some('>')
            {
                continue;
            }
            let byte_idx: usize = chars[..i].iter().map(|c| c.len_utf8()).sum();
            return &body[..byte_idx];
        }
    }
    body
}
