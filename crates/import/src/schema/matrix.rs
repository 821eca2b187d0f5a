//! Multi-block matrix mapper.
//!
//! These spreadsheets put a person's name at the head of a vertical block
//! of company rows, with blocks scattered across arbitrary column pairs.
//! Header search walks column-by-column, then row-by-row within a column,
//! ignoring unrelated data that happens to share the same raw text lines
//! in far-away columns.

use std::collections::BTreeMap;
use std::collections::HashSet;

use officio_tabular::{fold_name, Table};
use regex::Regex;

use crate::model::{CompanyPatch, ParsedRow};

/// One person's block: the companies they are responsible for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixBlock {
    pub person: String,
    /// `(company name, company code)` pairs, in source order.
    pub companies: Vec<(String, String)>,
}

/// Extract all blocks from a matrix export. Duplicate blocks (same person,
/// same resulting company count) are deduplicated.
pub fn map_matrix(table: &Table) -> Vec<MatrixBlock> {
    // `name - 2`, `name – 2`, or `name 2`; the trailing integer is the
    // report's company count, which the scan does not trust
    let header_re = Regex::new(r"^(.+?)\s*(?:[-\u{2013}]\s*)?(\d+)$").unwrap();

    let max_cols = table.rows.iter().map(Vec::len).max().unwrap_or(0);
    let cell = |row: usize, col: usize| -> &str {
        table
            .rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    };

    let mut blocks: Vec<MatrixBlock> = Vec::new();
    let mut seen: HashSet<(String, usize)> = HashSet::new();

    for col in 0..max_cols {
        let mut current: Option<MatrixBlock> = None;
        for row in 0..table.rows.len() {
            let text = cell(row, col);
            if text.is_empty() {
                continue;
            }
            if let Some(person) = block_header_name(text, cell(row, col + 1), &header_re) {
                finish_block(&mut blocks, &mut seen, current.take());
                current = Some(MatrixBlock { person, companies: Vec::new() });
                continue;
            }
            if let Some(block) = current.as_mut() {
                let right = cell(row, col + 1);
                if is_bare_integer(right) {
                    block.companies.push((text.to_string(), right.to_string()));
                }
            }
        }
        finish_block(&mut blocks, &mut seen, current.take());
    }

    blocks
}

/// A cell is a block header when it fits `name [-–] integer` or
/// `name integer`, the name does not carry a company-code-like prefix
/// (single letter + dash), and the adjacent cell is NOT itself a bare
/// integer — that shape is a company row, not a header.
fn block_header_name(text: &str, right_cell: &str, header_re: &Regex) -> Option<String> {
    if is_bare_integer(right_cell) {
        return None;
    }
    let caps = header_re.captures(text)?;
    let name = caps.get(1).map(|m| m.as_str().trim())?;
    if name.is_empty() || is_bare_integer(name) {
        return None;
    }
    if looks_like_company_code(name) {
        return None;
    }
    Some(name.to_string())
}

fn finish_block(
    blocks: &mut Vec<MatrixBlock>,
    seen: &mut HashSet<(String, usize)>,
    block: Option<MatrixBlock>,
) {
    let Some(block) = block else { return };
    if block.companies.is_empty() {
        return;
    }
    let key = (fold_name(&block.person), block.companies.len());
    if seen.insert(key) {
        blocks.push(block);
    }
}

fn is_bare_integer(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// `F-1042`-style prefixes denote company codes, not person names.
fn looks_like_company_code(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b'-'
}

/// Flatten blocks into parsed rows targeting a single department. This
/// narrow variant only ever sets its target department's link — it never
/// clears other departments.
pub fn blocks_to_rows(blocks: &[MatrixBlock], department: &str) -> Vec<ParsedRow> {
    let mut rows = Vec::new();
    for block in blocks {
        for (name, code) in &block.companies {
            let mut responsibilities = BTreeMap::new();
            responsibilities.insert(department.to_string(), Some(block.person.clone()));
            rows.push(ParsedRow {
                company: CompanyPatch {
                    code: code.clone(),
                    legal_name: Some(name.clone()),
                    ..Default::default()
                },
                responsibilities,
                source_line: 0,
            });
        }
    }
    rows
}
