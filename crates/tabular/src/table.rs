// Delimiter sniffing, quoted-field splitting, header detection.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Candidate delimiters, in tie-break order. Semicolon first: the dominant
/// separator in the exports this engine sees.
const DELIMITER_CANDIDATES: &[u8] = &[b';', b'\t', b','];

/// How many recognized keyword cells the first row needs before it counts
/// as a header row.
const HEADER_KEYWORD_THRESHOLD: usize = 3;

/// A decoded, split spreadsheet export.
#[derive(Debug, Clone)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
    pub delimiter: u8,
    pub has_header: bool,
}

impl Table {
    /// Sniff the delimiter, split into trimmed rows, and decide whether the
    /// first row is a header by matching it against `keywords` (column names
    /// plus canonical department names, in any casing/accenting).
    ///
    /// Empty input yields an empty table, not an error.
    pub fn parse(content: &str, keywords: &[&str]) -> Table {
        let delimiter = sniff_delimiter(content);
        let rows = split_rows(content, delimiter);
        let has_header = rows
            .first()
            .map(|first| detect_header(first, keywords))
            .unwrap_or(false);
        Table { rows, delimiter, has_header }
    }

    /// The data rows: everything after the header, or all rows when headerless.
    pub fn data_rows(&self) -> &[Vec<String>] {
        if self.has_header && !self.rows.is_empty() {
            &self.rows[1..]
        } else {
            &self.rows
        }
    }
}

/// Pick the delimiter by counting candidate occurrences on the first line.
/// Most occurrences wins; ties resolve in candidate order.
pub fn sniff_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");

    let mut best = DELIMITER_CANDIDATES[0];
    let mut best_count = 0usize;
    for &delim in DELIMITER_CANDIDATES {
        let count = first_line.bytes().filter(|&b| b == delim).count();
        if count > best_count {
            best_count = count;
            best = delim;
        }
    }
    best
}

/// Split delimited text into trimmed fields, respecting quoted fields and
/// doubled-quote escaping.
pub fn split_rows(content: &str, delimiter: u8) -> Vec<Vec<String>> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            // A malformed record (e.g. unclosed quote at EOF) ends the input
            Err(_) => break,
        };
        rows.push(record.iter().map(|f| f.trim().to_string()).collect());
    }
    rows
}

/// A first row with at least [`HEADER_KEYWORD_THRESHOLD`] recognized keyword
/// cells is a header; anything else is data and the caller falls back to a
/// fixed positional schema.
pub fn detect_header(first_row: &[String], keywords: &[&str]) -> bool {
    let known: Vec<String> = keywords.iter().map(|k| fold_name(k)).collect();
    let matches = first_row
        .iter()
        .map(|cell| fold_name(cell))
        .filter(|cell| !cell.is_empty() && known.iter().any(|k| k == cell))
        .count();
    matches >= HEADER_KEYWORD_THRESHOLD
}

/// Case-fold, strip diacritics, collapse internal whitespace.
///
/// This is the one normalization used everywhere: header matching here,
/// name-based entity resolution downstream. Pure and deterministic.
pub fn fold_name(s: &str) -> String {
    let stripped: String = s
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_semicolon() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3\n"), b';');
    }

    #[test]
    fn sniff_tab() {
        assert_eq!(sniff_delimiter("a\tb\tc\n"), b'\t');
    }

    #[test]
    fn sniff_comma() {
        assert_eq!(sniff_delimiter("a,b,c,d\n"), b',');
    }

    #[test]
    fn sniff_tie_prefers_semicolon() {
        // One of each: candidate order decides
        assert_eq!(sniff_delimiter("a;b,c\n"), b';');
    }

    #[test]
    fn sniff_empty_defaults_semicolon() {
        assert_eq!(sniff_delimiter(""), b';');
    }

    #[test]
    fn split_respects_quotes() {
        let rows = split_rows("\"Silva; Filhos\";123\nAcme;456\n", b';');
        assert_eq!(rows[0], vec!["Silva; Filhos", "123"]);
        assert_eq!(rows[1], vec!["Acme", "456"]);
    }

    #[test]
    fn split_doubled_quote_escape() {
        let rows = split_rows("\"Diz \"\"oi\"\"\";x\n", b';');
        assert_eq!(rows[0][0], "Diz \"oi\"");
    }

    #[test]
    fn split_trims_fields() {
        let rows = split_rows("  Acme  ; 123 \n", b';');
        assert_eq!(rows[0], vec!["Acme", "123"]);
    }

    #[test]
    fn split_empty_input() {
        assert!(split_rows("", b';').is_empty());
        assert!(split_rows("   \n  ", b';').is_empty());
    }

    #[test]
    fn header_detected_at_threshold() {
        let keywords = ["codigo", "razao social", "fiscal", "contabil"];
        let row: Vec<String> = vec!["Código".into(), "Razão Social".into(), "Fiscal".into()];
        assert!(detect_header(&row, &keywords));
    }

    #[test]
    fn header_not_detected_on_data() {
        let keywords = ["codigo", "razao social", "fiscal", "contabil"];
        let row: Vec<String> = vec!["1042".into(), "Acme Ltda".into(), "Ana".into()];
        assert!(!detect_header(&row, &keywords));
    }

    #[test]
    fn header_two_matches_is_not_enough() {
        let keywords = ["codigo", "razao social", "fiscal"];
        let row: Vec<String> = vec!["Código".into(), "Fiscal".into(), "Ana".into()];
        assert!(!detect_header(&row, &keywords));
    }

    #[test]
    fn fold_name_strips_accents_and_case() {
        assert_eq!(fold_name("  Contábil "), "contabil");
        assert_eq!(fold_name("SOCIETÁRIO"), "societario");
        assert_eq!(fold_name("João   da  Silva"), "joao da silva");
    }

    #[test]
    fn parse_end_to_end() {
        let content = "Código;Razão Social;Fiscal\n1042;Acme Ltda;Ana\n";
        let table = Table::parse(content, &["codigo", "razao social", "fiscal"]);
        assert_eq!(table.delimiter, b';');
        assert!(table.has_header);
        assert_eq!(table.data_rows().len(), 1);
        assert_eq!(table.data_rows()[0][0], "1042");
    }

    #[test]
    fn parse_empty_input() {
        let table = Table::parse("", &["codigo"]);
        assert!(table.rows.is_empty());
        assert!(!table.has_header);
        assert!(table.data_rows().is_empty());
    }
}
