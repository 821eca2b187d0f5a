//! Declarative schema descriptions for the supported export layouts.
//!
//! Column detection is a table of `name pattern → canonical field`,
//! evaluated once per run against the normalized header row. Department
//! columns are accepted only on an exact allow-list match; look-alike
//! variant columns are rejected and reported.

pub mod master;
pub mod matrix;

use officio_tabular::fold_name;

// ---------------------------------------------------------------------------
// Canonical fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Code,
    LegalName,
    TradeName,
    TaxId,
    StateRegistration,
    MunicipalRegistration,
    TaxRegime,
    Street,
    City,
    State,
    PostalCode,
}

/// Accepted normalized spellings for one canonical field.
pub struct ColumnSpec {
    pub field: Field,
    pub patterns: &'static [&'static str],
}

/// The master-export identity/fiscal columns. Patterns are matched against
/// `fold_name`-normalized header cells.
pub const MASTER_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { field: Field::Code, patterns: &["codigo", "cod", "cod."] },
    ColumnSpec { field: Field::LegalName, patterns: &["razao social", "razao"] },
    ColumnSpec { field: Field::TradeName, patterns: &["nome fantasia", "fantasia"] },
    ColumnSpec { field: Field::TaxId, patterns: &["cnpj", "cnpj/cpf"] },
    ColumnSpec { field: Field::StateRegistration, patterns: &["inscricao estadual", "insc. estadual", "ie"] },
    ColumnSpec { field: Field::MunicipalRegistration, patterns: &["inscricao municipal", "insc. municipal", "im"] },
    ColumnSpec { field: Field::TaxRegime, patterns: &["regime", "regime tributario"] },
    ColumnSpec { field: Field::Street, patterns: &["endereco", "logradouro"] },
    ColumnSpec { field: Field::City, patterns: &["cidade", "municipio"] },
    ColumnSpec { field: Field::State, patterns: &["uf", "estado"] },
    ColumnSpec { field: Field::PostalCode, patterns: &["cep"] },
];

/// Canonical department allow-list, normalized. A header cell becomes a
/// department column only on an exact match against one of these.
pub const DEPARTMENTS: &[&str] = &["fiscal", "contabil", "pessoal", "societario", "financeiro"];

/// Fixed positional layout of the known headerless export, mirroring
/// [`MASTER_COLUMNS`] order followed by the department columns.
pub const MASTER_POSITIONS: &[(usize, Field)] = &[
    (0, Field::Code),
    (1, Field::LegalName),
    (2, Field::TradeName),
    (3, Field::TaxId),
    (4, Field::StateRegistration),
    (5, Field::MunicipalRegistration),
    (6, Field::TaxRegime),
    (7, Field::Street),
    (8, Field::City),
    (9, Field::State),
    (10, Field::PostalCode),
];

/// Department columns in the headerless layout, keyed to [`DEPARTMENTS`].
pub const MASTER_DEPARTMENT_POSITIONS: &[(usize, &str)] = &[
    (11, "fiscal"),
    (12, "contabil"),
    (13, "pessoal"),
    (14, "societario"),
    (15, "financeiro"),
];

/// Keywords fed to header detection: every accepted column spelling plus
/// the canonical department names.
pub fn header_keywords() -> Vec<&'static str> {
    let mut keywords: Vec<&'static str> = Vec::new();
    for spec in MASTER_COLUMNS {
        keywords.extend_from_slice(spec.patterns);
    }
    keywords.extend_from_slice(DEPARTMENTS);
    keywords
}

/// Classify one normalized header cell against the department allow-list.
pub enum DepartmentMatch {
    /// Exact allow-list entry; the canonical (normalized) name.
    Accepted(&'static str),
    /// Starts with an allow-list entry but is not exactly it — a secondary
    /// or guide variant column. Rejected, never silently imported.
    RejectedVariant,
    NotADepartment,
}

pub fn classify_department_cell(cell: &str) -> DepartmentMatch {
    let normalized = fold_name(cell);
    if normalized.is_empty() {
        return DepartmentMatch::NotADepartment;
    }
    for &dept in DEPARTMENTS {
        if normalized == dept {
            return DepartmentMatch::Accepted(dept);
        }
    }
    for &dept in DEPARTMENTS {
        if normalized.starts_with(dept) {
            return DepartmentMatch::RejectedVariant;
        }
    }
    DepartmentMatch::NotADepartment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_department_accepted() {
        assert!(matches!(classify_department_cell("Fiscal"), DepartmentMatch::Accepted("fiscal")));
        assert!(matches!(
            classify_department_cell(" CONTÁBIL "),
            DepartmentMatch::Accepted("contabil")
        ));
    }

    #[test]
    fn variant_column_rejected() {
        assert!(matches!(
            classify_department_cell("Fiscal Guias"),
            DepartmentMatch::RejectedVariant
        ));
        assert!(matches!(
            classify_department_cell("Pessoal - Auxiliar"),
            DepartmentMatch::RejectedVariant
        ));
    }

    #[test]
    fn unrelated_header_ignored() {
        assert!(matches!(classify_department_cell("Código"), DepartmentMatch::NotADepartment));
        assert!(matches!(classify_department_cell(""), DepartmentMatch::NotADepartment));
    }

    #[test]
    fn keywords_cover_columns_and_departments() {
        let keywords = header_keywords();
        assert!(keywords.contains(&"codigo"));
        assert!(keywords.contains(&"razao social"));
        assert!(keywords.contains(&"fiscal"));
    }
}
