//! Master-record mapper: one logical row per company, identity/fiscal
//! columns plus department columns located by header match — or by the
//! fixed positional table when the export has no header row.

use std::collections::BTreeMap;

use officio_tabular::{fold_name, Table};

use super::{
    classify_department_cell, DepartmentMatch, Field, MASTER_COLUMNS,
    MASTER_DEPARTMENT_POSITIONS, MASTER_POSITIONS,
};
use crate::error::ImportError;
use crate::model::{CompanyPatch, ParsedRow};

/// Where each canonical field and department column sits in this export.
#[derive(Debug)]
pub struct MasterLayout {
    fields: Vec<(Field, usize)>,
    departments: Vec<(&'static str, usize)>,
    rejected: Vec<String>,
}

/// Output of the master mapper.
#[derive(Debug)]
pub struct MasterMapping {
    pub rows: Vec<ParsedRow>,
    /// Header cells that looked like a department column but were rejected
    /// as secondary/guide variants, verbatim as they appeared.
    pub rejected_columns: Vec<String>,
    /// Data rows dropped for having no business code.
    pub skipped_rows: usize,
}

/// Map a decoded table into parsed rows.
///
/// A mapped department column that is present but empty on a row produces
/// an explicit `None` entry — the writer clears that link. Columns rejected
/// as variants never reach the rows at all.
pub fn map_master(table: &Table) -> Result<MasterMapping, ImportError> {
    if table.rows.is_empty() {
        return Err(ImportError::Parse("empty input: no rows to import".into()));
    }

    let layout = if table.has_header {
        layout_from_header(&table.rows[0])
    } else {
        positional_layout()
    };

    if !layout.fields.iter().any(|(f, _)| *f == Field::Code) {
        return Err(ImportError::Parse("no company-code column in input".into()));
    }

    let header_offset = if table.has_header { 1 } else { 0 };
    let mut rows = Vec::new();
    let mut skipped_rows = 0usize;

    for (i, cells) in table.data_rows().iter().enumerate() {
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        let get = |idx: usize| cells.get(idx).map(String::as_str).unwrap_or("");

        let mut patch = CompanyPatch::default();
        for &(field, idx) in &layout.fields {
            let value = get(idx);
            if value.is_empty() {
                continue;
            }
            let value = Some(value.to_string());
            match field {
                Field::Code => patch.code = value.unwrap(),
                Field::LegalName => patch.legal_name = value,
                Field::TradeName => patch.trade_name = value,
                Field::TaxId => patch.tax_id = value,
                Field::StateRegistration => patch.state_registration = value,
                Field::MunicipalRegistration => patch.municipal_registration = value,
                Field::TaxRegime => patch.tax_regime = value,
                Field::Street => patch.street = value,
                Field::City => patch.city = value,
                Field::State => patch.state = value,
                Field::PostalCode => patch.postal_code = value,
            }
        }

        if patch.code.is_empty() {
            skipped_rows += 1;
            continue;
        }

        let mut responsibilities = BTreeMap::new();
        for &(dept, idx) in &layout.departments {
            let value = get(idx);
            if value.is_empty() {
                // Column mapped but empty: known to have no responsible
                responsibilities.insert(dept.to_string(), None);
            } else {
                responsibilities.insert(dept.to_string(), Some(value.to_string()));
            }
        }

        rows.push(ParsedRow {
            company: patch,
            responsibilities,
            source_line: header_offset + i + 1,
        });
    }

    Ok(MasterMapping {
        rows,
        rejected_columns: layout.rejected,
        skipped_rows,
    })
}

fn layout_from_header(header: &[String]) -> MasterLayout {
    let mut fields = Vec::new();
    let mut departments = Vec::new();
    let mut rejected = Vec::new();

    for (idx, cell) in header.iter().enumerate() {
        let normalized = fold_name(cell);
        if let Some(spec) = MASTER_COLUMNS
            .iter()
            .find(|s| s.patterns.iter().any(|p| *p == normalized))
        {
            if !fields.iter().any(|(f, _)| *f == spec.field) {
                fields.push((spec.field, idx));
            }
            continue;
        }
        match classify_department_cell(cell) {
            DepartmentMatch::Accepted(dept) => {
                if !departments.iter().any(|(d, _)| *d == dept) {
                    departments.push((dept, idx));
                }
            }
            DepartmentMatch::RejectedVariant => rejected.push(cell.clone()),
            DepartmentMatch::NotADepartment => {}
        }
    }

    MasterLayout { fields, departments, rejected }
}

fn positional_layout() -> MasterLayout {
    MasterLayout {
        fields: MASTER_POSITIONS.iter().map(|&(idx, f)| (f, idx)).collect(),
        departments: MASTER_DEPARTMENT_POSITIONS
            .iter()
            .map(|&(idx, d)| (d, idx))
            .collect(),
        rejected: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::header_keywords;

    fn parse(content: &str) -> Table {
        Table::parse(content, &header_keywords())
    }

    #[test]
    fn headered_export_maps_fields_and_departments() {
        let table = parse(
            "Código;Razão Social;CNPJ;Fiscal;Contábil\n\
             1042;Acme Ltda;12.345.678/0001-90;Ana Souza;Rui Costa\n",
        );
        let mapping = map_master(&table).unwrap();
        assert_eq!(mapping.rows.len(), 1);
        let row = &mapping.rows[0];
        assert_eq!(row.company.code, "1042");
        assert_eq!(row.company.legal_name.as_deref(), Some("Acme Ltda"));
        assert_eq!(row.responsibilities["fiscal"], Some("Ana Souza".to_string()));
        assert_eq!(row.responsibilities["contabil"], Some("Rui Costa".to_string()));
        assert!(mapping.rejected_columns.is_empty());
    }

    #[test]
    fn variant_column_rejected_and_recorded() {
        let table = parse(
            "Código;Razão Social;Fiscal;Fiscal Guias\n\
             1042;Acme Ltda;ANA;X\n",
        );
        let mapping = map_master(&table).unwrap();
        assert_eq!(mapping.rejected_columns, vec!["Fiscal Guias".to_string()]);
        let row = &mapping.rows[0];
        // Only the exact Fiscal column made it into the row
        assert_eq!(row.responsibilities.len(), 1);
        assert_eq!(row.responsibilities["fiscal"], Some("ANA".to_string()));
    }

    #[test]
    fn empty_mapped_department_cell_is_explicit_clear() {
        let table = parse(
            "Código;Razão Social;Fiscal;Pessoal\n\
             1042;Acme Ltda;Ana Souza;\n",
        );
        let mapping = map_master(&table).unwrap();
        let row = &mapping.rows[0];
        assert_eq!(row.responsibilities["fiscal"], Some("Ana Souza".to_string()));
        assert_eq!(row.responsibilities["pessoal"], None);
    }

    #[test]
    fn headerless_export_uses_positional_layout() {
        // 11 identity fields then fiscal;contabil;pessoal;societario;financeiro
        let table = parse(
            "1042;Acme Ltda;Acme;12.345.678/0001-90;SR;MR;simples;Rua A;Campinas;SP;13000-000;Ana Souza;Rui Costa;;;\n",
        );
        assert!(!table.has_header);
        let mapping = map_master(&table).unwrap();
        let row = &mapping.rows[0];
        assert_eq!(row.company.code, "1042");
        assert_eq!(row.company.postal_code.as_deref(), Some("13000-000"));
        assert_eq!(row.responsibilities["fiscal"], Some("Ana Souza".to_string()));
        assert_eq!(row.responsibilities["contabil"], Some("Rui Costa".to_string()));
        assert_eq!(row.responsibilities["pessoal"], None);
    }

    #[test]
    fn rows_without_code_are_skipped() {
        let table = parse(
            "Código;Razão Social;Fiscal\n\
             1042;Acme Ltda;Ana\n\
             ;Orfã Ltda;Rui\n",
        );
        let mapping = map_master(&table).unwrap();
        assert_eq!(mapping.rows.len(), 1);
        assert_eq!(mapping.skipped_rows, 1);
    }

    #[test]
    fn empty_input_is_parse_error() {
        let table = parse("");
        assert!(matches!(map_master(&table), Err(ImportError::Parse(_))));
    }

    #[test]
    fn source_line_points_into_file() {
        let table = parse(
            "Código;Razão Social;Fiscal\n\
             1042;Acme;Ana\n\
             2301;Beta;Rui\n",
        );
        let mapping = map_master(&table).unwrap();
        assert_eq!(mapping.rows[0].source_line, 2);
        assert_eq!(mapping.rows[1].source_line, 3);
    }
}
