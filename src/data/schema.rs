use std::collections::BTreeSet;

use arrow::datatypes::Schema;

use super::model::LoadMode;
use crate::error::LoadError;

// ---------------------------------------------------------------------------
// Column allow-lists
// ---------------------------------------------------------------------------

/// Column holding the neighborhood ("bairro") of each property.
pub const NEIGHBORHOOD_COLUMN: &str = "BAIRRO";

/// Owner CPF/CNPJ, matched on digits by the owner lookup.
pub const DOCUMENT_COLUMN: &str = "DOCUMENTO PROPRIETARIO";

/// Registry id of a property; distinct values count properties.
pub const PROPERTY_ID_COLUMN: &str = "INDICE CADASTRAL";

/// Construction type (CASA, APARTAMENTO, ...).
pub const PROPERTY_TYPE_COLUMN: &str = "TIPO CONSTRUTIVO";

/// The columns the triage pages actually read, out of the ~119 in the
/// registry export. Output order follows this list.
pub const ESSENTIAL_COLUMNS: [&str; 12] = [
    "DOCUMENTO PROPRIETARIO",
    "PROPRIETARIO",
    "BAIRRO",
    "ENDERECO",
    "COMPLEMENTO ENDERECO",
    "INDICE CADASTRAL",
    "TIPO CONSTRUTIVO",
    "AREA TERRENO",
    "AREA CONSTRUCAO",
    "ANO CONSTRUCAO",
    "FRACAO IDEAL",
    "GEOMETRY",
];

/// Static mapping from load mode to the columns it materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnProjectionSpec {
    /// A fixed, ordered allow-list.
    AllowList(&'static [&'static str]),
    /// Every column of the source.
    Unprojected,
}

impl ColumnProjectionSpec {
    pub fn for_mode(mode: LoadMode) -> Self {
        match mode {
            LoadMode::Essential | LoadMode::Neighborhood => {
                ColumnProjectionSpec::AllowList(&ESSENTIAL_COLUMNS)
            }
            LoadMode::Full => ColumnProjectionSpec::Unprojected,
        }
    }

    /// Allow-listed columns absent from `schema`. Empty when compatible.
    pub fn missing_from(&self, schema: &Schema) -> Vec<String> {
        match self {
            ColumnProjectionSpec::AllowList(cols) => missing_columns(schema, cols.iter().copied()),
            ColumnProjectionSpec::Unprojected => Vec::new(),
        }
    }

    /// Fail with [`LoadError::SchemaMismatch`] if the source drifted away from
    /// the allow-list.
    pub fn validate(&self, schema: &Schema) -> Result<(), LoadError> {
        let missing = self.missing_from(schema);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LoadError::SchemaMismatch { missing })
        }
    }

    /// Resolve the ordered column list to read.
    ///
    /// * Allow-list, nothing requested → the whole allow-list.
    /// * Allow-list, columns requested → those columns in allow-list order;
    ///   asking for anything outside the list is rejected.
    /// * Unprojected, nothing requested → `None` (read everything).
    /// * Unprojected, columns requested → those columns in source order;
    ///   columns the source lacks are a schema mismatch.
    pub fn resolve(
        &self,
        schema: &Schema,
        requested: Option<&BTreeSet<String>>,
    ) -> Result<Option<Vec<String>>, LoadError> {
        match (self, requested) {
            (ColumnProjectionSpec::AllowList(cols), None) => {
                Ok(Some(cols.iter().map(|c| c.to_string()).collect()))
            }
            (ColumnProjectionSpec::AllowList(cols), Some(req)) => {
                let outside: Vec<&str> = req
                    .iter()
                    .map(String::as_str)
                    .filter(|c| !cols.iter().any(|allowed| allowed == c))
                    .collect();
                if !outside.is_empty() {
                    return Err(LoadError::InvalidRequest(format!(
                        "column(s) {} are not in the projection for this mode",
                        outside.join(", ")
                    )));
                }
                Ok(Some(
                    cols.iter()
                        .filter(|c| req.contains(**c))
                        .map(|c| c.to_string())
                        .collect(),
                ))
            }
            (ColumnProjectionSpec::Unprojected, None) => Ok(None),
            (ColumnProjectionSpec::Unprojected, Some(req)) => {
                let missing = missing_columns(schema, req.iter().map(String::as_str));
                if !missing.is_empty() {
                    return Err(LoadError::SchemaMismatch { missing });
                }
                Ok(Some(
                    schema
                        .fields()
                        .iter()
                        .map(|f| f.name().clone())
                        .filter(|name| req.contains(name))
                        .collect(),
                ))
            }
        }
    }
}

pub(crate) fn missing_columns<'a>(
    schema: &Schema,
    wanted: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    wanted
        .into_iter()
        .filter(|c| schema.index_of(c).is_err())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field};

    fn schema_of(cols: &[&str]) -> Schema {
        Schema::new(
            cols.iter()
                .map(|c| Field::new(*c, DataType::Utf8, true))
                .collect::<Vec<_>>(),
        )
    }

    fn registry_schema() -> Schema {
        let mut cols: Vec<&str> = vec!["NET VALOR", "ZONA"];
        cols.extend(ESSENTIAL_COLUMNS.iter().rev());
        schema_of(&cols)
    }

    #[test]
    fn essential_list_has_twelve_distinct_columns() {
        let distinct: BTreeSet<&str> = ESSENTIAL_COLUMNS.iter().copied().collect();
        assert_eq!(distinct.len(), 12);
        assert!(distinct.contains(NEIGHBORHOOD_COLUMN));
    }

    #[test]
    fn validate_reports_every_missing_column() {
        let schema = schema_of(&["BAIRRO", "ENDERECO"]);
        let spec = ColumnProjectionSpec::for_mode(LoadMode::Essential);
        match spec.validate(&schema) {
            Err(LoadError::SchemaMismatch { missing }) => {
                assert_eq!(missing.len(), 10);
                assert!(missing.contains(&"GEOMETRY".to_string()));
            }
            other => panic!("expected schema mismatch, got {other:?}"),
        }
        assert!(ColumnProjectionSpec::Unprojected.validate(&schema).is_ok());
    }

    #[test]
    fn allow_list_resolves_in_list_order() {
        let schema = registry_schema();
        let spec = ColumnProjectionSpec::for_mode(LoadMode::Neighborhood);
        let cols = spec.resolve(&schema, None).unwrap().unwrap();
        assert_eq!(cols, ESSENTIAL_COLUMNS.map(String::from).to_vec());

        let req: BTreeSet<String> = ["GEOMETRY", "BAIRRO"].map(String::from).into();
        let cols = spec.resolve(&schema, Some(&req)).unwrap().unwrap();
        assert_eq!(cols, vec!["BAIRRO", "GEOMETRY"]);
    }

    #[test]
    fn allow_list_rejects_columns_outside_it() {
        let schema = registry_schema();
        let spec = ColumnProjectionSpec::for_mode(LoadMode::Essential);
        let req: BTreeSet<String> = ["BAIRRO", "NET VALOR"].map(String::from).into();
        assert!(matches!(
            spec.resolve(&schema, Some(&req)),
            Err(LoadError::InvalidRequest(_))
        ));
    }

    #[test]
    fn unprojected_reads_everything_or_checks_requested() {
        let schema = registry_schema();
        let spec = ColumnProjectionSpec::for_mode(LoadMode::Full);
        assert_eq!(spec.resolve(&schema, None).unwrap(), None);

        let req: BTreeSet<String> = ["BAIRRO", "ZONA"].map(String::from).into();
        let cols = spec.resolve(&schema, Some(&req)).unwrap().unwrap();
        assert_eq!(cols, vec!["ZONA", "BAIRRO"]);

        let req: BTreeSet<String> = ["ZONA", "LATITUDE"].map(String::from).into();
        assert_eq!(
            spec.resolve(&schema, Some(&req)),
            Err(LoadError::SchemaMismatch {
                missing: vec!["LATITUDE".into()]
            })
        );
    }
}
