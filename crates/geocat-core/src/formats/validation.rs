use std::path::Path;

use crate::error::{ImportError, Result};
use crate::formats::FormatValidation;

pub struct FormatValidator;

impl FormatValidator {
    /// Validate that a file exists and is readable
    pub fn validate_file_exists(path: &Path) -> FormatValidation {
        let mut validation = FormatValidation::default();

        if !path.exists() {
            validation.errors.push(format!("File not found: {}", path.display()));
            return validation;
        }
        if let Err(e) = std::fs::File::open(path) {
            validation.errors.push(format!("Cannot open file: {}", e));
        }

        validation
    }

    /// Validate that the sibling files of a multi-file format exist
    pub fn validate_component_files(
        primary: &Path,
        required_extensions: &[&str],
        optional_extensions: &[&str],
    ) -> FormatValidation {
        let mut validation = FormatValidation::default();

        for ext in required_extensions {
            if !component_exists(primary, ext) {
                validation.errors.push(format!(
                    "Missing required file: {}",
                    primary.with_extension(ext).display()
                ));
            }
        }

        for ext in optional_extensions {
            if !component_exists(primary, ext) {
                validation.warnings.push(format!(
                    "Optional file not found: {}",
                    primary.with_extension(ext).display()
                ));
            }
        }

        validation
    }

    /// Validate that a text file is valid UTF-8
    pub fn validate_utf8(path: &Path) -> FormatValidation {
        let mut validation = FormatValidation::default();

        if let Err(e) = std::fs::read_to_string(path) {
            validation
                .errors
                .push(format!("File is not valid UTF-8 or cannot be read: {}", e));
        }

        validation
    }

    /// Validate JSON structure by attempting to parse
    pub fn validate_json_structure(path: &Path) -> FormatValidation {
        let mut validation = FormatValidation::default();

        match std::fs::read_to_string(path) {
            Ok(content) => {
                if let Err(e) = serde_json::from_str::<serde_json::Value>(&content) {
                    validation.errors.push(format!("Invalid JSON structure: {}", e));
                }
            }
            Err(e) => {
                validation.errors.push(format!("Cannot read file: {}", e));
            }
        }

        validation
    }

    /// Merge multiple validation results
    pub fn merge_validations(validations: Vec<FormatValidation>) -> FormatValidation {
        let mut merged = FormatValidation::default();

        for validation in validations {
            merged.errors.extend(validation.errors);
            merged.warnings.extend(validation.warnings);
        }

        merged
    }

    /// Convert a validation result to a Result type
    pub fn validation_to_result(validation: &FormatValidation, format_name: &str) -> Result<()> {
        if validation.is_valid() {
            Ok(())
        } else {
            Err(ImportError::FormatError {
                format: format_name.to_string(),
                message: validation.errors.join("; "),
            })
        }
    }
}

fn component_exists(primary: &Path, ext: &str) -> bool {
    primary.with_extension(ext).exists() || primary.with_extension(ext.to_ascii_uppercase()).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_validate_file_exists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let existing = temp_dir.path().join("a.csv");
        fs::write(&existing, "x,y").unwrap();

        assert!(FormatValidator::validate_file_exists(&existing).is_valid());
        assert!(!FormatValidator::validate_file_exists(&temp_dir.path().join("missing.csv")).is_valid());
    }

    #[test]
    fn test_validate_component_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let shp = temp_dir.path().join("roads.shp");
        fs::write(&shp, b"").unwrap();
        fs::write(temp_dir.path().join("roads.SHX"), b"").unwrap();

        let validation = FormatValidator::validate_component_files(&shp, &["shx", "dbf"], &["prj"]);
        assert_eq!(validation.errors.len(), 1);
        assert!(validation.errors[0].contains("roads.dbf"));
        assert_eq!(validation.warnings.len(), 1);
    }

    #[test]
    fn test_merge_and_convert() {
        let a = FormatValidation { errors: vec!["bad header".into()], warnings: vec![] };
        let b = FormatValidation { errors: vec![], warnings: vec!["no crs".into()] };
        let merged = FormatValidator::merge_validations(vec![a, b]);
        assert!(!merged.is_valid());
        assert!(merged.has_warnings());

        let err = FormatValidator::validation_to_result(&merged, "CSV").unwrap_err();
        assert!(err.to_string().contains("bad header"));
    }
}
