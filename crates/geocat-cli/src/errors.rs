use console::style;
use geocat_core::ImportError;
use std::fmt;

/// Enhanced error type with suggestions
pub struct CliError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
    pub help_command: Option<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
            help_command: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, command: impl Into<String>) -> Self {
        self.help_command = Some(command.into());
        self
    }

    pub fn display(&self) {
        eprintln!("{} {}\n", style("✗").red().bold(), style(&self.message).red().bold());

        if let Some(ref context) = self.context {
            eprintln!("{}", context);
            eprintln!();
        }

        if !self.suggestions.is_empty() {
            eprintln!("{}", style("To fix this:").yellow().bold());
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, suggestion);
            }
            eprintln!();
        }

        if let Some(ref help_cmd) = self.help_command {
            eprintln!("{} {}", style("Need help?").cyan(), style(help_cmd).cyan().bold());
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn workspace_not_found() -> CliError {
    let current_dir = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    CliError::new("Not in a GeoCat workspace")
        .with_context(format!(
            "You're not in a GeoCat workspace directory.\n\nCurrent directory: {}\nLooking for: .geocat directory",
            current_dir
        ))
        .with_suggestion("Initialize a workspace: geocat init")
        .with_suggestion("Or navigate to an existing workspace")
        .with_help("Run: geocat init --help")
}

pub fn workspace_exists(path: &str) -> CliError {
    CliError::new("Workspace already exists")
        .with_context(format!("A .geocat directory already exists.\n\nPath: {}", path))
        .with_suggestion("Use --force to rewrite config.toml (catalog and history are kept)")
        .with_help("Run: geocat init --help")
}

pub fn catalog_workspace_not_found(name: &str) -> CliError {
    CliError::new(format!("Catalog workspace '{}' not found", name))
        .with_suggestion(format!("Create it: geocat workspace add {}", name))
        .with_suggestion("List existing workspaces: geocat workspace list")
        .with_help("Run: geocat import --help")
}

pub fn store_not_found(workspace: &str, name: &str) -> CliError {
    CliError::new(format!("Store '{}' not found in workspace '{}'", name, workspace))
        .with_suggestion(format!("Register it: geocat store add {} --database {} --workspace {}", name, name, workspace))
        .with_suggestion(format!("List stores: geocat store list --workspace {}", workspace))
        .with_help("Run: geocat store --help")
}

pub fn source_not_found(location: &str) -> CliError {
    CliError::new("Source not found")
        .with_context(format!("Nothing exists at the given location.\n\nSource: {}", location))
        .with_suggestion("Check the path and try again")
        .with_suggestion("Use --database for database URLs")
        .with_help("Run: geocat import --help")
}

pub fn invalid_srs(code: &str, reason: &str) -> CliError {
    CliError::new(format!("Invalid coordinate reference system: {}", code))
        .with_context(format!("Reason: {}", reason))
        .with_suggestion("Use an EPSG code, e.g. --srs EPSG:4326")
        .with_help("Run: geocat import --help")
}

pub fn invalid_config(key: &str, reason: &str) -> CliError {
    CliError::new(format!("Invalid configuration: {}", key))
        .with_context(format!("Configuration value is invalid.\n\nReason: {}", reason))
        .with_suggestion("Check .geocat/config.toml for syntax errors")
        .with_suggestion("Or reinitialize: geocat init --force")
        .with_help("Run: geocat config")
}

/// Map importer errors to presentable errors with suggestions
pub fn from_import(error: ImportError) -> CliError {
    match &error {
        ImportError::WorkspaceNotFound { name } => catalog_workspace_not_found(name),
        ImportError::StoreNotFound { workspace, name } => store_not_found(workspace, name),
        ImportError::SourceNotFound { path } => source_not_found(&path.display().to_string()),
        ImportError::InvalidTarget { .. } => CliError::new(error.to_string())
            .with_suggestion("Import into a tabular store, or omit --store to register the data in place")
            .with_help("Run: geocat store list"),
        ImportError::DatabaseUnavailable { .. } => CliError::new(error.to_string())
            .with_suggestion("Databases live in .geocat/databases; create one with geocat store add")
            .with_help("Run: geocat store --help"),
        ImportError::Download { .. } | ImportError::Archive { .. } => CliError::new(error.to_string())
            .with_suggestion("Check the archive locator and that the file is a valid zip archive"),
        ImportError::EmptySource { .. } => CliError::new(error.to_string())
            .with_suggestion("Run: geocat formats to see which files can be imported"),
        _ => CliError::new(error.to_string()),
    }
}

/// Convert anyhow::Error to CliError with context
pub fn from_anyhow(error: anyhow::Error) -> CliError {
    let error = match error.downcast::<ImportError>() {
        Ok(import_error) => return from_import(import_error),
        Err(other) => other,
    };
    let message = format!("{:#}", error);

    if message.contains("No such file or directory") {
        CliError::new("File not found")
            .with_context(format!("Error: {}", message))
            .with_suggestion("Check the file path and try again")
    } else if message.to_ascii_lowercase().contains("permission denied") {
        CliError::new("Permission denied")
            .with_context(format!("Error: {}", message))
            .with_suggestion("Check file permissions")
            .with_suggestion("Or run with appropriate privileges")
    } else {
        CliError::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_import_errors_get_suggestions() {
        let err = from_import(ImportError::StoreNotFound {
            workspace: "topp".to_string(),
            name: "gis".to_string(),
        });
        assert_eq!(err.message, "Store 'gis' not found in workspace 'topp'");
        assert_eq!(err.suggestions.len(), 2);

        let err = from_anyhow(anyhow::Error::new(ImportError::SourceNotFound {
            path: PathBuf::from("/nope/data.shp"),
        }));
        assert_eq!(err.message, "Source not found");
        assert!(err.context.unwrap().contains("/nope/data.shp"));
    }

    #[test]
    fn test_plain_errors_pass_through() {
        let err = from_anyhow(anyhow::anyhow!("something odd"));
        assert_eq!(err.message, "something odd");
        assert!(err.suggestions.is_empty());
    }
}
