// SPDX-License-Identifier: GPL-3.0-or-later

//! This module defines the configuration of the application.
//!
//! The configuration is either loaded from a file or used with default
//! values, which are defined in the code.
//!
//! The configuration file syntax is based on the YAML format.
//! The default configuration file name is `mktrace.yml`.
//!
//! The configuration file location is searched in the following order:
//! 1. The current working directory
//! 2. The local configuration directory of the user
//! 3. The configuration directory of the user
//! 4. The local configuration directory of the application
//! 5. The configuration directory of the application
//!
//! ```yaml
//! schema: "1.0"
//!
//! make:
//!   program: /usr/bin/make
//!   makefile: build/Makefile
//!   dry_run_switches: [--dry-run, --keep-going, --print-directory]
//!   database_switches: [--print-data-base, --no-builtin-variables, --no-builtin-rules, --question]
//!   force_rebuild_switch: --always-make
//!   extra_arguments: [V=1]
//!
//! trace:
//!   log_file: build.log
//!   chunk_size: 100
//!   stall_timeout: 30
//!
//! toolchain:
//!   compilers: [my-cc]
//!   linkers: [my-ld]
//!   exclude: [cpp]
//!   gnu_standards: true
//!
//! output:
//!   cache_file: .mktrace/cache.json
//!   configuration_file: .mktrace/configuration.json
//!   trace_file: .mktrace/dryrun.log
//! ```
//!
//! Every section and every field is optional. Relative output paths are
//! resolved against the workspace root.

// Re-Export the types and the loader module content.
pub use loader::{ConfigError, Loader};
pub use types::*;
pub use validation::Validator;

mod types {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::path::PathBuf;

    /// Represents the application configuration.
    #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
    pub struct Main {
        #[serde(deserialize_with = "validate_schema_version")]
        pub schema: String,
        #[serde(default)]
        pub make: Make,
        #[serde(default)]
        pub trace: Trace,
        #[serde(default)]
        pub toolchain: Toolchain,
        #[serde(default)]
        pub output: Output,
    }

    impl Default for Main {
        fn default() -> Self {
            Self {
                schema: String::from(SUPPORTED_SCHEMA_VERSION),
                make: Make::default(),
                trace: Trace::default(),
                toolchain: Toolchain::default(),
                output: Output::default(),
            }
        }
    }

    impl fmt::Display for Main {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            writeln!(f, "Configuration:")?;
            writeln!(f, "  schema: {}", self.schema)?;
            writeln!(f, "  make program: {}", self.make.program.display())?;
            if let Some(makefile) = &self.make.makefile {
                writeln!(f, "  makefile: {}", makefile.display())?;
            }
            writeln!(f, "  dry-run switches: {}", shell_words::join(&self.make.dry_run_switches))?;
            writeln!(f, "  database switches: {}", shell_words::join(&self.make.database_switches))?;
            writeln!(f, "  force rebuild switch: {}", self.make.force_rebuild_switch)?;
            writeln!(f, "  extra arguments: {}", shell_words::join(&self.make.extra_arguments))?;
            if let Some(log_file) = &self.trace.log_file {
                writeln!(f, "  log file: {}", log_file.display())?;
            }
            writeln!(f, "  chunk size: {}", self.trace.chunk_size)?;
            writeln!(f, "  stall timeout: {}s", self.trace.stall_timeout)?;
            writeln!(f, "  additional compilers: {:?}", self.toolchain.compilers)?;
            writeln!(f, "  additional linkers: {:?}", self.toolchain.linkers)?;
            writeln!(f, "  excluded tools: {:?}", self.toolchain.exclude)?;
            writeln!(f, "  GNU standards: {}", self.toolchain.gnu_standards)?;
            writeln!(f, "  cache file: {}", self.output.cache_file.display())?;
            writeln!(f, "  configuration file: {}", self.output.configuration_file.display())?;
            write!(f, "  trace file: {}", self.output.trace_file.display())
        }
    }

    /// How the build tool is run for the dry-run and the database dump.
    #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
    #[serde(default)]
    pub struct Make {
        pub program: PathBuf,
        pub makefile: Option<PathBuf>,
        pub dry_run_switches: Vec<String>,
        pub database_switches: Vec<String>,
        pub force_rebuild_switch: String,
        pub extra_arguments: Vec<String>,
    }

    impl Default for Make {
        fn default() -> Self {
            Self {
                program: PathBuf::from("make"),
                makefile: None,
                dry_run_switches: to_strings(&["--dry-run", "--keep-going", "--print-directory"]),
                database_switches: to_strings(&[
                    "--print-data-base",
                    "--no-builtin-variables",
                    "--no-builtin-rules",
                    "--question",
                ]),
                force_rebuild_switch: String::from("--always-make"),
                extra_arguments: vec![],
            }
        }
    }

    /// Where the trace comes from, and how it is processed.
    #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
    #[serde(default)]
    pub struct Trace {
        /// A build log to read instead of running the dry-run.
        pub log_file: Option<PathBuf>,
        /// Number of lines processed between two cancellation checks.
        pub chunk_size: usize,
        /// Seconds without output before the dry-run is reported as stalled.
        pub stall_timeout: u64,
    }

    impl Default for Trace {
        fn default() -> Self {
            Self { log_file: None, chunk_size: 100, stall_timeout: 30 }
        }
    }

    /// Names of the tools to recognize beyond the built-in ones.
    #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
    #[serde(default)]
    pub struct Toolchain {
        pub compilers: Vec<String>,
        pub linkers: Vec<String>,
        pub exclude: Vec<String>,
        /// Whether the consumer understands the GNU dialects (`gnu11`, `gnu++17`).
        pub gnu_standards: bool,
    }

    impl Default for Toolchain {
        fn default() -> Self {
            Self { compilers: vec![], linkers: vec![], exclude: vec![], gnu_standards: true }
        }
    }

    #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
    #[serde(default)]
    pub struct Output {
        pub cache_file: PathBuf,
        pub configuration_file: PathBuf,
        pub trace_file: PathBuf,
    }

    impl Default for Output {
        fn default() -> Self {
            Self {
                cache_file: PathBuf::from(".mktrace/cache.json"),
                configuration_file: PathBuf::from(".mktrace/configuration.json"),
                trace_file: PathBuf::from(".mktrace/dryrun.log"),
            }
        }
    }

    pub(super) const SUPPORTED_SCHEMA_VERSION: &str = "1.0";

    fn to_strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    // Custom deserialization function to validate the schema version
    fn validate_schema_version<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let schema: String = Deserialize::deserialize(deserializer)?;
        if schema != SUPPORTED_SCHEMA_VERSION {
            use serde::de::Error;
            Err(Error::custom(format!(
                "Unsupported schema version: {schema}. Expected: {SUPPORTED_SCHEMA_VERSION}"
            )))
        } else {
            Ok(schema)
        }
    }
}

pub mod validation {

    use super::types::*;
    use thiserror::Error;

    /// Trait for validating configuration objects
    pub trait Validator<T> {
        type Error: std::error::Error;

        fn validate(config: &T) -> Result<(), Self::Error>;
    }

    /// Validation errors for configuration
    #[derive(Debug, Error)]
    pub enum ValidationError {
        #[error("Empty string value for field '{field}'")]
        EmptyString { field: String },
        #[error("Value of '{field}' must be positive")]
        NotPositive { field: &'static str },
        #[error("Duplicate {field} entry at: {idx}")]
        DuplicateEntry { field: &'static str, idx: usize },
        #[error("Multiple validation errors: {errors:?}")]
        Multiple { errors: Vec<ValidationError> },
    }

    /// Combinator for collecting and handling validation errors
    #[derive(Default)]
    struct ValidationCollector {
        errors: Vec<ValidationError>,
    }

    impl ValidationCollector {
        fn add(&mut self, error: ValidationError) {
            self.errors.push(error);
        }

        fn add_result(&mut self, result: Result<(), ValidationError>) {
            if let Err(error) = result {
                match error {
                    ValidationError::Multiple { errors } => self.errors.extend(errors),
                    single_error => self.errors.push(single_error),
                }
            }
        }

        fn check_names(&mut self, section: &'static str, names: &[String]) {
            let mut seen = std::collections::HashSet::new();
            for (idx, name) in names.iter().enumerate() {
                if name.trim().is_empty() {
                    self.add(ValidationError::EmptyString { field: format!("{section}[{idx}]") });
                } else if !seen.insert(name) {
                    self.add(ValidationError::DuplicateEntry { field: section, idx });
                }
            }
        }

        fn finish(mut self) -> Result<(), ValidationError> {
            match self.errors.len() {
                0 => Ok(()),
                1 => Err(self.errors.remove(0)),
                _ => Err(ValidationError::Multiple { errors: self.errors }),
            }
        }
    }

    impl Validator<Main> for Main {
        type Error = ValidationError;

        fn validate(config: &Main) -> Result<(), Self::Error> {
            let mut collector = ValidationCollector::default();

            collector.add_result(Make::validate(&config.make));
            collector.add_result(Trace::validate(&config.trace));
            collector.add_result(Toolchain::validate(&config.toolchain));

            collector.finish()
        }
    }

    impl Validator<Make> for Make {
        type Error = ValidationError;

        fn validate(config: &Make) -> Result<(), Self::Error> {
            let mut collector = ValidationCollector::default();

            if config.program.as_os_str().is_empty() {
                collector.add(ValidationError::EmptyString { field: String::from("make.program") });
            }
            if config.force_rebuild_switch.trim().is_empty() {
                collector.add(ValidationError::EmptyString { field: String::from("make.force_rebuild_switch") });
            }
            collector.check_names("make.dry_run_switches", &config.dry_run_switches);
            collector.check_names("make.database_switches", &config.database_switches);

            collector.finish()
        }
    }

    impl Validator<Trace> for Trace {
        type Error = ValidationError;

        fn validate(config: &Trace) -> Result<(), Self::Error> {
            let mut collector = ValidationCollector::default();

            if config.chunk_size == 0 {
                collector.add(ValidationError::NotPositive { field: "trace.chunk_size" });
            }
            if config.stall_timeout == 0 {
                collector.add(ValidationError::NotPositive { field: "trace.stall_timeout" });
            }

            collector.finish()
        }
    }

    impl Validator<Toolchain> for Toolchain {
        type Error = ValidationError;

        fn validate(config: &Toolchain) -> Result<(), Self::Error> {
            let mut collector = ValidationCollector::default();

            collector.check_names("toolchain.compilers", &config.compilers);
            collector.check_names("toolchain.linkers", &config.linkers);
            collector.check_names("toolchain.exclude", &config.exclude);

            collector.finish()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_default_is_valid() {
            assert!(Main::validate(&Main::default()).is_ok());
        }

        #[test]
        fn test_single_error() {
            let config = Trace { chunk_size: 0, ..Trace::default() };

            let result = Trace::validate(&config);

            assert!(matches!(result, Err(ValidationError::NotPositive { field: "trace.chunk_size" })));
        }

        #[test]
        fn test_multiple_errors_collected() {
            let mut config = Main::default();
            config.trace.chunk_size = 0;
            config.trace.stall_timeout = 0;
            config.toolchain.compilers = vec![String::from("my-cc"), String::from(""), String::from("my-cc")];

            match Main::validate(&config) {
                Err(ValidationError::Multiple { errors }) => {
                    assert_eq!(errors.len(), 4);
                    assert!(errors.iter().any(|error| matches!(
                        error,
                        ValidationError::DuplicateEntry { field: "toolchain.compilers", idx: 2 }
                    )));
                }
                other => panic!("Expected multiple errors, got: {:?}", other),
            }
        }

        #[test]
        fn test_empty_make_program() {
            let config = Make { program: std::path::PathBuf::new(), ..Make::default() };

            assert!(matches!(Make::validate(&config), Err(ValidationError::EmptyString { .. })));
        }
    }
}

pub mod loader {
    use super::{Main, Validator};
    use directories::{BaseDirs, ProjectDirs};
    use log::{debug, info};
    use std::path::{Path, PathBuf};
    use thiserror::Error;

    const CONFIG_FILE_NAME: &str = "mktrace.yml";

    pub struct Loader {}

    impl Loader {
        /// Loads the configuration from the specified file or the default locations.
        ///
        /// If the configuration file is specified, it will be used. Otherwise, the default locations
        /// will be searched for the configuration file. If the configuration file is not found, the
        /// default configuration will be returned.
        pub fn load(context: &crate::context::Context, filename: &Option<String>) -> Result<Main, ConfigError> {
            if let Some(path) = filename {
                return Self::from_file(Path::new(path));
            }
            for location in Self::file_locations(context) {
                debug!("Checking configuration file: {}", location.display());
                if location.exists() {
                    return Self::from_file(location.as_path());
                }
            }
            debug!("Configuration file not found. Using the default configuration.");
            Ok(Main::default())
        }

        fn file_locations(context: &crate::context::Context) -> Vec<PathBuf> {
            let mut locations = Vec::new();

            locations.push(context.current_directory.clone());
            if let Some(base_dirs) = BaseDirs::new() {
                locations.push(base_dirs.config_local_dir().to_path_buf());
                locations.push(base_dirs.config_dir().to_path_buf());
            }
            if let Some(proj_dirs) = ProjectDirs::from("com.github", "mktrace", "mktrace") {
                locations.push(proj_dirs.config_local_dir().to_path_buf());
                locations.push(proj_dirs.config_dir().to_path_buf());
            }
            locations.dedup();
            locations.iter().map(|p| p.join(CONFIG_FILE_NAME)).collect()
        }

        /// Loads the configuration from the specified file.
        pub fn from_file(path: &Path) -> Result<Main, ConfigError> {
            info!("Loading configuration file: {}", path.display());

            let content = std::fs::read_to_string(path)
                .map_err(|source| ConfigError::FileAccess { path: path.to_path_buf(), source })?;

            let config = Self::parse(&content)
                .map_err(|source| ConfigError::ParseError { path: path.to_path_buf(), source })?;

            Main::validate(&config)
                .map_err(|source| ConfigError::ValidationError { path: path.to_path_buf(), source })?;

            Ok(config)
        }

        /// Define the deserialization format of the config file.
        fn parse(content: &str) -> Result<Main, serde_saphyr::Error> {
            serde_saphyr::from_str(content)
        }
    }

    /// Represents all possible configuration-related errors.
    #[derive(Debug, Error)]
    pub enum ConfigError {
        #[error("Failed to access configuration file '{path}': {source}")]
        FileAccess {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        #[error("Failed to parse configuration from file '{path}': {source}")]
        ParseError {
            path: PathBuf,
            #[source]
            source: serde_saphyr::Error,
        },
        #[error("Configuration validation failed in '{path}': {source}")]
        ValidationError {
            path: PathBuf,
            #[source]
            source: crate::config::validation::ValidationError,
        },
    }

    #[cfg(test)]
    mod test {
        use super::super::*;
        use super::*;
        use std::fs;

        #[test]
        fn test_full_config() {
            let content = r#"
schema: "1.0"

make:
  program: /usr/bin/gmake
  makefile: build/Makefile
  dry_run_switches: [--dry-run, --print-directory]
  extra_arguments: [V=1]

trace:
  log_file: build.log
  chunk_size: 50

toolchain:
  compilers: [my-cc]
  exclude: [cpp]
  gnu_standards: false

output:
  cache_file: /tmp/cache.json
"#;

            let result = Loader::parse(content).unwrap();

            let expected = Main {
                schema: String::from("1.0"),
                make: Make {
                    program: PathBuf::from("/usr/bin/gmake"),
                    makefile: Some(PathBuf::from("build/Makefile")),
                    dry_run_switches: vec![String::from("--dry-run"), String::from("--print-directory")],
                    extra_arguments: vec![String::from("V=1")],
                    ..Make::default()
                },
                trace: Trace { log_file: Some(PathBuf::from("build.log")), chunk_size: 50, stall_timeout: 30 },
                toolchain: Toolchain {
                    compilers: vec![String::from("my-cc")],
                    linkers: vec![],
                    exclude: vec![String::from("cpp")],
                    gnu_standards: false,
                },
                output: Output { cache_file: PathBuf::from("/tmp/cache.json"), ..Output::default() },
            };

            assert_eq!(expected, result);
        }

        #[test]
        fn test_minimal_config() {
            let result = Loader::parse("schema: \"1.0\"\n").unwrap();

            assert_eq!(Main::default(), result);
        }

        #[test]
        fn test_invalid_schema_version() {
            let result = Loader::parse("schema: \"0.9\"\n");

            let message = result.unwrap_err().to_string();
            assert!(message.contains("Unsupported schema version: 0.9. Expected: 1.0"));
        }

        #[test]
        fn test_validation_error_on_invalid_config() {
            let temp_dir = tempfile::tempdir().unwrap();
            let config_file = temp_dir.path().join(CONFIG_FILE_NAME);
            fs::write(&config_file, "schema: \"1.0\"\ntrace:\n  chunk_size: 0\n").unwrap();

            let result = Loader::from_file(&config_file);

            assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
        }

        #[test]
        fn test_missing_file() {
            let result = Loader::from_file(Path::new("/surely/not/there/mktrace.yml"));

            assert!(matches!(result, Err(ConfigError::FileAccess { .. })));
        }

        #[test]
        fn test_load_from_working_directory() {
            let temp_dir = tempfile::tempdir().unwrap();
            fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "schema: \"1.0\"\nmake:\n  program: gmake\n")
                .unwrap();
            let context = crate::context::Context {
                current_directory: temp_dir.path().to_path_buf(),
                environment: Default::default(),
            };

            let result = Loader::load(&context, &None).unwrap();

            assert_eq!(result.make.program, PathBuf::from("gmake"));
        }

        #[test]
        fn test_display() {
            let output = Main::default().to_string();

            assert!(output.contains("make program: make"));
            assert!(output.contains("dry-run switches: --dry-run --keep-going --print-directory"));
        }
    }
}
