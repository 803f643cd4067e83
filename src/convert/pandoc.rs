//! pandoc-backed [`Converter`].

use std::path::{Path, PathBuf};

use super::{ConvertError, Converter, Document, OutputFormat};
use crate::config::{MathMode, RenderConfig};
use crate::error::PipelineError;
use crate::utils::exec::{Cmd, FilterRule};

/// pandoc chatter that carries no information for the previewer.
const PANDOC_FILTER: FilterRule = FilterRule::new(&["[WARNING] Could not convert TeX math"]);

/// pandoc invocation settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct Pandoc {
    program: PathBuf,
    math: MathMode,
    reader: String,
    citeproc: Vec<String>,
}

impl Pandoc {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            program: config.pandoc.clone(),
            math: config.math,
            reader: config.reader.clone(),
            citeproc: config.citeproc.clone(),
        }
    }

    /// Fail fast when the converter binary cannot be found.
    pub fn ensure_available(&self) -> Result<PathBuf, PipelineError> {
        which::which(&self.program).map_err(|e| {
            PipelineError::Startup(format!(
                "converter `{}` not found: {e}",
                self.program.display()
            ))
        })
    }

    fn run(&self, args: &[&str], base_dir: &Path, stdin: &str) -> Result<String, ConvertError> {
        let output = Cmd::new(&self.program)
            .args(args)
            .arg(self.math.flag())
            .cwd(base_dir)
            .stdin(stdin)
            .filter(&PANDOC_FILTER)
            .run()?;
        Ok(String::from_utf8(output.stdout)?)
    }
}

impl Converter for Pandoc {
    fn to_document(&self, content: &str, base_dir: &Path) -> Result<Document, ConvertError> {
        let json = self.run(&["--from", &self.reader, "--to", "json"], base_dir, content)?;
        Ok(Document::from_json(&json)?)
    }

    fn to_html(
        &self,
        fragment: &str,
        base_dir: &Path,
        format: OutputFormat,
        standalone: bool,
    ) -> Result<String, ConvertError> {
        let format_args = format.args();
        let mut args: Vec<&str> = vec!["--from", "json"];
        args.extend(format_args.iter().map(String::as_str));
        if standalone {
            args.push("--standalone");
        }
        self.run(&args, base_dir, fragment)
    }

    fn to_bibliography(&self, digest: &str, base_dir: &Path) -> Result<String, ConvertError> {
        let mut args: Vec<&str> = vec!["--from", "json", "--to", "html5"];
        args.extend(self.citeproc.iter().map(String::as_str));
        self.run(&args, base_dir, digest)
    }
}
