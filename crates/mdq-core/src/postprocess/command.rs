//! External command postprocessor (`[postprocess] command = [...]`).

use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::{PostprocessError, PostprocessRequest, Postprocessor};

/// Runs a configured program with placeholder substitution in its arguments:
/// `{input}`, `{output}`, `{artist}`, `{title}`, `{album}`. Missing hints
/// expand to the empty string. When no argument mentions `{output}` the
/// program is taken to work on `{input}` in place.
#[derive(Debug, Clone)]
pub struct CommandPostprocessor {
    program: String,
    args: Vec<String>,
}

impl CommandPostprocessor {
    /// Build from `[program, arg, ...]`.
    pub fn from_argv(argv: &[String]) -> Result<Self, PostprocessError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| PostprocessError::InvalidCommand("empty command".into()))?;
        if program.trim().is_empty() {
            return Err(PostprocessError::InvalidCommand("empty program".into()));
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn writes_output(&self) -> bool {
        self.args.iter().any(|a| a.contains("{output}"))
    }

    fn expand(&self, req: &PostprocessRequest<'_>) -> Vec<String> {
        let input = req.input.to_string_lossy();
        let output = req.output.to_string_lossy();
        let hint = |v: &Option<String>| v.clone().unwrap_or_default();
        let artist = hint(&req.hints.artist);
        let title = hint(&req.hints.title);
        let album = hint(&req.hints.album);
        self.args
            .iter()
            .map(|a| {
                a.replace("{input}", &input)
                    .replace("{output}", &output)
                    .replace("{artist}", &artist)
                    .replace("{title}", &title)
                    .replace("{album}", &album)
            })
            .collect()
    }
}

impl Postprocessor for CommandPostprocessor {
    fn process(&self, req: &PostprocessRequest<'_>) -> Result<PathBuf, PostprocessError> {
        let args = self.expand(req);
        tracing::debug!(program = %self.program, ?args, "running postprocess");
        let out = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| PostprocessError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !out.status.success() {
            return Err(match out.status.code() {
                Some(code) => PostprocessError::Exit {
                    program: self.program.clone(),
                    code,
                    stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
                },
                None => PostprocessError::Killed {
                    program: self.program.clone(),
                },
            });
        }

        let produced = if self.writes_output() {
            req.output
        } else {
            req.input
        };
        if !produced.is_file() {
            return Err(PostprocessError::MissingOutput(produced.to_path_buf()));
        }
        Ok(produced.to_path_buf())
    }
}
