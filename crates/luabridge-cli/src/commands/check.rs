//! `luabridge check` — compile files without running them.

use std::path::PathBuf;

use anyhow::Context;
use luabridge_engine::{Bridge, StateOptions};

use crate::output::{resolve_color_choice, StyledOutput};

pub fn execute(files: Vec<PathBuf>, color: Option<&str>) -> anyhow::Result<()> {
    let mut out = StyledOutput::new(resolve_color_choice(color));
    let bridge = Bridge::new();
    let state = bridge.new_state(&StateOptions::default().with_open_libs(false))?;

    let mut failed = 0;
    for file in &files {
        let source = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let name = file.display().to_string();

        match state.check_named(&source, &name) {
            Ok(()) => {
                out.pass_badge();
                out.plain(&format!(" {}", name));
                out.newline();
            }
            Err(e) => {
                failed += 1;
                out.fail_badge();
                out.plain(&format!(" {}", name));
                out.newline();
                out.dim(&format!("    {}", e));
                out.newline();
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} file(s) failed to compile", failed, files.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lua_file(src: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".lua").tempfile().unwrap();
        write!(file, "{}", src).unwrap();
        file
    }

    #[test]
    fn test_check_passes_valid_files() {
        let a = lua_file("return 1");
        let b = lua_file("local t = {1, 2, 3}\nreturn #t");
        let files = vec![a.path().to_path_buf(), b.path().to_path_buf()];
        assert!(execute(files, Some("never")).is_ok());
    }

    #[test]
    fn test_check_reports_failures() {
        let good = lua_file("return 1");
        let bad = lua_file("return +");
        let files = vec![good.path().to_path_buf(), bad.path().to_path_buf()];

        let err = execute(files, Some("never")).unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 file(s) failed to compile");
    }

    #[test]
    fn test_check_missing_file() {
        let files = vec![PathBuf::from("/nonexistent/missing.lua")];
        assert!(execute(files, Some("never")).is_err());
    }
}
