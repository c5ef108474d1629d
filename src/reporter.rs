// Reporter for translation and assembly errors with source context.

use crate::assembler::AssembleError;
use crate::translator::CompileError;

pub fn format_compile_error(
    err: &CompileError,
    file: Option<&str>,
    lines: Option<&[String]>,
    use_color: bool,
) -> String {
    if err.line == 0 {
        return format!("ERROR: {}", err.message);
    }

    let header = match file {
        Some(file) => format!("{file}:{}: ERROR", err.line),
        None => format!("{}: ERROR", err.line),
    };

    let line_idx = err.line.saturating_sub(1) as usize;
    let line_text = lines
        .and_then(|lines| lines.get(line_idx))
        .map(|s| s.as_str())
        .unwrap_or(err.snippet.as_str());

    let mut out = String::new();
    out.push_str(&header);
    out.push('\n');
    out.push_str(&format!("{:>5} | {}", err.line, line_text));
    if !err.snippet.is_empty() {
        out.push('\n');
        out.push_str(&format!("      | {}{}", err.snippet, marker(use_color)));
    }
    out.push('\n');
    out.push_str(&format!("ERROR: {}", err.message));
    out
}

pub fn format_assemble_error(
    err: &AssembleError,
    file: Option<&str>,
    use_color: bool,
) -> String {
    let marker = if use_color {
        "\x1b[31mERROR\x1b[0m"
    } else {
        "ERROR"
    };
    match file {
        Some(file) => format!("{file}: {marker}: {err}"),
        None => format!("{marker}: {err}"),
    }
}

fn marker(use_color: bool) -> &'static str {
    if use_color {
        " \x1b[31m<- HERE\x1b[0m"
    } else {
        " <- HERE"
    }
}

#[cfg(test)]
mod tests {
    use super::{format_assemble_error, format_compile_error};
    use crate::assembler::assemble;
    use crate::translator::translate;

    #[test]
    fn compile_error_shows_file_line_and_marker() {
        let err = translate("VAR a = 1\nb = 2").expect_err("must fail");
        let lines: Vec<String> = "VAR a = 1\nb = 2".lines().map(String::from).collect();
        let text = format_compile_error(&err, Some("prog.src"), Some(&lines), false);
        assert!(text.starts_with("prog.src:2: ERROR"), "{text}");
        assert!(text.contains("b = 2"), "{text}");
        assert!(text.contains("<- HERE"), "{text}");
        assert!(text.ends_with(&format!("ERROR: {}", err.message)), "{text}");
    }

    #[test]
    fn marker_is_colored_when_enabled() {
        let err = translate("b = 2").expect_err("must fail");
        let text = format_compile_error(&err, None, None, true);
        assert!(text.contains("\x1b[31m"), "{text}");
    }

    #[test]
    fn assemble_error_is_single_line() {
        let err = assemble("FOO()").expect_err("must fail");
        let text = format_assemble_error(&err, Some("prog.casm"), false);
        assert_eq!(text, format!("prog.casm: ERROR: {err}"));
    }
}
