// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and the file-to-file pipeline.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};

use crate::assembler;
use crate::bytecode;
use crate::reporter;
use crate::translator;

pub const VERSION: &str = "1.0";

const LONG_ABOUT: &str = "Translator and assembler for the ChASM register VM.

The input is translated to CASM mnemonic text and then assembled to bytecode.
Outputs are opt-in: specify at least one of -c/--casm, -b/--bin, or -l/--list.
Filenames are optional for each output; when omitted, the input base name is
used with a .casm, .bin, or .lst extension.
Use --asm to feed CASM text directly and skip the translation stage.";

#[derive(Parser, Debug)]
#[command(
    name = "chasm",
    version = VERSION,
    about = "Translator and assembler for the ChASM register VM",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(
        short = 'i',
        long = "infile",
        value_name = "FILE",
        long_help = "Input source file, or CASM text when --asm is given."
    )]
    pub infile: PathBuf,
    #[arg(
        long = "asm",
        action = ArgAction::SetTrue,
        long_help = "Treat the input as CASM mnemonic text and skip the translation stage."
    )]
    pub asm_only: bool,
    #[arg(
        short = 'c',
        long = "casm",
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = "",
        long_help = "Emit the CASM mnemonic text. FILE is optional; when omitted, the input base is used and a .casm extension is added."
    )]
    pub casm_name: Option<String>,
    #[arg(
        short = 'b',
        long = "bin",
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = "",
        long_help = "Emit the assembled bytecode. FILE is optional; when omitted, the input base is used and a .bin extension is added."
    )]
    pub bin_name: Option<String>,
    #[arg(
        short = 'l',
        long = "list",
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = "",
        long_help = "Emit a listing of the assembled bytecode. FILE is optional; when omitted, the input base is used and a .lst extension is added."
    )]
    pub list_name: Option<String>,
}

#[derive(Debug)]
pub struct RunError {
    message: String,
}

impl RunError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RunError {}

/// Run the pipeline with command-line arguments.
pub fn run(use_color: bool) -> Result<(), RunError> {
    let cli = Cli::parse();
    run_with(&cli, use_color)
}

fn run_with(cli: &Cli, use_color: bool) -> Result<(), RunError> {
    if cli.casm_name.is_none() && cli.bin_name.is_none() && cli.list_name.is_none() {
        return Err(RunError::new(
            "No outputs requested: specify at least one of -c/--casm, -b/--bin, or -l/--list.",
        ));
    }

    let file_name = cli.infile.display().to_string();
    let source = fs::read_to_string(&cli.infile)
        .map_err(|err| RunError::new(format!("Cannot read {file_name}: {err}")))?;

    let casm = if cli.asm_only {
        source.clone()
    } else {
        translator::translate(&source).map_err(|err| {
            let lines: Vec<String> = source.lines().map(String::from).collect();
            RunError::new(reporter::format_compile_error(
                &err,
                Some(&file_name),
                Some(&lines),
                use_color,
            ))
        })?
    };

    if let Some(name) = &cli.casm_name {
        let path = resolve_output(name, &cli.infile, "casm");
        write_output(&path, casm.as_bytes())?;
    }

    if cli.bin_name.is_some() || cli.list_name.is_some() {
        let bytes = assembler::assemble(&casm).map_err(|err| {
            RunError::new(reporter::format_assemble_error(
                &err,
                Some(&file_name),
                use_color,
            ))
        })?;
        if let Some(name) = &cli.bin_name {
            let path = resolve_output(name, &cli.infile, "bin");
            write_output(&path, &bytes)?;
        }
        if let Some(name) = &cli.list_name {
            let listing = bytecode::listing(&bytes)
                .map_err(|err| RunError::new(format!("{file_name}: {err}")))?;
            let path = resolve_output(name, &cli.infile, "lst");
            write_output(&path, listing.as_bytes())?;
        }
    }

    Ok(())
}

/// Empty names fall back to the input base; explicit names get the default
/// extension only when they carry none.
fn resolve_output(name: &str, input: &Path, ext: &str) -> PathBuf {
    if name.is_empty() {
        return input.with_extension(ext);
    }
    let path = PathBuf::from(name);
    if path.extension().is_none() {
        return path.with_extension(ext);
    }
    path
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), RunError> {
    fs::write(path, bytes)
        .map_err(|err| RunError::new(format!("Cannot write {}: {err}", path.display())))
}
