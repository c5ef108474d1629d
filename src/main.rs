// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for chasm.

fn main() {
    let use_color = std::env::var("NO_COLOR").is_err();
    if let Err(err) = chasm::cli::run(use_color) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
