//! # animal-match CLI
//!
//! Command-line interface for the animal matcher.
//!
//! ## Usage
//! ```bash
//! animal-match register rex_front.jpg rex_side.jpg
//! animal-match search found_dog.jpg --threshold 0.8 --output json
//! ```

mod cli;

use animal_matcher::Result;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    cli::run()
}
