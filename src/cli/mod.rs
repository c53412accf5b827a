//! Command-line interface module.
//!
//! Argument definitions for the four subcommands: `capture`, `serve`,
//! `query` and `info`. Dispatch lives in `main`.

mod args;

pub use args::{Args, CaptureArgs, Command, InfoArgs, QueryArgs, QueryTypeArg, ServeArgs};
