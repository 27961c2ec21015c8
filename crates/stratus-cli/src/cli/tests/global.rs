//! Tests for global flags and the local commands.

use super::{parse, parse_cli};
use crate::cli::{Cli, CliCommand, ModeArg};
use clap::Parser;
use stratus_core::LocationMode;

#[test]
fn cli_parse_defaults() {
    let cli = parse_cli(&["stratus", "config"]);
    assert!(cli.primary.is_none());
    assert!(cli.secondary.is_none());
    assert!(cli.mode.is_none());
    assert!(cli.max_time.is_none());
    assert!(!cli.verbose);
    assert!(matches!(cli.command, CliCommand::Config));
}

#[test]
fn cli_parse_global_flags_after_subcommand() {
    let cli = parse_cli(&[
        "stratus",
        "get",
        "c/b",
        "--primary",
        "http://127.0.0.1:10000/acct",
        "--secondary",
        "http://127.0.0.1:10001/acct",
        "--mode",
        "primary-then-secondary",
        "--max-time",
        "30",
        "-v",
    ]);
    assert_eq!(cli.primary.as_deref(), Some("http://127.0.0.1:10000/acct"));
    assert_eq!(cli.secondary.as_deref(), Some("http://127.0.0.1:10001/acct"));
    assert_eq!(cli.mode, Some(ModeArg::PrimaryThenSecondary));
    assert_eq!(cli.max_time, Some(30));
    assert!(cli.verbose);
}

#[test]
fn cli_parse_mode_values() {
    for (arg, mode) in [
        ("primary-only", LocationMode::PrimaryOnly),
        ("primary-then-secondary", LocationMode::PrimaryThenSecondary),
        ("secondary-only", LocationMode::SecondaryOnly),
        ("secondary-then-primary", LocationMode::SecondaryThenPrimary),
    ] {
        let cli = parse_cli(&["stratus", "--mode", arg, "config"]);
        assert_eq!(cli.mode.map(LocationMode::from), Some(mode));
    }
    assert!(Cli::try_parse_from(["stratus", "--mode", "nearest", "config"]).is_err());
}

#[test]
fn cli_parse_md5() {
    match parse(&["stratus", "md5", "/tmp/file.bin"]) {
        CliCommand::Md5 { file } => assert_eq!(file, std::path::Path::new("/tmp/file.bin")),
        _ => panic!("expected Md5"),
    }
}

#[test]
fn cli_rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["stratus", "sync"]).is_err());
}
