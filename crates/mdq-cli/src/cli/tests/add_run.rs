//! Tests for add, run and status.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use mdq_core::JobState;
use std::path::Path;

#[test]
fn cli_parse_add() {
    match parse(&["mdq", "add", "https://example.com/a.mp3", "Music/a.mp3"]) {
        CliCommand::Add {
            source,
            destination,
            artist,
            title,
            album,
        } => {
            assert_eq!(source, "https://example.com/a.mp3");
            assert_eq!(destination, Path::new("Music/a.mp3"));
            assert!(artist.is_none() && title.is_none() && album.is_none());
        }
        _ => panic!("expected Add"),
    }
}

#[test]
fn cli_parse_add_with_hints() {
    match parse(&[
        "mdq",
        "add",
        "https://example.com/a",
        "Music/",
        "--artist",
        "Nina Simone",
        "--title",
        "Sinnerman",
    ]) {
        CliCommand::Add {
            destination,
            artist,
            title,
            album,
            ..
        } => {
            assert_eq!(destination, Path::new("Music/"));
            assert_eq!(artist.as_deref(), Some("Nina Simone"));
            assert_eq!(title.as_deref(), Some("Sinnerman"));
            assert!(album.is_none());
        }
        _ => panic!("expected Add with hints"),
    }
}

#[test]
fn cli_add_requires_destination() {
    assert!(Cli::try_parse_from(["mdq", "add", "https://example.com/a"]).is_err());
}

#[test]
fn cli_parse_run() {
    match parse(&["mdq", "run"]) {
        CliCommand::Run { max_active, watch } => {
            assert!(max_active.is_none());
            assert!(!watch);
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_options() {
    match parse(&["mdq", "run", "--max-active", "4", "--watch"]) {
        CliCommand::Run { max_active, watch } => {
            assert_eq!(max_active, Some(4));
            assert!(watch);
        }
        _ => panic!("expected Run with options"),
    }
}

#[test]
fn cli_parse_status_filter() {
    match parse(&["mdq", "status"]) {
        CliCommand::Status { state } => assert!(state.is_none()),
        _ => panic!("expected Status"),
    }
    match parse(&["mdq", "status", "--state", "paused"]) {
        CliCommand::Status { state } => assert_eq!(state, Some(JobState::Paused)),
        _ => panic!("expected Status with filter"),
    }
    assert!(Cli::try_parse_from(["mdq", "status", "--state", "sleeping"]).is_err());
}
