// crates/ngd-gateway-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and serve overrides.
// Purpose: Ensure command-line overrides land in config and are re-validated.
// Dependencies: ngd-gateway-cli main helpers
// ============================================================================

//! ## Overview
//! Parses argument vectors with `try_parse_from` and checks the resulting
//! overrides and config summaries.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use clap::Parser;
use ngd_gateway_config::GatewayConfig;
use ngd_gateway_config::SecretString;
use ngd_gateway_config::ServerTransport;

use super::Cli;
use super::Commands;
use super::ConfigCommand;
use super::ServeCommand;
use super::TransportArg;
use super::apply_serve_overrides;
use super::config_summary;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn parse_serve(args: &[&str]) -> ServeCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    match cli.command {
        Some(Commands::Serve(command)) => command,
        other => panic!("expected serve command, got {other:?}"),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn serve_parses_transport_and_bind() {
    let command =
        parse_serve(&["ngd-gateway", "serve", "--transport", "http", "--bind", "127.0.0.1:8787"]);
    assert_eq!(command.transport, Some(TransportArg::Http));
    assert_eq!(command.bind.as_deref(), Some("127.0.0.1:8787"));
    assert!(command.config.is_none());
}

#[test]
fn serve_rejects_unknown_transport() {
    assert!(Cli::try_parse_from(["ngd-gateway", "serve", "--transport", "sse"]).is_err());
}

#[test]
fn config_check_parses_path() {
    let cli =
        Cli::try_parse_from(["ngd-gateway", "config", "check", "--config", "gw.toml"]).unwrap();
    let Some(Commands::Config {
        command: ConfigCommand::Check(command),
    }) = cli.command
    else {
        panic!("expected config check");
    };
    assert_eq!(command.config.unwrap().to_string_lossy(), "gw.toml");
}

#[test]
fn overrides_switch_to_http_and_revalidate() {
    let mut config = GatewayConfig::default();
    let command =
        parse_serve(&["ngd-gateway", "serve", "--transport", "http", "--bind", "127.0.0.1:8787"]);
    apply_serve_overrides(&mut config, &command);
    assert_eq!(config.server.transport, ServerTransport::Http);
    assert_eq!(config.server.bind.as_deref(), Some("127.0.0.1:8787"));
    assert!(config.validate().is_ok());
}

#[test]
fn overrides_cannot_open_a_public_bind_without_auth() {
    let mut config = GatewayConfig::default();
    let command =
        parse_serve(&["ngd-gateway", "serve", "--transport", "http", "--bind", "0.0.0.0:8787"]);
    apply_serve_overrides(&mut config, &command);
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("non-loopback bind"));
}

#[test]
fn absent_overrides_leave_config_untouched() {
    let mut config = GatewayConfig::default();
    let command = parse_serve(&["ngd-gateway", "serve"]);
    apply_serve_overrides(&mut config, &command);
    assert_eq!(config.server.transport, ServerTransport::Stdio);
    assert!(config.server.bind.is_none());
}

#[test]
fn summary_never_prints_the_upstream_key() {
    let mut config = GatewayConfig::default();
    config.upstream.api_key = Some(SecretString::new("very-secret-key"));
    let summary = config_summary(&config);
    assert!(summary.starts_with("config ok: transport=stdio"));
    assert!(summary.contains("upstream_key=set"));
    assert!(!summary.contains("very-secret-key"));
}
