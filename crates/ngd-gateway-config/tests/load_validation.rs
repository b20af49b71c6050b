//! Config load validation tests for ngd-gateway-config.
// crates/ngd-gateway-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding, syntax).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;

use ngd_gateway_config::ConfigError;
use ngd_gateway_config::GatewayConfig;
use ngd_gateway_config::ServerTransport;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<GatewayConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    let path = Path::new(&long_path);
    assert_invalid(GatewayConfig::load(Some(path)), "config path exceeds max length")?;
    Ok(())
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    let path = Path::new(&long_component);
    assert_invalid(GatewayConfig::load(Some(path)), "config path component too long")?;
    Ok(())
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    let payload = vec![b'#'; 1_048_577];
    file.write_all(&payload).map_err(|err| err.to_string())?;
    assert_invalid(GatewayConfig::load(Some(file.path())), "config file exceeds size limit")?;
    Ok(())
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(GatewayConfig::load(Some(file.path())), "config file must be utf-8")?;
    Ok(())
}

#[test]
fn load_rejects_malformed_toml() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(b"[rate_limit\nmax_requests = 3").map_err(|err| err.to_string())?;
    assert_invalid(GatewayConfig::load(Some(file.path())), "config parse error")?;
    Ok(())
}

#[test]
fn load_reports_missing_file_as_io_error() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("absent.toml");
    assert_invalid(GatewayConfig::load(Some(&path)), "config io error")?;
    Ok(())
}

#[test]
fn load_accepts_empty_file_with_defaults() -> TestResult {
    let file = NamedTempFile::new().map_err(|err| err.to_string())?;
    let config = GatewayConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.server.transport != ServerTransport::Stdio {
        return Err("expected stdio transport by default".to_string());
    }
    if config.rate_limit.max_requests != 10 || config.rate_limit.window_ms != 60_000 {
        return Err("unexpected rate limit defaults".to_string());
    }
    if config.catalog.ttl_ms != 3_600_000 {
        return Err("unexpected catalog ttl default".to_string());
    }
    Ok(())
}

#[test]
fn load_reads_sections_from_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    let content = r#"
[rate_limit]
max_requests = 25
window_ms = 30000

[[rate_limit.overrides]]
client = "stdio"
max_requests = 100

[catalog]
ttl_ms = 60000

[upstream]
max_retries = 3
request_timeout_ms = 90000
"#;
    file.write_all(content.as_bytes()).map_err(|err| err.to_string())?;
    let config = GatewayConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.rate_limit.max_requests != 25 || config.rate_limit.window_ms != 30_000 {
        return Err("rate limit section not applied".to_string());
    }
    if config.rate_limit.overrides.len() != 1 || config.rate_limit.overrides[0].max_requests != 100
    {
        return Err("rate limit override not applied".to_string());
    }
    if config.catalog.ttl_ms != 60_000 {
        return Err("catalog section not applied".to_string());
    }
    if config.upstream.max_retries != 3 || config.upstream.request_timeout_ms != 90_000 {
        return Err("upstream section not applied".to_string());
    }
    Ok(())
}
