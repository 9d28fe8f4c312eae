//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{DomainConfig, LogOutput, LoggingConfig, SwitchgearConfig};
use std::collections::HashSet;
use switchgear_core::QName;

/// Validates the entire configuration.
pub fn validate_config(config: &SwitchgearConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_domains_config(&config.domains)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is 'file'",
        ));
    }
    Ok(())
}

/// Validates all domain configurations.
fn validate_domains_config(domains: &[DomainConfig]) -> ConfigResult<()> {
    let mut seen = HashSet::new();

    for domain in domains {
        let name = QName::parse(&domain.name)
            .map_err(|e| ConfigError::invalid_name(&domain.name, e.to_string()))?;

        if !seen.insert(name) {
            return Err(ConfigError::DuplicateDomain(domain.name.clone()));
        }

        validate_domain_config(domain)?;
    }

    Ok(())
}

/// Validates a single domain configuration.
fn validate_domain_config(domain: &DomainConfig) -> ConfigResult<()> {
    if domain.bus.trim().is_empty() {
        return Err(ConfigError::validation(format!(
            "Domain '{}' has an empty bus provider name",
            domain.name
        )));
    }

    if domain.registry.trim().is_empty() {
        return Err(ConfigError::validation(format!(
            "Domain '{}' has an empty registry provider name",
            domain.name
        )));
    }

    if domain.properties.keys().any(|k| k.is_empty()) {
        return Err(ConfigError::validation(format!(
            "Domain '{}' has a bus property with an empty key",
            domain.name
        )));
    }

    Ok(())
}
