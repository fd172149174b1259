use super::*;
use anyhow::{anyhow, Result};

/// Validate the complete configuration
pub fn validate_config(config: &OwnerConfig) -> Result<()> {
    if config.output_dir.as_os_str().is_empty() {
        return Err(anyhow!("Output directory must not be empty"));
    }

    validate_timeouts(&config.timeouts)?;
    validate_monitor_defaults(&config.monitor)?;
    Ok(())
}

fn validate_timeouts(timeouts: &Timeouts) -> Result<()> {
    let named = [
        ("wait_for_socket", timeouts.wait_for_socket),
        ("wait_for_file", timeouts.wait_for_file),
        ("wait_for_signal", timeouts.wait_for_signal),
        ("wait_for_process_stop", timeouts.wait_for_process_stop),
        ("wait_for_process", timeouts.wait_for_process),
    ];
    for (name, value) in named {
        if value.is_zero() {
            return Err(anyhow!("Timeout {} must be greater than 0", name));
        }
    }
    Ok(())
}

fn validate_monitor_defaults(monitor: &MonitorDefaults) -> Result<()> {
    if monitor.interval.is_zero() {
        return Err(anyhow!("Monitor interval must be greater than 0"));
    }

    if monitor.num_processors == Some(0) {
        return Err(anyhow!("Monitor num_processors must be at least 1"));
    }

    if monitor.delimiter.is_empty() {
        return Err(anyhow!("Monitor delimiter must not be empty"));
    }

    Ok(())
}
