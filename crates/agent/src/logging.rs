// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logging bootstrap from the agent config.
//!
//! `RUST_LOG` overrides `log.level` when set. The returned guard must live
//! for the whole process when logging to a file; dropping it loses buffered
//! lines.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use warden_core::{AgentError, LogFormat, LogOutput, LogSection};

pub fn init_logging(log: &LogSection) -> Result<Option<WorkerGuard>, AgentError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log.level.clone()));

    match &log.output {
        LogOutput::Stderr => {
            let builder = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr);
            match log.format {
                LogFormat::Text => builder.init(),
                LogFormat::Json => builder.json().init(),
            }
            Ok(None)
        }
        LogOutput::File(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| AgentError::NotFound(path.clone()))?;
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let builder = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false);
            match log.format {
                LogFormat::Text => builder.init(),
                LogFormat::Json => builder.json().init(),
            }
            Ok(Some(guard))
        }
    }
}
