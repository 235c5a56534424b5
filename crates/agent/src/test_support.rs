// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for agent crate tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use warden_core::EngineSection;

use crate::supervisor::EngineSupervisor;

/// Fake engine honoring the real CLI contract: `version` prints a banner;
/// `run -test -c <file>` rejects configs containing the word "invalid";
/// `run -c <file>` sleeps until signalled.
pub const FAKE_ENGINE: &str = r#"#!/bin/sh
if [ "$1" = "version" ]; then
  echo "FakeEngine 1.0.0 (spec-test)"
  exit 0
fi
config=""
test_mode=0
while [ $# -gt 0 ]; do
  case "$1" in
    -test) test_mode=1 ;;
    -c) shift; config="$1" ;;
  esac
  shift
done
if [ "$test_mode" = 1 ]; then
  if grep -q invalid "$config" 2>/dev/null; then
    echo "config rejected: invalid directive" >&2
    exit 1
  fi
  exit 0
fi
trap 'exit 0' TERM INT
while :; do sleep 1; done
"#;

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn engine_section(dir: &Path, binary: PathBuf) -> EngineSection {
    EngineSection {
        binary_path: binary,
        config_path: dir.join("config.json"),
        backup_dir: dir.join("backups"),
        max_restarts: 3,
        backup_retention: 10,
    }
}

/// Supervisor over a fake engine in `dir`, with a seeded valid config file.
pub fn fake_supervisor(dir: &Path, cancel: CancellationToken) -> Arc<EngineSupervisor> {
    let binary = write_script(dir, "fake-engine", FAKE_ENGINE);
    let section = engine_section(dir, binary);
    std::fs::write(&section.config_path, b"{\"log\":{\"loglevel\":\"warning\"}}").unwrap();
    EngineSupervisor::new(&section, cancel)
}
