//! Shared helpers for integration tests: scripted /bin/sh mock workers.

#![allow(dead_code)]

use resource_relay::WorkerConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A well-behaved worker: answers the handshake and the two resource
/// methods, returns an error for `fail/me`, stays silent for `slow/op`.
pub const RESPONDER_SCRIPT: &str = r#"
printf '{"jsonrpc":"2.0","method":"worker/ready"}\n'
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *"resources/list"*) printf '{"jsonrpc":"2.0","id":%s,"result":{"resources":[{"uri":"mock://greeting","name":"greeting","mimeType":"text/plain"}]}}\n' "$id" ;;
    *"resources/read"*) printf '{"jsonrpc":"2.0","id":%s,"result":{"contents":"hello from worker"}}\n' "$id" ;;
    *"fail/me"*) printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32000,"message":"boom"}}\n' "$id" ;;
    *"slow/op"*) ;;
    *) printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id" ;;
  esac
done
"#;

/// Crashes (exit 7) after answering two requests on its first run; behaves
/// like the full responder once the marker file exists.
pub const CRASH_ONCE_SCRIPT: &str = r#"
MARKER="$1"
CRASH=""
if [ ! -f "$MARKER" ]; then
  touch "$MARKER"
  CRASH=1
fi
count=0
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *"resources/list"*) printf '{"jsonrpc":"2.0","id":%s,"result":{"resources":[{"uri":"mock://greeting","name":"greeting"}]}}\n' "$id" ;;
    *"resources/read"*) printf '{"jsonrpc":"2.0","id":%s,"result":{"contents":"hello from worker"}}\n' "$id" ;;
    *) printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id" ;;
  esac
  count=$((count+1))
  if [ -n "$CRASH" ] && [ "$count" -ge 2 ]; then
    exit 7
  fi
done
"#;

/// Answers the handshake once, then exits non-zero; every later run exits
/// immediately, so reconnection can never succeed.
pub const EXHAUST_SCRIPT: &str = r#"
MARKER="$1"
if [ -f "$MARKER" ]; then
  exit 3
fi
touch "$MARKER"
IFS= read -r line
id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
[ -n "$id" ] && printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id"
exit 3
"#;

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write mock worker script");
    path
}

/// Worker config running `script` under /bin/sh with timings tightened for
/// tests.
pub fn sh_worker_config(script: &Path, extra_args: &[&str]) -> WorkerConfig {
    let mut args = vec![script.to_string_lossy().to_string()];
    args.extend(extra_args.iter().map(|a| a.to_string()));

    let mut config = WorkerConfig::new("/bin/sh").with_args(args);
    config.request_timeout = Duration::from_millis(2000);
    config.startup_grace = Duration::from_millis(50);
    config.reconnect_base_delay = Duration::from_millis(50);
    config.backoff_multiplier = 2.0;
    config.max_reconnect_attempts = 3;
    config
}
