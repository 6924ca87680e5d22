// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::redact::Redacted;
use tracing::Subscriber;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

/// Development builds log from `info` up; release builds only log errors.
pub fn default_filter() -> &'static str {
    if cfg!(debug_assertions) { "info" } else { "error" }
}

/// Log an error with its full chain, redacted.
pub fn log_error(e: &anyhow::Error) {
    tracing::error!("{}", Redacted(format!("{e:#}")));
}

pub fn get_subscriber(env_filter: &str) -> impl Subscriber + Sync + Send {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));
    let stderr = fmt::Layer::new().with_writer(std::io::stderr).compact();
    Registry::default().with(env_filter).with(stderr)
}

/// Install the global subscriber. Returns false when one is already set.
pub fn init_subscriber(subscriber: impl Subscriber + Sync + Send) -> bool {
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
