// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use scms_auth::config::Cli;
use scms_auth::error::AuthError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if cli.config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    if let Err(e) = scms_auth::run(cli).await {
        let code = e.downcast_ref::<AuthError>().map(AuthError::code).unwrap_or("ERROR");
        error!(code, "fatal: {e:#}");
        std::process::exit(1);
    }
}
