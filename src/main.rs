// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;

use housebudget::commands::users::{SettingsAuth, resolve_session};
use housebudget::context::Context;
use housebudget::ratelimit::RateLimiter;
use housebudget::{cli, commands, db, telemetry, utils};

fn main() -> Result<()> {
    telemetry::init_subscriber(telemetry::get_subscriber(telemetry::default_filter()));
    let result = run();
    if let Err(e) = &result {
        telemetry::log_error(e);
    }
    result
}

fn run() -> Result<()> {
    let cli = cli::build_cli();
    let matches = cli.get_matches();

    let store = db::open_or_init()?;
    let limiter = RateLimiter::create(&store, utils::rate_limit_config(&store)?);
    let cx = Context::new(&store, utils::today()).with_limiter(&limiter);

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database initialized at {}", db::db_path()?.display());
        }
        Some(("login", sub)) => commands::users::login(&store, &cx, sub)?,
        Some(("user", sub)) => commands::users::handle(&cx, sub)?,
        Some((name, sub)) => {
            let session = resolve_session(&cx, &SettingsAuth(&store))?;
            match name {
                "household" => commands::households::handle(&cx, &session, sub)?,
                "account" => commands::accounts::handle(&cx, &session, sub)?,
                "category" => commands::categories::handle(&cx, &session, sub)?,
                "tx" => commands::transactions::handle(&cx, &session, sub)?,
                "budget" => commands::budgets::handle(&cx, &session, sub)?,
                "debt" => commands::settlements::handle(&cx, &session, sub)?,
                "template" => commands::recurring::handle(&cx, &session, sub)?,
                _ => {}
            }
        }
        None => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
