// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Command, arg, value_parser};

fn json_flag() -> clap::Arg {
    arg!(--json "Print JSON instead of a table")
}

fn users() -> Command {
    Command::new("user")
        .about("Manage users")
        .subcommand_required(true)
        .subcommand(
            Command::new("add")
                .about("Register a user")
                .arg(arg!(--email <EMAIL>).required(true))
                .arg(arg!(--name <NAME>).required(true)),
        )
}

fn households() -> Command {
    Command::new("household")
        .about("Households and membership")
        .subcommand_required(true)
        .subcommand(
            Command::new("add")
                .about("Create a household and join it as admin")
                .arg(arg!(--name <NAME>).required(true))
                .arg(arg!(--currency <CCY>).default_value("CHF"))
                .arg(arg!(--payday <DAY> "Household payday, 1-31").value_parser(value_parser!(u32)))
                .arg(arg!(--split <PCT> "Default share kept by the payer, in percent")),
        )
        .subcommand(
            Command::new("join")
                .about("Add a registered user to the household")
                .arg(arg!(--email <EMAIL>).required(true))
                .arg(arg!(--household <ID>)),
        )
        .subcommand(Command::new("leave").about("Leave the current household"))
        .subcommand(Command::new("members").about("List active members"))
        .subcommand(
            Command::new("payday")
                .about("Set your payday, or the household's with --household")
                .arg(arg!(--day <DAY>).value_parser(value_parser!(u32)))
                .arg(arg!(--household "Change the household payday")),
        )
        .subcommand(Command::new("rm").about("Delete the household"))
}

fn accounts() -> Command {
    Command::new("account")
        .about("Manage accounts")
        .subcommand_required(true)
        .subcommand(
            Command::new("add")
                .arg(arg!(--name <NAME>).required(true))
                .arg(arg!(--currency <CCY>).default_value("CHF"))
                .arg(arg!(--balance <AMOUNT> "Opening balance"))
                .arg(arg!(--default "Use as default account"))
                .arg(arg!(--exclude "Leave out of budget spend")),
        )
        .subcommand(Command::new("list").arg(json_flag()))
        .subcommand(
            Command::new("exclude")
                .about("Exclude an account from budget spend")
                .arg(arg!(<id>))
                .arg(arg!(--off "Include it again")),
        )
        .subcommand(Command::new("rm").arg(arg!(<id>)))
}

fn categories() -> Command {
    Command::new("category")
        .about("Manage categories")
        .subcommand_required(true)
        .subcommand(
            Command::new("group-add")
                .arg(arg!(--name <NAME>).required(true))
                .arg(arg!(--"type" <TYPE> "income or expense").default_value("expense"))
                .arg(arg!(--order <N>).value_parser(value_parser!(i32))),
        )
        .subcommand(
            Command::new("add")
                .arg(arg!(--name <NAME>).required(true))
                .arg(arg!(--group <GROUP_ID>)),
        )
        .subcommand(Command::new("list"))
        .subcommand(
            Command::new("rm")
                .arg(arg!(<id>))
                .arg(arg!(--group "The id names a category group")),
        )
}

fn transactions() -> Command {
    Command::new("tx")
        .about("Record and edit transactions")
        .subcommand_required(true)
        .subcommand(
            Command::new("add")
                .arg(arg!(--account <ACCOUNT_ID>).required(true))
                .arg(arg!(--amount <AMOUNT>).required(true))
                .arg(arg!(--date <DATE> "YYYY-MM-DD, defaults to today"))
                .arg(arg!(--"type" <TYPE> "income or expense"))
                .arg(arg!(--category <CATEGORY_ID>))
                .arg(arg!(--payee <PAYEE>))
                .arg(arg!(--note <NOTE>))
                .arg(arg!(--exclude "Leave out of budget spend"))
                .arg(arg!(--"split-with" <EMAIL> "Share the expense with this member"))
                .arg(arg!(--"my-share" <PCT> "Your share in percent")),
        )
        .subcommand(
            Command::new("list")
                .arg(arg!(--limit <N>).value_parser(value_parser!(usize)))
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("edit")
                .arg(arg!(<id>))
                .arg(arg!(--account <ACCOUNT_ID>))
                .arg(arg!(--amount <AMOUNT>))
                .arg(arg!(--date <DATE>))
                .arg(arg!(--"type" <TYPE>))
                .arg(arg!(--category <CATEGORY_ID>))
                .arg(arg!(--payee <PAYEE>)),
        )
        .subcommand(Command::new("rm").arg(arg!(<id>)))
}

fn budgets() -> Command {
    Command::new("budget")
        .about("Budgets and pay periods")
        .subcommand_required(true)
        .subcommand(Command::new("period").about("Show the current pay period").arg(json_flag()))
        .subcommand(Command::new("income").arg(arg!(--amount <AMOUNT>).required(true)))
        .subcommand(
            Command::new("set")
                .about("Allocate an amount to a category")
                .arg(arg!(--category <CATEGORY_ID>).required(true))
                .arg(arg!(--amount <AMOUNT>).required(true))
                .arg(arg!(--group <GROUP>)),
        )
        .subcommand(Command::new("status").arg(json_flag()))
        .subcommand(Command::new("recalc").about("Recount spend from transactions"))
        .subcommand(
            Command::new("reset")
                .about("Roll budgets over when a new pay period has started")
                .arg(arg!(--force "Roll over even within the same period"))
                .arg(arg!(--household "Roll over every member of the household")),
        )
}

fn debts() -> Command {
    Command::new("debt")
        .about("Shared expenses and settlements")
        .subcommand_required(true)
        .subcommand(Command::new("show").about("Open shared expenses").arg(json_flag()))
        .subcommand(Command::new("net").about("Net balance with the other member").arg(json_flag()))
        .subcommand(
            Command::new("settle")
                .about("Pay back what you owe")
                .arg(arg!(--"from-account" <ACCOUNT_ID>).required(true))
                .arg(arg!(--"to-account" <ACCOUNT_ID>).required(true))
                .arg(arg!(--amount <AMOUNT>))
                .arg(arg!(--splits <IDS> "Comma-separated split ids").value_delimiter(','))
                .arg(arg!(--category <CATEGORY_ID>))
                .arg(arg!(--payee <PAYEE>)),
        )
}

fn templates() -> Command {
    Command::new("template")
        .about("Recurring transactions")
        .subcommand_required(true)
        .subcommand(
            Command::new("add")
                .arg(arg!(--account <ACCOUNT_ID>).required(true))
                .arg(arg!(--amount <AMOUNT>).required(true))
                .arg(arg!(--day <DAY>).required(true).value_parser(value_parser!(u32)))
                .arg(arg!(--"type" <TYPE>))
                .arg(arg!(--category <CATEGORY_ID>))
                .arg(arg!(--payee <PAYEE>)),
        )
        .subcommand(Command::new("list").arg(json_flag()))
        .subcommand(Command::new("stop").arg(arg!(<id>)))
        .subcommand(Command::new("run").about("Book every template that is due"))
}

pub fn build_cli() -> Command {
    Command::new("housebudget")
        .about("Household budgets, pay periods and shared expenses")
        .version(clap::crate_version!())
        .subcommand(Command::new("init").about("Initialize the database"))
        .subcommand(
            Command::new("login")
                .about("Sign in as a registered user")
                .arg(arg!(--email <EMAIL>).required(true)),
        )
        .subcommand(users())
        .subcommand(households())
        .subcommand(accounts())
        .subcommand(categories())
        .subcommand(transactions())
        .subcommand(budgets())
        .subcommand(debts())
        .subcommand(templates())
}
