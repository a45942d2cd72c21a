//! Meterbill CLI - Utility meter billing for small landlords
//!
//! Usage:
//!   meterbill init                                Initialize database
//!   meterbill apartment add "Unit 12" --chat N    Register an apartment
//!   meterbill tariff import --file tariffs.csv    Load the tariff history
//!   meterbill reading submit -a 1 --meter cold --value 105,5
//!   meterbill bill calc -a 1 -m 2026-03           Show the month's bill

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
        Commands::Apartment { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(ApartmentAction::List) => commands::cmd_apartment_list(&db),
                Some(ApartmentAction::Add {
                    title,
                    tenant,
                    address,
                    note,
                    ls_account,
                    chat,
                    expected,
                }) => commands::cmd_apartment_add(
                    &db, &title, tenant, address, note, ls_account, chat, expected,
                ),
                Some(ApartmentAction::Show { id }) => commands::cmd_apartment_show(&db, id),
                Some(ApartmentAction::SetExpected { id, expected }) => {
                    commands::cmd_apartment_set_expected(&db, id, expected)
                }
                Some(ApartmentAction::BindChat { id, chat_id }) => {
                    commands::cmd_apartment_bind_chat(&db, id, chat_id)
                }
            }
        }
        Commands::Tariff { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(TariffAction::List) => commands::cmd_tariff_list(&db),
                Some(TariffAction::Set {
                    month_from,
                    cold,
                    hot,
                    electric,
                    sewer,
                    t1,
                    t2,
                    t3,
                }) => commands::cmd_tariff_set(
                    &db,
                    &month_from,
                    cold,
                    hot,
                    electric,
                    sewer,
                    t1,
                    t2,
                    t3,
                ),
                Some(TariffAction::Import { file }) => commands::cmd_tariff_import(&db, &file),
            }
        }
        Commands::Reading { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                ReadingAction::Submit {
                    apartment,
                    month,
                    meter,
                    value,
                    index,
                    ocr,
                    photo,
                } => {
                    commands::cmd_reading_submit(
                        &db,
                        apartment,
                        month.as_deref(),
                        &meter,
                        &value,
                        index,
                        ocr,
                        photo.as_deref(),
                    )
                    .await
                }
                ReadingAction::List { apartment, month } => {
                    commands::cmd_reading_list(&db, apartment, month.as_deref())
                }
                ReadingAction::Events { apartment, month } => {
                    commands::cmd_reading_events(&db, apartment, month.as_deref())
                }
            }
        }
        Commands::Bill { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                BillAction::Calc {
                    apartment,
                    month,
                    json,
                } => commands::cmd_bill_calc(&db, apartment, month.as_deref(), json),
                BillAction::Approve {
                    apartment,
                    month,
                    send,
                } => commands::cmd_bill_approve(&db, apartment, month.as_deref(), send).await,
                BillAction::Send { apartment, month } => {
                    commands::cmd_bill_send(&db, apartment, month.as_deref()).await
                }
                BillAction::SendWithoutT3 { apartment, month } => {
                    commands::cmd_bill_send_without_t3(&db, apartment, month.as_deref()).await
                }
            }
        }
        Commands::Extra { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                ExtraAction::Accept { apartment, month } => {
                    commands::cmd_extra_accept(&db, apartment, month.as_deref())
                }
                ExtraAction::Reject { apartment, month } => {
                    commands::cmd_extra_reject(&db, apartment, month.as_deref())
                }
            }
        }
    }
}
