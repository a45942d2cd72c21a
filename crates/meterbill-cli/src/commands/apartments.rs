//! Apartment registry command implementations

use anyhow::Result;
use meterbill_core::db::{Database, NewApartment};

use super::{fmt_ts, truncate};

#[allow(clippy::too_many_arguments)]
pub fn cmd_apartment_add(
    db: &Database,
    title: &str,
    tenant: Option<String>,
    address: Option<String>,
    note: Option<String>,
    ls_account: Option<String>,
    chat: Option<i64>,
    expected: Option<i64>,
) -> Result<()> {
    let id = db.create_apartment(&NewApartment {
        title: title.to_string(),
        tenant_name: tenant,
        address,
        note,
        ls_account,
        chat_id: chat,
        electric_expected: expected,
    })?;

    let apartment = db.require_apartment(id)?;

    println!("✅ Added apartment {} ({})", id, apartment.title);
    println!("   Electric registers: {}", apartment.electric_expected);
    match apartment.chat_id {
        Some(chat_id) => println!("   Chat: {}", chat_id),
        None => {
            println!("   Chat: (not bound)");
            println!("   Bind one later with: meterbill apartment bind-chat {} <chat_id>", id);
        }
    }

    Ok(())
}

pub fn cmd_apartment_list(db: &Database) -> Result<()> {
    let apartments = db.list_apartments()?;

    if apartments.is_empty() {
        println!("No apartments yet. Register one with:");
        println!("  meterbill apartment add \"Unit 12\" --chat 123456");
        return Ok(());
    }

    println!();
    println!("🏠 Apartments");
    println!("   ─────────────────────────────────────────────────────────────");

    for a in apartments {
        let chat = a
            .chat_id
            .map(|c| c.to_string())
            .unwrap_or_else(|| "no chat".to_string());
        println!(
            "   [{}] {:<24} │ {} registers │ {:<12} │ {}",
            a.id,
            truncate(&a.title, 24),
            a.electric_expected,
            chat,
            a.tenant_name.as_deref().unwrap_or(""),
        );
    }

    Ok(())
}

pub fn cmd_apartment_show(db: &Database, id: i64) -> Result<()> {
    let a = db.require_apartment(id)?;

    println!();
    println!("🏠 Apartment {}: {}", a.id, a.title);
    println!("   ─────────────────────────────────────────────────────────────");
    if let Some(tenant) = &a.tenant_name {
        println!("   Tenant: {}", tenant);
    }
    if let Some(address) = &a.address {
        println!("   Address: {}", address);
    }
    if let Some(ls) = &a.ls_account {
        println!("   LS account: {}", ls);
    }
    if let Some(note) = &a.note {
        println!("   Note: {}", note);
    }
    println!("   Electric registers: {}", a.electric_expected);
    match a.chat_id {
        Some(chat) => println!("   Chat: {}", chat),
        None => println!("   Chat: (not bound)"),
    }
    println!("   Created: {}", fmt_ts(&a.created_at));

    Ok(())
}

pub fn cmd_apartment_set_expected(db: &Database, id: i64, expected: i64) -> Result<()> {
    db.set_electric_expected(id, expected)?;
    let stored = db.electric_expected(id)?;

    println!(
        "✅ Apartment {} now billed on {} electric register(s)",
        id, stored
    );
    if stored != expected {
        println!("   (requested {} was clamped to the valid 1-3 range)", expected);
    }

    Ok(())
}

pub fn cmd_apartment_bind_chat(db: &Database, id: i64, chat_id: i64) -> Result<()> {
    let a = db.require_apartment(id)?;
    db.update_apartment(
        id,
        &NewApartment {
            title: a.title.clone(),
            tenant_name: a.tenant_name.clone(),
            address: a.address.clone(),
            note: a.note.clone(),
            ls_account: a.ls_account.clone(),
            chat_id: Some(chat_id),
            electric_expected: Some(a.electric_expected),
        },
    )?;

    println!("✅ Chat {} bound to apartment {} ({})", chat_id, id, a.title);
    println!("   Bills for this unit will be delivered to this chat.");

    Ok(())
}
