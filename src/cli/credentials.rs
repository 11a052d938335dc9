use super::ui;
use crate::core::credentials::{
    ApiCredential, CredentialStore, CredentialUpdate, PassphraseCredential,
};
use crate::core::exchange::{ExchangeAccount, ExchangeKind};
use anyhow::{Result, bail};
use comfy_table::{Cell, Color};

/// Builds the update for one exchange from command line input.
pub fn build_update(
    exchange: ExchangeKind,
    api_key: String,
    api_secret: String,
    passphrase: Option<String>,
    slot: usize,
) -> Result<CredentialUpdate> {
    let update = match exchange {
        ExchangeKind::Bybit => CredentialUpdate::Bybit(ApiCredential::new(api_key, api_secret)),
        ExchangeKind::Binance => {
            CredentialUpdate::Binance(ApiCredential::new(api_key, api_secret))
        }
        ExchangeKind::Okx => {
            let Some(passphrase) = passphrase else {
                bail!("OKX credentials require a passphrase");
            };
            CredentialUpdate::Okx {
                slot,
                credential: PassphraseCredential::new(api_key, api_secret, passphrase),
            }
        }
    };
    if exchange != ExchangeKind::Okx && slot != 0 {
        bail!("{exchange} has a single credential slot");
    }
    Ok(update)
}

pub fn set(store: &CredentialStore, update: CredentialUpdate) -> Result<()> {
    if let CredentialUpdate::Okx { slot, .. } = &update {
        if *slot >= store.okx_slots() {
            bail!(
                "OKX slot {} is out of range, {} slots are configured",
                slot,
                store.okx_slots()
            );
        }
    }
    let kind = update.kind();
    store.set(update)?;
    println!("Saved {kind} credentials");
    Ok(())
}

pub fn clear(store: &CredentialStore) -> Result<()> {
    store.clear()?;
    println!("Cleared all stored credentials");
    Ok(())
}

/// Which accounts have complete credentials. Secrets are never shown.
pub fn render_status(store: &CredentialStore) -> String {
    let mut accounts = vec![ExchangeAccount::Bybit, ExchangeAccount::Binance];
    accounts.extend((0..store.okx_slots()).map(|slot| ExchangeAccount::Okx { slot }));

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Account"),
        ui::header_cell("Slot"),
        ui::header_cell("Credentials"),
    ]);
    for account in accounts {
        let slot = match account {
            ExchangeAccount::Okx { slot } => slot.to_string(),
            _ => String::new(),
        };
        let status = if store.credential(&account).is_some() {
            Cell::new("set").fg(Color::Green)
        } else {
            Cell::new("not set").fg(Color::DarkGrey)
        };
        table.add_row(vec![Cell::new(account.default_label()), Cell::new(slot), status]);
    }
    table.to_string()
}

pub fn status(store: &CredentialStore) -> Result<()> {
    println!("{}", render_status(store));
    Ok(())
}
