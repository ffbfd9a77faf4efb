use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPayerAccount, PayerAccount},
    helpers::PayerHints,
    traits::{PayerKey, PayerMatch},
};

pub async fn register_payer(payer: NewPayerAccount, conn: &mut SqliteConnection) -> Result<PayerAccount, sqlx::Error> {
    let account = sqlx::query_as(
        r#"
            INSERT INTO payer_accounts (user_id, iban, account_number, national_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(payer.user_id)
    .bind(payer.iban)
    .bind(payer.account_number)
    .bind(payer.national_id)
    .fetch_one(conn)
    .await?;
    Ok(account)
}

async fn user_for(column: PayerKey, value: &str, conn: &mut SqliteConnection) -> Result<Option<i64>, sqlx::Error> {
    let sql = match column {
        PayerKey::Iban => "SELECT user_id FROM payer_accounts WHERE iban = $1 ORDER BY id DESC LIMIT 1",
        PayerKey::AccountNumber => {
            "SELECT user_id FROM payer_accounts WHERE account_number = $1 ORDER BY id DESC LIMIT 1"
        },
        PayerKey::NationalId => "SELECT user_id FROM payer_accounts WHERE national_id = $1 ORDER BY id DESC LIMIT 1",
    };
    let user_id = sqlx::query_scalar(sql).bind(value).fetch_optional(conn).await?;
    Ok(user_id)
}

/// Looks up each identifier in the hints, most specific first, and returns the first registered user found.
pub async fn find_payer(hints: &PayerHints, conn: &mut SqliteConnection) -> Result<Option<PayerMatch>, sqlx::Error> {
    let candidates = [
        (PayerKey::Iban, hints.iban.as_deref()),
        (PayerKey::AccountNumber, hints.account_number.as_deref()),
        (PayerKey::NationalId, hints.national_id.as_deref()),
    ];
    for (key, value) in candidates {
        let Some(value) = value else { continue };
        if let Some(user_id) = user_for(key, value, &mut *conn).await? {
            trace!("🗃️ Payer matched to user #{user_id} by {key:?}");
            return Ok(Some(PayerMatch { user_id, matched_by: key }));
        }
    }
    Ok(None)
}
